//! Mock account store for testing.

use crate::account::{AccountStatus, AccountStore, LocalAccount};
use crate::error::{AuthError, Result};
use crate::state::{AccountId, Provider};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Mock account store.
///
/// Uses in-memory storage and enforces the same unique-index semantics a
/// real store must provide: inserts colliding on `username` or `email`
/// fail with [`AuthError::Duplicate`], and the check-and-insert happens
/// under one lock so racing registrations cannot both win.
#[derive(Debug, Clone, Default)]
pub struct MockAccountStore {
    accounts: Arc<Mutex<HashMap<AccountId, LocalAccount>>>,
}

impl MockAccountStore {
    /// Create a new empty mock store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<AccountId, LocalAccount>>> {
        self.accounts
            .lock()
            .map_err(|_| AuthError::Internal("account store lock poisoned".to_string()))
    }

    /// Fetch a stored account by id (test helper).
    #[must_use]
    pub fn get(&self, id: AccountId) -> Option<LocalAccount> {
        self.accounts.lock().ok()?.get(&id).cloned()
    }

    /// Number of stored accounts (test helper).
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.lock().map(|a| a.len()).unwrap_or(0)
    }

    /// Whether the store is empty (test helper).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AccountStore for MockAccountStore {
    fn find_by_id(
        &self,
        id: AccountId,
    ) -> impl Future<Output = Result<Option<LocalAccount>>> + Send {
        let store = self.clone();

        async move {
            let accounts = store.lock()?;
            Ok(accounts.get(&id).cloned())
        }
    }

    fn find_by_external_id(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> impl Future<Output = Result<Option<LocalAccount>>> + Send {
        let store = self.clone();
        let external_id = external_id.to_string();

        async move {
            let accounts = store.lock()?;
            Ok(accounts
                .values()
                .find(|a| a.external_id(provider) == Some(external_id.as_str()))
                .cloned())
        }
    }

    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<LocalAccount>>> + Send {
        let store = self.clone();
        let email = email.to_string();

        async move {
            let accounts = store.lock()?;
            Ok(accounts.values().find(|a| a.email == email).cloned())
        }
    }

    fn email_exists(&self, email: &str) -> impl Future<Output = Result<bool>> + Send {
        let store = self.clone();
        let email = email.to_string();

        async move {
            let accounts = store.lock()?;
            Ok(accounts.values().any(|a| a.email == email))
        }
    }

    fn username_exists(&self, username: &str) -> impl Future<Output = Result<bool>> + Send {
        let store = self.clone();
        let username = username.to_string();

        async move {
            let accounts = store.lock()?;
            Ok(accounts.values().any(|a| a.username == username))
        }
    }

    fn insert(&self, account: &LocalAccount) -> impl Future<Output = Result<LocalAccount>> + Send {
        let store = self.clone();
        let account = account.clone();

        async move {
            let mut accounts = store.lock()?;

            // Unique indexes checked and applied under one lock.
            if accounts.values().any(|a| a.username == account.username) {
                return Err(AuthError::Duplicate { field: "username" });
            }
            if accounts.values().any(|a| a.email == account.email) {
                return Err(AuthError::Duplicate { field: "email" });
            }

            accounts.insert(account.id, account.clone());
            Ok(account)
        }
    }

    fn set_external_id(
        &self,
        id: AccountId,
        provider: Provider,
        external_id: &str,
    ) -> impl Future<Output = Result<LocalAccount>> + Send {
        let store = self.clone();
        let external_id = external_id.to_string();

        async move {
            let mut accounts = store.lock()?;
            let account = accounts
                .get_mut(&id)
                .ok_or_else(|| AuthError::Internal("account not found".to_string()))?;
            match provider {
                Provider::Google => account.google_id = Some(external_id),
                Provider::GitHub => account.github_id = Some(external_id),
            }
            Ok(account.clone())
        }
    }

    fn activate_invited(
        &self,
        id: AccountId,
        username: &str,
        name: &str,
        password_hash: &str,
    ) -> impl Future<Output = Result<LocalAccount>> + Send {
        let store = self.clone();
        let username = username.to_string();
        let name = name.to_string();
        let password_hash = password_hash.to_string();

        async move {
            let mut accounts = store.lock()?;

            // Same unique-index rule as insert; the account's own row is
            // not a collision.
            if accounts
                .values()
                .any(|a| a.id != id && a.username == username)
            {
                return Err(AuthError::Duplicate { field: "username" });
            }

            let account = accounts
                .get_mut(&id)
                .ok_or_else(|| AuthError::Internal("account not found".to_string()))?;
            account.username = username;
            account.name = name;
            account.password_hash = Some(password_hash);
            account.status = AccountStatus::Active;
            Ok(account.clone())
        }
    }

    fn set_avatar_url(
        &self,
        id: AccountId,
        avatar_url: &str,
    ) -> impl Future<Output = Result<()>> + Send {
        let store = self.clone();
        let avatar_url = avatar_url.to_string();

        async move {
            let mut accounts = store.lock()?;
            let account = accounts
                .get_mut(&id)
                .ok_or_else(|| AuthError::Internal("account not found".to_string()))?;
            account.avatar_url = Some(avatar_url);
            Ok(())
        }
    }

    fn find_admins(&self) -> impl Future<Output = Result<Vec<LocalAccount>>> + Send {
        let store = self.clone();

        async move {
            let accounts = store.lock()?;
            let mut admins: Vec<LocalAccount> =
                accounts.values().filter(|a| a.admin).cloned().collect();
            admins.sort_by(|a, b| a.username.cmp(&b.username));
            Ok(admins)
        }
    }
}
