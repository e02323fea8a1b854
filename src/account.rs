//! Local accounts: persisted model, backing-store trait, and the
//! resolver that maps verified external identities onto them.

use crate::config::ConfigHandle;
use crate::constants::messages;
use crate::error::{AuthError, Result};
use crate::password;
use crate::state::{AccountId, AuthenticatedUser, Provider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Account lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Normal, usable account.
    Active,
    /// Created by invitation; not yet activated.
    Invited,
    /// Blocked by an administrator.
    Suspended,
}

/// Persisted local account.
///
/// `username` and `email` are globally unique (store-level unique
/// indexes). Accounts reachable via an external id need not have a
/// password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalAccount {
    /// Account id.
    pub id: AccountId,

    /// Unique username.
    pub username: String,

    /// Unique email address.
    pub email: String,

    /// Display name.
    pub name: String,

    /// Salted password hash; `None` for externally-created accounts that
    /// have not set a local credential yet.
    pub password_hash: Option<String>,

    /// Linked Google user id.
    pub google_id: Option<String>,

    /// Linked GitHub user id.
    pub github_id: Option<String>,

    /// Lifecycle status.
    pub status: AccountStatus,

    /// Whether this account administers the wiki.
    pub admin: bool,

    /// Preferred locale.
    pub locale: String,

    /// Avatar URL, if one was imported or uploaded.
    pub avatar_url: Option<String>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl LocalAccount {
    /// Build a fresh active account.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: Option<String>,
        locale: impl Into<String>,
    ) -> Self {
        Self {
            id: AccountId::new(),
            username: username.into(),
            email: email.into(),
            name: name.into(),
            password_hash,
            google_id: None,
            github_id: None,
            status: AccountStatus::Active,
            admin: false,
            locale: locale.into(),
            avatar_url: None,
            created_at: Utc::now(),
        }
    }

    /// The linked external id for `provider`, if any.
    #[must_use]
    pub fn external_id(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Google => self.google_id.as_deref(),
            Provider::GitHub => self.github_id.as_deref(),
        }
    }

    /// Whether a local credential is set.
    #[must_use]
    pub const fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

impl From<&LocalAccount> for AuthenticatedUser {
    fn from(account: &LocalAccount) -> Self {
        Self {
            account_id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            name: account.name.clone(),
        }
    }
}

/// Backing store for local accounts.
///
/// The store must enforce unique indexes on `username` and `email`
/// independently: concurrent registrations racing past the resolver's
/// pre-check cannot both succeed, and the loser gets
/// [`AuthError::Duplicate`]. The indexes, not the pre-check, are the
/// source of truth.
pub trait AccountStore: Send + Sync {
    /// Look up an account by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn find_by_id(
        &self,
        id: AccountId,
    ) -> impl Future<Output = Result<Option<LocalAccount>>> + Send;

    /// Look up an account by a linked external id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn find_by_external_id(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> impl Future<Output = Result<Option<LocalAccount>>> + Send;

    /// Look up an account by email.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<LocalAccount>>> + Send;

    /// Whether an account with this email exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn email_exists(&self, email: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Whether an account with this username exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn username_exists(&self, username: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Insert a new account.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Duplicate`] when a unique index on
    /// `username` or `email` rejects the insert.
    fn insert(
        &self,
        account: &LocalAccount,
    ) -> impl Future<Output = Result<LocalAccount>> + Send;

    /// Set the linked external id for `provider`, returning the updated
    /// account.
    ///
    /// # Errors
    ///
    /// Returns an error if the account does not exist.
    fn set_external_id(
        &self,
        id: AccountId,
        provider: Provider,
        external_id: &str,
    ) -> impl Future<Output = Result<LocalAccount>> + Send;

    /// Complete an invited account: set its chosen username, display
    /// name, and credential, and mark it active, returning the updated
    /// account.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Duplicate`] when the unique index on
    /// `username` rejects the new name (the account's current username
    /// does not count as a collision), or an error if the account does
    /// not exist.
    fn activate_invited(
        &self,
        id: AccountId,
        username: &str,
        name: &str,
        password_hash: &str,
    ) -> impl Future<Output = Result<LocalAccount>> + Send;

    /// Update the avatar URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the account does not exist.
    fn set_avatar_url(
        &self,
        id: AccountId,
        avatar_url: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Every admin account, for notification fan-out.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn find_admins(&self) -> impl Future<Output = Result<Vec<LocalAccount>>> + Send;
}

/// Result of the registration uniqueness pre-check.
///
/// Both checks always run so the caller can report every problem at
/// once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registerability {
    /// The email is already registered.
    pub email_taken: bool,
    /// The username is already taken.
    pub username_taken: bool,
}

impl Registerability {
    /// `true` when neither field is taken.
    #[must_use]
    pub const fn ok(self) -> bool {
        !self.email_taken && !self.username_taken
    }
}

/// Maps verified external identities onto local accounts and enforces
/// registration policy.
#[derive(Debug, Clone)]
pub struct AccountResolver<S> {
    store: S,
    config: ConfigHandle,
}

impl<S: AccountStore> AccountResolver<S> {
    /// Create a resolver over `store` with policy read from `config`.
    #[must_use]
    pub const fn new(store: S, config: ConfigHandle) -> Self {
        Self { store, config }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Find the local account linked to an external identity, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn find_by_external_id(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> Result<Option<LocalAccount>> {
        self.store.find_by_external_id(provider, external_id).await
    }

    /// Uniqueness pre-check: both flags are computed even when the first
    /// already failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn check_registerable(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Registerability> {
        let email_taken = self.store.email_exists(email).await?;
        let username_taken = self.store.username_exists(username).await?;
        Ok(Registerability {
            email_taken,
            username_taken,
        })
    }

    /// Validate an email against the configured allow-list.
    ///
    /// An empty allow-list accepts any well-formed address; otherwise
    /// the address's domain must equal one of the configured entries,
    /// written with or without a leading `@`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config lock is poisoned.
    pub fn validate_email(&self, email: &str) -> Result<bool> {
        let (local, domain) = match email.split_once('@') {
            Some(parts) => parts,
            None => return Ok(false),
        };
        if local.is_empty() || domain.is_empty() {
            return Ok(false);
        }

        let white_list = self.config.snapshot()?.registration_white_list();
        if white_list.is_empty() {
            return Ok(true);
        }
        // Matching is anchored at the separator: "corp.example.com" must
        // not admit "user@evilcorp.example.com".
        Ok(white_list.iter().any(|entry| {
            let allowed = entry.strip_prefix('@').unwrap_or(entry);
            domain.eq_ignore_ascii_case(allowed)
        }))
    }

    /// Validate GitHub organization memberships against the configured
    /// allow-list.
    ///
    /// Fails closed: when the allow-list is non-empty and there is no
    /// overlap, the identity is invalid.
    ///
    /// # Errors
    ///
    /// Returns an error if the config lock is poisoned.
    pub fn validate_organization_membership(&self, organizations: &[String]) -> Result<bool> {
        let allowed = self.config.snapshot()?.github_organizations();
        if allowed.is_empty() {
            return Ok(true);
        }
        Ok(organizations
            .iter()
            .any(|org| allowed.iter().any(|a| a.eq_ignore_ascii_case(org))))
    }

    /// Create a new active account.
    ///
    /// The caller is expected to have run [`Self::check_registerable`];
    /// the insert still fails with [`AuthError::Duplicate`] if a racing
    /// registration won the unique index first.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Duplicate`] on a unique-index violation, or
    /// a store error.
    pub async fn create_account(
        &self,
        name: &str,
        username: &str,
        email: &str,
        plain_password: Option<&str>,
        locale: &str,
    ) -> Result<LocalAccount> {
        let password_hash = plain_password
            .filter(|p| !p.is_empty())
            .map(password::hash_password);
        let account = LocalAccount::new(name, username, email, password_hash, locale);
        self.store.insert(&account).await
    }

    /// Link an external id to an account.
    ///
    /// Idempotent: linking an id that is already linked is a no-op
    /// returning the same account.
    ///
    /// # Errors
    ///
    /// Returns an error if the store update fails.
    pub async fn link_external_id(
        &self,
        account: &LocalAccount,
        provider: Provider,
        external_id: &str,
    ) -> Result<LocalAccount> {
        if account.external_id(provider) == Some(external_id) {
            return Ok(account.clone());
        }
        self.store
            .set_external_id(account.id, provider, external_id)
            .await
    }

    /// Complete an invited account with its chosen username, display
    /// name, and a fresh local credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] when the account is not awaiting
    /// activation or the password is empty, [`AuthError::Duplicate`] when
    /// the username index rejects the chosen name, or a store error.
    pub async fn activate_invited(
        &self,
        account: &LocalAccount,
        username: &str,
        name: &str,
        plain_password: &str,
    ) -> Result<LocalAccount> {
        if account.status != AccountStatus::Invited {
            return Err(AuthError::Validation(vec![
                "This account is not awaiting activation.".to_string(),
            ]));
        }
        if plain_password.is_empty() {
            return Err(AuthError::Validation(vec![
                messages::PASSWORD_REQUIRED.to_string(),
            ]));
        }
        let password_hash = password::hash_password(plain_password);
        self.store
            .activate_invited(account.id, username, name, &password_hash)
            .await
    }

    /// Check an email/password pair.
    ///
    /// Returns `None` for an unknown email, a wrong password, or an
    /// account with no password set. The three are indistinguishable to
    /// the caller, so no account-existence information leaks.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn find_by_credentials(
        &self,
        email: &str,
        plain_password: &str,
    ) -> Result<Option<LocalAccount>> {
        let Some(account) = self.store.find_by_email(email).await? else {
            return Ok(None);
        };
        let Some(stored) = account.password_hash.as_deref() else {
            return Ok(None);
        };
        if password::verify_password(plain_password, stored) {
            Ok(Some(account))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::{CORE_NAMESPACE, ConfigCache};
    use crate::mocks::MockAccountStore;
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn config_with(key: &str, value: Value) -> ConfigHandle {
        let mut cache = ConfigCache::new();
        let mut values = BTreeMap::new();
        values.insert(key.to_string(), value);
        cache.set_namespace(CORE_NAMESPACE, values);
        ConfigHandle::new(cache)
    }

    fn resolver() -> AccountResolver<MockAccountStore> {
        AccountResolver::new(MockAccountStore::new(), ConfigHandle::default())
    }

    #[tokio::test]
    async fn test_check_registerable_reports_both_flags() {
        let resolver = resolver();
        resolver
            .create_account("Taken", "taken", "taken@example.com", Some("pw"), "en-US")
            .await
            .unwrap();

        // Fresh pair.
        let check = resolver
            .check_registerable("new@example.com", "newuser")
            .await
            .unwrap();
        assert!(check.ok());

        // Both taken at once: both flags set, not just the first.
        let check = resolver
            .check_registerable("taken@example.com", "taken")
            .await
            .unwrap();
        assert!(check.email_taken);
        assert!(check.username_taken);

        // One taken: the other flag stays clear.
        let check = resolver
            .check_registerable("taken@example.com", "someone-else")
            .await
            .unwrap();
        assert!(check.email_taken);
        assert!(!check.username_taken);
    }

    #[tokio::test]
    async fn test_validate_email_allow_list() {
        let resolver = resolver();
        assert!(resolver.validate_email("user@example.com").unwrap());
        assert!(!resolver.validate_email("not-an-email").unwrap());
        assert!(!resolver.validate_email("@example.com").unwrap());

        let restricted = AccountResolver::new(
            MockAccountStore::new(),
            config_with(
                "security:registrationWhiteList",
                Value::Array(vec![Value::from("@corp.example.com")]),
            ),
        );
        assert!(restricted.validate_email("dev@corp.example.com").unwrap());
        assert!(!restricted.validate_email("dev@elsewhere.com").unwrap());
    }

    #[tokio::test]
    async fn test_email_allow_list_is_anchored_at_the_domain() {
        // Entries without a leading '@' are still whole-domain matches,
        // never bare suffixes.
        let restricted = AccountResolver::new(
            MockAccountStore::new(),
            config_with(
                "security:registrationWhiteList",
                Value::from("corp.example.com"),
            ),
        );
        assert!(restricted.validate_email("dev@corp.example.com").unwrap());
        assert!(restricted.validate_email("dev@CORP.example.com").unwrap());
        assert!(!restricted.validate_email("dev@evilcorp.example.com").unwrap());
        assert!(!restricted
            .validate_email("dev@corp.example.com.evil.com")
            .unwrap());
    }

    #[tokio::test]
    async fn test_organization_allow_list_fails_closed() {
        let open = resolver();
        assert!(open
            .validate_organization_membership(&["anything".to_string()])
            .unwrap());

        let restricted = AccountResolver::new(
            MockAccountStore::new(),
            config_with("github:organization", Value::from("acme")),
        );
        assert!(restricted
            .validate_organization_membership(&["ACME".to_string()])
            .unwrap());
        assert!(!restricted
            .validate_organization_membership(&["other-org".to_string()])
            .unwrap());
        assert!(!restricted.validate_organization_membership(&[]).unwrap());
    }

    #[tokio::test]
    async fn test_insert_duplicate_loses_to_unique_index() {
        let resolver = resolver();
        resolver
            .create_account("A", "alice", "alice@example.com", Some("pw"), "en-US")
            .await
            .unwrap();

        let err = resolver
            .create_account("B", "alice", "other@example.com", Some("pw"), "en-US")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Duplicate { field: "username" });

        let err = resolver
            .create_account("B", "bob", "alice@example.com", Some("pw"), "en-US")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Duplicate { field: "email" });
    }

    #[tokio::test]
    async fn test_link_external_id_is_idempotent() {
        let resolver = resolver();
        let account = resolver
            .create_account("A", "alice", "alice@example.com", None, "en-US")
            .await
            .unwrap();

        let linked = resolver
            .link_external_id(&account, Provider::GitHub, "gh-123")
            .await
            .unwrap();
        assert_eq!(linked.github_id.as_deref(), Some("gh-123"));

        // Linking the same id again is a no-op returning the same account.
        let relinked = resolver
            .link_external_id(&linked, Provider::GitHub, "gh-123")
            .await
            .unwrap();
        assert_eq!(relinked, linked);
    }

    #[tokio::test]
    async fn test_activate_invited_sets_credentials_and_status() {
        let resolver = resolver();
        let mut invited =
            LocalAccount::new("Invitee", "invitee-tmp", "invitee@example.com", None, "en-US");
        invited.status = AccountStatus::Invited;
        let invited = resolver.store().insert(&invited).await.unwrap();

        let activated = resolver
            .activate_invited(&invited, "casper", "Casper", "hunter2")
            .await
            .unwrap();
        assert_eq!(activated.username, "casper");
        assert_eq!(activated.name, "Casper");
        assert_eq!(activated.status, AccountStatus::Active);
        assert!(activated.has_password());

        // Only invited accounts can activate.
        let err = resolver
            .activate_invited(&activated, "casper2", "Casper", "hunter2")
            .await
            .unwrap_err();
        assert!(err.is_user_error());

        // An empty password is rejected before any store write.
        let mut other = LocalAccount::new("B", "other-tmp", "other@example.com", None, "en-US");
        other.status = AccountStatus::Invited;
        let other = resolver.store().insert(&other).await.unwrap();
        let err = resolver
            .activate_invited(&other, "other", "Other", "")
            .await
            .unwrap_err();
        assert!(err.is_user_error());
    }

    #[tokio::test]
    async fn test_activate_invited_respects_username_index() {
        let resolver = resolver();
        resolver
            .create_account("A", "casper", "casper@example.com", Some("pw"), "en-US")
            .await
            .unwrap();
        let mut invited =
            LocalAccount::new("Invitee", "invitee-tmp", "invitee@example.com", None, "en-US");
        invited.status = AccountStatus::Invited;
        let invited = resolver.store().insert(&invited).await.unwrap();

        let err = resolver
            .activate_invited(&invited, "casper", "Casper", "hunter2")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Duplicate { field: "username" });

        // Keeping the provisional username is not a collision with itself.
        let activated = resolver
            .activate_invited(&invited, "invitee-tmp", "Casper", "hunter2")
            .await
            .unwrap();
        assert_eq!(activated.status, AccountStatus::Active);
    }

    #[tokio::test]
    async fn test_credentials_mismatch_is_uniform() {
        let resolver = resolver();
        resolver
            .create_account("A", "alice", "alice@example.com", Some("hunter2"), "en-US")
            .await
            .unwrap();
        resolver
            .create_account("B", "bob", "bob@example.com", None, "en-US")
            .await
            .unwrap();

        assert!(resolver
            .find_by_credentials("alice@example.com", "hunter2")
            .await
            .unwrap()
            .is_some());

        // Wrong password, unknown email, and passwordless account all
        // come back as the same None.
        assert!(resolver
            .find_by_credentials("alice@example.com", "wrong")
            .await
            .unwrap()
            .is_none());
        assert!(resolver
            .find_by_credentials("ghost@example.com", "hunter2")
            .await
            .unwrap()
            .is_none());
        assert!(resolver
            .find_by_credentials("bob@example.com", "hunter2")
            .await
            .unwrap()
            .is_none());
    }
}
