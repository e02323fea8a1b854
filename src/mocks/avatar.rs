//! Mock avatar store for testing.

use crate::error::{AuthError, Result};
use crate::providers::AvatarStore;
use crate::state::AccountId;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Mock avatar store.
///
/// Records uploads and hands back a deterministic URL.
#[derive(Debug, Clone, Default)]
pub struct MockAvatarStore {
    stored: Arc<Mutex<Vec<(AccountId, String)>>>,
    should_fail: bool,
}

impl MockAvatarStore {
    /// Create a mock that records and succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose uploads all fail.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Uploads recorded so far, as `(account_id, content_type)` pairs.
    #[must_use]
    pub fn stored(&self) -> Vec<(AccountId, String)> {
        self.stored.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl AvatarStore for MockAvatarStore {
    fn store_avatar(
        &self,
        account_id: AccountId,
        content_type: &str,
        _bytes: &[u8],
    ) -> impl Future<Output = Result<String>> + Send {
        let store = self.clone();
        let content_type = content_type.to_string();

        async move {
            if store.should_fail {
                return Err(AuthError::Internal("mock upload failure".to_string()));
            }
            store
                .stored
                .lock()
                .map_err(|_| AuthError::Internal("avatar store lock poisoned".to_string()))?
                .push((account_id, content_type));
            Ok(format!("/uploads/avatar/{}", account_id.0))
        }
    }
}
