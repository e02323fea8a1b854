//! Mock admin notifier for testing.

use crate::error::{AuthError, Result};
use crate::providers::AdminNotifier;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// One recorded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    /// Admin the notification went to.
    pub admin_email: String,
    /// Username of the account waiting for activation.
    pub created_username: String,
}

/// Mock admin notifier.
///
/// Records deliveries so tests can assert on the fan-out; clones share
/// the recording, which matters because the orchestrator notifies from a
/// spawned background task.
#[derive(Debug, Clone, Default)]
pub struct MockAdminNotifier {
    sent: Arc<Mutex<Vec<SentNotification>>>,
    should_fail: bool,
}

impl MockAdminNotifier {
    /// Create a mock that records and succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose deliveries all fail.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Notifications recorded so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl AdminNotifier for MockAdminNotifier {
    fn notify_registration_pending(
        &self,
        admin_email: &str,
        created_username: &str,
        _app_title: &str,
        _app_url: &str,
    ) -> impl Future<Output = Result<()>> + Send {
        let notifier = self.clone();
        let notification = SentNotification {
            admin_email: admin_email.to_string(),
            created_username: created_username.to_string(),
        };

        async move {
            if notifier.should_fail {
                return Err(AuthError::Internal("mock delivery failure".to_string()));
            }
            notifier
                .sent
                .lock()
                .map_err(|_| AuthError::Internal("notifier lock poisoned".to_string()))?
                .push(notification);
            Ok(())
        }
    }
}
