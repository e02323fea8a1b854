//! Mock identity provider for testing.

use crate::error::{AuthError, Result};
use crate::providers::IdentityProvider;
use crate::state::{ExternalIdentity, Provider};
use std::future::Future;

/// Mock identity provider.
///
/// Returns a configurable [`ExternalIdentity`] from `exchange_code`, or
/// fails every exchange when built with [`MockIdentityProvider::failing`].
#[derive(Debug, Clone)]
pub struct MockIdentityProvider {
    provider: Provider,
    identity: ExternalIdentity,
    should_succeed: bool,
}

impl MockIdentityProvider {
    /// Create a mock that succeeds with a canned identity.
    #[must_use]
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            identity: Self::default_identity(provider),
            should_succeed: true,
        }
    }

    /// Create a mock whose `exchange_code` always fails.
    #[must_use]
    pub fn failing(provider: Provider) -> Self {
        Self {
            should_succeed: false,
            ..Self::new(provider)
        }
    }

    /// Replace the identity returned by `exchange_code`.
    #[must_use]
    pub fn with_identity(mut self, identity: ExternalIdentity) -> Self {
        self.identity = identity;
        self
    }

    fn default_identity(provider: Provider) -> ExternalIdentity {
        ExternalIdentity {
            provider,
            external_id: format!("{provider}-user-123"),
            email: "test@example.com".to_string(),
            name: Some("Test User".to_string()),
            avatar_url: Some("https://example.com/avatar.jpg".to_string()),
            organizations: match provider {
                Provider::Google => None,
                Provider::GitHub => Some(Vec::new()),
            },
        }
    }
}

impl IdentityProvider for MockIdentityProvider {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn create_auth_url(&self, redirect_uri: &str) -> impl Future<Output = Result<String>> + Send {
        let provider = self.provider;
        let redirect_uri = redirect_uri.to_string();

        async move {
            Ok(format!(
                "https://{provider}.test/oauth/authorize?redirect_uri={redirect_uri}"
            ))
        }
    }

    fn exchange_code(
        &self,
        _code: &str,
        _redirect_uri: &str,
    ) -> impl Future<Output = Result<ExternalIdentity>> + Send {
        let provider = self.provider;
        let identity = self.identity.clone();
        let should_succeed = self.should_succeed;

        async move {
            if !should_succeed {
                return Err(AuthError::Provider {
                    provider,
                    reason: "mock exchange failure".to_string(),
                });
            }
            Ok(identity)
        }
    }
}
