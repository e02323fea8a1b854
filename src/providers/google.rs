//! Google OAuth 2.0 identity adapter.

use crate::error::{AuthError, Result};
use crate::providers::IdentityProvider;
use crate::state::{ExternalIdentity, Provider};
use reqwest::Client;
use serde::Deserialize;

const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Google OAuth 2.0 identity provider.
///
/// # Configuration
///
/// Create OAuth 2.0 credentials in Google Cloud Console and register the
/// wiki's fixed callback path (`/oauth2callback/google`) as an authorized
/// redirect URI.
#[derive(Clone, Debug)]
pub struct GoogleIdentityProvider {
    /// OAuth 2.0 client ID.
    client_id: String,

    /// OAuth 2.0 client secret (keep confidential).
    client_secret: String,

    /// HTTP client for making requests.
    http_client: Client,

    /// Scopes to request (default: "openid email profile").
    scopes: Vec<String>,
}

impl GoogleIdentityProvider {
    /// Create a new Google identity provider.
    #[must_use]
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            http_client: Client::new(),
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
        }
    }

    /// Set custom scopes.
    ///
    /// Default scopes are: `openid email profile`
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    fn provider_error(reason: impl Into<String>) -> AuthError {
        AuthError::Provider {
            provider: Provider::Google,
            reason: reason.into(),
        }
    }
}

impl IdentityProvider for GoogleIdentityProvider {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn create_auth_url(&self, redirect_uri: &str) -> Result<String> {
        let scope = self.scopes.join(" ");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope.as_str()),
        ];

        let query = serde_urlencoded::to_string(params)
            .map_err(|e| Self::provider_error(format!("failed to build URL: {e}")))?;

        Ok(format!("{AUTHORIZATION_ENDPOINT}?{query}"))
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<ExternalIdentity> {
        let params = [
            ("code", code),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http_client
            .post(TOKEN_ENDPOINT)
            .form(&params)
            .send()
            .await
            .map_err(|e| Self::provider_error(e.to_string()))?;

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!("Google token exchange failed: {}", error_body);
            return Err(Self::provider_error("token exchange failed"));
        }

        let token: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| Self::provider_error(e.to_string()))?;

        let response = self
            .http_client
            .get(USERINFO_ENDPOINT)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| Self::provider_error(e.to_string()))?;

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!("Google UserInfo request failed: {}", error_body);
            return Err(Self::provider_error("userinfo fetch failed"));
        }

        let user: GoogleUserInfo = response
            .json()
            .await
            .map_err(|e| Self::provider_error(e.to_string()))?;

        if !user.email_verified {
            tracing::warn!("Google user email not verified: {}", user.email);
            return Err(Self::provider_error("email not verified"));
        }

        Ok(ExternalIdentity {
            provider: Provider::Google,
            external_id: user.sub,
            email: user.email,
            name: user.name,
            avatar_url: user.picture,
            organizations: None,
        })
    }
}

/// Google's token endpoint response format.
#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    /// Access token for the UserInfo request.
    access_token: String,
}

/// Google's UserInfo endpoint response format.
#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    /// Google user ID (stable, unique identifier).
    sub: String,

    /// Full name.
    name: Option<String>,

    /// Profile picture URL.
    picture: Option<String>,

    /// Email address.
    email: String,

    /// Whether email is verified by Google.
    #[serde(default)]
    email_verified: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_provider() -> GoogleIdentityProvider {
        GoogleIdentityProvider::new("test_client_id".to_string(), "test_secret".to_string())
    }

    #[test]
    fn test_provider_kind() {
        assert_eq!(test_provider().provider(), Provider::Google);
    }

    #[test]
    fn test_custom_scopes() {
        let google =
            test_provider().with_scopes(vec!["openid".to_string(), "email".to_string()]);
        assert_eq!(google.scopes, vec!["openid", "email"]);
    }

    #[tokio::test]
    async fn test_authorization_url() {
        let url = test_provider()
            .create_auth_url("http://localhost:3000/oauth2callback/google")
            .await
            .unwrap();

        assert!(url.starts_with(AUTHORIZATION_ENDPOINT));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Foauth2callback%2Fgoogle"
        ));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=openid+email+profile"));
    }
}
