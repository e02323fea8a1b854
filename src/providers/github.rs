//! GitHub OAuth identity adapter.
//!
//! Besides the profile, this adapter lists the user's organization
//! memberships; the resolver checks them against the configured
//! organization allow-list.

use crate::error::{AuthError, Result};
use crate::providers::IdentityProvider;
use crate::state::{ExternalIdentity, Provider};
use reqwest::Client;
use serde::Deserialize;

const AUTHORIZATION_ENDPOINT: &str = "https://github.com/login/oauth/authorize";
const TOKEN_ENDPOINT: &str = "https://github.com/login/oauth/access_token";
const USER_ENDPOINT: &str = "https://api.github.com/user";
const EMAILS_ENDPOINT: &str = "https://api.github.com/user/emails";
const ORGS_ENDPOINT: &str = "https://api.github.com/user/orgs";

/// User agent sent to the GitHub API (required by GitHub).
const USER_AGENT: &str = concat!("wiki-auth/", env!("CARGO_PKG_VERSION"));

/// GitHub OAuth identity provider.
///
/// # Configuration
///
/// Create an OAuth App in GitHub developer settings and register the
/// wiki's fixed callback path (`/oauth2callback/github`) as the
/// authorization callback URL. The `user:email` and `read:org` scopes
/// are requested so the primary email and organization memberships are
/// visible.
#[derive(Clone, Debug)]
pub struct GitHubIdentityProvider {
    /// OAuth client ID.
    client_id: String,

    /// OAuth client secret (keep confidential).
    client_secret: String,

    /// HTTP client for making requests.
    http_client: Client,

    /// Scopes to request (default: "user:email read:org").
    scopes: Vec<String>,
}

impl GitHubIdentityProvider {
    /// Create a new GitHub identity provider.
    #[must_use]
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            http_client: Client::new(),
            scopes: vec!["user:email".to_string(), "read:org".to_string()],
        }
    }

    /// Set custom scopes.
    ///
    /// Default scopes are: `user:email read:org`
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    fn provider_error(reason: impl Into<String>) -> AuthError {
        AuthError::Provider {
            provider: Provider::GitHub,
            reason: reason.into(),
        }
    }

    async fn api_get<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| Self::provider_error(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!("GitHub API request to {url} failed ({status}): {error_body}");
            return Err(Self::provider_error(format!("API request failed: {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| Self::provider_error(e.to_string()))
    }

    /// Primary, verified email; the profile email may be hidden.
    async fn primary_email(&self, access_token: &str) -> Result<String> {
        let emails: Vec<GitHubEmail> = self.api_get(EMAILS_ENDPOINT, access_token).await?;
        emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email)
            .ok_or_else(|| Self::provider_error("no verified primary email"))
    }

    async fn organizations(&self, access_token: &str) -> Result<Vec<String>> {
        let orgs: Vec<GitHubOrg> = self.api_get(ORGS_ENDPOINT, access_token).await?;
        Ok(orgs.into_iter().map(|o| o.login).collect())
    }
}

impl IdentityProvider for GitHubIdentityProvider {
    fn provider(&self) -> Provider {
        Provider::GitHub
    }

    async fn create_auth_url(&self, redirect_uri: &str) -> Result<String> {
        let scope = self.scopes.join(" ");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
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
        ];

        let response = self
            .http_client
            .post(TOKEN_ENDPOINT)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| Self::provider_error(e.to_string()))?;

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!("GitHub token exchange failed: {}", error_body);
            return Err(Self::provider_error("token exchange failed"));
        }

        let token: GitHubTokenResponse = response
            .json()
            .await
            .map_err(|e| Self::provider_error(e.to_string()))?;

        // GitHub reports OAuth errors with HTTP 200 and an error body.
        let access_token = token
            .access_token
            .ok_or_else(|| Self::provider_error(token.error.unwrap_or_else(|| {
                "token exchange returned no access token".to_string()
            })))?;

        let user: GitHubUser = self.api_get(USER_ENDPOINT, &access_token).await?;

        let email = match user.email {
            Some(email) if !email.is_empty() => email,
            _ => self.primary_email(&access_token).await?,
        };

        let organizations = self.organizations(&access_token).await?;

        Ok(ExternalIdentity {
            provider: Provider::GitHub,
            external_id: user.id.to_string(),
            email,
            name: user.name.or(Some(user.login)),
            avatar_url: user.avatar_url,
            organizations: Some(organizations),
        })
    }
}

/// GitHub's token endpoint response format.
#[derive(Debug, Deserialize)]
struct GitHubTokenResponse {
    /// Access token for API requests (absent on error responses).
    access_token: Option<String>,

    /// Error code when the exchange is rejected.
    error: Option<String>,
}

/// GitHub's user endpoint response format.
#[derive(Debug, Deserialize)]
struct GitHubUser {
    /// Numeric user ID (stable, unique identifier).
    id: u64,

    /// Login handle.
    login: String,

    /// Full name, if set on the profile.
    name: Option<String>,

    /// Public email, if set on the profile.
    email: Option<String>,

    /// Avatar URL.
    avatar_url: Option<String>,
}

/// One entry from the user emails endpoint.
#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// One entry from the user organizations endpoint.
#[derive(Debug, Deserialize)]
struct GitHubOrg {
    login: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_provider() -> GitHubIdentityProvider {
        GitHubIdentityProvider::new("test_client_id".to_string(), "test_secret".to_string())
    }

    #[test]
    fn test_provider_kind() {
        assert_eq!(test_provider().provider(), Provider::GitHub);
    }

    #[tokio::test]
    async fn test_authorization_url() {
        let url = test_provider()
            .create_auth_url("http://localhost:3000/oauth2callback/github")
            .await
            .unwrap();

        assert!(url.starts_with(AUTHORIZATION_ENDPOINT));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains("scope=user%3Aemail+read%3Aorg"));
    }

    #[test]
    fn test_token_error_body_parses() {
        let body = r#"{"error":"bad_verification_code","error_description":"..."}"#;
        let token: GitHubTokenResponse = serde_json::from_str(body).unwrap();
        assert!(token.access_token.is_none());
        assert_eq!(token.error.as_deref(), Some("bad_verification_code"));
    }
}
