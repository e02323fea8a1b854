//! External collaborators behind traits.
//!
//! The orchestrator depends on these interfaces, not on concrete
//! services, so the whole login/registration flow runs at memory speed
//! under test:
//!
//! - [`IdentityProvider`]: one third-party OAuth-style provider
//! - [`AdminNotifier`]: admin fan-out for approval-required registrations
//! - [`AvatarStore`]: best-effort storage for imported profile pictures
//!
//! Concrete adapters for Google and GitHub live in this module; storage
//! and mail backends are supplied by the application.

use crate::error::Result;
use crate::state::{AccountId, ExternalIdentity, Provider};
use std::future::Future;

pub mod github;
pub mod google;

pub use github::GitHubIdentityProvider;
pub use google::GoogleIdentityProvider;

/// One third-party identity provider (Google, GitHub).
///
/// `create_auth_url` is pure URL construction and safe to retry;
/// `exchange_code` performs the network round trip and is single-use per
/// code (enforced by the provider, not this adapter).
pub trait IdentityProvider: Send + Sync {
    /// Which provider this adapter serves.
    fn provider(&self) -> Provider;

    /// Build the authorization redirect URL.
    ///
    /// # Errors
    ///
    /// Returns an error if URL construction fails.
    fn create_auth_url(&self, redirect_uri: &str) -> impl Future<Output = Result<String>> + Send;

    /// Exchange an authorization code for the user's profile.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Provider`](crate::AuthError::Provider) on an
    /// invalid or expired code, a network failure, or a malformed
    /// response.
    fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> impl Future<Output = Result<ExternalIdentity>> + Send;
}

/// Admin notification channel.
///
/// Used when registration mode is `Restricted`: newly created accounts
/// wait for approval and every admin gets a heads-up. Delivery is
/// fire-and-forget: failures are logged by the caller, never propagated
/// into the registration response.
pub trait AdminNotifier: Send + Sync {
    /// Tell one admin that `created_username` is waiting for activation.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails; the orchestrator logs and
    /// discards it.
    fn notify_registration_pending(
        &self,
        admin_email: &str,
        created_username: &str,
        app_title: &str,
        app_url: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Storage for imported avatars.
///
/// Avatar import is best-effort: the orchestrator downloads the provider
/// avatar in a background task and swallows every failure on this path.
pub trait AvatarStore: Send + Sync {
    /// Store one avatar image, returning its public URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    fn store_avatar(
        &self,
        account_id: AccountId,
        content_type: &str,
        bytes: &[u8],
    ) -> impl Future<Output = Result<String>> + Send;
}
