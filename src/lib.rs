//! # Wiki Auth
//!
//! Session-mediated login and registration core for a team wiki:
//! external identities (Google, GitHub) and local email/password
//! credentials resolve onto one local account model, with all
//! intermediate state carried in a typed per-session value.
//!
//! ## Features
//!
//! - **Two-hop OAuth flow**: static callback URLs bounce the
//!   authorization code through session state back into the login route
//! - **Account resolution**: external id lookup, registration with
//!   collected validation, idempotent identity linking
//! - **Policy gates**: registration modes (Open/Restricted/Closed),
//!   email allow-list, GitHub organization allow-list, password-auth
//!   toggles
//! - **Testable**: every collaborator is a trait with an in-memory mock
//!   behind the `test-utils` feature
//!
//! ## Architecture
//!
//! ```text
//! Route handler → LoginOrchestrator → Flow (redirect + flashes)
//!                      │
//!                      ├─ IdentityProvider (Google, GitHub)
//!                      ├─ AccountResolver → AccountStore
//!                      ├─ ConfigHandle (mirrored feature flags)
//!                      ├─ AdminNotifier (spawned, best-effort)
//!                      └─ AvatarStore   (spawned, best-effort)
//! ```
//!
//! ## Example: provider login
//!
//! ```rust,ignore
//! use wiki_auth::*;
//!
//! // 1. GET /login/google: no stored code, so the flow starts.
//! let flow = orchestrator
//!     .login_with_provider(&mut session, Provider::Google)
//!     .await;
//! // flow.redirect is the provider's consent URL
//!
//! // 2. GET /oauth2callback/google?code=...: first hop of the bounce.
//! let flow = orchestrator.provider_callback(&mut session, Provider::Google, code);
//!
//! // 3. GET /login/google again: the stored code is exchanged and the
//! //    account resolved.
//! let flow = orchestrator
//!     .login_with_provider(&mut session, Provider::Google)
//!     .await;
//! assert!(session.user.is_some());
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod account;
pub mod config;
pub mod constants;
pub mod error;
pub mod orchestrator;
pub mod password;
pub mod providers;
pub mod state;

/// In-memory mocks for every collaborator trait.
#[cfg(feature = "test-utils")]
pub mod mocks;

// Re-export main types for convenience
pub use account::{AccountResolver, AccountStatus, AccountStore, LocalAccount, Registerability};
pub use config::{CORE_NAMESPACE, ConfigCache, ConfigHandle, ConfigRow, ConfigStore, RegistrationMode};
pub use error::{AuthError, Result};
pub use orchestrator::{
    LoginOrchestrator, RegisterView, RegistrationForm, RegistrationPrefill, login_error_message,
};
pub use providers::{
    AdminNotifier, AvatarStore, GitHubIdentityProvider, GoogleIdentityProvider, IdentityProvider,
};
pub use state::{
    AccountId, AuthenticatedUser, ExternalIdentity, Flash, FlashKind, Flow, PendingAuth, Provider,
    SessionState,
};
