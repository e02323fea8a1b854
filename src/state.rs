//! Session-scoped state for the login and registration flows.
//!
//! Everything a login attempt carries across redirects lives in one
//! typed [`SessionState`] value: one [`PendingAuth`] slot per provider,
//! an optional [`AuthenticatedUser`], and the deferred destination
//! captured before the login detour began.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a local account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub Uuid);

impl AccountId {
    /// Generate a new random `AccountId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

/// External identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    /// Google OAuth 2.0.
    Google,
    /// GitHub OAuth.
    GitHub,
}

impl Provider {
    /// Provider name as used in session keys and account columns.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::GitHub => "github",
        }
    }

    /// Human-readable issuer name for the registration form.
    #[must_use]
    pub const fn issuer_name(self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::GitHub => "GitHub",
        }
    }

    /// Parse a provider from its route segment.
    ///
    /// # Errors
    ///
    /// Returns the unrecognized input back as the error value.
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "github" => Ok(Self::GitHub),
            other => Err(other.to_string()),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile data resolved from an identity provider.
///
/// Ephemeral: exists for the duration of one login attempt and is never
/// persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    /// Which provider issued this identity.
    pub provider: Provider,

    /// Stable user id at the provider.
    pub external_id: String,

    /// Email address reported by the provider.
    pub email: String,

    /// Display name, if the provider reports one.
    pub name: Option<String>,

    /// Avatar URL, if the provider reports one.
    pub avatar_url: Option<String>,

    /// Organization memberships (GitHub only).
    pub organizations: Option<Vec<String>>,
}

/// Per-provider state carried across the redirect round trip.
///
/// Lifecycle: created empty when a login attempt starts, populated by the
/// callback handler, consumed and cleared by the orchestrator on success
/// or failure. Abandoned state dies with the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuth {
    /// Authorization code stored by the callback handler.
    pub auth_code: Option<String>,

    /// Route the callback should bounce back to.
    pub callback_action: Option<String>,

    /// Profile fields recorded before registration.
    pub profile: Option<ExternalIdentity>,
}

impl PendingAuth {
    /// Returns `true` if no attempt state is held.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.auth_code.is_none() && self.callback_action.is_none() && self.profile.is_none()
    }
}

/// The session's authenticated-user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Account id.
    pub account_id: AccountId,

    /// Username.
    pub username: String,

    /// Email address.
    pub email: String,

    /// Display name.
    pub name: String,
}

/// Typed session state for one cookie-identified session.
///
/// Exclusively owned by the active session; never shared across sessions,
/// so no locking is needed. A session racing itself is last-writer-wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Authenticated user, once login completes.
    pub user: Option<AuthenticatedUser>,

    /// Pending-auth slot for Google.
    google: PendingAuth,

    /// Pending-auth slot for GitHub.
    github: PendingAuth,

    /// Deferred destination captured before the login detour began.
    jump_to: Option<String>,
}

impl SessionState {
    /// Create an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, provider: Provider) -> &PendingAuth {
        match provider {
            Provider::Google => &self.google,
            Provider::GitHub => &self.github,
        }
    }

    fn slot_mut(&mut self, provider: Provider) -> &mut PendingAuth {
        match provider {
            Provider::Google => &mut self.google,
            Provider::GitHub => &mut self.github,
        }
    }

    /// Start a login attempt: clear any prior state for `provider` and
    /// record the intended post-callback destination.
    pub fn begin_attempt(&mut self, provider: Provider, callback_action: impl Into<String>) {
        *self.slot_mut(provider) = PendingAuth {
            callback_action: Some(callback_action.into()),
            ..PendingAuth::default()
        };
    }

    /// Store the authorization code after the provider redirects back.
    pub fn record_code(&mut self, provider: Provider, code: impl Into<String>) {
        self.slot_mut(provider).auth_code = Some(code.into());
    }

    /// Store resolved profile data ahead of registration.
    pub fn record_profile(&mut self, identity: ExternalIdentity) {
        let provider = identity.provider;
        self.slot_mut(provider).profile = Some(identity);
    }

    /// Peek at the stored callback destination without consuming it.
    #[must_use]
    pub fn callback_action(&self, provider: Provider) -> Option<&str> {
        self.slot(provider).callback_action.as_deref()
    }

    /// Take the pending state for `provider` and clear the slot.
    ///
    /// Absence is a valid empty state: consuming a never-started attempt
    /// returns `PendingAuth::default()`.
    pub fn consume(&mut self, provider: Provider) -> PendingAuth {
        std::mem::take(self.slot_mut(provider))
    }

    /// Profile recorded for registration, from whichever provider holds one.
    #[must_use]
    pub fn pending_identity(&self) -> Option<&ExternalIdentity> {
        self.google.profile.as_ref().or(self.github.profile.as_ref())
    }

    /// Wipe pending-auth state for every provider.
    ///
    /// Used on login success or failure so stale attempt state cannot be
    /// reused, and so profile data does not outlive its one attempt.
    pub fn clear_all(&mut self) {
        self.google = PendingAuth::default();
        self.github = PendingAuth::default();
    }

    /// Record the page the user was trying to reach before login.
    pub fn set_jump_to(&mut self, destination: impl Into<String>) {
        self.jump_to = Some(destination.into());
    }

    /// Take the deferred destination, clearing it.
    pub fn take_jump_to(&mut self) -> Option<String> {
        self.jump_to.take()
    }

    /// Establish the authenticated-user record.
    pub fn sign_in(&mut self, user: AuthenticatedUser) {
        self.user = Some(user);
    }

    /// Drop the authenticated-user record and all pending state.
    pub fn sign_out(&mut self) {
        self.user = None;
        self.clear_all();
        self.jump_to = None;
    }
}

/// Kind of flashed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashKind {
    /// Generic warning shown on the login page.
    Warning,
    /// Warning shown on the registration form.
    RegisterWarning,
}

/// A message flashed to the user on the next page render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    /// Where the message is rendered.
    pub kind: FlashKind,
    /// Message text.
    pub message: String,
}

/// Outcome of an orchestrator transition: a redirect plus any flashed
/// messages. Every failure in this core resolves to one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    /// Redirect target.
    pub redirect: String,
    /// Messages to flash before redirecting.
    pub flashes: Vec<Flash>,
}

impl Flow {
    /// Plain redirect with no messages.
    #[must_use]
    pub fn to(redirect: impl Into<String>) -> Self {
        Self {
            redirect: redirect.into(),
            flashes: Vec::new(),
        }
    }

    /// Redirect with a single login-page warning.
    #[must_use]
    pub fn warn(redirect: impl Into<String>, message: impl Into<String>) -> Self {
        Self::to(redirect).with_flash(FlashKind::Warning, message)
    }

    /// Append a flashed message.
    #[must_use]
    pub fn with_flash(mut self, kind: FlashKind, message: impl Into<String>) -> Self {
        self.flashes.push(Flash {
            kind,
            message: message.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn google_identity() -> ExternalIdentity {
        ExternalIdentity {
            provider: Provider::Google,
            external_id: "110169484474386276334".to_string(),
            email: "user@example.com".to_string(),
            name: Some("Example User".to_string()),
            avatar_url: None,
            organizations: None,
        }
    }

    #[test]
    fn test_provider_parse_roundtrip() {
        assert_eq!(Provider::parse("google"), Ok(Provider::Google));
        assert_eq!(Provider::parse("GitHub"), Ok(Provider::GitHub));
        assert!(Provider::parse("twitter").is_err());
    }

    #[test]
    fn test_begin_attempt_clears_prior_state() {
        let mut session = SessionState::new();
        session.record_code(Provider::Google, "stale_code");

        session.begin_attempt(Provider::Google, "/login/google");

        let pending = session.consume(Provider::Google);
        assert_eq!(pending.auth_code, None);
        assert_eq!(pending.callback_action.as_deref(), Some("/login/google"));
    }

    #[test]
    fn test_consume_clears_and_absence_is_empty() {
        let mut session = SessionState::new();
        session.record_code(Provider::Google, "code_123");

        let first = session.consume(Provider::Google);
        assert_eq!(first.auth_code.as_deref(), Some("code_123"));

        // Second consume sees the empty state, not an error.
        let second = session.consume(Provider::Google);
        assert!(second.is_empty());
    }

    #[test]
    fn test_provider_slots_are_isolated() {
        let mut session = SessionState::new();
        session.record_code(Provider::Google, "google_code");
        session.begin_attempt(Provider::GitHub, "/login/github");

        // GitHub operations must not touch the Google slot.
        assert_eq!(
            session.consume(Provider::Google).auth_code.as_deref(),
            Some("google_code")
        );
        assert_eq!(
            session.callback_action(Provider::GitHub),
            Some("/login/github")
        );
    }

    #[test]
    fn test_clear_all_wipes_every_slot() {
        let mut session = SessionState::new();
        session.record_code(Provider::Google, "a");
        session.record_code(Provider::GitHub, "b");
        session.record_profile(google_identity());

        session.clear_all();

        assert!(session.consume(Provider::Google).is_empty());
        assert!(session.consume(Provider::GitHub).is_empty());
        assert!(session.pending_identity().is_none());
    }

    #[test]
    fn test_jump_to_taken_once() {
        let mut session = SessionState::new();
        session.set_jump_to("/pages/42");

        assert_eq!(session.take_jump_to().as_deref(), Some("/pages/42"));
        assert_eq!(session.take_jump_to(), None);
    }

    #[test]
    fn test_pending_identity_prefers_whichever_is_set() {
        let mut session = SessionState::new();
        assert!(session.pending_identity().is_none());

        session.record_profile(google_identity());
        assert_eq!(
            session.pending_identity().map(|i| i.provider),
            Some(Provider::Google)
        );
    }
}
