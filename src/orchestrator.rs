//! The login/registration state machine.
//!
//! States: `Anonymous -> AwaitingProviderRedirect -> AwaitingCallback ->
//! Resolving -> {Authenticated, NeedsRegistration, Failed}`, with
//! `NeedsRegistration -> Authenticated` via the registration path.
//!
//! The provider-registered callback URL is static, so it cannot carry
//! per-attempt state. The flow therefore makes two hops: the callback
//! handler only records the authorization code in session state and
//! bounces back to the login route, which re-enters with a known code.
//! `Resolving` may only start from a code already held in session state;
//! that guard is the invariant behind the two-hop design.
//!
//! Every transition resolves to a [`Flow`]: a redirect plus flashed
//! messages. Nothing here is fatal to the process.

use crate::account::{AccountResolver, AccountStatus, AccountStore, LocalAccount};
use crate::config::{ConfigCache, ConfigHandle, RegistrationMode};
use crate::constants::{locales, messages, routes};
use crate::error::{AuthError, Result};
use crate::providers::{AdminNotifier, AvatarStore, IdentityProvider};
use crate::state::{
    AccountId, AuthenticatedUser, ExternalIdentity, FlashKind, Flow, Provider, SessionState,
};

/// Submitted registration form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    /// Display name.
    pub name: String,
    /// Desired username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Password; absent when registering through an external identity.
    pub password: Option<String>,
    /// Preferred locale; defaults to `en-US`.
    pub locale: Option<String>,
}

/// Prefill data for the registration form, taken from the pending
/// external identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationPrefill {
    /// Provider the identity came from.
    pub provider: Provider,
    /// Human-readable issuer name ("Google", "GitHub").
    pub issuer_name: &'static str,
    /// Stable user id at the provider.
    pub external_id: String,
    /// Email reported by the provider.
    pub email: String,
    /// Display name reported by the provider.
    pub name: Option<String>,
    /// Avatar URL reported by the provider.
    pub avatar_url: Option<String>,
}

/// What the registration page should do on GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterView {
    /// Render the form, prefilled when a pending identity exists.
    Form(Option<RegistrationPrefill>),
    /// Do not render; follow the redirect instead.
    Redirect(Flow),
}

/// Message for a login error page reason, if the reason is known.
///
/// Reasons are the path segments of `/login/error/:reason`.
#[must_use]
pub fn login_error_message(reason: &str) -> Option<&'static str> {
    match reason {
        "suspended" => Some(messages::ACCOUNT_SUSPENDED),
        "registered" => Some(messages::AWAITING_APPROVAL),
        _ => None,
    }
}

/// Sequences adapter calls, session updates, resolver lookups, and final
/// session establishment for the whole login/registration flow.
///
/// Generic over its collaborators so tests run against the in-memory
/// mocks; the config mirror is handed in explicitly at construction
/// time.
#[derive(Debug, Clone)]
pub struct LoginOrchestrator<G, H, A, N, V> {
    google: G,
    github: H,
    resolver: AccountResolver<A>,
    notifier: N,
    avatars: V,
    config: ConfigHandle,
    base_url: String,
    http_client: reqwest::Client,
}

impl<G, H, A, N, V> LoginOrchestrator<G, H, A, N, V>
where
    G: IdentityProvider,
    H: IdentityProvider,
    A: AccountStore + Clone + 'static,
    N: AdminNotifier + Clone + 'static,
    V: AvatarStore + Clone + 'static,
{
    /// Create an orchestrator.
    ///
    /// `base_url` is the externally visible origin the fixed callback
    /// paths are registered under (e.g. `https://wiki.example.com`).
    #[must_use]
    pub fn new(
        google: G,
        github: H,
        resolver: AccountResolver<A>,
        notifier: N,
        avatars: V,
        config: ConfigHandle,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            google,
            github,
            resolver,
            notifier,
            avatars,
            config,
            base_url: base_url.into(),
            http_client: reqwest::Client::new(),
        }
    }

    fn callback_uri(&self, provider: Provider) -> String {
        let path = match provider {
            Provider::Google => routes::CALLBACK_GOOGLE,
            Provider::GitHub => routes::CALLBACK_GITHUB,
        };
        format!("{}{}", self.base_url, path)
    }

    const fn login_route(provider: Provider) -> &'static str {
        match provider {
            Provider::Google => routes::LOGIN_GOOGLE,
            Provider::GitHub => routes::LOGIN_GITHUB,
        }
    }

    /// `Failed`: clear all pending state, flash one generic warning,
    /// return to the login entry point. Terminal for the attempt.
    fn fail(&self, session: &mut SessionState) -> Flow {
        session.clear_all();
        Flow::warn(routes::LOGIN, messages::SIGN_IN_FAILURE)
    }

    /// `Authenticated`: establish the session's user record, clear
    /// pending state, and pick the landing redirect.
    ///
    /// Accounts with no local credential are sent to password setup
    /// unconditionally; that rule takes precedence over any deferred
    /// destination.
    fn finish_login(&self, session: &mut SessionState, account: &LocalAccount) -> Flow {
        if account.status == AccountStatus::Suspended {
            session.clear_all();
            return Flow::to(routes::LOGIN_ERROR_SUSPENDED);
        }

        session.sign_in(AuthenticatedUser::from(account));
        session.clear_all();
        tracing::debug!(username = %account.username, "login established");

        // Invited accounts must finish activation before anything else.
        if account.status == AccountStatus::Invited {
            return Flow::to(routes::INVITED);
        }
        if !account.has_password() {
            return Flow::to(routes::PASSWORD_SETUP);
        }

        match session.take_jump_to() {
            Some(destination) => Flow::to(destination),
            None => Flow::to(routes::ROOT),
        }
    }

    /// Entry point for `GET /login/google` and `GET /login/github`.
    ///
    /// With no stored code this starts an attempt and redirects to the
    /// provider (`AwaitingProviderRedirect`). With a stored code (the
    /// second hop of the callback bounce) it exchanges the code and
    /// resolves the account (`Resolving`).
    pub async fn login_with_provider(
        &self,
        session: &mut SessionState,
        provider: Provider,
    ) -> Flow {
        match provider {
            Provider::Google => self.login_via(&self.google, session).await,
            Provider::GitHub => self.login_via(&self.github, session).await,
        }
    }

    async fn login_via<P: IdentityProvider>(
        &self,
        adapter: &P,
        session: &mut SessionState,
    ) -> Flow {
        let provider = adapter.provider();
        let pending = session.consume(provider);

        let Some(code) = pending.auth_code.filter(|c| !c.is_empty()) else {
            // No code yet: start (or restart) the attempt.
            session.begin_attempt(provider, Self::login_route(provider));
            return match adapter.create_auth_url(&self.callback_uri(provider)).await {
                Ok(url) => Flow::to(url),
                Err(err) => {
                    tracing::error!(error = %err, %provider, "could not build authorization URL");
                    self.fail(session)
                }
            };
        };

        tracing::debug!(%provider, "exchanging stored authorization code");
        match adapter.exchange_code(&code, &self.callback_uri(provider)).await {
            Ok(identity) => self.resolve(session, identity).await,
            Err(err) => {
                // No automatic retry: the user restarts the flow.
                tracing::warn!(error = %err, %provider, "authorization code exchange failed");
                self.fail(session)
            }
        }
    }

    /// `Resolving`: map a verified external identity onto a local
    /// account, or carry the profile into `NeedsRegistration`.
    async fn resolve(&self, session: &mut SessionState, identity: ExternalIdentity) -> Flow {
        if let Some(organizations) = &identity.organizations {
            match self.resolver.validate_organization_membership(organizations) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(
                        provider = %identity.provider,
                        "organization membership outside the allow-list"
                    );
                    return self.fail(session);
                }
                Err(err) => {
                    tracing::error!(error = %err, "organization policy unavailable");
                    return self.fail(session);
                }
            }
        }

        let found = self
            .resolver
            .find_by_external_id(identity.provider, &identity.external_id)
            .await;
        match found {
            Ok(Some(account)) => self.finish_login(session, &account),
            Ok(None) => {
                // NeedsRegistration: only the fresh profile survives.
                session.clear_all();
                session.record_profile(identity);
                Flow::to(routes::REGISTER)
            }
            Err(err) => {
                tracing::error!(error = %err, "external-id lookup failed");
                self.fail(session)
            }
        }
    }

    /// The statically registered callback endpoint.
    ///
    /// First hop of the bounce: records the code (if consent was given)
    /// and redirects to the stored post-callback destination, where the
    /// flow re-enters with the code in session state.
    pub fn provider_callback(
        &self,
        session: &mut SessionState,
        provider: Provider,
        code: Option<String>,
    ) -> Flow {
        let next = session
            .callback_action(provider)
            .map_or_else(|| routes::LOGIN.to_string(), str::to_string);

        if let Some(code) = code.filter(|c| !c.is_empty()) {
            session.record_code(provider, code);
        }

        Flow::to(next)
    }

    /// Local password path: direct `Anonymous -> Resolving`.
    ///
    /// Rejected before any credential comparison when password auth is
    /// disabled or third-party auth is required. Every mismatch,
    /// including a non-existent email, produces the same generic
    /// failure.
    pub async fn login_with_password(
        &self,
        session: &mut SessionState,
        email: &str,
        password: &str,
    ) -> Flow {
        let cfg = match self.config.snapshot() {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::error!(error = %err, "config mirror unavailable");
                return self.fail(session);
            }
        };
        if cfg.password_auth_disabled() || cfg.require_third_party_auth() {
            return self.fail(session);
        }

        match self.resolver.find_by_credentials(email, password).await {
            Ok(Some(account)) => self.finish_login(session, &account),
            Ok(None) => self.fail(session),
            Err(err) => {
                tracing::warn!(error = %err, "credential lookup failed");
                self.fail(session)
            }
        }
    }

    /// `GET /register`: decide whether the form renders, and with what
    /// prefill.
    #[must_use]
    pub fn registration_view(&self, session: &SessionState) -> RegisterView {
        let cfg = match self.config.snapshot() {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::error!(error = %err, "config mirror unavailable");
                return RegisterView::Redirect(Flow::to(routes::LOGIN));
            }
        };
        if session.user.is_some() || cfg.registration_mode() == RegistrationMode::Closed {
            return RegisterView::Redirect(Flow::to(routes::ROOT));
        }

        let Some(identity) = session.pending_identity() else {
            return RegisterView::Form(None);
        };

        if !self.resolver.validate_email(&identity.email).unwrap_or(false) {
            return RegisterView::Redirect(
                Flow::to(routes::LOGIN_REGISTER)
                    .with_flash(FlashKind::RegisterWarning, messages::EMAIL_NOT_ALLOWED),
            );
        }
        if let Some(organizations) = &identity.organizations {
            if !self
                .resolver
                .validate_organization_membership(organizations)
                .unwrap_or(false)
            {
                return RegisterView::Redirect(
                    Flow::to(routes::LOGIN_REGISTER).with_flash(
                        FlashKind::RegisterWarning,
                        messages::ORGANIZATION_NOT_ALLOWED,
                    ),
                );
            }
        }

        RegisterView::Form(Some(RegistrationPrefill {
            provider: identity.provider,
            issuer_name: identity.provider.issuer_name(),
            external_id: identity.external_id.clone(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            avatar_url: identity.avatar_url.clone(),
        }))
    }

    /// `POST /register`: `NeedsRegistration -> Authenticated | Failed`,
    /// or a cold registration with email and password.
    ///
    /// Validation failures collect every applicable message before
    /// redirecting back to the form. With registration mode `Closed` the
    /// transition is disabled entirely: valid data still redirects to
    /// the landing route with no error and no account.
    pub async fn register(&self, session: &mut SessionState, form: RegistrationForm) -> Flow {
        let cfg = match self.config.snapshot() {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::error!(error = %err, "config mirror unavailable");
                return self.fail(session);
            }
        };
        if session.user.is_some() || cfg.registration_mode() == RegistrationMode::Closed {
            return Flow::to(routes::ROOT);
        }

        let identity = session.pending_identity().cloned();
        let problems = match self.collect_problems(&cfg, &form, identity.as_ref()).await {
            Ok(problems) => problems,
            Err(err) => {
                tracing::error!(error = %err, "registration checks unavailable");
                return Flow::to(routes::REGISTER)
                    .with_flash(FlashKind::RegisterWarning, messages::REGISTRATION_FAILED);
            }
        };
        if !problems.is_empty() {
            let mut flow = Flow::to(routes::REGISTER);
            for problem in problems {
                flow = flow.with_flash(FlashKind::RegisterWarning, problem);
            }
            return flow;
        }

        let locale = form.locale.as_deref().unwrap_or(locales::EN_US);
        let created = self
            .resolver
            .create_account(
                &form.name,
                &form.username,
                &form.email,
                form.password.as_deref(),
                locale,
            )
            .await;

        let account = match created {
            Ok(account) => account,
            Err(err) => {
                // A racing registration may have won the unique index
                // after our pre-check passed.
                tracing::debug!(error = %err, "account insert rejected");
                let mut flow = Flow::to(routes::REGISTER);
                match err.into_validation() {
                    AuthError::Validation(problems) => {
                        for problem in problems {
                            flow = flow.with_flash(FlashKind::RegisterWarning, problem);
                        }
                    }
                    _ => {
                        flow = flow
                            .with_flash(FlashKind::RegisterWarning, messages::REGISTRATION_FAILED);
                    }
                }
                return flow;
            }
        };

        let account = match &identity {
            Some(identity) => {
                match self
                    .resolver
                    .link_external_id(&account, identity.provider, &identity.external_id)
                    .await
                {
                    Ok(linked) => linked,
                    Err(err) => {
                        tracing::error!(error = %err, "external-id link failed after insert");
                        account
                    }
                }
            }
            None => account,
        };

        if let Some(avatar_url) = identity.as_ref().and_then(|i| i.avatar_url.as_deref()) {
            self.spawn_avatar_import(&account, avatar_url);
        }

        if cfg.registration_mode() == RegistrationMode::Restricted {
            self.spawn_admin_notifications(&account, &cfg);
        }

        self.finish_login(session, &account)
    }

    /// Run every registration gate, collecting all applicable messages.
    async fn collect_problems(
        &self,
        cfg: &ConfigCache,
        form: &RegistrationForm,
        identity: Option<&ExternalIdentity>,
    ) -> Result<Vec<String>> {
        let mut problems = Vec::new();

        if !self.resolver.validate_email(&form.email)? {
            problems.push(messages::EMAIL_NOT_ALLOWED.to_string());
        }

        let check = self
            .resolver
            .check_registerable(&form.email, &form.username)
            .await?;
        if check.username_taken {
            problems.push(messages::USERNAME_TAKEN.to_string());
        }
        if check.email_taken {
            problems.push(messages::EMAIL_TAKEN.to_string());
        }

        if let Some(organizations) = identity.and_then(|i| i.organizations.as_deref()) {
            if !self.resolver.validate_organization_membership(organizations)? {
                problems.push(messages::ORGANIZATION_NOT_ALLOWED.to_string());
            }
        }

        let has_password = form.password.as_deref().is_some_and(|p| !p.is_empty());
        if cfg.password_auth_disabled() && identity.is_none() {
            problems.push(messages::PASSWORD_AUTH_UNAVAILABLE.to_string());
        }
        if !has_password && identity.is_none() {
            problems.push(messages::PASSWORD_REQUIRED.to_string());
        }

        Ok(problems)
    }

    /// `POST /invited`: complete an invited account by choosing a
    /// username and setting the local credential.
    ///
    /// Only reachable signed in as an invited account; anonymous callers
    /// go to login and already-active accounts to the landing route.
    pub async fn activate_invitation(
        &self,
        session: &mut SessionState,
        username: &str,
        name: &str,
        password: &str,
    ) -> Flow {
        let Some(user) = session.user.clone() else {
            return Flow::to(routes::LOGIN);
        };
        let account = match self.resolver.store().find_by_id(user.account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                tracing::error!("signed-in account missing from the store");
                return self.fail(session);
            }
            Err(err) => {
                tracing::error!(error = %err, "account lookup failed");
                return self.fail(session);
            }
        };
        if account.status != AccountStatus::Invited {
            return Flow::to(routes::ROOT);
        }

        match self
            .resolver
            .activate_invited(&account, username, name, password)
            .await
        {
            Ok(activated) => {
                session.sign_in(AuthenticatedUser::from(&activated));
                tracing::debug!(username = %activated.username, "invited account activated");
                Flow::to(routes::ROOT)
            }
            Err(err) if err.is_user_error() => {
                let mut flow = Flow::to(routes::INVITED);
                match err.into_validation() {
                    AuthError::Validation(problems) => {
                        for problem in problems {
                            flow = flow.with_flash(FlashKind::RegisterWarning, problem);
                        }
                    }
                    _ => {
                        flow = flow
                            .with_flash(FlashKind::RegisterWarning, messages::ACTIVATION_FAILED);
                    }
                }
                flow
            }
            Err(err) => {
                tracing::error!(error = %err, "invitation activation failed");
                Flow::to(routes::INVITED)
                    .with_flash(FlashKind::RegisterWarning, messages::ACTIVATION_FAILED)
            }
        }
    }

    /// Drop the session's user and pending state.
    pub fn logout(&self, session: &mut SessionState) -> Flow {
        session.sign_out();
        Flow::to(routes::LOGIN)
    }

    /// Restricted-mode fan-out: every admin gets a heads-up about the
    /// account waiting for activation. Spawned so the registration
    /// response never waits on delivery; failures are logged and
    /// discarded.
    fn spawn_admin_notifications(&self, created: &LocalAccount, cfg: &ConfigCache) {
        let store = self.resolver.store().clone();
        let notifier = self.notifier.clone();
        let created_username = created.username.clone();
        let app_title = cfg.app_title();
        let app_url = cfg.app_url();

        tokio::spawn(async move {
            let admins = match store.find_admins().await {
                Ok(admins) => admins,
                Err(err) => {
                    tracing::warn!(error = %err, "could not list admins for registration notice");
                    return;
                }
            };
            for admin in admins {
                if let Err(err) = notifier
                    .notify_registration_pending(
                        &admin.email,
                        &created_username,
                        &app_title,
                        &app_url,
                    )
                    .await
                {
                    tracing::warn!(
                        error = %err,
                        admin = %admin.email,
                        "registration notice delivery failed"
                    );
                }
            }
        });
    }

    /// Best-effort import of the provider avatar. Spawned; every failure
    /// on this path is swallowed.
    fn spawn_avatar_import(&self, account: &LocalAccount, avatar_url: &str) {
        let http = self.http_client.clone();
        let avatars = self.avatars.clone();
        let store = self.resolver.store().clone();
        let account_id = account.id;
        let avatar_url = avatar_url.to_string();

        tokio::spawn(async move {
            if let Err(err) =
                import_avatar(&http, &avatars, &store, account_id, &avatar_url).await
            {
                tracing::debug!(error = %err, "avatar import skipped");
            }
        });
    }
}

async fn import_avatar<V: AvatarStore, A: AccountStore>(
    http: &reqwest::Client,
    avatars: &V,
    store: &A,
    account_id: AccountId,
    url: &str,
) -> Result<()> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    if !response.status().is_success() {
        return Err(AuthError::Internal(format!(
            "avatar fetch failed: {}",
            response.status()
        )));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?;

    let stored_url = avatars.store_avatar(account_id, &content_type, &bytes).await?;
    store.set_avatar_url(account_id, &stored_url).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_error_messages() {
        assert_eq!(
            login_error_message("suspended"),
            Some(messages::ACCOUNT_SUSPENDED)
        );
        assert_eq!(
            login_error_message("registered"),
            Some(messages::AWAITING_APPROVAL)
        );
        assert_eq!(login_error_message("unknown"), None);
    }
}
