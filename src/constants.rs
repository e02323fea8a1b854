//! Route and message constants shared by the orchestrator and its tests.

/// Fixed routes the orchestrator redirects between.
pub mod routes {
    /// Default landing route.
    pub const ROOT: &str = "/";

    /// Login entry point.
    pub const LOGIN: &str = "/login";

    /// Login entry point, re-entered with the registration pane open.
    pub const LOGIN_REGISTER: &str = "/login?register=1";

    /// Registration form.
    pub const REGISTER: &str = "/register";

    /// Forced password setup for accounts with no local credential.
    pub const PASSWORD_SETUP: &str = "/me/password";

    /// Activation page for invited accounts.
    pub const INVITED: &str = "/invited";

    /// Login error page for suspended accounts.
    pub const LOGIN_ERROR_SUSPENDED: &str = "/login/error/suspended";

    /// Google login route (also the post-callback bounce target).
    pub const LOGIN_GOOGLE: &str = "/login/google";

    /// GitHub login route (also the post-callback bounce target).
    pub const LOGIN_GITHUB: &str = "/login/github";

    /// Statically registered Google callback path.
    pub const CALLBACK_GOOGLE: &str = "/oauth2callback/google";

    /// Statically registered GitHub callback path.
    pub const CALLBACK_GITHUB: &str = "/oauth2callback/github";
}

/// User-visible messages.
pub mod messages {
    /// Generic sign-in failure, shared by every login failure path so the
    /// response never discloses whether an account exists.
    pub const SIGN_IN_FAILURE: &str = "Sign in failure.";

    /// Email rejected by the allow-list policy.
    pub const EMAIL_NOT_ALLOWED: &str =
        "This email address could not be used. (Make sure the allowed email address)";

    /// Username already taken.
    pub const USERNAME_TAKEN: &str = "This User ID is not available.";

    /// Email already registered.
    pub const EMAIL_TAKEN: &str = "This email address is already registered.";

    /// Password auth is disabled and no external identity is being linked.
    pub const PASSWORD_AUTH_UNAVAILABLE: &str = "Password authentication is not available.";

    /// Password missing on a non-linked registration.
    pub const PASSWORD_REQUIRED: &str = "Password is required.";

    /// GitHub organization allow-list violation.
    pub const ORGANIZATION_NOT_ALLOWED: &str =
        "This account could not be used. (Make sure whether you belong to allowed GitHub Organization)";

    /// Account creation failed at insert time.
    pub const REGISTRATION_FAILED: &str = "Failed to register.";

    /// Invited-account activation failed.
    pub const ACTIVATION_FAILED: &str = "Failed to activate.";

    /// Login error page: suspended account.
    pub const ACCOUNT_SUSPENDED: &str = "This account is suspended.";

    /// Login error page: registration awaiting admin approval.
    pub const AWAITING_APPROVAL: &str = "Wait for approved by administrators.";
}

/// Supported account locales.
pub mod locales {
    /// English (United States), the default.
    pub const EN_US: &str = "en-US";

    /// Japanese.
    pub const JA: &str = "ja";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_routes_are_static_per_provider() {
        // Callback URLs are registered with the provider and cannot vary
        // per login attempt.
        assert_eq!(routes::CALLBACK_GOOGLE, "/oauth2callback/google");
        assert_eq!(routes::CALLBACK_GITHUB, "/oauth2callback/github");
    }
}
