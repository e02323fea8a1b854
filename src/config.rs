//! Namespaced configuration mirror.
//!
//! Feature flags live in a persisted key/value table and are mirrored
//! into an in-memory [`ConfigCache`]. The cache is loaded once at startup
//! and kept in sync on admin writes: the persisted write is acknowledged
//! first, then the mirror is merged, so readers in this process observe
//! the update atomically.
//!
//! The cache is handed to the orchestrator and resolver explicitly via
//! [`ConfigHandle`]; there is no process-global configuration object.

use crate::error::{AuthError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

/// Primary namespace holding the wiki's feature flags.
pub const CORE_NAMESPACE: &str = "crowi";

/// Site-wide registration policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RegistrationMode {
    /// Anyone may self-register.
    #[default]
    Open,
    /// Registration completes only after admin approval.
    Restricted,
    /// Registration requires an admin invitation; the form is disabled.
    Closed,
}

impl RegistrationMode {
    /// Stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Restricted => "Restricted",
            Self::Closed => "Closed",
        }
    }

    /// Parse the stored string form; unknown values fall back to `Open`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "Restricted" => Self::Restricted,
            "Closed" => Self::Closed,
            _ => Self::Open,
        }
    }

    /// Admin-facing label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Open => "Open (anyone can register)",
            Self::Restricted => "Restricted (registration requires admin approval)",
            Self::Closed => "Closed (registration requires an admin invitation)",
        }
    }
}

/// One persisted configuration row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRow {
    /// Namespace.
    pub ns: String,
    /// Key within the namespace.
    pub key: String,
    /// Serialized scalar or array value.
    pub value: Value,
}

/// Backing store for configuration rows.
///
/// Rows are unique on `(ns, key)`; `load_all` returns them ordered by
/// namespace then key so the mirror is reconstructed deterministically.
pub trait ConfigStore: Send + Sync {
    /// Load every row, ordered by `(ns, key)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store is unreachable.
    fn load_all(&self) -> impl Future<Output = Result<Vec<ConfigRow>>> + Send;

    /// Insert or replace one row.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store rejects the write.
    fn upsert(&self, ns: &str, key: &str, value: &Value) -> impl Future<Output = Result<()>> + Send;
}

/// In-memory mirror of the configuration table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigCache {
    namespaces: BTreeMap<String, BTreeMap<String, Value>>,
}

impl ConfigCache {
    /// Create an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the mirror from the backing store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    pub async fn load<S: ConfigStore>(store: &S) -> Result<Self> {
        let mut cache = Self::new();
        for row in store.load_all().await? {
            cache
                .namespaces
                .entry(row.ns)
                .or_default()
                .insert(row.key, row.value);
        }
        tracing::debug!(namespaces = cache.namespaces.len(), "config mirror loaded");
        Ok(cache)
    }

    /// The install-time defaults for [`CORE_NAMESPACE`].
    #[must_use]
    pub fn install_defaults() -> BTreeMap<String, Value> {
        let mut defaults = BTreeMap::new();
        defaults.insert("app:title".to_string(), Value::from("Wiki"));
        defaults.insert("app:url".to_string(), Value::from(""));
        defaults.insert(
            "security:registrationMode".to_string(),
            Value::from(RegistrationMode::Open.as_str()),
        );
        defaults.insert(
            "security:registrationWhiteList".to_string(),
            Value::Array(Vec::new()),
        );
        defaults.insert("auth:requireThirdPartyAuth".to_string(), Value::from(false));
        defaults.insert("auth:disablePasswordAuth".to_string(), Value::from(false));
        defaults.insert("google:clientId".to_string(), Value::from(""));
        defaults.insert("google:clientSecret".to_string(), Value::from(""));
        defaults.insert("github:clientId".to_string(), Value::from(""));
        defaults.insert("github:clientSecret".to_string(), Value::from(""));
        defaults.insert("github:organization".to_string(), Value::from(""));
        defaults
    }

    /// Look up one value.
    #[must_use]
    pub fn get(&self, ns: &str, key: &str) -> Option<&Value> {
        self.namespaces.get(ns)?.get(key)
    }

    /// Boolean flag; absent or non-boolean reads as `false`.
    #[must_use]
    pub fn get_bool(&self, ns: &str, key: &str) -> bool {
        self.get(ns, key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// String value; absent or non-string reads as `None`.
    #[must_use]
    pub fn get_str(&self, ns: &str, key: &str) -> Option<&str> {
        self.get(ns, key).and_then(Value::as_str)
    }

    /// String-list value.
    ///
    /// Accepts either a JSON array of strings or a comma-separated
    /// string; empty entries are dropped.
    #[must_use]
    pub fn get_str_list(&self, ns: &str, key: &str) -> Vec<String> {
        match self.get(ns, key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Merge `values` into namespace `ns`.
    ///
    /// Keys whose new value is `null` are skipped; empty string and
    /// boolean `false` are intentional overwrites and are kept. Unrelated
    /// existing keys are preserved.
    pub fn set_namespace(&mut self, ns: &str, values: BTreeMap<String, Value>) {
        let target = self.namespaces.entry(ns.to_string()).or_default();
        for (key, value) in values {
            if value.is_null() {
                continue;
            }
            target.insert(key, value);
        }
    }

    /// `auth:disablePasswordAuth` flag.
    #[must_use]
    pub fn password_auth_disabled(&self) -> bool {
        self.get_bool(CORE_NAMESPACE, "auth:disablePasswordAuth")
    }

    /// `auth:requireThirdPartyAuth` flag.
    #[must_use]
    pub fn require_third_party_auth(&self) -> bool {
        self.get_bool(CORE_NAMESPACE, "auth:requireThirdPartyAuth")
    }

    /// `security:registrationMode` policy.
    #[must_use]
    pub fn registration_mode(&self) -> RegistrationMode {
        self.get_str(CORE_NAMESPACE, "security:registrationMode")
            .map(RegistrationMode::parse)
            .unwrap_or_default()
    }

    /// `security:registrationWhiteList`: allowed email domains/suffixes.
    #[must_use]
    pub fn registration_white_list(&self) -> Vec<String> {
        self.get_str_list(CORE_NAMESPACE, "security:registrationWhiteList")
    }

    /// `github:organization`: allowed GitHub organizations.
    #[must_use]
    pub fn github_organizations(&self) -> Vec<String> {
        self.get_str_list(CORE_NAMESPACE, "github:organization")
    }

    /// `app:title`, for notification subjects.
    #[must_use]
    pub fn app_title(&self) -> String {
        self.get_str(CORE_NAMESPACE, "app:title")
            .unwrap_or("Wiki")
            .to_string()
    }

    /// `app:url`, for links in notifications.
    #[must_use]
    pub fn app_url(&self) -> String {
        self.get_str(CORE_NAMESPACE, "app:url")
            .unwrap_or_default()
            .to_string()
    }
}

/// Shared, read-mostly handle to the config mirror.
///
/// Cloned into the orchestrator and resolver at construction time.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<ConfigCache>>,
}

impl ConfigHandle {
    /// Wrap a loaded mirror.
    #[must_use]
    pub fn new(cache: ConfigCache) -> Self {
        Self {
            inner: Arc::new(RwLock::new(cache)),
        }
    }

    /// Clone out the current mirror.
    ///
    /// The mirror is small and read-mostly; callers take a snapshot once
    /// per request so every gate in one transition sees the same values.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Internal`] if the lock is poisoned.
    pub fn snapshot(&self) -> Result<ConfigCache> {
        self.inner
            .read()
            .map(|cache| cache.clone())
            .map_err(|_| AuthError::Internal("config lock poisoned".to_string()))
    }

    /// Persist `values` into the backing store, then merge them into the
    /// mirror. The merge happens only after every write is acknowledged,
    /// so in-process readers never observe a half-applied update.
    ///
    /// # Errors
    ///
    /// Returns an error if a persisted write fails (the mirror is left
    /// untouched) or the lock is poisoned.
    pub async fn update<S: ConfigStore>(
        &self,
        store: &S,
        ns: &str,
        values: BTreeMap<String, Value>,
    ) -> Result<()> {
        for (key, value) in &values {
            if value.is_null() {
                continue;
            }
            store.upsert(ns, key, value).await?;
        }
        self.inner
            .write()
            .map_err(|_| AuthError::Internal("config lock poisoned".to_string()))?
            .set_namespace(ns, values);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::MockConfigStore;

    fn cache_with(key: &str, value: Value) -> ConfigCache {
        let mut cache = ConfigCache::new();
        let mut values = BTreeMap::new();
        values.insert(key.to_string(), value);
        cache.set_namespace(CORE_NAMESPACE, values);
        cache
    }

    #[test]
    fn test_absent_key_reads_as_default() {
        let cache = ConfigCache::new();
        assert_eq!(cache.get(CORE_NAMESPACE, "auth:disablePasswordAuth"), None);
        assert!(!cache.password_auth_disabled());
        assert_eq!(cache.registration_mode(), RegistrationMode::Open);
    }

    #[test]
    fn test_false_and_empty_string_are_overwrites() {
        let mut cache = cache_with("auth:disablePasswordAuth", Value::from(true));
        assert!(cache.password_auth_disabled());

        let mut values = BTreeMap::new();
        values.insert("auth:disablePasswordAuth".to_string(), Value::from(false));
        values.insert("app:title".to_string(), Value::from(""));
        cache.set_namespace(CORE_NAMESPACE, values);

        // false overwrote true; "" overwrote nothing but is stored.
        assert!(!cache.password_auth_disabled());
        assert_eq!(cache.get_str(CORE_NAMESPACE, "app:title"), Some(""));
    }

    #[test]
    fn test_null_values_are_skipped_and_unrelated_keys_kept() {
        let mut cache = cache_with("app:title", Value::from("Team Wiki"));

        let mut values = BTreeMap::new();
        values.insert("app:title".to_string(), Value::Null);
        values.insert("app:url".to_string(), Value::from("https://wiki.example.com"));
        cache.set_namespace(CORE_NAMESPACE, values);

        assert_eq!(cache.get_str(CORE_NAMESPACE, "app:title"), Some("Team Wiki"));
        assert_eq!(
            cache.get_str(CORE_NAMESPACE, "app:url"),
            Some("https://wiki.example.com")
        );
    }

    #[test]
    fn test_str_list_accepts_array_and_comma_string() {
        let cache = cache_with(
            "security:registrationWhiteList",
            Value::Array(vec![Value::from("@example.com"), Value::from("")]),
        );
        assert_eq!(cache.registration_white_list(), vec!["@example.com"]);

        let cache = cache_with("github:organization", Value::from("acme, example-org"));
        assert_eq!(cache.github_organizations(), vec!["acme", "example-org"]);
    }

    #[test]
    fn test_registration_mode_parse() {
        assert_eq!(RegistrationMode::parse("Closed"), RegistrationMode::Closed);
        assert_eq!(
            RegistrationMode::parse("Restricted"),
            RegistrationMode::Restricted
        );
        // Unknown values fail open to self-serve registration.
        assert_eq!(RegistrationMode::parse("bogus"), RegistrationMode::Open);
    }

    #[tokio::test]
    async fn test_load_reconstructs_mirror_from_store() {
        let store = MockConfigStore::new()
            .with_row(CORE_NAMESPACE, "app:title", Value::from("Team Wiki"))
            .with_row(CORE_NAMESPACE, "auth:disablePasswordAuth", Value::from(true))
            .with_row("plugin", "some:flag", Value::from("x"));

        let cache = ConfigCache::load(&store).await.unwrap();
        assert_eq!(cache.get_str(CORE_NAMESPACE, "app:title"), Some("Team Wiki"));
        assert!(cache.password_auth_disabled());
        assert_eq!(cache.get_str("plugin", "some:flag"), Some("x"));

        // Ordered rows rebuild the same mirror every time.
        let again = ConfigCache::load(&store).await.unwrap();
        assert_eq!(cache, again);
    }

    #[tokio::test]
    async fn test_load_from_unreachable_store_errors() {
        assert!(ConfigCache::load(&MockConfigStore::failing()).await.is_err());
    }

    #[tokio::test]
    async fn test_update_persists_then_merges() {
        let store = MockConfigStore::new();
        let handle = ConfigHandle::new(cache_with("app:title", Value::from("Team Wiki")));

        let mut values = BTreeMap::new();
        values.insert("app:url".to_string(), Value::from("https://wiki.example.com"));
        values.insert("app:title".to_string(), Value::Null);
        handle.update(&store, CORE_NAMESPACE, values).await.unwrap();

        // Null keys are skipped by both the store write and the merge.
        assert_eq!(store.len(), 1);
        let rows = store.load_all().await.unwrap();
        assert_eq!(rows[0].key, "app:url");

        let cache = handle.snapshot().unwrap();
        assert_eq!(cache.get_str(CORE_NAMESPACE, "app:title"), Some("Team Wiki"));
        assert_eq!(
            cache.get_str(CORE_NAMESPACE, "app:url"),
            Some("https://wiki.example.com")
        );

        // A reload from the store sees the persisted row.
        let reloaded = ConfigCache::load(&store).await.unwrap();
        assert_eq!(
            reloaded.get_str(CORE_NAMESPACE, "app:url"),
            Some("https://wiki.example.com")
        );
    }

    #[tokio::test]
    async fn test_failed_update_leaves_mirror_untouched() {
        let handle = ConfigHandle::new(cache_with("app:title", Value::from("Team Wiki")));

        let mut values = BTreeMap::new();
        values.insert("app:title".to_string(), Value::from("Changed"));
        let result = handle
            .update(&MockConfigStore::failing(), CORE_NAMESPACE, values)
            .await;

        assert!(result.is_err());
        // The write was never acknowledged, so readers keep the old value.
        let cache = handle.snapshot().unwrap();
        assert_eq!(cache.get_str(CORE_NAMESPACE, "app:title"), Some("Team Wiki"));
    }

    #[test]
    fn test_install_defaults_cover_orchestrator_flags() {
        let mut cache = ConfigCache::new();
        cache.set_namespace(CORE_NAMESPACE, ConfigCache::install_defaults());

        assert!(!cache.password_auth_disabled());
        assert!(!cache.require_third_party_auth());
        assert_eq!(cache.registration_mode(), RegistrationMode::Open);
        assert!(cache.registration_white_list().is_empty());
        assert!(cache.github_organizations().is_empty());
    }
}
