//! Mock config backing store for testing.

use crate::config::{ConfigRow, ConfigStore};
use crate::error::{AuthError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Mock config store.
///
/// Rows live in a `BTreeMap` keyed by `(ns, key)`, so `load_all` comes
/// back ordered by namespace then key, matching the store contract.
#[derive(Debug, Clone, Default)]
pub struct MockConfigStore {
    rows: Arc<Mutex<BTreeMap<(String, String), Value>>>,
    should_fail: bool,
}

impl MockConfigStore {
    /// Create a new empty mock store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose reads and writes all fail.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Number of persisted rows (test helper).
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether the store holds no rows (test helper).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seed one row (test helper).
    #[must_use]
    pub fn with_row(self, ns: &str, key: &str, value: Value) -> Self {
        if let Ok(mut rows) = self.rows.lock() {
            rows.insert((ns.to_string(), key.to_string()), value);
        }
        self
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<(String, String), Value>>> {
        self.rows
            .lock()
            .map_err(|_| AuthError::Internal("config store lock poisoned".to_string()))
    }
}

impl ConfigStore for MockConfigStore {
    fn load_all(&self) -> impl Future<Output = Result<Vec<ConfigRow>>> + Send {
        let store = self.clone();

        async move {
            if store.should_fail {
                return Err(AuthError::Internal("mock config read failure".to_string()));
            }
            let rows = store.lock()?;
            Ok(rows
                .iter()
                .map(|((ns, key), value)| ConfigRow {
                    ns: ns.clone(),
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect())
        }
    }

    fn upsert(
        &self,
        ns: &str,
        key: &str,
        value: &Value,
    ) -> impl Future<Output = Result<()>> + Send {
        let store = self.clone();
        let ns = ns.to_string();
        let key = key.to_string();
        let value = value.clone();

        async move {
            if store.should_fail {
                return Err(AuthError::Internal("mock config write failure".to_string()));
            }
            let mut rows = store.lock()?;
            rows.insert((ns, key), value);
            Ok(())
        }
    }
}
