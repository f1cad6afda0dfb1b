//! Per-resolver key/value configuration.
//!
//! Each resolver reads its defaults (branch, catalog, timeouts) from a flat
//! string map, usually sourced from a ConfigMap. The [`ConfigStore`] holds
//! the latest map; the framework takes a [`ResolverConfig`] snapshot before
//! every reconciliation so a config change never lands halfway through a
//! resolve.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::ConfigMap;
use parking_lot::RwLock;

use crate::duration::parse_duration;
use crate::error::Result;

/// Config key most backends use to override the resolution timeout.
pub const KEY_FETCH_TIMEOUT: &str = "fetch-timeout";

/// Immutable view of one resolver's configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverConfig {
    data: BTreeMap<String, String>,
}

impl ResolverConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the data of a ConfigMap. A missing map or missing data yields an
    /// empty config.
    pub fn from_config_map(config_map: Option<&ConfigMap>) -> Self {
        let data = config_map
            .and_then(|cm| cm.data.clone())
            .unwrap_or_default();
        Self { data }
    }

    /// Set a key, returning the updated config.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Value for `key`, treating an empty string as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Value for `key`, or `default` when unset.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Parse `key` as a duration. `Ok(None)` when unset.
    pub fn duration(&self, key: &str) -> Result<Option<Duration>> {
        self.get(key).map(parse_duration).transpose()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the config holds no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<BTreeMap<String, String>> for ResolverConfig {
    fn from(data: BTreeMap<String, String>) -> Self {
        Self { data }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResolverConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            data: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Shared, hot-swappable holder for a resolver's configuration.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    name: String,
    current: Arc<RwLock<ResolverConfig>>,
}

impl ConfigStore {
    /// Create a store named after the ConfigMap it mirrors.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, ResolverConfig::default())
    }

    /// Create a store with initial contents.
    pub fn with_config(name: impl Into<String>, config: ResolverConfig) -> Self {
        Self {
            name: name.into(),
            current: Arc::new(RwLock::new(config)),
        }
    }

    /// Name of the backing ConfigMap.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the stored config.
    pub fn update(&self, config: ResolverConfig) {
        tracing::info!(config = %self.name, entries = config.len(), "resolver config updated");
        *self.current.write() = config;
    }

    /// Replace the stored config from a ConfigMap event.
    pub fn update_from_config_map(&self, config_map: Option<&ConfigMap>) {
        self.update(ResolverConfig::from_config_map(config_map));
    }

    /// Copy of the current config.
    pub fn snapshot(&self) -> ResolverConfig {
        self.current.read().clone()
    }
}
