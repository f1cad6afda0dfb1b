//! Process-level settings for the dispatch framework.
//!
//! ```toml
//! default_timeout = "1m"
//! workers = 2
//! resolver_type_label = "resolution.tekton.dev/type"
//! conflict_backoff_base = "5ms"
//! conflict_backoff_max = "16m40s"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Label key used for routing when the config does not name one.
pub const DEFAULT_RESOLVER_TYPE_LABEL: &str = "resolution.tekton.dev/type";

/// Settings shared by every resolver running in one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    /// End-to-end budget for a record, measured from its creation.
    #[serde(with = "crate::duration::go")]
    pub default_timeout: Duration,

    /// Number of reconcile workers per resolver.
    pub workers: usize,

    /// Label key every selector must carry.
    pub resolver_type_label: String,

    /// First delay applied when a status write is retried.
    #[serde(with = "crate::duration::go")]
    pub conflict_backoff_base: Duration,

    /// Ceiling for the per-key retry delay.
    #[serde(with = "crate::duration::go")]
    pub conflict_backoff_max: Duration,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(60),
            workers: 2,
            resolver_type_label: DEFAULT_RESOLVER_TYPE_LABEL.to_string(),
            conflict_backoff_base: Duration::from_millis(5),
            conflict_backoff_max: Duration::from_secs(1000),
        }
    }
}

impl FrameworkConfig {
    /// Parse from a TOML string. Missing fields take their defaults.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = Self::from_toml_str(&contents)?;
        tracing::debug!(path = %path.display(), "loaded framework config");
        Ok(config)
    }

    /// Reject values the framework cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout.is_zero() {
            return Err(ConfigError::invalid_value(
                "default_timeout",
                "must be greater than zero",
            ));
        }
        if self.workers == 0 {
            return Err(ConfigError::invalid_value("workers", "must be at least 1"));
        }
        if self.resolver_type_label.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "resolver_type_label",
                "must not be empty",
            ));
        }
        if self.conflict_backoff_base > self.conflict_backoff_max {
            return Err(ConfigError::invalid_value(
                "conflict_backoff_base",
                "must not exceed conflict_backoff_max",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = FrameworkConfig::default();
        assert_eq!(config.default_timeout, Duration::from_secs(60));
        assert_eq!(config.workers, 2);
        assert_eq!(config.resolver_type_label, "resolution.tekton.dev/type");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = FrameworkConfig::from_toml_str(
            r#"
            default_timeout = "90s"
            workers = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.default_timeout, Duration::from_secs(90));
        assert_eq!(config.workers, 4);
        assert_eq!(config.conflict_backoff_base, Duration::from_millis(5));
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(
            FrameworkConfig::from_toml_str("").unwrap(),
            FrameworkConfig::default()
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = FrameworkConfig::from_toml_str("workers = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "workers"));

        let err = FrameworkConfig::from_toml_str(r#"default_timeout = "soon""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        assert!(FrameworkConfig::from_toml_str(r#"resolver_type_label = " ""#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_timeout = \"2m\"").unwrap();
        let config = FrameworkConfig::load(file.path()).unwrap();
        assert_eq!(config.default_timeout, Duration::from_secs(120));

        let err = FrameworkConfig::load(Path::new("/nonexistent/framework.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_serialized_durations_are_readable() {
        let rendered = toml::to_string(&FrameworkConfig::default()).unwrap();
        assert!(rendered.contains("default_timeout = \"1m0s\""));
        assert_eq!(
            FrameworkConfig::from_toml_str(&rendered).unwrap(),
            FrameworkConfig::default()
        );
    }
}
