// Hunter configuration
// Defaults reproduce the classic sweep: versions v1..v6 against GET, POST, PUT and OPTIONS

use crate::error::ConfigError;
use crate::models::Method;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Storage key the persisted result blob lives under
pub const DEFAULT_STATE_KEY: &str = "fuzzer_data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HunterConfig {
    /// Lowest version number to probe (inclusive)
    pub min_version: u32,
    /// Highest version number to probe (inclusive)
    pub max_version: u32,
    /// Methods issued for every fuzzed version
    pub methods: Vec<Method>,
    /// Sweeps allowed to run at the same time
    pub max_concurrent_sweeps: usize,
    /// Outstanding probes allowed per host (0 = unlimited)
    pub max_probes_per_host: usize,
    /// Per-probe timeout in seconds
    pub request_timeout_secs: u64,
    pub follow_redirects: bool,
    /// Accept self-signed and otherwise invalid TLS certificates
    pub accept_invalid_certs: bool,
    /// Capacity of the result event channel
    pub event_capacity: usize,
    pub state_key: String,
}

impl Default for HunterConfig {
    fn default() -> Self {
        Self {
            min_version: 1,
            max_version: 6,
            methods: vec![Method::GET, Method::POST, Method::PUT, Method::OPTIONS],
            max_concurrent_sweeps: 16,
            max_probes_per_host: 8,
            request_timeout_secs: 30,
            follow_redirects: false,
            accept_invalid_certs: true,
            event_capacity: 1024,
            state_key: DEFAULT_STATE_KEY.to_string(),
        }
    }
}

impl HunterConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: HunterConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_version == 0 {
            return Err(invalid("min_version", "version numbers start at 1"));
        }
        if self.min_version > self.max_version {
            return Err(invalid(
                "max_version",
                &format!("must be >= min_version ({})", self.min_version),
            ));
        }
        if self.methods.is_empty() {
            return Err(invalid("methods", "at least one method is required"));
        }
        if self.max_concurrent_sweeps == 0 {
            return Err(invalid("max_concurrent_sweeps", "must be at least 1"));
        }
        if self.state_key.trim().is_empty() {
            return Err(invalid("state_key", "must not be empty"));
        }
        Ok(())
    }

    /// Version numbers in probe order
    pub fn versions(&self) -> impl Iterator<Item = u32> {
        self.min_version..=self.max_version
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = HunterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.versions().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(config.state_key, "fuzzer_data");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: HunterConfig =
            serde_json::from_str(r#"{"max_version": 3, "methods": ["get", "delete"]}"#).unwrap();
        assert_eq!(config.max_version, 3);
        assert_eq!(config.min_version, 1);
        assert_eq!(config.methods, vec![Method::GET, Method::DELETE]);
        assert_eq!(config.max_probes_per_host, 8);
    }

    #[test]
    fn rejects_inverted_version_range() {
        let config = HunterConfig {
            min_version: 4,
            max_version: 2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == "max_version"
        ));
    }

    #[test]
    fn rejects_bad_method_tokens() {
        assert!(serde_json::from_str::<HunterConfig>(r#"{"methods": ["GE T"]}"#).is_err());
    }
}
