//! Configuration Module
//!
//! Backend settings supplied by the host application. The library never reads
//! the environment; hosts deserialize this from whatever source they use.

use serde::Deserialize;

use crate::ttl::Ttl;

/// Settings shared by every backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// TTL in seconds applied when a call passes no TTL, None = never expire
    pub default_ttl: Option<u64>,
}

impl BackendConfig {
    /// Creates a config with the given default TTL in seconds.
    pub fn with_default_ttl(seconds: u64) -> Self {
        Self {
            default_ttl: Some(seconds),
        }
    }

    /// Substitutes the configured default for an absent TTL.
    pub fn effective_ttl(&self, ttl: Ttl) -> Ttl {
        match (ttl, self.default_ttl) {
            (Ttl::Absent, Some(seconds)) => Ttl::Seconds(seconds),
            (ttl, _) => ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = BackendConfig::default();
        assert_eq!(config.default_ttl, None);
        assert_eq!(config.effective_ttl(Ttl::Absent), Ttl::Absent);
    }

    #[test]
    fn test_config_from_json() {
        let config: BackendConfig = serde_json::from_str(r#"{"default_ttl":300}"#).unwrap();
        assert_eq!(config, BackendConfig::with_default_ttl(300));

        let config: BackendConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.default_ttl, None);
    }

    #[test]
    fn test_effective_ttl_keeps_explicit_value() {
        let config = BackendConfig::with_default_ttl(300);
        assert_eq!(config.effective_ttl(Ttl::Absent), Ttl::Seconds(300));
        assert_eq!(config.effective_ttl(Ttl::Seconds(5)), Ttl::Seconds(5));
    }
}
