//! Configuration for the session persistence core.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

fn default_record_key_prefix() -> String {
    "mqtt.session.".to_string()
}

/// What `restore` does with a durable record it cannot decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnreadableRecordPolicy {
    /// Surface the decode error; that session cannot resume until an
    /// operator intervenes. This is the default: silent data loss is worse
    /// than a failed resume.
    #[default]
    Fail,
    /// Log the decode error and treat the record as absent, letting the
    /// client start a fresh session.
    StartFresh,
}

/// Tunables for the state manager.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionStoreConfig {
    /// Prefix prepended to the client identifier to form the durable record
    /// key. Lets several protocol layers share one storage namespace.
    #[serde(default = "default_record_key_prefix")]
    pub record_key_prefix: String,
    #[serde(default)]
    pub unreadable_record_policy: UnreadableRecordPolicy,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            record_key_prefix: default_record_key_prefix(),
            unreadable_record_policy: UnreadableRecordPolicy::default(),
        }
    }
}

impl SessionStoreConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("unable to read config {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("invalid TOML config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SessionStoreConfig::default();
        assert_eq!(cfg.record_key_prefix, "mqtt.session.");
        assert_eq!(cfg.unreadable_record_policy, UnreadableRecordPolicy::Fail);
    }

    #[test]
    fn test_parse_toml() {
        let doc = r#"
            record_key_prefix = "broker/sessions/"
            unreadable_record_policy = "start_fresh"
        "#;
        let cfg: SessionStoreConfig = toml::from_str(doc).unwrap();
        assert_eq!(cfg.record_key_prefix, "broker/sessions/");
        assert_eq!(
            cfg.unreadable_record_policy,
            UnreadableRecordPolicy::StartFresh
        );
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: SessionStoreConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.record_key_prefix, "mqtt.session.");
    }
}
