//! Engine configuration

use serde::Deserialize;
use tracing::warn;

/// Environment variable overriding [`EngineConfig::max_remote_depth`]
pub const ENV_MAX_REMOTE_DEPTH: &str = "RIGHTS_MAX_REMOTE_DEPTH";

/// Environment variable overriding [`EngineConfig::capture_backtraces`]
pub const ENV_CAPTURE_BACKTRACES: &str = "RIGHTS_CAPTURE_BACKTRACES";

/// Environment variable overriding [`EngineConfig::log_denials`]
pub const ENV_LOG_DENIALS: &str = "RIGHTS_LOG_DENIALS";

/// Environment variable overriding [`EngineConfig::classify_on_load`]
pub const ENV_CLASSIFY_ON_LOAD: &str = "RIGHTS_CLASSIFY_ON_LOAD";

/// Rights engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum nesting of remote right checks (`right: path`)
    pub max_remote_depth: usize,

    /// Attach trimmed backtraces to rule execution errors
    pub capture_backtraces: bool,

    /// Log denials raised through `apply`
    pub log_denials: bool,

    /// Classify every right when the registry is built
    pub classify_on_load: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_remote_depth: 16,
            capture_backtraces: true,
            log_denials: true,
            classify_on_load: false,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `RIGHTS_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MAX_REMOTE_DEPTH) {
            match raw.trim().parse() {
                Ok(depth) => config.max_remote_depth = depth,
                Err(_) => warn!(variable = ENV_MAX_REMOTE_DEPTH, value = %raw, "Ignoring invalid value"),
            }
        }
        if let Some(flag) = lookup(ENV_CAPTURE_BACKTRACES).and_then(|raw| parse_flag(ENV_CAPTURE_BACKTRACES, &raw)) {
            config.capture_backtraces = flag;
        }
        if let Some(flag) = lookup(ENV_LOG_DENIALS).and_then(|raw| parse_flag(ENV_LOG_DENIALS, &raw)) {
            config.log_denials = flag;
        }
        if let Some(flag) = lookup(ENV_CLASSIFY_ON_LOAD).and_then(|raw| parse_flag(ENV_CLASSIFY_ON_LOAD, &raw)) {
            config.classify_on_load = flag;
        }

        config
    }
}

fn parse_flag(variable: &str, raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(variable, value = %raw, "Ignoring invalid flag");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_remote_depth, 16);
        assert!(config.capture_backtraces);
        assert!(config.log_denials);
        assert!(!config.classify_on_load);
    }

    #[test]
    fn test_from_json_keeps_missing_defaults() {
        let config = EngineConfig::from_json(r#"{"max_remote_depth": 4, "log_denials": false}"#).unwrap();
        assert_eq!(config.max_remote_depth, 4);
        assert!(!config.log_denials);
        assert!(config.capture_backtraces);
    }

    #[test]
    fn test_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_MAX_REMOTE_DEPTH, "3"),
            (ENV_CAPTURE_BACKTRACES, "off"),
            (ENV_CLASSIFY_ON_LOAD, "YES"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.max_remote_depth, 3);
        assert!(!config.capture_backtraces);
        assert!(config.log_denials);
        assert!(config.classify_on_load);
    }

    #[test]
    fn test_invalid_values_are_ignored() {
        let config = EngineConfig::from_lookup(|key| match key {
            ENV_MAX_REMOTE_DEPTH => Some("deep".to_string()),
            ENV_LOG_DENIALS => Some("maybe".to_string()),
            _ => None,
        });
        assert_eq!(config, EngineConfig::default());
    }
}
