//! Daemon configuration.
//!
//! Tunables consumed by the property engine. All fields have defaults so a
//! missing or partial config file is fine; the daemon loads overrides from
//! a JSON file at startup and the resulting value is read-only afterwards.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the config file.
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Nice value applied with the `rt` cpu policy.
    pub rt_nice: i32,

    /// Realtime priority for the `rt` cpu policy; 0 disables SCHED_RR.
    pub rt_priority: i32,

    /// Nice value applied with the `high` and `iso` cpu policies.
    pub high_nice: i32,

    /// Kernel SMART scheduling is managed by the cpu controller instead of
    /// per-task scheduler attributes.
    pub enable_smart: bool,

    /// Memory withheld from the guarantee budget [bytes].
    pub memory_guarantee_reserve: u64,

    /// Smallest accepted non-zero memory limit [bytes].
    pub min_memory_limit: u64,

    /// Longest accepted `private` value [bytes].
    pub private_max: usize,

    /// Default limit for stored stdout/stderr [bytes].
    pub stdout_limit_default: u64,

    /// Largest stdout/stderr limit a non-superuser may set [bytes].
    pub stdout_limit_max: u64,

    /// Default time a dead container lingers before removal [ms].
    pub aging_time_default_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rt_nice: -10,
            rt_priority: 10,
            high_nice: -10,
            enable_smart: false,
            memory_guarantee_reserve: 2 << 30,
            min_memory_limit: 1 << 20,
            private_max: 4096,
            stdout_limit_default: 8 << 20,
            stdout_limit_max: 1 << 30,
            aging_time_default_ms: 24 * 60 * 60 * 1000,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.memory_guarantee_reserve, 2 << 30);
        assert_eq!(cfg.private_max, 4096);
        assert!(!cfg.enable_smart);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"rt_priority": 5, "enable_smart": true}}"#).unwrap();
        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.rt_priority, 5);
        assert!(cfg.enable_smart);
        assert_eq!(cfg.high_nice, -10);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(Config::load(file.path()).is_err());
    }
}
