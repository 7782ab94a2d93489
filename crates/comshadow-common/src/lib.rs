//! Configuration and logging shared across the comshadow crates
//!
//! Configuration can come from a TOML file or from the environment:
//! - `COMSHADOW_CONFIG` – path of a TOML config file
//! - `COMSHADOW_LOG` – tracing filter directive (overrides the file)
//! - `COMSHADOW_TRACE_CALLS` – log every thunk entry when set to `1`/`true`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub const ENV_CONFIG: &str = "COMSHADOW_CONFIG";
pub const ENV_LOG: &str = "COMSHADOW_LOG";
pub const ENV_TRACE_CALLS: &str = "COMSHADOW_TRACE_CALLS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Bridge-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// `tracing_subscriber::EnvFilter` directive
    pub log_filter: String,
    /// Trace every native→managed thunk entry
    pub trace_calls: bool,
    /// Include source file and line in log lines
    pub log_file_and_line: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_filter: "comshadow=info".to_string(),
            trace_calls: false,
            log_file_and_line: false,
        }
    }
}

impl BridgeConfig {
    /// Load a TOML config file. Missing keys fall back to their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Config file named by `COMSHADOW_CONFIG` (if any), then environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var_os(ENV_CONFIG) {
            Some(path) => Self::load(PathBuf::from(path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(filter) = lookup(ENV_LOG).filter(|f| !f.trim().is_empty()) {
            self.log_filter = filter;
        }
        if let Some(flag) = lookup(ENV_TRACE_CALLS) {
            self.trace_calls = matches!(flag.trim(), "1" | "true" | "yes" | "on");
        }
    }
}

/// Install the global tracing subscriber.
///
/// Uses `try_init`, so a host that already installed a subscriber keeps it.
/// Returns `true` when this call installed the subscriber.
pub fn init_logging(config: &BridgeConfig) -> bool {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|err| {
        eprintln!("comshadow: bad log filter {:?} ({}), using \"info\"", config.log_filter, err);
        EnvFilter::new("info")
    });

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.log_file_and_line)
        .with_line_number(config.log_file_and_line)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!("Logging initialized with filter {:?}", config.log_filter);
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.log_filter, "comshadow=info");
        assert!(!config.trace_calls);
    }

    #[test]
    fn test_parse_partial_file() {
        let config = BridgeConfig::parse("trace_calls = true\n", Path::new("mem.toml")).unwrap();
        assert!(config.trace_calls);
        assert_eq!(config.log_filter, "comshadow=info");
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = BridgeConfig::parse("trace_calls = \"maybe\"", Path::new("bad.toml")).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [(ENV_LOG, "comshadow=trace"), (ENV_TRACE_CALLS, "1")]
            .into_iter()
            .collect();
        let mut config = BridgeConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.log_filter, "comshadow=trace");
        assert!(config.trace_calls);
    }

    #[test]
    fn test_blank_log_override_ignored() {
        let mut config = BridgeConfig::default();
        config.apply_overrides(|key| (key == ENV_LOG).then(|| "  ".to_string()));
        assert_eq!(config.log_filter, "comshadow=info");
    }

    #[test]
    fn test_load_missing_file() {
        let err = BridgeConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
