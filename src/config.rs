//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (BUCKET_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [compiler]
//! owner_type = "Store"
//! prune_commands = false
//! extra_imports = ["moment"]
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! BUCKET_COMPILER__OWNER_TYPE=Store
//! BUCKET_LOGGING__LEVEL=trace
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Code generation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Type whose prototype receives the generated procedures
    #[serde(default = "default_owner_type")]
    pub owner_type: String,

    /// Remove dead temporaries from view procedures
    #[serde(default = "default_true")]
    pub prune_views: bool,

    /// Remove dead temporaries from command procedures
    #[serde(default = "default_true")]
    pub prune_commands: bool,

    /// Compile views and commands on the rayon pool
    #[serde(default)]
    pub parallel: bool,

    /// Names usable in expressions besides the program's imports and `Math`
    #[serde(default)]
    pub extra_imports: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_owner_type() -> String {
    "Bucket".to_string()
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (BUCKET_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("BUCKET_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("BUCKET_").split("__"))
            .extract()
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            owner_type: default_owner_type(),
            prune_views: true,
            prune_commands: true,
            parallel: false,
            extra_imports: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.compiler.owner_type, "Bucket");
        assert!(config.compiler.prune_views);
        assert!(config.compiler.prune_commands);
        assert!(!config.compiler.parallel);
        assert!(config.compiler.extra_imports.is_empty());
    }

    #[test]
    fn test_default_logging_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string(&Config::default()).unwrap();
        assert!(toml_str.contains("[compiler]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed: Config = toml::from_str("[compiler]\nowner_type = \"Store\"\n").unwrap();
        assert_eq!(parsed.compiler.owner_type, "Store");
        assert!(parsed.compiler.prune_views);
        assert_eq!(parsed.logging, LoggingConfig::default());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bucket.toml");
        std::fs::write(
            &path,
            "[compiler]\nparallel = true\nextra_imports = [\"moment\"]\n\n[logging]\nformat = \"json\"\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert!(config.compiler.parallel);
        assert_eq!(config.compiler.extra_imports, vec!["moment".to_string()]);
        assert_eq!(config.logging.format, "json");
    }
}
