//! Configuration schema (tierline.toml)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::diagnostic::{DiagnosticCode, Severity};

/// Default environment variable holding the DDL database connection string
pub const DEFAULT_DATABASE_URL_ENV: &str = "TIERLINE_DATABASE_URL";

/// Locations of the documents the CLI reads and writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Schema dictionary JSON document
    #[serde(default = "default_dictionary_path")]
    pub dictionary: PathBuf,

    /// Metric catalog JSON document
    #[serde(default = "default_metrics_path")]
    pub metrics: PathBuf,

    /// Built-in metrics whose ids are reserved
    #[serde(default)]
    pub builtin_metrics: Option<PathBuf>,

    /// Directory receiving one `.sql` file per layer
    #[serde(default = "default_ddl_dir")]
    pub ddl_dir: PathBuf,
}

fn default_dictionary_path() -> PathBuf {
    PathBuf::from("data/dictionary.json")
}

fn default_metrics_path() -> PathBuf {
    PathBuf::from("data/metrics.json")
}

fn default_ddl_dir() -> PathBuf {
    PathBuf::from("sql")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dictionary: default_dictionary_path(),
            metrics: default_metrics_path(),
            builtin_metrics: None,
            ddl_dir: default_ddl_dir(),
        }
    }
}

/// DDL rendering options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlConfig {
    /// Emit `IF NOT EXISTS` / `IF EXISTS` guards
    #[serde(default = "default_true")]
    pub if_not_exists: bool,

    /// Emit foreign key constraints for resolvable relationships
    #[serde(default = "default_true")]
    pub foreign_keys: bool,

    /// Qualify tables with a per-layer schema (`l1`, `l2`, `l3`)
    #[serde(default = "default_true")]
    pub schema_per_layer: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DdlConfig {
    fn default() -> Self {
        Self {
            if_not_exists: true,
            foreign_keys: true,
            schema_per_layer: true,
        }
    }
}

/// Metric catalog options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Ids import must never overwrite
    #[serde(default)]
    pub reserved_ids: Vec<String>,
}

/// Database used when generated DDL is executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Name of the environment variable holding the connection string
    #[serde(default = "default_url_env")]
    pub url_env: String,
}

fn default_url_env() -> String {
    DEFAULT_DATABASE_URL_ENV.to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url_env: default_url_env(),
        }
    }
}

/// Severity threshold overrides for specific diagnostic codes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityThreshold {
    /// Map of diagnostic code to severity override
    #[serde(default)]
    pub overrides: HashMap<String, Severity>,
}

impl SeverityThreshold {
    /// Get severity for a diagnostic code, or default
    pub fn get_severity(&self, code: DiagnosticCode, default: Severity) -> Severity {
        self.overrides
            .get(code.as_str())
            .copied()
            .unwrap_or(default)
    }

    /// Set severity override for a code
    pub fn set_override(&mut self, code: DiagnosticCode, severity: Severity) {
        self.overrides.insert(code.as_str().to_string(), severity);
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub ddl: DdlConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub severity: SeverityThreshold,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            ddl: DdlConfig::default(),
            metrics: MetricsConfig::default(),
            database: DatabaseConfig::default(),
            severity: SeverityThreshold::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Resolve a configured path against the project root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.ddl.if_not_exists);
        assert_eq!(config.database.url_env, DEFAULT_DATABASE_URL_ENV);
        assert_eq!(config.paths.ddl_dir, PathBuf::from("sql"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = Config::from_toml(
            r#"
            [ddl]
            foreign_keys = false

            [metrics]
            reserved_ids = ["EXP-001", "EXP-002"]
            "#,
        )
        .unwrap();

        assert!(!config.ddl.foreign_keys);
        assert!(config.ddl.schema_per_layer);
        assert_eq!(config.metrics.reserved_ids.len(), 2);
        assert_eq!(config.paths.dictionary, PathBuf::from("data/dictionary.json"));
    }

    #[test]
    fn severity_override() {
        let mut threshold = SeverityThreshold::default();
        threshold.set_override(DiagnosticCode::MetricUnresolvedSourceField, Severity::Error);

        assert_eq!(
            threshold.get_severity(DiagnosticCode::MetricUnresolvedSourceField, Severity::Warn),
            Severity::Error
        );
        assert_eq!(
            threshold.get_severity(DiagnosticCode::DdlEmptyTable, Severity::Info),
            Severity::Info
        );
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.ddl, parsed.ddl);
        assert_eq!(config.paths, parsed.paths);
    }

    #[test]
    fn relative_paths_resolve_against_root() {
        let mut config = Config::default();
        config.project_root = PathBuf::from("/srv/model");
        assert_eq!(
            config.resolve(&config.paths.metrics.clone()),
            PathBuf::from("/srv/model/data/metrics.json")
        );
    }
}
