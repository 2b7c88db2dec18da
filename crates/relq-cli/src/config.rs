//! Configuration system for the relq CLI
//!
//! Loads configuration from:
//! 1. config.yaml - translator, output and logging settings
//! 2. .env file - loaded into the environment before anything else
//!
//! Environment variables always override config.yaml values. A missing
//! config file means defaults plus environment.

use clap::ValueEnum;
use relq_sql::{dialect_by_name, TranslatorOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::cli::OutputFormat;

const MAX_INDENT_WIDTH: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Translator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// SQL dialect name
    pub dialect: String,

    /// Spaces per indentation level in emitted SQL
    pub indent_width: usize,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            dialect: "sqlserver".to_string(),
            indent_width: TranslatorOptions::default().indent_width,
        }
    }
}

impl TranslatorConfig {
    pub fn options(&self) -> TranslatorOptions {
        TranslatorOptions {
            indent_width: self.indent_width,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stderr, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
            output: "stderr".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub translator: TranslatorConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.with_env_overrides()
    }

    /// Defaults with environment variable overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::default().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(dialect) = std::env::var("RELQ_DIALECT") {
            self.translator.dialect = dialect;
        }
        if let Ok(width) = std::env::var("RELQ_INDENT_WIDTH") {
            self.translator.indent_width = width
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("RELQ_INDENT_WIDTH={}", width)))?;
        }
        if let Ok(format) = std::env::var("RELQ_OUTPUT_FORMAT") {
            self.output.format = OutputFormat::from_str(&format, true)
                .map_err(|_| ConfigError::Invalid(format!("RELQ_OUTPUT_FORMAT={}", format)))?;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if dialect_by_name(&self.translator.dialect).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unknown dialect '{}'",
                self.translator.dialect
            )));
        }
        if self.translator.indent_width > MAX_INDENT_WIDTH {
            return Err(ConfigError::Invalid(format!(
                "indent_width {} exceeds {}",
                self.translator.indent_width, MAX_INDENT_WIDTH
            )));
        }
        Ok(())
    }

    /// Set logging environment variables for the logging module
    pub fn apply_logging_env(&self) {
        std::env::set_var("RUST_LOG", &self.logging.level);
        std::env::set_var("LOG_FORMAT", &self.logging.format);
        std::env::set_var("LOG_OUTPUT", &self.logging.output);
        std::env::set_var("LOG_DIR", &self.logging.directory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.translator.dialect, "sqlserver");
        assert_eq!(config.translator.indent_width, 4);
        assert_eq!(config.output.format, OutputFormat::Text);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.output, "stderr");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("translator:\n  indent_width: 2\n").unwrap();
        assert_eq!(config.translator.indent_width, 2);
        assert_eq!(config.translator.dialect, "sqlserver");
        assert_eq!(config.output.format, OutputFormat::Text);
    }

    #[test]
    fn test_env_var_override() {
        std::env::set_var("RELQ_INDENT_WIDTH", "2");
        std::env::set_var("RELQ_OUTPUT_FORMAT", "json");

        let config_yaml = r#"
translator:
  dialect: "sqlserver"
  indent_width: 4
output:
  format: "text"
logging:
  level: "info"
  format: "pretty"
  output: "stderr"
  directory: "./logs"
"#;
        let temp_file = std::env::temp_dir().join("relq_test_config.yaml");
        std::fs::write(&temp_file, config_yaml).unwrap();

        let config = Config::load(&temp_file).unwrap();
        assert_eq!(config.translator.indent_width, 2); // Overridden
        assert_eq!(config.output.format, OutputFormat::Json); // Overridden

        std::env::remove_var("RELQ_INDENT_WIDTH");
        std::env::remove_var("RELQ_OUTPUT_FORMAT");
        std::fs::remove_file(temp_file).ok();
    }

    #[test]
    fn test_unknown_dialect_is_invalid() {
        let mut config = Config::default();
        config.translator.dialect = "oracle".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let missing = std::env::temp_dir().join("relq_no_such_config.yaml");
        assert!(matches!(Config::load(missing), Err(ConfigError::Io(_))));
    }
}
