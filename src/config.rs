//! Production configuration system
//!
//! Provides centralized configuration management with:
//! - Environment variable support
//! - Config file loading (optional)
//! - Runtime defaults
//! - Validation and type safety

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Analysis pipeline configuration
    pub analysis: AnalysisConfig,

    /// Remote token validation configuration
    pub remote: RemoteValidationConfig,

    /// Paths configuration
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Number of transcript files processed concurrently
    pub parallel_files: usize,
    /// Files larger than this are skipped entirely
    pub max_file_size_mb: u64,
    /// Wall-clock budget per file; partial results are discarded on overrun
    pub file_budget_secs: u64,
    /// Per-role sample count retained per session
    pub sample_limit: usize,
    /// Maximum characters retained per sample
    pub sample_max_chars: usize,
    /// Local estimation ratio (characters per token)
    pub chars_per_token: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteValidationConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Consecutive failures before the validator is disabled for the run
    pub failure_threshold: u32,
    /// Maximum in-flight count-tokens requests
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub claude_home: PathBuf,
    pub log_directory: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "ERROR".to_string(),
                format: "pretty".to_string(),
                output: "console".to_string(),
            },
            analysis: AnalysisConfig {
                parallel_files: 4,
                max_file_size_mb: 100,
                file_budget_secs: 120,
                sample_limit: 10,
                sample_max_chars: 200,
                chars_per_token: 4.0,
            },
            remote: RemoteValidationConfig {
                endpoint: "https://api.anthropic.com/v1/messages/count_tokens".to_string(),
                model: "claude-sonnet-4-20250514".to_string(),
                timeout_secs: 30,
                failure_threshold: 5,
                max_in_flight: 4,
            },
            paths: PathsConfig {
                claude_home: dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".claude"),
                log_directory: PathBuf::from("logs"),
            },
        }
    }
}

impl Config {
    /// Load configuration from environment, file, and defaults
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        // Try to load from config file if it exists
        let config_paths = [
            PathBuf::from("token-audit.toml"),
            PathBuf::from(".token-audit.toml"),
            dirs::config_dir()
                .map(|d| d.join("token-audit").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.exists() {
                info!(config_file = %path.display(), "Loading configuration from file");
                config = Self::load_from_file(path)?;
                break;
            }
        }

        // Override with environment variables
        config.apply_env_overrides()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Logging overrides
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        // Analysis overrides
        if let Ok(val) = env::var("TOKEN_AUDIT_PARALLEL_FILES") {
            self.analysis.parallel_files =
                val.parse().context("Invalid TOKEN_AUDIT_PARALLEL_FILES")?;
        }
        if let Ok(val) = env::var("TOKEN_AUDIT_MAX_FILE_SIZE_MB") {
            self.analysis.max_file_size_mb =
                val.parse().context("Invalid TOKEN_AUDIT_MAX_FILE_SIZE_MB")?;
        }
        if let Ok(val) = env::var("TOKEN_AUDIT_FILE_BUDGET_SECS") {
            self.analysis.file_budget_secs =
                val.parse().context("Invalid TOKEN_AUDIT_FILE_BUDGET_SECS")?;
        }
        if let Ok(val) = env::var("TOKEN_AUDIT_CHARS_PER_TOKEN") {
            self.analysis.chars_per_token =
                val.parse().context("Invalid TOKEN_AUDIT_CHARS_PER_TOKEN")?;
        }

        // Remote validation overrides
        if let Ok(val) = env::var("TOKEN_AUDIT_API_TIMEOUT_SECS") {
            self.remote.timeout_secs =
                val.parse().context("Invalid TOKEN_AUDIT_API_TIMEOUT_SECS")?;
        }
        if let Ok(val) = env::var("TOKEN_AUDIT_FAILURE_THRESHOLD") {
            self.remote.failure_threshold =
                val.parse().context("Invalid TOKEN_AUDIT_FAILURE_THRESHOLD")?;
        }
        if let Ok(val) = env::var("TOKEN_AUDIT_MAX_IN_FLIGHT") {
            self.remote.max_in_flight =
                val.parse().context("Invalid TOKEN_AUDIT_MAX_IN_FLIGHT")?;
        }
        if let Ok(val) = env::var("TOKEN_AUDIT_COUNT_MODEL") {
            self.remote.model = val;
        }

        // Path overrides
        if let Ok(val) = env::var("CLAUDE_HOME") {
            self.paths.claude_home = PathBuf::from(val);
        }
        if let Ok(val) = env::var("TOKEN_AUDIT_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.analysis.parallel_files == 0 {
            return Err(anyhow::anyhow!("parallel_files must be greater than 0"));
        }

        if self.analysis.chars_per_token <= 0.0 {
            return Err(anyhow::anyhow!(
                "chars_per_token must be positive, got {}",
                self.analysis.chars_per_token
            ));
        }

        if self.remote.failure_threshold == 0 {
            return Err(anyhow::anyhow!("failure_threshold must be greater than 0"));
        }

        if self.remote.max_in_flight == 0 {
            return Err(anyhow::anyhow!("max_in_flight must be greater than 0"));
        }

        if self.remote.timeout_secs == 0 || self.remote.timeout_secs > 300 {
            return Err(anyhow::anyhow!(
                "timeout_secs must be between 1 and 300, got {}",
                self.remote.timeout_secs
            ));
        }

        if self.analysis.max_file_size_mb == 0 {
            warn!("max_file_size_mb is 0, every file will be skipped");
        }

        Ok(())
    }
}

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration instance. A broken config file or
/// environment is downgraded to defaults with a warning; configuration
/// problems never abort an analysis run.
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(|| match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Failed to load configuration, using defaults");
            Config::default()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "ERROR");
        assert_eq!(config.analysis.parallel_files, 4);
        assert_eq!(config.analysis.chars_per_token, 4.0);
        assert_eq!(config.remote.failure_threshold, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_override() {
        env::set_var("TOKEN_AUDIT_FAILURE_THRESHOLD", "9");
        let mut config = Config::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.remote.failure_threshold, 9);
        env::remove_var("TOKEN_AUDIT_FAILURE_THRESHOLD");
    }

    #[test]
    fn test_validation_rejects_zero_parallelism() {
        let mut config = Config::default();
        config.analysis.parallel_files = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_ratio() {
        let mut config = Config::default();
        config.analysis.chars_per_token = -1.0;
        assert!(config.validate().is_err());
    }
}
