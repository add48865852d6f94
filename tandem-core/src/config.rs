//! Configuration management for Tandem
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (TANDEM_*)
//! 3. Config file (~/.config/tandem/config.toml)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Generation agent configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Path to the claude executable
    pub claude_path: String,

    /// Model to use for Claude
    pub model: Option<String>,

    /// Extra arguments passed before the prompt
    pub extra_args: Vec<String>,

    /// Time limit for one generation call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            claude_path: "claude".to_string(),
            model: None, // Let claude use its default
            extra_args: Vec::new(),
            timeout: Duration::from_secs(15 * 60),
        }
    }
}

/// Review model service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Model name used for reviews and debugging
    pub model: String,

    /// API base URL
    pub base_url: String,

    /// Time limit for one HTTP request
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Retries after the first attempt for transient failures
    pub max_retries: u32,

    /// Delay before the first retry; doubled on each attempt
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Upper bound on a single retry delay
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-pro".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Test command configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TestsConfig {
    /// Shell command that runs the project's tests
    pub command: String,

    /// Time limit for one test run
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            command: "pytest".to_string(),
            timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// Audit report configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Report file, relative to the working directory unless absolute
    pub path: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("dev_report.md"),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Generation agent configuration
    pub agent: AgentConfig,

    /// Review service configuration
    pub review: ReviewConfig,

    /// Test command configuration
    pub tests: TestsConfig,

    /// Report configuration
    pub report: ReportConfig,
}

/// Values supplied on the command line; `None` leaves the lower layers in place
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub claude_path: Option<String>,
    pub model: Option<String>,
    pub review_model: Option<String>,
    pub test_command: Option<String>,
    pub report_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if let Some(path) = config_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/tandem/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tandem").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - TANDEM_CLAUDE_PATH: Path to claude executable
    /// - TANDEM_MODEL: Model for the generation agent
    /// - TANDEM_REVIEW_MODEL: Model for the review service
    /// - TANDEM_TEST_COMMAND: Test command
    /// - TANDEM_REPORT_PATH: Report file
    pub fn with_env_overrides(self) -> Self {
        self.with_cli_overrides(CliOverrides {
            claude_path: std::env::var("TANDEM_CLAUDE_PATH").ok(),
            model: std::env::var("TANDEM_MODEL").ok(),
            review_model: std::env::var("TANDEM_REVIEW_MODEL").ok(),
            test_command: std::env::var("TANDEM_TEST_COMMAND").ok(),
            report_path: std::env::var("TANDEM_REPORT_PATH").ok().map(PathBuf::from),
        })
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, overrides: CliOverrides) -> Self {
        if let Some(path) = overrides.claude_path {
            self.agent.claude_path = path;
        }

        if let Some(m) = overrides.model {
            self.agent.model = Some(m);
        }

        if let Some(m) = overrides.review_model {
            self.review.model = m;
        }

        if let Some(cmd) = overrides.test_command {
            self.tests.command = cmd;
        }

        if let Some(path) = overrides.report_path {
            self.report.path = path;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(overrides: CliOverrides) -> Result<Self> {
        let config = Self::load()?
            .with_env_overrides()
            .with_cli_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.agent.claude_path.trim().is_empty() {
            return Err(Error::Config("agent.claude_path must not be empty".to_string()));
        }
        if self.tests.command.trim().is_empty() {
            return Err(Error::Config("tests.command must not be empty".to_string()));
        }
        if self.review.model.trim().is_empty() {
            return Err(Error::Config("review.model must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.agent.claude_path, "claude");
        assert!(config.agent.model.is_none());
        assert_eq!(config.tests.command, "pytest");
        assert_eq!(config.report.path, PathBuf::from("dev_report.md"));
        assert_eq!(config.review.max_retries, 3);
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default().with_cli_overrides(CliOverrides {
            claude_path: Some("/custom/claude".to_string()),
            model: Some("opus".to_string()),
            test_command: Some("cargo test".to_string()),
            ..Default::default()
        });

        assert_eq!(config.agent.claude_path, "/custom/claude");
        assert_eq!(config.agent.model, Some("opus".to_string()));
        assert_eq!(config.tests.command, "cargo test");
        // Untouched values keep their defaults
        assert_eq!(config.review.model, "gemini-1.5-pro");
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[agent]
claude_path = "/usr/local/bin/claude"
model = "claude-sonnet-4-20250514"
timeout = "5m"

[review]
model = "gemini-2.0-flash"
initial_backoff = "250ms"

[tests]
command = "npm test"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.agent.claude_path, "/usr/local/bin/claude");
        assert_eq!(
            config.agent.model,
            Some("claude-sonnet-4-20250514".to_string())
        );
        assert_eq!(config.agent.timeout, Duration::from_secs(300));
        assert_eq!(config.review.model, "gemini-2.0-flash");
        assert_eq!(config.review.initial_backoff, Duration::from_millis(250));
        assert_eq!(config.tests.command, "npm test");
    }

    #[test]
    fn test_partial_toml() {
        let toml = r#"
[agent]
model = "opus"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        // claude_path should use default
        assert_eq!(config.agent.claude_path, "claude");
        assert_eq!(config.agent.model, Some("opus".to_string()));
        assert_eq!(config.tests.timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_load_from_file_reports_parse_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent\nclaude_path = 1").unwrap();

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_empty_test_command() {
        let mut config = Config::default();
        config.tests.command = "   ".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
