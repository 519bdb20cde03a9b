//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for the harness, supporting:
//! - Environment variables for all configurable values
//! - Sensible defaults for local runs
//! - Builder pattern for programmatic configuration
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `AGENT_HARNESS_BASE_URL` | Target location prepended to every main instruction | unset |
//! | `AGENT_HARNESS_DEVICE_ID` | Pinned device id (skips device discovery) | unset |
//! | `AGENT_HARNESS_DEVICE_SERVER` | Automation server address | `http://127.0.0.1:4723` |
//! | `AGENT_HARNESS_HEADLESS` | Run the browser headless | `true` |
//! | `AGENT_HARNESS_MODEL` | Model identifier used by the agent | `gpt-4o` |
//! | `AGENT_HARNESS_TASK_TIMEOUT` | Per-dispatch timeout in seconds | `150` |
//! | `AGENT_HARNESS_CAPTURE_TIMEOUT` | Screenshot/tree capture timeout in seconds | `15` |
//! | `AGENT_HARNESS_SLOW_TASK` | Performance warning threshold in seconds | `60` |
//! | `AGENT_HARNESS_RESULTS_DIR` | Allure results directory | `./allure-results` |
//!
//! # Example
//!
//! ```bash
//! export AGENT_HARNESS_BASE_URL="https://discuss.google.dev/"
//! export AGENT_HARNESS_HEADLESS=false
//! export AGENT_HARNESS_TASK_TIMEOUT=300
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// Default Values
// ============================================================================

/// Default automation server address (Appium)
pub const DEFAULT_DEVICE_SERVER: &str = "http://127.0.0.1:4723";

/// Default model identifier
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default headless flag
pub const DEFAULT_HEADLESS: bool = true;

/// Default dispatch timeout (seconds)
pub const DEFAULT_TASK_TIMEOUT: u64 = 150;

/// Default capture timeout (seconds)
pub const DEFAULT_CAPTURE_TIMEOUT: u64 = 15;

/// Default performance warning threshold (seconds)
pub const DEFAULT_SLOW_TASK_THRESHOLD: u64 = 60;

/// Default Allure results directory
pub const DEFAULT_RESULTS_DIR: &str = "./allure-results";

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_BASE_URL: &str = "AGENT_HARNESS_BASE_URL";
pub const ENV_DEVICE_ID: &str = "AGENT_HARNESS_DEVICE_ID";
pub const ENV_DEVICE_SERVER: &str = "AGENT_HARNESS_DEVICE_SERVER";
pub const ENV_HEADLESS: &str = "AGENT_HARNESS_HEADLESS";
pub const ENV_MODEL: &str = "AGENT_HARNESS_MODEL";
pub const ENV_TASK_TIMEOUT: &str = "AGENT_HARNESS_TASK_TIMEOUT";
pub const ENV_CAPTURE_TIMEOUT: &str = "AGENT_HARNESS_CAPTURE_TIMEOUT";
pub const ENV_SLOW_TASK: &str = "AGENT_HARNESS_SLOW_TASK";
pub const ENV_RESULTS_DIR: &str = "AGENT_HARNESS_RESULTS_DIR";

/// Legacy headless toggle shared with browser-use setups
pub const ENV_HEADLESS_LEGACY: &str = "HEADLESS";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized harness configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Where tasks are aimed
    pub target: TargetSettings,
    /// Agent runtime settings
    pub agent: AgentSettings,
    /// Report output settings
    pub report: ReportSettings,
}

/// Target location and device settings
#[derive(Debug, Clone)]
pub struct TargetSettings {
    /// Base URL prepended to main instructions
    pub base_url: Option<String>,
    /// Device id pinned by the caller
    pub device_id: Option<String>,
    /// Automation server address
    pub device_server: String,
    /// Headless browser flag
    pub headless: bool,
}

/// Agent runtime settings
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Model identifier
    pub model: String,
    /// Dispatch timeout (seconds)
    pub task_timeout_secs: u64,
    /// Probe capture timeout (seconds)
    pub capture_timeout_secs: u64,
    /// Performance warning threshold (seconds)
    pub slow_task_secs: u64,
}

/// Report settings
#[derive(Debug, Clone)]
pub struct ReportSettings {
    /// Allure results directory
    pub results_dir: PathBuf,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            target: TargetSettings::from_env(),
            agent: AgentSettings::from_env(),
            report: ReportSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            target: TargetSettings::defaults(),
            agent: AgentSettings::defaults(),
            report: ReportSettings::defaults(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.target.base_url = Some(base_url.into());
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.target.device_id = Some(device_id.into());
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.target.headless = headless;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.agent.model = model.into();
        self
    }

    pub fn with_task_timeout(mut self, seconds: u64) -> Self {
        self.agent.task_timeout_secs = seconds;
        self
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report.results_dir = dir.into();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl TargetSettings {
    /// Create target settings from environment variables
    pub fn from_env() -> Self {
        Self {
            base_url: non_empty_var(ENV_BASE_URL),
            device_id: non_empty_var(ENV_DEVICE_ID),
            device_server: env::var(ENV_DEVICE_SERVER)
                .unwrap_or_else(|_| DEFAULT_DEVICE_SERVER.to_string()),
            headless: env::var(ENV_HEADLESS)
                .or_else(|_| env::var(ENV_HEADLESS_LEGACY))
                .ok()
                .map(|s| parse_flag(&s))
                .unwrap_or(DEFAULT_HEADLESS),
        }
    }

    /// Create target settings with defaults
    pub fn defaults() -> Self {
        Self {
            base_url: None,
            device_id: None,
            device_server: DEFAULT_DEVICE_SERVER.to_string(),
            headless: DEFAULT_HEADLESS,
        }
    }
}

impl AgentSettings {
    /// Create agent settings from environment variables
    pub fn from_env() -> Self {
        Self {
            model: env::var(ENV_MODEL).unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            task_timeout_secs: parse_var(ENV_TASK_TIMEOUT).unwrap_or(DEFAULT_TASK_TIMEOUT),
            capture_timeout_secs: parse_var(ENV_CAPTURE_TIMEOUT)
                .unwrap_or(DEFAULT_CAPTURE_TIMEOUT),
            slow_task_secs: parse_var(ENV_SLOW_TASK).unwrap_or(DEFAULT_SLOW_TASK_THRESHOLD),
        }
    }

    /// Create agent settings with defaults
    pub fn defaults() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            task_timeout_secs: DEFAULT_TASK_TIMEOUT,
            capture_timeout_secs: DEFAULT_CAPTURE_TIMEOUT,
            slow_task_secs: DEFAULT_SLOW_TASK_THRESHOLD,
        }
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    pub fn slow_task_threshold(&self) -> Duration {
        Duration::from_secs(self.slow_task_secs)
    }
}

impl ReportSettings {
    /// Create report settings from environment variables
    pub fn from_env() -> Self {
        Self {
            results_dir: env::var(ENV_RESULTS_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_RESULTS_DIR)),
        }
    }

    /// Create report settings with defaults
    pub fn defaults() -> Self {
        Self {
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Interpret a boolean flag the way `HEADLESS=True` setups expect.
/// Accepts: "true", "1", "t", "yes" (case-insensitive); anything else is false.
fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "t" | "yes"
    )
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag_truthy() {
        assert!(parse_flag("true"));
        assert!(parse_flag("True"));
        assert!(parse_flag("1"));
        assert!(parse_flag(" t "));
    }

    #[test]
    fn test_parse_flag_falsy() {
        assert!(!parse_flag("false"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
        assert!(!parse_flag("off"));
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.target.base_url, None);
        assert_eq!(config.target.device_server, DEFAULT_DEVICE_SERVER);
        assert!(config.target.headless);
        assert_eq!(config.agent.model, DEFAULT_MODEL);
        assert_eq!(config.agent.task_timeout(), Duration::from_secs(150));
        assert_eq!(config.report.results_dir, PathBuf::from(DEFAULT_RESULTS_DIR));
    }

    #[test]
    fn test_config_builder() {
        let config = Config::defaults()
            .with_base_url("https://example.com/")
            .with_device_id("emulator-5554")
            .with_headless(false)
            .with_model("gpt-4o-mini")
            .with_task_timeout(30)
            .with_results_dir("/tmp/results");

        assert_eq!(config.target.base_url.as_deref(), Some("https://example.com/"));
        assert_eq!(config.target.device_id.as_deref(), Some("emulator-5554"));
        assert!(!config.target.headless);
        assert_eq!(config.agent.model, "gpt-4o-mini");
        assert_eq!(config.agent.task_timeout_secs, 30);
        assert_eq!(config.report.results_dir, PathBuf::from("/tmp/results"));
    }
}
