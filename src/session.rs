//! Session-scoped context shared by every validator.
//!
//! A session is initialized once before any task runs and is read-only
//! afterwards:
//! - a snapshot of the configuration
//! - the device context, resolved once instead of rediscovered per task
//! - the environment descriptor, built on first use

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::config::Config;
use crate::environment::EnvironmentDescriptor;
use crate::runtime::{AgentRuntime, RuntimeInfo};

/// Device the session's tasks run against
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceContext {
    /// Resolved device id (None for browser targets)
    pub device_id: Option<String>,
    /// Automation server address
    pub server: String,
}

impl DeviceContext {
    pub fn new(device_id: Option<String>, server: impl Into<String>) -> Self {
        Self {
            device_id,
            server: server.into(),
        }
    }

    /// Append the device to an instruction so the agent skips discovery
    pub fn annotate(&self, instruction: &str) -> String {
        match &self.device_id {
            Some(id) => format!("{}\nTarget device: {}", instruction, id),
            None => instruction.to_string(),
        }
    }
}

/// Process-wide state for one test session
#[derive(Debug)]
pub struct SessionContext {
    id: String,
    started: DateTime<Utc>,
    config: Config,
    runtime: RuntimeInfo,
    device: DeviceContext,
    environment: OnceCell<EnvironmentDescriptor>,
    environment_reported: OnceCell<bool>,
}

impl SessionContext {
    /// Create a session from already-resolved parts
    pub fn new(config: Config, runtime: RuntimeInfo, device: DeviceContext) -> Self {
        Self {
            id: generate_session_id(),
            started: Utc::now(),
            config,
            runtime,
            device,
            environment: OnceCell::new(),
            environment_reported: OnceCell::new(),
        }
    }

    /// Resolve the device once and build the shared session.
    ///
    /// A pinned `device_id` in the configuration wins over discovery. A
    /// failed discovery leaves the session without a device.
    pub async fn initialize(config: Config, runtime: &dyn AgentRuntime) -> Arc<Self> {
        let device_id = match &config.target.device_id {
            Some(id) => Some(id.clone()),
            None => match runtime.resolve_device().await {
                Ok(id) => id,
                Err(err) => {
                    warn!(error = %err, "device discovery failed; continuing without a device");
                    None
                }
            },
        };
        let device = DeviceContext::new(device_id, config.target.device_server.clone());
        let session = Self::new(config, runtime.info(), device);
        info!(
            session = %session.id,
            device = ?session.device.device_id,
            runtime = %session.runtime.name,
            "session initialized"
        );
        Arc::new(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn runtime_info(&self) -> &RuntimeInfo {
        &self.runtime
    }

    pub fn device(&self) -> &DeviceContext {
        &self.device
    }

    /// Environment descriptor, collected on first access
    pub fn environment(&self) -> &EnvironmentDescriptor {
        self.environment
            .get_or_init(|| EnvironmentDescriptor::collect(&self.config, &self.runtime, &self.device))
    }

    pub(crate) fn environment_reported(&self) -> &OnceCell<bool> {
        &self.environment_reported
    }

    /// Main instruction as dispatched: target location prefix plus device
    pub fn compose_instruction(&self, instruction: &str) -> String {
        let task = match &self.config.target.base_url {
            Some(url) => format!("Go to {}, then {}", url, instruction),
            None => instruction.to_string(),
        };
        self.device.annotate(&task)
    }

    /// Precondition as dispatched: device only, no target location
    pub fn compose_precondition(&self, instruction: &str) -> String {
        self.device.annotate(instruction)
    }
}

/// Generate a unique session ID
fn generate_session_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let pid = std::process::id();
    format!("session_{}_{}", timestamp, pid)
}

/// Sanitize a name for use in file names and report ids
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ScriptedRuntime;

    fn session_with(config: Config, device: Option<&str>) -> SessionContext {
        SessionContext::new(
            config,
            RuntimeInfo::new("test"),
            DeviceContext::new(device.map(str::to_string), "http://127.0.0.1:4723"),
        )
    }

    #[test]
    fn test_session_id() {
        let session = session_with(Config::defaults(), None);
        assert!(session.id().starts_with("session_"));
    }

    #[test]
    fn test_compose_instruction_plain() {
        let session = session_with(Config::defaults(), None);
        assert_eq!(session.compose_instruction("open the menu"), "open the menu");
    }

    #[test]
    fn test_compose_instruction_with_base_url_and_device() {
        let config = Config::defaults().with_base_url("https://discuss.google.dev/");
        let session = session_with(config, Some("emulator-5554"));
        assert_eq!(
            session.compose_instruction("find the search box"),
            "Go to https://discuss.google.dev/, then find the search box\nTarget device: emulator-5554"
        );
        assert_eq!(
            session.compose_precondition("launch Chrome"),
            "launch Chrome\nTarget device: emulator-5554"
        );
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("hello world"), "hello_world");
        assert_eq!(sanitize_name("ctrl+c"), "ctrl_c");
        assert_eq!(sanitize_name("a/b\\c"), "a_b_c");
    }

    #[tokio::test]
    async fn test_initialize_prefers_pinned_device() {
        let runtime = ScriptedRuntime::new().with_device("discovered");
        let config = Config::defaults().with_device_id("pinned");
        let session = SessionContext::initialize(config, &runtime).await;
        assert_eq!(session.device().device_id.as_deref(), Some("pinned"));
        assert_eq!(runtime.device_queries(), 0);
    }

    #[tokio::test]
    async fn test_initialize_discovers_device_once() {
        let runtime = ScriptedRuntime::new().with_device("emulator-5554");
        let session = SessionContext::initialize(Config::defaults(), &runtime).await;
        assert_eq!(session.device().device_id.as_deref(), Some("emulator-5554"));
        assert_eq!(runtime.device_queries(), 1);
    }
}
