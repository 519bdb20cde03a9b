//! Session environment reporting.
//!
//! Builds the environment descriptor (host, runtime, automation library,
//! model, headless flag) once per session and hands it to the report sink
//! as a properties artifact. Properties that cannot be determined degrade to
//! `unknown` instead of failing session startup.

use std::process::Command;

use tracing::{error, warn};

use crate::config::Config;
use crate::report::ReportSink;
use crate::runtime::RuntimeInfo;
use crate::session::{DeviceContext, SessionContext};

/// Placeholder for properties that could not be determined
pub const UNKNOWN: &str = "unknown";

/// Ordered property map describing the test environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentDescriptor {
    properties: Vec<(String, String)>,
}

impl EnvironmentDescriptor {
    /// Query the host and combine it with runtime and configuration details
    pub fn collect(config: &Config, runtime: &RuntimeInfo, device: &DeviceContext) -> Self {
        let mut descriptor = Self {
            properties: Vec::new(),
        };
        descriptor.push("operating_system", Some(operating_system()));
        descriptor.push("hostname", host_name());
        descriptor.push("harness_version", Some(env!("CARGO_PKG_VERSION").to_string()));
        descriptor.push("agent_runtime", Some(runtime.name.clone()));
        descriptor.push("agent_runtime_version", runtime.version.clone());
        descriptor.push("automation_library", runtime.automation.clone());
        descriptor.push("target_platform", runtime.platform.clone());
        descriptor.push("browser_type", runtime.browser.clone());
        descriptor.push("headless_mode", Some(config.target.headless.to_string()));
        descriptor.push("llm_model", Some(config.agent.model.clone()));
        descriptor.push("device_id", device.device_id.clone());
        descriptor
    }

    fn push(&mut self, key: &str, value: Option<String>) {
        let value = value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());
        self.properties.push((key.to_string(), value));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }
}

/// Writes the session environment to a sink, once per session
pub struct EnvironmentReporter;

impl EnvironmentReporter {
    /// Write the environment properties unless this session already did.
    ///
    /// Returns whether the (first) write succeeded. Write failures are logged,
    /// never raised.
    pub fn report(session: &SessionContext, sink: &dyn ReportSink) -> bool {
        *session.environment_reported().get_or_init(|| {
            match sink.write_environment(session.environment().properties()) {
                Ok(()) => true,
                Err(err) => {
                    error!(error = %err, "failed to write environment properties");
                    false
                }
            }
        })
    }
}

fn operating_system() -> String {
    let release = os_release().unwrap_or_else(|| UNKNOWN.to_string());
    format!("{} {}", std::env::consts::OS, release)
}

fn os_release() -> Option<String> {
    match Command::new("uname").arg("-r").output() {
        Ok(output) if output.status.success() => {
            let release = String::from_utf8_lossy(&output.stdout).trim().to_string();
            (!release.is_empty()).then_some(release)
        }
        Ok(_) => None,
        Err(err) => {
            warn!(error = %err, "could not determine OS release");
            None
        }
    }
}

fn host_name() -> Option<String> {
    hostname::get().ok().and_then(|h| h.into_string().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemorySink;

    fn descriptor() -> EnvironmentDescriptor {
        let runtime = RuntimeInfo::new("browser-use")
            .version("0.5.4")
            .automation("playwright 1.52.0")
            .browser("chromium");
        EnvironmentDescriptor::collect(
            &Config::defaults().with_model("gpt-4o"),
            &runtime,
            &DeviceContext::default(),
        )
    }

    #[test]
    fn test_collect_property_order() {
        let descriptor = descriptor();
        let keys: Vec<&str> = descriptor
            .properties()
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(
            keys,
            vec![
                "operating_system",
                "hostname",
                "harness_version",
                "agent_runtime",
                "agent_runtime_version",
                "automation_library",
                "target_platform",
                "browser_type",
                "headless_mode",
                "llm_model",
                "device_id",
            ]
        );
    }

    #[test]
    fn test_missing_values_degrade_to_unknown() {
        let env = descriptor();
        assert_eq!(env.get("target_platform"), Some(UNKNOWN));
        assert_eq!(env.get("device_id"), Some(UNKNOWN));
        assert_eq!(env.get("agent_runtime"), Some("browser-use"));
        assert_eq!(env.get("headless_mode"), Some("true"));
        assert_eq!(env.get("llm_model"), Some("gpt-4o"));
    }

    #[test]
    fn test_report_writes_once() {
        let session = SessionContext::new(
            Config::defaults(),
            RuntimeInfo::new("scripted"),
            DeviceContext::default(),
        );
        let sink = MemorySink::new();
        assert!(EnvironmentReporter::report(&session, &sink));
        assert!(EnvironmentReporter::report(&session, &sink));
        assert_eq!(sink.environments().len(), 1);
    }
}
