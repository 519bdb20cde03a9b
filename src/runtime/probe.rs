//! Direct device probes.
//!
//! A probe captures the screen or the accessibility tree without going
//! through the agent, so captures never cost a model round-trip.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Result type for probe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors that can occur while probing a device
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe does not offer this capture
    #[error("{0} capture is not supported by this probe")]
    Unsupported(&'static str),

    /// The capture ran but produced nothing usable
    #[error("Capture failed: {0}")]
    Capture(String),

    /// The capture did not finish in time
    #[error("Capture timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for device probes
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    /// Capture the current screen as encoded image bytes (PNG or JPEG)
    async fn screenshot(&self) -> ProbeResult<Vec<u8>>;

    /// Dump the current accessibility tree
    async fn accessibility_tree(&self) -> ProbeResult<String> {
        Err(ProbeError::Unsupported("accessibility tree"))
    }
}

/// Run a capture future with an upper bound on its duration
pub async fn with_timeout<T, F>(timeout: Duration, capture: F) -> ProbeResult<T>
where
    F: Future<Output = ProbeResult<T>>,
{
    match tokio::time::timeout(timeout, capture).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    }
}

/// Probe that shells out to `adb` for an Android device or emulator
#[derive(Debug, Clone)]
pub struct AdbProbe {
    /// adb binary to use
    pub adb: String,
    /// Target serial (`-s`), or the only connected device when None
    pub serial: Option<String>,
}

impl AdbProbe {
    pub fn new(serial: Option<String>) -> Self {
        Self {
            adb: "adb".to_string(),
            serial,
        }
    }

    /// Use a specific adb binary
    pub fn adb_path(mut self, adb: impl Into<String>) -> Self {
        self.adb = adb.into();
        self
    }

    fn base_args(&self) -> Vec<String> {
        match &self.serial {
            Some(serial) => vec!["-s".to_string(), serial.clone()],
            None => Vec::new(),
        }
    }

    async fn exec_out(&self, args: &[&str]) -> ProbeResult<Vec<u8>> {
        let output = Command::new(&self.adb)
            .args(self.base_args())
            .arg("exec-out")
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProbeError::Capture(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl DeviceProbe for AdbProbe {
    async fn screenshot(&self) -> ProbeResult<Vec<u8>> {
        let bytes = self.exec_out(&["screencap", "-p"]).await?;
        if !bytes.starts_with(b"\x89PNG") {
            return Err(ProbeError::Capture(
                "screencap did not return PNG data".to_string(),
            ));
        }
        Ok(bytes)
    }

    async fn accessibility_tree(&self) -> ProbeResult<String> {
        let bytes = self.exec_out(&["uiautomator", "dump", "/dev/tty"]).await?;
        let dump = String::from_utf8_lossy(&bytes);
        // uiautomator appends a status line after the XML
        let xml = match dump.rfind("</hierarchy>") {
            Some(end) => &dump[..end + "</hierarchy>".len()],
            None => dump.trim(),
        };
        Ok(xml.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowProbe;

    #[async_trait]
    impl DeviceProbe for SlowProbe {
        async fn screenshot(&self) -> ProbeResult<Vec<u8>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_with_timeout_elapses() {
        let probe = SlowProbe;
        let err = with_timeout(Duration::from_millis(20), probe.screenshot())
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_accessibility_tree_unsupported_by_default() {
        let err = SlowProbe.accessibility_tree().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "accessibility tree capture is not supported by this probe"
        );
    }

    #[test]
    fn test_adb_probe_serial_args() {
        assert!(AdbProbe::new(None).base_args().is_empty());
        assert_eq!(
            AdbProbe::new(Some("emulator-5554".to_string())).base_args(),
            vec!["-s", "emulator-5554"]
        );
    }
}
