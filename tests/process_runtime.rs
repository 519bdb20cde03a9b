//! Process bridge against small shell agents.
#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use agent_harness::config::Config;
use agent_harness::report::MemorySink;
use agent_harness::runtime::{
    AgentError, AgentRuntime, ProcessRuntime, ProcessRuntimeConfig, RuntimeEvent,
};
use agent_harness::session::{DeviceContext, SessionContext};
use agent_harness::validator::{TaskValidator, ValidationError};
use tempfile::TempDir;
use tokio::sync::mpsc;

fn write_agent(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("agent.sh");
    fs::write(&path, format!("read line\n{}\n", body)).unwrap();
    path
}

fn runtime_for(script: &Path) -> Arc<ProcessRuntime> {
    Arc::new(ProcessRuntime::new(
        ProcessRuntimeConfig::new("sh").arg(script.to_string_lossy()),
    ))
}

fn validator_for(runtime: Arc<ProcessRuntime>, sink: Arc<MemorySink>) -> TaskValidator {
    let session = Arc::new(SessionContext::new(
        Config::defaults(),
        runtime.info(),
        DeviceContext::default(),
    ));
    TaskValidator::new(runtime, sink, session)
}

#[tokio::test]
async fn streams_steps_and_final_text() {
    let dir = TempDir::new().unwrap();
    let script = write_agent(
        &dir,
        r#"echo "INFO starting browser"
echo '{"type":"trace","event":"tool_start","name":"go_to_url","input":{"url":"https://example.com"}}'
echo '{"type":"step","action":"go_to_url","params":{"url":"https://example.com"},"thoughts":"open the page","url":"https://example.com","duration_secs":0.5}'
echo '{"type":"final","text":"Example Domain is displayed"}'"#,
    );
    let sink = Arc::new(MemorySink::new());
    let validator = validator_for(runtime_for(&script), sink.clone());

    let text = validator
        .validate_task("open example.com", Some("example domain"), true)
        .await
        .unwrap();
    assert_eq!(text, "Example Domain is displayed");

    let root = sink.current().unwrap();
    let step = root
        .find_step("Action: go_to_url(url=https://example.com)")
        .unwrap();
    assert_eq!(
        step.attachment("Step Duration").and_then(|a| a.as_text()),
        Some("0.50s")
    );
    let dispatch = root
        .find_step("Running agent with task: open example.com")
        .unwrap();
    let trace = dispatch
        .attachment("Agent Tool Start")
        .and_then(|a| a.as_text())
        .unwrap();
    assert_eq!(trace, r#"[TOOL:START] go_to_url args={"url":"https://example.com"}"#);
}

#[tokio::test]
async fn instruction_is_sent_on_stdin() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("echo.sh");
    fs::write(
        &script,
        "read line\nprintf '{\"type\":\"final\",\"text\":%s}\\n' \"$(printf '%s' \"$line\" | sed 's/^{\"instruction\"://; s/}$//')\"\n",
    )
    .unwrap();

    let runtime = runtime_for(&script);
    let (tx, mut rx) = mpsc::unbounded_channel::<RuntimeEvent>();
    let result = runtime.execute("tap the shutter", tx).await.unwrap();
    assert_eq!(result.as_deref(), Some("tap the shutter"));
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn non_utf8_chatter_is_skipped() {
    let dir = TempDir::new().unwrap();
    let script = write_agent(
        &dir,
        r#"printf 'log \377\376 bytes\n'
echo '{"type":"step","action":"scroll_down"}'
printf 'progress \351t\351\r\n'
echo '{"type":"final","text":"done"}'"#,
    );
    let sink = Arc::new(MemorySink::new());
    let validator = validator_for(runtime_for(&script), sink.clone());

    let text = validator
        .validate_task("do it", Some("done"), false)
        .await
        .unwrap();
    assert_eq!(text, "done");
    assert!(
        sink.current()
            .unwrap()
            .find_step("Action: scroll_down")
            .is_some()
    );
}

#[tokio::test]
async fn null_final_is_missing_result() {
    let dir = TempDir::new().unwrap();
    let script = write_agent(&dir, r#"echo '{"type":"final","text":null}'"#);
    let sink = Arc::new(MemorySink::new());
    let validator = validator_for(runtime_for(&script), sink);

    let err = validator
        .validate_task("find the impossible", None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ValidationError::MissingResult { .. }));
}

#[tokio::test]
async fn abnormal_exit_is_process_error() {
    let dir = TempDir::new().unwrap();
    let script = write_agent(&dir, "echo 'Traceback (most recent call last)'\nexit 3");
    let sink = Arc::new(MemorySink::new());
    let validator = validator_for(runtime_for(&script), sink);

    let err = validator
        .validate_task("open the app", None, false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ValidationError::Runtime(AgentError::Process(_))
    ));
}

#[tokio::test]
async fn slow_agent_times_out() {
    let dir = TempDir::new().unwrap();
    let script = write_agent(
        &dir,
        r#"echo '{"type":"step","action":"wait","params":{"seconds":10}}'
sleep 10
echo '{"type":"final","text":"done"}'"#,
    );
    let sink = Arc::new(MemorySink::new());
    let validator =
        validator_for(runtime_for(&script), sink.clone()).with_timeout(Duration::from_millis(500));

    let started = std::time::Instant::now();
    let err = validator
        .validate_task("wait for a while", None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ValidationError::TaskTimeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(
        sink.current()
            .unwrap()
            .find_step("Action: wait(seconds=10)")
            .is_some()
    );
}
