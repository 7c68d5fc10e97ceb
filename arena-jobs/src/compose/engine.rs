//! Docker compose engine
//!
//! Drives the `docker compose` CLI:
//! - Checking compose availability
//! - Bringing projects up from a compose file piped on stdin
//! - Streaming project events as JSON lines

use arena_core::domain::watch::{EventKind, Phase, WatchEvent};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::BackendKind;
use crate::compose::project::ComposeProject;
use crate::error::{JobError, Result};
use crate::watch::{Subscription, WATCH_CHANNEL_CAPACITY};

/// Project operations the compose job client needs
#[async_trait]
pub trait ComposeEngine: Send + Sync + 'static {
    /// Creates and starts every service of the project
    async fn up(&self, project: &ComposeProject) -> Result<()>;

    /// Opens an event stream for the named project
    async fn events(&self, project_name: &str) -> Result<Subscription>;
}

/// Compose engine backed by the `docker compose` CLI
#[derive(Debug, Clone)]
pub struct DockerCompose {
    program: String,
}

impl DockerCompose {
    /// Checks that `docker compose` is installed and returns an engine for it
    pub async fn connect() -> Result<Self> {
        Self::with_program("docker").await
    }

    /// Same as [`DockerCompose::connect`] for a docker-compatible binary (e.g., podman)
    pub async fn with_program(program: impl Into<String>) -> Result<Self> {
        let program = program.into();
        let output = Command::new(&program)
            .arg("compose")
            .arg("version")
            .output()
            .await
            .map_err(|e| {
                connection_error(format!(
                    "failed to execute '{} compose version': {}",
                    program, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(connection_error(format!(
                "'{} compose' is not working correctly: {}",
                program,
                stderr.trim()
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!("Compose is available: {}", version.trim());

        Ok(Self { program })
    }

    fn compose(&self, project_name: &str) -> Command {
        let mut command = Command::new(&self.program);
        command.arg("compose").arg("-p").arg(project_name);
        command
    }
}

#[async_trait]
impl ComposeEngine for DockerCompose {
    async fn up(&self, project: &ComposeProject) -> Result<()> {
        let name = project.name.as_str();
        let spec = serde_json::to_vec(project)
            .map_err(|e| JobError::submission(name, format!("failed to encode project: {}", e)))?;

        let mut child = self
            .compose(name)
            .arg("-f")
            .arg("-")
            .arg("up")
            .arg("-d")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| JobError::submission(name, format!("failed to execute compose up: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&spec)
                .await
                .map_err(|e| JobError::submission(name, format!("failed to write project: {}", e)))?;
            // Closing stdin lets compose start reading the file
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| JobError::submission(name, format!("compose up did not finish: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stdout.trim().is_empty() {
            debug!("compose up stdout: {}", stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("compose up stderr: {}", stderr.trim());
        }

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            let error_msg = format!(
                "compose up failed: exit_code={}, stderr='{}'",
                exit_code,
                stderr.trim()
            );
            error!("Project {}: {}", name, error_msg);
            return Err(JobError::submission(name, error_msg));
        }

        Ok(())
    }

    async fn events(&self, project_name: &str) -> Result<Subscription> {
        let mut child = self
            .compose(project_name)
            .arg("events")
            .arg("--json")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                JobError::subscription(project_name, format!("failed to execute compose events: {}", e))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            JobError::subscription(project_name, "compose events has no stdout")
        })?;

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let name = project_name.to_string();

        let pump = tokio::spawn(async move {
            // Owning the child here ties the process lifetime to the subscription
            let _child = child;
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        if tx.send(decode_event(&line)).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        debug!("Event stream for project {} ended", name);
                        return;
                    }
                    Err(e) => {
                        warn!("Event stream for project {} failed: {}", name, e);
                        let _ = tx.send(WatchEvent::stream_error(e.to_string())).await;
                        return;
                    }
                }
            }
        });

        Ok(Subscription::new(project_name, rx, pump))
    }
}

fn connection_error(message: impl Into<String>) -> JobError {
    JobError::Connection {
        backend: BackendKind::Compose,
        message: message.into(),
    }
}

/// Decodes one `docker compose events --json` line
///
/// Compose events carry no lifecycle phase. Only `die` is terminal and is
/// reported as the workload going away, with the container's exit code;
/// everything else is a modification.
pub fn decode_event(line: &str) -> WatchEvent {
    let raw: JsonValue = match serde_json::from_str(line) {
        Ok(raw) => raw,
        Err(e) => return WatchEvent::stream_error(format!("undecodable compose event: {}", e)),
    };

    match raw.get("action").and_then(|a| a.as_str()) {
        Some("die") => {
            let exit_code = raw
                .pointer("/attributes/exitCode")
                .and_then(|c| c.as_str())
                .and_then(|c| c.parse().ok());
            WatchEvent::new(EventKind::Deleted, Phase::Unknown, raw).with_exit_code(exit_code)
        }
        _ => WatchEvent::new(EventKind::Modified, Phase::Unknown, raw),
    }
}
