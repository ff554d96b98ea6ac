// Command alert sink
// Hands every alert to an operator-supplied program (mailer, chat hook, pager
// script). Subject and body travel in environment variables so the program
// needs no argument parsing.

use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use cadence_core::port::AlertSink;

/// Env var carrying the alert subject
pub const ALERT_SUBJECT_ENV: &str = "CADENCE_ALERT_SUBJECT";

/// Env var carrying the alert body
pub const ALERT_BODY_ENV: &str = "CADENCE_ALERT_BODY";

/// Default time a delivery may take before the child is killed
pub const DEFAULT_ALERT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum AlertDeliveryError {
    #[error("Failed to spawn alert command '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Alert command '{program}' timed out after {timeout_ms}ms")]
    Timeout { program: String, timeout_ms: u128 },

    #[error("Alert command '{program}' exited with {code:?}: {stderr}")]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("IO error waiting for alert command: {0}")]
    Io(#[from] std::io::Error),
}

/// Alert sink that runs an external program per alert
#[derive(Debug, Clone)]
pub struct CommandAlertSink {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandAlertSink {
    /// # Example
    /// ```ignore
    /// let sink = CommandAlertSink::new("/usr/local/bin/page-oncall", vec!["--team=infra".into()]);
    /// ```
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_ALERT_TIMEOUT,
        }
    }

    /// Parse a whitespace-separated command line; `None` when blank
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the program once and wait for it (bounded by the timeout)
    pub async fn deliver(&self, subject: &str, body: &str) -> Result<(), AlertDeliveryError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .env(ALERT_SUBJECT_ENV, subject)
            .env(ALERT_BODY_ENV, body)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AlertDeliveryError::SpawnFailed {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(AlertDeliveryError::Timeout {
                    program: self.program.clone(),
                    timeout_ms: self.timeout.as_millis(),
                })
            }
        };

        if output.status.success() {
            debug!(program = %self.program, subject = %subject, "Alert delivered");
            Ok(())
        } else {
            Err(AlertDeliveryError::NonZeroExit {
                program: self.program.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl AlertSink for CommandAlertSink {
    /// Fire-and-forget: delivery runs on the current runtime, failures are
    /// only logged
    fn notify(&self, subject: &str, body: &str) {
        warn!(subject = %subject, body = %body, "ALERT");

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(program = %self.program, "No async runtime, alert command not run");
                return;
            }
        };

        let sink = self.clone();
        let (subject, body) = (subject.to_string(), body.to_string());
        handle.spawn(async move {
            if let Err(e) = sink.deliver(&subject, &body).await {
                warn!(error = %e, "Alert delivery failed");
            }
        });
    }
}
