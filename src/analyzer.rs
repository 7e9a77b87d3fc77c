use crate::traits::{AnalysisService, ServiceError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub const DEFAULT_ANALYZER_TIMEOUT_SECS: u64 = 60;

/// Writes the failure log to an external command's stdin and takes its stdout
/// as the analysis, e.g. `llm -s "Explain this CI failure"`.
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    program: Option<(String, Vec<String>)>,
    timeout: Duration,
}

impl CommandAnalyzer {
    /// `command` is split on whitespace into program and arguments. `None` or
    /// a blank command yields an analyzer that reports missing credentials.
    pub fn new(command: Option<&str>, timeout: Duration) -> Self {
        let program = command.and_then(|cmd| {
            let mut parts = cmd.split_whitespace().map(str::to_string);
            let program = parts.next()?;
            Some((program, parts.collect()))
        });
        Self { program, timeout }
    }

    pub fn is_configured(&self) -> bool {
        self.program.is_some()
    }

    async fn run(&self, program: &str, args: &[String], logs: &str) -> Result<String, ServiceError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ServiceError::Unavailable(format!("{program} not found"))
                } else {
                    ServiceError::Unavailable(format!("failed to run {program}: {e}"))
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(logs.as_bytes()).await {
                tracing::warn!("analyzer stdin write failed: {e}");
            }
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ServiceError::Unavailable(format!("{program} failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ServiceError::Unavailable(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(ServiceError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl AnalysisService for CommandAnalyzer {
    async fn analyze_logs(&self, logs: &str) -> Result<String, ServiceError> {
        let Some((program, args)) = &self.program else {
            return Err(ServiceError::MissingCredentials);
        };
        tracing::debug!(program = %program, bytes = logs.len(), "running analyzer");
        match tokio::time::timeout(self.timeout, self.run(program, args, logs)).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Unavailable(format!(
                "{program} timed out after {:?}",
                self.timeout
            ))),
        }
    }
}
