use super::{HostError, HostResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tracing::debug;

/// Runs external programs. Test doubles return canned output instead of
/// spawning processes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &Path, args: &[String]) -> HostResult<Output>;
}

/// Production runner: every command is bounded by `timeout` and the child is
/// killed if the timeout fires.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &Path, args: &[String]) -> HostResult<Output> {
        let command = describe_command(program, args);
        debug!(%command, "Running host command");

        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HostError::Spawn {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(HostError::Spawn {
                command,
                reason: e.to_string(),
            }),
            Err(_) => Err(HostError::Timeout {
                command,
                seconds: self.timeout.as_secs(),
            }),
        }
    }
}

/// Render a command line for logs and errors, masking the VM password.
pub fn describe_command(program: &Path, args: &[String]) -> String {
    let mut rendered = vec![program.display().to_string()];
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            rendered.push("****".to_string());
            mask_next = false;
            continue;
        }
        mask_next = arg == "-vp";
        rendered.push(arg.clone());
    }
    rendered.join(" ")
}
