//! Remote agent abstraction.

use crate::error::CollectorError;
use async_trait::async_trait;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Transport-level failures of a remote agent.
#[derive(Error, Debug)]
pub enum AgentError {
    /// I/O error while talking to the remote host.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The transport program itself failed (e.g. ssh exiting with 255).
    #[error("{program} exited with {status}: {stderr}")]
    Exited {
        program: &'static str,
        status: String,
        stderr: String,
    },
}

/// Separated output streams of a remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Options for [`RemoteAgent::retrieve_directory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrieveOptions {
    /// Copy directory trees recursively.
    pub recursive: bool,
    /// Keep modification times of the remote files.
    pub preserve_times: bool,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            preserve_times: true,
        }
    }
}

/// A command/transfer channel to one remote host.
///
/// Implementations must treat a command that ran but wrote to stderr as a
/// successful transport call; interpreting stderr is up to the caller.
#[async_trait]
pub trait RemoteAgent: Send + Sync {
    /// Identity of the remote host, used for log correlation.
    fn host_identity(&self) -> String;

    /// Establishes the channel.
    async fn connect(&self) -> Result<(), AgentError>;

    /// Runs one command string on the remote host.
    async fn execute_command(&self, command: &str) -> Result<CommandOutput, AgentError>;

    /// Copies a remote path (directory tree or single file) to `local_path`.
    async fn retrieve_directory(
        &self,
        remote_path: &str,
        local_path: &Path,
        options: RetrieveOptions,
    ) -> Result<(), AgentError>;
}

/// Runs `command` and turns transport errors and non-empty stderr into errors.
pub(crate) async fn run_checked(
    agent: &dyn RemoteAgent,
    action: &'static str,
    command: &str,
) -> Result<CommandOutput, CollectorError> {
    let output = agent
        .execute_command(command)
        .await
        .map_err(|source| CollectorError::Transport { action, source })?;

    if !output.stderr.is_empty() {
        return Err(CollectorError::RemoteCommand {
            action,
            stderr: output.stderr_lossy().trim().to_string(),
        });
    }

    Ok(output)
}
