//! Remote agent backed by the system `ssh` and `scp` binaries.

use crate::agent::{AgentError, CommandOutput, RemoteAgent, RetrieveOptions};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Exit status ssh uses for its own (connection) errors.
const SSH_TRANSPORT_FAILURE: i32 = 255;

/// SSH connection settings for one host.
#[derive(Debug, Clone)]
pub struct SshAgent {
    pub host: String,
    pub user: Option<String>,
    pub port: u16,
    pub identity: Option<PathBuf>,
    pub connect_timeout: Duration,
}

impl SshAgent {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: 22,
            identity: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    fn target(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    /// Options shared by ssh and scp. Port flags differ, so they are added by the caller.
    ///
    /// `LogLevel=ERROR` keeps client notices such as known-hosts warnings off
    /// stderr, which is reserved for the remote command.
    fn common_options(&self, command: &mut Command) {
        command
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("LogLevel=ERROR")
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.connect_timeout.as_secs().max(1)
            ));
        if let Some(identity) = &self.identity {
            command.arg("-i").arg(identity);
        }
    }

    fn ssh(&self, remote_command: &str) -> Command {
        let mut command = Command::new("ssh");
        self.common_options(&mut command);
        command
            .arg("-p")
            .arg(self.port.to_string())
            .arg(self.target())
            .arg("--")
            .arg(remote_command);
        command
    }

    fn scp(&self, remote_path: &str, local_path: &Path, options: RetrieveOptions) -> Command {
        let mut command = Command::new("scp");
        self.common_options(&mut command);
        command.arg("-q").arg("-P").arg(self.port.to_string());
        if options.recursive {
            command.arg("-r");
        }
        if options.preserve_times {
            command.arg("-p");
        }
        command
            .arg(format!("{}:{}", self.target(), remote_path))
            .arg(local_path);
        command
    }
}

fn transport_failure(program: &'static str, output: &Output) -> Option<AgentError> {
    if output.status.code() == Some(SSH_TRANSPORT_FAILURE) || output.status.code().is_none() {
        return Some(AgentError::Exited {
            program,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    None
}

#[async_trait]
impl RemoteAgent for SshAgent {
    fn host_identity(&self) -> String {
        self.host.clone()
    }

    async fn connect(&self) -> Result<(), AgentError> {
        let output = self.ssh("true").output().await?;
        if !output.status.success() {
            return Err(AgentError::Exited {
                program: "ssh",
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn execute_command(&self, command: &str) -> Result<CommandOutput, AgentError> {
        debug!("Executing on {}: {}", self.host, command);
        let output = self.ssh(command).output().await?;
        if let Some(err) = transport_failure("ssh", &output) {
            return Err(err);
        }
        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn retrieve_directory(
        &self,
        remote_path: &str,
        local_path: &Path,
        options: RetrieveOptions,
    ) -> Result<(), AgentError> {
        debug!("Receiving {}:{} into {:?}", self.host, remote_path, local_path);
        let output = self.scp(remote_path, local_path, options).output().await?;
        if !output.status.success() {
            return Err(AgentError::Exited {
                program: "scp",
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
