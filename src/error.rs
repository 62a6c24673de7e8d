//! Error types for snapshot collection.

use crate::agent::AgentError;
use std::io;
use thiserror::Error;

/// Errors that can occur during a collection run.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// The remote channel could not be established.
    #[error("Failed to connect to {host}: {source}")]
    Connection {
        host: String,
        #[source]
        source: AgentError,
    },

    /// The remote agent failed to run a command.
    #[error("Failed to {action}: {source}")]
    Transport {
        action: &'static str,
        #[source]
        source: AgentError,
    },

    /// A remote command wrote to standard error.
    #[error("Failed to {action}: {stderr}")]
    RemoteCommand {
        action: &'static str,
        stderr: String,
    },

    /// A remote command produced output that is not the expected JSON.
    #[error("Failed to unmarshal {what} ({source})")]
    ResponseParse {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Prometheus answered the snapshot request with a non-success status.
    #[error("Failed to create prometheus snapshot (status: {status} '{error}')")]
    SnapshotRejected { status: String, error: String },

    /// A name returned by the remote host cannot be used as a path component.
    #[error("Refusing to use remote path '{path}'")]
    UnsafeRemotePath { path: String },

    /// Downloading a remote resource failed.
    #[error("Failed to receive {resource} ({source})")]
    Transfer {
        resource: String,
        #[source]
        source: AgentError,
    },

    /// Removing a remote resource failed.
    #[error("Failed to remove resource '{path}' ({detail})")]
    Cleanup { path: String, detail: String },

    /// The requested window is empty or inverted.
    #[error("Invalid time window: {from} is not before {to}")]
    InvalidWindow { from: String, to: String },

    /// Collector settings could not be loaded.
    #[error("Invalid settings in {path}: {source}")]
    Settings {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// I/O error during local file operations.
    #[error(transparent)]
    Io(#[from] io::Error),
}
