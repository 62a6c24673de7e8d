//! Remote resource removal.

use crate::agent::{run_checked, RemoteAgent};
use crate::commands;
use crate::error::CollectorError;

/// Recursively removes `path` on the remote host.
///
/// Whether a failure is fatal is decided by the caller.
pub(crate) async fn remove_resource(
    agent: &dyn RemoteAgent,
    path: &str,
) -> Result<(), CollectorError> {
    run_checked(agent, "remove resource", &commands::remove(path))
        .await
        .map(|_| ())
        .map_err(|err| CollectorError::Cleanup {
            path: path.to_string(),
            detail: match err {
                CollectorError::RemoteCommand { stderr, .. } => stderr,
                CollectorError::Transport { source, .. } => source.to_string(),
                other => other.to_string(),
            },
        })
}
