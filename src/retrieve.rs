//! Download of the transfer resource.

use crate::agent::{AgentError, RemoteAgent, RetrieveOptions};
use crate::error::CollectorError;
use std::path::Path;

/// Copies `remote_path` from the remote host to `local_path`.
///
/// The parent directory of `local_path` is created if needed. Failures are
/// wrapped with `resource`, the human name of what was being downloaded.
pub(crate) async fn retrieve_resource(
    agent: &dyn RemoteAgent,
    resource: &str,
    remote_path: &str,
    local_path: &Path,
) -> Result<(), CollectorError> {
    let transfer_error = |source: AgentError| CollectorError::Transfer {
        resource: format!("{} '{}'", resource, remote_path),
        source,
    };

    if let Some(parent) = local_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| transfer_error(AgentError::Io(e)))?;
    }

    agent
        .retrieve_directory(remote_path, local_path, RetrieveOptions::default())
        .await
        .map_err(transfer_error)
}
