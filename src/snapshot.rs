//! Snapshot creation through the Prometheus admin API.

use crate::agent::{run_checked, RemoteAgent};
use crate::commands;
use crate::error::CollectorError;
use serde::Deserialize;

/// Status Prometheus reports for an accepted snapshot request.
const SNAPSHOT_SUCCESS: &str = "success";

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct SnapshotData {
    name: String,
}

/// Body of `POST /api/v1/admin/tsdb/snapshot`.
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct SnapshotResponse {
    status: String,
    data: SnapshotData,
    error: String,
}

/// Parses the admin API response into the snapshot name.
fn parse_snapshot_response(body: &[u8]) -> Result<String, CollectorError> {
    let response: SnapshotResponse =
        serde_json::from_slice(body).map_err(|source| CollectorError::ResponseParse {
            what: "snapshot command output",
            source,
        })?;

    if response.status != SNAPSHOT_SUCCESS {
        return Err(CollectorError::SnapshotRejected {
            status: response.status,
            error: response.error,
        });
    }

    commands::validate_remote_name(&response.data.name)?;
    Ok(response.data.name)
}

/// Asks the remote Prometheus to create a snapshot and returns its name.
///
/// # Arguments
///
/// * `agent` - Channel to the remote host
/// * `port` - Prometheus admin API port on the remote host
///
/// # Returns
///
/// The snapshot name, safe to use as a single path component.
pub(crate) async fn create_snapshot(
    agent: &dyn RemoteAgent,
    port: u16,
) -> Result<String, CollectorError> {
    let output = run_checked(
        agent,
        "create prometheus snapshot",
        &commands::create_snapshot(port),
    )
    .await?;
    parse_snapshot_response(&output.stdout)
}
