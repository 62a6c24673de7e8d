//! Block listing and `meta.json` parsing.

use crate::agent::{run_checked, RemoteAgent};
use crate::commands;
use crate::error::CollectorError;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Only block format understood by the time-window filter.
pub const SUPPORTED_BLOCK_VERSION: i64 = 1;

/// Block statistics. Informational only.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockStats {
    pub num_samples: u64,
    pub num_series: u64,
    pub num_chunks: u64,
}

/// Contents of a block's `meta.json`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockMetadata {
    #[serde(default)]
    pub ulid: String,
    pub version: i64,
    /// Epoch milliseconds, inclusive.
    pub min_time: i64,
    /// Epoch milliseconds, inclusive.
    pub max_time: i64,
    #[serde(default)]
    pub stats: BlockStats,
}

impl BlockMetadata {
    /// Block bounds as UTC timestamps, or `None` if out of the representable range.
    pub fn bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((
            DateTime::from_timestamp_millis(self.min_time)?,
            DateTime::from_timestamp_millis(self.max_time)?,
        ))
    }
}

/// A block directory entry from the snapshot listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BlockEntry {
    /// Remote directory of a block, directly under the snapshot.
    Dir(String),
    /// A listing line that cannot safely be addressed.
    Unsafe(String),
}

/// Lists the block directories of a snapshot.
///
/// Entries that are not a plain child of `snapshot_dir` are returned as
/// [`BlockEntry::Unsafe`] so the caller can report and skip them.
pub(crate) async fn list_blocks(
    agent: &dyn RemoteAgent,
    snapshot_dir: &str,
) -> Result<Vec<BlockEntry>, CollectorError> {
    let output = run_checked(
        agent,
        "get block list of prometheus snapshot",
        &commands::list_blocks(snapshot_dir),
    )
    .await?;

    let prefix = format!("{}/", snapshot_dir.trim_end_matches('/'));
    let blocks = output
        .stdout_lossy()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let path = line.trim_end_matches('/');
            let name = path.strip_prefix(&prefix).unwrap_or(path);
            match commands::validate_remote_name(name) {
                Ok(name) if path.starts_with(&prefix) => {
                    BlockEntry::Dir(commands::remote_join(snapshot_dir, name))
                }
                _ => BlockEntry::Unsafe(line.to_string()),
            }
        })
        .collect();

    Ok(blocks)
}

/// Reads and parses the metadata file of one block.
pub(crate) async fn read_block_metadata(
    agent: &dyn RemoteAgent,
    block_dir: &str,
) -> Result<BlockMetadata, CollectorError> {
    let output = run_checked(
        agent,
        "get block metadata",
        &commands::read_block_metadata(block_dir),
    )
    .await?;

    serde_json::from_slice(&output.stdout).map_err(|source| CollectorError::ResponseParse {
        what: "block metadata",
        source,
    })
}
