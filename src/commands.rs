//! Remote command table.
//!
//! Every command the collector runs on a remote host is built here. Paths are
//! single-quoted for a POSIX shell; names reported by the remote host are
//! validated before they become part of a path.

use crate::error::CollectorError;

/// Folder under the Prometheus data root that holds snapshots.
pub const SNAPSHOT_FOLDER: &str = "snapshots";

/// Name of the metadata file inside every block directory.
pub const BLOCK_METADATA_FILE: &str = "meta.json";

/// Quotes `value` so a POSIX shell passes it through as one literal word.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Joins remote path segments with `/`, whatever the local platform is.
pub fn remote_join(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}

/// Checks that a name received from the remote host is a single, plain path component.
pub fn validate_remote_name(name: &str) -> Result<&str, CollectorError> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if plain {
        Ok(name)
    } else {
        Err(CollectorError::UnsafeRemotePath {
            path: name.to_string(),
        })
    }
}

/// Triggers a TSDB snapshot through the Prometheus admin API.
pub fn create_snapshot(port: u16) -> String {
    format!(
        "curl -s -XPOST http://localhost:{}/api/v1/admin/tsdb/snapshot",
        port
    )
}

/// Lists the block directories of a snapshot, one per line.
pub fn list_blocks(snapshot_dir: &str) -> String {
    format!(
        "ls -d {}/*/",
        shell_quote(snapshot_dir.trim_end_matches('/'))
    )
}

/// Prints the metadata file of a block.
pub fn read_block_metadata(block_dir: &str) -> String {
    format!(
        "cat {}",
        shell_quote(&remote_join(block_dir, BLOCK_METADATA_FILE))
    )
}

/// Packs the contents of `source_dir` into the archive at `archive_path`.
pub fn create_archive(archive_path: &str, source_dir: &str, gzip: bool) -> String {
    let flags = if gzip { "-czf" } else { "-cf" };
    format!(
        "tar {} {} -C {} .",
        flags,
        shell_quote(archive_path),
        shell_quote(source_dir)
    )
}

/// Recursively removes a remote path.
pub fn remove(path: &str) -> String {
    format!("rm -rf {}", shell_quote(path))
}
