//! Remote archive creation.

use crate::agent::{run_checked, RemoteAgent};
use crate::commands;
use crate::error::CollectorError;

/// Packs the contents of `source_dir` into a single archive at `archive_path`.
///
/// The archive is written on the remote host with `tar`, gzip-compressed when
/// `gzip` is set. Any output on stderr counts as a failure.
pub(crate) async fn archive_snapshot(
    agent: &dyn RemoteAgent,
    source_dir: &str,
    archive_path: &str,
    gzip: bool,
) -> Result<(), CollectorError> {
    run_checked(
        agent,
        "create snapshot tarball",
        &commands::create_archive(archive_path, source_dir, gzip),
    )
    .await
    .map(|_| ())
}
