//! Main orchestration logic for collecting one snapshot.

use crate::agent::RemoteAgent;
use crate::archive::archive_snapshot;
use crate::cleanup::remove_resource;
use crate::commands::{remote_join, SNAPSHOT_FOLDER};
use crate::error::CollectorError;
use crate::extract::{extract_spinner, extract_tar};
use crate::lighten::{lighten_snapshot, LightenReport};
use crate::retrieve::retrieve_resource;
use crate::snapshot::create_snapshot;
use crate::step::{Step, StepOutcome};
use crate::types::{CollectorConfig, TimeWindow};
use crate::verify::compute_file_md5;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, info_span, Instrument};

/// Summary of a finished collection run.
#[derive(Serialize, Debug, Clone)]
pub struct CollectionReport {
    pub host: String,
    pub snapshot: String,
    pub window: TimeWindow,
    /// Whether the snapshot was transferred as a single archive.
    pub archived: bool,
    /// Per-block decisions; `None` if lightening failed as a whole.
    pub lightening: Option<LightenReport>,
    /// Local copy of the transfer resource; `None` if the download failed.
    pub retrieved: Option<PathBuf>,
    pub md5: Option<String>,
    pub unpacked: Option<PathBuf>,
    /// Failures that were logged and recovered from.
    pub warnings: Vec<String>,
}

/// The remote path that is downloaded and removed at the end of a run.
struct TransferResource {
    name: &'static str,
    remote_path: String,
}

/// Collects Prometheus snapshots into a local directory.
///
/// # Example
///
/// ```no_run
/// use chrono::{Duration, Utc};
/// use promsnap::{CollectorConfig, CollectorSettings, MetricsCollector, SshAgent, TimeWindow};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let now = Utc::now();
/// let config = CollectorConfig {
///     settings: CollectorSettings::default(),
///     window: TimeWindow::new(now - Duration::hours(6), now)?,
/// };
/// let collector = MetricsCollector::new(config, "collected/node-1");
/// let report = collector.collect(&SshAgent::new("node-1")).await?;
/// println!("{:?}", report.retrieved);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    pub config: CollectorConfig,
    /// Local output directory of this host.
    pub destination: PathBuf,
}

impl MetricsCollector {
    pub fn new(config: CollectorConfig, destination: impl Into<PathBuf>) -> Self {
        Self {
            config,
            destination: destination.into(),
        }
    }

    /// Runs one collection against `agent`.
    ///
    /// The run performs the following steps:
    ///
    /// 1. Connects and creates a snapshot (both fatal)
    /// 2. Drops blocks outside the requested window (recoverable)
    /// 3. Optionally archives the snapshot and removes the snapshot directory;
    ///    a failed archive ends the run after that removal
    /// 4. Downloads the transfer resource (recoverable)
    /// 5. Removes the transfer resource (fatal)
    /// 6. Checksums and optionally unpacks a downloaded archive (recoverable)
    ///
    /// # Returns
    ///
    /// A report of the run, or the first fatal error.
    pub async fn collect(
        &self,
        agent: &dyn RemoteAgent,
    ) -> Result<CollectionReport, CollectorError> {
        let span = info_span!("metrics_collector", host = %agent.host_identity());
        self.run(agent).instrument(span).await
    }

    async fn run(&self, agent: &dyn RemoteAgent) -> Result<CollectionReport, CollectorError> {
        let settings = &self.config.settings;
        let mut warnings = Vec::new();
        info!("Metrics collecting started");

        let connected = agent
            .connect()
            .await
            .map_err(|source| CollectorError::Connection {
                host: agent.host_identity(),
                source,
            });
        if let StepOutcome::Fatal(e) | StepOutcome::Recovered(e) = Step::Connect.settle(connected)
        {
            return Err(e);
        }

        info!("{}...", Step::CreateSnapshot);
        let snapshot =
            match Step::CreateSnapshot.settle(create_snapshot(agent, settings.prometheus.port).await)
            {
                StepOutcome::Completed(name) => name,
                StepOutcome::Recovered(e) | StepOutcome::Fatal(e) => return Err(e),
            };
        info!("{}  OK", Step::CreateSnapshot);
        info!("Snapshot name: {}", snapshot);

        let snapshot_dir = remote_join(
            &remote_join(&settings.prometheus.data_path, SNAPSHOT_FOLDER),
            &snapshot,
        );

        info!("{}...", Step::Lighten);
        let lightening = recover(
            Step::Lighten,
            lighten_snapshot(agent, &snapshot_dir, &self.config.window).await,
            &mut warnings,
        )?;
        if let Some(report) = &lightening {
            info!(
                kept = report.kept(),
                dropped = report.dropped(),
                skipped = report.skipped(),
                "{}  OK",
                Step::Lighten
            );
        }

        let mut resource = TransferResource {
            name: "snapshot",
            remote_path: snapshot_dir.clone(),
        };

        if settings.copy_compressed {
            let archive_path = settings.remote_archive_path();

            info!("{}...", Step::Archive);
            let archived = Step::Archive.settle(
                archive_snapshot(agent, &snapshot_dir, &archive_path, settings.gzip).await,
            );
            if let StepOutcome::Completed(()) = archived {
                info!("{}  OK", Step::Archive);
            }

            info!("{}...", Step::CleanupSnapshot);
            let cleaned = recover(
                Step::CleanupSnapshot,
                remove_resource(agent, &snapshot_dir).await,
                &mut warnings,
            )?;
            if cleaned.is_some() {
                info!("{}  OK", Step::CleanupSnapshot);
            }

            match archived {
                StepOutcome::Completed(()) => {
                    resource = TransferResource {
                        name: "snapshot tarball",
                        remote_path: archive_path,
                    };
                }
                StepOutcome::Recovered(e) | StepOutcome::Fatal(e) => return Err(e),
            }
        }

        let local_path = self.destination.join(settings.local_resource_name());

        info!("{}...", Step::Retrieve);
        let retrieved = recover(
            Step::Retrieve,
            retrieve_resource(agent, resource.name, &resource.remote_path, &local_path).await,
            &mut warnings,
        )?
        .map(|()| local_path);
        if retrieved.is_some() {
            info!("{}  OK", Step::Retrieve);
        }

        info!("Cleanup {}...", resource.name);
        match Step::CleanupResource.settle(remove_resource(agent, &resource.remote_path).await) {
            StepOutcome::Completed(()) => info!("Cleanup {}  OK", resource.name),
            StepOutcome::Recovered(e) | StepOutcome::Fatal(e) => return Err(e),
        }

        let mut report = CollectionReport {
            host: agent.host_identity(),
            snapshot,
            window: self.config.window,
            archived: settings.copy_compressed,
            lightening,
            retrieved,
            md5: None,
            unpacked: None,
            warnings,
        };

        if settings.copy_compressed {
            if let Some(archive) = report.retrieved.clone() {
                self.finalize(&archive, &mut report).await?;
            }
        }

        info!("Metrics collecting completed");
        Ok(report)
    }

    /// Checksums the downloaded archive and unpacks it if requested.
    async fn finalize(
        &self,
        archive: &Path,
        report: &mut CollectionReport,
    ) -> Result<(), CollectorError> {
        let settings = &self.config.settings;

        report.md5 = recover(
            Step::Finalize,
            compute_file_md5(archive).await,
            &mut report.warnings,
        )?;
        if let Some(md5) = &report.md5 {
            info!("Snapshot tarball MD5: {}", md5);
        }

        if settings.unpack {
            let target = self.destination.join("snapshot");
            let source = archive.to_path_buf();
            let unpack_target = target.clone();
            let gzip = settings.gzip;

            info!("Unpacking snapshot tarball into {}...", target.display());
            let unpacked = tokio::task::spawn_blocking(move || {
                extract_tar(&source, &unpack_target, gzip, &extract_spinner())
            })
            .await
            .map_err(|e| {
                CollectorError::Io(std::io::Error::other(format!("Task join error: {}", e)))
            })
            .and_then(|result| result);

            if let Some(files) = recover(Step::Finalize, unpacked, &mut report.warnings)? {
                info!("Unpacked {} files", files);
                report.unpacked = Some(target);
            }
        }

        Ok(())
    }
}

/// Applies the policy of a recoverable step, collecting its warning.
fn recover<T>(
    step: Step,
    result: Result<T, CollectorError>,
    warnings: &mut Vec<String>,
) -> Result<Option<T>, CollectorError> {
    match step.settle(result) {
        StepOutcome::Completed(value) => Ok(Some(value)),
        StepOutcome::Recovered(e) => {
            warnings.push(format!("{}: {}", step, e));
            Ok(None)
        }
        StepOutcome::Fatal(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::scripted::{Reply, ScriptedAgent};
    use crate::commands;
    use crate::lighten::BlockDecision;
    use crate::types::CollectorSettings;
    use chrono::DateTime;

    const NAME: &str = "20210101T000000Z-abc";
    const SNAPSHOT: &str = "/var/data/snapshots/20210101T000000Z-abc";
    const ARCHIVE: &str = "/tmp/promsnap-collection.tar";

    fn config(settings: CollectorSettings) -> CollectorConfig {
        CollectorConfig {
            settings,
            window: TimeWindow::new(
                DateTime::from_timestamp_millis(1_000).unwrap(),
                DateTime::from_timestamp_millis(15_000).unwrap(),
            )
            .unwrap(),
        }
    }

    fn block(name: &str) -> String {
        format!("{}/{}", SNAPSHOT, name)
    }

    /// An agent serving the two-block snapshot on the default settings.
    fn healthy_agent() -> ScriptedAgent {
        ScriptedAgent::new()
            .reply(
                commands::create_snapshot(9090),
                Reply::Stdout(format!(
                    r#"{{"status":"success","data":{{"name":"{}"}}}}"#,
                    NAME
                )),
            )
            .reply(
                commands::list_blocks(SNAPSHOT),
                Reply::Stdout(format!("{}/\n{}/\n", block("A"), block("B"))),
            )
            .reply(
                commands::read_block_metadata(&block("A")),
                Reply::Stdout(r#"{"ulid":"A","version":1,"minTime":0,"maxTime":500}"#.into()),
            )
            .reply(
                commands::read_block_metadata(&block("B")),
                Reply::Stdout(
                    r#"{"ulid":"B","version":1,"minTime":10000,"maxTime":20000}"#.into(),
                ),
            )
    }

    #[tokio::test]
    async fn test_archived_run() {
        let dir = tempfile::tempdir().unwrap();
        let agent = healthy_agent();
        let collector = MetricsCollector::new(config(CollectorSettings::default()), dir.path());

        let report = collector.collect(&agent).await.unwrap();

        assert_eq!(report.snapshot, NAME);
        assert!(report.archived);
        let lightening = report.lightening.unwrap();
        assert_eq!(
            lightening.blocks[0].decision,
            BlockDecision::Dropped { removed: true }
        );
        assert_eq!(lightening.blocks[1].decision, BlockDecision::Kept);
        assert_eq!(
            agent.retrieved(),
            vec![(ARCHIVE.to_string(), dir.path().join("snapshot.tar"))]
        );
        assert_eq!(report.retrieved, Some(dir.path().join("snapshot.tar")));

        let executed = agent.executed();
        let tail: Vec<_> = executed.iter().rev().take(3).rev().cloned().collect();
        assert_eq!(
            tail,
            vec![
                commands::create_archive(ARCHIVE, SNAPSHOT, false),
                commands::remove(SNAPSHOT),
                commands::remove(ARCHIVE),
            ]
        );
        // Scratch archive did not exist locally, so the checksum was recovered.
        assert!(report.md5.is_none());
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_archive_cleans_snapshot_and_skips_download() {
        let dir = tempfile::tempdir().unwrap();
        let agent = healthy_agent().reply(
            commands::create_archive(ARCHIVE, SNAPSHOT, false),
            Reply::Stderr("tar: No space left on device".into()),
        );
        let collector = MetricsCollector::new(config(CollectorSettings::default()), dir.path());

        let err = collector.collect(&agent).await.unwrap_err();

        assert!(err.to_string().contains("No space left on device"));
        assert!(agent.retrieved().is_empty());
        let executed = agent.executed();
        assert_eq!(executed.last(), Some(&commands::remove(SNAPSHOT)));
        assert!(!executed.contains(&commands::remove(ARCHIVE)));
    }

    #[tokio::test]
    async fn test_failed_archive_and_cleanup_returns_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let agent = healthy_agent()
            .reply(
                commands::create_archive(ARCHIVE, SNAPSHOT, false),
                Reply::Transport("channel closed".into()),
            )
            .reply(
                commands::remove(SNAPSHOT),
                Reply::Transport("channel closed".into()),
            );
        let collector = MetricsCollector::new(config(CollectorSettings::default()), dir.path());

        let err = collector.collect(&agent).await.unwrap_err();

        assert!(matches!(
            err,
            CollectorError::Transport {
                action: "create snapshot tarball",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unarchived_run_transfers_snapshot_dir() {
        let dir = tempfile::tempdir().unwrap();
        let agent = healthy_agent();
        let settings = CollectorSettings {
            copy_compressed: false,
            ..Default::default()
        };
        let collector = MetricsCollector::new(config(settings), dir.path());

        let report = collector.collect(&agent).await.unwrap();

        assert!(!report.archived);
        assert_eq!(
            agent.retrieved(),
            vec![(SNAPSHOT.to_string(), dir.path().join("snapshot"))]
        );
        let executed = agent.executed();
        assert_eq!(executed.last(), Some(&commands::remove(SNAPSHOT)));
        assert!(!executed.iter().any(|c| c.starts_with("tar ")));
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_failed_download_still_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let agent = healthy_agent().failing_retrieve();
        let collector = MetricsCollector::new(config(CollectorSettings::default()), dir.path());

        let report = collector.collect(&agent).await.unwrap();

        assert!(report.retrieved.is_none());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("Downloading snapshot"));
        assert_eq!(agent.executed().last(), Some(&commands::remove(ARCHIVE)));
    }

    #[tokio::test]
    async fn test_failed_download_and_cleanup_returns_cleanup_error() {
        let dir = tempfile::tempdir().unwrap();
        let agent = healthy_agent()
            .failing_retrieve()
            .reply(
                commands::remove(ARCHIVE),
                Reply::Stderr("rm: cannot remove: Read-only file system".into()),
            );
        let collector = MetricsCollector::new(config(CollectorSettings::default()), dir.path());

        let err = collector.collect(&agent).await.unwrap_err();

        match err {
            CollectorError::Cleanup { path, detail } => {
                assert_eq!(path, ARCHIVE);
                assert!(detail.contains("Read-only file system"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_snapshot_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let agent = ScriptedAgent::new().reply(
            commands::create_snapshot(9090),
            Reply::Stdout(r#"{"status":"error","error":"out of space"}"#.into()),
        );
        let collector = MetricsCollector::new(config(CollectorSettings::default()), dir.path());

        let err = collector.collect(&agent).await.unwrap_err();

        assert!(matches!(err, CollectorError::SnapshotRejected { .. }));
        assert!(err.to_string().contains("out of space"));
        assert_eq!(agent.executed(), vec![commands::create_snapshot(9090)]);
    }

    #[tokio::test]
    async fn test_connect_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let agent = healthy_agent().failing_connect();
        let collector = MetricsCollector::new(config(CollectorSettings::default()), dir.path());

        let err = collector.collect(&agent).await.unwrap_err();

        assert!(matches!(err, CollectorError::Connection { .. }));
        assert!(agent.executed().is_empty());
    }

    #[tokio::test]
    async fn test_lightening_failure_is_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let agent = healthy_agent().reply(
            commands::list_blocks(SNAPSHOT),
            Reply::Transport("timeout".into()),
        );
        let settings = CollectorSettings {
            copy_compressed: false,
            ..Default::default()
        };
        let collector = MetricsCollector::new(config(settings), dir.path());

        let report = collector.collect(&agent).await.unwrap();

        assert!(report.lightening.is_none());
        assert!(report.warnings[0].starts_with("Lightening snapshot"));
        assert!(!agent.executed().contains(&commands::remove(&block("A"))));
        assert_eq!(report.retrieved, Some(dir.path().join("snapshot")));
    }

    #[tokio::test]
    async fn test_finalize_checksums_and_unpacks() {
        let dir = tempfile::tempdir().unwrap();
        // The scripted agent does not write files, so stage the "downloaded" archive.
        let local_archive = dir.path().join("snapshot.tar");
        {
            let mut builder = tar::Builder::new(std::fs::File::create(&local_archive).unwrap());
            let body = br#"{"version":1}"#;
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            builder
                .append_data(&mut header, "B/meta.json", body.as_slice())
                .unwrap();
            builder.finish().unwrap();
        }

        let agent = healthy_agent();
        let settings = CollectorSettings {
            unpack: true,
            ..Default::default()
        };
        let collector = MetricsCollector::new(config(settings), dir.path());

        let report = collector.collect(&agent).await.unwrap();

        assert_eq!(report.md5.as_deref().map(str::len), Some(32));
        assert_eq!(report.unpacked, Some(dir.path().join("snapshot")));
        assert!(dir.path().join("snapshot/B/meta.json").is_file());
        assert!(report.warnings.is_empty());
    }
}
