//! Time-window lightening of a snapshot.
//!
//! Every block of the snapshot is checked against the requested window and
//! blocks outside of it are deleted on the remote host, so less data has to
//! leave the node. Problems with a single block never stop the loop.

use crate::agent::RemoteAgent;
use crate::cleanup::remove_resource;
use crate::error::CollectorError;
use crate::metadata::{list_blocks, read_block_metadata, BlockEntry, SUPPORTED_BLOCK_VERSION};
use crate::types::TimeWindow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// What happened to one block.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum BlockDecision {
    /// Overlaps the window and stays in the snapshot.
    Kept,
    /// Outside the window; `removed` is false if the remote removal failed.
    Dropped { removed: bool },
    /// Unknown block format, left in place.
    Unsupported { version: i64 },
    /// Metadata could not be read or parsed, left in place.
    Unreadable { reason: String },
}

/// Audit record of one block.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BlockOutcome {
    pub path: String,
    pub ulid: Option<String>,
    pub min_time: Option<DateTime<Utc>>,
    pub max_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub decision: BlockDecision,
}

/// Result of lightening one snapshot.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LightenReport {
    pub blocks: Vec<BlockOutcome>,
}

impl LightenReport {
    pub fn kept(&self) -> usize {
        self.count(|d| matches!(d, BlockDecision::Kept))
    }

    pub fn dropped(&self) -> usize {
        self.count(|d| matches!(d, BlockDecision::Dropped { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|d| {
            matches!(
                d,
                BlockDecision::Unsupported { .. } | BlockDecision::Unreadable { .. }
            )
        })
    }

    fn count(&self, f: impl Fn(&BlockDecision) -> bool) -> usize {
        self.blocks.iter().filter(|b| f(&b.decision)).count()
    }
}

/// Decides whether a block falls into the requested window.
///
/// The block passes when either bound is after `from` and either bound is
/// before `to`. This is intentionally looser than an interval intersection.
pub fn falls_into_window(
    block_min: DateTime<Utc>,
    block_max: DateTime<Utc>,
    window: &TimeWindow,
) -> bool {
    (block_min > window.from || block_max > window.from)
        && (block_min < window.to || block_max < window.to)
}

/// Drops the blocks of `snapshot_dir` that do not fall into `window`.
///
/// # Returns
///
/// A per-block report, or an error if the block list could not be obtained.
/// In the latter case no block has been touched.
pub(crate) async fn lighten_snapshot(
    agent: &dyn RemoteAgent,
    snapshot_dir: &str,
    window: &TimeWindow,
) -> Result<LightenReport, CollectorError> {
    let entries = list_blocks(agent, snapshot_dir).await?;
    let total = entries.len();
    let mut report = LightenReport::default();

    for (index, entry) in entries.into_iter().enumerate() {
        let block = match entry {
            BlockEntry::Dir(block) => block,
            BlockEntry::Unsafe(line) => {
                warn!(
                    "Ignoring block ({}): not a plain snapshot subdirectory",
                    line
                );
                report.blocks.push(skipped(
                    line,
                    None,
                    BlockDecision::Unreadable {
                        reason: "unsafe path".to_string(),
                    },
                ));
                continue;
            }
        };

        let metadata = match read_block_metadata(agent, &block).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Ignoring block ({}): {}", block, e);
                report.blocks.push(skipped(
                    block,
                    None,
                    BlockDecision::Unreadable {
                        reason: e.to_string(),
                    },
                ));
                continue;
            }
        };

        if metadata.version != SUPPORTED_BLOCK_VERSION {
            warn!(
                "Ignoring block ({}): version #{} unsupported",
                block, metadata.version
            );
            report.blocks.push(skipped(
                block,
                Some(metadata.ulid),
                BlockDecision::Unsupported {
                    version: metadata.version,
                },
            ));
            continue;
        }

        let Some((block_min, block_max)) = metadata.bounds() else {
            warn!(
                "Ignoring block ({}): time range {}..{} out of bounds",
                block, metadata.min_time, metadata.max_time
            );
            report.blocks.push(skipped(
                block,
                Some(metadata.ulid),
                BlockDecision::Unreadable {
                    reason: "time range out of bounds".to_string(),
                },
            ));
            continue;
        };

        let keep = falls_into_window(block_min, block_max, window);
        info!(
            block = index + 1,
            total,
            ulid = %metadata.ulid,
            min = %block_min,
            max = %block_max,
            "Block {}/{} {}: {}",
            index + 1,
            total,
            metadata.ulid,
            if keep { "falls into the time span" } else { "will be skipped" }
        );

        let decision = if keep {
            BlockDecision::Kept
        } else {
            let removed = match remove_resource(agent, &block).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to drop snapshot block: {}", e);
                    false
                }
            };
            BlockDecision::Dropped { removed }
        };

        report.blocks.push(BlockOutcome {
            path: block,
            ulid: Some(metadata.ulid),
            min_time: Some(block_min),
            max_time: Some(block_max),
            decision,
        });
    }

    Ok(report)
}

fn skipped(path: String, ulid: Option<String>, decision: BlockDecision) -> BlockOutcome {
    BlockOutcome {
        path,
        ulid,
        min_time: None,
        max_time: None,
        decision,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::scripted::{Reply, ScriptedAgent};
    use crate::commands;

    const SNAPSHOT: &str = "/var/data/snapshots/20210101T000000Z-abc";

    fn ms(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    fn window(from: i64, to: i64) -> TimeWindow {
        TimeWindow::new(ms(from), ms(to)).unwrap()
    }

    fn meta(ulid: &str, version: i64, min: i64, max: i64) -> Reply {
        Reply::Stdout(format!(
            r#"{{"ulid":"{ulid}","version":{version},"minTime":{min},"maxTime":{max},"stats":{{"numSamples":1,"numSeries":1,"numChunks":1}}}}"#
        ))
    }

    fn block(name: &str) -> String {
        format!("{}/{}", SNAPSHOT, name)
    }

    fn listing(names: &[&str]) -> Reply {
        Reply::Stdout(names.iter().map(|n| format!("{}/\n", block(n))).collect())
    }

    #[test]
    fn test_window_formula() {
        let w = window(1_000, 15_000);
        // Entirely before `from`.
        assert!(!falls_into_window(ms(0), ms(500), &w));
        // Entirely after `to`.
        assert!(!falls_into_window(ms(16_000), ms(20_000), &w));
        // Straddling `to`.
        assert!(falls_into_window(ms(10_000), ms(20_000), &w));
        // Straddling `from`.
        assert!(falls_into_window(ms(500), ms(2_000), &w));
        // Covering the whole window.
        assert!(falls_into_window(ms(0), ms(20_000), &w));
        // Inside.
        assert!(falls_into_window(ms(2_000), ms(3_000), &w));
        // Bounds equal to `from` are not after it.
        assert!(!falls_into_window(ms(0), ms(1_000), &w));
    }

    #[test]
    fn test_window_formula_with_inverted_block_bounds() {
        // Reproduces the loose check: a block with min > max that spans the
        // window on both sides still passes.
        let w = window(1_000, 15_000);
        assert!(falls_into_window(ms(20_000), ms(0), &w));
    }

    #[tokio::test]
    async fn test_two_block_scenario() {
        let agent = ScriptedAgent::new()
            .reply(commands::list_blocks(SNAPSHOT), listing(&["A", "B"]))
            .reply(commands::read_block_metadata(&block("A")), meta("A", 1, 0, 500))
            .reply(
                commands::read_block_metadata(&block("B")),
                meta("B", 1, 10_000, 20_000),
            );

        let report = lighten_snapshot(&agent, SNAPSHOT, &window(1_000, 15_000))
            .await
            .unwrap();

        assert_eq!(report.blocks.len(), 2);
        assert_eq!(
            report.blocks[0].decision,
            BlockDecision::Dropped { removed: true }
        );
        assert_eq!(report.blocks[1].decision, BlockDecision::Kept);
        assert_eq!(report.blocks[1].min_time, Some(ms(10_000)));

        let removals: Vec<_> = agent
            .executed()
            .into_iter()
            .filter(|c| c.starts_with("rm -rf"))
            .collect();
        assert_eq!(removals, vec![commands::remove(&block("A"))]);
    }

    #[tokio::test]
    async fn test_unsupported_version_never_removed() {
        let agent = ScriptedAgent::new()
            .reply(commands::list_blocks(SNAPSHOT), listing(&["A"]))
            .reply(commands::read_block_metadata(&block("A")), meta("A", 2, 0, 1));

        let report = lighten_snapshot(&agent, SNAPSHOT, &window(1_000, 15_000))
            .await
            .unwrap();

        assert_eq!(
            report.blocks[0].decision,
            BlockDecision::Unsupported { version: 2 }
        );
        assert!(!agent.executed().iter().any(|c| c.starts_with("rm -rf")));
    }

    #[tokio::test]
    async fn test_invalid_metadata_skips_block_only() {
        let agent = ScriptedAgent::new()
            .reply(commands::list_blocks(SNAPSHOT), listing(&["A", "B"]))
            .reply(
                commands::read_block_metadata(&block("A")),
                Reply::Stdout("not json".into()),
            )
            .reply(
                commands::read_block_metadata(&block("B")),
                meta("B", 1, 16_000, 17_000),
            );

        let report = lighten_snapshot(&agent, SNAPSHOT, &window(1_000, 15_000))
            .await
            .unwrap();

        assert!(matches!(
            report.blocks[0].decision,
            BlockDecision::Unreadable { .. }
        ));
        assert_eq!(
            report.blocks[1].decision,
            BlockDecision::Dropped { removed: true }
        );
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.dropped(), 1);
        assert!(!agent
            .executed()
            .contains(&commands::remove(&block("A"))));
    }

    #[tokio::test]
    async fn test_listing_failure_removes_nothing() {
        let agent = ScriptedAgent::new().reply(
            commands::list_blocks(SNAPSHOT),
            Reply::Stderr("ls: cannot access".into()),
        );

        let result = lighten_snapshot(&agent, SNAPSHOT, &window(1_000, 15_000)).await;

        assert!(result.is_err());
        assert_eq!(agent.executed(), vec![commands::list_blocks(SNAPSHOT)]);
    }

    #[tokio::test]
    async fn test_failed_block_removal_continues() {
        let agent = ScriptedAgent::new()
            .reply(commands::list_blocks(SNAPSHOT), listing(&["A", "B"]))
            .reply(commands::read_block_metadata(&block("A")), meta("A", 1, 0, 10))
            .reply(
                commands::remove(&block("A")),
                Reply::Transport("connection reset".into()),
            )
            .reply(commands::read_block_metadata(&block("B")), meta("B", 1, 0, 20));

        let report = lighten_snapshot(&agent, SNAPSHOT, &window(1_000, 15_000))
            .await
            .unwrap();

        assert_eq!(
            report.blocks[0].decision,
            BlockDecision::Dropped { removed: false }
        );
        assert_eq!(
            report.blocks[1].decision,
            BlockDecision::Dropped { removed: true }
        );
    }
}
