//! promsnap - Collect time-window trimmed Prometheus snapshots from remote nodes
//!
//! This library creates a TSDB snapshot on a remote Prometheus node, drops the
//! blocks that fall outside a requested time window, optionally packs what is
//! left into a single archive, and downloads it.
//!
//! # Features
//!
//! - **Snapshot Creation**: Uses the Prometheus admin API on the remote host
//! - **Lightening**: Removes blocks outside the requested window before transfer
//! - **Archive Transfer**: Optionally ships one (gzip) tarball instead of a tree
//! - **Remote Cleanup**: Always attempts to remove what was created remotely
//! - **Verification**: MD5 checksum and optional unpacking of the local copy
//!
//! # Example
//!
//! ```no_run
//! use chrono::{Duration, Utc};
//! use promsnap::{CollectorConfig, CollectorSettings, MetricsCollector, SshAgent, TimeWindow};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let now = Utc::now();
//! let config = CollectorConfig {
//!     settings: CollectorSettings::default(),
//!     window: TimeWindow::new(now - Duration::days(1), now)?,
//! };
//!
//! MetricsCollector::new(config, "collected/db-1")
//!     .collect(&SshAgent::new("db-1.internal"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod archive;
mod cleanup;
mod extract;
mod retrieve;
mod snapshot;
mod verify;

pub mod agent;
pub mod commands;
pub mod error;
pub mod lighten;
pub mod metadata;
pub mod orchestrator;
pub mod ssh;
pub mod step;
pub mod types;

pub use agent::{AgentError, CommandOutput, RemoteAgent, RetrieveOptions};
pub use error::CollectorError;
pub use lighten::{falls_into_window, BlockDecision, BlockOutcome, LightenReport};
pub use metadata::BlockMetadata;
pub use orchestrator::{CollectionReport, MetricsCollector};
pub use ssh::SshAgent;
pub use types::{CollectorConfig, CollectorSettings, PrometheusSettings, TimeWindow};
