//! Data structures for snapshot collection.

use crate::error::CollectorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Connection details of the Prometheus instance on the remote host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PrometheusSettings {
    /// Admin API port, reached as `localhost:<port>` from the remote host.
    pub port: u16,
    /// Prometheus data root; snapshots live under `<data_path>/snapshots`.
    pub data_path: String,
}

impl Default for PrometheusSettings {
    fn default() -> Self {
        Self {
            port: 9090,
            data_path: "/var/data".to_string(),
        }
    }
}

/// Settings for the metrics collector.
///
/// # Example
///
/// ```
/// use promsnap::CollectorSettings;
///
/// let settings: CollectorSettings =
///     serde_json::from_str(r#"{"prometheus": {"port": 9091}, "gzip": true}"#).unwrap();
/// assert_eq!(settings.prometheus.port, 9091);
/// assert_eq!(settings.prometheus.data_path, "/var/data");
/// assert!(settings.copy_compressed);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CollectorSettings {
    pub prometheus: PrometheusSettings,
    /// Pack the snapshot into a single archive on the remote host before transfer.
    pub copy_compressed: bool,
    /// Temporary remote path of the archive (without the `.gz` suffix).
    pub archive_path: String,
    /// Gzip the archive. Only meaningful with `copy_compressed`.
    pub gzip: bool,
    /// Unpack a retrieved archive into the output directory.
    pub unpack: bool,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            prometheus: PrometheusSettings::default(),
            copy_compressed: true,
            archive_path: "/tmp/promsnap-collection.tar".to_string(),
            gzip: false,
            unpack: false,
        }
    }
}

impl CollectorSettings {
    /// Loads settings from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, CollectorError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|source| CollectorError::Settings {
            path: path.display().to_string(),
            source,
        })
    }

    /// Remote path the archive is written to.
    pub fn remote_archive_path(&self) -> String {
        if self.gzip {
            format!("{}.gz", self.archive_path)
        } else {
            self.archive_path.clone()
        }
    }

    /// Name of the local copy inside the output directory.
    pub fn local_resource_name(&self) -> &'static str {
        match (self.copy_compressed, self.gzip) {
            (false, _) => "snapshot",
            (true, false) => "snapshot.tar",
            (true, true) => "snapshot.tar.gz",
        }
    }
}

/// Requested time window `[from, to)`.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, CollectorError> {
        if from >= to {
            return Err(CollectorError::InvalidWindow {
                from: from.to_rfc3339(),
                to: to.to_rfc3339(),
            });
        }
        Ok(Self { from, to })
    }
}

/// Immutable configuration of one collection run.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub settings: CollectorSettings,
    pub window: TimeWindow,
}
