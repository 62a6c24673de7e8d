//! Local unpacking of a retrieved snapshot archive.

use crate::error::CollectorError;
use flate2::read::GzDecoder;
use std::io::{BufReader, Read};
use std::path::Path;
use tar::Archive;

/// Extracts a tar archive to a target directory with progress tracking.
///
/// # Arguments
///
/// * `archive_path` - Path to the retrieved archive
/// * `target_dir` - Target directory for extraction
/// * `gzip` - Whether the archive is gzip-compressed
/// * `extract_pb` - Progress bar for visual feedback
///
/// # Returns
///
/// The number of extracted entries, or an error if extraction fails.
pub(crate) fn extract_tar(
    archive_path: &Path,
    target_dir: &Path,
    gzip: bool,
    extract_pb: &indicatif::ProgressBar,
) -> Result<u64, CollectorError> {
    let file = BufReader::new(std::fs::File::open(archive_path)?);
    let reader: Box<dyn Read> = if gzip {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let mut archive = Archive::new(reader);
    std::fs::create_dir_all(target_dir)?;

    let mut file_count = 0u64;

    for (index, entry) in archive.entries()?.enumerate() {
        let mut entry = entry?;
        let path = entry.path()?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();

        file_count = (index + 1) as u64;

        // Update message more frequently at the beginning, then every 100 files
        if index < 10 || index % 100 == 0 {
            extract_pb.set_message(format!("Extracting: {} files | {}", file_count, file_name));
        }

        entry.unpack_in(target_dir)?;
    }

    extract_pb.finish_with_message(format!(
        "Extracted {} files to {}",
        file_count,
        target_dir.display()
    ));

    Ok(file_count)
}

/// Spinner used while unpacking. Hidden when stderr is not a terminal.
pub(crate) fn extract_spinner() -> indicatif::ProgressBar {
    let pb = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg} | {elapsed_precise} elapsed")
    {
        pb.set_style(style);
    }
    pb
}
