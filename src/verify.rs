//! Checksums of retrieved files.

use crate::error::CollectorError;
use std::path::{Path, PathBuf};

/// Computes the MD5 hash of a local file.
///
/// This function reads the file in chunks to avoid loading large archives
/// entirely into memory. It runs in a blocking task to avoid blocking
/// the async runtime.
///
/// # Arguments
///
/// * `path` - Path to the file
///
/// # Returns
///
/// The MD5 hash as a hexadecimal string, or an error.
pub(crate) async fn compute_file_md5(path: &Path) -> Result<String, CollectorError> {
    let path: PathBuf = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        use md5::{Digest, Md5};
        use std::io::Read;

        let file = std::fs::File::open(&path)?;
        let mut reader = std::io::BufReader::with_capacity(1024 * 1024, file);
        let mut hasher = Md5::new();
        let mut buffer = vec![0u8; 1024 * 1024];

        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok::<String, CollectorError>(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| CollectorError::Io(std::io::Error::other(format!("Task join error: {}", e))))?
}
