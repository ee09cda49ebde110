use std::path::Path;

use futures_util::StreamExt;
use log::debug;
use sha2::{Digest, Sha256};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

use crate::error::UpdateError;

/// A downloaded artifact whose size and SHA-256 digest have been verified.
///
/// The file lives in the staging directory and is removed when this value
/// is dropped.
#[derive(Debug)]
pub struct ArtifactFile {
    path: TempPath,
    bytes: u64,
    sha256: String,
}

impl ArtifactFile {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    /// Lowercase hex digest of the file contents.
    #[must_use]
    pub fn sha256(&self) -> &str {
        &self.sha256
    }
}

/// Stream `url` into a fresh temporary file in `dest_dir`, hashing as it
/// goes, and verify the result against `expected_sha256`.
///
/// The comparison is case-insensitive. On failure the temporary file is
/// removed before the error is returned.
///
/// # Errors
/// Returns an error if the temporary file cannot be created or written, the
/// request fails or returns a non-success status, the body is empty, or the
/// digest does not match.
pub async fn download_artifact(
    client: &reqwest::Client,
    url: &str,
    expected_sha256: &str,
    dest_dir: &Path,
) -> Result<ArtifactFile, UpdateError> {
    let temp = tempfile::Builder::new()
        .prefix("lomod-")
        .tempfile_in(dest_dir)
        .map_err(|error| UpdateError::fs("failed to create download file", dest_dir, error))?;
    let (std_file, path) = temp.into_parts();

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|error| UpdateError::transport("download request failed", error))?;

    if !response.status().is_success() {
        return Err(UpdateError::HttpStatus {
            url: url.to_string(),
            status: response.status(),
        });
    }

    let mut file = tokio::fs::File::from_std(std_file);
    let mut hasher = Sha256::new();
    let mut bytes: u64 = 0;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|error| UpdateError::transport("download stream error", error))?;
        hasher.update(&chunk);
        file.write_all(&chunk)
            .await
            .map_err(|error| UpdateError::fs("failed to write download data", &path, error))?;
        bytes += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|error| UpdateError::fs("failed to flush download file", &path, error))?;
    file.sync_all()
        .await
        .map_err(|error| UpdateError::fs("failed to sync download file", &path, error))?;
    drop(file);

    if bytes == 0 {
        return Err(UpdateError::EmptyArtifact {
            url: url.to_string(),
        });
    }

    let actual = format!("{:x}", hasher.finalize());
    if !digest_matches(&actual, expected_sha256) {
        return Err(UpdateError::DigestMismatch {
            expected: expected_sha256.trim().to_ascii_lowercase(),
            actual,
        });
    }

    debug!("Downloaded {bytes} bytes to {}", path.display());
    Ok(ArtifactFile {
        path,
        bytes,
        sha256: actual,
    })
}

fn digest_matches(actual: &str, expected: &str) -> bool {
    actual.eq_ignore_ascii_case(expected.trim())
}
