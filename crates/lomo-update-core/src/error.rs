use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("{context}: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} failed with HTTP {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("failed to parse release manifest: {0}")]
    ManifestParse(#[source] serde_json::Error),
    #[error("Unsupported platform: {platform}")]
    UnsupportedPlatform { platform: String },
    #[error("downloaded artifact from {url} is empty")]
    EmptyArtifact { url: String },
    #[error("artifact checksum mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },
    #[error("{}: illegal file path", path.display())]
    IllegalPath { path: PathBuf },
    #[error("{context}: {source}")]
    Archive {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("{context} ({}): {source}", path.display())]
    Filesystem {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("extracted release has no directory to activate at {}", expected.display())]
    MissingPayload { expected: PathBuf },
    #[error("failed to launch hook {program}: {source}")]
    HookLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("hook {program} exited with {status}")]
    HookExit {
        program: String,
        status: std::process::ExitStatus,
    },
    #[error("{0}")]
    InvalidConfig(String),
}

impl UpdateError {
    pub(crate) fn transport(context: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { context, source }
    }

    pub(crate) fn archive(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Archive { context, source }
    }

    pub(crate) fn fs(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Filesystem {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn illegal_path(path: impl Into<PathBuf>) -> Self {
        Self::IllegalPath { path: path.into() }
    }
}
