//! Update sequence for a lomorage installation.
//!
//! One run checks a remote release manifest, and when the published version
//! differs from the installed one:
//! - downloads the release archive while hashing it,
//! - extracts it into a staging directory,
//! - runs the operator's pre-upgrade hook and waits for it,
//! - moves the live installation aside and the new one into place,
//! - launches the post-upgrade hook without waiting.

mod client;
mod download;
mod error;
mod extract;
mod hooks;
mod manifest;
mod report;
mod sequence;

/// HTTP client construction shared by every network stage.
pub use client::build_client;
/// Streaming, digest-verified artifact download.
pub use download::{ArtifactFile, download_artifact};
/// Error taxonomy for every stage of a run.
pub use error::UpdateError;
/// Zip extraction with path-traversal protection.
pub use extract::extract_archive;
/// Pre/post hook commands.
pub use hooks::{HookCommand, run_async, run_sync};
/// Release manifest model and fetch helper.
pub use manifest::{PlatformRelease, ReleaseManifest, fetch_manifest, parse_manifest};
/// Stage events and outcomes.
pub use report::{
    LogReporter, RunReport, Stage, StageOutcome, SwapOutcome, UpdateEvent, UpdateReporter,
};
/// The update sequence itself.
pub use sequence::{UpdateOptions, Updater, backup_path, swap_installation};
