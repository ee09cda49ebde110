use std::fmt;
use std::path::PathBuf;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::error::UpdateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CheckVersion,
    Download,
    Extract,
    PreHook,
    Swap,
    PostHook,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::CheckVersion => "version check",
            Stage::Download => "download",
            Stage::Extract => "extraction",
            Stage::PreHook => "pre-upgrade hook",
            Stage::Swap => "swap",
            Stage::PostHook => "post-upgrade hook",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    CheckingManifest { url: String, platform: String },
    UpToDate { version: String },
    UpdateAvailable { current: String, latest: String },
    Downgrade { current: String, latest: String },
    Downloading { url: String },
    Downloaded { bytes: u64 },
    Extracting { destination: PathBuf },
    RunningHook { stage: Stage, command: String },
    Swapping { app_dir: PathBuf, backup: PathBuf },
    Swapped { app_dir: PathBuf },
    StageSkipped(Stage),
    StageAbsorbed { stage: Stage, error: String },
    StageFailed { stage: Stage, error: String },
}

/// Sink for the stage transitions of an update run.
///
/// Components never write to a global logger directly; they are handed a
/// reporter by whoever drives the run.
pub trait UpdateReporter: Send + Sync {
    fn report(&self, event: UpdateEvent);
}

/// Forwards every event to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl UpdateReporter for LogReporter {
    fn report(&self, event: UpdateEvent) {
        match event {
            UpdateEvent::CheckingManifest { url, platform } => {
                info!("Checking release manifest {url} for platform {platform}");
            }
            UpdateEvent::UpToDate { version } => {
                info!("No new version, skip upgrade (current {version})");
            }
            UpdateEvent::UpdateAvailable { current, latest } => {
                info!("Got new version {latest} (current {current}), start upgrade");
            }
            UpdateEvent::Downgrade { current, latest } => {
                warn!("Manifest version {latest} is older than current {current}; upgrading anyway");
            }
            UpdateEvent::Downloading { url } => info!("Downloading release from {url}"),
            UpdateEvent::Downloaded { bytes } => info!("Download verified: {bytes} bytes"),
            UpdateEvent::Extracting { destination } => {
                info!("Extracting release into {}", destination.display());
            }
            UpdateEvent::RunningHook { stage, command } => info!("Running {stage}: {command}"),
            UpdateEvent::Swapping { app_dir, backup } => info!(
                "Moving {} aside to {}",
                app_dir.display(),
                backup.display()
            ),
            UpdateEvent::Swapped { app_dir } => {
                info!("New release activated at {}", app_dir.display());
            }
            UpdateEvent::StageSkipped(stage) => debug!("No {stage} configured, skipping"),
            UpdateEvent::StageAbsorbed { stage, error } => {
                warn!("{stage} failed, continuing: {error}");
            }
            UpdateEvent::StageFailed { stage, error } => {
                debug!("Upgrade aborted during {stage}: {error}");
            }
        }
    }
}

impl UpdateReporter for mpsc::UnboundedSender<UpdateEvent> {
    fn report(&self, event: UpdateEvent) {
        let _ = self.send(event);
    }
}

/// Report `error` as the fatal failure of `stage` and hand it back for `?`.
pub(crate) fn stage_failed(
    stage: Stage,
    error: UpdateError,
    reporter: &dyn UpdateReporter,
) -> UpdateError {
    reporter.report(UpdateEvent::StageFailed {
        stage,
        error: error.to_string(),
    });
    error
}

/// Result of a stage whose failure does not abort the run.
#[derive(Debug)]
pub enum StageOutcome {
    Completed,
    Skipped,
    Absorbed(UpdateError),
}

impl StageOutcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, StageOutcome::Completed)
    }

    pub(crate) fn absorb(
        stage: Stage,
        result: Result<(), UpdateError>,
        reporter: &dyn UpdateReporter,
    ) -> Self {
        match result {
            Ok(()) => StageOutcome::Completed,
            Err(error) => {
                reporter.report(UpdateEvent::StageAbsorbed {
                    stage,
                    error: error.to_string(),
                });
                StageOutcome::Absorbed(error)
            }
        }
    }
}

#[derive(Debug)]
pub struct SwapOutcome {
    pub outcome: StageOutcome,
    /// Where the previous installation was moved, if step one of the swap
    /// succeeded.
    pub backup: Option<PathBuf>,
}

#[derive(Debug)]
pub enum RunReport {
    UpToDate {
        version: String,
    },
    Upgraded {
        from: String,
        to: String,
        pre_hook: StageOutcome,
        swap: SwapOutcome,
        post_hook: StageOutcome,
    },
}

impl RunReport {
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        match self {
            RunReport::UpToDate { .. } => false,
            RunReport::Upgraded {
                pre_hook,
                swap,
                post_hook,
                ..
            } => [pre_hook, &swap.outcome, post_hook]
                .iter()
                .any(|outcome| matches!(outcome, StageOutcome::Absorbed(_))),
        }
    }
}
