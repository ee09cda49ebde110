use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use log::debug;
use semver::Version;
use tempfile::TempDir;

use crate::download::download_artifact;
use crate::error::UpdateError;
use crate::extract::extract_archive;
use crate::hooks::{self, HookCommand};
use crate::manifest::fetch_manifest;
use crate::report::{
    RunReport, Stage, StageOutcome, SwapOutcome, UpdateEvent, UpdateReporter, stage_failed,
};

const EXTRACT_DIR_NAME: &str = "uncompress";
const BACKUP_PREFIX: &str = "lomod-bak-";

#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// The live installation that gets replaced.
    pub app_dir: PathBuf,
    /// Where downloads, extraction and backups go. A temporary directory next
    /// to `app_dir` is used (and removed afterwards) when unset.
    pub backup_dir: Option<PathBuf>,
    pub current_version: String,
    pub manifest_url: String,
    /// Manifest key to select, see [`lomo_update_platform::platform_id`].
    pub platform: String,
    pub pre_hook: Option<HookCommand>,
    pub post_hook: Option<HookCommand>,
}

impl UpdateOptions {
    /// # Errors
    /// Returns [`UpdateError::InvalidConfig`] for an empty version, URL or
    /// platform, or an app dir that is not an existing, named directory.
    pub fn validate(&self) -> Result<(), UpdateError> {
        if self.app_dir.as_os_str().is_empty() {
            return Err(UpdateError::InvalidConfig("invalid app dir".to_string()));
        }
        if self.current_version.trim().is_empty() {
            return Err(UpdateError::InvalidConfig(
                "invalid current version".to_string(),
            ));
        }
        if self.manifest_url.trim().is_empty() {
            return Err(UpdateError::InvalidConfig("invalid url".to_string()));
        }
        if self.platform.is_empty() {
            return Err(UpdateError::InvalidConfig("invalid platform".to_string()));
        }
        if !self.app_dir.is_dir() {
            return Err(UpdateError::InvalidConfig(format!(
                "app dir {} is not a directory",
                self.app_dir.display()
            )));
        }
        if self.app_dir.file_name().is_none() {
            return Err(UpdateError::InvalidConfig(format!(
                "app dir {} must end in a directory name",
                self.app_dir.display()
            )));
        }
        Ok(())
    }
}

/// Drives one update run: version check, download, extract, pre-hook, swap,
/// post-hook.
pub struct Updater {
    client: reqwest::Client,
    options: UpdateOptions,
}

impl Updater {
    #[must_use]
    pub fn new(client: reqwest::Client, options: UpdateOptions) -> Self {
        Self { client, options }
    }

    #[must_use]
    pub fn options(&self) -> &UpdateOptions {
        &self.options
    }

    /// Run the update sequence once.
    ///
    /// Manifest, download and extraction failures abort the run before any
    /// hook runs or any directory is touched. Pre-hook and swap failures are
    /// reported and recorded in the returned [`RunReport`], and the run
    /// carries on. A post-hook that cannot be launched is the run's error.
    ///
    /// # Errors
    /// Returns an error for invalid options, fatal stage failures, and
    /// post-hook launch failure.
    pub async fn run(&self, reporter: &dyn UpdateReporter) -> Result<RunReport, UpdateError> {
        let options = &self.options;
        options.validate()?;

        reporter.report(UpdateEvent::CheckingManifest {
            url: options.manifest_url.clone(),
            platform: options.platform.clone(),
        });
        let release = fetch_manifest(&self.client, &options.manifest_url, &options.platform)
            .await
            .map_err(|error| stage_failed(Stage::CheckVersion, error, reporter))?;

        if release.version == options.current_version {
            reporter.report(UpdateEvent::UpToDate {
                version: release.version.clone(),
            });
            return Ok(RunReport::UpToDate {
                version: release.version,
            });
        }

        if is_downgrade(&release.version, &options.current_version) {
            reporter.report(UpdateEvent::Downgrade {
                current: options.current_version.clone(),
                latest: release.version.clone(),
            });
        }
        reporter.report(UpdateEvent::UpdateAvailable {
            current: options.current_version.clone(),
            latest: release.version.clone(),
        });

        let staging = Staging::prepare(options.backup_dir.as_deref(), &options.app_dir)
            .map_err(|error| stage_failed(Stage::Download, error, reporter))?;

        reporter.report(UpdateEvent::Downloading {
            url: release.url.clone(),
        });
        let artifact =
            download_artifact(&self.client, &release.url, &release.sha256, staging.path())
                .await
                .map_err(|error| stage_failed(Stage::Download, error, reporter))?;
        reporter.report(UpdateEvent::Downloaded {
            bytes: artifact.len(),
        });

        let extract_dir = staging.path().join(EXTRACT_DIR_NAME);
        reporter.report(UpdateEvent::Extracting {
            destination: extract_dir.clone(),
        });
        extract_archive(artifact.path(), &extract_dir)
            .map_err(|error| stage_failed(Stage::Extract, error, reporter))?;
        drop(artifact);

        let pre_hook = match &options.pre_hook {
            Some(hook) => {
                reporter.report(UpdateEvent::RunningHook {
                    stage: Stage::PreHook,
                    command: hook.to_string(),
                });
                StageOutcome::absorb(Stage::PreHook, hooks::run_sync(hook).await, reporter)
            }
            None => {
                reporter.report(UpdateEvent::StageSkipped(Stage::PreHook));
                StageOutcome::Skipped
            }
        };

        let swap = swap_installation(
            &options.app_dir,
            staging.path(),
            &extract_dir,
            Local::now().naive_local(),
            reporter,
        );

        let post_hook = match &options.post_hook {
            Some(hook) => {
                reporter.report(UpdateEvent::RunningHook {
                    stage: Stage::PostHook,
                    command: hook.to_string(),
                });
                hooks::run_async(hook)
                    .map_err(|error| stage_failed(Stage::PostHook, error, reporter))?;
                StageOutcome::Completed
            }
            None => {
                reporter.report(UpdateEvent::StageSkipped(Stage::PostHook));
                StageOutcome::Skipped
            }
        };

        Ok(RunReport::Upgraded {
            from: options.current_version.clone(),
            to: release.version,
            pre_hook,
            swap,
            post_hook,
        })
    }
}

/// Root for the download, the extraction and the backup of one run.
enum Staging {
    Provided(PathBuf),
    Ephemeral(TempDir),
}

impl Staging {
    fn prepare(backup_dir: Option<&Path>, app_dir: &Path) -> Result<Self, UpdateError> {
        if let Some(dir) = backup_dir {
            std::fs::create_dir_all(dir)
                .map_err(|error| UpdateError::fs("failed to create backup directory", dir, error))?;
            return Ok(Staging::Provided(dir.to_path_buf()));
        }

        // Next to the installation so the swap renames stay on one filesystem.
        let parent = app_dir
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let temp = tempfile::Builder::new()
            .prefix("lomod-temp")
            .tempdir_in(parent)
            .map_err(|error| UpdateError::fs("failed to create staging directory", parent, error))?;
        debug!("Staging in temporary directory {}", temp.path().display());
        Ok(Staging::Ephemeral(temp))
    }

    fn path(&self) -> &Path {
        match self {
            Staging::Provided(path) => path,
            Staging::Ephemeral(temp) => temp.path(),
        }
    }
}

/// Move `app_dir` aside into `backup_root` and activate the directory of the
/// same name from `extract_dir` in its place.
///
/// Nothing is touched unless the new directory exists. If the first move
/// succeeds and the second fails, `app_dir` is left absent and the outcome
/// names the backup holding the previous installation.
pub fn swap_installation(
    app_dir: &Path,
    backup_root: &Path,
    extract_dir: &Path,
    now: NaiveDateTime,
    reporter: &dyn UpdateReporter,
) -> SwapOutcome {
    let Some(name) = app_dir.file_name() else {
        return SwapOutcome {
            outcome: StageOutcome::absorb(
                Stage::Swap,
                Err(UpdateError::InvalidConfig(format!(
                    "app dir {} has no directory name",
                    app_dir.display()
                ))),
                reporter,
            ),
            backup: None,
        };
    };

    let new_release = extract_dir.join(name);
    if !new_release.is_dir() {
        return SwapOutcome {
            outcome: StageOutcome::absorb(
                Stage::Swap,
                Err(UpdateError::MissingPayload {
                    expected: new_release,
                }),
                reporter,
            ),
            backup: None,
        };
    }

    let backup = backup_path(backup_root, now);
    reporter.report(UpdateEvent::Swapping {
        app_dir: app_dir.to_path_buf(),
        backup: backup.clone(),
    });
    if let Err(error) = move_dir(app_dir, &backup, "failed to move installation aside") {
        return SwapOutcome {
            outcome: StageOutcome::absorb(Stage::Swap, Err(error), reporter),
            backup: None,
        };
    }

    let outcome = StageOutcome::absorb(
        Stage::Swap,
        move_dir(&new_release, app_dir, "failed to activate new release"),
        reporter,
    );
    if outcome.is_completed() {
        reporter.report(UpdateEvent::Swapped {
            app_dir: app_dir.to_path_buf(),
        });
    }
    SwapOutcome {
        outcome,
        backup: Some(backup),
    }
}

/// `lomod-bak-YYYYMMDD_HHMMSS` under `root`, with `-1`, `-2`, ... appended
/// when a backup from the same second already exists.
#[must_use]
pub fn backup_path(root: &Path, now: NaiveDateTime) -> PathBuf {
    let base = format!("{BACKUP_PREFIX}{}", now.format("%Y%m%d_%H%M%S"));
    let mut candidate = root.join(&base);
    let mut suffix = 1_u32;
    while candidate.symlink_metadata().is_ok() {
        candidate = root.join(format!("{base}-{suffix}"));
        suffix += 1;
    }
    candidate
}

fn move_dir(src: &Path, dest: &Path, context: &'static str) -> Result<(), UpdateError> {
    match std::fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::CrossesDevices => {
            debug!(
                "{} and {} are on different filesystems, copying",
                src.display(),
                dest.display()
            );
            copy_dir_recursive(src, dest)?;
            std::fs::remove_dir_all(src)
                .map_err(|error| UpdateError::fs("failed to clean up source directory", src, error))
        }
        Err(error) => Err(UpdateError::fs(context, src, error)),
    }
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), UpdateError> {
    std::fs::create_dir_all(dest)
        .map_err(|error| UpdateError::fs("failed to create directory", dest, error))?;

    for entry in std::fs::read_dir(src)
        .map_err(|error| UpdateError::fs("failed to read directory", src, error))?
    {
        let entry =
            entry.map_err(|error| UpdateError::fs("failed to read directory entry", src, error))?;
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|error| UpdateError::fs("failed to read file type", &src_path, error))?;

        if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dest_path)?;
        } else if file_type.is_symlink() {
            copy_symlink(&src_path, &dest_path)?;
        } else {
            std::fs::copy(&src_path, &dest_path)
                .map_err(|error| UpdateError::fs("failed to copy file", &src_path, error))?;
        }
    }

    let permissions = std::fs::metadata(src)
        .map_err(|error| UpdateError::fs("failed to read permissions", src, error))?
        .permissions();
    std::fs::set_permissions(dest, permissions)
        .map_err(|error| UpdateError::fs("failed to set permissions", dest, error))
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> Result<(), UpdateError> {
    let target = std::fs::read_link(src)
        .map_err(|error| UpdateError::fs("failed to read symlink", src, error))?;
    std::os::unix::fs::symlink(target, dest)
        .map_err(|error| UpdateError::fs("failed to create symlink", dest, error))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> Result<(), UpdateError> {
    std::fs::copy(src, dest)
        .map(|_| ())
        .map_err(|error| UpdateError::fs("failed to copy file", src, error))
}

fn is_downgrade(latest: &str, current: &str) -> bool {
    match (parse_version(latest), parse_version(current)) {
        (Some(latest), Some(current)) => latest < current,
        _ => false,
    }
}

fn parse_version(version: &str) -> Option<Version> {
    let version = version.trim();
    Version::parse(version.strip_prefix('v').unwrap_or(version)).ok()
}
