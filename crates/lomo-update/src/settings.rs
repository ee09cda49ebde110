use std::path::{Path, PathBuf};
use std::time::Duration;

use lomo_update_core::{HookCommand, UpdateOptions};
use serde::Deserialize;

use crate::cli::Cli;
use crate::error::SettingsError;

const DEFAULT_MANIFEST_URL: &str = "http://lomorage.github.io/release.json";

/// Values read from the optional JSON settings file. Every field mirrors a
/// command-line flag.
#[derive(Debug, Clone, Deserialize)]
pub struct FileSettings {
    #[serde(default)]
    pub app_dir: Option<PathBuf>,

    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    #[serde(default)]
    pub curr_version: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub precmd: Option<String>,

    #[serde(default)]
    pub precmdarg: Option<String>,

    #[serde(default)]
    pub postcmd: Option<String>,

    #[serde(default)]
    pub postcmdarg: Option<String>,

    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub platform: Option<String>,

    #[serde(default)]
    pub http_timeout_secs: Option<u64>,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,

    #[serde(default)]
    pub verbose: bool,
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            app_dir: None,
            backup_dir: None,
            curr_version: None,
            url: None,
            precmd: None,
            precmdarg: None,
            postcmd: None,
            postcmdarg: None,
            log_dir: None,
            platform: None,
            http_timeout_secs: None,
            max_log_size_bytes: default_max_log_size_bytes(),
            verbose: false,
        }
    }
}

impl FileSettings {
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Everything one invocation needs, after flags and file are merged.
#[derive(Debug)]
pub struct RunConfig {
    pub options: UpdateOptions,
    pub log_dir: Option<PathBuf>,
    pub http_timeout: Option<Duration>,
    pub max_log_size_bytes: u64,
    pub verbose: bool,
    pub quiet: bool,
}

impl RunConfig {
    /// Merge `cli` over the settings file it names (if any).
    ///
    /// # Errors
    /// Returns an error if the settings file cannot be loaded, or the app dir
    /// defaults to a current directory that cannot be determined.
    pub fn resolve(cli: Cli) -> Result<Self, SettingsError> {
        let file = match &cli.config {
            Some(path) => FileSettings::load(path)?,
            None => FileSettings::default(),
        };
        Self::merge(cli, file)
    }

    fn merge(cli: Cli, file: FileSettings) -> Result<Self, SettingsError> {
        let app_dir = match cli.app_dir.or(file.app_dir) {
            Some(dir) => dir,
            None => std::env::current_dir().map_err(SettingsError::CurrentDir)?,
        };

        let pre_hook = hook(cli.precmd.or(file.precmd), cli.precmdarg.or(file.precmdarg));
        let post_hook = hook(
            cli.postcmd.or(file.postcmd),
            cli.postcmdarg.or(file.postcmdarg),
        );

        let options = UpdateOptions {
            app_dir,
            backup_dir: cli.backup_dir.or(file.backup_dir),
            current_version: cli.curr_version.or(file.curr_version).unwrap_or_default(),
            manifest_url: cli
                .url
                .or(file.url)
                .unwrap_or_else(|| DEFAULT_MANIFEST_URL.to_string()),
            platform: cli
                .platform
                .or(file.platform)
                .unwrap_or_else(|| lomo_update_platform::platform_id().to_string()),
            pre_hook,
            post_hook,
        };

        Ok(Self {
            options,
            log_dir: cli.log_dir.or(file.log_dir),
            http_timeout: cli
                .http_timeout_secs
                .or(file.http_timeout_secs)
                .map(Duration::from_secs),
            max_log_size_bytes: file.max_log_size_bytes,
            verbose: cli.verbose || (file.verbose && !cli.quiet),
            quiet: cli.quiet,
        })
    }
}

fn hook(program: Option<String>, arg: Option<String>) -> Option<HookCommand> {
    program
        .filter(|program| !program.trim().is_empty())
        .map(|program| HookCommand::new(program, arg))
}
