use std::path::PathBuf;

use clap::Parser;

/// Check a release manifest and swap in a newer lomorage build.
#[derive(Debug, Default, Parser)]
#[command(name = "lomo-update", version, about)]
pub struct Cli {
    /// App directory to replace with the new release [default: current dir]
    #[arg(short = 'a', long, env = "LOMO_UPDATE_APP_DIR")]
    pub app_dir: Option<PathBuf>,

    /// Directory for the download, extraction and backup of the old release
    /// [default: a temporary directory removed afterwards]
    #[arg(short = 'b', long, env = "LOMO_UPDATE_BACKUP_DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Currently installed version
    #[arg(short = 'c', long = "curr-version", env = "LOMO_UPDATE_CURR_VERSION")]
    pub curr_version: Option<String>,

    /// URL of the release manifest
    #[arg(short = 'u', long, env = "LOMO_UPDATE_URL")]
    pub url: Option<String>,

    /// Command run (and waited for) before the swap
    #[arg(long, env = "LOMO_UPDATE_PRECMD")]
    pub precmd: Option<String>,

    /// Single argument passed to the pre-upgrade command
    #[arg(long, env = "LOMO_UPDATE_PRECMDARG", allow_hyphen_values = true)]
    pub precmdarg: Option<String>,

    /// Command launched after the swap
    #[arg(long, env = "LOMO_UPDATE_POSTCMD")]
    pub postcmd: Option<String>,

    /// Single argument passed to the post-upgrade command
    #[arg(long, env = "LOMO_UPDATE_POSTCMDARG", allow_hyphen_values = true)]
    pub postcmdarg: Option<String>,

    /// Directory for the log file
    #[arg(long, env = "LOMO_UPDATE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Manifest key to use instead of the running platform
    #[arg(long, env = "LOMO_UPDATE_PLATFORM")]
    pub platform: Option<String>,

    /// JSON settings file; flags override its values
    #[arg(long, env = "LOMO_UPDATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Overall timeout for each HTTP request, in seconds
    #[arg(long, env = "LOMO_UPDATE_HTTP_TIMEOUT_SECS")]
    pub http_timeout_secs: Option<u64>,

    /// Log debug output
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print warnings and errors to the terminal
    #[arg(short, long)]
    pub quiet: bool,
}
