use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use lomo_update_platform::AppPaths;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

fn trim_log_file_if_oversized(log_path: &Path, max_log_size: u64) {
    if let Ok(metadata) = std::fs::metadata(log_path)
        && metadata.len() > max_log_size
        && let Ok(contents) = std::fs::read(log_path)
    {
        let half = contents.len() / 2;
        let keep_from = contents[half..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(half, |pos| half + pos + 1);
        let _ = std::fs::write(log_path, &contents[keep_from..]);
    }
}

fn level_for(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

fn resolve_log_dir(log_dir: Option<&Path>) -> Option<PathBuf> {
    match log_dir {
        Some(dir) => Some(dir.to_path_buf()),
        None => AppPaths::new().ok().map(|paths| paths.log_dir()),
    }
}

/// Log to the terminal and, when its directory can be created, to
/// `lomo-update.log` in `log_dir` (or the per-user default).
pub fn init_logging(log_dir: Option<&Path>, verbose: bool, quiet: bool, max_log_size: u64) {
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("lomo_update")
        .build();

    let level = level_for(verbose);
    let term_level = if quiet { LevelFilter::Warn } else { level };
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        term_level,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    let mut file_error = None;
    let mut log_path = None;
    if let Some(dir) = resolve_log_dir(log_dir) {
        let path = AppPaths::log_file_in(&dir);
        match open_log_file(&dir, &path, max_log_size) {
            Ok(file) => {
                loggers.push(WriteLogger::new(level, config, file));
                log_path = Some(path);
            }
            Err(error) => file_error = Some(format!("{}: {error}", path.display())),
        }
    }

    let _ = CombinedLogger::init(loggers);

    if let Some(error) = file_error {
        log::warn!("File logging disabled, could not open {error}");
    }
    if let Some(path) = log_path {
        log::debug!("Logging to {}", path.display());
    }
}

fn open_log_file(dir: &Path, log_path: &Path, max_log_size: u64) -> std::io::Result<File> {
    std::fs::create_dir_all(dir)?;
    trim_log_file_if_oversized(log_path, max_log_size);
    OpenOptions::new().create(true).append(true).open(log_path)
}
