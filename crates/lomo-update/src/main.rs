mod cli;
mod error;
mod logging;
mod settings;

use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};
use lomo_update_core::{LogReporter, RunReport, UpdateError, Updater, build_client};

use crate::cli::Cli;
use crate::settings::RunConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match RunConfig::resolve(cli) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("lomo-update: {error}");
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(
        config.log_dir.as_deref(),
        config.verbose,
        config.quiet,
        config.max_log_size_bytes,
    );
    info!("lomo-update {} starting", env!("CARGO_PKG_VERSION"));

    match execute(config).await {
        Ok(report) => {
            summarize(&report);
            ExitCode::SUCCESS
        }
        Err(error) => {
            error!("Update failed: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(config: RunConfig) -> Result<RunReport, UpdateError> {
    if let Some(hook) = &config.options.pre_hook {
        hook.warn_if_missing("Pre-upgrade");
    }
    if let Some(hook) = &config.options.post_hook {
        hook.warn_if_missing("Post-upgrade");
    }

    let client = build_client(config.http_timeout)?;
    let updater = Updater::new(client, config.options);
    updater.run(&LogReporter).await
}

fn summarize(report: &RunReport) {
    match report {
        RunReport::UpToDate { version } => info!("Already at version {version}"),
        RunReport::Upgraded { from, to, swap, .. } => {
            if let Some(backup) = &swap.backup {
                info!("Previous installation kept at {}", backup.display());
            }
            if report.has_warnings() {
                warn!("Upgrade from {from} to {to} finished with warnings");
            } else {
                info!("Upgrade from {from} to {to} finished");
            }
        }
    }
}
