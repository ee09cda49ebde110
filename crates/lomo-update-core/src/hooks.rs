use std::fmt;
use std::path::PathBuf;

use log::{debug, warn};
use lomo_update_platform::HideWindow;

use crate::error::UpdateError;

/// An operator-configured command run around the swap: one program and at
/// most one argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookCommand {
    pub program: String,
    pub arg: Option<String>,
}

impl HookCommand {
    /// Build a hook, treating an empty argument as no argument.
    #[must_use]
    pub fn new(program: impl Into<String>, arg: Option<String>) -> Self {
        Self {
            program: program.into(),
            arg: arg.filter(|arg| !arg.is_empty()),
        }
    }

    /// Where the program would be found, if it can be found at all.
    #[must_use]
    pub fn resolve(&self) -> Option<PathBuf> {
        which::which(&self.program).ok()
    }

    /// Log a warning when the program cannot be located ahead of time.
    pub fn warn_if_missing(&self, role: &str) {
        if self.resolve().is_none() {
            warn!("{role} command '{}' was not found", self.program);
        }
    }

    fn std_command(&self) -> std::process::Command {
        let mut command = std::process::Command::new(&self.program);
        command.args(self.arg.iter()).hide_window();
        command
    }

    fn tokio_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(self.arg.iter()).hide_window();
        command
    }

    fn launch_error(&self, source: std::io::Error) -> UpdateError {
        UpdateError::HookLaunch {
            program: self.program.clone(),
            source,
        }
    }
}

impl fmt::Display for HookCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{} {arg}", self.program),
            None => f.write_str(&self.program),
        }
    }
}

/// Run `hook` and wait for it to exit.
///
/// # Errors
/// Returns [`UpdateError::HookLaunch`] if the process cannot be started and
/// [`UpdateError::HookExit`] if it exits unsuccessfully.
pub async fn run_sync(hook: &HookCommand) -> Result<(), UpdateError> {
    let status = hook
        .tokio_command()
        .status()
        .await
        .map_err(|error| hook.launch_error(error))?;

    if status.success() {
        debug!("Hook {hook} finished");
        Ok(())
    } else {
        Err(UpdateError::HookExit {
            program: hook.program.clone(),
            status,
        })
    }
}

/// Start `hook` and return without waiting for it.
///
/// # Errors
/// Returns [`UpdateError::HookLaunch`] if the process cannot be started.
pub fn run_async(hook: &HookCommand) -> Result<(), UpdateError> {
    let child = hook
        .std_command()
        .spawn()
        .map_err(|error| hook.launch_error(error))?;
    debug!("Hook {hook} started with pid {}", child.id());
    Ok(())
}
