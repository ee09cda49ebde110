mod commands;
mod paths;
mod platform;

pub use commands::HideWindow;
pub use paths::{AppPaths, AppPathsError};
pub use platform::{platform_id, platform_id_for};
