/// Manifest key for the running platform.
///
/// Release manifests are keyed by the operating system names used by the
/// publishing pipeline (`windows`, `linux`, `darwin`). Rust reports macOS as
/// `macos`, so that one is translated; every other value is passed through.
#[must_use]
pub fn platform_id() -> &'static str {
    platform_id_for(std::env::consts::OS)
}

#[must_use]
pub fn platform_id_for(os: &'static str) -> &'static str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}
