use std::time::Duration;

use crate::error::UpdateError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the HTTP client shared by the manifest fetch and the download.
///
/// Without `timeout` only the connect phase is bounded, so a stalled
/// transfer waits as long as the server keeps the connection open.
///
/// # Errors
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_client(timeout: Option<Duration>) -> Result<reqwest::Client, UpdateError> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(format!("lomo-update/{}", env!("CARGO_PKG_VERSION")));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|error| UpdateError::transport("failed to build HTTP client", error))
}
