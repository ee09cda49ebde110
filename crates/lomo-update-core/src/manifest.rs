use std::collections::HashMap;

use serde::Deserialize;

use crate::error::UpdateError;

/// Release metadata for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlatformRelease {
    #[serde(rename = "URL", alias = "url")]
    pub url: String,
    #[serde(rename = "SHA256", alias = "sha256")]
    pub sha256: String,
    #[serde(rename = "Version", alias = "version")]
    pub version: String,
    /// Carried for forward compatibility; never executed.
    #[serde(rename = "PreCmds", alias = "preCmds", default)]
    pub pre_cmds: Vec<String>,
    /// Carried for forward compatibility; never executed.
    #[serde(rename = "PostCmds", alias = "postCmds", default)]
    pub post_cmds: Vec<String>,
}

/// Platform identifier to release, as published at the manifest URL.
pub type ReleaseManifest = HashMap<String, PlatformRelease>;

/// Fetch the manifest at `url` and select the release for `platform`.
///
/// # Errors
/// Returns an error if the request fails or returns a non-success status,
/// the body is not a valid manifest, or it has no entry for `platform`.
pub async fn fetch_manifest(
    client: &reqwest::Client,
    url: &str,
    platform: &str,
) -> Result<PlatformRelease, UpdateError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|error| UpdateError::transport("failed to fetch release manifest", error))?;

    if !response.status().is_success() {
        return Err(UpdateError::HttpStatus {
            url: url.to_string(),
            status: response.status(),
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|error| UpdateError::transport("failed to read release manifest", error))?;

    select_release(parse_manifest(&body)?, platform)
}

/// # Errors
/// Returns [`UpdateError::ManifestParse`] when `body` is not a JSON object of
/// platform releases.
pub fn parse_manifest(body: &[u8]) -> Result<ReleaseManifest, UpdateError> {
    serde_json::from_slice(body).map_err(UpdateError::ManifestParse)
}

fn select_release(
    mut manifest: ReleaseManifest,
    platform: &str,
) -> Result<PlatformRelease, UpdateError> {
    manifest
        .remove(platform)
        .ok_or_else(|| UpdateError::UnsupportedPlatform {
            platform: platform.to_string(),
        })
}
