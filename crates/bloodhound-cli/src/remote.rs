//! Remote resources: service-definition downloads and the release feed
//!
//! Both are plain blocking GETs with a bounded timeout. Downloads land in a
//! temporary file beside the destination and are renamed into place only
//! after the whole body arrived, so a failed download never clobbers a
//! working file.

use anyhow::{bail, Context, Result};
use bloodhound_core::Colors;
use chrono::DateTime;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Latest published release of this CLI
pub const RELEASES_URL: &str = "https://api.github.com/repos/SpecterOps/bloodhound-cli/releases/latest";

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("bloodhound-cli/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Malformed release metadata: {0}")]
    MalformedRelease(String),
}

/// Downloads a URL into a file
pub trait Fetch {
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// HTTP client shared by downloads and the release check
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build the HTTP client")?;
        Ok(Self::with_client(client))
    }

    fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Query the release feed at `url`
    pub fn latest_release(&self, url: &str) -> Result<RemoteRelease> {
        let response = self.get(url)?;
        let body = response.text().map_err(|source| RemoteError::Request {
            url: url.to_string(),
            source,
        })?;
        parse_release(&body)
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|source| RemoteError::Request {
                url: url.to_string(),
                source,
            })?;

        if response.status() != StatusCode::OK {
            bail!(RemoteError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

impl Fetch for HttpFetcher {
    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let mut response = self.get(url)?;

        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create a temporary file in {}", dir.display()))?;

        response
            .copy_to(&mut staged)
            .map_err(|source| RemoteError::Request {
                url: url.to_string(),
                source,
            })?;
        staged.as_file().sync_all()?;

        staged
            .persist(dest)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        debug!(url, dest = %dest.display(), "download complete");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ReleaseMetadata {
    published_at: String,
    tag_name: String,
    html_url: String,
}

/// The newest published release, ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRelease {
    /// e.g. `BloodHound CLI v0.1.4 (07 March 2025)`
    pub label: String,
    /// Release page
    pub url: String,
}

/// Parse the release feed body
pub fn parse_release(body: &str) -> Result<RemoteRelease> {
    let metadata: ReleaseMetadata = serde_json::from_str(body)
        .map_err(|e| RemoteError::MalformedRelease(e.to_string()))?;

    let label = match DateTime::parse_from_rfc3339(&metadata.published_at) {
        Ok(date) => format!(
            "BloodHound CLI {} ({})",
            metadata.tag_name,
            date.format("%d %B %Y")
        ),
        Err(_) => format!("BloodHound CLI (published at: {})", metadata.published_at),
    };

    Ok(RemoteRelease {
        label,
        url: metadata.html_url,
    })
}

/// Write the local build and the latest published release side by side
///
/// When the release feed cannot be read only the local line is written and
/// the error is returned.
pub fn write_version_report<W: Write>(
    fetcher: &HttpFetcher,
    url: &str,
    local: &str,
    colors: &Colors,
    out: &mut W,
) -> Result<()> {
    let release = match fetcher.latest_release(url) {
        Ok(release) => release,
        Err(e) => {
            writeln!(out, "{}", local)?;
            return Err(e).context("Could not check the latest release");
        }
    };

    writeln!(out, "{:<8} {}", "Local", local)?;
    writeln!(out, "{:<8} {}", "Latest", release.label)?;
    writeln!(out, "{:<8} {}{}{}", "", colors.dim, release.url, colors.reset)?;
    Ok(())
}
