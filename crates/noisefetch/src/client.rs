use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::Url;
use tracing::debug;

/// Blocking HTTP client for fetching noise images.
#[derive(Debug, Clone)]
pub struct NoiseClient {
    http: Client,
}

impl NoiseClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("failed to construct HTTP client")?;
        Ok(Self { http })
    }

    /// Downloads `url` into `destination`, creating parent directories.
    pub fn download(&self, url: &Url, destination: &Path) -> Result<()> {
        debug!(%url, path = %destination.display(), "downloading noise image");
        let response = self
            .http
            .get(url.clone())
            .send()
            .with_context(|| format!("requesting {url}"))?
            .error_for_status()
            .context("noise image request failed")?;
        let bytes = response.bytes()?;
        if bytes.is_empty() {
            anyhow::bail!("noise image at {url} is empty");
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(destination, &bytes)
            .with_context(|| format!("writing noise image to {}", destination.display()))?;
        Ok(())
    }
}
