use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories_next::ProjectDirs;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::NoiseClient;

const INDEX_FILE: &str = "index.json";

/// On-disk cache for remote noise images.
///
/// Files live flat inside the cache root under a name derived from the URL;
/// `index.json` maps each full URL to its file so distinct URLs that sanitize
/// to the same stem never collide.
#[derive(Debug, Clone)]
pub struct NoiseCache {
    root: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheIndex {
    entries: BTreeMap<String, String>,
}

impl NoiseCache {
    /// Opens the per-user cache under the platform cache directory.
    pub fn discover() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "flamewall")
            .context("unable to determine platform cache directory")?;
        Ok(Self::at(dirs.cache_dir().join("noise")))
    }

    /// Opens a cache rooted at an explicit directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the cached path for `url`, downloading it when missing or when
    /// `refresh` forces a re-fetch. Without a client only cache hits succeed.
    pub fn fetch(&self, url: &str, client: Option<&NoiseClient>, refresh: bool) -> Result<PathBuf> {
        let mut index = self.load_index()?;

        if !refresh {
            if let Some(existing) = index.entries.get(url) {
                let path = self.root.join(existing);
                if path.is_file() {
                    debug!(%url, path = %path.display(), "noise cache hit");
                    return Ok(path);
                }
            }
        }

        let Some(client) = client else {
            anyhow::bail!("noise image for {url} is not cached and remote fetch is disabled");
        };

        let parsed = Url::parse(url).with_context(|| format!("invalid noise url '{url}'"))?;
        let file_name = self.assign_file_name(&index, &parsed);
        let destination = self.root.join(&file_name);
        client.download(&parsed, &destination)?;

        index.entries.insert(url.to_string(), file_name);
        self.store_index(&index)?;
        info!(%url, path = %destination.display(), "cached noise image");
        Ok(destination)
    }

    fn load_index(&self) -> Result<CacheIndex> {
        let path = self.root.join(INDEX_FILE);
        if !path.is_file() {
            return Ok(CacheIndex::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading noise cache index at {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing noise cache index at {}", path.display()))
    }

    fn store_index(&self, index: &CacheIndex) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.root.join(INDEX_FILE);
        let raw = serde_json::to_string_pretty(index)?;
        fs::write(&path, raw)
            .with_context(|| format!("writing noise cache index at {}", path.display()))
    }

    /// Picks an unused file name based on the URL's final path segment.
    fn assign_file_name(&self, index: &CacheIndex, url: &Url) -> String {
        let segment = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .unwrap_or("noise");
        let sanitized = sanitize_file_name(segment);

        let taken: std::collections::BTreeSet<&str> =
            index.entries.values().map(String::as_str).collect();
        if !taken.contains(sanitized.as_str()) {
            return sanitized;
        }

        let (stem, ext) = match sanitized.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{ext}")),
            _ => (sanitized.clone(), String::new()),
        };
        let mut counter = 1;
        loop {
            let candidate = format!("{stem}-{counter}{ext}");
            if !taken.contains(candidate.as_str()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

fn sanitize_file_name(segment: &str) -> String {
    let mut out: String = segment
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '-'
            }
        })
        .collect();
    out.truncate(96);
    if out.trim_matches(['.', '-']).is_empty() {
        out = "noise".to_string();
    }
    out
}
