//! Noise-texture acquisition for the flame renderer.
//!
//! The renderer needs exactly one asset: a tileable noise image. Users hand us
//! a *handle*, either a local path (with `~` and `$VAR` expansion) or an
//! http(s) URL. Remote images are downloaded once with a blocking client and
//! kept in a content cache under the user cache directory, so subsequent runs
//! work offline. `resolve_noise_image` is the single entry point; it returns a
//! path that is guaranteed to exist, which is what lets the renderer gate its
//! first frame on a fully materialised texture.

mod cache;
mod client;
mod handle;
mod path;

pub use cache::NoiseCache;
pub use client::NoiseClient;
pub use handle::{parse_noise_handle, HandleError, NoiseHandle};
pub use path::PathResolver;

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Resolves a noise handle to an on-disk image path.
///
/// Local handles are validated for existence. Remote handles are served from
/// the cache when possible; a fetch happens only when the image is missing or
/// `refresh` is set, and requires a client (callers running `--cache-only`
/// pass `None`).
pub fn resolve_noise_image(
    handle: &NoiseHandle,
    cache: &NoiseCache,
    client: Option<&NoiseClient>,
    refresh: bool,
) -> Result<PathBuf> {
    match handle {
        NoiseHandle::Local(path) => {
            if !path.is_file() {
                anyhow::bail!("noise image not found at {}", path.display());
            }
            Ok(path.clone())
        }
        NoiseHandle::Remote(url) => cache
            .fetch(url.as_str(), client, refresh)
            .with_context(|| format!("failed to resolve remote noise image {url}")),
    }
}
