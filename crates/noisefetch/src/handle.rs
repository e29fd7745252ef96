use std::path::PathBuf;

use reqwest::Url;

use crate::path::PathResolver;

#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    #[error("noise handle must not be empty")]
    Empty,
    #[error("invalid noise url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported url scheme '{0}'; expected http or https")]
    UnsupportedScheme(String),
    #[error("failed to resolve local noise path '{input}': {reason}")]
    InvalidPath { input: String, reason: String },
}

/// Where the noise image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoiseHandle {
    /// Image fetched over http(s) and cached locally.
    Remote(Url),
    /// Image read straight from disk.
    Local(PathBuf),
}

/// Classifies a user-supplied handle as remote URL or local path.
///
/// Anything with an explicit scheme separator is treated as a URL so that a
/// Windows-style `C:` prefix cannot be mistaken for one; everything else goes
/// through the resolver's `~`/`$VAR` expansion.
pub fn parse_noise_handle(resolver: &PathResolver, input: &str) -> Result<NoiseHandle, HandleError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(HandleError::Empty);
    }

    if trimmed.contains("://") {
        let url = Url::parse(trimmed).map_err(|err| HandleError::InvalidUrl {
            url: trimmed.to_string(),
            reason: err.to_string(),
        })?;
        return match url.scheme() {
            "http" | "https" => Ok(NoiseHandle::Remote(url)),
            other => Err(HandleError::UnsupportedScheme(other.to_string())),
        };
    }

    let path = resolver
        .normalize_local_path(trimmed)
        .map_err(|err| HandleError::InvalidPath {
            input: trimmed.to_string(),
            reason: err.to_string(),
        })?;
    Ok(NoiseHandle::Local(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_remote_urls() {
        let resolver = PathResolver::with_cwd("/");
        let handle = parse_noise_handle(&resolver, "https://example.com/perlin.png").unwrap();
        assert!(matches!(handle, NoiseHandle::Remote(_)));
    }

    #[test]
    fn rejects_non_http_schemes() {
        let resolver = PathResolver::with_cwd("/");
        let err = parse_noise_handle(&resolver, "ftp://example.com/perlin.png").unwrap_err();
        assert!(matches!(err, HandleError::UnsupportedScheme(_)));
    }

    #[test]
    fn rejects_empty_handles() {
        let resolver = PathResolver::with_cwd("/");
        assert!(matches!(
            parse_noise_handle(&resolver, "  "),
            Err(HandleError::Empty)
        ));
    }

    #[test]
    fn treats_plain_paths_as_local() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("noise.png");
        std::fs::write(&file, b"png").unwrap();

        let resolver = PathResolver::with_cwd(temp.path());
        let handle = parse_noise_handle(&resolver, "noise.png").unwrap();
        assert_eq!(handle, NoiseHandle::Local(file));
    }
}
