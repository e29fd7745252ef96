use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories_next::ProjectDirs;

const CONFIG_FILE: &str = "flamewall.toml";

/// Resolved per-user directories for configuration and cached noise images.
#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
    cache_dir: PathBuf,
}

impl AppPaths {
    /// Discovers the platform directories for this application.
    pub fn discover() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "flamewall")
            .context("unable to determine platform config/cache directories")?;
        Ok(Self {
            config_dir: dirs.config_dir().to_path_buf(),
            cache_dir: dirs.cache_dir().to_path_buf(),
        })
    }

    /// Builds paths from explicit roots; used by tests.
    pub fn with_roots(config_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            cache_dir: cache_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Default location of the TOML configuration file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Cache directory for downloaded noise images.
    pub fn noise_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("noise")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_hang_off_the_roots() {
        let paths = AppPaths::with_roots("/tmp/cfg", "/tmp/cache");
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/cfg/flamewall.toml"));
        assert_eq!(paths.noise_cache_dir(), PathBuf::from("/tmp/cache/noise"));
    }
}
