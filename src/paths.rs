use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::PathBuf;

/// Application paths following OS conventions
#[derive(Clone, Debug)]
pub struct AppPaths {
    /// Configuration directory (thresholds, sample counts)
    pub config: PathBuf,
    /// Data directory (templates, pending recoveries)
    pub data: PathBuf,
    /// Cache directory (logs, temporary scans)
    pub cache: PathBuf,
}

impl AppPaths {
    /// Resolve OS-specific paths for Ridgelock
    ///
    /// Linux: `~/.config/Ridgelock/`, `~/.local/share/Ridgelock/`,
    /// `~/.cache/Ridgelock/`; macOS and Windows follow their platform
    /// conventions via `directories`.
    pub fn new() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("io", "RidgelockLabs", "Ridgelock")
            .context("Failed to determine project directories")?;

        Ok(Self {
            config: proj_dirs.config_dir().to_path_buf(),
            data: proj_dirs.data_dir().to_path_buf(),
            cache: proj_dirs.cache_dir().to_path_buf(),
        })
    }

    /// Create all necessary directories with subdirectories
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.config).context("Failed to create config directory")?;

        fs::create_dir_all(&self.data).context("Failed to create data directory")?;
        fs::create_dir_all(self.templates_dir())
            .context("Failed to create templates directory")?;
        fs::create_dir_all(self.pending_dir()).context("Failed to create pending directory")?;

        fs::create_dir_all(&self.cache).context("Failed to create cache directory")?;

        log::debug!("Application directories initialized");
        log::debug!("  Config: {}", self.config.display());
        log::debug!("  Data:   {}", self.data.display());
        log::debug!("  Cache:  {}", self.cache.display());

        Ok(())
    }

    /// Get path to config file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Get path to the template store directory
    pub fn templates_dir(&self) -> PathBuf {
        self.data.join("templates")
    }

    /// Get path to the directory holding templates that could not be saved
    pub fn pending_dir(&self) -> PathBuf {
        self.data.join("pending")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_creation() {
        let paths = AppPaths::new().expect("Failed to create paths");

        assert!(!paths.config.as_os_str().is_empty());
        assert!(!paths.data.as_os_str().is_empty());
        assert!(!paths.cache.as_os_str().is_empty());
        assert!(paths.templates_dir().starts_with(&paths.data));
    }
}
