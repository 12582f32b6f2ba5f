//! Application configuration
//!
//! One TOML file aggregating the per-component configs, created with
//! defaults on first run.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::biometric::extractor::ExtractorConfig;
use crate::biometric::matcher::MatcherConfig;
use crate::enroll::EnrollmentConfig;
use crate::validation::{self, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub enrollment: EnrollmentConfig,
    pub matcher: MatcherConfig,
    pub extractor: ExtractorConfig,
}

impl AppConfig {
    /// Load config from file or create default
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: AppConfig = toml::from_str(&content)?;
            log::info!("Config loaded from: {}", path.display());
            Ok(config)
        } else {
            let config = Self::default();
            let toml_str = toml::to_string_pretty(&config)?;
            fs::write(path, toml_str)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
            }

            log::info!("Default config created at: {}", path.display());
            Ok(config)
        }
    }

    /// Reject out-of-range settings before any session starts.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_required_samples(self.enrollment.required_samples)?;
        validation::validate_consistency_floor(self.enrollment.consistency_floor)?;
        validation::validate_verify_threshold(self.matcher.verify_threshold)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_load_or_create_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let created = AppConfig::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = AppConfig::load_or_create(&path).unwrap();
        assert_eq!(
            loaded.enrollment.required_samples,
            created.enrollment.required_samples
        );
        assert_eq!(loaded.matcher.verify_threshold, created.matcher.verify_threshold);
    }

    #[test]
    fn test_out_of_range_config_rejected() {
        let mut config = AppConfig::default();
        config.matcher.verify_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.enrollment.required_samples = 1;
        assert!(config.validate().is_err());
    }
}
