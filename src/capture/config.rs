//! Scanner configuration.
//!
//! Loaded from a TOML file; every field has a default so an empty file
//! (or no file at all) yields a working setup against a local service.

use super::{default_profiles, ConstraintProfile};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Largest image accepted on the external submission path.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Upper bound on the device readiness wait, in seconds.
    pub ready_timeout_secs: u64,
    /// JPEG quality factor (1-100).
    pub jpeg_quality: u8,
    /// Negotiation list override; the built-in list is used when absent.
    pub profiles: Option<Vec<ConstraintProfile>>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ready_timeout_secs: 10,
            jpeg_quality: 80, // 0.8 of maximum
            profiles: None,
        }
    }
}

impl CaptureConfig {
    /// Readiness timeout as a duration.
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    /// The negotiation list in effect.
    pub fn profiles(&self) -> Vec<ConstraintProfile> {
        self.profiles.clone().unwrap_or_else(default_profiles)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ready_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ConfigError::InvalidQuality(self.jpeg_quality));
        }
        if matches!(&self.profiles, Some(p) if p.is_empty()) {
            return Err(ConfigError::NoProfiles);
        }
        Ok(())
    }
}

/// Remote identification service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentificationConfig {
    /// Service root, e.g. `http://127.0.0.1:8000`.
    pub base_url: String,
    /// Multipart identification endpoint.
    pub identify_path: String,
    /// Incorrect-match feedback endpoint.
    pub report_path: String,
    /// Health endpoint.
    pub health_path: String,
    /// Cap on externally supplied images, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for IdentificationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            identify_path: "/api/identify_book_file".to_string(),
            report_path: "/api/report_incorrect_match".to_string(),
            health_path: "/api/health".to_string(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl IdentificationConfig {
    /// Joins the base URL and an endpoint path.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidUploadLimit);
        }
        Ok(())
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Captures per scan run (0 runs until interrupted).
    pub captures: u32,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            captures: 1,
            metrics_port: 0,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("readiness timeout must be at least one second")]
    InvalidTimeout,
    #[error("invalid jpeg quality {0} (must be 1-100)")]
    InvalidQuality(u8),
    #[error("profile list must not be empty")]
    NoProfiles,
    #[error("invalid service url: {0}")]
    InvalidBaseUrl(String),
    #[error("upload limit must be positive")]
    InvalidUploadLimit,
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScannerConfig {
    /// `[capture]` section.
    #[serde(default)]
    pub capture: CaptureConfig,
    /// `[identification]` section.
    #[serde(default)]
    pub identification: IdentificationConfig,
    /// `[output]` section.
    #[serde(default)]
    pub output: OutputConfig,
}

impl ScannerConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ScannerConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capture.validate()?;
        self.identification.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FacingMode;

    #[test]
    fn test_default_config_valid() {
        let config = ScannerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capture.ready_timeout(), Duration::from_secs(10));
        assert_eq!(config.capture.jpeg_quality, 80);
        assert_eq!(config.identification.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ScannerConfig::from_toml("").unwrap();
        assert_eq!(config.capture.profiles(), default_profiles());
        assert_eq!(config.output.captures, 1);
    }

    #[test]
    fn test_partial_sections() {
        let config = ScannerConfig::from_toml(
            r#"
            [identification]
            base_url = "https://books.example.org/"

            [capture]
            jpeg_quality = 90

            [[capture.profiles]]
            facing = "environment"

            [[capture.profiles]]
            exact = { width = 640, height = 480 }
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.jpeg_quality, 90);
        assert_eq!(config.capture.ready_timeout_secs, 10);
        let profiles = config.capture.profiles();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].facing, FacingMode::Environment);
        assert_eq!(profiles[1].facing, FacingMode::Unspecified);
        assert_eq!(
            config.identification.url("/api/identify_book_file"),
            "https://books.example.org/api/identify_book_file"
        );
    }

    #[test]
    fn test_invalid_quality() {
        let mut config = CaptureConfig::default();
        config.jpeg_quality = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidQuality(0))
        ));
    }

    #[test]
    fn test_empty_profile_list_rejected() {
        let result = ScannerConfig::from_toml("[capture]\nprofiles = []");
        assert!(matches!(result, Err(ConfigError::NoProfiles)));
    }

    #[test]
    fn test_bad_url_rejected() {
        let result = ScannerConfig::from_toml("[identification]\nbase_url = \"ftp://x\"");
        assert!(matches!(result, Err(ConfigError::InvalidBaseUrl(_))));
    }
}
