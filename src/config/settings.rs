//! Global application settings
//!
//! Settings load from the config file first, then environment variables
//! override individual fields. Connection profiles are handled separately
//! by the credential store.

use crate::error::{PrismError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upload tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Part size for multipart uploads, in MiB
    pub part_size_mib: u64,
    /// Maximum number of parts in flight per upload task
    pub max_concurrent_parts: usize,
    /// Re-encode raster images to WebP before upload
    pub webp_transform: bool,
    /// WebP quality factor in (0, 1]
    pub webp_quality: f32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_size_mib: 5,
            max_concurrent_parts: 4,
            webp_transform: true,
            webp_quality: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub debug: bool,
    /// Base URL of the session/auth gateway and config endpoint
    pub gateway_url: String,
    /// Directory used when an upload names no destination
    pub default_upload_dir: String,
    /// Page size for remote listing requests
    pub remote_page_size: i32,
    /// Page size for local (already fetched) display pagination
    pub local_page_size: usize,
    pub upload: UploadConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            gateway_url: String::new(),
            default_upload_dir: "drafts".to_string(),
            remote_page_size: 1000,
            local_page_size: 20,
            upload: UploadConfig::default(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.upload.part_size_mib < 5 {
            return Err(PrismError::config(
                "upload.part_size_mib must be at least 5 (store minimum part size)",
            ));
        }
        if self.upload.max_concurrent_parts == 0 {
            return Err(PrismError::config(
                "upload.max_concurrent_parts must be at least 1",
            ));
        }
        if !(self.upload.webp_quality > 0.0 && self.upload.webp_quality <= 1.0) {
            return Err(PrismError::config("upload.webp_quality must be in (0, 1]"));
        }
        if self.remote_page_size <= 0 {
            return Err(PrismError::config("remote_page_size must be positive"));
        }
        if self.local_page_size == 0 {
            return Err(PrismError::config("local_page_size must be at least 1"));
        }
        Ok(())
    }

    /// Directory holding the config file, profile store and user info
    pub fn config_dir() -> Result<PathBuf> {
        // Use XDG Base Directory specification on Linux and macOS
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            use std::env;
            let config_dir = if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
                PathBuf::from(xdg_config_home)
            } else {
                let home_dir = env::var("HOME")
                    .map_err(|_| PrismError::config("HOME environment variable not set"))?;
                PathBuf::from(home_dir).join(".config")
            };
            Ok(config_dir.join("prism"))
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            let config_dir = dirs::config_dir()
                .ok_or_else(|| PrismError::config("Unable to determine config directory"))?;
            Ok(config_dir.join("prism"))
        }
    }

    /// Directory holding per-profile listing caches
    pub fn cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| PrismError::cache("Unable to determine cache directory"))?;
        Ok(cache_dir.join("prism"))
    }

    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("prism.conf"))
    }

    pub async fn load() -> Result<Self> {
        let config = load_settings_no_validation().await?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents =
            toml::to_string_pretty(self).map_err(|e| PrismError::serialization(e.to_string()))?;
        tokio::fs::write(&path, contents).await?;

        Ok(())
    }
}

/// Load settings without validating, so the config command can show a
/// broken file instead of refusing to start
pub async fn load_settings_no_validation() -> Result<Settings> {
    let mut settings = Settings::default();

    let path = Settings::config_file_path()?;
    if path.exists() {
        let contents = tokio::fs::read_to_string(&path).await?;
        settings = toml::from_str::<Settings>(&contents)
            .map_err(|e| PrismError::config(format!("invalid config file: {e}")))?;
    }

    load_from_env(&mut settings);

    Ok(settings)
}

fn load_from_env(settings: &mut Settings) {
    if let Ok(value) = std::env::var("PRISM_DEBUG") {
        settings.debug = value.to_lowercase() == "true" || value == "1";
    }

    if let Ok(value) = std::env::var("PRISM_GATEWAY_URL") {
        settings.gateway_url = value;
    }

    if let Ok(value) = std::env::var("PRISM_DEFAULT_UPLOAD_DIR") {
        settings.default_upload_dir = value;
    }

    if let Ok(value) = std::env::var("PRISM_REMOTE_PAGE_SIZE") {
        if let Ok(size) = value.parse::<i32>() {
            settings.remote_page_size = size;
        }
    }

    if let Ok(value) = std::env::var("PRISM_LOCAL_PAGE_SIZE") {
        if let Ok(size) = value.parse::<usize>() {
            settings.local_page_size = size;
        }
    }

    if let Ok(value) = std::env::var("PRISM_WEBP_TRANSFORM") {
        settings.upload.webp_transform = value.to_lowercase() == "true" || value == "1";
    }

    if let Ok(value) = std::env::var("PRISM_WEBP_QUALITY") {
        if let Ok(quality) = value.parse::<f32>() {
            settings.upload.webp_quality = quality;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_part_size_floor() {
        let mut settings = Settings::default();
        settings.upload.part_size_mib = 4;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_quality_range() {
        let mut settings = Settings::default();
        settings.upload.webp_quality = 0.0;
        assert!(settings.validate().is_err());
        settings.upload.webp_quality = 1.5;
        assert!(settings.validate().is_err());
        settings.upload.webp_quality = 1.0;
        assert!(settings.validate().is_ok());
    }
}
