//! Application configuration
//!
//! Settings are read from `config.json` in the platform config directory
//! (or an explicit path). Every field is optional in the file; missing
//! fields and a missing file fall back to the defaults.

use crate::xml_api::DEFAULT_ENDPOINT;
use crate::{CrError, ErrorStage};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Deadline used when the configured one is missing or zero
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Settings shared by the CLI and library consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// XML API endpoint requests are posted to
    pub endpoint: String,
    /// Deadline for one XML API call, in seconds, 0 means the default
    pub request_timeout_secs: u64,
    /// Directory holding the per-episode temporary files
    pub temp_dir: PathBuf,
    /// Directory the finished containers are written to
    pub output_dir: PathBuf,
    /// Explicit ffmpeg binary
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit mkvmerge binary, otherwise looked up in PATH
    pub mkvmerge_path: Option<PathBuf>,
    /// How long subtitle descriptors stay cached, 0 disables the cache
    pub subtitle_cache_ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            temp_dir: PathBuf::from("temp"),
            output_dir: PathBuf::from("."),
            ffmpeg_path: None,
            mkvmerge_path: None,
            subtitle_cache_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl AppConfig {
    /// Loads the configuration from the platform config directory
    pub fn load_default() -> Result<Self, CrError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Loads the configuration from `path`, defaults if the file is missing
    pub fn load_from(path: &Path) -> Result<Self, CrError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path).map_err(|e| CrError::new(ErrorStage::Config, e))?;
        serde_json::from_str(&data).map_err(|e| CrError::new(ErrorStage::Config, e))
    }

    /// `<config dir>/config.json`, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "crunchyroll-dl", "crunchyroll_dl")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Deadline for one XML API call
    ///
    /// Zero is read as [`DEFAULT_REQUEST_TIMEOUT_SECS`].
    pub fn request_timeout(&self) -> Duration {
        match self.request_timeout_secs {
            0 => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    /// Cache lifetime for subtitle descriptors, `None` when caching is off
    pub fn subtitle_cache_ttl(&self) -> Option<Duration> {
        (self.subtitle_cache_ttl_secs > 0).then(|| Duration::from_secs(self.subtitle_cache_ttl_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/crunchyroll_dl/config.json")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.endpoint, "http://www.crunchyroll.com/xml/");
        assert_eq!(config.temp_dir, PathBuf::from("temp"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = std::env::temp_dir().join(format!("crunchyroll_dl_config_{}", ulid::Ulid::new()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(&path, r#"{ "request_timeout_secs": 5, "subtitle_cache_ttl_secs": 0 }"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();

        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.subtitle_cache_ttl(), None);
        assert_eq!(config.output_dir, PathBuf::from("."));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let config = AppConfig {
            request_timeout_secs: 0,
            ..AppConfig::default()
        };

        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(!config.request_timeout().is_zero());
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = std::env::temp_dir().join(format!("crunchyroll_dl_config_{}", ulid::Ulid::new()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(&path, "endpoint = 'toml'").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert_eq!(err.stage(), ErrorStage::Config);

        fs::remove_dir_all(&dir).unwrap();
    }
}
