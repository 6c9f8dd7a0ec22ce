/// Configuration for import, export and build submission
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::archive::ZipLimits;
use crate::assemble::icons::DRIVE_DOWNLOAD_URL;
use crate::build_service::RetryPolicy;
use crate::validator::ValidationLimits;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LimitOptions {
    /// Upload size cap for full imports
    pub max_upload_bytes: u64,
    /// Upload size cap for quick-reference imports
    pub quick_reference_max_bytes: u64,
    /// Smallest upload a quick-reference import accepts
    pub quick_reference_min_bytes: u64,
    /// Uncompressed ZIP size cap
    pub max_extracted_bytes: u64,
    pub import_timeout_secs: u64,
    pub export_timeout_secs: u64,
}

impl Default for LimitOptions {
    fn default() -> Self {
        Self {
            max_upload_bytes: 50 * MIB,
            quick_reference_max_bytes: 5 * MIB,
            quick_reference_min_bytes: 100,
            max_extracted_bytes: 200 * MIB,
            import_timeout_secs: 60,
            export_timeout_secs: 300,
        }
    }
}

impl LimitOptions {
    pub fn zip_limits(&self) -> ZipLimits {
        ZipLimits {
            max_total_bytes: self.max_extracted_bytes,
        }
    }

    pub fn import_timeout(&self) -> Duration {
        Duration::from_secs(self.import_timeout_secs)
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.export_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildServiceOptions {
    pub endpoint: String,
    /// Timeout of one HTTP attempt
    pub request_timeout_secs: u64,
    /// Budget for the whole submission including retries
    pub overall_timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BuildServiceOptions {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/v2".to_string(),
            request_timeout_secs: 120,
            overall_timeout_secs: 300,
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl BuildServiceOptions {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.max_retries,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IconOptions {
    pub fetch_timeout_secs: u64,
    pub max_icon_bytes: usize,
    /// Drive file ids are appended to this address
    pub drive_download_base: String,
}

impl Default for IconOptions {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 20,
            max_icon_bytes: 1024 * 1024,
            drive_download_base: DRIVE_DOWNLOAD_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InterchangeConfig {
    pub limits: LimitOptions,
    pub validator: ValidationLimits,
    pub build_service: BuildServiceOptions,
    pub icons: IconOptions,
}

impl InterchangeConfig {
    /// Load from a YAML or JSON file. `.json` files are parsed as JSON,
    /// everything else as YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        if is_json(path) {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(serde_yaml::from_str(&content)?)
        }
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// The file at `path`, else the default location, else built-in
    /// defaults. An explicit path that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => {
                log::debug!("loading config from {}", path.display());
                Self::from_file(path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// `<config dir>/comapeo-config/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("comapeo-config").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InterchangeConfig::default();
        assert_eq!(config.limits.max_upload_bytes, 50 * MIB);
        assert_eq!(config.limits.quick_reference_min_bytes, 100);
        assert_eq!(config.validator.max_entities, 10_000);
        assert_eq!(config.build_service.retry_policy().max_retries, 3);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "buildService:\n  endpoint: https://builder.example.org/v2\nlimits:\n  importTimeoutSecs: 5\n",
        )
        .unwrap();

        let config = InterchangeConfig::from_file(&path).unwrap();
        assert_eq!(config.build_service.endpoint, "https://builder.example.org/v2");
        assert_eq!(config.build_service.max_retries, 3);
        assert_eq!(config.limits.import_timeout(), Duration::from_secs(5));
        assert_eq!(config.icons, IconOptions::default());
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = InterchangeConfig::default();
        config.icons.max_icon_bytes = 4096;
        config.to_file(&path).unwrap();

        assert_eq!(InterchangeConfig::from_file(&path).unwrap(), config);
        assert_eq!(InterchangeConfig::from_json(&config.to_json().unwrap()).unwrap(), config);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(InterchangeConfig::load(Some(&dir.path().join("absent.yaml"))).is_err());
    }
}
