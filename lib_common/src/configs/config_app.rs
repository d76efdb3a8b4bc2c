//! # Application Configuration
//!
//! Loads the declarative YAML configuration file driving an extraction run.
//! The file mirrors the sections the pipeline needs: `api` (endpoint and
//! retry behavior), `extraction` (default year range and request batching),
//! `output` (directories and CSV naming), `cache` and `logging`.
//!
//! Every optional key carries a default so a minimal file only has to name
//! the API base URL. Missing file, unparseable YAML or invalid values all
//! surface as a [`ConfigError`] before any network activity starts.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Default location of the configuration file, relative to the working
/// directory. Overridable with the `CAMCOM_CONFIG` environment variable.
pub const CONFIG_DEFAULT_PATH: &str = "config/config.yaml";

/// Environment variable that overrides the configuration file location.
pub const CONFIG_ENV_VAR: &str = "CAMCOM_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse configuration file: {0}")]
    ParseError(String),

    #[error("invalid configuration value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// `api` section: endpoint location and request/retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    /// Absolute base URL of the statistical API.
    pub base_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Total number of attempts against a transiently failing endpoint.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay between retry attempts, in milliseconds. The backoff
    /// grows exponentially from this bound.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// `extraction` section: default period range, request batching and
/// optional overrides for the JSON-stat dimension roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSection {
    #[serde(default = "default_start_year")]
    pub default_start_year: i32,
    /// End year of the default range. `None` means the current year.
    #[serde(default)]
    pub default_end_year: Option<i32>,
    /// Number of years covered by a single API request window.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Name of the time dimension, when the dataset deviates from the
    /// conventional ids.
    #[serde(default)]
    pub time_dimension: Option<String>,
    #[serde(default)]
    pub sector_dimension: Option<String>,
    #[serde(default)]
    pub legal_form_dimension: Option<String>,
}

/// How the CSV writer treats an existing output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    Overwrite,
    Append,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Overwrite => write!(f, "overwrite"),
            WriteMode::Append => write!(f, "append"),
        }
    }
}

/// `output` section: directory layout and CSV naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_csv_directory")]
    pub csv_directory: PathBuf,
    /// Raw API payloads are copied here on every real fetch.
    #[serde(default = "default_raw_directory")]
    pub raw_directory: PathBuf,
    #[serde(default = "default_cache_directory")]
    pub cache_directory: PathBuf,
    /// Output filename pattern. `{provincia}`, `{inizio}` and `{fine}` are
    /// substituted with the request parameters.
    #[serde(default = "default_filename_pattern")]
    pub filename_pattern: String,
    #[serde(default = "default_write_mode")]
    pub write_mode: WriteMode,
}

/// `cache` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Entries older than this are treated as a miss and refetched.
    /// `None` disables expiry; manual deletion is then the only
    /// invalidation.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: None,
        }
    }
}

/// `logging` section. Consumed by the binary when building the tracing
/// subscriber; the library itself only emits events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
    /// Whether the rolling file layer writes JSON records.
    #[serde(default = "default_log_json_file")]
    pub json_file: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_directory(),
            json_file: default_log_json_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiSection,
    pub extraction: ExtractionSection,
    pub output: OutputSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_start_year() -> i32 {
    2012
}
fn default_batch_size() -> u32 {
    10
}
fn default_csv_directory() -> PathBuf {
    PathBuf::from("data/processed")
}
fn default_raw_directory() -> PathBuf {
    PathBuf::from("data/raw")
}
fn default_cache_directory() -> PathBuf {
    PathBuf::from("data/cache")
}
fn default_filename_pattern() -> String {
    "{provincia}_{inizio}_{fine}.csv".to_string()
}
fn default_write_mode() -> WriteMode {
    WriteMode::Overwrite
}
fn default_cache_enabled() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}
fn default_log_json_file() -> bool {
    true
}

impl AppConfig {
    /// Loads and validates the configuration from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)?;
        let config: AppConfig =
            serde_yml::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves the configuration file location: an explicit CLI path wins,
    /// then the `CAMCOM_CONFIG` environment variable, then the default.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return p.to_path_buf();
        }
        match env::var(CONFIG_ENV_VAR) {
            Ok(p) if !p.is_empty() => PathBuf::from(p),
            _ => PathBuf::from(CONFIG_DEFAULT_PATH),
        }
    }

    /// Checks value-level constraints that serde cannot express.
    fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.api.base_url).is_err() {
            return Err(ConfigError::InvalidValue {
                key: "api.base_url".to_string(),
                reason: format!("`{}` is not an absolute URL", self.api.base_url),
            });
        }
        if self.api.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "api.max_retries".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }
        if self.extraction.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "extraction.batch_size".to_string(),
                reason: "batch size must cover at least one year".to_string(),
            });
        }
        if !self.output.filename_pattern.ends_with(".csv") {
            return Err(ConfigError::InvalidValue {
                key: "output.filename_pattern".to_string(),
                reason: "pattern must name a .csv file".to_string(),
            });
        }
        Ok(())
    }

    /// Creates the directory layout the pipeline writes into
    /// (processed CSVs, raw payload copies, cache and logs).
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.output.csv_directory)?;
        fs::create_dir_all(&self.output.raw_directory)?;
        fs::create_dir_all(&self.output.cache_directory)?;
        fs::create_dir_all(&self.logging.directory)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("config.yaml");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "api:\n  base_url: \"https://statistica.example.it/\"\nextraction: {}\noutput: {}\n",
        );
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.api.max_retries, 3);
        assert_eq!(config.extraction.batch_size, 10);
        assert_eq!(config.output.write_mode, WriteMode::Overwrite);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = AppConfig::load(Path::new("does/not/exist.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn missing_required_section_fails_to_parse() {
        let dir = tempfile::tempdir().unwrap();
        // No `api` section at all.
        let path = write_config(dir.path(), "output: {}\nextraction: {}\n");
        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "api:\n  base_url: \"not a url\"\nextraction: {}\noutput: {}\n",
        );
        let err = AppConfig::load(&path).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "api.base_url"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_retries_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "api:\n  base_url: \"https://statistica.example.it/\"\n  max_retries: 0\nextraction: {}\noutput: {}\n",
        );
        assert!(AppConfig::load(&path).is_err());
    }
}
