//! INI configuration file.
//!
//! Settings live in `<config dir>/batchcache/config.ini`:
//!
//! ```ini
//! [dataset]
//! name = cdnet
//! root = /data/cdnet
//! results = /data/results
//! kind = video_segmentation
//! skip_tokens = badWeather, PTZ
//! grayscale_tokens = thermal
//! scale_factor = 0.5
//!
//! [precache]
//! buffer_size = 256MB
//! ground_truth = true
//!
//! [logging]
//! level = info
//! file = /tmp/batchcache.log
//! ```
//!
//! A missing file yields defaults. Individual keys can be read and written
//! through [`ConfigKey`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use crate::dataset::{DatasetInfo, DatasetKind};
use crate::error::ErrorCategory;
use crate::logging::{LoggingConfig, DEFAULT_LOG_LEVEL};
use crate::prefetch::{PrefetchConfig, DEFAULT_BUFFER_BUDGET_BYTES};

/// Directory name under the platform config directory.
pub const CONFIG_DIR_NAME: &str = "batchcache";

/// File name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value '{value}' for {section}.{key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid size '{value}': {reason}")]
    InvalidSize { value: String, reason: String },

    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),
}

impl ConfigError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Path of the configuration file in the platform config directory.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

// =============================================================================
// Sizes
// =============================================================================

/// Parse a human-readable size such as `512`, `64KB`, `256MB` or `1.5GB`.
///
/// Units are binary (1 KB = 1024 bytes) and case-insensitive.
pub fn parse_size(input: &str) -> Result<usize, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidSize {
        value: input.to_string(),
        reason,
    };
    let s = input.trim().to_ascii_uppercase();
    if s.is_empty() {
        return Err(invalid("empty size".to_string()));
    }
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let multiplier: u64 = match unit.trim() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1 << 10,
        "M" | "MB" | "MIB" => 1 << 20,
        "G" | "GB" | "GIB" => 1 << 30,
        other => return Err(invalid(format!("unknown unit '{}'", other))),
    };
    let value: f64 = number
        .parse()
        .map_err(|_| invalid(format!("'{}' is not a number", number)))?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(format!("'{}' is not a valid size", number)));
    }
    Ok((value * multiplier as f64).round() as usize)
}

/// Format a byte count for display, e.g. `256.0 MB`.
pub fn format_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if b >= GB {
        format!("{:.1} GB", b / GB)
    } else if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

// =============================================================================
// Sections
// =============================================================================

/// `[dataset]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSettings {
    pub name: String,
    pub root: Option<PathBuf>,
    pub results: Option<PathBuf>,
    pub results_prefix: String,
    pub results_suffix: String,
    pub kind: DatasetKind,
    pub skip_tokens: Vec<String>,
    pub grayscale_tokens: Vec<String>,
    pub scale_factor: f64,
    pub save_results: bool,
    pub four_byte_aligned: bool,
    pub output_index_offset: usize,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        let info = DatasetInfo::default();
        Self {
            name: info.name,
            root: None,
            results: None,
            results_prefix: info.results_prefix,
            results_suffix: info.results_suffix,
            kind: info.kind,
            skip_tokens: Vec::new(),
            grayscale_tokens: Vec::new(),
            scale_factor: info.scale_factor,
            save_results: info.save_results,
            four_byte_aligned: info.four_byte_aligned,
            output_index_offset: info.output_index_offset,
        }
    }
}

/// `[precache]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecacheSettings {
    pub buffer_size: usize,
    pub ground_truth: bool,
}

impl Default for PrecacheSettings {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_BUDGET_BYTES,
            ground_truth: false,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub dataset: DatasetSettings,
    pub precache: PrecacheSettings,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Load from the default location; defaults if the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`; defaults if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config = Self::default();
        for key in ConfigKey::all() {
            if let Some(value) = ini
                .section(Some(key.section()))
                .and_then(|s| s.get(key.key_name()))
            {
                key.set(&mut config, value)?;
            }
        }
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories. Unset values are omitted.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini.write_to_file(path).map_err(write_err)
    }

    /// Dataset metadata with `root` overriding the configured root.
    pub fn dataset_info(&self, root: Option<&Path>) -> DatasetInfo {
        let d = &self.dataset;
        let root = root
            .map(Path::to_path_buf)
            .or_else(|| d.root.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        let results_root = d.results.clone().unwrap_or_else(|| root.join("results"));
        DatasetInfo {
            name: d.name.clone(),
            kind: d.kind,
            root,
            results_root,
            results_prefix: d.results_prefix.clone(),
            results_suffix: d.results_suffix.clone(),
            skip_tokens: d.skip_tokens.clone(),
            grayscale_tokens: d.grayscale_tokens.clone(),
            output_index_offset: d.output_index_offset,
            scale_factor: d.scale_factor,
            save_results: d.save_results,
            four_byte_aligned: d.four_byte_aligned,
        }
    }

    pub fn prefetch_config(&self) -> PrefetchConfig {
        PrefetchConfig::new()
            .with_buffer_budget(self.precache.buffer_size)
            .with_ground_truth(self.precache.ground_truth)
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.logging.level.clone(),
            file: self.logging.file.clone(),
            ..Default::default()
        }
    }
}

// =============================================================================
// Keys
// =============================================================================

/// One `section.key` entry of the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    DatasetName,
    DatasetRoot,
    DatasetResults,
    DatasetResultsPrefix,
    DatasetResultsSuffix,
    DatasetKind,
    DatasetSkipTokens,
    DatasetGrayscaleTokens,
    DatasetScaleFactor,
    DatasetSaveResults,
    DatasetFourByteAligned,
    DatasetOutputIndexOffset,
    PrecacheBufferSize,
    PrecacheGroundTruth,
    LoggingLevel,
    LoggingFile,
}

impl ConfigKey {
    /// Every key, grouped by section.
    pub fn all() -> &'static [ConfigKey] {
        use ConfigKey::*;
        &[
            DatasetName,
            DatasetRoot,
            DatasetResults,
            DatasetResultsPrefix,
            DatasetResultsSuffix,
            DatasetKind,
            DatasetSkipTokens,
            DatasetGrayscaleTokens,
            DatasetScaleFactor,
            DatasetSaveResults,
            DatasetFourByteAligned,
            DatasetOutputIndexOffset,
            PrecacheBufferSize,
            PrecacheGroundTruth,
            LoggingLevel,
            LoggingFile,
        ]
    }

    pub fn section(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            PrecacheBufferSize | PrecacheGroundTruth => "precache",
            LoggingLevel | LoggingFile => "logging",
            _ => "dataset",
        }
    }

    pub fn key_name(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            DatasetName => "name",
            DatasetRoot => "root",
            DatasetResults => "results",
            DatasetResultsPrefix => "results_prefix",
            DatasetResultsSuffix => "results_suffix",
            DatasetKind => "kind",
            DatasetSkipTokens => "skip_tokens",
            DatasetGrayscaleTokens => "grayscale_tokens",
            DatasetScaleFactor => "scale_factor",
            DatasetSaveResults => "save_results",
            DatasetFourByteAligned => "four_byte_aligned",
            DatasetOutputIndexOffset => "output_index_offset",
            PrecacheBufferSize => "buffer_size",
            PrecacheGroundTruth => "ground_truth",
            LoggingLevel => "level",
            LoggingFile => "file",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as written to the file; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        use ConfigKey::*;
        let d = &config.dataset;
        let path = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };
        match self {
            DatasetName => d.name.clone(),
            DatasetRoot => path(&d.root),
            DatasetResults => path(&d.results),
            DatasetResultsPrefix => d.results_prefix.clone(),
            DatasetResultsSuffix => d.results_suffix.clone(),
            DatasetKind => d.kind.to_string(),
            DatasetSkipTokens => d.skip_tokens.join(", "),
            DatasetGrayscaleTokens => d.grayscale_tokens.join(", "),
            DatasetScaleFactor => d.scale_factor.to_string(),
            DatasetSaveResults => d.save_results.to_string(),
            DatasetFourByteAligned => d.four_byte_aligned.to_string(),
            DatasetOutputIndexOffset => d.output_index_offset.to_string(),
            PrecacheBufferSize => format_size_exact(config.precache.buffer_size),
            PrecacheGroundTruth => config.precache.ground_truth.to_string(),
            LoggingLevel => config.logging.level.clone(),
            LoggingFile => path(&config.logging.file),
        }
    }

    /// Parse `value` and store it in `config`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        use ConfigKey::*;
        let value = value.trim();
        let invalid = |reason: String| ConfigError::InvalidValue {
            section: self.section().to_string(),
            key: self.key_name().to_string(),
            value: value.to_string(),
            reason,
        };
        let optional_path = |v: &str| (!v.is_empty()).then(|| PathBuf::from(v));
        let d = &mut config.dataset;
        match self {
            DatasetName => d.name = value.to_string(),
            DatasetRoot => d.root = optional_path(value),
            DatasetResults => d.results = optional_path(value),
            DatasetResultsPrefix => d.results_prefix = value.to_string(),
            DatasetResultsSuffix => d.results_suffix = value.to_string(),
            DatasetKind => {
                d.kind = value
                    .parse::<crate::dataset::DatasetKind>()
                    .map_err(|e| invalid(e.to_string()))?
            }
            DatasetSkipTokens => d.skip_tokens = parse_list(value),
            DatasetGrayscaleTokens => d.grayscale_tokens = parse_list(value),
            DatasetScaleFactor => {
                let factor: f64 = value.parse().map_err(|_| invalid("not a number".into()))?;
                if !(factor.is_finite() && factor > 0.0) {
                    return Err(invalid("must be positive".into()));
                }
                d.scale_factor = factor;
            }
            DatasetSaveResults => d.save_results = parse_bool(value).map_err(invalid)?,
            DatasetFourByteAligned => d.four_byte_aligned = parse_bool(value).map_err(invalid)?,
            DatasetOutputIndexOffset => {
                d.output_index_offset = value
                    .parse()
                    .map_err(|_| invalid("not a non-negative integer".into()))?
            }
            PrecacheBufferSize => {
                config.precache.buffer_size = parse_size(value).map_err(|e| match e {
                    ConfigError::InvalidSize { reason, .. } => invalid(reason),
                    other => other,
                })?
            }
            PrecacheGroundTruth => {
                config.precache.ground_truth = parse_bool(value).map_err(invalid)?
            }
            LoggingLevel => config.logging.level = value.to_string(),
            LoggingFile => config.logging.file = optional_path(value),
        }
        Ok(())
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err("expected true or false".to_string()),
    }
}

/// Largest whole unit that represents `bytes` exactly, so it parses back.
fn format_size_exact(bytes: usize) -> String {
    const UNITS: [(usize, &str); 3] = [(1 << 30, "GB"), (1 << 20, "MB"), (1 << 10, "KB")];
    for (size, unit) in UNITS {
        if bytes >= size && bytes % size == 0 {
            return format!("{}{}", bytes / size, unit);
        }
    }
    bytes.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("64KB").unwrap(), 64 * 1024);
        assert_eq!(parse_size("256mb").unwrap(), 256 * 1024 * 1024);
        assert_eq!(parse_size("1.5 GB").unwrap(), 1536 * 1024 * 1024);
        assert_eq!(parse_size("10M").unwrap(), 10 * 1024 * 1024);
        assert!(parse_size("").is_err());
        assert!(parse_size("12XB").is_err());
        assert!(parse_size("MB").is_err());
    }

    #[test]
    fn test_parse_size_error_names_input() {
        let err = parse_size("12XB").unwrap_err();
        assert!(matches!(
            &err,
            ConfigError::InvalidSize { value, .. } if value == "12XB"
        ));
        assert_eq!(err.to_string(), "Invalid size '12XB': unknown unit 'XB'");
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let mut config = ConfigFile::default();
        let err = ConfigKey::PrecacheBufferSize
            .set(&mut config, "lots")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref section, ref key, .. }
                if section == "precache" && key == "buffer_size"
        ));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(256 * 1024 * 1024), "256.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_format_size_exact() {
        assert_eq!(format_size_exact(DEFAULT_BUFFER_BUDGET_BYTES), "256MB");
        assert_eq!(format_size_exact(1536), "1536");
        assert_eq!(format_size_exact(0), "0");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_load_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(
            &path,
            "[dataset]\n\
             name = cdnet\n\
             root = /data/cdnet\n\
             kind = image_segmentation\n\
             skip_tokens = badWeather, PTZ\n\
             grayscale_tokens = thermal\n\
             scale_factor = 0.5\n\
             \n\
             [precache]\n\
             buffer_size = 64MB\n\
             ground_truth = yes\n\
             \n\
             [logging]\n\
             level = debug\n",
        )
        .unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.dataset.name, "cdnet");
        assert_eq!(config.dataset.kind, DatasetKind::ImageSegmentation);
        assert_eq!(config.dataset.skip_tokens, vec!["badWeather", "PTZ"]);
        assert_eq!(config.dataset.scale_factor, 0.5);
        assert_eq!(config.precache.buffer_size, 64 * 1024 * 1024);
        assert!(config.precache.ground_truth);
        assert_eq!(config.logging.level, "debug");

        let info = config.dataset_info(None);
        assert_eq!(info.root, PathBuf::from("/data/cdnet"));
        assert_eq!(info.results_root, PathBuf::from("/data/cdnet/results"));
        assert!(info.is_grayscale("thermal/park"));

        let prefetch = config.prefetch_config();
        assert_eq!(prefetch.buffer_budget_bytes, 64 * 1024 * 1024);
        assert!(prefetch.ground_truth);
        assert_eq!(config.logging_config().level, "debug");
    }

    #[test]
    fn test_invalid_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[precache]\nbuffer_size = lots\n").unwrap();

        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "buffer_size"
        ));
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        ConfigKey::DatasetRoot.set(&mut config, "/data/sets").unwrap();
        ConfigKey::PrecacheBufferSize.set(&mut config, "32MB").unwrap();
        ConfigKey::DatasetGrayscaleTokens
            .set(&mut config, "thermal, IR")
            .unwrap();
        config.save_to(&path).unwrap();

        let reloaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_key_parsing() {
        let key: ConfigKey = "precache.buffer_size".parse().unwrap();
        assert_eq!(key, ConfigKey::PrecacheBufferSize);
        assert_eq!(key.to_string(), "precache.buffer_size");
        assert!("precache.nothing".parse::<ConfigKey>().is_err());
        assert!(ConfigKey::all()
            .iter()
            .all(|k| k.name().parse::<ConfigKey>().unwrap() == *k));
    }

    #[test]
    fn test_root_override() {
        let config = ConfigFile::default();
        let info = config.dataset_info(Some(Path::new("/override")));
        assert_eq!(info.root, PathBuf::from("/override"));
    }
}
