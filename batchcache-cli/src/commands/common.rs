//! Common types and utilities shared across CLI commands.

use std::path::{Path, PathBuf};
use std::time::Duration;

use batchcache::config::{config_file_path, ConfigFile};
use batchcache::dataset::{Dataset, DatasetInfo};

use crate::error::CliError;
use crate::scan::scan_dataset;

/// Configuration resolved from the config file and global flags.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: ConfigFile,
    pub config_path: PathBuf,
    pub info: DatasetInfo,
}

impl CommandContext {
    /// Load the configuration file (`--config` or the default location) and
    /// apply the `--root` override.
    pub fn load(config_path: Option<&Path>, root: Option<&Path>) -> Result<Self, CliError> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(config_file_path);
        let config = ConfigFile::load_from(&config_path)?;
        let info = config.dataset_info(root);
        Ok(Self {
            config,
            config_path,
            info,
        })
    }

    /// Scan the dataset root into a batch tree.
    pub fn dataset(&self) -> Result<Dataset, CliError> {
        let batches = scan_dataset(&self.info)?;
        if batches.is_empty() {
            return Err(CliError::Config(format!(
                "No batches found under {}. Set dataset.root in {} or use --root.",
                self.info.root.display(),
                self.config_path.display()
            )));
        }
        Ok(Dataset::new(self.info.clone(), batches))
    }
}

/// Format a duration as `1h 02m 03s`, `2m 03s` or `1.234s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}
