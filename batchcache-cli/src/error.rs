//! CLI error type.

use std::fmt;
use std::path::PathBuf;

use batchcache::batch::BatchError;
use batchcache::config::ConfigError;
use batchcache::logging::LoggingError;
use batchcache::ErrorCategory;

/// Errors surfaced to the user by the CLI.
#[derive(Debug)]
pub enum CliError {
    /// Invalid arguments or configuration.
    Config(String),
    /// Loading or saving the configuration file failed.
    ConfigFile(ConfigError),
    /// The logging subscriber could not be installed.
    Logging(LoggingError),
    /// The dataset directory could not be turned into a batch tree.
    Scan { path: PathBuf, reason: String },
    /// A batch operation failed.
    Batch(BatchError),
    /// Writing output failed.
    Output(String),
    /// The run was interrupted with Ctrl+C.
    Interrupted,
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::ConfigFile(_) | CliError::Logging(_) => 2,
            CliError::Batch(e) if e.category() == ErrorCategory::Range => 3,
            CliError::Interrupted => 130,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Logging(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Scan { path, reason } => {
                write!(f, "Failed to scan {}: {}", path.display(), reason)
            }
            CliError::Batch(e) => write!(f, "[{}] {}", e.category(), e),
            CliError::Output(msg) => write!(f, "Failed to write output: {}", msg),
            CliError::Interrupted => write!(f, "Interrupted"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::Batch(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<BatchError> for CliError {
    fn from(e: BatchError) -> Self {
        CliError::Batch(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e.to_string())
    }
}
