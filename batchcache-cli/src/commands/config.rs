//! Configuration management CLI commands.
//!
//! Provides `config get`, `config set`, `config list`, and `config path`.

use clap::Subcommand;
use batchcache::config::{ConfigFile, ConfigKey};

use super::common::CommandContext;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key in format section.key (e.g., precache.buffer_size)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key in format section.key (e.g., precache.buffer_size)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all configuration settings
    List,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(ctx: &CommandContext, command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => {
            let value = parse_key(&key)?.get(&ctx.config);
            if value.is_empty() {
                println!("(not set)");
            } else {
                println!("{}", value);
            }
            Ok(())
        }
        ConfigCommands::Set { key, value } => {
            let config_key = parse_key(&key)?;
            let mut config = ctx.config.clone();
            config_key.set(&mut config, &value)?;
            config.save_to(&ctx.config_path)?;
            println!("Set {} = {}", config_key, value);
            Ok(())
        }
        ConfigCommands::List => {
            print!("{}", list(&ctx.config));
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", ctx.config_path.display());
            Ok(())
        }
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'batchcache config list' to see available keys.",
            key
        ))
    })
}

/// Every setting grouped by section.
fn list(config: &ConfigFile) -> String {
    let mut out = String::new();
    let mut current_section = "";
    for key in ConfigKey::all() {
        let section = key.section();
        if section != current_section {
            if !current_section.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", section));
            current_section = section;
        }
        let value = key.get(config);
        let shown = if value.is_empty() { "(not set)" } else { value.as_str() };
        out.push_str(&format!("  {} = {}\n", key.key_name(), shown));
    }
    out
}
