//! Config command handlers

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use tabula_core::Config;

use crate::output::{Output, OutputFormat};

const KEYS: &str = "host, user, password, database, driver, id_length, max_id_attempts, log_file";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    let password = if config.password.is_empty() {
        "(not set)"
    } else {
        "********"
    };

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "host": config.host,
                    "user": config.user,
                    "password": password,
                    "database": config.database,
                    "driver": config.driver,
                    "id_length": config.id_length,
                    "max_id_attempts": config.max_id_attempts,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.database);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  host:            {}", config.host);
            println!("  user:            {}", or_unset(&config.user));
            println!("  password:        {}", password);
            println!("  database:        {}", config.database);
            println!("  driver:          {}", config.driver);
            println!("  id_length:       {}", config.id_length);
            println!("  max_id_attempts: {}", config.max_id_attempts);
            println!(
                "  log_file:        {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    set_at(&save_path, &key, &value)?;

    let shown = if key == "password" { "********" } else { value.as_str() };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}

/// Load the file at `path`, change one key, write it back
fn set_at(path: &Path, key: &str, value: &str) -> Result<()> {
    let mut config = Config::load_from_path(path).context("Failed to load configuration")?;
    apply(&mut config, key, value)?;
    config
        .save_to_path(path)
        .context("Failed to save configuration")
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "host" => config.host = value.to_string(),
        "user" => config.user = value.to_string(),
        "password" => config.password = value.to_string(),
        "database" => config.database = value.to_string(),
        "driver" => config.driver = value.to_string(),
        "id_length" => {
            let length: usize = value
                .parse()
                .context("Invalid value for id_length. Use a number from 1 to 64.")?;
            if !(1..=64).contains(&length) {
                bail!("id_length must be between 1 and 64, got {}", length);
            }
            config.id_length = length;
        }
        "max_id_attempts" => {
            config.max_id_attempts = value
                .parse()
                .context("Invalid value for max_id_attempts. Use a number (0 = unbounded).")?;
        }
        "log_file" => {
            config.log_file = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.into())
            };
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                KEYS
            );
        }
    }
    Ok(())
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}
