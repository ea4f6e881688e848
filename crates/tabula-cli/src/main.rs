//! Tabula CLI
//!
//! Command-line interface for tabula - schema-free documents over SQLite.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tabula_core::{Config, Store, StoreState};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "tabula")]
#[command(about = "Tabula - schema-free documents over SQLite")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to config file (default: ~/.config/tabula/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update a document
    Set {
        /// Table name
        table: String,
        /// Document id
        id: String,
        /// Attribute as key=value or key:type=value
        #[arg(short = 'a', long = "attr")]
        attrs: Vec<String>,
        /// Attributes as a JSON object
        #[arg(long)]
        data: Option<String>,
    },
    /// Insert a document under a generated id
    Push {
        /// Table name
        table: String,
        /// Attribute as key=value or key:type=value
        #[arg(short = 'a', long = "attr")]
        attrs: Vec<String>,
        /// Attributes as a JSON object
        #[arg(long)]
        data: Option<String>,
        /// Length of the generated id
        #[arg(long)]
        id_length: Option<usize>,
    },
    /// Read documents
    Get {
        /// Table name
        table: String,
        /// Document id (omit to list ids)
        id: Option<String>,
        /// Read every document, keyed by id
        #[arg(long, conflicts_with_all = ["id", "filter"])]
        all: bool,
        /// Filter as JSON, e.g. '{"age": {"cond": "> ?", "val": 30}}'
        #[arg(long = "where", conflicts_with = "id")]
        filter: Option<String>,
        /// Columns to return, comma separated
        #[arg(short, long, value_delimiter = ',')]
        columns: Vec<String>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (host, user, password, database, driver, id_length,
        /// max_id_attempts, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands work without a store
    if let Commands::Config { command } = &cli.command {
        return match command {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key.clone(), value.clone(), config_path, &output)
            }
        };
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config, cli.verbose);

    let mut store = Store::open(config);
    if store.state() != StoreState::Connected {
        output.print_log(store.errors())?;
        anyhow::bail!("Could not open database '{}'", store.config().database);
    }

    match cli.command {
        Commands::Set {
            table,
            id,
            attrs,
            data,
        } => commands::document::set(&mut store, &table, &id, &attrs, data.as_deref(), &output),
        Commands::Push {
            table,
            attrs,
            data,
            id_length,
        } => commands::document::push(
            &mut store,
            &table,
            &attrs,
            data.as_deref(),
            id_length,
            &output,
        ),
        Commands::Get {
            table,
            id,
            all,
            filter,
            columns,
        } => commands::document::get(
            &mut store,
            &table,
            id.as_deref(),
            all,
            filter.as_deref(),
            &columns,
            &output,
        ),
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over `-v`. Logs go to `log_file` when configured,
/// stderr otherwise.
fn init_logging(config: &Config, verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "tabula_core=debug,tabula_cli=debug",
        _ => "tabula_core=trace,tabula_cli=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(log_path) = &config.log_file {
        match File::create(log_path) {
            Ok(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(env_filter)
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
                return;
            }
            Err(e) => {
                eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
            }
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
