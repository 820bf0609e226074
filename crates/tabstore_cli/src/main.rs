//! Tabstore CLI
//!
//! Command-line tools for Tabstore tables and storage engines.
//!
//! # Commands
//!
//! - `inspect` - Display table size, shape and engine
//! - `dump` - Print table rows
//! - `tail` - Print the end of a local file, read backwards
//! - `append` - Append one row to a table
//! - `cp` / `mv` / `rm` - Copy, move and remove objects

mod commands;
mod error;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tabstore_storage::{FileSystemStorageEngine, S3Config, StorageConfig, StorageEngine};
use tracing_subscriber::EnvFilter;

use crate::error::{CliError, CliResult};

/// Tabstore command-line table tools.
#[derive(Parser)]
#[command(name = "tabstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root directory of the filesystem engine
    #[arg(global = true, short, long, env = "TABSTORE_ROOT")]
    root: Option<PathBuf>,

    /// Use the S3 engine configured by the S3_* environment variables
    #[arg(global = true, long)]
    s3: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display table size, shape and engine
    Inspect {
        /// Table path, relative to the engine root
        path: String,

        /// Number of columns
        #[arg(short, long)]
        columns: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print table rows
    Dump {
        /// Table path, relative to the engine root
        path: String,

        /// Number of columns
        #[arg(short, long)]
        columns: usize,

        /// First row to print
        #[arg(short, long, default_value = "0")]
        start: u64,

        /// Row to stop before (default: end of table)
        #[arg(short, long)]
        end: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the last bytes of a local file
    Tail {
        /// File path, relative to the root directory
        path: String,

        /// Number of bytes to print
        #[arg(short, long, default_value = "1024")]
        bytes: usize,
    },

    /// Append one row to a table
    Append {
        /// Table path, relative to the engine root
        path: String,

        /// Number of columns
        #[arg(short, long)]
        columns: usize,

        /// Row values
        #[arg(required = true, allow_negative_numbers = true)]
        values: Vec<f64>,
    },

    /// Copy an object
    Cp {
        /// Source path
        from: String,
        /// Destination path
        to: String,
    },

    /// Move an object
    Mv {
        /// Source path
        from: String,
        /// Destination path
        to: String,
    },

    /// Remove an object
    Rm {
        /// Object path
        path: String,
    },
}

fn root_directory(root: Option<PathBuf>) -> CliResult<PathBuf> {
    match root {
        Some(root) => Ok(root),
        None => Ok(std::env::current_dir()?),
    }
}

fn build_engine(cli: &Cli) -> CliResult<Arc<dyn StorageEngine>> {
    if cli.s3 {
        return Ok(StorageConfig::S3(S3Config::from_env()?).build());
    }
    let root = root_directory(cli.root.clone())?;
    Ok(StorageConfig::file_system(root).build())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the default level.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Tail { path, bytes } = &cli.command {
        if cli.s3 {
            return Err(CliError::Unsupported("tail only reads local files").into());
        }
        let engine = FileSystemStorageEngine::new(root_directory(cli.root.clone())?);
        commands::tail::run(&engine, path, *bytes).await?;
        return Ok(());
    }

    let engine = build_engine(&cli)?;
    tracing::debug!(engine = %engine.describe(), "storage engine ready");

    match cli.command {
        Commands::Inspect {
            path,
            columns,
            format,
        } => {
            commands::inspect::run(&engine, &path, columns, &format).await?;
        }
        Commands::Dump {
            path,
            columns,
            start,
            end,
            format,
        } => {
            commands::dump::run(&engine, &path, columns, start, end, &format).await?;
        }
        Commands::Append {
            path,
            columns,
            values,
        } => {
            commands::append::run(&engine, &path, columns, &values).await?;
        }
        Commands::Cp { from, to } => {
            commands::objects::copy(&engine, &from, &to).await?;
        }
        Commands::Mv { from, to } => {
            commands::objects::rename(&engine, &from, &to).await?;
        }
        Commands::Rm { path } => {
            commands::objects::remove(&engine, &path).await?;
        }
        Commands::Tail { .. } => {}
    }

    Ok(())
}
