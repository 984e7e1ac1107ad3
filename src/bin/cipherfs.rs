use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use cipherfs::admin;

#[derive(Parser)]
#[command(name = "cipherfs")]
#[command(about = "cipherfs block engine admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the block id of a sealed block file
    BlockId { file: PathBuf },

    /// Check a sealed block file against a block id
    Verify { file: PathBuf, id: String },

    /// Print the effective engine configuration
    Config {
        /// Configuration file (YAML, TOML or JSON)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Render as JSON instead of YAML
        #[arg(long)]
        json: bool,
    },
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::BlockId { file } => {
            println!("{}", admin::block_id_of_file(&file)?);
        }
        Commands::Verify { file, id } => {
            if !admin::verify_file(&file, &id)? {
                error!(file = %file.display(), "content hash mismatch");
                println!("MISMATCH");
                return Ok(ExitCode::FAILURE);
            }
            println!("OK");
        }
        Commands::Config { file, json } => {
            debug!(file = ?file, "loading configuration");
            print!("{}", admin::render_config(file.as_deref(), json)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    run(Cli::parse())
}
