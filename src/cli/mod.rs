//! Command-line interface for json-to-excel.
//!
//! Provides commands for running the tool server, converting a JSON file
//! offline and inspecting the resolved configuration.

use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters;
use crate::config::{self, ResolvedConfig};
use crate::core::to_xlsx;
use crate::domain::ConversionRequest;

/// json-to-excel - JSON tables to expiring Excel downloads
#[derive(Parser, Debug)]
#[command(name = "json-to-excel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the MCP tool server
    Serve {
        /// Address to listen on
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for generated spreadsheets
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// How long a download link stays valid (seconds)
        #[arg(long)]
        validity_secs: Option<u64>,

        /// Interval between cleanup sweeps (seconds)
        #[arg(long)]
        sweep_secs: Option<u64>,

        /// Public origin used in download links
        #[arg(long)]
        public_url: Option<String>,
    },

    /// Convert a JSON request file to .xlsx without starting the server
    Convert {
        /// Input file with {"headers": {...}, "data": [...]} (reads stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output .xlsx path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Flag values of the `serve` command
#[derive(Debug, Clone, Default)]
pub struct ServeOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dir: Option<PathBuf>,
    pub validity_secs: Option<u64>,
    pub sweep_secs: Option<u64>,
    pub public_url: Option<String>,
}

impl ServeOverrides {
    /// Apply flags on top of file/env configuration
    pub fn apply(self, mut config: ResolvedConfig) -> ResolvedConfig {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(url) = self.public_url {
            config.server.public_url = Some(url);
        }
        if let Some(dir) = self.dir {
            config.artifacts.dir = dir;
        }
        if let Some(secs) = self.validity_secs {
            config.artifacts.validity_seconds = secs;
        }
        if let Some(secs) = self.sweep_secs {
            config.artifacts.sweep_interval_seconds = secs;
        }
        config
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve {
                host,
                port,
                dir,
                validity_secs,
                sweep_secs,
                public_url,
            } => {
                let overrides = ServeOverrides {
                    host,
                    port,
                    dir,
                    validity_secs,
                    sweep_secs,
                    public_url,
                };
                serve(overrides).await
            }
            Commands::Convert { input, output } => convert_file(input, output).await,
            Commands::Config => show_config().await,
        }
    }
}

async fn serve(overrides: ServeOverrides) -> Result<()> {
    let config = overrides.apply(config::config()?.clone());
    adapters::serve(&config).await
}

/// Read input from file or stdin
fn read_input(input: Option<PathBuf>) -> Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display())),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read from stdin")?;
            Ok(buffer)
        }
    }
}

async fn convert_file(input: Option<PathBuf>, output: PathBuf) -> Result<()> {
    let raw = read_input(input)?;
    let request: ConversionRequest =
        serde_json::from_str(&raw).context("Input is not a valid conversion request")?;

    let bytes = to_xlsx(&request)?;

    tokio::fs::write(&output, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Wrote {} ({} columns, {} rows)",
        output.display(),
        request.headers.len(),
        request.data.len()
    );
    Ok(())
}

async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("json-to-excel configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Server:");
    println!("  Bind address:    {}", cfg.server.bind_address());
    println!("  Public URL:      {}", cfg.server.public_base_url());
    println!("  Request timeout: {}s", cfg.server.request_timeout_seconds);
    println!("  Max body:        {} bytes", cfg.server.max_body_bytes);
    println!();
    println!("Artifacts:");
    println!("  Directory:       {}", cfg.artifacts.dir.display());
    println!("  Validity:        {}s", cfg.artifacts.validity_seconds);
    println!("  Sweep interval:  {}s", cfg.artifacts.sweep_interval_seconds);

    Ok(())
}
