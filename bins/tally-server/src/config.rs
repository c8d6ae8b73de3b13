use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use tally_engine::PipelineConfig;
use tally_storage_file::FileStoreConfig;
use tally_storage_memory::MemoryStoreConfig;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "tally-server", about = "Purchase event ingestion and split-parallel scanning")]
pub struct Cli {
    /// Path to TOML configuration file. Built-in defaults when omitted.
    #[arg(long, global = true, env = "TALLY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest `<customer>,<quantity>,<product>` events, one per line
    Ingest(IngestArgs),
    /// Scan every split in parallel and print the result
    Scan(ScanArgs),
    /// Look up one purchase by the fields its key is derived from
    Get(GetArgs),
}

#[derive(Args, Clone, Debug)]
pub struct IngestArgs {
    /// Read events from this file instead of stdin.
    #[arg(long)]
    pub input: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct ScanArgs {
    /// Print every record as a JSON line instead of the per-customer summary.
    #[arg(long)]
    pub records: bool,
}

#[derive(Args, Clone, Debug)]
pub struct GetArgs {
    /// Ingest time of the purchase, Unix milliseconds.
    #[arg(long)]
    pub ts: i64,
    #[arg(long)]
    pub customer: String,
    #[arg(long)]
    pub product: String,
}

// ---- TOML Config ----

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// `[storage]` section; `backend` picks the store implementation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    Memory(MemoryStoreConfig),
    File(FileStoreConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(MemoryStoreConfig::default())
    }
}

/// `[ingest]` section: transport-side delivery policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Parallel pipeline workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Deliveries per event before a storage failure drops it.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff before redelivery, multiplied by the attempt number.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_workers() -> usize {
    4
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    100
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ServerError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|e| ServerError::Config {
            context: "read",
            detail: format!("'{}': {e}", path.display()),
        })?;
        Self::parse(&content).map_err(|e| match e {
            ServerError::Config { context, detail } => ServerError::Config {
                context,
                detail: format!("'{}': {detail}", path.display()),
            },
            other => other,
        })
    }

    pub fn parse(toml_str: &str) -> Result<Self, ServerError> {
        toml::from_str(toml_str).map_err(|e| ServerError::Config {
            context: "parse",
            detail: e.to_string(),
        })
    }
}
