use std::io::Write;

use tally_engine::{scan_all, summarize};

use crate::config::{ScanArgs, ServerConfig, StorageConfig};
use crate::error::ServerError;
use crate::store::open_store;

pub async fn run(config: &ServerConfig, args: ScanArgs) -> Result<(), ServerError> {
    if matches!(config.storage, StorageConfig::Memory(_)) {
        tracing::warn!("memory backend starts empty on every run; configure backend = \"file\" to scan ingested data");
    }
    let store = open_store(&config.storage)?;
    let records = scan_all(store).await?;
    tracing::info!(records = records.len(), "scan complete");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if args.records {
        for record in &records {
            serde_json::to_writer(&mut out, record)?;
            writeln!(out)?;
        }
    } else {
        serde_json::to_writer_pretty(&mut out, &summarize(&records))?;
        writeln!(out)?;
    }
    Ok(())
}
