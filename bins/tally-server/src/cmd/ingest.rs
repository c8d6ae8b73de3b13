use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use tally_api::MetricsSink;
use tally_engine::{CounterSink, IngestionPipeline, TracingSink, scan_all, summarize};

use crate::config::{IngestArgs, IngestConfig, ServerConfig, StorageConfig};
use crate::error::ServerError;
use crate::store::open_store;
use crate::transport::{DeliveryStats, RetryPolicy, run_worker};

const WORKER_QUEUE: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub lines: u64,
    pub stored: u64,
    pub dropped: u64,
    pub failed: u64,
}

pub async fn run(config: &ServerConfig, args: IngestArgs) -> Result<(), ServerError> {
    let store = open_store(&config.storage)?;
    let counters = Arc::new(CounterSink::new());
    let metrics: Arc<dyn MetricsSink> = Arc::new((counters.clone(), TracingSink));
    let pipeline = IngestionPipeline::new(config.pipeline, store.clone(), metrics);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping ingestion");
            on_signal.cancel();
        }
    });

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await.map_err(|e| {
                ServerError::InvalidArgument(format!("cannot open '{}': {e}", path.display()))
            })?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let report = ingest(reader, pipeline, &config.ingest, cancel).await?;
    tracing::info!(
        lines = report.lines,
        stored = report.stored,
        dropped = report.dropped,
        failed = report.failed,
        "ingestion finished"
    );
    for (counter, value) in counters.snapshot() {
        tracing::info!(counter = %counter, value, "metric");
    }

    // Nothing outlives the process with the memory backend, so report it now.
    if matches!(config.storage, StorageConfig::Memory(_)) {
        let records = scan_all(store).await?;
        println!("{}", serde_json::to_string_pretty(&summarize(&records))?);
    }
    Ok(())
}

/// Deal non-blank lines round-robin to `workers` blocking pipeline workers.
///
/// Stops reading at end of input or when `cancel` fires; events already
/// queued are still delivered before this returns.
pub async fn ingest<R>(
    reader: R,
    pipeline: IngestionPipeline,
    config: &IngestConfig,
    cancel: CancellationToken,
) -> Result<IngestReport, ServerError>
where
    R: AsyncBufRead + Unpin,
{
    let policy = RetryPolicy::from(config);
    let stats = Arc::new(DeliveryStats::default());

    let mut senders = Vec::new();
    let mut workers = JoinSet::new();
    for id in 0..config.workers.max(1) {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(WORKER_QUEUE);
        let pipeline = pipeline.clone();
        let stats = stats.clone();
        workers.spawn_blocking(move || run_worker(id, pipeline, rx, policy, &stats));
        senders.push(tx);
    }
    tracing::debug!(workers = senders.len(), "ingest workers started");

    let mut lines = reader.lines();
    let mut read = 0u64;
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(lines = read, "ingestion cancelled");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let tx = &senders[read as usize % senders.len()];
        read += 1;
        if tx.send(line.into_bytes()).await.is_err() {
            tracing::error!("ingest worker exited early");
            break;
        }
    }

    drop(senders);
    while let Some(joined) = workers.join_next().await {
        joined?;
    }

    Ok(IngestReport {
        lines: read,
        stored: stats.stored(),
        dropped: stats.dropped(),
        failed: stats.failed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use tally_api::{KeyValueStore, NoopMetrics};
    use tally_engine::{ManualClock, PipelineConfig, purchase_counter};
    use tally_storage_memory::MemoryStore;

    fn config(workers: usize) -> IngestConfig {
        IngestConfig { workers, max_attempts: 1, retry_backoff_ms: 0 }
    }

    #[tokio::test]
    async fn ingests_every_line_across_workers() {
        let store = Arc::new(MemoryStore::new(4));
        let counters = Arc::new(CounterSink::new());
        let pipeline = IngestionPipeline::new(PipelineConfig::default(), store.clone(), counters.clone());

        let input: String = (0..50).map(|i| format!("c{},{},p{i}\n", i % 5, i + 1)).collect();
        let report = ingest(input.as_bytes(), pipeline, &config(3), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report, IngestReport { lines: 50, stored: 50, dropped: 0, failed: 0 });
        assert_eq!(store.len(), 50);
        assert_eq!(counters.get(&purchase_counter("c0")), 10);
    }

    #[tokio::test]
    async fn blank_lines_are_skipped_and_bad_lines_dropped() {
        let store = Arc::new(MemoryStore::new(4));
        let pipeline = IngestionPipeline::new(PipelineConfig::default(), store.clone(), Arc::new(NoopMetrics))
            .with_clock(Arc::new(ManualClock::new(100)));

        let input = "bob,3,apple\n\n   \nbob,x,apple\njoe,1\n";
        let report = ingest(input.as_bytes(), pipeline, &config(1), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.lines, 3);
        assert_eq!(report.stored, 1);
        assert_eq!(report.dropped, 2);
        assert!(store.read(b"100bobapple").unwrap().is_some());
    }

    #[tokio::test]
    async fn cancelled_before_start_reads_nothing() {
        let store = Arc::new(MemoryStore::new(4));
        let pipeline = IngestionPipeline::new(PipelineConfig::default(), store.clone(), Arc::new(NoopMetrics));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = ingest(&b"bob,3,apple\n"[..], pipeline, &config(2), cancel).await.unwrap();

        assert_eq!(report, IngestReport::default());
        assert!(store.is_empty());
    }
}
