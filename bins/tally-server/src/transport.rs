use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use tally_engine::{IngestOutcome, IngestionPipeline};

use crate::config::IngestConfig;

/// Redelivery policy for events whose write failed.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl From<&IngestConfig> for RetryPolicy {
    fn from(cfg: &IngestConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff: Duration::from_millis(cfg.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Default)]
pub struct DeliveryStats {
    pub stored: AtomicU64,
    pub dropped: AtomicU64,
    pub failed: AtomicU64,
    pub redelivered: AtomicU64,
}

impl DeliveryStats {
    pub fn stored(&self) -> u64 {
        self.stored.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn redelivered(&self) -> u64 {
        self.redelivered.load(Ordering::Relaxed)
    }
}

/// Blocking worker loop: one pipeline, fed from its own channel until the
/// sender side closes.
pub fn run_worker(
    worker: usize,
    pipeline: IngestionPipeline,
    mut rx: mpsc::Receiver<Vec<u8>>,
    policy: RetryPolicy,
    stats: &DeliveryStats,
) {
    while let Some(event) = rx.blocking_recv() {
        deliver(worker, &pipeline, &event, policy, stats);
    }
    tracing::debug!(worker, "worker stopped");
}

/// Hand one event to the pipeline, redelivering on storage failure.
///
/// Each redelivery is a fresh `on_event` call and therefore gets a fresh
/// ingest time. After `max_attempts` the event is dropped and counted as failed.
pub fn deliver(
    worker: usize,
    pipeline: &IngestionPipeline,
    event: &[u8],
    policy: RetryPolicy,
    stats: &DeliveryStats,
) {
    let mut attempt = 1;
    loop {
        match pipeline.on_event(event) {
            Ok(IngestOutcome::Stored { .. }) => {
                stats.stored.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Ok(IngestOutcome::Dropped(_)) => {
                stats.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(e) if attempt < policy.max_attempts => {
                tracing::warn!(worker, attempt, error = %e, "write failed, redelivering event");
                stats.redelivered.fetch_add(1, Ordering::Relaxed);
                std::thread::sleep(policy.backoff * attempt);
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    worker,
                    attempts = attempt,
                    event = %String::from_utf8_lossy(event),
                    error = %e,
                    "write failed, event lost"
                );
                stats.failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;

    use tally_api::{KeyValueStore, NoopMetrics, PurchaseRecord, Split, SplitScanner, StorageError};
    use tally_engine::{ManualClock, PipelineConfig};
    use tally_storage_memory::MemoryStore;

    /// Fails the first `failures` writes, then forwards to a memory store.
    struct FlakyStore {
        failures: AtomicU32,
        inner: MemoryStore,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self { failures: AtomicU32::new(failures), inner: MemoryStore::new(16) }
        }
    }

    impl KeyValueStore for FlakyStore {
        fn write(&self, key: &[u8], record: &PurchaseRecord) -> Result<(), StorageError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StorageError::io("transient"));
            }
            self.inner.write(key, record)
        }

        fn read(&self, key: &[u8]) -> Result<Option<PurchaseRecord>, StorageError> {
            self.inner.read(key)
        }

        fn list_splits(&self) -> Result<Vec<Split>, StorageError> {
            self.inner.list_splits()
        }

        fn create_scanner(&self, split: &Split) -> Box<dyn SplitScanner> {
            self.inner.create_scanner(split)
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy { max_attempts, backoff: Duration::ZERO }
    }

    fn pipeline(store: Arc<FlakyStore>) -> IngestionPipeline {
        IngestionPipeline::new(PipelineConfig::default(), store, Arc::new(NoopMetrics))
            .with_clock(Arc::new(ManualClock::new(7)))
    }

    #[test]
    fn transient_failure_is_redelivered() {
        let store = Arc::new(FlakyStore::new(2));
        let stats = DeliveryStats::default();

        deliver(0, &pipeline(store.clone()), b"bob,3,apple", policy(3), &stats);

        assert_eq!(stats.stored(), 1);
        assert_eq!(stats.redelivered(), 2);
        assert_eq!(stats.failed(), 0);
        assert!(store.read(b"7bobapple").unwrap().is_some());
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let store = Arc::new(FlakyStore::new(5));
        let stats = DeliveryStats::default();

        deliver(0, &pipeline(store.clone()), b"bob,3,apple", policy(2), &stats);

        assert_eq!(stats.stored(), 0);
        assert_eq!(stats.failed(), 1);
        assert!(store.inner.is_empty());
    }

    #[test]
    fn parse_errors_are_not_redelivered() {
        let store = Arc::new(FlakyStore::new(0));
        let stats = DeliveryStats::default();

        deliver(0, &pipeline(store), b"bob,three,apple", policy(3), &stats);

        assert_eq!(stats.dropped(), 1);
        assert_eq!(stats.redelivered(), 0);
    }

    #[test]
    fn worker_drains_its_channel() {
        let store = Arc::new(FlakyStore::new(0));
        let stats = DeliveryStats::default();
        let (tx, rx) = mpsc::channel(8);
        for event in ["joe,1,pear", "joe,10,banana", "bob,3"] {
            tx.try_send(event.as_bytes().to_vec()).unwrap();
        }
        drop(tx);

        run_worker(0, pipeline(store.clone()), rx, policy(1), &stats);

        assert_eq!(stats.stored(), 2);
        assert_eq!(stats.dropped(), 1);
        assert_eq!(store.inner.len(), 2);
    }

    #[test]
    fn zero_attempts_still_delivers_once() {
        let cfg = IngestConfig { max_attempts: 0, ..IngestConfig::default() };
        assert_eq!(RetryPolicy::from(&cfg).max_attempts, 1);
    }
}
