use std::sync::Arc;

use tally_api::{KeyValueStore, MetricsSink, PurchaseRecord, StorageError};

use crate::clock::{Clock, SystemClock};
use crate::config::PipelineConfig;
use crate::error::ParseError;
use crate::key::RecordKeyDeriver;
use crate::metrics::purchase_counter;
use crate::parser::EventParser;

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Persisted under `key`.
    Stored { key: Vec<u8>, record: PurchaseRecord },
    /// Rejected by the parser. Already logged; nothing was written.
    Dropped(ParseError),
}

impl IngestOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, IngestOutcome::Stored { .. })
    }
}

/// parse → key → write → metric, once per event.
///
/// Holds no per-event state. Clones share the store, metrics sink and clock,
/// so a transport can run one clone per worker thread.
#[derive(Clone)]
pub struct IngestionPipeline {
    parser: EventParser,
    keys: RecordKeyDeriver,
    store: Arc<dyn KeyValueStore>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
}

impl IngestionPipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn KeyValueStore>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            parser: EventParser::new(config.product_id),
            keys: RecordKeyDeriver::new(config.key_encoding),
            store,
            metrics,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the ingest-time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Handle one raw event.
    ///
    /// Parse failures are logged and reported as `Dropped`; they are never
    /// errors. A storage failure is returned untouched: whether to redeliver
    /// the event is the caller's decision.
    pub fn on_event(&self, payload: &[u8]) -> Result<IngestOutcome, StorageError> {
        let parsed = match self.parser.parse(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(
                    payload = %String::from_utf8_lossy(payload),
                    error = %e,
                    "invalid purchase event, dropping"
                );
                return Ok(IngestOutcome::Dropped(e));
            }
        };

        let record = parsed.into_record(self.clock.now_ms());
        let key = self.keys.key_for(&record);

        if let Err(e) = self.store.write(&key, &record) {
            tracing::error!(customer = %record.customer(), error = %e, "failed to store purchase");
            return Err(e);
        }

        self.metrics.increment(&purchase_counter(record.customer()));
        tracing::debug!(
            customer = %record.customer(),
            product = %record.product(),
            quantity = record.quantity(),
            ingest_time_ms = record.ingest_time_ms(),
            "purchase stored"
        );

        Ok(IngestOutcome::Stored { key, record })
    }
}
