use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;

use tally_api::{KeyValueStore, PurchaseRecord, Split, StorageError, records};

use crate::error::EngineError;

/// Read every record of one split. Blocking.
pub fn scan_split(
    store: &dyn KeyValueStore,
    split: &Split,
) -> Result<Vec<PurchaseRecord>, StorageError> {
    let mut scanner = store.create_scanner(split);
    records(scanner.as_mut()).collect()
}

/// Scan all splits in parallel, one blocking task per split.
///
/// Splits carry no cross-split order, so the merged result is sorted by
/// `(ingest time, customer, product)` before it is returned.
pub async fn scan_all(store: Arc<dyn KeyValueStore>) -> Result<Vec<PurchaseRecord>, EngineError> {
    let splits = store
        .list_splits()
        .map_err(|e| EngineError::from(e).with_context("list splits"))?;
    tracing::debug!(splits = splits.len(), "scanning store");

    let mut tasks = JoinSet::new();
    for split in splits {
        let store = store.clone();
        tasks.spawn_blocking(move || scan_split(store.as_ref(), &split));
    }

    let mut all = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        all.extend(joined??);
    }
    sort_records(&mut all);
    Ok(all)
}

pub fn sort_records(records: &mut [PurchaseRecord]) {
    records.sort_by(|a, b| {
        (a.ingest_time_ms(), a.customer(), a.product(), a.quantity())
            .cmp(&(b.ingest_time_ms(), b.customer(), b.product(), b.quantity()))
    });
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CustomerSummary {
    pub purchases: u64,
    pub quantity: u64,
}

/// Per-customer purchase count and total quantity.
pub fn summarize<'a, I>(records: I) -> BTreeMap<String, CustomerSummary>
where
    I: IntoIterator<Item = &'a PurchaseRecord>,
{
    let mut summary: BTreeMap<String, CustomerSummary> = BTreeMap::new();
    for record in records {
        let entry = summary.entry(record.customer().to_string()).or_default();
        entry.purchases += 1;
        entry.quantity += u64::from(record.quantity());
    }
    summary
}
