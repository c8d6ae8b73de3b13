use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::record::PurchaseRecord;

/// Handle to one partition of the keyspace, produced by `KeyValueStore::list_splits`.
///
/// A half-open key range `[start, end)`; `None` on either side means unbounded.
/// Consumers treat it as opaque and hand it back to the store that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Split {
    start: Option<Vec<u8>>,
    end: Option<Vec<u8>>,
}

impl Split {
    /// The whole keyspace.
    pub fn full() -> Self {
        Self { start: None, end: None }
    }

    pub fn new(start: Option<Vec<u8>>, end: Option<Vec<u8>>) -> Self {
        Self { start, end }
    }

    pub fn start(&self) -> Option<&[u8]> {
        self.start.as_deref()
    }

    pub fn end(&self) -> Option<&[u8]> {
        self.end.as_deref()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.start().is_none_or(|s| key >= s) && self.end().is_none_or(|e| key < e)
    }

    /// Range bounds still to be visited after `cursor` (the last key already
    /// returned), suitable for `BTreeMap::range`.
    ///
    /// Returns `None` when nothing remains, which also covers malformed splits
    /// whose start is not below their end.
    pub fn remaining<'a>(
        &'a self,
        cursor: Option<&'a [u8]>,
    ) -> Option<(Bound<&'a [u8]>, Bound<&'a [u8]>)> {
        let lower = match (cursor, self.start()) {
            (Some(c), _) => Bound::Excluded(c),
            (None, Some(s)) => Bound::Included(s),
            (None, None) => Bound::Unbounded,
        };
        let upper = match self.end() {
            Some(e) => Bound::Excluded(e),
            None => Bound::Unbounded,
        };
        if let (Bound::Included(lo) | Bound::Excluded(lo), Bound::Excluded(hi)) = (lower, upper) {
            if lo >= hi {
                return None;
            }
        }
        Some((lower, upper))
    }
}

/// Cut an ordered keyspace into contiguous ranges of at most `keys_per_split` keys.
///
/// `keys` must be strictly ascending. The first range is open below and the last
/// open above, so the result covers every possible key, including ones written
/// after the call. An empty keyspace yields a single `Split::full()`.
pub fn split_key_ranges<'a, I>(keys: I, keys_per_split: usize) -> Vec<Split>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let step = keys_per_split.max(1);
    let boundaries: Vec<Vec<u8>> = keys
        .into_iter()
        .enumerate()
        .filter(|(i, _)| *i > 0 && i % step == 0)
        .map(|(_, k)| k.to_vec())
        .collect();

    let mut splits = Vec::with_capacity(boundaries.len() + 1);
    let mut start = None;
    for boundary in boundaries {
        splits.push(Split::new(start, Some(boundary.clone())));
        start = Some(boundary);
    }
    splits.push(Split::new(start, None));
    splits
}

/// Lazy cursor over the records of one split.
///
/// `initialize` (re)binds the scanner and rewinds it; `next_record` yields one
/// record per call until `Ok(None)`. Re-initializing with the same split
/// restarts the scan, which may observe writes made in between.
pub trait SplitScanner: Send {
    fn initialize(&mut self, split: &Split) -> Result<(), StorageError>;

    fn next_record(&mut self) -> Result<Option<PurchaseRecord>, StorageError>;
}

/// Adapt a scanner into an iterator. Stops after the first error.
pub fn records(
    scanner: &mut dyn SplitScanner,
) -> impl Iterator<Item = Result<PurchaseRecord, StorageError>> + '_ {
    let mut failed = false;
    std::iter::from_fn(move || {
        if failed {
            return None;
        }
        match scanner.next_record() {
            Ok(record) => record.map(Ok),
            Err(e) => {
                failed = true;
                Some(Err(e))
            }
        }
    })
}

/// Keyed purchase store.
///
/// The pipeline and scan helpers only see this trait; the concrete engine is
/// chosen once at composition time and shared as `Arc<dyn KeyValueStore>`.
///
/// Implementations must be safe to call from many threads at once:
/// - writes to different keys do not interfere, same-key writes are last-write-wins;
/// - a `read` after a completed `write` on the same key returns that record or a newer one;
/// - `list_splits` may run during writes and gives no snapshot isolation.
pub trait KeyValueStore: Send + Sync {
    /// Insert or replace the record stored under `key`.
    fn write(&self, key: &[u8], record: &PurchaseRecord) -> Result<(), StorageError>;

    /// Current record under `key`. Absence is `Ok(None)`, not an error.
    fn read(&self, key: &[u8]) -> Result<Option<PurchaseRecord>, StorageError>;

    /// Non-overlapping splits that together cover every key written before the call.
    fn list_splits(&self) -> Result<Vec<Split>, StorageError>;

    /// A scanner already initialized with `split`.
    fn create_scanner(&self, split: &Split) -> Box<dyn SplitScanner>;
}
