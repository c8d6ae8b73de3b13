use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use tally_api::{KeyValueStore, PurchaseRecord, Split, SplitScanner, StorageError, split_key_ranges};

// ═══════════════════════════════════════════════════════════════
//  MemoryStoreConfig
// ═══════════════════════════════════════════════════════════════

fn default_keys_per_split() -> usize {
    1024
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryStoreConfig {
    #[serde(default = "default_keys_per_split")]
    pub keys_per_split: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            keys_per_split: default_keys_per_split(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryStore
// ═══════════════════════════════════════════════════════════════

type Records = Arc<RwLock<BTreeMap<Vec<u8>, PurchaseRecord>>>;

/// Ordered in-memory store. Nothing survives the process.
///
/// Splits are key ranges of at most `keys_per_split` keys at enumeration time.
pub struct MemoryStore {
    records: Records,
    keys_per_split: usize,
}

impl MemoryStore {
    pub fn new(keys_per_split: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(BTreeMap::new())),
            keys_per_split,
        }
    }

    pub fn from_config(config: &MemoryStoreConfig) -> Self {
        Self::new(config.keys_per_split)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::from_config(&MemoryStoreConfig::default())
    }
}

impl KeyValueStore for MemoryStore {
    fn write(&self, key: &[u8], record: &PurchaseRecord) -> Result<(), StorageError> {
        self.records.write().insert(key.to_vec(), record.clone());
        Ok(())
    }

    fn read(&self, key: &[u8]) -> Result<Option<PurchaseRecord>, StorageError> {
        Ok(self.records.read().get(key).cloned())
    }

    fn list_splits(&self) -> Result<Vec<Split>, StorageError> {
        let records = self.records.read();
        Ok(split_key_ranges(records.keys().map(Vec::as_slice), self.keys_per_split))
    }

    fn create_scanner(&self, split: &Split) -> Box<dyn SplitScanner> {
        Box::new(MemoryScanner {
            records: self.records.clone(),
            split: split.clone(),
            cursor: None,
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryScanner
// ═══════════════════════════════════════════════════════════════

/// Walks one split in key order. The lock is taken per record, never held
/// between calls, so writers are not blocked by a slow consumer.
struct MemoryScanner {
    records: Records,
    split: Split,
    /// Last key returned.
    cursor: Option<Vec<u8>>,
}

impl SplitScanner for MemoryScanner {
    fn initialize(&mut self, split: &Split) -> Result<(), StorageError> {
        self.split = split.clone();
        self.cursor = None;
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<PurchaseRecord>, StorageError> {
        let next = {
            let Some(bounds) = self.split.remaining(self.cursor.as_deref()) else {
                return Ok(None);
            };
            let records = self.records.read();
            records
                .range::<[u8], _>(bounds)
                .next()
                .map(|(k, v)| (k.clone(), v.clone()))
        };

        Ok(next.map(|(key, record)| {
            self.cursor = Some(key);
            record
        }))
    }
}
