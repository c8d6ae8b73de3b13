use std::path::PathBuf;

use tally_api::PurchaseRecord;

// ════════════════════════════════════════════════════════════════
//  Configuration
// ════════════════════════════════════════════════════════════════

fn default_keys_per_split() -> usize {
    1024
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileStoreConfig {
    /// Directory holding `purchases.jsonl`. Created on open.
    pub data_dir: PathBuf,
    #[serde(default = "default_keys_per_split")]
    pub keys_per_split: usize,
    /// `sync_data` after every append.
    #[serde(default)]
    pub sync_writes: bool,
}

impl FileStoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            keys_per_split: default_keys_per_split(),
            sync_writes: false,
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  On-disk line format
// ════════════════════════════════════════════════════════════════

/// One log line as written: base64 key + record.
#[derive(serde::Serialize)]
pub(crate) struct LogLineRef<'a> {
    pub key: String,
    pub record: &'a PurchaseRecord,
}

/// One log line as replayed on open.
#[derive(serde::Deserialize)]
pub(crate) struct LogLine {
    pub key: String,
    pub record: PurchaseRecord,
}

/// Record body only, for point reads and scans where the key is already known.
#[derive(serde::Deserialize)]
pub(crate) struct LogRecord {
    pub record: PurchaseRecord,
}
