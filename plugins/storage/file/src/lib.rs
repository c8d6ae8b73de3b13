//! Append-only JSON-lines purchase store.
//!
//! Every write appends `{"key": <base64>, "record": {...}}` to
//! `<data_dir>/purchases.jsonl`. An in-memory index maps each key to the
//! offset of its newest line and is rebuilt by replaying the log on open.
//! Superseded lines stay in the file; compaction is not done here.

mod config;
mod storage;

pub use config::FileStoreConfig;
pub use storage::{FileStore, LOG_FILE_NAME};
