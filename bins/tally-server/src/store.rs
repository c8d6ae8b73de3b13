use std::sync::Arc;

use tally_api::KeyValueStore;
use tally_storage_file::FileStore;
use tally_storage_memory::MemoryStore;

use crate::config::StorageConfig;
use crate::error::ServerError;

/// Build the configured store. The only place that names concrete backends.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn KeyValueStore>, ServerError> {
    let store: Arc<dyn KeyValueStore> = match config {
        StorageConfig::Memory(cfg) => {
            tracing::info!(keys_per_split = cfg.keys_per_split, "using in-memory store");
            Arc::new(MemoryStore::from_config(cfg))
        }
        StorageConfig::File(cfg) => {
            let store = FileStore::open(cfg)?;
            tracing::info!(path = %store.path().display(), keys_per_split = cfg.keys_per_split, "using file store");
            Arc::new(store)
        }
    };
    Ok(store)
}
