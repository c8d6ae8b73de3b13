pub mod error;
pub mod metrics;
pub mod record;
pub mod storage;

pub use error::{ErrorKind, StorageError};
pub use metrics::{MetricsSink, NoopMetrics};
pub use record::{ProductId, PurchaseRecord};
pub use storage::{KeyValueStore, Split, SplitScanner, records, split_key_ranges};
