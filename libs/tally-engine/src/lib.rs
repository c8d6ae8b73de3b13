pub mod clock;
pub mod config;
pub mod error;
pub mod key;
pub mod metrics;
pub mod parser;
pub mod pipeline;
pub mod scan;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PipelineConfig;
pub use error::{EngineError, ParseError};
pub use key::{KeyEncoding, RecordKeyDeriver};
pub use metrics::{CounterSink, TracingSink, purchase_counter};
pub use parser::{EventParser, ParsedPurchase, ProductIdMode};
pub use pipeline::{IngestOutcome, IngestionPipeline};
pub use scan::{CustomerSummary, scan_all, scan_split, sort_records, summarize};
