pub mod get;
pub mod ingest;
pub mod scan;
