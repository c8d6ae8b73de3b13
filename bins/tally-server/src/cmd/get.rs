use tally_api::{KeyValueStore, PurchaseRecord};
use tally_engine::{EventParser, PipelineConfig, RecordKeyDeriver};

use crate::config::{GetArgs, ServerConfig};
use crate::error::ServerError;
use crate::store::open_store;

pub fn run(config: &ServerConfig, args: GetArgs) -> Result<(), ServerError> {
    let store = open_store(&config.storage)?;
    let record = lookup(store.as_ref(), config.pipeline, &args)?;
    println!("{}", serde_json::to_string(&record)?);
    Ok(())
}

/// Point read by the same key the pipeline derived at ingest time.
pub fn lookup(
    store: &dyn KeyValueStore,
    pipeline: PipelineConfig,
    args: &GetArgs,
) -> Result<PurchaseRecord, ServerError> {
    let product = EventParser::new(pipeline.product_id)
        .parse_product(args.product.trim())
        .map_err(|e| ServerError::InvalidArgument(e.to_string()))?;
    let key = RecordKeyDeriver::new(pipeline.key_encoding).derive_key(args.ts, &args.customer, &product);

    store
        .read(&key)?
        .ok_or_else(|| ServerError::NotFound(String::from_utf8_lossy(&key).into_owned()))
}
