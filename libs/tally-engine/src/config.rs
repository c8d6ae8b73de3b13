use serde::Deserialize;

use crate::key::KeyEncoding;
use crate::parser::ProductIdMode;

/// `[pipeline]` section: record schema and key layout.
///
/// Every pipeline writing to one store must share the same values, otherwise
/// the store ends up with mixed product schemas and key layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub product_id: ProductIdMode,
    pub key_encoding: KeyEncoding,
}
