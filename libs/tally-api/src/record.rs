use std::fmt;

use serde::{Deserialize, Serialize};

/// Product identifier. Which variant a pipeline produces is decided by its
/// parser mode, never by guessing from the token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductId {
    Numeric(i64),
    Name(String),
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductId::Numeric(id) => write!(f, "{id}"),
            ProductId::Name(name) => f.write_str(name),
        }
    }
}

impl From<&str> for ProductId {
    fn from(name: &str) -> Self {
        ProductId::Name(name.to_string())
    }
}

impl From<i64> for ProductId {
    fn from(id: i64) -> Self {
        ProductId::Numeric(id)
    }
}

/// A single purchase as persisted in the store.
///
/// Immutable once constructed: fields are only reachable through getters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    customer: String,
    product: ProductId,
    quantity: u32,
    /// Processing time in Unix milliseconds, assigned by the pipeline.
    ingest_time_ms: i64,
}

impl PurchaseRecord {
    pub fn new(
        customer: impl Into<String>,
        product: impl Into<ProductId>,
        quantity: u32,
        ingest_time_ms: i64,
    ) -> Self {
        Self {
            customer: customer.into(),
            product: product.into(),
            quantity,
            ingest_time_ms,
        }
    }

    pub fn customer(&self) -> &str {
        &self.customer
    }

    pub fn product(&self) -> &ProductId {
        &self.product
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn ingest_time_ms(&self) -> i64 {
        self.ingest_time_ms
    }
}
