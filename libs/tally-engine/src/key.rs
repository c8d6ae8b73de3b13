use serde::Deserialize;

use tally_api::{ProductId, PurchaseRecord};

/// Byte layout of storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEncoding {
    /// `<ts decimal><customer><product>` with no separators.
    ///
    /// Distinct tuples can collide (`("ab", "c")` vs `("a", "bc")`, or `ts=1, customer="2x"`
    /// vs `ts=12, customer="x"`), and so do two events for the same pair in one
    /// millisecond. A collision overwrites the earlier record.
    #[default]
    Concat,
    /// Fixed-width timestamp followed by length-prefixed fields. Injective.
    LengthPrefixed,
}

const SIGN_FLIP: u64 = 1 << 63;

const TAG_NAME: u8 = 0;
const TAG_NUMERIC: u8 = 1;

/// Derives the storage key of a purchase from `(ingest time, customer, product)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordKeyDeriver {
    encoding: KeyEncoding,
}

impl RecordKeyDeriver {
    pub fn new(encoding: KeyEncoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> KeyEncoding {
        self.encoding
    }

    pub fn derive_key(&self, ingest_time_ms: i64, customer: &str, product: &ProductId) -> Vec<u8> {
        match self.encoding {
            KeyEncoding::Concat => format!("{ingest_time_ms}{customer}{product}").into_bytes(),
            KeyEncoding::LengthPrefixed => {
                let mut key = Vec::with_capacity(8 + 8 + customer.len() + 1 + 16);
                // Flipping the sign bit keeps big-endian byte order equal to numeric order.
                key.extend_from_slice(&((ingest_time_ms as u64) ^ SIGN_FLIP).to_be_bytes());
                push_prefixed(&mut key, customer.as_bytes());
                match product {
                    ProductId::Name(name) => {
                        key.push(TAG_NAME);
                        push_prefixed(&mut key, name.as_bytes());
                    }
                    ProductId::Numeric(id) => {
                        key.push(TAG_NUMERIC);
                        key.extend_from_slice(&((*id as u64) ^ SIGN_FLIP).to_be_bytes());
                    }
                }
                key
            }
        }
    }

    pub fn key_for(&self, record: &PurchaseRecord) -> Vec<u8> {
        self.derive_key(record.ingest_time_ms(), record.customer(), record.product())
    }
}

fn push_prefixed(key: &mut Vec<u8>, field: &[u8]) {
    key.extend_from_slice(&(field.len() as u64).to_be_bytes());
    key.extend_from_slice(field);
}
