use serde::Deserialize;

use tally_api::{ProductId, PurchaseRecord};

use crate::error::ParseError;

/// How the third field of an event is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductIdMode {
    /// Opaque product name, e.g. `apple`.
    #[default]
    Name,
    /// Numeric catalogue id, e.g. `353`.
    Numeric,
}

/// Validated fields of one event, before an ingest time is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPurchase {
    pub customer: String,
    pub quantity: u32,
    pub product: ProductId,
}

impl ParsedPurchase {
    pub fn into_record(self, ingest_time_ms: i64) -> PurchaseRecord {
        PurchaseRecord::new(self.customer, self.product, self.quantity, ingest_time_ms)
    }
}

/// Parser for `<customer>,<quantity>,<product>` events.
///
/// Whitespace around each field is ignored. Identifiers are not validated
/// beyond the product mode, so empty customers and products are accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventParser {
    mode: ProductIdMode,
}

impl EventParser {
    pub fn new(mode: ProductIdMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ProductIdMode {
        self.mode
    }

    pub fn parse(&self, payload: &[u8]) -> Result<ParsedPurchase, ParseError> {
        let body = String::from_utf8_lossy(payload);
        let tokens: Vec<&str> = body.split(',').map(str::trim).collect();
        let &[customer, quantity, product] = tokens.as_slice() else {
            return Err(ParseError::FieldCount { found: tokens.len() });
        };

        let quantity = quantity
            .parse::<u32>()
            .map_err(|_| ParseError::InvalidQuantity { value: quantity.to_string() })?;

        Ok(ParsedPurchase {
            customer: customer.to_string(),
            quantity,
            product: self.parse_product(product)?,
        })
    }

    /// Interpret one product field according to the configured mode.
    pub fn parse_product(&self, raw: &str) -> Result<ProductId, ParseError> {
        match self.mode {
            ProductIdMode::Name => Ok(ProductId::Name(raw.to_string())),
            ProductIdMode::Numeric => raw
                .parse::<i64>()
                .map(ProductId::Numeric)
                .map_err(|_| ParseError::InvalidProductId { value: raw.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named() -> EventParser {
        EventParser::new(ProductIdMode::Name)
    }

    #[test]
    fn parses_well_formed_event() {
        let parsed = named().parse(b"bob,3,apple").unwrap();
        assert_eq!(
            parsed,
            ParsedPurchase {
                customer: "bob".into(),
                quantity: 3,
                product: ProductId::Name("apple".into()),
            }
        );
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(
            named().parse(b" bob , 3 , apple ").unwrap(),
            named().parse(b"bob,3,apple").unwrap()
        );
        assert!(named().parse(b"\tbob,\t3\n,apple\r\n").is_ok());
    }

    #[test]
    fn wrong_field_count_is_rejected() {
        assert_eq!(named().parse(b"bob,3"), Err(ParseError::FieldCount { found: 2 }));
        assert_eq!(named().parse(b""), Err(ParseError::FieldCount { found: 1 }));
        assert_eq!(
            named().parse(b"bob,3,apple,extra"),
            Err(ParseError::FieldCount { found: 4 })
        );
        // A trailing comma is an (empty) fourth field.
        assert_eq!(named().parse(b"bob,3,apple,"), Err(ParseError::FieldCount { found: 4 }));
    }

    #[test]
    fn quantity_must_be_a_non_negative_integer() {
        for bad in ["three", "-1", "1.5", "", "4294967296"] {
            let event = format!("bob,{bad},apple");
            assert_eq!(
                named().parse(event.as_bytes()),
                Err(ParseError::InvalidQuantity { value: bad.to_string() }),
                "quantity {bad:?}"
            );
        }
    }

    #[test]
    fn empty_identifiers_are_accepted() {
        let parsed = named().parse(b",0,").unwrap();
        assert_eq!(parsed.customer, "");
        assert_eq!(parsed.product, ProductId::Name(String::new()));
    }

    #[test]
    fn numeric_mode_parses_product_ids() {
        let parser = EventParser::new(ProductIdMode::Numeric);
        assert_eq!(parser.parse(b"cat, 32, 287").unwrap().product, ProductId::Numeric(287));
        assert_eq!(
            parser.parse(b"cat,32,watermelon"),
            Err(ParseError::InvalidProductId { value: "watermelon".into() })
        );
    }

    #[test]
    fn name_mode_keeps_digits_as_names() {
        assert_eq!(named().parse(b"cat,2,14").unwrap().product, ProductId::Name("14".into()));
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let parsed = named().parse(b"b\xffb,1,apple").unwrap();
        assert_eq!(parsed.customer, "b\u{fffd}b");
    }

    #[test]
    fn mode_is_read_from_config_strings() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: ProductIdMode,
        }
        let w: Wrapper = toml::from_str("mode = \"numeric\"").unwrap();
        assert_eq!(w.mode, ProductIdMode::Numeric);
    }
}
