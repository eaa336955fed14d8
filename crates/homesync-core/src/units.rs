//! Typed views of the quantity-unit tables.
//!
//! Older servers send numeric columns as strings, so the numeric fields here
//! accept both forms.

use serde::{Deserialize, Deserializer, Serialize};

/// A row of the quantity units table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityUnit {
    #[serde(deserialize_with = "lenient_u64")]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub name_plural: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A row of the quantity unit conversions table.
///
/// A conversion without `product_id` applies to every product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityUnitConversion {
    #[serde(deserialize_with = "lenient_u64")]
    pub id: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub from_qu_id: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub to_qu_id: u64,
    #[serde(deserialize_with = "lenient_f64")]
    pub factor: f64,
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub product_id: Option<u64>,
}

impl QuantityUnitConversion {
    pub fn applies_to(&self, product_id: u64) -> bool {
        self.product_id.is_none_or(|id| id == product_id)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(serde_json::Number),
    String(String),
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number out of range")),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("expected an unsigned integer")),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn lenient_opt_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::String(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrString::String(s)) => {
            s.trim().parse().map(Some).map_err(serde::de::Error::custom)
        }
        Some(NumberOrString::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("expected an unsigned integer")),
    }
}
