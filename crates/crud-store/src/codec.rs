//! Record file formats.
//!
//! A [`Codec`] turns a structured [`Value`] into file bytes and back. The
//! mapping between a record type and `Value` happens in the record store,
//! under the active adapter set, so codecs stay object-safe and know nothing
//! about record types.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// Encoding between structured values and record file bytes.
pub trait Codec: Send + Sync + fmt::Debug {
    /// File extension (without the dot) for records in this format.
    fn extension(&self) -> &str;

    /// Encode a value to bytes.
    fn to_bytes(&self, value: &Value) -> StoreResult<Vec<u8>>;

    /// Decode bytes to a value.
    fn from_bytes(&self, bytes: &[u8]) -> StoreResult<Value>;
}

/// JSON records, pretty-printed unless configured otherwise.
#[derive(Clone, Debug)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    /// Single-line JSON output.
    pub fn compact() -> Self {
        Self { pretty: false }
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for JsonCodec {
    fn extension(&self) -> &str {
        "json"
    }

    fn to_bytes(&self, value: &Value) -> StoreResult<Vec<u8>> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        encoded.map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn from_bytes(&self, bytes: &[u8]) -> StoreResult<Value> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// TOML records.
///
/// TOML has no null, so null-valued table entries are dropped on encode and
/// read back as missing fields. The top-level value must be a table.
#[derive(Clone, Debug, Default)]
pub struct TomlCodec;

impl Codec for TomlCodec {
    fn extension(&self) -> &str {
        "toml"
    }

    fn to_bytes(&self, value: &Value) -> StoreResult<Vec<u8>> {
        if !value.is_object() {
            return Err(StoreError::Serialization(
                "TOML records must encode to a table".into(),
            ));
        }
        let text = toml::to_string_pretty(&strip_nulls(value))
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(text.into_bytes())
    }

    fn from_bytes(&self, bytes: &[u8]) -> StoreResult<Value> {
        let text =
            std::str::from_utf8(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        toml::from_str(text).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_nulls).collect()),
        other => other.clone(),
    }
}

/// Configurable choice of built-in codec.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    #[default]
    Json,
    Toml,
}

impl Format {
    /// Build the codec for this format. `pretty` only affects JSON.
    pub fn codec(self, pretty: bool) -> Arc<dyn Codec> {
        match self {
            Format::Json if pretty => Arc::new(JsonCodec::new()),
            Format::Json => Arc::new(JsonCodec::compact()),
            Format::Toml => Arc::new(TomlCodec),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => f.write_str("json"),
            Format::Toml => f.write_str("toml"),
        }
    }
}

impl std::str::FromStr for Format {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "toml" => Ok(Format::Toml),
            other => Err(StoreError::Config(format!("unknown format: {other}"))),
        }
    }
}
