//! Document definitions
//!
//! A document is a JSON value stored under a string key.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ZelosError};

/// Field used for implicit keys
pub const ID_FIELD: &str = "_id";

/// Longest key the record format can frame (u16 length prefix)
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

/// A JSON document and its key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique key within the collection
    pub key: String,

    /// Document body
    pub value: Value,

    /// Sequence number assigned when the document was stored (0 if never stored)
    #[serde(default)]
    pub version: u64,
}

impl Document {
    /// Create a document with an explicit key
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            version: 0,
        }
    }

    /// Create a document with an implicit key
    ///
    /// Uses the top-level `_id` string when present, otherwise a fresh UUIDv4.
    pub fn from_value(value: Value) -> Self {
        let key = value
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self::new(key, value)
    }
}

/// Check that a key can be stored
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(ZelosError::InvalidKey("key must not be empty".to_string()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(ZelosError::InvalidKey(format!(
            "key is {} bytes (max {})",
            key.len(),
            MAX_KEY_LEN
        )));
    }
    Ok(())
}
