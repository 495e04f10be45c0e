//! Property list codec for AirPlay protocol messages
//!
//! Senders ship request bodies as binary plists; this receiver answers
//! with XML plists, matching the reference AirPlay servers.

pub mod binary;
pub mod xml;

pub use binary::{PlistDecodeError, PlistEncodeError, decode, encode};
pub use xml::encode_xml;

use std::collections::HashMap;

/// A property list value
#[derive(Debug, Clone, PartialEq)]
pub enum PlistValue {
    /// Boolean value
    Boolean(bool),

    /// Integer (plist-uint on the wire for counts and flags)
    Integer(i64),

    /// Floating point number (plist-real, IEEE 754 double)
    Real(f64),

    /// UTF-8 string
    String(String),

    /// Binary data
    Data(Vec<u8>),

    /// Array of values
    Array(Vec<PlistValue>),

    /// Dictionary (string keys)
    Dictionary(HashMap<String, PlistValue>),
}

impl PlistValue {
    /// Try to get as boolean
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PlistValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PlistValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64 (integers widen)
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PlistValue::Real(f) => Some(*f),
            #[allow(clippy::cast_precision_loss)]
            PlistValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PlistValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as byte slice
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PlistValue::Data(d) => Some(d),
            _ => None,
        }
    }

    /// Try to get as array reference
    #[must_use]
    pub fn as_array(&self) -> Option<&[PlistValue]> {
        match self {
            PlistValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to get as dictionary reference
    #[must_use]
    pub fn as_dict(&self) -> Option<&HashMap<String, PlistValue>> {
        match self {
            PlistValue::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Dictionary lookup shorthand
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PlistValue> {
        self.as_dict()?.get(key)
    }
}

impl From<bool> for PlistValue {
    fn from(v: bool) -> Self {
        PlistValue::Boolean(v)
    }
}

impl From<i64> for PlistValue {
    fn from(v: i64) -> Self {
        PlistValue::Integer(v)
    }
}

impl From<u64> for PlistValue {
    fn from(v: u64) -> Self {
        #[allow(clippy::cast_possible_wrap)]
        PlistValue::Integer(v as i64)
    }
}

impl From<f64> for PlistValue {
    fn from(v: f64) -> Self {
        PlistValue::Real(v)
    }
}

impl From<&str> for PlistValue {
    fn from(v: &str) -> Self {
        PlistValue::String(v.to_string())
    }
}

impl From<String> for PlistValue {
    fn from(v: String) -> Self {
        PlistValue::String(v)
    }
}

impl From<Vec<u8>> for PlistValue {
    fn from(v: Vec<u8>) -> Self {
        PlistValue::Data(v)
    }
}

impl From<Vec<PlistValue>> for PlistValue {
    fn from(v: Vec<PlistValue>) -> Self {
        PlistValue::Array(v)
    }
}

/// Builder for plist dictionaries
#[derive(Debug, Default)]
pub struct DictBuilder {
    map: HashMap<String, PlistValue>,
}

impl DictBuilder {
    /// Create a new dictionary builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key-value pair
    #[must_use]
    pub fn insert(mut self, key: impl Into<String>, value: impl Into<PlistValue>) -> Self {
        self.map.insert(key.into(), value.into());
        self
    }

    /// Build the dictionary
    #[must_use]
    pub fn build(self) -> PlistValue {
        PlistValue::Dictionary(self.map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let value = PlistValue::Integer(42);
        assert_eq!(value.as_i64(), Some(42));
        assert_eq!(value.as_f64(), Some(42.0));
        assert_eq!(value.as_str(), None);
    }

    #[test]
    fn test_dict_builder_and_get() {
        let dict = DictBuilder::new()
            .insert("uuid", "1bd6ceeb-fffd-456c-a09c-996053a7a08c")
            .insert("Start-Position-Seconds", 12.5)
            .build();

        assert_eq!(
            dict.get("uuid").and_then(PlistValue::as_str),
            Some("1bd6ceeb-fffd-456c-a09c-996053a7a08c")
        );
        assert_eq!(
            dict.get("Start-Position-Seconds").and_then(PlistValue::as_f64),
            Some(12.5)
        );
        assert!(dict.get("Content-Location").is_none());
    }
}
