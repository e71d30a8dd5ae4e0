use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::RepositoryError;

use super::Value;

/// How a single persisted field is encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    #[default]
    Binary,
    Text,
}

impl EncodingMode {
    /// `Text` when the configuration flag is set, `Binary` otherwise.
    pub fn text_if(as_text: bool) -> Self {
        if as_text {
            EncodingMode::Text
        } else {
            EncodingMode::Binary
        }
    }
}

impl fmt::Display for EncodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingMode::Binary => f.write_str("binary"),
            EncodingMode::Text => f.write_str("text"),
        }
    }
}

/// A field as it sits in storage, tagged with the mode it was written in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodedField {
    Text(String),
    Binary(Vec<u8>),
}

impl EncodedField {
    pub fn mode(&self) -> EncodingMode {
        match self {
            EncodedField::Text(_) => EncodingMode::Text,
            EncodedField::Binary(_) => EncodingMode::Binary,
        }
    }
}

/// Encode `value` for storage in `field` using `mode`.
pub fn encode(field: &str, value: &Value, mode: EncodingMode) -> Result<EncodedField, RepositoryError> {
    match mode {
        EncodingMode::Text => value.render_text().map(EncodedField::Text).ok_or_else(|| {
            RepositoryError::codec(field, format!("{} value has no text form", value.kind()))
        }),
        EncodingMode::Binary => encode_binary(field, value).map(EncodedField::Binary),
    }
}

/// Decode `encoded` back into a value, insisting it was written in `mode`.
///
/// Text fields decode to `Value::Text`; binary fields decode to whatever
/// structured value was written.
pub fn decode(field: &str, encoded: &EncodedField, mode: EncodingMode) -> Result<Value, RepositoryError> {
    match (encoded, mode) {
        (EncodedField::Text(text), EncodingMode::Text) => Ok(Value::Text(text.clone())),
        (EncodedField::Binary(bytes), EncodingMode::Binary) => decode_binary(field, bytes),
        (stored, configured) => Err(RepositoryError::CodecMismatch {
            field: field.to_string(),
            stored: stored.mode(),
            configured,
        }),
    }
}

/// Binary-encode any serde value with bitcode.
pub fn encode_binary<T: Serialize>(field: &str, value: &T) -> Result<Vec<u8>, RepositoryError> {
    bitcode::serialize(value).map_err(|e| RepositoryError::codec(field, e))
}

pub fn decode_binary<T: DeserializeOwned>(field: &str, bytes: &[u8]) -> Result<T, RepositoryError> {
    bitcode::deserialize(bytes).map_err(|e| RepositoryError::codec(field, e))
}
