use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::codec::EncodedField;

/// A stored row: column name to column value.
pub type Row = BTreeMap<String, Column>;

/// A single column value as a backend stores it.
///
/// `Text` and `Binary` map onto character and blob columns of a relational
/// table, so a row is self-describing about how each field was written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Column {
    Text(String),
    Binary(#[serde(with = "bytes_serde")] Vec<u8>),
    Integer(i64),
}

mod bytes_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

impl Column {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Column::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Column::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Milliseconds since the Unix epoch, as an integer column.
    pub fn timestamp_now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        Column::Integer(i64::try_from(millis).unwrap_or(i64::MAX))
    }

    /// The column as a codec field; integers are not codec fields.
    pub fn to_encoded(&self) -> Option<EncodedField> {
        match self {
            Column::Text(text) => Some(EncodedField::Text(text.clone())),
            Column::Binary(bytes) => Some(EncodedField::Binary(bytes.clone())),
            Column::Integer(_) => None,
        }
    }
}

impl From<EncodedField> for Column {
    fn from(field: EncodedField) -> Self {
        match field {
            EncodedField::Text(text) => Column::Text(text),
            EncodedField::Binary(bytes) => Column::Binary(bytes),
        }
    }
}
