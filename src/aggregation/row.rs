//! Mapping between `AggregationRecord` and backend rows.
//!
//! Layout of a row:
//! - `body`: text or binary column, per `store_body_as_text`;
//! - `headers`: one binary column holding every header not configured as text;
//! - one text column per configured text header, named after the header;
//! - bookkeeping columns (`version`, `correlation_key`, `completed_at`,
//!   `source_version`).
//!
//! Reads re-derive each field's mode from the current configuration and
//! compare it with the column type, so a configuration change between write
//! and read surfaces as `CodecMismatch` instead of misdecoded data.

use std::collections::BTreeMap;

use crate::backend::{Column, Row, VERSION_COLUMN};
use crate::codec::{self, EncodingMode, Value};
use crate::error::RepositoryError;

use super::{AggregationConfig, AggregationRecord};

pub(crate) const BODY_COLUMN: &str = "body";
pub(crate) const HEADERS_COLUMN: &str = "headers";
pub(crate) const CORRELATION_KEY_COLUMN: &str = "correlation_key";
pub(crate) const COMPLETED_AT_COLUMN: &str = "completed_at";
/// Version of the active row a completed-log entry was taken from, if any.
pub(crate) const SOURCE_VERSION_COLUMN: &str = "source_version";

pub(crate) const RESERVED_COLUMNS: [&str; 6] = [
    BODY_COLUMN,
    HEADERS_COLUMN,
    VERSION_COLUMN,
    CORRELATION_KEY_COLUMN,
    COMPLETED_AT_COLUMN,
    SOURCE_VERSION_COLUMN,
];

pub(crate) fn encode_record(
    record: &AggregationRecord,
    config: &AggregationConfig,
) -> Result<Row, RepositoryError> {
    let mut row = Row::new();
    row.insert(
        BODY_COLUMN.to_string(),
        codec::encode(BODY_COLUMN, &record.body, config.body_mode())?.into(),
    );

    let mut binary_headers: BTreeMap<&str, &Value> = BTreeMap::new();
    for (name, value) in &record.headers {
        match config.header_mode(name) {
            EncodingMode::Text => {
                let field = codec::encode(name, value, EncodingMode::Text)?;
                row.insert(name.clone(), field.into());
            }
            EncodingMode::Binary => {
                binary_headers.insert(name, value);
            }
        }
    }
    row.insert(
        HEADERS_COLUMN.to_string(),
        Column::Binary(codec::encode_binary(HEADERS_COLUMN, &binary_headers)?),
    );

    Ok(row)
}

pub(crate) fn decode_record(
    row: &Row,
    config: &AggregationConfig,
) -> Result<AggregationRecord, RepositoryError> {
    let body = codec::decode(BODY_COLUMN, &field(row, BODY_COLUMN)?, config.body_mode())?;

    let headers_field = field(row, HEADERS_COLUMN)?;
    let headers_bytes = match &headers_field {
        codec::EncodedField::Binary(bytes) => bytes,
        codec::EncodedField::Text(_) => {
            return Err(RepositoryError::CodecMismatch {
                field: HEADERS_COLUMN.to_string(),
                stored: EncodingMode::Text,
                configured: EncodingMode::Binary,
            })
        }
    };
    let mut headers: BTreeMap<String, Value> =
        codec::decode_binary(HEADERS_COLUMN, headers_bytes)?;

    if let Some(name) = headers
        .keys()
        .find(|name| config.header_mode(name) == EncodingMode::Text)
    {
        return Err(RepositoryError::CodecMismatch {
            field: name.clone(),
            stored: EncodingMode::Binary,
            configured: EncodingMode::Text,
        });
    }

    for (name, column) in row {
        if RESERVED_COLUMNS.contains(&name.as_str()) {
            continue;
        }
        let encoded = column
            .to_encoded()
            .ok_or_else(|| RepositoryError::codec(name.as_str(), "integer column is not a header"))?;
        let value = codec::decode(name, &encoded, config.header_mode(name))?;
        headers.insert(name.clone(), value);
    }

    Ok(AggregationRecord { body, headers })
}

fn field(row: &Row, name: &str) -> Result<codec::EncodedField, RepositoryError> {
    row.get(name)
        .and_then(Column::to_encoded)
        .ok_or_else(|| RepositoryError::codec(name, "column missing"))
}
