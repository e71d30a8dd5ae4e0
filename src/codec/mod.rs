//! Per-field value codec.
//!
//! A field is stored either as readable text or as a bitcode blob. The mode is
//! chosen from configuration when writing and checked against configuration
//! when reading; a disagreement is a [`RepositoryError::CodecMismatch`].
//!
//! [`RepositoryError::CodecMismatch`]: crate::RepositoryError::CodecMismatch

mod field;
mod value;

pub use field::{decode, decode_binary, encode, encode_binary, EncodedField, EncodingMode};
pub use value::Value;
