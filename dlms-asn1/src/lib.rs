//! A-XDR processing for DLMS/COSEM
//!
//! xDLMS PDUs carry their fields in A-XDR: fixed-width big-endian integers,
//! length-prefixed strings, and tagged `Data` values. This crate provides the
//! encoder and decoder used by the application layer.

pub mod axdr;

pub use axdr::{decode_data, encode_data, AxdrDecoder, AxdrEncoder, AxdrTag};
