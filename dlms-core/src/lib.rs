//! Core types and utilities for DLMS/COSEM protocol
//!
//! This crate provides fundamental types, error handling, and utilities
//! used throughout the DLMS/COSEM implementation: the shared error
//! taxonomy, OBIS addressing, the `DataObject` value model and the
//! data-access result codes returned by a meter.

pub mod error;
pub mod obis_code;
pub mod datatypes;
pub mod result_code;

pub use error::{ChecksumKind, DlmsError, DlmsResult};
pub use obis_code::ObisCode;
pub use datatypes::{CosemDateTime, CosemTime, DataObject, DataObjectType};
pub use result_code::DataAccessResult;
