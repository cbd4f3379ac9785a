//! Data types used in DLMS/COSEM protocol

pub mod data_object;
pub mod date_time;

pub use data_object::{DataObject, DataObjectType};
pub use date_time::{CosemDateTime, CosemTime};
