//! xDLMS service PDUs: GET, SET, ACTION and EVENT-NOTIFICATION
//!
//! Each type encodes and decodes its body after the service tag byte;
//! [`crate::xdlms::XdlmsPdu`] adds the tag.

pub mod action;
pub mod event;
pub mod get;
pub mod set;

pub use action::{ActionRequest, ActionResponse};
pub use event::EventNotification;
pub use get::{BlockData, GetDataResult, GetRequest, GetResponse};
pub use set::{DataBlock, SetRequest, SetResponse};
