//! xDLMS application layer for DLMS/COSEM
//!
//! - [`pdu`]: invoke-id-and-priority, attribute/method descriptors, selective
//!   access, conformance block, Initiate request/response
//! - [`service`]: GET, SET, ACTION and EVENT-NOTIFICATION PDUs
//! - [`xdlms`]: tagged APDU encoding and decoding
//! - [`block`]: block transfer split and reassembly
//! - [`layer`]: the client [`ApplicationLayer`] correlating requests and
//!   responses by invoke id

pub mod block;
pub mod config;
pub mod layer;
pub mod pdu;
pub mod service;
pub mod xdlms;

pub use block::{BlockAssembler, split_blocks};
pub use config::ApplicationConfig;
pub use layer::{ApplicationChannels, ApplicationEvent, ApplicationLayer};
pub use pdu::{
    Conformance, CosemAttributeDescriptor, CosemMethodDescriptor, InitiateRequest,
    InitiateResponse, InvokeIdAndPriority, Priority, SelectiveAccessDescriptor,
};
pub use service::*;
pub use xdlms::XdlmsPdu;
