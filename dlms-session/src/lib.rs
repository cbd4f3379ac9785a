//! Session layer for the DLMS/COSEM protocol
//!
//! Provides the HDLC data link used between a client and a meter:
//!
//! - [x] Frame encoding/decoding with byte stuffing
//! - [x] HCS and FCS (CRC-16/X.25) verification
//! - [x] SNRM/UA link establishment with parameter negotiation
//! - [x] DISC/UA and DM link release
//! - [x] Sliding send window with go-back-N retransmission on REJ
//! - [x] Segmentation and reassembly of long information fields
//! - [x] Response, inter-frame and inactivity timeouts
//! - [x] Link statistics

pub mod hdlc;

pub use hdlc::*;
