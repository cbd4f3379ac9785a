//! HDLC address types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved HDLC addresses
pub mod reserved {
    /// Guaranteed to be received by no one
    pub const NO_STATION: u8 = 0x00;

    /// Client management process
    pub const CLIENT_MANAGEMENT_PROCESS: u8 = 0x01;

    /// Client public client
    pub const CLIENT_PUBLIC_CLIENT: u8 = 0x10;

    /// All stations (broadcast)
    pub const ALL_STATION: u8 = 0x7F;
}

/// A station address as an upper/lower byte pair
///
/// Every frame carries two of these: destination first, then source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HdlcAddress {
    pub upper: u8,
    pub lower: u8,
}

impl HdlcAddress {
    pub const fn new(upper: u8, lower: u8) -> Self {
        Self { upper, lower }
    }

    pub fn to_bytes(self) -> [u8; 2] {
        [self.upper, self.lower]
    }

    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self {
            upper: bytes[0],
            lower: bytes[1],
        }
    }

    pub fn is_all_station(&self) -> bool {
        self.upper == reserved::ALL_STATION
    }

    pub fn is_no_station(&self) -> bool {
        self.upper == reserved::NO_STATION && self.lower == reserved::NO_STATION
    }
}

impl fmt::Display for HdlcAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.upper, self.lower)
    }
}
