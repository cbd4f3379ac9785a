//! A-XDR types for DLMS/COSEM

use dlms_core::{DlmsError, DlmsResult};

/// A-XDR tag values for `Data` choices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxdrTag {
    Null = 0x00,
    Array = 0x01,
    Structure = 0x02,
    Boolean = 0x03,
    Integer32 = 0x05,
    Unsigned32 = 0x06,
    OctetString = 0x09,
    VisibleString = 0x0A,
    Utf8String = 0x0C,
    Integer8 = 0x0F,
    Integer16 = 0x10,
    Unsigned8 = 0x11,
    Unsigned16 = 0x12,
    Integer64 = 0x14,
    Unsigned64 = 0x15,
    Enumerate = 0x16,
    Float32 = 0x17,
    Float64 = 0x18,
    DateTime = 0x19,
    Time = 0x1B,
}

impl AxdrTag {
    /// Get tag from u8 value
    pub fn from_u8(value: u8) -> DlmsResult<Self> {
        let tag = match value {
            0x00 => AxdrTag::Null,
            0x01 => AxdrTag::Array,
            0x02 => AxdrTag::Structure,
            0x03 => AxdrTag::Boolean,
            0x05 => AxdrTag::Integer32,
            0x06 => AxdrTag::Unsigned32,
            0x09 => AxdrTag::OctetString,
            0x0A => AxdrTag::VisibleString,
            0x0C => AxdrTag::Utf8String,
            0x0F => AxdrTag::Integer8,
            0x10 => AxdrTag::Integer16,
            0x11 => AxdrTag::Unsigned8,
            0x12 => AxdrTag::Unsigned16,
            0x14 => AxdrTag::Integer64,
            0x15 => AxdrTag::Unsigned64,
            0x16 => AxdrTag::Enumerate,
            0x17 => AxdrTag::Float32,
            0x18 => AxdrTag::Float64,
            0x19 => AxdrTag::DateTime,
            0x1B => AxdrTag::Time,
            _ => {
                return Err(DlmsError::InvalidData(format!(
                    "Unknown A-XDR tag: 0x{:02X}",
                    value
                )))
            }
        };
        Ok(tag)
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Largest length the decoder accepts (length-of-length up to 4 octets)
pub const MAX_LENGTH_OCTETS: usize = 4;
