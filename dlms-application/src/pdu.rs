//! Common xDLMS PDU fields
//!
//! Building blocks shared by the service PDUs: the invoke-id-and-priority
//! byte, COSEM attribute/method descriptors, selective access, the
//! conformance block and the Initiate request/response exchanged when an
//! association is set up.

use dlms_asn1::{AxdrDecoder, AxdrEncoder};
use dlms_core::{DataObject, DlmsError, DlmsResult, ObisCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr};

/// DLMS protocol version proposed in Initiate requests
pub const DLMS_VERSION_6: u8 = 6;

/// Largest PDU size expressible in an Initiate request
pub const MAX_PDU_SIZE: u16 = 65535;

/// VAA name returned by a logical-name referencing server
pub const LN_VAA_NAME: u16 = 0x0007;

/// Highest invoke id; ids cycle 1..=15
pub const MAX_INVOKE_ID: u8 = 15;

const INVOKE_ID_MASK: u8 = 0x0F;
const CONFIRMED_BIT: u8 = 0x40;
const PRIORITY_BIT: u8 = 0x80;

/// Service priority carried in the invoke-id-and-priority byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

/// Invoke-Id-And-Priority byte
///
/// Bits 0-3 carry the invoke id, bit 6 marks a confirmed service and bit 7
/// requests high priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvokeIdAndPriority(u8);

impl InvokeIdAndPriority {
    /// Confirmed service with the given id
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if `invoke_id` does not fit in 4 bits
    pub fn new(invoke_id: u8, priority: Priority) -> DlmsResult<Self> {
        if invoke_id > MAX_INVOKE_ID {
            return Err(DlmsError::InvalidData(format!(
                "Invoke id must be 0-{}, got {}",
                MAX_INVOKE_ID, invoke_id
            )));
        }
        let mut byte = invoke_id | CONFIRMED_BIT;
        if priority == Priority::High {
            byte |= PRIORITY_BIT;
        }
        Ok(Self(byte))
    }

    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    pub fn to_byte(self) -> u8 {
        self.0
    }

    pub fn invoke_id(self) -> u8 {
        self.0 & INVOKE_ID_MASK
    }

    pub fn is_confirmed(self) -> bool {
        self.0 & CONFIRMED_BIT != 0
    }

    pub fn priority(self) -> Priority {
        if self.0 & PRIORITY_BIT != 0 {
            Priority::High
        } else {
            Priority::Normal
        }
    }
}

/// Reference to one attribute of a COSEM object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CosemAttributeDescriptor {
    pub class_id: u16,
    pub logical_name: ObisCode,
    pub attribute_id: i8,
}

impl CosemAttributeDescriptor {
    pub fn new(class_id: u16, logical_name: ObisCode, attribute_id: i8) -> Self {
        Self {
            class_id,
            logical_name,
            attribute_id,
        }
    }

    pub fn encode(&self, encoder: &mut AxdrEncoder) {
        encoder.put_u16(self.class_id);
        encoder.put_bytes(self.logical_name.as_bytes());
        encoder.put_u8(self.attribute_id as u8);
    }

    pub fn decode(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let class_id = decoder.take_u16()?;
        let logical_name = ObisCode::from_bytes(decoder.take(ObisCode::LENGTH)?)?;
        let attribute_id = decoder.take_u8()? as i8;
        Ok(Self::new(class_id, logical_name, attribute_id))
    }
}

impl fmt::Display for CosemAttributeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/attr {}", self.class_id, self.logical_name, self.attribute_id)
    }
}

/// Reference to one method of a COSEM object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CosemMethodDescriptor {
    pub class_id: u16,
    pub logical_name: ObisCode,
    pub method_id: i8,
}

impl CosemMethodDescriptor {
    pub fn new(class_id: u16, logical_name: ObisCode, method_id: i8) -> Self {
        Self {
            class_id,
            logical_name,
            method_id,
        }
    }

    pub fn encode(&self, encoder: &mut AxdrEncoder) {
        encoder.put_u16(self.class_id);
        encoder.put_bytes(self.logical_name.as_bytes());
        encoder.put_u8(self.method_id as u8);
    }

    pub fn decode(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let class_id = decoder.take_u16()?;
        let logical_name = ObisCode::from_bytes(decoder.take(ObisCode::LENGTH)?)?;
        let method_id = decoder.take_u8()? as i8;
        Ok(Self::new(class_id, logical_name, method_id))
    }
}

impl fmt::Display for CosemMethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/method {}", self.class_id, self.logical_name, self.method_id)
    }
}

/// Selective access: selector plus selector-specific parameters
///
/// Selector 1 is range access, selector 2 entry access on profile objects.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectiveAccessDescriptor {
    pub selector: u8,
    pub parameters: DataObject,
}

impl SelectiveAccessDescriptor {
    pub fn new(selector: u8, parameters: DataObject) -> Self {
        Self {
            selector,
            parameters,
        }
    }

    /// Encode an optional descriptor: a presence flag, then selector and parameters
    pub fn encode_optional(access: Option<&Self>, encoder: &mut AxdrEncoder) {
        match access {
            Some(access) => {
                encoder.put_u8(0x01);
                encoder.put_u8(access.selector);
                encoder.encode_data_object(&access.parameters);
            }
            None => encoder.put_u8(0x00),
        }
    }

    pub fn decode_optional(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Option<Self>> {
        if !decoder.take_bool()? {
            return Ok(None);
        }
        let selector = decoder.take_u8()?;
        let parameters = decoder.decode_data_object()?;
        Ok(Some(Self::new(selector, parameters)))
    }
}

/// 24-bit conformance block
///
/// Bit constants follow the conformance bit-string numbering, where bit 0
/// is the most significant bit of the first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Conformance(u32);

impl Conformance {
    pub const GENERAL_PROTECTION: Self = Self::bit(1);
    pub const GENERAL_BLOCK_TRANSFER: Self = Self::bit(2);
    pub const ATTRIBUTE0_SUPPORTED_WITH_SET: Self = Self::bit(8);
    pub const PRIORITY_MGMT_SUPPORTED: Self = Self::bit(9);
    pub const ATTRIBUTE0_SUPPORTED_WITH_GET: Self = Self::bit(10);
    pub const BLOCK_TRANSFER_WITH_GET: Self = Self::bit(11);
    pub const BLOCK_TRANSFER_WITH_SET: Self = Self::bit(12);
    pub const BLOCK_TRANSFER_WITH_ACTION: Self = Self::bit(13);
    pub const MULTIPLE_REFERENCES: Self = Self::bit(14);
    pub const DATA_NOTIFICATION: Self = Self::bit(16);
    pub const ACCESS: Self = Self::bit(17);
    pub const PARAMETERIZED_ACCESS: Self = Self::bit(18);
    pub const GET: Self = Self::bit(19);
    pub const SET: Self = Self::bit(20);
    pub const SELECTIVE_ACCESS: Self = Self::bit(21);
    pub const EVENT_NOTIFICATION: Self = Self::bit(22);
    pub const ACTION: Self = Self::bit(23);

    const MASK: u32 = 0x00FF_FFFF;
    /// BER tag `[APPLICATION 31]` with length 4 and zero unused bits
    const TAG: [u8; 4] = [0x5F, 0x1F, 0x04, 0x00];

    const fn bit(n: u32) -> Self {
        Self(1 << (23 - n))
    }

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::MASK)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn encode(self, encoder: &mut AxdrEncoder) {
        encoder.put_bytes(&Self::TAG);
        encoder.put_bytes(&self.0.to_be_bytes()[1..]);
    }

    pub fn decode(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let tag = decoder.take(Self::TAG.len())?;
        if tag != Self::TAG {
            return Err(DlmsError::InvalidData(format!(
                "Invalid conformance block header {:02X?}",
                tag
            )));
        }
        let b = decoder.take(3)?;
        Ok(Self(u32::from_be_bytes([0, b[0], b[1], b[2]])))
    }
}

impl BitOr for Conformance {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for Conformance {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for Conformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06X}", self.0)
    }
}

/// xDLMS InitiateRequest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateRequest {
    pub dedicated_key: Option<Vec<u8>>,
    pub response_allowed: bool,
    pub proposed_quality_of_service: Option<u8>,
    pub proposed_dlms_version_number: u8,
    pub proposed_conformance: Conformance,
    pub client_max_receive_pdu_size: u16,
}

impl InitiateRequest {
    pub fn new(proposed_conformance: Conformance, client_max_receive_pdu_size: u16) -> Self {
        Self {
            dedicated_key: None,
            response_allowed: true,
            proposed_quality_of_service: None,
            proposed_dlms_version_number: DLMS_VERSION_6,
            proposed_conformance,
            client_max_receive_pdu_size,
        }
    }

    /// Encode the body (after the 0x01 tag)
    ///
    /// `response-allowed` defaults to TRUE and is only encoded when false.
    pub fn encode(&self, encoder: &mut AxdrEncoder) {
        match &self.dedicated_key {
            Some(key) => {
                encoder.put_u8(0x01);
                encoder.put_octet_string(key);
            }
            None => encoder.put_u8(0x00),
        }
        if self.response_allowed {
            encoder.put_u8(0x00);
        } else {
            encoder.put_u8(0x01);
            encoder.put_bool(false);
        }
        match self.proposed_quality_of_service {
            Some(qos) => {
                encoder.put_u8(0x01);
                encoder.put_u8(qos);
            }
            None => encoder.put_u8(0x00),
        }
        encoder.put_u8(self.proposed_dlms_version_number);
        self.proposed_conformance.encode(encoder);
        encoder.put_u16(self.client_max_receive_pdu_size);
    }

    pub fn decode(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let dedicated_key = if decoder.take_bool()? {
            Some(decoder.take_octet_string()?.to_vec())
        } else {
            None
        };
        let response_allowed = if decoder.take_bool()? {
            decoder.take_bool()?
        } else {
            true
        };
        let proposed_quality_of_service = if decoder.take_bool()? {
            Some(decoder.take_u8()?)
        } else {
            None
        };
        let proposed_dlms_version_number = decoder.take_u8()?;
        let proposed_conformance = Conformance::decode(decoder)?;
        let client_max_receive_pdu_size = decoder.take_u16()?;
        Ok(Self {
            dedicated_key,
            response_allowed,
            proposed_quality_of_service,
            proposed_dlms_version_number,
            proposed_conformance,
            client_max_receive_pdu_size,
        })
    }
}

/// xDLMS InitiateResponse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateResponse {
    pub negotiated_quality_of_service: Option<u8>,
    pub negotiated_dlms_version_number: u8,
    pub negotiated_conformance: Conformance,
    pub server_max_receive_pdu_size: u16,
    pub vaa_name: u16,
}

impl InitiateResponse {
    pub fn new(negotiated_conformance: Conformance, server_max_receive_pdu_size: u16) -> Self {
        Self {
            negotiated_quality_of_service: None,
            negotiated_dlms_version_number: DLMS_VERSION_6,
            negotiated_conformance,
            server_max_receive_pdu_size,
            vaa_name: LN_VAA_NAME,
        }
    }

    pub fn encode(&self, encoder: &mut AxdrEncoder) {
        match self.negotiated_quality_of_service {
            Some(qos) => {
                encoder.put_u8(0x01);
                encoder.put_u8(qos);
            }
            None => encoder.put_u8(0x00),
        }
        encoder.put_u8(self.negotiated_dlms_version_number);
        self.negotiated_conformance.encode(encoder);
        encoder.put_u16(self.server_max_receive_pdu_size);
        encoder.put_u16(self.vaa_name);
    }

    pub fn decode(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let negotiated_quality_of_service = if decoder.take_bool()? {
            Some(decoder.take_u8()?)
        } else {
            None
        };
        Ok(Self {
            negotiated_quality_of_service,
            negotiated_dlms_version_number: decoder.take_u8()?,
            negotiated_conformance: Conformance::decode(decoder)?,
            server_max_receive_pdu_size: decoder.take_u16()?,
            vaa_name: decoder.take_u16()?,
        })
    }
}
