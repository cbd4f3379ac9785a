//! SET service PDUs
//!
//! Values that do not fit in one PDU are written with
//! SET-Request-With-First-Datablock followed by SET-Request-With-Datablock,
//! each acknowledged by SET-Response-Datablock until the last one.

use crate::pdu::{CosemAttributeDescriptor, InvokeIdAndPriority, SelectiveAccessDescriptor};
use bytes::Bytes;
use dlms_asn1::{AxdrDecoder, AxdrEncoder};
use dlms_core::{DataAccessResult, DataObject, DlmsError, DlmsResult};

const REQUEST_NORMAL: u8 = 0x01;
const REQUEST_WITH_FIRST_DATA_BLOCK: u8 = 0x02;
const REQUEST_WITH_DATA_BLOCK: u8 = 0x03;
const RESPONSE_NORMAL: u8 = 0x01;
const RESPONSE_DATA_BLOCK: u8 = 0x02;
const RESPONSE_LAST_DATA_BLOCK: u8 = 0x03;

/// DataBlock-SA: one chunk of an A-XDR encoded value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    pub last_block: bool,
    pub block_number: u32,
    pub raw_data: Bytes,
}

impl DataBlock {
    pub fn encode(&self, encoder: &mut AxdrEncoder) {
        encoder.put_bool(self.last_block);
        encoder.put_u32(self.block_number);
        encoder.put_octet_string(&self.raw_data);
    }

    pub fn decode(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        Ok(Self {
            last_block: decoder.take_bool()?,
            block_number: decoder.take_u32()?,
            raw_data: Bytes::copy_from_slice(decoder.take_octet_string()?),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetRequest {
    Normal {
        invoke: InvokeIdAndPriority,
        attribute: CosemAttributeDescriptor,
        access: Option<SelectiveAccessDescriptor>,
        value: DataObject,
    },
    WithFirstDataBlock {
        invoke: InvokeIdAndPriority,
        attribute: CosemAttributeDescriptor,
        access: Option<SelectiveAccessDescriptor>,
        block: DataBlock,
    },
    WithDataBlock {
        invoke: InvokeIdAndPriority,
        block: DataBlock,
    },
}

impl SetRequest {
    pub fn invoke(&self) -> InvokeIdAndPriority {
        match self {
            SetRequest::Normal { invoke, .. }
            | SetRequest::WithFirstDataBlock { invoke, .. }
            | SetRequest::WithDataBlock { invoke, .. } => *invoke,
        }
    }

    pub fn encode(&self, encoder: &mut AxdrEncoder) {
        match self {
            SetRequest::Normal {
                invoke,
                attribute,
                access,
                value,
            } => {
                encoder.put_u8(REQUEST_NORMAL);
                encoder.put_u8(invoke.to_byte());
                attribute.encode(encoder);
                SelectiveAccessDescriptor::encode_optional(access.as_ref(), encoder);
                encoder.encode_data_object(value);
            }
            SetRequest::WithFirstDataBlock {
                invoke,
                attribute,
                access,
                block,
            } => {
                encoder.put_u8(REQUEST_WITH_FIRST_DATA_BLOCK);
                encoder.put_u8(invoke.to_byte());
                attribute.encode(encoder);
                SelectiveAccessDescriptor::encode_optional(access.as_ref(), encoder);
                block.encode(encoder);
            }
            SetRequest::WithDataBlock { invoke, block } => {
                encoder.put_u8(REQUEST_WITH_DATA_BLOCK);
                encoder.put_u8(invoke.to_byte());
                block.encode(encoder);
            }
        }
    }

    pub fn decode(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let choice = decoder.take_u8()?;
        let invoke = InvokeIdAndPriority::from_byte(decoder.take_u8()?);
        match choice {
            REQUEST_NORMAL => Ok(SetRequest::Normal {
                invoke,
                attribute: CosemAttributeDescriptor::decode(decoder)?,
                access: SelectiveAccessDescriptor::decode_optional(decoder)?,
                value: decoder.decode_data_object()?,
            }),
            REQUEST_WITH_FIRST_DATA_BLOCK => Ok(SetRequest::WithFirstDataBlock {
                invoke,
                attribute: CosemAttributeDescriptor::decode(decoder)?,
                access: SelectiveAccessDescriptor::decode_optional(decoder)?,
                block: DataBlock::decode(decoder)?,
            }),
            REQUEST_WITH_DATA_BLOCK => Ok(SetRequest::WithDataBlock {
                invoke,
                block: DataBlock::decode(decoder)?,
            }),
            other => Err(DlmsError::Protocol(format!(
                "Unsupported SET-Request choice {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetResponse {
    Normal {
        invoke: InvokeIdAndPriority,
        result: DataAccessResult,
    },
    /// Acknowledges block `block_number`, more expected
    DataBlock {
        invoke: InvokeIdAndPriority,
        block_number: u32,
    },
    LastDataBlock {
        invoke: InvokeIdAndPriority,
        result: DataAccessResult,
        block_number: u32,
    },
}

impl SetResponse {
    pub fn invoke(&self) -> InvokeIdAndPriority {
        match self {
            SetResponse::Normal { invoke, .. }
            | SetResponse::DataBlock { invoke, .. }
            | SetResponse::LastDataBlock { invoke, .. } => *invoke,
        }
    }

    pub fn encode(&self, encoder: &mut AxdrEncoder) {
        match self {
            SetResponse::Normal { invoke, result } => {
                encoder.put_u8(RESPONSE_NORMAL);
                encoder.put_u8(invoke.to_byte());
                encoder.put_u8(result.to_u8());
            }
            SetResponse::DataBlock {
                invoke,
                block_number,
            } => {
                encoder.put_u8(RESPONSE_DATA_BLOCK);
                encoder.put_u8(invoke.to_byte());
                encoder.put_u32(*block_number);
            }
            SetResponse::LastDataBlock {
                invoke,
                result,
                block_number,
            } => {
                encoder.put_u8(RESPONSE_LAST_DATA_BLOCK);
                encoder.put_u8(invoke.to_byte());
                encoder.put_u8(result.to_u8());
                encoder.put_u32(*block_number);
            }
        }
    }

    pub fn decode(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let choice = decoder.take_u8()?;
        let invoke = InvokeIdAndPriority::from_byte(decoder.take_u8()?);
        match choice {
            RESPONSE_NORMAL => Ok(SetResponse::Normal {
                invoke,
                result: DataAccessResult::from_u8(decoder.take_u8()?),
            }),
            RESPONSE_DATA_BLOCK => Ok(SetResponse::DataBlock {
                invoke,
                block_number: decoder.take_u32()?,
            }),
            RESPONSE_LAST_DATA_BLOCK => Ok(SetResponse::LastDataBlock {
                invoke,
                result: DataAccessResult::from_u8(decoder.take_u8()?),
                block_number: decoder.take_u32()?,
            }),
            other => Err(DlmsError::Protocol(format!(
                "Unsupported SET-Response choice {}",
                other
            ))),
        }
    }
}
