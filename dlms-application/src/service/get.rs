//! GET service PDUs
//!
//! Supports GET-Request-Normal (with optional selective access),
//! GET-Request-Next for block transfer, and the matching Normal and
//! WithDataBlock responses.

use crate::pdu::{CosemAttributeDescriptor, InvokeIdAndPriority, SelectiveAccessDescriptor};
use bytes::Bytes;
use dlms_asn1::{AxdrDecoder, AxdrEncoder};
use dlms_core::{DataAccessResult, DataObject, DlmsError, DlmsResult};

const REQUEST_NORMAL: u8 = 0x01;
const REQUEST_NEXT: u8 = 0x02;
const RESPONSE_NORMAL: u8 = 0x01;
const RESPONSE_WITH_DATA_BLOCK: u8 = 0x02;

const RESULT_DATA: u8 = 0x00;
const RESULT_ACCESS_ERROR: u8 = 0x01;

/// Get-Data-Result: either the attribute value or a data access result
#[derive(Debug, Clone, PartialEq)]
pub enum GetDataResult {
    Data(DataObject),
    Error(DataAccessResult),
}

impl GetDataResult {
    pub fn encode(&self, encoder: &mut AxdrEncoder) {
        match self {
            GetDataResult::Data(value) => {
                encoder.put_u8(RESULT_DATA);
                encoder.encode_data_object(value);
            }
            GetDataResult::Error(result) => {
                encoder.put_u8(RESULT_ACCESS_ERROR);
                encoder.put_u8(result.to_u8());
            }
        }
    }

    pub fn decode(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        match decoder.take_u8()? {
            RESULT_DATA => Ok(GetDataResult::Data(decoder.decode_data_object()?)),
            RESULT_ACCESS_ERROR => Ok(GetDataResult::Error(DataAccessResult::from_u8(
                decoder.take_u8()?,
            ))),
            other => Err(DlmsError::InvalidData(format!(
                "Invalid Get-Data-Result choice {}",
                other
            ))),
        }
    }

    /// The value, or the verbatim data access result as an error
    pub fn into_result(self) -> DlmsResult<DataObject> {
        match self {
            GetDataResult::Data(value) => Ok(value),
            GetDataResult::Error(result) => Err(DlmsError::DataAccess(result)),
        }
    }
}

/// Block payload of a GET-Response-With-Datablock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockData {
    Raw(Bytes),
    Error(DataAccessResult),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GetRequest {
    Normal {
        invoke: InvokeIdAndPriority,
        attribute: CosemAttributeDescriptor,
        access: Option<SelectiveAccessDescriptor>,
    },
    /// Ask for the block after `block_number`
    Next {
        invoke: InvokeIdAndPriority,
        block_number: u32,
    },
}

impl GetRequest {
    pub fn invoke(&self) -> InvokeIdAndPriority {
        match self {
            GetRequest::Normal { invoke, .. } | GetRequest::Next { invoke, .. } => *invoke,
        }
    }

    pub fn encode(&self, encoder: &mut AxdrEncoder) {
        match self {
            GetRequest::Normal {
                invoke,
                attribute,
                access,
            } => {
                encoder.put_u8(REQUEST_NORMAL);
                encoder.put_u8(invoke.to_byte());
                attribute.encode(encoder);
                SelectiveAccessDescriptor::encode_optional(access.as_ref(), encoder);
            }
            GetRequest::Next {
                invoke,
                block_number,
            } => {
                encoder.put_u8(REQUEST_NEXT);
                encoder.put_u8(invoke.to_byte());
                encoder.put_u32(*block_number);
            }
        }
    }

    pub fn decode(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let choice = decoder.take_u8()?;
        let invoke = InvokeIdAndPriority::from_byte(decoder.take_u8()?);
        match choice {
            REQUEST_NORMAL => Ok(GetRequest::Normal {
                invoke,
                attribute: CosemAttributeDescriptor::decode(decoder)?,
                access: SelectiveAccessDescriptor::decode_optional(decoder)?,
            }),
            REQUEST_NEXT => Ok(GetRequest::Next {
                invoke,
                block_number: decoder.take_u32()?,
            }),
            other => Err(DlmsError::Protocol(format!(
                "Unsupported GET-Request choice {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GetResponse {
    Normal {
        invoke: InvokeIdAndPriority,
        result: GetDataResult,
    },
    WithDataBlock {
        invoke: InvokeIdAndPriority,
        last_block: bool,
        block_number: u32,
        result: BlockData,
    },
}

impl GetResponse {
    pub fn invoke(&self) -> InvokeIdAndPriority {
        match self {
            GetResponse::Normal { invoke, .. } | GetResponse::WithDataBlock { invoke, .. } => {
                *invoke
            }
        }
    }

    pub fn encode(&self, encoder: &mut AxdrEncoder) {
        match self {
            GetResponse::Normal { invoke, result } => {
                encoder.put_u8(RESPONSE_NORMAL);
                encoder.put_u8(invoke.to_byte());
                result.encode(encoder);
            }
            GetResponse::WithDataBlock {
                invoke,
                last_block,
                block_number,
                result,
            } => {
                encoder.put_u8(RESPONSE_WITH_DATA_BLOCK);
                encoder.put_u8(invoke.to_byte());
                encoder.put_bool(*last_block);
                encoder.put_u32(*block_number);
                match result {
                    BlockData::Raw(raw) => {
                        encoder.put_u8(RESULT_DATA);
                        encoder.put_octet_string(raw);
                    }
                    BlockData::Error(code) => {
                        encoder.put_u8(RESULT_ACCESS_ERROR);
                        encoder.put_u8(code.to_u8());
                    }
                }
            }
        }
    }

    pub fn decode(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let choice = decoder.take_u8()?;
        let invoke = InvokeIdAndPriority::from_byte(decoder.take_u8()?);
        match choice {
            RESPONSE_NORMAL => Ok(GetResponse::Normal {
                invoke,
                result: GetDataResult::decode(decoder)?,
            }),
            RESPONSE_WITH_DATA_BLOCK => {
                let last_block = decoder.take_bool()?;
                let block_number = decoder.take_u32()?;
                let result = match decoder.take_u8()? {
                    RESULT_DATA => {
                        BlockData::Raw(Bytes::copy_from_slice(decoder.take_octet_string()?))
                    }
                    RESULT_ACCESS_ERROR => {
                        BlockData::Error(DataAccessResult::from_u8(decoder.take_u8()?))
                    }
                    other => {
                        return Err(DlmsError::InvalidData(format!(
                            "Invalid DataBlock-G result choice {}",
                            other
                        )))
                    }
                };
                Ok(GetResponse::WithDataBlock {
                    invoke,
                    last_block,
                    block_number,
                    result,
                })
            }
            other => Err(DlmsError::Protocol(format!(
                "Unsupported GET-Response choice {}",
                other
            ))),
        }
    }
}
