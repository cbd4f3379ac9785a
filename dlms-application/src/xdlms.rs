//! Tagged xDLMS APDUs
//!
//! [`XdlmsPdu`] is the unit handed to and received from the link layer:
//! a service tag byte followed by the service body.

use crate::pdu::{InitiateRequest, InitiateResponse};
use crate::service::{
    ActionRequest, ActionResponse, EventNotification, GetRequest, GetResponse, SetRequest,
    SetResponse,
};
use bytes::Bytes;
use dlms_asn1::{AxdrDecoder, AxdrEncoder};
use dlms_core::{DlmsError, DlmsResult};

/// Service tag bytes
pub mod tag {
    pub const INITIATE_REQUEST: u8 = 0x01;
    pub const INITIATE_RESPONSE: u8 = 0x08;
    pub const GET_REQUEST: u8 = 0xC0;
    pub const SET_REQUEST: u8 = 0xC1;
    pub const EVENT_NOTIFICATION_REQUEST: u8 = 0xC2;
    pub const ACTION_REQUEST: u8 = 0xC3;
    pub const GET_RESPONSE: u8 = 0xC4;
    pub const SET_RESPONSE: u8 = 0xC5;
    pub const ACTION_RESPONSE: u8 = 0xC7;
}

#[derive(Debug, Clone, PartialEq)]
pub enum XdlmsPdu {
    InitiateRequest(InitiateRequest),
    InitiateResponse(InitiateResponse),
    GetRequest(GetRequest),
    GetResponse(GetResponse),
    SetRequest(SetRequest),
    SetResponse(SetResponse),
    ActionRequest(ActionRequest),
    ActionResponse(ActionResponse),
    EventNotification(EventNotification),
}

impl XdlmsPdu {
    pub fn tag(&self) -> u8 {
        match self {
            XdlmsPdu::InitiateRequest(_) => tag::INITIATE_REQUEST,
            XdlmsPdu::InitiateResponse(_) => tag::INITIATE_RESPONSE,
            XdlmsPdu::GetRequest(_) => tag::GET_REQUEST,
            XdlmsPdu::GetResponse(_) => tag::GET_RESPONSE,
            XdlmsPdu::SetRequest(_) => tag::SET_REQUEST,
            XdlmsPdu::SetResponse(_) => tag::SET_RESPONSE,
            XdlmsPdu::ActionRequest(_) => tag::ACTION_REQUEST,
            XdlmsPdu::ActionResponse(_) => tag::ACTION_RESPONSE,
            XdlmsPdu::EventNotification(_) => tag::EVENT_NOTIFICATION_REQUEST,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            XdlmsPdu::InitiateRequest(_) => "InitiateRequest",
            XdlmsPdu::InitiateResponse(_) => "InitiateResponse",
            XdlmsPdu::GetRequest(_) => "GET-Request",
            XdlmsPdu::GetResponse(_) => "GET-Response",
            XdlmsPdu::SetRequest(_) => "SET-Request",
            XdlmsPdu::SetResponse(_) => "SET-Response",
            XdlmsPdu::ActionRequest(_) => "ACTION-Request",
            XdlmsPdu::ActionResponse(_) => "ACTION-Response",
            XdlmsPdu::EventNotification(_) => "EVENT-NOTIFICATION-Request",
        }
    }

    /// Invoke id of a confirmed service PDU
    pub fn invoke_id(&self) -> Option<u8> {
        let invoke = match self {
            XdlmsPdu::GetRequest(pdu) => pdu.invoke(),
            XdlmsPdu::GetResponse(pdu) => pdu.invoke(),
            XdlmsPdu::SetRequest(pdu) => pdu.invoke(),
            XdlmsPdu::SetResponse(pdu) => pdu.invoke(),
            XdlmsPdu::ActionRequest(pdu) => pdu.invoke,
            XdlmsPdu::ActionResponse(pdu) => pdu.invoke,
            XdlmsPdu::InitiateRequest(_)
            | XdlmsPdu::InitiateResponse(_)
            | XdlmsPdu::EventNotification(_) => return None,
        };
        Some(invoke.invoke_id())
    }

    pub fn encode(&self) -> Bytes {
        let mut encoder = AxdrEncoder::new();
        encoder.put_u8(self.tag());
        match self {
            XdlmsPdu::InitiateRequest(pdu) => pdu.encode(&mut encoder),
            XdlmsPdu::InitiateResponse(pdu) => pdu.encode(&mut encoder),
            XdlmsPdu::GetRequest(pdu) => pdu.encode(&mut encoder),
            XdlmsPdu::GetResponse(pdu) => pdu.encode(&mut encoder),
            XdlmsPdu::SetRequest(pdu) => pdu.encode(&mut encoder),
            XdlmsPdu::SetResponse(pdu) => pdu.encode(&mut encoder),
            XdlmsPdu::ActionRequest(pdu) => pdu.encode(&mut encoder),
            XdlmsPdu::ActionResponse(pdu) => pdu.encode(&mut encoder),
            XdlmsPdu::EventNotification(pdu) => pdu.encode(&mut encoder),
        }
        encoder.into_bytes()
    }

    /// Decode one APDU; trailing bytes are an error
    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let mut decoder = AxdrDecoder::new(data);
        let pdu = match decoder.take_u8()? {
            tag::INITIATE_REQUEST => XdlmsPdu::InitiateRequest(InitiateRequest::decode(&mut decoder)?),
            tag::INITIATE_RESPONSE => {
                XdlmsPdu::InitiateResponse(InitiateResponse::decode(&mut decoder)?)
            }
            tag::GET_REQUEST => XdlmsPdu::GetRequest(GetRequest::decode(&mut decoder)?),
            tag::GET_RESPONSE => XdlmsPdu::GetResponse(GetResponse::decode(&mut decoder)?),
            tag::SET_REQUEST => XdlmsPdu::SetRequest(SetRequest::decode(&mut decoder)?),
            tag::SET_RESPONSE => XdlmsPdu::SetResponse(SetResponse::decode(&mut decoder)?),
            tag::ACTION_REQUEST => XdlmsPdu::ActionRequest(ActionRequest::decode(&mut decoder)?),
            tag::ACTION_RESPONSE => {
                XdlmsPdu::ActionResponse(ActionResponse::decode(&mut decoder)?)
            }
            tag::EVENT_NOTIFICATION_REQUEST => {
                XdlmsPdu::EventNotification(EventNotification::decode(&mut decoder)?)
            }
            other => {
                return Err(DlmsError::Protocol(format!(
                    "Unsupported xDLMS tag 0x{:02X}",
                    other
                )))
            }
        };
        if !decoder.is_empty() {
            return Err(DlmsError::InvalidData(format!(
                "{} trailing bytes after {}",
                decoder.remaining(),
                pdu.name()
            )));
        }
        Ok(pdu)
    }
}
