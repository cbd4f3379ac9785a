//! ACTION service PDUs

use crate::pdu::{CosemMethodDescriptor, InvokeIdAndPriority};
use crate::service::get::GetDataResult;
use dlms_asn1::{AxdrDecoder, AxdrEncoder};
use dlms_core::{DataAccessResult, DataObject, DlmsError, DlmsResult};

const REQUEST_NORMAL: u8 = 0x01;
const RESPONSE_NORMAL: u8 = 0x01;

/// ACTION-Request-Normal
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub invoke: InvokeIdAndPriority,
    pub method: CosemMethodDescriptor,
    pub parameters: Option<DataObject>,
}

impl ActionRequest {
    pub fn encode(&self, encoder: &mut AxdrEncoder) {
        encoder.put_u8(REQUEST_NORMAL);
        encoder.put_u8(self.invoke.to_byte());
        self.method.encode(encoder);
        match &self.parameters {
            Some(parameters) => {
                encoder.put_u8(0x01);
                encoder.encode_data_object(parameters);
            }
            None => encoder.put_u8(0x00),
        }
    }

    pub fn decode(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let choice = decoder.take_u8()?;
        if choice != REQUEST_NORMAL {
            return Err(DlmsError::Protocol(format!(
                "Unsupported ACTION-Request choice {}",
                choice
            )));
        }
        let invoke = InvokeIdAndPriority::from_byte(decoder.take_u8()?);
        let method = CosemMethodDescriptor::decode(decoder)?;
        let parameters = if decoder.take_bool()? {
            Some(decoder.decode_data_object()?)
        } else {
            None
        };
        Ok(Self {
            invoke,
            method,
            parameters,
        })
    }
}

/// ACTION-Response-Normal
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResponse {
    pub invoke: InvokeIdAndPriority,
    pub result: DataAccessResult,
    pub return_data: Option<GetDataResult>,
}

impl ActionResponse {
    pub fn encode(&self, encoder: &mut AxdrEncoder) {
        encoder.put_u8(RESPONSE_NORMAL);
        encoder.put_u8(self.invoke.to_byte());
        encoder.put_u8(self.result.to_u8());
        match &self.return_data {
            Some(data) => {
                encoder.put_u8(0x01);
                data.encode(encoder);
            }
            None => encoder.put_u8(0x00),
        }
    }

    pub fn decode(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let choice = decoder.take_u8()?;
        if choice != RESPONSE_NORMAL {
            return Err(DlmsError::Protocol(format!(
                "Unsupported ACTION-Response choice {}",
                choice
            )));
        }
        let invoke = InvokeIdAndPriority::from_byte(decoder.take_u8()?);
        let result = DataAccessResult::from_u8(decoder.take_u8()?);
        let return_data = if decoder.take_bool()? {
            Some(GetDataResult::decode(decoder)?)
        } else {
            None
        };
        Ok(Self {
            invoke,
            result,
            return_data,
        })
    }

    /// Return value of a successful action, or the failing result code
    pub fn into_result(self) -> DlmsResult<Option<DataObject>> {
        if !self.result.is_success() {
            return Err(DlmsError::DataAccess(self.result));
        }
        self.return_data.map(GetDataResult::into_result).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::Priority;
    use dlms_core::ObisCode;

    #[test]
    fn test_action_parameters_flag() {
        let request = ActionRequest {
            invoke: InvokeIdAndPriority::new(1, Priority::Normal).unwrap(),
            method: CosemMethodDescriptor::new(20, ObisCode::new(0, 0, 13, 0, 0, 255), 1),
            parameters: Some(DataObject::new_integer8(0)),
        };
        let mut encoder = AxdrEncoder::new();
        request.encode(&mut encoder);
        assert_eq!(
            encoder.as_bytes(),
            &[0x01, 0x41, 0x00, 0x14, 0x00, 0x00, 0x0D, 0x00, 0x00, 0xFF, 0x01, 0x01, 0x0F, 0x00]
        );

        let without = ActionRequest {
            parameters: None,
            ..request
        };
        let mut encoder = AxdrEncoder::new();
        without.encode(&mut encoder);
        assert_eq!(*encoder.as_bytes().last().unwrap(), 0x00);
    }

    #[test]
    fn test_failed_action_result() {
        let response = ActionResponse {
            invoke: InvokeIdAndPriority::from_byte(0x41),
            result: DataAccessResult::TemporaryFailure,
            return_data: None,
        };
        let err = response.into_result().unwrap_err();
        assert_eq!(err.data_access_result(), Some(DataAccessResult::TemporaryFailure));
    }

    #[test]
    fn test_action_response_with_return_value() {
        let body = [0x01, 0x41, 0x00, 0x01, 0x00, 0x11, 0x07];
        let mut decoder = AxdrDecoder::new(&body);
        let response = ActionResponse::decode(&mut decoder).unwrap();
        assert_eq!(response.into_result().unwrap(), Some(DataObject::new_unsigned8(7)));
    }
}
