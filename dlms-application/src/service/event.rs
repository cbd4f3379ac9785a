//! EVENT-NOTIFICATION service PDU
//!
//! Unconfirmed: the server pushes it without an invoke id and the client
//! never answers.

use crate::pdu::CosemAttributeDescriptor;
use dlms_asn1::{AxdrDecoder, AxdrEncoder};
use dlms_core::{CosemDateTime, DataObject, DlmsError, DlmsResult};

#[derive(Debug, Clone, PartialEq)]
pub struct EventNotification {
    pub time: Option<CosemDateTime>,
    pub attribute: CosemAttributeDescriptor,
    pub value: DataObject,
}

impl EventNotification {
    pub fn encode(&self, encoder: &mut AxdrEncoder) {
        match &self.time {
            Some(time) => {
                encoder.put_u8(0x01);
                encoder.put_octet_string(&time.encode());
            }
            None => encoder.put_u8(0x00),
        }
        self.attribute.encode(encoder);
        encoder.encode_data_object(&self.value);
    }

    pub fn decode(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let time = if decoder.take_bool()? {
            let raw = decoder.take_octet_string()?;
            if raw.len() != CosemDateTime::LENGTH {
                return Err(DlmsError::InvalidData(format!(
                    "Event time must be {} bytes, got {}",
                    CosemDateTime::LENGTH,
                    raw.len()
                )));
            }
            Some(CosemDateTime::decode(raw)?)
        } else {
            None
        };
        Ok(Self {
            time,
            attribute: CosemAttributeDescriptor::decode(decoder)?,
            value: decoder.decode_data_object()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlms_core::ObisCode;

    #[test]
    fn test_notification_with_time() {
        let notification = EventNotification {
            time: Some(CosemDateTime::new(2024, 3, 1, 12, 0, 0)),
            attribute: CosemAttributeDescriptor::new(1, ObisCode::new(0, 0, 96, 11, 0, 255), 2),
            value: DataObject::new_unsigned16(40),
        };
        let mut encoder = AxdrEncoder::new();
        notification.encode(&mut encoder);
        assert_eq!(&encoder.as_bytes()[..2], &[0x01, 0x0C]);

        let mut decoder = AxdrDecoder::new(encoder.as_bytes());
        assert_eq!(EventNotification::decode(&mut decoder).unwrap(), notification);
    }

    #[test]
    fn test_notification_rejects_short_time() {
        let body = [0x01, 0x02, 0x07, 0xE8];
        let mut decoder = AxdrDecoder::new(&body);
        assert!(EventNotification::decode(&mut decoder).is_err());
    }
}
