//! A-XDR encoder for DLMS/COSEM

use crate::axdr::types::AxdrTag;
use bytes::{BufMut, Bytes, BytesMut};
use dlms_core::DataObject;

/// Appends A-XDR encoded fields to a growable buffer
///
/// Encoding into memory cannot fail, so the `put_*` methods return nothing.
#[derive(Debug, Default)]
pub struct AxdrEncoder {
    buffer: BytesMut,
}

impl AxdrEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buffer.put_u16(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buffer.put_u32(value);
    }

    /// A-XDR boolean: `0x00` false, anything else true (`0xFF` on encode)
    pub fn put_bool(&mut self, value: bool) {
        self.buffer.put_u8(if value { 0xFF } else { 0x00 });
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buffer.put_slice(bytes);
    }

    /// Encode a length
    ///
    /// Short form below 128, otherwise `0x80 | n` followed by `n` big-endian
    /// length octets.
    pub fn put_length(&mut self, len: usize) {
        if len < 0x80 {
            self.buffer.put_u8(len as u8);
            return;
        }
        let raw = (len as u64).to_be_bytes();
        let skip = raw.iter().take_while(|b| **b == 0).count();
        self.buffer.put_u8(0x80 | (raw.len() - skip) as u8);
        self.buffer.put_slice(&raw[skip..]);
    }

    /// Length-prefixed octet string without a `Data` tag
    pub fn put_octet_string(&mut self, value: &[u8]) {
        self.put_length(value.len());
        self.buffer.put_slice(value);
    }

    /// Encode a tagged `Data` value
    pub fn encode_data_object(&mut self, obj: &DataObject) {
        match obj {
            DataObject::Null => self.put_tag(AxdrTag::Null),
            DataObject::Boolean(b) => {
                self.put_tag(AxdrTag::Boolean);
                self.put_bool(*b);
            }
            DataObject::Integer8(i) => {
                self.put_tag(AxdrTag::Integer8);
                self.buffer.put_i8(*i);
            }
            DataObject::Integer16(i) => {
                self.put_tag(AxdrTag::Integer16);
                self.buffer.put_i16(*i);
            }
            DataObject::Integer32(i) => {
                self.put_tag(AxdrTag::Integer32);
                self.buffer.put_i32(*i);
            }
            DataObject::Integer64(i) => {
                self.put_tag(AxdrTag::Integer64);
                self.buffer.put_i64(*i);
            }
            DataObject::Unsigned8(u) => {
                self.put_tag(AxdrTag::Unsigned8);
                self.buffer.put_u8(*u);
            }
            DataObject::Unsigned16(u) => {
                self.put_tag(AxdrTag::Unsigned16);
                self.buffer.put_u16(*u);
            }
            DataObject::Unsigned32(u) => {
                self.put_tag(AxdrTag::Unsigned32);
                self.buffer.put_u32(*u);
            }
            DataObject::Unsigned64(u) => {
                self.put_tag(AxdrTag::Unsigned64);
                self.buffer.put_u64(*u);
            }
            DataObject::Float32(f) => {
                self.put_tag(AxdrTag::Float32);
                self.buffer.put_f32(*f);
            }
            DataObject::Float64(f) => {
                self.put_tag(AxdrTag::Float64);
                self.buffer.put_f64(*f);
            }
            DataObject::Enumerate(e) => {
                self.put_tag(AxdrTag::Enumerate);
                self.buffer.put_u8(*e);
            }
            DataObject::OctetString(s) => {
                self.put_tag(AxdrTag::OctetString);
                self.put_octet_string(s);
            }
            DataObject::VisibleString(s) => {
                self.put_tag(AxdrTag::VisibleString);
                self.put_octet_string(s);
            }
            DataObject::Utf8String(s) => {
                self.put_tag(AxdrTag::Utf8String);
                self.put_octet_string(s);
            }
            DataObject::Array(items) => {
                self.put_tag(AxdrTag::Array);
                self.put_sequence(items);
            }
            DataObject::Structure(items) => {
                self.put_tag(AxdrTag::Structure);
                self.put_sequence(items);
            }
            DataObject::Time(t) => {
                self.put_tag(AxdrTag::Time);
                self.buffer.put_slice(&t.encode());
            }
            DataObject::DateTime(dt) => {
                self.put_tag(AxdrTag::DateTime);
                self.buffer.put_slice(&dt.encode());
            }
        }
    }

    fn put_tag(&mut self, tag: AxdrTag) {
        self.buffer.put_u8(tag.to_u8());
    }

    fn put_sequence(&mut self, items: &[DataObject]) {
        self.put_length(items.len());
        for item in items {
            self.encode_data_object(item);
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }
}

/// Encode a single `Data` value into a fresh buffer
pub fn encode_data(obj: &DataObject) -> Bytes {
    let mut encoder = AxdrEncoder::new();
    encoder.encode_data_object(obj);
    encoder.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlms_core::ObisCode;

    #[test]
    fn test_encode_boolean() {
        let bytes = encode_data(&DataObject::new_bool(true));
        assert_eq!(&bytes[..], &[0x03, 0xFF]);
    }

    #[test]
    fn test_encode_integer32() {
        let bytes = encode_data(&DataObject::new_integer32(0x12345678));
        assert_eq!(&bytes[..], &[0x05, 0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn test_encode_logical_name() {
        let name = ObisCode::new(0, 0, 13, 0, 0, 255);
        let bytes = encode_data(&DataObject::from_logical_name(&name));
        assert_eq!(&bytes[..], &[0x09, 0x06, 0, 0, 13, 0, 0, 255]);
    }

    #[test]
    fn test_long_length_form() {
        let mut encoder = AxdrEncoder::new();
        encoder.put_length(300);
        assert_eq!(encoder.as_bytes(), &[0x82, 0x01, 0x2C]);

        let mut encoder = AxdrEncoder::new();
        encoder.put_length(0x80);
        assert_eq!(encoder.as_bytes(), &[0x81, 0x80]);
    }

    #[test]
    fn test_nested_structure() {
        let obj = DataObject::new_structure(vec![
            DataObject::new_unsigned16(0x0102),
            DataObject::new_null(),
        ]);
        assert_eq!(&encode_data(&obj)[..], &[0x02, 0x02, 0x12, 0x01, 0x02, 0x00]);
    }
}
