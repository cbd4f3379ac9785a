//! A-XDR decoder for DLMS/COSEM

use crate::axdr::types::{AxdrTag, MAX_LENGTH_OCTETS};
use dlms_core::{CosemDateTime, CosemTime, DataObject, DlmsError, DlmsResult};

/// Nesting depth at which array/structure decoding gives up
const MAX_DEPTH: usize = 16;

/// Reads A-XDR fields from a borrowed buffer
pub struct AxdrDecoder<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> AxdrDecoder<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Borrow the next `len` bytes and advance past them
    pub fn take(&mut self, len: usize) -> DlmsResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(DlmsError::InvalidData(format!(
                "Not enough bytes: need {}, have {}",
                len,
                self.remaining()
            )));
        }
        let slice = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    pub fn take_u8(&mut self) -> DlmsResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn take_u16(&mut self) -> DlmsResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn take_u32(&mut self) -> DlmsResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn take_bool(&mut self) -> DlmsResult<bool> {
        Ok(self.take_u8()? != 0x00)
    }

    /// Decode a short or long form length
    pub fn take_length(&mut self) -> DlmsResult<usize> {
        let first = self.take_u8()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }
        let octets = (first & 0x7F) as usize;
        if octets == 0 || octets > MAX_LENGTH_OCTETS {
            return Err(DlmsError::InvalidData(format!(
                "Invalid length-of-length: {}",
                octets
            )));
        }
        Ok(self
            .take(octets)?
            .iter()
            .fold(0usize, |len, b| (len << 8) | *b as usize))
    }

    /// Length-prefixed octet string without a `Data` tag
    pub fn take_octet_string(&mut self) -> DlmsResult<&'a [u8]> {
        let len = self.take_length()?;
        self.take(len)
    }

    /// Decode a tagged `Data` value
    pub fn decode_data_object(&mut self) -> DlmsResult<DataObject> {
        self.decode_nested(0)
    }

    fn decode_nested(&mut self, depth: usize) -> DlmsResult<DataObject> {
        if depth > MAX_DEPTH {
            return Err(DlmsError::InvalidData(
                "Data nesting too deep".to_string(),
            ));
        }
        let tag = AxdrTag::from_u8(self.take_u8()?)?;
        let obj = match tag {
            AxdrTag::Null => DataObject::Null,
            AxdrTag::Boolean => DataObject::Boolean(self.take_bool()?),
            AxdrTag::Integer8 => DataObject::Integer8(self.take_u8()? as i8),
            AxdrTag::Integer16 => DataObject::Integer16(self.take_u16()? as i16),
            AxdrTag::Integer32 => DataObject::Integer32(self.take_u32()? as i32),
            AxdrTag::Integer64 => DataObject::Integer64(self.take_u64()? as i64),
            AxdrTag::Unsigned8 => DataObject::Unsigned8(self.take_u8()?),
            AxdrTag::Unsigned16 => DataObject::Unsigned16(self.take_u16()?),
            AxdrTag::Unsigned32 => DataObject::Unsigned32(self.take_u32()?),
            AxdrTag::Unsigned64 => DataObject::Unsigned64(self.take_u64()?),
            AxdrTag::Float32 => DataObject::Float32(f32::from_bits(self.take_u32()?)),
            AxdrTag::Float64 => DataObject::Float64(f64::from_bits(self.take_u64()?)),
            AxdrTag::Enumerate => DataObject::Enumerate(self.take_u8()?),
            AxdrTag::OctetString => DataObject::OctetString(self.take_octet_string()?.to_vec()),
            AxdrTag::VisibleString => {
                DataObject::VisibleString(self.take_octet_string()?.to_vec())
            }
            AxdrTag::Utf8String => DataObject::Utf8String(self.take_octet_string()?.to_vec()),
            AxdrTag::Array => DataObject::new_array(self.decode_sequence(depth)?)?,
            AxdrTag::Structure => DataObject::Structure(self.decode_sequence(depth)?),
            AxdrTag::Time => DataObject::Time(CosemTime::decode(self.take(CosemTime::LENGTH)?)?),
            AxdrTag::DateTime => {
                DataObject::DateTime(CosemDateTime::decode(self.take(CosemDateTime::LENGTH)?)?)
            }
        };
        Ok(obj)
    }

    fn decode_sequence(&mut self, depth: usize) -> DlmsResult<Vec<DataObject>> {
        let len = self.take_length()?;
        // every element needs at least its tag byte
        if len > self.remaining() {
            return Err(DlmsError::InvalidData(format!(
                "Sequence of {} elements exceeds {} remaining bytes",
                len,
                self.remaining()
            )));
        }
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(self.decode_nested(depth + 1)?);
        }
        Ok(items)
    }

    fn take_u64(&mut self) -> DlmsResult<u64> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    /// Everything not yet consumed
    pub fn rest(&self) -> &'a [u8] {
        &self.buffer[self.position..]
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

/// Decode a single `Data` value, rejecting trailing bytes
pub fn decode_data(bytes: &[u8]) -> DlmsResult<DataObject> {
    let mut decoder = AxdrDecoder::new(bytes);
    let obj = decoder.decode_data_object()?;
    if !decoder.is_empty() {
        return Err(DlmsError::InvalidData(format!(
            "{} trailing bytes after Data",
            decoder.remaining()
        )));
    }
    Ok(obj)
}
