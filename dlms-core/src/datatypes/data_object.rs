//! Typed attribute values

use crate::datatypes::date_time::{CosemDateTime, CosemTime};
use crate::error::{DlmsError, DlmsResult};
use crate::obis_code::ObisCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A COSEM attribute value, method parameter or return value
///
/// Arrays hold elements of one type; structures may mix them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataObject {
    Null,
    Boolean(bool),
    Integer8(i8),
    Integer16(i16),
    Integer32(i32),
    Integer64(i64),
    Unsigned8(u8),
    Unsigned16(u16),
    Unsigned32(u32),
    Unsigned64(u64),
    Float32(f32),
    Float64(f64),
    Enumerate(u8),
    OctetString(#[serde(with = "serde_bytes")] Vec<u8>),
    VisibleString(Vec<u8>),
    Utf8String(Vec<u8>),
    Array(Vec<DataObject>),
    Structure(Vec<DataObject>),
    Time(CosemTime),
    DateTime(CosemDateTime),
}

/// The type of a [`DataObject`], named after the A-XDR data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataObjectType {
    NullData,
    Array,
    Structure,
    Boolean,
    /// Integer32
    DoubleLong,
    /// Unsigned32
    DoubleLongUnsigned,
    OctetString,
    Utf8String,
    VisibleString,
    /// Integer8
    Integer,
    /// Integer16
    LongInteger,
    /// Unsigned8
    Unsigned,
    /// Unsigned16
    LongUnsigned,
    Long64,
    Long64Unsigned,
    Enumerate,
    Float32,
    Float64,
    DateTime,
    Time,
}

impl DataObjectType {
    pub fn is_number(&self) -> bool {
        matches!(
            self,
            DataObjectType::DoubleLong
                | DataObjectType::DoubleLongUnsigned
                | DataObjectType::Integer
                | DataObjectType::LongInteger
                | DataObjectType::Unsigned
                | DataObjectType::LongUnsigned
                | DataObjectType::Long64
                | DataObjectType::Long64Unsigned
                | DataObjectType::Enumerate
                | DataObjectType::Float32
                | DataObjectType::Float64
        )
    }
}

impl DataObject {
    pub fn get_type(&self) -> DataObjectType {
        match self {
            DataObject::Null => DataObjectType::NullData,
            DataObject::Boolean(_) => DataObjectType::Boolean,
            DataObject::Integer8(_) => DataObjectType::Integer,
            DataObject::Integer16(_) => DataObjectType::LongInteger,
            DataObject::Integer32(_) => DataObjectType::DoubleLong,
            DataObject::Integer64(_) => DataObjectType::Long64,
            DataObject::Unsigned8(_) => DataObjectType::Unsigned,
            DataObject::Unsigned16(_) => DataObjectType::LongUnsigned,
            DataObject::Unsigned32(_) => DataObjectType::DoubleLongUnsigned,
            DataObject::Unsigned64(_) => DataObjectType::Long64Unsigned,
            DataObject::Float32(_) => DataObjectType::Float32,
            DataObject::Float64(_) => DataObjectType::Float64,
            DataObject::Enumerate(_) => DataObjectType::Enumerate,
            DataObject::OctetString(_) => DataObjectType::OctetString,
            DataObject::VisibleString(_) => DataObjectType::VisibleString,
            DataObject::Utf8String(_) => DataObjectType::Utf8String,
            DataObject::Array(_) => DataObjectType::Array,
            DataObject::Structure(_) => DataObjectType::Structure,
            DataObject::Time(_) => DataObjectType::Time,
            DataObject::DateTime(_) => DataObjectType::DateTime,
        }
    }

    pub fn new_null() -> Self {
        DataObject::Null
    }

    pub fn new_bool(value: bool) -> Self {
        DataObject::Boolean(value)
    }

    pub fn new_integer8(value: i8) -> Self {
        DataObject::Integer8(value)
    }

    pub fn new_integer16(value: i16) -> Self {
        DataObject::Integer16(value)
    }

    pub fn new_integer32(value: i32) -> Self {
        DataObject::Integer32(value)
    }

    pub fn new_unsigned8(value: u8) -> Self {
        DataObject::Unsigned8(value)
    }

    pub fn new_unsigned16(value: u16) -> Self {
        DataObject::Unsigned16(value)
    }

    pub fn new_unsigned32(value: u32) -> Self {
        DataObject::Unsigned32(value)
    }

    pub fn new_octet_string(bytes: Vec<u8>) -> Self {
        DataObject::OctetString(bytes)
    }

    pub fn new_visible_string(bytes: Vec<u8>) -> Self {
        DataObject::VisibleString(bytes)
    }

    /// The 6-byte octet string form of a logical name
    pub fn from_logical_name(name: &ObisCode) -> Self {
        DataObject::OctetString(name.to_bytes().to_vec())
    }

    /// An array; every element must have the type of the first
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` naming the first element of another type
    pub fn new_array(elements: Vec<DataObject>) -> DlmsResult<Self> {
        if let Some(first) = elements.first() {
            let element_type = first.get_type();
            if let Some((index, other)) = elements
                .iter()
                .enumerate()
                .find(|(_, element)| element.get_type() != element_type)
            {
                return Err(DlmsError::InvalidData(format!(
                    "Array of {:?} holds {:?} at index {}",
                    element_type,
                    other.get_type(),
                    index
                )));
            }
        }
        Ok(DataObject::Array(elements))
    }

    pub fn new_structure(fields: Vec<DataObject>) -> Self {
        DataObject::Structure(fields)
    }

    pub fn is_number(&self) -> bool {
        self.get_type().is_number()
    }

    /// Any number widened to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        Some(match *self {
            DataObject::Integer8(v) => v as f64,
            DataObject::Integer16(v) => v as f64,
            DataObject::Integer32(v) => v as f64,
            DataObject::Integer64(v) => v as f64,
            DataObject::Unsigned8(v) | DataObject::Enumerate(v) => v as f64,
            DataObject::Unsigned16(v) => v as f64,
            DataObject::Unsigned32(v) => v as f64,
            DataObject::Unsigned64(v) => v as f64,
            DataObject::Float32(v) => v as f64,
            DataObject::Float64(v) => v,
            _ => return None,
        })
    }

    /// Zero of the same numeric type; other values are returned unchanged
    pub fn zeroed(&self) -> Self {
        match self {
            DataObject::Integer8(_) => DataObject::Integer8(0),
            DataObject::Integer16(_) => DataObject::Integer16(0),
            DataObject::Integer32(_) => DataObject::Integer32(0),
            DataObject::Integer64(_) => DataObject::Integer64(0),
            DataObject::Unsigned8(_) => DataObject::Unsigned8(0),
            DataObject::Unsigned16(_) => DataObject::Unsigned16(0),
            DataObject::Unsigned32(_) => DataObject::Unsigned32(0),
            DataObject::Unsigned64(_) => DataObject::Unsigned64(0),
            DataObject::Float32(_) => DataObject::Float32(0.0),
            DataObject::Float64(_) => DataObject::Float64(0.0),
            DataObject::Enumerate(_) => DataObject::Enumerate(0),
            other => other.clone(),
        }
    }

    fn mismatch(&self, expected: &str) -> DlmsError {
        DlmsError::InvalidData(format!("Expected {}, got {:?}", expected, self.get_type()))
    }

    pub fn as_bool(&self) -> DlmsResult<bool> {
        match self {
            DataObject::Boolean(b) => Ok(*b),
            _ => Err(self.mismatch("Boolean")),
        }
    }

    pub fn as_integer32(&self) -> DlmsResult<i32> {
        match self {
            DataObject::Integer32(i) => Ok(*i),
            _ => Err(self.mismatch("Integer32")),
        }
    }

    /// Unsigned8, or an Enumerate
    pub fn as_unsigned8(&self) -> DlmsResult<u8> {
        match self {
            DataObject::Unsigned8(u) | DataObject::Enumerate(u) => Ok(*u),
            _ => Err(self.mismatch("Unsigned8")),
        }
    }

    pub fn as_unsigned16(&self) -> DlmsResult<u16> {
        match self {
            DataObject::Unsigned16(u) => Ok(*u),
            _ => Err(self.mismatch("Unsigned16")),
        }
    }

    pub fn as_unsigned32(&self) -> DlmsResult<u32> {
        match self {
            DataObject::Unsigned32(u) => Ok(*u),
            _ => Err(self.mismatch("Unsigned32")),
        }
    }

    pub fn as_octet_string(&self) -> DlmsResult<&Vec<u8>> {
        match self {
            DataObject::OctetString(s) => Ok(s),
            _ => Err(self.mismatch("OctetString")),
        }
    }

    /// An octet string holding a logical name
    pub fn as_logical_name(&self) -> DlmsResult<ObisCode> {
        ObisCode::from_bytes(self.as_octet_string()?)
    }

    pub fn as_array(&self) -> DlmsResult<&Vec<DataObject>> {
        match self {
            DataObject::Array(a) => Ok(a),
            _ => Err(self.mismatch("Array")),
        }
    }

    pub fn as_structure(&self) -> DlmsResult<&Vec<DataObject>> {
        match self {
            DataObject::Structure(s) => Ok(s),
            _ => Err(self.mismatch("Structure")),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, open: char, items: &[DataObject], close: char) -> fmt::Result {
    write!(f, "{}", open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "{}", close)
}

/// Compact one-line form: numbers as is, octet strings in hex, arrays in
/// brackets and structures in braces
impl fmt::Display for DataObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataObject::Null => write!(f, "null"),
            DataObject::Boolean(b) => write!(f, "{}", b),
            DataObject::Integer8(v) => write!(f, "{}", v),
            DataObject::Integer16(v) => write!(f, "{}", v),
            DataObject::Integer32(v) => write!(f, "{}", v),
            DataObject::Integer64(v) => write!(f, "{}", v),
            DataObject::Unsigned8(v) => write!(f, "{}", v),
            DataObject::Unsigned16(v) => write!(f, "{}", v),
            DataObject::Unsigned32(v) => write!(f, "{}", v),
            DataObject::Unsigned64(v) => write!(f, "{}", v),
            DataObject::Float32(v) => write!(f, "{}", v),
            DataObject::Float64(v) => write!(f, "{}", v),
            DataObject::Enumerate(v) => write!(f, "enum {}", v),
            DataObject::OctetString(bytes) => {
                write!(f, "0x")?;
                for byte in bytes {
                    write!(f, "{:02X}", byte)?;
                }
                Ok(())
            }
            DataObject::VisibleString(s) | DataObject::Utf8String(s) => {
                write!(f, "\"{}\"", String::from_utf8_lossy(s))
            }
            DataObject::Array(items) => write_list(f, '[', items, ']'),
            DataObject::Structure(fields) => write_list(f, '{', fields, '}'),
            DataObject::Time(t) => write!(f, "{}", t),
            DataObject::DateTime(dt) => write!(f, "{}", dt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_rejects_mixed_types() {
        let same = vec![DataObject::new_unsigned16(1), DataObject::new_unsigned16(2)];
        assert_eq!(DataObject::new_array(same).unwrap().as_array().unwrap().len(), 2);

        let mixed = vec![DataObject::new_unsigned16(1), DataObject::new_bool(true)];
        assert!(DataObject::new_array(mixed).is_err());
        assert!(DataObject::new_array(Vec::new()).is_ok());
    }

    #[test]
    fn test_logical_name_round_trip() {
        let name = ObisCode::new(0, 0, 13, 0, 0, 255);
        let obj = DataObject::from_logical_name(&name);
        assert_eq!(obj.as_logical_name().unwrap(), name);
        assert!(DataObject::new_octet_string(vec![1, 2, 3]).as_logical_name().is_err());
    }

    #[test]
    fn test_numeric_helpers() {
        assert_eq!(DataObject::new_integer16(-250).as_f64(), Some(-250.0));
        assert_eq!(DataObject::new_octet_string(vec![1]).as_f64(), None);
        assert_eq!(DataObject::new_unsigned32(99).zeroed(), DataObject::new_unsigned32(0));
        assert_eq!(DataObject::new_bool(true).zeroed(), DataObject::new_bool(true));
    }

    #[test]
    fn test_accessor_names_expected_type() {
        let err = DataObject::new_unsigned8(1).as_structure().unwrap_err();
        assert_eq!(err.to_string(), "Invalid data: Expected Structure, got Unsigned");
    }

    #[test]
    fn test_display() {
        let value = DataObject::new_structure(vec![
            DataObject::new_octet_string(vec![0x0A, 0xFF]),
            DataObject::Array(vec![DataObject::new_unsigned8(1), DataObject::new_unsigned8(2)]),
            DataObject::new_visible_string(b"kWh".to_vec()),
        ]);
        assert_eq!(value.to_string(), "{0x0AFF, [1, 2], \"kWh\"}");
    }
}
