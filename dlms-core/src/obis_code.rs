use crate::error::{DlmsError, DlmsResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static OBIS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3})-(\d{1,3}):(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$")
        .expect("static OBIS pattern")
});

const FIELD_NAMES: [&str; 6] = ["A", "B", "C", "D", "E", "F"];

/// OBIS (Object Identification System) code for identifying COSEM objects
///
/// OBIS codes are 6-byte identifiers used in DLMS/COSEM to uniquely identify
/// objects in a logical device. The value is immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObisCode {
    bytes: [u8; 6],
}

impl ObisCode {
    /// Length of the binary form
    pub const LENGTH: usize = 6;

    /// Create a new OBIS code from individual bytes
    ///
    /// # Arguments
    ///
    /// * `a` - Media (A value)
    /// * `b` - Channel (B value)
    /// * `c` - Physical value (C value)
    /// * `d` - Measurement type (D value)
    /// * `e` - Tariff (E value)
    /// * `f` - Billing period (F value)
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        Self {
            bytes: [a, b, c, d, e, f],
        }
    }

    /// Parse an OBIS code from string format
    ///
    /// Supports the standard form `A-B:C.D.E.F` (e.g. `1-0:1.8.0.255`) and the
    /// six-field dotted form `1.0.1.8.0.255`.
    ///
    /// # Returns
    ///
    /// Returns `Ok(ObisCode)` if parsing succeeds. A field above 255 is
    /// rejected with an error naming the field.
    pub fn from_string(s: &str) -> DlmsResult<Self> {
        let s = s.trim();
        let fields: Vec<&str> = match OBIS_PATTERN.captures(s) {
            Some(caps) => caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .collect(),
            None => s.split('.').collect(),
        };
        if fields.len() != Self::LENGTH || fields.iter().any(|f| f.is_empty()) {
            return Err(DlmsError::InvalidData(format!(
                "Invalid OBIS code format: {}",
                s
            )));
        }

        let mut bytes = [0u8; 6];
        for (i, field) in fields.iter().enumerate() {
            let value: u32 = field.parse().map_err(|_| {
                DlmsError::InvalidData(format!(
                    "OBIS field {} is not a number: {}",
                    FIELD_NAMES[i], field
                ))
            })?;
            bytes[i] = u8::try_from(value).map_err(|_| {
                DlmsError::InvalidData(format!(
                    "OBIS field {} out of range 0-255: {}",
                    FIELD_NAMES[i], value
                ))
            })?;
        }
        Ok(Self { bytes })
    }

    /// Build from the 6-byte binary form
    ///
    /// Fails unless `bytes` is exactly six octets long.
    pub fn from_bytes(bytes: &[u8]) -> DlmsResult<Self> {
        let bytes: [u8; 6] = bytes.try_into().map_err(|_| {
            DlmsError::InvalidData(format!(
                "OBIS code must be 6 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Get the OBIS code as a byte array
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.bytes
    }

    /// Get the OBIS code as a copied byte array
    pub fn to_bytes(&self) -> [u8; 6] {
        self.bytes
    }

    pub fn a(&self) -> u8 {
        self.bytes[0]
    }

    pub fn b(&self) -> u8 {
        self.bytes[1]
    }

    pub fn c(&self) -> u8 {
        self.bytes[2]
    }

    pub fn d(&self) -> u8 {
        self.bytes[3]
    }

    pub fn e(&self) -> u8 {
        self.bytes[4]
    }

    pub fn f(&self) -> u8 {
        self.bytes[5]
    }
}

impl fmt::Display for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.bytes;
        write!(f, "{}-{}:{}.{}.{}.{}", a, b, c, d, e, g)
    }
}

impl FromStr for ObisCode {
    type Err = DlmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl TryFrom<&[u8]> for ObisCode {
    type Error = DlmsError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

impl From<[u8; 6]> for ObisCode {
    fn from(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }
}
