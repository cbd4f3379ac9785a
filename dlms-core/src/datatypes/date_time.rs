//! COSEM `date-time` and `time` values
//!
//! Both are fixed-length octet layouts. Fields that are not specified on the
//! wire carry `0xFF` (or `0x8000` for the deviation), which is kept as-is.

use crate::error::{DlmsError, DlmsResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wildcard byte for an unspecified field
pub const NOT_SPECIFIED: u8 = 0xFF;

/// Deviation value meaning "not specified"
pub const DEVIATION_NOT_SPECIFIED: u16 = 0x8000;

/// Time of day: hour, minute, second, hundredths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CosemTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub hundredths: u8,
}

impl CosemTime {
    pub const LENGTH: usize = 4;

    pub fn new(hour: u8, minute: u8, second: u8) -> Self {
        Self {
            hour,
            minute,
            second,
            hundredths: 0,
        }
    }

    pub fn encode(&self) -> [u8; 4] {
        [self.hour, self.minute, self.second, self.hundredths]
    }

    /// Decode from exactly four octets
    pub fn decode(bytes: &[u8]) -> DlmsResult<Self> {
        if bytes.len() != Self::LENGTH {
            return Err(DlmsError::InvalidData(format!(
                "time must be {} bytes, got {}",
                Self::LENGTH,
                bytes.len()
            )));
        }
        Ok(Self {
            hour: bytes[0],
            minute: bytes[1],
            second: bytes[2],
            hundredths: bytes[3],
        })
    }
}

impl fmt::Display for CosemTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// Calendar date plus time of day, deviation from UTC and clock status
///
/// Layout (12 octets): year (u16 BE), month, day of month, day of week,
/// hour, minute, second, hundredths, deviation (i16 BE), clock status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CosemDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub day_of_week: u8,
    pub time: CosemTime,
    pub deviation: u16,
    pub clock_status: u8,
}

impl CosemDateTime {
    pub const LENGTH: usize = 12;

    /// Build a date-time with the day of week, hundredths and deviation left unspecified
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            day_of_week: NOT_SPECIFIED,
            time: CosemTime {
                hour,
                minute,
                second,
                hundredths: NOT_SPECIFIED,
            },
            deviation: DEVIATION_NOT_SPECIFIED,
            clock_status: 0,
        }
    }

    pub fn encode(&self) -> [u8; 12] {
        let year = self.year.to_be_bytes();
        let deviation = self.deviation.to_be_bytes();
        [
            year[0],
            year[1],
            self.month,
            self.day,
            self.day_of_week,
            self.time.hour,
            self.time.minute,
            self.time.second,
            self.time.hundredths,
            deviation[0],
            deviation[1],
            self.clock_status,
        ]
    }

    pub fn decode(bytes: &[u8]) -> DlmsResult<Self> {
        if bytes.len() != Self::LENGTH {
            return Err(DlmsError::InvalidData(format!(
                "date-time must be {} bytes, got {}",
                Self::LENGTH,
                bytes.len()
            )));
        }
        Ok(Self {
            year: u16::from_be_bytes([bytes[0], bytes[1]]),
            month: bytes[2],
            day: bytes[3],
            day_of_week: bytes[4],
            time: CosemTime::decode(&bytes[5..9])?,
            deviation: u16::from_be_bytes([bytes[9], bytes[10]]),
            clock_status: bytes[11],
        })
    }
}

impl fmt::Display for CosemDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {}",
            self.year, self.month, self.day, self.time
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_time_layout() {
        let dt = CosemDateTime::new(2024, 3, 31, 2, 0, 0);
        let bytes = dt.encode();
        assert_eq!(
            bytes,
            [0x07, 0xE8, 3, 31, 0xFF, 2, 0, 0, 0xFF, 0x80, 0x00, 0x00]
        );
        assert_eq!(CosemDateTime::decode(&bytes).unwrap(), dt);
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(CosemDateTime::decode(&[0u8; 11]).is_err());
        assert!(CosemTime::decode(&[0u8; 5]).is_err());
    }

    #[test]
    fn test_display() {
        let dt = CosemDateTime::new(2024, 1, 5, 6, 30, 0);
        assert_eq!(dt.to_string(), "2024-01-05 06:30:00");
    }
}
