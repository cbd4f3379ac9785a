//! Data-access result codes reported by a server for GET/SET/ACTION

use serde::{Deserialize, Serialize};
use std::fmt;

/// Data-Access-Result enumeration
///
/// Every confirmed service response carries one of these codes. `Success`
/// means the request completed; anything else is a fault surfaced to the
/// caller verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataAccessResult {
    Success,
    HardwareFault,
    TemporaryFailure,
    ReadWriteDenied,
    ObjectUndefined,
    ObjectClassInconsistent,
    ScopeOfAccessViolated,
    DataBlockUnavailable,
    LongGetAborted,
    NoLongGetInProgress,
    LongSetAborted,
    NoLongSetInProgress,
    OtherReason,
}

impl DataAccessResult {
    /// Map a wire value to a result code
    ///
    /// Values outside the table decode as `OtherReason`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => DataAccessResult::Success,
            1 => DataAccessResult::HardwareFault,
            2 => DataAccessResult::TemporaryFailure,
            3 => DataAccessResult::ReadWriteDenied,
            4 => DataAccessResult::ObjectUndefined,
            9 => DataAccessResult::ObjectClassInconsistent,
            11 => DataAccessResult::ScopeOfAccessViolated,
            12 => DataAccessResult::DataBlockUnavailable,
            13 => DataAccessResult::LongGetAborted,
            14 => DataAccessResult::NoLongGetInProgress,
            15 => DataAccessResult::LongSetAborted,
            16 => DataAccessResult::NoLongSetInProgress,
            _ => DataAccessResult::OtherReason,
        }
    }

    /// Wire value of this result code
    pub fn to_u8(self) -> u8 {
        match self {
            DataAccessResult::Success => 0,
            DataAccessResult::HardwareFault => 1,
            DataAccessResult::TemporaryFailure => 2,
            DataAccessResult::ReadWriteDenied => 3,
            DataAccessResult::ObjectUndefined => 4,
            DataAccessResult::ObjectClassInconsistent => 9,
            DataAccessResult::ScopeOfAccessViolated => 11,
            DataAccessResult::DataBlockUnavailable => 12,
            DataAccessResult::LongGetAborted => 13,
            DataAccessResult::NoLongGetInProgress => 14,
            DataAccessResult::LongSetAborted => 15,
            DataAccessResult::NoLongSetInProgress => 16,
            DataAccessResult::OtherReason => 250,
        }
    }

    pub fn is_success(self) -> bool {
        self == DataAccessResult::Success
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataAccessResult::Success => "SUCCESS",
            DataAccessResult::HardwareFault => "HARDWARE_FAULT",
            DataAccessResult::TemporaryFailure => "TEMPORARY_FAILURE",
            DataAccessResult::ReadWriteDenied => "READ_WRITE_DENIED",
            DataAccessResult::ObjectUndefined => "OBJECT_UNDEFINED",
            DataAccessResult::ObjectClassInconsistent => "OBJECT_CLASS_INCONSISTENT",
            DataAccessResult::ScopeOfAccessViolated => "SCOPE_OF_ACCESS_VIOLATED",
            DataAccessResult::DataBlockUnavailable => "DATA_BLOCK_UNAVAILABLE",
            DataAccessResult::LongGetAborted => "LONG_GET_ABORTED",
            DataAccessResult::NoLongGetInProgress => "NO_LONG_GET_IN_PROGRESS",
            DataAccessResult::LongSetAborted => "LONG_SET_ABORTED",
            DataAccessResult::NoLongSetInProgress => "NO_LONG_SET_IN_PROGRESS",
            DataAccessResult::OtherReason => "OTHER_REASON",
        }
    }
}

impl fmt::Display for DataAccessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.to_u8())
    }
}
