use crate::result_code::DataAccessResult;
use std::fmt;
use thiserror::Error;

/// Which check sequence of an HDLC frame failed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    /// Header check sequence (covers the format and address bytes)
    Header,
    /// Frame check sequence (covers the whole body)
    Frame,
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumKind::Header => write!(f, "HCS"),
            ChecksumKind::Frame => write!(f, "FCS"),
        }
    }
}

/// Main error type for DLMS/COSEM operations
#[derive(Error, Debug)]
pub enum DlmsError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Checksum mismatch: {kind} expected 0x{expected:04X}, got 0x{actual:04X}")]
    ChecksumMismatch {
        kind: ChecksumKind,
        expected: u16,
        actual: u16,
    },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Response timeout")]
    ResponseTimeout,

    #[error("Request timeout (invoke-id {invoke_id})")]
    RequestTimeout { invoke_id: u8 },

    /// A completed request whose result code was not `SUCCESS`
    #[error("Data access result: {0}")]
    DataAccess(DataAccessResult),

    #[error("Attribute {0} not found")]
    AttributeNotFound(u8),

    #[error("Method {0} not found")]
    MethodNotFound(u8),

    #[error("Attribute {0} is read-only")]
    ReadOnlyAttribute(u8),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection closed")]
    ConnectionClosed,
}

impl DlmsError {
    /// Returns the result code when this error is a completed-request fault
    pub fn data_access_result(&self) -> Option<DataAccessResult> {
        match self {
            DlmsError::DataAccess(code) => Some(*code),
            _ => None,
        }
    }

    /// True for errors raised by a timer rather than by the peer
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            DlmsError::ResponseTimeout | DlmsError::RequestTimeout { .. }
        )
    }
}

/// Result type alias for DLMS/COSEM operations
pub type DlmsResult<T> = Result<T, DlmsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_message() {
        let err = DlmsError::ChecksumMismatch {
            kind: ChecksumKind::Frame,
            expected: 0x1234,
            actual: 0xABCD,
        };
        assert_eq!(
            err.to_string(),
            "Checksum mismatch: FCS expected 0x1234, got 0xABCD"
        );
    }

    #[test]
    fn test_data_access_result_accessor() {
        let err = DlmsError::DataAccess(DataAccessResult::ObjectUndefined);
        assert_eq!(
            err.data_access_result(),
            Some(DataAccessResult::ObjectUndefined)
        );
        assert_eq!(DlmsError::ResponseTimeout.data_access_result(), None);
        assert!(DlmsError::RequestTimeout { invoke_id: 3 }.is_timeout());
    }
}
