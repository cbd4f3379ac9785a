//! Attribute access modes

use dlms_core::{DataObject, DlmsError, DlmsResult};
use serde::{Deserialize, Serialize};

const AUTHENTICATED: u8 = 3;

/// Access granted to an attribute, as listed in an association's object list
///
/// Encoded as an enum; the authenticated modes are the plain ones plus 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    #[default]
    NoAccess = 0,
    ReadOnly = 1,
    WriteOnly = 2,
    ReadWrite = 3,
    AuthReadOnly = 4,
    AuthWriteOnly = 5,
    AuthReadWrite = 6,
}

impl AccessMode {
    /// The mode without the authentication requirement
    fn plain(self) -> u8 {
        let value = self as u8;
        if value > AUTHENTICATED { value - AUTHENTICATED } else { value }
    }

    pub fn can_read(&self) -> bool {
        self.plain() & 0b01 != 0
    }

    pub fn can_write(&self) -> bool {
        self.plain() & 0b10 != 0
    }

    pub fn requires_auth(&self) -> bool {
        *self as u8 > AUTHENTICATED
    }

    pub fn to_data_object(self) -> DataObject {
        DataObject::Enumerate(self as u8)
    }

    pub fn from_data_object(value: &DataObject) -> DlmsResult<Self> {
        match value {
            DataObject::Enumerate(mode) => Self::try_from(*mode),
            other => Err(DlmsError::InvalidData(format!(
                "Access mode must be an enum, got {:?}",
                other.get_type()
            ))),
        }
    }
}

impl TryFrom<u8> for AccessMode {
    type Error = DlmsError;

    fn try_from(value: u8) -> DlmsResult<Self> {
        Ok(match value {
            0 => AccessMode::NoAccess,
            1 => AccessMode::ReadOnly,
            2 => AccessMode::WriteOnly,
            3 => AccessMode::ReadWrite,
            4 => AccessMode::AuthReadOnly,
            5 => AccessMode::AuthWriteOnly,
            6 => AccessMode::AuthReadWrite,
            _ => return Err(DlmsError::InvalidData(format!("Invalid access mode {}", value))),
        })
    }
}
