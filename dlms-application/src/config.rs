//! Application layer configuration

use crate::pdu::{Conformance, DLMS_VERSION_6, Priority};
use dlms_core::{DlmsError, DlmsResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest PDU size a server may announce
const MIN_PDU_SIZE: u16 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Upper bound for outbound PDUs until the server announces its own
    pub max_pdu_size: u16,
    /// Proposed to the server in the InitiateRequest
    pub max_receive_pdu_size: u16,
    /// Wait for the response to one request
    pub timeout_ms: u64,
    pub dlms_version: u8,
    pub proposed_conformance: Conformance,
    /// Client identity passed to the security provider
    pub client_id: u16,
    pub priority: Priority,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            max_pdu_size: 1024,
            max_receive_pdu_size: 1024,
            timeout_ms: 5000,
            dlms_version: DLMS_VERSION_6,
            proposed_conformance: Conformance::GET
                | Conformance::SET
                | Conformance::ACTION
                | Conformance::SELECTIVE_ACCESS
                | Conformance::BLOCK_TRANSFER_WITH_GET
                | Conformance::BLOCK_TRANSFER_WITH_SET
                | Conformance::EVENT_NOTIFICATION,
            client_id: 16,
            priority: Priority::Normal,
        }
    }
}

impl ApplicationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> DlmsResult<()> {
        if self.max_pdu_size < MIN_PDU_SIZE || self.max_receive_pdu_size < MIN_PDU_SIZE {
            return Err(DlmsError::InvalidData(format!(
                "PDU sizes must be at least {} bytes",
                MIN_PDU_SIZE
            )));
        }
        if self.timeout_ms == 0 {
            return Err(DlmsError::InvalidData(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
