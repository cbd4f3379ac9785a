//! Server configuration

use dlms_application::Conformance;
use dlms_application::pdu::DLMS_VERSION_6;
use dlms_core::{DlmsError, DlmsResult};
use dlms_session::HdlcConfig;
use serde::{Deserialize, Serialize};

const MIN_PDU_SIZE: u16 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Link settings; addresses are seen from the meter side
    pub link: HdlcConfig,
    /// Services offered; the association gets the intersection with the
    /// client's proposal
    pub conformance: Conformance,
    /// Announced to the client in the InitiateResponse
    pub max_receive_pdu_size: u16,
    /// Lowest DLMS version accepted in an InitiateRequest
    pub dlms_version: u8,
    /// Client identity passed to the security provider
    pub client_id: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            link: HdlcConfig::server(),
            conformance: Conformance::GET
                | Conformance::SET
                | Conformance::ACTION
                | Conformance::SELECTIVE_ACCESS
                | Conformance::BLOCK_TRANSFER_WITH_GET
                | Conformance::BLOCK_TRANSFER_WITH_SET,
            max_receive_pdu_size: 1024,
            dlms_version: DLMS_VERSION_6,
            client_id: 16,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> DlmsResult<()> {
        self.link.validate()?;
        if self.max_receive_pdu_size < MIN_PDU_SIZE {
            return Err(DlmsError::InvalidData(format!(
                "max_receive_pdu_size must be at least {}, got {}",
                MIN_PDU_SIZE, self.max_receive_pdu_size
            )));
        }
        Ok(())
    }
}
