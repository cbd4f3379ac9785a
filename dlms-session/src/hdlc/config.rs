//! HDLC link configuration

use crate::hdlc::address::HdlcAddress;
use crate::hdlc::window::MAX_WINDOW_SIZE;
use dlms_core::{DlmsError, DlmsResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Link configuration for one side of an HDLC session
///
/// `window_size` and `max_info_length` are the values proposed in SNRM (or
/// accepted from it); the negotiated values may be smaller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HdlcConfig {
    pub window_size: u8,
    pub max_info_length: u16,
    /// Wait for UA, or for the acknowledgement of an I-frame
    pub response_timeout_ms: u64,
    /// Silence after which a partly received frame is discarded
    pub inter_frame_timeout_ms: u64,
    /// Silence after which a connected link is dropped (0 disables)
    pub inactivity_timeout_ms: u64,
    pub local_address: HdlcAddress,
    pub remote_address: HdlcAddress,
}

impl Default for HdlcConfig {
    fn default() -> Self {
        Self {
            window_size: 1,
            max_info_length: 128,
            response_timeout_ms: 1000,
            inter_frame_timeout_ms: 100,
            inactivity_timeout_ms: 5000,
            local_address: HdlcAddress::new(2, 2),
            remote_address: HdlcAddress::new(1, 1),
        }
    }
}

impl HdlcConfig {
    /// Configuration for the server side: addresses swapped
    pub fn server() -> Self {
        let client = Self::default();
        Self {
            local_address: client.remote_address,
            remote_address: client.local_address,
            ..client
        }
    }

    pub fn validate(&self) -> DlmsResult<()> {
        if self.window_size == 0 || self.window_size > MAX_WINDOW_SIZE {
            return Err(DlmsError::InvalidData(format!(
                "window_size must be 1-{}, got {}",
                MAX_WINDOW_SIZE, self.window_size
            )));
        }
        if self.max_info_length == 0 {
            return Err(DlmsError::InvalidData(
                "max_info_length must be greater than 0".to_string(),
            ));
        }
        if self.response_timeout_ms == 0 {
            return Err(DlmsError::InvalidData(
                "response_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn inter_frame_timeout(&self) -> Duration {
        Duration::from_millis(self.inter_frame_timeout_ms)
    }

    pub fn inactivity_timeout(&self) -> Option<Duration> {
        (self.inactivity_timeout_ms > 0).then(|| Duration::from_millis(self.inactivity_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HdlcConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.response_timeout(), Duration::from_millis(1000));
        let server = HdlcConfig::server();
        assert_eq!(server.local_address, config.remote_address);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = HdlcConfig {
            window_size: 8,
            ..HdlcConfig::default()
        };
        assert!(config.validate().is_err());
        let config = HdlcConfig {
            max_info_length: 0,
            ..HdlcConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
