//! HDLC link state machine

use dlms_core::{DlmsError, DlmsResult};
use std::fmt;

/// HDLC link state
///
/// Exactly one state is current at a time.
///
/// ```text
/// Disconnected -> Connecting     connect(): SNRM sent
/// Connecting   -> Connected      UA received
/// Connecting   -> Disconnected   timeout or DM
/// Connected    -> Disconnecting  disconnect(): DISC sent
/// Disconnecting-> Disconnected   UA, DM or timeout
/// Connected    -> Disconnected   DM/DISC from the peer, inactivity
/// Disconnected -> Connected      SNRM from the peer (responder role)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl LinkState {
    /// True when information frames may be sent
    pub fn is_ready(&self) -> bool {
        matches!(self, LinkState::Connected)
    }

    pub fn validate_transition(&self, new_state: LinkState) -> DlmsResult<()> {
        use LinkState::*;
        let valid = matches!(
            (*self, new_state),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnecting)
                | (Connected, Disconnected)
                | (Disconnecting, Disconnected)
                | (Disconnected, Connected)
                | (Connected, Connected)
                | (Disconnected, Disconnected)
        );
        if valid {
            Ok(())
        } else {
            Err(DlmsError::InvalidState(format!(
                "Invalid link transition: {} -> {}",
                self, new_state
            )))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Disconnected => "Disconnected",
            LinkState::Connecting => "Connecting",
            LinkState::Connected => "Connected",
            LinkState::Disconnecting => "Disconnecting",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(LinkState::Disconnected
            .validate_transition(LinkState::Connecting)
            .is_ok());
        assert!(LinkState::Connecting
            .validate_transition(LinkState::Disconnecting)
            .is_err());
        assert!(LinkState::Disconnecting
            .validate_transition(LinkState::Connected)
            .is_err());
        assert!(LinkState::Connected.is_ready());
        assert!(!LinkState::Connecting.is_ready());
    }
}
