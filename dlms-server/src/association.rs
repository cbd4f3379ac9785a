//! Per-connection application association state
//!
//! An [`Association`] is created for every served link. It records what the
//! Initiate exchange negotiated and holds the block transfers in progress,
//! keyed by invoke id. A link (re)connect or disconnect resets it.

use bytes::Bytes;
use dlms_application::{
    BlockAssembler, Conformance, CosemAttributeDescriptor, InitiateResponse, SelectiveAccessDescriptor,
};
use std::collections::{HashMap, VecDeque};

/// Outbound GET data not yet delivered
#[derive(Debug)]
pub(crate) struct GetTransfer {
    /// Number of the block sent last
    pub block_number: u32,
    pub remaining: VecDeque<Bytes>,
}

/// Inbound SET data being reassembled
#[derive(Debug)]
pub(crate) struct SetTransfer {
    pub attribute: CosemAttributeDescriptor,
    pub access: Option<SelectiveAccessDescriptor>,
    pub assembler: BlockAssembler,
}

#[derive(Debug, Default)]
pub struct Association {
    negotiated: Option<InitiateResponse>,
    client_max_receive_pdu_size: u16,
    pub(crate) get_transfers: HashMap<u8, GetTransfer>,
    pub(crate) set_transfers: HashMap<u8, SetTransfer>,
}

impl Association {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn establish(&mut self, response: InitiateResponse, client_max_receive_pdu_size: u16) {
        self.reset();
        self.negotiated = Some(response);
        self.client_max_receive_pdu_size = client_max_receive_pdu_size;
    }

    /// Forget the negotiation and every transfer in progress
    pub fn reset(&mut self) {
        if !self.get_transfers.is_empty() || !self.set_transfers.is_empty() {
            log::debug!(
                "Dropping {} GET and {} SET block transfers",
                self.get_transfers.len(),
                self.set_transfers.len()
            );
        }
        self.negotiated = None;
        self.client_max_receive_pdu_size = 0;
        self.get_transfers.clear();
        self.set_transfers.clear();
    }

    pub fn is_established(&self) -> bool {
        self.negotiated.is_some()
    }

    /// Negotiated conformance; empty before Initiate
    pub fn conformance(&self) -> Conformance {
        self.negotiated
            .as_ref()
            .map(|response| response.negotiated_conformance)
            .unwrap_or_else(Conformance::empty)
    }

    pub fn negotiated(&self) -> Option<&InitiateResponse> {
        self.negotiated.as_ref()
    }

    /// Largest response the client accepts
    pub fn max_response_size(&self) -> usize {
        self.client_max_receive_pdu_size as usize
    }

    /// Block transfers in progress in both directions
    pub fn transfers_in_progress(&self) -> usize {
        self.get_transfers.len() + self.set_transfers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_negotiation_and_transfers() {
        let mut association = Association::new();
        assert!(!association.is_established());
        assert_eq!(association.conformance(), Conformance::empty());

        association.establish(InitiateResponse::new(Conformance::GET, 512), 128);
        association.get_transfers.insert(
            1,
            GetTransfer {
                block_number: 1,
                remaining: VecDeque::from([Bytes::from_static(&[1, 2])]),
            },
        );
        assert!(association.is_established());
        assert_eq!(association.max_response_size(), 128);
        assert_eq!(association.transfers_in_progress(), 1);

        association.reset();
        assert!(!association.is_established());
        assert_eq!(association.transfers_in_progress(), 0);
    }
}
