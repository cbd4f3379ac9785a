//! Block transfer helpers
//!
//! Blocks are numbered from 1. An assembler accepts them strictly in order
//! and completes on the block flagged last.

use bytes::{Bytes, BytesMut};
use dlms_core::{DlmsError, DlmsResult};

/// Split `data` into blocks of at most `block_size` bytes
pub fn split_blocks(data: &Bytes, block_size: usize) -> Vec<Bytes> {
    let block_size = block_size.max(1);
    (0..data.len())
        .step_by(block_size)
        .map(|start| data.slice(start..(start + block_size).min(data.len())))
        .collect()
}

/// Reassembles raw data from numbered blocks
#[derive(Debug, Default)]
pub struct BlockAssembler {
    buffer: BytesMut,
    received: u32,
    complete: bool,
}

impl BlockAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of the last block accepted (0 before the first)
    pub fn block_number(&self) -> u32 {
        self.received
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append block `block_number`
    ///
    /// # Errors
    ///
    /// Returns `Protocol` for a block out of order or after completion
    pub fn push(&mut self, block_number: u32, last_block: bool, raw: &[u8]) -> DlmsResult<()> {
        if self.complete {
            return Err(DlmsError::Protocol(format!(
                "Block {} received after the last block",
                block_number
            )));
        }
        let expected = self.received.wrapping_add(1);
        if block_number != expected {
            return Err(DlmsError::Protocol(format!(
                "Expected block {}, got {}",
                expected, block_number
            )));
        }
        self.buffer.extend_from_slice(raw);
        self.received = block_number;
        self.complete = last_block;
        Ok(())
    }

    /// Take the reassembled data
    pub fn finish(self) -> DlmsResult<Bytes> {
        if !self.complete {
            return Err(DlmsError::Protocol(format!(
                "Block transfer incomplete after {} blocks",
                self.received
            )));
        }
        Ok(self.buffer.freeze())
    }
}
