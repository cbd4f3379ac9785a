//! Streaming accumulator for inbound bytes
//!
//! Transports deliver bytes in arbitrary fragments. `FrameReader` buffers
//! them and yields complete `FLAG`-delimited frames. A closing flag may also
//! open the next frame, and runs of flags are treated as one.

use crate::hdlc::frame::FLAG;
use bytes::{Buf, Bytes, BytesMut};

/// Default cap on buffered bytes without a closing flag
pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

#[derive(Debug)]
pub struct FrameReader {
    buffer: BytesMut,
    max_frame_len: usize,
}

impl FrameReader {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_len,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Next complete frame, flags included
    pub fn next_frame(&mut self) -> Option<Bytes> {
        // drop noise before the opening flag
        let Some(start) = self.buffer.iter().position(|b| *b == FLAG) else {
            self.buffer.clear();
            return None;
        };
        self.buffer.advance(start);

        // collapse a run of flags into the last one
        let run = self.buffer.iter().take_while(|b| **b == FLAG).count();
        self.buffer.advance(run - 1);

        match self.buffer[1..].iter().position(|b| *b == FLAG) {
            Some(offset) => {
                let end = offset + 1;
                let frame = Bytes::copy_from_slice(&self.buffer[..=end]);
                // keep the closing flag, it may open the next frame
                self.buffer.advance(end);
                Some(frame)
            }
            None => {
                if self.buffer.len() > self.max_frame_len {
                    log::warn!(
                        "Discarding {} buffered bytes without closing flag",
                        self.buffer.len()
                    );
                    self.buffer.clear();
                }
                None
            }
        }
    }

    /// Drop a partially received frame
    pub fn discard_partial(&mut self) -> usize {
        let len = self.buffer.len();
        self.buffer.clear();
        len
    }

    /// True when bytes of an unfinished frame are buffered
    pub fn has_partial(&self) -> bool {
        self.buffer.iter().any(|b| *b != FLAG)
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}
