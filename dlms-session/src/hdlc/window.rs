//! HDLC send/receive windows
//!
//! Sequence numbers are 3 bits wide. The send window tracks V(A), the
//! oldest unacknowledged N(S), and the frames in flight after it; V(S) is
//! always `V(A) + in_flight` modulo 8.

use dlms_core::{DlmsError, DlmsResult};
use std::collections::VecDeque;

/// Sequence number modulus
pub const MODULUS: u8 = 8;

/// Largest window the 3-bit sequence space allows
pub const MAX_WINDOW_SIZE: u8 = MODULUS - 1;

/// Distance from `from` forward to `to`, modulo 8
pub fn seq_distance(from: u8, to: u8) -> u8 {
    to.wrapping_sub(from) % MODULUS
}

/// Outbound window of unacknowledged frames
///
/// `T` is whatever the owner needs to keep per frame (payload, timer,
/// completion handle). Entries are kept in N(S) order.
#[derive(Debug)]
pub struct SendWindow<T> {
    in_flight: VecDeque<(u8, T)>,
    acknowledged: u8,
    window_size: u8,
}

impl<T> SendWindow<T> {
    /// # Errors
    ///
    /// Returns `InvalidData` if `window_size` is outside `1..=7`
    pub fn new(window_size: u8) -> DlmsResult<Self> {
        check_window_size(window_size)?;
        Ok(Self {
            in_flight: VecDeque::new(),
            acknowledged: 0,
            window_size,
        })
    }

    /// True if another frame fits in the window
    pub fn can_send(&self) -> bool {
        self.in_flight.len() < self.window_size as usize
    }

    /// V(A): N(S) of the oldest unacknowledged frame
    pub fn acknowledged_sequence(&self) -> u8 {
        self.acknowledged
    }

    /// V(S): N(S) the next frame will carry
    pub fn next_sequence(&self) -> u8 {
        (self.acknowledged + self.in_flight.len() as u8) % MODULUS
    }

    /// Record a transmitted frame and return its N(S)
    pub fn push(&mut self, item: T) -> DlmsResult<u8> {
        if !self.can_send() {
            return Err(DlmsError::InvalidState(format!(
                "Send window is full: {} frames pending (window size: {})",
                self.in_flight.len(),
                self.window_size
            )));
        }
        let sequence = self.next_sequence();
        self.in_flight.push_back((sequence, item));
        Ok(sequence)
    }

    /// True when N(R) lies within `V(A)..=V(S)`
    pub fn is_valid_ack(&self, receive_sequence: u8) -> bool {
        seq_distance(self.acknowledged, receive_sequence) as usize <= self.in_flight.len()
    }

    /// Release every frame before N(R)
    ///
    /// N(R) names the next frame the peer expects, so it acknowledges all
    /// frames from V(A) up to but excluding N(R). Returns the released
    /// entries in order; an out-of-window N(R) releases nothing.
    pub fn acknowledge(&mut self, receive_sequence: u8) -> Vec<(u8, T)> {
        if !self.is_valid_ack(receive_sequence) {
            return Vec::new();
        }
        let count = seq_distance(self.acknowledged, receive_sequence) as usize;
        self.acknowledged = receive_sequence % MODULUS;
        self.in_flight.drain(..count).collect()
    }

    /// Remove the frame with N(S) `sequence` and every frame after it
    ///
    /// V(S) rolls back to `sequence`. Used when a frame fails.
    pub fn truncate_from(&mut self, sequence: u8) -> Vec<(u8, T)> {
        let index = seq_distance(self.acknowledged, sequence) as usize;
        if index >= self.in_flight.len() {
            return Vec::new();
        }
        self.in_flight.drain(index..).collect()
    }

    pub fn get(&self, sequence: u8) -> Option<&T> {
        self.in_flight
            .iter()
            .find(|(ns, _)| *ns == sequence)
            .map(|(_, item)| item)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (u8, T)> {
        self.in_flight.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn window_size(&self) -> u8 {
        self.window_size
    }

    pub fn set_window_size(&mut self, window_size: u8) -> DlmsResult<()> {
        check_window_size(window_size)?;
        self.window_size = window_size;
        Ok(())
    }

    /// Drop everything in flight and restart at sequence 0
    pub fn reset(&mut self) -> Vec<(u8, T)> {
        self.acknowledged = 0;
        self.in_flight.drain(..).collect()
    }
}

fn check_window_size(window_size: u8) -> DlmsResult<()> {
    if window_size == 0 || window_size > MAX_WINDOW_SIZE {
        return Err(DlmsError::InvalidData(format!(
            "Window size must be 1-{}, got {}",
            MAX_WINDOW_SIZE, window_size
        )));
    }
    Ok(())
}

/// Inbound sequence tracking
///
/// Frames are accepted strictly in order; V(R) advances only on accept.
#[derive(Debug, Default)]
pub struct ReceiveWindow {
    expected_sequence: u8,
}

impl ReceiveWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_expected(&self, sequence: u8) -> bool {
        sequence == self.expected_sequence
    }

    pub fn accept(&mut self, sequence: u8) -> DlmsResult<()> {
        if !self.is_expected(sequence) {
            return Err(DlmsError::InvalidFrame(format!(
                "Sequence number mismatch: expected {}, got {}",
                self.expected_sequence, sequence
            )));
        }
        self.expected_sequence = (self.expected_sequence + 1) % MODULUS;
        Ok(())
    }

    /// V(R), carried as N(R) in frames we send
    pub fn expected_sequence(&self) -> u8 {
        self.expected_sequence
    }

    pub fn reset(&mut self) {
        self.expected_sequence = 0;
    }
}
