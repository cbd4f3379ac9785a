//! HDLC statistics collection

/// Link-level counters
///
/// Updated by the link layer as frames come and go. Decode failures are
/// counted here and never surface to application callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HdlcStatistics {
    pub frames_sent: u64,
    pub frames_received: u64,
    /// Frames discarded after decoding (wrong address, wrong state, FRMR)
    pub frames_rejected: u64,
    pub timeouts: u64,
    /// Frame check sequence failures
    pub fcs_errors: u64,
    /// Header check sequence failures
    pub hcs_errors: u64,
    /// Malformed frames (flags, escapes, length, control byte)
    pub invalid_frames: u64,
    /// Information or supervisory frames with unexpected N(S)/N(R)
    pub sequence_errors: u64,
    pub retransmissions: u64,
}

impl HdlcStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Errors as a percentage of all frames seen
    pub fn error_rate(&self) -> f64 {
        let total_errors = self.frames_rejected
            + self.fcs_errors
            + self.hcs_errors
            + self.invalid_frames
            + self.sequence_errors;
        let total_frames = self.frames_received + self.frames_sent;
        if total_frames == 0 {
            0.0
        } else {
            (total_errors as f64 / total_frames as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_rate() {
        let mut stats = HdlcStatistics::new();
        assert_eq!(stats.error_rate(), 0.0);
        stats.frames_sent = 6;
        stats.frames_received = 4;
        stats.fcs_errors = 1;
        assert!((stats.error_rate() - 10.0).abs() < f64::EPSILON);
        stats.clear();
        assert_eq!(stats, HdlcStatistics::default());
    }
}
