//! Frame Check Sequence (FCS) calculation for HDLC
//!
//! CRC-16/X-25: reflected polynomial 0x8408, initial value 0xFFFF, final
//! XOR 0xFFFF, bits processed least significant first. Check value for
//! `"123456789"` is `0x906E`.

const INITIAL_FCS: u16 = 0xFFFF;
const KEY: u16 = 0x8408; // Bit-reversed 1021

/// Incremental CRC-16/X-25 calculator
#[derive(Debug, Clone, Copy)]
pub struct FcsCalc {
    fcs_value: u16,
}

impl FcsCalc {
    pub fn new() -> Self {
        Self {
            fcs_value: INITIAL_FCS,
        }
    }

    pub fn reset(&mut self) {
        self.fcs_value = INITIAL_FCS;
    }

    /// Fold one byte into the running value, one bit at a time
    pub fn update(&mut self, data: u8) {
        let mut crc = self.fcs_value ^ data as u16;
        for _ in 0..8 {
            crc = if crc & 0x0001 != 0 {
                (crc >> 1) ^ KEY
            } else {
                crc >> 1
            };
        }
        self.fcs_value = crc;
    }

    pub fn update_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.update(byte);
        }
    }

    /// Final check sequence (running value XOR 0xFFFF)
    pub fn value(&self) -> u16 {
        self.fcs_value ^ 0xFFFF
    }

    /// Check sequence as transmitted on the wire (little-endian)
    pub fn value_bytes(&self) -> [u8; 2] {
        self.value().to_le_bytes()
    }
}

impl Default for FcsCalc {
    fn default() -> Self {
        Self::new()
    }
}

/// CRC-16/X-25 over a whole buffer
pub fn crc16(data: &[u8]) -> u16 {
    let mut calc = FcsCalc::new();
    calc.update_bytes(data);
    calc.value()
}
