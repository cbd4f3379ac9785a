//! SNRM/UA link parameter negotiation
//!
//! Parameters travel in the information field of SNRM and UA as one
//! parameter group:
//!
//! ```text
//! 0x81 0x80 <group len> { <id> <len> <value..> }*
//! ```
//!
//! with `0x05` max info field length transmit, `0x06` receive, `0x07`
//! window size transmit and `0x08` receive. Values are unsigned big-endian
//! of 1, 2 or 4 octets. Each side states the values from its own point of
//! view.

use crate::hdlc::config::HdlcConfig;
use crate::hdlc::window::MAX_WINDOW_SIZE;
use bytes::{BufMut, Bytes, BytesMut};
use dlms_core::{DlmsError, DlmsResult};

const FORMAT_ID: u8 = 0x81;
const GROUP_ID: u8 = 0x80;
const MAX_INFO_TX: u8 = 0x05;
const MAX_INFO_RX: u8 = 0x06;
const WINDOW_TX: u8 = 0x07;
const WINDOW_RX: u8 = 0x08;

/// Link parameters from one station's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkParameters {
    pub max_info_length_tx: u16,
    pub max_info_length_rx: u16,
    pub window_size_tx: u8,
    pub window_size_rx: u8,
}

impl LinkParameters {
    pub fn from_config(config: &HdlcConfig) -> Self {
        Self {
            max_info_length_tx: config.max_info_length,
            max_info_length_rx: config.max_info_length,
            window_size_tx: config.window_size,
            window_size_rx: config.window_size,
        }
    }

    /// Narrow our parameters by what the peer stated
    ///
    /// The peer's receive side bounds our transmit side and vice versa.
    pub fn negotiate(&self, peer: &LinkParameters) -> LinkParameters {
        LinkParameters {
            max_info_length_tx: self.max_info_length_tx.min(peer.max_info_length_rx).max(1),
            max_info_length_rx: self.max_info_length_rx.min(peer.max_info_length_tx).max(1),
            window_size_tx: self.window_size_tx.min(peer.window_size_rx).clamp(1, MAX_WINDOW_SIZE),
            window_size_rx: self.window_size_rx.min(peer.window_size_tx).clamp(1, MAX_WINDOW_SIZE),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut group = BytesMut::with_capacity(20);
        put_param(&mut group, MAX_INFO_TX, self.max_info_length_tx as u32, info_width(self.max_info_length_tx));
        put_param(&mut group, MAX_INFO_RX, self.max_info_length_rx as u32, info_width(self.max_info_length_rx));
        put_param(&mut group, WINDOW_TX, self.window_size_tx as u32, 4);
        put_param(&mut group, WINDOW_RX, self.window_size_rx as u32, 4);

        let mut out = BytesMut::with_capacity(group.len() + 3);
        out.put_u8(FORMAT_ID);
        out.put_u8(GROUP_ID);
        out.put_u8(group.len() as u8);
        out.put_slice(&group);
        out.freeze()
    }

    /// Decode a parameter group
    ///
    /// Parameters absent from the group take their default (128 octets,
    /// window 1); unknown parameter ids are skipped.
    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        if data.len() < 3 || data[0] != FORMAT_ID || data[1] != GROUP_ID {
            return Err(DlmsError::InvalidData(
                "Link parameters must start with 0x81 0x80".to_string(),
            ));
        }
        let group_len = data[2] as usize;
        let group = data.get(3..3 + group_len).ok_or_else(|| {
            DlmsError::InvalidData(format!(
                "Link parameter group truncated: {} of {} bytes",
                data.len() - 3,
                group_len
            ))
        })?;

        let mut params = LinkParameters {
            max_info_length_tx: 128,
            max_info_length_rx: 128,
            window_size_tx: 1,
            window_size_rx: 1,
        };
        let mut pos = 0;
        while pos < group.len() {
            let id = group[pos];
            let len = *group.get(pos + 1).ok_or_else(|| {
                DlmsError::InvalidData(format!("Parameter 0x{:02X} has no length", id))
            })? as usize;
            let raw = group.get(pos + 2..pos + 2 + len).ok_or_else(|| {
                DlmsError::InvalidData(format!("Parameter 0x{:02X} truncated", id))
            })?;
            if len > 4 {
                return Err(DlmsError::InvalidData(format!(
                    "Parameter 0x{:02X} too long: {} bytes",
                    id, len
                )));
            }
            let value = raw.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
            match id {
                MAX_INFO_TX => params.max_info_length_tx = clamp_u16(value),
                MAX_INFO_RX => params.max_info_length_rx = clamp_u16(value),
                WINDOW_TX => params.window_size_tx = value.clamp(1, MAX_WINDOW_SIZE as u32) as u8,
                WINDOW_RX => params.window_size_rx = value.clamp(1, MAX_WINDOW_SIZE as u32) as u8,
                other => log::debug!("Skipping unknown link parameter 0x{:02X}", other),
            }
            pos += 2 + len;
        }
        Ok(params)
    }
}

fn info_width(value: u16) -> usize {
    if value <= 0xFF { 1 } else { 2 }
}

fn clamp_u16(value: u32) -> u16 {
    value.clamp(1, u16::MAX as u32) as u16
}

fn put_param(out: &mut BytesMut, id: u8, value: u32, width: usize) {
    out.put_u8(id);
    out.put_u8(width as u8);
    out.put_slice(&value.to_be_bytes()[4 - width..]);
}
