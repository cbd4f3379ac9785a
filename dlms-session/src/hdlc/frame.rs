//! HDLC frame structure and encoding/decoding
//!
//! Unescaped frame content:
//!
//! ```text
//! [format][dst upper][dst lower][src upper][src lower][control][payload..][HCS lo][HCS hi][FCS lo][FCS hi]
//! ```
//!
//! The HCS covers the format and address bytes, the FCS covers everything
//! before the HCS. On the wire the content is byte-stuffed and wrapped in
//! `FLAG` bytes.

use crate::hdlc::address::HdlcAddress;
use crate::hdlc::fcs::crc16;
use bytes::{BufMut, Bytes, BytesMut};
use dlms_core::{ChecksumKind, DlmsError, DlmsResult};
use std::fmt;

/// HDLC frame flag
pub const FLAG: u8 = 0x7E;

/// Control escape byte
pub const ESCAPE: u8 = 0x7D;

/// XOR mask applied to an escaped byte
pub const ESCAPE_MASK: u8 = 0x20;

/// Poll/final bit of the control byte
pub const POLL_FINAL: u8 = 0x10;

/// Format byte of segmented Type-1 frames
const SEGMENTED_FORMAT: u8 = 0xA8;

const HEADER_LEN: usize = 6;
const CHECKSUM_LEN: usize = 4;
const MIN_CONTENT_LEN: usize = HEADER_LEN + CHECKSUM_LEN;

/// Wire layout, selected by the format byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Information frames (`0xA0`, `0xA8` when segmented)
    Type1,
    /// Supervisory frames (`0xB0`)
    Type2,
    /// Unnumbered frames (`0xC0`)
    Type3,
}

impl FrameFormat {
    pub fn format_byte(self, segmented: bool) -> u8 {
        match self {
            FrameFormat::Type1 if segmented => SEGMENTED_FORMAT,
            FrameFormat::Type1 => 0xA0,
            FrameFormat::Type2 => 0xB0,
            FrameFormat::Type3 => 0xC0,
        }
    }

    /// Returns the format and the segmentation flag
    pub fn from_format_byte(value: u8) -> DlmsResult<(Self, bool)> {
        match value {
            0xA0 => Ok((FrameFormat::Type1, false)),
            SEGMENTED_FORMAT => Ok((FrameFormat::Type1, true)),
            0xB0 => Ok((FrameFormat::Type2, false)),
            0xC0 => Ok((FrameFormat::Type3, false)),
            _ => Err(DlmsError::InvalidFrame(format!(
                "Illegal frame format: 0x{:02X}",
                value
            ))),
        }
    }
}

/// HDLC frame type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Information,
    ReceiveReady,
    ReceiveNotReady,
    Reject,
    SetNormalResponseMode,
    UnnumberedAcknowledge,
    DisconnectMode,
    Disconnect,
    FrameReject,
}

impl FrameType {
    /// Control code with sequence numbers and the P/F bit cleared
    pub fn code(self) -> u8 {
        match self {
            FrameType::Information => 0x00,
            FrameType::ReceiveReady => 0x01,
            FrameType::ReceiveNotReady => 0x05,
            FrameType::Reject => 0x09,
            FrameType::SetNormalResponseMode => 0x83,
            FrameType::UnnumberedAcknowledge => 0x63,
            FrameType::DisconnectMode => 0x0F,
            FrameType::Disconnect => 0x43,
            FrameType::FrameReject => 0x87,
        }
    }

    /// The wire layout frames of this type use
    pub fn format(self) -> FrameFormat {
        match self {
            FrameType::Information => FrameFormat::Type1,
            FrameType::ReceiveReady | FrameType::ReceiveNotReady | FrameType::Reject => {
                FrameFormat::Type2
            }
            _ => FrameFormat::Type3,
        }
    }

    /// Resolve the control byte under the given format
    pub fn from_control_byte(format: FrameFormat, control: u8) -> DlmsResult<Self> {
        let frame_type = match format {
            FrameFormat::Type1 if control & 0x01 == 0x00 => Some(FrameType::Information),
            FrameFormat::Type1 => None,
            FrameFormat::Type2 => match control & 0x0F {
                0x01 => Some(FrameType::ReceiveReady),
                0x05 => Some(FrameType::ReceiveNotReady),
                0x09 => Some(FrameType::Reject),
                _ => None,
            },
            FrameFormat::Type3 => match control & !POLL_FINAL {
                0x83 => Some(FrameType::SetNormalResponseMode),
                0x63 => Some(FrameType::UnnumberedAcknowledge),
                0x0F => Some(FrameType::DisconnectMode),
                0x43 => Some(FrameType::Disconnect),
                0x87 => Some(FrameType::FrameReject),
                _ => None,
            },
        };
        frame_type.ok_or_else(|| {
            DlmsError::InvalidFrame(format!(
                "Control field unknown for {:?}: 0x{:02X}",
                format, control
            ))
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::Information => "I",
            FrameType::ReceiveReady => "RR",
            FrameType::ReceiveNotReady => "RNR",
            FrameType::Reject => "REJ",
            FrameType::SetNormalResponseMode => "SNRM",
            FrameType::UnnumberedAcknowledge => "UA",
            FrameType::DisconnectMode => "DM",
            FrameType::Disconnect => "DISC",
            FrameType::FrameReject => "FRMR",
        }
    }
}

/// An HDLC frame as a value
///
/// Encoding and decoding only touch the wire representation; the logical
/// fields of a frame never change once it is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdlcFrame {
    pub frame_type: FrameType,
    pub destination: HdlcAddress,
    pub source: HdlcAddress,
    pub payload: Bytes,
    /// N(S), meaningful for information frames
    pub send_sequence: u8,
    /// N(R), meaningful for information and supervisory frames
    pub receive_sequence: u8,
    /// Poll on commands, final on responses
    pub poll_final: bool,
    /// Information frame whose payload continues in the next frame
    pub segmented: bool,
}

impl HdlcFrame {
    /// Build a Type-1 information frame
    pub fn information(
        destination: HdlcAddress,
        source: HdlcAddress,
        send_sequence: u8,
        receive_sequence: u8,
        payload: Bytes,
    ) -> Self {
        Self {
            frame_type: FrameType::Information,
            destination,
            source,
            payload,
            send_sequence: send_sequence & 0x07,
            receive_sequence: receive_sequence & 0x07,
            poll_final: true,
            segmented: false,
        }
    }

    /// Build a Type-2 supervisory frame (RR, RNR or REJ)
    pub fn supervisory(
        frame_type: FrameType,
        destination: HdlcAddress,
        source: HdlcAddress,
        receive_sequence: u8,
    ) -> Self {
        Self {
            frame_type,
            destination,
            source,
            payload: Bytes::new(),
            send_sequence: 0,
            receive_sequence: receive_sequence & 0x07,
            poll_final: true,
            segmented: false,
        }
    }

    /// Build a Type-3 unnumbered frame, optionally carrying parameters
    pub fn unnumbered(
        frame_type: FrameType,
        destination: HdlcAddress,
        source: HdlcAddress,
        payload: Bytes,
    ) -> Self {
        Self {
            frame_type,
            destination,
            source,
            payload,
            send_sequence: 0,
            receive_sequence: 0,
            poll_final: true,
            segmented: false,
        }
    }

    pub fn with_segmented(mut self, segmented: bool) -> Self {
        self.segmented = segmented;
        self
    }

    pub fn with_poll_final(mut self, poll_final: bool) -> Self {
        self.poll_final = poll_final;
        self
    }

    pub fn format(&self) -> FrameFormat {
        self.frame_type.format()
    }

    /// Compute the control byte for this frame's format
    pub fn control_byte(&self) -> u8 {
        let pf = if self.poll_final { POLL_FINAL } else { 0 };
        match self.format() {
            FrameFormat::Type1 => {
                (self.send_sequence & 0x07) << 1 | (self.receive_sequence & 0x07) << 5 | pf
            }
            FrameFormat::Type2 => {
                self.frame_type.code() | (self.receive_sequence & 0x07) << 5 | pf
            }
            FrameFormat::Type3 => self.frame_type.code() | pf,
        }
    }

    /// Unescaped content: header, payload, HCS and FCS
    pub fn encode_content(&self) -> BytesMut {
        let mut body = BytesMut::with_capacity(MIN_CONTENT_LEN + self.payload.len());
        let segmented = self.segmented && self.format() == FrameFormat::Type1;
        body.put_u8(self.format().format_byte(segmented));
        body.put_slice(&self.destination.to_bytes());
        body.put_slice(&self.source.to_bytes());
        body.put_u8(self.control_byte());
        body.put_slice(&self.payload);

        let hcs = crc16(&body[..5]);
        let fcs = crc16(&body);
        body.put_u16_le(hcs);
        body.put_u16_le(fcs);
        body
    }

    /// Encode to wire bytes: `FLAG | stuffed content | FLAG`
    pub fn encode(&self) -> Bytes {
        let content = self.encode_content();
        let mut out = BytesMut::with_capacity(content.len() + content.len() / 8 + 2);
        out.put_u8(FLAG);
        stuff_into(&content, &mut out);
        out.put_u8(FLAG);
        out.freeze()
    }

    /// Decode one frame from wire bytes
    ///
    /// Uses the first and the last `FLAG` in `bytes` as delimiters. Both
    /// check sequences are verified before the control byte is interpreted.
    pub fn decode(bytes: &[u8]) -> DlmsResult<Self> {
        let start = bytes.iter().position(|b| *b == FLAG);
        let end = bytes.iter().rposition(|b| *b == FLAG);
        let (start, end) = match (start, end) {
            (Some(s), Some(e)) if s < e => (s, e),
            _ => {
                return Err(DlmsError::InvalidFrame(
                    "Frame must be delimited by two flags".to_string(),
                ))
            }
        };
        let content = unstuff(&bytes[start + 1..end])?;
        Self::decode_content(&content)
    }

    /// Decode unescaped content (no flags)
    pub fn decode_content(content: &[u8]) -> DlmsResult<Self> {
        if content.len() < MIN_CONTENT_LEN {
            return Err(DlmsError::InvalidFrame(format!(
                "Frame too short: {} bytes",
                content.len()
            )));
        }
        let fcs_at = content.len() - 2;
        let hcs_at = content.len() - CHECKSUM_LEN;

        let expected_hcs = u16::from_le_bytes([content[hcs_at], content[hcs_at + 1]]);
        let actual_hcs = crc16(&content[..5]);
        if expected_hcs != actual_hcs {
            return Err(DlmsError::ChecksumMismatch {
                kind: ChecksumKind::Header,
                expected: expected_hcs,
                actual: actual_hcs,
            });
        }
        let expected_fcs = u16::from_le_bytes([content[fcs_at], content[fcs_at + 1]]);
        let actual_fcs = crc16(&content[..hcs_at]);
        if expected_fcs != actual_fcs {
            return Err(DlmsError::ChecksumMismatch {
                kind: ChecksumKind::Frame,
                expected: expected_fcs,
                actual: actual_fcs,
            });
        }

        let (format, segmented) = FrameFormat::from_format_byte(content[0])?;
        let control = content[5];
        let frame_type = FrameType::from_control_byte(format, control)?;
        let (send_sequence, receive_sequence) = match format {
            FrameFormat::Type1 => ((control >> 1) & 0x07, (control >> 5) & 0x07),
            FrameFormat::Type2 => (0, (control >> 5) & 0x07),
            FrameFormat::Type3 => (0, 0),
        };

        Ok(Self {
            frame_type,
            destination: HdlcAddress::new(content[1], content[2]),
            source: HdlcAddress::new(content[3], content[4]),
            payload: Bytes::copy_from_slice(&content[HEADER_LEN..hcs_at]),
            send_sequence,
            receive_sequence,
            poll_final: control & POLL_FINAL != 0,
            segmented,
        })
    }
}

impl fmt::Display for HdlcFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}->{}",
            self.frame_type.as_str(),
            self.source,
            self.destination
        )?;
        match self.format() {
            FrameFormat::Type1 => write!(
                f,
                " N(S)={} N(R)={}{} len={}",
                self.send_sequence,
                self.receive_sequence,
                if self.segmented { " seg" } else { "" },
                self.payload.len()
            ),
            FrameFormat::Type2 => write!(f, " N(R)={}", self.receive_sequence),
            FrameFormat::Type3 => Ok(()),
        }
    }
}

/// Byte-stuff `content` into `out`
pub fn stuff_into(content: &[u8], out: &mut BytesMut) {
    for &byte in content {
        if byte == FLAG || byte == ESCAPE {
            out.put_u8(ESCAPE);
            out.put_u8(byte ^ ESCAPE_MASK);
        } else {
            out.put_u8(byte);
        }
    }
}

/// Undo byte stuffing
///
/// Fails when the escape byte is the last byte.
pub fn unstuff(stuffed: &[u8]) -> DlmsResult<BytesMut> {
    let mut out = BytesMut::with_capacity(stuffed.len());
    let mut iter = stuffed.iter();
    while let Some(&byte) = iter.next() {
        if byte == ESCAPE {
            match iter.next() {
                Some(&next) => out.put_u8(next ^ ESCAPE_MASK),
                None => {
                    return Err(DlmsError::InvalidFrame(
                        "Incomplete escape sequence".to_string(),
                    ))
                }
            }
        } else {
            out.put_u8(byte);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SERVER: HdlcAddress = HdlcAddress::new(0x01, 0x01);
    const CLIENT: HdlcAddress = HdlcAddress::new(0x02, 0x02);

    #[test]
    fn test_snrm_layout() {
        let frame = HdlcFrame::unnumbered(
            FrameType::SetNormalResponseMode,
            SERVER,
            CLIENT,
            Bytes::new(),
        );
        let bytes = frame.encode();
        assert_eq!(bytes[0], FLAG);
        assert_eq!(&bytes[1..7], &[0xC0, 0x01, 0x01, 0x02, 0x02, 0x93]);
        assert_eq!(bytes.len(), 12);
        assert_eq!(*bytes.last().unwrap(), FLAG);
    }

    #[test]
    fn test_control_bytes() {
        let i = HdlcFrame::information(SERVER, CLIENT, 3, 5, Bytes::new());
        assert_eq!(i.control_byte(), 3 << 1 | 5 << 5 | POLL_FINAL);
        let rr = HdlcFrame::supervisory(FrameType::ReceiveReady, SERVER, CLIENT, 2)
            .with_poll_final(false);
        assert_eq!(rr.control_byte(), 0x41);
        let ua = HdlcFrame::unnumbered(FrameType::UnnumberedAcknowledge, SERVER, CLIENT, Bytes::new());
        assert_eq!(ua.control_byte(), 0x73);
    }

    #[test]
    fn test_escaped_payload_round_trip() {
        let payload = Bytes::from_static(&[0x7E, 0x7D, 0x03, 0x04]);
        let frame = HdlcFrame::information(SERVER, CLIENT, 0, 0, payload.clone());
        let wire = frame.encode();
        assert!(!wire[1..wire.len() - 1].contains(&FLAG));
        let decoded = HdlcFrame::decode(&wire).unwrap();
        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_segmented_flag() {
        let frame = HdlcFrame::information(SERVER, CLIENT, 1, 0, Bytes::from_static(b"abc"))
            .with_segmented(true);
        let wire = frame.encode();
        assert_eq!(wire[1], 0xA8);
        assert!(HdlcFrame::decode(&wire).unwrap().segmented);
    }

    #[test]
    fn test_missing_flags() {
        let wire = HdlcFrame::supervisory(FrameType::ReceiveReady, SERVER, CLIENT, 0).encode();
        assert!(matches!(
            HdlcFrame::decode(&wire[..wire.len() - 1]),
            Err(DlmsError::InvalidFrame(_))
        ));
        assert!(matches!(HdlcFrame::decode(&[FLAG]), Err(DlmsError::InvalidFrame(_))));
    }

    #[test]
    fn test_incomplete_escape() {
        let wire = [FLAG, 0xA0, 0x01, ESCAPE, FLAG];
        assert!(matches!(
            HdlcFrame::decode(&wire),
            Err(DlmsError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_too_short() {
        let wire = [FLAG, 0xA0, 0x01, 0x01, 0x02, FLAG];
        assert!(matches!(
            HdlcFrame::decode(&wire),
            Err(DlmsError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_header_corruption_reported_as_hcs() {
        let frame = HdlcFrame::information(SERVER, CLIENT, 0, 0, Bytes::from_static(b"x"));
        let mut content = frame.encode_content();
        content[2] ^= 0x04;
        assert!(matches!(
            HdlcFrame::decode_content(&content),
            Err(DlmsError::ChecksumMismatch {
                kind: ChecksumKind::Header,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_is_repeatable() {
        let wire = HdlcFrame::information(SERVER, CLIENT, 2, 1, Bytes::from_static(b"abc")).encode();
        assert_eq!(HdlcFrame::decode(&wire).unwrap(), HdlcFrame::decode(&wire).unwrap());
    }

    fn any_frame() -> impl Strategy<Value = HdlcFrame> {
        let frame_type = prop_oneof![
            Just(FrameType::Information),
            Just(FrameType::ReceiveReady),
            Just(FrameType::ReceiveNotReady),
            Just(FrameType::Reject),
            Just(FrameType::SetNormalResponseMode),
            Just(FrameType::UnnumberedAcknowledge),
            Just(FrameType::DisconnectMode),
            Just(FrameType::Disconnect),
            Just(FrameType::FrameReject),
        ];
        (
            frame_type,
            any::<[u8; 4]>(),
            0u8..8,
            0u8..8,
            any::<bool>(),
            any::<bool>(),
            proptest::collection::vec(any::<u8>(), 0..64),
        )
            .prop_map(|(frame_type, addr, ns, nr, pf, seg, payload)| {
                let destination = HdlcAddress::new(addr[0], addr[1]);
                let source = HdlcAddress::new(addr[2], addr[3]);
                let frame = match frame_type.format() {
                    FrameFormat::Type1 => {
                        HdlcFrame::information(destination, source, ns, nr, payload.into())
                            .with_segmented(seg)
                    }
                    FrameFormat::Type2 => {
                        HdlcFrame::supervisory(frame_type, destination, source, nr)
                    }
                    FrameFormat::Type3 => {
                        HdlcFrame::unnumbered(frame_type, destination, source, payload.into())
                    }
                };
                frame.with_poll_final(pf)
            })
    }

    proptest! {
        #[test]
        fn prop_round_trip(frame in any_frame()) {
            let decoded = HdlcFrame::decode(&frame.encode()).unwrap();
            prop_assert_eq!(decoded, frame);
        }

        #[test]
        fn prop_single_bit_flip_detected(frame in any_frame(), bit in any::<usize>()) {
            let mut content = frame.encode_content();
            let bit = bit % (content.len() * 8);
            content[bit / 8] ^= 1 << (bit % 8);
            let mut wire = BytesMut::new();
            wire.put_u8(FLAG);
            stuff_into(&content, &mut wire);
            wire.put_u8(FLAG);
            let is_checksum_error = matches!(
                HdlcFrame::decode(&wire),
                Err(DlmsError::ChecksumMismatch { .. })
            );
            prop_assert!(is_checksum_error);
        }
    }
}
