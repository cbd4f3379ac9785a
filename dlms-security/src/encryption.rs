//! AES-GCM-128 ciphering of xDLMS APDUs
//!
//! A protected APDU is laid out as
//! `0xDB | security control | frame counter (u32 BE) | ciphertext | tag`.
//! The GCM nonce is the sender's system title followed by the frame
//! counter; the additional data is the security control byte, plus the
//! authentication key when one is configured.

use crate::access::{AccessControl, AccessLevel};
use crate::provider::SecurityProvider;
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes128Gcm, Key, Nonce,
};
use bytes::{BufMut, Bytes, BytesMut};
use dlms_core::{DlmsError, DlmsResult, ObisCode};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Tag of a globally ciphered APDU
pub const GLO_CIPHERED_APDU: u8 = 0xDB;
pub const KEY_LENGTH: usize = 16;
pub const GCM_TAG_LENGTH: usize = 16;
const HEADER_LENGTH: usize = 6;

/// Security control byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityControl {
    byte: u8,
}

impl SecurityControl {
    pub fn new(security_suite_id: u8, authenticated: bool, encrypted: bool, key_set: bool) -> Self {
        let mut byte = security_suite_id & 0x0F;
        if authenticated {
            byte |= 0x10;
        }
        if encrypted {
            byte |= 0x20;
        }
        if key_set {
            byte |= 0x40;
        }
        Self { byte }
    }

    pub fn from_byte(byte: u8) -> Self {
        Self { byte }
    }

    pub fn to_byte(&self) -> u8 {
        self.byte
    }

    pub fn security_suite_id(&self) -> u8 {
        self.byte & 0x0F
    }

    pub fn is_authenticated(&self) -> bool {
        (self.byte & 0x10) != 0
    }

    pub fn is_encrypted(&self) -> bool {
        (self.byte & 0x20) != 0
    }

    /// Broadcast key in use
    pub fn is_key_set(&self) -> bool {
        (self.byte & 0x40) != 0
    }
}

/// 8-byte system title identifying a client or a meter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemTitle([u8; 8]);

impl SystemTitle {
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> DlmsResult<Self> {
        let bytes: [u8; 8] = bytes.try_into().map_err(|_| {
            DlmsError::Security(format!("System title must be 8 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for SystemTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

/// Invocation counter for outbound APDUs
#[derive(Debug, Default)]
pub struct FrameCounter {
    value: AtomicU32,
}

impl FrameCounter {
    pub fn with_initial(initial: u32) -> Self {
        Self {
            value: AtomicU32::new(initial),
        }
    }

    /// Value the next APDU will carry
    pub fn get(&self) -> u32 {
        self.value.load(Ordering::SeqCst)
    }

    /// Take the current value and advance
    ///
    /// Fails once the counter space is exhausted; a nonce must never repeat.
    pub fn next(&self) -> DlmsResult<u32> {
        self.value
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_add(1))
            .map_err(|_| DlmsError::Security("Frame counter exhausted".to_string()))
    }
}

/// AES-GCM-128 security provider with optional access rights table
pub struct AesGcmSecurity {
    cipher: Aes128Gcm,
    authentication_key: Option<[u8; KEY_LENGTH]>,
    local_title: SystemTitle,
    peer_title: SystemTitle,
    send_counter: FrameCounter,
    last_received: Mutex<Option<u32>>,
    access: Option<AccessControl>,
}

impl AesGcmSecurity {
    /// Create a provider from the block cipher key and both system titles
    ///
    /// # Errors
    ///
    /// Returns `Security` if the key is not 16 bytes
    pub fn new(key: &[u8], local_title: SystemTitle, peer_title: SystemTitle) -> DlmsResult<Self> {
        if key.len() != KEY_LENGTH {
            return Err(DlmsError::Security(format!(
                "Invalid AES-128 key length: expected {} bytes, got {}",
                KEY_LENGTH,
                key.len()
            )));
        }
        let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key));
        Ok(Self {
            cipher,
            authentication_key: None,
            local_title,
            peer_title,
            send_counter: FrameCounter::default(),
            last_received: Mutex::new(None),
            access: None,
        })
    }

    /// Bind the authentication key into the additional data
    pub fn with_authentication_key(mut self, key: &[u8]) -> DlmsResult<Self> {
        let key: [u8; KEY_LENGTH] = key.try_into().map_err(|_| {
            DlmsError::Security(format!(
                "Invalid authentication key length: expected {} bytes, got {}",
                KEY_LENGTH,
                key.len()
            ))
        })?;
        self.authentication_key = Some(key);
        Ok(self)
    }

    pub fn with_access_control(mut self, access: AccessControl) -> Self {
        self.access = Some(access);
        self
    }

    /// Resume from a persisted invocation counter
    pub fn with_initial_counter(mut self, counter: u32) -> Self {
        self.send_counter = FrameCounter::with_initial(counter);
        self
    }

    pub fn send_counter(&self) -> u32 {
        self.send_counter.get()
    }

    fn security_control(&self) -> SecurityControl {
        SecurityControl::new(0, self.authentication_key.is_some(), true, false)
    }

    fn additional_data(&self, control: SecurityControl) -> Vec<u8> {
        let mut aad = Vec::with_capacity(1 + KEY_LENGTH);
        aad.push(control.to_byte());
        if control.is_authenticated() {
            if let Some(key) = &self.authentication_key {
                aad.extend_from_slice(key);
            }
        }
        aad
    }

    fn nonce(title: &SystemTitle, counter: u32) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[..8].copy_from_slice(title.as_bytes());
        nonce[8..].copy_from_slice(&counter.to_be_bytes());
        nonce
    }
}

impl SecurityProvider for AesGcmSecurity {
    fn encrypt(&self, plaintext: &[u8]) -> DlmsResult<Bytes> {
        let counter = self.send_counter.next()?;
        let control = self.security_control();
        let aad = self.additional_data(control);
        let nonce = Self::nonce(&self.local_title, counter);

        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| DlmsError::Security("Encryption failed".to_string()))?;

        let mut out = BytesMut::with_capacity(HEADER_LENGTH + ciphertext.len());
        out.put_u8(GLO_CIPHERED_APDU);
        out.put_u8(control.to_byte());
        out.put_u32(counter);
        out.put_slice(&ciphertext);
        Ok(out.freeze())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> DlmsResult<Bytes> {
        if ciphertext.len() < HEADER_LENGTH + GCM_TAG_LENGTH
            || ciphertext[0] != GLO_CIPHERED_APDU
        {
            return Err(DlmsError::Security("Malformed ciphered APDU".to_string()));
        }
        let control = SecurityControl::from_byte(ciphertext[1]);
        if !control.is_encrypted() || control.is_authenticated() != self.authentication_key.is_some() {
            return Err(DlmsError::Security(format!(
                "Unsupported security control 0x{:02X}",
                control.to_byte()
            )));
        }
        let counter = u32::from_be_bytes([ciphertext[2], ciphertext[3], ciphertext[4], ciphertext[5]]);

        let mut last_received = self
            .last_received
            .lock()
            .map_err(|_| DlmsError::Security("Receive counter unavailable".to_string()))?;
        if last_received.is_some_and(|last| counter <= last) {
            log::warn!("Replayed frame counter {} from {}", counter, self.peer_title);
            return Err(DlmsError::Security(format!("Replayed frame counter {}", counter)));
        }

        let aad = self.additional_data(control);
        let nonce = Self::nonce(&self.peer_title, counter);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &ciphertext[HEADER_LENGTH..],
                    aad: &aad,
                },
            )
            .map_err(|_| DlmsError::Security("Authentication tag check failed".to_string()))?;
        *last_received = Some(counter);
        Ok(Bytes::from(plaintext))
    }

    fn authorize(&self, client_id: u16, logical_name: &ObisCode, required: AccessLevel) -> bool {
        self.access
            .as_ref()
            .is_none_or(|table| table.permits(client_id, logical_name, required))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_TITLE: SystemTitle = SystemTitle::new(*b"CLI00001");
    const METER_TITLE: SystemTitle = SystemTitle::new(*b"MTR00001");
    const KEY: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
    ];

    fn pair() -> (AesGcmSecurity, AesGcmSecurity) {
        (
            AesGcmSecurity::new(&KEY, CLIENT_TITLE, METER_TITLE).unwrap(),
            AesGcmSecurity::new(&KEY, METER_TITLE, CLIENT_TITLE).unwrap(),
        )
    }

    #[test]
    fn test_ciphered_apdu_layout() {
        let (client, meter) = pair();
        let apdu = [0xC0, 0x01, 0xC1, 0x00, 0x03];
        let protected = client.encrypt(&apdu).unwrap();

        assert_eq!(protected[0], GLO_CIPHERED_APDU);
        assert_eq!(protected[1], 0x20);
        assert_eq!(&protected[2..6], &[0, 0, 0, 0]);
        assert_eq!(protected.len(), HEADER_LENGTH + apdu.len() + GCM_TAG_LENGTH);
        assert_eq!(meter.decrypt(&protected).unwrap().as_ref(), &apdu);
        assert_eq!(client.send_counter(), 1);
    }

    #[test]
    fn test_tampered_apdu_rejected_without_leaking() {
        let (client, meter) = pair();
        let mut protected = client.encrypt(b"secret reading").unwrap().to_vec();
        let last = protected.len() - 1;
        protected[last] ^= 0x80;

        let err = meter.decrypt(&protected).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, DlmsError::Security(_)));
        assert!(!message.contains("secret"));
    }

    #[test]
    fn test_replayed_counter_rejected() {
        let (client, meter) = pair();
        let first = client.encrypt(b"one").unwrap();
        let second = client.encrypt(b"two").unwrap();

        meter.decrypt(&second).unwrap();
        assert!(meter.decrypt(&first).is_err());
        assert!(meter.decrypt(&second).is_err());
    }

    #[test]
    fn test_authentication_key_must_match() {
        let client = AesGcmSecurity::new(&KEY, CLIENT_TITLE, METER_TITLE)
            .unwrap()
            .with_authentication_key(&[0xAA; 16])
            .unwrap();
        let meter = AesGcmSecurity::new(&KEY, METER_TITLE, CLIENT_TITLE)
            .unwrap()
            .with_authentication_key(&[0xBB; 16])
            .unwrap();
        let protected = client.encrypt(b"data").unwrap();
        assert_eq!(protected[1], 0x30);
        assert!(meter.decrypt(&protected).is_err());
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(AesGcmSecurity::new(&[0u8; 15], CLIENT_TITLE, METER_TITLE).is_err());
        assert!(SystemTitle::from_slice(&[0u8; 7]).is_err());
    }

    #[test]
    fn test_authorize_uses_access_table() {
        let energy = ObisCode::new(1, 0, 1, 8, 0, 255);
        let (client, _) = pair();
        assert!(client.authorize(16, &energy, AccessLevel::Write));

        let client = client.with_access_control(
            AccessControl::new(AccessLevel::NoAccess).with_client(16, AccessLevel::Read),
        );
        assert!(client.authorize(16, &energy, AccessLevel::Read));
        assert!(!client.authorize(16, &energy, AccessLevel::Write));
    }

    #[test]
    fn test_security_control_bits() {
        let ctrl = SecurityControl::new(0, true, true, false);
        assert!(ctrl.is_authenticated());
        assert!(ctrl.is_encrypted());
        assert!(!ctrl.is_key_set());
        assert_eq!(ctrl.security_suite_id(), 0);
    }
}
