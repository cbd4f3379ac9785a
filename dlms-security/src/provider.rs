//! Security provider contract used by the application layer

use crate::access::AccessLevel;
use bytes::Bytes;
use dlms_core::{DlmsResult, ObisCode};

/// Protection and authorization hooks for xDLMS APDUs
///
/// Errors returned by `encrypt`/`decrypt` must not carry ciphertext or key
/// material in their message.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait SecurityProvider: Send + Sync {
    /// Protect an outbound APDU
    fn encrypt(&self, plaintext: &[u8]) -> DlmsResult<Bytes>;

    /// Unprotect an inbound APDU
    fn decrypt(&self, ciphertext: &[u8]) -> DlmsResult<Bytes>;

    /// Whether `client_id` may use `logical_name` at `required` level
    fn authorize(&self, client_id: u16, logical_name: &ObisCode, required: AccessLevel) -> bool;
}

/// Pass-through provider: no ciphering, everything authorized
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSecurity;

impl SecurityProvider for NullSecurity {
    fn encrypt(&self, plaintext: &[u8]) -> DlmsResult<Bytes> {
        Ok(Bytes::copy_from_slice(plaintext))
    }

    fn decrypt(&self, ciphertext: &[u8]) -> DlmsResult<Bytes> {
        Ok(Bytes::copy_from_slice(ciphertext))
    }

    fn authorize(&self, _client_id: u16, _logical_name: &ObisCode, _required: AccessLevel) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlms_core::DlmsError;

    #[test]
    fn test_null_security_passes_through() {
        let provider = NullSecurity;
        let apdu = [0xC0, 0x01, 0xC1];
        assert_eq!(provider.encrypt(&apdu).unwrap().as_ref(), &apdu);
        assert_eq!(provider.decrypt(&apdu).unwrap().as_ref(), &apdu);
        assert!(provider.authorize(1, &ObisCode::new(0, 0, 1, 0, 0, 255), AccessLevel::ReadWrite));
    }

    #[test]
    fn test_mock_provider_denies() {
        let mut mock = MockSecurityProvider::new();
        mock.expect_authorize().returning(|_, _, level| level == AccessLevel::Read);
        mock.expect_decrypt()
            .returning(|_| Err(DlmsError::Security("Authentication tag check failed".into())));

        let provider: &dyn SecurityProvider = &mock;
        let obis = ObisCode::new(1, 0, 1, 8, 0, 255);
        assert!(provider.authorize(16, &obis, AccessLevel::Read));
        assert!(!provider.authorize(16, &obis, AccessLevel::Write));
        assert!(provider.decrypt(&[0xDB]).is_err());
    }
}
