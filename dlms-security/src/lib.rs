//! Security boundary for the DLMS/COSEM protocol
//!
//! The application layer only sees [`SecurityProvider`]: encrypt, decrypt and
//! authorize. Key management lives outside this crate.

pub mod access;
pub mod encryption;
pub mod provider;

pub use access::{AccessControl, AccessLevel};
pub use encryption::{AesGcmSecurity, FrameCounter, SecurityControl, SystemTitle};
pub use provider::{NullSecurity, SecurityProvider};

#[cfg(any(test, feature = "mock"))]
pub use provider::MockSecurityProvider;
