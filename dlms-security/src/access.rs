//! Client access rights

use dlms_core::ObisCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Level of access a client holds, or a service requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AccessLevel {
    #[default]
    NoAccess,
    Read,
    Write,
    ReadWrite,
}

impl AccessLevel {
    /// Whether holding `self` satisfies a `required` level
    pub fn permits(self, required: AccessLevel) -> bool {
        match (self, required) {
            (_, AccessLevel::NoAccess) => true,
            (AccessLevel::ReadWrite, _) => true,
            (held, required) => held == required,
        }
    }

    pub fn can_read(self) -> bool {
        self.permits(AccessLevel::Read)
    }

    pub fn can_write(self) -> bool {
        self.permits(AccessLevel::Write)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::NoAccess => "no-access",
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
            AccessLevel::ReadWrite => "read-write",
        }
    }
}

/// Access rights table keyed by client id and logical name
///
/// Lookup order: per-object grant, then per-client grant, then the default.
#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    default_level: AccessLevel,
    clients: HashMap<u16, AccessLevel>,
    objects: HashMap<(u16, ObisCode), AccessLevel>,
}

impl AccessControl {
    pub fn new(default_level: AccessLevel) -> Self {
        Self {
            default_level,
            ..Self::default()
        }
    }

    /// Grant `level` on every object to `client_id`
    pub fn with_client(mut self, client_id: u16, level: AccessLevel) -> Self {
        self.clients.insert(client_id, level);
        self
    }

    /// Grant `level` on one object to `client_id`
    pub fn with_object(mut self, client_id: u16, logical_name: ObisCode, level: AccessLevel) -> Self {
        self.objects.insert((client_id, logical_name), level);
        self
    }

    pub fn level(&self, client_id: u16, logical_name: &ObisCode) -> AccessLevel {
        self.objects
            .get(&(client_id, *logical_name))
            .or_else(|| self.clients.get(&client_id))
            .copied()
            .unwrap_or(self.default_level)
    }

    pub fn permits(&self, client_id: u16, logical_name: &ObisCode, required: AccessLevel) -> bool {
        self.level(client_id, logical_name).permits(required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_permits() {
        assert!(AccessLevel::ReadWrite.permits(AccessLevel::Write));
        assert!(AccessLevel::Read.permits(AccessLevel::Read));
        assert!(!AccessLevel::Read.permits(AccessLevel::Write));
        assert!(!AccessLevel::NoAccess.permits(AccessLevel::Read));
        assert!(AccessLevel::NoAccess.permits(AccessLevel::NoAccess));
    }

    #[test]
    fn test_object_grant_overrides_client() {
        let energy = ObisCode::new(1, 0, 1, 8, 0, 255);
        let clock = ObisCode::new(0, 0, 1, 0, 0, 255);
        let table = AccessControl::new(AccessLevel::NoAccess)
            .with_client(16, AccessLevel::Read)
            .with_object(16, clock, AccessLevel::ReadWrite);

        assert!(table.permits(16, &energy, AccessLevel::Read));
        assert!(!table.permits(16, &energy, AccessLevel::Write));
        assert!(table.permits(16, &clock, AccessLevel::Write));
        assert_eq!(table.level(1, &energy), AccessLevel::NoAccess);
    }
}
