//! DLMS/COSEM client
//!
//! [`ConnectionBuilder`] assembles a [`MeterConnection`]: one HDLC link and
//! one xDLMS application layer over a transport, driven by background
//! tasks. Connections to a fleet of meters are independent values; an
//! optional [`ConnectionRegistry`] keeps statistics about the open ones.

pub mod builder;
pub mod connection;
pub mod registry;

pub use builder::ConnectionBuilder;
pub use connection::{ConnectionState, MeterConnection};
pub use registry::{ConnectionRegistry, ConnectionStats};
