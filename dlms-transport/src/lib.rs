//! Transport layer for DLMS/COSEM
//!
//! A transport moves raw bytes between the HDLC link and the physical
//! carrier. It knows nothing about frames: inbound bytes may arrive split or
//! merged arbitrarily and the link reassembles them.
//!
//! - [`StreamAccessor`]: the byte stream contract
//! - [`IoTransport`]: any Tokio `AsyncRead + AsyncWrite` stream
//! - [`TcpTransport`]: TCP client connection
//! - [`pump`]: moves bytes between a stream and a link until either side ends

pub mod io;
pub mod pump;
pub mod stream;
pub mod tcp;

pub use io::IoTransport;
pub use pump::pump;
pub use stream::{StreamAccessor, TransportLayer};
pub use tcp::{TcpSettings, TcpTransport};
