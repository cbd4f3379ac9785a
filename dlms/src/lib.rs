//! DLMS/COSEM over HDLC for smart meter communication
//!
//! The stack is split into one crate per layer and re-exported here:
//!
//! - crate root: error taxonomy, OBIS codes, data objects, result codes
//! - [`asn1`]: A-XDR encoding of data objects
//! - [`transport`]: byte stream contract, TCP and generic I/O adapters
//! - [`session`]: HDLC frames and the link state machine
//! - [`security`]: AES-GCM protection and client access rights
//! - [`application`]: xDLMS PDUs and the invoke-id correlating layer
//! - [`interface`]: COSEM objects (Register, Activity Calendar)
//! - [`client`]: connections to meters
//! - [`server`]: the meter side, answering requests for registered objects
//!
//! # Usage
//!
//! ```no_run
//! use dlms::client::ConnectionBuilder;
//! use dlms::application::CosemAttributeDescriptor;
//! use dlms::ObisCode;
//!
//! # async fn run() -> dlms::DlmsResult<()> {
//! let mut meter = ConnectionBuilder::new("meter-1")
//!     .connect_tcp("192.168.1.100:4059")
//!     .await?;
//! let energy = meter
//!     .get(CosemAttributeDescriptor::new(3, ObisCode::new(1, 0, 1, 8, 0, 255), 2))
//!     .await?;
//! println!("{}", energy);
//! meter.close().await?;
//! # Ok(())
//! # }
//! ```

pub use dlms_core::{
    ChecksumKind, CosemDateTime, CosemTime, DataAccessResult, DataObject, DataObjectType, DlmsError,
    DlmsResult, ObisCode,
};

pub mod asn1 {
    pub use dlms_asn1::*;
}

pub mod transport {
    pub use dlms_transport::*;
}

pub mod session {
    pub use dlms_session::*;
}

pub mod security {
    pub use dlms_security::*;
}

pub mod application {
    pub use dlms_application::*;
}

pub mod interface {
    pub use dlms_interface::*;
}

pub mod client {
    pub use dlms_client::*;
}

pub mod server {
    pub use dlms_server::*;
}
