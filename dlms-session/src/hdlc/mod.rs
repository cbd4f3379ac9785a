//! HDLC link layer (IEC 62056-46)

pub mod address;
pub mod config;
pub mod fcs;
pub mod frame;
pub mod layer;
pub mod parameters;
pub mod reader;
pub mod state;
pub mod statistics;
pub mod window;

pub use address::{reserved, HdlcAddress};
pub use config::HdlcConfig;
pub use fcs::{crc16, FcsCalc};
pub use frame::{FrameFormat, FrameType, HdlcFrame, FLAG};
pub use layer::{HdlcLayer, LinkChannels, LinkEvent};
pub use parameters::LinkParameters;
pub use reader::FrameReader;
pub use state::LinkState;
pub use statistics::HdlcStatistics;
pub use window::{ReceiveWindow, SendWindow};
