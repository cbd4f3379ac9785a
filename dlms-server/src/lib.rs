//! DLMS/COSEM server side
//!
//! A [`CosemServer`] holds COSEM objects and answers Initiate, GET, SET and
//! ACTION requests for them, including block transfer in both directions.
//! [`ServerListener`] accepts TCP clients and serves each over HDLC.

pub mod association;
pub mod config;
pub mod listener;
pub mod server;

pub use association::Association;
pub use config::ServerConfig;
pub use listener::ServerListener;
pub use server::{CosemServer, access_result};
