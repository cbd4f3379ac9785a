//! Fluent construction of a [`MeterConnection`]
//!
//! ```rust,no_run
//! use dlms_client::{ConnectionBuilder, ConnectionRegistry};
//!
//! # async fn run() -> dlms_core::DlmsResult<()> {
//! let registry = ConnectionRegistry::new();
//! let mut meter = ConnectionBuilder::new("meter-17")
//!     .hdlc_addresses(0x10, 0x01)
//!     .max_pdu_size(512)
//!     .registry(registry.clone())
//!     .connect_tcp("192.168.1.100:4059")
//!     .await?;
//! meter.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::connection::MeterConnection;
use crate::registry::ConnectionRegistry;
use dlms_application::{ApplicationConfig, ApplicationLayer, Conformance, Priority};
use dlms_core::DlmsResult;
use dlms_security::SecurityProvider;
use dlms_session::{HdlcAddress, HdlcConfig, HdlcLayer};
use dlms_transport::{StreamAccessor, TcpTransport, TransportLayer};
use std::sync::Arc;

/// Builder over the link and application configuration of one meter
#[derive(Clone)]
pub struct ConnectionBuilder {
    meter_id: String,
    hdlc: HdlcConfig,
    application: ApplicationConfig,
    security: Option<Arc<dyn SecurityProvider>>,
    registry: Option<ConnectionRegistry>,
}

impl ConnectionBuilder {
    /// Defaults of [`HdlcConfig`] and [`ApplicationConfig`], no security
    pub fn new(meter_id: impl Into<String>) -> Self {
        Self {
            meter_id: meter_id.into(),
            hdlc: HdlcConfig::default(),
            application: ApplicationConfig::default(),
            security: None,
            registry: None,
        }
    }

    pub fn hdlc_config(mut self, config: HdlcConfig) -> Self {
        self.hdlc = config;
        self
    }

    pub fn application_config(mut self, config: ApplicationConfig) -> Self {
        self.application = config;
        self
    }

    /// Client and server upper HDLC addresses, lower addresses left at 1
    pub fn hdlc_addresses(mut self, client: u8, server: u8) -> Self {
        self.hdlc.local_address = HdlcAddress::new(client, 1);
        self.hdlc.remote_address = HdlcAddress::new(server, 1);
        self
    }

    pub fn window_size(mut self, window_size: u8) -> Self {
        self.hdlc.window_size = window_size;
        self
    }

    pub fn max_info_length(mut self, max_info_length: u16) -> Self {
        self.hdlc.max_info_length = max_info_length;
        self
    }

    /// Both outbound and receive PDU size
    pub fn max_pdu_size(mut self, max_pdu_size: u16) -> Self {
        self.application.max_pdu_size = max_pdu_size;
        self.application.max_receive_pdu_size = max_pdu_size;
        self
    }

    pub fn conformance(mut self, conformance: Conformance) -> Self {
        self.application.proposed_conformance = conformance;
        self
    }

    pub fn client_id(mut self, client_id: u16) -> Self {
        self.application.client_id = client_id;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.application.priority = priority;
        self
    }

    /// Application response timeout
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.application.timeout_ms = timeout_ms;
        self
    }

    pub fn security(mut self, security: Arc<dyn SecurityProvider>) -> Self {
        self.security = Some(security);
        self
    }

    pub fn registry(mut self, registry: ConnectionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Create an unopened connection over `transport`
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if either configuration does not validate
    pub fn build<S>(self, transport: S) -> DlmsResult<MeterConnection>
    where
        S: StreamAccessor + 'static,
    {
        let link = HdlcLayer::new(self.hdlc)?;
        let application = ApplicationLayer::new(self.application, self.security)?;
        Ok(MeterConnection::new(
            self.meter_id,
            link,
            application,
            Box::new(transport),
            self.registry,
        ))
    }

    /// Build over `transport` and open the connection
    pub async fn connect<S>(self, transport: S) -> DlmsResult<MeterConnection>
    where
        S: StreamAccessor + 'static,
    {
        let mut connection = self.build(transport)?;
        connection.open().await?;
        Ok(connection)
    }

    /// Open a TCP connection to `address` (`host:port`) and then the meter
    /// connection over it
    pub async fn connect_tcp(self, address: &str) -> DlmsResult<MeterConnection> {
        let mut transport = TcpTransport::from_address(address)?;
        transport.open().await?;
        self.connect(transport).await
    }
}

impl std::fmt::Debug for ConnectionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionBuilder")
            .field("meter_id", &self.meter_id)
            .field("hdlc", &self.hdlc)
            .field("application", &self.application)
            .field("security", &self.security.is_some())
            .finish()
    }
}
