//! TCP transport

use crate::io::IoTransport;
use crate::stream::{StreamAccessor, TransportLayer, not_connected};
use async_trait::async_trait;
use dlms_core::{DlmsError, DlmsResult};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

/// Where and how long to try connecting
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub address: SocketAddr,
    /// Connect timeout; `None` waits indefinitely
    pub connect_timeout: Option<Duration>,
}

impl TcpSettings {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            connect_timeout: Some(Duration::from_secs(30)),
        }
    }

    pub fn with_timeout(address: SocketAddr, timeout: Duration) -> Self {
        Self {
            address,
            connect_timeout: Some(timeout),
        }
    }
}

/// Client side TCP connection to a meter or gateway
#[derive(Debug)]
pub struct TcpTransport {
    settings: TcpSettings,
    io: Option<IoTransport<TcpStream>>,
}

impl TcpTransport {
    pub fn new(settings: TcpSettings) -> Self {
        Self { settings, io: None }
    }

    /// Parse `host:port`
    pub fn from_address(address: &str) -> DlmsResult<Self> {
        let address: SocketAddr = address
            .parse()
            .map_err(|e| DlmsError::InvalidData(format!("Invalid TCP address {}: {}", address, e)))?;
        Ok(Self::new(TcpSettings::new(address)))
    }

    /// Wrap a socket accepted by a listener
    pub fn from_connected_stream(stream: TcpStream) -> DlmsResult<Self> {
        let address = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        Ok(Self {
            settings: TcpSettings::new(address),
            io: Some(IoTransport::new(stream)),
        })
    }

    pub fn settings(&self) -> &TcpSettings {
        &self.settings
    }

    fn io(&mut self) -> DlmsResult<&mut IoTransport<TcpStream>> {
        self.io.as_mut().ok_or_else(not_connected)
    }
}

#[async_trait]
impl TransportLayer for TcpTransport {
    async fn open(&mut self) -> DlmsResult<()> {
        if self.io.as_ref().is_some_and(|io| !io.is_closed()) {
            return Err(DlmsError::InvalidState(format!(
                "TCP connection to {} is already open",
                self.settings.address
            )));
        }

        let connecting = TcpStream::connect(self.settings.address);
        let stream = match self.settings.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connecting)
                .await
                .map_err(|_| DlmsError::ResponseTimeout)??,
            None => connecting.await?,
        };
        stream.set_nodelay(true)?;
        log::info!("TCP connection to {} established", self.settings.address);
        self.io = Some(IoTransport::new(stream));
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for TcpTransport {
    async fn read(&mut self, buf: &mut [u8]) -> DlmsResult<usize> {
        self.io()?.read(buf).await
    }

    async fn write_all(&mut self, buf: &[u8]) -> DlmsResult<()> {
        self.io()?.write_all(buf).await
    }

    async fn flush(&mut self) -> DlmsResult<()> {
        self.io()?.flush().await
    }

    fn is_closed(&self) -> bool {
        self.io.as_ref().is_none_or(|io| io.is_closed())
    }

    async fn close(&mut self) -> DlmsResult<()> {
        if let Some(mut io) = self.io.take() {
            io.close().await?;
            log::info!("TCP connection to {} closed", self.settings.address);
        }
        Ok(())
    }
}
