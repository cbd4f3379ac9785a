//! TCP listener accepting clients for a [`CosemServer`]
//!
//! Each accepted connection is served in its own task over HDLC; all of them
//! share the server's objects.

use crate::server::CosemServer;
use dlms_core::{DlmsError, DlmsResult};
use dlms_transport::TcpTransport;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// ```rust,no_run
/// use dlms_server::{CosemServer, ServerListener};
/// use std::sync::Arc;
///
/// # async fn run() -> dlms_core::DlmsResult<()> {
/// let listener = ServerListener::bind(Arc::new(CosemServer::new()), "0.0.0.0:4059").await?;
/// listener.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct ServerListener {
    server: Arc<CosemServer>,
    listener: TcpListener,
}

impl ServerListener {
    /// Bind to `address` (`host:port`, port 0 picks a free one)
    pub async fn bind(server: Arc<CosemServer>, address: &str) -> DlmsResult<Self> {
        let listener = TcpListener::bind(address).await.map_err(|e| {
            DlmsError::Connection(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", address, e),
            ))
        })?;
        log::info!("COSEM server listening on {}", listener.local_addr()?);
        Ok(Self { server, listener })
    }

    pub fn local_addr(&self) -> DlmsResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn server(&self) -> &Arc<CosemServer> {
        &self.server
    }

    /// Accept connections until accepting fails
    pub async fn run(self) -> DlmsResult<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            log::info!("Accepted connection from {}", peer);
            let transport = match TcpTransport::from_connected_stream(stream) {
                Ok(transport) => transport,
                Err(e) => {
                    log::error!("Connection from {} unusable: {}", peer, e);
                    continue;
                }
            };
            let server = Arc::clone(&self.server);
            tokio::spawn(async move {
                match server.serve(transport).await {
                    Ok(()) => log::info!("Connection from {} closed", peer),
                    Err(e) => log::error!("Error serving {}: {}", peer, e),
                }
            });
        }
    }
}

impl std::fmt::Debug for ServerListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerListener")
            .field("local_addr", &self.listener.local_addr().ok())
            .finish()
    }
}
