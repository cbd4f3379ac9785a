//! Transport over any Tokio byte stream

use crate::stream::{StreamAccessor, not_connected};
use async_trait::async_trait;
use dlms_core::{DlmsError, DlmsResult};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// [`StreamAccessor`] over an `AsyncRead + AsyncWrite` value
///
/// Used for TCP sockets, in-memory duplex pipes and serial ports alike.
/// Reading end of stream or hitting an I/O error marks the transport closed.
pub struct IoTransport<S> {
    stream: Option<S>,
    closed: bool,
}

impl<S> IoTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            closed: false,
        }
    }

    /// Give the underlying stream back, if still open
    pub fn into_inner(self) -> Option<S> {
        self.stream
    }

    fn stream(&mut self) -> DlmsResult<&mut S> {
        if self.closed {
            return Err(DlmsError::ConnectionClosed);
        }
        self.stream.as_mut().ok_or_else(not_connected)
    }
}

impl<S> fmt::Debug for IoTransport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoTransport").field("closed", &self.closed).finish()
    }
}

#[async_trait]
impl<S> StreamAccessor for IoTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read(&mut self, buf: &mut [u8]) -> DlmsResult<usize> {
        let result = self.stream()?.read(buf).await;
        match result {
            Ok(0) => {
                log::debug!("Transport reached end of stream");
                self.closed = true;
                Ok(0)
            }
            Ok(n) => {
                log::trace!("Transport read {} bytes", n);
                Ok(n)
            }
            Err(e) => {
                self.closed = true;
                Err(DlmsError::Connection(e))
            }
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> DlmsResult<()> {
        let result = self.stream()?.write_all(buf).await;
        if let Err(e) = result {
            self.closed = true;
            return Err(DlmsError::Connection(e));
        }
        log::trace!("Transport wrote {} bytes", buf.len());
        Ok(())
    }

    async fn flush(&mut self) -> DlmsResult<()> {
        self.stream()?.flush().await.map_err(DlmsError::Connection)
    }

    fn is_closed(&self) -> bool {
        self.closed || self.stream.is_none()
    }

    async fn close(&mut self) -> DlmsResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.closed = true;
        Ok(())
    }
}
