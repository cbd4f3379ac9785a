//! Byte stream contract between a link and its carrier

use async_trait::async_trait;
use dlms_core::{DlmsError, DlmsResult};
use std::io;

pub(crate) fn not_connected() -> DlmsError {
    DlmsError::Connection(io::Error::new(io::ErrorKind::NotConnected, "stream not connected"))
}

/// Access to a physical stream towards one peer
///
/// `read` must be cancel safe: the pump races it against outbound traffic
/// and drops the read future when a frame has to go out first.
#[async_trait]
pub trait StreamAccessor: Send {
    /// Read whatever is available into `buf`
    ///
    /// Returns the number of bytes read, 0 at end of stream.
    async fn read(&mut self, buf: &mut [u8]) -> DlmsResult<usize>;

    /// Write all of `buf`
    async fn write_all(&mut self, buf: &[u8]) -> DlmsResult<()>;

    async fn flush(&mut self) -> DlmsResult<()>;

    fn is_closed(&self) -> bool;

    async fn close(&mut self) -> DlmsResult<()>;
}

/// A stream that has to be opened before use
#[async_trait]
pub trait TransportLayer: StreamAccessor {
    /// Open the physical connection
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the transport is already open
    async fn open(&mut self) -> DlmsResult<()>;
}

#[async_trait]
impl<T: StreamAccessor + ?Sized> StreamAccessor for Box<T> {
    async fn read(&mut self, buf: &mut [u8]) -> DlmsResult<usize> {
        (**self).read(buf).await
    }

    async fn write_all(&mut self, buf: &[u8]) -> DlmsResult<()> {
        (**self).write_all(buf).await
    }

    async fn flush(&mut self) -> DlmsResult<()> {
        (**self).flush().await
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    async fn close(&mut self) -> DlmsResult<()> {
        (**self).close().await
    }
}
