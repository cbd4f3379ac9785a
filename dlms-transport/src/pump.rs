//! Byte pump between a link and its stream

use crate::stream::StreamAccessor;
use bytes::Bytes;
use dlms_core::DlmsResult;
use tokio::sync::mpsc;

const READ_BUFFER_SIZE: usize = 2048;

enum Step {
    Send(Option<Bytes>),
    Received(DlmsResult<usize>),
}

/// Move bytes both ways until the link or the stream goes away
///
/// Every buffer from `outbound` is written and flushed in order; every read
/// is handed to `inbound` as it arrives. Outbound traffic is served first.
///
/// Returns `Ok` when `outbound` is closed (the stream is then closed too) or
/// when the peer ends the stream, and the I/O error otherwise.
pub async fn pump<S, F>(mut stream: S, mut outbound: mpsc::UnboundedReceiver<Bytes>, mut inbound: F) -> DlmsResult<()>
where
    S: StreamAccessor,
    F: FnMut(&[u8]) + Send,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let step = tokio::select! {
            biased;
            frame = outbound.recv() => Step::Send(frame),
            read = stream.read(&mut buf) => Step::Received(read),
        };

        match step {
            Step::Send(Some(frame)) => {
                stream.write_all(&frame).await?;
                stream.flush().await?;
            }
            Step::Send(None) => {
                log::debug!("Outbound channel closed, closing stream");
                return stream.close().await;
            }
            Step::Received(Ok(0)) => {
                log::debug!("Peer closed the stream");
                return Ok(());
            }
            Step::Received(Ok(n)) => inbound(&buf[..n]),
            Step::Received(Err(e)) => {
                log::warn!("Stream read failed: {}", e);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::IoTransport;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_pump_moves_bytes_both_ways() {
        let (near, mut far) = tokio::io::duplex(256);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (received_tx, mut received_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let task = tokio::spawn(pump(IoTransport::new(near), outbound_rx, move |bytes: &[u8]| {
            let _ = received_tx.send(bytes.to_vec());
        }));

        outbound_tx.send(Bytes::from_static(&[0x7E, 0x01, 0x7E])).unwrap();
        let mut buf = [0u8; 3];
        far.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x7E, 0x01, 0x7E]);

        far.write_all(&[0x7E, 0x02]).await.unwrap();
        let mut received = Vec::new();
        while received.len() < 2 {
            received.extend(received_rx.recv().await.unwrap());
        }
        assert_eq!(received, [0x7E, 0x02]);

        drop(outbound_tx);
        task.await.unwrap().unwrap();
        assert_eq!(far.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pump_ends_when_peer_closes() {
        let (near, far) = tokio::io::duplex(64);
        let (_outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        drop(far);
        pump(IoTransport::new(near), outbound_rx, |_: &[u8]| {})
            .await
            .unwrap();
    }
}
