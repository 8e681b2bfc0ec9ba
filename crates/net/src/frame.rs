//! Message framing for peer channels.
//!
//! One message is one JSON value on one line, the framing a streaming
//! JSON encoder produces naturally. A [`Connection`] owns the stream
//! (plain TCP or TLS) and a reusable line buffer; callers serialize a
//! whole round-trip by holding the peer's lock across write and read.

use crate::error::NetError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Object-safe alias for the byte streams a connection can run over.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// A framed peer channel.
pub struct Connection {
    inner: BufReader<Box<dyn Stream>>,
    line: Vec<u8>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap an established stream.
    pub fn new(stream: Box<dyn Stream>) -> Self {
        Connection {
            inner: BufReader::new(stream),
            line: Vec::new(),
        }
    }

    /// Write one message and flush it to the wire.
    pub async fn write_message<T: Serialize>(&mut self, msg: &T) -> Result<(), NetError> {
        let mut buf = serde_json::to_vec(msg)?;
        buf.push(b'\n');
        self.inner.write_all(&buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Read one message. A clean end of stream reports
    /// [`NetError::Closed`].
    pub async fn read_message<T: DeserializeOwned>(&mut self) -> Result<T, NetError> {
        self.line.clear();
        let n = self.inner.read_until(b'\n', &mut self.line).await?;
        if n == 0 {
            return Err(NetError::Closed);
        }
        Ok(serde_json::from_slice(&self.line)?)
    }

    /// Shut the write side down, signalling end of stream to the peer.
    pub async fn shutdown(&mut self) -> Result<(), NetError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
        text: String,
    }

    fn pair() -> (Connection, Connection) {
        let (a, b) = tokio::io::duplex(4096);
        (Connection::new(Box::new(a)), Connection::new(Box::new(b)))
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (mut left, mut right) = pair();

        let msg = Ping {
            seq: 7,
            text: "hello".to_string(),
        };
        left.write_message(&msg).await.unwrap();

        let got: Ping = right.read_message().await.unwrap();
        assert_eq!(got, msg);
    }

    #[tokio::test]
    async fn test_messages_keep_order() {
        let (mut left, mut right) = pair();

        for seq in 0..10u32 {
            left.write_message(&Ping {
                seq,
                text: "m".to_string(),
            })
            .await
            .unwrap();
        }
        for seq in 0..10u32 {
            let got: Ping = right.read_message().await.unwrap();
            assert_eq!(got.seq, seq);
        }
    }

    #[tokio::test]
    async fn test_closed_stream_reports_closed() {
        let (mut left, right) = pair();
        drop(right);

        let err = left.read_message::<Ping>().await.unwrap_err();
        assert!(matches!(err, NetError::Closed));
    }

    #[tokio::test]
    async fn test_garbage_line_is_codec_error() {
        let (a, b) = tokio::io::duplex(4096);
        let mut raw = a;
        let mut conn = Connection::new(Box::new(b));

        raw.write_all(b"{not json}\n").await.unwrap();

        let err = conn.read_message::<Ping>().await.unwrap_err();
        assert!(matches!(err, NetError::Codec(_)));
    }
}
