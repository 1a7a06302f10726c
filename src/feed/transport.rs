//! Socket abstraction for the upstream feed.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use url::Url;

/// An open, bidirectional text-frame socket.
#[async_trait]
pub trait FeedSocket: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next text frame. Errors once the socket has failed or been closed by the peer.
    /// Must be cancel-safe: the read loop wraps it in a timeout.
    async fn next_text(&mut self) -> Result<String>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens fresh sockets for the Connection Manager.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FeedSocket>>;
}

/// `tokio-tungstenite` connector for a `ws://` or `wss://` endpoint.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            url: Url::parse(url)?,
        })
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn FeedSocket>> {
        let (stream, resp) = connect_async(self.url.as_str()).await?;
        debug!(status = %resp.status(), "[CONN] websocket handshake complete");
        Ok(Box::new(WsSocket { stream }))
    }
}

struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedSocket for WsSocket {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn next_text(&mut self) -> Result<String> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(bytes))) => {
                    return String::from_utf8(bytes)
                        .map_err(|e| AppError::Protocol(format!("non UTF-8 binary frame: {e}")));
                }
                Some(Ok(Message::Close(_))) | None => return Err(AppError::ConnectionClosed),
                // Pings are answered by tungstenite on the next read.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory connector that records traffic.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn refused(what: &str) -> AppError {
        AppError::Io(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, what.to_string()))
    }

    #[derive(Default)]
    pub struct Wire {
        pub sent: Vec<String>,
        pub inbound: VecDeque<Result<String>>,
        pub closes: usize,
    }

    /// Fails the first `fail_first` connects, then hands out sockets sharing one `Wire`.
    #[derive(Default)]
    pub struct FakeConnector {
        pub wire: Arc<Mutex<Wire>>,
        pub connects: AtomicUsize,
        pub fail_first: usize,
        pub fail_close: bool,
        /// Simulated handshake latency.
        pub connect_delay: Duration,
    }

    impl FakeConnector {
        pub fn failing(fail_first: usize) -> Self {
            Self {
                fail_first,
                ..Self::default()
            }
        }

        pub fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        pub fn sent(&self) -> Vec<String> {
            self.wire.lock().sent.clone()
        }

        pub fn push_inbound(&self, frame: Result<String>) {
            self.wire.lock().inbound.push_back(frame);
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self) -> Result<Box<dyn FeedSocket>> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.connect_delay).await;
            if n < self.fail_first {
                return Err(refused(&format!("connect #{n}")));
            }
            Ok(Box::new(FakeSocket {
                wire: self.wire.clone(),
                fail_close: self.fail_close,
            }))
        }
    }

    struct FakeSocket {
        wire: Arc<Mutex<Wire>>,
        fail_close: bool,
    }

    #[async_trait]
    impl FeedSocket for FakeSocket {
        async fn send_text(&mut self, text: String) -> Result<()> {
            self.wire.lock().sent.push(text);
            Ok(())
        }

        async fn next_text(&mut self) -> Result<String> {
            let next = self.wire.lock().inbound.pop_front();
            match next {
                Some(frame) => frame,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.wire.lock().closes += 1;
            if self.fail_close {
                return Err(refused("close"));
            }
            Ok(())
        }
    }
}
