//! Framed byte stream to a beanstalkd server.
//!
//! Wraps any `AsyncRead + AsyncWrite` stream (TCP in production, in-memory
//! mocks in tests) in a [`Framed`] using [`BeanstalkCodec`]. The framed read
//! buffer doubles as the buffered line reader; declared-length payloads are
//! cut from it by the decoder.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::codec::{BeanstalkCodec, Frame};
use crate::command::Command;
use crate::config::ClientConfig;
use crate::error::LentilError;
use crate::network::observer::Observer;

/// One connection to a server. Exactly one command may be in flight.
pub struct Transport<S = TcpStream> {
    framed: Framed<S, BeanstalkCodec>,
    peer: String,
    observer: Arc<dyn Observer>,
    closed: bool,
}

impl Transport<TcpStream> {
    /// Open a TCP connection to `addr` (`host:port`).
    pub async fn dial(
        addr: &str,
        config: &ClientConfig,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, LentilError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| LentilError::connect(addr, e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| LentilError::connect(addr, e))?;

        debug!(%addr, "connected");
        Ok(Self::new(stream, addr, config, observer))
    }
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-connected stream.
    pub fn new(
        stream: S,
        peer: impl Into<String>,
        config: &ClientConfig,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            framed: Framed::with_capacity(
                stream,
                BeanstalkCodec::with_max_body_size(config.max_body_size),
                config.read_buffer_capacity,
            ),
            peer: peer.into(),
            observer,
            closed: false,
        }
    }

    /// The address this transport was opened against.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write and flush one command (and its payload, if any).
    pub async fn send(&mut self, command: Command) -> Result<(), LentilError> {
        if self.closed {
            return Err(LentilError::not_connected());
        }
        self.observer.on_send(&self.peer, &command.to_string());
        self.framed.send(command).await
    }

    /// Read the next complete reply.
    pub async fn recv(&mut self) -> Result<Frame, LentilError> {
        if self.closed {
            return Err(LentilError::not_connected());
        }
        match self.framed.next().await {
            Some(Ok(frame)) => {
                self.observer.on_receive(&self.peer, frame.line());
                Ok(frame)
            }
            Some(Err(e)) => Err(e),
            None => Err(LentilError::closed_by_peer()),
        }
    }

    /// Shut the stream down. Calling this more than once is a no-op.
    pub async fn close(&mut self) -> Result<(), LentilError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        debug!(peer = %self.peer, "closing connection");
        self.framed.get_mut().shutdown().await?;
        Ok(())
    }
}
