//! One async method per beanstalkd command.
//!
//! Every method writes one command, awaits its complete reply (including
//! any payload) and translates it into a typed result. A `Client` owns its
//! connection exclusively; share it between tasks only behind a mutex.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::codec::Frame;
use crate::command::Command;
use crate::config::ClientConfig;
use crate::error::LentilError;
use crate::job::Job;
use crate::network::observer::{Observer, noop};
use crate::network::transport::Transport;
use crate::reply::{
    expect_exact, expect_job, expect_number, expect_ok, expect_word, parse_list, parse_map,
};

/// The tube every connection uses and watches until told otherwise.
pub const DEFAULT_TUBE: &str = "default";

/// A connection to a beanstalkd server.
pub struct Client<S = TcpStream> {
    transport: Transport<S>,
}

impl<S> std::fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client<TcpStream> {
    /// Connect to `addr` (`host:port`, e.g. `127.0.0.1:11300`).
    pub async fn connect(addr: &str) -> Result<Self, LentilError> {
        Self::connect_with(addr, &ClientConfig::default(), noop()).await
    }

    /// Connect with explicit settings and a traffic observer.
    pub async fn connect_with(
        addr: &str,
        config: &ClientConfig,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, LentilError> {
        let transport = Transport::dial(addr, config, observer).await?;
        Ok(Self { transport })
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Speak the protocol over an already-connected stream.
    pub fn from_stream(
        stream: S,
        peer: impl Into<String>,
        config: &ClientConfig,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            transport: Transport::new(stream, peer, config, observer),
        }
    }

    pub fn peer(&self) -> &str {
        self.transport.peer()
    }

    async fn round_trip(&mut self, command: Command) -> Result<Frame, LentilError> {
        self.transport.send(command).await?;
        self.transport.recv().await
    }

    // ── Producer ─────────────────────────────────────────────────

    /// Select the tube subsequent `put`s insert into.
    ///
    /// The tube echoed by the server must match `tube`; anything else is
    /// reported as a protocol error.
    pub async fn use_tube(&mut self, tube: &str) -> Result<(), LentilError> {
        let frame = self.round_trip(Command::Use(tube.to_string())).await?;
        let line = frame.line().to_string();
        let used = expect_word(frame, "USING")?;
        if used != tube {
            return Err(LentilError::Protocol(line));
        }
        Ok(())
    }

    /// Insert a job into the used tube and return its id.
    pub async fn put(
        &mut self,
        priority: u32,
        delay: u32,
        ttr: u32,
        body: impl Into<Bytes>,
    ) -> Result<u64, LentilError> {
        let command = Command::Put {
            priority,
            delay,
            ttr,
            body: body.into(),
        };
        let frame = self.round_trip(command).await?;
        expect_number(frame, "INSERTED")
    }

    // ── Consumer ─────────────────────────────────────────────────

    /// Add `tube` to the watch list; returns the number of watched tubes.
    pub async fn watch(&mut self, tube: &str) -> Result<u32, LentilError> {
        let frame = self.round_trip(Command::Watch(tube.to_string())).await?;
        expect_number(frame, "WATCHING")
    }

    /// Remove `tube` from the watch list; returns the number of watched
    /// tubes. Ignoring the last watched tube fails with `NOT_IGNORED`.
    pub async fn ignore(&mut self, tube: &str) -> Result<u32, LentilError> {
        let frame = self.round_trip(Command::Ignore(tube.to_string())).await?;
        expect_number(frame, "WATCHING")
    }

    /// Wait, without limit, for a job in any watched tube.
    pub async fn reserve(&mut self) -> Result<Job, LentilError> {
        let frame = self.round_trip(Command::Reserve).await?;
        expect_job(frame, "RESERVED")
    }

    /// Wait up to `seconds` for a job. `0` polls.
    ///
    /// When nothing becomes ready the error satisfies
    /// [`LentilError::is_timed_out`].
    pub async fn reserve_with_timeout(&mut self, seconds: u32) -> Result<Job, LentilError> {
        let frame = self.round_trip(Command::ReserveWithTimeout(seconds)).await?;
        expect_job(frame, "RESERVED")
    }

    pub async fn delete(&mut self, id: u64) -> Result<(), LentilError> {
        let frame = self.round_trip(Command::Delete(id)).await?;
        expect_exact(frame, "DELETED")
    }

    /// Put a reserved job back into the ready queue.
    pub async fn release(&mut self, id: u64, priority: u32, delay: u32) -> Result<(), LentilError> {
        let frame = self
            .round_trip(Command::Release {
                id,
                priority,
                delay,
            })
            .await?;
        expect_exact(frame, "RELEASED")
    }

    pub async fn bury(&mut self, id: u64, priority: u32) -> Result<(), LentilError> {
        let frame = self.round_trip(Command::Bury { id, priority }).await?;
        expect_exact(frame, "BURIED")
    }

    /// Ask for more time to work on a reserved job.
    pub async fn touch(&mut self, id: u64) -> Result<(), LentilError> {
        let frame = self.round_trip(Command::Touch(id)).await?;
        expect_exact(frame, "TOUCHED")
    }

    // ── Inspection ───────────────────────────────────────────────

    pub async fn peek(&mut self, id: u64) -> Result<Job, LentilError> {
        self.peek_command(Command::Peek(id)).await
    }

    /// The next ready job in the used tube.
    pub async fn peek_ready(&mut self) -> Result<Job, LentilError> {
        self.peek_command(Command::PeekReady).await
    }

    /// The delayed job in the used tube closest to becoming ready.
    pub async fn peek_delayed(&mut self) -> Result<Job, LentilError> {
        self.peek_command(Command::PeekDelayed).await
    }

    /// The next buried job in the used tube.
    pub async fn peek_buried(&mut self) -> Result<Job, LentilError> {
        self.peek_command(Command::PeekBuried).await
    }

    async fn peek_command(&mut self, command: Command) -> Result<Job, LentilError> {
        let frame = self.round_trip(command).await?;
        expect_job(frame, "FOUND")
    }

    /// Move up to `bound` jobs in the used tube to ready. Buried jobs are
    /// kicked if there are any, delayed jobs otherwise. Returns the number
    /// actually kicked.
    pub async fn kick(&mut self, bound: u32) -> Result<u32, LentilError> {
        let frame = self.round_trip(Command::Kick(bound)).await?;
        expect_number(frame, "KICKED")
    }

    pub async fn stats_job(&mut self, id: u64) -> Result<HashMap<String, String>, LentilError> {
        self.map_command(Command::StatsJob(id)).await
    }

    pub async fn stats_tube(&mut self, tube: &str) -> Result<HashMap<String, String>, LentilError> {
        self.map_command(Command::StatsTube(tube.to_string())).await
    }

    /// Server-wide statistics.
    pub async fn stats(&mut self) -> Result<HashMap<String, String>, LentilError> {
        self.map_command(Command::Stats).await
    }

    async fn map_command(
        &mut self,
        command: Command,
    ) -> Result<HashMap<String, String>, LentilError> {
        let frame = self.round_trip(command).await?;
        Ok(parse_map(&expect_ok(frame)?))
    }

    /// Every tube that currently exists, in server order.
    pub async fn list_tubes(&mut self) -> Result<Vec<String>, LentilError> {
        self.list_command(Command::ListTubes).await
    }

    /// The tube `put` currently inserts into.
    pub async fn list_tube_used(&mut self) -> Result<String, LentilError> {
        let frame = self.round_trip(Command::ListTubeUsed).await?;
        expect_word(frame, "USING")
    }

    pub async fn list_tubes_watched(&mut self) -> Result<Vec<String>, LentilError> {
        self.list_command(Command::ListTubesWatched).await
    }

    async fn list_command(&mut self, command: Command) -> Result<Vec<String>, LentilError> {
        let frame = self.round_trip(command).await?;
        Ok(parse_list(&expect_ok(frame)?))
    }

    /// Hold back reservations from `tube` for `delay` seconds.
    pub async fn pause_tube(&mut self, tube: &str, delay: u32) -> Result<(), LentilError> {
        let frame = self
            .round_trip(Command::PauseTube {
                tube: tube.to_string(),
                delay,
            })
            .await?;
        expect_exact(frame, "PAUSED")
    }

    // ── Connection ───────────────────────────────────────────────

    /// Tell the server we are leaving, then close the connection.
    pub async fn quit(&mut self) -> Result<(), LentilError> {
        self.transport.send(Command::Quit).await?;
        self.transport.close().await
    }

    /// Close the connection without saying goodbye. Idempotent.
    pub async fn close(&mut self) -> Result<(), LentilError> {
        self.transport.close().await
    }
}
