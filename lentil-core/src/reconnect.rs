//! A client that survives connection loss.
//!
//! [`ReconnectingClient`] remembers the used tube and the watch list a
//! caller asked for. When a command fails because the connection is gone
//! (a [`LentilError::Connect`] or [`LentilError::Transport`]), it redials,
//! replays that state on the new connection and issues the command again.
//! Protocol and framing errors never trigger a redial; they are returned
//! as they are.
//!
//! ```text
//!  caller ──► ReconnectingClient ──► Client ──► server
//!                   │   ▲
//!   transport error │   │ use <tube>, watch <tube>..., ignore default
//!                   ▼   │
//!                 redial (fixed backoff, until connected)
//! ```
//!
//! Methods take `&mut self`, so a redial can never interleave with another
//! command. To share one instance between tasks, wrap it in a
//! `tokio::sync::Mutex`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{Client, DEFAULT_TUBE};
use crate::config::ClientConfig;
use crate::error::LentilError;
use crate::job::Job;
use crate::network::observer::{Observer, noop};

/// Wraps a [`Client`] and transparently redials on connection failure.
pub struct ReconnectingClient {
    addr: String,
    config: ClientConfig,
    observer: Arc<dyn Observer>,
    cancel: CancellationToken,
    client: Option<Client>,
    /// `None` until `use_tube` is called: the server default applies.
    used_tube: Option<String>,
    watched_tubes: BTreeSet<String>,
}

impl std::fmt::Debug for ReconnectingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectingClient")
            .field("addr", &self.addr)
            .field("connected", &self.client.is_some())
            .field("used_tube", &self.used_tube)
            .field("watched_tubes", &self.watched_tubes)
            .finish_non_exhaustive()
    }
}

impl ReconnectingClient {
    /// Create a client for `addr`. Nothing is dialed until the first
    /// command (or an explicit [`redial`](Self::redial)).
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_config(addr, ClientConfig::default(), noop())
    }

    pub fn with_config(
        addr: impl Into<String>,
        config: ClientConfig,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            addr: addr.into(),
            config,
            observer,
            cancel: CancellationToken::new(),
            client: None,
            used_tube: None,
            watched_tubes: BTreeSet::from([DEFAULT_TUBE.to_string()]),
        }
    }

    /// Create a client and dial immediately, retrying per the redial policy.
    pub async fn connect(
        addr: impl Into<String>,
        config: ClientConfig,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, LentilError> {
        let mut client = Self::with_config(addr, config, observer);
        client.redial().await?;
        Ok(client)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Token that aborts a redial loop in progress (and every later one).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The tube `put` inserts into.
    pub fn used_tube(&self) -> &str {
        self.used_tube.as_deref().unwrap_or(DEFAULT_TUBE)
    }

    /// The tubes this client wants to watch.
    pub fn watched_tubes(&self) -> &BTreeSet<String> {
        &self.watched_tubes
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    // ── Redial ───────────────────────────────────────────────────

    /// Drop the current connection and dial until a new one is established
    /// with the desired tube state.
    ///
    /// Retries every `reconnect.backoff_ms`. Without `max_elapsed_ms` and
    /// without cancellation this only returns once the server is reachable
    /// again; otherwise it returns the last connection error.
    pub async fn redial(&mut self) -> Result<(), LentilError> {
        if let Some(mut old) = self.client.take() {
            if let Err(e) = old.close().await {
                debug!(addr = %self.addr, error = %e, "closing stale connection failed");
            }
        }

        let backoff = self.config.reconnect.backoff();
        let deadline = self
            .config
            .reconnect
            .max_elapsed()
            .map(|max| Instant::now() + max);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let error = match self.dial_and_restore().await {
                Ok(client) => {
                    info!(addr = %self.addr, attempt, "connected");
                    self.client = Some(client);
                    return Ok(());
                }
                Err(e) if e.is_connection_failure() => e,
                Err(e) => return Err(e),
            };

            if deadline.is_some_and(|deadline| Instant::now() + backoff > deadline) {
                warn!(addr = %self.addr, attempt, error = %error, "giving up on redial");
                return Err(error);
            }
            warn!(
                addr = %self.addr,
                attempt,
                error = %error,
                "dial failed; retrying in {backoff:?}"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!(addr = %self.addr, "redial cancelled");
                    return Err(error);
                }
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    async fn dial_and_restore(&self) -> Result<Client, LentilError> {
        let mut client =
            Client::connect_with(&self.addr, &self.config, Arc::clone(&self.observer)).await?;

        if let Some(tube) = &self.used_tube {
            client.use_tube(tube).await?;
        }
        for tube in &self.watched_tubes {
            client.watch(tube).await?;
        }
        // A fresh connection watches `default`; drop it unless wanted.
        if !self.watched_tubes.is_empty() && !self.watched_tubes.contains(DEFAULT_TUBE) {
            client.ignore(DEFAULT_TUBE).await?;
        }

        debug!(
            addr = %self.addr,
            used = self.used_tube(),
            watched = ?self.watched_tubes,
            "session state restored"
        );
        Ok(client)
    }

    /// Run `op` against a live connection, redialing and retrying for as
    /// long as it fails with a connection error.
    async fn retrying<T, F>(&mut self, mut op: F) -> Result<T, LentilError>
    where
        F: AsyncFnMut(&mut Client) -> Result<T, LentilError>,
    {
        loop {
            if self.client.is_none() {
                self.redial().await?;
            }
            let Some(client) = self.client.as_mut() else {
                return Err(LentilError::not_connected());
            };

            let result = op(client).await;
            match result {
                Err(e) if e.is_connection_failure() => {
                    warn!(addr = %self.addr, error = %e, "connection lost; redialing");
                    self.redial().await?;
                }
                other => return other,
            }
        }
    }

    // ── Session state ────────────────────────────────────────────

    /// Select the tube for `put`. Remembered across reconnects.
    pub async fn use_tube(&mut self, tube: &str) -> Result<(), LentilError> {
        let previous = self.used_tube.replace(tube.to_string());
        let result = self.retrying(async |c: &mut Client| c.use_tube(tube).await).await;
        if result.is_err() {
            self.used_tube = previous;
        }
        result
    }

    /// Watch `tube`. Remembered across reconnects.
    pub async fn watch(&mut self, tube: &str) -> Result<u32, LentilError> {
        let added = self.watched_tubes.insert(tube.to_string());
        let result = self.retrying(async |c: &mut Client| c.watch(tube).await).await;
        if result.is_err() && added {
            self.watched_tubes.remove(tube);
        }
        result
    }

    /// Stop watching `tube`. On rejection (e.g. `NOT_IGNORED` for the last
    /// watched tube) the remembered watch list is left unchanged.
    pub async fn ignore(&mut self, tube: &str) -> Result<u32, LentilError> {
        let removed = self.watched_tubes.remove(tube);
        let result = self.retrying(async |c: &mut Client| c.ignore(tube).await).await;
        if result.is_err() && removed {
            self.watched_tubes.insert(tube.to_string());
        }
        result
    }

    // ── Consumer ─────────────────────────────────────────────────

    /// Reserve a job, redialing through connection loss.
    ///
    /// Returns `Ok(None)` when the server reports `TIMED_OUT`.
    pub async fn reserve(&mut self) -> Result<Option<Job>, LentilError> {
        no_job_ready(self.retrying(async |c: &mut Client| c.reserve().await).await)
    }

    /// Reserve with a server-side timeout, redialing through connection
    /// loss. Returns `Ok(None)` when no job became ready in time.
    pub async fn reserve_with_timeout(&mut self, seconds: u32) -> Result<Option<Job>, LentilError> {
        no_job_ready(
            self.retrying(async |c: &mut Client| c.reserve_with_timeout(seconds).await)
                .await,
        )
    }

    /// Jobs reserved on a lost connection are released by the server, so
    /// deleting one after a redial may yield `NOT_FOUND`.
    pub async fn delete(&mut self, id: u64) -> Result<(), LentilError> {
        self.retrying(async |c: &mut Client| c.delete(id).await).await
    }

    pub async fn release(&mut self, id: u64, priority: u32, delay: u32) -> Result<(), LentilError> {
        self.retrying(async |c: &mut Client| c.release(id, priority, delay).await)
            .await
    }

    pub async fn bury(&mut self, id: u64, priority: u32) -> Result<(), LentilError> {
        self.retrying(async |c: &mut Client| c.bury(id, priority).await).await
    }

    pub async fn touch(&mut self, id: u64) -> Result<(), LentilError> {
        self.retrying(async |c: &mut Client| c.touch(id).await).await
    }

    // ── Producer ─────────────────────────────────────────────────

    /// Insert a job into the used tube.
    ///
    /// If the connection drops after the server accepted the job but
    /// before the reply arrived, the retry inserts it a second time.
    pub async fn put(
        &mut self,
        priority: u32,
        delay: u32,
        ttr: u32,
        body: impl Into<Bytes>,
    ) -> Result<u64, LentilError> {
        let body = body.into();
        self.retrying(async |c: &mut Client| c.put(priority, delay, ttr, body.clone()).await)
            .await
    }

    // ── Inspection ───────────────────────────────────────────────

    pub async fn peek(&mut self, id: u64) -> Result<Job, LentilError> {
        self.retrying(async |c: &mut Client| c.peek(id).await).await
    }

    pub async fn peek_ready(&mut self) -> Result<Job, LentilError> {
        self.retrying(async |c: &mut Client| c.peek_ready().await).await
    }

    pub async fn peek_delayed(&mut self) -> Result<Job, LentilError> {
        self.retrying(async |c: &mut Client| c.peek_delayed().await).await
    }

    pub async fn peek_buried(&mut self) -> Result<Job, LentilError> {
        self.retrying(async |c: &mut Client| c.peek_buried().await).await
    }

    pub async fn kick(&mut self, bound: u32) -> Result<u32, LentilError> {
        self.retrying(async |c: &mut Client| c.kick(bound).await).await
    }

    pub async fn stats_job(&mut self, id: u64) -> Result<HashMap<String, String>, LentilError> {
        self.retrying(async |c: &mut Client| c.stats_job(id).await).await
    }

    pub async fn stats_tube(&mut self, tube: &str) -> Result<HashMap<String, String>, LentilError> {
        self.retrying(async |c: &mut Client| c.stats_tube(tube).await).await
    }

    pub async fn stats(&mut self) -> Result<HashMap<String, String>, LentilError> {
        self.retrying(async |c: &mut Client| c.stats().await).await
    }

    pub async fn list_tubes(&mut self) -> Result<Vec<String>, LentilError> {
        self.retrying(async |c: &mut Client| c.list_tubes().await).await
    }

    pub async fn list_tube_used(&mut self) -> Result<String, LentilError> {
        self.retrying(async |c: &mut Client| c.list_tube_used().await).await
    }

    pub async fn list_tubes_watched(&mut self) -> Result<Vec<String>, LentilError> {
        self.retrying(async |c: &mut Client| c.list_tubes_watched().await).await
    }

    pub async fn pause_tube(&mut self, tube: &str, delay: u32) -> Result<(), LentilError> {
        self.retrying(async |c: &mut Client| c.pause_tube(tube, delay).await)
            .await
    }

    // ── Connection ───────────────────────────────────────────────

    /// Send `quit` on the live connection, if any, and forget it. The
    /// remembered tube state is kept; the next command redials.
    pub async fn quit(&mut self) -> Result<(), LentilError> {
        match self.client.take() {
            Some(mut client) => client.quit().await,
            None => Ok(()),
        }
    }

    /// Close the live connection, if any, without `quit`.
    pub async fn close(&mut self) -> Result<(), LentilError> {
        match self.client.take() {
            Some(mut client) => client.close().await,
            None => Ok(()),
        }
    }
}

/// Turns the server's `TIMED_OUT` into "no job".
fn no_job_ready(result: Result<Job, LentilError>) -> Result<Option<Job>, LentilError> {
    match result {
        Ok(job) => Ok(Some(job)),
        Err(e) if e.is_timed_out() => Ok(None),
        Err(e) => Err(e),
    }
}
