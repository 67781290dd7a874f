//! Protocol commands and their wire rendering.
//!
//! Every client operation maps to exactly one `Command`. `Display` renders
//! the command line without its CRLF terminator; the codec appends it and,
//! for `put`, the payload block.

use std::fmt;

use bytes::Bytes;

/// All commands the client issues.
///
/// Priorities are `u32` (0 is most urgent). Delays, TTRs and timeouts are
/// whole seconds. Tube names are embedded verbatim; callers must not pass
/// protocol control characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // ── Producer ─────────────────────────────────────────────────
    /// Select the tube for subsequent `put`s.
    Use(String),
    /// Insert a job into the used tube.
    Put {
        priority: u32,
        delay: u32,
        ttr: u32,
        body: Bytes,
    },

    // ── Consumer ─────────────────────────────────────────────────
    /// Add a tube to the watch list.
    Watch(String),
    /// Remove a tube from the watch list.
    Ignore(String),
    /// Block until a job is ready in a watched tube.
    Reserve,
    /// Like `Reserve`, with a server-enforced deadline in seconds.
    ReserveWithTimeout(u32),
    Delete(u64),
    Release {
        id: u64,
        priority: u32,
        delay: u32,
    },
    Bury {
        id: u64,
        priority: u32,
    },
    Touch(u64),

    // ── Inspection ───────────────────────────────────────────────
    Peek(u64),
    PeekReady,
    PeekDelayed,
    PeekBuried,
    /// Move up to `bound` buried (or, if none, delayed) jobs to ready.
    Kick(u32),
    StatsJob(u64),
    StatsTube(String),
    Stats,
    ListTubes,
    ListTubeUsed,
    ListTubesWatched,
    PauseTube {
        tube: String,
        delay: u32,
    },

    // ── Connection ───────────────────────────────────────────────
    Quit,
}

impl Command {
    /// The protocol verb, e.g. `"reserve-with-timeout"`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Use(_) => "use",
            Self::Put { .. } => "put",
            Self::Watch(_) => "watch",
            Self::Ignore(_) => "ignore",
            Self::Reserve => "reserve",
            Self::ReserveWithTimeout(_) => "reserve-with-timeout",
            Self::Delete(_) => "delete",
            Self::Release { .. } => "release",
            Self::Bury { .. } => "bury",
            Self::Touch(_) => "touch",
            Self::Peek(_) => "peek",
            Self::PeekReady => "peek-ready",
            Self::PeekDelayed => "peek-delayed",
            Self::PeekBuried => "peek-buried",
            Self::Kick(_) => "kick",
            Self::StatsJob(_) => "stats-job",
            Self::StatsTube(_) => "stats-tube",
            Self::Stats => "stats",
            Self::ListTubes => "list-tubes",
            Self::ListTubeUsed => "list-tube-used",
            Self::ListTubesWatched => "list-tubes-watched",
            Self::PauseTube { .. } => "pause-tube",
            Self::Quit => "quit",
        }
    }

    /// The payload that follows the command line, if any.
    pub fn body(&self) -> Option<&Bytes> {
        match self {
            Self::Put { body, .. } => Some(body),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        match self {
            Self::Use(tube) | Self::Watch(tube) | Self::Ignore(tube) | Self::StatsTube(tube) => {
                write!(f, "{name} {tube}")
            }
            Self::Put {
                priority,
                delay,
                ttr,
                body,
            } => write!(f, "{name} {priority} {delay} {ttr} {}", body.len()),
            Self::ReserveWithTimeout(seconds) => write!(f, "{name} {seconds}"),
            Self::Delete(id) | Self::Touch(id) | Self::Peek(id) | Self::StatsJob(id) => {
                write!(f, "{name} {id}")
            }
            Self::Release {
                id,
                priority,
                delay,
            } => write!(f, "{name} {id} {priority} {delay}"),
            Self::Bury { id, priority } => write!(f, "{name} {id} {priority}"),
            Self::Kick(bound) => write!(f, "{name} {bound}"),
            Self::PauseTube { tube, delay } => write!(f, "{name} {tube} {delay}"),
            Self::Reserve
            | Self::PeekReady
            | Self::PeekDelayed
            | Self::PeekBuried
            | Self::Stats
            | Self::ListTubes
            | Self::ListTubeUsed
            | Self::ListTubesWatched
            | Self::Quit => f.write_str(name),
        }
    }
}
