//! Error types for the beanstalkd client.
//!
//! All fallible operations return `Result<T, LentilError>`.
//! Four categories, and only the first two mean the connection is gone:
//!
//! | Variant     | Meaning                                             |
//! |-------------|-----------------------------------------------------|
//! | `Connect`   | dial failed                                         |
//! | `Transport` | I/O failure on an established connection            |
//! | `Framing`   | declared body length disagrees with the bytes read  |
//! | `Protocol`  | server answered with something other than success   |

use std::fmt;
use std::io;

use thiserror::Error;

/// The canonical error type for the client.
#[derive(Debug, Error)]
pub enum LentilError {
    // ── Connection Errors ────────────────────────────────────────
    /// Dialing the server failed (unreachable, refused, bad address).
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The TCP/IO layer failed mid-operation (reset, broken pipe, EOF).
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    // ── Stream Errors ────────────────────────────────────────────
    /// A body did not match its declared length.
    #[error("framing error: declared {expected} body bytes, found {actual}")]
    Framing { expected: usize, actual: usize },

    // ── Server Errors ────────────────────────────────────────────
    /// The reply line did not match the success pattern of the command.
    ///
    /// Carries the line exactly as received, minus its terminator.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl LentilError {
    /// Returns `true` when the connection should be considered unusable.
    ///
    /// Only these errors justify a redial.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Transport(_))
    }

    /// The raw reply line of a protocol error.
    pub fn reply_line(&self) -> Option<&str> {
        match self {
            Self::Protocol(line) => Some(line),
            _ => None,
        }
    }

    /// Classifies a protocol error by its leading token.
    pub fn failure(&self) -> Option<FailureKind> {
        self.reply_line().and_then(FailureKind::from_line)
    }

    /// Returns `true` for the server's "no job ready" outcome.
    pub fn is_timed_out(&self) -> bool {
        self.failure() == Some(FailureKind::TimedOut)
    }

    pub(crate) fn connect(addr: impl Into<String>, source: io::Error) -> Self {
        Self::Connect {
            addr: addr.into(),
            source,
        }
    }

    pub(crate) fn not_connected() -> Self {
        Self::Transport(io::Error::new(
            io::ErrorKind::NotConnected,
            "connection is closed",
        ))
    }

    pub(crate) fn closed_by_peer() -> Self {
        Self::Transport(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by server",
        ))
    }
}

// ── FailureKind ──────────────────────────────────────────────────

/// Failure tokens the server may send instead of a success line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Job or tube does not exist, or is not reserved by this client.
    NotFound,
    /// The server could not allocate memory for the job.
    OutOfMemory,
    /// The server is draining and refuses new jobs.
    Draining,
    /// A job body was not followed by CRLF.
    ExpectedCrlf,
    /// The job body exceeds the server's `max-job-size`.
    JobTooBig,
    /// A reserved job's TTR is about to expire.
    DeadlineSoon,
    /// No job became ready within the reserve timeout.
    TimedOut,
    /// Attempted to ignore the only watched tube.
    NotIgnored,
    /// The job was inserted but buried because the server ran out of memory.
    Buried,
    /// Malformed command line.
    BadFormat,
    /// The server does not know the command.
    UnknownCommand,
    /// Server-side bug.
    InternalError,
}

impl FailureKind {
    /// Maps the first token of a reply line to a known failure.
    pub fn from_line(line: &str) -> Option<Self> {
        let token = line.split_whitespace().next()?;
        let kind = match token {
            "NOT_FOUND" => Self::NotFound,
            "OUT_OF_MEMORY" => Self::OutOfMemory,
            "DRAINING" => Self::Draining,
            "EXPECTED_CRLF" => Self::ExpectedCrlf,
            "JOB_TOO_BIG" => Self::JobTooBig,
            "DEADLINE_SOON" => Self::DeadlineSoon,
            "TIMED_OUT" => Self::TimedOut,
            "NOT_IGNORED" => Self::NotIgnored,
            "BURIED" => Self::Buried,
            "BAD_FORMAT" => Self::BadFormat,
            "UNKNOWN_COMMAND" => Self::UnknownCommand,
            "INTERNAL_ERROR" => Self::InternalError,
            _ => return None,
        };
        Some(kind)
    }

    /// The token as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::OutOfMemory => "OUT_OF_MEMORY",
            Self::Draining => "DRAINING",
            Self::ExpectedCrlf => "EXPECTED_CRLF",
            Self::JobTooBig => "JOB_TOO_BIG",
            Self::DeadlineSoon => "DEADLINE_SOON",
            Self::TimedOut => "TIMED_OUT",
            Self::NotIgnored => "NOT_IGNORED",
            Self::Buried => "BURIED",
            Self::BadFormat => "BAD_FORMAT",
            Self::UnknownCommand => "UNKNOWN_COMMAND",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
