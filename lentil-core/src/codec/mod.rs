//! `tokio_util` codec for the beanstalkd wire protocol.
//!
//! ## Wire format
//!
//! ```text
//! client:  <command line>\r\n                    every command
//!          <bytes of payload>\r\n                 put only
//!
//! server:  <status line>\r\n                     every reply
//!          <bytes of payload>\r\n                 RESERVED <id> <n>
//!                                                 FOUND <id> <n>
//!                                                 OK <n>
//! ```
//!
//! Status lines ending in a bare `\n` are accepted as well; payloads must end
//! in CRLF. A payload whose CRLF is not found exactly `n` bytes after the
//! status line is reported as [`Frame::Misframed`] and the decoder skips past
//! the next CRLF so the stream can keep going. A declared length above the
//! configured maximum is rejected before anything is buffered.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::command::Command;
use crate::error::LentilError;

pub const CRLF: &[u8] = b"\r\n";

// ── Frame ────────────────────────────────────────────────────────

/// One decoded server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A reply consisting of a single status line.
    Status(String),
    /// A status line declaring a payload, with exactly that payload.
    Data { line: String, body: Bytes },
    /// A status line whose payload did not match the declared length.
    Misframed {
        line: String,
        expected: usize,
        actual: usize,
    },
}

impl Frame {
    /// The status line, without its terminator.
    pub fn line(&self) -> &str {
        match self {
            Self::Status(line) | Self::Data { line, .. } | Self::Misframed { line, .. } => line,
        }
    }
}

// ── BeanstalkCodec ───────────────────────────────────────────────

#[derive(Debug)]
struct PendingBody {
    line: String,
    len: usize,
}

/// Largest payload accepted by default, in bytes.
pub const DEFAULT_MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Encodes [`Command`]s and decodes [`Frame`]s.
#[derive(Debug)]
pub struct BeanstalkCodec {
    pending: Option<PendingBody>,
    max_body_size: usize,
}

impl Default for BeanstalkCodec {
    fn default() -> Self {
        Self::with_max_body_size(DEFAULT_MAX_BODY_SIZE)
    }
}

impl BeanstalkCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// A codec that rejects replies announcing more than `max_body_size`
    /// payload bytes.
    pub fn with_max_body_size(max_body_size: usize) -> Self {
        Self {
            pending: None,
            max_body_size,
        }
    }

    fn decode_body(&mut self, src: &mut BytesMut) -> Option<Frame> {
        let len = self.pending.as_ref()?.len;

        // The payload must be followed by exactly CRLF.
        match src.get(len..len + CRLF.len()) {
            Some(terminator) if terminator == CRLF => {}
            Some(_) => return self.resync(src),
            None if src.len() > len && src[len] != b'\r' => return self.resync(src),
            None => {
                src.reserve((len + CRLF.len()).saturating_sub(src.len()));
                return None;
            }
        }

        let pending = self.pending.take()?;
        let mut chunk = src.split_to(len + CRLF.len());
        chunk.truncate(len);
        Some(Frame::Data {
            line: pending.line,
            body: chunk.freeze(),
        })
    }

    /// Consumes a payload whose terminator is not where the declared length
    /// puts it, up to and including the first CRLF that ends at or after
    /// that point.
    fn resync(&mut self, src: &mut BytesMut) -> Option<Frame> {
        let len = self.pending.as_ref()?.len;
        let from = len.saturating_sub(1);
        let end = from
            + src[from..]
                .windows(CRLF.len())
                .position(|window| window == CRLF)?
            + CRLF.len();
        let pending = self.pending.take()?;
        let consumed = src.split_to(end);
        Some(Frame::Misframed {
            line: pending.line,
            expected: pending.len,
            actual: content_len(&consumed),
        })
    }
}

impl Decoder for BeanstalkCodec {
    type Item = Frame;
    type Error = LentilError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.pending.is_none() {
            let Some(newline) = src.iter().position(|&b| b == b'\n') else {
                return Ok(None);
            };
            let raw = src.split_to(newline + 1);
            let line = String::from_utf8_lossy(&raw[..content_len(&raw)]).into_owned();

            match declared_body_len(&line) {
                Some(len) if len > self.max_body_size => {
                    return Err(LentilError::Protocol(line));
                }
                Some(len) => self.pending = Some(PendingBody { line, len }),
                None => return Ok(Some(Frame::Status(line))),
            }
        }

        Ok(self.decode_body(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        match self.pending.take() {
            // Truncated payload: whatever arrived before the peer hung up,
            // possibly nothing.
            Some(pending) => {
                let actual = content_len(src);
                src.clear();
                Ok(Some(Frame::Misframed {
                    line: pending.line,
                    expected: pending.len,
                    actual,
                }))
            }
            None if src.is_empty() => Ok(None),
            None => Err(LentilError::closed_by_peer()),
        }
    }
}

impl Encoder<Command> for BeanstalkCodec {
    type Error = LentilError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.to_string();
        let body_len = item.body().map_or(0, |body| body.len() + CRLF.len());
        dst.reserve(line.len() + CRLF.len() + body_len);

        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(CRLF);
        if let Some(body) = item.body() {
            dst.extend_from_slice(body);
            dst.extend_from_slice(CRLF);
        }
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Length of `raw` without a trailing `\n` or `\r\n`.
fn content_len(raw: &[u8]) -> usize {
    match raw {
        [.., b'\r', b'\n'] => raw.len() - 2,
        [.., b'\n'] => raw.len() - 1,
        _ => raw.len(),
    }
}

/// The payload size announced by a `RESERVED`, `FOUND` or `OK` line.
fn declared_body_len(line: &str) -> Option<usize> {
    let mut tokens = line.split_ascii_whitespace();
    match tokens.next()? {
        "RESERVED" | "FOUND" => {
            tokens.next()?.parse::<u64>().ok()?;
        }
        "OK" => {}
        _ => return None,
    }
    let len = tokens.next()?.parse::<usize>().ok()?;
    tokens.next().is_none().then_some(len)
}
