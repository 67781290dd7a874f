//! Matching decoded replies against the success pattern of a command.
//!
//! Each `expect_*` function consumes one [`Frame`] and either returns the
//! typed value or an error: [`LentilError::Framing`] for misframed payloads,
//! [`LentilError::Protocol`] with the verbatim line for everything else that
//! is not the expected success reply.

use std::collections::HashMap;
use std::str::FromStr;

use bytes::Bytes;

use crate::codec::Frame;
use crate::error::LentilError;
use crate::job::Job;

/// Status line of a reply that must not carry a payload.
fn status_line(frame: Frame) -> Result<String, LentilError> {
    match frame {
        Frame::Status(line) => Ok(line),
        Frame::Data { line, .. } => Err(LentilError::Protocol(line)),
        Frame::Misframed {
            expected, actual, ..
        } => Err(LentilError::Framing { expected, actual }),
    }
}

/// `TOKEN` with no arguments, e.g. `DELETED`.
pub(crate) fn expect_exact(frame: Frame, token: &str) -> Result<(), LentilError> {
    let line = status_line(frame)?;
    let matched = {
        let mut tokens = line.split_ascii_whitespace();
        tokens.next() == Some(token) && tokens.next().is_none()
    };
    if matched {
        Ok(())
    } else {
        Err(LentilError::Protocol(line))
    }
}

/// `TOKEN <value>`, e.g. `USING jobs`.
pub(crate) fn expect_word(frame: Frame, token: &str) -> Result<String, LentilError> {
    let line = status_line(frame)?;
    let value = {
        let mut tokens = line.split_ascii_whitespace();
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(first), Some(value), None) if first == token => Some(value.to_string()),
            _ => None,
        }
    };
    value.ok_or(LentilError::Protocol(line))
}

/// `TOKEN <n>`, e.g. `WATCHING 2` or `INSERTED 17`.
pub(crate) fn expect_number<T: FromStr>(frame: Frame, token: &str) -> Result<T, LentilError> {
    let line = status_line(frame)?;
    let parsed = {
        let mut tokens = line.split_ascii_whitespace();
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(first), Some(value), None) if first == token => value.parse().ok(),
            _ => None,
        }
    };
    parsed.ok_or(LentilError::Protocol(line))
}

/// `TOKEN <id> <bytes>` followed by the job body.
pub(crate) fn expect_job(frame: Frame, token: &str) -> Result<Job, LentilError> {
    let (line, body) = data(frame)?;
    let id = {
        let mut tokens = line.split_ascii_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some(first), Some(id)) if first == token => id.parse::<u64>().ok(),
            _ => None,
        }
    };
    match id {
        Some(id) => Ok(Job { id, body }),
        None => Err(LentilError::Protocol(line)),
    }
}

/// `OK <bytes>` followed by a YAML block.
pub(crate) fn expect_ok(frame: Frame) -> Result<Bytes, LentilError> {
    let (line, body) = data(frame)?;
    if line.split_ascii_whitespace().next() == Some("OK") {
        Ok(body)
    } else {
        Err(LentilError::Protocol(line))
    }
}

fn data(frame: Frame) -> Result<(String, Bytes), LentilError> {
    match frame {
        Frame::Data { line, body } => Ok((line, body)),
        Frame::Status(line) => Err(LentilError::Protocol(line)),
        Frame::Misframed {
            expected, actual, ..
        } => Err(LentilError::Framing { expected, actual }),
    }
}

// ── Body decoding ────────────────────────────────────────────────

/// Decode a statistics block into key/value pairs.
///
/// Each line is split on its first `:`; values are whitespace-trimmed.
/// Lines without a `:` (such as the `---` header) are skipped and later
/// duplicates win.
pub fn parse_map(body: &[u8]) -> HashMap<String, String> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Decode a tube listing into names, in server order.
///
/// The first line is a header; each following line is a `- name` entry.
/// Decoding stops at the first empty line.
pub fn parse_list(body: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(body)
        .lines()
        .skip(1)
        .map(str::trim)
        .take_while(|line| !line.is_empty())
        .map(|line| line.strip_prefix("- ").unwrap_or(line).to_string())
        .collect()
}
