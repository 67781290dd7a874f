//! Subcommands of the `lentil` binary.
//!
//! Each action runs against an open [`Client`] and writes its result to
//! any `io::Write`, as plain text or as JSON.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use clap::Subcommand;
use lentil_core::{Client, DEFAULT_TUBE, Job, LentilError};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::config::JobDefaults;

/// Failure of a single CLI action.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Queue(#[from] LentilError),

    #[error("writing output: {0}")]
    Output(#[from] std::io::Error),

    #[error("encoding JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// `key:value` and `id:body` lines.
    #[default]
    Text,
    Json,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// List all existing tubes.
    ListTubes,

    /// Stop handing out jobs from a tube for a while.
    PauseTube {
        tube: String,
        /// Seconds to pause for.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        delay: u32,
    },

    /// Print statistics for one tube.
    StatsTube { tube: String },

    /// Print server-wide statistics.
    Stats,

    /// Empty a tube by reserving and deleting every ready job in it.
    Drain { tube: String },

    /// Insert a job.
    Put {
        body: String,
        #[arg(long)]
        tube: Option<String>,
        #[arg(long)]
        pri: Option<u32>,
        #[arg(long)]
        delay: Option<u32>,
        #[arg(long)]
        ttr: Option<u32>,
    },

    /// Show a job by id.
    Peek { id: u64 },

    /// Show the next buried job of a tube.
    PeekBuried {
        #[arg(long)]
        tube: Option<String>,
    },

    /// Show the next delayed job of a tube.
    PeekDelayed {
        #[arg(long)]
        tube: Option<String>,
    },

    /// Move up to `bound` buried (or else delayed) jobs to the ready queue.
    Kick {
        bound: u32,
        #[arg(long)]
        tube: Option<String>,
    },

    /// Delete a job by id.
    Delete { id: u64 },
}

// ── Dispatch ─────────────────────────────────────────────────────

/// Run `action` and print its result.
pub async fn run<S, W>(
    client: &mut Client<S>,
    action: &Action,
    defaults: &JobDefaults,
    format: Format,
    out: &mut W,
) -> Result<(), CliError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: Write,
{
    debug!(?action, "running");
    let tube_or_default =
        |tube: &Option<String>| tube.clone().unwrap_or_else(|| defaults.tube.clone());

    match action {
        Action::ListTubes => {
            let tubes = client.list_tubes().await?;
            match format {
                Format::Text => {
                    for tube in &tubes {
                        writeln!(out, "{tube}")?;
                    }
                }
                Format::Json => writeln!(out, "{}", serde_json::to_string(&tubes)?)?,
            }
        }
        Action::PauseTube { tube, delay } => {
            client.pause_tube(tube, *delay).await?;
            info!(%tube, delay, "tube paused");
        }
        Action::StatsTube { tube } => {
            let stats = client.stats_tube(tube).await?;
            write_map(out, stats, format)?;
        }
        Action::Stats => {
            let stats = client.stats().await?;
            write_map(out, stats, format)?;
        }
        Action::Drain { tube } => {
            drain(client, tube, format, out).await?;
        }
        Action::Put {
            body,
            tube,
            pri,
            delay,
            ttr,
        } => {
            client.use_tube(&tube_or_default(tube)).await?;
            let id = client
                .put(
                    pri.unwrap_or(defaults.priority),
                    delay.unwrap_or(defaults.delay),
                    ttr.unwrap_or(defaults.ttr),
                    body.clone(),
                )
                .await?;
            match format {
                Format::Text => writeln!(out, "id:{id}")?,
                Format::Json => writeln!(out, "{}", json!({ "id": id }))?,
            }
        }
        Action::Peek { id } => {
            let job = client.peek(*id).await?;
            write_job(out, &job, format)?;
        }
        Action::PeekBuried { tube } => {
            client.use_tube(&tube_or_default(tube)).await?;
            let job = client.peek_buried().await?;
            write_job(out, &job, format)?;
        }
        Action::PeekDelayed { tube } => {
            client.use_tube(&tube_or_default(tube)).await?;
            let job = client.peek_delayed().await?;
            write_job(out, &job, format)?;
        }
        Action::Kick { bound, tube } => {
            client.use_tube(&tube_or_default(tube)).await?;
            let kicked = client.kick(*bound).await?;
            match format {
                Format::Text => writeln!(out, "{kicked}")?,
                Format::Json => writeln!(out, "{}", json!({ "kicked": kicked }))?,
            }
        }
        Action::Delete { id } => {
            client.delete(*id).await?;
            info!(id, "job deleted");
        }
    }
    Ok(())
}

/// Reserve and delete ready jobs from `tube` until none is left, printing
/// each one. Returns how many were removed.
///
/// Only `tube` is watched while draining; `default` is ignored unless it
/// is the tube being drained.
pub async fn drain<S, W>(
    client: &mut Client<S>,
    tube: &str,
    format: Format,
    out: &mut W,
) -> Result<usize, CliError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: Write,
{
    client.watch(tube).await?;
    if tube != DEFAULT_TUBE {
        client.ignore(DEFAULT_TUBE).await?;
    }

    let mut drained = 0;
    loop {
        let job = match client.reserve_with_timeout(0).await {
            Ok(job) => job,
            Err(e) if e.is_timed_out() => break,
            Err(e) => return Err(e.into()),
        };
        write_job(out, &job, format)?;
        client.delete(job.id).await?;
        drained += 1;
    }

    info!(tube, drained, "tube drained");
    Ok(drained)
}

// ── Output ───────────────────────────────────────────────────────

/// Bodies are printed as text; invalid UTF-8 is replaced.
fn write_job(out: &mut impl Write, job: &Job, format: Format) -> Result<(), CliError> {
    let body = String::from_utf8_lossy(&job.body);
    match format {
        Format::Text => writeln!(out, "{}:{body}", job.id)?,
        Format::Json => writeln!(out, "{}", json!({ "id": job.id, "body": body }))?,
    }
    Ok(())
}

/// Statistics sorted by key, so output is stable between runs.
fn write_map(
    out: &mut impl Write,
    map: HashMap<String, String>,
    format: Format,
) -> Result<(), CliError> {
    let sorted: BTreeMap<String, String> = map.into_iter().collect();
    match format {
        Format::Text => {
            for (key, value) in &sorted {
                writeln!(out, "{key}:{value}")?;
            }
        }
        Format::Json => writeln!(out, "{}", serde_json::to_string(&sorted)?)?,
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
