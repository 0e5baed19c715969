//! Scatter router: one input stream, K branch inputs.
//!
//! Records are whole lines. Each goes to exactly one channel, round-robin
//! from channel 0, so channel `i` receives records `i`, `i + K`, `i + 2K`, ...
//! as long as every branch is alive.
//!
//! A branch that failed to start (or died) closes its input pipe, and writing
//! to it fails with a broken pipe. That channel is dropped from the rotation
//! and the record goes to the next live channel instead. If the pipe closes
//! after part of a record was already written, the record is counted as torn
//! and not sent again: the dead branch may have read those bytes.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{TopologyError, TopologyResult};

/// What the router did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScatterStats {
    pub records: u64,
    pub bytes: u64,
    /// Records delivered to each channel.
    pub per_channel: Vec<u64>,
    /// Channels found closed, in the order they were found.
    pub dead_channels: Vec<usize>,
    /// Records cut short by a channel closing mid-write.
    pub torn_records: u64,
}

/// How writing one record to a channel ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Sent,
    /// Closed before any byte of the record went out.
    Refused,
    /// Closed after `written` bytes went out.
    Torn { written: usize },
}

/// Partition `input` across `outputs`. All outputs are closed on return.
#[tracing::instrument(level = "debug", skip_all, fields(fan_out = outputs.len()))]
pub async fn scatter<R, W>(mut input: R, mut outputs: Vec<W>) -> TopologyResult<ScatterStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let fan_out = outputs.len();
    if fan_out == 0 {
        return Err(TopologyError::NoLiveBranches);
    }

    let mut live = vec![true; fan_out];
    let mut stats = ScatterStats {
        per_channel: vec![0; fan_out],
        ..Default::default()
    };
    let mut next = 0;
    let mut record = Vec::new();

    loop {
        record.clear();
        let n = input
            .read_until(b'\n', &mut record)
            .await
            .map_err(|e| TopologyError::io("reading router input", e))?;
        if n == 0 {
            break;
        }

        loop {
            let target = next_live(&live, next).ok_or(TopologyError::AllBranchesClosed)?;
            next = (target + 1) % fan_out;

            let delivery = send_record(&mut outputs[target], &record)
                .await
                .map_err(|e| TopologyError::io(format!("writing to branch {target}"), e))?;
            match delivery {
                Delivery::Sent => {
                    stats.per_channel[target] += 1;
                    break;
                }
                Delivery::Refused => {
                    tracing::warn!(channel = target, record = stats.records, "branch input closed; rerouting");
                    live[target] = false;
                    stats.dead_channels.push(target);
                }
                Delivery::Torn { written } => {
                    tracing::warn!(
                        channel = target,
                        record = stats.records,
                        written,
                        "branch input closed mid-record; record lost"
                    );
                    live[target] = false;
                    stats.dead_channels.push(target);
                    stats.torn_records += 1;
                    break;
                }
            }
        }

        stats.records += 1;
        stats.bytes += n as u64;
    }

    for (channel, output) in outputs.iter_mut().enumerate() {
        if !live[channel] {
            continue;
        }
        match output.shutdown().await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Err(e) => return Err(TopologyError::io(format!("closing branch {channel}"), e)),
        }
    }
    drop(outputs);

    tracing::debug!(
        records = stats.records,
        bytes = stats.bytes,
        per_channel = ?stats.per_channel,
        "scatter complete"
    );
    Ok(stats)
}

/// Write all of `record`, reporting a broken pipe as a [`Delivery`].
async fn send_record<W>(output: &mut W, record: &[u8]) -> io::Result<Delivery>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while written < record.len() {
        match output.write(&record[written..]).await {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                return Ok(if written == 0 {
                    Delivery::Refused
                } else {
                    Delivery::Torn { written }
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(Delivery::Sent)
}

/// First live channel at or after `start`, wrapping around.
fn next_live(live: &[bool], start: usize) -> Option<usize> {
    (0..live.len())
        .map(|offset| (start + offset) % live.len())
        .find(|&channel| live[channel])
}
