//! Merge reducer: K partial aggregates folded into one.
//!
//! Partial streams are drained concurrently so that no branch stalls on a
//! full output pipe while the reducer waits on another. Each drained stream is
//! then parsed on its own, in branch order, into one [`CountTable`], so a
//! branch whose last record lacks a newline never runs into the next branch.

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::aggregate::CountTable;
use crate::error::{TopologyError, TopologyResult};

/// What the reducer did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Distinct keys written.
    pub entries: usize,
    /// Bytes received from each branch.
    pub partial_bytes: Vec<u64>,
    /// Counts carried by records with an empty key.
    pub blank_records: u64,
}

/// Fold every stream in `partials` into one table and write it to `out`.
#[tracing::instrument(level = "debug", skip_all, fields(partials = partials.len()))]
pub async fn merge_and_reduce<R, W>(partials: Vec<R>, out: &mut W) -> TopologyResult<MergeStats>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + ?Sized,
{
    let drains = partials.into_iter().enumerate().map(|(branch, mut partial)| async move {
        let mut buf = Vec::new();
        partial
            .read_to_end(&mut buf)
            .await
            .map_err(|e| TopologyError::io(format!("reading partial output of branch {branch}"), e))?;
        Ok::<_, TopologyError>(buf)
    });
    let drained = futures::future::try_join_all(drains).await?;

    let partial_bytes = drained.iter().map(|buf| buf.len() as u64).collect();

    let mut table = CountTable::new();
    for partial in &drained {
        table.read_from(partial.as_slice()).await?;
    }
    table
        .write_to(out)
        .await
        .map_err(|e| TopologyError::io("writing merged output", e))?;

    let stats = MergeStats {
        entries: table.len(),
        partial_bytes,
        blank_records: table.blank_records(),
    };
    tracing::debug!(entries = stats.entries, total = %table.total(), "merge complete");
    Ok(stats)
}
