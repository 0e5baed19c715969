//! Frequency aggregation over `(count, key)` records.
//!
//! One routine serves three callers: the `merge-sum` embedded stage (as a
//! per-branch finalizer), the `parwc merge-sum` command, and the Merge
//! Reducer that folds the partial outputs of every branch.
//!
//! ```text
//!       3 apple          ┐
//!       1 cherry         ├──▶ CountTable ──▶   5 apple
//!       2 apple          ┘    (BTreeMap)       1 cherry
//! ```
//!
//! Its input format is the format `uniq -c` and the `count-runs` stage
//! produce, and its own output parses back into the same table.

use std::collections::BTreeMap;
use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{AggregateError, AggregateResult};

/// One row of the aggregated output. Keys are the raw bytes the stages produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateEntry {
    pub key: Vec<u8>,
    pub count: u64,
}

/// A parsed input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
    /// Whitespace only. Not a record.
    Blank,
    /// A count followed by a key. The key may be empty.
    Entry { count: u64, key: &'a [u8] },
}

/// Parse one line as `<blanks><digits><one blank><key>`.
///
/// Returns `None` when the line is not blank and does not match.
pub fn parse_record(line: &[u8]) -> Option<Record<'_>> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let Some(start) = line.iter().position(|b| !matches!(b, b' ' | b'\t')) else {
        return Some(Record::Blank);
    };
    let body = &line[start..];

    let digits_end = body
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(body.len());
    if digits_end == 0 {
        return None;
    }
    let count: u64 = std::str::from_utf8(&body[..digits_end]).ok()?.parse().ok()?;

    let key = match body.get(digits_end) {
        None => &body[digits_end..],
        Some(b' ' | b'\t') => &body[digits_end + 1..],
        Some(_) => return None,
    };

    Some(Record::Entry { count, key })
}

/// Number of decimal digits needed to print `n`. Never less than 1.
pub fn decimal_width(n: u64) -> usize {
    n.checked_ilog10().map_or(1, |digits| digits as usize + 1)
}

/// Per-key counts, unique by key, iterated in ascending byte order of key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountTable {
    counts: BTreeMap<Vec<u8>, u64>,
    /// Lines consumed so far (for error positions across several reads).
    lines: u64,
    /// Sum of counts carried by records with an empty key.
    blank_records: u64,
}

impl CountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` occurrences of `key`.
    ///
    /// A sum that no longer fits in a `u64` is an error; the table keeps the
    /// value it had before the call.
    pub fn add(&mut self, key: &[u8], count: u64) -> AggregateResult<()> {
        let line = self.lines;
        let overflow = || AggregateError::Overflow {
            line,
            key: String::from_utf8_lossy(key).into_owned(),
        };

        if key.is_empty() {
            self.blank_records = self.blank_records.checked_add(count).ok_or_else(overflow)?;
            return Ok(());
        }
        match self.counts.get_mut(key) {
            Some(total) => *total = total.checked_add(count).ok_or_else(overflow)?,
            None => {
                self.counts.insert(key.to_vec(), count);
            }
        }
        Ok(())
    }

    /// Parse one line and fold it into the table.
    pub fn add_line(&mut self, line: &[u8]) -> AggregateResult<()> {
        self.lines += 1;
        match parse_record(line) {
            Some(Record::Blank) => Ok(()),
            Some(Record::Entry { count, key }) => {
                if key.is_empty() {
                    tracing::warn!(line = self.lines, count, "record with empty key");
                }
                self.add(key, count)
            }
            None => Err(AggregateError::Malformed {
                line: self.lines,
                content: String::from_utf8_lossy(line)
                    .trim_end_matches(['\n', '\r'])
                    .to_string(),
            }),
        }
    }

    /// Read records until end-of-stream.
    ///
    /// A final line without a newline is a whole record. Calling this once per
    /// stream keeps records of different streams apart.
    pub async fn read_from<R>(&mut self, mut reader: R) -> AggregateResult<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                return Ok(());
            }
            self.add_line(&buf)?;
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<u64> {
        self.counts.get(key.as_ref()).copied()
    }

    /// Sum of all counts in the table.
    pub fn total(&self) -> u128 {
        self.counts.values().map(|&c| u128::from(c)).sum()
    }

    /// Counts that arrived with an empty key and were kept out of the table.
    pub fn blank_records(&self) -> u64 {
        self.blank_records
    }

    /// Entries in ascending key order.
    pub fn entries(&self) -> impl Iterator<Item = AggregateEntry> + '_ {
        self.counts.iter().map(|(key, count)| AggregateEntry {
            key: key.clone(),
            count: *count,
        })
    }

    /// Width of the count column: digits of the largest count, at least 1.
    pub fn count_width(&self) -> usize {
        decimal_width(self.counts.values().copied().max().unwrap_or(0))
    }

    /// Render the table as `"  {count:>width} {key}\n"` rows, keys byte for byte.
    pub fn render(&self) -> Vec<u8> {
        let width = self.count_width();
        let mut out = Vec::new();
        for (key, count) in &self.counts {
            out.extend_from_slice(format!("  {count:>width$} ").as_bytes());
            out.extend_from_slice(key);
            out.push(b'\n');
        }
        out
    }

    pub async fn write_to<W>(&self, out: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        out.write_all(&self.render()).await?;
        out.flush().await
    }
}
