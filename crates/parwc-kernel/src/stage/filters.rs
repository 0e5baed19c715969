//! Embedded filters: in-crate equivalents of the text tools a word-count
//! pipeline is built from.
//!
//! Each filter streams stdin to stdout. Only `sort` buffers its whole input.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::aggregate::CountTable;
use crate::error::AggregateError;

/// An embedded stage computation.
#[async_trait]
pub trait Filter: Send + Sync {
    /// The filter's name (used for lookup).
    fn name(&self) -> &str;

    /// Short description for `--list-stages`.
    fn description(&self) -> &str;

    /// Consume `input` until end-of-stream, writing the result to `output`.
    async fn run(
        &self,
        input: &mut (dyn AsyncBufRead + Unpin + Send),
        output: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> io::Result<()>;
}

/// Copies input to output unchanged.
pub struct Passthrough {
    name: String,
}

impl Passthrough {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Filter for Passthrough {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Copy stdin to stdout unchanged"
    }

    async fn run(
        &self,
        input: &mut (dyn AsyncBufRead + Unpin + Send),
        output: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> io::Result<()> {
        tokio::io::copy_buf(input, output).await?;
        output.flush().await
    }
}

/// Byte-for-byte translation with optional squeezing, like `tr [-s] SET1 SET2`.
///
/// When `squeeze` is set, runs of that byte in the translated output collapse
/// to one, including runs that were already present in the input.
pub struct ByteTranslate {
    name: &'static str,
    description: &'static str,
    translate: fn(u8) -> u8,
    squeeze: Option<u8>,
}

impl ByteTranslate {
    /// Digits become spaces; spaces squeezed.
    pub fn remove_digits() -> Self {
        Self {
            name: "remove-digits",
            description: "Replace digits with spaces, squeezing runs of spaces",
            translate: |b| if b.is_ascii_digit() { b' ' } else { b },
            squeeze: Some(b' '),
        }
    }

    /// ASCII punctuation becomes spaces; spaces squeezed.
    pub fn remove_punct() -> Self {
        Self {
            name: "remove-punct",
            description: "Replace punctuation with spaces, squeezing runs of spaces",
            translate: |b| if b.is_ascii_punctuation() { b' ' } else { b },
            squeeze: Some(b' '),
        }
    }

    /// A-Z becomes a-z.
    pub fn lowercase() -> Self {
        Self {
            name: "lowercase",
            description: "Fold ASCII uppercase letters to lowercase",
            translate: |b| b.to_ascii_lowercase(),
            squeeze: None,
        }
    }

    /// Translate `chunk` into `out`. `prev` carries the last emitted byte
    /// across chunk boundaries so squeezing does not depend on buffering.
    fn apply(&self, chunk: &[u8], prev: &mut Option<u8>, out: &mut Vec<u8>) {
        for &byte in chunk {
            let byte = (self.translate)(byte);
            if self.squeeze == Some(byte) && *prev == Some(byte) {
                continue;
            }
            out.push(byte);
            *prev = Some(byte);
        }
    }
}

#[async_trait]
impl Filter for ByteTranslate {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    async fn run(
        &self,
        input: &mut (dyn AsyncBufRead + Unpin + Send),
        output: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> io::Result<()> {
        let mut prev = None;
        let mut out = Vec::new();
        loop {
            let chunk = input.fill_buf().await?;
            if chunk.is_empty() {
                break;
            }
            out.clear();
            self.apply(chunk, &mut prev, &mut out);
            let consumed = chunk.len();
            input.consume(consumed);
            output.write_all(&out).await?;
        }
        output.flush().await
    }
}

/// Splits text into one word per line.
///
/// Runs of newline, form feed, tab, carriage return and space separate
/// words. Empty words are never emitted.
pub struct SplitWords;

impl SplitWords {
    fn is_separator(byte: u8) -> bool {
        matches!(byte, b'\n' | b'\x0c' | b'\t' | b'\r' | b' ')
    }
}

#[async_trait]
impl Filter for SplitWords {
    fn name(&self) -> &str {
        "split-words"
    }

    fn description(&self) -> &str {
        "Emit one word per line, splitting on whitespace"
    }

    async fn run(
        &self,
        input: &mut (dyn AsyncBufRead + Unpin + Send),
        output: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> io::Result<()> {
        let mut word = Vec::new();
        let mut out = Vec::new();
        loop {
            let chunk = input.fill_buf().await?;
            if chunk.is_empty() {
                break;
            }
            out.clear();
            for &byte in chunk {
                if Self::is_separator(byte) {
                    if !word.is_empty() {
                        out.extend_from_slice(&word);
                        out.push(b'\n');
                        word.clear();
                    }
                } else {
                    word.push(byte);
                }
            }
            let consumed = chunk.len();
            input.consume(consumed);
            output.write_all(&out).await?;
        }
        if !word.is_empty() {
            word.push(b'\n');
            output.write_all(&word).await?;
        }
        output.flush().await
    }
}

/// Sorts lines in byte order. A final line without a newline gets one.
pub struct SortLines;

#[async_trait]
impl Filter for SortLines {
    fn name(&self) -> &str {
        "sort"
    }

    fn description(&self) -> &str {
        "Sort lines in byte order"
    }

    async fn run(
        &self,
        input: &mut (dyn AsyncBufRead + Unpin + Send),
        output: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> io::Result<()> {
        let mut lines: Vec<Vec<u8>> = Vec::new();
        loop {
            let mut line = Vec::new();
            if input.read_until(b'\n', &mut line).await? == 0 {
                break;
            }
            if line.last() != Some(&b'\n') {
                line.push(b'\n');
            }
            lines.push(line);
        }

        lines.sort_unstable();

        for line in &lines {
            output.write_all(line).await?;
        }
        output.flush().await
    }
}

/// Collapses adjacent identical lines into `{count:>7} {line}`, like `uniq -c`.
pub struct CountRuns;

impl CountRuns {
    async fn emit(
        output: &mut (dyn AsyncWrite + Unpin + Send),
        line: &[u8],
        count: u64,
    ) -> io::Result<()> {
        output.write_all(format!("{count:>7} ").as_bytes()).await?;
        output.write_all(line).await?;
        output.write_all(b"\n").await
    }
}

#[async_trait]
impl Filter for CountRuns {
    fn name(&self) -> &str {
        "count-runs"
    }

    fn description(&self) -> &str {
        "Prefix each run of identical lines with its length"
    }

    async fn run(
        &self,
        input: &mut (dyn AsyncBufRead + Unpin + Send),
        output: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> io::Result<()> {
        let mut current: Option<(Vec<u8>, u64)> = None;
        let mut line = Vec::new();
        loop {
            line.clear();
            if input.read_until(b'\n', &mut line).await? == 0 {
                break;
            }
            let text = line.strip_suffix(b"\n").unwrap_or(&line);

            if let Some((run, count)) = current.as_mut()
                && run.as_slice() == text
            {
                *count += 1;
                continue;
            }
            if let Some((run, count)) = current.take() {
                Self::emit(output, &run, count).await?;
            }
            current = Some((text.to_vec(), 1));
        }
        if let Some((run, count)) = current {
            Self::emit(output, &run, count).await?;
        }
        output.flush().await
    }
}

/// Sums `(count, key)` records per key and prints them sorted by key.
pub struct MergeSum;

#[async_trait]
impl Filter for MergeSum {
    fn name(&self) -> &str {
        "merge-sum"
    }

    fn description(&self) -> &str {
        "Sum (count, key) records per key, sorted by key"
    }

    async fn run(
        &self,
        input: &mut (dyn AsyncBufRead + Unpin + Send),
        output: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> io::Result<()> {
        let mut table = CountTable::new();
        table.read_from(input).await.map_err(|e| match e {
            AggregateError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        })?;
        table.write_to(output).await
    }
}
