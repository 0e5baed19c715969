//! OS pipe channels with explicit ownership of each end.
//!
//! ```text
//!   PipeChannel::open()
//!        ├── ReadEnd  ──▶ moved into exactly one reader (child stdin or router side)
//!        └── WriteEnd ──▶ moved into exactly one writer (child stdout or reducer side)
//! ```
//!
//! Ends are move-only: handing one to a child consumes it, and dropping it
//! closes the descriptor. Every descriptor is created close-on-exec, so a
//! spawned stage keeps only the two ends rebound to its stdin and stdout and
//! can never hold a stray write end that would keep another reader from
//! seeing end-of-stream.

use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::process::Stdio;

use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use tokio::net::unix::pipe;

use crate::error::{TopologyError, TopologyResult};

/// Reading end of a pipe (or an input file standing in for one).
#[derive(Debug)]
pub struct ReadEnd(OwnedFd);

/// Writing end of a pipe.
#[derive(Debug)]
pub struct WriteEnd(OwnedFd);

impl ReadEnd {
    pub fn raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }

    /// Bind as a child's stdin. The parent's copy closes when the command
    /// that owns the `Stdio` is dropped.
    pub fn into_stdio(self) -> Stdio {
        Stdio::from(self.0)
    }

    /// Async reader for the orchestrator side of the channel.
    pub fn into_async(self) -> io::Result<pipe::Receiver> {
        pipe::Receiver::from_file(File::from(self.0))
    }

    /// Close this end now.
    pub fn close(self) {
        tracing::trace!(fd = self.raw_fd(), "closing read end");
    }
}

impl WriteEnd {
    pub fn raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }

    /// Bind as a child's stdout.
    pub fn into_stdio(self) -> Stdio {
        Stdio::from(self.0)
    }

    /// Async writer for the orchestrator side of the channel.
    pub fn into_async(self) -> io::Result<pipe::Sender> {
        pipe::Sender::from_file(File::from(self.0))
    }

    /// Close this end now. Readers see end-of-stream once every copy is closed.
    pub fn close(self) {
        tracing::trace!(fd = self.raw_fd(), "closing write end");
    }
}

impl From<File> for ReadEnd {
    fn from(file: File) -> Self {
        ReadEnd(OwnedFd::from(file))
    }
}

impl From<ReadEnd> for OwnedFd {
    fn from(end: ReadEnd) -> Self {
        end.0
    }
}

impl From<WriteEnd> for OwnedFd {
    fn from(end: WriteEnd) -> Self {
        end.0
    }
}

/// An anonymous unidirectional pipe: one read end, one write end.
#[derive(Debug)]
pub struct PipeChannel {
    pub read: ReadEnd,
    pub write: WriteEnd,
}

impl PipeChannel {
    /// Create a pipe whose descriptors are close-on-exec.
    pub fn open() -> TopologyResult<Self> {
        let (read, write) =
            pipe2(OFlag::O_CLOEXEC).map_err(|errno| TopologyError::Channel(errno.into()))?;
        let channel = Self {
            read: ReadEnd(read),
            write: WriteEnd(write),
        };
        tracing::trace!(
            read = channel.read.raw_fd(),
            write = channel.write.raw_fd(),
            "opened pipe"
        );
        Ok(channel)
    }
}

/// K channels opened together, one per branch. Replaces fixed-size
/// descriptor arrays with owned vectors of ends.
#[derive(Debug)]
pub struct ChannelSet {
    reads: Vec<ReadEnd>,
    writes: Vec<WriteEnd>,
}

impl ChannelSet {
    pub fn open(count: usize) -> TopologyResult<Self> {
        let mut reads = Vec::with_capacity(count);
        let mut writes = Vec::with_capacity(count);
        for _ in 0..count {
            let PipeChannel { read, write } = PipeChannel::open()?;
            reads.push(read);
            writes.push(write);
        }
        Ok(Self { reads, writes })
    }

    pub fn len(&self) -> usize {
        self.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }

    /// Hand out every read end and every write end, index `i` belonging to
    /// channel `i`.
    pub fn into_ends(self) -> (Vec<ReadEnd>, Vec<WriteEnd>) {
        (self.reads, self.writes)
    }
}
