//! Scheduler: process chains, fan-out and fan-in.
//!
//! This module provides:
//! - **Channels**: anonymous pipes whose ends are owned and moved, never shared.
//! - **Chains**: one pipeline spawned as a sequence of processes.
//! - **Replication**: K isolated chains from one pipeline.
//! - **Scatter / merge**: the router feeding the branches and the reducer
//!   folding their partial results.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Topology                              │
//! │                                                                  │
//! │            ┌─▶ [cat]─▶[tr]─▶ ... ─▶[uniq -c] ─┐  branch 0        │
//! │  input ─▶ scatter                             merge ─▶ out       │
//! │            └─▶ [cat]─▶[tr]─▶ ... ─▶[uniq -c] ─┘  branch 1        │
//! │                                                                  │
//! │  scatter: round-robin records     merge: sum counts per key      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod chain;
mod channel;
mod merge;
mod replicate;
mod scatter;
mod topology;

pub use chain::{build_chain, ChainError, LiveChain, StageExit, StageProcess};
pub use channel::{ChannelSet, PipeChannel, ReadEnd, WriteEnd};
pub use merge::{merge_and_reduce, MergeStats};
pub use replicate::{replicate, BranchFailure, Replication};
pub use scatter::{scatter, ScatterStats};
pub use topology::{RunReport, Topology};
