//! parwc-kernel: parallel word counting over OS process pipelines.
//!
//! This crate provides:
//!
//! - **Stages**: named filter programs, either embedded filters run through a
//!   stage host process or external programs such as `tr`, `sort` and `uniq`
//! - **Scheduler**: pipe channels, chain building, branch replication, the
//!   scatter router and the merge reducer
//! - **Aggregate**: the `(count, key)` summing routine shared by the per-branch
//!   finalizer and the cross-branch merge
//! - **Config**: fan-out, stage list and stage host for a topology

pub mod aggregate;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod stage;

pub use aggregate::{AggregateEntry, CountTable};
pub use config::{TopologyConfig, MAX_FAN_OUT};
pub use error::{
    AggregateError, AggregateResult, ConfigError, ConfigResult, TopologyError, TopologyResult,
};
pub use scheduler::{RunReport, Topology};
pub use stage::{Filter, Pipeline, Stage, StageAction, StageRegistry};
