//! Error types for topology configuration, construction and aggregation.

use std::io;

use thiserror::Error;

/// Result type for configuration checks.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for topology construction and runs.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Result type for the aggregation routine.
pub type AggregateResult<T> = Result<T, AggregateError>;

/// Configuration errors. Always detected before any process is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown stage: {0}")]
    UnknownStage(String),
    #[error("stage {stage}: program not found in PATH: {program}")]
    ProgramNotFound { stage: String, program: String },
    #[error("fan-out must be between 1 and {max}, got {got}")]
    FanOutOutOfRange { got: usize, max: usize },
    #[error("pipeline has no stages")]
    EmptyPipeline,
    #[error("no stage host available for embedded stage {stage}: {reason}")]
    NoStageHost { stage: String, reason: String },
}

/// Errors raised while building or running a topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to create pipe: {0}")]
    Channel(#[source] io::Error),
    #[error("failed to spawn stage {stage} (branch {branch}): {source}")]
    Spawn {
        stage: String,
        branch: usize,
        #[source]
        source: io::Error,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("every branch input closed before the input was exhausted")]
    AllBranchesClosed,
    #[error("no branch could be started")]
    NoLiveBranches,
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl TopologyError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        TopologyError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Errors from parsing and summing `(count, key)` records.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("malformed record at line {line}: {content:?}")]
    Malformed { line: u64, content: String },
    #[error("count for {key:?} overflows at line {line}")]
    Overflow { line: u64, key: String },
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}
