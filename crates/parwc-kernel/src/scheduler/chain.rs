//! Chain building: one pipeline realised as cooperating OS processes.
//!
//! ```text
//!   input ──▶ [stage 0] ──pipe──▶ [stage 1] ──pipe──▶ ... ──▶ [stage N-1] ──▶ output
//! ```
//!
//! The chain is built recursively. With more than one stage left, one pipe
//! is opened, the first stage is spawned writing into it, and the rest of
//! the chain is built reading from it. The last stage writes to the chain's
//! output. Every end is moved into exactly one child and the parent's copy
//! closes as soon as that child exists.

use std::os::unix::process::ExitStatusExt;

use nix::sys::signal::Signal;
use serde::Serialize;
use tokio::process::Child;

use crate::error::{ConfigError, TopologyError};
use crate::stage::{Pipeline, Stage};

use super::channel::{PipeChannel, ReadEnd, WriteEnd};

/// One spawned stage.
#[derive(Debug)]
pub struct StageProcess {
    pub branch: usize,
    pub position: usize,
    pub stage: String,
    pub pid: Option<u32>,
    child: Child,
}

impl StageProcess {
    /// Wait for the process to exit.
    pub async fn wait(mut self) -> StageExit {
        let mut exit = StageExit {
            branch: self.branch,
            position: self.position,
            stage: self.stage,
            pid: self.pid,
            code: None,
            signal: None,
            signal_name: None,
            wait_error: None,
        };
        match self.child.wait().await {
            Ok(status) => {
                exit.code = status.code();
                exit.signal = status.signal();
                exit.signal_name = status
                    .signal()
                    .and_then(|signo| Signal::try_from(signo).ok())
                    .map(|signal| signal.as_str().to_string());
            }
            Err(e) => exit.wait_error = Some(e.to_string()),
        }
        if !exit.success() {
            tracing::warn!(
                branch = exit.branch,
                stage = %exit.stage,
                code = ?exit.code,
                signal = ?exit.signal_name,
                "stage exited unsuccessfully"
            );
        }
        exit
    }
}

/// How a stage process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageExit {
    pub branch: usize,
    pub position: usize,
    pub stage: String,
    pub pid: Option<u32>,
    pub code: Option<i32>,
    pub signal: Option<i32>,
    /// e.g. `SIGPIPE` when a downstream stage exited early.
    pub signal_name: Option<String>,
    pub wait_error: Option<String>,
}

impl StageExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// The live processes of one chain, in stage order.
#[derive(Debug, Default)]
pub struct LiveChain {
    pub branch: usize,
    processes: Vec<StageProcess>,
}

impl LiveChain {
    fn new(branch: usize) -> Self {
        Self {
            branch,
            processes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Wait for every process in the chain.
    pub async fn wait(self) -> Vec<StageExit> {
        let mut exits = Vec::with_capacity(self.processes.len());
        for process in self.processes {
            exits.push(process.wait().await);
        }
        exits
    }
}

/// A chain that failed part-way. The processes spawned before the failure
/// are still running and must be waited for.
#[derive(Debug)]
pub struct ChainError {
    pub error: TopologyError,
    pub spawned: LiveChain,
}

/// Spawn `pipeline` as a chain reading `input` and writing `output`.
#[tracing::instrument(
    level = "debug",
    skip(pipeline, input, output),
    fields(stages = pipeline.len(), input_fd = input.raw_fd(), output_fd = output.raw_fd())
)]
pub fn build_chain(
    pipeline: &Pipeline,
    input: ReadEnd,
    output: WriteEnd,
    branch: usize,
) -> Result<LiveChain, ChainError> {
    let mut chain = LiveChain::new(branch);
    match build_link(pipeline.stages(), 0, input, output, &mut chain) {
        Ok(()) => Ok(chain),
        Err(error) => Err(ChainError {
            error,
            spawned: chain,
        }),
    }
}

fn build_link(
    stages: &[Stage],
    position: usize,
    input: ReadEnd,
    output: WriteEnd,
    chain: &mut LiveChain,
) -> Result<(), TopologyError> {
    match stages {
        [] => Err(ConfigError::EmptyPipeline.into()),
        [last] => {
            let process = spawn_stage(last, chain.branch, position, input, output)?;
            chain.processes.push(process);
            Ok(())
        }
        [first, rest @ ..] => {
            let PipeChannel { read, write } = PipeChannel::open()?;
            let process = spawn_stage(first, chain.branch, position, input, write)?;
            chain.processes.push(process);
            build_link(rest, position + 1, read, output, chain)
        }
    }
}

fn spawn_stage(
    stage: &Stage,
    branch: usize,
    position: usize,
    input: ReadEnd,
    output: WriteEnd,
) -> Result<StageProcess, TopologyError> {
    let mut cmd = stage.command();
    cmd.stdin(input.into_stdio());
    cmd.stdout(output.into_stdio());

    let child = cmd.spawn().map_err(|source| TopologyError::Spawn {
        stage: stage.name().to_string(),
        branch,
        source,
    })?;
    // The command still owns the parent's copies of stdin/stdout.
    drop(cmd);

    let pid = child.id();
    tracing::debug!(branch, position, stage = stage.name(), ?pid, "spawned stage");

    Ok(StageProcess {
        branch,
        position,
        stage: stage.name().to_string(),
        pid,
        child,
    })
}
