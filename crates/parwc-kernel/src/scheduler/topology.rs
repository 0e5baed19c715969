//! Topology: router → K branches → reducer.
//!
//! ```text
//!                        ┌──▶ branch 0 ──┐
//!   input ──▶ scatter ───┼──▶ branch 1 ──┼───▶ merge_and_reduce ──▶ out
//!                        └──▶ branch K-1 ┘
//! ```
//!
//! Branches are OS process chains. The router and reducer run inside the
//! orchestrator as tasks, concurrently with reaping the branch processes.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::io::{AsyncWrite, BufReader};
use tokio::net::unix::pipe;

use crate::config::TopologyConfig;
use crate::error::{ConfigResult, TopologyError, TopologyResult};
use crate::stage::{Pipeline, Stage, StageRegistry};

use super::chain::{build_chain, ChainError, StageExit};
use super::channel::{ChannelSet, PipeChannel, ReadEnd};
use super::merge::{merge_and_reduce, MergeStats};
use super::replicate::{replicate, BranchFailure};
use super::scatter::{scatter, ScatterStats};

/// Everything that happened during one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub fan_out: usize,
    pub pipeline: String,
    /// `None` when the input went straight into a single branch.
    pub scatter: Option<ScatterStats>,
    /// Branches the router fed, in channel order.
    pub scattered_to: Vec<usize>,
    pub merge: MergeStats,
    pub stages: Vec<StageExit>,
    pub failed_branches: Vec<BranchFailure>,
}

impl RunReport {
    /// Whether every stage of every branch was spawned.
    pub fn fully_spawned(&self) -> bool {
        self.failed_branches.is_empty()
    }

    /// Whether every spawned stage exited with status zero.
    pub fn stages_succeeded(&self) -> bool {
        self.stages.iter().all(StageExit::success)
    }
}

/// A validated topology, ready to run.
#[derive(Debug, Clone)]
pub struct Topology {
    fan_out: usize,
    pipeline: Pipeline,
}

impl Topology {
    /// Resolve every stage of `config` against `registry`.
    ///
    /// Nothing is spawned here. Every configuration error surfaces now.
    pub fn new(config: &TopologyConfig, registry: &StageRegistry) -> ConfigResult<Self> {
        config.validate()?;

        let mut host: Option<PathBuf> = None;
        let mut stages = Vec::with_capacity(config.stages.len());
        for name in &config.stages {
            let action = registry.resolve(name)?;
            if action.is_embedded() && host.is_none() {
                host = Some(config.resolve_stage_host(name)?);
            }
            stages.push(Stage::from_action(name, &action, host.as_deref())?);
        }

        let pipeline = Pipeline::new(stages)?;
        tracing::debug!(fan_out = config.fan_out, pipeline = %pipeline.describe(), "topology configured");
        Ok(Self {
            fan_out: config.fan_out,
            pipeline,
        })
    }

    pub fn fan_out(&self) -> usize {
        self.fan_out
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run the topology over the file at `input`, writing the merged table to `out`.
    ///
    /// With a fan-out of one this is [`Topology::run_unscattered`].
    #[tracing::instrument(level = "info", skip(self, out), fields(fan_out = self.fan_out))]
    pub async fn run<W>(&self, input: &Path, out: &mut W) -> TopologyResult<RunReport>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if self.fan_out == 1 {
            return self.run_unscattered(input, out).await;
        }

        let file = open_input(input)?;
        let fan_out = self.fan_out;

        let (branch_inputs, router_ends) = ChannelSet::open(fan_out)?.into_ends();
        let (reducer_ends, branch_outputs) = ChannelSet::open(fan_out)?.into_ends();

        // Orchestrator-side ends become async before anything is spawned.
        let mut router_outputs = router_ends
            .into_iter()
            .map(|end| end.into_async().map(Some))
            .collect::<std::io::Result<Vec<Option<pipe::Sender>>>>()
            .map_err(|e| TopologyError::io("registering router pipes", e))?;
        let reducer_inputs = reducer_ends
            .into_iter()
            .map(|end| end.into_async())
            .collect::<std::io::Result<Vec<pipe::Receiver>>>()
            .map_err(|e| TopologyError::io("registering reducer pipes", e))?;

        let replication = replicate(&self.pipeline, branch_inputs, branch_outputs);
        let failed_branches = replication.failures.clone();

        // Only fully built branches get records. The rest see end-of-stream.
        let scattered_to = replication.complete.clone();
        let senders: Vec<pipe::Sender> = scattered_to
            .iter()
            .filter_map(|&branch| router_outputs[branch].take())
            .collect();
        drop(router_outputs);

        if senders.is_empty() {
            drop(reducer_inputs);
            replication.wait().await;
            return Err(TopologyError::NoLiveBranches);
        }

        let reader = BufReader::new(tokio::fs::File::from_std(file));
        let router = tokio::spawn(scatter(reader, senders));

        let (merged, stages) =
            tokio::join!(merge_and_reduce(reducer_inputs, out), replication.wait());

        let scattered = router
            .await
            .map_err(|e| TopologyError::io("router task", std::io::Error::other(e)))?;
        let merge = merged?;
        let scatter = scattered?;

        let report = RunReport {
            fan_out,
            pipeline: self.pipeline.describe(),
            scatter: Some(scatter),
            scattered_to,
            merge,
            stages,
            failed_branches,
        };
        log_outcome(&report);
        Ok(report)
    }

    /// Run one branch with the input file bound directly to its stdin.
    #[tracing::instrument(level = "info", skip(self, out))]
    pub async fn run_unscattered<W>(&self, input: &Path, out: &mut W) -> TopologyResult<RunReport>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let file = open_input(input)?;
        let PipeChannel { read, write } = PipeChannel::open()?;
        let receiver = read
            .into_async()
            .map_err(|e| TopologyError::io("registering reducer pipe", e))?;

        let chain = match build_chain(&self.pipeline, ReadEnd::from(file), write, 0) {
            Ok(chain) => chain,
            Err(ChainError { error, spawned }) => {
                drop(receiver);
                spawned.wait().await;
                return Err(error);
            }
        };

        let (merged, stages) = tokio::join!(merge_and_reduce(vec![receiver], out), chain.wait());

        let report = RunReport {
            fan_out: 1,
            pipeline: self.pipeline.describe(),
            scatter: None,
            scattered_to: vec![0],
            merge: merged?,
            stages,
            failed_branches: Vec::new(),
        };
        log_outcome(&report);
        Ok(report)
    }
}

fn open_input(path: &Path) -> TopologyResult<File> {
    File::open(path).map_err(|e| TopologyError::io(format!("opening {}", path.display()), e))
}

fn log_outcome(report: &RunReport) {
    if !report.fully_spawned() {
        tracing::warn!(
            failed = report.failed_branches.len(),
            "run finished with missing branches"
        );
    }
    if let Some(torn) = report.scatter.as_ref().map(|s| s.torn_records).filter(|&n| n > 0) {
        tracing::warn!(torn, "records lost to branches that closed mid-record");
    }
    tracing::info!(
        entries = report.merge.entries,
        records = report.scatter.as_ref().map(|s| s.records),
        stages_ok = report.stages_succeeded(),
        "run complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    #[test]
    fn test_unknown_stage_fails_before_spawn() {
        let config = TopologyConfig::word_count_system().with_stages(["sys-cat", "nope"]);
        let err = Topology::new(&config, &StageRegistry::with_defaults()).unwrap_err();
        assert_eq!(err, ConfigError::UnknownStage("nope".to_string()));
    }

    #[test]
    fn test_fan_out_zero_rejected() {
        let config = TopologyConfig::word_count_system().with_fan_out(0);
        let err = Topology::new(&config, &StageRegistry::with_defaults()).unwrap_err();
        assert!(matches!(err, ConfigError::FanOutOutOfRange { got: 0, .. }));
    }

    #[test]
    fn test_embedded_stages_use_the_host() {
        let host = std::env::current_exe().unwrap();
        let config = TopologyConfig::word_count().with_stage_host(&host);
        let topology = Topology::new(&config, &StageRegistry::with_defaults()).unwrap();

        assert_eq!(topology.pipeline().len(), 7);
        for stage in topology.pipeline().stages() {
            assert_eq!(stage.program(), host.as_path());
            assert_eq!(stage.args()[0], "stage");
        }
    }

    #[test]
    fn test_report_flags() {
        let report = RunReport {
            fan_out: 2,
            pipeline: "sys-cat".to_string(),
            scatter: None,
            scattered_to: vec![0],
            merge: MergeStats::default(),
            stages: vec![StageExit {
                branch: 0,
                position: 0,
                stage: "sys-cat".to_string(),
                pid: None,
                code: Some(1),
                signal: None,
                signal_name: None,
                wait_error: None,
            }],
            failed_branches: vec![BranchFailure {
                branch: 1,
                error: "boom".to_string(),
                spawned: 0,
            }],
        };
        assert!(!report.fully_spawned());
        assert!(!report.stages_succeeded());
    }

    #[tokio::test]
    async fn test_missing_input_file() {
        let topology = Topology::new(
            &TopologyConfig::word_count_system(),
            &StageRegistry::with_defaults(),
        )
        .unwrap();
        let mut out = Vec::new();
        let err = topology
            .run(Path::new("/nonexistent/input.txt"), &mut out)
            .await
            .unwrap_err();
        assert!(matches!(err, TopologyError::Io { .. }));
        assert!(out.is_empty());
    }
}
