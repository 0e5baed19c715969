//! Branch replication: K independent copies of one pipeline.
//!
//! Branch `i` reads `inputs[i]` and writes `outputs[i]`. Nothing else of any
//! other branch reaches its processes: all descriptors are close-on-exec, and
//! the orchestrator's copies of both ends are gone once the branch is spawned.

use serde::Serialize;

use crate::stage::Pipeline;

use super::chain::{build_chain, ChainError, LiveChain, StageExit};
use super::channel::{ReadEnd, WriteEnd};

/// A branch that could not be fully constructed.
#[derive(Debug, Clone, Serialize)]
pub struct BranchFailure {
    pub branch: usize,
    pub error: String,
    /// Stages of this branch that were running before the failure.
    pub spawned: usize,
}

/// The outcome of replicating a pipeline.
#[derive(Debug, Default)]
pub struct Replication {
    /// Every chain that has at least one live process, complete or not.
    pub chains: Vec<LiveChain>,
    pub failures: Vec<BranchFailure>,
    /// Branches whose whole chain was spawned.
    pub complete: Vec<usize>,
}

impl Replication {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Wait for every spawned process in every branch.
    pub async fn wait(self) -> Vec<StageExit> {
        let waits = self.chains.into_iter().map(LiveChain::wait);
        futures::future::join_all(waits)
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Spawn one chain per `(input, output)` pair.
///
/// A failing branch does not stop the others. Its channel ends are dropped
/// with the failed chain, so its input pipe reports a broken pipe to the
/// router and its output pipe reaches end-of-stream for the reducer.
#[tracing::instrument(level = "debug", skip_all, fields(fan_out = inputs.len(), stages = pipeline.len()))]
pub fn replicate(
    pipeline: &Pipeline,
    inputs: Vec<ReadEnd>,
    outputs: Vec<WriteEnd>,
) -> Replication {
    debug_assert_eq!(inputs.len(), outputs.len());

    let mut replication = Replication::default();
    for (branch, (input, output)) in inputs.into_iter().zip(outputs).enumerate() {
        match build_chain(pipeline, input, output, branch) {
            Ok(chain) => {
                replication.complete.push(branch);
                replication.chains.push(chain);
            }
            Err(ChainError { error, spawned }) => {
                tracing::error!(branch, spawned = spawned.len(), %error, "branch construction failed");
                replication.failures.push(BranchFailure {
                    branch,
                    error: error.to_string(),
                    spawned: spawned.len(),
                });
                if !spawned.is_empty() {
                    replication.chains.push(spawned);
                }
            }
        }
    }
    replication
}
