//! Stages: the named filter programs a pipeline is made of.
//!
//! Every stage has the same contract: read bytes from stdin, write bytes to
//! stdout, exit. How that happens is decided by its [`StageAction`]:
//!
//! ```text
//! StageRegistry
//! ├── Embedded (cat, lowercase, sort, count-runs, ...)
//! │     └── spawned as `<stage host> stage <name>`
//! └── External (sys-sort → `sort`, sys-count-runs → `uniq -c`, ...)
//!       └── spawned directly with baked-in arguments
//! ```
//!
//! Names are resolved into launch recipes ([`Stage`]) when a topology is
//! built, so an unknown name or a missing program fails before anything runs.

mod filters;
mod registry;

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;

use crate::error::{ConfigError, ConfigResult};

pub use filters::{
    ByteTranslate, CountRuns, Filter, MergeSum, Passthrough, SortLines, SplitWords,
};
pub use registry::{resolve_in_path, StageRegistry};

/// Subcommand the stage host answers to.
pub const STAGE_HOST_SUBCOMMAND: &str = "stage";

/// What running a stage means.
#[derive(Clone)]
pub enum StageAction {
    /// Computed by an in-crate filter inside a stage host process.
    Embedded(Arc<dyn Filter>),
    /// Handed off to an external program.
    External { program: String, args: Vec<String> },
}

impl fmt::Debug for StageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageAction::Embedded(filter) => {
                f.debug_tuple("Embedded").field(&filter.name()).finish()
            }
            StageAction::External { program, args } => f
                .debug_struct("External")
                .field("program", program)
                .field("args", args)
                .finish(),
        }
    }
}

impl StageAction {
    pub fn is_embedded(&self) -> bool {
        matches!(self, StageAction::Embedded(_))
    }
}

/// A resolved stage: a name plus the exact program and arguments to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    name: String,
    program: PathBuf,
    args: Vec<String>,
}

impl Stage {
    /// Turn a registry action into a launch recipe.
    ///
    /// External programs must already be resolved to a path. Embedded
    /// actions need the stage host executable.
    pub fn from_action(
        name: &str,
        action: &StageAction,
        stage_host: Option<&Path>,
    ) -> ConfigResult<Self> {
        match action {
            StageAction::Embedded(_) => {
                let host = stage_host.ok_or_else(|| ConfigError::NoStageHost {
                    stage: name.to_string(),
                    reason: "no stage host configured".to_string(),
                })?;
                Ok(Self {
                    name: name.to_string(),
                    program: host.to_path_buf(),
                    args: vec![STAGE_HOST_SUBCOMMAND.to_string(), name.to_string()],
                })
            }
            StageAction::External { program, args } => Ok(Self {
                name: name.to_string(),
                program: PathBuf::from(program),
                args: args.clone(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Command for this stage. The caller binds stdin and stdout.
    pub(crate) fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stderr(Stdio::inherit());
        cmd
    }
}

/// An ordered, non-empty sequence of stages. A template, instantiated once
/// per branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> ConfigResult<Self> {
        if stages.is_empty() {
            return Err(ConfigError::EmptyPipeline);
        }
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false for a constructed pipeline.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn describe(&self) -> String {
        self.stages
            .iter()
            .map(Stage::name)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}
