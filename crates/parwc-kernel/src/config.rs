//! Topology configuration.

use std::path::PathBuf;

use crate::error::{ConfigError, ConfigResult};

/// Upper bound on the number of parallel branches.
pub const MAX_FAN_OUT: usize = 64;

/// The word-count chain, embedded stages.
pub const WORD_COUNT_STAGES: [&str; 7] = [
    "cat",
    "remove-digits",
    "remove-punct",
    "lowercase",
    "split-words",
    "sort",
    "count-runs",
];

/// The word-count chain, built from the system's `cat`, `tr`, `sort` and `uniq`.
pub const WORD_COUNT_SYSTEM_STAGES: [&str; 7] = [
    "sys-cat",
    "sys-remove-digits",
    "sys-remove-punct",
    "sys-lowercase",
    "sys-split-words",
    "sys-sort",
    "sys-count-runs",
];

/// Configuration for a fan-out/fan-in topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyConfig {
    /// Number of parallel branches (K).
    pub fan_out: usize,

    /// Stage names, in data-flow order.
    pub stages: Vec<String>,

    /// Executable that runs embedded stages as `<host> stage <name>`.
    ///
    /// `None` means the current executable.
    pub stage_host: Option<PathBuf>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self::word_count()
    }
}

impl TopologyConfig {
    /// Two branches of the seven-stage word-count chain.
    pub fn word_count() -> Self {
        Self {
            fan_out: 2,
            stages: WORD_COUNT_STAGES.iter().map(|s| s.to_string()).collect(),
            stage_host: None,
        }
    }

    /// The word-count chain using system tools instead of embedded filters.
    pub fn word_count_system() -> Self {
        Self {
            stages: WORD_COUNT_SYSTEM_STAGES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..Self::word_count()
        }
    }

    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out;
        self
    }

    pub fn with_stages<I, S>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stages = stages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_stage_host(mut self, host: impl Into<PathBuf>) -> Self {
        self.stage_host = Some(host.into());
        self
    }

    /// Check the fan-out bounds and that there is at least one stage.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(1..=MAX_FAN_OUT).contains(&self.fan_out) {
            return Err(ConfigError::FanOutOutOfRange {
                got: self.fan_out,
                max: MAX_FAN_OUT,
            });
        }
        if self.stages.is_empty() {
            return Err(ConfigError::EmptyPipeline);
        }
        Ok(())
    }

    /// The stage host to use: the configured one, else the running executable.
    pub fn resolve_stage_host(&self, stage: &str) -> ConfigResult<PathBuf> {
        if let Some(host) = &self.stage_host {
            if host.is_file() {
                return Ok(host.clone());
            }
            return Err(ConfigError::NoStageHost {
                stage: stage.to_string(),
                reason: format!("{} is not a file", host.display()),
            });
        }
        std::env::current_exe().map_err(|e| ConfigError::NoStageHost {
            stage: stage.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_is_two_branch_word_count() {
        let config = TopologyConfig::default();
        assert_eq!(config.fan_out, 2);
        assert_eq!(config.stages.len(), 7);
        assert_eq!(config.stages[0], "cat");
        assert_eq!(config.stages[6], "count-runs");
        assert!(config.stage_host.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_system_variant_keeps_fan_out() {
        let config = TopologyConfig::word_count_system().with_fan_out(4);
        assert_eq!(config.fan_out, 4);
        assert!(config.stages.iter().all(|s| s.starts_with("sys-")));
    }

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    #[case(8, true)]
    #[case(MAX_FAN_OUT, true)]
    #[case(MAX_FAN_OUT + 1, false)]
    fn test_fan_out_bounds(#[case] fan_out: usize, #[case] ok: bool) {
        let result = TopologyConfig::word_count().with_fan_out(fan_out).validate();
        assert_eq!(result.is_ok(), ok, "{result:?}");
    }

    #[test]
    fn test_empty_stage_list_rejected() {
        let config = TopologyConfig::word_count().with_stages(Vec::<String>::new());
        assert_eq!(config.validate().unwrap_err(), ConfigError::EmptyPipeline);
    }

    #[test]
    fn test_missing_stage_host() {
        let config = TopologyConfig::word_count().with_stage_host("/nonexistent/parwc");
        assert!(matches!(
            config.resolve_stage_host("cat").unwrap_err(),
            ConfigError::NoStageHost { .. }
        ));
    }

    #[test]
    fn test_current_exe_is_default_host() {
        let host = TopologyConfig::word_count().resolve_stage_host("cat").unwrap();
        assert!(host.is_absolute());
    }
}
