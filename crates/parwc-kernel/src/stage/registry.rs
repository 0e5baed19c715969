//! Stage registry: names → actions.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{ConfigError, ConfigResult};

use super::filters::{
    ByteTranslate, CountRuns, Filter, MergeSum, Passthrough, SortLines, SplitWords,
};
use super::StageAction;

/// Registry of named stages.
#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    stages: BTreeMap<String, StageAction>,
}

impl StageRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every embedded filter and the `sys-` external stages.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register_filter(Passthrough::new("cat"));
        registry.register_filter(Passthrough::new("noop"));
        registry.register_filter(ByteTranslate::remove_digits());
        registry.register_filter(ByteTranslate::remove_punct());
        registry.register_filter(ByteTranslate::lowercase());
        registry.register_filter(SplitWords);
        registry.register_filter(SortLines);
        registry.register_filter(CountRuns);
        registry.register_filter(MergeSum);

        registry.register_external("sys-cat", "cat", &[]);
        registry.register_external("sys-remove-digits", "tr", &["-s", "[:digit:]", " "]);
        registry.register_external("sys-remove-punct", "tr", &["-s", "[:punct:]", " "]);
        registry.register_external("sys-lowercase", "tr", &["[A-Z]", "[a-z]"]);
        registry.register_external("sys-split-words", "tr", &["-s", "\\n\\f\\t\\r ", "\n"]);
        registry.register_external("sys-sort", "sort", &[]);
        registry.register_external("sys-count-runs", "uniq", &["-c"]);

        registry
    }

    /// Register an embedded filter under its own name.
    pub fn register_filter(&mut self, filter: impl Filter + 'static) {
        let name = filter.name().to_string();
        self.stages
            .insert(name, StageAction::Embedded(Arc::new(filter)));
    }

    /// Register an external program with baked-in arguments.
    pub fn register_external(&mut self, name: &str, program: &str, args: &[&str]) {
        self.stages.insert(
            name.to_string(),
            StageAction::External {
                program: program.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
            },
        );
    }

    /// Look up a stage without touching the filesystem.
    pub fn get(&self, name: &str) -> Option<&StageAction> {
        self.stages.get(name)
    }

    /// Look up an embedded filter (what the stage host runs).
    pub fn filter(&self, name: &str) -> Option<Arc<dyn Filter>> {
        match self.stages.get(name)? {
            StageAction::Embedded(filter) => Some(filter.clone()),
            StageAction::External { .. } => None,
        }
    }

    /// Resolve a stage for spawning.
    ///
    /// External programs without a `/` are looked up in `PATH` here, so a
    /// missing tool is a configuration error rather than a spawn failure.
    pub fn resolve(&self, name: &str) -> ConfigResult<StageAction> {
        let action = self
            .stages
            .get(name)
            .ok_or_else(|| ConfigError::UnknownStage(name.to_string()))?;

        match action {
            StageAction::Embedded(_) => Ok(action.clone()),
            StageAction::External { program, args } => {
                let resolved = if program.contains('/') {
                    Path::new(program)
                        .is_file()
                        .then(|| program.clone())
                } else {
                    let path_var = std::env::var("PATH").unwrap_or_default();
                    resolve_in_path(program, &path_var)
                };

                match resolved {
                    Some(program) => Ok(StageAction::External {
                        program,
                        args: args.clone(),
                    }),
                    None => Err(ConfigError::ProgramNotFound {
                        stage: name.to_string(),
                        program: program.clone(),
                    }),
                }
            }
        }
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.stages.keys().map(String::as_str).collect()
    }

    /// `(name, description)` pairs for listing.
    pub fn describe(&self) -> Vec<(String, String)> {
        self.stages
            .iter()
            .map(|(name, action)| {
                let description = match action {
                    StageAction::Embedded(filter) => filter.description().to_string(),
                    StageAction::External { program, args } => {
                        let mut argv = vec![program.clone()];
                        argv.extend(args.iter().map(|a| format!("{a:?}")));
                        format!("external: {}", argv.join(" "))
                    }
                };
                (name.clone(), description)
            })
            .collect()
    }
}

/// Resolve a command name in PATH.
///
/// Searches each directory in `path_var` (colon-separated) for an executable
/// named `name`. Returns the full path if found.
pub fn resolve_in_path(name: &str, path_var: &str) -> Option<String> {
    for dir in path_var.split(':') {
        if dir.is_empty() {
            continue;
        }

        let full_path = format!("{}/{}", dir, name);
        let path = Path::new(&full_path);

        if path.is_file() {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(metadata) = path.metadata()
                    && metadata.permissions().mode() & 0o111 != 0
                {
                    return Some(full_path);
                }
            }

            #[cfg(not(unix))]
            {
                return Some(full_path);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_word_count_chain() {
        let registry = StageRegistry::with_defaults();
        for name in [
            "cat",
            "remove-digits",
            "remove-punct",
            "lowercase",
            "split-words",
            "sort",
            "count-runs",
            "merge-sum",
            "noop",
        ] {
            assert!(
                registry.get(name).is_some_and(StageAction::is_embedded),
                "{name} should be embedded"
            );
        }
        for name in ["sys-cat", "sys-sort", "sys-count-runs", "sys-split-words"] {
            assert!(
                registry.get(name).is_some_and(|a| !a.is_embedded()),
                "{name} should be external"
            );
        }
    }

    #[test]
    fn test_unknown_stage() {
        let registry = StageRegistry::with_defaults();
        assert_eq!(
            registry.resolve("frobnicate").unwrap_err(),
            ConfigError::UnknownStage("frobnicate".to_string())
        );
    }

    #[test]
    fn test_external_resolves_against_path() {
        let registry = StageRegistry::with_defaults();
        match registry.resolve("sys-sort").unwrap() {
            StageAction::External { program, args } => {
                assert!(program.ends_with("/sort"), "resolved to {program}");
                assert!(args.is_empty());
            }
            other => panic!("expected external, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_program_is_config_error() {
        let mut registry = StageRegistry::new();
        registry.register_external("ghost", "definitely_not_a_real_command_12345", &[]);
        assert!(matches!(
            registry.resolve("ghost").unwrap_err(),
            ConfigError::ProgramNotFound { .. }
        ));
    }

    #[test]
    fn test_filter_lookup_skips_external() {
        let registry = StageRegistry::with_defaults();
        assert!(registry.filter("lowercase").is_some());
        assert!(registry.filter("sys-lowercase").is_none());
        assert!(registry.filter("nope").is_none());
    }

    #[test]
    fn test_names_sorted() {
        let registry = StageRegistry::with_defaults();
        let names = registry.names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        assert_eq!(registry.describe().len(), names.len());
    }

    #[test]
    fn test_resolve_in_path() {
        assert!(resolve_in_path("sh", "/nonexistent:/bin:/usr/bin").is_some());
        assert!(resolve_in_path("sh", "").is_none());
        assert!(resolve_in_path("definitely_not_a_real_command_12345", "/bin:/usr/bin").is_none());
    }
}
