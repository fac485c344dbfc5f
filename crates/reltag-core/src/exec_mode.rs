//! Execution mode resolution.
//!
//! The same orchestration code runs for real, as a rehearsal, or as one of
//! several canned outcomes. Which one is decided per operation by walking
//! an ordered list of configuration scopes, most specific first; the first
//! scope holding a non-empty value for the operation wins. Scopes never
//! merge, and an unrecognised value is an error rather than a fall-through.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{ReltagError, Result};

/// How an operation is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    /// Validate, mutate and sync.
    Execute,
    /// Validate and report what would change; no mutating store calls.
    DryRun,
    /// Canned success without touching the store.
    SimulatePass,
    /// Canned failure without touching the store.
    SimulateFail,
    /// Succeed silently.
    Skip,
    /// Block until cancelled.
    SimulateTimeout,
}

impl ExecutionMode {
    pub const ALL: [ExecutionMode; 6] = [
        ExecutionMode::Execute,
        ExecutionMode::DryRun,
        ExecutionMode::SimulatePass,
        ExecutionMode::SimulateFail,
        ExecutionMode::Skip,
        ExecutionMode::SimulateTimeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Execute => "EXECUTE",
            ExecutionMode::DryRun => "DRY_RUN",
            ExecutionMode::SimulatePass => "SIMULATE_PASS",
            ExecutionMode::SimulateFail => "SIMULATE_FAIL",
            ExecutionMode::Skip => "SKIP",
            ExecutionMode::SimulateTimeout => "SIMULATE_TIMEOUT",
        }
    }

    /// Whether this mode may issue mutating store calls.
    pub fn mutates(&self) -> bool {
        matches!(self, ExecutionMode::Execute)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = ReltagError;

    /// Case-insensitive; `-` and `_` are interchangeable.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        ExecutionMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| ReltagError::UnknownExecutionMode {
                scope: "input".to_string(),
                value: s.to_string(),
            })
    }
}

/// Upper-case an operation or run identifier into an env-key token.
pub fn env_token(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

const ANY_OPERATION: &str = "*";

/// One named configuration scope: per-operation values and/or a value for every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeScope {
    name: String,
    values: BTreeMap<String, String>,
}

impl ModeScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    /// A scope that answers the same value for every operation.
    pub fn global(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut scope = Self::new(name);
        scope.values.insert(ANY_OPERATION.to_string(), value.into());
        scope
    }

    /// Set the value for one operation.
    pub fn with(mut self, operation: &str, value: impl Into<String>) -> Self {
        self.values.insert(env_token(operation), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Non-empty value for `operation`, if this scope has one.
    pub fn lookup(&self, operation: &str) -> Option<&str> {
        self.values
            .get(&env_token(operation))
            .or_else(|| self.values.get(ANY_OPERATION))
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

/// Which scope decided a mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMode {
    pub mode: ExecutionMode,
    /// `None` when no scope had a value and the built-in default applied.
    pub scope: Option<String>,
}

/// Ordered lookup sources, most specific first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionModeConfig {
    scopes: Vec<ModeScope>,
}

pub const ENV_PREFIX: &str = "RELTAG_";
pub const GLOBAL_MODE_KEY: &str = "RELTAG_MODE";

impl ExecutionModeConfig {
    pub fn new(scopes: Vec<ModeScope>) -> Self {
        Self { scopes }
    }

    /// Append a scope below all existing ones.
    pub fn push(&mut self, scope: ModeScope) {
        self.scopes.push(scope);
    }

    pub fn scopes(&self) -> &[ModeScope] {
        &self.scopes
    }

    /// Build the three standard scopes from environment-style pairs:
    ///
    /// - `RELTAG_RUN_<RUN_ID>_<OPERATION>_MODE` (only with a run id)
    /// - `RELTAG_<OPERATION>_MODE`
    /// - `RELTAG_MODE`
    pub fn from_vars<I, K, V>(vars: I, run_id: Option<&str>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let run_prefix = run_id.map(|id| format!("RUN_{}_", env_token(id)));
        let mut run = ModeScope::new("run");
        let mut operation = ModeScope::new("operation");
        let mut global = ModeScope::new("global");

        for (key, value) in vars {
            let key = key.as_ref();
            if key == GLOBAL_MODE_KEY {
                global.values.insert(ANY_OPERATION.to_string(), value.into());
                continue;
            }
            let Some(middle) = key
                .strip_prefix(ENV_PREFIX)
                .and_then(|rest| rest.strip_suffix("_MODE"))
            else {
                continue;
            };
            let run_op = run_prefix
                .as_deref()
                .and_then(|prefix| middle.strip_prefix(prefix));
            // Keys for other runs land in the operation scope under a token
            // no operation name produces unless it is literally `run-<id>-...`.
            match run_op {
                Some(op) if !op.is_empty() => {
                    run.values.insert(op.to_string(), value.into());
                }
                _ if !middle.is_empty() => {
                    operation.values.insert(middle.to_string(), value.into());
                }
                _ => {}
            }
        }

        Self::new(vec![run, operation, global])
    }

    /// Load from the process environment.
    pub fn from_env(run_id: Option<&str>) -> Self {
        Self::from_vars(std::env::vars(), run_id)
    }

    /// Resolve the mode for `operation`. Defaults to `EXECUTE` when no scope speaks.
    pub fn resolve(&self, operation: &str) -> Result<ResolvedMode> {
        for scope in &self.scopes {
            if let Some(value) = scope.lookup(operation) {
                let mode = value
                    .parse::<ExecutionMode>()
                    .map_err(|_| ReltagError::UnknownExecutionMode {
                        scope: scope.name.clone(),
                        value: value.to_string(),
                    })?;
                return Ok(ResolvedMode {
                    mode,
                    scope: Some(scope.name.clone()),
                });
            }
        }
        Ok(ResolvedMode {
            mode: ExecutionMode::Execute,
            scope: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_lenient_about_case_and_separator() {
        assert_eq!(
            "dry-run".parse::<ExecutionMode>().unwrap(),
            ExecutionMode::DryRun
        );
        assert_eq!(
            " Simulate_Timeout ".parse::<ExecutionMode>().unwrap(),
            ExecutionMode::SimulateTimeout
        );
        assert!(matches!(
            "YOLO".parse::<ExecutionMode>(),
            Err(ReltagError::UnknownExecutionMode { .. })
        ));
    }

    #[test]
    fn display_round_trips() {
        for mode in ExecutionMode::ALL {
            assert_eq!(mode.to_string().parse::<ExecutionMode>().unwrap(), mode);
        }
    }

    #[test]
    fn default_is_execute() {
        let resolved = ExecutionModeConfig::default().resolve("assign-tag").unwrap();
        assert_eq!(resolved.mode, ExecutionMode::Execute);
        assert_eq!(resolved.scope, None);
    }

    #[test]
    fn most_specific_scope_wins() {
        let config = ExecutionModeConfig::new(vec![
            ModeScope::new("run").with("assign-tag", "SIMULATE_FAIL"),
            ModeScope::new("operation").with("assign-tag", "DRY_RUN"),
            ModeScope::global("global", "EXECUTE"),
        ]);
        let resolved = config.resolve("assign-tag").unwrap();
        assert_eq!(resolved.mode, ExecutionMode::SimulateFail);
        assert_eq!(resolved.scope.as_deref(), Some("run"));

        let other = config.resolve("deploy").unwrap();
        assert_eq!(other.mode, ExecutionMode::Execute);
        assert_eq!(other.scope.as_deref(), Some("global"));
    }

    #[test]
    fn empty_values_fall_through() {
        let config = ExecutionModeConfig::new(vec![
            ModeScope::new("run").with("assign-tag", "  "),
            ModeScope::global("global", "SKIP"),
        ]);
        assert_eq!(
            config.resolve("assign-tag").unwrap().mode,
            ExecutionMode::Skip
        );
    }

    #[test]
    fn invalid_value_does_not_fall_through() {
        let config = ExecutionModeConfig::new(vec![
            ModeScope::new("operation").with("assign-tag", "MAYBE"),
            ModeScope::global("global", "EXECUTE"),
        ]);
        let err = config.resolve("assign-tag").unwrap_err();
        assert!(
            matches!(err, ReltagError::UnknownExecutionMode { ref scope, ref value } if scope == "operation" && value == "MAYBE")
        );
    }

    #[test]
    fn from_vars_builds_three_scopes() {
        let vars = [
            ("RELTAG_RUN_1234_ASSIGN_TAG_MODE", "simulate-pass"),
            ("RELTAG_RUN_9999_ASSIGN_TAG_MODE", "SKIP"),
            ("RELTAG_ASSIGN_TAG_MODE", "DRY_RUN"),
            ("RELTAG_DEPLOY_MODE", "SIMULATE_FAIL"),
            ("RELTAG_MODE", "EXECUTE"),
            ("PATH", "/usr/bin"),
        ];
        let config = ExecutionModeConfig::from_vars(vars, Some("1234"));
        assert_eq!(
            config.resolve("assign-tag").unwrap().mode,
            ExecutionMode::SimulatePass
        );
        assert_eq!(
            config.resolve("deploy").unwrap().mode,
            ExecutionMode::SimulateFail
        );
        assert_eq!(
            config.resolve("other").unwrap().scope.as_deref(),
            Some("global")
        );

        let without_run = ExecutionModeConfig::from_vars(vars, None);
        assert_eq!(
            without_run.resolve("assign-tag").unwrap().mode,
            ExecutionMode::DryRun
        );
    }

    #[test]
    fn operation_names_starting_with_run_keep_their_scope() {
        let vars = [
            ("RELTAG_RUN_MIGRATIONS_MODE", "SIMULATE_FAIL"),
            ("RELTAG_RUN_42_ASSIGN_TAG_MODE", "SKIP"),
        ];

        let config = ExecutionModeConfig::from_vars(vars, None);
        let resolved = config.resolve("run-migrations").unwrap();
        assert_eq!(resolved.mode, ExecutionMode::SimulateFail);
        assert_eq!(resolved.scope.as_deref(), Some("operation"));
        assert_eq!(
            config.resolve("assign-tag").unwrap().mode,
            ExecutionMode::Execute
        );

        let with_run = ExecutionModeConfig::from_vars(vars, Some("42"));
        assert_eq!(
            with_run.resolve("run-migrations").unwrap().mode,
            ExecutionMode::SimulateFail
        );
        assert_eq!(
            with_run.resolve("assign-tag").unwrap().scope.as_deref(),
            Some("run")
        );
    }

    #[test]
    fn env_token_normalizes() {
        assert_eq!(env_token("assign-tag"), "ASSIGN_TAG");
        assert_eq!(env_token("deploy.prod/eu"), "DEPLOY_PROD_EU");
    }
}
