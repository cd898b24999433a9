//! Evaluation run configuration.

use std::path::PathBuf;

use container_harness::{HarnessConfig, DEFAULT_BASE_IMAGE, DEFAULT_ENGINE};

/// Judge model used when none is given.
pub const DEFAULT_JUDGE_MODEL: &str = "anthropic/claude-sonnet-4-5";

/// Settings for one evaluation run.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalConfig {
    /// Agent configuration file run inside each container.
    pub agent_file: PathBuf,

    /// Directory of fixture files.
    pub evals_dir: PathBuf,

    /// Judge model as `provider/model`; empty disables relevance checks.
    pub judge_model: String,

    /// Number of evaluations run at once.
    pub concurrency: usize,

    /// Number of judge calls in flight at once, across all evaluations.
    pub judge_concurrency: usize,

    /// Only run fixtures whose file name contains one of these.
    pub only: Vec<String>,

    pub base_image: String,

    /// Leave containers behind for debugging.
    pub keep_containers: bool,

    /// Container engine executable.
    pub engine: String,

    pub models_gateway: Option<String>,

    /// Whether output goes to an interactive terminal.
    pub is_tty: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            agent_file: PathBuf::new(),
            evals_dir: PathBuf::from("evals"),
            judge_model: DEFAULT_JUDGE_MODEL.to_string(),
            concurrency: default_concurrency(),
            judge_concurrency: 1,
            only: Vec::new(),
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            keep_containers: false,
            engine: DEFAULT_ENGINE.to_string(),
            models_gateway: None,
            is_tty: false,
        }
    }
}

/// Number of CPUs available to this process, at least 1.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl EvalConfig {
    pub fn new(agent_file: impl Into<PathBuf>, evals_dir: impl Into<PathBuf>) -> Self {
        Self {
            agent_file: agent_file.into(),
            evals_dir: evals_dir.into(),
            ..Default::default()
        }
    }

    /// Container settings derived from this configuration.
    pub fn harness_config(&self) -> HarnessConfig {
        HarnessConfig {
            engine: self.engine.clone(),
            base_image: self.base_image.clone(),
            agent_file: self.agent_file.clone(),
            evals_dir: self.evals_dir.clone(),
            keep_containers: self.keep_containers,
            models_gateway: self.models_gateway.clone().filter(|g| !g.is_empty()),
        }
    }
}
