//! Container harness configuration

use std::path::{Path, PathBuf};

/// Default container engine executable.
pub const DEFAULT_ENGINE: &str = "docker";

/// Default base image for evaluation images.
pub const DEFAULT_BASE_IMAGE: &str = "agent-eval/runtime:latest";

/// Settings shared by the image builder and the container runner.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Container engine executable (`docker`, `podman`, ...).
    pub engine: String,

    /// Image every evaluation image is built `FROM`.
    pub base_image: String,

    /// Agent configuration file, mounted into the container via its parent directory.
    pub agent_file: PathBuf,

    /// Fixture directory; custom build contexts live under `working_dirs/`.
    pub evals_dir: PathBuf,

    /// Leave containers behind for debugging instead of passing `--rm`.
    pub keep_containers: bool,

    /// Models gateway URL forwarded into containers.
    pub models_gateway: Option<String>,
}

impl HarnessConfig {
    pub fn new(agent_file: impl Into<PathBuf>, evals_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine: DEFAULT_ENGINE.to_string(),
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            agent_file: agent_file.into(),
            evals_dir: evals_dir.into(),
            keep_containers: false,
            models_gateway: None,
        }
    }

    /// Build context directory for a named working directory.
    pub fn working_dir_path(&self, working_dir: &str) -> PathBuf {
        self.evals_dir.join("working_dirs").join(working_dir)
    }

    /// Absolute directory holding the agent file (the `/configs` mount source).
    pub fn agent_dir(&self) -> PathBuf {
        let parent = self
            .agent_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf())
    }

    /// File name of the agent file as seen inside the container.
    pub fn agent_file_name(&self) -> String {
        self.agent_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_paths() {
        let dir = tempfile::tempdir().unwrap();
        let agent = dir.path().join("agent.yaml");
        std::fs::write(&agent, "agents: {}").unwrap();

        let cfg = HarnessConfig::new(&agent, dir.path().join("evals"));
        assert_eq!(cfg.agent_file_name(), "agent.yaml");
        assert_eq!(cfg.agent_dir(), std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_bare_agent_file_uses_current_dir() {
        let cfg = HarnessConfig::new("agent.yaml", "evals");
        assert_eq!(cfg.agent_file_name(), "agent.yaml");
        assert!(cfg.agent_dir().is_absolute() || cfg.agent_dir() == Path::new("."));
    }

    #[test]
    fn test_working_dir_path() {
        let cfg = HarnessConfig::new("agent.yaml", "/tmp/evals");
        assert_eq!(
            cfg.working_dir_path("repo"),
            PathBuf::from("/tmp/evals/working_dirs/repo")
        );
    }
}
