//! Error taxonomy for evaluation runs.

use container_harness::HarnessError;
use llm_judge::JudgeError;
use transcript_store::StoreError;

/// Errors produced while loading, running or saving evaluations.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// The fixture directory or a fixture file could not be read
    #[error("loading evaluations: reading {path}: {source}")]
    ReadFixtures {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A fixture file is not a valid evaluation session
    #[error("loading evaluations: invalid fixture {path}: {source}")]
    InvalidFixture {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// At least one image could not be built before scheduling
    #[error("pre-building images: failed to build {count} image(s): {first}")]
    PreBuild { count: usize, first: String },

    #[error("building eval image: {0}")]
    BuildImage(#[source] HarnessError),

    #[error("running agent in container: {0}")]
    RunAgent(#[source] HarnessError),

    /// An evaluation task panicked; siblings keep running
    #[error("evaluation panicked: {0}")]
    Panicked(String),

    #[error("running evaluations: context cancelled")]
    Cancelled,

    #[error("creating judge model: {0}")]
    Judge(#[from] JudgeError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_evaluation_errors_name_the_stage() {
        let err = EvalError::BuildImage(HarnessError::BuildFailed {
            stderr: "no space left".to_string(),
        });
        assert_eq!(err.to_string(), "building eval image: image build failed: no space left");

        let err = EvalError::RunAgent(HarnessError::NoEvents);
        assert_eq!(
            err.to_string(),
            "running agent in container: no events received from container"
        );
    }

    #[test]
    fn test_pre_build_error_reports_count() {
        let err = EvalError::PreBuild {
            count: 2,
            first: "building image for \"db\": image build failed: boom".to_string(),
        };
        assert!(err.to_string().starts_with("pre-building images: failed to build 2 image(s)"));
    }
}
