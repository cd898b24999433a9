//! The agent sandbox seam used by the evaluation scheduler.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::HarnessConfig;
use crate::env::EnvProvider;
use crate::image::{EngineImageBuilder, ImageCache};
use crate::runner::ContainerRunner;
use crate::tracker::ContainerTracker;
use crate::Result;

/// Isolated environment that can answer a question with the agent.
#[async_trait]
pub trait AgentSandbox: Send + Sync {
    /// Make the environment for `working_dir` available; returns its image id.
    async fn prepare(&self, cancel: &CancellationToken, working_dir: &str) -> Result<String>;

    /// Ask the agent `question` inside the prepared image.
    async fn run(
        &self,
        cancel: &CancellationToken,
        image_id: &str,
        question: &str,
    ) -> Result<Vec<Value>>;
}

/// Sandbox backed by a container engine.
pub struct ContainerSandbox {
    images: ImageCache,
    runner: ContainerRunner,
}

impl ContainerSandbox {
    pub fn new(config: HarnessConfig, env: Arc<dyn EnvProvider>) -> Self {
        let config = Arc::new(config);
        let tracker = Arc::new(ContainerTracker::new(config.engine.clone()));
        let builder = Arc::new(EngineImageBuilder::new(config.clone()));
        Self {
            images: ImageCache::new(builder),
            runner: ContainerRunner::new(config, env, tracker),
        }
    }

    /// Tracker of this sandbox's running containers.
    pub fn tracker(&self) -> Arc<ContainerTracker> {
        self.runner.tracker().clone()
    }
}

#[async_trait]
impl AgentSandbox for ContainerSandbox {
    async fn prepare(&self, cancel: &CancellationToken, working_dir: &str) -> Result<String> {
        self.images.get_or_build(cancel, working_dir).await
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        image_id: &str,
        question: &str,
    ) -> Result<Vec<Value>> {
        self.runner.run(cancel, image_id, question).await
    }
}
