//! Evaluation image builds and the per-working-directory image cache.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::Result;

/// Builds an image for a working directory and returns its id.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    async fn build(&self, cancel: &CancellationToken, working_dir: &str) -> Result<String>;
}

/// Render the build recipe for a working directory.
///
/// A named working directory is copied into the image and becomes the
/// container's working directory; otherwise the base image is used as is.
pub fn render_recipe(base_image: &str, working_dir: &str) -> String {
    let mut recipe = format!("FROM {}\n", base_image);
    if !working_dir.is_empty() {
        recipe.push_str("COPY . /work\n");
        recipe.push_str("WORKDIR /work\n");
    }
    recipe
}

/// Image tag derived from the recipe and working directory.
pub fn image_tag(recipe: &str, working_dir: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(recipe.as_bytes());
    hasher.update([0u8]);
    hasher.update(working_dir.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("agent-eval:{}", &digest[..12])
}

/// Builds images with the container engine's `build` command.
#[derive(Debug, Clone)]
pub struct EngineImageBuilder {
    config: Arc<HarnessConfig>,
}

impl EngineImageBuilder {
    pub fn new(config: Arc<HarnessConfig>) -> Self {
        Self { config }
    }

    async fn run_build(&self, recipe: &str, tag: &str, context: &std::path::Path) -> Result<String> {
        let mut child = Command::new(&self.config.engine)
            .arg("build")
            .args(["--quiet", "--tag", tag, "--file", "-"])
            .arg(context)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HarnessError::Spawn {
                engine: self.config.engine.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(recipe.as_bytes()).await {
                // The engine may exit before reading the recipe; its stderr says why.
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(HarnessError::BuildFailed { stderr });
        }

        let image_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(if image_id.is_empty() {
            tag.to_string()
        } else {
            image_id
        })
    }
}

#[async_trait]
impl ImageBuilder for EngineImageBuilder {
    async fn build(&self, cancel: &CancellationToken, working_dir: &str) -> Result<String> {
        let recipe = render_recipe(&self.config.base_image, working_dir);
        let tag = image_tag(&recipe, working_dir);

        // Held until the build finishes so an empty context stays on disk.
        let scratch;
        let context = if working_dir.is_empty() {
            scratch = tempfile::tempdir()?;
            scratch.path().to_path_buf()
        } else {
            let path = self.config.working_dir_path(working_dir);
            if !path.is_dir() {
                return Err(HarnessError::WorkingDirNotFound(path.display().to_string()));
            }
            path
        };

        info!(working_dir = %working_dir, tag = %tag, "building evaluation image");
        tokio::select! {
            result = self.run_build(&recipe, &tag, &context) => result,
            _ = cancel.cancelled() => Err(HarnessError::Cancelled),
        }
    }
}

/// Memoizes built images by working directory.
///
/// The lock is never held across a build. Two callers racing on the same
/// working directory may both build; the first stored id wins.
pub struct ImageCache {
    builder: Arc<dyn ImageBuilder>,
    images: Mutex<HashMap<String, String>>,
}

impl ImageCache {
    pub fn new(builder: Arc<dyn ImageBuilder>) -> Self {
        Self {
            builder,
            images: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, working_dir: &str) -> Option<String> {
        self.images
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(working_dir)
            .cloned()
    }

    pub async fn get_or_build(&self, cancel: &CancellationToken, working_dir: &str) -> Result<String> {
        if let Some(id) = self.cached(working_dir) {
            debug!(working_dir = %working_dir, image = %id, "image cache hit");
            return Ok(id);
        }

        let built = self.builder.build(cancel, working_dir).await?;

        let mut images = self.images.lock().unwrap_or_else(|e| e.into_inner());
        let id = images
            .entry(working_dir.to_string())
            .or_insert(built)
            .clone();
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.images.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
