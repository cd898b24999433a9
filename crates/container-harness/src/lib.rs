//! Container-Harness: isolated agent execution for agent-eval
//!
//! This crate builds evaluation images, runs the agent inside a container
//! for each question and captures the JSON events it prints.
//!
//! ## Key Components
//!
//! - `ImageCache`: one image build per working directory
//! - `ContainerRunner`: `engine run`, env forwarding, event capture
//! - `ContainerTracker`: in-flight containers, killed on cancellation
//! - `AgentSandbox`: the seam the scheduler depends on

mod config;
mod env;
mod error;
mod image;
mod runner;
mod sandbox;
mod tracker;

pub use config::{HarnessConfig, DEFAULT_BASE_IMAGE, DEFAULT_ENGINE};
pub use env::{
    EnvProvider, MapEnv, ProcessEnv, FORWARDED_API_KEYS, GATEWAY_TOKEN_ENV, GATEWAY_URL_ENV,
};
pub use error::HarnessError;
pub use image::{image_tag, render_recipe, EngineImageBuilder, ImageBuilder, ImageCache};
pub use runner::{ContainerRunner, Invocation, CONFIG_MOUNT, MAX_EVENT_LINE};
pub use sandbox::{AgentSandbox, ContainerSandbox};
pub use tracker::{ContainerTracker, Registration, KILL_TIMEOUT};

/// Result type for container-harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;
