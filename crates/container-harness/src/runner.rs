//! Agent container execution and event-stream capture.

use std::process::Stdio;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::HarnessConfig;
use crate::env::{EnvProvider, FORWARDED_API_KEYS, GATEWAY_TOKEN_ENV, GATEWAY_URL_ENV};
use crate::error::HarnessError;
use crate::tracker::ContainerTracker;
use crate::Result;

/// Longest accepted line of container output.
pub const MAX_EVENT_LINE: usize = 10 * 1024 * 1024;

/// Mount point of the agent configuration directory inside the container.
pub const CONFIG_MOUNT: &str = "/configs";

/// Command line and environment for one `engine run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

/// Runs the agent inside a container and collects its JSON events.
pub struct ContainerRunner {
    config: Arc<HarnessConfig>,
    env: Arc<dyn EnvProvider>,
    tracker: Arc<ContainerTracker>,
}

impl ContainerRunner {
    pub fn new(
        config: Arc<HarnessConfig>,
        env: Arc<dyn EnvProvider>,
        tracker: Arc<ContainerTracker>,
    ) -> Self {
        Self {
            config,
            env,
            tracker,
        }
    }

    pub fn tracker(&self) -> &Arc<ContainerTracker> {
        &self.tracker
    }

    /// Fresh container name.
    pub fn container_name() -> String {
        format!("agent-eval-{}", rand::random::<u32>())
    }

    /// Build the `run` arguments and the environment to set on the client.
    ///
    /// Forwarded variables are passed to the engine by name only, so their
    /// values never appear on the command line.
    pub fn invocation(&self, name: &str, image_id: &str, question: &str) -> Invocation {
        let mut args: Vec<String> = vec![
            "run".into(),
            "--name".into(),
            name.into(),
            "--privileged".into(),
            "--init".into(),
        ];
        if !self.config.keep_containers {
            args.push("--rm".into());
        }
        args.push("-i".into());
        args.push("-v".into());
        args.push(format!(
            "{}:{}:ro",
            self.config.agent_dir().display(),
            CONFIG_MOUNT
        ));

        let mut env = Vec::new();
        for key in FORWARDED_API_KEYS {
            if let Some(value) = self.env.get_non_empty(key) {
                args.push("-e".into());
                args.push((*key).to_string());
                env.push(((*key).to_string(), value));
            }
        }

        if let Some(gateway) = self.config.models_gateway.as_deref().filter(|g| !g.is_empty()) {
            args.push("-e".into());
            args.push(GATEWAY_URL_ENV.into());
            env.push((GATEWAY_URL_ENV.to_string(), gateway.to_string()));

            if let Some(token) = self.env.get_non_empty(GATEWAY_TOKEN_ENV) {
                args.push("-e".into());
                args.push(GATEWAY_TOKEN_ENV.into());
                env.push((GATEWAY_TOKEN_ENV.to_string(), token));
            }
        }

        args.push(image_id.into());
        args.push(format!("{}/{}", CONFIG_MOUNT, self.config.agent_file_name()));
        args.push(question.into());

        Invocation { args, env }
    }

    /// Run the agent on `question` and return every JSON event it printed.
    ///
    /// The container stays registered with the tracker until its client
    /// process has exited, including on cancellation.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        image_id: &str,
        question: &str,
    ) -> Result<Vec<Value>> {
        let name = Self::container_name();
        let invocation = self.invocation(&name, image_id, question);

        let mut child = Command::new(&self.config.engine)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HarnessError::Spawn {
                engine: self.config.engine.clone(),
                source,
            })?;
        let _registration = self.tracker.register(&name);
        debug!(container = %name, image = %image_id, "container started");

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut buf).await;
            }
            buf
        });

        let mut events = Vec::new();
        let interrupted = match child.stdout.take() {
            Some(stdout) => tokio::select! {
                _ = read_events(stdout, &mut events) => false,
                _ = cancel.cancelled() => true,
            },
            None => false,
        };
        if interrupted {
            return self.abort(&mut child, &name, events).await;
        }

        let status = tokio::select! {
            status = child.wait() => Some(status?),
            _ = cancel.cancelled() => None,
        };
        let Some(status) = status else {
            return self.abort(&mut child, &name, events).await;
        };

        let stderr = stderr_task.await.unwrap_or_default();
        let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
        if !status.success() {
            debug!(container = %name, status = %status, stderr = %stderr, "container exited with error");
        }

        if events.is_empty() {
            if !status.success() {
                return Err(HarnessError::ContainerFailed {
                    status: status.to_string(),
                    stderr,
                });
            }
            if !stderr.is_empty() {
                return Err(HarnessError::NoEventsWithStderr(stderr));
            }
            return Err(HarnessError::NoEvents);
        }

        debug!(container = %name, events = events.len(), "container finished");
        Ok(events)
    }

    /// Kill a cancelled container and wait for its client to exit.
    ///
    /// Events already received still make a successful run.
    async fn abort(&self, child: &mut Child, name: &str, events: Vec<Value>) -> Result<Vec<Value>> {
        debug!(container = %name, events = events.len(), "cancelling container");
        self.tracker.kill(name).await;
        let _ = child.start_kill();
        let _ = child.wait().await;
        if events.is_empty() {
            Err(HarnessError::Cancelled)
        } else {
            Ok(events)
        }
    }
}

/// Append every newline-delimited JSON object on `stdout` to `events`.
///
/// Blank lines and lines that are not JSON objects, including ones that
/// are not valid UTF-8, are skipped. A line longer than [`MAX_EVENT_LINE`]
/// ends the read; events before it are kept.
async fn read_events(stdout: ChildStdout, events: &mut Vec<Value>) {
    let codec = AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), MAX_EVENT_LINE);
    let mut lines = FramedRead::new(stdout, codec);

    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match serde_json::from_slice::<Value>(&line) {
                    Ok(event @ Value::Object(_)) => events.push(event),
                    Ok(_) => debug!(
                        line = %String::from_utf8_lossy(&line),
                        "ignoring non-object JSON line"
                    ),
                    Err(e) => debug!(
                        line = %String::from_utf8_lossy(&line),
                        error = %e,
                        "failed to parse JSON event"
                    ),
                }
            }
            Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                warn!(max = MAX_EVENT_LINE, "container output line too long, stopping read");
                break;
            }
            Err(AnyDelimiterCodecError::Io(e)) => {
                warn!(error = %e, "error reading container output");
                break;
            }
        }
    }
}
