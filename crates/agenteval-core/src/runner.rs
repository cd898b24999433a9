//! Scheduling evaluations across a bounded worker pool.
//!
//! Fixtures are loaded, sorted longest-first, their images pre-built, and
//! then `concurrency` workers pull fixtures from a shared queue. Each result
//! is written into the slot of its fixture, so the final order matches the
//! load order whatever order evaluations finish in.

use std::any::Any;
use std::collections::{BTreeSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use container_harness::{AgentSandbox, ContainerSandbox, ContainerTracker, EnvProvider};
use futures::FutureExt;
use llm_judge::{create_provider, request_model_name, Judge, ModelRef};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EvalConfig;
use crate::domain::{EvalResult, EvalRun, EvalSession};
use crate::error::EvalError;
use crate::events::decode_events;
use crate::pattern::matches_any_pattern;
use crate::progress::{Console, ProgressBar};
use crate::scoring::{classify_size, count_handoffs, expected_tool_calls, tool_call_f1_score};
use crate::summary::{compute_summary, print_summary};
use crate::transcript::{parse_container_events, session_from_events};
use crate::Result;

/// Load every fixture in `evals_dir`, longest recorded conversation first.
///
/// With non-empty `only`, files whose name matches none of the patterns are
/// skipped. Any unreadable or malformed fixture fails the whole load.
pub fn load_eval_sessions(evals_dir: &Path, only: &[String]) -> Result<Vec<EvalSession>> {
    let read_err = |path: &Path| {
        let path = path.display().to_string();
        move |source: std::io::Error| EvalError::ReadFixtures { path, source }
    };

    let mut entries = std::fs::read_dir(evals_dir)
        .map_err(read_err(evals_dir))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(read_err(evals_dir))?;
    entries.sort_by_key(|e| e.file_name());

    let mut evals = Vec::new();
    for entry in entries {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !only.is_empty() && !matches_any_pattern(&file_name, only) {
            continue;
        }

        let path = entry.path();
        if path.is_dir() || !file_name.ends_with(".json") {
            continue;
        }

        let data = std::fs::read(&path).map_err(read_err(&path))?;
        let mut fixture: EvalSession =
            serde_json::from_slice(&data).map_err(|source| EvalError::InvalidFixture {
                path: path.display().to_string(),
                source,
            })?;

        if fixture.title.is_empty() {
            fixture.title = file_name.trim_end_matches(".json").to_string();
        }
        fixture.source_path = path;
        evals.push(fixture);
    }

    evals.sort_by(|a, b| b.duration().cmp(&a.duration()));
    Ok(evals)
}

/// Build the judge described by `config`, or `None` when judging is off.
pub fn build_judge(config: &EvalConfig, env: &dyn EnvProvider) -> Result<Option<Judge>> {
    if config.judge_model.is_empty() {
        return Ok(None);
    }

    let model = ModelRef::parse(&config.judge_model)?;
    let gateway = config.models_gateway.as_deref();
    let provider = create_provider(&model, &|name| env.get(name), gateway)?;
    Ok(Some(Judge::new(
        provider,
        request_model_name(&model, gateway),
        config.judge_concurrency,
    )))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Result fields known before the agent runs.
fn initial_result(eval: &EvalSession) -> EvalResult {
    EvalResult {
        input_path: eval.source_path.display().to_string(),
        title: eval.title.clone(),
        question: eval.first_user_message(),
        size_expected: eval.evals.size.clone(),
        relevance_expected: eval.evals.relevance.len() as f64,
        tool_calls_expected: if expected_tool_calls(&eval.messages).is_empty() {
            0.0
        } else {
            1.0
        },
        ..Default::default()
    }
}

/// State shared by the evaluation workers.
struct Pool {
    sandbox: Arc<dyn AgentSandbox>,
    judge: Option<Arc<Judge>>,
    progress: ProgressBar,
    cancel: CancellationToken,
    queue: Mutex<VecDeque<(usize, EvalSession)>>,
    slots: Mutex<Vec<Option<EvalResult>>>,
}

impl Pool {
    async fn work(&self) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let next = self.queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
            let Some((index, eval)) = next else {
                return;
            };

            self.progress.set_running(&eval.title);

            let mut result = initial_result(&eval);
            let outcome = AssertUnwindSafe(self.run_single_eval(&eval, &mut result))
                .catch_unwind()
                .await;
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(payload) => Some(EvalError::Panicked(panic_message(payload.as_ref()))),
            };
            if let Some(e) = failure {
                error!(title = %eval.title, error = %e, "evaluation failed");
                result.error = Some(e.to_string());
            }

            let passed = result.passed();
            self.progress.complete(&eval.title, passed);
            self.progress.print_result(&result);
            self.slots.lock().unwrap_or_else(|e| e.into_inner())[index] = Some(result);
        }
    }

    async fn run_single_eval(&self, eval: &EvalSession, result: &mut EvalResult) -> Result<()> {
        let started = Instant::now();
        debug!(title = %eval.title, "starting evaluation");

        let expected = expected_tool_calls(&eval.messages);

        let image_id = self
            .sandbox
            .prepare(&self.cancel, &eval.evals.working_dir)
            .await
            .map_err(EvalError::BuildImage)?;

        let raw = self
            .sandbox
            .run(&self.cancel, &image_id, &result.question)
            .await
            .map_err(EvalError::RunAgent)?;

        let events = decode_events(&raw);
        let parsed = parse_container_events(&events);

        result.size = classify_size(&parsed.response).to_string();
        result.response = parsed.response;
        result.cost = parsed.cost;
        result.output_tokens = parsed.output_tokens;
        result.raw_output = raw;

        if !expected.is_empty() || !parsed.tool_calls.is_empty() {
            result.tool_calls_score = tool_call_f1_score(&expected, &parsed.tool_calls);
        }
        result.handoffs_match = count_handoffs(&expected) == count_handoffs(&parsed.tool_calls);

        if let Some(judge) = &self.judge {
            if !eval.evals.relevance.is_empty() {
                let outcome = judge
                    .check_relevance(&self.cancel, &result.response, &eval.evals.relevance)
                    .await;
                result.relevance_passed = outcome.passed as f64;
                result.failed_relevance = outcome.failed;
                for e in &outcome.errors {
                    warn!(title = %eval.title, error = %e, "relevance check error");
                }
            }
        }

        result.session = Some(session_from_events(&events, &eval.title, &result.question));

        debug!(title = %eval.title, duration = ?started.elapsed(), "evaluation complete");
        Ok(())
    }
}

/// Runs evaluations against an agent.
#[derive(Clone)]
pub struct Runner {
    config: EvalConfig,
    sandbox: Arc<dyn AgentSandbox>,
    judge: Option<Arc<Judge>>,
    console: Arc<Console>,
}

impl Runner {
    pub fn new(
        config: EvalConfig,
        sandbox: Arc<dyn AgentSandbox>,
        judge: Option<Judge>,
        console: Arc<Console>,
    ) -> Self {
        Self {
            config,
            sandbox,
            judge: judge.map(Arc::new),
            console,
        }
    }

    /// Runner backed by the configured container engine.
    ///
    /// Also returns the tracker of running containers, for cleanup on
    /// cancellation.
    pub fn with_containers(
        config: EvalConfig,
        env: Arc<dyn EnvProvider>,
        console: Arc<Console>,
    ) -> Result<(Self, Arc<ContainerTracker>)> {
        let judge = build_judge(&config, env.as_ref())?;
        let sandbox = ContainerSandbox::new(config.harness_config(), env);
        let tracker = sandbox.tracker();
        Ok((Self::new(config, Arc::new(sandbox), judge, console), tracker))
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    fn concurrency(&self) -> usize {
        self.config.concurrency.max(1)
    }

    /// Build the image of every distinct working directory once.
    pub async fn pre_build_images(
        &self,
        cancel: &CancellationToken,
        evals: &[EvalSession],
    ) -> Result<()> {
        let working_dirs: BTreeSet<&str> =
            evals.iter().map(|e| e.evals.working_dir.as_str()).collect();
        if working_dirs.is_empty() {
            return Ok(());
        }

        self.console
            .println(format!("Pre-building {} image(s)...", working_dirs.len()));

        let workers = self.concurrency().min(working_dirs.len());
        let queue = Mutex::new(working_dirs.into_iter().collect::<VecDeque<_>>());
        let failures = Mutex::new(Vec::new());

        {
            let queue = &queue;
            let failures = &failures;
            futures::future::join_all((0..workers).map(move |_| async move {
                loop {
                    let next = queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
                    let Some(working_dir) = next else {
                        break;
                    };
                    let outcome = if cancel.is_cancelled() {
                        Err(container_harness::HarnessError::Cancelled)
                    } else {
                        self.sandbox.prepare(cancel, working_dir).await
                    };
                    match outcome {
                        Ok(image_id) => debug!(working_dir, image_id = %image_id, "image ready"),
                        Err(e) => failures
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .push(format!("building image for {:?}: {}", working_dir, e)),
                    }
                }
            }))
            .await;
        }

        let failures = failures.into_inner().unwrap_or_else(|e| e.into_inner());
        match failures.first() {
            None => Ok(()),
            Some(first) => Err(EvalError::PreBuild {
                count: failures.len(),
                first: first.clone(),
            }),
        }
    }

    /// Run every fixture and return the results in load order.
    ///
    /// Fatal errors (fixtures that cannot be loaded, images that cannot be
    /// built) and cancellation are returned alongside whatever results were
    /// produced. Fixtures never started because of cancellation are reported
    /// as errored.
    pub async fn run(&self, cancel: &CancellationToken) -> (Vec<EvalResult>, Option<EvalError>) {
        self.console.println("Loading evaluation sessions...");
        let evals = match load_eval_sessions(&self.config.evals_dir, &self.config.only) {
            Ok(evals) => evals,
            Err(e) => return (Vec::new(), Some(e)),
        };

        if let Err(e) = self.pre_build_images(cancel, &evals).await {
            return (Vec::new(), Some(e));
        }

        self.console.println(format!(
            "Running {} evaluations with concurrency {}\n",
            evals.len(),
            self.concurrency()
        ));
        info!(count = evals.len(), concurrency = self.concurrency(), "running evaluations");

        let pending: Vec<EvalResult> = evals.iter().map(initial_result).collect();
        let pool = Arc::new(Pool {
            sandbox: self.sandbox.clone(),
            judge: self.judge.clone(),
            progress: ProgressBar::new(self.console.clone(), evals.len()),
            cancel: cancel.clone(),
            slots: Mutex::new(vec![None; evals.len()]),
            queue: Mutex::new(evals.into_iter().enumerate().collect()),
        });

        pool.progress.start();
        let workers: Vec<_> = (0..self.concurrency())
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.work().await })
            })
            .collect();
        for joined in futures::future::join_all(workers).await {
            if let Err(e) = joined {
                error!(error = %e, "evaluation worker stopped unexpectedly");
            }
        }
        pool.progress.stop().await;

        let slots = std::mem::take(&mut *pool.slots.lock().unwrap_or_else(|e| e.into_inner()));
        let results = slots
            .into_iter()
            .zip(pending)
            .map(|(slot, mut placeholder)| {
                slot.unwrap_or_else(|| {
                    placeholder.error = Some(EvalError::Cancelled.to_string());
                    placeholder
                })
            })
            .collect();

        let err = cancel.is_cancelled().then_some(EvalError::Cancelled);
        (results, err)
    }
}

/// Run all evaluations as run `run_name`, then print the summary.
///
/// The run is returned even when the runner reports an error, so partial
/// results can still be saved.
pub async fn evaluate(
    runner: &Runner,
    cancel: &CancellationToken,
    run_name: &str,
) -> (EvalRun, Option<EvalError>) {
    runner
        .console
        .println(format!("Evaluation run: {}", run_name));

    let timestamp = Utc::now();
    let started = Instant::now();
    let (results, err) = runner.run(cancel).await;
    let duration = started.elapsed();

    let summary = compute_summary(&results);
    if let Err(e) = runner
        .console
        .write_with(|out| print_summary(out, &summary, duration))
    {
        warn!(error = %e, "failed to print summary");
    }

    let run = EvalRun {
        name: run_name.to_string(),
        timestamp,
        duration,
        results,
        summary,
    };
    (run, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use container_harness::MapEnv;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_judge_disabled_by_empty_model() {
        let config = EvalConfig {
            judge_model: String::new(),
            ..Default::default()
        };
        assert!(build_judge(&config, &MapEnv::new()).unwrap().is_none());
    }

    #[test]
    fn test_judge_model_errors() {
        let config = EvalConfig {
            judge_model: "claude".to_string(),
            ..Default::default()
        };
        let err = build_judge(&config, &MapEnv::new()).err().unwrap();
        assert_eq!(
            err.to_string(),
            "creating judge model: invalid judge model format \"claude\": expected 'provider/model'"
        );

        let config = EvalConfig {
            judge_model: "anthropic/claude-sonnet-4-5".to_string(),
            ..Default::default()
        };
        let err = build_judge(&config, &MapEnv::new()).err().unwrap();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_judge_settings() {
        let config = EvalConfig {
            judge_model: "openai/gpt-4o-mini".to_string(),
            judge_concurrency: 3,
            ..Default::default()
        };
        let env = MapEnv::new().with("OPENAI_API_KEY", "sk-test");
        let judge = build_judge(&config, &env).unwrap().unwrap();
        assert_eq!(judge.model(), "gpt-4o-mini");
        assert_eq!(judge.concurrency(), 3);

        let config = EvalConfig {
            models_gateway: Some("http://gateway.local/v1".to_string()),
            ..config
        };
        let judge = build_judge(&config, &MapEnv::new()).unwrap().unwrap();
        assert_eq!(judge.model(), "openai/gpt-4o-mini");
    }
}
