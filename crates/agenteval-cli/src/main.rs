//! Agent-Eval CLI
//!
//! The `agent-eval` command replays golden conversations against an agent
//! running in a container and reports how closely it behaved.
//!
//! ## Commands
//!
//! - `run`: evaluate an agent against every fixture in a directory
//! - `save-fixture`: turn a stored transcript into a new fixture

use std::fs::File;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use agenteval_core::{
    default_concurrency, evaluate, generate_run_name, init_tracing, save_fixture, save_run_json,
    save_run_sessions, save_run_sessions_json, Console, EvalConfig, Runner, DEFAULT_JUDGE_MODEL,
};
use container_harness::{ProcessEnv, DEFAULT_BASE_IMAGE, DEFAULT_ENGINE};
use transcript_store::{SessionStore, SqliteSessionStore};

#[derive(Parser)]
#[command(name = "agent-eval")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evaluate AI agents against recorded conversations", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every evaluation fixture against an agent
    Run(RunArgs),

    /// Save a stored transcript as a new evaluation fixture
    SaveFixture {
        /// Session database written by a previous run
        #[arg(long)]
        db: PathBuf,

        /// Title of the session to save
        #[arg(long)]
        title: String,

        /// Fixture file name (default: the session id)
        #[arg(long)]
        name: Option<String>,

        /// Directory to save the fixture in
        #[arg(long, default_value = "evals")]
        evals_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Agent configuration file
    agent_file: PathBuf,

    /// Directory of evaluation fixtures
    #[arg(default_value = "evals")]
    evals_dir: PathBuf,

    /// Number of evaluations to run at once (default: number of CPUs)
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Judge model as provider/model; empty disables relevance checks
    #[arg(long, default_value = DEFAULT_JUDGE_MODEL)]
    judge_model: String,

    /// Number of judge requests in flight at once
    #[arg(long, default_value = "1")]
    judge_concurrency: usize,

    /// Directory for run results (default: <evals-dir>/results)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only run fixtures whose file name contains this (repeatable)
    #[arg(long)]
    only: Vec<String>,

    /// Base image evaluation images are built from
    #[arg(long, default_value = DEFAULT_BASE_IMAGE)]
    base_image: String,

    /// Keep containers after each evaluation
    #[arg(long)]
    keep_containers: bool,

    /// Container engine executable
    #[arg(long, env = "AGENT_EVAL_ENGINE", default_value = DEFAULT_ENGINE)]
    engine: String,

    /// Models gateway URL used by the agent and the judge
    #[arg(long, env = "AGENT_MODELS_GATEWAY")]
    models_gateway: Option<String>,
}

impl RunArgs {
    fn output_dir(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.evals_dir.join("results"))
    }

    fn to_config(&self, is_tty: bool) -> EvalConfig {
        EvalConfig {
            agent_file: self.agent_file.clone(),
            evals_dir: self.evals_dir.clone(),
            judge_model: self.judge_model.clone(),
            concurrency: self.concurrency.unwrap_or_else(default_concurrency),
            judge_concurrency: self.judge_concurrency,
            only: self.only.clone(),
            base_image: self.base_image.clone(),
            keep_containers: self.keep_containers,
            engine: self.engine.clone(),
            models_gateway: self.models_gateway.clone(),
            is_tty,
        }
    }
}

/// Writes everything to two sinks; the second one's failures are ignored.
struct Tee<A, B> {
    primary: A,
    copy: B,
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.primary.write(buf)?;
        let _ = self.copy.write_all(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let _ = self.copy.flush();
        self.primary.flush()
    }
}

fn write_run_header(out: &mut dyn Write, run_name: &str, config: &EvalConfig) -> std::io::Result<()> {
    let judge = if config.judge_model.is_empty() {
        "(disabled)"
    } else {
        config.judge_model.as_str()
    };
    writeln!(out, "=== Evaluation run: {} ===", run_name)?;
    writeln!(out, "Started:     {}", Utc::now().to_rfc3339())?;
    writeln!(out, "Agent:       {}", config.agent_file.display())?;
    writeln!(out, "Evals dir:   {}", config.evals_dir.display())?;
    writeln!(out, "Judge model: {}", judge)?;
    writeln!(out, "Concurrency: {}", config.concurrency)?;
    writeln!(out)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console logging stays quiet so it does not fight the progress line;
    // the run log always gets debug output.
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };

    match cli.command {
        Commands::Run(args) => cmd_run(args, cli.json, level).await,
        Commands::SaveFixture {
            db,
            title,
            name,
            evals_dir,
        } => {
            init_tracing(cli.json, level, None);
            cmd_save_fixture(&db, &title, name.as_deref(), &evals_dir).await
        }
    }
}

async fn cmd_run(args: RunArgs, json: bool, level: Level) -> Result<()> {
    let is_tty = std::io::stdout().is_terminal();
    let config = args.to_config(is_tty);
    let output_dir = args.output_dir();
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;

    let run_name = generate_run_name();
    let log_path = output_dir.join(format!("{}.log", run_name));
    let mut log_file = File::create(&log_path)
        .with_context(|| format!("Failed to create log file {:?}", log_path))?;
    write_run_header(&mut log_file, &run_name, &config)?;

    init_tracing(json, level, Some(log_file.try_clone()?));
    info!(run = %run_name, agent = %config.agent_file.display(), "starting evaluation run");

    let out = Tee {
        primary: std::io::stdout(),
        copy: log_file,
    };
    let console = Arc::new(Console::new(
        Box::new(std::io::stdout()),
        Box::new(out),
        is_tty,
    ));

    let (runner, tracker) = Runner::with_containers(config, Arc::new(ProcessEnv), console)
        .context("Failed to set up the evaluation runner")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping containers");
                cancel.cancel();
                tracker.kill_all().await;
            }
        });
    }

    let (run, err) = evaluate(&runner, &cancel, &run_name).await;

    if !run.results.is_empty() {
        let results_path = save_run_json(&run, &output_dir).context("Failed to save run results")?;
        save_run_sessions_json(&run, &output_dir).context("Failed to save run transcripts")?;
        let db_path = save_run_sessions(&run, &output_dir)
            .await
            .context("Failed to save run sessions")?;

        println!();
        println!("Results:  {}", results_path.display());
        println!("Sessions: {}", db_path.display());
    }
    println!("Log:      {}", log_path.display());

    match err {
        Some(e) => Err(e).context("Evaluation run failed"),
        None => Ok(()),
    }
}

async fn cmd_save_fixture(
    db: &Path,
    title: &str,
    name: Option<&str>,
    evals_dir: &Path,
) -> Result<()> {
    let store = SqliteSessionStore::open(db)
        .with_context(|| format!("Failed to open session database {:?}", db))?;

    let sessions = store.list_sessions().await?;
    let Some(session) = sessions.into_iter().find(|s| s.title == title) else {
        bail!("No session titled {:?} in {:?}", title, db);
    };

    let path = save_fixture(session, evals_dir, name)?;
    println!("Saved fixture: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use transcript_store::{Message, Session};

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["agent-eval", "run", "agent.yaml"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };

        assert_eq!(args.evals_dir, PathBuf::from("evals"));
        assert_eq!(args.output_dir(), PathBuf::from("evals").join("results"));
        assert_eq!(args.judge_model, DEFAULT_JUDGE_MODEL);
        assert_eq!(args.judge_concurrency, 1);
        assert!(args.only.is_empty());

        let config = args.to_config(false);
        assert!(config.concurrency >= 1);
        assert_eq!(config.base_image, DEFAULT_BASE_IMAGE);
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from([
            "agent-eval",
            "--verbose",
            "run",
            "agent.yaml",
            "my-evals",
            "-c",
            "3",
            "--judge-model",
            "",
            "--only",
            "weather",
            "--only",
            "stocks",
            "--keep-containers",
            "--engine",
            "podman",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };

        let config = args.to_config(true);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.judge_model, "");
        assert_eq!(config.only, vec!["weather".to_string(), "stocks".to_string()]);
        assert!(config.keep_containers);
        assert_eq!(config.engine, "podman");
        assert!(config.is_tty);
        assert_eq!(args.output_dir(), PathBuf::from("my-evals/results"));
    }

    #[test]
    fn test_tee_copies_output() {
        let mut tee = Tee {
            primary: Vec::new(),
            copy: Vec::new(),
        };
        write!(tee, "hello").unwrap();
        tee.flush().unwrap();
        assert_eq!(tee.primary, b"hello");
        assert_eq!(tee.copy, b"hello");
    }

    #[test]
    fn test_run_header() {
        let config = EvalConfig {
            judge_model: String::new(),
            concurrency: 4,
            ..EvalConfig::new("agent.yaml", "evals")
        };
        let mut out = Vec::new();
        write_run_header(&mut out, "calm-heron-007", &config).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("=== Evaluation run: calm-heron-007 ===\n"));
        assert!(text.contains("Agent:       agent.yaml\n"));
        assert!(text.contains("Judge model: (disabled)\n"));
        assert!(text.contains("Concurrency: 4\n"));
    }

    #[tokio::test]
    async fn test_save_fixture_from_run_db() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("run.db");
        {
            let store = SqliteSessionStore::open(&db).unwrap();
            let mut session = Session::new("weather");
            session.add_message(Message::user("Is it raining?"));
            store.add_session(&session).await.unwrap();
        }

        let evals_dir = dir.path().join("evals");
        cmd_save_fixture(&db, "weather", Some("rain"), &evals_dir)
            .await
            .unwrap();

        let saved = std::fs::read_to_string(evals_dir.join("rain.json")).unwrap();
        assert!(saved.contains("Is it raining?"));
        assert!(saved.contains("\"evals\""));

        let err = cmd_save_fixture(&db, "missing", None, &evals_dir)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No session titled \"missing\""));
    }
}
