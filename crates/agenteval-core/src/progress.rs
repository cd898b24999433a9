//! Live progress line and per-result reporting.
//!
//! All terminal output of a run goes through one [`Console`], whose lock
//! serializes the ticker's redraws with result printing so lines never
//! interleave.

use std::fmt::Display;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::EvalResult;

const TICK: Duration = Duration::from_millis(100);
const DEFAULT_WIDTH: usize = 80;
const MIN_BAR: usize = 10;
const MAX_BAR: usize = 50;
const RESERVED: usize = 60;

const CLEAR_LINE: &str = "\r\x1b[K";

struct Outputs {
    /// Where the live status line is drawn.
    tty: Box<dyn Write + Send>,
    /// Where results and messages go; may also feed a log file.
    out: Box<dyn Write + Send>,
}

/// Shared, locked pair of output streams.
pub struct Console {
    outputs: Mutex<Outputs>,
    is_tty: bool,
}

impl Console {
    pub fn new(tty: Box<dyn Write + Send>, out: Box<dyn Write + Send>, is_tty: bool) -> Self {
        Self {
            outputs: Mutex::new(Outputs { tty, out }),
            is_tty,
        }
    }

    /// Both streams on stdout.
    pub fn stdout(is_tty: bool) -> Self {
        Self::new(Box::new(io::stdout()), Box::new(io::stdout()), is_tty)
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    fn lock(&self) -> MutexGuard<'_, Outputs> {
        self.outputs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write one line to the result stream.
    pub fn println(&self, line: impl Display) {
        let mut outputs = self.lock();
        let _ = writeln!(outputs.out, "{}", line);
        let _ = outputs.out.flush();
    }

    /// Write to the result stream under the console lock.
    pub fn write_with(&self, f: impl FnOnce(&mut dyn Write) -> io::Result<()>) -> io::Result<()> {
        let mut outputs = self.lock();
        f(&mut *outputs.out)?;
        outputs.out.flush()
    }

    fn green(&self, s: &str) -> String {
        paint(s, "32", self.is_tty)
    }

    fn red(&self, s: &str) -> String {
        paint(s, "31", self.is_tty)
    }

    fn terminal_width(&self) -> usize {
        if !self.is_tty {
            return DEFAULT_WIDTH;
        }
        match crossterm::terminal::size() {
            Ok((cols, _)) if cols > 0 => cols as usize,
            _ => DEFAULT_WIDTH,
        }
    }
}

fn paint(s: &str, code: &str, colour: bool) -> String {
    if colour {
        format!("\x1b[{}m{}\x1b[0m", code, s)
    } else {
        s.to_string()
    }
}

/// Counters shared between the workers and the ticker.
#[derive(Default)]
struct Counters {
    completed: AtomicUsize,
    passed: AtomicUsize,
    failed: AtomicUsize,
    running: Mutex<Vec<String>>,
}

struct Shared {
    console: Arc<Console>,
    total: usize,
    counters: Counters,
}

/// Snapshot of progress used to draw one status line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressState {
    pub total: usize,
    pub completed: usize,
    pub passed: usize,
    pub failed: usize,
    pub running: Vec<String>,
}

/// Draw the status line for `state` in a terminal `width` columns wide.
pub fn render_status(state: &ProgressState, width: usize, colour: bool) -> String {
    let bar_width = width.saturating_sub(RESERVED).clamp(MIN_BAR, MAX_BAR);
    let (filled, percent) = if state.total > 0 {
        (
            (state.completed * bar_width / state.total).min(bar_width),
            state.completed * 100 / state.total,
        )
    } else {
        (0, 0)
    };

    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(bar_width - filled));
    let counts = format!(
        "{} {}",
        paint(&format!("✓{}", state.passed), "32", colour),
        paint(&format!("✗{}", state.failed), "31", colour)
    );
    let mut status = format!(
        "[{}] {:>3}% ({}/{}) {}",
        bar, percent, state.completed, state.total, counts
    );

    if let Some(first) = state.running.first() {
        let available = width
            .saturating_sub(status.chars().count())
            .saturating_sub(10)
            .max(5);
        let name = if first.chars().count() > available {
            let kept: String = first.chars().take(available - 1).collect();
            format!("{}…", kept)
        } else {
            first.clone()
        };

        if state.running.len() == 1 {
            status.push_str(&format!(" | {}", name));
        } else {
            status.push_str(&format!(" | {} +{} more", name, state.running.len() - 1));
        }
    }

    status
}

impl Shared {
    fn state(&self) -> ProgressState {
        ProgressState {
            total: self.total,
            completed: self.counters.completed.load(Ordering::SeqCst),
            passed: self.counters.passed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            running: self
                .counters
                .running
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }

    fn render(&self, last: bool) {
        let console = &self.console;
        let status = render_status(&self.state(), console.terminal_width(), console.is_tty);

        let mut outputs = console.lock();
        if console.is_tty {
            let _ = write!(outputs.tty, "{}{}", CLEAR_LINE, status);
            if last {
                let _ = writeln!(outputs.tty);
            }
            let _ = outputs.tty.flush();
        } else if last {
            let _ = writeln!(outputs.tty, "{}", status);
            let _ = outputs.tty.flush();
        }
    }
}

/// Live progress display for an evaluation run.
///
/// Redraws every 100 ms on a terminal; elsewhere only the final status
/// line is printed, by [`stop`](Self::stop).
pub struct ProgressBar {
    shared: Arc<Shared>,
    done: CancellationToken,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl ProgressBar {
    pub fn new(console: Arc<Console>, total: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                console,
                total,
                counters: Counters::default(),
            }),
            done: CancellationToken::new(),
            ticker: Mutex::new(None),
        }
    }

    /// Start the ticker task.
    pub fn start(&self) {
        let shared = self.shared.clone();
        let done = self.done.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK);
            loop {
                tokio::select! {
                    _ = done.cancelled() => {
                        shared.render(true);
                        return;
                    }
                    _ = interval.tick() => shared.render(false),
                }
            }
        });
        *self.ticker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Stop the ticker, drawing the final line, and wait for it to finish.
    pub async fn stop(&self) {
        self.done.cancel();
        let handle = self.ticker.lock().unwrap_or_else(|e| e.into_inner()).take();
        match handle {
            Some(handle) => {
                let _ = handle.await;
            }
            None => self.shared.render(true),
        }
    }

    pub fn set_running(&self, title: &str) {
        self.shared
            .counters
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(title.to_string());
    }

    pub fn complete(&self, title: &str, success: bool) {
        let counters = &self.shared.counters;
        {
            let mut running = counters.running.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(pos) = running.iter().position(|t| t == title) {
                running.remove(pos);
            }
        }
        counters.completed.fetch_add(1, Ordering::SeqCst);
        if success {
            counters.passed.fetch_add(1, Ordering::SeqCst);
        } else {
            counters.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn state(&self) -> ProgressState {
        self.shared.state()
    }

    /// Print one result with its successes and failures.
    pub fn print_result(&self, result: &EvalResult) {
        let console = &self.shared.console;
        let (successes, failures) = result.check_results();
        let icon = if failures.is_empty() {
            console.green("✓")
        } else {
            console.red("✗")
        };

        let mut outputs = console.lock();
        if console.is_tty {
            let _ = write!(outputs.tty, "{}", CLEAR_LINE);
            let _ = outputs.tty.flush();
        }
        let out = &mut outputs.out;
        let _ = writeln!(out, "{} {} (${:.6})", icon, result.title, result.cost);
        for s in &successes {
            let _ = writeln!(out, "  {} {}", console.green("✓"), s);
        }
        for f in &failures {
            let _ = writeln!(out, "  {} {}", console.red("✗"), f);
        }
        let _ = out.flush();
    }
}
