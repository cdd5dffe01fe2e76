//! Terminal display logic for the dirprobe CLI.
//!
//! Colored outcome lines, spinner animation, progress counters, headers,
//! and summaries. Uses only the `console` crate.

use console::{pad_str, style, Alignment, StyledObject, Term};
use dirprobe_lib::{FailureKind, Outcome, ProbeStatus, Prober, RunSummary, StatusFilter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::ErrorStats;

// ── Spinner ──────────────────────────────────────────────────────────────────

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// An async braille-dot spinner that writes to stderr so stdout stays clean.
pub struct Spinner {
    running: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl Spinner {
    /// Start a spinner with the given message, or `None` when stderr is not
    /// a terminal.
    pub fn start(message: String) -> Option<Self> {
        let term = Term::stderr();
        if !term.is_term() {
            return None;
        }

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let handle = tokio::spawn(async move {
            let mut idx = 0usize;
            while running_clone.load(Ordering::Relaxed) {
                let frame = SPINNER_FRAMES[idx % SPINNER_FRAMES.len()];
                let _ = term.clear_line();
                let _ = term.write_str(&format!("{} {}", style(frame).cyan(), message));
                idx += 1;
                tokio::time::sleep(Duration::from_millis(80)).await;
            }
            let _ = term.clear_line();
        });

        Some(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the spinner and clear the line.
    pub async fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.await;
        }
    }
}

// ── Header ───────────────────────────────────────────────────────────────────

/// Print a styled header describing the run.
pub fn print_header(prober: &Prober, target_count: usize, filter: &StatusFilter) {
    let config = prober.config();
    println!(
        "{} {} {}",
        style("dirprobe").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!(
            "probing {} target{} under {}",
            target_count,
            if target_count == 1 { "" } else { "s" },
            prober.base_url()
        ))
        .dim(),
    );

    let meta_parts = [
        format!("Concurrency: {}", config.pool_size),
        format!("Timeout: {}ms", config.timeout.as_millis()),
        format!("Status: {}", filter),
    ];
    println!("{}", style(meta_parts.join(" | ")).dim());
    println!();
}

// ── Single outcome line ──────────────────────────────────────────────────────

/// Format and print a single outcome with colors and alignment.
///
/// If `counter` is Some((current, total)), a progress prefix like `[3/8]` is shown.
pub fn print_outcome(outcome: &Outcome, debug: bool, counter: Option<(usize, usize)>) {
    let prefix = match counter {
        Some((cur, total)) => {
            format!("{} ", style(format!("[{}/{}]", cur, total)).dim())
        }
        None => String::new(),
    };

    let status = pad_str(&outcome.status.to_string(), 7, Alignment::Left, None).into_owned();
    let reason = if outcome.is_unknown() {
        format!("  {}", style(brief_error(outcome)).dim())
    } else {
        String::new()
    };

    println!(
        "  {}{}  {}{}",
        prefix,
        status_style(outcome.status, status),
        style(&outcome.uri).white(),
        reason,
    );

    if debug {
        if let Some(elapsed) = outcome.elapsed {
            println!(
                "    {} Finished in {}ms",
                style("└─").dim(),
                elapsed.as_millis(),
            );
        }
        if let Some(message) = &outcome.error_message {
            println!("    {} {}", style("└─").dim(), style(message).dim());
        }
    }
}

fn status_style(status: ProbeStatus, text: String) -> StyledObject<String> {
    match status.code() {
        Some(200..=299) => style(text).green().bold(),
        Some(300..=399) => style(text).cyan(),
        Some(400..=499) => style(text).yellow(),
        Some(_) => style(text).red(),
        None => style(text).magenta().dim(),
    }
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Print the final summary bar with colored counts.
pub fn print_summary(summary: &RunSummary, duration: Duration) {
    println!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    );
    println!(
        "  {} target{} in {:.1}s  {}  {}  {}  {}  {}  {}  {}  {}  {}  {}",
        style(summary.total).bold(),
        if summary.total == 1 { "" } else { "s" },
        duration.as_secs_f64(),
        style("|").dim(),
        style(format!("{} 2xx", summary.success)).green(),
        style("|").dim(),
        style(format!("{} 3xx", summary.redirect)).cyan(),
        style("|").dim(),
        style(format!("{} 4xx", summary.client_error)).yellow(),
        style("|").dim(),
        style(format!("{} 5xx", summary.server_error)).red(),
        style("|").dim(),
        style(format!("{} unknown", summary.unknown)).magenta(),
    );
}

// ── Error summary ────────────────────────────────────────────────────────────

/// Print failed probes grouped by failure kind.
pub fn print_error_summary(error_stats: &ErrorStats, debug: bool) {
    if !error_stats.has_errors() {
        return;
    }

    println!("  {}", style("Some targets could not be probed:").yellow());

    // Debug mode lists every URI
    let max_show = if debug { usize::MAX } else { 5 };
    for (label, uris) in error_stats.groups() {
        println!(
            "  {} {} {}{}: {}",
            style("•").dim(),
            uris.len(),
            label,
            if uris.len() == 1 { "" } else { "s" },
            format_list(uris, max_show),
        );
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn format_list(items: &[String], max_show: usize) -> String {
    if items.len() <= max_show {
        items.join(", ")
    } else {
        let shown = &items[..max_show];
        let remaining = items.len() - max_show;
        format!("{}, ... and {} more", shown.join(", "), remaining)
    }
}

/// Brief reason for an outcome with unknown status.
fn brief_error(outcome: &Outcome) -> &'static str {
    match outcome.failure {
        Some(FailureKind::Timeout) => "(timeout)",
        Some(FailureKind::Connect) => "(connection failed)",
        Some(FailureKind::Redirect) => "(redirect error)",
        Some(FailureKind::InvalidTarget) => "(invalid target)",
        Some(FailureKind::Request) => "(request failed)",
        Some(FailureKind::Aborted) => "(aborted)",
        None => "(unknown status)",
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
