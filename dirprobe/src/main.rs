//! dirprobe CLI Application
//!
//! A command-line interface for HTTP content discovery: probe a list of
//! candidate paths against a base URL with bounded concurrency and report
//! the status of each. This CLI is a thin layer over dirprobe-lib.

mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use dirprobe_lib::{
    load_env_config, load_wordlist, parse_timeout_string, ConfigManager, EnvConfig, FailureKind,
    FileConfig, Outcome, ProbeConfig, Prober, RunSummary, StatusFilter, MAX_POOL_SIZE,
};
use std::process;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// CLI arguments for dirprobe
#[derive(Parser, Debug)]
#[command(name = "dirprobe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Probe candidate paths on a web server with bounded concurrency")]
#[command(
    long_about = "Probe candidate paths on a web server with bounded concurrency.\n\nEach candidate is appended to the base URL and requested once with GET. Probes that do not finish within the timeout are aborted and reported as unknown."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// Base URL to probe (http or https)
    #[arg(value_name = "URL", help_heading = "Target")]
    pub url: String,

    /// Candidate paths to probe in addition to the wordlist
    #[arg(value_name = "CANDIDATES", help_heading = "Target")]
    pub candidates: Vec<String>,

    /// Wordlist file with one candidate per line
    #[arg(
        short = 'w',
        long = "wordlist",
        value_name = "FILE",
        help_heading = "Target"
    )]
    pub wordlist: Option<String>,

    /// Print the target URLs without probing them
    #[arg(long = "dry-run", help_heading = "Target")]
    pub dry_run: bool,

    /// Status codes to show, e.g. "200,301-308,4xx,unknown" (default: 200)
    #[arg(
        short = 's',
        long = "status",
        value_name = "FILTER",
        help_heading = "Filtering"
    )]
    pub status: Option<String>,

    /// Show every outcome regardless of status
    #[arg(short = 'a', long = "all", help_heading = "Filtering")]
    pub all: bool,

    /// Output results in JSON format
    #[arg(short = 'j', long = "json", help_heading = "Output Format")]
    pub json: bool,

    /// Output results in CSV format
    #[arg(long = "csv", help_heading = "Output Format")]
    pub csv: bool,

    /// Collect all results before displaying
    #[arg(long = "batch", help_heading = "Output Format")]
    pub batch: bool,

    /// Show results as they complete
    #[arg(long = "streaming", help_heading = "Output Format")]
    pub streaming: bool,

    /// Max probes in flight (default: number of CPUs)
    #[arg(
        short = 'c',
        long = "concurrency",
        value_name = "N",
        help_heading = "Performance"
    )]
    pub concurrency: Option<usize>,

    /// Per-probe timeout, e.g. "1500ms", "5s" (bare numbers are milliseconds, default: 6000)
    #[arg(
        short = 't',
        long = "timeout",
        value_name = "DURATION",
        help_heading = "Performance"
    )]
    pub timeout: Option<String>,

    /// User-Agent header sent with every probe
    #[arg(long = "user-agent", value_name = "UA", help_heading = "Protocol")]
    pub user_agent: Option<String>,

    /// Only speak HTTP/1.1
    #[arg(long = "http1-only", help_heading = "Protocol")]
    pub http1_only: bool,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<String>,

    /// Show detailed debug information and error messages
    #[arg(short = 'd', long = "debug", help_heading = "Configuration")]
    pub debug: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    Text,
    Json,
    Csv,
}

/// Effective settings after merging config files, environment and CLI.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) probe: ProbeConfig,
    pub(crate) filter: StatusFilter,
    pub(crate) format: OutputFormat,
    pub(crate) json_pretty: bool,
}

/// Failed probes grouped by failure kind, for the closing report.
#[derive(Debug, Default)]
pub(crate) struct ErrorStats {
    pub(crate) timeouts: Vec<String>,
    pub(crate) connect_errors: Vec<String>,
    pub(crate) redirect_errors: Vec<String>,
    pub(crate) invalid_targets: Vec<String>,
    pub(crate) request_errors: Vec<String>,
    pub(crate) aborted: Vec<String>,
}

impl ErrorStats {
    fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let mut stats = Self::default();
        for outcome in outcomes {
            stats.add(outcome);
        }
        stats
    }

    fn add(&mut self, outcome: &Outcome) {
        if !outcome.is_unknown() {
            return;
        }
        let uri = outcome.uri.clone();
        match outcome.failure {
            Some(FailureKind::Timeout) => self.timeouts.push(uri),
            Some(FailureKind::Connect) => self.connect_errors.push(uri),
            Some(FailureKind::Redirect) => self.redirect_errors.push(uri),
            Some(FailureKind::InvalidTarget) => self.invalid_targets.push(uri),
            Some(FailureKind::Aborted) => self.aborted.push(uri),
            Some(FailureKind::Request) | None => self.request_errors.push(uri),
        }
    }

    pub(crate) fn has_errors(&self) -> bool {
        self.groups().iter().any(|(_, uris)| !uris.is_empty())
    }

    /// Non-empty groups with their singular label.
    pub(crate) fn groups(&self) -> Vec<(&'static str, &[String])> {
        [
            ("timeout", self.timeouts.as_slice()),
            ("connection error", self.connect_errors.as_slice()),
            ("redirect error", self.redirect_errors.as_slice()),
            ("invalid target", self.invalid_targets.as_slice()),
            ("request error", self.request_errors.as_slice()),
            ("aborted probe", self.aborted.as_slice()),
        ]
        .into_iter()
        .filter(|(_, uris)| !uris.is_empty())
        .collect()
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    init_tracing(&args);
    tracing::debug!(
        "dirprobe v{} starting (dirprobe-lib v{})",
        env!("CARGO_PKG_VERSION"),
        dirprobe_lib::VERSION
    );

    if let Err(e) = run_probe(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the flags.
fn init_tracing(args: &Args) {
    let default_filter = if args.verbose || args.debug {
        "warn,dirprobe=debug,dirprobe_lib=debug"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

/// Validate command line arguments
fn validate_args(args: &Args) -> Result<(), String> {
    if args.batch && args.streaming {
        return Err("Cannot specify both --batch and --streaming modes".to_string());
    }

    if args.json && args.csv {
        return Err("Cannot specify multiple output formats (--json, --csv)".to_string());
    }

    if args.streaming && (args.json || args.csv) {
        return Err(
            "Cannot use --streaming with --json or --csv. Use --batch for structured output"
                .to_string(),
        );
    }

    if args.all && args.status.is_some() {
        return Err("Cannot combine --all with --status".to_string());
    }

    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 || concurrency > MAX_POOL_SIZE {
            return Err(format!(
                "Concurrency must be between 1 and {}",
                MAX_POOL_SIZE
            ));
        }
    }

    if let Some(timeout) = &args.timeout {
        if parse_timeout_string(timeout).is_none() {
            return Err(format!(
                "Invalid timeout '{}'. Use format like '1500ms', '5s', '1m'",
                timeout
            ));
        }
    }

    Ok(())
}

/// Main probing logic
async fn run_probe(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let env_config = load_env_config(args.verbose);
    let settings = build_settings(&args, &env_config)?;
    let candidates = get_candidates(&args, &env_config).await?;

    let prober = Prober::with_config(&args.url, settings.probe.clone())?;

    if args.dry_run {
        let targets: Vec<String> = candidates.iter().map(|c| prober.target_for(c)).collect();
        if settings.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&targets)?);
        } else {
            for target in &targets {
                println!("{}", target);
            }
        }
        eprintln!("{} targets would be probed", targets.len());
        return Ok(());
    }

    if args.verbose {
        ui::print_header(&prober, candidates.len(), &settings.filter);
    }

    if should_use_streaming(&args, settings.format, candidates.len()) {
        run_streaming_probe(&prober, candidates, &args, &settings).await
    } else {
        run_batch_probe(&prober, candidates, &args, &settings).await
    }
}

/// Determine whether to use streaming or batch mode
fn should_use_streaming(args: &Args, format: OutputFormat, candidate_count: usize) -> bool {
    // Structured output is always written in one piece
    if format != OutputFormat::Text {
        return false;
    }

    if args.batch {
        return false;
    }

    if args.streaming {
        return true;
    }

    candidate_count > 1
}

/// Run in streaming mode, printing matching outcomes as they complete
async fn run_streaming_probe(
    prober: &Prober,
    candidates: Vec<String>,
    args: &Args,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    use futures::StreamExt;

    let total = candidates.len();
    let mut outcomes = Vec::with_capacity(total);
    let mut summary = RunSummary::default();
    let start_time = Instant::now();

    let mut stream = prober.probe_stream(candidates);
    while let Some(item) = stream.next().await {
        let outcome = item?;
        summary.record(&outcome);

        if settings.filter.matches(&outcome) {
            let counter = (total > 1).then_some((summary.total, total));
            ui::print_outcome(&outcome, args.debug, counter);
        }
        outcomes.push(outcome);
    }

    let duration = start_time.elapsed();

    if total > 1 {
        println!();
        ui::print_summary(&summary, duration);
        let error_stats = ErrorStats::from_outcomes(&outcomes);
        if error_stats.has_errors() {
            println!();
            ui::print_error_summary(&error_stats, args.debug);
        }
    }

    Ok(())
}

/// Run in batch mode (collect all outcomes first)
async fn run_batch_probe(
    prober: &Prober,
    candidates: Vec<String>,
    args: &Args,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let is_structured = settings.format != OutputFormat::Text;

    // Spinner::start returns None if stderr isn't a TTY.
    let spinner = if !is_structured && candidates.len() > 1 {
        ui::Spinner::start(format!("Probing {} targets...", candidates.len()))
    } else {
        None
    };

    let start_time = Instant::now();
    let result = prober.run(candidates).await;
    let duration = start_time.elapsed();

    if let Some(s) = spinner {
        s.stop().await;
    }

    display_results(&result?, args, settings, duration)
}

/// Build settings with config file integration.
///
/// Precedence order (highest to lowest):
/// 1. CLI arguments
/// 2. Environment variables (DP_*)
/// 3. Config file (--config, DP_CONFIG, or discovered files)
/// 4. Built-in defaults
fn build_settings(
    args: &Args,
    env_config: &EnvConfig,
) -> Result<Settings, Box<dyn std::error::Error>> {
    let config_manager = ConfigManager::new(args.verbose);

    let explicit_path = args.config.as_ref().or(env_config.config.as_ref());
    let file_config = match explicit_path {
        Some(path) => {
            tracing::debug!("using config file {}", path);
            config_manager
                .load_file(path)
                .map_err(|e| format!("Failed to load config file '{}': {}", path, e))?
        }
        None => config_manager.discover_and_load().unwrap_or_else(|e| {
            tracing::warn!("config discovery failed: {}", e);
            FileConfig::default()
        }),
    };

    resolve_settings(args, &file_config, env_config)
}

/// Merge the three configuration layers into effective settings.
fn resolve_settings(
    args: &Args,
    file_config: &FileConfig,
    env_config: &EnvConfig,
) -> Result<Settings, Box<dyn std::error::Error>> {
    let defaults = file_config.defaults.clone().unwrap_or_default();
    let output = file_config.output.clone().unwrap_or_default();

    let mut probe = defaults.apply_to(ProbeConfig::default());
    probe = env_config.apply_to(probe);

    if let Some(concurrency) = args.concurrency {
        probe = probe.with_pool_size(concurrency);
    }
    if let Some(timeout) = &args.timeout {
        let timeout = parse_timeout_string(timeout)
            .ok_or_else(|| format!("Invalid timeout '{}'", timeout))?;
        probe = probe.with_timeout(timeout);
    }
    if let Some(user_agent) = &args.user_agent {
        probe = probe.with_user_agent(user_agent.clone());
    }
    // Flags can only turn this on; off comes from config or env
    if args.http1_only {
        probe = probe.with_http1_only(true);
    }
    probe.validate()?;

    let filter = if args.all {
        StatusFilter::all()
    } else {
        match args
            .status
            .as_ref()
            .or(env_config.status.as_ref())
            .or(defaults.status.as_ref())
        {
            Some(expr) => expr.parse::<StatusFilter>()?,
            None => StatusFilter::default(),
        }
    };

    if env_config.has_output_format_conflict() {
        tracing::warn!("both DP_JSON and DP_CSV are set, using JSON");
    }
    let format = if args.json {
        OutputFormat::Json
    } else if args.csv {
        OutputFormat::Csv
    } else if env_config.json == Some(true) {
        OutputFormat::Json
    } else if env_config.csv == Some(true) {
        OutputFormat::Csv
    } else {
        match output.format.as_deref() {
            Some("json") => OutputFormat::Json,
            Some("csv") => OutputFormat::Csv,
            _ => OutputFormat::Text,
        }
    };

    Ok(Settings {
        probe,
        filter,
        format,
        json_pretty: output.json_pretty.unwrap_or(true),
    })
}

/// Collect candidates from the command line and the wordlist (CLI or DP_WORDLIST).
async fn get_candidates(
    args: &Args,
    env_config: &EnvConfig,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut candidates = args.candidates.clone();

    if let Some(path) = args.wordlist.as_ref().or(env_config.wordlist.as_ref()) {
        let words = load_wordlist(path).await?;
        tracing::debug!("read {} candidates from {}", words.len(), path);
        candidates.extend(words);
    }

    if candidates.is_empty() {
        return Err(
            "No candidates to probe. Pass candidate paths or a wordlist with --wordlist".into(),
        );
    }

    Ok(candidates)
}

fn display_results(
    outcomes: &[Outcome],
    args: &Args,
    settings: &Settings,
    duration: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let shown = settings.filter.apply(outcomes);

    match settings.format {
        OutputFormat::Json => display_json_results(&shown, settings.json_pretty)?,
        OutputFormat::Csv => display_csv_results(&shown),
        OutputFormat::Text => display_text_results(outcomes, &shown, args, duration),
    }

    Ok(())
}

/// Display results in JSON format
fn display_json_results(
    outcomes: &[&Outcome],
    pretty: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = if pretty {
        serde_json::to_string_pretty(outcomes)?
    } else {
        serde_json::to_string(outcomes)?
    };
    println!("{}", json);
    Ok(())
}

/// Display results in CSV format
fn display_csv_results(outcomes: &[&Outcome]) {
    println!("uri,status,elapsed_ms,failure,error");

    for outcome in outcomes {
        let elapsed = outcome
            .elapsed
            .map(|d| d.as_millis().to_string())
            .unwrap_or_default();
        let failure = outcome.failure.map(|f| f.to_string()).unwrap_or_default();
        println!(
            "{},{},{},{},{}",
            csv_field(&outcome.uri),
            outcome.status,
            elapsed,
            csv_field(&failure),
            csv_field(outcome.error_message.as_deref().unwrap_or("")),
        );
    }
}

/// Quote a CSV field when it needs it.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Display results in human-readable text format
fn display_text_results(outcomes: &[Outcome], shown: &[&Outcome], args: &Args, duration: Duration) {
    for outcome in shown {
        ui::print_outcome(outcome, args.debug, None);
    }

    if outcomes.len() > 1 {
        println!();
        ui::print_summary(&RunSummary::from_outcomes(outcomes), duration);
        let error_stats = ErrorStats::from_outcomes(outcomes);
        if error_stats.has_errors() {
            println!();
            ui::print_error_summary(&error_stats, args.debug);
        }
    }
}
