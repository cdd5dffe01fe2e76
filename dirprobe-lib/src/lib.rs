//! # dirprobe library
//!
//! Bounded-concurrency HTTP content discovery: probe a list of candidate
//! paths against a base URL and report one status per candidate.
//!
//! Probes run on a fixed-size worker pool. A completion loop harvests
//! finished probes as soon as they report and evicts those that exceed
//! their deadline, so a stalled server costs one timeout per candidate and
//! never holds up the rest of the run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dirprobe_lib::{Prober, ProbeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let prober = Prober::with_config(
//!         "https://example.com/",
//!         ProbeConfig::default().with_timeout_ms(2000),
//!     )?;
//!
//!     for outcome in prober.run(vec!["admin", "robots.txt"]).await? {
//!         println!("{} {}", outcome.status, outcome.uri);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Bounded concurrency**: never more probes in flight than the pool size
//! - **Per-probe deadlines**: timed-out probes are aborted and reported as `unknown`
//! - **Streaming**: outcomes can be consumed while the run is in progress
//! - **Configurable**: TOML config files and `DP_*` environment variables

// Re-export main public API types and functions
pub use aggregator::ResultSet;
pub use config::{
    load_env_config, parse_timeout_string, ConfigManager, DefaultsConfig, EnvConfig, FileConfig,
    OutputConfig,
};
pub use dispatcher::{Dispatcher, WorkerPool};
pub use error::ProbeError;
pub use filter::StatusFilter;
pub use probe::HttpProbe;
pub use prober::Prober;
pub use reaper::{ReapStats, Reaper};
pub use task::{TaskContext, TaskHandle, TaskId, TaskPhase, TaskState};
pub use types::{
    FailureKind, Outcome, ProbeConfig, ProbeStatus, RunSummary, DEFAULT_TIMEOUT,
    MAX_POOL_SIZE, MAX_TIMEOUT,
};
pub use utils::{load_wordlist, parse_base_url, parse_wordlist, resolve_target};

pub use reqwest::Url;

// Internal modules - their public items are re-exported above
mod aggregator;
mod config;
mod dispatcher;
mod error;
mod filter;
mod probe;
mod prober;
mod reaper;
mod task;
mod types;
mod utils;

pub type Result<T> = std::result::Result<T, ProbeError>;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
