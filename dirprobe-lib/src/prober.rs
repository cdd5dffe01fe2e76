//! Main prober implementation.
//!
//! `Prober` ties the pieces together: a [`Dispatcher`] feeding a
//! [`Reaper`] through a channel, both running concurrently inside the
//! caller's task, with every outcome landing in a [`ResultSet`].

use crate::aggregator::ResultSet;
use crate::dispatcher::{Dispatcher, WorkerPool};
use crate::error::ProbeError;
use crate::probe::HttpProbe;
use crate::reaper::Reaper;
use crate::types::{Outcome, ProbeConfig};
use crate::utils::{parse_base_url, resolve_target};
use futures::stream::{self, Stream};
use reqwest::Url;
use std::pin::Pin;
use tokio::sync::mpsc;

/// Bounded-concurrency HTTP prober for one base URL.
///
/// Cloning is cheap; clones share the HTTP client and the worker pool, so
/// concurrent runs on clones together stay within one pool size.
///
/// # Example
///
/// ```rust,no_run
/// use dirprobe_lib::{Prober, ProbeConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ProbeConfig::default().with_pool_size(16).with_timeout_ms(2000);
///     let prober = Prober::with_config("https://example.com/", config)?;
///
///     let outcomes = prober.run(vec!["admin", "login", "backup"]).await?;
///     for outcome in outcomes {
///         println!("{} {}", outcome.status, outcome.uri);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Prober {
    /// Configuration settings for this prober instance
    config: ProbeConfig,
    /// Normalized base URL every candidate is appended to
    base: Url,
    /// Shared HTTP client
    probe: HttpProbe,
    /// Execution slots shared by all runs on this prober
    pool: WorkerPool,
}

impl Prober {
    /// Create a prober with default configuration.
    ///
    /// Default settings:
    /// - Pool size: number of logical CPUs
    /// - Timeout: 6000 ms per task
    pub fn new(base_url: &str) -> Result<Self, ProbeError> {
        Self::with_config(base_url, ProbeConfig::default())
    }

    /// Create a prober with custom configuration.
    ///
    /// # Errors
    ///
    /// Fails if the base URL is not an absolute http(s) URL, the
    /// configuration is invalid, or the HTTP client cannot be built.
    pub fn with_config(base_url: &str, config: ProbeConfig) -> Result<Self, ProbeError> {
        config.validate()?;
        let base = parse_base_url(base_url)?;
        let probe = HttpProbe::with_config(&config)?;
        let pool = WorkerPool::new(config.pool_size);

        Ok(Self {
            config,
            base,
            probe,
            pool,
        })
    }

    /// Probe every candidate and return one outcome per candidate.
    ///
    /// Outcomes are in completion order, not input order.
    ///
    /// # Errors
    ///
    /// Only run-level failures are errors (for example the pool was shut
    /// down). Unreachable targets and timeouts are outcomes.
    pub async fn run<I, S>(&self, candidates: I) -> Result<Vec<Outcome>, ProbeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run_into(candidates, ResultSet::new()).await
    }

    /// Like [`Prober::run`], also sending each outcome to `observer` as soon
    /// as it is known.
    pub async fn run_with_observer<I, S>(
        &self,
        candidates: I,
        observer: mpsc::UnboundedSender<Outcome>,
    ) -> Result<Vec<Outcome>, ProbeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run_into(candidates, ResultSet::with_observer(observer))
            .await
    }

    /// Probe candidates and yield outcomes as they complete.
    ///
    /// The run happens on a spawned task. A run-level failure is yielded as
    /// the last item.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use dirprobe_lib::Prober;
    /// use futures::StreamExt;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let prober = Prober::new("https://example.com/")?;
    ///     let candidates = vec!["admin".to_string(), "login".to_string()];
    ///
    ///     let mut stream = prober.probe_stream(candidates);
    ///     while let Some(item) = stream.next().await {
    ///         match item {
    ///             Ok(outcome) => println!("{} {}", outcome.status, outcome.uri),
    ///             Err(e) => eprintln!("run failed: {}", e),
    ///         }
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub fn probe_stream(
        &self,
        candidates: Vec<String>,
    ) -> Pin<Box<dyn Stream<Item = Result<Outcome, ProbeError>> + Send>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let prober = self.clone();
        let run = tokio::spawn(async move { prober.run_with_observer(candidates, tx).await });

        let stream = stream::unfold(Some((rx, run)), |state| async move {
            let (mut rx, run) = state?;
            if let Some(outcome) = rx.recv().await {
                return Some((Ok(outcome), Some((rx, run))));
            }
            // Observer closed: the run is over, surface its error if any.
            match run.await {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some((Err(e), None)),
                Err(join_error) => Some((
                    Err(ProbeError::internal(format!(
                        "probe run panicked: {}",
                        join_error
                    ))),
                    None,
                )),
            }
        });

        Box::pin(stream)
    }

    /// Probe a single candidate without going through the pool.
    ///
    /// No deadline is applied beyond the client's own request timeout.
    pub async fn probe_one(&self, candidate: &str) -> Outcome {
        self.probe.get(&self.target_for(candidate)).await
    }

    /// Target URI a candidate resolves to.
    pub fn target_for(&self, candidate: &str) -> String {
        resolve_target(&self.base, candidate)
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Probes currently executing across all runs on this prober.
    ///
    /// Evicted probes are aborted asynchronously, so right after a run
    /// with timeouts this can briefly report slots that are about to be
    /// released. Their sockets may likewise outlive the timeout outcome.
    pub fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    /// Close the worker pool. Runs in progress fail at their next
    /// submission and later runs fail immediately.
    pub fn shutdown(&self) {
        self.pool.close();
    }

    async fn run_into<I, S>(
        &self,
        candidates: I,
        results: ResultSet,
    ) -> Result<Vec<Outcome>, ProbeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.pool.is_closed() {
            return Err(ProbeError::pool_closed("prober was shut down"));
        }

        let (intake_tx, intake_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let mut dispatcher = Dispatcher::new(
            self.base.clone(),
            self.probe.clone(),
            self.pool.clone(),
            self.config.timeout,
            completion_tx,
        );
        let reaper = Reaper::new(intake_rx, completion_rx, results.clone(), self.config.timeout);

        tracing::info!(
            base = %self.base,
            pool_size = self.pool.size(),
            timeout_ms = self.config.timeout.as_millis() as u64,
            "starting probe run"
        );

        let dispatch = async move {
            for candidate in candidates {
                let handle = dispatcher.submit(candidate.into()).await?;
                if intake_tx.send(handle).is_err() {
                    return Err(ProbeError::internal("reaper stopped before dispatch ended"));
                }
            }
            // Dropping the dispatcher and intake_tx here lets the reaper finish.
            Ok(dispatcher.submitted())
        };

        let (dispatched, stats) = tokio::join!(dispatch, reaper.run());
        let submitted = dispatched?;

        let outcomes = results.into_outcomes();
        tracing::info!(
            submitted,
            harvested = stats.harvested,
            timed_out = stats.timed_out,
            "probe run finished"
        );

        if outcomes.len() != submitted || stats.total() != submitted {
            return Err(ProbeError::internal(format!(
                "collected {} outcomes for {} candidates",
                outcomes.len(),
                submitted
            )));
        }

        Ok(outcomes)
    }
}
