//! Worker pool and dispatcher.
//!
//! The pool is a semaphore with one permit per execution slot. The
//! dispatcher takes a permit, spawns the probe as a tokio task that owns
//! that permit, and returns a [`TaskHandle`]. The permit goes back to the
//! pool when the task returns or is aborted, so the number of probes in
//! flight never exceeds the pool size.

use crate::error::ProbeError;
use crate::probe::HttpProbe;
use crate::task::{TaskContext, TaskHandle, TaskId, TaskState};
use crate::types::Outcome;
use crate::utils::resolve_target;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Fixed-size pool of probe execution slots.
///
/// Clones share the same slots.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Probes currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.size.saturating_sub(self.permits.available_permits())
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Stop handing out slots. Waiting and future submissions fail.
    pub fn close(&self) {
        self.permits.close();
    }

    /// Wait for a free slot. Waiters are served in FIFO order.
    async fn acquire(&self) -> Result<OwnedSemaphorePermit, ProbeError> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ProbeError::pool_closed("no further probes can be submitted"))
    }
}

/// Turns candidates into running probes.
///
/// One dispatcher serves one run. Completion notifications for the run's
/// tasks go to the reaper through `completions`.
pub struct Dispatcher {
    base: Url,
    probe: HttpProbe,
    pool: WorkerPool,
    timeout: Duration,
    completions: mpsc::UnboundedSender<TaskId>,
    next_id: u64,
}

impl Dispatcher {
    pub fn new(
        base: Url,
        probe: HttpProbe,
        pool: WorkerPool,
        timeout: Duration,
        completions: mpsc::UnboundedSender<TaskId>,
    ) -> Self {
        Self {
            base,
            probe,
            pool,
            timeout,
            completions,
            next_id: 0,
        }
    }

    /// Start a probe for `candidate` and return its handle.
    ///
    /// Waits only while every slot is taken. The deadline is counted from
    /// the moment the probe is handed to the runtime.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::PoolClosed` if the pool was shut down.
    pub async fn submit(&mut self, candidate: String) -> Result<TaskHandle, ProbeError> {
        let permit = self.pool.acquire().await?;

        let id = TaskId(self.next_id);
        self.next_id += 1;
        let target = resolve_target(&self.base, &candidate);
        let context = TaskContext::new(id, candidate, target);

        let state = Arc::new(TaskState::new());
        let (outcome_tx, outcome_rx) = oneshot::channel();

        tracing::debug!(task = %id, uri = context.target(), "submitting probe");

        let submitted_at = Instant::now();
        let worker = tokio::spawn(run_worker(
            self.probe.clone(),
            context.clone(),
            state.clone(),
            outcome_tx,
            self.completions.clone(),
            permit,
        ));

        Ok(TaskHandle::new(
            context,
            worker,
            state,
            outcome_rx,
            submitted_at,
            self.timeout,
        ))
    }

    /// Number of tasks submitted so far.
    pub fn submitted(&self) -> usize {
        self.next_id as usize
    }
}

/// Body of a spawned probe task.
///
/// The outcome is sent before the task marks itself finished, so whoever
/// observes `Finished` can rely on the outcome being there. If the reaper
/// evicted the task first, the outcome is simply dropped.
async fn run_worker(
    probe: HttpProbe,
    context: TaskContext,
    state: Arc<TaskState>,
    outcome_tx: oneshot::Sender<Outcome>,
    completions: mpsc::UnboundedSender<TaskId>,
    _permit: OwnedSemaphorePermit,
) {
    if !state.begin() {
        return;
    }

    let outcome = probe.execute(&context).await;
    let _ = outcome_tx.send(outcome);

    if state.finish() {
        let _ = completions.send(context.id());
    } else {
        tracing::debug!(task = %context.id(), "late outcome discarded after timeout");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskPhase;
    use crate::types::ProbeConfig;
    use crate::utils::parse_base_url;

    fn dispatcher(
        pool: WorkerPool,
        base: &str,
    ) -> (Dispatcher, mpsc::UnboundedReceiver<TaskId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let probe = HttpProbe::with_config(&ProbeConfig::default()).unwrap();
        let base = parse_base_url(base).unwrap();
        (
            Dispatcher::new(base, probe, pool, Duration::from_secs(1), tx),
            rx,
        )
    }

    /// A listener that accepts connections into its backlog but never
    /// answers, so probes against it stay in flight.
    async fn silent_server() -> (tokio::net::TcpListener, String) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/", listener.local_addr().unwrap());
        (listener, base)
    }

    #[test]
    fn test_pool_accounting() {
        let pool = WorkerPool::new(3);
        assert_eq!(pool.size(), 3);
        assert_eq!(pool.in_flight(), 0);
        assert!(!pool.is_closed());
        pool.close();
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn test_submit_on_closed_pool_is_fatal() {
        let pool = WorkerPool::new(2);
        pool.close();
        let (mut dispatcher, _rx) = dispatcher(pool, "http://127.0.0.1:9/");

        let result = dispatcher.submit("a".to_string()).await;
        assert!(matches!(result, Err(ProbeError::PoolClosed { .. })));
        assert_eq!(dispatcher.submitted(), 0);
    }

    #[tokio::test]
    async fn test_submit_builds_context_and_holds_a_slot() {
        let (_listener, base) = silent_server().await;
        let pool = WorkerPool::new(1);
        let (mut dispatcher, _rx) = dispatcher(pool.clone(), &base);

        let handle = dispatcher.submit("/admin".to_string()).await.unwrap();
        assert_eq!(handle.context().candidate(), "/admin");
        assert_eq!(handle.context().target(), format!("{}admin", base));
        assert!(handle.deadline() > Instant::now());
        assert_eq!(pool.in_flight(), 1);

        // Dropping the handle aborts the worker and returns the slot.
        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), async {
            while pool.in_flight() != 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_second_submit_waits_for_slot() {
        let (_listener, base) = silent_server().await;
        let pool = WorkerPool::new(1);
        let (mut dispatcher, _rx) = dispatcher(pool, &base);

        let first = dispatcher.submit("a".to_string()).await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), dispatcher.submit("b".to_string()))
                .await;
        assert!(blocked.is_err(), "submission should queue while the pool is full");

        drop(first);
        let second =
            tokio::time::timeout(Duration::from_secs(1), dispatcher.submit("c".to_string()))
                .await
                .unwrap()
                .unwrap();
        assert_eq!(second.context().candidate(), "c");
        assert_ne!(second.phase(), TaskPhase::Disposed);
    }
}
