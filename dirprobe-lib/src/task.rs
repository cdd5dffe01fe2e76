//! Task handles and their lifecycle.
//!
//! Every candidate becomes one task. The worker running the probe and the
//! reaper supervising it share a [`TaskState`]; each terminal transition is
//! a compare-and-swap, so exactly one of "finished" and "timed out" can win
//! for a given task.
//!
//! ```text
//! Submitted ──► Running ──► Finished ──► Harvested ─┐
//!     │            │                                ├──► Disposed
//!     └────────────┴──────────────────► TimedOut ───┘
//! ```

use crate::types::{FailureKind, Outcome, MAX_TIMEOUT};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Identifier assigned to a task at submission, unique within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Immutable per-candidate arguments, moved into the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    id: TaskId,
    candidate: String,
    target: String,
}

impl TaskContext {
    pub(crate) fn new(id: TaskId, candidate: String, target: String) -> Self {
        Self {
            id,
            candidate,
            target,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn candidate(&self) -> &str {
        &self.candidate
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Lifecycle phase of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskPhase {
    Submitted = 0,
    Running = 1,
    Finished = 2,
    Harvested = 3,
    TimedOut = 4,
    Disposed = 5,
}

impl TaskPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskPhase::Submitted,
            1 => TaskPhase::Running,
            2 => TaskPhase::Finished,
            3 => TaskPhase::Harvested,
            4 => TaskPhase::TimedOut,
            _ => TaskPhase::Disposed,
        }
    }
}

/// Atomic lifecycle state shared by a worker and the reaper.
#[derive(Debug)]
pub struct TaskState(AtomicU8);

impl TaskState {
    pub fn new() -> Self {
        Self(AtomicU8::new(TaskPhase::Submitted as u8))
    }

    pub fn phase(&self) -> TaskPhase {
        TaskPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    fn transition(&self, from: TaskPhase, to: TaskPhase) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Worker side: the probe is about to start.
    ///
    /// Fails if the task was already evicted while queued.
    pub fn begin(&self) -> bool {
        self.transition(TaskPhase::Submitted, TaskPhase::Running)
    }

    /// Worker side: the outcome has been handed over.
    pub fn finish(&self) -> bool {
        self.transition(TaskPhase::Running, TaskPhase::Finished)
    }

    /// Reaper side: take a finished task's outcome.
    pub fn claim_harvest(&self) -> bool {
        self.transition(TaskPhase::Finished, TaskPhase::Harvested)
    }

    /// Reaper side: evict a task that has not finished.
    pub fn claim_timeout(&self) -> bool {
        self.transition(TaskPhase::Running, TaskPhase::TimedOut)
            || self.transition(TaskPhase::Submitted, TaskPhase::TimedOut)
    }

    pub fn is_finished(&self) -> bool {
        self.phase() == TaskPhase::Finished
    }

    /// Mark disposed and return the phase it replaced.
    fn dispose(&self) -> TaskPhase {
        TaskPhase::from_u8(self.0.swap(TaskPhase::Disposed as u8, Ordering::AcqRel))
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::new()
    }
}

/// Bookkeeping record for one submitted probe.
///
/// Dropping the handle is the single teardown path: it aborts the worker
/// (a no-op if it already returned) and marks the state disposed. Both the
/// harvest and the timeout path end by dropping the handle.
pub struct TaskHandle {
    context: TaskContext,
    worker: JoinHandle<()>,
    state: Arc<TaskState>,
    outcome: oneshot::Receiver<Outcome>,
    submitted_at: Instant,
    deadline: Instant,
}

impl TaskHandle {
    pub(crate) fn new(
        context: TaskContext,
        worker: JoinHandle<()>,
        state: Arc<TaskState>,
        outcome: oneshot::Receiver<Outcome>,
        submitted_at: Instant,
        timeout: Duration,
    ) -> Self {
        Self {
            context,
            worker,
            state,
            outcome,
            submitted_at,
            // Validated configs never exceed the bound; the clamp keeps
            // `Instant` arithmetic from overflowing for hand-built ones.
            deadline: submitted_at + timeout.min(MAX_TIMEOUT),
        }
    }

    pub fn id(&self) -> TaskId {
        self.context.id
    }

    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn phase(&self) -> TaskPhase {
        self.state.phase()
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Take the outcome of a finished probe.
    ///
    /// Returns `None` if the probe has not finished or the outcome was
    /// already claimed.
    pub fn harvest(&mut self) -> Option<Outcome> {
        if !self.state.claim_harvest() {
            return None;
        }
        // The worker sends before it marks itself finished.
        Some(self.outcome.try_recv().unwrap_or_else(|_| {
            Outcome::failed(
                self.context.target.clone(),
                FailureKind::Aborted,
                "probe finished without reporting an outcome",
                Some(self.submitted_at.elapsed()),
            )
        }))
    }

    /// Resolve a task whose deadline has passed.
    ///
    /// If the timeout claim wins, the worker is aborted and a synthetic
    /// outcome is returned. If the probe finished first, its real outcome is
    /// harvested instead. Either way exactly one outcome comes back.
    pub fn evict(&mut self, timeout: Duration) -> Outcome {
        if self.state.claim_timeout() {
            // Checked before abort: a cancelled task also reports finished.
            let exited = self.worker.is_finished();
            self.worker.abort();
            let elapsed = self.submitted_at.elapsed();
            if exited && self.outcome.try_recv().is_err() {
                return Outcome::failed(
                    self.context.target.clone(),
                    FailureKind::Aborted,
                    "probe task exited without reporting an outcome",
                    Some(elapsed),
                );
            }
            return Outcome::timed_out(self.context.target.clone(), timeout, elapsed);
        }

        self.harvest().unwrap_or_else(|| {
            Outcome::failed(
                self.context.target.clone(),
                FailureKind::Aborted,
                "task was already resolved",
                Some(self.submitted_at.elapsed()),
            )
        })
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        let previous = self.state.dispose();
        if previous != TaskPhase::Disposed {
            self.worker.abort();
            tracing::trace!(task = %self.context.id, phase = ?previous, "task disposed");
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("context", &self.context)
            .field("phase", &self.state.phase())
            .field("deadline", &self.deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(n: u64) -> TaskContext {
        TaskContext::new(TaskId(n), format!("c{}", n), format!("http://h/c{}", n))
    }

    #[test]
    fn test_finish_and_timeout_are_exclusive() {
        let state = TaskState::new();
        assert!(state.begin());
        assert!(state.finish());
        assert!(!state.claim_timeout());
        assert!(state.claim_harvest());
        assert!(!state.claim_harvest());

        let state = TaskState::new();
        assert!(state.begin());
        assert!(state.claim_timeout());
        assert!(!state.finish());
        assert!(!state.claim_harvest());
        assert_eq!(state.phase(), TaskPhase::TimedOut);
    }

    #[test]
    fn test_queued_task_can_time_out() {
        let state = TaskState::new();
        assert!(state.claim_timeout());
        assert!(!state.begin());
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        for _ in 0..200 {
            let state = Arc::new(TaskState::new());
            assert!(state.begin());
            let worker = {
                let state = state.clone();
                std::thread::spawn(move || state.finish())
            };
            let reaper = state.claim_timeout();
            let finished = worker.join().unwrap();
            assert!(finished ^ reaper, "exactly one side must win");
        }
    }

    #[tokio::test]
    async fn test_harvest_takes_sent_outcome() {
        let state = Arc::new(TaskState::new());
        let (tx, rx) = oneshot::channel();
        let worker = tokio::spawn(async {});
        let mut handle = TaskHandle::new(
            ctx(1),
            worker,
            state.clone(),
            rx,
            Instant::now(),
            Duration::from_secs(1),
        );

        assert!(handle.harvest().is_none());
        assert!(state.begin());
        tx.send(Outcome::with_status("http://h/c1", 200, Duration::ZERO))
            .unwrap();
        assert!(state.finish());

        let outcome = handle.harvest().unwrap();
        assert_eq!(outcome.status.code(), Some(200));
        drop(handle);
        assert_eq!(state.phase(), TaskPhase::Disposed);
    }

    #[tokio::test]
    async fn test_evict_aborts_running_worker() {
        let state = Arc::new(TaskState::new());
        let (_tx, rx) = oneshot::channel();
        let worker = tokio::spawn(std::future::pending::<()>());
        assert!(state.begin());
        let mut handle = TaskHandle::new(
            ctx(2),
            worker,
            state,
            rx,
            Instant::now(),
            Duration::from_millis(10),
        );

        let outcome = handle.evict(Duration::from_millis(10));
        assert!(outcome.is_timeout());
        assert_eq!(outcome.uri, "http://h/c2");
        assert_eq!(handle.phase(), TaskPhase::TimedOut);
    }

    #[tokio::test]
    async fn test_huge_timeout_deadline_is_clamped() {
        let (_tx, rx) = oneshot::channel();
        let worker = tokio::spawn(async {});
        let submitted_at = Instant::now();
        let handle = TaskHandle::new(
            ctx(4),
            worker,
            Arc::new(TaskState::new()),
            rx,
            submitted_at,
            Duration::from_secs(u64::MAX / 2),
        );

        assert_eq!(handle.deadline(), submitted_at + MAX_TIMEOUT);
    }

    #[tokio::test]
    async fn test_evict_prefers_finished_outcome() {
        let state = Arc::new(TaskState::new());
        let (tx, rx) = oneshot::channel();
        let worker = tokio::spawn(async {});
        let mut handle = TaskHandle::new(
            ctx(3),
            worker,
            state.clone(),
            rx,
            Instant::now(),
            Duration::from_millis(10),
        );

        assert!(state.begin());
        tx.send(Outcome::with_status("http://h/c3", 404, Duration::ZERO))
            .unwrap();
        assert!(state.finish());

        let outcome = handle.evict(Duration::from_millis(10));
        assert_eq!(outcome.status.code(), Some(404));
        assert!(!outcome.is_timeout());
    }
}
