//! Completion loop.
//!
//! The reaper owns every outstanding [`TaskHandle`] of a run. It sleeps in a
//! single `select!` until one of three things happens: the dispatcher hands
//! over a new handle, a worker reports completion, or the earliest deadline
//! passes. After each wake it runs a harvest scan over the reported
//! completions, then a timeout scan over expired deadlines. Both scans touch
//! only the tasks involved, never the whole outstanding set.
//!
//! Deadlines live in a min-heap with lazy deletion: entries whose task was
//! already harvested are skipped when they reach the top.

use crate::aggregator::ResultSet;
use crate::task::{TaskHandle, TaskId};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Counters reported when the reaper terminates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapStats {
    pub harvested: usize,
    pub timed_out: usize,
}

impl ReapStats {
    pub fn total(&self) -> usize {
        self.harvested + self.timed_out
    }
}

pub struct Reaper {
    intake: mpsc::UnboundedReceiver<TaskHandle>,
    completions: mpsc::UnboundedReceiver<TaskId>,
    outstanding: HashMap<TaskId, TaskHandle>,
    deadlines: BinaryHeap<Reverse<(Instant, TaskId)>>,
    ready: Vec<TaskId>,
    results: ResultSet,
    timeout: Duration,
    stats: ReapStats,
}

impl Reaper {
    pub fn new(
        intake: mpsc::UnboundedReceiver<TaskHandle>,
        completions: mpsc::UnboundedReceiver<TaskId>,
        results: ResultSet,
        timeout: Duration,
    ) -> Self {
        Self {
            intake,
            completions,
            outstanding: HashMap::new(),
            deadlines: BinaryHeap::new(),
            ready: Vec::new(),
            results,
            timeout,
            stats: ReapStats::default(),
        }
    }

    /// Run until the intake is closed and nothing is outstanding.
    pub async fn run(mut self) -> ReapStats {
        let mut intake_open = true;

        loop {
            if !intake_open && self.outstanding.is_empty() {
                break;
            }

            let next_deadline = self.next_deadline();

            tokio::select! {
                biased;

                handle = self.intake.recv(), if intake_open => match handle {
                    Some(handle) => self.track(handle),
                    None => intake_open = false,
                },
                Some(id) = self.completions.recv() => self.ready.push(id),
                _ = sleep_until_deadline(next_deadline), if next_deadline.is_some() => {}
            }

            self.harvest_scan();
            self.timeout_scan(Instant::now());
        }

        tracing::debug!(
            harvested = self.stats.harvested,
            timed_out = self.stats.timed_out,
            "reaper finished"
        );
        self.stats
    }

    /// Start supervising a handle.
    fn track(&mut self, handle: TaskHandle) {
        let id = handle.id();
        // Its completion notice may have arrived before the handle did.
        if handle.is_finished() {
            self.ready.push(id);
        }
        self.deadlines.push(Reverse((handle.deadline(), id)));
        self.outstanding.insert(id, handle);
    }

    fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, id))) = self.deadlines.peek().copied() {
            if self.outstanding.contains_key(&id) {
                return Some(deadline);
            }
            self.deadlines.pop();
        }
        None
    }

    /// Move every reported completion into the result set.
    fn harvest_scan(&mut self) {
        while let Ok(id) = self.completions.try_recv() {
            self.ready.push(id);
        }

        for id in std::mem::take(&mut self.ready) {
            // Unknown ids belong to handles still in the intake queue;
            // `track` picks those up.
            let Some(handle) = self.outstanding.get_mut(&id) else {
                continue;
            };
            if let Some(outcome) = handle.harvest() {
                tracing::trace!(task = %id, status = %outcome.status, "harvested");
                self.results.push(outcome);
                self.stats.harvested += 1;
                self.outstanding.remove(&id);
            }
        }
    }

    /// Evict every task whose deadline has passed.
    fn timeout_scan(&mut self, now: Instant) {
        while let Some(Reverse((deadline, id))) = self.deadlines.peek().copied() {
            if deadline > now {
                break;
            }
            self.deadlines.pop();

            let Some(mut handle) = self.outstanding.remove(&id) else {
                continue;
            };
            let outcome = handle.evict(self.timeout);
            if outcome.is_timeout() {
                tracing::debug!(task = %id, uri = %outcome.uri, "probe timed out");
                self.stats.timed_out += 1;
            } else {
                self.stats.harvested += 1;
            }
            self.results.push(outcome);
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
