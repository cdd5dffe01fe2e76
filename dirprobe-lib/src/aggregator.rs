//! Result aggregation.

use crate::types::Outcome;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Append-only, concurrency-safe collection of outcomes.
///
/// Clones share the same storage. Outcomes can only be read back through
/// [`ResultSet::into_outcomes`], which the prober calls once the reaper has
/// finished. An optional observer receives a copy of each outcome as it is
/// appended, for callers that want to display results while the run is
/// still going.
#[derive(Clone, Debug, Default)]
pub struct ResultSet {
    outcomes: Arc<Mutex<Vec<Outcome>>>,
    observer: Option<mpsc::UnboundedSender<Outcome>>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(observer: mpsc::UnboundedSender<Outcome>) -> Self {
        Self {
            outcomes: Arc::default(),
            observer: Some(observer),
        }
    }

    pub fn push(&self, outcome: Outcome) {
        if let Some(observer) = &self.observer {
            // A dropped receiver only means nobody is watching anymore.
            let _ = observer.send(outcome.clone());
        }
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(outcome);
    }

    pub fn len(&self) -> usize {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the set and return every outcome, in append order.
    ///
    /// If other clones are still alive their storage is copied out.
    pub fn into_outcomes(self) -> Vec<Outcome> {
        match Arc::try_unwrap(self.outcomes) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
            Err(shared) => shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}
