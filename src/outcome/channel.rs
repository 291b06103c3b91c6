// src/outcome/channel.rs
//! Append-only outcome log with bounded waits for observers
//!
//! Appends come from agent tasks running in parallel; each append assigns
//! the next sequence number and publishes the new length under the same
//! write lock, so sequence order, storage order and the published count
//! always agree. Observers never block agents: they wait on a `watch`
//! channel carrying the current length.

use crate::agent::AgentId;
use crate::outcome::{Outcome, OutcomeStatus};
use crate::utils::errors::{KernelError, Result};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Selection criteria for outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeFilter {
    agent: Option<AgentId>,
    parent: Option<AgentId>,
    status: Option<OutcomeStatus>,
}

impl OutcomeFilter {
    /// Match every outcome
    pub fn all() -> Self {
        Self::default()
    }

    pub fn agent(mut self, agent_id: AgentId) -> Self {
        self.agent = Some(agent_id);
        self
    }

    pub fn parent(mut self, parent_id: AgentId) -> Self {
        self.parent = Some(parent_id);
        self
    }

    pub fn status(mut self, status: OutcomeStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn failed() -> Self {
        Self::all().status(OutcomeStatus::Failed)
    }

    pub fn completed() -> Self {
        Self::all().status(OutcomeStatus::Completed)
    }

    pub fn matches(&self, outcome: &Outcome) -> bool {
        self.agent.map_or(true, |id| outcome.agent_id == id)
            && self
                .parent
                .map_or(true, |id| outcome.parent_id == Some(id))
            && self.status.map_or(true, |status| outcome.status == status)
    }
}

/// Filtered view over the outcomes present when the query was made
///
/// Iteration is lazy and can be restarted any number of times.
#[derive(Debug, Clone)]
pub struct OutcomeQuery {
    snapshot: Arc<[Arc<Outcome>]>,
    filter: OutcomeFilter,
}

impl OutcomeQuery {
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Outcome>> + '_ {
        self.snapshot
            .iter()
            .filter(move |outcome| self.filter.matches(outcome))
    }

    /// Number of matching outcomes
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// The `index`-th matching outcome, in append order
    pub fn get(&self, index: usize) -> Option<&Arc<Outcome>> {
        self.iter().nth(index)
    }

    pub fn filter(&self) -> OutcomeFilter {
        self.filter
    }
}

impl<'a> IntoIterator for &'a OutcomeQuery {
    type Item = &'a Arc<Outcome>;
    type IntoIter = Box<dyn Iterator<Item = &'a Arc<Outcome>> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Ordered log of agent outcomes
pub struct OutcomeChannel {
    /// Outcomes in append order
    outcomes: RwLock<Vec<Arc<Outcome>>>,

    /// Number of outcomes appended so far
    count: watch::Sender<usize>,

    /// Completed counter
    completed: AtomicU64,

    /// Failed counter
    failed: AtomicU64,

    /// Bound used by `await_count_default`
    default_timeout: Duration,
}

impl OutcomeChannel {
    /// Create an empty channel
    pub fn new(default_timeout: Duration) -> Self {
        let (count, _) = watch::channel(0);

        Self {
            outcomes: RwLock::new(Vec::new()),
            count,
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            default_timeout,
        }
    }

    /// Append an outcome, assigning its sequence number
    pub fn append(&self, mut outcome: Outcome) -> Arc<Outcome> {
        let outcome = {
            let mut outcomes = self.outcomes.write();
            outcome.sequence = outcomes.len() as u64;
            let outcome = Arc::new(outcome);
            outcomes.push(Arc::clone(&outcome));

            // Status counters move with the count so `stats` always adds up
            match outcome.status {
                OutcomeStatus::Completed => self.completed.fetch_add(1, Ordering::Relaxed),
                OutcomeStatus::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
            };
            self.count.send_replace(outcomes.len());
            outcome
        };

        metrics::counter!("microkernel_outcomes_total", "status" => outcome.status.to_string())
            .increment(1);

        debug!(
            agent = %outcome.agent_id,
            status = %outcome.status,
            sequence = outcome.sequence,
            "Outcome recorded"
        );

        outcome
    }

    /// Outcomes appended so far that match `filter`
    pub fn query(&self, filter: OutcomeFilter) -> OutcomeQuery {
        OutcomeQuery {
            snapshot: self.snapshot().into(),
            filter,
        }
    }

    /// All outcomes appended so far
    pub fn snapshot(&self) -> Vec<Arc<Outcome>> {
        self.outcomes.read().clone()
    }

    /// Outcome recorded for `agent_id`, if any
    pub fn find_agent(&self, agent_id: AgentId) -> Option<Arc<Outcome>> {
        self.outcomes
            .read()
            .iter()
            .find(|outcome| outcome.agent_id == agent_id)
            .cloned()
    }

    /// Wait until at least `expected` outcomes exist
    ///
    /// On timeout returns `OutcomesIncomplete` so callers can tell "not done
    /// yet" apart from "fewer results than expected".
    pub async fn await_count(&self, expected: usize, timeout: Duration) -> Result<OutcomeQuery> {
        let mut count = self.count.subscribe();

        // The watch guard must be released before `query` takes the log lock
        let reached = matches!(
            tokio::time::timeout(timeout, count.wait_for(|n| *n >= expected)).await,
            Ok(Ok(_))
        );

        if reached {
            Ok(self.query(OutcomeFilter::all()))
        } else {
            Err(KernelError::OutcomesIncomplete {
                expected,
                observed: self.len(),
            })
        }
    }

    /// `await_count` bounded by the configured default timeout
    pub async fn await_count_default(&self, expected: usize) -> Result<OutcomeQuery> {
        self.await_count(expected, self.default_timeout).await
    }

    /// Wait for the outcome of a single agent
    pub async fn await_agent(&self, agent_id: AgentId, timeout: Duration) -> Result<Arc<Outcome>> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut count = self.count.subscribe();

        loop {
            // Mark the current length seen before checking, so an append
            // racing with the check still wakes us
            count.borrow_and_update();

            if let Some(outcome) = self.find_agent(agent_id) {
                return Ok(outcome);
            }

            match tokio::time::timeout_at(deadline, count.changed()).await {
                Ok(Ok(())) => continue,
                _ => {
                    return Err(KernelError::OutcomesIncomplete {
                        expected: 1,
                        observed: 0,
                    })
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        *self.count.borrow()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Channel statistics
    pub fn stats(&self) -> OutcomeStats {
        // Appends are excluded while the read guard is held
        let outcomes = self.outcomes.read();

        OutcomeStats {
            total: outcomes.len(),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for OutcomeChannel {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

/// Outcome channel statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeStats {
    pub total: usize,
    pub completed: u64,
    pub failed: u64,
}

impl OutcomeStats {
    /// Percentage of outcomes that are failures
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.failed as f64 / self.total as f64) * 100.0
        }
    }
}
