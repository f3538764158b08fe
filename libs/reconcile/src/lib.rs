//! Reconciliation loop primitives.
//!
//! This library provides helpers for implementing reconciliation loops
//! that converge local state to cluster-desired state. Key concepts:
//!
//! - **Desired state**: The set of keys the coordination store says should exist.
//! - **Current state**: The set of keys observable locally.
//! - **Convergence**: Making current a superset of desired.
//!
//! # Invariants
//!
//! - Plans are derived only from the two input sets, never from history
//! - Each key appears at most once in a plan
//! - Plan ordering is deterministic given the same inputs

use std::collections::BTreeSet;
use std::time::Duration;

/// Convergence status for a reconciled set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// Every desired key is present locally.
    Converged,

    /// Some desired keys are still missing.
    Converging,

    /// Nothing is desired yet (or desired state could not be read).
    Unknown,
}

impl ConvergenceStatus {
    /// Returns true if the set has converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }

    /// Returns true if work remains.
    pub fn is_converging(&self) -> bool {
        matches!(self, Self::Converging)
    }
}

/// The result of diffing desired against current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan<K> {
    /// Desired keys absent locally (`desired - current`), sorted.
    pub missing: Vec<K>,

    /// Local keys no longer desired (`current - desired`), sorted.
    ///
    /// Reported only; removal is owned by whoever decommissions keys.
    pub orphaned: Vec<K>,

    /// Number of desired keys that are already present.
    pub present: usize,
}

impl<K> SyncPlan<K> {
    /// Returns true if there is nothing to fetch.
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }

    /// Convergence status implied by this plan.
    pub fn status(&self) -> ConvergenceStatus {
        if !self.missing.is_empty() {
            ConvergenceStatus::Converging
        } else if self.present == 0 {
            ConvergenceStatus::Unknown
        } else {
            ConvergenceStatus::Converged
        }
    }
}

/// Compute which desired keys are missing from the current set.
///
/// Duplicates on either side are collapsed, so each missing key is planned
/// exactly once per pass.
pub fn plan_sync<K, D, C>(desired: D, current: C) -> SyncPlan<K>
where
    K: Ord + Clone,
    D: IntoIterator<Item = K>,
    C: IntoIterator<Item = K>,
{
    let desired: BTreeSet<K> = desired.into_iter().collect();
    let current: BTreeSet<K> = current.into_iter().collect();

    let missing: Vec<K> = desired.difference(&current).cloned().collect();
    let orphaned: Vec<K> = current.difference(&desired).cloned().collect();
    let present = desired.len() - missing.len();

    SyncPlan {
        missing,
        orphaned,
        present,
    }
}

/// Default reconciliation interval.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(2);

/// Default flush interval for buffered state written back to the store.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(2);

/// Default number of keys fetched concurrently within one pass.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;
