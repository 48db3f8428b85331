//! Apply-transaction coordinator.
//!
//! Tracks the per-listing commit state machine
//! `Idle → Applying → Applied { commit_at } → Committed` and enforces the
//! mutual-exclusion rules: one outstanding apply per listing, and no
//! individual applies while a bulk selection is active. The delayed
//! price commit is driven explicitly through [`ApplyCoordinator::flush_due`]
//! rather than ad hoc deferred callbacks, so it is cancellable and
//! testable.

use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, Instant};

use common::{ApplyOutcome, Error};
use tracing::{debug, warn};

use crate::store::SuggestionStore;

/// Where a listing sits in the apply lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyState {
    Idle,
    /// Request in flight; the control is disabled.
    Applying,
    /// Server accepted; success is visible, price commit still pending.
    Applied { commit_at: Instant },
    /// Price and status have been committed into the record.
    Committed,
}

#[derive(Debug, Clone, Copy)]
struct PendingCommit {
    listing_id: u64,
    commit_at: Instant,
}

/// Coordinates individual and bulk applies against the store.
#[derive(Debug)]
pub struct ApplyCoordinator {
    commit_delay: Duration,
    in_flight: HashSet<u64>,
    applied: HashSet<u64>,
    committed: HashSet<u64>,
    /// Bulk selection. Ordered so batch requests are deterministic.
    selected: BTreeSet<u64>,
    pending: Vec<PendingCommit>,
}

impl ApplyCoordinator {
    pub fn new(commit_delay: Duration) -> Self {
        Self {
            commit_delay,
            in_flight: HashSet::new(),
            applied: HashSet::new(),
            committed: HashSet::new(),
            selected: BTreeSet::new(),
            pending: Vec::new(),
        }
    }

    pub fn state(&self, listing_id: u64) -> ApplyState {
        if self.committed.contains(&listing_id) {
            return ApplyState::Committed;
        }
        if let Some(p) = self.pending.iter().find(|p| p.listing_id == listing_id) {
            return ApplyState::Applied {
                commit_at: p.commit_at,
            };
        }
        if self.in_flight.contains(&listing_id) {
            return ApplyState::Applying;
        }
        ApplyState::Idle
    }

    pub fn is_applied(&self, listing_id: u64) -> bool {
        self.applied.contains(&listing_id) || self.committed.contains(&listing_id)
    }

    // ── Bulk selection ────────────────────────────────────────────────

    pub fn select(&mut self, listing_id: u64) {
        self.selected.insert(listing_id);
    }

    pub fn deselect(&mut self, listing_id: u64) {
        self.selected.remove(&listing_id);
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    pub fn selection(&self) -> Vec<u64> {
        self.selected.iter().copied().collect()
    }

    /// While any bulk selection is non-empty, every individual apply
    /// control reports itself disabled.
    pub fn individual_apply_enabled(&self, listing_id: u64) -> bool {
        self.selected.is_empty()
            && !self.in_flight.contains(&listing_id)
            && !self.is_applied(listing_id)
    }

    // ── Transaction lifecycle ─────────────────────────────────────────

    /// Gate and start an individual apply. On `Ok` the listing is in
    /// flight and the caller owns the network call.
    pub fn begin(&mut self, listing_id: u64) -> Result<(), Error> {
        if !self.selected.is_empty() {
            return Err(Error::ApplyRejected(
                "bulk selection active; individual applies are disabled".into(),
            ));
        }
        if self.in_flight.contains(&listing_id) {
            return Err(Error::ApplyRejected(format!(
                "apply already in flight for listing {}",
                listing_id
            )));
        }
        if self.is_applied(listing_id) {
            return Err(Error::ApplyRejected(format!(
                "listing {} already applied this session",
                listing_id
            )));
        }

        self.in_flight.insert(listing_id);
        Ok(())
    }

    /// Gate and start a bulk apply over the current selection. Drains the
    /// selection into the in-flight set and returns the batch ids.
    pub fn begin_bulk(&mut self) -> Result<Vec<u64>, Error> {
        if self.selected.is_empty() {
            return Err(Error::ApplyRejected("no listings selected".into()));
        }
        if let Some(&busy) = self.selected.iter().find(|&&id| self.in_flight.contains(&id)) {
            return Err(Error::ApplyRejected(format!(
                "apply already in flight for listing {}",
                busy
            )));
        }

        let batch: Vec<u64> = std::mem::take(&mut self.selected).into_iter().collect();
        self.in_flight.extend(batch.iter().copied());
        Ok(batch)
    }

    /// Record a successful individual apply: stamp the pre-apply price
    /// immediately and schedule the delayed commit.
    pub fn succeed(&mut self, store: &mut SuggestionStore, listing_id: u64, now: Instant) {
        self.in_flight.remove(&listing_id);
        store.stamp_original_price(listing_id);
        self.applied.insert(listing_id);
        self.pending.push(PendingCommit {
            listing_id,
            commit_at: now + self.commit_delay,
        });
        debug!("Listing {} applied; commit pending", listing_id);
    }

    /// Record a failed apply: the record stays untouched so the user may
    /// retry.
    pub fn fail(&mut self, listing_id: u64) {
        self.in_flight.remove(&listing_id);
    }

    /// Settle a bulk response against the batch. Successful listings get
    /// the two-phase treatment with a single commit deadline for the
    /// whole batch; failures are released untouched and returned with
    /// their messages.
    pub fn settle_bulk(
        &mut self,
        store: &mut SuggestionStore,
        batch: &[u64],
        results: &[ApplyOutcome],
        now: Instant,
    ) -> Vec<(u64, String)> {
        let commit_at = now + self.commit_delay;
        let mut failures = Vec::new();

        for &listing_id in batch {
            let outcome = results.iter().find(|r| r.listing_id == listing_id);
            match outcome {
                Some(r) if r.success => {
                    self.in_flight.remove(&listing_id);
                    store.stamp_original_price(listing_id);
                    self.applied.insert(listing_id);
                    self.pending.push(PendingCommit {
                        listing_id,
                        commit_at,
                    });
                }
                Some(r) => {
                    self.in_flight.remove(&listing_id);
                    let message = r
                        .error
                        .clone()
                        .unwrap_or_else(|| "apply failed".to_string());
                    warn!("Bulk apply failed for listing {}: {}", listing_id, message);
                    failures.push((listing_id, message));
                }
                None => {
                    self.in_flight.remove(&listing_id);
                    warn!("Bulk response missing listing {}", listing_id);
                    failures.push((listing_id, "no result returned".to_string()));
                }
            }
        }

        failures
    }

    /// Commit every pending price whose deadline has passed. Returns the
    /// listing ids committed this call.
    pub fn flush_due(&mut self, store: &mut SuggestionStore, now: Instant) -> Vec<u64> {
        let mut committed = Vec::new();

        self.pending.retain(|p| {
            if p.commit_at <= now {
                store.commit_price(p.listing_id);
                committed.push(p.listing_id);
                false
            } else {
                true
            }
        });

        for &listing_id in &committed {
            self.committed.insert(listing_id);
            debug!("Listing {} price committed", listing_id);
        }

        committed
    }

    /// Earliest pending commit deadline, for the driver to sleep until.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.commit_at).min()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
