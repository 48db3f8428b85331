//! In-memory suggestion store - the single source of truth for the
//! review table.

use std::collections::HashMap;

use common::{Error, PriceStatus, SuggestionRecord};
use tracing::warn;

/// Owns every suggestion record for the current run.
///
/// Records enter via [`SuggestionStore::replace_all`] (the completion
/// payload or the non-streaming fallback), mutate in place on nudges and
/// apply commits, and are dropped only by the next full replacement.
#[derive(Debug, Default)]
pub struct SuggestionStore {
    records: Vec<SuggestionRecord>,
    by_listing: HashMap<u64, usize>,
}

impl SuggestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[SuggestionRecord] {
        &self.records
    }

    pub fn get(&self, listing_id: u64) -> Option<&SuggestionRecord> {
        self.by_listing
            .get(&listing_id)
            .map(|&idx| &self.records[idx])
    }

    fn get_mut(&mut self, listing_id: u64) -> Option<&mut SuggestionRecord> {
        let idx = *self.by_listing.get(&listing_id)?;
        Some(&mut self.records[idx])
    }

    /// Atomically replace the store with a completion payload.
    ///
    /// Each record is stamped with `original_index` = its position in the
    /// payload. Duplicate listing ids keep the first occurrence; the rest
    /// are logged and dropped so the uniqueness invariant holds.
    ///
    /// Returns the number of records kept.
    pub fn replace_all(&mut self, incoming: Vec<SuggestionRecord>) -> usize {
        self.records.clear();
        self.by_listing.clear();

        for (position, mut record) in incoming.into_iter().enumerate() {
            if self.by_listing.contains_key(&record.listing_id) {
                warn!(
                    "Dropping duplicate suggestion for listing {} at position {}",
                    record.listing_id, position
                );
                continue;
            }
            record.original_index = position;
            self.by_listing.insert(record.listing_id, self.records.len());
            self.records.push(record);
        }

        self.records.len()
    }

    /// Nudge a record's suggested price by a fixed increment (either
    /// direction). The result must stay positive.
    pub fn nudge_suggested(&mut self, listing_id: u64, delta: f64) -> Result<f64, Error> {
        let record = self
            .get_mut(listing_id)
            .ok_or_else(|| Error::Other(format!("unknown listing {}", listing_id)))?;

        let nudged = record.suggested_price + delta;
        if nudged <= 0.0 {
            return Err(Error::Other(format!(
                "nudge would make listing {} price non-positive",
                listing_id
            )));
        }

        record.suggested_price = nudged;
        Ok(nudged)
    }

    /// First phase of a successful apply: remember the pre-apply price so
    /// both old and new can be shown while the commit is pending.
    pub(crate) fn stamp_original_price(&mut self, listing_id: u64) {
        if let Some(record) = self.get_mut(listing_id) {
            record.original_price = Some(record.current_price);
        }
    }

    /// Second phase: the suggested price becomes the live price and the
    /// row counts as fairly priced from here on.
    pub(crate) fn commit_price(&mut self, listing_id: u64) {
        if let Some(record) = self.get_mut(listing_id) {
            record.current_price = record.suggested_price;
            record.status = PriceStatus::FairlyPriced;
        }
    }
}
