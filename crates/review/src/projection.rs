//! Filter/sort/pagination projection over the suggestion store.
//!
//! Pure functions from (records, criteria, sort state) to a displayed
//! ordered subset; nothing here mutates the store.

use std::cmp::Ordering;

use common::{PriceStatus, SuggestionRecord};

use crate::store::SuggestionStore;

// ── Sorting ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    CurrentPrice,
    /// `suggested - current`, recomputed per comparison, never stored.
    PriceDelta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn flip(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

fn sort_value(record: &SuggestionRecord, key: SortKey) -> f64 {
    match key {
        SortKey::CurrentPrice => record.current_price,
        SortKey::PriceDelta => record.price_delta(),
    }
}

/// Sort rows by the key and direction, tie-breaking on ascending
/// `original_index` in both directions so equal rows never visibly jump
/// when a record mutates in place mid-session.
pub fn sort_rows(rows: &mut [&SuggestionRecord], key: SortKey, direction: SortDirection) {
    rows.sort_by(|a, b| {
        let ord = sort_value(a, key)
            .partial_cmp(&sort_value(b, key))
            .unwrap_or(Ordering::Equal);
        let ord = match direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        };
        ord.then(a.original_index.cmp(&b.original_index))
    });
}

// ── Filtering ─────────────────────────────────────────────────────────

/// Inclusive bounds on `current_price`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

/// Optional criteria, AND-combined.
#[derive(Debug, Clone)]
pub struct FilterCriteria {
    /// When false, rows whose absolute price change is below
    /// `min_price_change_threshold` are hidden.
    pub show_fairly_priced: bool,
    pub min_price_change_threshold: f64,
    /// Exact status match.
    pub price_direction: Option<PriceStatus>,
    /// Case-insensitive substring match against the condition text.
    pub condition: Option<String>,
    pub price_range: Option<PriceRange>,
    /// Keep only rows whose relative change meets `flagged_threshold`.
    pub show_flagged_only: bool,
    pub flagged_threshold: f64,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            show_fairly_priced: false,
            min_price_change_threshold: 1.0,
            price_direction: None,
            condition: None,
            price_range: None,
            show_flagged_only: false,
            flagged_threshold: 0.25,
        }
    }
}

impl FilterCriteria {
    fn matches(&self, record: &SuggestionRecord) -> bool {
        let abs_change = record.price_delta().abs();

        if !self.show_fairly_priced && abs_change < self.min_price_change_threshold {
            return false;
        }

        if let Some(direction) = self.price_direction {
            if record.status != direction {
                return false;
            }
        }

        if let Some(ref needle) = self.condition {
            if !record
                .condition
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }

        if let Some(range) = self.price_range {
            if record.current_price < range.min || record.current_price > range.max {
                return false;
            }
        }

        if self.show_flagged_only {
            let relative = if record.current_price > 0.0 {
                abs_change / record.current_price
            } else {
                0.0
            };
            if relative < self.flagged_threshold {
                return false;
            }
        }

        true
    }
}

/// Keep the rows matching every criterion, in store order.
pub fn filter_rows<'a>(
    records: &'a [SuggestionRecord],
    criteria: &FilterCriteria,
) -> Vec<&'a SuggestionRecord> {
    records.iter().filter(|r| criteria.matches(r)).collect()
}

// ── Pagination ────────────────────────────────────────────────────────

/// Number of pages for `n` rows at `size` per page.
pub fn page_count(n: usize, size: usize) -> usize {
    if size == 0 {
        return 0;
    }
    n.div_ceil(size)
}

/// Contiguous slice for a 1-based page number.
pub fn paginate<'a, T>(rows: &'a [T], page: usize, size: usize) -> &'a [T] {
    if size == 0 || page == 0 {
        return &[];
    }
    let start = (page - 1).saturating_mul(size);
    if start >= rows.len() {
        return &[];
    }
    let end = (start + size).min(rows.len());
    &rows[start..end]
}

// ── View state ────────────────────────────────────────────────────────

/// One projected page plus its context.
#[derive(Debug)]
pub struct Page<'a> {
    pub rows: Vec<&'a SuggestionRecord>,
    pub page: usize,
    pub page_count: usize,
    pub total_rows: usize,
}

/// Criteria, sort, and pagination state for the review table.
///
/// Filter or page-size changes reset to page 1; re-selecting the active
/// sort key toggles its direction, switching keys starts ascending.
#[derive(Debug, Clone)]
pub struct ViewState {
    pub criteria: FilterCriteria,
    pub sort_key: SortKey,
    pub direction: SortDirection,
    pub page: usize,
    pub page_size: usize,
}

impl ViewState {
    pub fn new(criteria: FilterCriteria, sort_key: SortKey, page_size: usize) -> Self {
        Self {
            criteria,
            sort_key,
            direction: SortDirection::Ascending,
            page: 1,
            page_size,
        }
    }

    pub fn set_criteria(&mut self, criteria: FilterCriteria) {
        self.criteria = criteria;
        self.page = 1;
    }

    pub fn set_page_size(&mut self, size: usize) {
        self.page_size = size;
        self.page = 1;
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    pub fn select_sort(&mut self, key: SortKey) {
        if self.sort_key == key {
            self.direction = self.direction.flip();
        } else {
            self.sort_key = key;
            self.direction = SortDirection::Ascending;
        }
    }

    /// Project the store through the current criteria, sort, and page.
    pub fn project<'a>(&self, store: &'a SuggestionStore) -> Page<'a> {
        let mut rows = filter_rows(store.records(), &self.criteria);
        sort_rows(&mut rows, self.sort_key, self.direction);

        let total_rows = rows.len();
        let pages = page_count(total_rows, self.page_size);
        let slice = paginate(&rows, self.page, self.page_size);

        Page {
            rows: slice.to_vec(),
            page: self.page,
            page_count: pages,
            total_rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::make_record;

    fn indexed(records: Vec<SuggestionRecord>) -> Vec<SuggestionRecord> {
        records
            .into_iter()
            .enumerate()
            .map(|(i, mut r)| {
                r.original_index = i;
                r
            })
            .collect()
    }

    fn ids(rows: &[&SuggestionRecord]) -> Vec<u64> {
        rows.iter().map(|r| r.listing_id).collect()
    }

    #[test]
    fn test_delta_sort_reverses_except_tie_groups() {
        // Listings 2 and 3 share a delta of 2.0.
        let records = indexed(vec![
            make_record(1, 10.0, 15.0), // delta 5
            make_record(2, 10.0, 12.0), // delta 2
            make_record(3, 20.0, 22.0), // delta 2
            make_record(4, 10.0, 8.0),  // delta -2
        ]);

        let mut asc: Vec<&SuggestionRecord> = records.iter().collect();
        sort_rows(&mut asc, SortKey::PriceDelta, SortDirection::Ascending);
        assert_eq!(ids(&asc), vec![4, 2, 3, 1]);

        let mut desc: Vec<&SuggestionRecord> = records.iter().collect();
        sort_rows(&mut desc, SortKey::PriceDelta, SortDirection::Descending);
        // Strict reverse of ascending, except the tie group (2, 3) stays
        // in ascending original_index order in both directions.
        assert_eq!(ids(&desc), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_current_price_sort() {
        let records = indexed(vec![
            make_record(1, 30.0, 31.0),
            make_record(2, 10.0, 11.0),
            make_record(3, 20.0, 21.0),
        ]);
        let mut rows: Vec<&SuggestionRecord> = records.iter().collect();
        sort_rows(&mut rows, SortKey::CurrentPrice, SortDirection::Ascending);
        assert_eq!(ids(&rows), vec![2, 3, 1]);
    }

    #[test]
    fn test_fair_threshold_excludes_small_changes() {
        let records = indexed(vec![
            make_record(1, 10.0, 10.5),  // change 0.5 - hidden
            make_record(2, 10.0, 11.0),  // change 1.0 - kept (inclusive)
            make_record(3, 10.0, 8.0),   // change 2.0 - kept
            make_record(4, 10.0, 9.01),  // change 0.99 - hidden
        ]);

        let criteria = FilterCriteria {
            show_fairly_priced: false,
            min_price_change_threshold: 1.0,
            ..FilterCriteria::default()
        };
        let rows = filter_rows(&records, &criteria);
        assert_eq!(ids(&rows), vec![2, 3]);

        let show_all = FilterCriteria {
            show_fairly_priced: true,
            ..criteria
        };
        assert_eq!(filter_rows(&records, &show_all).len(), 4);
    }

    #[test]
    fn test_direction_condition_and_range_filters() {
        let mut sleeve_vg = make_record(3, 25.0, 20.0);
        sleeve_vg.condition = "Media: Mint, Sleeve: Good".into();
        let records = indexed(vec![
            make_record(1, 10.0, 15.0),
            make_record(2, 50.0, 55.0),
            sleeve_vg,
        ]);

        let underpriced = FilterCriteria {
            price_direction: Some(PriceStatus::Underpriced),
            ..FilterCriteria::default()
        };
        assert_eq!(ids(&filter_rows(&records, &underpriced)), vec![1, 2]);

        let near_mint = FilterCriteria {
            condition: Some("near mint".into()),
            ..FilterCriteria::default()
        };
        assert_eq!(ids(&filter_rows(&records, &near_mint)), vec![1, 2]);

        let mid_range = FilterCriteria {
            price_range: Some(PriceRange { min: 10.0, max: 30.0 }),
            ..FilterCriteria::default()
        };
        assert_eq!(ids(&filter_rows(&records, &mid_range)), vec![1, 3]);
    }

    #[test]
    fn test_flagged_only_keeps_large_relative_changes() {
        let records = indexed(vec![
            make_record(1, 10.0, 13.0), // +30% - flagged
            make_record(2, 10.0, 12.0), // +20% - not flagged
            make_record(3, 10.0, 7.5),  // -25% - flagged (inclusive)
        ]);

        let criteria = FilterCriteria {
            show_flagged_only: true,
            flagged_threshold: 0.25,
            ..FilterCriteria::default()
        };
        assert_eq!(ids(&filter_rows(&records, &criteria)), vec![1, 3]);
    }

    #[test]
    fn test_pagination_covers_sequence_exactly_once() {
        let rows: Vec<u64> = (0..23).collect();
        let size = 10;
        let pages = page_count(rows.len(), size);
        assert_eq!(pages, 3);

        let mut seen = Vec::new();
        for page in 1..=pages {
            seen.extend_from_slice(paginate(&rows, page, size));
        }
        assert_eq!(seen, rows);

        assert!(paginate(&rows, 4, size).is_empty());
        assert_eq!(page_count(0, size), 0);
    }

    #[test]
    fn test_sort_toggle_and_page_reset() {
        let mut view = ViewState::new(FilterCriteria::default(), SortKey::PriceDelta, 25);
        assert_eq!(view.direction, SortDirection::Ascending);

        view.select_sort(SortKey::PriceDelta);
        assert_eq!(view.direction, SortDirection::Descending);

        // Switching columns always starts ascending.
        view.select_sort(SortKey::CurrentPrice);
        assert_eq!(view.sort_key, SortKey::CurrentPrice);
        assert_eq!(view.direction, SortDirection::Ascending);

        view.set_page(3);
        view.set_page_size(50);
        assert_eq!(view.page, 1);

        view.set_page(2);
        view.set_criteria(FilterCriteria::default());
        assert_eq!(view.page, 1);
    }

    #[test]
    fn test_project_end_to_end() {
        let mut store = SuggestionStore::new();
        store.replace_all(vec![
            make_record(1, 10.0, 15.0),
            make_record(2, 10.0, 12.0),
            make_record(3, 10.0, 10.2),
            make_record(4, 10.0, 6.0),
        ]);

        let mut view = ViewState::new(FilterCriteria::default(), SortKey::PriceDelta, 2);
        view.select_sort(SortKey::PriceDelta); // descending

        let page = view.project(&store);
        // Listing 3's 0.20 change is under the threshold and hidden.
        assert_eq!(page.total_rows, 3);
        assert_eq!(page.page_count, 2);
        assert_eq!(ids(&page.rows), vec![1, 2]);

        view.set_page(2);
        let page = view.project(&store);
        assert_eq!(ids(&page.rows), vec![4]);
    }
}
