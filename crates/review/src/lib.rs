//! Suggestion reconciliation engine.
//!
//! Holds the in-memory suggestion store, the pure filter/sort/pagination
//! projections over it, and the two-phase apply coordinator.

pub mod apply;
pub mod progress;
pub mod projection;
pub mod store;

pub use apply::{ApplyCoordinator, ApplyState};
pub use progress::{DisplayPrefs, ProgressSnapshot, ReviewState, StateStore};
pub use projection::{FilterCriteria, Page, PriceRange, SortDirection, SortKey, ViewState};
pub use store::SuggestionStore;
