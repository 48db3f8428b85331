//! Shared types, configuration, and errors for the waxvalue client.

pub mod config;
pub mod error;
pub mod types;

pub use error::Error;
pub use types::{
    ApplyOutcome, ApplyResponse, BulkApplyRequest, CountResponse, PriceStatus, PriceUpdate,
    SingleApplyRequest, StreamFrame, SuggestionRecord, SuggestionsResponse, SummaryResponse,
};
