//! Waxvalue backend API client library.
//!
//! Provides REST access to the inventory and auth endpoints, plus the
//! streaming suggestion ingestion adapter.

pub mod rate_limit;
pub mod rest;
pub mod stream;

pub use rate_limit::RateLimiter;
pub use rest::WaxValueRestClient;
pub use stream::{FrameBuffer, StreamReport, SuggestionStreamer};
