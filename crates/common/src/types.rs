//! Domain and wire types shared across the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Suggestion Types ──────────────────────────────────────────────────

/// Classification of a listing's current price against its suggestion,
/// computed server-side with a fixed band. Informational passthrough;
/// the client never recomputes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceStatus {
    Underpriced,
    Overpriced,
    FairlyPriced,
}

impl Default for PriceStatus {
    fn default() -> Self {
        PriceStatus::FairlyPriced
    }
}

/// One price suggestion for a marketplace listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionRecord {
    /// Discogs listing identifier - unique key, stable across refresh.
    pub listing_id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub image_url: String,
    /// Structured condition text, e.g. "Media: Near Mint, Sleeve: Very Good Plus".
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub currency: String,
    pub current_price: f64,
    pub suggested_price: f64,
    #[serde(default)]
    pub status: PriceStatus,
    /// Position in the completion payload. Assigned once at ingestion,
    /// never mutated; used only as a sort tie-breaker.
    #[serde(default)]
    pub original_index: usize,
    /// Pre-apply price, stamped when an apply succeeds so the old and new
    /// prices can both be shown while the commit is still pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<f64>,
}

impl SuggestionRecord {
    /// Suggested minus current. Recomputed per call, never stored.
    pub fn price_delta(&self) -> f64 {
        self.suggested_price - self.current_price
    }
}

// ── Stream Frames ─────────────────────────────────────────────────────

/// One frame of the suggestion stream, decoded once at the boundary.
///
/// The wire format is newline-delimited `data: <json>` lines, each JSON
/// object carrying a `type` discriminator.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    /// First signal; `total` may be 0 while the server is still counting.
    Total { total: u64 },
    /// Progress counters. Display only, no effect on the store.
    Progress { current: u64, total: u64 },
    /// One suggestion, accumulated until the completion frame.
    Suggestion { suggestion: SuggestionRecord },
    /// Full result set; atomically replaces anything accumulated so far.
    Complete {
        #[serde(default)]
        suggestions: Vec<SuggestionRecord>,
    },
    /// Server-side failure, or a note that an equivalent analysis is
    /// already running (which is non-fatal).
    Error {
        #[serde(default)]
        message: String,
    },
    /// Informational status text.
    Status {
        #[serde(default)]
        message: String,
    },
}

// ── Apply Types ───────────────────────────────────────────────────────

/// Request body for POST /inventory/apply.
#[derive(Debug, Clone, Serialize)]
pub struct SingleApplyRequest {
    pub listing_id: u64,
    pub new_price: f64,
    pub client_request_id: String,
}

/// One listing/price pair in a bulk apply.
#[derive(Debug, Clone, Serialize)]
pub struct PriceUpdate {
    pub listing_id: u64,
    pub new_price: f64,
}

/// Request body for POST /inventory/apply/bulk.
#[derive(Debug, Clone, Serialize)]
pub struct BulkApplyRequest {
    pub updates: Vec<PriceUpdate>,
    pub client_request_id: String,
}

/// Response shared by the single and bulk apply endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplyResponse {
    #[serde(default)]
    pub successful_updates: u64,
    #[serde(default)]
    pub errors: u64,
    #[serde(default)]
    pub results: Vec<ApplyOutcome>,
}

/// Per-listing result within an apply response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplyOutcome {
    pub listing_id: u64,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

// ── Inventory / Dashboard Responses ───────────────────────────────────

/// Fallback non-streaming response from GET /inventory/suggestions.
#[derive(Debug, Clone, Deserialize)]
pub struct SuggestionsResponse {
    #[serde(default)]
    pub suggestions: Vec<SuggestionRecord>,
    #[serde(default)]
    pub reprice_results: Vec<ApplyOutcome>,
    #[serde(default)]
    pub total_items: u64,
}

/// Response from GET /inventory/count.
#[derive(Debug, Clone, Deserialize)]
pub struct CountResponse {
    #[serde(default)]
    pub total_for_sale: u64,
}

/// Run metadata from GET /dashboard/summary.
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryResponse {
    #[serde(default)]
    pub last_run_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_for_sale: u64,
    #[serde(default)]
    pub items_analyzed: u64,
}

// ── Auth Types ────────────────────────────────────────────────────────

/// Response from POST /auth/setup - opaque token-exchange bootstrap.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSetupResponse {
    pub authorize_url: String,
    #[serde(default)]
    pub request_token: String,
}

/// Request body for POST /auth/verify.
#[derive(Debug, Clone, Serialize)]
pub struct AuthVerifyRequest {
    pub request_token: String,
    pub verifier: String,
}

/// Response from POST /auth/verify.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthVerifyResponse {
    pub session_id: String,
    #[serde(default)]
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_frame(raw: &str) -> StreamFrame {
        serde_json::from_str(raw).expect("frame should parse")
    }

    #[test]
    fn test_frame_decoding_by_type_tag() {
        match parse_frame(r#"{"type":"total","total":42}"#) {
            StreamFrame::Total { total } => assert_eq!(total, 42),
            other => panic!("unexpected frame: {:?}", other),
        }

        match parse_frame(r#"{"type":"progress","current":3,"total":42}"#) {
            StreamFrame::Progress { current, total } => {
                assert_eq!(current, 3);
                assert_eq!(total, 42);
            }
            other => panic!("unexpected frame: {:?}", other),
        }

        match parse_frame(r#"{"type":"error","message":"boom"}"#) {
            StreamFrame::Error { message } => assert_eq!(message, "boom"),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_suggestion_frame_defaults() {
        let frame = parse_frame(
            r#"{"type":"suggestion","suggestion":{
                "listing_id":101,"current_price":10.0,"suggested_price":12.5,
                "status":"underpriced"}}"#,
        );
        match frame {
            StreamFrame::Suggestion { suggestion } => {
                assert_eq!(suggestion.listing_id, 101);
                assert_eq!(suggestion.status, PriceStatus::Underpriced);
                assert_eq!(suggestion.original_index, 0);
                assert!(suggestion.original_price.is_none());
                assert!(suggestion.title.is_empty());
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_price_delta() {
        let rec: SuggestionRecord = serde_json::from_str(
            r#"{"listing_id":1,"current_price":8.0,"suggested_price":10.0}"#,
        )
        .unwrap();
        assert!((rec.price_delta() - 2.0).abs() < f64::EPSILON);
    }
}
