//! Client configuration types.

use serde::{Deserialize, Serialize};

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the waxvalue backend API.
    #[serde(default = "default_base_url")]
    pub api_base_url: String,

    /// Backend session identifier obtained via the auth flow. May be empty
    /// until `auth verify` has run; the persisted session is used then.
    #[serde(default)]
    pub session_id: String,

    /// Directory for durable client state (progress snapshot, settings,
    /// apply journal). Empty means resolve relative to the repo root.
    #[serde(default)]
    pub state_dir: String,

    /// Review table display parameters.
    #[serde(default)]
    pub display: DisplayConfig,

    /// Apply-transaction parameters.
    #[serde(default)]
    pub apply: ApplyConfig,

    /// Stream re-poll parameters.
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Filter/sort/pagination defaults for the review table.
///
/// The fair-price band and the flagged threshold live here as the single
/// source of truth; nothing else in the client hard-codes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Page size for the review table.
    #[serde(default = "default_items_per_page")]
    pub items_per_page: usize,

    /// Allowed page sizes.
    #[serde(default = "default_page_size_choices")]
    pub page_size_choices: Vec<usize>,

    /// Default sort column: "price_delta" or "current_price".
    #[serde(default = "default_sort")]
    pub default_sort: String,

    /// Minimum absolute price change for a row to count as actionable
    /// when fairly-priced rows are hidden.
    #[serde(default = "default_min_price_change")]
    pub min_price_change_threshold: f64,

    /// Include rows whose price change is below the threshold.
    #[serde(default)]
    pub show_fairly_priced: bool,

    /// Band around the suggested price inside which the backend classifies
    /// a listing as fairly priced. Status arrives precomputed on the wire
    /// and is never recomputed locally; this mirrors the server-side value
    /// for operator reference and is only validated, never read.
    #[serde(default = "default_fair_band")]
    pub fair_band_pct: f64,

    /// Relative price change at or above which a row is flagged.
    #[serde(default = "default_flagged_threshold")]
    pub flagged_threshold_pct: f64,
}

/// Apply-transaction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyConfig {
    /// Delay between a successful apply and the price commit, so the
    /// success state is visible before the row re-sorts.
    #[serde(default = "default_commit_delay")]
    pub commit_delay_ms: u64,

    /// Fixed increment for manual suggested-price nudges.
    #[serde(default = "default_nudge")]
    pub nudge_increment: f64,
}

/// Bounded re-poll policy for a stream that ends without completing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Max stream attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff between attempts, doubled each retry.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: u64,

    /// Backoff ceiling.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Per-request timeout for non-streaming calls.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://api.waxvalue.com".to_string()
}

fn default_items_per_page() -> usize {
    25
}
fn default_page_size_choices() -> Vec<usize> {
    vec![10, 25, 50, 100]
}
fn default_sort() -> String {
    "price_delta".to_string()
}
fn default_min_price_change() -> f64 {
    1.0
}
fn default_fair_band() -> f64 {
    0.10
}
fn default_flagged_threshold() -> f64 {
    0.25
}

fn default_commit_delay() -> u64 {
    2000
}
fn default_nudge() -> f64 {
    0.25
}

fn default_max_attempts() -> u32 {
    30
}
fn default_initial_backoff() -> u64 {
    2
}
fn default_max_backoff() -> u64 {
    60
}
fn default_request_timeout() -> u64 {
    30
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            items_per_page: default_items_per_page(),
            page_size_choices: default_page_size_choices(),
            default_sort: default_sort(),
            min_price_change_threshold: default_min_price_change(),
            show_fairly_priced: false,
            fair_band_pct: default_fair_band(),
            flagged_threshold_pct: default_flagged_threshold(),
        }
    }
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            commit_delay_ms: default_commit_delay(),
            nudge_increment: default_nudge(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_secs: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_base_url(),
            session_id: String::new(),
            state_dir: String::new(),
            display: DisplayConfig::default(),
            apply: ApplyConfig::default(),
            polling: PollingConfig::default(),
        }
    }
}
