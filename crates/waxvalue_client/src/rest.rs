//! REST client for the waxvalue backend API.
//!
//! Covers: inventory queries, price applies (single and bulk), and the
//! opaque Discogs auth token-exchange endpoints. All methods are
//! rate-limited; write calls carry a client request id for idempotency.

use common::types::{
    AuthSetupResponse, AuthVerifyRequest, AuthVerifyResponse, BulkApplyRequest, CountResponse,
    PriceUpdate, SingleApplyRequest, SuggestionsResponse, SummaryResponse,
};
use common::{ApplyResponse, Error};
use tracing::debug;
use uuid::Uuid;

use crate::rate_limit::RateLimiter;

/// Async REST client for the waxvalue backend.
#[derive(Debug, Clone)]
pub struct WaxValueRestClient {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
    limiter: RateLimiter,
}

impl WaxValueRestClient {
    /// Create a new REST client.
    ///
    /// * `session_id` - backend session from the auth flow; may be empty
    ///   for the pre-auth endpoints.
    pub fn new(base_url: &str, session_id: &str, request_timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .timeout(std::time::Duration::from_secs(request_timeout_secs))
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: session_id.to_string(),
            limiter: RateLimiter::new(),
        }
    }

    /// URL helper.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-success status to the unified error taxonomy.
    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = resp.status().as_u16();
        match status {
            200 | 201 => Ok(resp),
            401 => Err(Error::Unauthorized),
            429 => Err(Error::RateLimited {
                retry_after_ms: 1000,
            }),
            _ => {
                let body = resp.text().await.unwrap_or_default();
                Err(Error::Api {
                    status,
                    message: body,
                })
            }
        }
    }

    // ── Read endpoints ────────────────────────────────────────────────

    /// Number of "For Sale" listings in the seller's inventory.
    pub async fn get_count(&self) -> Result<u64, Error> {
        self.limiter.wait_read().await;

        let resp = self
            .client
            .get(self.url("/inventory/count"))
            .query(&[("session_id", self.session_id.as_str())])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let body: CountResponse = Self::check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(body.total_for_sale)
    }

    /// Run metadata for the dashboard, including the last run date.
    pub async fn get_summary(&self) -> Result<SummaryResponse, Error> {
        self.limiter.wait_read().await;

        let resp = self
            .client
            .get(self.url("/dashboard/summary"))
            .query(&[("session_id", self.session_id.as_str())])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        Self::check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))
    }

    /// Fallback non-streaming fetch of the full suggestion set. Also used
    /// as the best-effort partial fetch while an analysis is still running
    /// server-side.
    pub async fn get_suggestions(&self) -> Result<SuggestionsResponse, Error> {
        self.limiter.wait_read().await;

        let resp = self
            .client
            .get(self.url("/inventory/suggestions"))
            .query(&[("session_id", self.session_id.as_str())])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let body: SuggestionsResponse = Self::check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        debug!(
            "Fetched {} suggestions (total_items={})",
            body.suggestions.len(),
            body.total_items
        );

        Ok(body)
    }

    /// Open the streaming suggestions response. The body is consumed by
    /// the ingestion adapter in [`crate::stream`].
    pub(crate) async fn open_stream(&self) -> Result<reqwest::Response, Error> {
        self.limiter.wait_read().await;

        // No overall timeout here: the stream stays open for the whole
        // analysis run.
        let resp = self
            .client
            .get(self.url("/inventory/suggestions/stream"))
            .query(&[("session_id", self.session_id.as_str())])
            .timeout(std::time::Duration::from_secs(15 * 60))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        Self::check_status(resp).await
    }

    // ── Write endpoints ───────────────────────────────────────────────

    /// Push one suggested price to the marketplace as the listing's new
    /// live price.
    pub async fn apply_price(&self, listing_id: u64, new_price: f64) -> Result<ApplyResponse, Error> {
        self.limiter.wait_write().await;

        let body = SingleApplyRequest {
            listing_id,
            new_price,
            client_request_id: Uuid::new_v4().to_string(),
        };

        debug!("Applying price: listing={} new_price={:.2}", listing_id, new_price);

        let resp = self
            .client
            .post(self.url("/inventory/apply"))
            .query(&[("session_id", self.session_id.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        Self::check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))
    }

    /// Apply a batch of price updates in one call. The response reports
    /// per-listing outcomes; partial failure is expected.
    pub async fn apply_prices(&self, updates: Vec<PriceUpdate>) -> Result<ApplyResponse, Error> {
        self.limiter.wait_write().await;

        let count = updates.len();
        let body = BulkApplyRequest {
            updates,
            client_request_id: Uuid::new_v4().to_string(),
        };

        debug!("Applying {} prices in bulk", count);

        let resp = self
            .client
            .post(self.url("/inventory/apply/bulk"))
            .query(&[("session_id", self.session_id.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        Self::check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))
    }

    // ── Auth endpoints ────────────────────────────────────────────────

    /// Begin the Discogs account link. Returns the authorize URL the user
    /// must visit plus the request token for the verify step.
    pub async fn auth_setup(&self) -> Result<AuthSetupResponse, Error> {
        self.limiter.wait_write().await;

        let resp = self
            .client
            .post(self.url("/auth/setup"))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        Self::check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))
    }

    /// Exchange the OAuth verifier for a backend session.
    pub async fn auth_verify(
        &self,
        request_token: &str,
        verifier: &str,
    ) -> Result<AuthVerifyResponse, Error> {
        self.limiter.wait_write().await;

        let body = AuthVerifyRequest {
            request_token: request_token.to_string(),
            verifier: verifier.to_string(),
        };

        let resp = self
            .client
            .post(self.url("/auth/verify"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        Self::check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))
    }

    /// Unlink the Discogs account and invalidate the session.
    pub async fn auth_disconnect(&self) -> Result<(), Error> {
        self.limiter.wait_write().await;

        let resp = self
            .client
            .post(self.url("/auth/disconnect"))
            .query(&[("session_id", self.session_id.as_str())])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        Self::check_status(resp).await?;
        debug!("Session disconnected");
        Ok(())
    }
}
