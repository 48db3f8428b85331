//! waxvalue: Discogs repricer client.
//!
//! Single-binary Tokio application that:
//! 1. Links a Discogs seller account through the backend auth flow
//! 2. Streams per-listing price suggestions into the local store
//! 3. Projects the store through filters, sorting, and pagination
//! 4. Applies suggested prices individually or in bulk with the
//!    two-phase commit state machine

mod config;
mod journal;

use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{error, info, warn};

use common::config::AppConfig;
use common::{Error, PriceStatus, PriceUpdate};
use review::{
    ApplyCoordinator, DisplayPrefs, FilterCriteria, PriceRange, SortKey, StateStore,
    SuggestionStore, ViewState,
};
use waxvalue_client::{SuggestionStreamer, WaxValueRestClient};

use journal::{now_iso, resolve_state_dir, ApplyJournal};

/// Discogs repricer client
#[derive(Parser)]
#[command(name = "waxvalue", about = "Discogs repricer client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Link or unlink the Discogs seller account.
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Show run metadata and local progress state.
    Status,
    /// Count "For Sale" listings in the seller's inventory.
    Count,
    /// Run a price analysis and stream suggestions into the store.
    Sync,
    /// Fetch the latest suggestions and print the review table.
    Review {
        /// Sort column: price_delta or current_price.
        #[arg(long)]
        sort: Option<String>,
        /// Sort descending (default ascending).
        #[arg(long)]
        desc: bool,
        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Rows per page.
        #[arg(long)]
        page_size: Option<usize>,
        /// Keep only underpriced or overpriced rows.
        #[arg(long)]
        direction: Option<String>,
        /// Substring match against the condition text.
        #[arg(long)]
        condition: Option<String>,
        /// Inclusive lower bound on the current price.
        #[arg(long)]
        min_price: Option<f64>,
        /// Inclusive upper bound on the current price.
        #[arg(long)]
        max_price: Option<f64>,
        /// Keep only rows with a large relative price change.
        #[arg(long)]
        flagged: bool,
        /// Include rows below the minimum price-change threshold.
        #[arg(long)]
        show_fair: bool,
    },
    /// Apply suggested prices to the live marketplace.
    Apply {
        /// Listing ids. One id runs an individual apply; several run a
        /// single bulk apply.
        #[arg(required = true)]
        listing_ids: Vec<u64>,
        /// Nudge each suggested price by this many increments
        /// (negative allowed) before applying.
        #[arg(long, default_value_t = 0)]
        nudge: i32,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Begin the account link; prints the authorize URL to visit.
    Setup,
    /// Exchange the OAuth verifier for a session.
    Verify {
        #[arg(long)]
        token: String,
        #[arg(long)]
        verifier: String,
    },
    /// Unlink the account and drop the local session.
    Disconnect,
}

fn status_label(status: PriceStatus) -> &'static str {
    match status {
        PriceStatus::Underpriced => "under",
        PriceStatus::Overpriced => "over",
        PriceStatus::FairlyPriced => "fair",
    }
}

fn parse_sort_key(raw: &str) -> Result<SortKey, Error> {
    match raw {
        "price_delta" => Ok(SortKey::PriceDelta),
        "current_price" => Ok(SortKey::CurrentPrice),
        other => Err(Error::Config(format!(
            "unknown sort key '{}' (expected price_delta or current_price)",
            other
        ))),
    }
}

fn parse_direction(raw: &str) -> Result<PriceStatus, Error> {
    match raw {
        "underpriced" => Ok(PriceStatus::Underpriced),
        "overpriced" => Ok(PriceStatus::Overpriced),
        other => Err(Error::Config(format!(
            "unknown direction '{}' (expected underpriced or overpriced)",
            other
        ))),
    }
}

/// Session id for authenticated calls: config/env first, then the
/// persisted session from the auth flow.
fn resolve_session(cfg: &AppConfig, state: &StateStore) -> Result<String, Error> {
    if !cfg.session_id.trim().is_empty() {
        return Ok(cfg.session_id.trim().to_string());
    }
    if let Some(session) = state.session_id() {
        return Ok(session.to_string());
    }
    Err(Error::Config(
        "no session found - run `waxvalue auth setup` to link your Discogs account".into(),
    ))
}

/// HTTP 401 means the session is dead: drop it locally and tell the user
/// how to recover. The in-memory store is left as-is.
fn handle_unauthorized(state: &mut StateStore) {
    if let Err(e) = state.clear_session() {
        warn!("Failed to clear local session: {}", e);
    }
    error!("Session rejected by the server. Run `waxvalue auth setup` to reconnect.");
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let cut: String = text.chars().take(width.saturating_sub(1)).collect();
    format!("{}…", cut)
}

fn print_page(page: &review::Page<'_>, flagged_threshold: f64) {
    println!(
        "{:>10}  {:<32}  {:<10}  {:>9}  {:>9}  {:>8}  {:<6}",
        "listing", "title / artist", "condition", "current", "suggested", "delta", "status"
    );
    for record in &page.rows {
        let delta = record.price_delta();
        let relative = if record.current_price > 0.0 {
            delta.abs() / record.current_price
        } else {
            0.0
        };
        let flag = if relative >= flagged_threshold { " ⚑" } else { "" };
        let name = truncate(
            &format!("{} - {}", record.title, record.artist),
            32,
        );
        println!(
            "{:>10}  {:<32}  {:<10}  {:>9.2}  {:>9.2}  {:>+8.2}  {:<6}{}",
            record.listing_id,
            name,
            truncate(&record.condition, 10),
            record.current_price,
            record.suggested_price,
            delta,
            status_label(record.status),
            flag,
        );
    }
    println!(
        "page {}/{} - {} rows after filters",
        page.page,
        page.page_count.max(1),
        page.total_rows
    );
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waxvalue=info,waxvalue_client=info,review=info".into()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    // Load configuration.
    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let state_dir = resolve_state_dir(&cfg.state_dir);
    let mut state = match StateStore::open(&state_dir) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open state dir {}: {}", state_dir.display(), e);
            std::process::exit(1);
        }
    };

    let result = run_command(cli.command, &cfg, &mut state, &state_dir).await;

    match result {
        Ok(()) => {}
        Err(Error::Unauthorized) => {
            handle_unauthorized(&mut state);
            std::process::exit(1);
        }
        Err(e) if e.is_benign() => {}
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn run_command(
    command: Command,
    cfg: &AppConfig,
    state: &mut StateStore,
    state_dir: &std::path::Path,
) -> Result<(), Error> {
    match command {
        Command::Auth { action } => run_auth(action, cfg, state).await,
        Command::Status => run_status(cfg, state).await,
        Command::Count => {
            let client = authed_client(cfg, state)?;
            let total = client.get_count().await?;
            println!("{} listings for sale", total);
            Ok(())
        }
        Command::Sync => run_sync(cfg, state).await,
        Command::Review {
            sort,
            desc,
            page,
            page_size,
            direction,
            condition,
            min_price,
            max_price,
            flagged,
            show_fair,
        } => {
            let view = build_view(
                cfg, sort, desc, page, page_size, direction, condition, min_price, max_price,
                flagged, show_fair,
            )?;
            run_review(cfg, state, view).await
        }
        Command::Apply { listing_ids, nudge } => {
            run_apply(cfg, state, state_dir, listing_ids, nudge).await
        }
    }
}

fn authed_client(cfg: &AppConfig, state: &StateStore) -> Result<WaxValueRestClient, Error> {
    let session = resolve_session(cfg, state)?;
    Ok(WaxValueRestClient::new(
        &cfg.api_base_url,
        &session,
        cfg.polling.request_timeout_secs,
    ))
}

// ── Auth ──────────────────────────────────────────────────────────────

async fn run_auth(action: AuthAction, cfg: &AppConfig, state: &mut StateStore) -> Result<(), Error> {
    match action {
        AuthAction::Setup => {
            let client =
                WaxValueRestClient::new(&cfg.api_base_url, "", cfg.polling.request_timeout_secs);
            let setup = client.auth_setup().await?;
            println!("Visit to authorize Discogs access:");
            println!("  {}", setup.authorize_url);
            println!();
            println!("Then finish with:");
            println!(
                "  waxvalue auth verify --token {} --verifier <code>",
                setup.request_token
            );
            Ok(())
        }
        AuthAction::Verify { token, verifier } => {
            let client =
                WaxValueRestClient::new(&cfg.api_base_url, "", cfg.polling.request_timeout_secs);
            let verified = client.auth_verify(&token, &verifier).await?;
            state.set_session_id(&verified.session_id)?;
            if verified.username.is_empty() {
                println!("Account linked.");
            } else {
                println!("Account linked as {}.", verified.username);
            }
            Ok(())
        }
        AuthAction::Disconnect => {
            let client = authed_client(cfg, state)?;
            client.auth_disconnect().await?;
            state.clear_session()?;
            println!("Account unlinked and local session cleared.");
            Ok(())
        }
    }
}

// ── Status ────────────────────────────────────────────────────────────

async fn run_status(cfg: &AppConfig, state: &StateStore) -> Result<(), Error> {
    let snapshot = state.state().clone();

    if snapshot.progress.is_running {
        println!(
            "analysis running: {}/{} listings (started {})",
            snapshot.progress.current,
            snapshot.progress.total,
            snapshot
                .progress
                .started_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".into())
        );
    } else if snapshot.has_data {
        println!("analysis complete - results available (waxvalue review)");
    } else {
        println!("no analysis yet (waxvalue sync)");
    }

    let client = authed_client(cfg, state)?;
    let summary = client.get_summary().await?;
    match summary.last_run_date {
        Some(ts) => println!("last server run: {}", ts.to_rfc3339()),
        None => println!("last server run: never"),
    }
    println!(
        "inventory: {} for sale, {} analyzed",
        summary.total_for_sale, summary.items_analyzed
    );

    Ok(())
}

// ── Sync ──────────────────────────────────────────────────────────────

async fn run_sync(cfg: &AppConfig, state: &mut StateStore) -> Result<(), Error> {
    let client = authed_client(cfg, state)?;

    if state.state().progress.is_running {
        info!("A previous run was still marked in progress; resuming");
    }

    state.begin_run(0)?;

    let streamer = SuggestionStreamer::new(client, cfg.polling.clone());
    let outcome = tokio::select! {
        res = streamer.run(|current, total| {
            if let Err(e) = state.update_progress(current, total) {
                warn!("Failed to persist progress snapshot: {}", e);
            }
        }) => res,
        _ = tokio::signal::ctrl_c() => Err(Error::Aborted),
    };

    let suggestions = match outcome {
        Ok(s) => s,
        Err(Error::Aborted) => {
            info!("Ingestion cancelled; any server-side run continues");
            state.abort_run()?;
            return Err(Error::Aborted);
        }
        Err(Error::AnalysisRunning(msg)) => {
            // Server-side run outlived the retry budget. Keep the running
            // flag so the next invocation resumes the progress view.
            println!("analysis still running server-side: {}", msg);
            println!("try again shortly, or `waxvalue review` for partial results");
            return Ok(());
        }
        Err(e) => {
            state.abort_run()?;
            return Err(e);
        }
    };

    let mut store = SuggestionStore::new();
    let kept = store.replace_all(suggestions);
    state.finish_run()?;

    let mut under = 0usize;
    let mut over = 0usize;
    let mut fair = 0usize;
    for record in store.records() {
        match record.status {
            PriceStatus::Underpriced => under += 1,
            PriceStatus::Overpriced => over += 1,
            PriceStatus::FairlyPriced => fair += 1,
        }
    }

    println!(
        "analysis complete: {} suggestions ({} underpriced, {} overpriced, {} fair)",
        kept, under, over, fair
    );
    println!("run `waxvalue review` to inspect them");
    Ok(())
}

// ── Review ────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn build_view(
    cfg: &AppConfig,
    sort: Option<String>,
    desc: bool,
    page: usize,
    page_size: Option<usize>,
    direction: Option<String>,
    condition: Option<String>,
    min_price: Option<f64>,
    max_price: Option<f64>,
    flagged: bool,
    show_fair: bool,
) -> Result<ViewState, Error> {
    let price_range = match (min_price, max_price) {
        (None, None) => None,
        (min, max) => Some(PriceRange {
            min: min.unwrap_or(0.0),
            max: max.unwrap_or(f64::MAX),
        }),
    };

    let criteria = FilterCriteria {
        show_fairly_priced: show_fair || cfg.display.show_fairly_priced,
        min_price_change_threshold: cfg.display.min_price_change_threshold,
        price_direction: direction.as_deref().map(parse_direction).transpose()?,
        condition,
        price_range,
        show_flagged_only: flagged,
        flagged_threshold: cfg.display.flagged_threshold_pct,
    };

    let sort_key = parse_sort_key(sort.as_deref().unwrap_or(&cfg.display.default_sort))?;

    let size = page_size.unwrap_or(cfg.display.items_per_page);
    if !cfg.display.page_size_choices.contains(&size) {
        return Err(Error::Config(format!(
            "page size {} not in the allowed set {:?}",
            size, cfg.display.page_size_choices
        )));
    }

    let mut view = ViewState::new(criteria, sort_key, size);
    if desc {
        view.select_sort(sort_key); // toggles ascending → descending
    }
    view.set_page(page);
    Ok(view)
}

async fn run_review(cfg: &AppConfig, state: &mut StateStore, view: ViewState) -> Result<(), Error> {
    let client = authed_client(cfg, state)?;
    let response = client.get_suggestions().await?;

    let mut store = SuggestionStore::new();
    store.replace_all(response.suggestions);

    if store.is_empty() {
        println!("no suggestions available - run `waxvalue sync` first");
        return Ok(());
    }

    let page = view.project(&store);
    print_page(&page, cfg.display.flagged_threshold_pct);

    // Remember the last-used view settings across restarts.
    state.set_prefs(DisplayPrefs {
        items_per_page: view.page_size,
        default_sort: match view.sort_key {
            SortKey::PriceDelta => "price_delta",
            SortKey::CurrentPrice => "current_price",
        }
        .to_string(),
        show_fairly_priced: view.criteria.show_fairly_priced,
    })?;
    Ok(())
}

// ── Apply ─────────────────────────────────────────────────────────────

async fn run_apply(
    cfg: &AppConfig,
    state: &mut StateStore,
    state_dir: &std::path::Path,
    listing_ids: Vec<u64>,
    nudge: i32,
) -> Result<(), Error> {
    let client = authed_client(cfg, state)?;
    let response = client.get_suggestions().await?;

    let mut store = SuggestionStore::new();
    store.replace_all(response.suggestions);

    for &listing_id in &listing_ids {
        if store.get(listing_id).is_none() {
            return Err(Error::Other(format!(
                "listing {} has no suggestion in the current run",
                listing_id
            )));
        }
    }

    if nudge != 0 {
        let delta = f64::from(nudge) * cfg.apply.nudge_increment;
        for &listing_id in &listing_ids {
            let nudged = store.nudge_suggested(listing_id, delta)?;
            info!("Nudged listing {} suggestion to {:.2}", listing_id, nudged);
        }
    }

    let mut journal = ApplyJournal::open(state_dir.join("journal"))?;
    info!("Apply journal path: {}", journal.dir().display());

    let mut coord = ApplyCoordinator::new(Duration::from_millis(cfg.apply.commit_delay_ms));

    if listing_ids.len() == 1 {
        apply_individual(&client, &mut store, &mut coord, &mut journal, listing_ids[0]).await?;
    } else {
        apply_bulk(&client, &mut store, &mut coord, &mut journal, &listing_ids).await?;
    }

    // Drive the delayed commit so the final prices land before exit.
    while let Some(deadline) = coord.next_deadline() {
        tokio::time::sleep(deadline.saturating_duration_since(Instant::now())).await;
        for listing_id in coord.flush_due(&mut store, Instant::now()) {
            if let Some(record) = store.get(listing_id) {
                println!(
                    "listing {}: {} -> {:.2} committed",
                    listing_id,
                    record
                        .original_price
                        .map(|p| format!("{:.2}", p))
                        .unwrap_or_else(|| "?".into()),
                    record.current_price
                );
            }
        }
    }

    Ok(())
}

async fn apply_individual(
    client: &WaxValueRestClient,
    store: &mut SuggestionStore,
    coord: &mut ApplyCoordinator,
    journal: &mut ApplyJournal,
    listing_id: u64,
) -> Result<(), Error> {
    coord.begin(listing_id)?;

    let (old_price, new_price) = match store.get(listing_id) {
        Some(record) => (record.current_price, record.suggested_price),
        None => {
            coord.fail(listing_id);
            return Err(Error::Other(format!(
                "listing {} has no suggestion in the current run",
                listing_id
            )));
        }
    };

    match client.apply_price(listing_id, new_price).await {
        Ok(resp) => {
            let item_error = resp
                .results
                .iter()
                .find(|r| r.listing_id == listing_id && !r.success)
                .and_then(|r| r.error.clone());

            if resp.successful_updates >= 1 && item_error.is_none() {
                coord.succeed(store, listing_id, Instant::now());
                println!(
                    "listing {}: applied {:.2} (was {:.2}), committing shortly",
                    listing_id, new_price, old_price
                );
                journal.write_event(json!({
                    "ts": now_iso(),
                    "kind": "price_applied",
                    "listing_id": listing_id,
                    "old_price": old_price,
                    "new_price": new_price,
                }));
            } else {
                coord.fail(listing_id);
                let message = item_error.unwrap_or_else(|| "apply failed".to_string());
                error!("Apply failed for listing {}: {}", listing_id, message);
                journal.write_event(json!({
                    "ts": now_iso(),
                    "kind": "price_apply_failed",
                    "listing_id": listing_id,
                    "error": message,
                }));
            }
            Ok(())
        }
        Err(e) => {
            coord.fail(listing_id);
            Err(e)
        }
    }
}

async fn apply_bulk(
    client: &WaxValueRestClient,
    store: &mut SuggestionStore,
    coord: &mut ApplyCoordinator,
    journal: &mut ApplyJournal,
    listing_ids: &[u64],
) -> Result<(), Error> {
    for &listing_id in listing_ids {
        coord.select(listing_id);
    }
    let batch = coord.begin_bulk()?;

    let mut updates = Vec::with_capacity(batch.len());
    let mut old_prices = Vec::with_capacity(batch.len());
    for &listing_id in &batch {
        if let Some(record) = store.get(listing_id) {
            updates.push(PriceUpdate {
                listing_id,
                new_price: record.suggested_price,
            });
            old_prices.push((listing_id, record.current_price, record.suggested_price));
        }
    }

    let resp = match client.apply_prices(updates).await {
        Ok(resp) => resp,
        Err(e) => {
            for &listing_id in &batch {
                coord.fail(listing_id);
            }
            return Err(e);
        }
    };

    let failures = coord.settle_bulk(store, &batch, &resp.results, Instant::now());

    println!(
        "bulk apply: {} succeeded, {} failed",
        resp.successful_updates, resp.errors
    );
    for (listing_id, message) in &failures {
        error!("Apply failed for listing {}: {}", listing_id, message);
    }

    for (listing_id, old_price, new_price) in old_prices {
        if coord.is_applied(listing_id) {
            journal.write_event(json!({
                "ts": now_iso(),
                "kind": "price_applied",
                "listing_id": listing_id,
                "old_price": old_price,
                "new_price": new_price,
                "bulk": true,
            }));
        }
    }

    Ok(())
}
