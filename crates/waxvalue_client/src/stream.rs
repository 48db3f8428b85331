//! Streaming ingestion adapter for the suggestion feed.
//!
//! Consumes the newline-delimited `data: <json>` body of
//! `GET /inventory/suggestions/stream`, reassembling frames across chunk
//! boundaries and retrying with bounded backoff when the stream ends
//! before a completion frame arrives.

use std::time::Duration;

use common::config::PollingConfig;
use common::{Error, StreamFrame, SuggestionRecord};
use futures_util::StreamExt;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::rest::WaxValueRestClient;

/// Outcome of one streaming attempt.
#[derive(Debug)]
pub enum StreamReport {
    /// The completion frame arrived with the full suggestion set.
    Complete(Vec<SuggestionRecord>),
    /// The server reported an equivalent analysis already running.
    /// Non-fatal; the caller keeps the loading state and polls again.
    AlreadyRunning(String),
    /// End of stream with no completion frame.
    Unfinished,
}

/// Whether a server error message means an equivalent analysis is already
/// running, which is informational rather than a failure.
pub fn is_conflict_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains("already running") || lowered.contains("already in progress")
}

// ── Frame reassembly ──────────────────────────────────────────────────

/// Reassembles `data: <json>` lines from arbitrary byte chunks.
///
/// A partial trailing line is buffered until its newline arrives. A line
/// that fails to parse is logged and skipped; a single bad frame never
/// aborts the stream.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every complete frame it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(frame) = Self::parse_line(&line[..line.len() - 1]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing line that arrived without a final newline.
    pub fn finish(&mut self) -> Option<StreamFrame> {
        let line = std::mem::take(&mut self.buf);
        if line.is_empty() {
            return None;
        }
        Self::parse_line(&line)
    }

    fn parse_line(line: &[u8]) -> Option<StreamFrame> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches('\r').trim();
        if text.is_empty() {
            return None;
        }

        // Lines without the data prefix are keepalives/comments.
        let Some(payload) = text.strip_prefix("data:") else {
            debug!("Skipping non-data stream line: {}", clip(text, 80));
            return None;
        };

        match serde_json::from_str::<StreamFrame>(payload.trim_start()) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(
                    "Skipping malformed stream frame: {} - raw: {}",
                    e,
                    clip(payload, 200)
                );
                None
            }
        }
    }
}

/// Clip log output to at most `max` bytes without splitting a multibyte
/// character; slicing at an arbitrary byte index panics mid-char.
fn clip(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ── Streamer ──────────────────────────────────────────────────────────

/// One attempt at producing a [`StreamReport`]. The retry loop is written
/// against this seam rather than a live HTTP stream.
trait StreamSource {
    async fn attempt(
        &mut self,
        on_progress: &mut dyn FnMut(u64, u64),
    ) -> Result<StreamReport, Error>;
}

struct RestSource<'a> {
    rest: &'a WaxValueRestClient,
}

impl StreamSource for RestSource<'_> {
    async fn attempt(
        &mut self,
        on_progress: &mut dyn FnMut(u64, u64),
    ) -> Result<StreamReport, Error> {
        let resp = self.rest.open_stream().await?;
        let mut body = resp.bytes_stream();

        let mut buffer = FrameBuffer::new();
        let mut accumulated: Vec<SuggestionRecord> = Vec::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::Http(e.to_string()))?;
            for frame in buffer.push(&chunk) {
                if let Some(report) = handle_frame(frame, &mut accumulated, on_progress)? {
                    return Ok(report);
                }
            }
        }

        if let Some(frame) = buffer.finish() {
            if let Some(report) = handle_frame(frame, &mut accumulated, on_progress)? {
                return Ok(report);
            }
        }

        debug!(
            "Stream closed with {} accumulated suggestions and no completion",
            accumulated.len()
        );
        Ok(StreamReport::Unfinished)
    }
}

fn handle_frame(
    frame: StreamFrame,
    accumulated: &mut Vec<SuggestionRecord>,
    on_progress: &mut dyn FnMut(u64, u64),
) -> Result<Option<StreamReport>, Error> {
    match frame {
        StreamFrame::Total { total } => {
            on_progress(0, total);
        }
        StreamFrame::Progress { current, total } => {
            on_progress(current, total);
        }
        StreamFrame::Suggestion { suggestion } => {
            // Not yet visible to the caller; the completion frame is
            // the authoritative set.
            accumulated.push(suggestion);
        }
        StreamFrame::Complete { suggestions } => {
            return Ok(Some(StreamReport::Complete(suggestions)));
        }
        StreamFrame::Error { message } => {
            if is_conflict_message(&message) {
                return Ok(Some(StreamReport::AlreadyRunning(message)));
            }
            return Err(Error::Stream(message));
        }
        StreamFrame::Status { message } => {
            debug!("Stream status: {}", message);
        }
    }
    Ok(None)
}

/// Drives the suggestion stream to completion, re-polling with doubling
/// backoff (bounded by `polling.max_attempts`) when a stream ends early
/// or the server reports an analysis already in flight.
pub struct SuggestionStreamer {
    rest: WaxValueRestClient,
    polling: PollingConfig,
}

impl SuggestionStreamer {
    pub fn new(rest: WaxValueRestClient, polling: PollingConfig) -> Self {
        Self { rest, polling }
    }

    /// Run ingestion until the completion frame arrives or the retry
    /// budget is spent. `on_progress` receives `(current, total)` for
    /// every counter frame.
    pub async fn run<F>(&self, mut on_progress: F) -> Result<Vec<SuggestionRecord>, Error>
    where
        F: FnMut(u64, u64),
    {
        let mut source = RestSource { rest: &self.rest };
        drive(&mut source, &self.polling, &mut on_progress).await
    }
}

/// The bounded retry loop. A transport hiccup or an incomplete stream
/// burns one attempt and sleeps the current backoff; the final attempt
/// reports its outcome without sleeping first.
async fn drive<S: StreamSource>(
    source: &mut S,
    polling: &PollingConfig,
    on_progress: &mut dyn FnMut(u64, u64),
) -> Result<Vec<SuggestionRecord>, Error> {
    let mut backoff = Duration::from_secs(polling.initial_backoff_secs.max(1));
    let mut last_conflict: Option<String> = None;

    for attempt in 1..=polling.max_attempts {
        match source.attempt(on_progress).await {
            Ok(StreamReport::Complete(suggestions)) => {
                info!(
                    "Stream complete: {} suggestions (attempt {})",
                    suggestions.len(),
                    attempt
                );
                return Ok(suggestions);
            }
            Ok(StreamReport::AlreadyRunning(msg)) => {
                info!("Analysis already running server-side: {}", msg);
                last_conflict = Some(msg);
            }
            Ok(StreamReport::Unfinished) => {
                warn!(
                    "Stream ended without completion frame (attempt {}/{})",
                    attempt, polling.max_attempts
                );
            }
            // Transport hiccups are retryable; everything else aborts.
            Err(Error::Http(e)) => {
                warn!("Stream transport error: {} (attempt {})", e, attempt);
            }
            Err(e) => return Err(e),
        }

        if attempt == polling.max_attempts {
            break;
        }
        sleep(backoff).await;
        backoff = (backoff * 2).min(Duration::from_secs(polling.max_backoff_secs));
    }

    // A conflict on the last attempt means the server-side run is
    // still going; report that rather than a generic stream failure.
    if let Some(msg) = last_conflict {
        return Err(Error::AnalysisRunning(msg));
    }
    Err(Error::Stream(format!(
        "analysis did not complete after {} attempts",
        polling.max_attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn frames_from(buffer: &mut FrameBuffer, chunks: &[&str]) -> Vec<StreamFrame> {
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(buffer.push(chunk.as_bytes()));
        }
        out.extend(buffer.finish());
        out
    }

    #[test]
    fn test_partial_frames_buffered_across_chunks() {
        let mut buffer = FrameBuffer::new();
        let frames = frames_from(
            &mut buffer,
            &["data: {\"type\":\"tot", "al\",\"total\":3}\n"],
        );
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], StreamFrame::Total { total: 3 }));
    }

    #[test]
    fn test_malformed_line_skipped_without_aborting() {
        let mut buffer = FrameBuffer::new();
        let frames = frames_from(
            &mut buffer,
            &[
                "data: {not json}\n",
                "data: {\"type\":\"progress\",\"current\":1,\"total\":3}\n",
            ],
        );
        assert_eq!(frames.len(), 1);
        assert!(matches!(
            frames[0],
            StreamFrame::Progress { current: 1, total: 3 }
        ));
    }

    #[test]
    fn test_malformed_multibyte_line_clipped_on_char_boundary() {
        // The raw-payload clip in the warn path must not split a multibyte
        // character even when the byte limit lands inside one.
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .finish(),
        );

        let mut buffer = FrameBuffer::new();
        // Payload is one space, 194 ASCII bytes, then two-byte chars, so
        // byte 200 lands inside an 'é'.
        let bad_data = format!("data: {}{}\n", "x".repeat(194), "é".repeat(8));
        let bad_comment = format!(": {}{}\n", "x".repeat(77), "é".repeat(4));
        let frames = frames_from(
            &mut buffer,
            &[
                bad_data.as_str(),
                bad_comment.as_str(),
                "data: {\"type\":\"total\",\"total\":1}\n",
            ],
        );

        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], StreamFrame::Total { total: 1 }));
    }

    #[test]
    fn test_clip_respects_char_boundaries() {
        let text = format!("{}{}", "a".repeat(199), "é".repeat(4));
        let clipped = clip(&text, 200);
        // Byte 200 falls inside the first 'é'; the clip backs off to 199.
        assert_eq!(clipped.len(), 199);
        assert!(clipped.chars().all(|c| c == 'a'));
        assert_eq!(clip("short", 200), "short");
    }

    #[test]
    fn test_keepalive_and_blank_lines_ignored() {
        let mut buffer = FrameBuffer::new();
        let frames = frames_from(
            &mut buffer,
            &["\n", ": keepalive\n", "\r\n", "data: {\"type\":\"total\",\"total\":0}\n"],
        );
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_trailing_frame_without_newline() {
        let mut buffer = FrameBuffer::new();
        assert!(buffer.push(b"data: {\"type\":\"status\",\"message\":\"counting\"}").is_empty());
        let frame = buffer.finish().expect("trailing line should parse");
        assert!(matches!(frame, StreamFrame::Status { .. }));
    }

    #[test]
    fn test_full_delivery_sequence() {
        let mut buffer = FrameBuffer::new();
        let raw = concat!(
            "data: {\"type\":\"total\",\"total\":3}\n",
            "data: {\"type\":\"suggestion\",\"suggestion\":{\"listing_id\":1,\"current_price\":5.0,\"suggested_price\":7.0}}\n",
            "data: {\"type\":\"suggestion\",\"suggestion\":{\"listing_id\":2,\"current_price\":9.0,\"suggested_price\":8.0}}\n",
            "data: {\"type\":\"suggestion\",\"suggestion\":{\"listing_id\":3,\"current_price\":4.0,\"suggested_price\":4.5}}\n",
            "data: {\"type\":\"complete\",\"suggestions\":[",
            "{\"listing_id\":1,\"current_price\":5.0,\"suggested_price\":7.0},",
            "{\"listing_id\":2,\"current_price\":9.0,\"suggested_price\":8.0},",
            "{\"listing_id\":3,\"current_price\":4.0,\"suggested_price\":4.5}]}\n",
        );
        let frames = frames_from(&mut buffer, &[raw]);
        assert_eq!(frames.len(), 5);

        match frames.last().unwrap() {
            StreamFrame::Complete { suggestions } => {
                assert_eq!(suggestions.len(), 3);
                let ids: Vec<u64> = suggestions.iter().map(|s| s.listing_id).collect();
                assert_eq!(ids, vec![1, 2, 3]);
            }
            other => panic!("expected completion frame, got {:?}", other),
        }
    }

    #[test]
    fn test_conflict_message_detection() {
        assert!(is_conflict_message("An analysis is already running for this account"));
        assert!(is_conflict_message("reprice already in progress"));
        assert!(!is_conflict_message("rate limited"));
        assert!(!is_conflict_message("internal server error"));
    }

    // ── Retry loop ────────────────────────────────────────────────────

    struct ScriptedSource {
        script: VecDeque<Result<StreamReport, Error>>,
        attempts: u32,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<StreamReport, Error>>) -> Self {
            Self {
                script: script.into(),
                attempts: 0,
            }
        }
    }

    impl StreamSource for ScriptedSource {
        async fn attempt(
            &mut self,
            _on_progress: &mut dyn FnMut(u64, u64),
        ) -> Result<StreamReport, Error> {
            self.attempts += 1;
            self.script
                .pop_front()
                .unwrap_or(Ok(StreamReport::Unfinished))
        }
    }

    fn polling(max_attempts: u32) -> PollingConfig {
        PollingConfig {
            max_attempts,
            initial_backoff_secs: 2,
            max_backoff_secs: 60,
            request_timeout_secs: 5,
        }
    }

    fn record(listing_id: u64) -> SuggestionRecord {
        serde_json::from_value(serde_json::json!({
            "listing_id": listing_id,
            "current_price": 5.0,
            "suggested_price": 7.0,
        }))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_after_unfinished_and_transport_errors() {
        let mut source = ScriptedSource::new(vec![
            Ok(StreamReport::Unfinished),
            Err(Error::Http("connection reset".into())),
            Ok(StreamReport::Complete(vec![record(1)])),
        ]);
        let start = tokio::time::Instant::now();

        let result = drive(&mut source, &polling(5), &mut |_: u64, _: u64| {})
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(source.attempts, 3);
        // Backoff doubles between attempts: 2s then 4s.
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_with_conflict_reports_analysis_running() {
        let conflict = || Ok(StreamReport::AlreadyRunning("analysis already running".into()));
        let mut source = ScriptedSource::new(vec![conflict(), conflict(), conflict()]);
        let start = tokio::time::Instant::now();

        let err = drive(&mut source, &polling(3), &mut |_: u64, _: u64| {})
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AnalysisRunning(_)));
        assert_eq!(source.attempts, 3);
        // No sleep after the final attempt: only the 2s and 4s backoffs.
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_without_conflict_is_stream_error() {
        let mut source = ScriptedSource::new(vec![]);

        let err = drive(&mut source, &polling(2), &mut |_: u64, _: u64| {})
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Stream(_)));
        assert_eq!(source.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_aborts_without_retry() {
        let mut source = ScriptedSource::new(vec![
            Err(Error::Api {
                status: 500,
                message: "boom".into(),
            }),
            Ok(StreamReport::Complete(vec![])),
        ]);

        let err = drive(&mut source, &polling(5), &mut |_: u64, _: u64| {})
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Api { .. }));
        assert_eq!(source.attempts, 1);
    }
}
