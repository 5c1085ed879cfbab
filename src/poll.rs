//! Per-cycle polling of all channels through the transport boundary.
//!
//! Fetches are dispatched concurrently (one task per due source) so a slow
//! channel bounds cycle latency instead of summing into it, but results are
//! merged back in registry order so the outcome never depends on completion
//! timing. A failure on one source never aborts the cycle for the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::metrics::ensure_metrics_described;
use crate::registry::{Source, SourceRegistry};
use crate::window::{ChannelWindow, Item};

/// Messages shorter than this after normalization are dropped at ingest.
pub const MIN_TEXT_LEN: usize = 10;

/// Raw message as returned by the channel transport.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawMessage {
    pub item_id: i64,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("rate limited by transport")]
    RateLimited,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authentication failed: {0}")]
    Auth(String),
}

/// Transport boundary: pulls up to `max_items` messages for one channel,
/// newer than `since`.
#[async_trait::async_trait]
pub trait FetchAdapter: Send + Sync {
    async fn fetch(
        &self,
        handle: &str,
        since: Option<DateTime<Utc>>,
        max_items: usize,
    ) -> Result<Vec<RawMessage>, FetchError>;
}

/// Collapse whitespace and trim. Transport text is treated as plain text.
pub fn normalize_text(s: &str) -> String {
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(s, " ").trim().to_string()
}

/// Per-source exponential backoff for rate-limit responses. The first
/// rate-limit defers the source by one base delay; each further one doubles
/// the delay up to the ceiling. Any successful fetch resets it.
#[derive(Debug, Default)]
pub struct SourceBackoff {
    delay: Option<Duration>,
    deferred_until: Option<Instant>,
}

impl SourceBackoff {
    pub fn on_rate_limited(&mut self, base: Duration, ceiling: Duration) -> Duration {
        let next = match self.delay {
            None => base,
            Some(d) => (d * 2).min(ceiling),
        };
        self.delay = Some(next);
        self.deferred_until = Some(Instant::now() + next);
        next
    }

    pub fn on_success(&mut self) {
        self.delay = None;
        self.deferred_until = None;
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred_until
            .map_or(false, |until| Instant::now() < until)
    }

    /// Current delay, if the source is in backoff.
    pub fn current_delay(&self) -> Option<Duration> {
        self.delay
    }
}

/// What happened to one source during a cycle.
#[derive(Debug)]
pub enum SourceOutcome {
    /// Items accepted into the window (0 when everything deduplicated).
    Ingested(usize),
    /// Source is still inside its rate-limit backoff horizon.
    SkippedBackoff,
    Failed(FetchError),
}

pub struct Poller {
    adapter: Arc<dyn FetchAdapter>,
    max_per_check: usize,
    backoff_base: Duration,
    backoff_ceiling: Duration,
}

impl Poller {
    pub fn new(
        adapter: Arc<dyn FetchAdapter>,
        max_per_check: usize,
        backoff_base: Duration,
        backoff_ceiling: Duration,
    ) -> Self {
        ensure_metrics_described();
        Self {
            adapter,
            max_per_check,
            backoff_base,
            backoff_ceiling,
        }
    }

    /// Poll every source once. Windows are updated in place; the returned map
    /// records one outcome per handle. Ordering of ingestion follows the
    /// registry, never fetch completion order.
    pub async fn poll_all(
        &self,
        registry: &SourceRegistry,
        windows: &mut HashMap<String, ChannelWindow>,
        backoffs: &mut HashMap<String, SourceBackoff>,
    ) -> HashMap<String, SourceOutcome> {
        let sources = registry.list();
        let mut results: Vec<Option<Result<Vec<RawMessage>, FetchError>>> =
            (0..sources.len()).map(|_| None).collect();
        let mut dispatched = vec![false; sources.len()];

        let mut tasks: JoinSet<(usize, Result<Vec<RawMessage>, FetchError>)> = JoinSet::new();
        for (idx, source) in sources.iter().enumerate() {
            let backoff = backoffs.entry(source.handle.clone()).or_default();
            if backoff.is_deferred() {
                continue;
            }
            dispatched[idx] = true;
            let adapter = Arc::clone(&self.adapter);
            let handle = source.handle.clone();
            let since = windows.get(&source.handle).and_then(|w| w.watermark());
            let max = self.max_per_check;
            tasks.spawn(async move {
                let res = adapter.fetch(&handle, since, max).await;
                (idx, res)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, res)) => results[idx] = Some(res),
                Err(e) => tracing::warn!(target: "poll", error = %e, "fetch task failed to join"),
            }
        }

        // A dispatched task that produced no result panicked or was
        // cancelled; report it as a failure, not as a backoff skip.
        for (idx, slot) in results.iter_mut().enumerate() {
            if dispatched[idx] && slot.is_none() {
                *slot = Some(Err(FetchError::Transport(
                    "fetch task panicked or was cancelled".into(),
                )));
            }
        }

        // Deterministic merge: registry order, regardless of completion order.
        let mut outcomes = HashMap::with_capacity(sources.len());
        for (idx, source) in sources.iter().enumerate() {
            let backoff = backoffs.entry(source.handle.clone()).or_default();
            let outcome = match results[idx].take() {
                None => {
                    tracing::debug!(target: "poll", source = %source.handle, "skipped, in backoff");
                    SourceOutcome::SkippedBackoff
                }
                Some(Ok(raw)) => {
                    backoff.on_success();
                    let items = normalize_messages(source, raw);
                    let window = windows
                        .entry(source.handle.clone())
                        .or_insert_with(|| ChannelWindow::new(self.max_per_check));
                    let accepted = window.ingest(items);
                    counter!("poll_items_ingested_total").increment(accepted as u64);
                    tracing::info!(
                        target: "poll",
                        source = %source.handle,
                        accepted,
                        window = window.len(),
                        "fetched channel"
                    );
                    SourceOutcome::Ingested(accepted)
                }
                Some(Err(FetchError::RateLimited)) => {
                    let delay = backoff.on_rate_limited(self.backoff_base, self.backoff_ceiling);
                    counter!("poll_rate_limited_total").increment(1);
                    tracing::warn!(
                        target: "poll",
                        source = %source.handle,
                        backoff_secs = delay.as_secs(),
                        "rate limited, backing off"
                    );
                    SourceOutcome::Failed(FetchError::RateLimited)
                }
                Some(Err(e)) => {
                    counter!("poll_fetch_errors_total").increment(1);
                    tracing::warn!(target: "poll", source = %source.handle, error = %e, "fetch failed");
                    SourceOutcome::Failed(e)
                }
            };
            outcomes.insert(source.handle.clone(), outcome);
        }
        outcomes
    }
}

/// Normalize raw messages into Items, attaching the source's affiliation and
/// dropping texts too short to carry a story.
fn normalize_messages(source: &Source, raw: Vec<RawMessage>) -> Vec<Item> {
    raw.into_iter()
        .filter_map(|m| {
            let text = normalize_text(&m.text);
            if text.chars().count() <= MIN_TEXT_LEN {
                return None;
            }
            Some(Item {
                source_handle: source.handle.clone(),
                item_id: m.item_id,
                timestamp: m.timestamp,
                text,
                affiliation: source.affiliation,
            })
        })
        .collect()
}
