//! # Channel Window
//! Bounded, deduplicated buffer of the most recent items for one channel.
//!
//! Each window is owned by the poller for its source and never shared.
//! Dedup keys on the source-assigned item id; the seen-set is itself capped
//! (at a multiple of the window cap) so long-running monitors do not grow
//! memory without bound.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};

use crate::registry::Affiliation;

/// Seen-set retention as a multiple of the window cap. Old ids beyond this
/// horizon may be re-ingested, which is acceptable: the transport only
/// returns items newer than the watermark.
pub const SEEN_RETENTION_MULTIPLE: usize = 4;

/// One normalized message from a channel. Identity = (source_handle, item_id).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Item {
    pub source_handle: String,
    pub item_id: i64,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub affiliation: Affiliation,
}

/// Rolling window of the newest `cap` items for a single source.
#[derive(Debug)]
pub struct ChannelWindow {
    cap: usize,
    items: VecDeque<Item>,
    seen: HashSet<i64>,
    /// Ids in seen-set insertion order, for oldest-first eviction.
    seen_order: VecDeque<i64>,
    watermark: Option<DateTime<Utc>>,
}

impl ChannelWindow {
    pub fn new(cap: usize) -> Self {
        debug_assert!(cap > 0, "window cap must be positive");
        Self {
            cap,
            items: VecDeque::with_capacity(cap),
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
            watermark: None,
        }
    }

    /// Ingest candidates in arrival order. Duplicates (by item id) are
    /// skipped; the watermark advances to the newest timestamp observed.
    /// Returns how many items were newly accepted.
    pub fn ingest(&mut self, candidates: Vec<Item>) -> usize {
        let mut accepted = 0usize;
        for item in candidates {
            if self.seen.contains(&item.item_id) {
                continue;
            }
            self.seen.insert(item.item_id);
            self.seen_order.push_back(item.item_id);
            if self
                .watermark
                .map_or(true, |w| item.timestamp > w)
            {
                self.watermark = Some(item.timestamp);
            }
            self.items.push_back(item);
            accepted += 1;
        }

        // Evict oldest items beyond the cap. Their ids stay in the seen-set
        // until the retention horizon below pushes them out.
        while self.items.len() > self.cap {
            self.items.pop_front();
        }
        // The seen-set outlives evicted items (so a re-fetch of a recently
        // evicted id still dedups), but only up to the retention horizon.
        let seen_cap = self.cap * SEEN_RETENTION_MULTIPLE;
        while self.seen_order.len() > seen_cap {
            if let Some(old_id) = self.seen_order.pop_front() {
                self.seen.remove(&old_id);
            }
        }

        accepted
    }

    /// Copy of the current window, oldest first.
    pub fn snapshot(&self) -> Vec<Item> {
        self.items.iter().cloned().collect()
    }

    /// Timestamp of the newest item ever incorporated, if any.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn seen_len(&self) -> usize {
        self.seen.len()
    }
}
