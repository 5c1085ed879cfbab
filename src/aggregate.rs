//! Partition the channel windows into the two affiliation pools.

use std::collections::HashMap;

use crate::registry::{Affiliation, SourceRegistry};
use crate::window::{ChannelWindow, Item};

/// Ephemeral correlation input, rebuilt every cycle.
/// pool_a = right-wing, pool_b = left-wing.
#[derive(Debug, Clone, Default)]
pub struct CorrelationQuery {
    pub pool_a: Vec<Item>,
    pub pool_b: Vec<Item>,
}

impl CorrelationQuery {
    pub fn has_both_pools(&self) -> bool {
        !self.pool_a.is_empty() && !self.pool_b.is_empty()
    }
}

/// Pure partition of every window's snapshot by source affiliation. Order is
/// stable: registry order between sources, window order (oldest first)
/// within one source. Empty pools are a valid result.
pub fn aggregate(
    registry: &SourceRegistry,
    windows: &HashMap<String, ChannelWindow>,
) -> CorrelationQuery {
    let mut query = CorrelationQuery::default();
    for source in registry.list() {
        let Some(window) = windows.get(&source.handle) else {
            continue;
        };
        let pool = match source.affiliation {
            Affiliation::RightWing => &mut query.pool_a,
            Affiliation::LeftWing => &mut query.pool_b,
        };
        pool.extend(window.snapshot());
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Source;
    use chrono::{TimeZone, Utc};

    fn src(handle: &str, aff: Affiliation) -> Source {
        Source {
            name: handle.to_uppercase(),
            handle: handle.into(),
            affiliation: aff,
        }
    }

    fn item(handle: &str, id: i64, aff: Affiliation) -> Item {
        Item {
            source_handle: handle.into(),
            item_id: id,
            timestamp: Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap(),
            text: format!("story {id} from {handle}"),
            affiliation: aff,
        }
    }

    #[test]
    fn pools_partition_the_union_exactly() {
        let registry = SourceRegistry::new(vec![
            src("r1", Affiliation::RightWing),
            src("l1", Affiliation::LeftWing),
            src("r2", Affiliation::RightWing),
        ])
        .unwrap();

        let mut windows = HashMap::new();
        let mut w = ChannelWindow::new(10);
        w.ingest(vec![
            item("r1", 1, Affiliation::RightWing),
            item("r1", 2, Affiliation::RightWing),
        ]);
        windows.insert("r1".to_string(), w);
        let mut w = ChannelWindow::new(10);
        w.ingest(vec![item("l1", 3, Affiliation::LeftWing)]);
        windows.insert("l1".to_string(), w);
        let mut w = ChannelWindow::new(10);
        w.ingest(vec![item("r2", 4, Affiliation::RightWing)]);
        windows.insert("r2".to_string(), w);

        let q = aggregate(&registry, &windows);
        let a_ids: Vec<i64> = q.pool_a.iter().map(|i| i.item_id).collect();
        let b_ids: Vec<i64> = q.pool_b.iter().map(|i| i.item_id).collect();
        // Registry order between sources, window order within one.
        assert_eq!(a_ids, vec![1, 2, 4]);
        assert_eq!(b_ids, vec![3]);

        let total: usize = windows.values().map(|w| w.len()).sum();
        assert_eq!(q.pool_a.len() + q.pool_b.len(), total);
        assert!(q.pool_a.iter().all(|i| i.affiliation == Affiliation::RightWing));
        assert!(q.pool_b.iter().all(|i| i.affiliation == Affiliation::LeftWing));
    }

    #[test]
    fn empty_windows_yield_empty_pools() {
        let registry = SourceRegistry::new(vec![
            src("r1", Affiliation::RightWing),
            src("l1", Affiliation::LeftWing),
        ])
        .unwrap();
        let q = aggregate(&registry, &HashMap::new());
        assert!(q.pool_a.is_empty());
        assert!(q.pool_b.is_empty());
        assert!(!q.has_both_pools());
    }
}
