//! Static registry of monitored channels.
//!
//! Sources are fixed at configuration time; correlation needs at least one
//! channel on each side, so the registry refuses to load a one-sided list.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Political affiliation tag for a channel. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Affiliation {
    #[serde(rename = "right-wing")]
    RightWing,
    #[serde(rename = "left-wing")]
    LeftWing,
}

impl Affiliation {
    pub fn other(self) -> Self {
        match self {
            Affiliation::RightWing => Affiliation::LeftWing,
            Affiliation::LeftWing => Affiliation::RightWing,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Affiliation::RightWing => "right-wing",
            Affiliation::LeftWing => "left-wing",
        }
    }
}

/// One monitored channel. Identity is `handle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Source {
    /// Human-readable display label.
    pub name: String,
    /// Unique channel identifier used by the transport.
    pub handle: String,
    pub affiliation: Affiliation,
}

/// Ordered, validated list of monitored sources.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    /// Validate and freeze the configured source list. Fails when either
    /// affiliation has no channel or two sources share a handle.
    pub fn new(sources: Vec<Source>) -> Result<Self, ConfigError> {
        let mut handles: HashSet<&str> = HashSet::new();
        for s in &sources {
            if s.handle.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "source {:?} has an empty handle",
                    s.name
                )));
            }
            if !handles.insert(s.handle.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate source handle {:?}",
                    s.handle
                )));
            }
        }
        for side in [Affiliation::RightWing, Affiliation::LeftWing] {
            if !sources.iter().any(|s| s.affiliation == side) {
                return Err(ConfigError::Invalid(format!(
                    "no source configured for affiliation {:?}",
                    side.as_str()
                )));
            }
        }
        Ok(Self { sources })
    }

    /// Sources in stable configured order.
    pub fn list(&self) -> &[Source] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(handle: &str, aff: Affiliation) -> Source {
        Source {
            name: handle.to_uppercase(),
            handle: handle.into(),
            affiliation: aff,
        }
    }

    #[test]
    fn accepts_both_sides_and_keeps_order() {
        let reg = SourceRegistry::new(vec![
            src("alpha", Affiliation::RightWing),
            src("beta", Affiliation::LeftWing),
            src("gamma", Affiliation::RightWing),
        ])
        .unwrap();
        let handles: Vec<&str> = reg.list().iter().map(|s| s.handle.as_str()).collect();
        assert_eq!(handles, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn rejects_one_sided_list() {
        let err = SourceRegistry::new(vec![
            src("alpha", Affiliation::RightWing),
            src("gamma", Affiliation::RightWing),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("left-wing"));
    }

    #[test]
    fn rejects_duplicate_handles() {
        let err = SourceRegistry::new(vec![
            src("alpha", Affiliation::RightWing),
            src("alpha", Affiliation::LeftWing),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn affiliation_serde_uses_hyphenated_tags() {
        let s: Affiliation = serde_json::from_str("\"right-wing\"").unwrap();
        assert_eq!(s, Affiliation::RightWing);
        assert_eq!(
            serde_json::to_string(&Affiliation::LeftWing).unwrap(),
            "\"left-wing\""
        );
    }
}
