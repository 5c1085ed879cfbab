// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod aggregate;
pub mod config;
pub mod metrics;
pub mod monitor;
pub mod oracle;
pub mod poll;
pub mod registry;
pub mod report;
pub mod transport;
pub mod window;

// ---- Re-exports for stable public API ----
pub use crate::aggregate::{aggregate, CorrelationQuery};
pub use crate::monitor::{CycleOutcome, EventSink, MonitorLoop, MonitorState};
pub use crate::oracle::{CorrelationClient, Oracle, OracleJudgment, TopicResult};
pub use crate::poll::{FetchAdapter, FetchError, Poller, RawMessage};
pub use crate::registry::{Affiliation, Source, SourceRegistry};
pub use crate::window::{ChannelWindow, Item};
