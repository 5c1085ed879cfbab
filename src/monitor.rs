//! Top-level monitoring loop.
//!
//! One cycle walks Poll -> Aggregate -> Correlate -> Report and always comes
//! back to idle: per-source failures are contained in the poller, oracle
//! failures degrade to a heartbeat, and anything else is logged with the
//! cycle number and offending step. Only a shutdown signal ends the loop.
//! Shutdown is observed cooperatively between steps; in-flight network calls
//! are raced against the signal so cancellation is bounded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::aggregate::{aggregate, CorrelationQuery};
use crate::metrics::ensure_metrics_described;
use crate::oracle::{CorrelationClient, TopicResult};
use crate::poll::{Poller, SourceBackoff, SourceOutcome};
use crate::registry::SourceRegistry;
use crate::window::ChannelWindow;

/// One event per cycle, handed to the output boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    MutualTopicDetected {
        headline: String,
        perspective_a: String,
        perspective_b: String,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },
    NoTopicFound {
        timestamp: DateTime<Utc>,
    },
}

/// Output boundary. Presentation lives outside the core.
pub trait EventSink: Send + Sync {
    fn emit(&self, outcome: &CycleOutcome);
}

#[derive(Debug, thiserror::Error)]
#[error("cycle {cycle} failed during {step}: {source}")]
pub struct CycleError {
    pub cycle: u64,
    pub step: &'static str,
    #[source]
    pub source: anyhow::Error,
}

/// All mutable monitoring state, explicitly constructed and owned by the
/// loop. Windows are only ever touched from the poll step.
pub struct MonitorState {
    pub registry: SourceRegistry,
    pub windows: HashMap<String, ChannelWindow>,
    pub backoffs: HashMap<String, SourceBackoff>,
    pub cycle: u64,
}

impl MonitorState {
    pub fn new(registry: SourceRegistry) -> Self {
        Self {
            registry,
            windows: HashMap::new(),
            backoffs: HashMap::new(),
            cycle: 0,
        }
    }
}

pub struct MonitorLoop {
    state: MonitorState,
    poller: Poller,
    correlation: CorrelationClient,
    sink: Arc<dyn EventSink>,
    interval: Duration,
}

impl MonitorLoop {
    pub fn new(
        state: MonitorState,
        poller: Poller,
        correlation: CorrelationClient,
        sink: Arc<dyn EventSink>,
        interval: Duration,
    ) -> Self {
        ensure_metrics_described();
        Self {
            state,
            poller,
            correlation,
            sink,
            interval,
        }
    }

    /// Run until the shutdown signal flips. Fixed-interval cadence: a slow
    /// cycle is logged as an overrun, it does not push later cycles back.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.log_startup();
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    // A dropped sender means no one can ask us to stop later;
                    // treat it the same as an explicit shutdown.
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            self.state.cycle += 1;
            let cycle = self.state.cycle;

            let shutdown_view = shutdown.clone();
            let outcome = tokio::select! {
                out = Self::run_cycle(
                    cycle,
                    &mut self.state,
                    &self.poller,
                    &self.correlation,
                    &shutdown_view,
                ) => out,
                _ = shutdown.changed() => {
                    tracing::info!(target: "monitor", cycle, "shutdown during cycle, cancelling in-flight work");
                    break;
                }
            };

            // Reporting step.
            let event = match outcome {
                Ok(Some(result)) => result_to_event(result),
                Ok(None) => {
                    // Shutdown observed at a step boundary.
                    break;
                }
                Err(e) => {
                    counter!("monitor_cycle_errors_total").increment(1);
                    tracing::error!(target: "monitor", cycle = e.cycle, step = e.step, error = %e, "cycle failed");
                    CycleOutcome::NoTopicFound {
                        timestamp: Utc::now(),
                    }
                }
            };
            if matches!(event, CycleOutcome::MutualTopicDetected { .. }) {
                counter!("monitor_topics_detected_total").increment(1);
            }
            self.sink.emit(&event);

            counter!("monitor_cycles_total").increment(1);
            gauge!("monitor_last_cycle_ts").set(Utc::now().timestamp() as f64);

            let elapsed = started.elapsed();
            if elapsed > self.interval {
                tracing::warn!(
                    target: "monitor",
                    cycle,
                    elapsed_secs = elapsed.as_secs(),
                    interval_secs = self.interval.as_secs(),
                    "cycle overran its interval"
                );
            }
        }
        tracing::info!(target: "monitor", "monitor stopped");
    }

    /// Poll -> Aggregate -> Correlate. Returns `None` when shutdown was
    /// observed at a step boundary. Associated fn so the caller can race the
    /// whole future against the shutdown signal.
    async fn run_cycle(
        cycle: u64,
        state: &mut MonitorState,
        poller: &Poller,
        correlation: &CorrelationClient,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<Option<TopicResult>, CycleError> {
        tracing::debug!(target: "monitor", cycle, "cycle start");

        // Polling. Never cycle-fatal.
        let outcomes = poller
            .poll_all(&state.registry, &mut state.windows, &mut state.backoffs)
            .await;
        let failed = outcomes
            .values()
            .filter(|o| matches!(o, SourceOutcome::Failed(_)))
            .count();
        if failed > 0 {
            tracing::warn!(target: "monitor", cycle, failed, "some sources failed this cycle");
        }
        if *shutdown.borrow() {
            return Ok(None);
        }

        // Aggregating. Pure and in-memory.
        let query: CorrelationQuery = aggregate(&state.registry, &state.windows);
        tracing::debug!(
            target: "monitor",
            cycle,
            pool_a = query.pool_a.len(),
            pool_b = query.pool_b.len(),
            "aggregated pools"
        );
        if *shutdown.borrow() {
            return Ok(None);
        }

        // Correlating. One retry happens inside the client; a second failure
        // surfaces here as the cycle error.
        let result = correlation
            .correlate(&query)
            .await
            .map_err(|e| CycleError {
                cycle,
                step: "correlate",
                source: e.into(),
            })?;
        Ok(Some(result))
    }

    fn log_startup(&self) {
        tracing::info!(
            target: "monitor",
            sources = self.state.registry.len(),
            interval_secs = self.interval.as_secs(),
            "starting monitor"
        );
        for s in self.state.registry.list() {
            tracing::info!(
                target: "monitor",
                name = %s.name,
                handle = %s.handle,
                affiliation = s.affiliation.as_str(),
                "monitoring channel"
            );
        }
    }
}

fn result_to_event(result: TopicResult) -> CycleOutcome {
    let timestamp = Utc::now();
    if result.found {
        CycleOutcome::MutualTopicDetected {
            headline: result.headline,
            perspective_a: result.perspective_a,
            perspective_b: result.perspective_b,
            confidence: result.confidence,
            timestamp,
        }
    } else {
        CycleOutcome::NoTopicFound { timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn found_result_becomes_detected_event() {
        let r = TopicResult {
            found: true,
            headline: "Budget vote".into(),
            perspective_a: "a".into(),
            perspective_b: "b".into(),
            confidence: 0.8,
        };
        match result_to_event(r) {
            CycleOutcome::MutualTopicDetected {
                headline,
                confidence,
                ..
            } => {
                assert_eq!(headline, "Budget vote");
                assert!((confidence - 0.8).abs() < f64::EPSILON);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn none_result_becomes_heartbeat() {
        assert!(matches!(
            result_to_event(TopicResult::none()),
            CycleOutcome::NoTopicFound { .. }
        ));
    }
}
