// tests/correlate_gate.rs
// Protocol around the oracle: empty-pool short-circuit, confidence floor,
// fail-closed validation, and single retry on transport failure.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use mutual_topic_monitor::aggregate::CorrelationQuery;
use mutual_topic_monitor::oracle::{CorrelationClient, Oracle, OracleError, OracleJudgment};
use mutual_topic_monitor::registry::Affiliation;
use mutual_topic_monitor::window::Item;

struct StubOracle {
    calls: Arc<AtomicUsize>,
    response: Box<dyn Fn() -> Result<OracleJudgment, OracleError> + Send + Sync>,
}

#[async_trait::async_trait]
impl Oracle for StubOracle {
    async fn invoke(&self, _: &[Item], _: &[Item]) -> Result<OracleJudgment, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.response)()
    }
    fn name(&self) -> &'static str {
        "stub"
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

fn both_pools() -> CorrelationQuery {
    CorrelationQuery {
        pool_a: vec![item("r1", 1, Affiliation::RightWing)],
        pool_b: vec![item("l1", 2, Affiliation::LeftWing)],
    }
}

fn judgment(confidence: f64) -> OracleJudgment {
    OracleJudgment {
        has_mutual_topic: true,
        headline: Some("Budget vote".into()),
        perspective_right: Some("overreach".into()),
        perspective_left: Some("necessary".into()),
        confidence: Some(confidence),
    }
}

fn client(
    calls: Arc<AtomicUsize>,
    floor: f64,
    response: impl Fn() -> Result<OracleJudgment, OracleError> + Send + Sync + 'static,
) -> CorrelationClient {
    CorrelationClient::new(
        Arc::new(StubOracle {
            calls,
            response: Box::new(response),
        }),
        floor,
    )
    .with_retry_delay(Duration::from_millis(1))
}

#[tokio::test]
async fn empty_pool_short_circuits_without_calling_oracle() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = client(Arc::clone(&calls), 0.6, || Ok(judgment(0.9)));

    let query = CorrelationQuery {
        pool_a: vec![item("r1", 1, Affiliation::RightWing)],
        pool_b: vec![],
    };
    let result = c.correlate(&query).await.unwrap();
    assert!(!result.found);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn confidence_below_floor_is_not_surfaced() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = client(Arc::clone(&calls), 0.6, || Ok(judgment(0.3)));

    let result = c.correlate(&both_pools()).await.unwrap();
    assert!(!result.found);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn confidence_at_floor_passes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = client(Arc::clone(&calls), 0.6, || Ok(judgment(0.6)));

    let result = c.correlate(&both_pools()).await.unwrap();
    assert!(result.found);
    assert_eq!(result.headline, "Budget vote");
}

#[tokio::test]
async fn malformed_response_fails_closed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = client(Arc::clone(&calls), 0.0, || {
        Err(OracleError::Malformed("not json".into()))
    });

    let result = c.correlate(&both_pools()).await.unwrap();
    assert!(!result.found);
    // Malformed is not retried.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unavailable_is_retried_once_then_surfaces() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = client(Arc::clone(&calls), 0.0, || {
        Err(OracleError::Unavailable("connection refused".into()))
    });

    let err = c.correlate(&both_pools()).await.unwrap_err();
    assert!(matches!(err, OracleError::Unavailable(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unavailable_then_success_recovers_within_the_cycle() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(AtomicUsize::new(0));
    let seen2 = Arc::clone(&seen);
    let c = client(Arc::clone(&calls), 0.0, move || {
        if seen2.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(OracleError::Unavailable("first call fails".into()))
        } else {
            Ok(judgment(0.8))
        }
    });

    let result = c.correlate(&both_pools()).await.unwrap();
    assert!(result.found);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
