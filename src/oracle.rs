//! Correlation oracle boundary and the surrounding protocol.
//!
//! The oracle does the semantic judgment; this module owns everything around
//! it: the empty-pool short-circuit, one retry on transport failure,
//! validation of the structured response, and the confidence floor. A claim
//! the oracle cannot back with a well-formed confidence is never surfaced
//! (fail closed).

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::aggregate::CorrelationQuery;
use crate::window::Item;

/// Most recent texts per pool included in the oracle prompt.
pub const PROMPT_MESSAGES_PER_POOL: usize = 10;

const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("malformed oracle response: {0}")]
    Malformed(String),
}

/// Raw structured judgment as returned by the oracle, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleJudgment {
    pub has_mutual_topic: bool,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub perspective_right: Option<String>,
    #[serde(default)]
    pub perspective_left: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Validated per-cycle result. When `found` is false the other fields carry
/// nothing and must not be surfaced.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicResult {
    pub found: bool,
    pub headline: String,
    pub perspective_a: String,
    pub perspective_b: String,
    pub confidence: f64,
}

impl TopicResult {
    pub fn none() -> Self {
        Self {
            found: false,
            headline: String::new(),
            perspective_a: String::new(),
            perspective_b: String::new(),
            confidence: 0.0,
        }
    }
}

/// Semantic-judgment boundary.
#[async_trait::async_trait]
pub trait Oracle: Send + Sync {
    async fn invoke(&self, pool_a: &[Item], pool_b: &[Item]) -> Result<OracleJudgment, OracleError>;
    fn name(&self) -> &'static str;
}

/// OpenAI Chat Completions oracle. Requires an API key; the model id comes
/// from configuration.
pub struct OpenAiOracle {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiOracle {
    pub fn new(api_key: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("mutual-topic-monitor/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key,
            model,
        }
    }

    fn build_prompt(pool_a: &[Item], pool_b: &[Item]) -> String {
        let list = |items: &[Item]| -> String {
            items
                .iter()
                .rev()
                .take(PROMPT_MESSAGES_PER_POOL)
                .map(|i| format!("- {}", i.text))
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!(
            "Right-wing channel messages:\n{}\n\nLeft-wing channel messages:\n{}\n\n\
             Is there one specific news story both sides are currently discussing?",
            list(pool_a),
            list(pool_b)
        )
    }
}

const SYSTEM_PROMPT: &str = "You are a news topic detector. Given two batches of channel \
messages, one from right-wing and one from left-wing outlets, decide whether both batches \
discuss the same underlying story. Respond with ONLY a JSON object: \
{\"has_mutual_topic\": bool, \"headline\": string|null, \"perspective_right\": string|null, \
\"perspective_left\": string|null, \"confidence\": number in [0,1]|null}. \
Headline must be short (2-6 words). Do not analyze or take sides.";

#[async_trait::async_trait]
impl Oracle for OpenAiOracle {
    async fn invoke(&self, pool_a: &[Item], pool_b: &[Item]) -> Result<OracleJudgment, OracleError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let user = Self::build_prompt(pool_a, pool_b);
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.2,
            max_tokens: 300,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(OracleError::Unavailable(format!(
                "status {}",
                resp.status()
            )));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.trim())
            .unwrap_or("");
        serde_json::from_str(content).map_err(|e| OracleError::Malformed(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Wraps an oracle with the correlation protocol.
pub struct CorrelationClient {
    oracle: Arc<dyn Oracle>,
    confidence_floor: f64,
    retry_delay: Duration,
}

impl CorrelationClient {
    pub fn new(oracle: Arc<dyn Oracle>, confidence_floor: f64) -> Self {
        Self {
            oracle,
            confidence_floor,
            retry_delay: RETRY_DELAY,
        }
    }

    /// Override the fixed retry delay (tests use a near-zero delay).
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// One invocation per cycle. Errors only surface after the retry is also
    /// exhausted; every other degenerate case folds into `found = false`.
    pub async fn correlate(&self, query: &CorrelationQuery) -> Result<TopicResult, OracleError> {
        if !query.has_both_pools() {
            tracing::debug!(target: "oracle", "one pool empty, skipping oracle call");
            return Ok(TopicResult::none());
        }

        counter!("oracle_calls_total").increment(1);
        let judgment = match self.oracle.invoke(&query.pool_a, &query.pool_b).await {
            Ok(j) => j,
            Err(OracleError::Unavailable(first)) => {
                counter!("oracle_failures_total").increment(1);
                tracing::warn!(target: "oracle", error = %first, "oracle unavailable, retrying once");
                tokio::time::sleep(self.retry_delay).await;
                counter!("oracle_calls_total").increment(1);
                match self.oracle.invoke(&query.pool_a, &query.pool_b).await {
                    Ok(j) => j,
                    Err(e) => {
                        counter!("oracle_failures_total").increment(1);
                        return Err(e);
                    }
                }
            }
            Err(e @ OracleError::Malformed(_)) => {
                // Fail closed: a response we cannot trust is no topic.
                counter!("oracle_failures_total").increment(1);
                tracing::warn!(target: "oracle", error = %e, "malformed judgment, treating as no topic");
                return Ok(TopicResult::none());
            }
        };

        Ok(self.validate(judgment))
    }

    fn validate(&self, judgment: OracleJudgment) -> TopicResult {
        if !judgment.has_mutual_topic {
            return TopicResult::none();
        }
        let Some(confidence) = judgment.confidence.filter(|c| (0.0..=1.0).contains(c)) else {
            counter!("oracle_failures_total").increment(1);
            tracing::warn!(target: "oracle", "judgment claims a topic without a usable confidence");
            return TopicResult::none();
        };
        if confidence < self.confidence_floor {
            tracing::info!(
                target: "oracle",
                confidence,
                floor = self.confidence_floor,
                "topic below confidence floor, suppressed"
            );
            return TopicResult::none();
        }
        let Some(headline) = judgment.headline.filter(|h| !h.trim().is_empty()) else {
            tracing::warn!(target: "oracle", "judgment claims a topic without a headline");
            return TopicResult::none();
        };
        TopicResult {
            found: true,
            headline,
            perspective_a: judgment.perspective_right.unwrap_or_default(),
            perspective_b: judgment.perspective_left.unwrap_or_default(),
            confidence,
        }
    }
}
