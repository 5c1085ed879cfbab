//! HTTP implementation of the channel-transport boundary.
//!
//! Talks to a message API of the shape
//! `GET {base}/channels/{handle}/messages?since=<rfc3339>&limit=<n>` with a
//! bearer token. 429 maps to a rate-limit signal, 401/403 to an auth
//! failure, everything else to a transport error.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;

use crate::poll::{FetchAdapter, FetchError, RawMessage};

pub struct HttpFetchAdapter {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpFetchAdapter {
    pub fn new(base_url: String, token: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("mutual-topic-monitor/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }
}

#[async_trait::async_trait]
impl FetchAdapter for HttpFetchAdapter {
    async fn fetch(
        &self,
        handle: &str,
        since: Option<DateTime<Utc>>,
        max_items: usize,
    ) -> Result<Vec<RawMessage>, FetchError> {
        let url = format!("{}/channels/{}/messages", self.base_url, handle);
        let mut req = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("limit", max_items.to_string())]);
        if let Some(ts) = since {
            req = req.query(&[("since", ts.to_rfc3339())]);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            Err(FetchError::RateLimited)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(FetchError::Auth(format!("status {status}")))
        } else if !status.is_success() {
            Err(FetchError::Transport(format!("status {status}")))
        } else {
            resp.json::<Vec<RawMessage>>()
                .await
                .map_err(|e| FetchError::Transport(format!("decoding body: {e}")))
        }
    }
}
