//! Typed client for the parent node's replication endpoints
//!
//! Used exclusively by the sync worker. Exactly two calls: push a batch of
//! records to the parent's global batch-ingest endpoint, and tail the next
//! message after a cursor from the parent's global tail endpoint. Transport
//! and remote-application failures collapse into one error type; the worker
//! treats them all the same (log, skip marking, retry next iteration).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;

/// Per-request transport timeout. A hung parent stalls one loop iteration
/// at most this long.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ParentError {
    #[error("parent request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("parent returned status {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("parent response decoding failed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A record as shipped to the parent's `/records/batchGlobal` endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRecord {
    pub environment_key: String,
    pub device: String,
    pub ts: i64,
    pub data: JsonValue,
}

/// A message as returned by the parent's `/messages/nextGlobal` endpoint,
/// path already stripped of the parent-side node instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentMessage {
    pub environment_key: String,
    pub path: String,
    pub ts: i64,
    pub data: JsonValue,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchGlobalBody<'a> {
    records: &'a [GlobalRecord],
}

/// HTTP client for a parent node.
#[derive(Debug, Clone)]
pub struct ParentClient {
    http: reqwest::Client,
    base_url: String,
}

impl ParentClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to create parent http client");

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Push a mixed-environment, mixed-device batch of records upstream.
    pub async fn post_records_batch(&self, records: &[GlobalRecord]) -> Result<(), ParentError> {
        let url = format!("{}/records/batchGlobal", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&BatchGlobalBody { records })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ParentError::Remote {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// The parent's next message with `ts` strictly after the cursor, or
    /// `None` when the parent reports the `"NONE"` sentinel.
    pub async fn next_message(&self, after_ts: i64) -> Result<Option<ParentMessage>, ParentError> {
        let url = format!("{}/messages/nextGlobal", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("afterTs", after_ts.to_string())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ParentError::Remote {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let body: JsonValue = resp.json().await?;
        if body == JsonValue::String("NONE".to_string()) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(body)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = ParentClient::new("http://parent:3000/");
        assert_eq!(client.base_url(), "http://parent:3000");
    }

    #[test]
    fn batch_body_shape() {
        let records = vec![GlobalRecord {
            environment_key: "env".into(),
            device: "foo".into(),
            ts: 100,
            data: json!({"a": 1}),
        }];
        let body = serde_json::to_value(BatchGlobalBody { records: &records }).expect("serialize");
        assert_eq!(
            body,
            json!({
                "records": [
                    {"environmentKey": "env", "device": "foo", "ts": 100, "data": {"a": 1}}
                ]
            })
        );
    }

    #[test]
    fn sentinel_and_payload_decode() {
        let sentinel = json!("NONE");
        assert_eq!(sentinel, JsonValue::String("NONE".to_string()));

        let message: ParentMessage = serde_json::from_value(json!({
            "environmentKey": "env",
            "path": "valves/main",
            "ts": 42,
            "data": {"open": true}
        }))
        .expect("decode");
        assert_eq!(message.environment_key, "env");
        assert_eq!(message.path, "valves/main");
        assert_eq!(message.ts, 42);
    }
}
