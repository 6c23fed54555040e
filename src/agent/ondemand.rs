//! HTTP client for the OnDemand chat API
//!
//! One session is created lazily and reused. Each query is a single POST
//! whose answer arrives either as a JSON body (sync mode) or as a
//! server-sent event stream that is concatenated before parsing.

use std::future::Future;
use std::pin::Pin;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{RemoteConfig, ResponseMode};

use super::{parse_decision, AgentError, Decision, RemoteAgent};

/// Remote agent backed by the OnDemand chat API
pub struct OnDemandClient {
    config: RemoteConfig,
    api_key: String,
    agent_id: String,
    client: reqwest::Client,
    session_id: Mutex<Option<String>>,
}

impl OnDemandClient {
    /// Build a client; fails when the API key or agent id is not configured
    pub fn new(config: RemoteConfig) -> Result<Self, AgentError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AgentError::Unavailable("api key not configured".into()))?;
        let agent_id = config
            .agent_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AgentError::Unavailable("agent id not configured".into()))?;

        Ok(Self {
            config,
            api_key,
            agent_id,
            client: reqwest::Client::new(),
            session_id: Mutex::new(None),
        })
    }

    async fn session(&self) -> Result<String, AgentError> {
        let mut session_id = self.session_id.lock().await;
        if let Some(id) = session_id.as_ref() {
            return Ok(id.clone());
        }
        let id = self.create_session().await?;
        *session_id = Some(id.clone());
        Ok(id)
    }

    async fn create_session(&self) -> Result<String, AgentError> {
        let url = format!("{}/sessions", self.config.base_url);
        let body = json!({
            "agentIds": [self.agent_id],
            "externalUserId": self.config.external_user_id,
            "contextMetadata": [
                { "key": "userId", "value": "kore_user" },
                { "key": "system", "value": std::env::consts::OS },
            ],
        });

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Unavailable(format!(
                "session creation failed: {}",
                status
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| AgentError::Malformed(e.to_string()))?;
        let id = data["data"]["id"]
            .as_str()
            .ok_or_else(|| AgentError::Malformed("session response without data.id".into()))?
            .to_string();

        info!(session = %short_id(&id), "remote session created");
        Ok(id)
    }

    async fn send_query(&self, text: &str) -> Result<Decision, AgentError> {
        let session_id = self.session().await?;
        let url = format!("{}/sessions/{}/query", self.config.base_url, session_id);
        let body = json!({
            "endpointId": self.config.endpoint_id,
            "query": text,
            "agentIds": [self.agent_id],
            "responseMode": self.config.response_mode,
            "reasoningMode": self.config.reasoning_mode,
            "modelConfigs": {
                "temperature": self.config.temperature,
                "topP": 1,
                "maxTokens": self.config.max_tokens,
                "presencePenalty": 0,
                "frequencyPenalty": 0,
            },
        });

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Stale sessions surface as client errors; start fresh next time
            self.session_id.lock().await.take();
            return Err(AgentError::Unavailable(format!("query failed: {}", status)));
        }

        let answer = match self.config.response_mode {
            ResponseMode::Stream => {
                let mut stream = response.bytes_stream();
                let mut events = SseAnswer::default();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| AgentError::Unavailable(e.to_string()))?;
                    if events.push(&chunk) {
                        break;
                    }
                }
                events.finish()
            }
            ResponseMode::Sync => {
                let data: Value = response
                    .json()
                    .await
                    .map_err(|e| AgentError::Malformed(e.to_string()))?;
                data["data"]["answer"].as_str().unwrap_or_default().to_string()
            }
        };

        debug!(chars = answer.len(), "remote answer received");
        let decision = parse_decision(&answer)?;
        info!(agent = %decision.agent, tool = %decision.tool, "decision received");
        Ok(decision)
    }
}

impl RemoteAgent for OnDemandClient {
    fn query<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Decision, AgentError>> + Send + 'a>> {
        Box::pin(self.send_query(text))
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if let Some(id) = self.session_id.lock().await.take() {
                info!(session = %short_id(&id), "remote session closed");
            }
        })
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Accumulates the answer text from a server-sent event stream
///
/// Only `data:` lines whose JSON has `eventType == "fulfillment"` contribute
/// their `answer`. Lines may be split across chunks.
#[derive(Debug, Default)]
struct SseAnswer {
    pending: Vec<u8>,
    answer: String,
    done: bool,
}

impl SseAnswer {
    /// Feed a chunk; returns true once `[DONE]` has been seen
    fn push(&mut self, chunk: &[u8]) -> bool {
        if self.done {
            return true;
        }
        self.pending.extend_from_slice(chunk);

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.handle_line(&String::from_utf8_lossy(&line));
            if self.done {
                break;
            }
        }
        self.done
    }

    fn handle_line(&mut self, line: &str) {
        let Some(data) = line.trim().strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return;
        }

        match serde_json::from_str::<Value>(data) {
            Ok(event) => {
                if event["eventType"] == "fulfillment" {
                    if let Some(part) = event["answer"].as_str() {
                        self.answer.push_str(part);
                    }
                }
            }
            Err(e) => warn!(?e, "skipping undecodable stream event"),
        }
    }

    /// Flush any unterminated last line and return the answer
    fn finish(mut self) -> String {
        if !self.done && !self.pending.is_empty() {
            let line = String::from_utf8_lossy(&self.pending).into_owned();
            self.handle_line(&line);
        }
        self.answer
    }
}
