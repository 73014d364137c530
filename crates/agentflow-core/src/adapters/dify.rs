//! SSE chat adapter (Dify).
//!
//! Talks to the `/chat-messages` endpoint.  In streaming mode the reply is a
//! sequence of `data: {"event": ...}` frames:
//!
//! - `message` / `agent_message` carry an `answer` fragment;
//! - `message_end` ends the answer;
//! - `error` carries a `message` that is surfaced as a warning, then ends it.
//!
//! In blocking mode, or whenever the reply is not `text/event-stream`, it is
//! one JSON document with an `answer` field.

use async_stream::try_stream;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{Value, json};
use tracing::{debug, info, trace, warn};

use crate::adapters::{AgentClient, join_url, probe};
use crate::config::{DIFY_API_KEY, DifySettings, Settings};
use crate::error::{AgentflowError, Result};
use crate::stream::{Frame, Framing, TextStream, decode_frames, guarded, warning};
use crate::transport::{self, Transport, bearer};
use crate::types::{ChatTurn, ConnectionInfo, HealthSnapshot, Platform};

/// Adapter for the Dify chat-messages API.
#[derive(Debug)]
pub struct DifyAgent {
    settings: DifySettings,
    probe_timeout: std::time::Duration,
    transport: Transport,
}

impl DifyAgent {
    /// Create an adapter with a fresh transport session.
    pub fn new(settings: &Settings, access_token: &str) -> Result<Self> {
        let transport = Transport::new(Platform::Dify, access_token)?;
        info!(platform = %Platform::Dify, "initialized agent");
        Ok(Self {
            settings: settings.dify.clone(),
            probe_timeout: settings.probe_timeout,
            transport,
        })
    }

    /// Full URL of the chat-messages endpoint.
    pub fn chat_url(&self) -> String {
        join_url(&self.settings.api_url, "chat-messages")
    }

    fn missing_config(&self) -> Vec<&'static str> {
        if self.settings.api_key.is_none() {
            vec![DIFY_API_KEY]
        } else {
            Vec::new()
        }
    }

    fn ensure_configured(&self) -> Result<()> {
        let missing = self.missing_config();
        if missing.is_empty() {
            return Ok(());
        }
        Err(AgentflowError::MissingConfig {
            fields: missing.into_iter().map(str::to_owned).collect(),
        })
    }

    fn request_headers(&self) -> Result<HeaderMap> {
        self.transport
            .headers(self.settings.api_key.as_deref().map(bearer))
    }

    fn request_body(&self, query: &str) -> Value {
        json!({
            "inputs": {},
            "query": query,
            "response_mode": self.settings.response_mode.as_str(),
            // Dify issues conversation ids itself; an unknown id is rejected.
            "conversation_id": "",
            "user": self.settings.user,
        })
    }
}

#[async_trait]
impl AgentClient for DifyAgent {
    fn platform(&self) -> Platform {
        Platform::Dify
    }

    fn get_connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            platform: Platform::Dify.display_name().to_owned(),
            endpoint: Some(self.chat_url()),
            has_api_key: self.settings.api_key.is_some(),
            timeout: Some(self.settings.timeout.as_secs()),
        }
    }

    async fn health_check(&self) -> HealthSnapshot {
        probe(
            &self.transport,
            Some(self.chat_url()),
            &self.missing_config(),
            self.request_headers(),
            self.probe_timeout,
        )
        .await
    }

    fn stream_with_history<'a>(
        &'a self,
        query: &'a str,
        session_id: &'a str,
        _history: &'a [ChatTurn],
    ) -> TextStream<'a> {
        guarded(
            Platform::Dify,
            try_stream! {
                self.ensure_configured()?;
                debug!(session_id, "dify keeps its own conversation state");
                let timeout = self.settings.timeout;
                let response = self
                    .transport
                    .post_json(
                        &self.chat_url(),
                        self.request_headers()?,
                        &self.request_body(query),
                        timeout,
                    )
                    .await?;

                if transport::is_event_stream(&response) {
                    let frames = decode_frames(response, Framing::EventStream, timeout, decode_event);
                    for await chunk in frames {
                        yield chunk?;
                    }
                } else {
                    debug!(
                        mode = self.settings.response_mode.as_str(),
                        "dify answered without streaming"
                    );
                    let text = transport::read_text(response, timeout).await?;
                    yield answer_from_body(&text);
                }
            },
        )
    }

    fn close(&mut self) {
        self.transport.close();
    }
}

// ---------------------------------------------------------------------------
// Reply decoding
// ---------------------------------------------------------------------------

/// Decode the data of one SSE event of a streaming chat-messages reply.
fn decode_event(payload: &str) -> Frame {
    if payload == "ping" {
        return Frame::Skip;
    }

    let data: Value = match serde_json::from_str(payload) {
        Ok(data) => data,
        Err(e) => {
            let preview: String = payload.chars().take(100).collect();
            warn!(error = %e, data = %preview, "failed to parse SSE data");
            return Frame::Text(payload.to_owned());
        }
    };

    match data["event"].as_str().unwrap_or_default() {
        "message" | "agent_message" => match data["answer"].as_str() {
            Some(answer) if !answer.is_empty() => Frame::Text(answer.to_owned()),
            _ => Frame::Skip,
        },
        "message_end" => {
            debug!("SSE streaming completed");
            Frame::Done
        }
        "error" => {
            let message = data["message"].as_str().unwrap_or("Unknown error");
            warn!(message, "dify reported an error");
            Frame::Fail(warning(format!("Dify error: {message}")))
        }
        other => {
            trace!(event = other, "ignoring dify event");
            Frame::Skip
        }
    }
}

/// Extract the answer from a blocking-mode reply.
fn answer_from_body(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["answer"].as_str().map(str::to_owned))
        .unwrap_or_else(|| body.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_events_emit_answer() {
        assert_eq!(
            decode_event(r#"{"event":"message","answer":"hi"}"#),
            Frame::Text("hi".into())
        );
        assert_eq!(
            decode_event(r#"{"event":"agent_message","answer":"yo"}"#),
            Frame::Text("yo".into())
        );
        assert_eq!(
            decode_event(r#"{"event":"message","answer":""}"#),
            Frame::Skip
        );
    }

    #[test]
    fn end_and_error_events_stop() {
        assert_eq!(decode_event(r#"{"event":"message_end"}"#), Frame::Done);
        assert_eq!(
            decode_event(r#"{"event":"error","message":"quota exceeded"}"#),
            Frame::Fail("⚠️ Dify error: quota exceeded".into())
        );
        assert_eq!(
            decode_event(r#"{"event":"error"}"#),
            Frame::Fail("⚠️ Dify error: Unknown error".into())
        );
    }

    #[test]
    fn keepalives_and_other_events_are_skipped() {
        assert_eq!(decode_event("ping"), Frame::Skip);
        assert_eq!(decode_event(r#"{"event":"agent_thought","thought":"..."}"#), Frame::Skip);
        assert_eq!(decode_event(r#"{"event":"workflow_started"}"#), Frame::Skip);
    }

    #[test]
    fn undecodable_frame_passes_through() {
        assert_eq!(decode_event("{broken"), Frame::Text("{broken".into()));
    }

    #[test]
    fn blocking_answer() {
        assert_eq!(answer_from_body(r#"{"answer":"done","id":"1"}"#), "done");
        assert_eq!(answer_from_body("oops"), "oops");
    }

    #[test]
    fn request_body_shape() {
        let mut settings = Settings::default();
        settings.dify.api_key = Some("app-key".into());
        settings.dify.user = "tester".into();
        let agent = DifyAgent::new(&settings, "").unwrap();

        let body = agent.request_body("what?");
        assert_eq!(body["query"], "what?");
        assert_eq!(body["response_mode"], "streaming");
        assert_eq!(body["user"], "tester");
        assert_eq!(body["conversation_id"], "");
        assert_eq!(body["inputs"], json!({}));
        assert_eq!(agent.chat_url(), "https://api.dify.ai/v1/chat-messages");
    }
}
