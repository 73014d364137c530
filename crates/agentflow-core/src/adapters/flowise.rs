//! Prediction adapter (Flowise).
//!
//! Posts to `/api/v1/prediction/{chatflow_id}` with `streaming: true`.
//! Flowise streams `data: {"event": ..., "data": ...}` frames when the
//! chatflow supports it and otherwise answers with one JSON document.

use async_stream::try_stream;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{Value, json};
use tracing::{debug, info, trace, warn};

use crate::adapters::{AgentClient, join_url, probe};
use crate::config::{FLOWISE_CHATFLOW_ID, FlowiseSettings, Settings};
use crate::error::{AgentflowError, Result};
use crate::stream::{Frame, Framing, TextStream, decode_frames, guarded, pick_text, warning};
use crate::transport::{self, Transport, bearer};
use crate::types::{ChatRole, ChatTurn, ConnectionInfo, HealthSnapshot, Platform};

/// Blocking reply fields tried in order.
const ANSWER_FIELDS: [&str; 3] = ["text", "answer", "output"];

/// Adapter for the Flowise prediction API.
#[derive(Debug)]
pub struct FlowiseAgent {
    settings: FlowiseSettings,
    probe_timeout: std::time::Duration,
    transport: Transport,
}

impl FlowiseAgent {
    /// Create an adapter with a fresh transport session.
    pub fn new(settings: &Settings, access_token: &str) -> Result<Self> {
        let transport = Transport::new(Platform::Flowise, access_token)?;
        info!(platform = %Platform::Flowise, "initialized agent");
        Ok(Self {
            settings: settings.flowise.clone(),
            probe_timeout: settings.probe_timeout,
            transport,
        })
    }

    /// Prediction endpoint for the configured chatflow, if one is set.
    pub fn prediction_url(&self) -> Option<String> {
        self.settings.chatflow_id.as_deref().map(|chatflow_id| {
            join_url(
                &self.settings.api_url,
                &format!("api/v1/prediction/{chatflow_id}"),
            )
        })
    }

    fn request_headers(&self) -> Result<HeaderMap> {
        self.transport
            .headers(self.settings.api_key.as_deref().map(bearer))
    }

    fn request_body(query: &str, session_id: &str, history: &[ChatTurn]) -> Value {
        let history: Vec<Value> = history
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    ChatRole::User => "userMessage",
                    ChatRole::Assistant => "apiMessage",
                };
                json!({ "role": role, "content": turn.content })
            })
            .collect();

        json!({
            "question": query,
            "sessionId": session_id,
            "streaming": true,
            "history": history,
        })
    }
}

#[async_trait]
impl AgentClient for FlowiseAgent {
    fn platform(&self) -> Platform {
        Platform::Flowise
    }

    fn get_connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            platform: Platform::Flowise.display_name().to_owned(),
            endpoint: self.prediction_url(),
            has_api_key: self.settings.api_key.is_some(),
            timeout: Some(self.settings.timeout.as_secs()),
        }
    }

    async fn health_check(&self) -> HealthSnapshot {
        let missing: &[&str] = if self.settings.chatflow_id.is_none() {
            &[FLOWISE_CHATFLOW_ID]
        } else {
            &[]
        };
        probe(
            &self.transport,
            self.prediction_url(),
            missing,
            self.request_headers(),
            self.probe_timeout,
        )
        .await
    }

    fn stream_with_history<'a>(
        &'a self,
        query: &'a str,
        session_id: &'a str,
        history: &'a [ChatTurn],
    ) -> TextStream<'a> {
        guarded(
            Platform::Flowise,
            try_stream! {
                let url = self.prediction_url().ok_or_else(|| AgentflowError::MissingConfig {
                    fields: vec![FLOWISE_CHATFLOW_ID.to_owned()],
                })?;

                let timeout = self.settings.timeout;
                let response = self
                    .transport
                    .post_json(
                        &url,
                        self.request_headers()?,
                        &Self::request_body(query, session_id, history),
                        timeout,
                    )
                    .await?;

                if transport::is_event_stream(&response) {
                    let frames = decode_frames(response, Framing::EventStream, timeout, decode_event);
                    for await chunk in frames {
                        yield chunk?;
                    }
                } else {
                    debug!("flowise answered without streaming");
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

/// Decode the data of one SSE event of a streamed prediction.
fn decode_event(payload: &str) -> Frame {
    let data: Value = match serde_json::from_str(payload) {
        Ok(data) => data,
        Err(e) => {
            warn!(error = %e, "flowise frame is not JSON; passing it through");
            return Frame::Text(payload.to_owned());
        }
    };

    match data["event"].as_str().unwrap_or_default() {
        "token" | "message" => {
            let text = match &data["data"] {
                Value::String(s) => Some(s.clone()),
                _ => pick_text(&data, &["text"]),
            };
            text.map_or(Frame::Skip, Frame::Text)
        }
        "end" => Frame::Done,
        "error" => {
            let message = match &data["data"] {
                Value::String(s) if !s.is_empty() => s.clone(),
                other => pick_text(other, &["message", "error"])
                    .unwrap_or_else(|| "Unknown error".to_owned()),
            };
            warn!(message = %message, "flowise reported an error");
            Frame::Fail(warning(format!("Flowise error: {message}")))
        }
        other => {
            trace!(event = other, "ignoring flowise event");
            Frame::Skip
        }
    }
}

/// Extract the answer from a non-streamed prediction reply.
fn answer_from_body(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| pick_text(&value, &ANSWER_FIELDS))
        .unwrap_or_else(|| body.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_and_message_events_emit_text() {
        assert_eq!(
            decode_event(r#"{"event":"token","data":"Hel"}"#),
            Frame::Text("Hel".into())
        );
        assert_eq!(
            decode_event(r#"{"event":"message","text":"lo"}"#),
            Frame::Text("lo".into())
        );
        assert_eq!(decode_event(r#"{"event":"token","data":""}"#), Frame::Text(String::new()));
        assert_eq!(decode_event(r#"{"event":"start","data":"x"}"#), Frame::Skip);
        assert_eq!(
            decode_event(r#"{"event":"metadata","data":{"chatId":"1"}}"#),
            Frame::Skip
        );
    }

    #[test]
    fn end_and_error_events_stop() {
        assert_eq!(decode_event(r#"{"event":"end","data":"[DONE]"}"#), Frame::Done);
        assert_eq!(
            decode_event(r#"{"event":"error","data":"chatflow not found"}"#),
            Frame::Fail("⚠️ Flowise error: chatflow not found".into())
        );
        assert_eq!(
            decode_event(r#"{"event":"error"}"#),
            Frame::Fail("⚠️ Flowise error: Unknown error".into())
        );
    }

    #[test]
    fn non_json_payload_passes_through() {
        assert_eq!(decode_event("not json"), Frame::Text("not json".into()));
    }

    #[test]
    fn blocking_answer_fields() {
        assert_eq!(answer_from_body(r#"{"text":"t","answer":"a"}"#), "t");
        assert_eq!(answer_from_body(r#"{"answer":"a"}"#), "a");
        assert_eq!(answer_from_body(r#"{"output":"o"}"#), "o");
        assert_eq!(answer_from_body(r#"{"chatId":"1"}"#), r#"{"chatId":"1"}"#);
        assert_eq!(answer_from_body("plain"), "plain");
    }

    #[test]
    fn history_uses_flowise_roles() {
        let history = vec![ChatTurn::user("hi"), ChatTurn::assistant("hello")];
        let body = FlowiseAgent::request_body("again", "s-9", &history);
        assert_eq!(
            body,
            json!({
                "question": "again",
                "sessionId": "s-9",
                "streaming": true,
                "history": [
                    {"role": "userMessage", "content": "hi"},
                    {"role": "apiMessage", "content": "hello"},
                ],
            })
        );
    }

    #[test]
    fn prediction_url_requires_chatflow() {
        let mut settings = Settings::default();
        assert_eq!(FlowiseAgent::new(&settings, "").unwrap().prediction_url(), None);

        settings.flowise.chatflow_id = Some("cf-1".into());
        settings.flowise.api_url = "http://flowise:3000/".into();
        assert_eq!(
            FlowiseAgent::new(&settings, "").unwrap().prediction_url().as_deref(),
            Some("http://flowise:3000/api/v1/prediction/cf-1")
        );
    }
}
