//! Webhook-style adapter (n8n).
//!
//! Posts `{query, sessionId, chatHistory}` to a configured webhook URL.  The
//! webhook may answer with an event stream, JSON lines, or one JSON/text
//! body; all three are reduced to text through the same field priority:
//! `output`, then `text`, then `message`.

use async_stream::try_stream;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::adapters::{AgentClient, probe};
use crate::config::{N8N_WEBHOOK_URL, N8nSettings, Settings};
use crate::error::{AgentflowError, Result};
use crate::stream::{Frame, Framing, TextStream, decode_frames, guarded, pick_text};
use crate::transport::{self, Transport, bearer};
use crate::types::{ChatTurn, ConnectionInfo, HealthSnapshot, Platform};

/// Reply fields tried in order.
const REPLY_FIELDS: [&str; 3] = ["output", "text", "message"];

/// Content types streamed line by line besides `text/event-stream`.
const JSON_LINES_TYPES: [&str; 2] = ["application/x-ndjson", "application/jsonl"];

/// Adapter for webhook automation backends.
#[derive(Debug)]
pub struct WebhookAgent {
    settings: N8nSettings,
    probe_timeout: std::time::Duration,
    transport: Transport,
}

impl WebhookAgent {
    /// Create an adapter with a fresh transport session.
    pub fn new(settings: &Settings, access_token: &str) -> Result<Self> {
        let transport = Transport::new(Platform::N8n, access_token)?;
        info!(platform = %Platform::N8n, "initialized agent");
        Ok(Self {
            settings: settings.n8n.clone(),
            probe_timeout: settings.probe_timeout,
            transport,
        })
    }

    fn missing_config(&self) -> Vec<&'static str> {
        if self.settings.webhook_url.is_none() {
            vec![N8N_WEBHOOK_URL]
        } else {
            Vec::new()
        }
    }

    fn request_headers(&self) -> Result<HeaderMap> {
        self.transport
            .headers(self.settings.api_key.as_deref().map(bearer))
    }

    fn webhook_url(&self) -> Result<&str> {
        self.settings
            .webhook_url
            .as_deref()
            .ok_or_else(|| AgentflowError::MissingConfig {
                fields: vec![N8N_WEBHOOK_URL.to_owned()],
            })
    }
}

#[async_trait]
impl AgentClient for WebhookAgent {
    fn platform(&self) -> Platform {
        Platform::N8n
    }

    fn get_connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            platform: Platform::N8n.display_name().to_owned(),
            endpoint: self.settings.webhook_url.clone(),
            has_api_key: self.settings.api_key.is_some(),
            timeout: Some(self.settings.timeout.as_secs()),
        }
    }

    async fn health_check(&self) -> HealthSnapshot {
        probe(
            &self.transport,
            self.settings.webhook_url.clone(),
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
        history: &'a [ChatTurn],
    ) -> TextStream<'a> {
        guarded(
            Platform::N8n,
            try_stream! {
                let url = self.webhook_url()?;
                let body = json!({
                    "query": query,
                    "sessionId": session_id,
                    "chatHistory": history,
                });

                let timeout = self.settings.timeout;
                let response = self
                    .transport
                    .post_json(url, self.request_headers()?, &body, timeout)
                    .await?;

                let content_type = transport::content_type(&response);
                let framing = if content_type.contains("text/event-stream") {
                    Some(Framing::EventStream)
                } else if JSON_LINES_TYPES.iter().any(|t| content_type.contains(t)) {
                    Some(Framing::JsonLines)
                } else {
                    None
                };

                if let Some(framing) = framing {
                    debug!(content_type = %content_type, "reading streamed webhook reply");
                    for await chunk in decode_frames(response, framing, timeout, decode_payload) {
                        yield chunk?;
                    }
                } else {
                    let text = transport::read_text(response, timeout).await?;
                    yield text_from_body(&text);
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

/// Decode one event or line of a streamed webhook reply.
fn decode_payload(payload: &str) -> Frame {
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => text_from_value(&value).map_or(Frame::Skip, Frame::Text),
        Err(e) => {
            warn!(error = %e, "webhook stream payload is not JSON; passing it through");
            Frame::Text(payload.to_owned())
        }
    }
}

/// Reduce a complete non-streamed body to one chunk.
fn text_from_body(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => text_from_value(&value).unwrap_or_else(|| body.to_owned()),
        Err(_) => body.to_owned(),
    }
}

fn text_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        // n8n's "Respond to Webhook" node often wraps items in an array.
        Value::Array(items) => items.first().and_then(text_from_value),
        other => pick_text(other, &REPLY_FIELDS),
    }
}
