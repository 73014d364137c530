//! Flow run adapter (Langflow).
//!
//! Posts to `/api/v1/run/{flow_id}`.  A streamed reply carries `data:` JSON
//! frames with the text in `chunk` or `text` (or `data.chunk` for `token`
//! events); a blocking reply nests the message inside
//! `outputs[0].outputs[0]`, where several layouts exist across Langflow
//! versions.

use async_stream::try_stream;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName};
use serde_json::{Value, json};
use tracing::{debug, info, trace, warn};

use crate::adapters::{AgentClient, join_url, probe};
use crate::config::{LANGFLOW_FLOW_ID, LangflowSettings, Settings};
use crate::error::{AgentflowError, Result};
use crate::stream::{Frame, Framing, TextStream, decode_frames, guarded, pick_text, warning};
use crate::transport::{self, Transport};
use crate::types::{ChatTurn, ConnectionInfo, HealthSnapshot, Platform};

/// Header Langflow reads its API key from.
const API_KEY_HEADER: &str = "x-api-key";

/// Streamed frame fields tried in order.
const CHUNK_FIELDS: [&str; 2] = ["chunk", "text"];

/// Blocking-reply locations of the message text inside `outputs[0].outputs[0]`.
const MESSAGE_POINTERS: [&str; 6] = [
    "/results/message/text",
    "/results/message/data/text",
    "/artifacts/message",
    "/outputs/message/message/text",
    "/outputs/message/message",
    "/messages/0/message",
];

/// Adapter for the Langflow run API.
#[derive(Debug)]
pub struct LangflowAgent {
    settings: LangflowSettings,
    probe_timeout: std::time::Duration,
    transport: Transport,
}

impl LangflowAgent {
    /// Create an adapter with a fresh transport session.
    pub fn new(settings: &Settings, access_token: &str) -> Result<Self> {
        let transport = Transport::new(Platform::Langflow, access_token)?;
        info!(platform = %Platform::Langflow, "initialized agent");
        Ok(Self {
            settings: settings.langflow.clone(),
            probe_timeout: settings.probe_timeout,
            transport,
        })
    }

    /// Run endpoint for the configured flow, if a flow id is set.
    pub fn run_url(&self) -> Option<String> {
        self.settings
            .flow_id
            .as_deref()
            .map(|flow_id| join_url(&self.settings.api_url, &format!("api/v1/run/{flow_id}")))
    }

    fn request_headers(&self) -> Result<HeaderMap> {
        let api_key = self
            .settings
            .api_key
            .clone()
            .map(|key| (HeaderName::from_static(API_KEY_HEADER), key));
        self.transport.headers(api_key)
    }

    fn request_body(query: &str, session_id: &str, stream: bool) -> Value {
        json!({
            "input_value": query,
            "output_type": "chat",
            "input_type": "chat",
            "session_id": session_id,
            "stream": stream,
        })
    }
}

#[async_trait]
impl AgentClient for LangflowAgent {
    fn platform(&self) -> Platform {
        Platform::Langflow
    }

    fn get_connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            platform: Platform::Langflow.display_name().to_owned(),
            endpoint: self.run_url(),
            has_api_key: self.settings.api_key.is_some(),
            timeout: Some(self.settings.timeout.as_secs()),
        }
    }

    async fn health_check(&self) -> HealthSnapshot {
        let missing: &[&str] = if self.settings.flow_id.is_none() {
            &[LANGFLOW_FLOW_ID]
        } else {
            &[]
        };
        probe(
            &self.transport,
            self.run_url(),
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
        _history: &'a [ChatTurn],
    ) -> TextStream<'a> {
        guarded(
            Platform::Langflow,
            try_stream! {
                let url = self.run_url().ok_or_else(|| AgentflowError::MissingConfig {
                    fields: vec![LANGFLOW_FLOW_ID.to_owned()],
                })?;
                let url = format!("{url}?stream=true");

                let timeout = self.settings.timeout;
                let response = self
                    .transport
                    .post_json(
                        &url,
                        self.request_headers()?,
                        &Self::request_body(query, session_id, true),
                        timeout,
                    )
                    .await?;

                if transport::is_event_stream(&response) {
                    let frames = decode_frames(response, Framing::EventStream, timeout, decode_frame);
                    for await chunk in frames {
                        yield chunk?;
                    }
                } else {
                    debug!("langflow answered without streaming");
                    let text = transport::read_text(response, timeout).await?;
                    yield text_from_run_body(&text);
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

/// Decode the data of one SSE event of a streamed run.
fn decode_frame(payload: &str) -> Frame {
    let data: Value = match serde_json::from_str(payload) {
        Ok(data) => data,
        Err(e) => {
            warn!(error = %e, "langflow frame is not JSON; passing it through");
            return Frame::Text(payload.to_owned());
        }
    };

    match data["event"].as_str().unwrap_or_default() {
        "end" => Frame::Done,
        "error" => {
            let message = pick_text(&data["data"], &["error", "message", "text"])
                .or_else(|| data["data"].as_str().map(str::to_owned))
                .unwrap_or_else(|| "Unknown error".to_owned());
            Frame::Fail(warning(format!("LangFlow error: {message}")))
        }
        event => {
            let text = pick_text(&data, &CHUNK_FIELDS).or_else(|| {
                (event == "token")
                    .then(|| pick_text(&data["data"], &["chunk"]))
                    .flatten()
            });
            match text {
                Some(text) => Frame::Text(text),
                None => {
                    trace!(event, "langflow frame without text");
                    Frame::Skip
                }
            }
        }
    }
}

/// Reduce a blocking run reply to one chunk.
///
/// Falls back to the raw JSON when no known message layout matches, and to
/// the raw body when it is not JSON at all.
fn text_from_run_body(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.to_owned();
    };

    let message = value
        .pointer("/outputs/0/outputs/0")
        .and_then(|output| {
            MESSAGE_POINTERS
                .iter()
                .filter_map(|pointer| output.pointer(pointer))
                .find_map(|v| v.as_str().filter(|s| !s.is_empty()))
        })
        .map(str::to_owned);

    message.unwrap_or_else(|| value.to_string())
}
