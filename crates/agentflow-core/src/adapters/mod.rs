//! Platform adapters.
//!
//! Every backend protocol family implements the [`AgentClient`] trait.  The
//! caller never names a concrete adapter: it obtains a `Box<dyn AgentClient>`
//! from [`crate::AgentRegistry::create_agent`] and drives it through the
//! trait alone.
//!
//! | Adapter              | Backend  | Stream shape                 |
//! |----------------------|----------|------------------------------|
//! | [`WebhookAgent`]     | n8n      | SSE / JSON lines / one body  |
//! | [`DifyAgent`]        | Dify     | SSE `event` frames           |
//! | [`LangflowAgent`]    | Langflow | SSE frames / nested JSON     |
//! | [`FlowiseAgent`]     | Flowise  | SSE `event` frames / JSON    |

pub mod dify;
pub mod flowise;
pub mod langflow;
pub mod webhook;

pub use dify::DifyAgent;
pub use flowise::FlowiseAgent;
pub use langflow::LangflowAgent;
pub use webhook::WebhookAgent;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::error::Result;
use crate::stream::TextStream;
use crate::transport::Transport;
use crate::types::{ChatTurn, ConnectionInfo, HealthSnapshot, Platform};

// ---------------------------------------------------------------------------
// Core trait
// ---------------------------------------------------------------------------

/// The capability set every agent workflow adapter provides.
///
/// One instance serves one question (or one probe): create it, use it, then
/// call [`AgentClient::close`].  Instances are not meant to be shared between
/// concurrent questions.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// The platform this adapter was constructed for.
    fn platform(&self) -> Platform;

    /// Connection metadata for display.  Performs no I/O.
    fn get_connection_info(&self) -> ConnectionInfo;

    /// Probe the backend once.
    ///
    /// Missing required configuration short-circuits before any network
    /// call.  Never fails; every outcome is described by the snapshot.
    async fn health_check(&self) -> HealthSnapshot;

    /// Ask `query` with prior conversation `history` and stream the answer.
    ///
    /// The returned stream is lazy: no request is sent until it is first
    /// polled.  It never fails; faults arrive as a single warning chunk.
    fn stream_with_history<'a>(
        &'a self,
        query: &'a str,
        session_id: &'a str,
        history: &'a [ChatTurn],
    ) -> TextStream<'a>;

    /// Ask `query` without conversation history and stream the answer.
    fn stream_response<'a>(&'a self, query: &'a str, session_id: &'a str) -> TextStream<'a> {
        self.stream_with_history(query, session_id, &[])
    }

    /// Release the transport session.  Safe to call more than once.
    fn close(&mut self);
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Run the standard health probe for an adapter.
///
/// `url` is the platform-specific probe target (`None` when it cannot be
/// built), `missing` the names of absent required variables.
pub(crate) async fn probe(
    transport: &Transport,
    url: Option<String>,
    missing: &[&str],
    headers: Result<HeaderMap>,
    timeout: Duration,
) -> HealthSnapshot {
    let platform = transport.platform();
    let url = match url {
        Some(url) if missing.is_empty() => url,
        url => return HealthSnapshot::unconfigured(platform, url, missing),
    };

    match headers {
        Ok(headers) => transport.probe(&url, headers, timeout).await,
        Err(e) => HealthSnapshot::unreachable(platform, Some(url), e.to_string()),
    }
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(
            join_url("https://api.dify.ai/v1/", "/chat-messages"),
            "https://api.dify.ai/v1/chat-messages"
        );
        assert_eq!(
            join_url("http://localhost:7860", "api/v1/run/abc"),
            "http://localhost:7860/api/v1/run/abc"
        );
    }

    #[tokio::test]
    async fn probe_short_circuits_on_missing_config() {
        let transport = Transport::new(Platform::N8n, "").unwrap();
        let snapshot = probe(
            &transport,
            None,
            &["N8N_WEBHOOK_URL"],
            Ok(HeaderMap::new()),
            Duration::from_secs(1),
        )
        .await;
        assert!(!snapshot.configured);
        assert!(!snapshot.ok);
        assert_eq!(snapshot.message, "Missing configuration: N8N_WEBHOOK_URL");
    }
}
