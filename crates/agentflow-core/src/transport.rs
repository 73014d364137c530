//! Shared HTTP mechanics: the per-adapter transport session, header
//! assembly, chat request dispatch and the connectivity probe.
//!
//! Every adapter owns exactly one [`Transport`].  It is never shared between
//! adapters, and releasing it (via [`Transport::close`]) makes every later
//! request fail with [`AgentflowError::SessionClosed`].

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::error::{AgentflowError, Result};
use crate::types::{HealthSnapshot, Platform};

/// Header carrying the caller-supplied access token to downstream tools.
pub const ACCESS_TOKEN_HEADER: &str = "access_token";

/// Longest upstream error body quoted back to the user.
const MAX_ERROR_BODY_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// One adapter's HTTP session.
#[derive(Debug)]
pub struct Transport {
    platform: Platform,
    /// `None` once the session has been closed.
    client: Option<reqwest::Client>,
    access_token: Option<String>,
}

impl Transport {
    /// Open a fresh session.  An empty `access_token` means "none".
    pub fn new(platform: Platform, access_token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("agentflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AgentflowError::Transport {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let access_token = Some(access_token.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_owned);

        Ok(Self {
            platform,
            client: Some(client),
            access_token,
        })
    }

    /// The platform this session belongs to.
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Whether [`Transport::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.client.is_none()
    }

    /// Release the connection pool.  Calling this more than once is a no-op.
    pub fn close(&mut self) {
        if self.client.take().is_some() {
            info!(platform = %self.platform, "closed agent session");
        }
    }

    fn client(&self) -> Result<&reqwest::Client> {
        self.client.as_ref().ok_or(AgentflowError::SessionClosed)
    }

    /// Start a header map with `Content-Type: application/json`, the
    /// adapter's own credential headers, and the access token (if any).
    pub fn headers<I>(&self, auth: I) -> Result<HeaderMap>
    where
        I: IntoIterator<Item = (HeaderName, String)>,
    {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (name, value) in auth {
            let value = header_value(name.as_str(), &value)?;
            headers.insert(name, value);
        }

        if let Some(token) = &self.access_token {
            headers.insert(
                HeaderName::from_static(ACCESS_TOKEN_HEADER),
                header_value(ACCESS_TOKEN_HEADER, token)?,
            );
        }

        Ok(headers)
    }

    /// POST a JSON body and wait for the response head.
    ///
    /// `timeout` bounds the wait for the response head only; stream readers
    /// apply it again to every body read.  Non-2xx answers are turned into
    /// [`AgentflowError::UpstreamStatus`] with a truncated body.
    pub async fn post_json(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &Value,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let client = self.client()?;
        info!(platform = %self.platform, url = %url, "sending agent request");

        let pending = client.post(url).headers(headers).json(body).send();
        let response = tokio::time::timeout(timeout, pending)
            .await
            .map_err(|_| AgentflowError::Timeout {
                seconds: timeout.as_secs(),
            })??;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = read_text(response, timeout).await.unwrap_or_default();
        Err(AgentflowError::UpstreamStatus {
            platform: self.platform.display_name().to_owned(),
            status: status.as_u16(),
            body: truncate(body.trim(), MAX_ERROR_BODY_CHARS),
        })
    }

    /// Issue one GET against `url` and classify the outcome.
    ///
    /// Never fails: network errors become an `ok = false` snapshot without a
    /// status code.
    pub async fn probe(&self, url: &str, headers: HeaderMap, timeout: Duration) -> HealthSnapshot {
        let url_field = Some(url.to_owned());
        let client = match self.client() {
            Ok(client) => client,
            Err(e) => return HealthSnapshot::unreachable(self.platform, url_field, e.to_string()),
        };

        debug!(platform = %self.platform, url = %url, "probing endpoint");

        match client.get(url).headers(headers).timeout(timeout).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(platform = %self.platform, status, "probe answered");
                HealthSnapshot::from_status(self.platform, url_field, status)
            }
            Err(e) => {
                error!(platform = %self.platform, error = %e, "health check failed");
                HealthSnapshot::unreachable(self.platform, url_field, probe_failure_message(&e, timeout))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `Bearer <key>` credential for the `Authorization` header.
pub fn bearer(api_key: &str) -> (HeaderName, String) {
    (AUTHORIZATION, format!("Bearer {api_key}"))
}

/// Whether a response declares an event-stream body.
pub fn is_event_stream(response: &reqwest::Response) -> bool {
    content_type(response).contains("text/event-stream")
}

/// Lower-cased `Content-Type` of a response, or an empty string.
pub fn content_type(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Read a whole (non-streamed) response body as text.
pub async fn read_text(response: reqwest::Response, timeout: Duration) -> Result<String> {
    tokio::time::timeout(timeout, response.text())
        .await
        .map_err(|_| AgentflowError::Timeout {
            seconds: timeout.as_secs(),
        })?
        .map_err(AgentflowError::from)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| AgentflowError::InvalidHeader {
        name: name.to_owned(),
        reason: e.to_string(),
    })
}

fn probe_failure_message(err: &reqwest::Error, timeout: Duration) -> String {
    if err.is_timeout() {
        format!("Connection timed out after {}s", timeout.as_secs_f32())
    } else if err.is_connect() {
        format!("Connection failed: {err}")
    } else {
        err.to_string()
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_owned(),
    }
}
