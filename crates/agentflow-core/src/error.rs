//! Adapter-layer error types.
//!
//! Every fault inside the adapter layer is expressed as an [`AgentflowError`].
//! Only [`crate::AgentRegistry::create_agent`] hands these to callers; the
//! streaming and probing operations translate them into warning chunks and
//! [`crate::HealthSnapshot`] fields at the adapter boundary.

/// Unified error type for the agentflow adapter layer.
#[derive(Debug, thiserror::Error)]
pub enum AgentflowError {
    // -- Registry ------------------------------------------------------------
    /// The requested agent id is not registered.
    #[error("unknown agent: `{id}`")]
    UnknownAgent { id: String },

    // -- Configuration -------------------------------------------------------
    /// One or more required environment variables are absent.
    #[error("Missing configuration: {}", fields.join(", "))]
    MissingConfig { fields: Vec<String> },

    /// Configuration could not be loaded or interpreted.
    #[error("config error: {reason}")]
    Config { reason: String },

    // -- Transport -----------------------------------------------------------
    /// Connection, DNS, TLS or other network failure.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// The backend did not answer within the adapter's timeout.
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// A chat request came back with a non-success status code.
    #[error("{platform} returned HTTP {status}: {body}")]
    UpstreamStatus {
        platform: String,
        status: u16,
        body: String,
    },

    /// A header value (API key or access token) contains invalid bytes.
    #[error("invalid value for header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },

    /// The adapter's transport session was already released.
    #[error("agent session is closed")]
    SessionClosed,

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the adapter crate.
pub type Result<T> = std::result::Result<T, AgentflowError>;

impl From<reqwest::Error> for AgentflowError {
    fn from(err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            format!("request timed out: {err}")
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            err.to_string()
        };
        Self::Transport { reason }
    }
}
