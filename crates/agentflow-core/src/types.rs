//! Data types shared by every adapter and by the registry.
//!
//! None of these are persisted by the adapter layer.  Callers may cache
//! [`HealthSnapshot`] values, but the cache belongs to them.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Platform identity
// ---------------------------------------------------------------------------

/// The backend protocol family an adapter speaks.
///
/// An adapter is constructed with exactly one platform and never changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Plain webhook automation (n8n).
    N8n,
    /// SSE chat-messages API (Dify).
    Dify,
    /// Flow run API (Langflow).
    Langflow,
    /// Chatflow prediction API (Flowise).
    Flowise,
}

impl Platform {
    /// Every platform, in registration order.
    pub const ALL: [Platform; 4] = [
        Platform::N8n,
        Platform::Dify,
        Platform::Langflow,
        Platform::Flowise,
    ];

    /// Registry identifier (`n8n`, `dify`, `langflow`, `flowise`).
    pub fn id(self) -> &'static str {
        match self {
            Self::N8n => "n8n",
            Self::Dify => "dify",
            Self::Langflow => "langflow",
            Self::Flowise => "flowise",
        }
    }

    /// Name shown in health snapshots and warning chunks.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::N8n => "n8n",
            Self::Dify => "Dify",
            Self::Langflow => "LangFlow",
            Self::Flowise => "Flowise",
        }
    }

    /// Look up a platform by registry identifier.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.id() == id)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

// ---------------------------------------------------------------------------
// Registry-facing types
// ---------------------------------------------------------------------------

/// An entry in the agent picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Registry identifier passed to `create_agent`.
    pub id: String,
    /// Human-readable label.
    pub label: String,
}

/// Display-only view of an agent's environment configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEnvConfig {
    /// Name of the environment variable holding the endpoint URL.
    pub url_env: String,
    /// Whether the platform's API key variable is set.
    pub has_api_key: bool,
}

/// Required and optional environment variables of one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvRequirements {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

// ---------------------------------------------------------------------------
// Adapter-facing types
// ---------------------------------------------------------------------------

/// Connection metadata derived from an adapter's resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub platform: String,
    pub endpoint: Option<String>,
    pub has_api_key: bool,
    /// Chat request timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// Result of one connectivity probe.
///
/// `configured == false` always comes with `ok == false` and no status code;
/// use [`HealthSnapshot::unconfigured`] to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub ok: bool,
    pub configured: bool,
    pub platform: String,
    pub url: Option<String>,
    pub status_code: Option<u16>,
    pub message: String,
}

impl HealthSnapshot {
    /// Snapshot for an adapter whose required configuration is absent.
    pub fn unconfigured(platform: Platform, url: Option<String>, missing: &[&str]) -> Self {
        Self {
            ok: false,
            configured: false,
            platform: platform.display_name().to_owned(),
            url,
            status_code: None,
            message: format!("Missing configuration: {}", missing.join(", ")),
        }
    }

    /// Snapshot for a probe that never got an HTTP status back.
    pub fn unreachable(platform: Platform, url: Option<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            configured: true,
            platform: platform.display_name().to_owned(),
            url,
            status_code: None,
            message: message.into(),
        }
    }

    /// Snapshot for a probe that received `status_code`.
    ///
    /// Anything below 500 counts as reachable: chat and webhook endpoints
    /// routinely answer a bare GET with 401/403/404/405.
    pub fn from_status(platform: Platform, url: Option<String>, status_code: u16) -> Self {
        let message = match status_code {
            200..=299 => "Connected".to_owned(),
            401 | 403 => format!("Reachable (authentication issue, HTTP {status_code})"),
            404 | 405 => format!("Reachable (endpoint/method probe returned HTTP {status_code})"),
            other => format!("HTTP {other}"),
        };
        Self {
            ok: status_code < 500,
            configured: true,
            platform: platform.display_name().to_owned(),
            url,
            status_code: Some(status_code),
            message,
        }
    }
}

/// Who said a line of conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of conversation history forwarded to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    /// A user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// An assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_ids_round_trip() {
        for platform in Platform::ALL {
            assert_eq!(Platform::from_id(platform.id()), Some(platform));
        }
        assert_eq!(Platform::from_id("zapier"), None);
    }

    #[test]
    fn status_buckets() {
        let ok = HealthSnapshot::from_status(Platform::N8n, None, 204);
        assert!(ok.ok);
        assert_eq!(ok.message, "Connected");

        let auth = HealthSnapshot::from_status(Platform::Dify, None, 403);
        assert!(auth.ok);
        assert_eq!(auth.message, "Reachable (authentication issue, HTTP 403)");

        let probe = HealthSnapshot::from_status(Platform::Flowise, None, 405);
        assert!(probe.ok);
        assert!(probe.message.contains("endpoint/method probe"));

        let teapot = HealthSnapshot::from_status(Platform::Langflow, None, 418);
        assert!(teapot.ok);
        assert_eq!(teapot.message, "HTTP 418");

        let down = HealthSnapshot::from_status(Platform::Langflow, None, 502);
        assert!(!down.ok);
        assert_eq!(down.status_code, Some(502));
    }

    #[test]
    fn unconfigured_snapshot_invariant() {
        let snapshot = HealthSnapshot::unconfigured(
            Platform::Dify,
            Some("https://api.dify.ai/v1/chat-messages".into()),
            &["DIFY_API_KEY"],
        );
        assert!(!snapshot.configured);
        assert!(!snapshot.ok);
        assert_eq!(snapshot.status_code, None);
        assert_eq!(snapshot.message, "Missing configuration: DIFY_API_KEY");
    }

    #[test]
    fn chat_turn_serializes_lowercase_role() {
        let json = serde_json::to_value(ChatTurn::assistant("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }
}
