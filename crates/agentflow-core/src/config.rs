//! Adapter configuration.
//!
//! All environment reads happen here, once, when [`Settings`] is built.
//! Adapters receive the resolved settings at construction time and never
//! consult the process environment afterwards.
//!
//! Resolution order for every key: the real process environment, then a
//! `.env` file (if one was loaded), then the built-in default.  Empty values
//! count as unset.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::types::AgentDescriptor;

// ---------------------------------------------------------------------------
// Environment variable names
// ---------------------------------------------------------------------------

pub const N8N_WEBHOOK_URL: &str = "N8N_WEBHOOK_URL";
pub const N8N_API_KEY: &str = "N8N_API_KEY";
pub const DIFY_API_URL: &str = "DIFY_API_URL";
pub const DIFY_API_KEY: &str = "DIFY_API_KEY";
pub const DIFY_USER: &str = "DIFY_USER";
pub const LANGFLOW_API_URL: &str = "LANGFLOW_API_URL";
pub const LANGFLOW_FLOW_ID: &str = "LANGFLOW_FLOW_ID";
pub const LANGFLOW_API_KEY: &str = "LANGFLOW_API_KEY";
pub const FLOWISE_API_URL: &str = "FLOWISE_API_URL";
pub const FLOWISE_CHATFLOW_ID: &str = "FLOWISE_CHATFLOW_ID";
pub const FLOWISE_API_KEY: &str = "FLOWISE_API_KEY";

/// Optional JSON array of `{"id", "label"}` restricting the agent picker.
pub const AGENT_REGISTRY_JSON: &str = "AGENT_REGISTRY_JSON";

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const DEFAULT_DIFY_API_URL: &str = "https://api.dify.ai/v1";
const DEFAULT_DIFY_USER: &str = "streamlit-user";
const DEFAULT_LANGFLOW_API_URL: &str = "http://localhost:7860";
const DEFAULT_FLOWISE_API_URL: &str = "http://localhost:3000";

/// Webhook chat request timeout.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Chat request timeout for the API-style platforms.
const API_TIMEOUT: Duration = Duration::from_secs(60);

/// Connectivity probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Per-platform settings
// ---------------------------------------------------------------------------

/// Webhook adapter settings.
#[derive(Debug, Clone)]
pub struct N8nSettings {
    pub webhook_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// Whether Dify should stream the answer or return it in one reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseMode {
    #[default]
    Streaming,
    Blocking,
}

impl ResponseMode {
    /// Wire value of the `response_mode` request field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::Blocking => "blocking",
        }
    }
}

/// SSE chat adapter settings.
#[derive(Debug, Clone)]
pub struct DifySettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub user: String,
    pub response_mode: ResponseMode,
    pub timeout: Duration,
}

/// Flow run adapter settings.
#[derive(Debug, Clone)]
pub struct LangflowSettings {
    pub api_url: String,
    pub flow_id: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// Prediction adapter settings.
#[derive(Debug, Clone)]
pub struct FlowiseSettings {
    pub api_url: String,
    pub chatflow_id: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Fully resolved configuration for every platform adapter.
#[derive(Debug, Clone)]
pub struct Settings {
    pub n8n: N8nSettings,
    pub dify: DifySettings,
    pub langflow: LangflowSettings,
    pub flowise: FlowiseSettings,
    /// Timeout applied to every `health_check` probe.
    pub probe_timeout: Duration,
    /// Agent picker override parsed from [`AGENT_REGISTRY_JSON`].
    pub registry_override: Option<Vec<AgentDescriptor>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Settings {
    /// Build settings from an arbitrary key lookup.
    ///
    /// This is the single place where variable names meet values; the other
    /// constructors only decide where values come from.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_owned());

        Self {
            n8n: N8nSettings {
                webhook_url: get(N8N_WEBHOOK_URL),
                api_key: get(N8N_API_KEY),
                timeout: WEBHOOK_TIMEOUT,
            },
            dify: DifySettings {
                api_url: get_or(DIFY_API_URL, DEFAULT_DIFY_API_URL),
                api_key: get(DIFY_API_KEY),
                user: get_or(DIFY_USER, DEFAULT_DIFY_USER),
                response_mode: ResponseMode::default(),
                timeout: API_TIMEOUT,
            },
            langflow: LangflowSettings {
                api_url: get_or(LANGFLOW_API_URL, DEFAULT_LANGFLOW_API_URL),
                flow_id: get(LANGFLOW_FLOW_ID),
                api_key: get(LANGFLOW_API_KEY),
                timeout: API_TIMEOUT,
            },
            flowise: FlowiseSettings {
                api_url: get_or(FLOWISE_API_URL, DEFAULT_FLOWISE_API_URL),
                chatflow_id: get(FLOWISE_CHATFLOW_ID),
                api_key: get(FLOWISE_API_KEY),
                timeout: API_TIMEOUT,
            },
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            registry_override: get(AGENT_REGISTRY_JSON)
                .and_then(|raw| parse_registry_override(&raw)),
        }
    }

    /// Build settings from the process environment only.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from the process environment, falling back to the
    /// values of a `.env` file.
    ///
    /// The file only fills keys the process environment does not set, so
    /// deployment-provided variables always win.  A missing file is fine.
    pub fn load(dotenv_path: &Path) -> Self {
        let file_vars = read_dotenv(dotenv_path);
        Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .or_else(|| file_vars.get(key).cloned())
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read `KEY=value` pairs from a `.env` file without touching the process
/// environment.
///
/// Returns an empty map when the file does not exist.  Lines `dotenvy`
/// cannot parse are skipped with a warning.
pub fn read_dotenv(path: &Path) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return vars;
    }

    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to open .env file");
            return vars;
        }
    };

    for item in iter {
        match item {
            Ok((key, value)) => {
                vars.insert(key, value);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed .env line"),
        }
    }

    debug!(path = %path.display(), count = vars.len(), "loaded .env file");
    vars
}

/// Parse the [`AGENT_REGISTRY_JSON`] value.  Invalid JSON is logged and
/// ignored so the built-in agent list stays available.
fn parse_registry_override(raw: &str) -> Option<Vec<AgentDescriptor>> {
    match serde_json::from_str::<Vec<AgentDescriptor>>(raw) {
        Ok(entries) => Some(entries),
        Err(e) => {
            warn!(error = %e, "ignoring invalid {AGENT_REGISTRY_JSON}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let settings = Settings::default();
        assert_eq!(settings.n8n.webhook_url, None);
        assert_eq!(settings.dify.api_url, "https://api.dify.ai/v1");
        assert_eq!(settings.dify.user, "streamlit-user");
        assert_eq!(settings.dify.response_mode, ResponseMode::Streaming);
        assert_eq!(settings.langflow.api_url, "http://localhost:7860");
        assert_eq!(settings.flowise.api_url, "http://localhost:3000");
        assert_eq!(settings.n8n.timeout, Duration::from_secs(30));
        assert_eq!(settings.dify.timeout, Duration::from_secs(60));
        assert_eq!(settings.probe_timeout, Duration::from_secs(5));
        assert!(settings.registry_override.is_none());
    }

    #[test]
    fn empty_values_count_as_unset() {
        let settings = Settings::from_lookup(lookup(&[
            (DIFY_API_URL, ""),
            (DIFY_API_KEY, "   "),
            (N8N_WEBHOOK_URL, "https://n8n.local/webhook/chat"),
        ]));
        assert_eq!(settings.dify.api_url, "https://api.dify.ai/v1");
        assert_eq!(settings.dify.api_key, None);
        assert_eq!(
            settings.n8n.webhook_url.as_deref(),
            Some("https://n8n.local/webhook/chat")
        );
    }

    #[test]
    fn registry_override_parses() {
        let settings = Settings::from_lookup(lookup(&[(
            AGENT_REGISTRY_JSON,
            r#"[{"id":"dify","label":"Support bot"}]"#,
        )]));
        let entries = settings.registry_override.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].label, "Support bot");
    }

    #[test]
    fn invalid_registry_override_is_ignored() {
        let settings = Settings::from_lookup(lookup(&[(AGENT_REGISTRY_JSON, "{not json")]));
        assert!(settings.registry_override.is_none());
    }

    #[test]
    fn dotenv_fills_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# local dev\nLANGFLOW_FLOW_ID=flow-123\nFLOWISE_CHATFLOW_ID=\"cf-9\"\n",
        )
        .unwrap();

        let vars = read_dotenv(&path);
        assert_eq!(vars.get("LANGFLOW_FLOW_ID").map(String::as_str), Some("flow-123"));
        assert_eq!(vars.get("FLOWISE_CHATFLOW_ID").map(String::as_str), Some("cf-9"));
    }

    #[test]
    fn missing_dotenv_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_dotenv(&dir.path().join("nope.env")).is_empty());
    }
}
