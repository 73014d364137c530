//! Agent registry: platform identifier → label and constructor.
//!
//! The registry is the only place that names concrete adapters.  Callers list
//! the available agents, create one per question with
//! [`AgentRegistry::create_agent`], and use the returned trait object.

use tracing::{debug, warn};

use crate::adapters::{AgentClient, DifyAgent, FlowiseAgent, LangflowAgent, WebhookAgent};
use crate::config::{
    AGENT_REGISTRY_JSON, DIFY_API_KEY, DIFY_API_URL, DIFY_USER, FLOWISE_API_KEY, FLOWISE_API_URL,
    FLOWISE_CHATFLOW_ID, LANGFLOW_API_KEY, LANGFLOW_API_URL, LANGFLOW_FLOW_ID, N8N_API_KEY,
    N8N_WEBHOOK_URL, Settings,
};
use crate::error::{AgentflowError, Result};
use crate::types::{AgentDescriptor, AgentEnvConfig, EnvRequirements, Platform};

/// Builds a fresh adapter from settings and a caller access token.
pub type AgentConstructor = fn(&Settings, &str) -> Result<Box<dyn AgentClient>>;

#[derive(Debug, Clone)]
struct RegistryEntry {
    platform: Platform,
    label: String,
    constructor: AgentConstructor,
}

/// Built-in agents in registration order.
const BUILTIN: [(Platform, &str, AgentConstructor); 4] = [
    (Platform::N8n, "n8n Webhook", create_webhook),
    (Platform::Dify, "Dify", create_dify),
    (Platform::Langflow, "Langflow", create_langflow),
    (Platform::Flowise, "Flowise", create_flowise),
];

fn create_webhook(settings: &Settings, access_token: &str) -> Result<Box<dyn AgentClient>> {
    Ok(Box::new(WebhookAgent::new(settings, access_token)?))
}

fn create_dify(settings: &Settings, access_token: &str) -> Result<Box<dyn AgentClient>> {
    Ok(Box::new(DifyAgent::new(settings, access_token)?))
}

fn create_langflow(settings: &Settings, access_token: &str) -> Result<Box<dyn AgentClient>> {
    Ok(Box::new(LangflowAgent::new(settings, access_token)?))
}

fn create_flowise(settings: &Settings, access_token: &str) -> Result<Box<dyn AgentClient>> {
    Ok(Box::new(FlowiseAgent::new(settings, access_token)?))
}

/// Static mapping of agent ids to adapters, bound to one [`Settings`].
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    settings: Settings,
    entries: Vec<RegistryEntry>,
}

impl AgentRegistry {
    /// Create a registry over `settings`.
    ///
    /// When the settings carry an [`AGENT_REGISTRY_JSON`] override, it
    /// selects, orders and relabels the built-in agents.  Unknown ids in the
    /// override are skipped; an override naming no known agent is ignored.
    pub fn new(settings: Settings) -> Self {
        let builtin: Vec<RegistryEntry> = BUILTIN
            .iter()
            .map(|(platform, label, constructor)| RegistryEntry {
                platform: *platform,
                label: (*label).to_owned(),
                constructor: *constructor,
            })
            .collect();

        let entries = match &settings.registry_override {
            Some(descriptors) => apply_override(&builtin, descriptors),
            None => builtin,
        };

        debug!(agents = entries.len(), "agent registry ready");
        Self { settings, entries }
    }

    /// Registry over [`Settings::from_env`].
    pub fn from_env() -> Self {
        Self::new(Settings::from_env())
    }

    /// The settings every created adapter is built from.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Every registered agent, in registration order.
    pub fn list_available_agents(&self) -> Vec<AgentDescriptor> {
        self.entries
            .iter()
            .map(|entry| AgentDescriptor {
                id: entry.platform.id().to_owned(),
                label: entry.label.clone(),
            })
            .collect()
    }

    /// Whether `id` names a registered agent.
    pub fn contains(&self, id: &str) -> bool {
        self.entry(id).is_some()
    }

    /// Construct a fresh adapter (with its own transport session) for `id`.
    ///
    /// Fails with [`AgentflowError::UnknownAgent`] before anything is built
    /// when `id` is not registered.
    pub fn create_agent(&self, id: &str, access_token: &str) -> Result<Box<dyn AgentClient>> {
        let entry = self.entry(id).ok_or_else(|| AgentflowError::UnknownAgent {
            id: id.to_owned(),
        })?;
        (entry.constructor)(&self.settings, access_token)
    }

    /// Display-only view of an agent's configuration.  Unknown ids yield
    /// the empty default.
    pub fn get_agent_env_config(&self, id: &str) -> AgentEnvConfig {
        let Some(entry) = self.entry(id) else {
            return AgentEnvConfig::default();
        };

        let s = &self.settings;
        let (url_env, has_api_key) = match entry.platform {
            Platform::N8n => (N8N_WEBHOOK_URL, s.n8n.api_key.is_some()),
            Platform::Dify => (DIFY_API_URL, s.dify.api_key.is_some()),
            Platform::Langflow => (LANGFLOW_API_URL, s.langflow.api_key.is_some()),
            Platform::Flowise => (FLOWISE_API_URL, s.flowise.api_key.is_some()),
        };
        AgentEnvConfig {
            url_env: url_env.to_owned(),
            has_api_key,
        }
    }

    /// Required and optional environment variables of a registered agent.
    pub fn env_requirements(&self, id: &str) -> Option<EnvRequirements> {
        self.entry(id).map(|entry| env_requirements(entry.platform))
    }

    fn entry(&self, id: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|entry| entry.platform.id() == id)
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

/// Environment variables each platform reads.
pub fn env_requirements(platform: Platform) -> EnvRequirements {
    match platform {
        Platform::N8n => EnvRequirements {
            required: &[N8N_WEBHOOK_URL],
            optional: &[N8N_API_KEY],
        },
        Platform::Dify => EnvRequirements {
            required: &[DIFY_API_KEY],
            optional: &[DIFY_API_URL, DIFY_USER],
        },
        Platform::Langflow => EnvRequirements {
            required: &[LANGFLOW_FLOW_ID],
            optional: &[LANGFLOW_API_URL, LANGFLOW_API_KEY],
        },
        Platform::Flowise => EnvRequirements {
            required: &[FLOWISE_CHATFLOW_ID],
            optional: &[FLOWISE_API_URL, FLOWISE_API_KEY],
        },
    }
}

fn apply_override(builtin: &[RegistryEntry], descriptors: &[AgentDescriptor]) -> Vec<RegistryEntry> {
    let mut entries: Vec<RegistryEntry> = Vec::with_capacity(descriptors.len());

    for descriptor in descriptors {
        let Some(base) = builtin.iter().find(|e| e.platform.id() == descriptor.id) else {
            warn!(id = %descriptor.id, "{AGENT_REGISTRY_JSON} names an unknown agent; skipping");
            continue;
        };
        if entries.iter().any(|e| e.platform == base.platform) {
            warn!(id = %descriptor.id, "{AGENT_REGISTRY_JSON} lists an agent twice; keeping the first");
            continue;
        }

        let label = descriptor.label.trim();
        entries.push(RegistryEntry {
            label: if label.is_empty() {
                base.label.clone()
            } else {
                label.to_owned()
            },
            ..base.clone()
        });
    }

    if entries.is_empty() {
        warn!("{AGENT_REGISTRY_JSON} selects no known agents; using the built-in list");
        return builtin.to_vec();
    }
    entries
}
