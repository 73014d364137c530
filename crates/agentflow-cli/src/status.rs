//! Agent status board: cached connection and health snapshots per agent.
//!
//! Probing is a network round trip, so results are cached per agent id
//! until the caller asks for a refresh or switches to another agent.

use std::collections::HashMap;

use agentflow_core::{AgentEnvConfig, AgentRegistry, ConnectionInfo, HealthSnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// Everything the board shows about one agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub connection: ConnectionInfo,
    pub health: HealthSnapshot,
    pub env: AgentEnvConfig,
    pub checked_at: DateTime<Utc>,
}

/// Per-agent snapshot cache over a registry.
pub struct StatusBoard<'r> {
    registry: &'r AgentRegistry,
    access_token: String,
    selected: Option<String>,
    cache: HashMap<String, AgentStatus>,
}

impl<'r> StatusBoard<'r> {
    pub fn new(registry: &'r AgentRegistry, access_token: impl Into<String>) -> Self {
        Self {
            registry,
            access_token: access_token.into(),
            selected: None,
            cache: HashMap::new(),
        }
    }

    /// Status of `agent_id`, probing only when nothing is cached or
    /// `force_refresh` is set.
    pub async fn status(&mut self, agent_id: &str, force_refresh: bool) -> AgentStatus {
        if !force_refresh
            && let Some(cached) = self.cache.get(agent_id)
        {
            debug!(agent = agent_id, "using cached agent status");
            return cached.clone();
        }

        let status = probe_agent(self.registry, agent_id, &self.access_token).await;
        self.cache.insert(agent_id.to_owned(), status.clone());
        status
    }

    /// Mark `agent_id` as the selected agent.  Switching to a different
    /// agent drops every cached snapshot.
    pub fn select(&mut self, agent_id: &str) {
        if self.selected.as_deref() != Some(agent_id) {
            self.cache.clear();
            self.selected = Some(agent_id.to_owned());
        }
    }

    /// Drop the cached snapshot of one agent.
    pub fn invalidate(&mut self, agent_id: &str) {
        self.cache.remove(agent_id);
    }
}

/// Build a fresh adapter, probe it once, and release it.
///
/// A construction failure is reported as an unconfigured snapshot.
async fn probe_agent(registry: &AgentRegistry, agent_id: &str, access_token: &str) -> AgentStatus {
    let (connection, health) = match registry.create_agent(agent_id, access_token) {
        Ok(mut agent) => {
            let connection = agent.get_connection_info();
            let health = agent.health_check().await;
            agent.close();
            (connection, health)
        }
        Err(e) => {
            warn!(agent = agent_id, error = %e, "could not create agent for status check");
            let connection = ConnectionInfo {
                platform: agent_id.to_owned(),
                endpoint: None,
                has_api_key: false,
                timeout: None,
            };
            let health = HealthSnapshot {
                ok: false,
                configured: false,
                platform: agent_id.to_owned(),
                url: None,
                status_code: None,
                message: e.to_string(),
            };
            (connection, health)
        }
    };

    AgentStatus {
        agent_id: agent_id.to_owned(),
        connection,
        env: registry.get_agent_env_config(agent_id),
        health,
        checked_at: Utc::now(),
    }
}

/// Render a status for the terminal.
pub fn render(status: &AgentStatus) -> String {
    let health = &status.health;
    let badge = match (health.configured, health.ok) {
        (false, _) => "not configured",
        (true, true) => "online",
        (true, false) => "offline",
    };

    let mut out = format!("{} ({}): {badge}\n", status.agent_id, status.connection.platform);
    out.push_str(&format!("  message:   {}\n", health.message));
    if let Some(url) = health.url.as_deref().or(status.connection.endpoint.as_deref()) {
        out.push_str(&format!("  endpoint:  {url}\n"));
    }
    if !status.env.url_env.is_empty() {
        out.push_str(&format!("  url env:   {}\n", status.env.url_env));
    }
    out.push_str(&format!(
        "  api key:   {}\n",
        if status.env.has_api_key { "set" } else { "not set" }
    ));
    out.push_str(&format!(
        "  checked:   {}",
        status.checked_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out
}
