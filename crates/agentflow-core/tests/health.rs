//! Integration tests for registry lookups and `health_check` probes.
//!
//! Every backend is a `wiremock` server, so the probe outcome and the number
//! of requests that actually reached the network can both be asserted.

use std::time::Duration;

use agentflow_core::{AgentRegistry, AgentflowError, Platform, Settings};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Settings with every platform fully configured against `uri`.
fn configured_settings(uri: &str) -> Settings {
    let mut settings = Settings::default();
    settings.n8n.webhook_url = Some(format!("{uri}/webhook/chat"));
    settings.dify.api_url = uri.to_owned();
    settings.dify.api_key = Some("dify-key".into());
    settings.langflow.api_url = uri.to_owned();
    settings.langflow.flow_id = Some("flow-1".into());
    settings.flowise.api_url = uri.to_owned();
    settings.flowise.chatflow_id = Some("cf-1".into());
    settings
}

/// Settings pointing every platform at `uri` but lacking its required value.
fn unconfigured_settings(uri: &str) -> Settings {
    let mut settings = Settings::default();
    settings.dify.api_url = uri.to_owned();
    settings.langflow.api_url = uri.to_owned();
    settings.flowise.api_url = uri.to_owned();
    settings
}

fn probe_path(platform: Platform) -> &'static str {
    match platform {
        Platform::N8n => "/webhook/chat",
        Platform::Dify => "/chat-messages",
        Platform::Langflow => "/api/v1/run/flow-1",
        Platform::Flowise => "/api/v1/prediction/cf-1",
    }
}

async fn server_answering(status: u16) -> MockServer {
    let server = MockServer::start().await;
    for platform in Platform::ALL {
        Mock::given(method("GET"))
            .and(path(probe_path(platform)))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }
    server
}

// ═══════════════════════════════════════════════════════════════════════
//  Registry
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn unknown_agent_id_is_rejected() {
    let registry = AgentRegistry::default();
    match registry.create_agent("not-an-agent", "token") {
        Err(AgentflowError::UnknownAgent { id }) => assert_eq!(id, "not-an-agent"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("unknown id must not build an adapter"),
    }
}

#[test]
fn registry_override_from_lookup() {
    let settings = Settings::from_lookup(|key| match key {
        "AGENT_REGISTRY_JSON" => Some(r#"[{"id":"dify","label":"Helpdesk"}]"#.to_owned()),
        _ => None,
    });
    let registry = AgentRegistry::new(settings);

    let agents = registry.list_available_agents();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].id, "dify");
    assert_eq!(agents[0].label, "Helpdesk");
}

#[test]
fn invalid_registry_override_keeps_builtins() {
    let settings = Settings::from_lookup(|key| match key {
        "AGENT_REGISTRY_JSON" => Some("not json".to_owned()),
        _ => None,
    });
    assert_eq!(AgentRegistry::new(settings).list_available_agents().len(), 4);
}

// ═══════════════════════════════════════════════════════════════════════
//  Health probes
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn unauthorized_probe_counts_as_reachable() {
    let server = server_answering(401).await;
    let registry = AgentRegistry::new(configured_settings(&server.uri()));

    for platform in Platform::ALL {
        let agent = registry.create_agent(platform.id(), "").unwrap();
        let health = agent.health_check().await;
        assert!(health.ok, "{platform}: {health:?}");
        assert!(health.configured);
        assert_eq!(health.status_code, Some(401));
        assert_eq!(health.platform, platform.display_name());
        assert!(health.message.contains("authentication"));
        assert_eq!(
            health.url,
            Some(format!("{}{}", server.uri(), probe_path(platform)))
        );
    }
}

#[tokio::test]
async fn method_not_allowed_probe_counts_as_reachable() {
    let server = server_answering(405).await;
    let registry = AgentRegistry::new(configured_settings(&server.uri()));

    for platform in Platform::ALL {
        let health = registry
            .create_agent(platform.id(), "")
            .unwrap()
            .health_check()
            .await;
        assert!(health.ok, "{platform}: {health:?}");
        assert_eq!(health.status_code, Some(405));
    }
}

#[tokio::test]
async fn server_error_probe_is_not_ok() {
    let server = server_answering(500).await;
    let registry = AgentRegistry::new(configured_settings(&server.uri()));

    for platform in Platform::ALL {
        let health = registry
            .create_agent(platform.id(), "")
            .unwrap()
            .health_check()
            .await;
        assert!(!health.ok, "{platform}: {health:?}");
        assert!(health.configured);
        assert_eq!(health.status_code, Some(500));
    }
}

#[tokio::test]
async fn probes_send_access_token_and_credentials() {
    let server = server_answering(200).await;
    let mut settings = configured_settings(&server.uri());
    settings.n8n.api_key = Some("n8n-key".into());
    settings.langflow.api_key = Some("lf-key".into());
    settings.flowise.api_key = Some("fw-key".into());
    let registry = AgentRegistry::new(settings);

    let expected = [
        (Platform::N8n, "authorization", "Bearer n8n-key"),
        (Platform::Dify, "authorization", "Bearer dify-key"),
        (Platform::Langflow, "x-api-key", "lf-key"),
        (Platform::Flowise, "authorization", "Bearer fw-key"),
    ];
    for (platform, _, _) in expected {
        let mut agent = registry.create_agent(platform.id(), "tok-123").unwrap();
        assert!(agent.health_check().await.ok, "{platform}");
        agent.close();
    }

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), expected.len());
    for (request, (platform, credential_header, credential)) in requests.iter().zip(expected) {
        assert_eq!(request.url.path(), probe_path(platform));
        let header = |name: &str| {
            request
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        assert_eq!(header("access_token").as_deref(), Some("tok-123"), "{platform}");
        assert_eq!(header(credential_header).as_deref(), Some(credential), "{platform}");
    }
}

#[tokio::test]
async fn missing_configuration_never_touches_the_network() {
    let server = server_answering(200).await;
    let registry = AgentRegistry::new(unconfigured_settings(&server.uri()));

    let expected = [
        (Platform::N8n, "N8N_WEBHOOK_URL"),
        (Platform::Dify, "DIFY_API_KEY"),
        (Platform::Langflow, "LANGFLOW_FLOW_ID"),
        (Platform::Flowise, "FLOWISE_CHATFLOW_ID"),
    ];
    for (platform, variable) in expected {
        let health = registry
            .create_agent(platform.id(), "")
            .unwrap()
            .health_check()
            .await;
        assert!(!health.configured);
        assert!(!health.ok);
        assert_eq!(health.status_code, None);
        assert!(health.message.contains(variable), "{platform}: {}", health.message);
    }

    let requests = server.received_requests().await.unwrap();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn unreachable_backend_reports_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let registry = AgentRegistry::new(configured_settings(&uri));
    for platform in Platform::ALL {
        let health = registry
            .create_agent(platform.id(), "")
            .unwrap()
            .health_check()
            .await;
        assert!(!health.ok);
        assert!(health.configured);
        assert_eq!(health.status_code, None);
        assert!(!health.message.is_empty());
    }
}

#[tokio::test]
async fn slow_probe_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let mut settings = configured_settings(&server.uri());
    settings.probe_timeout = Duration::from_millis(100);
    let registry = AgentRegistry::new(settings);

    let health = registry
        .create_agent("dify", "")
        .unwrap()
        .health_check()
        .await;
    assert!(!health.ok);
    assert!(health.configured);
    assert_eq!(health.status_code, None);
}

#[tokio::test]
async fn closed_agent_probe_is_not_ok() {
    let server = server_answering(200).await;
    let registry = AgentRegistry::new(configured_settings(&server.uri()));

    let mut agent = registry.create_agent("flowise", "").unwrap();
    agent.close();
    agent.close();

    let health = agent.health_check().await;
    assert!(!health.ok);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[test]
fn connection_info_needs_no_network() {
    let registry = AgentRegistry::new(configured_settings("http://127.0.0.1:1"));

    let info = registry.create_agent("langflow", "").unwrap().get_connection_info();
    assert_eq!(info.platform, "LangFlow");
    assert_eq!(
        info.endpoint.as_deref(),
        Some("http://127.0.0.1:1/api/v1/run/flow-1")
    );
    assert!(!info.has_api_key);
    assert_eq!(info.timeout, Some(60));
}
