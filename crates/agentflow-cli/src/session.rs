//! Conversation state and the ask flow.
//!
//! One question at a time: create an adapter, stream its answer to the
//! terminal, then release it.  Consecutive questions are spaced at least
//! [`MIN_REQUEST_SPACING`] apart and each answer is bounded by
//! [`PROCESSING_TIMEOUT`].

use std::time::Duration;

use agentflow_core::stream::warning;
use agentflow_core::{AgentRegistry, ChatTurn};
use futures::StreamExt;
use tokio::time::Instant;
use rand::Rng;
use tracing::{debug, info, warn};

/// Minimum delay between two questions of one conversation.
pub const MIN_REQUEST_SPACING: Duration = Duration::from_secs(1);

/// Upper bound on one complete answer.
pub const PROCESSING_TIMEOUT: Duration = Duration::from_secs(300);

const SESSION_ID_LEN: usize = 16;
const SESSION_ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// A fresh session id: 16 lowercase alphanumeric characters.
pub fn new_session_id() -> String {
    let mut rng = rand::thread_rng();
    (0..SESSION_ID_LEN)
        .map(|_| SESSION_ID_CHARS[rng.gen_range(0..SESSION_ID_CHARS.len())] as char)
        .collect()
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// History and pacing for one chat session.
#[derive(Debug)]
pub struct Conversation {
    session_id: String,
    history: Vec<ChatTurn>,
    last_question_at: Option<Instant>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self::with_session_id(new_session_id())
    }

    pub fn with_session_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            history: Vec::new(),
            last_question_at: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// Forget the history and start over under a new session id.
    pub fn reset(&mut self) {
        self.history.clear();
        self.session_id = new_session_id();
        self.last_question_at = None;
        info!(session_id = %self.session_id, "conversation reset");
    }

    /// Sleep until [`MIN_REQUEST_SPACING`] has passed since the previous
    /// question, then stamp this one.
    async fn pace(&mut self) {
        if let Some(last) = self.last_question_at {
            let elapsed = last.elapsed();
            if elapsed < MIN_REQUEST_SPACING {
                let wait = MIN_REQUEST_SPACING - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "spacing consecutive questions");
                tokio::time::sleep(wait).await;
            }
        }
        self.last_question_at = Some(Instant::now());
    }

    fn record(&mut self, question: &str, answer: &str) {
        self.history.push(ChatTurn::user(question));
        self.history.push(ChatTurn::assistant(answer));
    }
}

// ---------------------------------------------------------------------------
// Ask flow
// ---------------------------------------------------------------------------

/// Ask `question` through a fresh `agent_id` adapter.
///
/// Every chunk is passed to `on_chunk` as it arrives; the concatenated answer
/// is returned and recorded in the conversation.  Failures never escape:
/// they arrive as warning chunks like any other fault of the adapter layer.
pub async fn ask<F>(
    registry: &AgentRegistry,
    agent_id: &str,
    access_token: &str,
    conversation: &mut Conversation,
    question: &str,
    mut on_chunk: F,
) -> String
where
    F: FnMut(&str),
{
    conversation.pace().await;

    let mut agent = match registry.create_agent(agent_id, access_token) {
        Ok(agent) => agent,
        Err(e) => {
            warn!(agent = agent_id, error = %e, "failed to create agent");
            let chunk = warning(format!("Error: {e}"));
            on_chunk(&chunk);
            return chunk;
        }
    };

    let mut answer = String::new();
    {
        let mut chunks =
            agent.stream_with_history(question, conversation.session_id(), conversation.history());

        let streamed = tokio::time::timeout(PROCESSING_TIMEOUT, async {
            while let Some(chunk) = chunks.next().await {
                on_chunk(&chunk);
                answer.push_str(&chunk);
            }
        })
        .await;

        if streamed.is_err() {
            warn!(agent = agent_id, "answer exceeded the processing timeout");
            let chunk = warning(format!(
                "Processing timed out after {}s.",
                PROCESSING_TIMEOUT.as_secs()
            ));
            on_chunk(&chunk);
            answer.push_str(&chunk);
        }
    }
    agent.close();

    conversation.record(question, &answer);
    answer
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::{ChatRole, Settings};
    use serde_json::{Value, json};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn session_ids_are_short_lowercase_alphanumeric() {
        let id = new_session_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_ne!(id, new_session_id());
    }

    #[test]
    fn session_ids_draw_from_the_whole_alphabet() {
        let seen: std::collections::HashSet<char> =
            (0..200).flat_map(|_| new_session_id().chars().collect::<Vec<_>>()).collect();
        // 3200 draws over 36 symbols; letters past `f` show up almost surely.
        assert!(seen.iter().any(|c| ('g'..='z').contains(c)), "{seen:?}");
    }

    #[test]
    fn reset_clears_history_and_session() {
        let mut conversation = Conversation::with_session_id("fixed");
        conversation.record("q", "a");
        assert_eq!(conversation.history().len(), 2);
        assert_eq!(conversation.history()[0].role, ChatRole::User);

        conversation.reset();
        assert!(conversation.history().is_empty());
        assert_ne!(conversation.session_id(), "fixed");
    }

    #[tokio::test]
    async fn ask_streams_and_records_history() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": "pong"})))
            .mount(&server)
            .await;

        let mut settings = Settings::default();
        settings.n8n.webhook_url = Some(format!("{}/hook", server.uri()));
        let registry = AgentRegistry::new(settings);
        let mut conversation = Conversation::with_session_id("abc");

        let mut seen = Vec::new();
        let answer = ask(&registry, "n8n", "", &mut conversation, "ping", |c| {
            seen.push(c.to_owned())
        })
        .await;
        assert_eq!(answer, "pong");
        assert_eq!(seen, vec!["pong".to_owned()]);

        let started = Instant::now();
        ask(&registry, "n8n", "", &mut conversation, "again", |_| {}).await;
        assert!(started.elapsed() >= Duration::from_millis(900));
        assert_eq!(conversation.history().len(), 4);

        let requests = server.received_requests().await.unwrap();
        let second: Value = requests[1].body_json().unwrap();
        assert_eq!(second["sessionId"], "abc");
        assert_eq!(
            second["chatHistory"],
            json!([
                {"role": "user", "content": "ping"},
                {"role": "assistant", "content": "pong"},
            ])
        );
    }

    #[tokio::test]
    async fn unknown_agent_answers_with_a_warning() {
        let registry = AgentRegistry::default();
        let mut conversation = Conversation::new();

        let answer = ask(&registry, "ghost", "", &mut conversation, "hi", |_| {}).await;
        assert!(answer.starts_with("⚠️ Error: unknown agent"));
        assert!(conversation.history().is_empty());
    }
}
