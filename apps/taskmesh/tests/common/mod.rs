//! Shared test doubles for the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use taskmesh::agents::ManagerAgent;
use taskmesh::config::OrchestratorConfig;
use taskmesh::infrastructure::repositories::InMemoryRunRepository;
use taskmesh::llm::{ChatClient, ChatMessage, ChatReply, LlmError};

/// What the scripted model does for one call
pub enum Step {
    Reply(ChatReply),
    Fail(LlmError),
    Panic,
}

/// ChatClient that answers from per-prompt scripts
///
/// Calls are keyed by the content of the second message, which is the
/// subtask for workers and the main task for the decomposer. Once a
/// script runs out, the default reply is returned.
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<HashMap<String, usize>>,
    default_reply: String,
}

impl ScriptedClient {
    pub fn new(default_reply: &str) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            default_reply: default_reply.to_string(),
        }
    }

    pub fn script(self, key: &str, steps: Vec<Step>) -> Self {
        self.scripts.lock().insert(key.to_string(), steps.into());
        self
    }

    pub fn replies(self, key: &str, replies: &[&str]) -> Self {
        let steps = replies
            .iter()
            .map(|r| Step::Reply(ChatReply::text(*r)))
            .collect();
        self.script(key, steps)
    }

    pub fn calls_for(&self, key: &str) -> usize {
        self.calls.lock().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn chat(&self, _model: &str, messages: &[ChatMessage]) -> Result<ChatReply, LlmError> {
        let key = messages
            .get(1)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        *self.calls.lock().entry(key.clone()).or_insert(0) += 1;

        let step = self
            .scripts
            .lock()
            .get_mut(&key)
            .and_then(|steps| steps.pop_front());
        match step {
            Some(Step::Reply(reply)) => Ok(reply),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Panic) => panic!("scripted model crashed on {key}"),
            None => Ok(ChatReply::text(self.default_reply.clone())),
        }
    }
}

pub fn server_error() -> LlmError {
    LlmError::Status {
        status: 503,
        message: "model overloaded".to_string(),
    }
}

/// Engine settings with no real waiting
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        retry_delay: Duration::ZERO,
        iteration_pause: Duration::from_millis(1),
        poll_interval: Duration::from_millis(5),
        review_retry_delay: Duration::ZERO,
        ..OrchestratorConfig::new("test-model")
    }
}

pub fn manager(client: Arc<ScriptedClient>) -> (ManagerAgent, Arc<InMemoryRunRepository>) {
    let store = Arc::new(InMemoryRunRepository::new());
    let manager = ManagerAgent::new(client, store.clone(), fast_config());
    (manager, store)
}

pub fn subtasks(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
