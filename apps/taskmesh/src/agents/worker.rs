use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::messages::{Mailbox, MessageKind, ProgressReport, MANAGER};
use super::prompts::library;
use super::types::{SubtaskExit, WorkerReport};
use crate::config::OrchestratorConfig;
use crate::llm::{ChatClient, ChatMessage, ChatReply, LlmError};

/// Limits a worker runs under
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub model: String,
    pub max_iterations: usize,
    pub call_attempts: usize,
    pub retry_delay: Duration,
    pub iteration_pause: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &OrchestratorConfig, max_iterations: usize) -> Self {
        Self {
            model: config.model.clone(),
            max_iterations,
            call_attempts: config.call_attempts.max(1),
            retry_delay: config.retry_delay,
            iteration_pause: config.iteration_pause,
        }
    }
}

/// An `@recipient: body` message embedded in a model reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub recipient: String,
    pub body: String,
}

/// Parses a reply that starts with `@name:` into a directive
///
/// Replies without a colon, or with the colon right after the `@`, are not
/// directives.
pub fn parse_directive(content: &str) -> Option<Directive> {
    let content = content.trim();
    if !content.starts_with('@') {
        return None;
    }
    let colon = content.find(':').filter(|&idx| idx > 1)?;
    let recipient = content[1..colon].trim();
    if recipient.is_empty() {
        return None;
    }

    Some(Directive {
        recipient: recipient.to_string(),
        body: content[colon + 1..].trim().to_string(),
    })
}

/// Worker Agent that iterates on its subtasks against the chat endpoint
pub struct WorkerAgent {
    pub id: Uuid,
    name: String,
    subtasks: Vec<String>,
    client: Arc<dyn ChatClient>,
    mailbox: Arc<Mailbox>,
    settings: WorkerSettings,
    // Held from the inbox check through the model call
    call_lock: Arc<Mutex<()>>,
    last_seen: f64,
    results: Vec<String>,
}

impl WorkerAgent {
    pub fn new(
        name: impl Into<String>,
        subtasks: Vec<String>,
        client: Arc<dyn ChatClient>,
        mailbox: Arc<Mailbox>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            subtasks,
            client,
            mailbox,
            settings,
            call_lock: Arc::new(Mutex::new(())),
            last_seen: 0.0,
            results: Vec::new(),
        }
    }

    /// Runs the worker on its own task
    pub fn spawn(self) -> JoinHandle<WorkerReport> {
        tokio::spawn(self.run())
    }

    /// Works through every assigned subtask, then returns the collected results
    pub async fn run(mut self) -> WorkerReport {
        let subtasks = std::mem::take(&mut self.subtasks);
        let mut exits = Vec::with_capacity(subtasks.len());

        for (index, subtask) in subtasks.iter().enumerate() {
            info!(
                worker = %self.name,
                "Assigned task {}/{}: {}",
                index + 1,
                subtasks.len(),
                subtask
            );

            let exit = self.work_on(index, subtask).await;
            self.mailbox.post(
                &self.name,
                MANAGER,
                format!("{} left task {} ({:?})", self.name, index + 1, exit),
                MessageKind::SubtaskClosed {
                    subtask_index: index,
                    completed: exit != SubtaskExit::BudgetExhausted,
                },
            );
            info!(worker = %self.name, ?exit, "Completed task {}/{}", index + 1, subtasks.len());
            exits.push(exit);
        }

        info!(worker = %self.name, "All assigned tasks and iterations complete");
        WorkerReport {
            worker: self.name,
            results: self.results,
            exits,
        }
    }

    async fn work_on(&mut self, index: usize, subtask: &str) -> SubtaskExit {
        let template = library::worker_iteration();
        let mut conversation = vec![
            ChatMessage::system(template.system.clone()),
            ChatMessage::user(subtask),
        ];
        let mut prev_result: Option<String> = None;

        for iteration in 0..self.settings.max_iterations {
            debug!(
                worker = %self.name,
                "Iteration {} of {} for task {}",
                iteration + 1,
                self.settings.max_iterations,
                index + 1
            );

            if let Some(prev) = prev_result.as_deref() {
                conversation.push(ChatMessage::user(template.render_with(&[("previous", prev)])));
            }

            let (prompt, outcome) = {
                let call_lock = self.call_lock.clone();
                let _guard = call_lock.lock().await;
                if self.check_inbox(index, &mut conversation) {
                    info!(worker = %self.name, "Manager approved task {}", index + 1);
                    return SubtaskExit::Approved;
                }
                let prompt = serde_json::to_string(&conversation).unwrap_or_default();
                (prompt, self.call_with_retry(&conversation).await)
            };

            match outcome {
                Ok(reply) => {
                    debug!(worker = %self.name, response = %reply.content, "LLM response");
                    let completed = reply.signals_completion();
                    let ChatReply { role, content, .. } = reply;

                    conversation.push(ChatMessage::new(role, content.clone()));
                    if let Some(directive) = parse_directive(&content) {
                        debug!(
                            worker = %self.name,
                            recipient = %directive.recipient,
                            "Sent message: {}",
                            directive.body
                        );
                        self.mailbox.send(&self.name, &directive.recipient, directive.body);
                    }

                    self.results.push(content.clone());
                    self.report_progress(index, iteration, content.clone(), prompt, None);
                    prev_result = Some(content);

                    if completed {
                        info!(worker = %self.name, "Task completed");
                        return SubtaskExit::Signalled;
                    }
                }
                Err(e) => {
                    warn!(worker = %self.name, error = %e, "Abandoning iteration {}", iteration + 1);
                    self.report_progress(
                        index,
                        iteration,
                        format!("Iteration {} failed: {}", iteration + 1, e),
                        prompt,
                        Some(e.to_string()),
                    );
                }
            }

            tokio::time::sleep(self.settings.iteration_pause).await;
        }

        SubtaskExit::BudgetExhausted
    }

    /// Moves new mailbox messages into the conversation
    ///
    /// Returns true when the manager approved the current subtask.
    fn check_inbox(&mut self, index: usize, conversation: &mut Vec<ChatMessage>) -> bool {
        let inbox = self.mailbox.receive(&self.name, self.last_seen);
        let mut approved = false;

        for message in inbox {
            self.last_seen = self.last_seen.max(message.timestamp);
            if message.sender == self.name {
                continue;
            }
            match message.kind {
                MessageKind::Approval { subtask_index } => approved |= subtask_index == index,
                MessageKind::Chat | MessageKind::Notice => {
                    debug!(
                        worker = %self.name,
                        sender = %message.sender,
                        "Received message: {}",
                        message.content
                    );
                    conversation.push(ChatMessage::user(format!(
                        "[Message from {}]: {}",
                        message.sender, message.content
                    )));
                }
                MessageKind::Progress(_) | MessageKind::SubtaskClosed { .. } => {}
            }
        }

        approved
    }

    async fn call_with_retry(&self, conversation: &[ChatMessage]) -> Result<ChatReply, LlmError> {
        let attempts = self.settings.call_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.client.chat(&self.settings.model, conversation).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(worker = %self.name, attempt, error = %e, "Server error, retrying");
                    self.notify_manager(format!(
                        "{} encountered a server error ({}). Retrying in {:?}...",
                        self.name,
                        e.status_code().unwrap_or_default(),
                        self.settings.retry_delay
                    ));
                    tokio::time::sleep(self.settings.retry_delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    self.notify_manager(format!(
                        "{} failed after {} attempts due to server errors: {}",
                        self.name, attempts, e
                    ));
                    return Err(e);
                }
                Err(e) => {
                    self.notify_manager(format!("{} failed: {}", self.name, e));
                    return Err(e);
                }
            }
        }
    }

    fn notify_manager(&self, content: String) {
        self.mailbox.post(&self.name, MANAGER, content, MessageKind::Notice);
    }

    fn report_progress(
        &self,
        subtask_index: usize,
        iteration: usize,
        content: String,
        prompt: String,
        error: Option<String>,
    ) {
        self.mailbox.post(
            &self.name,
            MANAGER,
            content,
            MessageKind::Progress(ProgressReport {
                subtask_index,
                iteration,
                prompt,
                error,
            }),
        );
    }
}
