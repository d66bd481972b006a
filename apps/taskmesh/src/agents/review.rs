// Manager-side review loop
//
// The supervisor reads what each worker posted to the manager, reviews
// progress against the approval policy and drives every WorkerAssignment
// until all of them are complete.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::errors::AgentResult;
use super::events::ReviewEvent;
use super::messages::{Mailbox, Message, MessageKind, ProgressReport, MANAGER};
use super::state::WorkerAssignment;
use super::types::{approx_tokens, ApprovalPolicy, ReviewDecision, WorkerReport};
use crate::config::OrchestratorConfig;
use crate::domain::repositories::RunRepository;
use crate::domain::run::NewIteration;

struct Supervised {
    assignment: WorkerAssignment,
    agent_id: Uuid,
    cursor: f64,
    last_update: Instant,
    abandoned: Option<String>,
}

/// A worker as the supervisor left it
#[derive(Debug, Clone)]
pub struct SupervisedWorker {
    pub assignment: WorkerAssignment,
    pub agent_id: Uuid,
    /// Set when the worker stopped before its assignment was complete
    pub abandoned: Option<String>,
}

/// Everything the review loop produced
#[derive(Debug, Clone)]
pub struct SupervisionOutcome {
    pub workers: Vec<SupervisedWorker>,
    pub events: Vec<ReviewEvent>,
    pub total_tokens: usize,
}

pub struct Supervisor {
    mailbox: Arc<Mailbox>,
    store: Arc<dyn RunRepository>,
    policy: Arc<dyn ApprovalPolicy>,
    config: OrchestratorConfig,
    workers: Vec<Supervised>,
    events: Vec<ReviewEvent>,
    total_tokens: usize,
}

impl Supervisor {
    pub fn new(
        mailbox: Arc<Mailbox>,
        store: Arc<dyn RunRepository>,
        policy: Arc<dyn ApprovalPolicy>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            mailbox,
            store,
            policy,
            config,
            workers: Vec::new(),
            events: Vec::new(),
            total_tokens: 0,
        }
    }

    /// Puts a worker under review
    pub fn supervise(&mut self, assignment: WorkerAssignment, agent_id: Uuid) {
        if assignment.is_complete() {
            self.events.push(ReviewEvent::WorkerCompleted {
                worker: assignment.worker().to_string(),
            });
        }
        self.workers.push(Supervised {
            assignment,
            agent_id,
            cursor: 0.0,
            last_update: Instant::now(),
            abandoned: None,
        });
    }

    pub fn all_complete(&self) -> bool {
        self.workers.iter().all(|w| w.assignment.is_complete())
    }

    pub fn assignment(&self, worker: &str) -> Option<&WorkerAssignment> {
        self.workers
            .iter()
            .find(|w| w.assignment.worker() == worker)
            .map(|w| &w.assignment)
    }

    pub fn events(&self) -> &[ReviewEvent] {
        &self.events
    }

    /// Polls until every worker is complete
    ///
    /// A worker whose task has ended is abandoned once its remaining
    /// messages are processed, so the loop ends even if workers stop early.
    pub async fn run(&mut self, handles: &[(String, JoinHandle<WorkerReport>)]) {
        info!(workers = self.workers.len(), "Supervising workers");

        while !self.all_complete() {
            // Checked before reading so every message of an exited worker is seen
            let exited: HashSet<&str> = handles
                .iter()
                .filter(|(_, handle)| handle.is_finished())
                .map(|(name, _)| name.as_str())
                .collect();

            self.poll_once(&exited).await;
            if self.all_complete() {
                break;
            }
            self.mailbox.wait_for_activity(self.config.poll_interval).await;
        }

        info!("All workers complete");
    }

    /// One poll cycle over every incomplete worker
    pub async fn poll_once(&mut self, exited: &HashSet<&str>) {
        for idx in 0..self.workers.len() {
            if self.workers[idx].assignment.is_complete() {
                continue;
            }

            let (worker, cursor) = {
                let supervised = &self.workers[idx];
                (supervised.assignment.worker().to_string(), supervised.cursor)
            };
            let messages = self.mailbox.receive_from(MANAGER, &worker, cursor);

            for message in messages {
                self.workers[idx].cursor = self.workers[idx].cursor.max(message.timestamp);
                if self.workers[idx].assignment.is_complete() {
                    break;
                }
                self.handle_message(idx, message).await;
            }

            let supervised = &mut self.workers[idx];
            if supervised.assignment.is_complete() {
                if supervised.abandoned.is_none() {
                    info!(worker = %worker, "Worker completed all tasks");
                    self.events.push(ReviewEvent::WorkerCompleted { worker });
                }
            } else if exited.contains(worker.as_str()) {
                let reason = format!(
                    "stopped at task {} of {}",
                    supervised.assignment.current_task_index() + 1,
                    supervised.assignment.expected_subtasks()
                );
                warn!(worker = %worker, %reason, "Worker exited before completing its tasks");
                if let Some(event) = supervised.assignment.abandon(reason.clone()) {
                    supervised.abandoned = Some(reason);
                    self.events.push(event);
                }
            }
        }
    }

    async fn handle_message(&mut self, idx: usize, message: Message) {
        let worker = self.workers[idx].assignment.worker().to_string();

        match message.kind {
            MessageKind::Progress(report) => {
                let current = self.workers[idx].assignment.current_task_index();
                if report.subtask_index != current {
                    debug!(
                        worker = %worker,
                        subtask = report.subtask_index,
                        current,
                        "Ignoring progress for a task already left"
                    );
                    return;
                }
                self.review_progress(idx, &message.content, report).await;
            }
            MessageKind::SubtaskClosed {
                subtask_index,
                completed,
            } => {
                if let Some(event) = self.workers[idx]
                    .assignment
                    .close_subtask(subtask_index, completed)
                {
                    info!(
                        worker = %worker,
                        completed,
                        "Worker left task {} without approval",
                        subtask_index + 1
                    );
                    self.events.push(event);
                }
            }
            MessageKind::Notice => {
                warn!(worker = %worker, "{}", message.content);
            }
            MessageKind::Chat => {
                debug!(worker = %worker, "Message for manager: {}", message.content);
            }
            MessageKind::Approval { .. } => {}
        }
    }

    async fn review_progress(&mut self, idx: usize, content: &str, report: ProgressReport) {
        let supervised = &mut self.workers[idx];
        let worker = supervised.assignment.worker().to_string();

        match supervised.assignment.record_progress(content) {
            Ok(true) => {}
            Ok(false) => {
                debug!(worker = %worker, "Skipping repeated progress");
                return;
            }
            Err(e) => {
                warn!(worker = %worker, error = %e, "Cannot record progress");
                return;
            }
        }

        let duration = supervised.last_update.elapsed();
        supervised.last_update = Instant::now();
        let tokens = approx_tokens(content);
        self.total_tokens += tokens;

        let iteration = NewIteration {
            agent_id: supervised.agent_id,
            iteration_index: report.iteration,
            subtask_index: report.subtask_index,
            prompt: Some(report.prompt),
            response: content.to_string(),
            duration,
            approx_tokens: tokens,
            error: report.error,
        };
        if let Err(e) = self.store.record_iteration(&iteration).await {
            warn!(worker = %worker, error = %e, "Failed to store iteration");
        }

        // An abandoned iteration never satisfies its subtask
        if let Some(error) = iteration.error {
            match self.workers[idx]
                .assignment
                .reject(format!("Iteration failed: {}", error))
            {
                Ok(event) => {
                    debug!(worker = %worker, %error, "Rejected failed iteration");
                    self.events.push(event);
                }
                Err(e) => warn!(worker = %worker, error = %e, "Cannot reject failed iteration"),
            }
            return;
        }

        let attempts = self.config.review_attempts.max(1);
        for attempt in 1..=attempts {
            match self.review_once(idx, content) {
                Ok(event) => {
                    if let ReviewEvent::Approved {
                        subtask_index,
                        ref reason,
                        ..
                    } = event
                    {
                        info!(worker = %worker, %reason, "Approved task {}", subtask_index + 1);
                        self.mailbox.post(
                            MANAGER,
                            &worker,
                            format!("Task {} approved: {}", subtask_index + 1, reason),
                            MessageKind::Approval { subtask_index },
                        );
                    } else {
                        debug!(worker = %worker, "Progress rejected");
                    }
                    self.events.push(event);
                    return;
                }
                Err(e) => {
                    warn!(worker = %worker, attempt, error = %e, "Review failed");
                    if attempt < attempts {
                        tokio::time::sleep(self.config.review_retry_delay).await;
                    }
                }
            }
        }

        error!(
            worker = %worker,
            "Review failed after {} attempts, skipping this update", attempts
        );
    }

    fn review_once(&mut self, idx: usize, content: &str) -> AgentResult<ReviewEvent> {
        let assignment = &mut self.workers[idx].assignment;
        match self.policy.review(content)? {
            ReviewDecision::Approved { reason } => assignment.approve(reason),
            ReviewDecision::Rejected { reason } => assignment.reject(reason),
        }
    }

    pub fn into_outcome(self) -> SupervisionOutcome {
        SupervisionOutcome {
            workers: self
                .workers
                .into_iter()
                .map(|w| SupervisedWorker {
                    assignment: w.assignment,
                    agent_id: w.agent_id,
                    abandoned: w.abandoned,
                })
                .collect(),
            events: self.events,
            total_tokens: self.total_tokens,
        }
    }
}
