use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::decomposer::TaskDecomposer;
use super::errors::{AgentError, AgentResult};
use super::messages::{Mailbox, MANAGER};
use super::prompts::library;
use super::review::Supervisor;
use super::state::WorkerAssignment;
use super::types::{ApprovalPolicy, KeywordApproval, RunPlan, RunSummary, WorkerSummary};
use super::worker::{WorkerAgent, WorkerSettings};
use crate::config::OrchestratorConfig;
use crate::domain::repositories::RunRepository;
use crate::domain::run::{AgentRunStatus, NewAgent, NewRun, RunOutcome};
use crate::llm::ChatClient;

/// Manager Agent responsible for task decomposition, work assignment
/// and reviewing worker progress until every worker is done
pub struct ManagerAgent {
    pub id: Uuid,
    client: Arc<dyn ChatClient>,
    store: Arc<dyn RunRepository>,
    mailbox: Arc<Mailbox>,
    policy: Arc<dyn ApprovalPolicy>,
    config: OrchestratorConfig,
}

impl ManagerAgent {
    /// Create a new Manager Agent with the keyword approval policy
    pub fn new(
        client: Arc<dyn ChatClient>,
        store: Arc<dyn RunRepository>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client,
            store,
            mailbox: Arc::new(Mailbox::new()),
            policy: Arc::new(KeywordApproval::default()),
            config,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn ApprovalPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Mailbox shared by the manager and its workers
    pub fn mailbox(&self) -> Arc<Mailbox> {
        self.mailbox.clone()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Decompose a goal into concrete, actionable subtasks
    pub async fn decompose_goal(&self, goal: &str) -> AgentResult<Vec<String>> {
        let decomposer = TaskDecomposer::new(
            self.client.clone(),
            self.config.model.clone(),
            self.config.decomposition_attempts,
        );
        let subtasks = decomposer.decompose(goal).await?;
        info!(count = subtasks.len(), "Decomposed task into subtasks");
        Ok(subtasks)
    }

    /// Deals subtasks to `num_workers` queues in round-robin order
    ///
    /// Subtask `i` goes to worker `i % num_workers`. Queues may be empty
    /// when there are more workers than subtasks.
    pub fn partition(subtasks: &[String], num_workers: usize) -> Vec<Vec<String>> {
        let num_workers = num_workers.max(1);
        let mut queues = vec![Vec::new(); num_workers];
        for (i, subtask) in subtasks.iter().enumerate() {
            queues[i % num_workers].push(subtask.clone());
        }
        queues
    }

    /// Decomposes `goal` and runs the workers until every one is complete
    pub async fn orchestrate(&self, goal: &str, plan: RunPlan) -> AgentResult<RunSummary> {
        let subtasks = self.decompose_goal(goal).await?;
        self.execute(goal, subtasks, plan).await
    }

    /// Runs already decomposed subtasks
    pub async fn execute(
        &self,
        goal: &str,
        subtasks: Vec<String>,
        plan: RunPlan,
    ) -> AgentResult<RunSummary> {
        let plan = RunPlan::new(plan.num_workers, plan.max_iterations)?;
        let started = Instant::now();

        let run_id = self
            .store
            .create_run(&NewRun {
                task: goal.to_string(),
                subtasks: subtasks.clone(),
                model_name: self.config.model.clone(),
            })
            .await
            .map_err(AgentError::StoreError)?;
        info!(%run_id, workers = plan.num_workers, "Starting run");

        let mut supervisor = Supervisor::new(
            self.mailbox.clone(),
            self.store.clone(),
            self.policy.clone(),
            self.config.clone(),
        );
        let settings = WorkerSettings::from_config(&self.config, plan.max_iterations);
        let notice = library::assignment_notice();
        let mut handles = Vec::with_capacity(plan.num_workers);

        for (i, assigned) in Self::partition(&subtasks, plan.num_workers)
            .into_iter()
            .enumerate()
        {
            let name = format!("agent_{}", i + 1);
            let agent_id = self
                .store
                .create_agent(&NewAgent {
                    run_id,
                    name: name.clone(),
                    assigned_subtasks: assigned.clone(),
                })
                .await
                .map_err(AgentError::StoreError)?;

            let expected = match self.store.assigned_subtasks(agent_id).await {
                Ok(Some(stored)) => stored.len(),
                Ok(None) => assigned.len(),
                Err(e) => {
                    warn!(worker = %name, error = %e, "Falling back to in-memory assignment");
                    assigned.len()
                }
            };

            info!(worker = %name, "Assigned {} tasks: {:?}", assigned.len(), assigned);
            let listing = assigned.join("\n");
            self.mailbox.send(
                MANAGER,
                &name,
                notice.render_with(&[("subtasks", listing.as_str())]),
            );

            supervisor.supervise(
                WorkerAssignment::new(name.clone(), assigned.clone())
                    .with_expected_subtasks(expected),
                agent_id,
            );

            let worker = WorkerAgent::new(
                name.clone(),
                assigned,
                self.client.clone(),
                self.mailbox.clone(),
                settings.clone(),
            );
            handles.push((name, worker.spawn()));
        }

        supervisor.run(&handles).await;

        let mut reports = HashMap::new();
        for (name, handle) in handles {
            match handle.await {
                Ok(report) => {
                    reports.insert(name, report);
                }
                Err(e) => {
                    error!(worker = %name, error = %e, "Worker task failed");
                }
            }
        }

        let outcome = supervisor.into_outcome();
        let mut workers = Vec::with_capacity(outcome.workers.len());
        let mut summary_lines = Vec::with_capacity(outcome.workers.len());

        for supervised in outcome.workers {
            let assignment = supervised.assignment;
            let name = assignment.worker().to_string();
            let last_progress = assignment.trace().last().map(|entry| entry.content.clone());

            let (status, exit_reason) = match supervised.abandoned.as_deref() {
                Some(reason) => (AgentRunStatus::Abandoned, Some(reason)),
                None => (AgentRunStatus::Completed, None),
            };
            if let Err(e) = self
                .store
                .finish_agent(supervised.agent_id, status, exit_reason)
                .await
            {
                warn!(worker = %name, error = %e, "Failed to store agent status");
            }

            summary_lines.push(format!(
                "{}: {}",
                name,
                last_progress.as_deref().unwrap_or("no progress reported")
            ));
            workers.push(WorkerSummary {
                report: reports.remove(&name),
                worker: name,
                agent_id: supervised.agent_id,
                subtasks: assignment.subtasks().to_vec(),
                summaries: assignment.summaries().to_vec(),
                trace: assignment.trace().to_vec(),
                last_progress,
            });
        }

        let elapsed = started.elapsed();
        let run_outcome = RunOutcome {
            manager_summary: summary_lines.join("\n"),
            total_time: elapsed,
            total_tokens: outcome.total_tokens,
        };
        if let Err(e) = self.store.finish_run(run_id, &run_outcome).await {
            warn!(%run_id, error = %e, "Failed to store run analytics");
        }

        info!(
            %run_id,
            elapsed_secs = elapsed.as_secs_f64(),
            tokens = outcome.total_tokens,
            "Run finished"
        );

        Ok(RunSummary {
            run_id,
            task: goal.to_string(),
            subtasks,
            workers,
            events: outcome.events,
            total_tokens: outcome.total_tokens,
            elapsed,
        })
    }
}
