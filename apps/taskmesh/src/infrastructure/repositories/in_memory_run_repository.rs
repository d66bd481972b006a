use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::domain::repositories::RunRepository;
use crate::domain::run::{AgentRunStatus, IterationRecord, NewAgent, NewIteration, NewRun, RunOutcome};

/// A stored run and its analytics, once finished
#[derive(Debug, Clone)]
pub struct StoredRun {
    pub run: NewRun,
    pub outcome: Option<RunOutcome>,
}

#[derive(Debug, Clone)]
pub struct StoredAgent {
    pub agent: NewAgent,
    pub status: AgentRunStatus,
    pub exit_reason: Option<String>,
}

#[derive(Default)]
struct Tables {
    runs: HashMap<Uuid, StoredRun>,
    agents: HashMap<Uuid, StoredAgent>,
    iterations: Vec<IterationRecord>,
}

/// RunRepository kept in process memory
///
/// Used when no database is wanted and by tests that inspect what the
/// orchestrator wrote.
#[derive(Default)]
pub struct InMemoryRunRepository {
    tables: Mutex<Tables>,
}

impl InMemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&self, run_id: Uuid) -> Option<StoredRun> {
        self.tables.lock().runs.get(&run_id).cloned()
    }

    pub fn agent(&self, agent_id: Uuid) -> Option<StoredAgent> {
        self.tables.lock().agents.get(&agent_id).cloned()
    }

    /// Every stored iteration across agents, in insertion order
    pub fn iterations(&self) -> Vec<IterationRecord> {
        self.tables.lock().iterations.clone()
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn create_run(&self, run: &NewRun) -> Result<Uuid, String> {
        let id = Uuid::new_v4();
        self.tables.lock().runs.insert(
            id,
            StoredRun {
                run: run.clone(),
                outcome: None,
            },
        );
        Ok(id)
    }

    async fn create_agent(&self, agent: &NewAgent) -> Result<Uuid, String> {
        let mut tables = self.tables.lock();
        if !tables.runs.contains_key(&agent.run_id) {
            return Err(format!("Run not found: {}", agent.run_id));
        }

        let id = Uuid::new_v4();
        tables.agents.insert(
            id,
            StoredAgent {
                agent: agent.clone(),
                status: AgentRunStatus::Running,
                exit_reason: None,
            },
        );
        Ok(id)
    }

    async fn record_iteration(&self, iteration: &NewIteration) -> Result<Uuid, String> {
        let mut tables = self.tables.lock();
        if !tables.agents.contains_key(&iteration.agent_id) {
            return Err(format!("Agent not found: {}", iteration.agent_id));
        }

        let id = Uuid::new_v4();
        tables
            .iterations
            .push(IterationRecord::from_new(id, iteration, Utc::now()));
        Ok(id)
    }

    async fn assigned_subtasks(&self, agent_id: Uuid) -> Result<Option<Vec<String>>, String> {
        Ok(self
            .tables
            .lock()
            .agents
            .get(&agent_id)
            .map(|stored| stored.agent.assigned_subtasks.clone()))
    }

    async fn finish_agent(
        &self,
        agent_id: Uuid,
        status: AgentRunStatus,
        exit_reason: Option<&str>,
    ) -> Result<(), String> {
        let mut tables = self.tables.lock();
        let stored = tables
            .agents
            .get_mut(&agent_id)
            .ok_or_else(|| format!("Agent not found: {}", agent_id))?;

        if !stored.status.can_transition_to(status) {
            return Err(format!(
                "Agent {} cannot move from {} to {}",
                agent_id, stored.status, status
            ));
        }

        stored.status = status;
        stored.exit_reason = exit_reason.map(str::to_string);
        Ok(())
    }

    async fn finish_run(&self, run_id: Uuid, outcome: &RunOutcome) -> Result<(), String> {
        let mut tables = self.tables.lock();
        let stored = tables
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| format!("Run not found: {}", run_id))?;
        stored.outcome = Some(outcome.clone());
        Ok(())
    }

    async fn iterations_for(&self, agent_id: Uuid) -> Result<Vec<IterationRecord>, String> {
        Ok(self
            .tables
            .lock()
            .iterations
            .iter()
            .filter(|record| record.agent_id == agent_id)
            .cloned()
            .collect())
    }
}
