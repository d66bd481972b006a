use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::run::{AgentRunStatus, IterationRecord, NewAgent, NewIteration, NewRun, RunOutcome};

/// Repository trait for orchestration runs
///
/// The engine only writes through this port. The one read it relies on is
/// `assigned_subtasks`, used to re-derive how many subtasks a worker must
/// pass before it is complete.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Store a run and return its ID
    async fn create_run(&self, run: &NewRun) -> Result<Uuid, String>;

    /// Store an agent of a run and return its ID
    async fn create_agent(&self, agent: &NewAgent) -> Result<Uuid, String>;

    /// Store one reviewed iteration of an agent
    async fn record_iteration(&self, iteration: &NewIteration) -> Result<Uuid, String>;

    /// Subtasks recorded for an agent, if the agent exists
    async fn assigned_subtasks(&self, agent_id: Uuid) -> Result<Option<Vec<String>>, String>;

    /// Record how an agent's work ended
    async fn finish_agent(
        &self,
        agent_id: Uuid,
        status: AgentRunStatus,
        exit_reason: Option<&str>,
    ) -> Result<(), String>;

    /// Record run analytics
    async fn finish_run(&self, run_id: Uuid, outcome: &RunOutcome) -> Result<(), String>;

    /// Stored iterations of an agent, oldest first
    async fn iterations_for(&self, agent_id: Uuid) -> Result<Vec<IterationRecord>, String>;
}
