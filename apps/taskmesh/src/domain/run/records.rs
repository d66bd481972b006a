use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A run about to be stored: the main task and its decomposition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRun {
    pub task: String,
    pub subtasks: Vec<String>,
    pub model_name: String,
}

/// A worker about to be stored with its assigned subtasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAgent {
    pub run_id: Uuid,
    pub name: String,
    pub assigned_subtasks: Vec<String>,
}

/// One reviewed iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIteration {
    pub agent_id: Uuid,
    pub iteration_index: usize,
    pub subtask_index: usize,
    pub prompt: Option<String>,
    pub response: String,
    /// Time since the worker's previous update
    pub duration: Duration,
    pub approx_tokens: usize,
    pub error: Option<String>,
}

/// Analytics written when a run finishes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub manager_summary: String,
    pub total_time: Duration,
    pub total_tokens: usize,
}

/// A stored iteration, as read back from a repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub iteration_index: usize,
    pub subtask_index: usize,
    pub prompt: Option<String>,
    pub response: String,
    pub duration_secs: f64,
    pub approx_tokens: usize,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl IterationRecord {
    /// Builds the stored form of a new iteration
    pub fn from_new(id: Uuid, iteration: &NewIteration, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            agent_id: iteration.agent_id,
            iteration_index: iteration.iteration_index,
            subtask_index: iteration.subtask_index,
            prompt: iteration.prompt.clone(),
            response: iteration.response.clone(),
            duration_secs: iteration.duration.as_secs_f64(),
            approx_tokens: iteration.approx_tokens,
            error: iteration.error.clone(),
            created_at,
        }
    }
}
