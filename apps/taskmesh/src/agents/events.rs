// Review events
//
// Every change the supervisor makes to a worker's assignment is described
// by one of these. They are collected into the run summary and logged.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReviewEvent {
    /// Progress satisfied the approval policy; the worker advanced
    Approved {
        worker: String,
        subtask_index: usize,
        iteration: usize,
        reason: String,
    },
    /// Progress did not satisfy the policy; the iteration counter grew
    Rejected {
        worker: String,
        subtask_index: usize,
        iteration: usize,
        reason: String,
    },
    /// The worker left a subtask that was never approved
    SubtaskClosed {
        worker: String,
        subtask_index: usize,
        completed: bool,
    },
    /// Every assigned subtask is behind the worker
    WorkerCompleted { worker: String },
    /// The worker stopped before closing all of its subtasks
    WorkerAbandoned { worker: String, reason: String },
}

impl ReviewEvent {
    /// Returns the worker this event concerns
    pub fn worker(&self) -> &str {
        match self {
            ReviewEvent::Approved { worker, .. }
            | ReviewEvent::Rejected { worker, .. }
            | ReviewEvent::SubtaskClosed { worker, .. }
            | ReviewEvent::WorkerCompleted { worker }
            | ReviewEvent::WorkerAbandoned { worker, .. } => worker,
        }
    }
}
