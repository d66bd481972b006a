use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{AgentError, AgentResult};
use super::events::ReviewEvent;
use super::state::ProgressEntry;

/// Review decision from the Manager Agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewDecision {
    Approved { reason: String },
    Rejected { reason: String },
}

/// Decides whether a worker's progress satisfies its current subtask
pub trait ApprovalPolicy: Send + Sync {
    fn review(&self, content: &str) -> AgentResult<ReviewDecision>;
}

/// Approves progress that mentions one of a set of keywords
///
/// This is a placeholder policy: it matches text, it does not verify work.
#[derive(Debug, Clone)]
pub struct KeywordApproval {
    keywords: Vec<String>,
}

impl KeywordApproval {
    pub fn new(keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.into().to_lowercase())
                .collect(),
        }
    }
}

impl Default for KeywordApproval {
    fn default() -> Self {
        Self::new(["task completed", "done"])
    }
}

impl ApprovalPolicy for KeywordApproval {
    fn review(&self, content: &str) -> AgentResult<ReviewDecision> {
        let lowered = content.to_lowercase();
        match self.keywords.iter().find(|k| lowered.contains(k.as_str())) {
            Some(keyword) => Ok(ReviewDecision::Approved {
                reason: format!("Task requirements met (contains '{}').", keyword),
            }),
            None => Ok(ReviewDecision::Rejected {
                reason: "Task requirements not met. Needs further iteration.".to_string(),
            }),
        }
    }
}

/// How many workers to launch and how long each may iterate per subtask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    pub num_workers: usize,
    pub max_iterations: usize,
}

impl RunPlan {
    pub fn new(num_workers: usize, max_iterations: usize) -> AgentResult<Self> {
        if num_workers == 0 {
            return Err(AgentError::InvalidWorkerCount(num_workers));
        }
        if max_iterations == 0 {
            return Err(AgentError::InvalidIterationBudget(max_iterations));
        }
        Ok(Self {
            num_workers,
            max_iterations,
        })
    }
}

impl Default for RunPlan {
    fn default() -> Self {
        Self {
            num_workers: 1,
            max_iterations: 1,
        }
    }
}

/// Why a worker left a subtask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubtaskExit {
    /// The model called the `task_completed` tool
    Signalled,
    /// The manager approved the subtask
    Approved,
    /// The iteration budget ran out
    BudgetExhausted,
}

/// Output a worker hands back when its task ends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker: String,
    /// Every model reply, in order
    pub results: Vec<String>,
    /// One exit per subtask
    pub exits: Vec<SubtaskExit>,
}

/// Manager's view of one worker after the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub worker: String,
    pub agent_id: Uuid,
    pub subtasks: Vec<String>,
    pub summaries: Vec<String>,
    pub trace: Vec<ProgressEntry>,
    pub last_progress: Option<String>,
    pub report: Option<WorkerReport>,
}

/// Result of a complete orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub task: String,
    pub subtasks: Vec<String>,
    pub workers: Vec<WorkerSummary>,
    pub events: Vec<ReviewEvent>,
    pub total_tokens: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn worker(&self, name: &str) -> Option<&WorkerSummary> {
        self.workers.iter().find(|w| w.worker == name)
    }

    pub fn events_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ReviewEvent> + 'a {
        self.events.iter().filter(move |e| e.worker() == name)
    }
}

/// Rough token count used for analytics
pub fn approx_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_policy_is_case_insensitive() {
        let policy = KeywordApproval::default();
        assert!(matches!(
            policy.review("Task Completed: wrote the file").unwrap(),
            ReviewDecision::Approved { .. }
        ));
        assert!(matches!(
            policy.review("all DONE").unwrap(),
            ReviewDecision::Approved { .. }
        ));
        assert!(matches!(
            policy.review("still working").unwrap(),
            ReviewDecision::Rejected { .. }
        ));
    }

    #[test]
    fn custom_keywords() {
        let policy = KeywordApproval::new(["LGTM"]);
        assert!(matches!(
            policy.review("lgtm, ship it").unwrap(),
            ReviewDecision::Approved { .. }
        ));
        assert!(matches!(
            policy.review("done").unwrap(),
            ReviewDecision::Rejected { .. }
        ));
    }

    #[test]
    fn run_plan_rejects_zero() {
        assert!(matches!(RunPlan::new(0, 1), Err(AgentError::InvalidWorkerCount(0))));
        assert!(matches!(
            RunPlan::new(1, 0),
            Err(AgentError::InvalidIterationBudget(0))
        ));
        assert_eq!(RunPlan::new(2, 3).unwrap().num_workers, 2);
    }

    #[test]
    fn token_estimate_counts_words() {
        assert_eq!(approx_tokens("one two  three\nfour"), 4);
        assert_eq!(approx_tokens(""), 0);
    }
}
