// Per-worker review state
//
// The supervisor owns one WorkerAssignment per worker and drives it
// through the review state machine as progress arrives.

use serde::{Deserialize, Serialize};

use super::errors::{AgentError, AgentResult};
use super::events::ReviewEvent;

/// Review phase of a worker
///
/// # Transitions
/// ```text
/// Assigned -> Iterating <-> Advancing -> Complete
///     |           |                         ^
///     +-----------+-------------------------+  (abandoned)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerPhase {
    /// Subtasks handed out, no progress seen yet
    Assigned,
    /// Progress on the current subtask is under review
    Iterating,
    /// Moving to the next subtask; never observed between poll cycles
    Advancing,
    /// No subtasks left
    Complete,
}

impl WorkerPhase {
    pub fn can_transition_to(&self, next: WorkerPhase) -> bool {
        use WorkerPhase::*;
        matches!(
            (self, next),
            (Assigned, Iterating)
                | (Assigned, Advancing)
                | (Assigned, Complete)
                | (Iterating, Advancing)
                | (Iterating, Complete)
                | (Advancing, Iterating)
                | (Advancing, Complete)
        )
    }
}

impl std::fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerPhase::Assigned => write!(f, "assigned"),
            WorkerPhase::Iterating => write!(f, "iterating"),
            WorkerPhase::Advancing => write!(f, "advancing"),
            WorkerPhase::Complete => write!(f, "complete"),
        }
    }
}

/// One reviewed progress update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub subtask_index: usize,
    pub iteration: usize,
    pub content: String,
}

/// A worker's subtask queue and the manager's view of its progress
///
/// # Invariants
/// - `current_task_index` never decreases and grows by one per advance
/// - `iteration_count` is reset to zero on every advance
/// - the worker is complete iff `current_task_index >= expected_subtasks`
#[derive(Debug, Clone)]
pub struct WorkerAssignment {
    worker: String,
    subtasks: Vec<String>,
    expected_subtasks: usize,
    current_task_index: usize,
    iteration_count: usize,
    phase: WorkerPhase,
    last_progress: Option<String>,
    trace: Vec<ProgressEntry>,
    summaries: Vec<String>,
}

impl WorkerAssignment {
    pub fn new(worker: impl Into<String>, subtasks: Vec<String>) -> Self {
        let expected_subtasks = subtasks.len();
        Self {
            worker: worker.into(),
            subtasks,
            expected_subtasks,
            current_task_index: 0,
            iteration_count: 0,
            phase: if expected_subtasks == 0 {
                WorkerPhase::Complete
            } else {
                WorkerPhase::Assigned
            },
            last_progress: None,
            trace: Vec::new(),
            summaries: Vec::new(),
        }
    }

    /// Overrides how many subtasks must be passed before the worker is complete
    ///
    /// Used when the run store holds a different assignment than memory.
    pub fn with_expected_subtasks(mut self, expected: usize) -> Self {
        self.expected_subtasks = expected;
        self.phase = if expected == 0 {
            WorkerPhase::Complete
        } else {
            WorkerPhase::Assigned
        };
        self
    }

    // ===== State transitions =====

    /// Records a progress update for the current subtask
    ///
    /// Returns `Ok(false)` when the content repeats the last recorded update.
    pub fn record_progress(&mut self, content: &str) -> AgentResult<bool> {
        if self.phase == WorkerPhase::Complete {
            return Err(self.invalid(WorkerPhase::Iterating));
        }
        if self.last_progress.as_deref() == Some(content) {
            return Ok(false);
        }
        if self.phase == WorkerPhase::Assigned {
            self.transition(WorkerPhase::Iterating)?;
        }

        self.last_progress = Some(content.to_string());
        self.trace.push(ProgressEntry {
            subtask_index: self.current_task_index,
            iteration: self.iteration_count,
            content: content.to_string(),
        });
        Ok(true)
    }

    /// Approves the current subtask and advances to the next one
    pub fn approve(&mut self, reason: impl Into<String>) -> AgentResult<ReviewEvent> {
        if self.phase != WorkerPhase::Iterating {
            return Err(self.invalid(WorkerPhase::Advancing));
        }
        self.transition(WorkerPhase::Advancing)?;

        let subtask_index = self.current_task_index;
        let iteration = self.iteration_count;
        self.summaries.push(format!(
            "Task {} completed by {}: {}",
            subtask_index + 1,
            self.worker,
            self.last_progress.as_deref().unwrap_or_default()
        ));
        self.advance()?;

        Ok(ReviewEvent::Approved {
            worker: self.worker.clone(),
            subtask_index,
            iteration,
            reason: reason.into(),
        })
    }

    /// Rejects the latest progress; the worker keeps its subtask
    pub fn reject(&mut self, reason: impl Into<String>) -> AgentResult<ReviewEvent> {
        if self.phase != WorkerPhase::Iterating {
            return Err(AgentError::ReviewFailed(format!(
                "{} has no progress under review (phase {})",
                self.worker, self.phase
            )));
        }

        let iteration = self.iteration_count;
        self.iteration_count += 1;

        Ok(ReviewEvent::Rejected {
            worker: self.worker.clone(),
            subtask_index: self.current_task_index,
            iteration,
            reason: reason.into(),
        })
    }

    /// Handles the worker leaving `subtask_index` on its own
    ///
    /// Only closes the current subtask; closures of subtasks the manager
    /// already advanced past are ignored.
    pub fn close_subtask(&mut self, subtask_index: usize, completed: bool) -> Option<ReviewEvent> {
        if self.is_complete() || subtask_index != self.current_task_index {
            return None;
        }
        self.transition(WorkerPhase::Advancing).ok()?;
        self.advance().ok()?;

        Some(ReviewEvent::SubtaskClosed {
            worker: self.worker.clone(),
            subtask_index,
            completed,
        })
    }

    /// Marks the worker complete without passing its remaining subtasks
    pub fn abandon(&mut self, reason: impl Into<String>) -> Option<ReviewEvent> {
        if self.is_complete() {
            return None;
        }
        self.phase = WorkerPhase::Complete;
        Some(ReviewEvent::WorkerAbandoned {
            worker: self.worker.clone(),
            reason: reason.into(),
        })
    }

    fn advance(&mut self) -> AgentResult<()> {
        self.current_task_index += 1;
        self.iteration_count = 0;
        self.last_progress = None;
        let next = if self.current_task_index >= self.expected_subtasks {
            WorkerPhase::Complete
        } else {
            WorkerPhase::Iterating
        };
        self.transition(next)
    }

    fn transition(&mut self, next: WorkerPhase) -> AgentResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(self.invalid(next));
        }
        self.phase = next;
        Ok(())
    }

    fn invalid(&self, next: WorkerPhase) -> AgentError {
        AgentError::InvalidStateTransition {
            from: self.phase.to_string(),
            to: next.to_string(),
        }
    }

    // ===== Getters =====

    pub fn worker(&self) -> &str {
        &self.worker
    }

    pub fn subtasks(&self) -> &[String] {
        &self.subtasks
    }

    pub fn expected_subtasks(&self) -> usize {
        self.expected_subtasks
    }

    pub fn current_task_index(&self) -> usize {
        self.current_task_index
    }

    pub fn current_subtask(&self) -> Option<&str> {
        self.subtasks.get(self.current_task_index).map(String::as_str)
    }

    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == WorkerPhase::Complete
    }

    pub fn trace(&self) -> &[ProgressEntry] {
        &self.trace
    }

    pub fn summaries(&self) -> &[String] {
        &self.summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(subtasks: &[&str]) -> WorkerAssignment {
        WorkerAssignment::new(
            "agent_1",
            subtasks.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn approval_advances_and_resets_counter() {
        let mut a = assignment(&["A", "B"]);
        assert_eq!(a.phase(), WorkerPhase::Assigned);

        assert!(a.record_progress("still working").unwrap());
        a.reject("not yet").unwrap();
        assert_eq!(a.iteration_count(), 1);
        assert_eq!(a.current_task_index(), 0);

        assert!(a.record_progress("done").unwrap());
        let event = a.approve("ok").unwrap();
        assert_eq!(
            event,
            ReviewEvent::Approved {
                worker: "agent_1".into(),
                subtask_index: 0,
                iteration: 1,
                reason: "ok".into(),
            }
        );
        assert_eq!(a.current_task_index(), 1);
        assert_eq!(a.iteration_count(), 0);
        assert_eq!(a.current_subtask(), Some("B"));
        assert_eq!(a.summaries(), ["Task 1 completed by agent_1: done"]);
    }

    #[test]
    fn last_approval_completes_the_worker() {
        let mut a = assignment(&["A"]);
        a.record_progress("task completed").unwrap();
        a.approve("ok").unwrap();
        assert!(a.is_complete());
        assert!(a.record_progress("more").is_err());
    }

    #[test]
    fn repeated_content_is_not_recorded_twice() {
        let mut a = assignment(&["A"]);
        assert!(a.record_progress("same").unwrap());
        assert!(!a.record_progress("same").unwrap());
        assert_eq!(a.trace().len(), 1);
    }

    #[test]
    fn approve_without_progress_is_invalid() {
        let mut a = assignment(&["A"]);
        assert!(matches!(
            a.approve("ok"),
            Err(AgentError::InvalidStateTransition { .. })
        ));
        assert_eq!(a.current_task_index(), 0);
    }

    #[test]
    fn closure_only_applies_to_the_current_subtask() {
        let mut a = assignment(&["A", "B"]);
        a.record_progress("done").unwrap();
        a.approve("ok").unwrap();

        assert_eq!(a.close_subtask(0, true), None);
        assert_eq!(a.current_task_index(), 1);

        let event = a.close_subtask(1, false).unwrap();
        assert_eq!(
            event,
            ReviewEvent::SubtaskClosed {
                worker: "agent_1".into(),
                subtask_index: 1,
                completed: false,
            }
        );
        assert!(a.is_complete());
        assert_eq!(a.current_task_index(), 2);
    }

    #[test]
    fn closure_before_any_progress_is_allowed() {
        let mut a = assignment(&["A", "B"]);
        assert!(a.close_subtask(0, false).is_some());
        assert_eq!(a.phase(), WorkerPhase::Iterating);
    }

    #[test]
    fn task_index_is_monotonic() {
        let mut a = assignment(&["A", "B", "C"]);
        let mut seen = vec![a.current_task_index()];
        for round in 0..6 {
            let content = format!("update {round}");
            a.record_progress(&content).unwrap_or(false);
            if round % 2 == 1 {
                let _ = a.approve("ok");
            } else {
                let _ = a.reject("no");
            }
            seen.push(a.current_task_index());
        }
        assert!(seen.windows(2).all(|w| w[1] == w[0] || w[1] == w[0] + 1));
        assert!(a.is_complete());
    }

    #[test]
    fn empty_assignment_is_complete() {
        let a = assignment(&[]);
        assert!(a.is_complete());
        let b = assignment(&["A"]).with_expected_subtasks(0);
        assert!(b.is_complete());
    }

    #[test]
    fn abandon_completes_once() {
        let mut a = assignment(&["A"]);
        assert!(a.abandon("exited").is_some());
        assert!(a.abandon("again").is_none());
        assert!(a.is_complete());
    }

    #[test]
    fn phase_transitions() {
        assert!(WorkerPhase::Assigned.can_transition_to(WorkerPhase::Iterating));
        assert!(WorkerPhase::Iterating.can_transition_to(WorkerPhase::Advancing));
        assert!(WorkerPhase::Advancing.can_transition_to(WorkerPhase::Complete));
        assert!(!WorkerPhase::Complete.can_transition_to(WorkerPhase::Iterating));
        assert!(!WorkerPhase::Iterating.can_transition_to(WorkerPhase::Assigned));
    }
}
