use serde::{Deserialize, Serialize};

/// Lifecycle status of a stored agent record
///
/// # Status Transitions
/// ```text
/// Running -> Completed
///        \-> Abandoned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentRunStatus {
    /// Worker launched and under review
    Running,
    /// Worker passed every assigned subtask
    Completed,
    /// Worker stopped before passing every assigned subtask
    Abandoned,
}

impl AgentRunStatus {
    /// Checks if a transition from current status to next status is valid
    ///
    /// # Example
    /// ```
    /// use taskmesh::domain::run::AgentRunStatus;
    ///
    /// assert!(AgentRunStatus::Running.can_transition_to(AgentRunStatus::Completed));
    /// assert!(!AgentRunStatus::Completed.can_transition_to(AgentRunStatus::Running));
    /// ```
    pub fn can_transition_to(&self, next: AgentRunStatus) -> bool {
        use AgentRunStatus::*;
        matches!((self, next), (Running, Completed) | (Running, Abandoned))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRunStatus::Running => "running",
            AgentRunStatus::Completed => "completed",
            AgentRunStatus::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for AgentRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(AgentRunStatus::Running),
            "completed" => Ok(AgentRunStatus::Completed),
            "abandoned" => Ok(AgentRunStatus::Abandoned),
            other => Err(format!("Unknown agent status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_can_finish_either_way() {
        assert!(AgentRunStatus::Running.can_transition_to(AgentRunStatus::Completed));
        assert!(AgentRunStatus::Running.can_transition_to(AgentRunStatus::Abandoned));
    }

    #[test]
    fn finished_statuses_are_terminal() {
        assert!(!AgentRunStatus::Completed.can_transition_to(AgentRunStatus::Abandoned));
        assert!(!AgentRunStatus::Abandoned.can_transition_to(AgentRunStatus::Running));
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            AgentRunStatus::Running,
            AgentRunStatus::Completed,
            AgentRunStatus::Abandoned,
        ] {
            assert_eq!(status.to_string().parse::<AgentRunStatus>(), Ok(status));
        }
        assert!("paused".parse::<AgentRunStatus>().is_err());
    }
}
