// Run domain module
// Records written for every orchestration run and the agent status lifecycle

pub mod records;
pub mod value_objects;

pub use records::{IterationRecord, NewAgent, NewIteration, NewRun, RunOutcome};
pub use value_objects::AgentRunStatus;
