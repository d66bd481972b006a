// Agent system modules
//
// This module contains the manager/worker orchestration engine: task
// decomposition, concurrent workers and the manager's review loop.

pub mod decomposer;
pub mod errors;
pub mod events;
pub mod manager;
pub mod messages;
pub mod prompts;
pub mod review;
pub mod state;
pub mod types;
pub mod worker;

// Re-export main types
pub use decomposer::TaskDecomposer;
pub use errors::{AgentError, AgentResult};
pub use events::ReviewEvent;
pub use manager::ManagerAgent;
pub use messages::{Mailbox, Message, MessageKind, BROADCAST, MANAGER};
pub use review::Supervisor;
pub use state::{WorkerAssignment, WorkerPhase};
pub use types::{ApprovalPolicy, KeywordApproval, ReviewDecision, RunPlan, RunSummary, WorkerReport};
pub use worker::{WorkerAgent, WorkerSettings};
