//! Taskmesh Library
//!
//! A manager/worker orchestration engine for LLM agents: the manager
//! decomposes a task, deals subtasks to concurrent workers and reviews
//! their progress through a shared mailbox until every worker is done.

pub mod agents;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod llm;
