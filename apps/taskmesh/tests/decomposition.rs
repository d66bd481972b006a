//! Integration tests for task decomposition through the manager

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{manager, server_error, ScriptedClient, Step};
use taskmesh::agents::{AgentError, RunPlan};
use taskmesh::llm::{ChatReply, LlmError};

const GOAL: &str = "Scrape techmeme.com and summarize the top headlines.";

#[tokio::test]
async fn test_json_reply_is_used_verbatim() {
    let client = Arc::new(ScriptedClient::new("").replies(
        GOAL,
        &[r#"["Fetch techmeme.com", "Extract headlines", "Summarize them"]"#],
    ));
    let (manager, _) = manager(client.clone());

    let subtasks = manager.decompose_goal(GOAL).await.unwrap();

    assert_eq!(
        subtasks,
        vec!["Fetch techmeme.com", "Extract headlines", "Summarize them"]
    );
    assert_eq!(client.calls_for(GOAL), 1);
}

#[tokio::test]
async fn test_unparseable_replies_fall_back_to_main_task() {
    let client = Arc::new(ScriptedClient::new("Sure."));
    let (manager, _) = manager(client.clone());

    let subtasks = manager.decompose_goal(GOAL).await.unwrap();

    assert_eq!(subtasks, vec![GOAL]);
    assert_eq!(client.calls_for(GOAL), 3);
}

#[tokio::test]
async fn test_transient_failure_uses_one_attempt() {
    let client = Arc::new(ScriptedClient::new("").script(
        GOAL,
        vec![
            Step::Fail(server_error()),
            Step::Reply(ChatReply::text("1. Fetch the page\n2. Summarize it")),
        ],
    ));
    let (manager, _) = manager(client.clone());

    let subtasks = manager.decompose_goal(GOAL).await.unwrap();

    assert_eq!(subtasks, vec!["Fetch the page", "Summarize it"]);
    assert_eq!(client.calls_for(GOAL), 2);
}

#[tokio::test]
async fn test_fatal_error_stops_the_run_before_workers_start() {
    let client = Arc::new(ScriptedClient::new("done").script(
        GOAL,
        vec![Step::Fail(LlmError::Status {
            status: 402,
            message: "weekly usage limit reached".to_string(),
        })],
    ));
    let (manager, store) = manager(client.clone());

    let result = manager.orchestrate(GOAL, RunPlan::default()).await;

    assert!(matches!(result, Err(AgentError::LlmError(ref e)) if e.is_fatal()));
    assert_eq!(client.calls_for(GOAL), 1);
    assert!(store.iterations().is_empty());
    assert!(manager.mailbox().is_empty());
}

#[tokio::test]
async fn test_orchestrate_runs_decomposed_subtasks() {
    let client = Arc::new(
        ScriptedClient::new("done").replies(GOAL, &[r#"["Fetch the page", "Summarize it"]"#]),
    );
    let (manager, _) = manager(client.clone());

    let summary = manager
        .orchestrate(GOAL, RunPlan::new(2, 1).unwrap())
        .await
        .unwrap();

    assert_eq!(summary.subtasks, vec!["Fetch the page", "Summarize it"]);
    assert_eq!(summary.workers.len(), 2);
    assert_eq!(client.calls_for("Fetch the page"), 1);
    assert_eq!(client.calls_for("Summarize it"), 1);
    assert!(summary
        .workers
        .iter()
        .all(|w| w.summaries.len() == 1));
}
