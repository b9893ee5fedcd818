//! Test: State History - snapshots, diffs and rollback after a run

use crate::helpers::*;
use agentic_pipeline::agent::AgentResult;
use agentic_pipeline::core::AgentState;
use serde_json::json;

async fn three_phase_run() -> AgentState {
    let mut agent = ScriptedAgent::new("migrator", 10)
        .then_ok(AgentResult::running("planned").with_data("phase", "plan").with_data("files", 1))
        .then_ok(AgentResult::running("built").with_data("phase", "build").with_data("report", "ok"))
        .then_ok(AgentResult::completed("shipped").with_data("files", 3));
    run_agent(&mut agent).await.final_state
}

/// Test that each iteration leaves one labelled snapshot
#[tokio::test]
async fn test_one_snapshot_per_iteration() {
    let state = three_phase_run().await;

    let labels: Vec<&str> = state.history().iter().map(|s| s.message.as_str()).collect();
    assert_eq!(labels, vec!["planned", "built", "shipped"]);
    let indices: Vec<usize> = state.history().iter().map(|s| s.iteration).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(state.latest_snapshot().unwrap().data, *state.data());
}

/// Test the diff between the first and last snapshots
#[tokio::test]
async fn test_diff_across_the_run() {
    let state = three_phase_run().await;

    let diff = state.get_diff(0, 2);
    assert_eq!(diff.get("~phase"), Some(&json!({ "from": "plan", "to": "build" })));
    assert_eq!(diff.get("~files"), Some(&json!({ "from": 1, "to": 3 })));
    assert_eq!(diff.get("+report"), Some(&json!("ok")));
    assert_eq!(diff.len(), 3);

    assert!(state.get_diff(0, 7).is_empty());
}

/// Test that rolling back restores data and counter and drops later snapshots
#[tokio::test]
async fn test_rollback_after_run() {
    let mut state = three_phase_run().await;

    assert!(state.rollback_to_iteration(0));
    assert_eq!(state.iteration(), 1);
    assert_eq!(state.history().len(), 1);
    assert_eq!(state.get("phase"), Some(&json!("plan")));
    assert!(!state.contains("report"));

    assert!(!state.rollback_to_iteration(5));
    assert_eq!(state.iteration(), 1);

    state.advance_iteration("replanned");
    assert_eq!(state.iteration(), state.history().len());
    assert_eq!(state.history()[1].message, "replanned");
}

/// Test that the final state survives a JSON round trip with its history
#[tokio::test]
async fn test_state_persists_as_json() {
    let state = three_phase_run().await;

    let restored = AgentState::from_json(&state.to_json().unwrap()).unwrap();
    assert_eq!(restored.iteration(), 3);
    assert_eq!(restored.history().len(), 3);
    assert_eq!(restored.get("files"), Some(&json!(3)));
}
