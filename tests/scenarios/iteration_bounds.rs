//! Test: Iteration Bounds - when does a run stop

use crate::helpers::*;
use agentic_pipeline::agent::AgentResult;
use agentic_pipeline::core::{AgentStatus, TerminationCondition};
use serde_json::json;

/// Test that an agent that never finishes is stopped by its iteration bound
#[tokio::test]
async fn test_stops_at_max_iterations() {
    let mut agent = ScriptedAgent::new("worker", 3);
    let report = run_agent(&mut agent).await;

    assert_completed(&report);
    assert_iterations(&report, 3);
    assert_eq!(report.final_state.get("ticks"), Some(&json!(3)));
    assert_eq!(result_field(&report, "iterations"), &json!(3));
    assert_eq!(result_field(&report, "agent_name"), &json!("worker"));
}

/// Test that a terminal result on the first iteration ends the run
#[tokio::test]
async fn test_terminal_result_on_first_iteration() {
    let mut agent = ScriptedAgent::new("quick", 10)
        .then_ok(AgentResult::completed("nothing to do").with_data("verdict", "clean"));
    let report = run_agent(&mut agent).await;

    assert_completed(&report);
    assert_iterations(&report, 1);
    assert_eq!(report.final_state.get("verdict"), Some(&json!("clean")));
    assert_eq!(report.final_state.history()[0].message, "nothing to do");
}

/// Test that a zero bound stops the run before any iteration
#[tokio::test]
async fn test_zero_bound_runs_nothing() {
    let journal = journal();
    let mut agent = ScriptedAgent::new("idle", 0).with_journal(&journal);
    let report = run_agent(&mut agent).await;

    assert_completed(&report);
    assert_iterations(&report, 0);
    assert_eq!(entries(&journal), vec!["idle:initialize", "idle:finalize"]);
}

/// Test that a non-terminal completed result stops the run through the success condition
#[tokio::test]
async fn test_success_status_condition() {
    let mut agent = ScriptedAgent::new("builder", 10)
        .then_ok(AgentResult::running("compiling"))
        .then_ok(AgentResult::running("linking"))
        .then_ok(non_terminal(AgentStatus::Completed, "artifact ready"))
        .configure(|config| config.add_terminal_condition(TerminationCondition::SuccessStatus));
    let report = run_agent(&mut agent).await;

    assert_completed(&report);
    assert_iterations(&report, 3);
}

/// Test that a key/value condition matches on any listed key
#[tokio::test]
async fn test_state_match_condition() {
    let mut agent = ScriptedAgent::new("deployer", 10)
        .then_ok(AgentResult::running("staging").with_data("phase", "staging"))
        .then_ok(AgentResult::running("live").with_data("phase", "live"))
        .configure(|config| {
            config.add_terminal_condition(TerminationCondition::state_equals("phase", "live"))
        });
    let report = run_agent(&mut agent).await;

    assert_completed(&report);
    assert_iterations(&report, 2);
}

/// Test that a predicate error is treated as "not met"
#[tokio::test]
async fn test_failing_predicate_does_not_stop_the_run() {
    let mut agent = ScriptedAgent::new("worker", 2).configure(|config| {
        config.add_terminal_condition(TerminationCondition::state_predicate("flaky", |_| {
            anyhow::bail!("predicate exploded")
        }))
    });
    let report = run_agent(&mut agent).await;

    assert_completed(&report);
    assert_iterations(&report, 2);
}

/// Test that a custom condition sees the run status
#[tokio::test]
async fn test_custom_condition_reads_status() {
    let mut agent = ScriptedAgent::new("worker", 10)
        .then_ok(AgentResult::running("first"))
        .then_ok(AgentResult {
            error: Some("lint warnings".to_string()),
            ..AgentResult::running("second")
        })
        .configure(|config| {
            config.add_terminal_condition(TerminationCondition::custom("any_error", |_, status| {
                Ok(!status.errors.is_empty())
            }))
        });
    let report = run_agent(&mut agent).await;

    assert_iterations(&report, 2);
    assert_eq!(report.pipeline_status.errors, vec!["lint warnings".to_string()]);
}

/// Test that a zero timeout budget stops the run before the first iteration
#[tokio::test]
async fn test_timeout_budget() {
    let mut agent = ScriptedAgent::new("slow", 10).configure(|config| config.timeout_seconds = Some(0));
    let report = run_agent(&mut agent).await;

    assert_completed(&report);
    assert_iterations(&report, 0);
}

/// Test that without any condition only the agent can end the run
#[tokio::test]
async fn test_no_conditions_agent_decides() {
    let mut agent = ScriptedAgent::new("worker", 1)
        .then_ok(AgentResult::running("one"))
        .then_ok(AgentResult::running("two"))
        .then_ok(AgentResult::completed("three"))
        .configure(|config| config.terminal_conditions.clear());
    let report = run_agent(&mut agent).await;

    assert_completed(&report);
    assert_iterations(&report, 3);
}
