//! Test: Sequential Workflow - steps run in order, a failure stops the chain

use crate::helpers::*;
use agentic_pipeline::agent::{Agent, AgentResult};
use agentic_pipeline::core::{AgentConfig, AgentState, Step};
use agentic_pipeline::execution::{CompositeAgent, WorkflowMode};
use serde_json::json;

fn sequential(name: &str) -> CompositeAgent {
    CompositeAgent::new(AgentConfig::new(name, "")).with_mode(WorkflowMode::Sequential)
}

/// Test that steps execute in order and each result is handed back
#[tokio::test]
async fn test_success_chain() {
    let journal = journal();
    let mut workflow = sequential("plan_implement_review")
        .with_step(Step::new(
            ScriptedAgent::new("plan", 5)
                .then_ok(AgentResult::completed("planned").with_data("tasks", 3))
                .with_journal(&journal)
                .boxed(),
        ))
        .with_step(Step::new(ScriptedAgent::completing("implement").with_journal(&journal).boxed()))
        .with_step(Step::new(ScriptedAgent::completing("review").with_journal(&journal).boxed()));

    let report = run_agent(&mut workflow).await;

    assert_completed(&report);
    assert_iterations(&report, 3);
    assert_eq!(
        report.final_state.get("plan_result"),
        Some(&json!({ "tasks": 3 }))
    );
    assert!(report.final_state.contains("implement_result"));
    assert!(report.final_state.contains("review_result"));
    assert_eq!(report.final_state.get("current_step"), Some(&json!(3)));

    let executed: Vec<String> = entries(&journal)
        .into_iter()
        .filter(|e| e.ends_with("execute 1"))
        .collect();
    assert_eq!(executed, vec!["plan:execute 1", "implement:execute 1", "review:execute 1"]);

    assert_eq!(result_field(&report, "workflow_mode"), &json!("sequential"));
    assert_eq!(result_field(&report, "completed_steps"), &json!(3));
    assert_eq!(result_field(&report, "failed_steps"), &json!(0));
    assert_eq!(result_field(&report, "failed_step"), &json!(null));
}

/// Test that a failing step stops the workflow and is named in the result
#[tokio::test]
async fn test_failure_stops_the_chain() {
    let journal = journal();
    let mut workflow = sequential("build_test_deploy")
        .with_step(Step::new(ScriptedAgent::completing("A").with_journal(&journal).boxed()))
        .with_step(Step::new(ScriptedAgent::erroring("B").with_journal(&journal).boxed()))
        .with_step(Step::new(ScriptedAgent::completing("C").with_journal(&journal).boxed()));

    let report = run_agent(&mut workflow).await;

    assert_failed(&report);
    assert_iterations(&report, 2);
    assert!(report.final_state.contains("A_result"));
    assert!(!report.final_state.contains("B_result"));
    assert_eq!(report.final_state.get("failed_step"), Some(&json!("B")));
    assert_eq!(result_field(&report, "failed_step"), &json!("B"));
    assert_eq!(result_field(&report, "completed_steps"), &json!(1));
    assert_eq!(result_field(&report, "failed_steps"), &json!(1));
    assert_eq!(
        report.pipeline_status.errors,
        vec!["Step B failed: Execution error: B broke".to_string()]
    );

    assert!(!entries(&journal).iter().any(|e| e.starts_with("C:")));
}

/// Test that a step's iteration override bounds its nested run
#[tokio::test]
async fn test_step_iteration_override() {
    let mut workflow = sequential("poller").with_step(
        Step::new(ScriptedAgent::new("poll", 50).boxed()).with_max_iterations(2),
    );

    let report = run_agent(&mut workflow).await;

    assert_completed(&report);
    assert_eq!(
        report.final_state.get("poll_result"),
        Some(&json!({ "ticks": 2 }))
    );
    assert_eq!(workflow.steps()[0].agent.config().max_iterations, 2);
}

/// Test that steps see the composite's state and context but not each other's data
#[tokio::test]
async fn test_step_context() {
    let second = ScriptedAgent::completing("second");
    let contexts = second.contexts();

    let mut workflow = sequential("handoff")
        .with_step(Step::new(
            ScriptedAgent::new("first", 5)
                .then_ok(AgentResult::completed("wrote notes").with_data("notes", "abc"))
                .boxed(),
        ))
        .with_step(Step::new(second.boxed()));

    let report = agentic_pipeline::execution::Pipeline::new(&mut workflow)
        .run(agentic_pipeline::core::RunContext::new().with_value("ticket", "OPS-12"))
        .await;
    assert_completed(&report);

    let contexts = contexts.lock().unwrap();
    let context = &contexts[0];
    assert_eq!(context.get("ticket"), Some(&json!("OPS-12")));
    assert_eq!(context.get("completed_steps"), Some(&json!(["first"])));
    assert_eq!(context.get("workflow_mode"), Some(&json!("sequential")));
    assert_eq!(
        context.get("composite_state").and_then(|s| s.get("first_result")),
        Some(&json!({ "notes": "abc" }))
    );

    // The second step's own state starts empty
    let second_state = &result_field(&report, "step_results")["second"]["final_state"];
    assert!(second_state["data"].is_object());
    assert!(second_state["data"].get("notes").is_none());
}

/// Test that a nested composite runs as a single step
#[tokio::test]
async fn test_nested_composite_step() {
    let inner = sequential("inner")
        .with_step(Step::new(ScriptedAgent::completing("lint").boxed()))
        .with_step(Step::new(ScriptedAgent::completing("format").boxed()));

    let mut workflow = sequential("outer")
        .with_step(Step::new(Box::new(inner)))
        .with_step(Step::new(ScriptedAgent::completing("ship").boxed()));

    let report = run_agent(&mut workflow).await;

    assert_completed(&report);
    let inner_result = report.final_state.get("inner_result").unwrap();
    assert!(inner_result.get("lint_result").is_some());
    assert!(inner_result.get("format_result").is_some());
    assert!(report.final_state.contains("ship_result"));
}

/// Test that the workflow reports itself terminal once every step has run
#[tokio::test]
async fn test_terminal_after_last_step() {
    let mut workflow = sequential("lint_format")
        .with_step(Step::new(ScriptedAgent::completing("lint").boxed()))
        .with_step(Step::new(ScriptedAgent::completing("format").boxed()));
    assert!(!workflow.check_terminal_condition(&AgentState::new()));

    let report = run_agent(&mut workflow).await;

    assert_completed(&report);
    assert!(workflow.check_terminal_condition(&report.final_state));
}

/// Test that a chain stopped by a failure is not reported as exhausted
#[tokio::test]
async fn test_not_terminal_after_early_failure() {
    let mut workflow = sequential("fetch_parse")
        .with_step(Step::new(ScriptedAgent::erroring("fetch").boxed()))
        .with_step(Step::new(ScriptedAgent::completing("parse").boxed()));

    let report = run_agent(&mut workflow).await;

    assert_failed(&report);
    assert!(!workflow.check_terminal_condition(&report.final_state));
}
