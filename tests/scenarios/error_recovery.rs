//! Test: Error Recovery - iteration errors, on_error and lifecycle failures

use crate::helpers::*;
use agentic_pipeline::agent::{AgentError, AgentResult};
use agentic_pipeline::core::{AgentStatus, TerminationCondition};
use serde_json::json;

/// Test that the default on_error ends the run as failed
#[tokio::test]
async fn test_unrecovered_error_fails_the_run() {
    let journal = journal();
    let mut agent = ScriptedAgent::new("worker", 10)
        .then_ok(AgentResult::running("warming up"))
        .then_err(AgentError::Execution("disk full".to_string()))
        .with_journal(&journal);
    let report = run_agent(&mut agent).await;

    assert_failed(&report);
    assert_iterations(&report, 1);
    assert_eq!(
        report.pipeline_status.errors,
        vec!["Execution error: disk full".to_string()]
    );
    // Finalization still runs and the report is complete
    assert!(report.agent_results.is_some());
    assert!(report.pipeline_error.is_none());
    assert!(entries(&journal).contains(&"worker:on_error".to_string()));
    assert_eq!(entries(&journal).last().map(String::as_str), Some("worker:finalize"));
}

/// Test that a running recovery result is merged and the run continues
#[tokio::test]
async fn test_recovery_result_continues_the_run() {
    let mut agent = ScriptedAgent::new("worker", 10)
        .then_err(AgentError::Timeout(30))
        .then_ok(AgentResult::completed("second attempt worked"))
        .recovering_with(AgentResult::running("retrying").with_data("recovered", true));
    let report = run_agent(&mut agent).await;

    assert_completed(&report);
    assert_iterations(&report, 2);
    assert_eq!(report.final_state.get("recovered"), Some(&json!(true)));
    assert_eq!(report.final_state.history()[0].message, "retrying");
    assert_eq!(
        report.pipeline_status.warnings,
        vec!["Recovered from error: Timeout after 30 seconds".to_string()]
    );
}

/// Test that a non-terminal failed recovery is still fatal
#[tokio::test]
async fn test_failed_recovery_is_fatal() {
    let mut agent = ScriptedAgent::new("worker", 10)
        .then_err(AgentError::Internal("state corrupted".to_string()))
        .recovering_with(non_terminal(AgentStatus::Failed, "cannot continue"));
    let report = run_agent(&mut agent).await;

    assert_failed(&report);
    assert_iterations(&report, 0);
    assert_eq!(
        report.pipeline_status.errors,
        vec!["Internal error: state corrupted".to_string()]
    );
}

/// Test that a terminal recovery result ends the run with its status
#[tokio::test]
async fn test_terminal_recovery_keeps_its_status() {
    let mut agent = ScriptedAgent::new("worker", 10)
        .then_err(AgentError::Execution("nothing left to do".to_string()))
        .recovering_with(AgentResult::completed("treating as done"));
    let report = run_agent(&mut agent).await;

    assert_completed(&report);
    assert_iterations(&report, 0);
}

/// Test that an initialization failure yields a report without agent results
#[tokio::test]
async fn test_initialize_failure() {
    let journal = journal();
    let mut agent = ScriptedAgent::new("worker", 10)
        .failing_initialize()
        .with_journal(&journal);
    let report = run_agent(&mut agent).await;

    assert_failed(&report);
    assert!(report.agent_results.is_none());
    assert_eq!(
        report.pipeline_error.as_deref(),
        Some("Initialization failed: Initialization error: credentials missing")
    );
    assert_eq!(entries(&journal), vec!["worker:initialize"]);
    assert!(report.pipeline_status.completed_at.is_some());
}

/// Test that a finalization failure keeps the iterations already run
#[tokio::test]
async fn test_finalize_failure() {
    let mut agent = ScriptedAgent::new("worker", 2).failing_finalize();
    let report = run_agent(&mut agent).await;

    assert_failed(&report);
    assert!(report.agent_results.is_none());
    assert_eq!(report.final_state.iteration(), 2);
    assert_eq!(report.pipeline_status.total_iterations, 2);
    assert!(report
        .pipeline_error
        .as_deref()
        .is_some_and(|e| e.starts_with("Finalization failed")));
}

/// Test that the error-status condition stops on a failed iteration and marks the run failed
#[tokio::test]
async fn test_error_status_condition() {
    let mut agent = ScriptedAgent::new("tester", 10)
        .then_ok(AgentResult::running("suite 1 passed"))
        .then_ok(AgentResult {
            error: Some("3 tests failed".to_string()),
            ..non_terminal(AgentStatus::Failed, "suite 2 failed")
        })
        .then_ok(AgentResult::completed("never reached"))
        .configure(|config| config.add_terminal_condition(TerminationCondition::ErrorStatus));
    let report = run_agent(&mut agent).await;

    assert_failed(&report);
    assert_iterations(&report, 2);
    assert_eq!(report.pipeline_status.errors, vec!["3 tests failed".to_string()]);
}

/// Test that a failed but non-terminal iteration does not stop a run without an error condition
#[tokio::test]
async fn test_failed_iteration_without_error_condition() {
    let mut agent = ScriptedAgent::new("tester", 10)
        .then_ok(non_terminal(AgentStatus::Failed, "flaky"))
        .then_ok(AgentResult::completed("green"));
    let report = run_agent(&mut agent).await;

    assert_completed(&report);
    assert_iterations(&report, 2);
}
