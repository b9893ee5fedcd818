//! Test: Workflow Definitions - YAML and builder workflows run end to end

use crate::helpers::*;
use agentic_pipeline::core::{AgentState, PredicateRegistry};
use agentic_pipeline::workflow::{WorkflowBuilder, WorkflowDefinition, WorkflowError};
use serde_json::{json, Value};

const RELEASE: &str = r#"
name: release
mode: conditional
global_config:
  message: packaged
steps:
  - agent_type: scripted
    name: build
    config:
      message: built
    on_success: package
    on_failure: report
  - agent_type: scripted
    name: report
    condition: build_failed
  - agent_type: scripted
    name: package
    condition: build_ok
"#;

fn release_predicates() -> PredicateRegistry {
    let mut predicates = PredicateRegistry::new();
    predicates
        .register_state("build_ok", |state: &AgentState| {
            Ok(state.get("build_result").and_then(|r| r.get("said")) == Some(&json!("built")))
        })
        .register_state("build_failed", |state: &AgentState| {
            Ok(state.get("failed_step") == Some(&json!("build")))
        });
    predicates
}

fn said<'a>(state: &'a AgentState, step: &str) -> Option<&'a Value> {
    state.get(&format!("{}_result", step)).and_then(|r| r.get("said"))
}

/// Test the happy path of a conditional YAML workflow
#[tokio::test]
async fn test_release_succeeds() {
    let definition = WorkflowDefinition::from_yaml(RELEASE).unwrap();
    let mut workflow = definition
        .build(&scripted_registry(), &release_predicates())
        .unwrap();

    let report = run_agent(&mut workflow).await;

    assert_completed(&report);
    assert_eq!(said(&report.final_state, "build"), Some(&json!("built")));
    assert_eq!(said(&report.final_state, "package"), Some(&json!("packaged")));
    assert!(!report.final_state.contains("report_result"));
}

/// Test that a failed build routes to the report step
#[tokio::test]
async fn test_release_failure_is_reported() {
    let mut definition = WorkflowDefinition::from_yaml(RELEASE).unwrap();
    definition.steps[0].config.insert("fail".to_string(), json!(true));
    let mut workflow = definition
        .build(&scripted_registry(), &release_predicates())
        .unwrap();

    let report = run_agent(&mut workflow).await;

    assert_completed(&report);
    assert!(report.final_state.contains("report_result"));
    assert!(!report.final_state.contains("package_result"));
    assert_eq!(result_field(&report, "failed_steps"), &json!(1));
}

/// Test that a workflow referencing an unregistered predicate does not build
#[test]
fn test_unbound_predicate_rejected() {
    let definition = WorkflowDefinition::from_yaml(RELEASE).unwrap();
    let result = definition.build(&scripted_registry(), &PredicateRegistry::new());

    match result {
        Err(WorkflowError::Invalid(errors)) => {
            assert_eq!(errors.len(), 2);
            assert!(errors[0].contains("build_failed"));
        }
        other => panic!("expected Invalid, got {:?}", other.map(|w| w.step_names().len())),
    }
}

/// Test a builder-made sequential workflow that fails half way
#[tokio::test]
async fn test_builder_chain() {
    let mut workflow = WorkflowBuilder::new("chain")
        .then("scripted", "greet", json!({ "message": "hi" }))
        .then("scripted", "refuse", json!({ "fail": true }))
        .then("scripted", "never", Value::Null)
        .build(&scripted_registry(), &PredicateRegistry::new())
        .unwrap();

    let report = run_agent(&mut workflow).await;

    assert_failed(&report);
    assert_eq!(said(&report.final_state, "greet"), Some(&json!("hi")));
    assert_eq!(result_field(&report, "failed_step"), &json!("refuse"));
    assert_eq!(
        report.pipeline_status.errors,
        vec!["Step refuse failed: Execution error: refuse refused".to_string()]
    );
}

/// Test that a definition survives serialization and still builds
#[tokio::test]
async fn test_definition_round_trip_builds() {
    let definition = WorkflowDefinition::from_yaml(RELEASE).unwrap();
    let restored = WorkflowDefinition::from_json(&definition.to_json().unwrap()).unwrap();

    let mut workflow = restored
        .build(&scripted_registry(), &release_predicates())
        .unwrap();
    let report = run_agent(&mut workflow).await;
    assert_completed(&report);
}
