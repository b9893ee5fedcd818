//! Test: Hooks - lifecycle callbacks and named hooks

use crate::helpers::*;
use agentic_pipeline::agent::{AgentError, AgentResult};
use agentic_pipeline::core::RunContext;
use agentic_pipeline::execution::{HookEvent, HookLibrary, HookPoint, Pipeline, StopReason};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Test the order in which lifecycle hooks fire
#[tokio::test]
async fn test_hook_order() {
    let fired = journal();
    let mut agent = ScriptedAgent::new("worker", 2);
    let report = Pipeline::new(&mut agent)
        .with_hooks(recording_hooks(&fired))
        .run(RunContext::new())
        .await;

    assert_completed(&report);
    assert_eq!(
        entries(&fired),
        vec![
            "pre_pipeline",
            "pre_iteration",
            "post_iteration",
            "pre_iteration",
            "post_iteration",
            "on_terminal",
            "post_pipeline",
        ]
    );
}

/// Test that the agent's own iteration hooks bracket each iteration
#[tokio::test]
async fn test_agent_iteration_hooks() {
    let journal = journal();
    let mut agent = ScriptedAgent::new("worker", 2).with_journal(&journal);
    run_agent(&mut agent).await;

    assert_eq!(
        entries(&journal),
        vec![
            "worker:initialize",
            "worker:pre 1",
            "worker:execute 1",
            "worker:post 1",
            "worker:pre 2",
            "worker:execute 2",
            "worker:post 2",
            "worker:finalize",
        ]
    );
}

/// Test that failing and panicking hooks do not alter the run
#[tokio::test]
async fn test_broken_hooks_are_contained() {
    let mut agent = ScriptedAgent::new("worker", 3);
    let mut pipeline = Pipeline::new(&mut agent);
    pipeline.add_hook(HookPoint::PreIteration, |_| panic!("hook bug"));
    pipeline.add_hook(HookPoint::PostIteration, |_| anyhow::bail!("webhook unreachable"));
    let report = pipeline.run(RunContext::new()).await;

    assert_completed(&report);
    assert_iterations(&report, 3);
    assert!(report.pipeline_status.errors.is_empty());
}

/// Test that a removed hook no longer fires
#[tokio::test]
async fn test_remove_hook() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut agent = ScriptedAgent::new("worker", 2);
    let mut pipeline = Pipeline::new(&mut agent);

    let counter = calls.clone();
    let id = pipeline.add_hook(HookPoint::PostIteration, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    assert!(pipeline.remove_hook(id));
    pipeline.run(RunContext::new()).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// Test that hook names in the configuration bind to the library
#[tokio::test]
async fn test_named_hooks_from_configuration() {
    let seen = journal();
    let mut library = HookLibrary::new();
    let log = seen.clone();
    library.register("audit", move |event| {
        log.lock().unwrap().push(format!("audit@{}", event.point()));
        Ok(())
    });

    let mut agent = ScriptedAgent::new("worker", 1).configure(|config| {
        config.pre_hooks = vec!["audit".to_string(), "notify_slack".to_string()];
        config.post_hooks = vec!["audit".to_string()];
    });
    let report = Pipeline::new(&mut agent)
        .with_hook_library(library)
        .run(RunContext::new())
        .await;

    assert_completed(&report);
    assert_eq!(entries(&seen), vec!["audit@pre_pipeline", "audit@post_pipeline"]);
    assert_eq!(
        report.pipeline_status.warnings,
        vec!["Unknown hook: notify_slack".to_string()]
    );
}

/// Test that error hooks see the error and the recovery decision
#[tokio::test]
async fn test_error_hook_payload() {
    let seen: Arc<Mutex<Vec<(String, Option<String>)>>> = Arc::new(Mutex::new(Vec::new()));
    let mut agent = ScriptedAgent::new("worker", 5)
        .then_err(AgentError::Execution("rate limited".to_string()))
        .recovering_with(AgentResult::running("backing off"));
    let mut pipeline = Pipeline::new(&mut agent);

    let log = seen.clone();
    pipeline.add_hook(HookPoint::OnError, move |event| {
        if let HookEvent::OnError { error, recovery, .. } = event {
            log.lock()
                .unwrap()
                .push((error.to_string(), recovery.map(|r| r.message.clone())));
        }
        Ok(())
    });
    let report = pipeline.run(RunContext::new()).await;

    assert_completed(&report);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(
            "Execution error: rate limited".to_string(),
            Some("backing off".to_string())
        )]
    );
}

/// Test that the terminal hook explains why the run stopped
#[tokio::test]
async fn test_terminal_hook_reason() {
    let reasons = Arc::new(Mutex::new(Vec::new()));
    let mut agent = ScriptedAgent::new("worker", 10).then_ok(AgentResult::completed("done"));
    let mut pipeline = Pipeline::new(&mut agent);

    let log = reasons.clone();
    pipeline.add_hook(HookPoint::OnTerminal, move |event| {
        if let HookEvent::OnTerminal { reason, .. } = event {
            log.lock().unwrap().push((*reason).clone());
        }
        Ok(())
    });
    pipeline.run(RunContext::new()).await;

    assert_eq!(*reasons.lock().unwrap(), vec![StopReason::AgentRequested]);
}

/// Test that the pre-pipeline hook sees the caller's context
#[tokio::test]
async fn test_pre_pipeline_sees_context() {
    let seen = Arc::new(Mutex::new(None));
    let mut agent = ScriptedAgent::new("worker", 1);
    let mut pipeline = Pipeline::new(&mut agent);

    let log = seen.clone();
    pipeline.add_hook(HookPoint::PrePipeline, move |event| {
        if let HookEvent::PrePipeline { context, .. } = event {
            *log.lock().unwrap() = context.get("branch").cloned();
        }
        Ok(())
    });
    pipeline
        .run(RunContext::new().with_value("branch", "main"))
        .await;

    assert_eq!(*seen.lock().unwrap(), Some(serde_json::json!("main")));
}
