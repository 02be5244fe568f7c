//! Pause, cancel and re-entry of a running pipeline

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeTool, Tools, memory_store, orchestrator, pipeline, recon_tools};
use scanflow::storage::RunStore;
use scanflow::{Error, PipelineStage, RunState, StepStatus};
use tempfile::tempdir;

use PipelineStage::*;

const RECON: [PipelineStage; 4] = [SubdomainEnum, DnsResolution, HttpProbing, WebCrawling];

fn slow_subfinder() -> FakeTool {
    FakeTool::new("subfinder")
        .output(&["a.example.com"])
        .delay(Duration::from_millis(300))
}

#[tokio::test]
async fn test_second_run_is_rejected_while_running() {
    let dir = tempdir().unwrap();
    let tools = Tools::new(recon_tools()).replace(slow_subfinder());
    let orch = Arc::new(orchestrator(pipeline(&RECON), &tools, memory_store(), dir.path()));

    let first = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.run("example.com").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(orch.is_running());
    assert!(matches!(orch.run("other.com").await, Err(Error::AlreadyRunning)));

    let state = first.await.unwrap().unwrap();
    assert_eq!(state.state(), RunState::Completed);
    assert!(!orch.is_running());

    // The orchestrator is reusable once the run is over
    let second = orch.run("other.com").await.unwrap();
    assert_eq!(second.state(), RunState::Completed);
    assert_ne!(second.run_id(), state.run_id());
}

#[tokio::test]
async fn test_cancel_lets_current_stage_finish() {
    let dir = tempdir().unwrap();
    let tools = Tools::new(recon_tools()).replace(slow_subfinder());
    let orch = Arc::new(orchestrator(pipeline(&RECON), &tools, memory_store(), dir.path()));

    let run = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.run("example.com").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    orch.cancel();

    let state = run.await.unwrap().unwrap();
    assert_eq!(state.state(), RunState::Cancelled);
    assert_eq!(state.step(SubdomainEnum).unwrap().status, StepStatus::Completed);
    assert_eq!(state.step(DnsResolution).unwrap().status, StepStatus::Pending);
    assert_eq!(tools.get("dnsx").call_count(), 0);
    assert!(state.metadata().completed_at.is_some());
}

#[tokio::test]
async fn test_cancel_while_idle_does_not_affect_next_run() {
    let dir = tempdir().unwrap();
    let tools = Tools::new(recon_tools());
    let orch = orchestrator(pipeline(&RECON), &tools, memory_store(), dir.path());

    orch.cancel();
    let state = orch.run("example.com").await.unwrap();
    assert_eq!(state.state(), RunState::Completed);
}

#[tokio::test]
async fn test_pause_holds_at_stage_boundary_until_resumed() {
    let dir = tempdir().unwrap();
    let store = memory_store();
    let tools = Tools::new(recon_tools());
    let orch = Arc::new(orchestrator(pipeline(&RECON), &tools, store.clone(), dir.path()));

    orch.pause();
    let run = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.run("example.com").await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(tools.total_calls(), 0);
    let persisted = store.list_runs(1).unwrap();
    assert_eq!(persisted[0].state, RunState::Paused);

    orch.resume();
    let state = run.await.unwrap().unwrap();
    assert_eq!(state.state(), RunState::Completed);
    assert_eq!(state.metadata().completed_steps, 4);
    assert_eq!(tools.get("subfinder").call_count(), 1);
}

#[tokio::test]
async fn test_cancel_releases_a_paused_run() {
    let dir = tempdir().unwrap();
    let tools = Tools::new(recon_tools());
    let orch = Arc::new(orchestrator(pipeline(&RECON), &tools, memory_store(), dir.path()));

    orch.pause();
    let run = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.run("example.com").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    orch.cancel();

    let state = run.await.unwrap().unwrap();
    assert_eq!(state.state(), RunState::Cancelled);
    assert_eq!(tools.total_calls(), 0);
}

#[tokio::test]
async fn test_cancelling_a_paused_run_leaves_the_next_run_unpaused() {
    let dir = tempdir().unwrap();
    let tools = Tools::new(recon_tools()).replace(slow_subfinder());
    let orch = Arc::new(orchestrator(pipeline(&RECON), &tools, memory_store(), dir.path()));

    let run = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.run("example.com").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    orch.pause();
    orch.cancel();

    let first = run.await.unwrap().unwrap();
    assert_eq!(first.state(), RunState::Cancelled);

    let second = tokio::time::timeout(Duration::from_secs(3), orch.run("other.com"))
        .await
        .expect("second run should not wait on the pause gate")
        .unwrap();
    assert_eq!(second.state(), RunState::Completed);
    assert_eq!(second.metadata().completed_steps, 4);
}

#[tokio::test]
async fn test_pause_during_last_stage_holds_completion() {
    let dir = tempdir().unwrap();
    let store = memory_store();
    let tools = Tools::new(vec![
        FakeTool::new("subfinder")
            .output(&["a.example.com"])
            .delay(Duration::from_millis(200)),
    ]);
    let config = pipeline(&[SubdomainEnum]);
    let orch = Arc::new(orchestrator(config, &tools, store.clone(), dir.path()));

    let run = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.run("example.com").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    orch.pause();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(!run.is_finished());
    assert_eq!(store.list_runs(1).unwrap()[0].state, RunState::Paused);

    orch.resume();
    let state = run.await.unwrap().unwrap();
    assert_eq!(state.state(), RunState::Completed);
}
