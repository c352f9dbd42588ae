//! Backend process supervision through the public API

use crate::common::*;
use forest_store::{
    BackoffPolicy, HealthProbe, HttpProbe, KnowledgeStore, LifecycleConfig, LifecycleEvent,
    LifecycleManager, LifecycleState, ShutdownOutcome, StartOutcome,
};
use std::process::Command;
use std::time::Duration;

fn lifecycle_config(dir: &tempfile::TempDir, port: u16, command: &str, args: &[&str]) -> LifecycleConfig {
    LifecycleConfig {
        enabled: true,
        host: "127.0.0.1".to_string(),
        port,
        data_dir: Some(dir.path().join("chroma")),
        command: command.to_string(),
        args: args.iter().map(|s| s.to_string()).collect(),
        startup_timeout_ms: 2_000,
        startup_poll_ms: 20,
        health_check_interval_ms: 60_000,
        shutdown_grace_ms: 500,
        probe_timeout_ms: 200,
        auto_restart: false,
        restart_delay_ms: 20,
        start_retry: BackoffPolicy::new()
            .with_max_attempts(1)
            .with_base_delay_ms(10)
            .with_max_delay_ms(20),
        ..Default::default()
    }
}

fn process_alive(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

async fn start(manager: &LifecycleManager) -> u32 {
    match manager.start_parallel().wait().await {
        StartOutcome::Started { pid } => pid,
        other => panic!("backend did not start: {:?}", other),
    }
}

#[tokio::test]
async fn stop_terminates_the_process() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = lifecycle_config(&dir, free_port(), "sleep", &["30"]);
    let manager = LifecycleManager::with_probe(config, SwitchProbe::new(true));
    let mut events = manager.subscribe();

    let pid = start(&manager).await;
    assert!(process_alive(pid));
    assert!(dir.path().join("chroma").is_dir());

    assert_eq!(manager.stop().await.unwrap(), ShutdownOutcome::Graceful);
    assert!(!process_alive(pid));
    assert_eq!(manager.state(), LifecycleState::Stopped);
    assert_eq!(manager.stop().await.unwrap(), ShutdownOutcome::NotRunning);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(LifecycleEvent::Starting { attempt: 1 })));
    assert!(seen
        .iter()
        .any(|e| matches!(e, LifecycleEvent::Started { pid: p } if *p == pid)));
    assert!(matches!(
        seen.last(),
        Some(LifecycleEvent::Stopped {
            outcome: ShutdownOutcome::Graceful
        })
    ));
}

#[tokio::test]
async fn stop_kills_a_process_ignoring_sigterm() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = lifecycle_config(
        &dir,
        free_port(),
        "sh",
        &["-c", "trap '' TERM; exec sleep 30"],
    );
    let manager = LifecycleManager::with_probe(config, SwitchProbe::new(true));

    let pid = start(&manager).await;
    // Give the shell time to install its trap
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(manager.stop().await.unwrap(), ShutdownOutcome::Forced);
    assert!(!process_alive(pid));
}

#[tokio::test]
async fn watchers_observe_state_changes() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = lifecycle_config(&dir, free_port(), "sleep", &["30"]);
    let manager = LifecycleManager::with_probe(config, SwitchProbe::new(true));
    let mut state = manager.watch_state();

    let handle = manager.start_parallel();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == LifecycleState::Running),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(handle.wait().await.is_running());

    manager.stop().await.unwrap();
    assert_eq!(*state.borrow_and_update(), LifecycleState::Stopped);
}

#[tokio::test]
async fn store_open_adopts_a_running_backend() {
    init_tracing();
    let mock = MockChroma::start().await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = chroma_config(&mock.url());
    // Spawning would fail; the port is already served
    config.lifecycle = lifecycle_config(&dir, mock.port(), "/nonexistent/chroma", &[]);

    let store = KnowledgeStore::open(config).await.unwrap();
    assert!(store.is_connected());

    let status = store.get_status().lifecycle.unwrap();
    assert!(status.adopted);
    assert_eq!(status.state, LifecycleState::Running);
    assert_eq!(status.pid, None);

    let health = store.get_health_status().await;
    assert!(health.healthy);
    assert_eq!(health.lifecycle_state, Some(LifecycleState::Running));

    store.close().await.unwrap();
    assert_eq!(
        store.lifecycle().map(LifecycleManager::state),
        Some(LifecycleState::Stopped)
    );
    // The adopted server is left running
    let probe = HttpProbe::new(
        format!("{}/api/v1/heartbeat", mock.url()),
        Duration::from_millis(500),
    )
    .unwrap();
    assert!(probe.check().await.is_ok());
    assert_eq!(mock.collection_names(), vec!["forest_vectors".to_string()]);
}
