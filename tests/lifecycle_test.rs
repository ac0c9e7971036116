//! Service lifecycle integration tests
//!
//! Runs the lifecycle manager against the in-memory runtime and scripted API
//! from `support` to check reuse, health waits, timeouts and cleanup.

mod support;

use image_inspector::config::{InspectorConfig, ServiceMode};
use image_inspector::inspector::{
    ContainerHandle, InspectorImages, InspectorOs, LifecycleState, ServiceLifecycle,
};
use image_inspector::InspectorError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use support::{test_config, Health, MockRuntime, ScriptedApi};
use tempfile::TempDir;

fn lifecycle(
    config: InspectorConfig,
    runtime: Arc<MockRuntime>,
    api: Arc<ScriptedApi>,
) -> Arc<ServiceLifecycle> {
    Arc::new(ServiceLifecycle::new(
        Arc::new(config),
        Arc::new(InspectorImages::default()),
        runtime,
        api,
    ))
}

#[tokio::test]
async fn test_acquire_twice_creates_one_container() {
    let dir = TempDir::new().unwrap();
    let runtime = MockRuntime::new();
    let api = ScriptedApi::new(runtime.clone(), Health::UpOnceCreated);
    let lifecycle = lifecycle(test_config(dir.path()), runtime.clone(), api);

    let first = lifecycle.acquire(InspectorOs::Alpine).await.unwrap();
    let second = lifecycle.acquire(InspectorOs::Alpine).await.unwrap();

    assert_eq!(runtime.created(), 1);
    assert!(first.started_by_us);
    assert_eq!(first.base_url, second.base_url);
    assert_eq!(first.container, second.container);
}

#[tokio::test]
async fn test_concurrent_acquire_creates_one_container() {
    let dir = TempDir::new().unwrap();
    let runtime = MockRuntime::new();
    *runtime.create_delay.lock().unwrap() = Some(Duration::from_millis(50));
    let api = ScriptedApi::new(runtime.clone(), Health::UpOnceCreated);
    let lifecycle = lifecycle(test_config(dir.path()), runtime.clone(), api);

    let (a, b) = tokio::join!(
        lifecycle.acquire(InspectorOs::Centos),
        lifecycle.acquire(InspectorOs::Centos)
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(runtime.created(), 1);
}

#[tokio::test]
async fn test_families_get_separate_containers() {
    let dir = TempDir::new().unwrap();
    let runtime = MockRuntime::new();
    let api = ScriptedApi::new(runtime.clone(), Health::UpOnceCreated);
    let lifecycle = lifecycle(test_config(dir.path()), runtime.clone(), api);

    let alpine = lifecycle.acquire(InspectorOs::Alpine).await.unwrap();
    let ubuntu = lifecycle.acquire(InspectorOs::Ubuntu).await.unwrap();

    assert_eq!(runtime.created(), 2);
    assert_eq!(alpine.port, 9000);
    assert_eq!(ubuntu.port, 9002);

    let specs = runtime.specs.lock().unwrap().clone();
    assert!(specs[1].image.ends_with("blackduck-imageinspector-ubuntu:4.4.1"));
    assert_eq!(specs[1].labels.get("app").map(String::as_str), Some("blackduck-imageinspector"));
}

#[tokio::test]
async fn test_health_timeout_reports_elapsed_and_removes_container() {
    let dir = TempDir::new().unwrap();
    let runtime = MockRuntime::new();
    let api = ScriptedApi::new(runtime.clone(), Health::Down);
    let config = test_config(dir.path());
    let deadline = config.command_timeout;
    let lifecycle = lifecycle(config, runtime.clone(), api);

    let err = lifecycle.acquire(InspectorOs::Alpine).await.unwrap_err();
    match &err {
        InspectorError::ServiceTimeout {
            address,
            elapsed,
            deadline: reported,
        } => {
            assert_eq!(address, "http://127.0.0.1:9000");
            assert!(*elapsed >= deadline);
            assert_eq!(*reported, deadline);
        }
        other => panic!("Expected ServiceTimeout, got {:?}", other),
    }

    assert_eq!(runtime.removed().len(), 1);
    assert_eq!(lifecycle.state(InspectorOs::Alpine).await, LifecycleState::Failed);

    // The failure is terminal for the run
    let again = lifecycle.acquire(InspectorOs::Alpine).await.unwrap_err();
    assert_eq!(again.kind(), "ServiceTimeout");
    assert_eq!(runtime.created(), 1);
}

#[tokio::test]
async fn test_create_failure_is_start_failure() {
    let dir = TempDir::new().unwrap();
    let runtime = MockRuntime::new();
    runtime.fail_create.store(true, Ordering::SeqCst);
    let api = ScriptedApi::new(runtime.clone(), Health::Down);
    let lifecycle = lifecycle(test_config(dir.path()), runtime.clone(), api);

    let err = lifecycle.acquire(InspectorOs::Ubuntu).await.unwrap_err();
    match err {
        InspectorError::ServiceStartFailure { os, message, .. } => {
            assert_eq!(os, InspectorOs::Ubuntu);
            assert!(message.contains("not found"));
        }
        other => panic!("Expected ServiceStartFailure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_service_already_listening_is_reused_not_owned() {
    let dir = TempDir::new().unwrap();
    let runtime = MockRuntime::new();
    let api = ScriptedApi::new(runtime.clone(), Health::Up);
    let lifecycle = lifecycle(test_config(dir.path()), runtime.clone(), api);

    let instance = lifecycle.acquire(InspectorOs::Alpine).await.unwrap();
    assert!(!instance.started_by_us);
    assert!(instance.container.is_none());

    lifecycle.release(&instance).await;
    assert_eq!(runtime.created(), 0);
    assert!(runtime.removed().is_empty());
}

#[tokio::test]
async fn test_running_labelled_container_is_reused() {
    let dir = TempDir::new().unwrap();
    let runtime = MockRuntime::new();
    *runtime.running.lock().unwrap() = Some(ContainerHandle {
        id: "existing".to_string(),
        name: "blackduck-imageinspector-centos-1".to_string(),
        host_port: Some(9101),
    });
    // Down for the direct port check, up once the container's port is checked
    let api = ScriptedApi::new(runtime.clone(), Health::UpAfterCalls(1));
    let lifecycle = lifecycle(test_config(dir.path()), runtime.clone(), api);

    let instance = lifecycle.acquire(InspectorOs::Centos).await.unwrap();
    assert!(!instance.started_by_us);
    assert_eq!(instance.port, 9101);
    assert_eq!(runtime.created(), 0);

    lifecycle.release_all().await;
    assert!(runtime.removed().is_empty());
}

#[tokio::test]
async fn test_external_service() {
    let dir = TempDir::new().unwrap();
    let runtime = MockRuntime::new();
    let api = ScriptedApi::new(runtime.clone(), Health::Up);
    let mut config = test_config(dir.path());
    config.service_mode = ServiceMode::External {
        url: "http://inspector.internal:8080".to_string(),
    };
    let lifecycle = lifecycle(config, runtime.clone(), api.clone());

    let instance = lifecycle.acquire(InspectorOs::Ubuntu).await.unwrap();
    assert_eq!(instance.host, "inspector.internal");
    assert_eq!(instance.port, 8080);
    assert!(!instance.started_by_us);
    assert_eq!(runtime.created(), 0);
}

#[tokio::test]
async fn test_external_service_down_is_unreachable() {
    let dir = TempDir::new().unwrap();
    let runtime = MockRuntime::new();
    let api = ScriptedApi::new(runtime.clone(), Health::Down);
    let mut config = test_config(dir.path());
    config.service_mode = ServiceMode::External {
        url: "http://inspector.internal:8080".to_string(),
    };
    let lifecycle = lifecycle(config, runtime.clone(), api.clone());

    let err = lifecycle.acquire(InspectorOs::Ubuntu).await.unwrap_err();
    assert!(matches!(err, InspectorError::ServiceUnreachable { .. }));
    // Checked once, never polled
    assert_eq!(api.health_calls.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.created(), 0);
}

#[tokio::test]
async fn test_release_all_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let runtime = MockRuntime::new();
    let api = ScriptedApi::new(runtime.clone(), Health::UpOnceCreated);
    let lifecycle = lifecycle(test_config(dir.path()), runtime.clone(), api);

    lifecycle.acquire(InspectorOs::Alpine).await.unwrap();
    lifecycle.acquire(InspectorOs::Centos).await.unwrap();

    lifecycle.release_all().await;
    lifecycle.release_all().await;

    let mut removed = runtime.removed();
    removed.sort();
    assert_eq!(removed, vec!["container-0", "container-1"]);
    assert_eq!(runtime.stopped.load(Ordering::SeqCst), 2);
    assert_eq!(lifecycle.state(InspectorOs::Alpine).await, LifecycleState::Stopped);
}

#[tokio::test]
async fn test_keep_containers_leaves_container() {
    let dir = TempDir::new().unwrap();
    let runtime = MockRuntime::new();
    let api = ScriptedApi::new(runtime.clone(), Health::UpOnceCreated);
    let mut config = test_config(dir.path());
    config.keep_containers = true;
    let lifecycle = lifecycle(config, runtime.clone(), api);

    let instance = lifecycle.acquire(InspectorOs::Alpine).await.unwrap();
    lifecycle.release(&instance).await;

    assert!(runtime.removed().is_empty());
    assert_eq!(lifecycle.state(InspectorOs::Alpine).await, LifecycleState::Stopped);
}

#[tokio::test]
async fn test_cleanup_flag_does_not_keep_containers() {
    let dir = TempDir::new().unwrap();
    let runtime = MockRuntime::new();
    let api = ScriptedApi::new(runtime.clone(), Health::UpOnceCreated);
    let mut config = test_config(dir.path());
    config.cleanup = false;
    let lifecycle = lifecycle(config, runtime.clone(), api);

    let instance = lifecycle.acquire(InspectorOs::Alpine).await.unwrap();
    lifecycle.release(&instance).await;

    assert_eq!(runtime.removed(), vec!["container-0"]);
}

#[tokio::test]
async fn test_interrupted_health_wait_still_removes_container() {
    let dir = TempDir::new().unwrap();
    let runtime = MockRuntime::new();
    let api = ScriptedApi::new(runtime.clone(), Health::Down);
    let mut config = test_config(dir.path());
    config.command_timeout = Duration::from_secs(30);
    let lifecycle = lifecycle(config, runtime.clone(), api);

    tokio::select! {
        _ = lifecycle.acquire(InspectorOs::Alpine) => panic!("acquire should still be waiting for health"),
        _ = tokio::time::sleep(Duration::from_millis(200)) => {}
    }
    assert_eq!(runtime.created(), 1);
    assert_eq!(lifecycle.state(InspectorOs::Alpine).await, LifecycleState::AwaitingHealth);

    lifecycle.release_all().await;
    assert_eq!(runtime.removed(), vec!["container-0"]);
    assert_eq!(lifecycle.state(InspectorOs::Alpine).await, LifecycleState::Stopped);

    lifecycle.release_all().await;
    assert_eq!(runtime.removed().len(), 1);
}

#[tokio::test]
async fn test_interrupted_create_removes_container_by_name() {
    let dir = TempDir::new().unwrap();
    let runtime = MockRuntime::new();
    *runtime.create_delay.lock().unwrap() = Some(Duration::from_millis(500));
    let api = ScriptedApi::new(runtime.clone(), Health::Down);
    let lifecycle = lifecycle(test_config(dir.path()), runtime.clone(), api);

    tokio::select! {
        _ = lifecycle.acquire(InspectorOs::Ubuntu) => panic!("acquire should still be creating"),
        _ = tokio::time::sleep(Duration::from_millis(50)) => {}
    }
    lifecycle.release_all().await;

    let removed = runtime.removed();
    assert_eq!(removed.len(), 1);
    assert!(removed[0].starts_with("blackduck-imageinspector-ubuntu-"));
}

#[tokio::test]
async fn test_create_failure_leaves_nothing_to_remove() {
    let dir = TempDir::new().unwrap();
    let runtime = MockRuntime::new();
    runtime.fail_create.store(true, Ordering::SeqCst);
    let api = ScriptedApi::new(runtime.clone(), Health::Down);
    let lifecycle = lifecycle(test_config(dir.path()), runtime.clone(), api);

    assert!(lifecycle.acquire(InspectorOs::Centos).await.is_err());
    lifecycle.release_all().await;
    assert!(runtime.removed().is_empty());
}
