#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::engine::{EngineConfig, PluginEngine};
use crate::host::HostBridge;
use crate::registry::RegistryConfig;
use crate::task::{Task, TaskStatus};
use crate::tests::integration::common::{catalogue_doc, write_plugin_archive, MockHost};

fn engine_config(server: &MockServer) -> EngineConfig {
    EngineConfig {
        catalogue_url: format!("{}/catalogue.json", server.uri()),
        worker_count: 2,
        download_timeout: Duration::from_secs(5),
        registry: RegistryConfig {
            cache_ttl: Duration::from_secs(3600),
            failure_cooldown: Duration::from_secs(3600),
            failure_threshold: 2,
            fetch_timeout: Duration::from_secs(5),
        },
        ..EngineConfig::default()
    }
}

async fn empty_catalogue(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/catalogue.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(catalogue_doc(vec![]), "application/json"))
        .mount(server)
        .await;
}

async fn wait_terminal(engine: &PluginEngine, task_id: &str) -> Task {
    for _ in 0..200 {
        if let Some(task) = engine.task(task_id) {
            if task.status.is_terminal() {
                return task;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("task {task_id} never reached a terminal state");
}

#[tokio::test]
async fn test_uninstall_removes_files_and_unloads() {
    let dir = tempfile::tempdir().unwrap();
    let plugin_dir = dir.path().join("plugins");
    let host = MockHost::new(&plugin_dir, &dir.path().join("cache"));

    let file = plugin_dir.join("backup_helper.mcdr");
    write_plugin_archive(&file, "backup_helper", "1.0.0", &[], &[], None);
    host.preload_with_file("backup_helper", "1.0.0", &[], Some(file.clone()));
    let host = Arc::new(host);

    let server = MockServer::start().await;
    empty_catalogue(&server).await;

    let engine = PluginEngine::new(host.clone(), engine_config(&server)).unwrap();
    let task_id = engine.uninstall("backup_helper").unwrap();
    let task = wait_terminal(&engine, &task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert!(!file.exists());
    assert!(!host.is_loaded("backup_helper"));
    assert!(host.calls().contains(&"unload:backup_helper".to_string()));
}

#[tokio::test]
async fn test_uninstall_cascades_to_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let plugin_dir = dir.path().join("plugins");
    let host = MockHost::new(&plugin_dir, &dir.path().join("cache"));

    let base_file = plugin_dir.join("backup_helper.mcdr");
    let dependent_file = plugin_dir.join("chat_bridge.mcdr");
    write_plugin_archive(&base_file, "backup_helper", "1.0.0", &[], &[], None);
    write_plugin_archive(&dependent_file, "chat_bridge", "1.0.0", &[("backup_helper", "*")], &[], None);
    host.preload_with_file("backup_helper", "1.0.0", &[], Some(base_file.clone()));
    host.preload_with_file("chat_bridge", "1.0.0", &[("backup_helper", "*")], Some(dependent_file.clone()));
    let host = Arc::new(host);

    let server = MockServer::start().await;
    empty_catalogue(&server).await;

    let engine = PluginEngine::new(host.clone(), engine_config(&server)).unwrap();
    let task_id = engine.uninstall("backup_helper").unwrap();
    let task = wait_terminal(&engine, &task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.all_messages.iter().any(|m| m.contains("[cascade]")));

    // Both plugins gone: from disk and from the host
    assert!(!base_file.exists());
    assert!(!dependent_file.exists());
    assert!(host.loaded_plugin_ids().await.is_empty());

    // The dependent is unloaded before the plugin it depends on
    let calls = host.calls();
    let unload_dependent = calls.iter().position(|c| c == "unload:chat_bridge").unwrap();
    let unload_base = calls.iter().position(|c| c == "unload:backup_helper").unwrap();
    assert!(unload_dependent < unload_base);
}

#[tokio::test]
async fn test_uninstall_collects_unloaded_files_of_the_same_plugin() {
    let dir = tempfile::tempdir().unwrap();
    let plugin_dir = dir.path().join("plugins");
    let host = MockHost::new(&plugin_dir, &dir.path().join("cache"));

    // One loaded copy plus a stale unloaded copy under a different name
    let loaded_file = plugin_dir.join("backup_helper-1.1.0.mcdr");
    let stale_file = plugin_dir.join("backup_helper-1.0.0.mcdr");
    let unrelated_file = plugin_dir.join("chat_bridge.mcdr");
    write_plugin_archive(&loaded_file, "backup_helper", "1.1.0", &[], &[], None);
    write_plugin_archive(&stale_file, "backup_helper", "1.0.0", &[], &[], None);
    write_plugin_archive(&unrelated_file, "chat_bridge", "1.0.0", &[], &[], None);
    host.preload_with_file("backup_helper", "1.1.0", &[], Some(loaded_file.clone()));
    let host = Arc::new(host);

    let server = MockServer::start().await;
    empty_catalogue(&server).await;

    let engine = PluginEngine::new(host.clone(), engine_config(&server)).unwrap();
    let task_id = engine.uninstall("backup_helper").unwrap();
    let task = wait_terminal(&engine, &task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert!(!loaded_file.exists());
    assert!(!stale_file.exists());
    // Files of other plugins stay untouched
    assert!(unrelated_file.exists());
}

#[tokio::test]
async fn test_uninstall_of_absent_plugin_still_completes() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(MockHost::new(&dir.path().join("plugins"), &dir.path().join("cache")));

    let server = MockServer::start().await;
    empty_catalogue(&server).await;

    let engine = PluginEngine::new(host.clone(), engine_config(&server)).unwrap();
    let task_id = engine.uninstall("never_installed").unwrap();
    let task = wait_terminal(&engine, &task_id).await;

    // Nothing to do is not an error
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(!host.calls().iter().any(|c| c.starts_with("unload:")));
}
