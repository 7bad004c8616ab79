#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::engine::{EngineConfig, PluginEngine};
use crate::host::HostBridge;
use crate::registry::RegistryConfig;
use crate::task::{Task, TaskStatus};
use crate::tests::integration::common::{
    catalogue_doc, plugin_archive_bytes, plugin_entry, write_plugin_archive, MockHost,
};

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

async fn mount_catalogue(server: &MockServer, doc: String) {
    Mock::given(method("GET"))
        .and(path("/catalogue.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(doc, "application/json"))
        .mount(server)
        .await;
}

async fn mount_download(server: &MockServer, route: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
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
async fn test_fresh_install_without_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    let plugin_dir = dir.path().join("plugins");
    let host = Arc::new(MockHost::new(&plugin_dir, &dir.path().join("cache")));

    let server = MockServer::start().await;
    let download_url = format!("{}/d/backup_helper.mcdr", server.uri());
    mount_catalogue(
        &server,
        catalogue_doc(vec![(
            "backup_helper",
            plugin_entry("backup_helper", &[], &[("v1.0.0", &download_url, "backup_helper.mcdr")]),
        )]),
    )
    .await;
    mount_download(&server, "/d/backup_helper.mcdr", plugin_archive_bytes("backup_helper", "1.0.0", &[])).await;

    let engine = PluginEngine::new(host.clone(), engine_config(&server)).unwrap();
    let task_id = engine.install("backup_helper", None, None).unwrap();
    let task = wait_terminal(&engine, &task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 1.0);
    assert!(task.end_time.is_some());
    assert!(plugin_dir.join("backup_helper.mcdr").exists());
    assert!(host.is_loaded("backup_helper"));

    // Exactly one load call, with the downloaded path
    let loads: Vec<String> = host.calls().into_iter().filter(|c| c.starts_with("load:")).collect();
    assert_eq!(loads.len(), 1);
    assert!(loads[0].ends_with("backup_helper.mcdr"));
}

#[tokio::test]
async fn test_version_pin_not_found_fails_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let plugin_dir = dir.path().join("plugins");
    let host = Arc::new(MockHost::new(&plugin_dir, &dir.path().join("cache")));

    let server = MockServer::start().await;
    mount_catalogue(
        &server,
        catalogue_doc(vec![(
            "backup_helper",
            plugin_entry("backup_helper", &[], &[("v1.0.0", "https://example.invalid/d", "backup_helper.mcdr")]),
        )]),
    )
    .await;

    let engine = PluginEngine::new(host.clone(), engine_config(&server)).unwrap();
    let task_id = engine.install("backup_helper", Some("9.9.9".to_string()), None).unwrap();
    let task = wait_terminal(&engine, &task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.message.contains("not found"), "message: {}", task.message);
    assert!(task.message.contains("9.9.9"));
    assert_eq!(std::fs::read_dir(&plugin_dir).unwrap().count(), 0);
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_plugin_fails() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(MockHost::new(&dir.path().join("plugins"), &dir.path().join("cache")));

    let server = MockServer::start().await;
    mount_catalogue(&server, catalogue_doc(vec![])).await;

    let engine = PluginEngine::new(host, engine_config(&server)).unwrap();
    let task_id = engine.install("no_such_plugin", None, None).unwrap();
    let task = wait_terminal(&engine, &task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.message.contains("no_such_plugin"));
}

#[tokio::test]
async fn test_same_version_short_circuits() {
    let dir = tempfile::tempdir().unwrap();
    let host = MockHost::new(&dir.path().join("plugins"), &dir.path().join("cache"));
    host.preload("backup_helper", "1.0.0", &[]);
    let host = Arc::new(host);

    let server = MockServer::start().await;
    // No download route mounted: reaching it would fail the task
    mount_catalogue(
        &server,
        catalogue_doc(vec![(
            "backup_helper",
            plugin_entry("backup_helper", &[], &[("v1.0.0", "https://example.invalid/d", "backup_helper.mcdr")]),
        )]),
    )
    .await;

    let engine = PluginEngine::new(host.clone(), engine_config(&server)).unwrap();
    let task_id = engine.install("backup_helper", None, None).unwrap();
    let task = wait_terminal(&engine, &task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.all_messages.iter().any(|m| m.contains("already at version")));
    // The host was never asked to unload or reload anything
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_upgrade_stops_and_restores_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let plugin_dir = dir.path().join("plugins");
    let host = MockHost::new(&plugin_dir, &dir.path().join("cache"));

    // Old backup_helper on disk and loaded; chat_bridge depends on it
    let old_file = plugin_dir.join("backup_helper.mcdr");
    write_plugin_archive(&old_file, "backup_helper", "1.0.0", &[], &[], None);
    host.preload_with_file("backup_helper", "1.0.0", &[], Some(old_file.clone()));
    host.preload("chat_bridge", "1.0.0", &[("backup_helper", "*")]);
    let host = Arc::new(host);

    let server = MockServer::start().await;
    let download_url = format!("{}/d/backup_helper-1.1.0.mcdr", server.uri());
    mount_catalogue(
        &server,
        catalogue_doc(vec![(
            "backup_helper",
            plugin_entry("backup_helper", &[], &[("v1.1.0", &download_url, "backup_helper-1.1.0.mcdr")]),
        )]),
    )
    .await;
    mount_download(
        &server,
        "/d/backup_helper-1.1.0.mcdr",
        plugin_archive_bytes("backup_helper", "1.1.0", &[]),
    )
    .await;

    let engine = PluginEngine::new(host.clone(), engine_config(&server)).unwrap();
    let task_id = engine.install("backup_helper", Some("1.1.0".to_string()), None).unwrap();
    let task = wait_terminal(&engine, &task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.all_messages.iter().any(|m| m.contains("Affected dependent plugins")));

    // Order: stop the dependent, unload the target, load the new file,
    // restore the dependent
    let calls = host.calls();
    let expected = [
        "unload:chat_bridge".to_string(),
        "unload:backup_helper".to_string(),
    ];
    assert_eq!(&calls[..2], &expected);
    assert!(calls[2].starts_with("load:") && calls[2].ends_with("backup_helper-1.1.0.mcdr"));
    assert_eq!(calls[3], "load:chat_bridge");

    // New file in place, old file cleaned up, new version live
    assert!(plugin_dir.join("backup_helper-1.1.0.mcdr").exists());
    assert!(!old_file.exists());
    let meta = host.plugin_metadata("backup_helper").await.unwrap();
    assert_eq!(meta.version, "1.1.0");
    assert!(host.is_loaded("chat_bridge"));
}

#[tokio::test]
async fn test_transitive_dependency_install() {
    let dir = tempfile::tempdir().unwrap();
    let plugin_dir = dir.path().join("plugins");
    let host = Arc::new(MockHost::new(&plugin_dir, &dir.path().join("cache")));

    let server = MockServer::start().await;
    let main_url = format!("{}/d/main_plugin.mcdr", server.uri());
    let dep_url = format!("{}/d/dep_plugin.mcdr", server.uri());
    mount_catalogue(
        &server,
        catalogue_doc(vec![
            (
                "main_plugin",
                plugin_entry("main_plugin", &[("dep_plugin", "*")], &[("v1.0.0", &main_url, "main_plugin.mcdr")]),
            ),
            (
                "dep_plugin",
                plugin_entry("dep_plugin", &[], &[("v1.0.0", &dep_url, "dep_plugin.mcdr")]),
            ),
        ]),
    )
    .await;
    mount_download(
        &server,
        "/d/main_plugin.mcdr",
        plugin_archive_bytes("main_plugin", "1.0.0", &[("dep_plugin", "*")]),
    )
    .await;
    mount_download(&server, "/d/dep_plugin.mcdr", plugin_archive_bytes("dep_plugin", "1.0.0", &[])).await;

    let engine = PluginEngine::new(host.clone(), engine_config(&server)).unwrap();
    let task_id = engine.install("main_plugin", None, None).unwrap();
    let task = wait_terminal(&engine, &task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.all_messages.iter().any(|m| m.contains("Missing required plugins")));
    assert!(task.all_messages.iter().any(|m| m.contains("[dependency]")));

    assert!(plugin_dir.join("main_plugin.mcdr").exists());
    assert!(plugin_dir.join("dep_plugin.mcdr").exists());
    assert!(host.is_loaded("main_plugin"));
    assert!(host.is_loaded("dep_plugin"));
}

#[tokio::test]
async fn test_top_level_load_refusal_fails_the_task() {
    let dir = tempfile::tempdir().unwrap();
    let mut host = MockHost::new(&dir.path().join("plugins"), &dir.path().join("cache"));
    host.load_failures.push("backup_helper".to_string());
    let host = Arc::new(host);

    let server = MockServer::start().await;
    let download_url = format!("{}/d/backup_helper.mcdr", server.uri());
    mount_catalogue(
        &server,
        catalogue_doc(vec![(
            "backup_helper",
            plugin_entry("backup_helper", &[], &[("v1.0.0", &download_url, "backup_helper.mcdr")]),
        )]),
    )
    .await;
    mount_download(&server, "/d/backup_helper.mcdr", plugin_archive_bytes("backup_helper", "1.0.0", &[])).await;

    let engine = PluginEngine::new(host, engine_config(&server)).unwrap();
    let task_id = engine.install("backup_helper", None, None).unwrap();
    let task = wait_terminal(&engine, &task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.message.contains("refused to load"));
}

#[tokio::test]
async fn test_dependency_load_refusal_is_only_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let mut host = MockHost::new(&dir.path().join("plugins"), &dir.path().join("cache"));
    host.load_failures.push("dep_plugin".to_string());
    let host = Arc::new(host);

    let server = MockServer::start().await;
    let main_url = format!("{}/d/main_plugin.mcdr", server.uri());
    let dep_url = format!("{}/d/dep_plugin.mcdr", server.uri());
    mount_catalogue(
        &server,
        catalogue_doc(vec![
            (
                "main_plugin",
                plugin_entry("main_plugin", &[("dep_plugin", "*")], &[("v1.0.0", &main_url, "main_plugin.mcdr")]),
            ),
            (
                "dep_plugin",
                plugin_entry("dep_plugin", &[], &[("v1.0.0", &dep_url, "dep_plugin.mcdr")]),
            ),
        ]),
    )
    .await;
    mount_download(
        &server,
        "/d/main_plugin.mcdr",
        plugin_archive_bytes("main_plugin", "1.0.0", &[("dep_plugin", "*")]),
    )
    .await;
    mount_download(&server, "/d/dep_plugin.mcdr", plugin_archive_bytes("dep_plugin", "1.0.0", &[])).await;

    let engine = PluginEngine::new(host.clone(), engine_config(&server)).unwrap();
    let task_id = engine.install("main_plugin", None, None).unwrap();
    let task = wait_terminal(&engine, &task_id).await;

    // The dependency failure surfaces as a warning, the main install succeeds
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.error_messages.iter().any(|m| m.contains("dep_plugin") && m.contains("⚠")));
    assert!(host.is_loaded("main_plugin"));
    assert!(!host.is_loaded("dep_plugin"));
}

#[tokio::test]
async fn test_environment_mismatch_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(MockHost::new(&dir.path().join("plugins"), &dir.path().join("cache")));

    let server = MockServer::start().await;
    let download_url = format!("{}/d/backup_helper.mcdr", server.uri());
    mount_catalogue(
        &server,
        catalogue_doc(vec![(
            "backup_helper",
            plugin_entry(
                "backup_helper",
                &[("mcdreforged", ">=99.0.0")],
                &[("v1.0.0", &download_url, "backup_helper.mcdr")],
            ),
        )]),
    )
    .await;
    mount_download(&server, "/d/backup_helper.mcdr", plugin_archive_bytes("backup_helper", "1.0.0", &[])).await;

    let engine = PluginEngine::new(host.clone(), engine_config(&server)).unwrap();
    let task_id = engine.install("backup_helper", None, None).unwrap();
    let task = wait_terminal(&engine, &task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.error_messages.iter().any(|m| m.contains("Environment warning")));
    assert!(host.is_loaded("backup_helper"));
}

#[tokio::test]
async fn test_failed_interpreter_packages_are_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let mut host = MockHost::new(&dir.path().join("plugins"), &dir.path().join("cache"));
    // An installer command that exits non-zero for any invocation
    host.interpreter_command = "false".to_string();
    let host = Arc::new(host);

    let server = MockServer::start().await;
    let download_url = format!("{}/d/backup_helper.mcdr", server.uri());
    mount_catalogue(
        &server,
        catalogue_doc(vec![(
            "backup_helper",
            plugin_entry("backup_helper", &[], &[("v1.0.0", &download_url, "backup_helper.mcdr")]),
        )]),
    )
    .await;

    // Archive bundling a requirements.txt
    let archive_dir = tempfile::tempdir().unwrap();
    let archive_path = archive_dir.path().join("backup_helper.mcdr");
    write_plugin_archive(&archive_path, "backup_helper", "1.0.0", &[], &[], Some("requests==2.31.0\n"));
    mount_download(&server, "/d/backup_helper.mcdr", std::fs::read(&archive_path).unwrap()).await;

    let engine = PluginEngine::new(host.clone(), engine_config(&server)).unwrap();
    let task_id = engine.install("backup_helper", None, None).unwrap();
    let task = wait_terminal(&engine, &task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.all_messages.iter().any(|m| m.contains("requirements.txt")));
    assert!(task.error_messages.iter().any(|m| m.contains("Interpreter package")));
    assert!(host.is_loaded("backup_helper"));
}

#[tokio::test]
async fn test_self_plugin_is_guarded() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(MockHost::new(&dir.path().join("plugins"), &dir.path().join("cache")));

    let server = MockServer::start().await;
    mount_catalogue(&server, catalogue_doc(vec![])).await;

    let engine = PluginEngine::new(host, engine_config(&server)).unwrap();
    assert!(engine.install("webui", None, None).is_err());
    assert!(engine.install("WebUI", None, None).is_err());
    assert!(engine.uninstall("webui").is_err());
    assert!(engine.tasks().is_empty());
}
