mod cli;
mod config;
mod host;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use pim_core::engine::{EngineConfig, PluginEngine};
use pim_core::task::TaskStatus;

use crate::cli::{Cli, Command};
use crate::config::PimConfig;
use crate::host::StandaloneHost;

#[tokio::main]
async fn main() {
    env_logger::init();
    log::info!(
        "{} v{}",
        pim_core::constants::ENGINE_NAME,
        pim_core::constants::ENGINE_VERSION
    );
    let cli = Cli::parse();

    let config = match PimConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let plugin_dir = cli
        .plugin_dir
        .clone()
        .or(config.plugin_dir.clone())
        .unwrap_or_else(|| PathBuf::from("plugins"));
    let cache_dir = cli
        .cache_dir
        .clone()
        .or(config.cache_dir.clone())
        .unwrap_or_else(|| PathBuf::from("cache"));

    let host = match StandaloneHost::new(
        plugin_dir,
        cache_dir,
        config.runtime_version.clone().unwrap_or_else(|| "2.14.7".to_string()),
        config.interpreter_version.clone().unwrap_or_else(|| "3.11.0".to_string()),
        config.interpreter_command.clone().unwrap_or_else(|| "python3".to_string()),
    ) {
        Ok(host) => Arc::new(host),
        Err(e) => {
            eprintln!("Failed to prepare directories: {e}");
            std::process::exit(2);
        }
    };

    let mut engine_config = EngineConfig::default();
    if let Some(url) = config.catalogue_url.clone() {
        engine_config.catalogue_url = url;
    }
    let engine = match PluginEngine::new(host, engine_config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Failed to initialize the engine: {e}");
            std::process::exit(2);
        }
    };

    let repo_url = cli.repo_url.clone();
    let exit_code = match cli.command {
        Command::List { keyword } => list_plugins(&engine, keyword.as_deref(), repo_url.as_deref()).await,
        Command::Versions { plugin_id } => show_versions(&engine, &plugin_id, repo_url.as_deref()).await,
        Command::Install { plugin_id, version } | Command::Update { plugin_id, version } => {
            run_task(&engine, engine.install(&plugin_id, version, repo_url)).await
        }
        Command::Uninstall { plugin_id } => run_task(&engine, engine.uninstall(&plugin_id)).await,
    };

    engine.shutdown().await;
    std::process::exit(exit_code);
}

async fn list_plugins(engine: &PluginEngine, keyword: Option<&str>, repo_url: Option<&str>) -> i32 {
    let plugins = engine.list_plugins(keyword, repo_url).await;
    if plugins.is_empty() {
        match keyword {
            Some(keyword) => println!("No plugins match '{keyword}'"),
            None => println!("The catalogue is empty or unreachable"),
        }
        return 1;
    }
    println!("Found {} plugins:", plugins.len());
    for plugin in plugins {
        println!(
            "{} | {} | {} | {}",
            plugin.id,
            plugin.name,
            plugin.latest_version(),
            plugin.description_text()
        );
    }
    0
}

async fn show_versions(engine: &PluginEngine, plugin_id: &str, repo_url: Option<&str>) -> i32 {
    let releases = engine.plugin_versions(plugin_id, repo_url).await;
    if releases.is_empty() {
        println!("No releases known for '{plugin_id}'");
        return 1;
    }
    for release in releases {
        println!(
            "{} | {} | {} downloads | {} bytes",
            release.version(),
            release.created_at,
            release.download_count,
            release.size
        );
    }
    0
}

/// Follow a started task, echoing each new progress message until it
/// reaches a terminal state
async fn run_task(engine: &PluginEngine, started: pim_core::error::Result<String>) -> i32 {
    let task_id = match started {
        Ok(task_id) => task_id,
        Err(e) => {
            eprintln!("{e}");
            return 2;
        }
    };
    println!("Started task {task_id}");

    let mut printed = 0;
    loop {
        let Some(task) = engine.task(&task_id) else {
            eprintln!("Task {task_id} disappeared");
            return 2;
        };
        for message in task.all_messages.iter().skip(printed) {
            println!("[{task_id}] {message}");
        }
        printed = task.all_messages.len();

        match task.status {
            TaskStatus::Running => tokio::time::sleep(Duration::from_millis(300)).await,
            TaskStatus::Completed => return 0,
            TaskStatus::Failed => return 1,
        }
    }
}
