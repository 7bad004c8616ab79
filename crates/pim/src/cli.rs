use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Standalone frontend for the plugin installation & management engine.
/// Operates on a local plugin directory; the live server integration uses
/// the same engine through its own host adapter.
#[derive(Debug, Parser)]
#[command(name = "pim", version, about)]
pub struct Cli {
    /// Plugin directory (default: ./plugins, or the value from pim.toml)
    #[arg(long, global = true)]
    pub plugin_dir: Option<PathBuf>,

    /// Cache directory (default: ./cache, or the value from pim.toml)
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Catalogue URL override
    #[arg(long, global = true)]
    pub repo_url: Option<String>,

    /// Path to a pim.toml config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List catalogue plugins, optionally filtered by a keyword
    List {
        /// Keyword matched against id, name, and description
        keyword: Option<String>,
    },
    /// Show the release history of a plugin
    Versions { plugin_id: String },
    /// Install a plugin (and its missing dependencies)
    Install {
        plugin_id: String,
        /// Version or tag to pin; latest when omitted
        version: Option<String>,
    },
    /// Install a pinned or latest version over an existing plugin
    Update {
        plugin_id: String,
        version: Option<String>,
    },
    /// Remove a plugin and every plugin depending on it
    Uninstall { plugin_id: String },
}
