use std::time::Duration;

/// Engine name
pub const ENGINE_NAME: &str = "PIM";

/// Engine version
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Official plugin catalogue (LZMA-compressed JSON)
pub const OFFICIAL_CATALOGUE_URL: &str =
    "https://api.mcdreforged.com/catalogue/everything_slim.json.xz";

/// Secondary catalogue kept for explicit opt-in; never selected implicitly
pub const FALLBACK_CATALOGUE_URL: &str =
    "https://pfingan-code.github.io/PluginCatalogue/plugins.json";

/// Cache file name used for the official catalogue
pub const OFFICIAL_CACHE_FILE: &str = "everything_slim.json";

/// Plugin id of the WebUI backend itself; install/uninstall of this id is refused
pub const SELF_PLUGIN_ID: &str = "webui";

/// Dependency id addressing the host runtime rather than a plugin
pub const HOST_RUNTIME_ID: &str = "mcdreforged";

/// Dependency id addressing the interpreter rather than a plugin
pub const INTERPRETER_ID: &str = "python";

/// Manifest file names accepted inside plugin archives
pub const PLUGIN_MANIFEST_NAMES: [&str; 2] = ["mcdreforged.plugin.json", "mcdr_plugin.json"];

/// File suffixes the host recognizes as plugins
pub const PLUGIN_FILE_SUFFIXES: [&str; 2] = [".mcdr", ".py"];

/// User-Agent sent on catalogue fetches
pub const REGISTRY_USER_AGENT: &str = "MCDR-PIM-Registry/1.0";

/// User-Agent sent on release downloads
pub const DOWNLOADER_USER_AGENT: &str = "MCDR-PIM-Downloader/1.0";

/// Catalogue cache freshness window
pub const REGISTRY_CACHE_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Cooldown before a repeatedly failing catalogue URL is retried
pub const REGISTRY_FAILURE_COOLDOWN: Duration = Duration::from_secs(15 * 60);

/// Consecutive failures after which the cooldown applies
pub const REGISTRY_FAILURE_THRESHOLD: u32 = 2;

/// Catalogue fetch timeout
pub const REGISTRY_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Release download timeout
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Terminal tasks are swept once unread for this long
pub const TASK_RETENTION: Duration = Duration::from_secs(30 * 60);

/// Number of background install/uninstall workers
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Substrings that classify a task message as an error/warning entry.
/// Localized entries stay in the set because repository descriptions and
/// host-origin messages may carry them.
pub const ERROR_MESSAGE_KEYWORDS: [&str; 5] = ["error", "failed", "失败", "错误", "⚠"];
