use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Optional `pim.toml` next to the working directory; CLI flags win over
/// file values, file values win over defaults.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct PimConfig {
    pub plugin_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub catalogue_url: Option<String>,
    /// Reported as the host runtime version for environment checks
    pub runtime_version: Option<String>,
    /// Reported as the interpreter version for environment checks
    pub interpreter_version: Option<String>,
    /// Interpreter invoked for `pip install -r requirements.txt`
    pub interpreter_command: Option<String>,
}

impl PimConfig {
    /// Load from an explicit path, or from `./pim.toml` when present.
    /// A missing default file is not an error; a broken file is.
    pub fn load(explicit: Option<&Path>) -> Result<Self, String> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from("pim.toml");
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| format!("Cannot read config '{}': {e}", path.display()))?;
        toml::from_str(&raw).map_err(|e| format!("Invalid config '{}': {e}", path.display()))
    }
}
