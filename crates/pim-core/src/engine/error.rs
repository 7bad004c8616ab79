use thiserror::Error;

use crate::task::TaskAction;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine must not install or remove the WebUI backend itself;
    /// pulling the plugin out from under the running frontend would strand
    /// every active session
    #[error("Refusing to {action} the WebUI's own plugin '{plugin_id}'")]
    SelfManagement { action: TaskAction, plugin_id: String },
}
