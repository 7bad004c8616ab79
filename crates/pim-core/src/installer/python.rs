//! Interpreter package installation for plugins that bundle a
//! `requirements.txt`. Every failure here is a warning; a plugin with
//! missing interpreter packages still installs.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::host::HostBridge;
use crate::progress::ProgressSink;
use crate::resolver::archive;

/// Run `<interpreter> -m pip install -r <requirements>` for the archive's
/// bundled requirements file, if it has one
pub async fn install_requirements(
    host: &Arc<dyn HostBridge>,
    sink: &dyn ProgressSink,
    archive_path: &Path,
    prefix: &str,
) {
    let requirements = match archive::read_requirements(archive_path).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return,
        Err(e) => {
            sink.emit(&format!("⚠ {prefix}Could not read requirements from the archive: {e}"));
            return;
        }
    };

    sink.emit(&format!("{prefix}Found requirements.txt, installing interpreter packages..."));

    let temp = tempfile::Builder::new().suffix("-requirements.txt").tempfile();
    let mut temp = match temp {
        Ok(t) => t,
        Err(e) => {
            sink.emit(&format!("⚠ {prefix}Could not stage the requirements file: {e}"));
            return;
        }
    };
    if let Err(e) = temp.write_all(&requirements) {
        sink.emit(&format!("⚠ {prefix}Could not stage the requirements file: {e}"));
        return;
    }

    let output = tokio::process::Command::new(host.interpreter_command())
        .args(["-m", "pip", "install", "-r"])
        .arg(temp.path())
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => {
            sink.emit(&format!("{prefix}Interpreter packages installed"));
        }
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            sink.emit(&format!(
                "⚠ {prefix}Interpreter package installation reported problems: {}",
                truncated(&stderr, 200)
            ));
        }
        Err(e) => {
            sink.emit(&format!("⚠ {prefix}Could not run the interpreter package installer: {e}"));
        }
    }
}

fn truncated(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.trim_end().to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut.trim_end())
    }
}
