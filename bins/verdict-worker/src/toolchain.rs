// Startup discovery of compiler and runtime paths.
//
// The sandbox runs commands with execve semantics and only sees the bind
// mounted directories, so every binary must be an absolute, symlink-free path.

use crate::config::Toolchain;
use crate::engine::IsolateEngine;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Resolve `java`, `javac` and `node`, keeping `defaults` for anything that
/// cannot be found.
pub async fn discover(engine: &IsolateEngine, defaults: &Toolchain) -> Toolchain {
    Toolchain {
        java: resolve(engine, "java", &defaults.java).await,
        javac: resolve(engine, "javac", &defaults.javac).await,
        node: resolve(engine, "node", &defaults.node).await,
    }
}

async fn resolve(engine: &IsolateEngine, name: &str, default: &Path) -> PathBuf {
    match locate(engine, name).await {
        Some(path) => {
            info!(executable = name, path = %path.display(), "Detected executable");
            path
        }
        None => {
            warn!(executable = name, default = %default.display(), "Could not detect executable, using default");
            default.to_path_buf()
        }
    }
}

async fn locate(engine: &IsolateEngine, name: &str) -> Option<PathBuf> {
    let which = engine
        .run_plain(&["which".to_string(), name.to_string()])
        .await
        .ok()?;
    let found = which.text.trim();
    if which.exit_code != 0 || found.is_empty() {
        return None;
    }

    let real = engine
        .run_plain(&["readlink".to_string(), "-f".to_string(), found.to_string()])
        .await
        .ok()?;
    let real = real.text.trim();
    if real.is_empty() {
        return None;
    }

    let path = PathBuf::from(real);
    path.exists().then_some(path)
}
