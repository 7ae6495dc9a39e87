// Sandbox Lifecycle Manager
//
// Owns one slot from init to cleanup and the files placed inside it.

use crate::engine::IsolateEngine;
use crate::error::JudgeError;
use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use verdict_common::types::Language;

#[derive(Clone)]
pub struct SandboxManager {
    engine: IsolateEngine,
}

impl SandboxManager {
    pub fn new(engine: IsolateEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &IsolateEngine {
        &self.engine
    }

    /// Initialize the slot and make sure its working directory exists.
    pub async fn provision(&self, slot: u32) -> Result<PathBuf, JudgeError> {
        let argv = self.engine.lifecycle_argv(slot, "init");
        let init = self
            .engine
            .run_plain(&argv)
            .await
            .map_err(|e| JudgeError::SandboxProvision {
                slot,
                reason: format!("{:#}", e),
            })?;

        if init.exit_code != 0 {
            return Err(JudgeError::SandboxProvision {
                slot,
                reason: format!("init exited with code {}: {}", init.exit_code, init.text.trim()),
            });
        }

        let box_path = self.engine.config().box_path(slot);
        tokio::fs::create_dir_all(&box_path)
            .await
            .map_err(|e| JudgeError::SandboxProvision {
                slot,
                reason: format!("cannot create {}: {}", box_path.display(), e),
            })?;

        debug!(slot, box_path = %box_path.display(), "Sandbox provisioned");
        Ok(box_path)
    }

    /// Write the submission verbatim under the toolchain's expected name.
    pub async fn write_source(
        &self,
        box_path: &Path,
        language: Language,
        code: &str,
    ) -> Result<String, JudgeError> {
        let file_name = language.source_file_name();
        let path = box_path.join(file_name);
        tokio::fs::write(&path, code)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(file_name.to_string())
    }

    /// Replace the stdin file ahead of a test-case run.
    pub async fn write_stdin(&self, box_path: &Path, input: &str) -> Result<(), JudgeError> {
        let path = box_path.join(&self.engine.config().stdin_file);
        tokio::fs::write(&path, input)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Best-effort cleanup. Failures are logged and swallowed so they never
    /// replace the submission's own result.
    pub async fn teardown(&self, slot: u32) {
        let argv = self.engine.lifecycle_argv(slot, "cleanup");
        match self.engine.run_plain(&argv).await {
            Ok(out) if out.exit_code == 0 => debug!(slot, "Sandbox cleaned up"),
            Ok(out) => warn!(slot, exit_code = out.exit_code, output = %out.text.trim(), "Sandbox cleanup failed"),
            Err(e) => warn!(slot, error = %e, "Sandbox cleanup could not run"),
        }
    }
}
