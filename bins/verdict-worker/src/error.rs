use thiserror::Error;

/// Why a submission ended in an `ERROR` result. `Display` is the message
/// handed back to the caller.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("Test cases not found for {0}")]
    CacheMiss(String),

    #[error("Sandbox provisioning failed for slot {slot}: {reason}")]
    SandboxProvision { slot: u32, reason: String },

    #[error("Compilation error:\n{0}")]
    Compilation(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Execution failed: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl JudgeError {
    /// Short tag for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            JudgeError::CacheMiss(_) => "cache_miss",
            JudgeError::SandboxProvision { .. } => "sandbox_provision",
            JudgeError::Compilation(_) => "compilation",
            JudgeError::UnsupportedLanguage(_) => "unsupported_language",
            JudgeError::Unexpected(_) => "unexpected",
        }
    }
}
