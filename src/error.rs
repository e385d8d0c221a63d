use std::path::PathBuf;

use thiserror::Error;

/// Hard errors surfaced to the caller before or instead of a batch run.
///
/// Per-item failures (a file that cannot be opened, a rename that is refused
/// by the filesystem) are never represented here; they are recorded against
/// the individual plan item and folded into the run summary.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("root '{0}' does not exist or is not a directory")]
    InvalidRoot(PathBuf),

    #[error("plan does not match the action that is being committed: {0}")]
    InvariantViolation(&'static str),
}

impl EngineError {
    pub fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}
