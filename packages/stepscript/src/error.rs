use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by malformed input.
///
/// Consistency problems are not errors: validators report them as `false`
/// or as diagnostics and leave the decision to the caller.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("invalid action id {0:?}: expected a non-empty string")]
    InvalidActionId(String),

    #[error("step index {index} out of range (script has {len} steps)")]
    StepOutOfRange { index: usize, len: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to access {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {what}")]
    Parse {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T, E = ScriptError> = std::result::Result<T, E>;
