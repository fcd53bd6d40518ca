pub mod error;
pub mod clock;

// Script model
pub mod script;
pub mod script_file;
pub mod diagnostics;

// Consistency and access
pub mod isolation;
pub mod memo_cache;
pub mod access_cache;

// Editor runtime
pub mod scheduling;
pub mod virtualization;
pub mod complexity;
pub mod perf_monitor;
pub mod config;
pub mod session;

pub mod cli;

pub use error::{Result, ScriptError};
pub use script::{Action, ActionId, ActionPool, Script, ScriptMetadata, Step, StepId, Variables};
pub use session::{ActionEdit, EditOutcome, EditorSession};
