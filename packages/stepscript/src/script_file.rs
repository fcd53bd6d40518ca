//! JSON persistence helpers for scripts.
//!
//! The in-memory model is the source of truth; this module only moves it to
//! and from the JSON shape the persistence layer stores. JSON cannot carry
//! NaN or infinities, so non-finite floats are written as `null` and read
//! back as NaN. That is the only lossy edge of a load/save cycle.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Result, ScriptError};
use crate::script::Script;

/// Parse a script from a JSON string.
pub fn from_json_str(json: &str) -> Result<Script> {
    serde_json::from_str(json).map_err(|source| ScriptError::Parse {
        what: "script JSON".to_string(),
        source,
    })
}

/// Serialize a script to pretty-printed JSON.
pub fn to_json_string(script: &Script) -> Result<String> {
    serde_json::to_string_pretty(script).map_err(|source| ScriptError::Parse {
        what: "script".to_string(),
        source,
    })
}

/// Load a script from a JSON file.
pub fn load_script(path: &Path) -> Result<Script> {
    let content = fs::read_to_string(path).map_err(|source| ScriptError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ScriptError::Parse {
        what: format!("script file {:?}", path),
        source,
    })
}

/// Write a script to a JSON file, creating parent directories as needed.
pub fn save_script(path: &Path, script: &Script) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ScriptError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let json = to_json_string(script)?;
    fs::write(path, json).map_err(|source| ScriptError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// SHA-256 hex digest of the script's canonical JSON.
///
/// Pool and variables are ordered maps, so equal scripts always produce the
/// same digest.
pub fn content_digest(script: &Script) -> Result<String> {
    let bytes = serde_json::to_vec(script).map_err(|source| ScriptError::Parse {
        what: "script".to_string(),
        source,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Serde adapter writing non-finite floats as `null` and reading `null` as NaN.
pub(crate) mod non_finite {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}
