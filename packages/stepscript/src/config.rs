//! Editor session configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config and
//! a config file only needs to name what it overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::access_cache::AccessCacheConfig;
use crate::complexity::ESTIMATED_SECONDS_PER_ACTION;
use crate::error::{Result, ScriptError};
use crate::perf_monitor::DEFAULT_SAMPLE_CAPACITY;
use crate::virtualization::{
    ListPolicy, DEFAULT_ITEM_HEIGHT, DEFAULT_OVERSCAN, LARGE_SCRIPT_ACTION_THRESHOLD,
    LARGE_SCRIPT_OVERSCAN, LARGE_SCRIPT_STEP_THRESHOLD,
};

fn default_list_cache_capacity() -> usize {
    500
}

fn default_list_cache_ttl_ms() -> u64 {
    30_000
}

fn default_count_cache_capacity() -> usize {
    1000
}

fn default_count_cache_ttl_ms() -> u64 {
    60_000
}

fn default_large_step_threshold() -> usize {
    LARGE_SCRIPT_STEP_THRESHOLD
}

fn default_large_action_threshold() -> usize {
    LARGE_SCRIPT_ACTION_THRESHOLD
}

fn default_item_height() -> f64 {
    DEFAULT_ITEM_HEIGHT
}

fn default_large_overscan() -> usize {
    LARGE_SCRIPT_OVERSCAN
}

fn default_overscan() -> usize {
    DEFAULT_OVERSCAN
}

fn default_monitor_capacity() -> usize {
    DEFAULT_SAMPLE_CAPACITY
}

fn default_seconds_per_action() -> f64 {
    ESTIMATED_SECONDS_PER_ACTION
}

/// Delay before a burst of keystrokes in an action editor is applied.
fn default_edit_debounce_ms() -> u64 {
    300
}

fn default_batch_size() -> usize {
    10
}

/// One frame at 60fps.
fn default_batch_flush_delay_ms() -> u64 {
    16
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default = "default_list_cache_capacity")]
    pub list_cache_capacity: usize,
    #[serde(default = "default_list_cache_ttl_ms")]
    pub list_cache_ttl_ms: u64,
    #[serde(default = "default_count_cache_capacity")]
    pub count_cache_capacity: usize,
    #[serde(default = "default_count_cache_ttl_ms")]
    pub count_cache_ttl_ms: u64,

    #[serde(default = "default_large_step_threshold")]
    pub large_step_threshold: usize,
    #[serde(default = "default_large_action_threshold")]
    pub large_action_threshold: usize,
    #[serde(default = "default_item_height")]
    pub item_height: f64,
    #[serde(default = "default_large_overscan")]
    pub large_overscan: usize,
    #[serde(default = "default_overscan")]
    pub overscan: usize,

    #[serde(default = "default_monitor_capacity")]
    pub monitor_capacity: usize,
    /// Log every measured operation at info level.
    #[serde(default)]
    pub log_performance: bool,
    #[serde(default = "default_seconds_per_action")]
    pub seconds_per_action: f64,

    #[serde(default = "default_edit_debounce_ms")]
    pub edit_debounce_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_flush_delay_ms")]
    pub batch_flush_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            list_cache_capacity: default_list_cache_capacity(),
            list_cache_ttl_ms: default_list_cache_ttl_ms(),
            count_cache_capacity: default_count_cache_capacity(),
            count_cache_ttl_ms: default_count_cache_ttl_ms(),
            large_step_threshold: default_large_step_threshold(),
            large_action_threshold: default_large_action_threshold(),
            item_height: default_item_height(),
            large_overscan: default_large_overscan(),
            overscan: default_overscan(),
            monitor_capacity: default_monitor_capacity(),
            log_performance: false,
            seconds_per_action: default_seconds_per_action(),
            edit_debounce_ms: default_edit_debounce_ms(),
            batch_size: default_batch_size(),
            batch_flush_delay_ms: default_batch_flush_delay_ms(),
        }
    }
}

impl SessionConfig {
    /// Load a config from a JSON file and validate it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ScriptError::Parse {
            what: format!("config file {:?}", path),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.list_cache_capacity == 0 || self.count_cache_capacity == 0 {
            return Err(ScriptError::InvalidConfig(
                "cache capacities must be positive".to_string(),
            ));
        }
        if self.list_cache_ttl_ms == 0 || self.count_cache_ttl_ms == 0 {
            return Err(ScriptError::InvalidConfig(
                "cache TTLs must be positive".to_string(),
            ));
        }
        if !(self.item_height.is_finite() && self.item_height > 0.0) {
            return Err(ScriptError::InvalidConfig(
                "item height must be a positive number".to_string(),
            ));
        }
        if !(self.seconds_per_action.is_finite() && self.seconds_per_action >= 0.0) {
            return Err(ScriptError::InvalidConfig(
                "seconds per action must be non-negative".to_string(),
            ));
        }
        if self.monitor_capacity == 0 {
            return Err(ScriptError::InvalidConfig(
                "monitor capacity must be positive".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ScriptError::InvalidConfig(
                "batch size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn access_cache(&self) -> AccessCacheConfig {
        AccessCacheConfig {
            list_capacity: self.list_cache_capacity,
            list_ttl: Duration::from_millis(self.list_cache_ttl_ms),
            count_capacity: self.count_cache_capacity,
            count_ttl: Duration::from_millis(self.count_cache_ttl_ms),
        }
    }

    pub fn list_policy(&self) -> ListPolicy {
        ListPolicy {
            large_step_threshold: self.large_step_threshold,
            large_action_threshold: self.large_action_threshold,
            item_height: self.item_height,
            large_overscan: self.large_overscan,
            default_overscan: self.overscan,
        }
    }

    pub fn edit_debounce(&self) -> Duration {
        Duration::from_millis(self.edit_debounce_ms)
    }

    pub fn batch_flush_delay(&self) -> Duration {
        Duration::from_millis(self.batch_flush_delay_ms)
    }
}
