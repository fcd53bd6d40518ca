//! Normalized test script model.
//!
//! A script is an ordered list of human-readable steps plus a flat pool of
//! machine actions. Steps never own actions; they reference pool entries by
//! id, and the same id may be referenced by more than one step.
//!
//! Invariants every core operation preserves:
//! - every id in a step's `action_ids` is a key of `action_pool`
//! - step `order` is the dense 1-based position of the step in `steps`
//! - editing one action never reshapes steps, metadata or variables

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::script_file::non_finite;

/// Identifier of an action in the pool.
pub type ActionId = String;

/// Stable identifier of a step.
pub type StepId = String;

/// Action pool keyed by action id.
pub type ActionPool = BTreeMap<ActionId, Action>;

/// Variable name to substitution value.
pub type Variables = BTreeMap<String, String>;

/// Current script format version written by this crate.
pub const SCRIPT_FORMAT_VERSION: &str = "2.0";

fn default_version() -> String {
    SCRIPT_FORMAT_VERSION.to_string()
}

/// Float equality that treats NaN as equal to itself.
///
/// Script values are compared structurally; a NaN timestamp copied from one
/// snapshot to another must still compare equal.
pub(crate) fn same_f64(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
}

/// Descriptive information about a script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptMetadata {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub preconditions: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    /// Recorded duration in seconds.
    #[serde(default, with = "non_finite")]
    pub duration: f64,
    #[serde(default)]
    pub platform: String,
    /// Number of recorded actions, as reported by the recorder.
    #[serde(default)]
    pub action_count: usize,
    #[serde(default = "default_version")]
    pub version: String,
}

impl ScriptMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            version: default_version(),
            ..Default::default()
        }
    }
}

impl PartialEq for ScriptMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.description == other.description
            && self.preconditions == other.preconditions
            && self.tags == other.tags
            && self.created_at == other.created_at
            && same_f64(self.duration, other.duration)
            && self.platform == other.platform
            && self.action_count == other.action_count
            && self.version == other.version
    }
}

/// A logical, human-described unit of the test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    /// 1-based position in the script.
    pub order: u32,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_result: Option<String>,
    #[serde(default)]
    pub action_ids: Vec<ActionId>,
    #[serde(default)]
    pub continue_on_failure: bool,
}

impl Step {
    pub fn new(id: impl Into<StepId>, order: u32, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            order,
            description: description.into(),
            expected_result: None,
            action_ids: Vec::new(),
            continue_on_failure: false,
        }
    }

    /// Builder-style helper that sets the referenced action ids.
    pub fn with_actions<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ActionId>,
    {
        self.action_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_expected_result(mut self, expected: impl Into<String>) -> Self {
        self.expected_result = Some(expected.into());
        self
    }

    /// Whether this step references the given action.
    pub fn references(&self, action_id: &str) -> bool {
        self.action_ids.iter().any(|id| id == action_id)
    }
}

/// A single recorded or configured automation primitive.
///
/// Only the fields this crate reasons about are modelled. Anything else the
/// automation engine stores on an action is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    /// Engine action type (`click`, `key_press`, `ai_vision_capture`, ...).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Capture time in milliseconds; orders actions attached to one step.
    #[serde(default, with = "non_finite")]
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Action {
    pub fn new(id: impl Into<ActionId>, kind: impl Into<String>, timestamp: f64) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            timestamp,
            ..Default::default()
        }
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.kind == other.kind
            && same_f64(self.timestamp, other.timestamp)
            && self.static_data == other.static_data
            && self.dynamic_config == other.dynamic_config
            && self.cache_data == other.cache_data
            && self.extra == other.extra
    }
}

/// Top-level script aggregate, owned by the editor session that loaded it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub metadata: ScriptMetadata,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub action_pool: ActionPool,
    #[serde(default)]
    pub variables: Variables,
}

impl Script {
    pub fn new(metadata: ScriptMetadata) -> Self {
        Self {
            metadata,
            ..Default::default()
        }
    }

    /// Append a step, assigning it the next dense order.
    pub fn push_step(&mut self, mut step: Step) {
        step.order = self.steps.len() as u32 + 1;
        self.steps.push(step);
    }

    /// Insert an action into the pool under its own id.
    pub fn insert_action(&mut self, action: Action) {
        self.action_pool.insert(action.id.clone(), action);
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn action(&self, id: &str) -> Option<&Action> {
        self.action_pool.get(id)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Number of entries in the action pool.
    pub fn action_count(&self) -> usize {
        self.action_pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.action_pool.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_step_assigns_dense_order() {
        let mut script = Script::new(ScriptMetadata::new("login"));
        script.push_step(Step::new("s1", 0, "open app"));
        script.push_step(Step::new("s2", 42, "log in"));

        let orders: Vec<u32> = script.steps.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2]);
    }

    #[test]
    fn test_action_equality_treats_nan_as_equal() {
        let a = Action::new("a1", "click", f64::NAN);
        let b = a.clone();
        assert_eq!(a, b);

        let c = Action::new("a1", "click", 1.0);
        assert_ne!(a, c);
    }

    #[test]
    fn test_step_references() {
        let step = Step::new("s1", 1, "type name").with_actions(["a1", "a2"]);
        assert!(step.references("a2"));
        assert!(!step.references("a3"));
    }

    #[test]
    fn test_metadata_new_uses_current_version() {
        let meta = ScriptMetadata::new("checkout");
        assert_eq!(meta.version, SCRIPT_FORMAT_VERSION);
        assert_eq!(meta.title, "checkout");
    }
}
