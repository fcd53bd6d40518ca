//! Isolated action edits.
//!
//! Replacing one action's content must never leak into step structure, other
//! pool entries, metadata or variables. Every mutation returns a new `Script`
//! value so that a caller holding an older snapshot keeps seeing it
//! unchanged, and the validators here give a checkable post-condition.

use serde::Serialize;

use crate::error::{Result, ScriptError};
use crate::script::{Action, Script, Step};

/// Return a copy of `script` whose pool entry `action_id` is `updated_action`.
///
/// The id carried by `updated_action` is not trusted and is overwritten with
/// `action_id`. The entry does not need to exist beforehand; a missing id is
/// inserted. Steps, metadata and variables are copied unchanged.
pub fn update_action_in_pool(
    script: &Script,
    action_id: &str,
    updated_action: Action,
) -> Result<Script> {
    if action_id.trim().is_empty() {
        return Err(ScriptError::InvalidActionId(action_id.to_string()));
    }

    let mut action = updated_action;
    if action.id != action_id {
        log::debug!(
            "update for action {:?} carried id {:?}; using {:?}",
            action_id,
            action.id,
            action_id
        );
        action.id = action_id.to_string();
    }

    let mut action_pool = script.action_pool.clone();
    action_pool.insert(action_id.to_string(), action);

    Ok(Script {
        metadata: script.metadata.clone(),
        steps: script.steps.clone(),
        action_pool,
        variables: script.variables.clone(),
    })
}

/// One reason an edit was not isolated to its target action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IsolationViolation {
    StepCountChanged { before: usize, after: usize },
    StepChanged {
        index: usize,
        step_id: String,
        field: &'static str,
    },
    PoolKeysChanged {
        added: Vec<String>,
        removed: Vec<String>,
    },
    UnrelatedActionChanged { action_id: String },
    ModifiedActionMissing { action_id: String },
    ModifiedActionIdMismatch { action_id: String, found: String },
}

impl std::fmt::Display for IsolationViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StepCountChanged { before, after } => {
                write!(f, "step count changed from {} to {}", before, after)
            }
            Self::StepChanged { index, step_id, field } => {
                write!(f, "step {} ({}) changed field `{}`", index + 1, step_id, field)
            }
            Self::PoolKeysChanged { added, removed } => write!(
                f,
                "action pool keys changed (added: [{}], removed: [{}])",
                added.join(", "),
                removed.join(", ")
            ),
            Self::UnrelatedActionChanged { action_id } => {
                write!(f, "action {} changed but was not the edit target", action_id)
            }
            Self::ModifiedActionMissing { action_id } => {
                write!(f, "edited action {} is missing from the pool", action_id)
            }
            Self::ModifiedActionIdMismatch { action_id, found } => {
                write!(f, "edited action {} stored with id {}", action_id, found)
            }
        }
    }
}

fn first_changed_step_field(before: &Step, after: &Step) -> Option<&'static str> {
    if before.id != after.id {
        Some("id")
    } else if before.order != after.order {
        Some("order")
    } else if before.description != after.description {
        Some("description")
    } else if before.expected_result != after.expected_result {
        Some("expected_result")
    } else if before.continue_on_failure != after.continue_on_failure {
        Some("continue_on_failure")
    } else if before.action_ids != after.action_ids {
        Some("action_ids")
    } else {
        None
    }
}

/// Every way in which `after` differs from `before` beyond an edit of
/// `modified_action_id`. Empty means the edit was isolated.
pub fn isolation_violations(
    before: &Script,
    after: &Script,
    modified_action_id: &str,
) -> Vec<IsolationViolation> {
    let mut violations = Vec::new();

    if before.steps.len() != after.steps.len() {
        violations.push(IsolationViolation::StepCountChanged {
            before: before.steps.len(),
            after: after.steps.len(),
        });
    }

    for (index, (b, a)) in before.steps.iter().zip(after.steps.iter()).enumerate() {
        if let Some(field) = first_changed_step_field(b, a) {
            violations.push(IsolationViolation::StepChanged {
                index,
                step_id: b.id.clone(),
                field,
            });
        }
    }

    let added: Vec<String> = after
        .action_pool
        .keys()
        .filter(|k| !before.action_pool.contains_key(*k))
        .cloned()
        .collect();
    let removed: Vec<String> = before
        .action_pool
        .keys()
        .filter(|k| !after.action_pool.contains_key(*k))
        .cloned()
        .collect();
    if !added.is_empty() || !removed.is_empty() {
        violations.push(IsolationViolation::PoolKeysChanged { added, removed });
    }

    for (id, action) in &before.action_pool {
        if id == modified_action_id {
            continue;
        }
        if let Some(other) = after.action_pool.get(id) {
            if other != action {
                violations.push(IsolationViolation::UnrelatedActionChanged {
                    action_id: id.clone(),
                });
            }
        }
    }

    match after.action_pool.get(modified_action_id) {
        None => violations.push(IsolationViolation::ModifiedActionMissing {
            action_id: modified_action_id.to_string(),
        }),
        Some(action) if action.id != modified_action_id => {
            violations.push(IsolationViolation::ModifiedActionIdMismatch {
                action_id: modified_action_id.to_string(),
                found: action.id.clone(),
            })
        }
        Some(_) => {}
    }

    violations
}

/// True when `after` differs from `before` only in the pool entry
/// `modified_action_id`, and that entry exists with the right id.
pub fn validate_action_isolation(before: &Script, after: &Script, modified_action_id: &str) -> bool {
    isolation_violations(before, after, modified_action_id).is_empty()
}

/// All steps referencing `action_id`, in script order.
pub fn get_steps_referencing_action<'a>(script: &'a Script, action_id: &str) -> Vec<&'a Step> {
    script
        .steps
        .iter()
        .filter(|step| step.references(action_id))
        .collect()
}

/// Whether editing `action_id` would be visible from more than one step.
pub fn action_affects_multiple_steps(script: &Script, action_id: &str) -> bool {
    script
        .steps
        .iter()
        .filter(|step| step.references(action_id))
        .nth(1)
        .is_some()
}

/// Fully independent copy of a script.
///
/// Optional action fields are `Option`s and floats are copied bit for bit,
/// so absent values and NaN survive without any restoration pass.
pub fn deep_copy_script(script: &Script) -> Script {
    script.clone()
}

/// Metadata and variables are structurally identical in both snapshots.
pub fn validate_metadata_preservation(before: &Script, after: &Script) -> bool {
    before.metadata == after.metadata && before.variables == after.variables
}
