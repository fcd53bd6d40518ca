//! Structured script diagnostics.
//!
//! Wraps whole-script consistency checks into a stable, JSON-serializable
//! format that the editor UI (or the CLI) can surface without reading logs.
//! Nothing here repairs a script; it only reports.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::script::Script;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptDiagnosticKind {
    /// A step references an action id that is not in the pool.
    DanglingActionRef,
    /// A step's `order` does not match its 1-based position.
    OrderMismatch,
    /// A step has an empty (or whitespace-only) description.
    EmptyDescription,
    /// Two steps share an id.
    DuplicateStepId,
    /// A pool action that no step references. Legal, but unexpected while editing.
    OrphanedAction,
}

impl ScriptDiagnosticKind {
    pub fn severity(&self) -> Severity {
        match self {
            Self::DanglingActionRef | Self::DuplicateStepId => Severity::Error,
            Self::OrderMismatch | Self::EmptyDescription => Severity::Warning,
            Self::OrphanedAction => Severity::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScriptDiagnostic {
    pub kind: ScriptDiagnosticKind,
    pub severity: Severity,
    pub message: String,
    /// 0-based index of the offending step, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
}

impl ScriptDiagnostic {
    fn new(kind: ScriptDiagnosticKind, message: String) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message,
            step_index: None,
            action_id: None,
        }
    }

    fn at_step(mut self, index: usize) -> Self {
        self.step_index = Some(index);
        self
    }

    fn with_action(mut self, action_id: &str) -> Self {
        self.action_id = Some(action_id.to_string());
        self
    }
}

/// Check every structural invariant of a script.
///
/// Diagnostics come out in step order, followed by orphaned actions in pool
/// key order.
pub fn validate_script(script: &Script) -> Vec<ScriptDiagnostic> {
    let mut diagnostics = Vec::new();
    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut referenced: HashSet<&str> = HashSet::new();

    for (index, step) in script.steps.iter().enumerate() {
        if !seen_ids.insert(step.id.as_str()) {
            diagnostics.push(
                ScriptDiagnostic::new(
                    ScriptDiagnosticKind::DuplicateStepId,
                    format!("step id {:?} is used more than once", step.id),
                )
                .at_step(index),
            );
        }

        let expected_order = index as u32 + 1;
        if step.order != expected_order {
            diagnostics.push(
                ScriptDiagnostic::new(
                    ScriptDiagnosticKind::OrderMismatch,
                    format!(
                        "step {:?} has order {} but sits at position {}",
                        step.id, step.order, expected_order
                    ),
                )
                .at_step(index),
            );
        }

        if step.description.trim().is_empty() {
            diagnostics.push(
                ScriptDiagnostic::new(
                    ScriptDiagnosticKind::EmptyDescription,
                    format!("step {:?} has no description", step.id),
                )
                .at_step(index),
            );
        }

        // Report each dangling id once per step even if repeated.
        let mut dangling: BTreeSet<&str> = BTreeSet::new();
        for action_id in &step.action_ids {
            referenced.insert(action_id.as_str());
            if !script.action_pool.contains_key(action_id) {
                dangling.insert(action_id.as_str());
            }
        }
        for action_id in dangling {
            diagnostics.push(
                ScriptDiagnostic::new(
                    ScriptDiagnosticKind::DanglingActionRef,
                    format!("step {:?} references missing action {:?}", step.id, action_id),
                )
                .at_step(index)
                .with_action(action_id),
            );
        }
    }

    for action_id in script.action_pool.keys() {
        if !referenced.contains(action_id.as_str()) {
            diagnostics.push(
                ScriptDiagnostic::new(
                    ScriptDiagnosticKind::OrphanedAction,
                    format!("action {:?} is not referenced by any step", action_id),
                )
                .with_action(action_id),
            );
        }
    }

    diagnostics
}

/// True when no diagnostic reaches error severity.
pub fn is_consistent(diagnostics: &[ScriptDiagnostic]) -> bool {
    diagnostics.iter().all(|d| d.severity < Severity::Error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{Action, ScriptMetadata, Step};

    fn kinds(diagnostics: &[ScriptDiagnostic]) -> Vec<ScriptDiagnosticKind> {
        diagnostics.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn test_clean_script_has_no_diagnostics() {
        let mut script = Script::new(ScriptMetadata::new("ok"));
        script.push_step(Step::new("s1", 1, "click login").with_actions(["a1"]));
        script.insert_action(Action::new("a1", "click", 0.0));

        let diagnostics = validate_script(&script);
        assert!(diagnostics.is_empty());
        assert!(is_consistent(&diagnostics));
    }

    #[test]
    fn test_dangling_reference_is_error() {
        let mut script = Script::new(ScriptMetadata::new("broken"));
        script.push_step(Step::new("s1", 1, "click").with_actions(["gone", "gone"]));

        let diagnostics = validate_script(&script);
        assert_eq!(kinds(&diagnostics), vec![ScriptDiagnosticKind::DanglingActionRef]);
        assert_eq!(diagnostics[0].action_id.as_deref(), Some("gone"));
        assert!(!is_consistent(&diagnostics));
    }

    #[test]
    fn test_structure_warnings() {
        let mut script = Script::new(ScriptMetadata::new("messy"));
        script.steps.push(Step::new("s1", 2, " "));
        script.steps.push(Step::new("s1", 2, "second"));
        script.insert_action(Action::new("lonely", "wait", 0.0));

        let diagnostics = validate_script(&script);
        assert_eq!(
            kinds(&diagnostics),
            vec![
                ScriptDiagnosticKind::OrderMismatch,
                ScriptDiagnosticKind::EmptyDescription,
                ScriptDiagnosticKind::DuplicateStepId,
                ScriptDiagnosticKind::OrphanedAction,
            ]
        );
        assert_eq!(diagnostics[2].step_index, Some(1));
    }

    #[test]
    fn test_diagnostic_serializes_snake_case() {
        let mut script = Script::new(ScriptMetadata::new("json"));
        script.insert_action(Action::new("a1", "click", 0.0));
        let diagnostics = validate_script(&script);

        let value = serde_json::to_value(&diagnostics[0]).unwrap();
        assert_eq!(value["kind"], "orphaned_action");
        assert_eq!(value["severity"], "info");
        assert!(value.get("step_index").is_none());
    }
}
