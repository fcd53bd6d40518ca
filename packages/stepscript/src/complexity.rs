//! Descriptive size metrics for a script.

use serde::Serialize;

use crate::script::Script;

/// Heuristic playback cost per action, in seconds. Not measured.
pub const ESTIMATED_SECONDS_PER_ACTION: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptComplexity {
    pub total_steps: usize,
    /// Size of the action pool.
    pub total_actions: usize,
    /// Mean number of action references per step (0 for an empty script).
    pub avg_actions_per_step: f64,
    pub max_actions_per_step: usize,
    /// `total_steps * avg_actions_per_step`.
    pub complexity_score: f64,
    /// Estimated playback time in seconds.
    pub estimated_execution_time: f64,
}

pub fn calculate_script_complexity(script: &Script) -> ScriptComplexity {
    calculate_script_complexity_with(script, ESTIMATED_SECONDS_PER_ACTION)
}

pub fn calculate_script_complexity_with(script: &Script, seconds_per_action: f64) -> ScriptComplexity {
    let total_steps = script.step_count();
    let total_actions = script.action_count();
    let total_references: usize = script.steps.iter().map(|s| s.action_ids.len()).sum();
    let max_actions_per_step = script
        .steps
        .iter()
        .map(|s| s.action_ids.len())
        .max()
        .unwrap_or(0);

    let avg_actions_per_step = if total_steps == 0 {
        0.0
    } else {
        total_references as f64 / total_steps as f64
    };

    ScriptComplexity {
        total_steps,
        total_actions,
        avg_actions_per_step,
        max_actions_per_step,
        complexity_score: total_steps as f64 * avg_actions_per_step,
        estimated_execution_time: total_actions as f64 * seconds_per_action,
    }
}
