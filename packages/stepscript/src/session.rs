//! Editor session: the owner of one loaded script and everything derived from it.
//!
//! Caches and the performance monitor live here rather than in globals, so
//! each session (and each test) gets its own and tearing a session down
//! cannot leak cached answers into the next script.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::access_cache::{AccessCache, AccessCacheStats};
use crate::clock::{SharedClock, SystemClock};
use crate::complexity::{calculate_script_complexity_with, ScriptComplexity};
use crate::config::SessionConfig;
use crate::diagnostics::{validate_script, ScriptDiagnostic};
use crate::error::{Result, ScriptError};
use crate::isolation::{
    get_steps_referencing_action, isolation_violations, update_action_in_pool,
    validate_metadata_preservation, IsolationViolation,
};
use crate::perf_monitor::{OperationSummary, PerformanceMonitor};
use crate::script::{Action, ActionId, Script, Step, StepId};
use crate::script_file::content_digest;
use crate::virtualization::{calculate_visible_range, ListPolicy, VirtualListConfig, VisibleRange};

/// A pending replacement of one action's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEdit {
    pub action_id: ActionId,
    pub action: Action,
}

impl ActionEdit {
    pub fn new(action_id: impl Into<ActionId>, action: Action) -> Self {
        Self {
            action_id: action_id.into(),
            action,
        }
    }
}

/// What happened to one edit.
#[derive(Debug, Clone, Serialize)]
pub struct EditOutcome {
    pub action_id: ActionId,
    /// The edit was committed to the session's script.
    pub applied: bool,
    /// Steps referencing the action, in script order.
    pub affected_steps: Vec<StepId>,
    pub affects_multiple_steps: bool,
    pub violations: Vec<IsolationViolation>,
    pub metadata_preserved: bool,
}

fn step_at(script: &Script, index: usize) -> Result<&Step> {
    script.steps.get(index).ok_or(ScriptError::StepOutOfRange {
        index,
        len: script.steps.len(),
    })
}

pub struct EditorSession {
    config: SessionConfig,
    policy: ListPolicy,
    script: Script,
    digest: Option<String>,
    cache: AccessCache,
    monitor: PerformanceMonitor,
}

impl EditorSession {
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_clock(config, Rc::new(SystemClock::new()))
    }

    /// Session whose caches read time from `clock`.
    pub fn with_clock(config: SessionConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        let mut monitor = PerformanceMonitor::new(config.monitor_capacity);
        if config.log_performance {
            monitor.set_logging_enabled(true);
        }
        Ok(Self {
            policy: config.list_policy(),
            cache: AccessCache::with_clock(config.access_cache(), clock),
            monitor,
            script: Script::default(),
            digest: None,
            config,
        })
    }

    /// Replace the session's script.
    ///
    /// Caches are cleared unless the new script has exactly the content of
    /// the one already loaded.
    pub fn load_script(&mut self, script: Script) -> Result<()> {
        let digest = content_digest(&script)?;
        if self.digest.as_deref() != Some(digest.as_str()) {
            self.cache.clear_performance_caches();
            log::info!(
                "loaded script {:?} ({} steps, {} actions)",
                script.metadata.title,
                script.step_count(),
                script.action_count()
            );
        } else {
            log::debug!("reloaded identical script {:?}; keeping caches", script.metadata.title);
        }
        self.script = script;
        self.digest = Some(digest);
        Ok(())
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn into_script(self) -> Script {
        self.script
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Replace one action's content if, and only if, the result passes the
    /// isolation and metadata checks. Rejected edits leave the script as it was.
    pub fn apply_action_edit(&mut self, action_id: &str, action: Action) -> Result<EditOutcome> {
        let affected_steps: Vec<StepId> = get_steps_referencing_action(&self.script, action_id)
            .into_iter()
            .map(|step| step.id.clone())
            .collect();
        let affects_multiple_steps = affected_steps.len() > 1;
        if affects_multiple_steps {
            log::warn!(
                "action {} is shared by {} steps; the edit changes all of them",
                action_id,
                affected_steps.len()
            );
        }

        let script = &self.script;
        let candidate = self.monitor.measure_with(
            "update_action_in_pool",
            Some(serde_json::json!({ "actionId": action_id })),
            || update_action_in_pool(script, action_id, action),
        )?;

        let violations = isolation_violations(&self.script, &candidate, action_id);
        let metadata_preserved = validate_metadata_preservation(&self.script, &candidate);
        let applied = violations.is_empty() && metadata_preserved;

        if applied {
            self.script = candidate;
            self.digest = None;
        } else {
            for violation in &violations {
                log::warn!("rejected edit to action {}: {}", action_id, violation);
            }
            if !metadata_preserved {
                log::warn!("rejected edit to action {}: metadata changed", action_id);
            }
        }

        Ok(EditOutcome {
            action_id: action_id.to_string(),
            applied,
            affected_steps,
            affects_multiple_steps,
            violations,
            metadata_preserved,
        })
    }

    /// Apply edits in order. A malformed edit stops the batch; edits before
    /// it stay applied.
    pub fn apply_action_edits(&mut self, edits: Vec<ActionEdit>) -> Result<Vec<EditOutcome>> {
        edits
            .into_iter()
            .map(|edit| self.apply_action_edit(&edit.action_id, edit.action))
            .collect()
    }

    /// Resolvable actions of the step at `index`, timestamp order.
    pub fn step_actions(&mut self, index: usize) -> Result<Rc<[Action]>> {
        let step = step_at(&self.script, index)?;
        Ok(self
            .cache
            .memoized_filter_actions_for_step(step, &self.script.action_pool))
    }

    pub fn step_action_count(&mut self, index: usize) -> Result<usize> {
        let step = step_at(&self.script, index)?;
        Ok(self
            .cache
            .memoized_get_step_action_count(step, &self.script.action_pool))
    }

    pub fn is_large(&self) -> bool {
        self.policy.is_large(&self.script)
    }

    pub fn list_config(&self, container_height: f64) -> VirtualListConfig {
        self.policy.list_config(&self.script, container_height)
    }

    pub fn visible_range(&self, scroll_top: f64, container_height: f64) -> VisibleRange {
        let config = self.list_config(container_height);
        calculate_visible_range(scroll_top, &config, self.script.step_count())
    }

    /// Steps inside `range`.
    pub fn visible_steps(&self, range: &VisibleRange) -> &[Step] {
        let end = range.end.min(self.script.steps.len());
        let start = range.start.min(end);
        &self.script.steps[start..end]
    }

    pub fn complexity(&self) -> ScriptComplexity {
        calculate_script_complexity_with(&self.script, self.config.seconds_per_action)
    }

    pub fn diagnostics(&self) -> Vec<ScriptDiagnostic> {
        validate_script(&self.script)
    }

    pub fn performance_summary(&self) -> BTreeMap<String, OperationSummary> {
        self.monitor.get_summary()
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut PerformanceMonitor {
        &mut self.monitor
    }

    pub fn cache_stats(&self) -> AccessCacheStats {
        self.cache.stats()
    }

    /// Tear down derived state. The script itself stays readable.
    pub fn close(&mut self) {
        self.cache.clear_performance_caches();
        self.monitor.clear();
        self.digest = None;
        log::info!("closed session for script {:?}", self.script.metadata.title);
    }
}
