//! Memoized step/action lookups.
//!
//! Rendering a step list asks "which actions does step S have" for every
//! visible row on every frame. Both answers are cached per editor session,
//! keyed by the step's identity and its reference list, so any change to a
//! step's `action_ids` naturally misses.
//!
//! Action content can change without the step changing (an isolated edit
//! replaces the pool entry). Cached action lists are therefore checked
//! against the pool on every hit and recomputed when they no longer match,
//! which keeps a cached answer identical to a fresh computation.

use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;

use crate::clock::{SharedClock, SystemClock};
use crate::memo_cache::{CacheStats, MemoCache};
use crate::script::{Action, ActionId, ActionPool, Step, StepId};

/// Sizing for the two caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessCacheConfig {
    pub list_capacity: usize,
    pub list_ttl: Duration,
    pub count_capacity: usize,
    pub count_ttl: Duration,
}

impl Default for AccessCacheConfig {
    fn default() -> Self {
        Self {
            list_capacity: 500,
            list_ttl: Duration::from_secs(30),
            count_capacity: 1000,
            count_ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ListKey {
    step_id: StepId,
    action_ids: Vec<ActionId>,
}

impl ListKey {
    fn for_step(step: &Step) -> Self {
        Self {
            step_id: step.id.clone(),
            action_ids: step.action_ids.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CountKey {
    step: ListKey,
    pool_size: usize,
}

/// Resolvable actions of a step, ascending by timestamp.
///
/// Ids missing from the pool are skipped. An id referenced twice appears
/// twice. The sort is stable and NaN timestamps order last.
pub fn filter_actions_for_step(step: &Step, pool: &ActionPool) -> Vec<Action> {
    let mut actions: Vec<Action> = step
        .action_ids
        .iter()
        .filter_map(|id| pool.get(id))
        .cloned()
        .collect();
    actions.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    actions
}

/// Number of the step's action ids that resolve in the pool.
pub fn step_action_count(step: &Step, pool: &ActionPool) -> usize {
    step.action_ids
        .iter()
        .filter(|id| pool.contains_key(id.as_str()))
        .count()
}

fn still_current(cached: &[Action], step: &Step, pool: &ActionPool) -> bool {
    cached.len() == step_action_count(step, pool)
        && cached.iter().all(|action| pool.get(&action.id) == Some(action))
}

/// Snapshot of both caches' counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AccessCacheStats {
    pub list: CacheStats,
    pub list_entries: usize,
    pub count: CacheStats,
    pub count_entries: usize,
}

/// Session-owned lookup caches.
pub struct AccessCache {
    lists: MemoCache<ListKey, Rc<[Action]>>,
    counts: MemoCache<CountKey, usize>,
}

impl AccessCache {
    pub fn new(config: AccessCacheConfig) -> Self {
        Self::with_clock(config, Rc::new(SystemClock::new()))
    }

    pub fn with_clock(config: AccessCacheConfig, clock: SharedClock) -> Self {
        Self {
            lists: MemoCache::with_clock(config.list_capacity, config.list_ttl, clock.clone()),
            counts: MemoCache::with_clock(config.count_capacity, config.count_ttl, clock),
        }
    }

    /// Cached form of [`filter_actions_for_step`].
    pub fn memoized_filter_actions_for_step(&mut self, step: &Step, pool: &ActionPool) -> Rc<[Action]> {
        let key = ListKey::for_step(step);
        if let Some(cached) = self.lists.get(&key) {
            if still_current(cached, step, pool) {
                return Rc::clone(cached);
            }
            log::debug!("cached actions for step {} are stale; recomputing", step.id);
        }

        let actions: Rc<[Action]> = filter_actions_for_step(step, pool).into();
        self.lists.set(key, Rc::clone(&actions));
        actions
    }

    /// Cached form of [`step_action_count`].
    ///
    /// Keyed by the step's id and full reference list plus the pool size, so
    /// any change to the step, and any insertion or removal in the pool,
    /// misses. Isolated edits never change the pool's key set. A pool whose
    /// key set is swapped at constant size must be followed by
    /// [`clear_performance_caches`](Self::clear_performance_caches), as
    /// loading a new script does.
    pub fn memoized_get_step_action_count(&mut self, step: &Step, pool: &ActionPool) -> usize {
        let key = CountKey {
            step: ListKey::for_step(step),
            pool_size: pool.len(),
        };
        if let Some(count) = self.counts.get(&key) {
            return *count;
        }

        let count = step_action_count(step, pool);
        self.counts.set(key, count);
        count
    }

    /// Drop everything. Call when the script is replaced wholesale.
    pub fn clear_performance_caches(&mut self) {
        log::debug!(
            "clearing access caches ({} lists, {} counts)",
            self.lists.len(),
            self.counts.len()
        );
        self.lists.clear();
        self.counts.clear();
    }

    pub fn stats(&self) -> AccessCacheStats {
        AccessCacheStats {
            list: self.lists.stats(),
            list_entries: self.lists.len(),
            count: self.counts.stats(),
            count_entries: self.counts.len(),
        }
    }
}

impl Default for AccessCache {
    fn default() -> Self {
        Self::new(AccessCacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::isolation::update_action_in_pool;
    use crate::script::{Script, ScriptMetadata};

    fn script() -> Script {
        let mut script = Script::new(ScriptMetadata::new("cache"));
        script.push_step(Step::new("s1", 1, "fill form").with_actions(["late", "early", "missing", "mid"]));
        script.push_step(Step::new("s2", 2, "submit").with_actions(["mid"]));
        script.insert_action(Action::new("late", "type", 300.0));
        script.insert_action(Action::new("early", "click", 100.0));
        script.insert_action(Action::new("mid", "click", 200.0));
        script
    }

    fn ids(actions: &[Action]) -> Vec<&str> {
        actions.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn test_filter_sorts_and_skips_missing() {
        let script = script();
        let actions = filter_actions_for_step(&script.steps[0], &script.action_pool);
        assert_eq!(ids(&actions), vec!["early", "mid", "late"]);
        assert_eq!(step_action_count(&script.steps[0], &script.action_pool), 3);
    }

    #[test]
    fn test_nan_timestamp_sorts_last() {
        let mut script = script();
        script.insert_action(Action::new("late", "type", f64::NAN));
        let actions = filter_actions_for_step(&script.steps[0], &script.action_pool);
        assert_eq!(ids(&actions), vec!["early", "mid", "late"]);
    }

    #[test]
    fn test_memoized_matches_uncached() {
        let script = script();
        let mut cache = AccessCache::default();
        let step = &script.steps[0];

        let first = cache.memoized_filter_actions_for_step(step, &script.action_pool);
        let second = cache.memoized_filter_actions_for_step(step, &script.action_pool);
        assert_eq!(&*first, &*second);
        assert_eq!(&*first, filter_actions_for_step(step, &script.action_pool).as_slice());
        assert!(Rc::ptr_eq(&first, &second));

        let stats = cache.stats();
        assert_eq!(stats.list.hits, 1);
        assert_eq!(stats.list.misses, 1);
    }

    #[test]
    fn test_step_change_misses() {
        let mut script = script();
        let mut cache = AccessCache::default();
        cache.memoized_filter_actions_for_step(&script.steps[1], &script.action_pool);

        script.steps[1].action_ids.push("early".to_string());
        let actions = cache.memoized_filter_actions_for_step(&script.steps[1], &script.action_pool);
        assert_eq!(ids(&actions), vec!["early", "mid"]);
        assert_eq!(cache.stats().list.misses, 2);
    }

    #[test]
    fn test_action_edit_is_never_served_stale() {
        let script = script();
        let mut cache = AccessCache::default();
        cache.memoized_filter_actions_for_step(&script.steps[0], &script.action_pool);

        let edited = update_action_in_pool(&script, "early", Action::new("early", "click", 400.0)).unwrap();
        let actions = cache.memoized_filter_actions_for_step(&edited.steps[0], &edited.action_pool);
        assert_eq!(ids(&actions), vec!["mid", "late", "early"]);
        assert_eq!(
            &*actions,
            filter_actions_for_step(&edited.steps[0], &edited.action_pool).as_slice()
        );
    }

    #[test]
    fn test_count_tracks_pool_membership() {
        let mut script = script();
        let mut cache = AccessCache::default();
        assert_eq!(cache.memoized_get_step_action_count(&script.steps[0], &script.action_pool), 3);
        assert_eq!(cache.memoized_get_step_action_count(&script.steps[0], &script.action_pool), 3);
        assert_eq!(cache.stats().count.hits, 1);

        script.insert_action(Action::new("missing", "wait", 50.0));
        assert_eq!(cache.memoized_get_step_action_count(&script.steps[0], &script.action_pool), 4);
    }

    #[test]
    fn test_count_follows_reference_swap_of_same_length() {
        let mut script = script();
        let mut cache = AccessCache::default();
        script.steps[1].action_ids = vec!["early".to_string(), "mid".to_string()];
        assert_eq!(cache.memoized_get_step_action_count(&script.steps[1], &script.action_pool), 2);

        script.steps[1].action_ids[1] = "missing".to_string();
        let cached = cache.memoized_get_step_action_count(&script.steps[1], &script.action_pool);
        assert_eq!(cached, step_action_count(&script.steps[1], &script.action_pool));
        assert_eq!(cached, 1);
        assert_eq!(cache.stats().count.misses, 2);
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let clock = ManualClock::new();
        let config = AccessCacheConfig {
            list_ttl: Duration::from_secs(30),
            ..Default::default()
        };
        let mut cache = AccessCache::with_clock(config, Rc::new(clock.clone()));
        let script = script();

        cache.memoized_filter_actions_for_step(&script.steps[0], &script.action_pool);
        clock.advance(Duration::from_secs(31));
        cache.memoized_filter_actions_for_step(&script.steps[0], &script.action_pool);

        let stats = cache.stats();
        assert_eq!(stats.list.expirations, 1);
        assert_eq!(stats.list.hits, 0);
    }

    #[test]
    fn test_clear_performance_caches() {
        let script = script();
        let mut cache = AccessCache::default();
        cache.memoized_filter_actions_for_step(&script.steps[0], &script.action_pool);
        cache.memoized_get_step_action_count(&script.steps[0], &script.action_pool);

        cache.clear_performance_caches();
        let stats = cache.stats();
        assert_eq!(stats.list_entries, 0);
        assert_eq!(stats.count_entries, 0);
    }
}
