//! Property tests for isolated edits, deep copies and cached lookups.
//!
//! Run with: cargo test --test isolation_properties

use proptest::prelude::*;
use serde_json::json;

use stepscript::access_cache::{filter_actions_for_step, AccessCache};
use stepscript::isolation::{
    deep_copy_script, update_action_in_pool, validate_action_isolation,
    validate_metadata_preservation,
};
use stepscript::{Action, Script, ScriptMetadata, Step};

fn arb_timestamp() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => 0.0..10_000.0f64,
        1 => Just(f64::NAN),
    ]
}

fn arb_action(id: String) -> impl Strategy<Value = Action> {
    (
        prop::sample::select(vec!["click", "type", "key_press", "ai_vision_capture"]),
        arb_timestamp(),
        prop::option::of(any::<u16>()),
    )
        .prop_map(move |(kind, timestamp, data)| {
            let mut action = Action::new(id.clone(), kind, timestamp);
            action.static_data = data.map(|v| json!({ "value": v }));
            action
        })
}

/// Scripts whose steps only reference ids that exist in the pool.
fn arb_script() -> impl Strategy<Value = Script> {
    (1usize..30).prop_flat_map(|pool_size| {
        let actions: Vec<_> = (0..pool_size).map(|i| arb_action(format!("a{}", i))).collect();
        let steps = prop::collection::vec(
            (
                "[a-z ]{1,12}",
                prop::collection::vec(0..pool_size, 0..6),
                any::<bool>(),
            ),
            0..20,
        );
        (actions, steps).prop_map(|(actions, steps)| {
            let mut script = Script::new(ScriptMetadata::new("generated"));
            for action in actions {
                script.insert_action(action);
            }
            for (i, (description, refs, continue_on_failure)) in steps.into_iter().enumerate() {
                let mut step = Step::new(format!("s{}", i), 0, description)
                    .with_actions(refs.into_iter().map(|r| format!("a{}", r)));
                step.continue_on_failure = continue_on_failure;
                script.push_step(step);
            }
            script.variables.insert("env".to_string(), "staging".to_string());
            script
        })
    })
}

proptest! {
    #[test]
    fn update_is_isolated(
        script in arb_script(),
        pick in any::<prop::sample::Index>(),
        timestamp in arb_timestamp(),
    ) {
        let ids: Vec<String> = script.action_pool.keys().cloned().collect();
        let target = pick.get(&ids).clone();

        let after = update_action_in_pool(&script, &target, Action::new("untrusted", "click", timestamp)).unwrap();

        prop_assert!(validate_action_isolation(&script, &after, &target));
        prop_assert!(validate_metadata_preservation(&script, &after));
        prop_assert_eq!(&after.action(&target).unwrap().id, &target);
        for id in ids.iter().filter(|id| **id != target) {
            prop_assert_eq!(after.action(id), script.action(id));
        }
    }

    #[test]
    fn deep_copy_is_equal_and_independent(script in arb_script()) {
        let mut copy = deep_copy_script(&script);
        prop_assert_eq!(&copy, &script);

        let snapshot = script.clone();
        for action in copy.action_pool.values_mut() {
            action.timestamp += 1.0;
            action.cache_data = Some(json!("mutated"));
        }
        for step in &mut copy.steps {
            step.action_ids.clear();
        }
        copy.variables.clear();
        prop_assert_eq!(&script, &snapshot);
    }

    #[test]
    fn memoized_lookup_matches_uncached(script in arb_script()) {
        let mut cache = AccessCache::default();
        for step in &script.steps {
            let first = cache.memoized_filter_actions_for_step(step, &script.action_pool);
            let second = cache.memoized_filter_actions_for_step(step, &script.action_pool);
            let fresh = filter_actions_for_step(step, &script.action_pool);
            prop_assert_eq!(&*first, fresh.as_slice());
            prop_assert_eq!(&*second, fresh.as_slice());
        }
    }
}
