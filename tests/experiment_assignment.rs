// tests/experiment_assignment.rs
//
// Assignment resolution: deterministic bucketing, first-assignment-wins
// under concurrent first calls, target matching (bot > group > global).

use std::collections::HashSet;
use std::sync::Arc;

use amora_reply_engine::experiment::resolve_variant_prompt;
use amora_reply_engine::model::{Experiment, ExperimentTarget, ExperimentVariant};
use amora_reply_engine::store::{DynStore, MemoryStore, Store};

fn experiment(id: &str, target: ExperimentTarget) -> Experiment {
    Experiment {
        id: id.into(),
        target,
        active: true,
        variants: vec![
            ExperimentVariant {
                id: format!("{id}-a"),
                prompt: format!("{id} prompt a"),
                weight: 1,
            },
            ExperimentVariant {
                id: format!("{id}-b"),
                prompt: format!("{id} prompt b"),
                weight: 1,
            },
        ],
    }
}

#[tokio::test]
async fn repeated_resolution_returns_the_same_variant() {
    let store = MemoryStore::new();
    store.seed_experiment(experiment("exp1", ExperimentTarget::Global));

    let first = resolve_variant_prompt(&store, "match-42", "bot-1", None)
        .await
        .unwrap()
        .expect("variant assigned");
    for _ in 0..5 {
        let again = resolve_variant_prompt(&store, "match-42", "bot-1", None)
            .await
            .unwrap()
            .expect("variant assigned");
        assert_eq!(again, first);
    }
}

#[tokio::test]
async fn concurrent_first_calls_produce_exactly_one_assignment() {
    let store = MemoryStore::new();
    store.seed_experiment(experiment("exp1", ExperimentTarget::Global));
    let shared: DynStore = Arc::new(store.clone());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let s = Arc::clone(&shared);
        handles.push(tokio::spawn(async move {
            resolve_variant_prompt(s.as_ref(), "match-7", "bot-1", None)
                .await
                .unwrap()
                .expect("variant assigned")
        }));
    }

    let mut prompts = HashSet::new();
    for h in handles {
        prompts.insert(h.await.unwrap());
    }
    assert_eq!(prompts.len(), 1, "all racers must observe the same variant");

    let stored = store.get_assignment("match-7").await.unwrap().unwrap();
    assert_eq!(stored.experiment_id, "exp1");
}

#[tokio::test]
async fn bot_target_outranks_global() {
    let store = MemoryStore::new();
    store.seed_experiment(experiment("global-exp", ExperimentTarget::Global));
    store.seed_experiment(experiment(
        "bot-exp",
        ExperimentTarget::Bot("bot-1".into()),
    ));

    let prompt = resolve_variant_prompt(&store, "m1", "bot-1", None)
        .await
        .unwrap()
        .expect("variant assigned");
    assert!(prompt.starts_with("bot-exp"));
}

#[tokio::test]
async fn unrelated_bot_target_yields_no_assignment() {
    let store = MemoryStore::new();
    store.seed_experiment(experiment(
        "bot-exp",
        ExperimentTarget::Bot("someone-else".into()),
    ));

    let prompt = resolve_variant_prompt(&store, "m1", "bot-1", None)
        .await
        .unwrap();
    assert!(prompt.is_none());
    assert!(store.get_assignment("m1").await.unwrap().is_none());
}

#[tokio::test]
async fn group_target_applies_via_bot_group() {
    let store = MemoryStore::new();
    store.seed_experiment(experiment(
        "group-exp",
        ExperimentTarget::Group("g1".into()),
    ));

    let prompt = resolve_variant_prompt(&store, "m1", "bot-1", Some("g1"))
        .await
        .unwrap()
        .expect("variant assigned");
    assert!(prompt.starts_with("group-exp"));
}
