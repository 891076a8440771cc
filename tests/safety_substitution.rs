// tests/safety_substitution.rs
//
// End-to-end safety behavior through the engine: inbound detections are
// logged without blocking, outbound detections replace the synthesized text
// with the canned per-language line, and every detection lands in both the
// event log and the daily health counters.

use std::sync::Arc;

use amora_reply_engine::ai_adapter::MockClient;
use amora_reply_engine::config::EngineConfig;
use amora_reply_engine::engine::{ReplyEngine, ReplyOutcome, ReplyRequest};
use amora_reply_engine::language::Lang;
use amora_reply_engine::model::{BotConfig, MatchRow, ProfileRow, SafetyCategory};
use amora_reply_engine::safety::canned_substitute;
use amora_reply_engine::store::{DynStore, MemoryStore};

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.seed_match(MatchRow {
        id: "m1".into(),
        user_a: "human-1".into(),
        user_b: "bot-1".into(),
    });
    store.seed_profile(ProfileRow {
        id: "human-1".into(),
        is_bot: false,
    });
    store.seed_profile(ProfileRow {
        id: "bot-1".into(),
        is_bot: true,
    });
    store.seed_bot_config(BotConfig {
        bot_id: "bot-1".into(),
        active: true,
        ..Default::default()
    });
    store
}

fn engine_with(store: &MemoryStore, client: MockClient) -> ReplyEngine {
    let dyn_store: DynStore = Arc::new(store.clone());
    ReplyEngine::new(
        dyn_store,
        Arc::new(client),
        Arc::new(EngineConfig::default()),
    )
}

fn request(text: &str) -> ReplyRequest {
    ReplyRequest {
        match_id: "m1".into(),
        bot_id: "bot-1".into(),
        caller_id: "human-1".into(),
        message_text: text.into(),
    }
}

#[tokio::test]
async fn outbound_phone_number_is_replaced_with_canned_line() {
    let store = seeded_store();
    let engine = engine_with(&store, MockClient::replying("Sure! Call me at +90 555 123 45 67"));

    let outcome = engine
        .handle(request("Hello how are you"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReplyOutcome::Reply(canned_substitute(Lang::En).to_string())
    );

    // The leaked text never reaches the conversation.
    let messages = store.messages_snapshot();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, canned_substitute(Lang::En));
    assert!(!messages[0].text.contains("555"));

    let events = store.safety_events_snapshot();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].category, SafetyCategory::Phone);
    assert!(events[0].content.contains("555"));

    let health = store.health_snapshot();
    assert_eq!(health.len(), 1);
    assert_eq!(health[0].safety_flags, 1);
}

#[tokio::test]
async fn inbound_email_is_logged_but_reply_proceeds() {
    let store = seeded_store();
    let engine = engine_with(&store, MockClient::replying("Nice to hear from you!"));

    let outcome = engine
        .handle(request("hello, reach me at me@example.com anytime"))
        .await
        .unwrap();
    assert_eq!(outcome, ReplyOutcome::Reply("Nice to hear from you!".into()));

    let events = store.safety_events_snapshot();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].category, SafetyCategory::Email);
    assert_eq!(events[0].user_id, "human-1");

    // Clean outbound text is persisted untouched, the flag still counts.
    let messages = store.messages_snapshot();
    assert_eq!(messages[0].text, "Nice to hear from you!");
    assert_eq!(store.health_snapshot()[0].safety_flags, 1);
}

#[tokio::test]
async fn aggressive_inbound_records_its_own_event() {
    let store = seeded_store();
    let engine = engine_with(&store, MockClient::replying("Hey, let's stay kind."));

    engine
        .handle(request("you are such an idiot"))
        .await
        .unwrap();

    let events = store.safety_events_snapshot();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].category, SafetyCategory::Aggression);
}

#[tokio::test]
async fn inbound_and_outbound_hits_both_produce_events() {
    let store = seeded_store();
    let engine = engine_with(&store, MockClient::replying("Check https://sketchy.example"));

    let outcome = engine
        .handle(request("hello call me +90 555 123 45 67"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReplyOutcome::Reply(canned_substitute(Lang::En).to_string())
    );

    let mut categories: Vec<SafetyCategory> = store
        .safety_events_snapshot()
        .into_iter()
        .map(|e| e.category)
        .collect();
    categories.sort_by_key(|c| format!("{c:?}"));
    assert_eq!(categories, vec![SafetyCategory::Phone, SafetyCategory::Url]);
}

#[tokio::test]
async fn fixed_language_mode_picks_that_substitute() {
    let store = seeded_store();
    store.seed_bot_config(BotConfig {
        bot_id: "bot-1".into(),
        active: true,
        // Opted out of inheritance so the bot's own language mode leads.
        use_global: Some(false),
        language_mode: Some("tr".into()),
        ..Default::default()
    });
    let engine = engine_with(&store, MockClient::replying("numaram +90 555 123 45 67"));

    let outcome = engine.handle(request("selam!")).await.unwrap();
    assert_eq!(
        outcome,
        ReplyOutcome::Reply(canned_substitute(Lang::Tr).to_string())
    );
}

#[tokio::test]
async fn clean_traffic_leaves_no_events() {
    let store = seeded_store();
    let engine = engine_with(&store, MockClient::replying("All good here!"));

    engine.handle(request("Hello how are you")).await.unwrap();
    assert!(store.safety_events_snapshot().is_empty());
    assert_eq!(store.health_snapshot()[0].safety_flags, 0);
}
