//! fallback.rs — tiered static replies used when synthesis is unavailable.
//!
//! Tier follows the caller's unanswered-message streak; each tier carries a
//! delay and per-language normal/neutral pools. Selection never repeats a
//! line already sent in the conversation; an exhausted pool is a silent
//! no-op (documented limitation, not an error).

use chrono::{DateTime, Duration, Utc};
use rand::seq::IndexedRandom;

use crate::language::Lang;
use crate::model::{FallbackJob, FallbackSettings, FallbackTier, MessageRow};

/// Consecutive most-recent caller messages with no intervening bot reply.
/// Scans newest→oldest and stops at the first bot-authored row.
pub fn streak(rows: &[MessageRow], bot_id: &str) -> usize {
    rows.iter()
        .rev()
        .take_while(|m| m.sender_id != bot_id)
        .count()
}

/// Pick a line for (tier, language, aggression), excluding `already_sent`.
/// Aggressive inbound draws from the neutral (de-escalating) pool. When the
/// tier pool has nothing left, the legacy single-message field is the last
/// resort.
pub fn select_message(
    settings: &FallbackSettings,
    tier: FallbackTier,
    lang: Lang,
    aggressive: bool,
    already_sent: &[String],
) -> Option<String> {
    let lang = lang.or_default();
    let pools = settings.pools(tier);

    let pool: &[String] = pools
        .get(lang.code())
        .map(|p| if aggressive { &p.neutral[..] } else { &p.normal[..] })
        .unwrap_or(&[]);

    let candidates: Vec<&String> = pool
        .iter()
        .filter(|m| !already_sent.contains(m))
        .collect();

    if let Some(choice) = candidates.choose(&mut rand::rng()) {
        return Some((*choice).clone());
    }

    // Legacy backward-compat field, still subject to dedup.
    settings
        .legacy_messages
        .get(lang.code())
        .filter(|m| !already_sent.contains(m))
        .cloned()
}

/// Build the durable pending-send record for a delayed tier.
pub fn build_job(
    match_id: &str,
    bot_id: &str,
    user_id: &str,
    tier: FallbackTier,
    trigger_text: &str,
    lang: Lang,
    trigger_at: DateTime<Utc>,
    delay_secs: i64,
) -> FallbackJob {
    FallbackJob {
        id: format!("fb-{}-{}", match_id, trigger_at.timestamp_millis()),
        match_id: match_id.to_string(),
        bot_id: bot_id.to_string(),
        user_id: user_id.to_string(),
        tier,
        trigger_text: trigger_text.to_string(),
        lang,
        trigger_at,
        fire_at: trigger_at + Duration::seconds(delay_secs.max(0)),
    }
}
