//! telemetry.rs — health counters, token accounting, cooldown refresh.
//!
//! Everything here is best-effort: a failed write is logged and swallowed,
//! never allowed to block or fail the reply that already happened.

use chrono::{DateTime, Utc};
use metrics::counter;

use crate::ai_adapter::Completion;
use crate::gates::SkipReason;
use crate::model::UsageRecord;
use crate::store::Store;

/// Record one successful send (primary or immediate fallback): health row
/// upsert, optional usage append, cooldown stamp, Prometheus counters.
/// Deferred fallback sends call this only when they actually fire.
pub async fn record_send(
    store: &dyn Store,
    bot_id: &str,
    match_id: &str,
    caller_id: &str,
    latency_ms: u64,
    safety_flagged: bool,
    completion: Option<&Completion>,
    now: DateTime<Utc>,
) {
    if let Err(err) = store
        .bump_health_daily(bot_id, now.date_naive(), latency_ms, safety_flagged)
        .await
    {
        tracing::warn!(%bot_id, error = %err, "health upsert failed");
    }

    if let Some(c) = completion {
        if let (Some(p), Some(co)) = (c.prompt_tokens, c.completion_tokens) {
            let record = UsageRecord {
                bot_id: bot_id.to_string(),
                match_id: match_id.to_string(),
                prompt_tokens: p,
                completion_tokens: co,
                created_at: now,
            };
            if let Err(err) = store.insert_usage(record).await {
                tracing::warn!(%bot_id, error = %err, "usage insert failed");
            }
        }
    }

    if let Err(err) = store.upsert_cooldown(bot_id, caller_id, now).await {
        tracing::warn!(%bot_id, error = %err, "cooldown upsert failed");
    }

    counter!("bot_replies_total").increment(1);
    if safety_flagged {
        counter!("bot_safety_flags_total").increment(1);
    }
}

pub fn record_skip(reason: SkipReason) {
    counter!("bot_skips_total", "reason" => reason.as_str()).increment(1);
}

pub fn record_scheduled_fallback() {
    counter!("bot_fallbacks_scheduled_total").increment(1);
}
