//! gates.rs — the admission checks run before any reply work.
//!
//! Seven independent gates in a fixed order; the first failure ends the
//! request with a `skipped` result and no side effects. Order is escalation
//! precedence: hard kill switches first, soft scheduling limits last.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{BotConfig, GlobalConfig, GroupConfig, Schedule};
use crate::settings::{resolve_cooldown_secs, resolve_schedule};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Inactive,
    AdminHandoff,
    Quarantine,
    Handoff,
    Cooldown,
    InactiveHours,
    DailyLimit,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::Inactive => "inactive",
            SkipReason::AdminHandoff => "admin_handoff",
            SkipReason::Quarantine => "quarantine",
            SkipReason::Handoff => "handoff",
            SkipReason::Cooldown => "cooldown",
            SkipReason::InactiveHours => "inactive_hours",
            SkipReason::DailyLimit => "daily_limit",
        }
    }
}

/// True when the pair is still inside the cooldown window.
pub fn cooldown_active(
    last_sent_at: Option<DateTime<Utc>>,
    cooldown_secs: i64,
    now: DateTime<Utc>,
) -> bool {
    match last_sent_at {
        Some(last) => now - last < Duration::seconds(cooldown_secs),
        None => false,
    }
}

/// True when the schedule names an hour allow-list and the current UTC hour
/// is absent from it. An empty or missing list allows every hour.
pub fn outside_active_hours(schedule: Option<&Schedule>, now: DateTime<Utc>) -> bool {
    match schedule.and_then(|s| s.active_hours.as_ref()) {
        Some(hours) if !hours.is_empty() => !hours.contains(&now.hour()),
        _ => false,
    }
}

/// Start of the current UTC day; the daily-cap count window.
pub fn utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Run the full chain. `Some(reason)` means the request is skipped.
pub async fn run_gates(
    store: &dyn Store,
    match_id: &str,
    caller_id: &str,
    bot: &BotConfig,
    group: Option<&GroupConfig>,
    global: Option<&GlobalConfig>,
    default_cooldown_secs: i64,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<SkipReason>> {
    // 1. Bot switched off entirely.
    if !bot.active {
        return Ok(Some(SkipReason::Inactive));
    }

    // 2. Conversation-level admin override present and disabled.
    if let Some(ov) = store.get_reply_override(match_id).await? {
        if !ov.bot_enabled {
            return Ok(Some(SkipReason::AdminHandoff));
        }
    }

    // 3. Caller quarantined across all conversations.
    if let Some(q) = store.get_quarantine(caller_id).await? {
        if q.active {
            return Ok(Some(SkipReason::Quarantine));
        }
    }

    // 4. A moderator holds this conversation.
    if let Some(h) = store.get_handoff(match_id, &bot.bot_id).await? {
        if h.active {
            return Ok(Some(SkipReason::Handoff));
        }
    }

    // 5. Cooldown window since the last automated send to this caller.
    let cooldown_secs = resolve_cooldown_secs(bot, group, global, default_cooldown_secs);
    let last = store
        .get_cooldown(&bot.bot_id, caller_id)
        .await?
        .map(|c| c.last_sent_at);
    if cooldown_active(last, cooldown_secs, now) {
        return Ok(Some(SkipReason::Cooldown));
    }

    // 6. UTC hour allow-list.
    let schedule = resolve_schedule(bot, group, global);
    if outside_active_hours(schedule, now) {
        return Ok(Some(SkipReason::InactiveHours));
    }

    // 7. Daily output cap since UTC midnight.
    if let Some(limit) = schedule.and_then(|s| s.daily_message_limit) {
        let sent = store
            .bot_message_count_since(&bot.bot_id, utc_midnight(now))
            .await?;
        if sent >= u64::from(limit) {
            return Ok(Some(SkipReason::DailyLimit));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_window_math() {
        let now = Utc::now();
        // 3s ago with a 5s window: still cooling down.
        assert!(cooldown_active(Some(now - Duration::seconds(3)), 5, now));
        // 10s ago: window passed.
        assert!(!cooldown_active(Some(now - Duration::seconds(10)), 5, now));
        // Never sent: no cooldown.
        assert!(!cooldown_active(None, 5, now));
    }

    #[test]
    fn active_hours_allow_list() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 14, 30, 0).unwrap();
        let sched = Schedule {
            active_hours: Some(vec![9, 10, 14]),
            daily_message_limit: None,
        };
        assert!(!outside_active_hours(Some(&sched), now));

        let closed = Schedule {
            active_hours: Some(vec![9, 10]),
            daily_message_limit: None,
        };
        assert!(outside_active_hours(Some(&closed), now));

        // No list, or an empty one, never blocks.
        assert!(!outside_active_hours(None, now));
        let empty = Schedule {
            active_hours: Some(vec![]),
            daily_message_limit: None,
        };
        assert!(!outside_active_hours(Some(&empty), now));
    }

    #[test]
    fn midnight_truncates_to_day_start() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 59).unwrap();
        let mid = utc_midnight(now);
        assert_eq!(mid.hour(), 0);
        assert_eq!(mid.day(), 1);
    }

    #[test]
    fn skip_reason_wire_names() {
        assert_eq!(
            serde_json::to_value(SkipReason::AdminHandoff).unwrap(),
            serde_json::json!("admin_handoff")
        );
        assert_eq!(SkipReason::InactiveHours.as_str(), "inactive_hours");
    }
}
