//! scheduler.rs — durable worker for deferred fallback sends.
//!
//! Scheduled fallbacks are rows, not in-process timers, so a replaced
//! instance cannot lose them. The worker polls for due jobs and re-validates
//! each one at fire time: the tier must still match the current streak and
//! no bot message may have landed since the trigger. A job is removed before
//! it executes; a crash in between drops one send but can never double-send.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tokio::task::JoinHandle;

use crate::engine::anon_id;
use crate::fallback::{select_message, streak};
use crate::language::AggressionDetector;
use crate::model::{FallbackJob, FallbackTier, MessageKind, MessageRow, SafetyEvent};
use crate::store::{DynStore, Store};
use crate::{safety, telemetry};

/// Outcome of one job attempt, for logging and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireResult {
    Sent,
    /// Re-validation failed or the pool was exhausted; dropped silently.
    Dropped,
}

/// Execute a single due job against current data.
pub async fn fire_job(
    store: &DynStore,
    aggression: &AggressionDetector,
    job: &FallbackJob,
    now: DateTime<Utc>,
) -> anyhow::Result<FireResult> {
    let recent = store.recent_messages(&job.match_id, 50).await?;

    // Guard 1: the streak-derived tier must still be the scheduled one.
    if FallbackTier::from_streak(streak(&recent, &job.bot_id)) != job.tier {
        return Ok(FireResult::Dropped);
    }
    // Guard 2: any bot message after the trigger cancels the job.
    if recent
        .iter()
        .any(|m| m.sender_id == job.bot_id && m.created_at > job.trigger_at)
    {
        return Ok(FireResult::Dropped);
    }

    let settings = store.get_fallback_settings().await?.unwrap_or_default();
    if !settings.enabled {
        return Ok(FireResult::Dropped);
    }

    // Language was resolved at trigger time (fixed mode included); the
    // trigger text only re-drives aggression classification here.
    let lang = job.lang;
    let aggressive = aggression.is_aggressive(&job.trigger_text);
    let already_sent = store.fallback_texts_sent(&job.match_id).await?;
    let Some(text) = select_message(&settings, job.tier, lang, aggressive, &already_sent) else {
        return Ok(FireResult::Dropped);
    };

    let (text, flagged) = match safety::scan(&text) {
        Some(category) => {
            let event = SafetyEvent {
                bot_id: job.bot_id.clone(),
                match_id: job.match_id.clone(),
                user_id: job.user_id.clone(),
                category,
                content: text.clone(),
                created_at: now,
            };
            let _ = store.insert_safety_event(event).await;
            (safety::canned_substitute(lang).to_string(), true)
        }
        None => (text, false),
    };

    store
        .insert_message(MessageRow {
            id: format!("{}-msg", job.id),
            match_id: job.match_id.clone(),
            sender_id: job.bot_id.clone(),
            text: text.clone(),
            kind: MessageKind::Fallback,
            created_at: now,
            read_at: None,
        })
        .await?;

    // Deferred sends refresh cooldown only now, when they actually fire.
    telemetry::record_send(
        store.as_ref(),
        &job.bot_id,
        &job.match_id,
        &job.user_id,
        0,
        flagged,
        None,
        now,
    )
    .await;

    Ok(FireResult::Sent)
}

/// Drain everything due at `now`. Returns (sent, dropped).
pub async fn run_once(
    store: &DynStore,
    aggression: &AggressionDetector,
    now: DateTime<Utc>,
) -> (u64, u64) {
    let due = match store.due_fallback_jobs(now).await {
        Ok(jobs) => jobs,
        Err(err) => {
            tracing::warn!(target: "fallback", error = %err, "due-job query failed");
            return (0, 0);
        }
    };

    let mut sent = 0u64;
    let mut dropped = 0u64;
    for job in due {
        // Remove first: at-most-once per job.
        if let Err(err) = store.remove_fallback_job(&job.id).await {
            tracing::warn!(target: "fallback", error = %err, "job remove failed");
            continue;
        }
        match fire_job(store, aggression, &job, now).await {
            Ok(FireResult::Sent) => {
                sent += 1;
                counter!("fallback_jobs_fired_total").increment(1);
            }
            Ok(FireResult::Dropped) => {
                dropped += 1;
                counter!("fallback_jobs_dropped_total").increment(1);
                tracing::debug!(
                    target: "fallback",
                    id = %anon_id(&job.match_id),
                    tier = job.tier.as_str(),
                    "stale job dropped"
                );
            }
            Err(err) => {
                tracing::warn!(target: "fallback", error = %err, "job execution failed");
            }
        }
    }
    (sent, dropped)
}

/// Spawn the polling worker. One instance per process is enough; the
/// remove-before-fire step keeps overlapping instances from double-sending.
pub fn spawn_fallback_worker(
    store: DynStore,
    aggression: Arc<AggressionDetector>,
    interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let now = Utc::now();
            let (sent, dropped) = run_once(&store, &aggression, now).await;
            gauge!("fallback_worker_last_run_ts").set(now.timestamp() as f64);
            if sent + dropped > 0 {
                tracing::info!(target: "fallback", sent, dropped, "worker tick");
            }
        }
    })
}
