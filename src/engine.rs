//! # Reply Orchestration Engine
//! The one pipeline with real branching: authorization → config cascade →
//! gate chain → experiment assignment → safety scan → synthesis (or tiered
//! fallback) → persistence → telemetry. Everything is re-derived from store
//! reads per request; no in-process state survives between calls.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use tracing::info;

use crate::ai_adapter::{CompletionRequest, DynCompletionClient};
use crate::config::EngineConfig;
use crate::experiment::resolve_variant_prompt;
use crate::fallback::{build_job, select_message, streak};
use crate::gates::{run_gates, SkipReason};
use crate::language::{detect, AggressionDetector, Lang};
use crate::model::{
    FallbackTier, MatchRow, MessageKind, MessageRow, SafetyCategory, SafetyEvent,
};
use crate::prompt::{build_history, build_system_prompt};
use crate::settings::resolve_settings;
use crate::store::{DynStore, Store};
use crate::{safety, telemetry};

/// Inbound request after the HTTP edge has validated field presence.
/// `caller_id` comes from the session layer, never the body.
#[derive(Debug, Clone)]
pub struct ReplyRequest {
    pub match_id: String,
    pub bot_id: String,
    pub caller_id: String,
    pub message_text: String,
}

/// The single decision the engine exposes to its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    Skipped(SkipReason),
    Scheduled { tier: FallbackTier, delay_secs: i64 },
    /// Fallback system globally disabled while synthesis is unavailable.
    Disabled,
    /// Immediate-tier pool exhausted: nothing to send, nothing scheduled.
    Silent,
    Reply(String),
}

#[derive(Debug)]
pub enum EngineError {
    /// Caller is not a participant of the conversation.
    Unauthorized(&'static str),
    /// Participant shape or bot identity mismatch.
    Forbidden(&'static str),
    Internal(anyhow::Error),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::Internal(err) => write!(f, "internal: {err}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err)
    }
}

pub struct ReplyEngine {
    store: DynStore,
    ai: DynCompletionClient,
    config: Arc<EngineConfig>,
    aggression: AggressionDetector,
}

impl ReplyEngine {
    pub fn new(store: DynStore, ai: DynCompletionClient, config: Arc<EngineConfig>) -> Self {
        let aggression = AggressionDetector::new(&config.aggression.words);
        Self {
            store,
            ai,
            config,
            aggression,
        }
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn aggression(&self) -> &AggressionDetector {
        &self.aggression
    }

    /// Server-side participant check: the conversation must contain exactly
    /// one bot, that bot must be the addressed one, and the human slot must
    /// be the caller. No side effects on any violation.
    async fn authorize(&self, req: &ReplyRequest) -> Result<MatchRow, EngineError> {
        let row = self
            .store
            .get_match(&req.match_id)
            .await?
            .ok_or(EngineError::Unauthorized("unknown conversation"))?;

        if !row.participants().contains(&req.caller_id.as_str()) {
            return Err(EngineError::Unauthorized("caller is not a participant"));
        }

        let mut bot_ids = Vec::new();
        let mut human_ids = Vec::new();
        for id in row.participants() {
            let profile = self
                .store
                .get_profile(id)
                .await?
                .ok_or(EngineError::Forbidden("participant has no profile"))?;
            if profile.is_bot {
                bot_ids.push(profile.id);
            } else {
                human_ids.push(profile.id);
            }
        }
        if bot_ids.len() != 1 {
            return Err(EngineError::Forbidden("conversation is not human-bot"));
        }
        if bot_ids[0] != req.bot_id {
            return Err(EngineError::Forbidden("bot is not a participant"));
        }
        if human_ids[0] != req.caller_id {
            return Err(EngineError::Forbidden("caller does not own this side"));
        }
        Ok(row)
    }

    async fn log_safety_event(&self, req: &ReplyRequest, category: SafetyCategory, content: &str) {
        let event = SafetyEvent {
            bot_id: req.bot_id.clone(),
            match_id: req.match_id.clone(),
            user_id: req.caller_id.clone(),
            category,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        if let Err(err) = self.store.insert_safety_event(event).await {
            tracing::warn!(error = %err, "safety event insert failed");
        }
    }

    pub async fn handle(&self, req: ReplyRequest) -> Result<ReplyOutcome, EngineError> {
        let started = Instant::now();
        let now = Utc::now();

        self.authorize(&req).await?;

        // A bot with no config row never answers.
        let Some(bot) = self.store.get_bot_config(&req.bot_id).await? else {
            telemetry::record_skip(SkipReason::Inactive);
            return Ok(ReplyOutcome::Skipped(SkipReason::Inactive));
        };
        let group = match bot.group_id.as_deref() {
            Some(gid) => self.store.get_group_config(gid).await?,
            None => None,
        };
        let global = self.store.get_global_config().await?;

        if let Some(reason) = run_gates(
            self.store.as_ref(),
            &req.match_id,
            &req.caller_id,
            &bot,
            group.as_ref(),
            global.as_ref(),
            self.config.default_cooldown_secs,
            now,
        )
        .await?
        {
            telemetry::record_skip(reason);
            info!(
                target: "reply",
                id = %anon_id(&req.match_id),
                reason = reason.as_str(),
                "gate skip"
            );
            return Ok(ReplyOutcome::Skipped(reason));
        }

        let settings = resolve_settings(&bot, group.as_ref(), global.as_ref());
        let lang = effective_lang(&settings.language_mode, &req.message_text);

        let experiment_prompt = resolve_variant_prompt(
            self.store.as_ref(),
            &req.match_id,
            &req.bot_id,
            bot.group_id.as_deref(),
        )
        .await?;

        // Inbound scan: log only, never blocks the message.
        let inbound_hit = safety::scan(&req.message_text);
        if let Some(category) = inbound_hit {
            self.log_safety_event(&req, category, &req.message_text)
                .await;
        }
        if self.aggression.is_aggressive(&req.message_text) {
            self.log_safety_event(&req, SafetyCategory::Aggression, &req.message_text)
                .await;
        }

        let history = self
            .store
            .recent_messages(&req.match_id, self.config.history_cap)
            .await?;

        let completion_req = CompletionRequest {
            system: build_system_prompt(
                &bot,
                group.as_ref(),
                global.as_ref(),
                experiment_prompt.as_deref(),
                &settings,
                lang,
            ),
            turns: build_history(&history, &req.bot_id, &req.message_text),
            temperature: settings.engagement_intensity.temperature(),
            max_tokens: settings.engagement_intensity.max_tokens(),
        };

        match self.ai.complete(&completion_req).await {
            Some(completion) => {
                // Outbound scan forces the canned substitute before persisting.
                let outbound_hit = safety::scan(&completion.text);
                let reply_text = match outbound_hit {
                    Some(category) => {
                        self.log_safety_event(&req, category, &completion.text)
                            .await;
                        safety::canned_substitute(lang).to_string()
                    }
                    None => completion.text.clone(),
                };

                self.store
                    .insert_message(MessageRow {
                        id: message_id(&req.match_id, now),
                        match_id: req.match_id.clone(),
                        sender_id: req.bot_id.clone(),
                        text: reply_text.clone(),
                        kind: MessageKind::Text,
                        created_at: now,
                        read_at: None,
                    })
                    .await?;

                // Read receipt: best-effort; the stamp is shifted by the
                // effective delay so the client shows "read" only then.
                if settings.read_receipt_delay_secs > 0 {
                    let read_at =
                        now + Duration::seconds(i64::from(settings.read_receipt_delay_secs));
                    let _ = self
                        .store
                        .mark_messages_read(&req.match_id, &req.caller_id, read_at)
                        .await;
                }

                telemetry::record_send(
                    self.store.as_ref(),
                    &req.bot_id,
                    &req.match_id,
                    &req.caller_id,
                    started.elapsed().as_millis() as u64,
                    inbound_hit.is_some() || outbound_hit.is_some(),
                    Some(&completion),
                    now,
                )
                .await;

                info!(
                    target: "reply",
                    id = %anon_id(&req.match_id),
                    provider = self.ai.provider_name(),
                    lang = lang.code(),
                    "reply sent"
                );
                Ok(ReplyOutcome::Reply(reply_text))
            }
            None => {
                self.fallback_path(&req, &history, lang, inbound_hit.is_some(), started)
                    .await
            }
        }
    }

    /// Synthesis unavailable: route through the tiered static-message system.
    async fn fallback_path(
        &self,
        req: &ReplyRequest,
        history: &[MessageRow],
        lang: Lang,
        inbound_flagged: bool,
        started: Instant,
    ) -> Result<ReplyOutcome, EngineError> {
        let settings = self
            .store
            .get_fallback_settings()
            .await?
            .unwrap_or_default();
        if !settings.enabled {
            return Ok(ReplyOutcome::Disabled);
        }

        let tier = FallbackTier::from_streak(streak(history, &req.bot_id));
        let delay_secs = settings.delay_secs(tier);
        let now = Utc::now();

        if delay_secs > 0 {
            let job = build_job(
                &req.match_id,
                &req.bot_id,
                &req.caller_id,
                tier,
                &req.message_text,
                lang,
                now,
                delay_secs,
            );
            self.store.enqueue_fallback_job(job).await?;
            telemetry::record_scheduled_fallback();
            info!(
                target: "reply",
                id = %anon_id(&req.match_id),
                tier = tier.as_str(),
                delay_secs,
                "fallback scheduled"
            );
            return Ok(ReplyOutcome::Scheduled { tier, delay_secs });
        }

        // Immediate tier: pick, substitute if unsafe, persist, account.
        let already_sent = self.store.fallback_texts_sent(&req.match_id).await?;
        let aggressive = self.aggression.is_aggressive(&req.message_text);
        let Some(text) = select_message(&settings, tier, lang, aggressive, &already_sent) else {
            return Ok(ReplyOutcome::Silent);
        };
        let (text, outbound_flagged) = match safety::scan(&text) {
            Some(category) => {
                self.log_safety_event(req, category, &text).await;
                (safety::canned_substitute(lang).to_string(), true)
            }
            None => (text, false),
        };

        self.store
            .insert_message(MessageRow {
                id: message_id(&req.match_id, now),
                match_id: req.match_id.clone(),
                sender_id: req.bot_id.clone(),
                text: text.clone(),
                kind: MessageKind::Fallback,
                created_at: now,
                read_at: None,
            })
            .await?;

        telemetry::record_send(
            self.store.as_ref(),
            &req.bot_id,
            &req.match_id,
            &req.caller_id,
            started.elapsed().as_millis() as u64,
            inbound_flagged || outbound_flagged,
            None,
            now,
        )
        .await;

        Ok(ReplyOutcome::Reply(text))
    }
}

/// Fixed language mode maps straight to a code; "auto" classifies the text.
pub fn effective_lang(mode: &str, text: &str) -> Lang {
    match mode {
        "tr" => Lang::Tr,
        "en" => Lang::En,
        "de" => Lang::De,
        "fr" => Lang::Fr,
        "ar" => Lang::Ar,
        _ => detect(text),
    }
}

fn message_id(match_id: &str, now: chrono::DateTime<Utc>) -> String {
    format!("msg-{}-{}", match_id, now.timestamp_micros())
}

/// Anonymized conversation id for logs; raw ids and texts are never logged.
pub fn anon_id(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_lang_respects_fixed_mode() {
        assert_eq!(effective_lang("de", "hello how are you"), Lang::De);
        assert_eq!(effective_lang("auto", "hello how are you"), Lang::En);
        assert_eq!(effective_lang("auto", "zzz qqq"), Lang::Und);
    }

    #[test]
    fn anon_id_is_stable_and_short() {
        assert_eq!(anon_id("match-1"), anon_id("match-1"));
        assert_eq!(anon_id("match-1").len(), 12);
        assert_ne!(anon_id("match-1"), anon_id("match-2"));
    }
}
