//! store.rs — the seam to the hosted relational backend.
//!
//! Every read the gates and resolvers need, and every write the engine
//! performs, goes through the `Store` trait so the orchestration stays
//! stateless across request instances. `MemoryStore` is the local/test
//! backend and the reference semantics for upserts and the assignment
//! uniqueness constraint.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::model::{
    BotConfig, CooldownRow, Experiment, ExperimentAssignment, FallbackJob, FallbackSettings,
    GlobalConfig, GroupConfig, HandoffRow, HealthDaily, MatchRow, MessageKind, MessageRow,
    ProfileRow, QuarantineRow, ReplyOverride, SafetyEvent, UsageRecord,
};

/// Convenient alias used by callers.
pub type DynStore = Arc<dyn Store>;

#[async_trait]
pub trait Store: Send + Sync {
    // --- identity ---
    async fn get_match(&self, match_id: &str) -> anyhow::Result<Option<MatchRow>>;
    async fn get_profile(&self, user_id: &str) -> anyhow::Result<Option<ProfileRow>>;

    // --- configuration ---
    async fn get_bot_config(&self, bot_id: &str) -> anyhow::Result<Option<BotConfig>>;
    async fn get_group_config(&self, group_id: &str) -> anyhow::Result<Option<GroupConfig>>;
    async fn get_global_config(&self) -> anyhow::Result<Option<GlobalConfig>>;
    async fn get_fallback_settings(&self) -> anyhow::Result<Option<FallbackSettings>>;

    // --- gate inputs ---
    async fn get_reply_override(&self, match_id: &str) -> anyhow::Result<Option<ReplyOverride>>;
    async fn get_quarantine(&self, user_id: &str) -> anyhow::Result<Option<QuarantineRow>>;
    async fn get_handoff(&self, match_id: &str, bot_id: &str)
        -> anyhow::Result<Option<HandoffRow>>;
    async fn get_cooldown(&self, bot_id: &str, user_id: &str)
        -> anyhow::Result<Option<CooldownRow>>;
    async fn upsert_cooldown(
        &self,
        bot_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()>;
    /// Bot-authored message count since `since`, across all conversations.
    /// Feeds the daily-cap gate.
    async fn bot_message_count_since(
        &self,
        bot_id: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<u64>;

    // --- messages ---
    /// Most recent messages of a conversation, chronological (oldest first).
    async fn recent_messages(
        &self,
        match_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<MessageRow>>;
    async fn insert_message(&self, row: MessageRow) -> anyhow::Result<()>;
    /// Stamp `read_at` on every unread message in `match_id` authored by
    /// `sender_id`. Best-effort at call sites.
    async fn mark_messages_read(
        &self,
        match_id: &str,
        sender_id: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()>;
    /// Texts of fallback-kind messages already sent in a conversation,
    /// for selection dedup.
    async fn fallback_texts_sent(&self, match_id: &str) -> anyhow::Result<Vec<String>>;

    // --- experiments ---
    async fn active_experiments(&self) -> anyhow::Result<Vec<Experiment>>;
    async fn get_assignment(
        &self,
        match_id: &str,
    ) -> anyhow::Result<Option<ExperimentAssignment>>;
    /// First assignment wins: when a row already exists for the conversation
    /// the stored one is returned and the candidate discarded. Backed by a
    /// uniqueness constraint on `match_id`, not best effort.
    async fn create_assignment(
        &self,
        assignment: ExperimentAssignment,
    ) -> anyhow::Result<ExperimentAssignment>;

    // --- telemetry ---
    async fn insert_safety_event(&self, event: SafetyEvent) -> anyhow::Result<()>;
    /// Read-then-write increment of the (bot, day) health row.
    async fn bump_health_daily(
        &self,
        bot_id: &str,
        day: NaiveDate,
        latency_ms: u64,
        safety_flagged: bool,
    ) -> anyhow::Result<()>;
    async fn insert_usage(&self, record: UsageRecord) -> anyhow::Result<()>;

    // --- fallback job queue ---
    async fn enqueue_fallback_job(&self, job: FallbackJob) -> anyhow::Result<()>;
    async fn due_fallback_jobs(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<FallbackJob>>;
    async fn remove_fallback_job(&self, job_id: &str) -> anyhow::Result<()>;
}

#[derive(Default)]
struct Inner {
    matches: HashMap<String, MatchRow>,
    profiles: HashMap<String, ProfileRow>,
    bot_configs: HashMap<String, BotConfig>,
    group_configs: HashMap<String, GroupConfig>,
    global_config: Option<GlobalConfig>,
    fallback_settings: Option<FallbackSettings>,
    reply_overrides: HashMap<String, ReplyOverride>,
    quarantines: HashMap<String, QuarantineRow>,
    handoffs: HashMap<(String, String), HandoffRow>,
    cooldowns: HashMap<(String, String), CooldownRow>,
    messages: Vec<MessageRow>,
    experiments: Vec<Experiment>,
    assignments: HashMap<String, ExperimentAssignment>,
    safety_events: Vec<SafetyEvent>,
    health: HashMap<(String, NaiveDate), HealthDaily>,
    usage: Vec<UsageRecord>,
    fallback_jobs: HashMap<String, FallbackJob>,
}

/// In-memory backend. All maps behind one `RwLock`, which also gives the
/// assignment constraint its atomicity.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- seeding helpers for tests and local runs ---

    pub fn seed_match(&self, row: MatchRow) {
        let mut g = self.inner.write().expect("store lock");
        g.matches.insert(row.id.clone(), row);
    }

    pub fn seed_profile(&self, row: ProfileRow) {
        let mut g = self.inner.write().expect("store lock");
        g.profiles.insert(row.id.clone(), row);
    }

    pub fn seed_bot_config(&self, row: BotConfig) {
        let mut g = self.inner.write().expect("store lock");
        g.bot_configs.insert(row.bot_id.clone(), row);
    }

    pub fn seed_group_config(&self, row: GroupConfig) {
        let mut g = self.inner.write().expect("store lock");
        g.group_configs.insert(row.id.clone(), row);
    }

    pub fn seed_global_config(&self, row: GlobalConfig) {
        self.inner.write().expect("store lock").global_config = Some(row);
    }

    pub fn seed_fallback_settings(&self, row: FallbackSettings) {
        self.inner.write().expect("store lock").fallback_settings = Some(row);
    }

    pub fn seed_reply_override(&self, row: ReplyOverride) {
        let mut g = self.inner.write().expect("store lock");
        g.reply_overrides.insert(row.match_id.clone(), row);
    }

    pub fn seed_quarantine(&self, row: QuarantineRow) {
        let mut g = self.inner.write().expect("store lock");
        g.quarantines.insert(row.user_id.clone(), row);
    }

    pub fn seed_handoff(&self, row: HandoffRow) {
        let mut g = self.inner.write().expect("store lock");
        g.handoffs
            .insert((row.match_id.clone(), row.bot_id.clone()), row);
    }

    pub fn seed_cooldown(&self, row: CooldownRow) {
        let mut g = self.inner.write().expect("store lock");
        g.cooldowns
            .insert((row.bot_id.clone(), row.user_id.clone()), row);
    }

    pub fn seed_message(&self, row: MessageRow) {
        self.inner.write().expect("store lock").messages.push(row);
    }

    pub fn seed_experiment(&self, row: Experiment) {
        self.inner.write().expect("store lock").experiments.push(row);
    }

    // --- inspection helpers for tests ---

    pub fn messages_snapshot(&self) -> Vec<MessageRow> {
        self.inner.read().expect("store lock").messages.clone()
    }

    pub fn safety_events_snapshot(&self) -> Vec<SafetyEvent> {
        self.inner.read().expect("store lock").safety_events.clone()
    }

    pub fn health_snapshot(&self) -> Vec<HealthDaily> {
        let g = self.inner.read().expect("store lock");
        g.health.values().cloned().collect()
    }

    pub fn usage_snapshot(&self) -> Vec<UsageRecord> {
        self.inner.read().expect("store lock").usage.clone()
    }

    pub fn cooldown_snapshot(&self, bot_id: &str, user_id: &str) -> Option<CooldownRow> {
        let g = self.inner.read().expect("store lock");
        g.cooldowns
            .get(&(bot_id.to_string(), user_id.to_string()))
            .cloned()
    }

    pub fn fallback_jobs_snapshot(&self) -> Vec<FallbackJob> {
        let g = self.inner.read().expect("store lock");
        g.fallback_jobs.values().cloned().collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_match(&self, match_id: &str) -> anyhow::Result<Option<MatchRow>> {
        Ok(self
            .inner
            .read()
            .expect("store lock")
            .matches
            .get(match_id)
            .cloned())
    }

    async fn get_profile(&self, user_id: &str) -> anyhow::Result<Option<ProfileRow>> {
        Ok(self
            .inner
            .read()
            .expect("store lock")
            .profiles
            .get(user_id)
            .cloned())
    }

    async fn get_bot_config(&self, bot_id: &str) -> anyhow::Result<Option<BotConfig>> {
        Ok(self
            .inner
            .read()
            .expect("store lock")
            .bot_configs
            .get(bot_id)
            .cloned())
    }

    async fn get_group_config(&self, group_id: &str) -> anyhow::Result<Option<GroupConfig>> {
        Ok(self
            .inner
            .read()
            .expect("store lock")
            .group_configs
            .get(group_id)
            .cloned())
    }

    async fn get_global_config(&self) -> anyhow::Result<Option<GlobalConfig>> {
        Ok(self.inner.read().expect("store lock").global_config.clone())
    }

    async fn get_fallback_settings(&self) -> anyhow::Result<Option<FallbackSettings>> {
        Ok(self
            .inner
            .read()
            .expect("store lock")
            .fallback_settings
            .clone())
    }

    async fn get_reply_override(&self, match_id: &str) -> anyhow::Result<Option<ReplyOverride>> {
        Ok(self
            .inner
            .read()
            .expect("store lock")
            .reply_overrides
            .get(match_id)
            .cloned())
    }

    async fn get_quarantine(&self, user_id: &str) -> anyhow::Result<Option<QuarantineRow>> {
        Ok(self
            .inner
            .read()
            .expect("store lock")
            .quarantines
            .get(user_id)
            .cloned())
    }

    async fn get_handoff(
        &self,
        match_id: &str,
        bot_id: &str,
    ) -> anyhow::Result<Option<HandoffRow>> {
        Ok(self
            .inner
            .read()
            .expect("store lock")
            .handoffs
            .get(&(match_id.to_string(), bot_id.to_string()))
            .cloned())
    }

    async fn get_cooldown(
        &self,
        bot_id: &str,
        user_id: &str,
    ) -> anyhow::Result<Option<CooldownRow>> {
        Ok(self
            .inner
            .read()
            .expect("store lock")
            .cooldowns
            .get(&(bot_id.to_string(), user_id.to_string()))
            .cloned())
    }

    async fn upsert_cooldown(
        &self,
        bot_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut g = self.inner.write().expect("store lock");
        g.cooldowns.insert(
            (bot_id.to_string(), user_id.to_string()),
            CooldownRow {
                bot_id: bot_id.to_string(),
                user_id: user_id.to_string(),
                last_sent_at: at,
            },
        );
        Ok(())
    }

    async fn bot_message_count_since(
        &self,
        bot_id: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let g = self.inner.read().expect("store lock");
        Ok(g.messages
            .iter()
            .filter(|m| m.sender_id == bot_id && m.created_at >= since)
            .count() as u64)
    }

    async fn recent_messages(
        &self,
        match_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<MessageRow>> {
        let g = self.inner.read().expect("store lock");
        let mut rows: Vec<MessageRow> = g
            .messages
            .iter()
            .filter(|m| m.match_id == match_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.created_at);
        if rows.len() > limit {
            rows.drain(..rows.len() - limit);
        }
        Ok(rows)
    }

    async fn insert_message(&self, row: MessageRow) -> anyhow::Result<()> {
        self.inner.write().expect("store lock").messages.push(row);
        Ok(())
    }

    async fn mark_messages_read(
        &self,
        match_id: &str,
        sender_id: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut g = self.inner.write().expect("store lock");
        for m in g.messages.iter_mut() {
            if m.match_id == match_id && m.sender_id == sender_id && m.read_at.is_none() {
                m.read_at = Some(at);
            }
        }
        Ok(())
    }

    async fn fallback_texts_sent(&self, match_id: &str) -> anyhow::Result<Vec<String>> {
        let g = self.inner.read().expect("store lock");
        Ok(g.messages
            .iter()
            .filter(|m| m.match_id == match_id && m.kind == MessageKind::Fallback)
            .map(|m| m.text.clone())
            .collect())
    }

    async fn active_experiments(&self) -> anyhow::Result<Vec<Experiment>> {
        let g = self.inner.read().expect("store lock");
        Ok(g.experiments.iter().filter(|e| e.active).cloned().collect())
    }

    async fn get_assignment(
        &self,
        match_id: &str,
    ) -> anyhow::Result<Option<ExperimentAssignment>> {
        Ok(self
            .inner
            .read()
            .expect("store lock")
            .assignments
            .get(match_id)
            .cloned())
    }

    async fn create_assignment(
        &self,
        assignment: ExperimentAssignment,
    ) -> anyhow::Result<ExperimentAssignment> {
        let mut g = self.inner.write().expect("store lock");
        // Uniqueness by match_id: the entry API makes read-or-create atomic
        // under the store lock, mirroring the backend's unique index.
        let stored = g
            .assignments
            .entry(assignment.match_id.clone())
            .or_insert(assignment);
        Ok(stored.clone())
    }

    async fn insert_safety_event(&self, event: SafetyEvent) -> anyhow::Result<()> {
        self.inner
            .write()
            .expect("store lock")
            .safety_events
            .push(event);
        Ok(())
    }

    async fn bump_health_daily(
        &self,
        bot_id: &str,
        day: NaiveDate,
        latency_ms: u64,
        safety_flagged: bool,
    ) -> anyhow::Result<()> {
        let mut g = self.inner.write().expect("store lock");
        let row = g
            .health
            .entry((bot_id.to_string(), day))
            .or_insert_with(|| HealthDaily {
                bot_id: bot_id.to_string(),
                day,
                replies: 0,
                latency_ms: 0,
                safety_flags: 0,
            });
        row.replies += 1;
        row.latency_ms += latency_ms;
        if safety_flagged {
            row.safety_flags += 1;
        }
        Ok(())
    }

    async fn insert_usage(&self, record: UsageRecord) -> anyhow::Result<()> {
        self.inner.write().expect("store lock").usage.push(record);
        Ok(())
    }

    async fn enqueue_fallback_job(&self, job: FallbackJob) -> anyhow::Result<()> {
        let mut g = self.inner.write().expect("store lock");
        g.fallback_jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn due_fallback_jobs(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<FallbackJob>> {
        let g = self.inner.read().expect("store lock");
        let mut due: Vec<FallbackJob> = g
            .fallback_jobs
            .values()
            .filter(|j| j.fire_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|j| j.fire_at);
        Ok(due)
    }

    async fn remove_fallback_job(&self, job_id: &str) -> anyhow::Result<()> {
        self.inner
            .write()
            .expect("store lock")
            .fallback_jobs
            .remove(job_id);
        Ok(())
    }
}
