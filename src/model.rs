//! model.rs — row records for the hosted relational backend.
//!
//! The engine treats every entity here as a data-transfer record: rows are
//! fetched, merged and written back through the `Store` seam, never owned.
//! Optional fields are explicit (`Option<T>`) so the config cascade in
//! `settings.rs` can merge them deterministically instead of relying on
//! ad hoc per-call fallbacks.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::language::Lang;

/// Engagement intensity drives completion temperature and output budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    Medium,
    High,
}

impl Intensity {
    pub fn temperature(self) -> f32 {
        match self {
            Intensity::Low => 0.6,
            Intensity::Medium => 0.8,
            Intensity::High => 0.9,
        }
    }

    pub fn max_tokens(self) -> u32 {
        match self {
            Intensity::Low => 120,
            Intensity::Medium => 200,
            Intensity::High => 300,
        }
    }
}

/// Message kind as persisted; scheduled pool replies are tagged `fallback`
/// so later selection can dedup against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Fallback,
}

/// A conversation between exactly two participants, one human and one bot.
/// Created by the matching flow; read-only to this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRow {
    pub id: String,
    pub user_a: String,
    pub user_b: String,
}

impl MatchRow {
    pub fn participants(&self) -> [&str; 2] {
        [self.user_a.as_str(), self.user_b.as_str()]
    }
}

/// Minimal profile projection: the engine only needs the bot flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    pub is_bot: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub match_id: String,
    pub sender_id: String,
    pub text: String,
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

/// UTC hour allow-list plus an optional daily output cap.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_hours: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_message_limit: Option<u32>,
}

/// Per-bot behavior settings, mutated by admin tooling only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    pub bot_id: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Opt-in for inheriting group/global settings. Absent means true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_global: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement_intensity: Option<Intensity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_receipt_delay_secs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_secs: Option<i64>,
    /// Persona instruction: who this bot is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personality_prompt: Option<String>,
    /// Extra per-bot prompt appended after group/global fragments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personal_prompt: Option<String>,
    /// Short profile summary surfaced to the model (age, city, interests).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

/// Shared settings a `BotConfig` may reference via `group_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupConfig {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement_intensity: Option<Intensity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_receipt_delay_secs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

/// Singleton fallback row: defaults when neither bot nor group specifies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement_intensity: Option<Intensity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_receipt_delay_secs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

/// Conversation-level admin kill switch. `bot_enabled == false` suppresses
/// automated replies for the whole conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyOverride {
    pub match_id: String,
    pub bot_enabled: bool,
}

/// Suppresses automated replies to one human account across conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineRow {
    pub user_id: String,
    pub active: bool,
}

/// A human moderator has taken over one bot conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffRow {
    pub match_id: String,
    pub bot_id: String,
    pub active: bool,
}

/// Last automated send per (bot, human) pair; drives the cooldown gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownRow {
    pub bot_id: String,
    pub user_id: String,
    pub last_sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ExperimentTarget {
    Global,
    Bot(String),
    Group(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentVariant {
    pub id: String,
    pub prompt: String,
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub target: ExperimentTarget,
    pub active: bool,
    pub variants: Vec<ExperimentVariant>,
}

/// Immutable once written: first assignment wins per conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentAssignment {
    pub match_id: String,
    pub experiment_id: String,
    pub variant_id: String,
    pub assigned_at: DateTime<Utc>,
}

/// Escalating delay/message buckets keyed to the unanswered-message streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackTier {
    Group1,
    Group2,
    Group3,
}

impl FallbackTier {
    /// streak <= 1 → group1, streak == 2 → group2, streak >= 3 → group3.
    pub fn from_streak(streak: usize) -> Self {
        match streak {
            0 | 1 => FallbackTier::Group1,
            2 => FallbackTier::Group2,
            _ => FallbackTier::Group3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FallbackTier::Group1 => "group1",
            FallbackTier::Group2 => "group2",
            FallbackTier::Group3 => "group3",
        }
    }
}

/// Per-language message pool for one tier, split so that aggressive inbound
/// messages draw neutral (de-escalating) lines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolPair {
    #[serde(default)]
    pub normal: Vec<String>,
    #[serde(default)]
    pub neutral: Vec<String>,
}

/// One tier's pools keyed by language code ("tr", "en", "de", "fr", "ar").
pub type TierPools = HashMap<String, PoolPair>;

fn default_group1_delay() -> i64 {
    300
}
fn default_group2_delay() -> i64 {
    600
}

/// Singleton configuration blob for the tiered fallback system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackSettings {
    pub enabled: bool,
    #[serde(default = "default_group1_delay")]
    pub group1_delay_secs: i64,
    #[serde(default = "default_group2_delay")]
    pub group2_delay_secs: i64,
    #[serde(default)]
    pub group3_delay_secs: i64,
    #[serde(default)]
    pub group1: TierPools,
    #[serde(default)]
    pub group2: TierPools,
    #[serde(default)]
    pub group3: TierPools,
    /// Legacy single-message fields per language, honored when a tier pool
    /// has no candidates for the detected language.
    #[serde(default)]
    pub legacy_messages: HashMap<String, String>,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            group1_delay_secs: default_group1_delay(),
            group2_delay_secs: default_group2_delay(),
            group3_delay_secs: 0,
            group1: TierPools::new(),
            group2: TierPools::new(),
            group3: TierPools::new(),
            legacy_messages: HashMap::new(),
        }
    }
}

impl FallbackSettings {
    pub fn delay_secs(&self, tier: FallbackTier) -> i64 {
        match tier {
            FallbackTier::Group1 => self.group1_delay_secs,
            FallbackTier::Group2 => self.group2_delay_secs,
            FallbackTier::Group3 => self.group3_delay_secs,
        }
    }

    pub fn pools(&self, tier: FallbackTier) -> &TierPools {
        match tier {
            FallbackTier::Group1 => &self.group1,
            FallbackTier::Group2 => &self.group2,
            FallbackTier::Group3 => &self.group3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyCategory {
    Phone,
    Email,
    Crypto,
    Url,
    Aggression,
}

/// Append-only audit row; one per detection, inbound or outbound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyEvent {
    pub bot_id: String,
    pub match_id: String,
    pub user_id: String,
    pub category: SafetyCategory,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One row per (bot, calendar day); upserted, never replaced wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDaily {
    pub bot_id: String,
    pub day: NaiveDate,
    pub replies: u64,
    pub latency_ms: u64,
    pub safety_flags: u64,
}

/// Append-only token accounting per completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub bot_id: String,
    pub match_id: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub created_at: DateTime<Utc>,
}

/// Durable pending-fallback record. Persisted instead of relying on an
/// in-process timer, so a replaced instance cannot lose the scheduled send;
/// the worker re-validates tier and recency at fire time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackJob {
    pub id: String,
    pub match_id: String,
    pub bot_id: String,
    pub user_id: String,
    pub tier: FallbackTier,
    /// The inbound text that triggered scheduling; drives aggression
    /// classification at fire time.
    pub trigger_text: String,
    /// Effective language at trigger time (fixed mode already applied), so
    /// a fixed-language bot never draws from the wrong pool at fire time.
    pub lang: Lang,
    pub trigger_at: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
}
