//! settings.rs — the four-layer behavior-settings cascade.
//!
//! One `use_global` switch picks the primary source for *all* fields
//! (group-or-global when opted in, the bot itself when opted out); the
//! fallback below the primary is uniform per field: global, then hard
//! defaults. This coupling is documented product behavior, not a bug —
//! do not make the strategy per-field.

use serde::Serialize;

use crate::model::{BotConfig, GlobalConfig, GroupConfig, Intensity, Schedule};

pub const DEFAULT_TONE: &str = "playful";
pub const DEFAULT_LANGUAGE_MODE: &str = "auto";
pub const DEFAULT_READ_RECEIPT_DELAY_SECS: u32 = 10;

/// Which layer is consulted first for every behavior field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// `use_global` (default): group settings when the bot belongs to a
    /// group, otherwise global.
    GroupFirst,
    /// Bot opted out of inheritance: its own settings lead.
    SelfFirst,
}

impl ResolutionStrategy {
    pub fn for_bot(bot: &BotConfig) -> Self {
        if bot.use_global.unwrap_or(true) {
            ResolutionStrategy::GroupFirst
        } else {
            ResolutionStrategy::SelfFirst
        }
    }
}

/// The merged tuple every downstream component consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveSettings {
    pub tone: String,
    pub language_mode: String,
    pub engagement_intensity: Intensity,
    pub read_receipt_delay_secs: u32,
}

impl Default for EffectiveSettings {
    fn default() -> Self {
        Self {
            tone: DEFAULT_TONE.to_string(),
            language_mode: DEFAULT_LANGUAGE_MODE.to_string(),
            engagement_intensity: Intensity::Medium,
            read_receipt_delay_secs: DEFAULT_READ_RECEIPT_DELAY_SECS,
        }
    }
}

fn pick<T: Clone>(primary: Option<T>, global: Option<T>, default: T) -> T {
    primary.or(global).unwrap_or(default)
}

/// Merge bot/group/global rows into one effective settings tuple.
pub fn resolve_settings(
    bot: &BotConfig,
    group: Option<&GroupConfig>,
    global: Option<&GlobalConfig>,
) -> EffectiveSettings {
    let strategy = ResolutionStrategy::for_bot(bot);

    // Primary layer as (tone, language_mode, intensity, read_receipt_delay).
    let (p_tone, p_lang, p_int, p_delay) = match strategy {
        ResolutionStrategy::SelfFirst => (
            bot.tone.clone(),
            bot.language_mode.clone(),
            bot.engagement_intensity,
            bot.read_receipt_delay_secs,
        ),
        ResolutionStrategy::GroupFirst => match group {
            Some(g) => (
                g.tone.clone(),
                g.language_mode.clone(),
                g.engagement_intensity,
                g.read_receipt_delay_secs,
            ),
            None => (
                global.and_then(|g| g.tone.clone()),
                global.and_then(|g| g.language_mode.clone()),
                global.and_then(|g| g.engagement_intensity),
                global.and_then(|g| g.read_receipt_delay_secs),
            ),
        },
    };

    EffectiveSettings {
        tone: pick(
            p_tone,
            global.and_then(|g| g.tone.clone()),
            DEFAULT_TONE.to_string(),
        ),
        language_mode: pick(
            p_lang,
            global.and_then(|g| g.language_mode.clone()),
            DEFAULT_LANGUAGE_MODE.to_string(),
        ),
        engagement_intensity: pick(
            p_int,
            global.and_then(|g| g.engagement_intensity),
            Intensity::Medium,
        ),
        read_receipt_delay_secs: pick(
            p_delay,
            global.and_then(|g| g.read_receipt_delay_secs),
            DEFAULT_READ_RECEIPT_DELAY_SECS,
        ),
    }
}

/// Cooldown cascade: bot → group → global → engine default.
pub fn resolve_cooldown_secs(
    bot: &BotConfig,
    group: Option<&GroupConfig>,
    global: Option<&GlobalConfig>,
    default_secs: i64,
) -> i64 {
    bot.cooldown_secs
        .or_else(|| group.and_then(|g| g.cooldown_secs))
        .or_else(|| global.and_then(|g| g.cooldown_secs))
        .unwrap_or(default_secs)
}

/// Schedule cascade: first layer that carries a schedule wins wholesale.
pub fn resolve_schedule<'a>(
    bot: &'a BotConfig,
    group: Option<&'a GroupConfig>,
    global: Option<&'a GlobalConfig>,
) -> Option<&'a Schedule> {
    bot.schedule
        .as_ref()
        .or_else(|| group.and_then(|g| g.schedule.as_ref()))
        .or_else(|| global.and_then(|g| g.schedule.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot() -> BotConfig {
        BotConfig {
            bot_id: "b1".into(),
            active: true,
            ..Default::default()
        }
    }

    #[test]
    fn all_layers_empty_yields_hard_defaults() {
        let s = resolve_settings(&bot(), None, None);
        assert_eq!(s, EffectiveSettings::default());
    }

    #[test]
    fn group_leads_when_use_global() {
        let mut b = bot();
        b.tone = Some("flirty".into()); // ignored: strategy is GroupFirst
        let group = GroupConfig {
            id: "g1".into(),
            tone: Some("serious".into()),
            ..Default::default()
        };
        let s = resolve_settings(&b, Some(&group), None);
        assert_eq!(s.tone, "serious");
        // Fields the group lacks fall through to defaults independently.
        assert_eq!(s.language_mode, "auto");
    }

    #[test]
    fn self_first_when_opted_out() {
        let mut b = bot();
        b.use_global = Some(false);
        b.tone = Some("flirty".into());
        let group = GroupConfig {
            id: "g1".into(),
            tone: Some("serious".into()),
            language_mode: Some("en".into()),
            ..Default::default()
        };
        let global = GlobalConfig {
            language_mode: Some("de".into()),
            ..Default::default()
        };
        let s = resolve_settings(&b, Some(&group), Some(&global));
        assert_eq!(s.tone, "flirty");
        // Bot lacks language mode: falls through to global, not the group.
        assert_eq!(s.language_mode, "de");
    }

    #[test]
    fn global_backstops_missing_group_fields() {
        let group = GroupConfig {
            id: "g1".into(),
            ..Default::default()
        };
        let global = GlobalConfig {
            tone: Some("warm".into()),
            read_receipt_delay_secs: Some(30),
            ..Default::default()
        };
        let s = resolve_settings(&bot(), Some(&group), Some(&global));
        assert_eq!(s.tone, "warm");
        assert_eq!(s.read_receipt_delay_secs, 30);
    }

    #[test]
    fn cooldown_cascade_order() {
        let mut b = bot();
        let group = GroupConfig {
            id: "g1".into(),
            cooldown_secs: Some(20),
            ..Default::default()
        };
        let global = GlobalConfig {
            cooldown_secs: Some(40),
            ..Default::default()
        };
        assert_eq!(resolve_cooldown_secs(&b, Some(&group), Some(&global), 5), 20);
        b.cooldown_secs = Some(7);
        assert_eq!(resolve_cooldown_secs(&b, Some(&group), Some(&global), 5), 7);
        assert_eq!(resolve_cooldown_secs(&bot(), None, Some(&global), 5), 40);
        assert_eq!(resolve_cooldown_secs(&bot(), None, None, 5), 5);
    }
}
