//! prompt.rs — system-prompt assembly and chat-history mapping.

use serde::Serialize;

use crate::language::Lang;
use crate::model::{BotConfig, GlobalConfig, GroupConfig, MessageRow};
use crate::settings::EffectiveSettings;

/// Cap on history turns handed to the completion API.
pub const HISTORY_CAP: usize = 30;

const BASE_INSTRUCTION: &str = "You are a real person chatting on a dating app. \
Stay fully in character, keep replies short and natural, never reveal that you \
are an AI, and never share or request contact information.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// Ordered fragment assembly; empty fragments are dropped and the rest
/// joined with newlines into one system instruction.
pub fn build_system_prompt(
    bot: &BotConfig,
    group: Option<&GroupConfig>,
    global: Option<&GlobalConfig>,
    experiment_prompt: Option<&str>,
    settings: &EffectiveSettings,
    lang: Lang,
) -> String {
    let lang = lang.or_default();
    let fragments: Vec<String> = [
        Some(BASE_INSTRUCTION.to_string()),
        Some(format!(
            "Reply only in {}; do not switch languages even if asked.",
            lang.code()
        )),
        bot.personality_prompt.clone(),
        bot.profile_summary
            .as_ref()
            .map(|s| format!("Your profile: {s}")),
        group.and_then(|g| g.prompt.clone()),
        global.and_then(|g| g.prompt.clone()),
        bot.personal_prompt.clone(),
        experiment_prompt.map(|s| s.to_string()),
        Some(format!("Your tone is {}.", settings.tone)),
        Some(format!("Conversation language: {}.", lang.code())),
        Some(format!(
            "Engagement intensity: {}.",
            match settings.engagement_intensity {
                crate::model::Intensity::Low => "low",
                crate::model::Intensity::Medium => "medium",
                crate::model::Intensity::High => "high",
            }
        )),
    ]
    .into_iter()
    .flatten()
    .filter(|f| !f.trim().is_empty())
    .collect();

    fragments.join("\n")
}

/// Map stored rows to chat turns (bot-authored → assistant, rest → user)
/// and append the new inbound message. `rows` must be chronological.
pub fn build_history(rows: &[MessageRow], bot_id: &str, inbound_text: &str) -> Vec<ChatTurn> {
    let start = rows.len().saturating_sub(HISTORY_CAP);
    let mut turns: Vec<ChatTurn> = rows[start..]
        .iter()
        .map(|m| ChatTurn {
            role: if m.sender_id == bot_id {
                Role::Assistant
            } else {
                Role::User
            },
            content: m.text.clone(),
        })
        .collect();
    turns.push(ChatTurn {
        role: Role::User,
        content: inbound_text.to_string(),
    });
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageKind;
    use chrono::Utc;

    fn row(sender: &str, text: &str) -> MessageRow {
        MessageRow {
            id: text.to_string(),
            match_id: "m1".into(),
            sender_id: sender.into(),
            text: text.into(),
            kind: MessageKind::Text,
            created_at: Utc::now(),
            read_at: None,
        }
    }

    #[test]
    fn empty_fragments_are_dropped() {
        let bot = BotConfig {
            bot_id: "b1".into(),
            active: true,
            personality_prompt: Some("You are Mia, 27, from Izmir.".into()),
            personal_prompt: Some("   ".into()), // whitespace only, dropped
            ..Default::default()
        };
        let s = build_system_prompt(
            &bot,
            None,
            None,
            None,
            &EffectiveSettings::default(),
            Lang::En,
        );
        assert!(s.contains("Mia"));
        assert!(s.contains("Reply only in en"));
        assert!(!s.contains("   \n"));
    }

    #[test]
    fn undetermined_language_locks_to_turkish() {
        let bot = BotConfig {
            bot_id: "b1".into(),
            active: true,
            ..Default::default()
        };
        let s = build_system_prompt(
            &bot,
            None,
            None,
            None,
            &EffectiveSettings::default(),
            Lang::Und,
        );
        assert!(s.contains("Reply only in tr"));
    }

    #[test]
    fn experiment_prompt_is_included_in_order() {
        let bot = BotConfig {
            bot_id: "b1".into(),
            active: true,
            ..Default::default()
        };
        let s = build_system_prompt(
            &bot,
            None,
            None,
            Some("Open with a playful question."),
            &EffectiveSettings::default(),
            Lang::En,
        );
        let exp_pos = s.find("playful question").unwrap();
        let tone_pos = s.find("Your tone is").unwrap();
        assert!(exp_pos < tone_pos);
    }

    #[test]
    fn history_maps_roles_and_caps() {
        let mut rows = Vec::new();
        for i in 0..40 {
            let sender = if i % 2 == 0 { "human" } else { "b1" };
            rows.push(row(sender, &format!("t{i}")));
        }
        let turns = build_history(&rows, "b1", "new message");
        assert_eq!(turns.len(), HISTORY_CAP + 1);
        assert_eq!(turns.last().unwrap().role, Role::User);
        assert_eq!(turns.last().unwrap().content, "new message");
        // Bot rows map to assistant.
        assert!(turns
            .iter()
            .rev()
            .skip(1)
            .any(|t| t.role == Role::Assistant));
    }
}
