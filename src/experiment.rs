//! experiment.rs — A/B prompt-variant assignment.
//!
//! Bucketing is deterministic over the conversation id so concurrent first
//! calls compute the same candidate; the store's uniqueness constraint makes
//! whichever insert lands first the permanent answer.

use chrono::Utc;

use crate::model::{Experiment, ExperimentAssignment, ExperimentTarget, ExperimentVariant};
use crate::store::Store;

/// Sum of character codes modulo the total variant weight, then a weighted
/// walk until the cumulative weight exceeds the bucket value.
pub fn bucket_variant<'a>(
    match_id: &str,
    variants: &'a [ExperimentVariant],
) -> Option<&'a ExperimentVariant> {
    let total: u64 = variants.iter().map(|v| u64::from(v.weight)).sum();
    if total == 0 {
        return None;
    }
    let sum: u64 = match_id.chars().map(|c| c as u64).sum();
    let bucket = sum % total;

    let mut cumulative = 0u64;
    for v in variants {
        cumulative += u64::from(v.weight);
        if cumulative > bucket {
            return Some(v);
        }
    }
    variants.last()
}

fn applies_to(exp: &Experiment, bot_id: &str, group_id: Option<&str>) -> bool {
    match &exp.target {
        ExperimentTarget::Global => true,
        ExperimentTarget::Bot(id) => id == bot_id,
        ExperimentTarget::Group(id) => group_id == Some(id.as_str()),
    }
}

/// Resolve the conversation's variant prompt, creating the assignment on
/// first contact. Returns `None` when no active experiment targets this bot.
pub async fn resolve_variant_prompt(
    store: &dyn Store,
    match_id: &str,
    bot_id: &str,
    group_id: Option<&str>,
) -> anyhow::Result<Option<String>> {
    let experiments = store.active_experiments().await?;
    // Most specific target wins: bot, then group, then global.
    let experiment = experiments
        .iter()
        .find(|e| matches!(&e.target, ExperimentTarget::Bot(id) if id == bot_id))
        .or_else(|| {
            experiments.iter().find(
                |e| matches!(&e.target, ExperimentTarget::Group(id) if group_id == Some(id.as_str())),
            )
        })
        .or_else(|| {
            experiments
                .iter()
                .find(|e| e.target == ExperimentTarget::Global)
        });
    let Some(experiment) = experiment else {
        return Ok(None);
    };
    if !applies_to(experiment, bot_id, group_id) {
        return Ok(None);
    }

    // Reuse a stored assignment; never re-roll an assigned conversation.
    if let Some(existing) = store.get_assignment(match_id).await? {
        let prompt = experiments
            .iter()
            .find(|e| e.id == existing.experiment_id)
            .and_then(|e| e.variants.iter().find(|v| v.id == existing.variant_id))
            .map(|v| v.prompt.clone());
        return Ok(prompt);
    }

    let Some(candidate) = bucket_variant(match_id, &experiment.variants) else {
        return Ok(None);
    };
    let stored = store
        .create_assignment(ExperimentAssignment {
            match_id: match_id.to_string(),
            experiment_id: experiment.id.clone(),
            variant_id: candidate.id.clone(),
            assigned_at: Utc::now(),
        })
        .await?;

    let prompt = experiments
        .iter()
        .find(|e| e.id == stored.experiment_id)
        .and_then(|e| e.variants.iter().find(|v| v.id == stored.variant_id))
        .map(|v| v.prompt.clone());
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variants() -> Vec<ExperimentVariant> {
        vec![
            ExperimentVariant {
                id: "a".into(),
                prompt: "variant a".into(),
                weight: 1,
            },
            ExperimentVariant {
                id: "b".into(),
                prompt: "variant b".into(),
                weight: 3,
            },
        ]
    }

    #[test]
    fn bucketing_is_deterministic() {
        let vs = variants();
        let first = bucket_variant("match-123", &vs).unwrap().id.clone();
        for _ in 0..10 {
            assert_eq!(bucket_variant("match-123", &vs).unwrap().id, first);
        }
    }

    #[test]
    fn bucketing_respects_weight_walk() {
        let vs = variants();
        // total weight 4; bucket = char-code sum % 4. "b" covers buckets 1..=3.
        let sum: u64 = "m".chars().map(|c| c as u64).sum();
        let expected = if sum % 4 == 0 { "a" } else { "b" };
        assert_eq!(bucket_variant("m", &vs).unwrap().id, expected);
    }

    #[test]
    fn zero_total_weight_selects_nothing() {
        let vs = vec![ExperimentVariant {
            id: "a".into(),
            prompt: "p".into(),
            weight: 0,
        }];
        assert!(bucket_variant("m", &vs).is_none());
    }
}
