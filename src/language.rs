//! language.rs — inbound-text language detection and the aggression lexicon.
//!
//! Detection is deliberately cheap: script/diacritic checks first, then a
//! keyword vote over fixed lists. The vote only decides when one language
//! strictly outscores the rest; ties and empty scores return `Und`, which
//! downstream treats as the Turkish default.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Tr,
    En,
    De,
    Fr,
    Ar,
    Und,
}

impl Lang {
    pub fn code(self) -> &'static str {
        match self {
            Lang::Tr => "tr",
            Lang::En => "en",
            Lang::De => "de",
            Lang::Fr => "fr",
            Lang::Ar => "ar",
            Lang::Und => "und",
        }
    }

    /// Undetermined inputs fall back to the product's primary market.
    pub fn or_default(self) -> Lang {
        match self {
            Lang::Und => Lang::Tr,
            other => other,
        }
    }
}

static ARABIC_SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[؀-ۿ]").expect("arabic script regex"));

// Turkish-specific letters; ö/ü are shared with German and intentionally
// excluded here, the keyword vote resolves those.
static TURKISH_MARKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ğışİĞŞ]").expect("turkish marks regex"));

static GERMAN_MARKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[äÄß]").expect("german marks regex"));

static FRENCH_MARKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[éèêëàâîïôûù]").expect("french marks regex"));

const TR_WORDS: &[&str] = &[
    "merhaba", "selam", "naber", "iyi", "evet", "tamam", "ben", "sen", "ne", "canim", "seni",
    "bugun",
];
const EN_WORDS: &[&str] = &[
    "hello", "hi", "how", "are", "you", "what", "the", "and", "good", "yes", "thanks", "love",
];
const DE_WORDS: &[&str] = &[
    "hallo", "wie", "geht", "ich", "du", "und", "nicht", "gut", "ja", "nein", "danke", "bist",
];
const FR_WORDS: &[&str] = &[
    "bonjour", "salut", "comment", "vas", "tu", "je", "suis", "et", "bien", "oui", "non", "merci",
];

fn keyword_score(tokens: &[String], list: &[&str]) -> usize {
    tokens.iter().filter(|t| list.contains(&t.as_str())).count()
}

/// Classify `text`. `Und` means no signal was strong enough.
pub fn detect(text: &str) -> Lang {
    if ARABIC_SCRIPT.is_match(text) {
        return Lang::Ar;
    }
    if TURKISH_MARKS.is_match(text) {
        return Lang::Tr;
    }
    if GERMAN_MARKS.is_match(text) {
        return Lang::De;
    }
    if FRENCH_MARKS.is_match(text) {
        return Lang::Fr;
    }

    let tokens: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect();

    let mut scores = [
        (Lang::Tr, keyword_score(&tokens, TR_WORDS)),
        (Lang::En, keyword_score(&tokens, EN_WORDS)),
        (Lang::De, keyword_score(&tokens, DE_WORDS)),
        (Lang::Fr, keyword_score(&tokens, FR_WORDS)),
    ];
    scores.sort_by(|a, b| b.1.cmp(&a.1));

    // Strict winner only: a tie for first place is no decision.
    if scores[0].1 > 0 && scores[0].1 > scores[1].1 {
        scores[0].0
    } else {
        Lang::Und
    }
}

/// Case-insensitive substring matcher over a configurable insult list.
/// Kept pluggable on purpose; the list itself is a content decision.
#[derive(Debug, Clone)]
pub struct AggressionDetector {
    words: Vec<String>,
}

impl AggressionDetector {
    pub fn new(words: &[String]) -> Self {
        Self {
            words: words.iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    pub fn is_aggressive(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.words.iter().any(|w| !w.is_empty() && lower.contains(w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turkish_via_diacritics() {
        assert_eq!(detect("Merhaba nasılsın"), Lang::Tr);
    }

    #[test]
    fn english_via_keywords() {
        assert_eq!(detect("Hello how are you"), Lang::En);
    }

    #[test]
    fn german_via_marks_and_keywords() {
        assert_eq!(detect("Grüße, schön daß du da bist"), Lang::De);
        assert_eq!(detect("hallo wie geht es"), Lang::De);
    }

    #[test]
    fn french_via_accents() {
        assert_eq!(detect("très bientôt"), Lang::Fr);
    }

    #[test]
    fn arabic_script_wins_first() {
        assert_eq!(detect("مرحبا كيف حالك"), Lang::Ar);
    }

    #[test]
    fn no_signal_is_undetermined() {
        assert_eq!(detect("zzz qqq 12345"), Lang::Und);
        assert_eq!(detect("zzz qqq").or_default(), Lang::Tr);
    }

    #[test]
    fn tie_is_undetermined() {
        // One keyword each for en and de.
        assert_eq!(detect("hello hallo"), Lang::Und);
    }

    #[test]
    fn aggression_is_substring_case_insensitive() {
        let det = AggressionDetector::new(&["idiot".to_string(), "shut up".to_string()]);
        assert!(det.is_aggressive("you IDIOT"));
        assert!(det.is_aggressive("oh Shut Up now"));
        assert!(!det.is_aggressive("idle hands"));
    }
}
