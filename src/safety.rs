//! safety.rs — stateless contact-info/leakage scanner.
//!
//! Returns at most one category in a fixed priority order. Scanning never
//! blocks an inbound message; on outbound text a detection discards the
//! synthesized reply and substitutes a canned per-language phrase before
//! anything is persisted.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::language::Lang;
use crate::model::SafetyCategory;

static PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\d[\d\s().-]{7,}\d").expect("phone regex"));

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email regex")
});

static CRYPTO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(0x[a-fA-F0-9]{40}|bc1[a-z0-9]{11,71}|[13][a-km-zA-HJ-NP-Z1-9]{25,34})\b")
        .expect("crypto regex")
});

static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bhttps?://\S+|\bwww\.\S+").expect("url regex"));

/// Priority: phone → email → crypto → url. `None` means clean.
pub fn scan(text: &str) -> Option<SafetyCategory> {
    if PHONE.is_match(text) {
        return Some(SafetyCategory::Phone);
    }
    if EMAIL.is_match(text) {
        return Some(SafetyCategory::Email);
    }
    if CRYPTO.is_match(text) {
        return Some(SafetyCategory::Crypto);
    }
    if URL.is_match(text) {
        return Some(SafetyCategory::Url);
    }
    None
}

/// The single canned line used when a synthesized reply trips the scanner.
/// Not drawn from the configurable fallback pools on purpose: this path must
/// work even when those are empty.
pub fn canned_substitute(lang: Lang) -> &'static str {
    match lang.or_default() {
        Lang::Tr => "Burada kalalım, seninle sohbet etmek çok daha güzel :)",
        Lang::En => "Let's keep chatting here, I like talking to you :)",
        Lang::De => "Lass uns hier weiterschreiben, ich mag unsere Gespräche :)",
        Lang::Fr => "Restons ici, j'aime bien discuter avec toi :)",
        Lang::Ar => "لنبقَ هنا، أحب الدردشة معك :)",
        Lang::Und => unreachable!("or_default never returns Und"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_number_detected() {
        assert_eq!(scan("+90 555 123 45 67"), Some(SafetyCategory::Phone));
        assert_eq!(scan("call me 05551234567"), Some(SafetyCategory::Phone));
    }

    #[test]
    fn email_detected() {
        assert_eq!(scan("write a@b.com please"), Some(SafetyCategory::Email));
    }

    #[test]
    fn crypto_detected() {
        assert_eq!(
            scan("send to 0x52908400098527886E0F7030069857D2E4169EE7"),
            Some(SafetyCategory::Crypto)
        );
        assert_eq!(
            scan("btc 1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2"),
            Some(SafetyCategory::Crypto)
        );
    }

    #[test]
    fn url_detected() {
        assert_eq!(scan("see https://x.com"), Some(SafetyCategory::Url));
        assert_eq!(scan("see www.example.org"), Some(SafetyCategory::Url));
    }

    #[test]
    fn clean_text_is_none() {
        assert_eq!(scan("hello there, how was your day"), None);
    }

    #[test]
    fn phone_outranks_url() {
        assert_eq!(
            scan("https://x.com or +90 555 123 45 67"),
            Some(SafetyCategory::Phone)
        );
    }

    #[test]
    fn canned_substitute_covers_default() {
        assert!(!canned_substitute(Lang::Und).is_empty());
        assert_ne!(canned_substitute(Lang::En), canned_substitute(Lang::Tr));
    }
}
