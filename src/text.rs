//! Text normalizer: turns raw OCR output into a canonical relay string.
//!
//! Pipeline per call: fold configured character substitutions, drop every
//! character outside the allow-list, collapse whitespace runs to one space,
//! trim. The result may be empty.

use crate::defaults;
use crate::error::{OcrelayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// Cyrillic block (U+0400..U+04FF). Only its letters are kept.
const CYRILLIC: RangeInclusive<char> = '\u{0400}'..='\u{04FF}';

/// Allow-list and substitution table for the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Keep ASCII digits.
    pub allow_digits: bool,
    /// Punctuation characters kept verbatim.
    pub punctuation: String,
    /// Single-character folds applied before filtering (e.g. `'0' -> 'o'`).
    pub substitutions: BTreeMap<char, char>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            allow_digits: true,
            punctuation: defaults::NORMALIZER_PUNCTUATION.to_string(),
            substitutions: BTreeMap::new(),
        }
    }
}

impl NormalizerConfig {
    /// Reject substitution tables that would make normalization non-idempotent.
    ///
    /// # Errors
    /// `ConfigInvalidValue` when a substitution maps whitespace, or maps onto a
    /// character that is itself substituted.
    pub fn validate(&self) -> Result<()> {
        for (from, to) in &self.substitutions {
            if from.is_whitespace() {
                return Err(OcrelayError::ConfigInvalidValue {
                    key: "normalize.substitutions".to_string(),
                    message: format!("whitespace {:?} cannot be substituted", from),
                });
            }
            if self.substitutions.contains_key(to) {
                return Err(OcrelayError::ConfigInvalidValue {
                    key: "normalize.substitutions".to_string(),
                    message: format!(
                        "{:?} -> {:?} chains into another substitution for {:?}",
                        from, to, to
                    ),
                });
            }
        }
        Ok(())
    }

    /// Whether `c` survives filtering.
    pub fn is_allowed(&self, c: char) -> bool {
        c.is_ascii_alphabetic()
            || (self.allow_digits && c.is_ascii_digit())
            || (CYRILLIC.contains(&c) && c.is_alphabetic())
            || self.punctuation.contains(c)
    }
}

/// Deterministic, idempotent text cleaner.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextNormalizer {
    config: NormalizerConfig,
}

impl TextNormalizer {
    /// # Errors
    /// Propagates [`NormalizerConfig::validate`].
    pub fn new(config: NormalizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    pub fn normalize(&self, raw: &str) -> String {
        let filtered: String = raw
            .chars()
            .map(|c| self.config.substitutions.get(&c).copied().unwrap_or(c))
            .filter(|&c| c.is_whitespace() || self.config.is_allowed(c))
            .collect();

        filtered.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letters_only_with_zero_fold() -> TextNormalizer {
        TextNormalizer::new(NormalizerConfig {
            allow_digits: false,
            punctuation: String::new(),
            substitutions: BTreeMap::from([('0', 'o')]),
        })
        .unwrap()
    }

    #[test]
    fn test_collapses_and_trims_whitespace() {
        let n = TextNormalizer::default();
        assert_eq!(n.normalize("  hello \n\n  world\t "), "hello world");
    }

    #[test]
    fn test_keeps_cyrillic_and_punctuation() {
        let n = TextNormalizer::default();
        assert_eq!(
            n.normalize("Привет, мир! Как дела? — ок."),
            "Привет, мир! Как дела? — ок."
        );
    }

    #[test]
    fn test_cyrillic_signs_and_combining_marks_are_dropped() {
        let n = TextNormalizer::default();
        assert_eq!(n.normalize("a \u{0482} \u{0483}b"), "a b");
        assert_eq!(n.normalize("ёж\u{0487}ик Ѣ"), "ёжик Ѣ");
        assert!(!n.config().is_allowed('\u{0489}'));
        assert!(n.config().is_allowed('ж'));
    }

    #[test]
    fn test_strips_symbols_outside_allow_list() {
        let n = TextNormalizer::default();
        assert_eq!(n.normalize("price: $100 (approx) #tag"), "price 100 approx tag");
    }

    #[test]
    fn test_letters_only_fixture() {
        assert_eq!(letters_only_with_zero_fold().normalize("inv0ic3!!"), "invoic");
    }

    #[test]
    fn test_empty_and_symbol_only_inputs_become_empty() {
        let n = TextNormalizer::default();
        assert_eq!(n.normalize(""), "");
        assert_eq!(n.normalize(" \n\t "), "");
        assert_eq!(n.normalize("@#$%^&*"), "");
    }

    #[test]
    fn test_removed_symbol_between_words_leaves_single_space() {
        let n = TextNormalizer::default();
        assert_eq!(n.normalize("a | b"), "a b");
        assert_eq!(n.normalize("a|b"), "ab");
    }

    #[test]
    fn test_idempotent_over_mixed_inputs() {
        let samples = [
            "  inv0ic3!!  ",
            "Привет,   мир!!\n\nNext line",
            "tabs\tand\u{00a0}nbsp",
            "emoji 🔔 and ✓ marks",
            "ёЁ ӀӁ ҂ mixed 123 ...",
            "",
        ];
        for normalizer in [TextNormalizer::default(), letters_only_with_zero_fold()] {
            for s in samples {
                let once = normalizer.normalize(s);
                assert_eq!(normalizer.normalize(&once), once, "input {s:?}");
            }
        }
    }

    #[test]
    fn test_output_never_leaves_allow_list() {
        let samples = ["a\u{200b}b", "x_y-z", "«quoted»", "∑∫√", "中文 text"];
        let n = TextNormalizer::default();
        for s in samples {
            let out = n.normalize(s);
            assert!(
                out.chars().all(|c| c == ' ' || n.config().is_allowed(c)),
                "{s:?} -> {out:?}"
            );
            assert!(!out.starts_with(' ') && !out.ends_with(' '));
            assert!(!out.contains("  "));
        }
    }

    #[test]
    fn test_digits_can_be_disallowed() {
        let n = TextNormalizer::new(NormalizerConfig {
            allow_digits: false,
            ..NormalizerConfig::default()
        })
        .unwrap();
        assert_eq!(n.normalize("room 101, floor 3."), "room , floor .");
    }

    #[test]
    fn test_chained_substitution_rejected() {
        let config = NormalizerConfig {
            substitutions: BTreeMap::from([('0', 'o'), ('o', 'a')]),
            ..NormalizerConfig::default()
        };
        assert!(matches!(
            TextNormalizer::new(config),
            Err(OcrelayError::ConfigInvalidValue { .. })
        ));
    }

    #[test]
    fn test_whitespace_substitution_rejected() {
        let config = NormalizerConfig {
            substitutions: BTreeMap::from([(' ', '_')]),
            ..NormalizerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let config: NormalizerConfig = toml::from_str(
            r#"
            allow_digits = false
            substitutions = { "0" = "o", "|" = "l" }
            "#,
        )
        .unwrap();
        assert!(!config.allow_digits);
        assert_eq!(config.punctuation, ".,?!—");
        assert_eq!(config.substitutions.get(&'|'), Some(&'l'));
    }
}
