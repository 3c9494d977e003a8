//! Text normalization and disconnect-keyword matching shared by text-based
//! analyzers.
//!
//! Recognized text is reduced to CJK ideographs and ASCII alphanumerics before
//! matching. Punctuation, whitespace and OCR artifacts all disappear, so
//! patterns are written against the squashed form ("connectionlost", not
//! "connection lost").

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{DetectionResult, KEYWORD_CONFIDENCE_FLOOR};

/// One entry of the ordered keyword list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum KeywordPattern {
    /// Exact phrase, normalized the same way as the recognized text.
    Phrase { text: String },
    /// Case-insensitive regular expression.
    English { pattern: String },
}

impl KeywordPattern {
    pub fn phrase(text: impl Into<String>) -> Self {
        KeywordPattern::Phrase { text: text.into() }
    }

    pub fn english(pattern: impl Into<String>) -> Self {
        KeywordPattern::English {
            pattern: pattern.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatch {
    /// Position of the winning pattern in the list.
    pub index: usize,
    /// The substring of the normalized text that matched.
    pub matched: String,
}

#[derive(Debug, Clone)]
enum Matcher {
    Phrase(String),
    English(Regex),
}

/// Compiled, ordered keyword list. The first matching pattern wins.
#[derive(Debug, Clone)]
pub struct KeywordSet {
    matchers: Vec<Matcher>,
}

impl KeywordSet {
    pub fn compile(patterns: &[KeywordPattern]) -> Result<Self> {
        let mut matchers = Vec::with_capacity(patterns.len());
        for (index, pattern) in patterns.iter().enumerate() {
            let matcher = match pattern {
                KeywordPattern::Phrase { text } => {
                    let normalized = normalize_text(text);
                    if normalized.is_empty() {
                        bail!("keyword #{index}: phrase {text:?} is empty after normalization");
                    }
                    Matcher::Phrase(normalized)
                }
                KeywordPattern::English { pattern } => {
                    if pattern.trim().is_empty() {
                        bail!("keyword #{index}: empty pattern");
                    }
                    let regex = Regex::new(&format!("(?i){pattern}"))
                        .with_context(|| format!("keyword #{index}: invalid pattern {pattern:?}"))?;
                    Matcher::English(regex)
                }
            };
            matchers.push(matcher);
        }
        Ok(Self { matchers })
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Scan `normalized` against the patterns in order.
    pub fn find(&self, normalized: &str) -> Option<KeywordMatch> {
        self.matchers
            .iter()
            .enumerate()
            .find_map(|(index, matcher)| match matcher {
                Matcher::Phrase(phrase) => normalized.contains(phrase.as_str()).then(|| KeywordMatch {
                    index,
                    matched: phrase.clone(),
                }),
                Matcher::English(regex) => regex.find(normalized).map(|m| KeywordMatch {
                    index,
                    matched: m.as_str().to_string(),
                }),
            })
    }
}

/// Keep only CJK ideographs and ASCII alphanumerics.
pub fn normalize_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || is_cjk_ideograph(*c))
        .collect()
}

fn is_cjk_ideograph(c: char) -> bool {
    matches!(
        c as u32,
        0x4E00..=0x9FFF      // CJK Unified Ideographs
            | 0x3400..=0x4DBF  // Extension A
            | 0xF900..=0xFAFF  // Compatibility Ideographs
            | 0x20000..=0x2A6DF // Extension B
    )
}

/// Confidence reported for a keyword hit. `recognizer_confidence` is 0-100.
pub fn keyword_confidence(recognizer_confidence: f32) -> f32 {
    let scaled = if recognizer_confidence.is_finite() {
        recognizer_confidence / 100.0
    } else {
        0.0
    };
    scaled.max(KEYWORD_CONFIDENCE_FLOOR).min(1.0)
}

/// Apply normalization and keyword matching to raw recognizer output.
pub fn evaluate_text(keywords: &KeywordSet, raw: &str, recognizer_confidence: f32) -> DetectionResult {
    let normalized = normalize_text(raw);
    match keywords.find(&normalized) {
        Some(hit) => DetectionResult::disconnected(
            keyword_confidence(recognizer_confidence),
            format!("disconnect keyword \"{}\" found", hit.matched),
        ),
        None => DetectionResult::connected(
            recognizer_confidence / 100.0,
            "no disconnect keywords found",
        ),
    }
    .with_debug_text(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalyzerProfile;

    fn default_set() -> KeywordSet {
        AnalyzerProfile::default().keyword_set().unwrap()
    }

    #[test]
    fn normalization_strips_noise_but_keeps_han_and_alnum() {
        assert_eq!(normalize_text("Connection  lost!!\n(code 1006)"), "Connectionlostcode1006");
        assert_eq!(normalize_text("与服务器的连接已断开。请重试"), "与服务器的连接已断开请重试");
        assert_eq!(normalize_text("ｆｕｌｌｗｉｄｔｈ ・ 「」"), "");
    }

    #[test]
    fn first_match_wins() {
        let set = KeywordSet::compile(&[
            KeywordPattern::english("reconnect"),
            KeywordPattern::english("disconnected"),
        ])
        .unwrap();

        let hit = set.find("disconnectedreconnecting").unwrap();
        assert_eq!(hit.index, 0);
        assert_eq!(hit.matched, "reconnect");
    }

    #[test]
    fn english_patterns_are_case_insensitive_and_report_matched_text() {
        let set = KeywordSet::compile(&[KeywordPattern::english("connectionlost")]).unwrap();
        let hit = set.find(&normalize_text("CONNECTION LOST")).unwrap();
        assert_eq!(hit.matched, "CONNECTIONLOST");
    }

    #[test]
    fn phrases_are_normalized_at_compile_time() {
        let set = KeywordSet::compile(&[KeywordPattern::phrase("连接 断开！")]).unwrap();
        assert!(set.find("网络连接断开了").is_some());
    }

    #[test]
    fn compile_rejects_empty_and_invalid_patterns() {
        assert!(KeywordSet::compile(&[KeywordPattern::phrase(" ,。")]).is_err());
        assert!(KeywordSet::compile(&[KeywordPattern::english("")]).is_err());
        assert!(KeywordSet::compile(&[KeywordPattern::english("(unclosed")]).is_err());
    }

    #[test]
    fn keyword_hit_confidence_has_a_floor() {
        let set = default_set();
        for recognizer in [0.0, 12.5, 50.0, 84.9] {
            let result = evaluate_text(&set, "Disconnected from server", recognizer);
            assert!(result.is_disconnected);
            assert!(result.confidence >= KEYWORD_CONFIDENCE_FLOOR);
        }
        let strong = evaluate_text(&set, "Disconnected from server", 97.0);
        assert!((strong.confidence - 0.97).abs() < 1e-6);
    }

    #[test]
    fn no_keyword_means_connected() {
        let result = evaluate_text(&default_set(), "Score 1200  Level 7", 91.0);
        assert!(!result.is_disconnected);
        assert_eq!(result.debug_text.as_deref(), Some("Score 1200  Level 7"));
    }

    #[test]
    fn default_profile_catches_common_dialogs() {
        let set = default_set();
        for text in [
            "Connection lost. Reconnecting...",
            "You have been DISCONNECTED",
            "Network error (code 3)",
            "与服务器断开连接",
            "网络异常，请检查网络设置",
        ] {
            assert!(set.find(&normalize_text(text)).is_some(), "{text}");
        }
    }
}
