//! Content admissibility filter.
//!
//! Runs a fixed sequence of checks over normalized report text and stops at
//! the first failure:
//!
//! 1. language (at least one character from the configured alphabet)
//! 2. length (characters, then word count)
//! 3. spam (keyword patterns, phone numbers, link count, shouting)
//! 4. offensive content
//! 5. required information (when + where), satisfiable out of band
//!
//! A failure is a [`FilterRejection`] value carrying a human-readable reason
//! and a machine code. Nothing here returns an error once the filter has
//! been built; pattern compilation is the only fallible step.

use std::fmt;

use crowdwatch_core::constants::{
    DATE_PATTERNS, LANGUAGE_ALPHABET, LOCATION_PATTERNS, MAX_ALLOWED_LINKS,
    MAX_REPORT_LENGTH, MAX_UPPERCASE_RATIO, MIN_LENGTH_FOR_UPPER_CHECK, MIN_REPORT_LENGTH,
    MIN_WORDS_FOR_REPORT, OFFENSIVE_PATTERNS, PHONE_PATTERN, SPAM_PATTERNS, TIME_PATTERNS,
    URL_PATTERN,
};
use crowdwatch_core::error::ConfigError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for [`ContentFilter`]. All patterns are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub language_alphabet: String,
    pub min_length: usize,
    pub max_length: usize,
    pub min_words: usize,
    pub max_allowed_links: usize,
    pub min_length_for_upper_check: usize,
    pub max_uppercase_ratio: f64,
    pub spam_patterns: Vec<String>,
    pub offensive_patterns: Vec<String>,
    pub phone_pattern: String,
    pub url_pattern: String,
    pub date_patterns: Vec<String>,
    pub time_patterns: Vec<String>,
    pub location_patterns: Vec<String>,
}

fn owned(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            language_alphabet: LANGUAGE_ALPHABET.to_string(),
            min_length: MIN_REPORT_LENGTH,
            max_length: MAX_REPORT_LENGTH,
            min_words: MIN_WORDS_FOR_REPORT,
            max_allowed_links: MAX_ALLOWED_LINKS,
            min_length_for_upper_check: MIN_LENGTH_FOR_UPPER_CHECK,
            max_uppercase_ratio: MAX_UPPERCASE_RATIO,
            spam_patterns: owned(SPAM_PATTERNS),
            offensive_patterns: owned(OFFENSIVE_PATTERNS),
            phone_pattern: PHONE_PATTERN.to_string(),
            url_pattern: URL_PATTERN.to_string(),
            date_patterns: owned(DATE_PATTERNS),
            time_patterns: owned(TIME_PATTERNS),
            location_patterns: owned(LOCATION_PATTERNS),
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_length < self.min_length {
            return Err(ConfigError::InvalidValue {
                field: "filter.max_length",
                message: format!("{} is below min_length {}", self.max_length, self.min_length),
            });
        }
        if !(0.0..=1.0).contains(&self.max_uppercase_ratio) {
            return Err(ConfigError::InvalidValue {
                field: "filter.max_uppercase_ratio",
                message: format!("{} is outside [0, 1]", self.max_uppercase_ratio),
            });
        }
        if self.language_alphabet.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "filter.language_alphabet",
                message: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// What tripped the spam check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpamSignal {
    /// A spam pattern matched; holds the matched text.
    Keyword { matched: String },
    PhoneNumber,
    TooManyLinks { count: usize, max: usize },
    Shouting { ratio: f64 },
}

/// A required-information category that could not be established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredInfo {
    /// A date or time fragment, or an out-of-band timestamp.
    When,
    /// A location fragment, or out-of-band coordinates or place text.
    Where,
}

impl fmt::Display for RequiredInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::When => f.write_str("when"),
            Self::Where => f.write_str("where"),
        }
    }
}

/// Why a report was not admitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FilterRejection {
    LanguageNotRecognized,
    TooShort { length: usize, min: usize },
    TooLong { length: usize, max: usize },
    TooFewWords { words: usize, min: usize },
    Spam(SpamSignal),
    Offensive { matched: String },
    MissingRequiredInfo { missing: Vec<RequiredInfo> },
}

impl FilterRejection {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::LanguageNotRecognized => "LANGUAGE_NOT_RECOGNIZED",
            Self::TooShort { .. } => "TOO_SHORT",
            Self::TooLong { .. } => "TOO_LONG",
            Self::TooFewWords { .. } => "TOO_FEW_WORDS",
            Self::Spam(_) => "SPAM",
            Self::Offensive { .. } => "OFFENSIVE",
            Self::MissingRequiredInfo { .. } => "MISSING_REQUIRED_INFO",
        }
    }
}

impl fmt::Display for FilterRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LanguageNotRecognized => f.write_str("language not recognized"),
            Self::TooShort { length, min } => {
                write!(f, "content too short ({length} < {min} characters)")
            }
            Self::TooLong { length, max } => {
                write!(f, "content too long ({length} > {max} characters)")
            }
            Self::TooFewWords { words, min } => {
                write!(f, "too few words ({words} < {min})")
            }
            Self::Spam(SpamSignal::Keyword { matched }) => {
                write!(f, "spam: contains \"{matched}\"")
            }
            Self::Spam(SpamSignal::PhoneNumber) => f.write_str("spam: contains a phone number"),
            Self::Spam(SpamSignal::TooManyLinks { count, max }) => {
                write!(f, "spam: {count} links (at most {max} allowed)")
            }
            Self::Spam(SpamSignal::Shouting { ratio }) => {
                write!(f, "spam: {:.0}% of letters are uppercase", ratio * 100.0)
            }
            Self::Offensive { matched } => write!(f, "offensive language: \"{matched}\""),
            Self::MissingRequiredInfo { missing } => {
                let names: Vec<String> = missing.iter().map(|m| m.to_string()).collect();
                write!(f, "missing required information: {}", names.join(", "))
            }
        }
    }
}

/// Fragments pulled out of the text by the required-information check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedInfo {
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
}

/// Facts the submitter provided outside the text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuppliedContext {
    /// Coordinates or a place description were given.
    pub has_location: bool,
    /// An observation timestamp was given.
    pub has_time: bool,
}

/// Outcome of [`ContentFilter::check`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilterVerdict {
    Accepted { text: String, info: ExtractedInfo },
    Rejected(FilterRejection),
}

impl FilterVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Compiled admissibility filter. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct ContentFilter {
    config: FilterConfig,
    alphabet: Vec<char>,
    spam: Vec<Regex>,
    offensive: Vec<Regex>,
    phone: Regex,
    url: Regex,
    date: Vec<Regex>,
    time: Vec<Regex>,
    location: Vec<Regex>,
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns.iter().map(|p| compile(p)).collect()
}

/// Trim and collapse internal whitespace runs to a single space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl ContentFilter {
    /// Validate `config` and compile every pattern in it.
    pub fn new(config: FilterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            alphabet: config.language_alphabet.to_lowercase().chars().collect(),
            spam: compile_all(&config.spam_patterns)?,
            offensive: compile_all(&config.offensive_patterns)?,
            phone: compile(&config.phone_pattern)?,
            url: compile(&config.url_pattern)?,
            date: compile_all(&config.date_patterns)?,
            time: compile_all(&config.time_patterns)?,
            location: compile_all(&config.location_patterns)?,
            config,
        })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Run every check in order over `text`.
    pub fn check(&self, text: &str, supplied: SuppliedContext) -> FilterVerdict {
        let text = normalize_text(text);
        let verdict = self
            .check_language(&text)
            .or_else(|| self.check_length(&text))
            .or_else(|| self.check_spam(&text))
            .or_else(|| self.check_offensive(&text));
        if let Some(rejection) = verdict {
            debug!(code = rejection.code(), %rejection, "filter: rejected");
            return FilterVerdict::Rejected(rejection);
        }

        let info = self.extract(&text);
        let mut missing = Vec::new();
        if info.date.is_none() && info.time.is_none() && !supplied.has_time {
            missing.push(RequiredInfo::When);
        }
        if info.location.is_none() && !supplied.has_location {
            missing.push(RequiredInfo::Where);
        }
        if !missing.is_empty() {
            let rejection = FilterRejection::MissingRequiredInfo { missing };
            debug!(code = rejection.code(), %rejection, "filter: rejected");
            return FilterVerdict::Rejected(rejection);
        }

        FilterVerdict::Accepted { text, info }
    }

    /// Pull date, time, and location fragments out of `text`. The first
    /// matching pattern in each category wins.
    pub fn extract(&self, text: &str) -> ExtractedInfo {
        ExtractedInfo {
            date: first_match(&self.date, text),
            time: first_match(&self.time, text),
            location: first_match(&self.location, text),
        }
    }

    fn check_language(&self, text: &str) -> Option<FilterRejection> {
        let lower = text.to_lowercase();
        if lower.chars().any(|c| self.alphabet.contains(&c)) {
            None
        } else {
            Some(FilterRejection::LanguageNotRecognized)
        }
    }

    fn check_length(&self, text: &str) -> Option<FilterRejection> {
        let length = text.chars().count();
        if length < self.config.min_length {
            return Some(FilterRejection::TooShort {
                length,
                min: self.config.min_length,
            });
        }
        if length > self.config.max_length {
            return Some(FilterRejection::TooLong {
                length,
                max: self.config.max_length,
            });
        }
        let words = text.split_whitespace().count();
        if words < self.config.min_words {
            return Some(FilterRejection::TooFewWords {
                words,
                min: self.config.min_words,
            });
        }
        None
    }

    fn check_spam(&self, text: &str) -> Option<FilterRejection> {
        if let Some(matched) = self.spam.iter().find_map(|re| re.find(text)) {
            return Some(FilterRejection::Spam(SpamSignal::Keyword {
                matched: matched.as_str().to_lowercase(),
            }));
        }
        if self.phone.is_match(text) {
            return Some(FilterRejection::Spam(SpamSignal::PhoneNumber));
        }
        let links = self.url.find_iter(text).count();
        if links > self.config.max_allowed_links {
            return Some(FilterRejection::Spam(SpamSignal::TooManyLinks {
                count: links,
                max: self.config.max_allowed_links,
            }));
        }
        if text.chars().count() >= self.config.min_length_for_upper_check {
            let (letters, upper) = text
                .chars()
                .filter(|c| c.is_alphabetic())
                .fold((0usize, 0usize), |(l, u), c| (l + 1, u + usize::from(c.is_uppercase())));
            if letters > 0 {
                let ratio = upper as f64 / letters as f64;
                if ratio > self.config.max_uppercase_ratio {
                    return Some(FilterRejection::Spam(SpamSignal::Shouting { ratio }));
                }
            }
        }
        None
    }

    fn check_offensive(&self, text: &str) -> Option<FilterRejection> {
        self.offensive.iter().find_map(|re| re.find(text)).map(|m| {
            FilterRejection::Offensive {
                matched: m.as_str().to_lowercase(),
            }
        })
    }
}

fn first_match(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|re| re.find(text)).map(|m| {
        m.as_str()
            .trim_end_matches(|c: char| c.is_ascii_punctuation())
            .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> ContentFilter {
        ContentFilter::new(FilterConfig::default()).unwrap()
    }

    const VALID: &str = "Có một vụ va chạm nhỏ ở cầu Chương Dương, gây ùn ứ vào khoảng 7h sáng.";

    fn rejection(verdict: FilterVerdict) -> FilterRejection {
        match verdict {
            FilterVerdict::Rejected(r) => r,
            FilterVerdict::Accepted { text, .. } => panic!("unexpectedly accepted: {text}"),
        }
    }

    // -------------------------------------------------------------------------
    // Acceptance and extraction
    // -------------------------------------------------------------------------

    #[test]
    fn valid_report_is_accepted_with_fragments() {
        match filter().check(VALID, SuppliedContext::default()) {
            FilterVerdict::Accepted { text, info } => {
                assert_eq!(text, VALID);
                assert_eq!(info.time.as_deref(), Some("7h"));
                assert_eq!(info.location.as_deref(), Some("cầu Chương Dương"));
                assert_eq!(info.date, None);
            }
            FilterVerdict::Rejected(r) => panic!("rejected: {r}"),
        }
    }

    #[test]
    fn whitespace_is_collapsed() {
        let messy = "  Có   một vụ va chạm nhỏ ở cầu Chương Dương,\n gây ùn ứ vào khoảng 7h sáng.  ";
        match filter().check(messy, SuppliedContext::default()) {
            FilterVerdict::Accepted { text, .. } => assert_eq!(text, VALID),
            FilterVerdict::Rejected(r) => panic!("rejected: {r}"),
        }
    }

    #[test]
    fn relative_date_is_extracted() {
        let info = filter().extract("Hôm nay có cháy lớn ở quận Đống Đa");
        assert_eq!(info.date.as_deref(), Some("Hôm nay"));
        assert_eq!(info.location.as_deref(), Some("quận Đống Đa"));
    }

    // -------------------------------------------------------------------------
    // Rejections, in check order
    // -------------------------------------------------------------------------

    #[test]
    fn english_text_is_language_rejected() {
        let r = rejection(filter().check(
            "Traffic jam in Hanoi old quarter this morning.",
            SuppliedContext::default(),
        ));
        assert_eq!(r, FilterRejection::LanguageNotRecognized);
        assert_eq!(r.code(), "LANGUAGE_NOT_RECOGNIZED");
    }

    #[test]
    fn short_text_is_rejected() {
        let r = rejection(filter().check("Tắc đường", SuppliedContext::default()));
        assert_eq!(r, FilterRejection::TooShort { length: 9, min: 20 });
    }

    #[test]
    fn long_text_is_rejected() {
        let text = "đường ".repeat(400);
        let r = rejection(filter().check(&text, SuppliedContext::default()));
        assert_eq!(r.code(), "TOO_LONG");
    }

    #[test]
    fn few_words_are_rejected() {
        let r = rejection(filter().check("Đườngggggg ngậppppppppp nặngggggg", SuppliedContext::default()));
        assert_eq!(r, FilterRejection::TooFewWords { words: 3, min: 5 });
    }

    #[test]
    fn spam_keyword_is_reported() {
        let r = rejection(filter().check(
            "Khuyến mãi lớn hôm nay tại đường Láng, mua ngay kẻo lỡ",
            SuppliedContext::default(),
        ));
        assert_eq!(
            r,
            FilterRejection::Spam(SpamSignal::Keyword { matched: "khuyến mãi".into() })
        );
    }

    #[test]
    fn phone_number_is_spam() {
        let r = rejection(filter().check(
            "Cần người giúp đỡ ở đường Láng gọi 0912 345 678 ngay",
            SuppliedContext::default(),
        ));
        assert_eq!(r, FilterRejection::Spam(SpamSignal::PhoneNumber));
    }

    #[test]
    fn too_many_links_is_spam() {
        let r = rejection(filter().check(
            "Xem tin ở đường Láng https://a.vn https://b.vn https://c.vn nhé",
            SuppliedContext::default(),
        ));
        assert_eq!(
            r,
            FilterRejection::Spam(SpamSignal::TooManyLinks { count: 3, max: 2 })
        );
    }

    #[test]
    fn shouting_is_spam() {
        let r = rejection(filter().check(
            "CHÁY LỚN Ở ĐƯỜNG LÁNG MỌI NGƯỜI TRÁNH XA",
            SuppliedContext::default(),
        ));
        assert!(matches!(r, FilterRejection::Spam(SpamSignal::Shouting { .. })));
    }

    #[test]
    fn profanity_is_offensive() {
        let r = rejection(filter().check(
            "Con đường này lúc nào cũng tắc, đm thật",
            SuppliedContext::default(),
        ));
        assert_eq!(r, FilterRejection::Offensive { matched: "đm".into() });
    }

    #[test]
    fn profanity_matches_whole_words_only() {
        let embedded = filter().check(
            "Có một vụ va chạm nhỏ trước quán Vclub gần cầu Chương Dương, admin báo lúc 7h sáng.",
            SuppliedContext::default(),
        );
        assert!(embedded.is_accepted(), "{embedded:?}");

        let r = rejection(filter().check(
            "Có một vụ va chạm nhỏ trước quán VCL gần cầu Chương Dương, báo lúc 7h sáng.",
            SuppliedContext::default(),
        ));
        assert_eq!(r, FilterRejection::Offensive { matched: "vcl".into() });
    }

    #[test]
    fn ordinary_words_are_not_profanity() {
        let verdict = filter().check(
            "Tình hình rất nguy hiểm ở quận Cầu Giấy lúc 9h tối",
            SuppliedContext::default(),
        );
        assert!(verdict.is_accepted(), "{verdict:?}");
    }

    #[test]
    fn missing_when_and_where_are_listed() {
        let r = rejection(filter().check(
            "Có một vụ va chạm nhỏ gây ùn tắc nghiêm trọng",
            SuppliedContext::default(),
        ));
        assert_eq!(
            r,
            FilterRejection::MissingRequiredInfo {
                missing: vec![RequiredInfo::When, RequiredInfo::Where]
            }
        );
        assert_eq!(r.to_string(), "missing required information: when, where");
    }

    #[test]
    fn out_of_band_context_satisfies_requirements() {
        let supplied = SuppliedContext { has_location: true, has_time: true };
        let verdict = filter().check("Có một vụ va chạm nhỏ gây ùn tắc nghiêm trọng", supplied);
        assert!(verdict.is_accepted());
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    #[test]
    fn bad_pattern_is_config_error() {
        let config = FilterConfig {
            spam_patterns: vec!["(unclosed".into()],
            ..FilterConfig::default()
        };
        let err = ContentFilter::new(config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn inverted_length_bounds_are_rejected() {
        let config = FilterConfig {
            min_length: 100,
            max_length: 10,
            ..FilterConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(FilterRejection::TooShort { length: 1, min: 2 }.code(), "TOO_SHORT");
        assert_eq!(FilterRejection::Offensive { matched: "x".into() }.code(), "OFFENSIVE");
        assert_eq!(FilterRejection::Spam(SpamSignal::PhoneNumber).code(), "SPAM");
    }
}
