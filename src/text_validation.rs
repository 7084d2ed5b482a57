//! # Text Quality Validation Module
//!
//! Scores and cleans the text a recognition engine returns.
//!
//! Correction runs in a fixed order:
//!
//! - Unicode NFKC normalization (ligatures, full-width forms)
//! - A literal table of glyph substitutions that are safe anywhere
//! - Contextual digit/letter disambiguation (`0/O`, `1/l`, `5/S`)
//! - Whitespace collapsing, punctuation spacing and sentence capitalization
//!
//! Every step maps its own output to itself, so correcting already corrected
//! text changes nothing.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use unicode_normalization::UnicodeNormalization;

use crate::ocr_config::DEFAULT_LANGUAGE;

const WORD_VALIDITY_WEIGHT: f32 = 0.3;
const PUNCTUATION_WEIGHT: f32 = 0.2;
const CAPITALIZATION_WEIGHT: f32 = 0.2;
const SPECIAL_CHAR_WEIGHT: f32 = 0.2;
const LINE_CONSISTENCY_WEIGHT: f32 = 0.1;

/// Characters that rarely belong in prose and usually mark recognition noise.
const SPECIAL_CHARACTERS: &str = "~`@#$%^&*+={}|[]\\:\";'<>?/";

/// Glyph substitutions applied literally. No replacement contains a key.
const CONFUSABLE_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("\u{00A2}", "c"),
    ("\u{00A3}", "E"),
    ("\u{00A7}", "s"),
    ("\u{2018}", "'"),
    ("\u{2019}", "'"),
    ("\u{201C}", "\""),
    ("\u{201D}", "\""),
    ("\u{2013}", "-"),
    ("\u{2014}", "-"),
    ("\u{00AD}", ""),
];

/// Letters that recognition engines emit in place of digits.
const DIGIT_SHAPED_LETTERS: &[char] = &['O', 'o', 'S', 's', 'l'];

lazy_static! {
    static ref WORD_PATTERN: Regex = Regex::new(r"\b\w+\b").expect("Invalid word regex pattern");
    static ref TOKEN_PATTERN: Regex =
        Regex::new(r"[\p{L}\p{N}]+").expect("Invalid token regex pattern");
    static ref SENTENCE_SPLIT: Regex = Regex::new(r"[.!?]+").expect("Invalid sentence regex pattern");
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").expect("Invalid whitespace regex pattern");
    static ref EXTRA_BLANK_LINES: Regex =
        Regex::new(r"\n{3,}").expect("Invalid blank line regex pattern");
    static ref SPACE_BEFORE_PUNCTUATION: Regex =
        Regex::new(r" +([,.;:!?])").expect("Invalid punctuation regex pattern");
    static ref SPACE_AFTER_OPENING: Regex =
        Regex::new(r"([(\[¿¡]) +").expect("Invalid opening bracket regex pattern");
    static ref SPACE_BEFORE_CLOSING: Regex =
        Regex::new(r" +([)\]])").expect("Invalid closing bracket regex pattern");
    static ref SENTENCE_START: Regex =
        Regex::new(r"(^|[.!?]\s+)(\p{Ll})").expect("Invalid sentence start regex pattern");
    static ref EMAIL_PATTERN: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
            .expect("Invalid email regex pattern");
    static ref URL_PATTERN: Regex =
        Regex::new(r#"https?://[^\s<>"']+"#).expect("Invalid URL regex pattern");
    static ref PHONE_PATTERN: Regex =
        Regex::new(r"\+?\d[\d ().-]{5,}\d").expect("Invalid phone regex pattern");
    static ref DATE_PATTERN: Regex =
        Regex::new(r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b").expect("Invalid date regex pattern");
    static ref NUMBER_PATTERN: Regex =
        Regex::new(r"\b\d+(?:[.,]\d+)*\b").expect("Invalid number regex pattern");
}

/// Function words and accents for one recognition language.
#[derive(Debug)]
struct Lexicon {
    articles: &'static [&'static str],
    prepositions: &'static [&'static str],
    common_words: &'static [&'static str],
    accented: &'static str,
}

impl Lexicon {
    fn is_article(&self, word: &str) -> bool {
        self.articles.contains(&word)
    }

    fn is_function_word(&self, word: &str) -> bool {
        self.is_article(word) || self.prepositions.contains(&word)
    }
}

static SPANISH: Lexicon = Lexicon {
    articles: &["el", "la", "los", "las", "un", "una", "unos", "unas"],
    prepositions: &[
        "a", "ante", "bajo", "con", "contra", "de", "desde", "en", "entre", "hacia", "hasta",
        "para", "por", "según", "sin", "sobre", "tras",
    ],
    common_words: &[
        "que", "de", "a", "en", "un", "es", "se", "no", "te", "lo", "le", "da", "su", "por",
        "son", "con", "para", "al", "la", "el", "del", "los", "las", "y", "una",
    ],
    accented: "ñáéíóúü",
};

static ENGLISH: Lexicon = Lexicon {
    articles: &["the", "a", "an"],
    prepositions: &[
        "of", "in", "on", "at", "to", "for", "with", "from", "by", "into", "over", "under",
        "about",
    ],
    common_words: &[
        "the", "of", "and", "to", "a", "in", "is", "it", "that", "for", "on", "with", "as",
        "was", "at", "by", "be", "this", "are", "from", "or", "not",
    ],
    accented: "",
};

/// Picks the lexicon of the first recognised code in a `+`-joined language tag.
fn lexicon_for(language: &str) -> Option<&'static Lexicon> {
    language
        .split('+')
        .find_map(|code| match code.trim().to_lowercase().as_str() {
            "spa" | "es" | "spanish" => Some(&SPANISH),
            "eng" | "en" | "english" => Some(&ENGLISH),
            _ => None,
        })
}

/// Text-level quality signals, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TextQualityMetrics {
    /// Share of word tokens longer than one character and purely alphabetic
    pub word_validity_ratio: f32,
    /// How plausible the average sentence length is
    pub punctuation_score: f32,
    /// Share of sentences starting with an uppercase letter
    pub capitalization_score: f32,
    /// Share of characters drawn from the noise-symbol set
    pub special_char_ratio: f32,
    /// Inverse spread of line lengths
    pub line_consistency: f32,
    pub composite: f32,
}

/// Machine-readable fragments found in recognized text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredData {
    pub emails: Vec<String>,
    pub urls: Vec<String>,
    pub phones: Vec<String>,
    pub dates: Vec<String>,
    pub numbers: Vec<String>,
}

/// Configuration for text correction
#[derive(Debug, Clone)]
pub struct TextValidatorConfig {
    /// Recognition language tag, e.g. `spa` or `spa+eng`
    pub language: String,
    /// Whether to apply the literal glyph substitution table
    pub enable_confusable_substitutions: bool,
    /// Whether to disambiguate digits and letters from their surroundings
    pub enable_contextual_correction: bool,
    /// Whether to fix spacing around punctuation and brackets
    pub enable_punctuation_fixes: bool,
    /// Whether to uppercase the first letter of each sentence
    pub enable_capitalization: bool,
}

impl Default for TextValidatorConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            enable_confusable_substitutions: true,
            enable_contextual_correction: true,
            enable_punctuation_fixes: true,
            enable_capitalization: true,
        }
    }
}

/// Scores and corrects recognized text for one language.
#[derive(Debug, Clone)]
pub struct TextQualityValidator {
    config: TextValidatorConfig,
    lexicon: Option<&'static Lexicon>,
}

impl TextQualityValidator {
    /// Create a validator for the given language with default settings
    pub fn new(language: &str) -> Self {
        Self::with_config(TextValidatorConfig {
            language: language.to_string(),
            ..TextValidatorConfig::default()
        })
    }

    /// Create a validator with custom configuration
    pub fn with_config(config: TextValidatorConfig) -> Self {
        let lexicon = lexicon_for(&config.language);
        if lexicon.is_none() {
            debug!(
                language = %config.language,
                "No function-word lexicon for language, contextual correction limited to token shape"
            );
        }
        Self { config, lexicon }
    }

    pub fn language(&self) -> &str {
        &self.config.language
    }

    /// Cleans recognized text.
    ///
    /// Running this on its own output returns that output unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use doc_quality::text_validation::TextQualityValidator;
    ///
    /// let validator = TextQualityValidator::new("spa");
    /// assert_eq!(validator.correct("de 1a casa"), "De la casa");
    /// ```
    pub fn correct(&self, text: &str) -> String {
        let mut corrected: String = text.nfkc().collect();

        if self.config.enable_confusable_substitutions {
            corrected = apply_confusable_substitutions(&corrected);
        }
        if self.config.enable_contextual_correction {
            corrected = self.contextual_number_letter_correction(&corrected);
        }

        corrected = normalize_whitespace(&corrected);

        if self.config.enable_punctuation_fixes {
            corrected = fix_punctuation(&corrected);
        }
        if self.config.enable_capitalization {
            corrected = fix_capitalization(&corrected);
        }

        let corrected = corrected.trim().to_string();
        if corrected != text {
            debug!(
                original_len = text.len(),
                corrected_len = corrected.len(),
                "Applied text corrections"
            );
        }
        corrected
    }

    /// Resolves digit/letter confusions inside alphanumeric tokens.
    ///
    /// A token made of digits plus a few digit-shaped letters reads as a
    /// number (`2O24` becomes `2024`). A token that is mostly letters, or that
    /// follows a function word or precedes an article, reads as a word
    /// (`h0la` becomes `hola`, `de 1a` becomes `de la`). Plain numbers are
    /// never rewritten.
    pub fn contextual_number_letter_correction(&self, text: &str) -> String {
        let tokens: Vec<regex::Match> = TOKEN_PATTERN.find_iter(text).collect();
        if tokens.is_empty() {
            return text.to_string();
        }

        // Keys fold both spellings of an ambiguous glyph together so that the
        // neighbourhood of a token looks the same before and after correction
        let keys: Vec<String> = tokens.iter().map(|token| context_key(token.as_str())).collect();

        let mut corrected = String::with_capacity(text.len());
        let mut cursor = 0;

        for (index, token) in tokens.iter().enumerate() {
            let near_function_word = self.lexicon.is_some_and(|lexicon| {
                let after_function_word =
                    index > 0 && lexicon.is_function_word(&keys[index - 1]);
                let before_article = keys
                    .get(index + 1)
                    .is_some_and(|next| lexicon.is_article(next));
                after_function_word || before_article
            });

            corrected.push_str(&text[cursor..token.start()]);
            match correct_token(token.as_str(), near_function_word) {
                Some(replacement) => {
                    trace!(from = token.as_str(), to = %replacement, "Contextual glyph correction");
                    corrected.push_str(&replacement);
                }
                None => corrected.push_str(token.as_str()),
            }
            cursor = token.end();
        }

        corrected.push_str(&text[cursor..]);
        corrected
    }

    /// Computes the text-level quality signals. Empty text scores zero.
    pub fn score(&self, text: &str) -> TextQualityMetrics {
        if text.trim().is_empty() {
            return TextQualityMetrics::default();
        }

        let word_validity_ratio = word_validity_ratio(text);
        let (punctuation_score, capitalization_score) = sentence_scores(text);
        let special_char_ratio = special_char_ratio(text);
        let line_consistency = line_consistency(text);

        let composite = (word_validity_ratio * WORD_VALIDITY_WEIGHT
            + punctuation_score * PUNCTUATION_WEIGHT
            + capitalization_score * CAPITALIZATION_WEIGHT
            + (1.0 - special_char_ratio) * SPECIAL_CHAR_WEIGHT
            + line_consistency * LINE_CONSISTENCY_WEIGHT)
            .clamp(0.0, 1.0);

        trace!(
            word_validity_ratio,
            punctuation_score,
            capitalization_score,
            special_char_ratio,
            line_consistency,
            composite,
            "Scored text quality"
        );

        TextQualityMetrics {
            word_validity_ratio,
            punctuation_score,
            capitalization_score,
            special_char_ratio,
            line_consistency,
            composite,
        }
    }

    /// Pulls emails, URLs, phone numbers, dates and numbers out of the text.
    pub fn extract_structured_data(&self, text: &str) -> StructuredData {
        let trailing = |s: &str| {
            s.trim_end_matches(|c: char| ".,;:!?)".contains(c))
                .to_string()
        };

        StructuredData {
            emails: EMAIL_PATTERN
                .find_iter(text)
                .map(|m| m.as_str().to_string())
                .collect(),
            urls: URL_PATTERN.find_iter(text).map(|m| trailing(m.as_str())).collect(),
            phones: PHONE_PATTERN
                .find_iter(text)
                .map(|m| m.as_str().trim().to_string())
                .filter(|candidate| {
                    let digits = candidate.chars().filter(char::is_ascii_digit).count();
                    (7..=15).contains(&digits)
                })
                .collect(),
            dates: DATE_PATTERN
                .find_iter(text)
                .map(|m| m.as_str().to_string())
                .collect(),
            numbers: NUMBER_PATTERN
                .find_iter(text)
                .map(|m| m.as_str().to_string())
                .collect(),
        }
    }

    /// How strongly the text looks like the validator's language, in [0, 1].
    ///
    /// The share of distinct words found in the language's common-word list,
    /// plus a bonus of up to 0.2 for language-specific accented letters.
    pub fn detect_language_confidence(&self, text: &str) -> f32 {
        let Some(lexicon) = self.lexicon else {
            return 0.0;
        };

        let lower = text.to_lowercase();
        let words: HashSet<&str> = WORD_PATTERN.find_iter(&lower).map(|m| m.as_str()).collect();
        if words.is_empty() {
            return 0.0;
        }

        let common = words
            .iter()
            .filter(|word| lexicon.common_words.contains(*word))
            .count();
        let mut confidence = common as f32 / words.len() as f32;

        if !lexicon.accented.is_empty() {
            let total = lower.chars().count() as f32;
            let accented = lower.chars().filter(|c| lexicon.accented.contains(*c)).count() as f32;
            confidence += (accented / total).min(0.2);
        }

        confidence.min(1.0)
    }
}

impl Default for TextQualityValidator {
    fn default() -> Self {
        Self::with_config(TextValidatorConfig::default())
    }
}

fn apply_confusable_substitutions(text: &str) -> String {
    let mut result = text.to_string();
    for (from, to) in CONFUSABLE_SUBSTITUTIONS {
        if result.contains(from) {
            result = result.replace(from, to);
        }
    }
    result
}

fn context_key(token: &str) -> String {
    token
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            '0' => 'o',
            '1' => 'l',
            '5' => 's',
            other => other,
        })
        .collect()
}

/// Returns the corrected token, or `None` when it stays as is.
fn correct_token(token: &str, near_function_word: bool) -> Option<String> {
    let digits = token.chars().filter(char::is_ascii_digit).count();
    let letters = token.chars().filter(|c| c.is_alphabetic()).count();
    if digits == 0 || letters == 0 {
        return None;
    }

    let digit_shaped = token
        .chars()
        .filter(|c| DIGIT_SHAPED_LETTERS.contains(c))
        .count();
    if digit_shaped == letters && digits > digit_shaped {
        return Some(
            token
                .chars()
                .map(|c| match c {
                    'O' | 'o' => '0',
                    'S' | 's' => '5',
                    'l' => '1',
                    other => other,
                })
                .collect(),
        );
    }

    let has_ambiguous_digit = token.chars().any(|c| matches!(c, '0' | '1' | '5'));
    if !has_ambiguous_digit || !(near_function_word || letters > digits) {
        return None;
    }

    let uppercase = token
        .chars()
        .filter(|c| c.is_alphabetic())
        .all(char::is_uppercase);
    Some(
        token
            .chars()
            .map(|c| match c {
                '0' if uppercase => 'O',
                '0' => 'o',
                '5' if uppercase => 'S',
                '5' => 's',
                '1' => 'l',
                other => other,
            })
            .collect(),
    )
}

/// Collapses runs of spaces within lines and keeps at most one blank line.
fn normalize_whitespace(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<String> = unified
        .split('\n')
        .map(|line| WHITESPACE_RUN.replace_all(line.trim(), " ").into_owned())
        .collect();
    let joined = lines.join("\n");
    EXTRA_BLANK_LINES
        .replace_all(joined.trim(), "\n\n")
        .into_owned()
}

fn fix_punctuation(text: &str) -> String {
    let text = SPACE_BEFORE_PUNCTUATION.replace_all(text, "$1");
    let text = SPACE_AFTER_OPENING.replace_all(&text, "$1");
    let text = SPACE_BEFORE_CLOSING.replace_all(&text, "$1");

    text.split('\n')
        .map(|line| {
            line.split(' ')
                .map(space_after_punctuation)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inserts a space after clause punctuation glued to the next word.
///
/// Decimal separators and times stay intact because a digit never triggers
/// the space; addresses and links are skipped whole.
fn space_after_punctuation(word: &str) -> String {
    if word.contains('@') || word.contains("://") || word.starts_with("www.") {
        return word.to_string();
    }

    let chars: Vec<char> = word.chars().collect();
    let mut result = String::with_capacity(word.len() + 2);
    for (index, &c) in chars.iter().enumerate() {
        result.push(c);
        if let Some(&next) = chars.get(index + 1) {
            let needs_space = match c {
                ',' | ';' | ':' | '!' | '?' => next.is_alphabetic(),
                '.' => next.is_uppercase(),
                _ => false,
            };
            if needs_space {
                result.push(' ');
            }
        }
    }
    result
}

fn fix_capitalization(text: &str) -> String {
    SENTENCE_START
        .replace_all(text, |caps: &Captures| {
            let letter = &caps[2];
            let mut upper = letter.chars().flat_map(char::to_uppercase);
            let replacement = match (upper.next(), upper.next()) {
                (Some(single), None) => single.to_string(),
                _ => letter.to_string(),
            };
            format!("{}{}", &caps[1], replacement)
        })
        .into_owned()
}

fn word_validity_ratio(text: &str) -> f32 {
    let words: Vec<&str> = WORD_PATTERN.find_iter(text).map(|m| m.as_str()).collect();
    if words.is_empty() {
        return 0.0;
    }
    let valid = words
        .iter()
        .filter(|word| word.chars().count() > 1 && word.chars().all(char::is_alphabetic))
        .count();
    valid as f32 / words.len() as f32
}

/// Returns (punctuation score, capitalization score).
fn sentence_scores(text: &str) -> (f32, f32) {
    let pieces: Vec<&str> = SENTENCE_SPLIT.split(text).collect();
    let sentences: Vec<&str> = pieces
        .iter()
        .map(|piece| piece.trim())
        .filter(|piece| !piece.is_empty())
        .collect();
    if sentences.is_empty() {
        return (0.0, 0.0);
    }

    let punctuation = if pieces.len() < 2 {
        0.5
    } else {
        let total_words: usize = sentences.iter().map(|s| s.split_whitespace().count()).sum();
        let average = total_words as f32 / sentences.len() as f32;
        if (10.0..=25.0).contains(&average) {
            1.0
        } else if (5.0..=35.0).contains(&average) {
            0.7
        } else {
            0.3
        }
    };

    let capitalized = sentences
        .iter()
        .filter(|s| s.chars().next().is_some_and(char::is_uppercase))
        .count();

    (punctuation, capitalized as f32 / sentences.len() as f32)
}

fn special_char_ratio(text: &str) -> f32 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let special = text.chars().filter(|c| SPECIAL_CHARACTERS.contains(*c)).count();
    special as f32 / total as f32
}

fn line_consistency(text: &str) -> f32 {
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() < 2 {
        return 1.0;
    }

    let lengths: Vec<f64> = lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.chars().count() as f64)
        .collect();
    if lengths.is_empty() {
        return 0.0;
    }

    let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
    let variance = lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / lengths.len() as f64;
    (1.0 / (1.0 + variance / 100.0)) as f32
}
