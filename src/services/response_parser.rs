//! Parser for the three-label completion the vision model is prompted to produce.
//!
//! ```text
//! DESCRIPTION: <2-4 sentences>
//! KEYWORDS: [k1, k2, k3, k4, k5]
//! DETECTED_TEXT: [t1, t2] | No text detected
//! ```
//!
//! Parsing never fails. Missing sections fall back to placeholders so a
//! sloppy completion still produces a usable analysis record.

use crate::models::analysis::ExtractedAnalysis;

const DESCRIPTION_LABEL: &str = "DESCRIPTION:";
const KEYWORDS_LABEL: &str = "KEYWORDS:";
const DETECTED_TEXT_LABEL: &str = "DETECTED_TEXT:";

pub const MAX_KEYWORDS: usize = 5;

/// Characters of raw completion used when no description section is present.
const DESCRIPTION_FALLBACK_CHARS: usize = 300;

const FALLBACK_KEYWORDS: [&str; 5] = ["image", "photo", "picture", "visual", "content"];

const PLACEHOLDER_DESCRIPTION: &str = "Image analysis completed";
const PLACEHOLDER_KEYWORDS: [&str; 2] = ["image", "photo"];

/// Extract description, keywords and detected text from a model completion.
pub fn parse_model_response(raw: &str) -> ExtractedAnalysis {
    let Some(sections) = Sections::locate(raw) else {
        return placeholder();
    };

    let mut description = sections
        .description
        .map(clean_value)
        .unwrap_or_default();
    if description.is_empty() {
        description = raw.chars().take(DESCRIPTION_FALLBACK_CHARS).collect();
    }

    let mut keywords: Vec<String> = sections
        .keywords
        .map(|text| split_list(text).take(MAX_KEYWORDS).collect())
        .unwrap_or_default();
    if keywords.is_empty() {
        keywords = FALLBACK_KEYWORDS.iter().map(|k| k.to_string()).collect();
    }

    let detected_text = sections
        .detected_text
        .map(parse_detected_text)
        .unwrap_or_default();

    ExtractedAnalysis {
        description,
        keywords,
        detected_text,
    }
}

/// Result used when the completion carries none of the expected labels.
pub fn placeholder() -> ExtractedAnalysis {
    ExtractedAnalysis {
        description: PLACEHOLDER_DESCRIPTION.to_string(),
        keywords: PLACEHOLDER_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        detected_text: Vec::new(),
    }
}

/// Slices of the completion that follow each label.
struct Sections<'a> {
    description: Option<&'a str>,
    keywords: Option<&'a str>,
    detected_text: Option<&'a str>,
}

impl<'a> Sections<'a> {
    /// `None` when no label occurs at all.
    fn locate(raw: &'a str) -> Option<Self> {
        // ASCII uppercasing keeps byte offsets aligned with `raw`.
        let upper = raw.to_ascii_uppercase();
        let labels = [
            upper.find(DESCRIPTION_LABEL).map(|i| (i, DESCRIPTION_LABEL.len())),
            upper.find(KEYWORDS_LABEL).map(|i| (i, KEYWORDS_LABEL.len())),
            upper.find(DETECTED_TEXT_LABEL).map(|i| (i, DETECTED_TEXT_LABEL.len())),
        ];
        if labels.iter().all(Option::is_none) {
            return None;
        }

        let starts: Vec<usize> = labels.iter().flatten().map(|(i, _)| *i).collect();
        let section = |label: Option<(usize, usize)>| {
            label.map(|(start, len)| {
                let body_start = start + len;
                let end = starts
                    .iter()
                    .copied()
                    .filter(|&s| s > start)
                    .min()
                    .unwrap_or(raw.len());
                &raw[body_start..end.max(body_start)]
            })
        };

        Some(Self {
            description: section(labels[0]),
            keywords: section(labels[1]),
            detected_text: section(labels[2]),
        })
    }
}

fn parse_detected_text(text: &str) -> Vec<String> {
    let inner = strip_brackets(text);
    if inner.to_lowercase().contains("no text detected") {
        return Vec::new();
    }
    split_list(text)
        .filter(|entry| !entry.to_lowercase().contains("no text"))
        .collect()
}

fn split_list(text: &str) -> impl Iterator<Item = String> + '_ {
    strip_brackets(text)
        .split(',')
        .map(clean_value)
        .filter(|entry| !entry.is_empty())
}

fn strip_brackets(text: &str) -> &str {
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '*');
    let trimmed = trimmed.strip_prefix('[').unwrap_or(trimmed);
    trimmed.strip_suffix(']').unwrap_or(trimmed).trim()
}

/// Trim whitespace, markdown emphasis and quotes around a value.
fn clean_value(value: &str) -> String {
    value
        .trim_matches(|c: char| c.is_whitespace() || c == '*' || c == '"' || c == '\'')
        .to_string()
}
