//! Post-processing of model text.
//!
//! The prompt asks the model to avoid stock phrases, but it does not always
//! comply. The normalizer is the second pass: it rewrites banned phrases,
//! fixes known entity misspellings and tidies the punctuation left behind.

/// A text transform applied to every free-text field before persistence.
pub trait TextNormalizer: Send + Sync {
    fn normalize(&self, text: &str) -> String;
}

/// Leaves text untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl TextNormalizer for Passthrough {
    fn normalize(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Banned phrase → replacement. Matched case-insensitively, in order.
pub const BLACKLISTED_PHRASES: &[(&str, &str)] = &[
    ("game-changer", "significant shift"),
    ("game changer", "significant shift"),
    ("non-negotiable", "essential"),
    ("the message is clear", ""),
    ("leveraging ai", "using AI"),
    ("leveraging", "using"),
    ("harnessing the power", "using"),
    ("those who can't keep up will be left behind", ""),
    ("it's crucial", "it matters"),
    ("the real deal", ""),
    ("paradigm shift", "structural change"),
    ("the landscape", "the market"),
    ("in today's rapidly", ""),
];

/// Known misspelling → correction. Matched case-sensitively.
pub const ENTITY_CORRECTIONS: &[(&str, &str)] = &[
    ("Enthropic", "Anthropic"),
    ("enthropic", "Anthropic"),
    ("Antrhropic", "Anthropic"),
];

/// Phrase blacklist plus entity corrections.
#[derive(Debug, Clone)]
pub struct BlacklistNormalizer {
    phrases: Vec<(String, String)>,
    corrections: Vec<(String, String)>,
}

impl Default for BlacklistNormalizer {
    fn default() -> Self {
        Self::new(BLACKLISTED_PHRASES, ENTITY_CORRECTIONS)
    }
}

impl BlacklistNormalizer {
    pub fn new(phrases: &[(&str, &str)], corrections: &[(&str, &str)]) -> Self {
        let own = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect::<Vec<_>>()
        };
        Self {
            phrases: own(phrases),
            corrections: own(corrections),
        }
    }
}

impl TextNormalizer for BlacklistNormalizer {
    fn normalize(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (phrase, replacement) in &self.phrases {
            out = replace_ascii_case_insensitive(&out, phrase, replacement);
        }
        for (wrong, right) in &self.corrections {
            out = out.replace(wrong.as_str(), right);
        }
        tidy_punctuation(&collapse_spaces(&out)).trim().to_string()
    }
}

/// Replace every ASCII-case-insensitive occurrence of `needle`.
///
/// ASCII lowering keeps byte offsets aligned with the original string.
fn replace_ascii_case_insensitive(haystack: &str, needle: &str, replacement: &str) -> String {
    if needle.is_empty() {
        return haystack.to_string();
    }
    let lower = haystack.to_ascii_lowercase();
    let needle = needle.to_ascii_lowercase();

    let mut out = String::with_capacity(haystack.len());
    let mut cursor = 0;
    while let Some(pos) = lower[cursor..].find(&needle) {
        let start = cursor + pos;
        out.push_str(&haystack[cursor..start]);
        out.push_str(replacement);
        cursor = start + needle.len();
    }
    out.push_str(&haystack[cursor..]);
    out
}

/// Runs of two or more spaces become one.
fn collapse_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_space = false;
    for ch in text.chars() {
        if ch == ' ' {
            if !prev_space {
                out.push(ch);
            }
            prev_space = true;
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out
}

/// Orphaned separator pairs such as "; ;" or ", ," collapse to a single comma.
fn tidy_punctuation(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == ';' || c == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == ';' || chars[j] == ',') {
                out.push(',');
                i = j + 1;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}
