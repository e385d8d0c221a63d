use regex::{NoExpand, Regex, RegexBuilder};

use crate::error::EngineError;

/// Matcher for file and directory names, compiled from either a raw regular
/// expression or a list of double-quoted wildcard filters such as
/// `"*.txt" "*.md"`.
#[derive(Debug, Clone)]
pub struct NameMatcher {
    regex: Regex,
}

impl NameMatcher {
    pub fn compile(
        source: &str,
        is_regex: bool,
        case_sensitive: bool,
    ) -> Result<Self, EngineError> {
        let pattern = if is_regex {
            source.to_string()
        } else {
            wildcard_filters_to_regex(source)
                .ok_or_else(|| EngineError::invalid_pattern(source, "no quoted wildcard filters"))?
        };

        if pattern.is_empty() {
            return Err(EngineError::invalid_pattern(source, "empty pattern"));
        }

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|err| EngineError::invalid_pattern(source, err.to_string()))?;

        Ok(Self { regex })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// Search condition for line contents and for name-replace matching.
///
/// Literal mode is plain substring containment with a case-sensitivity flag;
/// it is compiled down to an escaped regex so that matching and replacement
/// share one code path, but capture-group expansion stays disabled.
#[derive(Debug, Clone)]
pub struct SearchCondition {
    regex: Regex,
    literal: bool,
}

impl SearchCondition {
    pub fn compile(
        text: &str,
        is_regex: bool,
        case_sensitive: bool,
    ) -> Result<Self, EngineError> {
        if text.is_empty() {
            return Err(EngineError::invalid_pattern(text, "empty search text"));
        }

        let pattern = if is_regex {
            text.to_string()
        } else {
            regex::escape(text)
        };

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|err| EngineError::invalid_pattern(text, err.to_string()))?;

        Ok(Self {
            regex,
            literal: !is_regex,
        })
    }

    pub fn matches(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }

    /// Replaces every occurrence in `haystack`. Regex mode supports `$1`
    /// style capture references; literal mode inserts the replacement as-is.
    pub fn apply(&self, haystack: &str, replacement: &str) -> String {
        if self.literal {
            self.regex.replace_all(haystack, NoExpand(replacement)).into_owned()
        } else {
            self.regex.replace_all(haystack, replacement).into_owned()
        }
    }
}

/// Extracts every `"..."` delimited filter from `source` and combines the
/// translated wildcards into one alternation. Returns `None` when no quoted
/// filter is present.
fn wildcard_filters_to_regex(source: &str) -> Option<String> {
    let mut filters = Vec::new();
    let mut rest = source;
    while let Some(start) = rest.find('"') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('"') else {
            break;
        };
        filters.push(&after[..end]);
        rest = &after[end + 1..];
    }

    if filters.is_empty() {
        return None;
    }

    let translated: Vec<String> = filters.iter().map(|f| wildcard_to_regex(f)).collect();
    Some(translated.join("|"))
}

/// Standard glob semantics, anchored: `*` matches any run of characters,
/// `?` matches exactly one, everything else is literal.
fn wildcard_to_regex(filter: &str) -> String {
    let mut out = String::with_capacity(filter.len() + 8);
    out.push_str("^(?:");
    for ch in filter.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }
    out.push_str(")$");
    out
}
