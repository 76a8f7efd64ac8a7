//! Turning pasted text into an ordered, de-duplicated URL list.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

static URL_RE: OnceLock<Regex> = OnceLock::new();
static TRAILING_PUNCT_RE: OnceLock<Regex> = OnceLock::new();

fn url_re() -> &'static Regex {
    URL_RE.get_or_init(|| Regex::new(r#"(?i)https?://[^\s<>"']+"#).expect("valid url regex"))
}

fn trailing_punct_re() -> &'static Regex {
    TRAILING_PUNCT_RE.get_or_init(|| Regex::new(r"[),.;\]]+$").expect("valid punctuation regex"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrls {
    /// Every token after cleanup, duplicates included.
    pub cleaned: Vec<String>,
    /// First occurrence of each token, in input order.
    pub unique: Vec<String>,
}

impl ParsedUrls {
    pub fn duplicates(&self) -> usize {
        self.cleaned.len() - self.unique.len()
    }
}

/// Extract `http(s)://` tokens from `text`, or fall back to non-empty lines when
/// there are none. Trailing paste punctuation is stripped before de-duplication.
pub fn extract_urls(text: &str) -> ParsedUrls {
    let matches: Vec<&str> = url_re().find_iter(text).map(|m| m.as_str()).collect();
    let base: Vec<&str> = if matches.is_empty() {
        text.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
    } else {
        matches
    };

    let cleaned: Vec<String> = base
        .into_iter()
        .map(|u| trailing_punct_re().replace(u.trim(), "").into_owned())
        .filter(|u| !u.is_empty())
        .collect();

    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for u in &cleaned {
        if seen.insert(u.as_str()) {
            unique.push(u.clone());
        }
    }

    ParsedUrls { cleaned, unique }
}
