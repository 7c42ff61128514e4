//! Turns raw model text into candidate wordlist entries.
//!
//! Models are asked to wrap their answer in a tag (`<new_files_dirs>` or
//! `<full_filenames>`). Everything outside the tag, including `<think>`
//! reasoning blocks, is ignored. Lines that do not look like a single path
//! fragment are dropped without error: a generative source is noisy.

use crate::config::ConfigError;
use crate::model::ModelError;
use log::debug;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

pub const PATHS_TAG: &str = "new_files_dirs";
pub const SHORT_NAMES_TAG: &str = "full_filenames";

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?(?:</think>|\z)").expect("valid regex"));

static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*+•]|\d{1,3}[.)])\s+").expect("valid regex"));

pub trait SuggestionParser {
    /// Returns candidates in model order, deduplicated within the batch.
    ///
    /// `Err(ModelError::MalformedOutput)` means the answer tag was missing;
    /// callers treat that as zero candidates.
    fn parse(&self, raw: &str) -> Result<Vec<String>, ModelError>;
}

/// Removes `<think>` blocks (an unterminated block runs to the end).
pub fn strip_reasoning(raw: &str) -> String {
    THINK_BLOCK.replace_all(raw, "").into_owned()
}

/// Text inside every `<tag>...</tag>` pair, in order. `None` when no pair exists.
pub fn tagged_sections<'a>(text: &'a str, tag: &str) -> Option<Vec<&'a str>> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut sections = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(&open) {
        let body = &rest[start + open.len()..];
        let Some(end) = body.find(&close) else {
            break;
        };
        sections.push(&body[..end]);
        rest = &body[end + close.len()..];
    }
    if sections.is_empty() {
        None
    } else {
        Some(sections)
    }
}

/// Strips list markers, code/quote wrapping and a leading slash.
/// Returns `None` for blank lines and prose.
pub fn clean_line(line: &str) -> Option<&str> {
    let line = line.trim();
    let line = match LIST_MARKER.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    };
    let line = line
        .trim_matches(|c| matches!(c, '`' | '"' | '\''))
        .trim()
        .trim_start_matches('/');
    if line.is_empty() || line.chars().any(char::is_whitespace) {
        None
    } else {
        Some(line)
    }
}

fn candidate_lines(raw: &str, tag: &str) -> Result<Vec<String>, ModelError> {
    let text = strip_reasoning(raw);
    let sections = tagged_sections(&text, tag)
        .ok_or_else(|| ModelError::MalformedOutput(format!("no <{tag}> block in response")))?;
    Ok(sections
        .iter()
        .flat_map(|s| s.lines())
        .filter_map(clean_line)
        .map(str::to_string)
        .collect())
}

fn dedup_in_order(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Parser for the path-discovery loop.
#[derive(Debug, Clone)]
pub struct PathSuggestionParser {
    tag: String,
}

impl PathSuggestionParser {
    pub fn new() -> Self {
        Self::with_tag(PATHS_TAG)
    }

    pub fn with_tag(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

impl Default for PathSuggestionParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SuggestionParser for PathSuggestionParser {
    fn parse(&self, raw: &str) -> Result<Vec<String>, ModelError> {
        Ok(dedup_in_order(candidate_lines(raw, &self.tag)?))
    }
}

const SHORT_NAME_SPECIALS: &str = "!#$%&'()-@^_`{}~";

fn is_short_name_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || SHORT_NAME_SPECIALS.contains(c)
}

/// Splits an upper-case name into 8.3 stem and optional extension.
pub fn split_8_3(name: &str) -> Option<(&str, Option<&str>)> {
    let (stem, ext) = match name.split_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (name, None),
    };
    let stem_ok = (1..=8).contains(&stem.len()) && stem.chars().all(is_short_name_char);
    let ext_ok = ext.is_none_or(|e| {
        (1..=3).contains(&e.len()) && e.chars().all(is_short_name_char) && !e.contains('.')
    });
    (stem_ok && ext_ok).then_some((stem, ext))
}

/// The short name reported by a scanner, e.g. `BENCHM~1.PDF`.
///
/// Candidates must share its prefix (the part before `~`) and, when the
/// target carries an extension, start their extension with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortNamePattern {
    name: String,
    prefix: String,
    extension: Option<String>,
}

impl ShortNamePattern {
    pub fn parse(target: &str) -> Result<Self, ConfigError> {
        let name = target.trim().to_ascii_uppercase();
        let (stem, ext) =
            split_8_3(&name).ok_or_else(|| ConfigError::InvalidShortName(target.to_string()))?;
        let prefix = stem.split('~').next().unwrap_or_default().to_string();
        if prefix.is_empty() {
            return Err(ConfigError::InvalidShortName(target.to_string()));
        }
        let extension = ext.map(str::to_string);
        Ok(Self {
            name,
            prefix,
            extension,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `candidate` must already be upper case.
    pub fn matches(&self, candidate: &str) -> bool {
        let Some((stem, ext)) = split_8_3(candidate) else {
            return false;
        };
        if !stem.starts_with(&self.prefix) {
            return false;
        }
        match (&self.extension, ext) {
            (None, _) => true,
            (Some(want), Some(got)) => got.starts_with(want.as_str()),
            (Some(_), None) => false,
        }
    }
}

/// Parser for the 8.3 loop: upper-cases and keeps names that fit the target.
#[derive(Debug, Clone)]
pub struct ShortNameParser {
    tag: String,
    pattern: ShortNamePattern,
}

impl ShortNameParser {
    pub fn new(pattern: ShortNamePattern) -> Self {
        Self {
            tag: SHORT_NAMES_TAG.to_string(),
            pattern,
        }
    }

    pub fn pattern(&self) -> &ShortNamePattern {
        &self.pattern
    }
}

impl SuggestionParser for ShortNameParser {
    fn parse(&self, raw: &str) -> Result<Vec<String>, ModelError> {
        let lines = candidate_lines(raw, &self.tag)?;
        let valid = lines.into_iter().filter_map(|line| {
            let upper = line.to_ascii_uppercase();
            if self.pattern.matches(&upper) {
                Some(upper)
            } else {
                debug!("Dropping '{line}': not an 8.3 match for {}", self.pattern.as_str());
                None
            }
        });
        Ok(dedup_in_order(valid))
    }
}
