//! Extended regular expressions
//!
//! A pattern is a disjunction of conjunctions of regex terms:
//!
//! ```text
//! loss & !val | accuracy
//! ```
//!
//! Operators must be surrounded by whitespace so that a plain regex like
//! `a|b` keeps its usual meaning. A term prefixed with `!` must *not* match.

use std::fmt;

use regex::Regex;

use crate::{Error, Result};

/// A single regex term, possibly negated.
#[derive(Debug, Clone)]
pub struct PatternTerm {
    regex: Regex,
    negated: bool,
}

impl PatternTerm {
    /// Source regex (without the negation marker).
    #[must_use]
    pub fn regex(&self) -> &str {
        self.regex.as_str()
    }

    /// Whether the term is negated.
    #[must_use]
    pub const fn is_negated(&self) -> bool {
        self.negated
    }

    fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text) != self.negated
    }
}

/// Parsed extended regex.
#[derive(Debug, Clone)]
pub struct ExtendedRegex {
    source: String,
    alternatives: Vec<Vec<PatternTerm>>,
}

impl ExtendedRegex {
    /// Parse and compile an extended regex.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilter` if the pattern is empty, has an empty term, or
    /// any term fails to compile.
    pub fn parse(source: &str) -> Result<Self> {
        if source.trim().is_empty() {
            return Err(Error::InvalidFilter("empty regex pattern".to_string()));
        }

        let alternatives = split_operator(source, '|')
            .into_iter()
            .map(|alternative| {
                split_operator(alternative, '&')
                    .into_iter()
                    .map(parse_term)
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            source: source.to_string(),
            alternatives,
        })
    }

    /// Original pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// OR-of-AND structure.
    #[must_use]
    pub fn alternatives(&self) -> &[Vec<PatternTerm>] {
        &self.alternatives
    }

    /// Whether the pattern is a single non-negated term.
    #[must_use]
    pub fn is_simple(&self) -> bool {
        self.alternatives.len() == 1
            && self.alternatives[0].len() == 1
            && !self.alternatives[0][0].negated
    }

    /// Test a string against the pattern.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.alternatives
            .iter()
            .any(|terms| terms.iter().all(|term| term.is_match(text)))
    }
}

impl PartialEq for ExtendedRegex {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for ExtendedRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Split on ` <op> ` (operator surrounded by whitespace).
fn split_operator(source: &str, op: char) -> Vec<&str> {
    let bytes = source.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;

    for (i, c) in source.char_indices() {
        if c != op || i == 0 || i + 1 >= bytes.len() {
            continue;
        }
        if bytes[i - 1].is_ascii_whitespace() && bytes[i + 1].is_ascii_whitespace() {
            parts.push(&source[start..i]);
            start = i + 1;
        }
    }
    parts.push(&source[start..]);
    parts
}

fn parse_term(raw: &str) -> Result<PatternTerm> {
    let trimmed = raw.trim();
    let (negated, body) = match trimmed.strip_prefix('!') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, trimmed),
    };

    if body.is_empty() {
        return Err(Error::InvalidFilter(format!(
            "empty term in extended regex near '{raw}'"
        )));
    }

    let regex = Regex::new(body)
        .map_err(|e| Error::InvalidFilter(format!("invalid regex '{body}': {e}")))?;
    Ok(PatternTerm { regex, negated })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_regex_alternation_untouched() {
        let p = ExtendedRegex::parse("loss|acc").unwrap();
        assert!(p.is_simple());
        assert!(p.is_match("metrics/loss"));
        assert!(p.is_match("metrics/acc"));
    }

    #[test]
    fn test_and_with_negation() {
        let p = ExtendedRegex::parse("loss & !val").unwrap();
        assert!(p.is_match("train/loss"));
        assert!(!p.is_match("val/loss"));
        assert!(!p.is_simple());
    }

    #[test]
    fn test_or_of_ands() {
        let p = ExtendedRegex::parse("^config/ & lr | ^metrics/").unwrap();
        assert_eq!(p.alternatives().len(), 2);
        assert!(p.is_match("config/lr"));
        assert!(!p.is_match("config/batch_size"));
        assert!(p.is_match("metrics/anything"));
    }

    #[test]
    fn test_invalid_regex() {
        assert!(matches!(
            ExtendedRegex::parse("(unclosed"),
            Err(Error::InvalidFilter(_))
        ));
        assert!(matches!(
            ExtendedRegex::parse("a & "),
            Err(Error::InvalidFilter(_))
        ));
        assert!(matches!(ExtendedRegex::parse("  "), Err(Error::InvalidFilter(_))));
    }
}
