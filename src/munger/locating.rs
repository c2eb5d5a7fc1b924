//! Locators find the next occurrence of something in a string
//!
//! A locator is a strategy for finding text to act on: a literal substring,
//! a compiled pattern, or a named reference resolved through the
//! [`Context`](crate::munger::context::Context) at evaluation time. The
//! composite algorithms in [`munging`](crate::munger::munging) only ever use
//! the search surface defined here (`find_from`, `find_anchored`,
//! `find_all`) and never branch on the locator kind themselves.
//!
//! Every search is a fresh search: no cursor state survives between calls,
//! so logically independent searches can never leak into each other.

use crate::munger::context::Context;
use regex::{Regex, RegexBuilder};

/// Pattern options fixed when a `/regex/` literal is compiled.
///
/// These correspond to the `i`, `m`, and `s` flag letters of the surface
/// syntax.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatternFlags {
    pub case_insensitive: bool,
    pub multi_line: bool,
    pub dot_matches_new_line: bool,
}

impl PatternFlags {
    /// Build flags from a string of flag letters, e.g. `"is"`.
    pub fn from_letters(letters: &str) -> Self {
        PatternFlags {
            case_insensitive: letters.contains('i'),
            multi_line: letters.contains('m'),
            dot_matches_new_line: letters.contains('s'),
        }
    }
}

/// A way of finding the next occurrence of something in a string.
#[derive(Debug, Clone)]
pub enum Locator {
    /// Case-sensitive substring search. The empty literal matches zero-width
    /// at every position.
    Literal(String),
    /// Compiled pattern search.
    Pattern(Regex),
    /// Indirect reference, resolved against the Context when the enclosing
    /// composite starts evaluating.
    Named(String),
}

/// A successful locator search.
///
/// `start` is a byte offset into the value that was scanned, which is the
/// value a composite is currently working on, not the original top-level
/// input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub start: usize,
    pub text: String,
    /// Captured substrings, in group order; unmatched groups are empty.
    /// Always empty for literal matches.
    pub groups: Vec<String>,
}

impl Match {
    /// The whole-value match a top-level `munge` call starts from.
    pub fn whole(text: impl Into<String>) -> Self {
        Match {
            start: 0,
            text: text.into(),
            groups: Vec::new(),
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

impl From<&str> for Locator {
    fn from(text: &str) -> Self {
        Locator::Literal(text.to_string())
    }
}

impl From<String> for Locator {
    fn from(text: String) -> Self {
        Locator::Literal(text)
    }
}

impl Locator {
    pub fn literal(text: impl Into<String>) -> Self {
        Locator::Literal(text.into())
    }

    /// Compile a pattern locator from source and flags.
    pub fn pattern(source: &str, flags: PatternFlags) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(source)
            .case_insensitive(flags.case_insensitive)
            .multi_line(flags.multi_line)
            .dot_matches_new_line(flags.dot_matches_new_line)
            .build()?;
        Ok(Locator::Pattern(regex))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Locator::Named(name.into())
    }

    /// Resolve an indirect locator against the context.
    ///
    /// Named locators consult the `loc()` table first, then fall back to the
    /// current value of the register with the same name, taken as a literal.
    /// An unresolved name yields `None`, which the composites treat as
    /// "never matches". Resolution happens once, at the start of the
    /// enclosing composite's evaluation.
    pub fn resolve(&self, ctx: &Context) -> Option<Locator> {
        match self {
            Locator::Named(name) => {
                if let Some(locator) = ctx.locators.get(name) {
                    return Some(locator.clone());
                }
                ctx.registers
                    .get(name)
                    .map(|value| Locator::Literal(value.clone()))
            }
            other => Some(other.clone()),
        }
    }

    /// Find the first match starting at or after `start`.
    ///
    /// A `start` beyond the end of the haystack never matches. Unresolved
    /// named locators never match.
    pub fn find_from(&self, haystack: &str, start: usize) -> Option<Match> {
        if start > haystack.len() {
            return None;
        }
        match self {
            Locator::Literal(text) => haystack[start..].find(text.as_str()).map(|i| Match {
                start: start + i,
                text: text.clone(),
                groups: Vec::new(),
            }),
            Locator::Pattern(regex) => regex.captures_at(haystack, start).map(|caps| {
                let whole = caps.get(0).expect("capture 0 always participates");
                Match {
                    start: whole.start(),
                    text: whole.as_str().to_string(),
                    groups: caps
                        .iter()
                        .skip(1)
                        .map(|g| g.map_or_else(String::new, |g| g.as_str().to_string()))
                        .collect(),
                }
            }),
            Locator::Named(_) => None,
        }
    }

    /// Find a match starting exactly at `start`, or fail.
    ///
    /// Because `find_from` reports the leftmost match, a leftmost match that
    /// begins past `start` means no match begins at `start` itself.
    pub fn find_anchored(&self, haystack: &str, start: usize) -> Option<Match> {
        self.find_from(haystack, start)
            .filter(|m| m.start == start)
    }

    /// Enumerate every non-overlapping match, left to right.
    ///
    /// Zero-width matches advance the scan by one character so enumeration
    /// always terminates.
    pub fn find_all(&self, haystack: &str) -> Vec<Match> {
        let mut matches = Vec::new();
        let mut from = 0;
        while let Some(m) = self.find_from(haystack, from) {
            from = if m.text.is_empty() {
                advance_one(haystack, m.start)
            } else {
                m.end()
            };
            matches.push(m);
        }
        matches
    }
}

/// One position past `index`, landing on a character boundary.
///
/// Past the end of the string this returns `len + 1`, which no search
/// accepts; used to retire zero-width matches at the very end.
pub(crate) fn advance_one(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len() + 1;
    }
    let mut next = index + 1;
    while !s.is_char_boundary(next) {
        next += 1;
    }
    next
}
