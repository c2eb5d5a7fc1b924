//! Construction helpers for assembling mungers without the parser
//!
//! The test suites (and embedders that build programs programmatically) use
//! these to keep munger trees readable. Locators and replacements accept
//! anything convertible: a `&str` becomes a literal on either side.

use crate::munger::locating::{Locator, PatternFlags};
use crate::munger::munging::{Limit, Munger, Rule, Ruleset, Sequence};

/// A literal locator.
pub fn lit(text: &str) -> Locator {
    Locator::literal(text)
}

/// A pattern locator with default flags; panics on an invalid pattern, so
/// only use with known-good sources.
pub fn pat(source: &str) -> Locator {
    Locator::pattern(source, PatternFlags::default()).expect("test pattern compiles")
}

/// A single rule.
pub fn rule(locator: impl Into<Locator>, replace: impl Into<Munger>) -> Rule {
    Rule {
        locator: locator.into(),
        replace: replace.into(),
    }
}

/// A ruleset munger.
pub fn ruleset(limit: Limit, rules: Vec<Rule>) -> Munger {
    Munger::Ruleset(Ruleset::new(limit, rules))
}

/// An unbounded ruleset with one rule, the most common munger shape.
pub fn single_rule(locator: impl Into<Locator>, replace: impl Into<Munger>) -> Munger {
    ruleset(Limit::Unbounded, vec![rule(locator, replace)])
}

/// A sequence munger.
pub fn sequence(limit: Limit, steps: Vec<Munger>) -> Munger {
    Munger::Sequence(Sequence::new(limit, steps))
}
