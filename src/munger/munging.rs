//! The munger evaluation core
//!
//! A munger is one node of the rewriting language: a replacement literal, a
//! scanning ruleset, an ordered sequence, a repeat-to-fixed-point wrapper, a
//! last-occurrence rule, a side-effect-only wrapper, or a proc. The union is
//! closed (evaluation dispatches over exactly these variants) and a munger
//! tree is immutable once built; evaluation only ever mutates the
//! [`Context`].
//!
//! The single entry point is [`munge`], which normalizes line endings,
//! builds a fresh context, and evaluates the program against the whole input
//! as one big match.

use crate::munger::context::Context;
use crate::munger::error::MungeError;
use crate::munger::locating::{advance_one, Locator, Match};
use crate::munger::proc::Proc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Inputs are normalized so locator offsets never see `\r`
static LINE_ENDINGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r\n?").unwrap());

/// One node of the rewriting language.
#[derive(Debug, Clone)]
pub enum Munger {
    /// Replace with this exact text
    Literal(String),
    Ruleset(Ruleset),
    Sequence(Sequence),
    /// Re-apply the inner munger until its output stops changing.
    ///
    /// There is deliberately no iteration cap: a transformation that never
    /// converges is an authoring error and will loop.
    Repeater(Box<Munger>),
    /// Apply a rule to the final occurrence of its locator only
    Last(Box<Rule>),
    /// Evaluate for register/array effects, discard the result
    SideEffects(Box<Munger>),
    Proc(Proc),
}

/// A locator paired with the munger that replaces what it finds.
#[derive(Debug, Clone)]
pub struct Rule {
    pub locator: Locator,
    pub replace: Munger,
}

/// How many matches (Ruleset) or changed steps (Sequence) are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Unbounded,
    Max(usize),
}

impl Limit {
    pub fn allows(self, count: usize) -> bool {
        match self {
            Limit::Unbounded => true,
            Limit::Max(n) => count < n,
        }
    }
}

/// Scans a value left to right, replacing matches of its rules as it goes.
#[derive(Debug, Clone)]
pub struct Ruleset {
    pub rules: Vec<Rule>,
    pub limit: Limit,
}

/// Runs each step over the whole current value, in declaration order.
#[derive(Debug, Clone)]
pub struct Sequence {
    pub steps: Vec<Munger>,
    pub limit: Limit,
}

impl From<&str> for Munger {
    fn from(text: &str) -> Self {
        Munger::Literal(text.to_string())
    }
}

impl From<String> for Munger {
    fn from(text: String) -> Self {
        Munger::Literal(text)
    }
}

impl From<Proc> for Munger {
    fn from(proc: Proc) -> Self {
        Munger::Proc(proc)
    }
}

impl From<Ruleset> for Munger {
    fn from(ruleset: Ruleset) -> Self {
        Munger::Ruleset(ruleset)
    }
}

impl From<Sequence> for Munger {
    fn from(sequence: Sequence) -> Self {
        Munger::Sequence(sequence)
    }
}

impl Munger {
    pub fn literal(text: impl Into<String>) -> Self {
        Munger::Literal(text.into())
    }

    /// Wrap in a [`Munger::Repeater`].
    pub fn repeat(self) -> Self {
        Munger::Repeater(Box::new(self))
    }

    /// Evaluate this munger against a match, producing the replacement text.
    pub fn evaluate(&self, input: &Match, ctx: &mut Context) -> Result<String, MungeError> {
        match self {
            Munger::Literal(text) => Ok(text.clone()),
            Munger::Proc(proc) => proc.evaluate(input, ctx),
            Munger::Ruleset(ruleset) => ruleset.apply(input, ctx),
            Munger::Sequence(sequence) => sequence.apply(input, ctx),
            Munger::Repeater(inner) => repeat_to_fixed_point(inner, input, ctx),
            Munger::Last(rule) => apply_last(rule, input, ctx),
            Munger::SideEffects(inner) => {
                inner.evaluate(input, ctx)?;
                Ok(input.text.clone())
            }
        }
    }
}

impl Ruleset {
    pub fn new(limit: Limit, rules: Vec<Rule>) -> Self {
        Ruleset { rules, limit }
    }

    /// The central scan-and-replace loop.
    ///
    /// Every rule searches from the end of the previous match; the
    /// earliest-starting candidate wins, ties going to the earliest-declared
    /// rule. Rules declared at or before the previous winner may not
    /// re-match at the previous start offset; their search begins one
    /// character later. That guarantees forward progress through
    /// zero-width matches while still letting later rules match at the same
    /// spot first.
    fn apply(&self, input: &Match, ctx: &mut Context) -> Result<String, MungeError> {
        let value = &input.text;
        // named locators resolve once, before scanning begins
        let resolved: Vec<Option<Locator>> = self
            .rules
            .iter()
            .map(|rule| rule.locator.resolve(ctx))
            .collect();

        let mut output = String::new();
        let mut end_of_last = 0usize;
        let mut start_of_last: Option<usize> = None;
        let mut last_rule: Option<usize> = None;
        let mut matched = 0usize;

        while end_of_last <= value.len() && self.limit.allows(matched) {
            let mut winner: Option<(usize, Match)> = None;
            for (index, locator) in resolved.iter().enumerate() {
                let Some(locator) = locator else { continue };
                let mut from = end_of_last;
                if start_of_last == Some(from) && last_rule.map_or(false, |last| index <= last) {
                    from = advance_one(value, from);
                }
                if let Some(candidate) = locator.find_from(value, from) {
                    let wins = winner
                        .as_ref()
                        .map_or(true, |(_, best)| candidate.start < best.start);
                    if wins {
                        winner = Some((index, candidate));
                    }
                }
            }
            let Some((index, best)) = winner else { break };

            output.push_str(&value[end_of_last..best.start]);
            output.push_str(&self.rules[index].replace.evaluate(&best, ctx)?);
            start_of_last = Some(best.start);
            end_of_last = best.end();
            last_rule = Some(index);
            matched += 1;
        }

        output.push_str(&value[end_of_last.min(value.len())..]);
        Ok(output)
    }
}

impl Sequence {
    pub fn new(limit: Limit, steps: Vec<Munger>) -> Self {
        Sequence { steps, limit }
    }

    /// Run the steps top to bottom over the whole current value. A step
    /// counts toward the limit only when it changed something; hitting the
    /// limit skips the remaining steps.
    fn apply(&self, input: &Match, ctx: &mut Context) -> Result<String, MungeError> {
        let mut value = input.text.clone();
        let mut changes = 0usize;
        for step in &self.steps {
            let next = step.evaluate(&Match::whole(value.clone()), ctx)?;
            if next != value {
                changes += 1;
            }
            value = next;
            if Limit::Max(changes) == self.limit {
                return Ok(value);
            }
        }
        Ok(value)
    }
}

fn repeat_to_fixed_point(
    inner: &Munger,
    input: &Match,
    ctx: &mut Context,
) -> Result<String, MungeError> {
    // the first pass sees the original match, groups and all; later passes
    // see the previous output as a fresh group-less match
    let mut last = input.text.clone();
    let mut output = inner.evaluate(input, ctx)?;
    while output != last {
        last = output;
        output = inner.evaluate(&Match::whole(last.clone()), ctx)?;
    }
    Ok(output)
}

fn apply_last(rule: &Rule, input: &Match, ctx: &mut Context) -> Result<String, MungeError> {
    let Some(locator) = rule.locator.resolve(ctx) else {
        return Ok(input.text.clone());
    };
    let Some(last) = locator.find_all(&input.text).into_iter().last() else {
        return Ok(input.text.clone());
    };
    let mut output = String::new();
    output.push_str(&input.text[..last.start]);
    output.push_str(&rule.replace.evaluate(&last, ctx)?);
    output.push_str(&input.text[last.end()..]);
    Ok(output)
}

/// A parsed program: the main munger plus its named declarations.
#[derive(Debug, Clone)]
pub struct Program {
    pub munger: Munger,
    pub locators: HashMap<String, Locator>,
    pub mungers: HashMap<String, Munger>,
}

impl Program {
    /// Run this program over an input document.
    pub fn munge(&self, input: &str) -> Result<String, MungeError> {
        munge(input, &self.munger, &self.locators, &self.mungers)
    }
}

/// Convert CR and CRLF line endings to LF, so locator offsets are
/// endings-agnostic.
pub fn normalize_line_endings(input: &str) -> String {
    LINE_ENDINGS.replace_all(input, "\n").into_owned()
}

/// Transform `input` by evaluating `munger` against it with a fresh context
/// seeded from the named-locator and named-munger tables.
pub fn munge(
    input: &str,
    munger: &Munger,
    locators: &HashMap<String, Locator>,
    mungers: &HashMap<String, Munger>,
) -> Result<String, MungeError> {
    let normalized = normalize_line_endings(input);
    let mut ctx = Context::new(locators, mungers);
    munger.evaluate(&Match::whole(normalized), &mut ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::munger::testing::{pat, rule, ruleset, single_rule};

    fn apply(munger: &Munger, input: &str) -> String {
        let locators = HashMap::new();
        let mungers = HashMap::new();
        munge(input, munger, &locators, &mungers).unwrap()
    }

    #[test]
    fn empty_ruleset_is_identity() {
        let munger = Munger::Ruleset(Ruleset::new(Limit::Unbounded, vec![]));
        assert_eq!(apply(&munger, "anything at all"), "anything at all");
    }

    #[test]
    fn ties_go_to_the_earlier_rule() {
        let munger = ruleset(
            Limit::Max(1),
            vec![rule("a", "b"), rule("a", "c")],
        );
        assert_eq!(apply(&munger, "a"), "b");
    }

    #[test]
    fn zero_width_literal_inserts_everywhere() {
        let munger = single_rule("", "x");
        assert_eq!(apply(&munger, "a"), "xax");
    }

    #[test]
    fn limit_stops_the_scan() {
        let munger = ruleset(Limit::Max(2), vec![rule("o", "0")]);
        assert_eq!(apply(&munger, "looooop"), "l00ooop");
    }

    #[test]
    fn sequence_steps_see_prior_output() {
        // step two finds "ard" only because step one produced it
        let munger = Munger::Sequence(Sequence::new(
            Limit::Unbounded,
            vec![single_rule("foo", "bar"), single_rule("ard", "icycle")],
        ));
        assert_eq!(apply(&munger, "food"), "bicycle");
    }

    #[test]
    fn sequence_limit_counts_only_changed_steps() {
        let munger = Munger::Sequence(Sequence::new(
            Limit::Max(1),
            vec![
                single_rule("x", "y"),
                single_rule("a", "b"),
                single_rule("b", "c"),
            ],
        ));
        // step one changes nothing; step two hits the limit; step three
        // never runs
        assert_eq!(apply(&munger, "a"), "b");
    }

    #[test]
    fn repeater_reaches_a_fixed_point() {
        let munger = ruleset(Limit::Max(1), vec![rule("oo", "o")]).repeat();
        assert_eq!(apply(&munger, "gooooooooal"), "goal");
    }

    #[test]
    fn last_touches_only_the_final_occurrence() {
        let munger = Munger::Last(Box::new(rule("foo", "bar")));
        assert_eq!(apply(&munger, "foo foo foo"), "foo foo bar");
    }

    #[test]
    fn last_with_no_match_is_identity() {
        let munger = Munger::Last(Box::new(rule("zzz", "bar")));
        assert_eq!(apply(&munger, "foo"), "foo");
    }

    #[test]
    fn last_with_unresolved_named_locator_is_identity() {
        let munger = Munger::Last(Box::new(Rule {
            locator: Locator::named("nowhere"),
            replace: Munger::literal("bar"),
        }));
        assert_eq!(apply(&munger, "foo"), "foo");
    }

    #[test]
    fn side_effects_discard_their_result() {
        let munger = Munger::SideEffects(Box::new(Munger::literal("discarded")));
        assert_eq!(apply(&munger, "kept"), "kept");
    }

    #[test]
    fn crlf_input_is_normalized_before_matching() {
        let munger = single_rule("\n", ";");
        assert_eq!(apply(&munger, "a\r\nb\rc\nd"), "a;b;c;d");
    }

    #[test]
    fn regex_rules_compete_position_by_position() {
        let munger = ruleset(
            Limit::Unbounded,
            vec![rule("foo", "bar"), rule(pat("bar"), "foo")],
        );
        assert_eq!(
            apply(&munger, "the foo the bar the foobar legend"),
            "the bar the foo the barfoo legend"
        );
    }
}
