//! Recursive-descent parser for munger source syntax
//!
//! Turns program text into a [`Program`]: the main munger plus the `loc()`
//! and `def()` declaration tables. The grammar is parsed with anchored token
//! patterns tried in declaration order, with no backtracking past a
//! committed token: once a rule has seen its locator, the `=>` must follow.
//!
//! Surface syntax:
//!
//! ```text
//! loc(name) locator            ! named locator declarations first
//! def(name) munger             ! then named munger declarations
//! ( 'foo' => "bar"             ! then the main munger
//!   /ba(r)/i => { $1 upper } )
//! ```
//!
//! Locators are single-quoted literals, `/regex/ism` literals, or
//! `get(name)` references. Mungers are rulesets `N( ... )`, sequences
//! `N#( ... )`, procs `{ ... }`, double-quoted replacement literals,
//! decorated mungers (`@` repeat, `fx` side effects, `last( rule )`), bare
//! rules, or `do(name)` references to earlier `def()`s. `!` starts a
//! comment that runs to the end of the line.
//!
//! The evaluation core never sees any of this; it consumes the finished
//! `Program` as opaque data.

use crate::munger::error::ParseError;
use crate::munger::locating::{Locator, PatternFlags};
use crate::munger::munging::{Limit, Munger, Program, Rule, Ruleset, Sequence};
use crate::munger::proc::{Proc, ProcItem};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static WHITESPACE_AND_COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\s|!.*)+").unwrap());
static DOUBLE_STRING: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^"(?:[^\\"]|\\.)*""#).unwrap());
static SINGLE_STRING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^'(?:[^\\']|\\.)*'").unwrap());
static REGEX_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/((?:[^\\\n/]|\\.)+)/([ism]*)").unwrap());
static NAMED_LOCATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^get\((\w+)\)").unwrap());
static GOES_TO: Lazy<Regex> = Lazy::new(|| Regex::new(r"^=>").unwrap());
static RULESET_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)?\(").unwrap());
static SEQUENCE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)?#\(").unwrap());
static GROUP_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\)").unwrap());
static PROC_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\{").unwrap());
static PROC_INSTRUCTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(?:(?s:"(?:[^\\"]|\\.)*")|[^"{}\s]+)"#).unwrap());
static PROC_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\}").unwrap());
static REPEATER_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^@").unwrap());
static EFFECT_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^fx\b").unwrap());
static LAST_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^last\s*\(").unwrap());
static LOCATOR_DECLARATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^loc\((\w+)\)").unwrap());
static MUNGER_DECLARATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^def\((\w+)\)").unwrap());
static NAMED_MUNGER_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^do\((\w+)\)").unwrap());

/// Parse munger source into a runnable program.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    Parser::new(source).run()
}

struct Parser<'s> {
    source: &'s str,
    consumed: usize,
    locators: HashMap<String, Locator>,
    mungers: HashMap<String, Munger>,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str) -> Self {
        Parser {
            source,
            consumed: 0,
            locators: HashMap::new(),
            mungers: HashMap::new(),
        }
    }

    fn run(mut self) -> Result<Program, ParseError> {
        while self.parse_locator_declaration()? {}
        while self.parse_munger_declaration()? {}

        let Some(munger) = self.parse_munger()? else {
            return self.fail("Expected munger definition");
        };
        self.skip_trivia();
        if self.consumed != self.source.len() {
            return self.fail("Expected EOF following munger");
        }
        Ok(Program {
            munger,
            locators: self.locators,
            mungers: self.mungers,
        })
    }

    fn skip_trivia(&mut self) {
        if let Some(m) = WHITESPACE_AND_COMMENTS.find(&self.source[self.consumed..]) {
            self.consumed += m.end();
        }
    }

    /// Try a token pattern at the current position, consuming it on success.
    /// Leading whitespace and comments are consumed either way.
    fn try_take(&mut self, pattern: &Regex) -> Option<regex::Captures<'s>> {
        self.skip_trivia();
        let rest: &'s str = &self.source[self.consumed..];
        let caps = pattern.captures(rest)?;
        self.consumed += caps.get(0).expect("capture 0 always participates").end();
        Some(caps)
    }

    fn fail<T>(&self, message: impl Into<String>) -> Result<T, ParseError> {
        let before = &self.source[..self.consumed];
        let line = before.matches('\n').count() + 1;
        let column = match before.rfind('\n') {
            Some(newline) => self.consumed - newline + 1,
            None => self.consumed + 1,
        };
        Err(ParseError {
            message: message.into(),
            position: self.consumed,
            line,
            column,
        })
    }

    // ---- string and locator literals ----

    fn parse_double_string(&mut self) -> Result<Option<String>, ParseError> {
        let Some(caps) = self.try_take(&DOUBLE_STRING) else {
            return Ok(None);
        };
        match serde_json::from_str::<String>(&caps[0]) {
            Ok(text) => Ok(Some(text)),
            Err(_) => self.fail("Invalid string literal"),
        }
    }

    fn parse_single_string(&mut self) -> Result<Option<String>, ParseError> {
        let Some(caps) = self.try_take(&SINGLE_STRING) else {
            return Ok(None);
        };
        let token = &caps[0];
        // single quotes carry the same escapes; re-quote for JSON decoding
        let inner = token[1..token.len() - 1]
            .replace("\\'", "'")
            .replace('"', "\\\"");
        match serde_json::from_str::<String>(&format!("\"{}\"", inner)) {
            Ok(text) => Ok(Some(text)),
            Err(_) => self.fail("Invalid string literal"),
        }
    }

    fn parse_regex_literal(&mut self) -> Result<Option<Locator>, ParseError> {
        let Some(caps) = self.try_take(&REGEX_LITERAL) else {
            return Ok(None);
        };
        let flags = PatternFlags::from_letters(&caps[2]);
        match Locator::pattern(&caps[1], flags) {
            Ok(locator) => Ok(Some(locator)),
            Err(error) => self.fail(format!("Invalid pattern: {}", error)),
        }
    }

    fn parse_get_locator(&mut self) -> Option<Locator> {
        let caps = self.try_take(&NAMED_LOCATOR)?;
        Some(Locator::named(&caps[1]))
    }

    fn parse_locator(&mut self) -> Result<Option<Locator>, ParseError> {
        if let Some(text) = self.parse_single_string()? {
            return Ok(Some(Locator::literal(text)));
        }
        if let Some(locator) = self.parse_regex_literal()? {
            return Ok(Some(locator));
        }
        Ok(self.parse_get_locator())
    }

    // ---- rules and composite mungers ----

    fn parse_rule(&mut self) -> Result<Option<Rule>, ParseError> {
        let Some(locator) = self.parse_locator()? else {
            return Ok(None);
        };
        if self.try_take(&GOES_TO).is_none() {
            return self.fail("Expected '=>'");
        }
        let Some(replace) = self.parse_munger()? else {
            return self.fail("Expected rule munger");
        };
        Ok(Some(Rule { locator, replace }))
    }

    fn parse_ruleset(&mut self) -> Result<Option<Munger>, ParseError> {
        let Some(open) = self.try_take(&RULESET_OPEN) else {
            return Ok(None);
        };
        let limit = parse_limit(open.get(1));
        let mut rules = Vec::new();
        while let Some(rule) = self.parse_rule()? {
            rules.push(rule);
        }
        if self.try_take(&GROUP_CLOSE).is_none() {
            return self.fail("Expected rule or ')'");
        }
        Ok(Some(Munger::Ruleset(Ruleset::new(limit, rules))))
    }

    fn parse_sequence(&mut self) -> Result<Option<Munger>, ParseError> {
        let Some(open) = self.try_take(&SEQUENCE_OPEN) else {
            return Ok(None);
        };
        let limit = parse_limit(open.get(1));
        let mut steps = Vec::new();
        while let Some(munger) = self.parse_munger()? {
            steps.push(munger);
        }
        if self.try_take(&GROUP_CLOSE).is_none() {
            return self.fail("Expected munger or ')'");
        }
        Ok(Some(Munger::Sequence(Sequence::new(limit, steps))))
    }

    fn parse_proc_block(&mut self) -> Result<Option<Vec<ProcItem>>, ParseError> {
        if self.try_take(&PROC_OPEN).is_none() {
            return Ok(None);
        }
        let mut items = Vec::new();
        loop {
            if let Some(caps) = self.try_take(&PROC_INSTRUCTION) {
                items.push(ProcItem::Token(caps[0].to_string()));
                continue;
            }
            if let Some(inner) = self.parse_proc_block()? {
                items.push(ProcItem::Block(inner));
                continue;
            }
            break;
        }
        if self.try_take(&PROC_CLOSE).is_none() {
            return self.fail("Expected instruction or '}'");
        }
        Ok(Some(items))
    }

    fn parse_repeater(&mut self) -> Result<Option<Munger>, ParseError> {
        if self.try_take(&REPEATER_PREFIX).is_none() {
            return Ok(None);
        }
        let Some(munger) = self.parse_munger()? else {
            return self.fail("Expected munger after '@' decorator");
        };
        Ok(Some(munger.repeat()))
    }

    fn parse_effect(&mut self) -> Result<Option<Munger>, ParseError> {
        if self.try_take(&EFFECT_PREFIX).is_none() {
            return Ok(None);
        }
        let Some(munger) = self.parse_munger()? else {
            return self.fail("Expected munger after 'fx' decorator");
        };
        Ok(Some(Munger::SideEffects(Box::new(munger))))
    }

    fn parse_last(&mut self) -> Result<Option<Munger>, ParseError> {
        if self.try_take(&LAST_OPEN).is_none() {
            return Ok(None);
        }
        let Some(rule) = self.parse_rule()? else {
            return self.fail("Expected rule after 'last('");
        };
        if self.try_take(&GROUP_CLOSE).is_none() {
            return self.fail("Expected ')' to close 'last('");
        }
        Ok(Some(Munger::Last(Box::new(rule))))
    }

    fn parse_named_munger_ref(&mut self) -> Result<Option<Munger>, ParseError> {
        let Some(caps) = self.try_take(&NAMED_MUNGER_REF) else {
            return Ok(None);
        };
        let name = &caps[1];
        match self.mungers.get(name) {
            Some(munger) => Ok(Some(munger.clone())),
            None => self.fail(format!("Undeclared munger reference: '{}'", name)),
        }
    }

    fn parse_munger(&mut self) -> Result<Option<Munger>, ParseError> {
        if let Some(munger) = self.parse_ruleset()? {
            return Ok(Some(munger));
        }
        if let Some(munger) = self.parse_sequence()? {
            return Ok(Some(munger));
        }
        if let Some(munger) = self.parse_repeater()? {
            return Ok(Some(munger));
        }
        if let Some(munger) = self.parse_last()? {
            return Ok(Some(munger));
        }
        if let Some(munger) = self.parse_effect()? {
            return Ok(Some(munger));
        }
        if let Some(items) = self.parse_proc_block()? {
            return Ok(Some(Munger::Proc(Proc::new(items))));
        }
        if let Some(rule) = self.parse_rule()? {
            return Ok(Some(Munger::Ruleset(Ruleset::new(
                Limit::Unbounded,
                vec![rule],
            ))));
        }
        if let Some(text) = self.parse_double_string()? {
            return Ok(Some(Munger::Literal(text)));
        }
        self.parse_named_munger_ref()
    }

    // ---- declarations ----

    fn parse_locator_declaration(&mut self) -> Result<bool, ParseError> {
        let Some(caps) = self.try_take(&LOCATOR_DECLARATION) else {
            return Ok(false);
        };
        let name = caps[1].to_string();
        let Some(locator) = self.parse_locator()? else {
            return self.fail("Expected locator definition after named declaration");
        };
        if self.locators.contains_key(&name) {
            return self.fail(format!("Duplicate loc() for {}", name));
        }
        self.locators.insert(name, locator);
        Ok(true)
    }

    fn parse_munger_declaration(&mut self) -> Result<bool, ParseError> {
        let Some(caps) = self.try_take(&MUNGER_DECLARATION) else {
            return Ok(false);
        };
        let name = caps[1].to_string();
        let Some(munger) = self.parse_munger()? else {
            return self.fail("Expected munger definition after named declaration");
        };
        if self.mungers.contains_key(&name) {
            return self.fail(format!("Duplicate def() for {}", name));
        }
        self.mungers.insert(name, munger);
        Ok(true)
    }
}

fn parse_limit(digits: Option<regex::Match>) -> Limit {
    match digits {
        Some(m) => Limit::Max(m.as_str().parse().unwrap_or(usize::MAX)),
        None => Limit::Unbounded,
    }
}
