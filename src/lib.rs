//! # munger
//!
//! A small declarative language and execution engine for text munging:
//! given an input document and a munger program, produce a transformed
//! output document. Programs describe where to find text (locators), what
//! to do when it is found (replacement mungers, including the stack-based
//! proc mini-language), and how matches compose (scan-and-replace rulesets,
//! ordered sequences, repeat-to-fixed-point, last-match-only, side effects).
//!
//! The usual round trip:
//!
//! ```text
//! let program = munger::munger::parse("( 'foo' => \"bar\" )")?;
//! let output = program.munge("the foo legend")?;   // "the bar legend"
//! ```
//!
//! Programs can also be assembled directly from the types in
//! [`munger::munging`] and evaluated with [`munger::munging::munge`]; the
//! engine treats a parsed program and a hand-built one identically.

pub mod munger;
