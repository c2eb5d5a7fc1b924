//! Error types for munger evaluation and parsing
//!
//! Every fatal condition unwinds to the top-level `munge` caller; nothing is
//! caught or retried inside the engine. A failed munge yields no usable
//! output.

use std::fmt;

/// Fatal runtime failure raised while evaluating a munger.
#[derive(Debug, Clone, PartialEq)]
pub enum MungeError {
    /// A proc instruction token that is not a literal, sugar call, or opcode
    UnrecognizedInstruction(String),
    /// A block-consuming opcode (`if`, `for`, `times`) with no block after it
    ExpectedBlock(String),
    /// A nested proc block in a position where no opcode consumes it
    BareBlock,
    /// `do` invoked with a name that has no `def()` entry
    UnknownMunger(String),
    /// `chr` applied to a value that is not a Unicode scalar
    InvalidCodePoint(String),
    /// Integer division or remainder with a zero divisor
    DivisionByZero,
    /// The `fail` opcode, carrying the popped message
    Failed(String),
}

impl fmt::Display for MungeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MungeError::UnrecognizedInstruction(instr) => {
                write!(f, "unrecognized instruction '{}'", instr)
            }
            MungeError::ExpectedBlock(op) => {
                write!(f, "expected a block after '{}'", op)
            }
            MungeError::BareBlock => write!(f, "bare proc blocks don't do anything"),
            MungeError::UnknownMunger(name) => write!(f, "unknown munger '{}'", name),
            MungeError::InvalidCodePoint(value) => {
                write!(f, "'{}' is not a valid code point", value)
            }
            MungeError::DivisionByZero => write!(f, "division by zero"),
            MungeError::Failed(message) => write!(f, "munge failed: {}", message),
        }
    }
}

impl std::error::Error for MungeError {}

/// Failure to parse munger source, with the offending location.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    /// Byte offset of the first unconsumed character
    pub position: usize,
    /// 1-based line of `position`
    pub line: usize,
    /// 1-based column of `position`
    pub column: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for ParseError {}
