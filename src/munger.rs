//! Main module for munger library functionality

pub mod context;
pub mod error;
pub mod locating;
pub mod munging;
pub mod parsing;
pub mod proc;
pub mod testing;

// Re-export the surface embedders actually touch
pub use context::Context;
pub use error::{MungeError, ParseError};
pub use locating::{Locator, Match, PatternFlags};
pub use munging::{munge, Limit, Munger, Program, Rule, Ruleset, Sequence};
pub use parsing::parse;
pub use proc::{Proc, ProcItem};
