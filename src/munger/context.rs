//! Per-invocation mutable state
//!
//! A [`Context`] is created once per top-level `munge` call and threaded by
//! mutable reference through every nested evaluation of that call. It is the
//! one piece of deliberately shared mutable state in the engine, and it never
//! outlives its invocation, so there is no cross-invocation leakage.

use crate::munger::locating::Locator;
use crate::munger::munging::Munger;
use std::collections::HashMap;

/// The shared state of one `munge` invocation.
///
/// Registers and arrays start empty and are mutated freely by procs; the
/// named-munger and named-locator tables come from the parsed program and are
/// read-only for the lifetime of the call.
#[derive(Debug)]
pub struct Context<'p> {
    /// Named string variables, last write wins
    pub registers: HashMap<String, String>,
    /// Named ordered lists of strings
    pub arrays: HashMap<String, Vec<String>>,
    /// `def()` declarations, looked up by the `do` opcode
    pub mungers: &'p HashMap<String, Munger>,
    /// `loc()` declarations, consulted when resolving named locators
    pub locators: &'p HashMap<String, Locator>,
}

impl<'p> Context<'p> {
    pub fn new(
        locators: &'p HashMap<String, Locator>,
        mungers: &'p HashMap<String, Munger>,
    ) -> Self {
        Context {
            registers: HashMap::new(),
            arrays: HashMap::new(),
            mungers,
            locators,
        }
    }
}
