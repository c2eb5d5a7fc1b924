//! The proc instruction VM
//!
//! A proc is a stack-based mini-language for computing replacement text. All
//! values are strings; instructions that do arithmetic still consume and
//! produce strings like `"123"`. A proc shares the per-invocation
//! [`Context`] with the rest of the engine, so registers and arrays written
//! here are visible to every other munger in the same call.
//!
//! Instruction streams arrive from the parser as raw tokens and nested
//! blocks. Construction compiles them into a block-structured tree: sugar
//! forms expand (`set(x)` becomes push-`"x"` + `set`, `$1` becomes
//! push-`"1"` + `group`), and the block-consuming opcodes `if`/`for`/`times`
//! capture their nested block(s) as children. Evaluation is then a direct
//! walk with no token lookahead.
//!
//! When the stream is exhausted, whatever remains on the stack is
//! concatenated bottom-to-top into the proc's output. The stack need not be
//! a single value; leftovers simply concatenate.

use crate::munger::context::Context;
use crate::munger::error::MungeError;
use crate::munger::locating::Match;
use crate::munger::munging::Munger;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::iter::Peekable;

/// One element of a proc as the parser delivers it: an instruction token or
/// a nested `{ ... }` block.
#[derive(Debug, Clone)]
pub enum ProcItem {
    Token(String),
    Block(Vec<ProcItem>),
}

/// A compiled proc, ready to evaluate.
#[derive(Debug, Clone)]
pub struct Proc {
    instrs: Vec<Instr>,
}

#[derive(Debug, Clone)]
enum Instr {
    /// Push a literal value
    Push(String),
    /// Apply an opcode by name; unknown names fail at evaluation time
    Op(String),
    If {
        then: Vec<Instr>,
        otherwise: Option<Vec<Instr>>,
    },
    For {
        body: Vec<Instr>,
    },
    Times {
        body: Vec<Instr>,
    },
    /// A block no opcode consumed; evaluating it is an error
    Bare,
}

static NUMBER_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(?:\.\d+)?$").unwrap());
static SUGAR_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(set|get|inc|dec|push|pop|cons|uncons|join|rev|getat|empty|count|sort|uniq|for|do)\((\w+)\)$",
    )
    .unwrap()
});
static GROUP_SHORTHAND: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$(\d+)$").unwrap());
/// Values in this shape use integer arithmetic; everything else is a float
static INTEGER_VALUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ *-?\d+ *$").unwrap());
static TOKENIZER: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?s)".*?"|\S+"#).unwrap());

impl Proc {
    pub fn new(items: Vec<ProcItem>) -> Self {
        Proc {
            instrs: compile(&items),
        }
    }

    /// Build a proc from a flat source string of whitespace-separated
    /// tokens. Convenient for programmatic construction; nested blocks
    /// require [`Proc::new`] or the parser.
    pub fn from_tokens(source: &str) -> Self {
        let items = TOKENIZER
            .find_iter(source)
            .map(|m| ProcItem::Token(m.as_str().to_string()))
            .collect();
        Proc::new(items)
    }

    /// Evaluate against a match with a fresh stack, producing the
    /// concatenation of whatever the stack holds afterwards.
    pub fn evaluate(&self, input: &Match, ctx: &mut Context) -> Result<String, MungeError> {
        let mut stack = Vec::new();
        self.run(input, ctx, &mut stack)?;
        Ok(stack.concat())
    }

    /// Run against an existing stack. `do` uses this to let a named proc
    /// operate on its caller's stack.
    pub(crate) fn run(
        &self,
        input: &Match,
        ctx: &mut Context,
        stack: &mut Vec<String>,
    ) -> Result<(), MungeError> {
        exec(&self.instrs, input, ctx, stack)
    }
}

fn compile(items: &[ProcItem]) -> Vec<Instr> {
    let mut instrs = Vec::new();
    let mut items = items.iter().peekable();
    while let Some(item) = items.next() {
        let token = match item {
            ProcItem::Block(_) => {
                instrs.push(Instr::Bare);
                continue;
            }
            ProcItem::Token(token) => token,
        };
        if NUMBER_TOKEN.is_match(token) {
            instrs.push(Instr::Push(token.clone()));
        } else if token.starts_with('"') {
            match serde_json::from_str::<String>(token) {
                Ok(text) => instrs.push(Instr::Push(text)),
                // surfaces as an unrecognized instruction at evaluation time
                Err(_) => instrs.push(Instr::Op(token.clone())),
            }
        } else if let Some(caps) = SUGAR_CALL.captures(token) {
            instrs.push(Instr::Push(caps[2].to_string()));
            compile_op(&caps[1], &mut items, &mut instrs);
        } else if let Some(caps) = GROUP_SHORTHAND.captures(token) {
            instrs.push(Instr::Push(caps[1].to_string()));
            instrs.push(Instr::Op("group".to_string()));
        } else {
            compile_op(token, &mut items, &mut instrs);
        }
    }
    instrs
}

/// Attach following blocks to the block-consuming opcodes. A missing block
/// compiles to the bare opcode, which reports the error when evaluated.
fn compile_op<'a, I>(op: &str, items: &mut Peekable<I>, instrs: &mut Vec<Instr>)
where
    I: Iterator<Item = &'a ProcItem>,
{
    match op {
        "if" => match next_block(items) {
            Some(then) => {
                let otherwise = next_block(items);
                instrs.push(Instr::If { then, otherwise });
            }
            None => instrs.push(Instr::Op(op.to_string())),
        },
        "for" => match next_block(items) {
            Some(body) => instrs.push(Instr::For { body }),
            None => instrs.push(Instr::Op(op.to_string())),
        },
        "times" => match next_block(items) {
            Some(body) => instrs.push(Instr::Times { body }),
            None => instrs.push(Instr::Op(op.to_string())),
        },
        _ => instrs.push(Instr::Op(op.to_string())),
    }
}

fn next_block<'a, I>(items: &mut Peekable<I>) -> Option<Vec<Instr>>
where
    I: Iterator<Item = &'a ProcItem>,
{
    match items.peek() {
        Some(ProcItem::Block(inner)) => {
            let compiled = compile(inner);
            items.next();
            Some(compiled)
        }
        _ => None,
    }
}

fn exec(
    instrs: &[Instr],
    input: &Match,
    ctx: &mut Context,
    stack: &mut Vec<String>,
) -> Result<(), MungeError> {
    for instr in instrs {
        match instr {
            Instr::Push(text) => stack.push(text.clone()),
            Instr::Bare => return Err(MungeError::BareBlock),
            Instr::If { then, otherwise } => {
                if truthy(&pop(stack)) {
                    exec(then, input, ctx, stack)?;
                } else if let Some(otherwise) = otherwise {
                    exec(otherwise, input, ctx, stack)?;
                }
            }
            Instr::For { body } => {
                let name = pop(stack);
                // snapshot, so the body may mutate the array freely
                let elements = ctx.arrays.get(&name).cloned().unwrap_or_default();
                for element in elements {
                    let scoped = Match {
                        start: 0,
                        text: element,
                        groups: Vec::new(),
                    };
                    exec(body, &scoped, ctx, stack)?;
                }
            }
            Instr::Times { body } => {
                let count = to_count(&pop(stack));
                for _ in 0..count {
                    exec(body, input, ctx, stack)?;
                }
            }
            Instr::Op(op) => apply_op(op, input, ctx, stack)?,
        }
    }
    Ok(())
}

fn apply_op(
    op: &str,
    input: &Match,
    ctx: &mut Context,
    stack: &mut Vec<String>,
) -> Result<(), MungeError> {
    match op {
        "_" => stack.push(input.text.clone()),

        "group" => {
            let n = to_f64(&pop(stack));
            let text = if n >= 1.0 && n.fract() == 0.0 && (n as usize) <= input.groups.len() {
                input.groups[n as usize - 1].clone()
            } else {
                String::new()
            };
            stack.push(text);
        }

        "swap" => {
            let top = pop(stack);
            let under = pop(stack);
            stack.push(top);
            stack.push(under);
        }
        "copy" => stack.push(peek(stack)),
        "drop" => {
            pop(stack);
        }
        "clear" => stack.clear(),

        "len" => {
            let text = pop(stack);
            stack.push(text.chars().count().to_string());
        }

        "max" | "min" => {
            if stack.len() >= 2 {
                let b = pop(stack);
                let a = pop(stack);
                stack.push(extremum(op, &a, &b));
            }
        }
        "<" => {
            let b = pop(stack);
            let a = pop(stack);
            stack.push(bool_value(loose_lt(&a, &b)));
        }
        ">" => {
            let b = pop(stack);
            let a = pop(stack);
            stack.push(bool_value(loose_lt(&b, &a)));
        }
        "<=" => {
            let b = pop(stack);
            let a = pop(stack);
            stack.push(bool_value(to_f64(&a) <= to_f64(&b)));
        }
        ">=" => {
            let b = pop(stack);
            let a = pop(stack);
            stack.push(bool_value(to_f64(&a) >= to_f64(&b)));
        }
        "==" | "=" => {
            let b = pop(stack);
            let a = pop(stack);
            stack.push(bool_value(a == b));
        }

        "+" | "-" | "*" | "/" | "%" => {
            let b = pop(stack);
            let a = pop(stack);
            stack.push(arith(op, &a, &b)?);
        }
        "floor" => {
            let value = pop(stack);
            if let Some(n) = parse_integer(&value) {
                stack.push(n.to_string());
            } else {
                stack.push(format_number(to_f64(&value).floor()));
            }
        }

        "not" => {
            let value = pop(stack);
            stack.push(bool_value(!truthy(&value)));
        }
        "or" => {
            let b = pop(stack);
            let a = pop(stack);
            stack.push(if truthy(&a) { a } else { b });
        }

        "cat" => {
            let b = pop(stack);
            let mut a = pop(stack);
            a.push_str(&b);
            stack.push(a);
        }
        "lpad" | "rpad" | "zpad" => {
            let width = to_index(&pop(stack)).max(0) as usize;
            let text = pop(stack);
            stack.push(pad(op, text, width));
        }
        "index" => {
            let needle = pop(stack);
            let hay = pop(stack);
            let position = hay
                .find(&needle)
                .map_or(-1, |byte| hay[..byte].chars().count() as i64);
            stack.push(position.to_string());
        }
        "upper" => {
            let text = pop(stack);
            stack.push(text.to_uppercase());
        }
        "lower" => {
            let text = pop(stack);
            stack.push(text.to_lowercase());
        }
        "take" | "skip" => {
            let n = to_index(&pop(stack));
            let text = pop(stack);
            stack.push(take_or_skip(op, &text, n));
        }
        "ord" => {
            let text = pop(stack);
            let code = text.chars().next().map_or(0, |c| c as u32);
            stack.push(code.to_string());
        }
        "chr" => {
            let value = pop(stack);
            let n = to_f64(&value);
            let scalar = if n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= 0x10FFFF as f64 {
                char::from_u32(n as u32)
            } else {
                None
            };
            match scalar {
                Some(c) => stack.push(c.to_string()),
                None => return Err(MungeError::InvalidCodePoint(value)),
            }
        }
        "hex" => {
            let value = pop(stack);
            stack.push(to_hex(&value));
        }
        "unhex" => {
            let value = pop(stack);
            stack.push(from_hex(&value));
        }

        "set" => {
            let name = pop(stack);
            ctx.registers.insert(name, peek(stack));
        }
        "get" => {
            let name = pop(stack);
            stack.push(ctx.registers.get(&name).cloned().unwrap_or_default());
        }
        "inc" | "dec" => {
            let name = pop(stack);
            let delta: i64 = if op == "inc" { 1 } else { -1 };
            let current = ctx.registers.get(&name).map_or("", String::as_str);
            let next = if let Some(n) = parse_integer(current) {
                (n + delta).to_string()
            } else {
                let n = to_f64(current);
                let n = if n.is_nan() { 0.0 } else { n };
                format_number(n + delta as f64)
            };
            ctx.registers.insert(name, next);
        }

        "push" => {
            let name = pop(stack);
            let value = pop(stack);
            ctx.arrays.entry(name).or_default().push(value);
        }
        "pop" => {
            let name = pop(stack);
            let value = ctx
                .arrays
                .get_mut(&name)
                .and_then(Vec::pop)
                .unwrap_or_default();
            stack.push(value);
        }
        "cons" => {
            let name = pop(stack);
            let value = pop(stack);
            ctx.arrays.entry(name).or_default().insert(0, value);
        }
        "uncons" => {
            let name = pop(stack);
            let value = match ctx.arrays.get_mut(&name) {
                Some(array) if !array.is_empty() => array.remove(0),
                _ => String::new(),
            };
            stack.push(value);
        }
        "getat" => {
            let name = pop(stack);
            let position = to_index(&pop(stack));
            let value = ctx
                .arrays
                .get(&name)
                .filter(|_| position >= 0)
                .and_then(|array| array.get(position as usize).cloned())
                .unwrap_or_default();
            stack.push(value);
        }
        "empty" => {
            let name = pop(stack);
            ctx.arrays.entry(name).or_default().clear();
        }
        "count" => {
            let name = pop(stack);
            let length = ctx.arrays.get(&name).map_or(0, Vec::len);
            stack.push(length.to_string());
        }
        "rev" => {
            let name = pop(stack);
            if let Some(array) = ctx.arrays.get_mut(&name) {
                array.reverse();
            }
        }
        "join" => {
            let name = pop(stack);
            let delimiter = pop(stack);
            let joined = ctx
                .arrays
                .get(&name)
                .map(|array| array.join(&delimiter))
                .unwrap_or_default();
            stack.push(joined);
        }
        "sort" => {
            let name = pop(stack);
            if let Some(array) = ctx.arrays.get_mut(&name) {
                array.sort();
            }
        }
        "uniq" => {
            let name = pop(stack);
            if let Some(array) = ctx.arrays.get_mut(&name) {
                let mut seen = std::collections::HashSet::new();
                array.retain(|element| seen.insert(element.clone()));
            }
        }

        "do" => {
            let name = pop(stack);
            let target = ctx.mungers.get(name.as_str());
            match target {
                None => return Err(MungeError::UnknownMunger(name)),
                Some(Munger::Proc(proc)) => proc.run(input, ctx, stack)?,
                Some(Munger::Literal(text)) => stack.push(text.clone()),
                Some(munger) => {
                    let value = pop(stack);
                    let scoped = Match {
                        start: 0,
                        text: value,
                        groups: Vec::new(),
                    };
                    let result = munger.evaluate(&scoped, ctx)?;
                    stack.push(result);
                }
            }
        }

        "log" => {
            let message = pop(stack);
            eprintln!("[munge] {}", message);
        }
        "dump" => {
            let state = DumpState {
                stack,
                registers: &ctx.registers,
                arrays: &ctx.arrays,
            };
            let snapshot =
                serde_json::to_string(&state).expect("dump state is always serializable");
            eprintln!("[munge] {}", snapshot);
        }
        "fail" => return Err(MungeError::Failed(pop(stack))),

        // block-consuming opcodes only appear here when no block followed
        "if" | "for" | "times" => return Err(MungeError::ExpectedBlock(op.to_string())),

        _ => return Err(MungeError::UnrecognizedInstruction(op.to_string())),
    }
    Ok(())
}

/// What `dump` prints, as one JSON object per invocation.
#[derive(Serialize)]
struct DumpState<'a> {
    stack: &'a [String],
    registers: &'a HashMap<String, String>,
    arrays: &'a HashMap<String, Vec<String>>,
}

fn pop(stack: &mut Vec<String>) -> String {
    stack.pop().unwrap_or_default()
}

fn peek(stack: &[String]) -> String {
    stack.last().cloned().unwrap_or_default()
}

/// A string is falsy iff it is empty or `"0"`.
fn truthy(value: &str) -> bool {
    !value.is_empty() && value != "0"
}

fn bool_value(condition: bool) -> String {
    (if condition { "1" } else { "0" }).to_string()
}

fn parse_integer(value: &str) -> Option<i64> {
    if INTEGER_VALUE.is_match(value) {
        value.trim().parse().ok()
    } else {
        None
    }
}

/// Loose numeric conversion: trimmed, empty is zero, unparseable is NaN.
fn to_f64(value: &str) -> f64 {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        0.0
    } else {
        trimmed.parse().unwrap_or(f64::NAN)
    }
}

/// Conversion for counts and positions; NaN becomes 0.
fn to_index(value: &str) -> i64 {
    let n = to_f64(value);
    if n.is_nan() {
        0
    } else {
        n as i64
    }
}

/// Repeat counts for `times`: fractional counts round up, as an integer
/// index loop would run them.
fn to_count(value: &str) -> u64 {
    let n = to_f64(value);
    if n.is_nan() || n <= 0.0 {
        0
    } else {
        n.ceil() as u64
    }
}

fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        (if value > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if value == 0.0 {
        "0".to_string()
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        value.to_string()
    }
}

/// Integer arithmetic when both operands look like plain integers (so large
/// values keep exact precision), float arithmetic otherwise. Integer
/// overflow falls back to floats; integer division truncates toward zero.
fn arith(op: &str, a: &str, b: &str) -> Result<String, MungeError> {
    if let (Some(x), Some(y)) = (parse_integer(a), parse_integer(b)) {
        if (op == "/" || op == "%") && y == 0 {
            return Err(MungeError::DivisionByZero);
        }
        let exact = match op {
            "+" => x.checked_add(y),
            "-" => x.checked_sub(y),
            "*" => x.checked_mul(y),
            "/" => x.checked_div(y),
            "%" => x.checked_rem(y),
            _ => unreachable!("arith covers its opcodes"),
        };
        if let Some(value) = exact {
            return Ok(value.to_string());
        }
    }
    let x = to_f64(a);
    let y = to_f64(b);
    let value = match op {
        "+" => x + y,
        "-" => x - y,
        "*" => x * y,
        "/" => x / y,
        "%" => x % y,
        _ => unreachable!("arith covers its opcodes"),
    };
    Ok(format_number(value))
}

fn extremum(op: &str, a: &str, b: &str) -> String {
    if let (Some(x), Some(y)) = (parse_integer(a), parse_integer(b)) {
        let value = if op == "max" { x.max(y) } else { x.min(y) };
        return value.to_string();
    }
    let x = to_f64(a);
    let y = to_f64(b);
    let value = if x.is_nan() || y.is_nan() {
        f64::NAN
    } else if op == "max" {
        x.max(y)
    } else {
        x.min(y)
    };
    format_number(value)
}

/// `<`/`>` compare numerically when both sides are numeric, and fall back to
/// lexicographic string order otherwise.
fn loose_lt(a: &str, b: &str) -> bool {
    let x = to_f64(a);
    let y = to_f64(b);
    if !x.is_nan() && !y.is_nan() {
        x < y
    } else {
        a < b
    }
}

fn pad(op: &str, text: String, width: usize) -> String {
    let length = text.chars().count();
    if length >= width {
        return text;
    }
    let filler: String = std::iter::repeat(if op == "zpad" { '0' } else { ' ' })
        .take(width - length)
        .collect();
    if op == "rpad" {
        text + &filler
    } else {
        filler + &text
    }
}

fn take_or_skip(op: &str, text: &str, n: i64) -> String {
    let length = text.chars().count();
    let magnitude = (n.unsigned_abs() as usize).min(length);
    match (op, n >= 0) {
        // take from the left, or from the right when negative
        ("take", true) => text.chars().take(magnitude).collect(),
        ("take", false) => text.chars().skip(length - magnitude).collect(),
        // skip from the left, or trim the right when negative
        ("skip", true) => text.chars().skip(magnitude).collect(),
        (_, false) => text.chars().take(length - magnitude).collect(),
        _ => unreachable!("take_or_skip covers its opcodes"),
    }
}

fn to_hex(value: &str) -> String {
    let n = if let Ok(n) = value.trim().parse::<i128>() {
        n
    } else {
        let f = to_f64(value);
        if f.is_nan() || f.is_infinite() {
            return if f.is_nan() {
                "NaN".to_string()
            } else {
                format_number(f)
            };
        }
        f.trunc() as i128
    };
    if n < 0 {
        format!("-{:x}", -n)
    } else {
        format!("{:x}", n)
    }
}

fn from_hex(value: &str) -> String {
    let trimmed = value.trim();
    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let rest = rest.strip_prefix("0x").or(rest.strip_prefix("0X")).unwrap_or(rest);
    let digits: String = rest.chars().take_while(char::is_ascii_hexdigit).collect();
    if digits.is_empty() {
        return "NaN".to_string();
    }
    match i128::from_str_radix(&digits, 16) {
        Ok(n) => {
            let n = if negative { -n } else { n };
            n.to_string()
        }
        Err(_) => "NaN".to_string(),
    }
}
