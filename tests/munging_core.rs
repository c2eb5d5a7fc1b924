//! Engine behavior over programmatically-built mungers
//!
//! These suites assemble munger trees directly (no parser involved) and
//! check the composite evaluation semantics: scan order, rule competition,
//! limits, fixed points, and context sharing between matches.

use munger::munger::munging::{munge, Limit, Munger};
use munger::munger::proc::Proc;
use munger::munger::testing::{pat, rule, ruleset, sequence, single_rule};
use munger::munger::Locator;
use std::collections::HashMap;

fn apply(munger: &Munger, input: &str) -> String {
    let locators = HashMap::new();
    let mungers = HashMap::new();
    munge(input, munger, &locators, &mungers).unwrap()
}

#[test]
fn scan_competes_rules_position_by_position() {
    let munger = ruleset(
        Limit::Unbounded,
        vec![rule("foo", "bar"), rule(pat("bar"), "foo")],
    );
    assert_eq!(
        apply(&munger, "the foo the bar the foobar legend"),
        "the bar the foo the barfoo legend"
    );
}

#[test]
fn repeated_first_only_collapses_runs() {
    let munger = ruleset(Limit::Max(1), vec![rule("oo", "o")]).repeat();
    assert_eq!(apply(&munger, "gooooooooooooooooal"), "goal");
}

#[test]
fn anchors_match_the_empty_input() {
    let munger = ruleset(Limit::Max(1), vec![rule(pat("^$"), "something")]);
    assert_eq!(apply(&munger, ""), "something");
}

#[test]
fn earlier_rule_wins_simultaneous_matches() {
    let munger = ruleset(Limit::Max(1), vec![rule("a", "b"), rule("a", "c")]);
    assert_eq!(apply(&munger, "a"), "b");
}

#[test]
fn interleaved_zero_width_rules_fire_at_every_position() {
    let munger = ruleset(Limit::Unbounded, vec![rule("", "1"), rule("", "2")]);
    assert_eq!(apply(&munger, "ab"), "12a12b12");

    let munger = ruleset(Limit::Unbounded, vec![rule("", "<"), rule("", ">")]);
    assert_eq!(apply(&munger, "abc"), "<>a<>b<>c<>");
}

/// The digit-erasure divisibility decider from the original corpus: digits
/// collapse to tally marks, `111` groups vanish, and what remains decides
/// the answer.
fn multiple_of_three_decider() -> Munger {
    sequence(
        Limit::Unbounded,
        vec![
            ruleset(
                Limit::Unbounded,
                vec![
                    rule(pat("[0369]"), ""),
                    rule(pat("[47]"), "1"),
                    rule(pat("[258]"), "11"),
                ],
            ),
            single_rule("111", "").repeat(),
            ruleset(
                Limit::Unbounded,
                vec![rule(pat(".+"), "not"), rule(pat("^$"), "multiple of 3")],
            ),
        ],
    )
}

#[test]
fn decides_divisibility_by_three() {
    let decider = multiple_of_three_decider();
    for i in 0..100u32 {
        let expected = if i % 3 == 0 { "multiple of 3" } else { "not" };
        assert_eq!(apply(&decider, &i.to_string()), expected, "input {}", i);
    }
}

#[test]
fn decides_divisibility_by_six() {
    let decider = sequence(
        Limit::Unbounded,
        vec![
            ruleset(
                Limit::Max(1),
                vec![rule(
                    pat("[02468]$"),
                    ruleset(Limit::Max(1), vec![rule(pat("$"), "even")]),
                )],
            ),
            ruleset(
                Limit::Unbounded,
                vec![
                    rule(pat("[0369]"), ""),
                    rule(pat("[47]"), "1"),
                    rule(pat("[258]"), "11"),
                ],
            ),
            single_rule("111", "").repeat(),
            ruleset(
                Limit::Max(1),
                vec![
                    rule(pat("^even$"), "multiple of 6"),
                    rule(pat(".*"), "not"),
                ],
            ),
        ],
    );
    for i in 0..100u32 {
        let expected = if i % 6 == 0 { "multiple of 6" } else { "not" };
        assert_eq!(apply(&decider, &i.to_string()), expected, "input {}", i);
    }
}

#[test]
fn nested_rulesets_strip_csv_quotes() {
    let munger = ruleset(
        Limit::Unbounded,
        vec![
            rule(pat("\".*?\""), single_rule(pat("^\"|\"$"), "")),
            rule(",", "\n"),
        ],
    );
    assert_eq!(apply(&munger, "a,,b,\"c,d\",e"), "a\n\nb\nc,d\ne");
}

#[test]
fn registers_survive_across_matches() {
    // running maximum: every number is replaced by the largest seen so far
    let munger = single_rule(
        pat(r"\d+"),
        Proc::from_tokens(r#"_ "m" get max "m" set"#),
    );
    assert_eq!(apply(&munger, "3,2,5,4,11,3"), "3,3,5,5,11,11");
}

#[test]
fn sequence_steps_share_the_same_registers() {
    let munger = sequence(
        Limit::Unbounded,
        vec![
            single_rule(pat(r"\d+"), Proc::from_tokens(r#"_ "m" get max "m" set _"#)),
            single_rule(pat(r"\d+"), Proc::from_tokens(r#""m" get"#)),
        ],
    );
    assert_eq!(apply(&munger, "3,2,5,4,11,3"), "11,11,11,11,11,11");
}

#[test]
fn two_pass_alignment_pads_to_the_longest_line() {
    let munger = sequence(
        Limit::Unbounded,
        vec![
            single_rule(
                pat(".+"),
                Proc::from_tokens(r#"_ len "maxlen" get max "maxlen" set drop _"#),
            ),
            single_rule(pat(".+"), Proc::from_tokens(r#"_ "maxlen" get lpad"#)),
        ],
    );
    assert_eq!(apply(&munger, "a\nbbbb\ncc"), "   a\nbbbb\n  cc");
}

#[test]
fn hex_literal_machine_decodes_digit_by_digit() {
    let decode = ruleset(
        Limit::Unbounded,
        vec![
            rule("0x", Proc::from_tokens("0 set(h) clear")),
            rule(
                pat("."),
                Proc::from_tokens(r#"get(h) 16 * "0123456789abcdef" _ lower index + set(h) clear"#),
            ),
            rule(pat("$"), Proc::from_tokens("get(h)")),
        ],
    );
    let munger = single_rule(
        Locator::pattern(
            "0x[0-9a-f]+",
            munger::munger::PatternFlags::from_letters("i"),
        )
        .unwrap(),
        decode,
    );
    assert_eq!(
        apply(
            &munger,
            "0x100 is two five six while 0xffff is six five five three six, 0xDEAD"
        ),
        "256 is two five six while 65535 is six five five three six, 57005"
    );
}

#[test]
fn capture_groups_feed_replacement_procs() {
    let munger = single_rule(
        pat(r"(\d+) *\* (\d+)"),
        Proc::from_tokens("$1 $2 *"),
    );
    assert_eq!(apply(&munger, "pre 7 * 8 post"), "pre 56 post");
}

#[test]
fn limited_sequence_evaluates_one_operator_per_pass() {
    let munger = sequence(
        Limit::Max(1),
        vec![
            single_rule(pat(r"(\d+) *\* (\d+)"), Proc::from_tokens("$1 $2 *")),
            single_rule(pat(r"(\d+) *\+ (\d+)"), Proc::from_tokens("$1 $2 +")),
        ],
    );
    assert_eq!(apply(&munger, "3 + 4 * 5"), "3 + 20");
}

#[test]
fn repeated_limited_sequence_evaluates_expressions() {
    let munger = sequence(
        Limit::Max(1),
        vec![
            single_rule(pat(r"(\d+) *\* (\d+)"), Proc::from_tokens("$1 $2 *")),
            single_rule(pat(r"(\d+) *\+ (\d+)"), Proc::from_tokens("$1 $2 +")),
        ],
    )
    .repeat();
    assert_eq!(apply(&munger, "2 * 3 + 4 * 5"), "26");
}

#[test]
fn parenthesized_expressions_reduce_to_a_value() {
    let munger = sequence(
        Limit::Max(1),
        vec![
            single_rule(pat(r"\(\d+\)"), single_rule(pat(r"\(|\)"), "")),
            single_rule(pat(r"(\d+) *\* (\d+)"), Proc::from_tokens("$1 $2 *")),
            single_rule(pat(r"(\d+) *\+ (\d+)"), Proc::from_tokens("$1 $2 +")),
        ],
    )
    .repeat();
    assert_eq!(apply(&munger, "2 * (3 + 4) * 5"), "70");
}

#[test]
fn last_rewrites_the_rightmost_occurrence_only() {
    let munger = Munger::Last(Box::new(rule("foo", "bar")));
    assert_eq!(apply(&munger, "foo foo foo"), "foo foo bar");

    let munger = Munger::Last(Box::new(rule(pat("o+"), "0")));
    assert_eq!(apply(&munger, "foo boo"), "foo b0");
}

#[test]
fn named_munger_wraps_matches_through_do() {
    let mut mungers = HashMap::new();
    mungers.insert(
        "paren".to_string(),
        Munger::Proc(Proc::from_tokens(r#""(" _ ")""#)),
    );
    let munger = ruleset(
        Limit::Unbounded,
        vec![
            rule(pat(r"\d+"), Proc::from_tokens("do(paren)")),
            rule(pat(r"[a-z]+"), Proc::from_tokens("do(paren)")),
        ],
    );
    let locators = HashMap::new();
    let output = munge("abc123def567", &munger, &locators, &mungers).unwrap();
    assert_eq!(output, "(abc)(123)(def)(567)");
}

#[test]
fn replacement_literal_with_escape() {
    let munger = single_rule("a", Proc::from_tokens(r#""\n""#));
    assert_eq!(apply(&munger, "a"), "\n");
}

#[test]
fn accumulating_register_prefixes_every_word() {
    let munger = single_rule(pat(r"\w+"), Proc::from_tokens("get(x) _ cat set(x)"));
    assert_eq!(apply(&munger, "a,b,c"), "a,ab,abc");
}

#[test]
fn named_locator_resolves_from_the_locator_table() {
    let mut locators = HashMap::new();
    locators.insert("vowel".to_string(), pat("[aeiou]"));
    let mungers = HashMap::new();
    let munger = ruleset(Limit::Unbounded, vec![rule(Locator::named("vowel"), "_")]);
    let output = munge("banana", &munger, &locators, &mungers).unwrap();
    assert_eq!(output, "b_n_n_");
}

#[test]
fn unresolved_named_locator_never_matches() {
    let munger = ruleset(Limit::Unbounded, vec![rule(Locator::named("ghost"), "x")]);
    assert_eq!(apply(&munger, "anything"), "anything");
}

#[test]
fn named_locator_falls_back_to_a_register_value() {
    // a side-effect step plants the register, the next step searches with it
    let munger = sequence(
        Limit::Unbounded,
        vec![
            Munger::SideEffects(Box::new(Munger::Proc(Proc::from_tokens(
                r#""na" set(pat)"#,
            )))),
            ruleset(Limit::Unbounded, vec![rule(Locator::named("pat"), "X")]),
        ],
    );
    assert_eq!(apply(&munger, "banana"), "baXX");
}
