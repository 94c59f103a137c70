//! The reduction view handed to callbacks: positional and named access,
//! stack lookback, absent slots and span aggregation.

use lalrkit::{Parser, Token};
use std::cell::RefCell;
use std::rc::Rc;

fn tok(ty: &str, value: &str) -> Token<String> {
    Token {
        ty: ty.to_owned(),
        value: value.to_owned(),
        lineno: 1,
        index: 0,
        end: 0,
    }
}

/// The embedded-action pattern: a marker nonterminal with an empty
/// right-hand side whose callback inspects the symbol shifted before it.
#[test]
fn lookback_reads_the_stack_below_an_empty_production() {
    let build = |defaulted: bool| {
        Parser::<String>::define(move |p| {
            if !defaulted {
                p.disable_defaulted_states();
            }
            p.terminals(&["ID", "EQ", "NUM"]);
            p.start("assign");
            p.rule("assign", &["ID", "mark", "EQ", "NUM"], |r| {
                let seen = r.get(1);
                let num = r.get(3);
                Ok(format!("{seen}={num}"))
            });
            p.rule("mark", &[], |r| {
                let left = r.lookback(1).cloned().unwrap_or_default();
                Ok(left.to_uppercase())
            });
        })
        .unwrap()
    };

    let input = || {
        vec![
            tok("ID", "count"),
            tok("EQ", "="),
            tok("NUM", "42"),
        ]
    };

    // The marker reduces via a defaulted state in the eager table and via
    // an ordinary lookahead consultation otherwise; both see the ID.
    for defaulted in [true, false] {
        let parser = build(defaulted);
        let result = parser.parse(input()).unwrap();
        assert_eq!(result, Some("COUNT=42".to_owned()));
    }
}

#[test]
fn error_slots_read_as_absent() {
    let slot = Rc::new(RefCell::new(Some("sentinel".to_owned())));
    let parser: Parser<String> = {
        let slot = slot.clone();
        Parser::define(move |p| {
            p.terminals(&["OPEN", "CLOSE"]);
            let slot = slot.clone();
            p.rule("group", &["OPEN", "error", "CLOSE"], move |r| {
                *slot.borrow_mut() = r.opt(1);
                Ok("group".to_owned())
            });
            p.on_error(|_, _| None);
        })
        .unwrap()
    };

    let result = parser
        .parse(vec![tok("OPEN", "("), tok("OPEN", "("), tok("CLOSE", ")")])
        .unwrap();
    assert_eq!(result, Some("group".to_owned()));
    assert_eq!(*slot.borrow(), None);
}

#[test]
fn spans_aggregate_minimum_line_and_extremes() {
    let observed = Rc::new(RefCell::new(Vec::new()));
    let parser: Parser<String> = {
        let observed = observed.clone();
        Parser::define(move |p| {
            p.terminals(&["A", "B"]);
            let observed = observed.clone();
            p.rule("pair", &["A", "B"], move |r| {
                observed
                    .borrow_mut()
                    .push((r.lineno(), r.index(), r.end(), r.child_span(1).lineno));
                Ok("pair".to_owned())
            });
        })
        .unwrap()
    };

    let a = Token {
        ty: "A".to_owned(),
        value: "a".to_owned(),
        lineno: 3,
        index: 10,
        end: 11,
    };
    let b = Token {
        ty: "B".to_owned(),
        value: "b".to_owned(),
        lineno: 2,
        index: 12,
        end: 13,
    };
    let (value, span) = parser
        .parse_with_span(vec![a, b])
        .unwrap()
        .expect("accepted");
    assert_eq!(value, "pair");

    let (lineno, start, end, b_line) = observed.borrow()[0];
    assert_eq!(lineno, 2, "minimum line number wins");
    assert_eq!(start, 10);
    assert_eq!(end, 13);
    assert_eq!(b_line, 2);

    assert_eq!(span.lineno, 2);
    assert_eq!(span.start, 10);
    assert_eq!(span.end, 13);
}

#[test]
fn dump_contains_grammar_and_states() {
    let parser: Parser<String> = Parser::define(|p| {
        p.terminals(&["A"]);
        p.rule("s", &["A"], |r| Ok(r.get(0)));
    })
    .unwrap();
    let dump = parser.dump().to_string();
    assert!(dump.contains("Rule 0"), "grammar section present");
    assert!(dump.contains("s -> A"));
    assert!(dump.contains("state 0"), "automaton section present");
    assert!(dump.contains("accept"));
}
