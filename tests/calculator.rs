//! End-to-end arithmetic scenarios: precedence, associativity and the
//! `%prec` override, driven through the lexer and parser together.

use lalrkit::{Assoc, Lexer, Parser, Token};

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Text(String),
    Num(i64),
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl Value {
    fn num(&self) -> i64 {
        match self {
            Value::Num(n) => *n,
            Value::Text(t) => panic!("expected a number, got {t:?}"),
        }
    }
}

fn calc_lexer() -> Lexer<Value> {
    Lexer::define(|l| {
        l.ignore_chars(" \t");
        l.token_with("NUM", r"\d+", |_, mut t| {
            let parsed = match &t.value {
                Value::Text(s) => s.parse().expect("digits"),
                Value::Num(n) => *n,
            };
            t.value = Value::Num(parsed);
            Some(t)
        });
        l.literals("+-*/()");
    })
    .expect("lexer builds")
}

fn calc_parser() -> Parser<Value> {
    Parser::define(|p: &mut lalrkit::ParserDef<Value>| {
        p.terminal("NUM");
        for c in "+-*/()".chars() {
            p.literal(c);
        }
        p.precedence(Assoc::Left, &["+", "-"]);
        p.precedence(Assoc::Left, &["*", "/"]);
        p.precedence(Assoc::Right, &["UMINUS"]);

        p.rule("expr", &["expr", "+", "expr"], |r| {
            Ok(Value::Num(r.get(0).num() + r.get(2).num()))
        });
        p.rule("expr", &["expr", "-", "expr"], |r| {
            Ok(Value::Num(r.get(0).num() - r.get(2).num()))
        });
        p.rule("expr", &["expr", "*", "expr"], |r| {
            Ok(Value::Num(r.get(0).num() * r.get(2).num()))
        });
        p.rule("expr", &["expr", "/", "expr"], |r| {
            Ok(Value::Num(r.get(0).num() / r.get(2).num()))
        });
        p.rule_prec("expr", &["-", "expr"], "UMINUS", |r| {
            Ok(Value::Num(-r.get(1).num()))
        });
        p.rule("expr", &["(", "expr", ")"], |r| Ok(r.get(1)));
        p.rule("expr", &["NUM"], |r| Ok(r.get(0)));
    })
    .expect("parser builds")
}

fn eval_with(parser: &Parser<Value>, text: &str) -> i64 {
    let lexer = calc_lexer();
    let tokens: Vec<Token<Value>> = lexer
        .tokenize(text)
        .collect::<Result<_, _>>()
        .expect("lexes");
    parser
        .parse(tokens)
        .expect("no internal error")
        .expect("accepted")
        .num()
}

fn eval(text: &str) -> i64 {
    eval_with(&calc_parser(), text)
}

#[test]
fn precedence_orders_the_operators() {
    assert_eq!(eval("3 + 5 * (10 - 20)"), -47);
    assert_eq!(eval("2 * 3 + 4"), 10);
    assert_eq!(eval("2 + 3 * 4"), 14);
}

#[test]
fn left_associativity_folds_leftward() {
    assert_eq!(eval("10 - 4 - 3"), 3);
    assert_eq!(eval("100 / 10 / 5"), 2);
}

#[test]
fn unary_minus_binds_tighter_via_prec_override() {
    assert_eq!(eval("-2 + 3"), 1);
    assert_eq!(eval("- 2 * 3"), -6);
    assert_eq!(eval("--2"), 2);
}

#[test]
fn grammar_is_conflict_free() {
    let parser = calc_parser();
    assert!(parser.table().sr_conflicts.is_empty());
    assert!(parser.table().rr_conflicts.is_empty());
    assert!(parser.grammar().warnings().is_empty());
}

#[test]
fn accepted_span_covers_the_input() {
    let parser = calc_parser();
    let lexer = calc_lexer();
    let text = "3 + 5 * (10 - 20)";
    let tokens: Vec<Token<Value>> = lexer.tokenize(text).collect::<Result<_, _>>().unwrap();
    let (value, span) = parser
        .parse_with_span(tokens)
        .unwrap()
        .expect("accepted");
    assert_eq!(value.num(), -47);
    assert_eq!(span.start, 0);
    assert_eq!(span.end, text.len());
    assert_eq!(span.lineno, 1);
}

#[test]
fn defaulted_states_do_not_change_results() {
    let eager = calc_parser();
    assert!(!eager.table().defaulted.is_empty());

    let plain: Parser<Value> = Parser::define(|p: &mut lalrkit::ParserDef<Value>| {
        p.disable_defaulted_states();
        p.terminal("NUM");
        for c in "+-*/()".chars() {
            p.literal(c);
        }
        p.precedence(Assoc::Left, &["+", "-"]);
        p.precedence(Assoc::Left, &["*", "/"]);
        p.precedence(Assoc::Right, &["UMINUS"]);
        p.rule("expr", &["expr", "+", "expr"], |r| {
            Ok(Value::Num(r.get(0).num() + r.get(2).num()))
        });
        p.rule("expr", &["expr", "-", "expr"], |r| {
            Ok(Value::Num(r.get(0).num() - r.get(2).num()))
        });
        p.rule("expr", &["expr", "*", "expr"], |r| {
            Ok(Value::Num(r.get(0).num() * r.get(2).num()))
        });
        p.rule("expr", &["expr", "/", "expr"], |r| {
            Ok(Value::Num(r.get(0).num() / r.get(2).num()))
        });
        p.rule_prec("expr", &["-", "expr"], "UMINUS", |r| {
            Ok(Value::Num(-r.get(1).num()))
        });
        p.rule("expr", &["(", "expr", ")"], |r| Ok(r.get(1)));
        p.rule("expr", &["NUM"], |r| Ok(r.get(0)));
    })
    .unwrap();
    assert!(plain.table().defaulted.is_empty());

    for text in ["3 + 5 * (10 - 20)", "-2 + 3", "1 * 2 * 3 - 4"] {
        assert_eq!(eval_with(&eager, text), eval_with(&plain, text));
    }
}

#[test]
fn automaton_dump_is_byte_identical_across_builds() {
    let a = calc_parser();
    let b = calc_parser();
    assert_eq!(a.dump().to_string(), b.dump().to_string());
    assert!(!a.dump().to_string().is_empty());
}

#[test]
fn named_access_disambiguates_duplicates() {
    let parser: Parser<Value> = Parser::define(|p: &mut lalrkit::ParserDef<Value>| {
        p.terminal("NUM");
        p.literal('-');
        p.precedence(Assoc::Left, &["-"]);
        p.rule("expr", &["expr", "-", "expr"], |r| {
            let left = r.value("expr0").num();
            let right = r.value("expr1").num();
            Ok(Value::Num(left - right))
        });
        p.rule("expr", &["NUM"], |r| Ok(r.value("NUM")));
    })
    .unwrap();
    assert_eq!(eval_with(&parser, "9 - 2 - 3"), 4);
}
