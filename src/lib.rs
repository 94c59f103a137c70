//! A lex/yacc-style parsing toolkit.
//!
//! `lalrkit` pairs a regex-driven tokenizer with an LALR(1) parser
//! generator whose tables are built in process, at parser construction
//! time. Grammars are declared through builder closures; reductions invoke
//! user callbacks over a typed value; syntax errors run the yacc recovery
//! protocol around a synthesized `error` terminal.
//!
//! ```
//! use lalrkit::{Assoc, Lexer, LexerDef, Parser, ParserDef, Token};
//!
//! #[derive(Debug, Clone)]
//! enum Value {
//!     Text(String),
//!     Num(i64),
//! }
//! impl From<String> for Value {
//!     fn from(s: String) -> Self {
//!         Value::Text(s)
//!     }
//! }
//! impl Value {
//!     fn num(&self) -> i64 {
//!         match self {
//!             Value::Num(n) => *n,
//!             Value::Text(t) => t.parse().unwrap(),
//!         }
//!     }
//! }
//!
//! let lexer: Lexer<Value> = Lexer::define(|l: &mut LexerDef<Value>| {
//!     l.ignore_chars(" ");
//!     l.token("NUM", r"\d+");
//!     l.literals("+*");
//! })
//! .unwrap();
//!
//! let parser: Parser<Value> = Parser::define(|p: &mut ParserDef<Value>| {
//!     p.terminal("NUM");
//!     p.literal('+');
//!     p.literal('*');
//!     p.precedence(Assoc::Left, &["+"]);
//!     p.precedence(Assoc::Left, &["*"]);
//!     p.rule("expr", &["expr", "+", "expr"], |r| {
//!         Ok(Value::Num(r.get(0).num() + r.get(2).num()))
//!     });
//!     p.rule("expr", &["expr", "*", "expr"], |r| {
//!         Ok(Value::Num(r.get(0).num() * r.get(2).num()))
//!     });
//!     p.rule("expr", &["NUM"], |r| Ok(r.get(0)));
//! })
//! .unwrap();
//!
//! let tokens: Vec<Token<Value>> = lexer
//!     .tokenize("1 + 2 * 3")
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! let result = parser.parse(tokens).unwrap().unwrap();
//! assert_eq!(result.num(), 7);
//! ```

mod digraph;
mod types;
mod util;

pub mod grammar;
pub mod lalr;
pub mod lexer;
pub mod lr0;
pub mod parser;
pub mod table;

pub use crate::grammar::{
    Assoc, Grammar, GrammarDef, GrammarError, GrammarProblem, GrammarWarning, Precedence,
};
pub use crate::lexer::{LexBuildError, LexError, Lexer, LexerDef, Scan, Token, ERROR_TOKEN};
pub use crate::parser::{
    ParseError, Parser, ParserDef, Recovery, Reduction, Span, SyntaxError,
};
pub use crate::table::{Action, ParseTable, TableOptions};
