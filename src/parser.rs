//! The table-driven shift/reduce parser runtime.
//!
//! A [`Parser`] owns the grammar, the generated tables and one boxed
//! reduction callback per production. [`Parser::parse`] drives a token
//! stream through the automaton, invoking callbacks on reduce and running
//! the yacc error-recovery protocol on syntax errors.

use crate::grammar::{
    Assoc, Grammar, GrammarDef, GrammarError, ProductionID, SymbolID, TerminalID,
};
use crate::lalr;
use crate::lexer::Token;
use crate::lr0::{self, LR0Automaton, StateID};
use crate::table::{self, Action, ParseTable, TableOptions};
use crate::types::Map;
use std::fmt;

/// Number of real tokens that must be shifted before the error hook is
/// re-armed.
const ERROR_LIMIT: u32 = 3;

/// A source region, aggregated upward through reductions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Span {
    /// First line of the region, or 0 when no child carried one.
    pub lineno: u32,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const EMPTY: Self = Self {
        lineno: 0,
        start: usize::MAX,
        end: 0,
    };

    pub fn of_token<V>(token: &Token<V>) -> Self {
        Self {
            lineno: token.lineno,
            start: token.index,
            end: token.end,
        }
    }

    pub fn is_unset(&self) -> bool {
        *self == Self::EMPTY
    }

    fn merge(self, other: Self) -> Self {
        Self {
            lineno: match (self.lineno, other.lineno) {
                (0, l) | (l, 0) => l,
                (a, b) => a.min(b),
            },
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

struct Frame<V> {
    sym: SymbolID,
    value: Option<V>,
    span: Span,
}

impl<V> Frame<V> {
    fn bottom() -> Self {
        Self {
            sym: SymbolID::T(TerminalID::EOI),
            value: None,
            span: Span::EMPTY,
        }
    }
}

/// Signal returned by a reduction callback to report a semantic problem as
/// a syntax error; the parser enters recovery as if the lookahead had been
/// rejected.
#[derive(Debug, Default)]
pub struct SyntaxError;

/// The view of the popped right-hand side handed to a reduction callback.
///
/// Child values are moved out on access, positionally or by symbol name.
/// When the same symbol name appears several times on the right-hand side
/// the accessors are suffixed `0, 1, 2…`, left to right.
pub struct Reduction<'p, V> {
    lhs: &'p str,
    children: Vec<Frame<V>>,
    names: &'p Map<String, usize>,
    below: &'p [Frame<V>],
    span: Span,
}

impl<V> Reduction<'_, V> {
    /// Name of the nonterminal being reduced.
    pub fn lhs(&self) -> &str {
        self.lhs
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Take the value at right-hand-side position `i`.
    ///
    /// Panics if taken twice or if the slot carries no value (the
    /// synthesized `error` terminal); use [`opt`](Self::opt) for those.
    pub fn get(&mut self, i: usize) -> V {
        self.children[i]
            .value
            .take()
            .expect("reduction value already taken or absent")
    }

    pub fn opt(&mut self, i: usize) -> Option<V> {
        self.children[i].value.take()
    }

    /// Take the value named `name`, with duplicate-suffix disambiguation.
    pub fn value(&mut self, name: &str) -> V {
        let &i = self
            .names
            .get(name)
            .unwrap_or_else(|| panic!("no symbol named {name:?} in production {}", self.lhs));
        self.get(i)
    }

    /// Peek at the value `n` symbols left of this production on the parse
    /// stack (`lookback(1)` is the symbol immediately to the left).
    pub fn lookback(&self, n: usize) -> Option<&V> {
        assert!(n >= 1, "lookback distance starts at 1");
        self.below
            .iter()
            .rev()
            .nth(n - 1)
            .and_then(|frame| frame.value.as_ref())
    }

    /// Aggregated span of the right-hand side.
    pub fn span(&self) -> Span {
        self.span
    }

    /// Minimum line number among children, 0 if none carried one.
    pub fn lineno(&self) -> u32 {
        self.span.lineno
    }

    /// Start index of the leftmost child.
    pub fn index(&self) -> usize {
        self.span.start
    }

    /// End index of the rightmost child.
    pub fn end(&self) -> usize {
        self.span.end
    }

    pub fn child_span(&self, i: usize) -> Span {
        self.children[i].span
    }
}

/// Handle passed to the error hook during recovery.
pub struct Recovery<'a, V> {
    errorok: &'a mut bool,
    restart: &'a mut bool,
    tokens: &'a mut dyn Iterator<Item = Token<V>>,
}

impl<V> Recovery<'_, V> {
    /// Re-arm error reporting: the next syntax error invokes the hook again
    /// even if fewer than three tokens were shifted since this one.
    pub fn errok(&mut self) {
        *self.errorok = true;
    }

    /// Reset the parser to its initial state, discarding the stacks.
    pub fn restart(&mut self) {
        *self.restart = true;
    }

    /// Pull the next token from the input, skipping it past the parser.
    pub fn next_token(&mut self) -> Option<Token<V>> {
        self.tokens.next()
    }
}

type ReduceFn<V> = Box<dyn Fn(&mut Reduction<'_, V>) -> Result<V, SyntaxError>>;
type ErrorFn<V> = Box<dyn Fn(&mut Recovery<'_, V>, Option<&Token<V>>) -> Option<Token<V>>>;

/// Internal failures that abort a parse. Syntax errors in the input are
/// not among them; those run the recovery protocol and at worst end the
/// parse with `Ok(None)`. A token whose type is not a declared terminal is
/// also a syntax error, not a failure.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("no goto for {symbol:?} from state {state}")]
    MissingGoto { symbol: String, state: u16 },
}

/// Declaration context for [`Parser::define`].
pub struct ParserDef<V> {
    grammar: GrammarDef,
    actions: Vec<ReduceFn<V>>,
    on_error: Option<ErrorFn<V>>,
    options: TableOptions,
}

impl<V> ParserDef<V> {
    /// Declare a token type.
    pub fn terminal(&mut self, name: &str) {
        self.grammar.terminal(name);
    }

    /// Declare several token types at once.
    pub fn terminals(&mut self, names: &[&str]) {
        for name in names {
            self.grammar.terminal(name);
        }
    }

    /// Declare a single-character literal terminal.
    pub fn literal(&mut self, c: char) {
        self.grammar.literal(c);
    }

    /// Append one precedence level, lowest binding first.
    pub fn precedence(&mut self, assoc: Assoc, terms: &[&str]) {
        self.grammar.precedence(assoc, terms);
    }

    /// Set the start symbol; defaults to the first rule's left-hand side.
    pub fn start(&mut self, name: &str) {
        self.grammar.start(name);
    }

    /// Add a production with its reduction callback.
    pub fn rule<F>(&mut self, lhs: &str, rhs: &[&str], action: F)
    where
        F: Fn(&mut Reduction<'_, V>) -> Result<V, SyntaxError> + 'static,
    {
        self.grammar.production(lhs, rhs);
        self.actions.push(Box::new(action));
    }

    /// Add a production whose precedence is overridden by the named
    /// (possibly fictitious) terminal, as `%prec` does.
    pub fn rule_prec<F>(&mut self, lhs: &str, rhs: &[&str], prec: &str, action: F)
    where
        F: Fn(&mut Reduction<'_, V>) -> Result<V, SyntaxError> + 'static,
    {
        self.grammar.production_prec(lhs, rhs, prec);
        self.actions.push(Box::new(action));
    }

    /// Install the error hook invoked on the first syntax error of each
    /// recovery window.
    pub fn on_error<F>(&mut self, hook: F)
    where
        F: Fn(&mut Recovery<'_, V>, Option<&Token<V>>) -> Option<Token<V>> + 'static,
    {
        self.on_error = Some(Box::new(hook));
    }

    /// Keep every state consulting its lookahead, even where a single
    /// reduction is the only possibility.
    pub fn disable_defaulted_states(&mut self) {
        self.options.defaulted_states = false;
    }

    /// Declare the number of conflicts the grammar is known to contain;
    /// matching totals are not warned about.
    pub fn expect_conflicts(&mut self, sr: usize, rr: usize) {
        self.options.expected_sr = Some(sr);
        self.options.expected_rr = Some(rr);
    }
}

/// A constructed parser: immutable tables plus the reduction callbacks.
pub struct Parser<V> {
    grammar: Grammar,
    automaton: LR0Automaton,
    table: ParseTable,
    actions: Map<ProductionID, ReduceFn<V>>,
    on_error: Option<ErrorFn<V>>,
}

impl<V> fmt::Debug for Parser<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("grammar", &self.grammar)
            .field("states", &self.automaton.states.len())
            .finish_non_exhaustive()
    }
}

impl<V> Parser<V> {
    /// Declare a grammar with callbacks and build its tables. Grammar
    /// problems are aggregated; table conflicts resolve per the precedence
    /// rules and are recorded on [`Parser::table`].
    pub fn define<F>(f: F) -> Result<Self, GrammarError>
    where
        F: FnOnce(&mut ParserDef<V>),
    {
        let mut def = ParserDef {
            grammar: GrammarDef::new(),
            actions: Vec::new(),
            on_error: None,
            options: TableOptions::default(),
        };
        f(&mut def);

        let grammar = def.grammar.finish()?;
        let automaton = lr0::lr0(&grammar);
        let lookaheads = lalr::lalr(&grammar, &automaton);
        let table = table::generate(&grammar, &automaton, &lookaheads, &def.options);

        // On success every declared rule resolved, so callbacks pair with
        // the user productions in declaration order.
        let ids: Vec<ProductionID> = grammar
            .productions()
            .map(|(id, _)| id)
            .filter(|&id| id != ProductionID::ACCEPT)
            .collect();
        debug_assert_eq!(ids.len(), def.actions.len());
        let actions = ids.into_iter().zip(def.actions).collect();

        Ok(Self {
            grammar,
            automaton,
            table,
            actions,
            on_error: def.on_error,
        })
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn table(&self) -> &ParseTable {
        &self.table
    }

    /// The human-readable debug dump: the grammar summary followed by the
    /// automaton (per-state items, actions, suppressed conflict
    /// alternatives and gotos).
    pub fn dump(&self) -> impl fmt::Display + '_ {
        crate::util::display_fn(move |f| {
            writeln!(f, "{}", self.grammar)?;
            write!(f, "{}", self.table.display(&self.grammar, &self.automaton))
        })
    }

    /// Parse a token stream to the start symbol's value, or `None` when
    /// error recovery consumed the whole input without accepting.
    pub fn parse<I>(&self, tokens: I) -> Result<Option<V>, ParseError>
    where
        I: IntoIterator<Item = Token<V>>,
    {
        Ok(self.parse_with_span(tokens)?.map(|(value, _)| value))
    }

    /// Like [`parse`](Self::parse), also returning the span aggregated over
    /// the accepted input.
    pub fn parse_with_span<I>(&self, tokens: I) -> Result<Option<(V, Span)>, ParseError>
    where
        I: IntoIterator<Item = Token<V>>,
    {
        let mut tokens = tokens.into_iter();
        let mut statestack: Vec<StateID> = vec![StateID::INITIAL];
        let mut symstack: Vec<Frame<V>> = vec![Frame::bottom()];
        let mut lookahead: Option<La<V>> = None;
        let mut lookaheadstack: Vec<La<V>> = Vec::new();
        let mut errorcount: u32 = 0;
        let mut errorok = false;
        let mut pending_error = false;

        loop {
            let state = *statestack.last().expect("state stack underflow");

            let mut action = None;
            if !pending_error {
                if let Some(&p) = self.table.defaulted.get(&state) {
                    // Defaulted states reduce without consulting the next
                    // token; a wrong lookahead surfaces on a later step.
                    action = Some(Action::Reduce(p));
                } else {
                    if lookahead.is_none() {
                        lookahead = Some(match lookaheadstack.pop() {
                            Some(la) => la,
                            None => match tokens.next() {
                                Some(token) => self.resolve(token),
                                None => La::End,
                            },
                        });
                    }
                    let terminal = match lookahead.as_ref().unwrap() {
                        La::Token { terminal, .. } => *terminal,
                        La::Error { .. } => Some(TerminalID::ERROR),
                        La::End => Some(TerminalID::EOI),
                    };
                    action = match terminal.and_then(|t| self.table.action(state, t)) {
                        Some(Action::Fail) | None => None,
                        resolved => resolved,
                    };
                }
            }
            pending_error = false;

            match action {
                Some(Action::Shift(next)) => {
                    statestack.push(next);
                    let frame = match lookahead.take().expect("shift without lookahead") {
                        La::Token { terminal, token } => Frame {
                            sym: SymbolID::T(terminal.expect("shifted unknown token type")),
                            span: Span::of_token(&token),
                            value: Some(token.value),
                        },
                        La::Error { span } => Frame {
                            sym: SymbolID::T(TerminalID::ERROR),
                            value: None,
                            span,
                        },
                        La::End => unreachable!("end of input is never shifted"),
                    };
                    symstack.push(frame);
                    errorcount = errorcount.saturating_sub(1);
                    continue;
                }

                Some(Action::Reduce(p)) => {
                    let production = self.grammar.production(p);
                    let count = production.right.len();
                    let children = symstack.split_off(symstack.len() - count);
                    statestack.truncate(statestack.len() - count);

                    let mut span = Span::EMPTY;
                    for child in &children {
                        span = span.merge(child.span);
                    }

                    let mut reduction = Reduction {
                        lhs: self.grammar.nonterminal_name(production.left),
                        children,
                        names: &production.names,
                        below: &symstack,
                        span,
                    };
                    let callback = self.actions.get(&p).expect("missing reduction callback");
                    let result = callback(&mut reduction);
                    drop(reduction);

                    match result {
                        Ok(value) => {
                            let below = *statestack.last().expect("state stack underflow");
                            let next = self.table.goto(below, production.left).ok_or_else(|| {
                                ParseError::MissingGoto {
                                    symbol: self.grammar.nonterminal_name(production.left).into(),
                                    state: below.raw(),
                                }
                            })?;
                            statestack.push(next);
                            symstack.push(Frame {
                                sym: SymbolID::N(production.left),
                                value: Some(value),
                                span,
                            });
                        }
                        Err(SyntaxError) => {
                            // The popped frames are gone; treat this as a
                            // fresh syntax error at the current lookahead.
                            errorok = true;
                            pending_error = true;
                        }
                    }
                    continue;
                }

                Some(Action::Accept) => {
                    let frame = symstack.pop().expect("empty symbol stack on accept");
                    return Ok(frame.value.map(|value| (value, frame.span)));
                }

                Some(Action::Fail) | None => {}
            }

            // ---- error recovery ----
            if errorcount == 0 || errorok {
                errorcount = ERROR_LIMIT;
                errorok = false;

                let at_end = matches!(lookahead, Some(La::End));
                let errtoken = match lookahead.as_ref() {
                    Some(La::Token { token, .. }) => Some(token),
                    _ => None,
                };

                let mut restart_requested = false;
                let mut replacement = None;
                match &self.on_error {
                    Some(hook) => {
                        let mut recovery = Recovery {
                            errorok: &mut errorok,
                            restart: &mut restart_requested,
                            tokens: &mut tokens,
                        };
                        replacement = hook(&mut recovery, errtoken);
                    }
                    None => match errtoken {
                        Some(t) if t.lineno != 0 => {
                            tracing::error!(line = t.lineno, token = %t.ty, "syntax error")
                        }
                        Some(t) => tracing::error!(token = %t.ty, "syntax error"),
                        None => tracing::error!("syntax error at end of input"),
                    },
                }

                if restart_requested {
                    statestack.clear();
                    statestack.push(StateID::INITIAL);
                    symstack.clear();
                    symstack.push(Frame::bottom());
                    lookahead = None;
                }
                if let Some(token) = replacement {
                    lookahead = Some(self.resolve(token));
                    errorok = true;
                    continue;
                }
                if restart_requested {
                    continue;
                }
                if at_end {
                    return Ok(None);
                }
            } else {
                errorcount = ERROR_LIMIT;
            }

            // A single stack entry left: the whole parse has unwound. Throw
            // the offending token away and start over.
            if statestack.len() <= 1 && !matches!(lookahead, Some(La::End)) {
                lookahead = None;
                lookaheadstack.clear();
                statestack.clear();
                statestack.push(StateID::INITIAL);
                symstack.clear();
                symstack.push(Frame::bottom());
                continue;
            }

            // Errors at end of input cannot resynchronize.
            if matches!(lookahead, Some(La::End)) {
                return Ok(None);
            }

            match lookahead.take() {
                Some(La::Error { span }) => {
                    // The error token itself failed: unwind one state.
                    symstack.pop();
                    statestack.pop();
                    lookahead = Some(La::Error { span });
                }
                Some(la) => {
                    if matches!(
                        symstack.last(),
                        Some(Frame {
                            sym: SymbolID::T(TerminalID::ERROR),
                            ..
                        })
                    ) {
                        // An error token is already on the stack: discard
                        // input until something shifts.
                        lookahead = None;
                    } else {
                        // Synthesize the error token and retry the current
                        // token after it is shifted.
                        let span = match &la {
                            La::Token { token, .. } => Span::of_token(token),
                            _ => Span::EMPTY,
                        };
                        lookaheadstack.push(la);
                        lookahead = Some(La::Error { span });
                    }
                }
                // Recovery was entered by a failed reduction before any
                // lookahead was fetched; resume with the next token.
                None => continue,
            }
        }
    }

    fn resolve(&self, token: Token<V>) -> La<V> {
        let terminal = self.grammar.terminal_id(&token.ty);
        if terminal.is_none() {
            tracing::warn!(ty = %token.ty, "token type is not a declared terminal");
        }
        La::Token { terminal, token }
    }
}

enum La<V> {
    Token {
        /// `None` for token types that are not declared terminals; those
        /// never shift and always take the error path.
        terminal: Option<TerminalID>,
        token: Token<V>,
    },
    Error {
        span: Span,
    },
    End,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_merge_tracks_extremes() {
        let a = Span {
            lineno: 3,
            start: 10,
            end: 14,
        };
        let b = Span {
            lineno: 2,
            start: 15,
            end: 20,
        };
        let merged = a.merge(b);
        assert_eq!(merged.lineno, 2);
        assert_eq!(merged.start, 10);
        assert_eq!(merged.end, 20);
    }

    #[test]
    fn span_merge_ignores_unset() {
        let unset = Span::EMPTY;
        let tok = Span {
            lineno: 7,
            start: 4,
            end: 5,
        };
        assert_eq!(unset.merge(tok), tok);
        assert_eq!(tok.merge(unset), tok);
        assert!(unset.merge(Span::EMPTY).is_unset());
    }
}
