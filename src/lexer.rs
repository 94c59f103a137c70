//! The regex-driven tokenizer runtime.
//!
//! A lexer is an ordered set of named patterns compiled into one master
//! alternation per state. Declaration order is preserved in the
//! alternation, so rules declared earlier win over later ones at the same
//! position: declare longer tokens (`==`) before their prefixes (`=`).

use crate::types::{Map, Set};
use std::fmt;

/// Token type used for tokens emitted by the lexer's error hook.
pub const ERROR_TOKEN: &str = "ERROR";

/// A single lexed token. `index` and `end` delimit the matched source text;
/// `lineno` is maintained by user actions (typically a newline rule).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<V> {
    pub ty: String,
    pub value: V,
    pub lineno: u32,
    pub index: usize,
    pub end: usize,
}

/// Runtime lexing failure: no pattern, literal or error hook consumed the
/// input at `index`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal character {ch:?} at index {index}")]
pub struct LexError {
    pub ch: char,
    pub index: usize,
    pub lineno: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum LexBuildError {
    #[error("invalid regex for token {token:?} in state {state:?}")]
    InvalidPattern {
        token: String,
        state: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("regex for token {token:?} matches empty input")]
    EmptyMatch { token: String },

    #[error("token {token:?} defined twice in state {state:?}")]
    DuplicateToken { token: String, state: String },

    #[error("{token:?} is not a usable token name")]
    InvalidName { token: String },

    #[error("remap declared for unknown rule {token:?} in state {state:?}")]
    UnknownRemapRule { token: String, state: String },
}

type ActionFn<V> = Box<dyn Fn(&mut Scan<'_, V>, Token<V>) -> Option<Token<V>>>;
type EofFn<V> = Box<dyn Fn(&mut Scan<'_, V>) -> Option<String>>;

/// Mutable lexing context handed to rule actions and the error/eof hooks.
pub struct Scan<'s, V> {
    index: &'s mut usize,
    lineno: &'s mut u32,
    mode_stack: &'s mut Vec<usize>,
    modes: &'s Map<String, Mode<V>>,
    text: &'s str,
}

impl<V> Scan<'_, V> {
    pub fn index(&self) -> usize {
        *self.index
    }

    /// Move the scan position. Must land on a character boundary.
    pub fn set_index(&mut self, index: usize) {
        *self.index = index;
    }

    /// Advance the scan position by `n` bytes.
    pub fn skip(&mut self, n: usize) {
        *self.index += n;
    }

    pub fn lineno(&self) -> u32 {
        *self.lineno
    }

    pub fn set_lineno(&mut self, lineno: u32) {
        *self.lineno = lineno;
    }

    pub fn bump_lineno(&mut self, n: u32) {
        *self.lineno += n;
    }

    /// The input remaining from the current position.
    pub fn rest(&self) -> &str {
        self.text.get(*self.index..).unwrap_or("")
    }

    /// Switch the active lexer state in place.
    pub fn begin(&mut self, state: &str) {
        let idx = self.state_index(state);
        *self.mode_stack.last_mut().expect("empty lexer state stack") = idx;
    }

    /// Enter a lexer state, remembering the current one.
    pub fn push_state(&mut self, state: &str) {
        let idx = self.state_index(state);
        self.mode_stack.push(idx);
    }

    /// Return to the state active before the matching `push_state`.
    pub fn pop_state(&mut self) {
        assert!(self.mode_stack.len() > 1, "lexer state stack underflow");
        self.mode_stack.pop();
    }

    fn state_index(&self, state: &str) -> usize {
        self.modes
            .get_index_of(state)
            .unwrap_or_else(|| panic!("unknown lexer state {state:?}"))
    }
}

struct Rule<V> {
    name: String,
    ignored: bool,
    action: Option<ActionFn<V>>,
    remap: Map<String, String>,
}

struct Mode<V> {
    master: Option<regex::Regex>,
    rules: Vec<Rule<V>>,
}

/// A compiled lexer. [`Lexer::tokenize`] produces a lazy token stream.
pub struct Lexer<V> {
    modes: Map<String, Mode<V>>,
    ignore: String,
    literals: Set<char>,
    on_error: Option<ActionFn<V>>,
    on_eof: Option<EofFn<V>>,
}

impl<V> fmt::Debug for Lexer<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lexer")
            .field("states", &self.modes.keys().collect::<Vec<_>>())
            .field("ignore", &self.ignore)
            .finish_non_exhaustive()
    }
}

impl<V> Lexer<V> {
    /// Declare and compile a lexer.
    pub fn define<F>(f: F) -> Result<Self, LexBuildError>
    where
        F: FnOnce(&mut LexerDef<V>),
    {
        let mut def = LexerDef::new();
        f(&mut def);
        def.compile()
    }
}

impl<V: From<String>> Lexer<V> {
    /// Tokenize `text` lazily. Lex errors surface as `Err` items; the
    /// stream continues after an error only if the error hook advanced the
    /// scan position.
    pub fn tokenize(&self, text: &str) -> Tokens<'_, V> {
        Tokens {
            lexer: self,
            text: text.to_owned(),
            index: 0,
            lineno: 1,
            mode_stack: vec![0],
            failed: false,
        }
    }
}

struct RuleDef<V> {
    name: String,
    pattern: String,
    ignored: bool,
    action: Option<ActionFn<V>>,
}

/// One lexer state being declared: an ordered list of token rules.
pub struct ModeDef<V> {
    rules: Vec<RuleDef<V>>,
    remaps: Vec<(String, String, String)>,
}

impl<V> ModeDef<V> {
    fn new() -> Self {
        Self {
            rules: Vec::new(),
            remaps: Vec::new(),
        }
    }

    /// Declare a token rule; the token value is the matched text.
    pub fn token(&mut self, name: &str, pattern: &str) -> &mut Self {
        self.rule(name, pattern, false, None)
    }

    /// Declare a token rule with an action. The action may rewrite the
    /// token, mutate the scan position or switch states; returning `None`
    /// discards the match.
    pub fn token_with<F>(&mut self, name: &str, pattern: &str, action: F) -> &mut Self
    where
        F: Fn(&mut Scan<'_, V>, Token<V>) -> Option<Token<V>> + 'static,
    {
        self.rule(name, pattern, false, Some(Box::new(action)))
    }

    /// Declare a skipped pattern (comments, runs of whitespace).
    pub fn ignore(&mut self, name: &str, pattern: &str) -> &mut Self {
        self.rule(name, pattern, true, None)
    }

    /// A skipped pattern with an action, e.g. a newline rule bumping
    /// [`Scan::lineno`].
    pub fn ignore_with<F>(&mut self, name: &str, pattern: &str, action: F) -> &mut Self
    where
        F: Fn(&mut Scan<'_, V>, Token<V>) -> Option<Token<V>> + 'static,
    {
        self.rule(name, pattern, true, Some(Box::new(action)))
    }

    /// After `rule` matches exactly `text`, relabel the token as `ty`.
    /// The usual use is keyword extraction from an identifier rule.
    pub fn remap(&mut self, rule: &str, text: &str, ty: &str) -> &mut Self {
        self.remaps
            .push((rule.to_owned(), text.to_owned(), ty.to_owned()));
        self
    }

    fn rule(
        &mut self,
        name: &str,
        pattern: &str,
        ignored: bool,
        action: Option<ActionFn<V>>,
    ) -> &mut Self {
        self.rules.push(RuleDef {
            name: name.to_owned(),
            pattern: pattern.to_owned(),
            ignored,
            action,
        });
        self
    }
}

/// Declaration context for [`Lexer::define`].
pub struct LexerDef<V> {
    modes: Map<String, ModeDef<V>>,
    ignore: String,
    literals: Set<char>,
    on_error: Option<ActionFn<V>>,
    on_eof: Option<EofFn<V>>,
}

impl<V> LexerDef<V> {
    fn new() -> Self {
        let mut modes = Map::default();
        modes.insert("INITIAL".to_owned(), ModeDef::new());
        Self {
            modes,
            ignore: String::new(),
            literals: Set::default(),
            on_error: None,
            on_eof: None,
        }
    }

    /// Characters skipped between tokens without pattern matching.
    pub fn ignore_chars(&mut self, chars: &str) {
        self.ignore = chars.to_owned();
    }

    /// Single characters usable as literal tokens; the token type is the
    /// character itself. Consulted only when no pattern matches.
    pub fn literals(&mut self, chars: &str) {
        self.literals.extend(chars.chars());
    }

    /// The lexer state named `state`, created on first use. Rules declared
    /// through the returned handle are active only in that state.
    pub fn state(&mut self, state: &str) -> &mut ModeDef<V> {
        self.modes
            .entry(state.to_owned())
            .or_insert_with(ModeDef::new)
    }

    /// Hook invoked on unmatched input. It receives a token whose value is
    /// the remaining text; it may advance the position past the bad input
    /// and may return a token to emit (conventionally typed
    /// [`ERROR_TOKEN`]).
    pub fn on_error<F>(&mut self, hook: F)
    where
        F: Fn(&mut Scan<'_, V>, Token<V>) -> Option<Token<V>> + 'static,
    {
        self.on_error = Some(Box::new(hook));
    }

    /// Hook invoked at end of input; returning more text resumes lexing
    /// from its start.
    pub fn on_eof<F>(&mut self, hook: F)
    where
        F: Fn(&mut Scan<'_, V>) -> Option<String> + 'static,
    {
        self.on_eof = Some(Box::new(hook));
    }

    // Convenience delegates to the INITIAL state.

    pub fn token(&mut self, name: &str, pattern: &str) -> &mut Self {
        self.state("INITIAL").token(name, pattern);
        self
    }

    pub fn token_with<F>(&mut self, name: &str, pattern: &str, action: F) -> &mut Self
    where
        F: Fn(&mut Scan<'_, V>, Token<V>) -> Option<Token<V>> + 'static,
    {
        self.state("INITIAL").token_with(name, pattern, action);
        self
    }

    pub fn ignore(&mut self, name: &str, pattern: &str) -> &mut Self {
        self.state("INITIAL").ignore(name, pattern);
        self
    }

    pub fn ignore_with<F>(&mut self, name: &str, pattern: &str, action: F) -> &mut Self
    where
        F: Fn(&mut Scan<'_, V>, Token<V>) -> Option<Token<V>> + 'static,
    {
        self.state("INITIAL").ignore_with(name, pattern, action);
        self
    }

    pub fn remap(&mut self, rule: &str, text: &str, ty: &str) -> &mut Self {
        self.state("INITIAL").remap(rule, text, ty);
        self
    }

    fn compile(self) -> Result<Lexer<V>, LexBuildError> {
        let mut modes = Map::default();
        for (state, def) in self.modes {
            let mut seen = Set::<String>::default();
            let mut parts = Vec::with_capacity(def.rules.len());
            let mut rules = Vec::with_capacity(def.rules.len());

            for decl in def.rules {
                if !is_group_name(&decl.name) {
                    return Err(LexBuildError::InvalidName { token: decl.name });
                }
                if !seen.insert(decl.name.clone()) {
                    return Err(LexBuildError::DuplicateToken {
                        token: decl.name,
                        state,
                    });
                }

                let single = regex::Regex::new(&format!("(?:{})", decl.pattern)).map_err(
                    |source| LexBuildError::InvalidPattern {
                        token: decl.name.clone(),
                        state: state.clone(),
                        source: Box::new(source),
                    },
                )?;
                if single.is_match("") {
                    return Err(LexBuildError::EmptyMatch { token: decl.name });
                }

                parts.push(format!("(?P<{}>{})", decl.name, decl.pattern));
                rules.push(Rule {
                    name: decl.name,
                    ignored: decl.ignored,
                    action: decl.action,
                    remap: Map::default(),
                });
            }

            for (rule, text, ty) in def.remaps {
                let Some(target) = rules.iter_mut().find(|r| r.name == rule) else {
                    return Err(LexBuildError::UnknownRemapRule { token: rule, state });
                };
                target.remap.insert(text, ty);
            }

            // One anchored alternation per state, in declaration order; the
            // regex engine prefers earlier branches at the same position.
            let master = if parts.is_empty() {
                None
            } else {
                let pattern = format!(r"\A(?:{})", parts.join("|"));
                Some(regex::Regex::new(&pattern).map_err(|source| {
                    LexBuildError::InvalidPattern {
                        token: "<master>".to_owned(),
                        state: state.clone(),
                        source: Box::new(source),
                    }
                })?)
            };

            modes.insert(state, Mode { master, rules });
        }

        Ok(Lexer {
            modes,
            ignore: self.ignore,
            literals: self.literals,
            on_error: self.on_error,
            on_eof: self.on_eof,
        })
    }
}

/// The lazy token stream produced by [`Lexer::tokenize`].
pub struct Tokens<'l, V> {
    lexer: &'l Lexer<V>,
    text: String,
    index: usize,
    lineno: u32,
    mode_stack: Vec<usize>,
    failed: bool,
}

impl<V> Tokens<'_, V> {
    /// Current scan position in the input.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn lineno(&self) -> u32 {
        self.lineno
    }
}

impl<V: From<String>> Iterator for Tokens<'_, V> {
    type Item = Result<Token<V>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let rest = self.text.get(self.index..).unwrap_or("");
            let Some(c) = rest.chars().next() else {
                if let Some(hook) = &self.lexer.on_eof {
                    let mut scan = Scan {
                        index: &mut self.index,
                        lineno: &mut self.lineno,
                        mode_stack: &mut self.mode_stack,
                        modes: &self.lexer.modes,
                        text: &self.text,
                    };
                    if let Some(more) = hook(&mut scan) {
                        self.text = more;
                        self.index = 0;
                        continue;
                    }
                }
                return None;
            };

            if self.lexer.ignore.contains(c) {
                self.index += c.len_utf8();
                continue;
            }

            let mode_idx = *self.mode_stack.last().expect("empty lexer state stack");
            let mode = self.lexer.modes.get_index(mode_idx).expect("mode index").1;

            let matched = mode.master.as_ref().and_then(|master| {
                master.captures(rest).map(|caps| {
                    mode.rules
                        .iter()
                        .find_map(|rule| caps.name(&rule.name).map(|m| (rule, m.end())))
                        .expect("master regex matched no rule group")
                })
            });

            if let Some((rule, len)) = matched {
                let start = self.index;
                let end = start + len;
                let text = rest[..len].to_owned();
                self.index = end;

                let mut token = Token {
                    ty: rule.name.clone(),
                    value: V::from(text.clone()),
                    lineno: self.lineno,
                    index: start,
                    end,
                };
                if let Some(action) = &rule.action {
                    let mut scan = Scan {
                        index: &mut self.index,
                        lineno: &mut self.lineno,
                        mode_stack: &mut self.mode_stack,
                        modes: &self.lexer.modes,
                        text: &self.text,
                    };
                    match action(&mut scan, token) {
                        Some(t) => token = t,
                        None => continue,
                    }
                }
                if let Some(ty) = rule.remap.get(&text) {
                    token.ty = ty.clone();
                }
                if rule.ignored {
                    continue;
                }
                return Some(Ok(token));
            }

            if self.lexer.literals.contains(&c) {
                let start = self.index;
                let end = start + c.len_utf8();
                self.index = end;
                return Some(Ok(Token {
                    ty: c.to_string(),
                    value: V::from(c.to_string()),
                    lineno: self.lineno,
                    index: start,
                    end,
                }));
            }

            // Unmatched input: hand the remaining text to the error hook.
            let bad = Token {
                ty: ERROR_TOKEN.to_owned(),
                value: V::from(rest.to_owned()),
                lineno: self.lineno,
                index: self.index,
                end: self.text.len(),
            };
            let error = LexError {
                ch: c,
                index: self.index,
                lineno: self.lineno,
            };
            match &self.lexer.on_error {
                Some(hook) => {
                    let before = self.index;
                    let mut scan = Scan {
                        index: &mut self.index,
                        lineno: &mut self.lineno,
                        mode_stack: &mut self.mode_stack,
                        modes: &self.lexer.modes,
                        text: &self.text,
                    };
                    let emitted = hook(&mut scan, bad);
                    if let Some(token) = emitted {
                        return Some(Ok(token));
                    }
                    if self.index == before {
                        // The hook consumed nothing; refusing to spin.
                        self.failed = true;
                        return Some(Err(error));
                    }
                }
                None => {
                    self.failed = true;
                    return Some(Err(error));
                }
            }
        }
    }
}

/// Rule names double as regex group names, which restricts them to ASCII
/// identifiers.
fn is_group_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    let Some(first) = bytes.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
