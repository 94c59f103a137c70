//! Grammar representation, builder and validation.
//!
//! A grammar is declared through [`Grammar::define`] with plain symbol
//! names; every structural problem found while resolving the declaration is
//! collected and reported in one aggregate [`GrammarError`] rather than on
//! first failure.

use crate::types::{Map, Set};
use crate::util::display_fn;
use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TerminalID(u16);

impl TerminalID {
    /// The end-of-input terminal, `$end`.
    pub const EOI: Self = Self(0);
    /// The synthetic `error` terminal used for recovery.
    pub const ERROR: Self = Self(1);
    const OFFSET: u16 = 2;

    pub(crate) fn raw(self) -> usize {
        self.0.into()
    }

    pub(crate) fn from_raw(raw: usize) -> Self {
        Self(raw.try_into().expect("terminal id out of range"))
    }
}

impl fmt::Debug for TerminalID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Self::EOI => write!(f, "T#End"),
            &Self::ERROR => write!(f, "T#Error"),
            _ => write!(f, "T#{:03}", self.0),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonterminalID(u16);

impl NonterminalID {
    /// The augmented start symbol, `S'`.
    pub const START: Self = Self(0);
    const OFFSET: u16 = 1;
}

impl fmt::Debug for NonterminalID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Self::START => write!(f, "N#Start"),
            _ => write!(f, "N#{:03}", self.0),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum SymbolID {
    T(TerminalID),
    N(NonterminalID),
}

impl fmt::Debug for SymbolID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::T(t) => write!(f, "{:?}", t),
            Self::N(n) => write!(f, "{:?}", n),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductionID(u16);

impl ProductionID {
    /// The augmentation `S' -> start`, always production 0.
    pub const ACCEPT: Self = Self(0);
    const OFFSET: u16 = 1;

    pub(crate) fn index(self) -> usize {
        self.0.into()
    }
}

impl fmt::Debug for ProductionID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Self::ACCEPT => write!(f, "P#Accept"),
            _ => write!(f, "P#{:03}", self.0),
        }
    }
}

/// A set of terminals, backed by a bit set keyed on raw terminal ids.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TerminalSet {
    inner: bit_set::BitSet,
}

impl TerminalSet {
    pub fn contains(&self, id: TerminalID) -> bool {
        self.inner.contains(id.raw())
    }

    pub fn insert(&mut self, id: TerminalID) -> bool {
        self.inner.insert(id.raw())
    }

    pub fn union_with(&mut self, other: &Self) {
        self.inner.union_with(&other.inner)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = TerminalID> + '_ {
        self.inner.iter().map(TerminalID::from_raw)
    }
}

impl FromIterator<TerminalID> for TerminalSet {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = TerminalID>,
    {
        Self {
            inner: iter.into_iter().map(TerminalID::raw).collect(),
        }
    }
}

/// Operator associativity, declared per precedence level.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Assoc {
    Left,
    Right,
    Nonassoc,
}

impl fmt::Display for Assoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Nonassoc => "nonassoc",
        })
    }
}

/// A precedence level. Levels are numbered from 1, lowest binding first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Precedence {
    pub level: u16,
    pub assoc: Assoc,
}

#[derive(Debug)]
pub struct TerminalData {
    pub name: String,
    pub precedence: Option<Precedence>,
}

/// A single production rule in the normalized grammar.
#[derive(Debug)]
pub struct Production {
    pub left: NonterminalID,
    pub right: Vec<SymbolID>,
    /// Resolved precedence: the `%prec` override if present, otherwise the
    /// precedence of the rightmost terminal on the right-hand side.
    pub prec: Option<Precedence>,
    /// Accessor name for each right-hand-side position. Repeated symbol
    /// names are disambiguated with `0, 1, 2…` suffixes, left to right.
    pub names: Map<String, usize>,
}

impl Production {
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            write!(f, "{} ->", g.nonterminal_name(self.left))?;
            if self.right.is_empty() {
                f.write_str(" <empty>")?;
            }
            for sym in &self.right {
                write!(f, " {}", g.symbol_name(*sym))?;
            }
            Ok(())
        })
    }
}

/// Non-fatal findings recorded during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarWarning {
    UnusedTerminal { name: String },
    UnusedRule { name: String },
    UnreachableNonterminal { name: String },
}

impl fmt::Display for GrammarWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnusedTerminal { name } => {
                write!(f, "token {name:?} defined, but not used")
            }
            Self::UnusedRule { name } => {
                write!(f, "rule {name:?} defined, but not used")
            }
            Self::UnreachableNonterminal { name } => {
                write!(f, "symbol {name:?} is unreachable")
            }
        }
    }
}

/// A single structural problem in the declared grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarProblem {
    #[error("symbol {symbol:?} used in rule `{rule}`, but not defined as a token or a rule")]
    UndefinedSymbol { symbol: String, rule: String },

    #[error("illegal rule name {name:?}, already defined as a token")]
    RuleNamedLikeTerminal { name: String },

    #[error("illegal rule name {name:?}, it is a reserved word")]
    ReservedRuleName { name: String },

    #[error("{name:?} is not a valid symbol name")]
    InvalidSymbolName { name: String },

    #[error("reserved symbol {name:?} may not appear on a right-hand side")]
    ReservedSymbol { name: String },

    #[error("duplicate rule `{rule}`")]
    DuplicateProduction { rule: String },

    #[error("nothing known about the precedence of {name:?}")]
    UnknownPrecedence { name: String },

    #[error("precedence already specified for terminal {name:?}")]
    DuplicatePrecedence { name: String },

    #[error("precedence rule {assoc:?} defined for unknown symbol {name:?}")]
    UnusedPrecedence { name: String, assoc: String },

    #[error("infinite recursion detected for symbol {symbol:?}")]
    InfiniteRecursion { symbol: String },

    #[error("start symbol {name:?} undefined")]
    UndefinedStart { name: String },

    #[error("no grammar rules are defined")]
    EmptyGrammar,
}

/// Aggregate of every problem found while building a grammar.
#[derive(Debug, thiserror::Error)]
pub struct GrammarError {
    pub problems: Vec<GrammarProblem>,
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "unable to build grammar:")?;
        for problem in &self.problems {
            writeln!(f, "  - {problem}")?;
        }
        Ok(())
    }
}

/// The validated, immutable grammar.
#[derive(Debug)]
pub struct Grammar {
    terminals: Map<TerminalID, TerminalData>,
    terminal_ids: Map<String, TerminalID>,
    nonterminals: Map<NonterminalID, String>,
    nonterminal_ids: Map<String, NonterminalID>,
    productions: Map<ProductionID, Production>,
    by_lhs: Map<NonterminalID, Vec<ProductionID>>,
    start: NonterminalID,
    nullables: Set<NonterminalID>,
    firsts: Map<NonterminalID, TerminalSet>,
    warnings: Vec<GrammarWarning>,
}

impl Grammar {
    /// Declare a grammar. Every problem found during resolution and
    /// validation is returned at once.
    pub fn define<F>(f: F) -> Result<Self, GrammarError>
    where
        F: FnOnce(&mut GrammarDef),
    {
        let mut def = GrammarDef::new();
        f(&mut def);
        def.finish()
    }

    pub fn production(&self, id: ProductionID) -> &Production {
        &self.productions[&id]
    }

    pub fn productions(&self) -> impl Iterator<Item = (ProductionID, &Production)> + '_ {
        self.productions.iter().map(|(id, p)| (*id, p))
    }

    pub fn productions_of(&self, n: NonterminalID) -> &[ProductionID] {
        self.by_lhs.get(&n).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn terminals(&self) -> impl Iterator<Item = (TerminalID, &TerminalData)> + '_ {
        self.terminals.iter().map(|(id, t)| (*id, t))
    }

    pub fn nonterminals(&self) -> impl Iterator<Item = (NonterminalID, &str)> + '_ {
        self.nonterminals.iter().map(|(id, n)| (*id, n.as_str()))
    }

    pub fn start_symbol(&self) -> NonterminalID {
        self.start
    }

    pub fn terminal_id(&self, name: &str) -> Option<TerminalID> {
        self.terminal_ids.get(name).copied()
    }

    pub fn terminal_name(&self, id: TerminalID) -> &str {
        &self.terminals[&id].name
    }

    pub fn terminal_precedence(&self, id: TerminalID) -> Option<Precedence> {
        self.terminals[&id].precedence
    }

    pub fn nonterminal_name(&self, id: NonterminalID) -> &str {
        &self.nonterminals[&id]
    }

    pub fn symbol_name(&self, id: SymbolID) -> &str {
        match id {
            SymbolID::T(t) => self.terminal_name(t),
            SymbolID::N(n) => self.nonterminal_name(n),
        }
    }

    pub fn is_nullable(&self, id: NonterminalID) -> bool {
        self.nullables.contains(&id)
    }

    /// `FIRST(symbols)`: the terminals that can begin a string derived from
    /// the given sentential prefix.
    pub fn first(&self, symbols: &[SymbolID]) -> TerminalSet {
        let mut set = TerminalSet::default();
        for sym in symbols {
            match sym {
                SymbolID::T(t) => {
                    set.insert(*t);
                    break;
                }
                SymbolID::N(n) => {
                    set.union_with(&self.firsts[n]);
                    if !self.is_nullable(*n) {
                        break;
                    }
                }
            }
        }
        set
    }

    /// Warnings recorded during validation, in detection order.
    pub fn warnings(&self) -> &[GrammarWarning] {
        &self.warnings
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#### grammar")?;
        for (id, p) in &self.productions {
            writeln!(f, "Rule {:<4} {}", id.0, p.display(self))?;
        }

        writeln!(f, "\n#### terminals, with rules where they appear")?;
        for (t, data) in &self.terminals {
            let mut rules: Vec<u16> = Vec::new();
            for (id, p) in &self.productions {
                if p.right.contains(&SymbolID::T(*t)) {
                    rules.push(id.0);
                }
            }
            writeln!(
                f,
                "{:<20} : {}",
                data.name,
                display_fn(|f| {
                    for (i, r) in rules.iter().enumerate() {
                        if i > 0 {
                            f.write_str(" ")?;
                        }
                        write!(f, "{}", r)?;
                    }
                    Ok(())
                })
            )?;
        }

        writeln!(f, "\n#### nonterminals, with rules where they appear")?;
        for (n, name) in &self.nonterminals {
            let mut rules: Vec<u16> = Vec::new();
            for (id, p) in &self.productions {
                if p.right.contains(&SymbolID::N(*n)) {
                    rules.push(id.0);
                }
            }
            writeln!(
                f,
                "{:<20} : {}",
                name,
                display_fn(|f| {
                    for (i, r) in rules.iter().enumerate() {
                        if i > 0 {
                            f.write_str(" ")?;
                        }
                        write!(f, "{}", r)?;
                    }
                    Ok(())
                })
            )?;
        }
        Ok(())
    }
}

struct RuleDecl {
    lhs: String,
    rhs: Vec<String>,
    prec: Option<String>,
}

/// The mutable context handed to the [`Grammar::define`] closure.
pub struct GrammarDef {
    terminals: Map<TerminalID, TerminalData>,
    terminal_ids: Map<String, TerminalID>,
    precedence: Vec<(Assoc, Vec<String>)>,
    rules: Vec<RuleDecl>,
    start: Option<String>,
    problems: Vec<GrammarProblem>,
    next_terminal: u16,
}

impl GrammarDef {
    pub(crate) fn new() -> Self {
        let mut terminals = Map::default();
        terminals.insert(
            TerminalID::EOI,
            TerminalData {
                name: "$end".into(),
                precedence: None,
            },
        );
        terminals.insert(
            TerminalID::ERROR,
            TerminalData {
                name: "error".into(),
                precedence: None,
            },
        );
        let mut terminal_ids = Map::default();
        terminal_ids.insert("error".to_owned(), TerminalID::ERROR);

        Self {
            terminals,
            terminal_ids,
            precedence: Vec::new(),
            rules: Vec::new(),
            start: None,
            problems: Vec::new(),
            next_terminal: TerminalID::OFFSET,
        }
    }

    fn intern_terminal(&mut self, name: String) -> TerminalID {
        if let Some(&id) = self.terminal_ids.get(&name) {
            return id;
        }
        let id = TerminalID(self.next_terminal);
        self.next_terminal += 1;
        self.terminal_ids.insert(name.clone(), id);
        self.terminals.insert(
            id,
            TerminalData {
                name,
                precedence: None,
            },
        );
        id
    }

    /// Declare a token. Names follow the identifier rules; `error` and
    /// `$end` are reserved.
    pub fn terminal(&mut self, name: &str) {
        if name == "error" || name == "$end" || !is_valid_name(name) {
            self.problems.push(GrammarProblem::InvalidSymbolName {
                name: name.to_owned(),
            });
            return;
        }
        self.intern_terminal(name.to_owned());
    }

    /// Declare a single-character literal terminal. Its name is the
    /// character itself.
    pub fn literal(&mut self, c: char) {
        self.intern_terminal(c.to_string());
    }

    /// Append one precedence level, lowest binding first. Fictitious names
    /// (for `%prec`) are allowed and checked for use at finish time.
    pub fn precedence(&mut self, assoc: Assoc, terms: &[&str]) {
        self.precedence
            .push((assoc, terms.iter().map(|s| (*s).to_owned()).collect()));
    }

    /// Add a production `lhs -> rhs`. An empty `rhs` declares an epsilon
    /// production. `error` is permitted on the right-hand side.
    pub fn production(&mut self, lhs: &str, rhs: &[&str]) {
        self.rule_decl(lhs, rhs, None);
    }

    /// Like [`production`](Self::production), with an explicit `%prec`
    /// terminal overriding the default precedence.
    pub fn production_prec(&mut self, lhs: &str, rhs: &[&str], prec: &str) {
        self.rule_decl(lhs, rhs, Some(prec.to_owned()));
    }

    fn rule_decl(&mut self, lhs: &str, rhs: &[&str], prec: Option<String>) {
        self.rules.push(RuleDecl {
            lhs: lhs.to_owned(),
            rhs: rhs.iter().map(|s| (*s).to_owned()).collect(),
            prec,
        });
    }

    /// Set the start symbol. Defaults to the first production's left-hand
    /// side when unset.
    pub fn start(&mut self, name: &str) {
        self.start = Some(name.to_owned());
    }

    pub(crate) fn finish(mut self) -> Result<Grammar, GrammarError> {
        // Precedence table: name -> (level, assoc), levels from 1.
        let mut prec_table = Map::<String, Precedence>::default();
        let mut used_prec = Set::<String>::default();
        for (i, (assoc, terms)) in self.precedence.iter().enumerate() {
            let level = (i + 1) as u16;
            for term in terms {
                let prec = Precedence {
                    level,
                    assoc: *assoc,
                };
                if prec_table.insert(term.clone(), prec).is_some() {
                    self.problems
                        .push(GrammarProblem::DuplicatePrecedence { name: term.clone() });
                }
            }
        }
        for (name, &id) in &self.terminal_ids {
            if let Some(prec) = prec_table.get(name) {
                self.terminals[&id].precedence = Some(*prec);
                used_prec.insert(name.clone());
            }
        }

        // Intern every left-hand side before resolving any right-hand side,
        // so rules may reference nonterminals declared later.
        let mut nonterminals = Map::<NonterminalID, String>::default();
        let mut nonterminal_ids = Map::<String, NonterminalID>::default();
        nonterminals.insert(NonterminalID::START, "S'".to_owned());
        let mut next_nonterminal = NonterminalID::OFFSET;
        for rule in &self.rules {
            if nonterminal_ids.contains_key(&rule.lhs) {
                continue;
            }
            if rule.lhs == "error" || rule.lhs == "$end" {
                self.problems.push(GrammarProblem::ReservedRuleName {
                    name: rule.lhs.clone(),
                });
                continue;
            }
            if self.terminal_ids.contains_key(&rule.lhs) {
                self.problems.push(GrammarProblem::RuleNamedLikeTerminal {
                    name: rule.lhs.clone(),
                });
                continue;
            }
            if !is_valid_name(&rule.lhs) {
                self.problems.push(GrammarProblem::InvalidSymbolName {
                    name: rule.lhs.clone(),
                });
                continue;
            }
            let id = NonterminalID(next_nonterminal);
            next_nonterminal += 1;
            nonterminal_ids.insert(rule.lhs.clone(), id);
            nonterminals.insert(id, rule.lhs.clone());
        }

        if self.rules.is_empty() {
            self.problems.push(GrammarProblem::EmptyGrammar);
        }

        // Resolve right-hand sides and the per-rule precedence.
        let mut productions = Map::<ProductionID, Production>::default();
        let mut by_lhs = Map::<NonterminalID, Vec<ProductionID>>::default();
        let mut seen_rules = Set::<String>::default();
        let mut next_production = ProductionID::OFFSET;

        for rule in &self.rules {
            let Some(&left) = nonterminal_ids.get(&rule.lhs) else {
                // The left-hand side itself was rejected above.
                continue;
            };

            let rendered = format!("{} -> {}", rule.lhs, rule.rhs.join(" "));
            let mut right = Vec::with_capacity(rule.rhs.len());
            let mut rightmost_term_prec = None;
            let mut complete = true;
            for sym in &rule.rhs {
                if sym == "$end" || sym == "S'" {
                    self.problems
                        .push(GrammarProblem::ReservedSymbol { name: sym.clone() });
                    complete = false;
                    continue;
                }
                if let Some(&t) = self.terminal_ids.get(sym) {
                    // The default precedence tracks the rightmost terminal,
                    // whether or not it carries one.
                    rightmost_term_prec = self.terminals[&t].precedence;
                    right.push(SymbolID::T(t));
                } else if let Some(&n) = nonterminal_ids.get(sym) {
                    right.push(SymbolID::N(n));
                } else {
                    self.problems.push(GrammarProblem::UndefinedSymbol {
                        symbol: sym.clone(),
                        rule: rendered.clone(),
                    });
                    complete = false;
                }
            }

            let prec = match &rule.prec {
                Some(name) => match prec_table.get(name) {
                    Some(prec) => {
                        used_prec.insert(name.clone());
                        Some(*prec)
                    }
                    None => {
                        self.problems
                            .push(GrammarProblem::UnknownPrecedence { name: name.clone() });
                        None
                    }
                },
                None => rightmost_term_prec,
            };

            if !complete {
                continue;
            }
            if !seen_rules.insert(rendered.clone()) {
                self.problems
                    .push(GrammarProblem::DuplicateProduction { rule: rendered });
                continue;
            }

            let names = accessor_names(&right, &self.terminals, &nonterminals);
            let id = ProductionID(next_production);
            next_production += 1;
            productions.insert(
                id,
                Production {
                    left,
                    right,
                    prec,
                    names,
                },
            );
            by_lhs.entry(left).or_default().push(id);
        }

        // Precedence declared for a name that is neither a terminal nor
        // referenced through %prec is an error, not a warning.
        for (name, prec) in &prec_table {
            if !used_prec.contains(name) {
                self.problems.push(GrammarProblem::UnusedPrecedence {
                    name: name.clone(),
                    assoc: prec.assoc.to_string(),
                });
            }
        }

        // Start symbol and augmentation.
        let start = match &self.start {
            Some(name) => match nonterminal_ids.get(name) {
                Some(&id) => id,
                None => {
                    self.problems
                        .push(GrammarProblem::UndefinedStart { name: name.clone() });
                    NonterminalID::START
                }
            },
            None => self
                .rules
                .first()
                .and_then(|r| nonterminal_ids.get(&r.lhs).copied())
                .unwrap_or(NonterminalID::START),
        };
        let accept = Production {
            left: NonterminalID::START,
            right: vec![SymbolID::N(start)],
            prec: None,
            names: accessor_names(
                &[SymbolID::N(start)],
                &self.terminals,
                &nonterminals,
            ),
        };
        productions.insert(ProductionID::ACCEPT, accept);
        productions.sort_keys();
        by_lhs
            .entry(NonterminalID::START)
            .or_default()
            .push(ProductionID::ACCEPT);

        let nullables = nullable_set(&productions);
        let firsts = first_sets(&productions, &nonterminals, &nullables);

        let mut grammar = Grammar {
            terminals: self.terminals,
            terminal_ids: self.terminal_ids,
            nonterminals,
            nonterminal_ids,
            productions,
            by_lhs,
            start,
            nullables,
            firsts,
            warnings: Vec::new(),
        };
        grammar.validate(&mut self.problems);

        if !self.problems.is_empty() {
            return Err(GrammarError {
                problems: self.problems,
            });
        }
        for warning in &grammar.warnings {
            tracing::warn!("{}", warning);
        }
        Ok(grammar)
    }
}

impl Grammar {
    fn validate(&mut self, problems: &mut Vec<GrammarProblem>) {
        // Unused terminals: declared but appearing on no right-hand side.
        for (t, data) in &self.terminals {
            if matches!(*t, TerminalID::EOI | TerminalID::ERROR) {
                continue;
            }
            let used = self
                .productions
                .values()
                .any(|p| p.right.contains(&SymbolID::T(*t)));
            if !used {
                self.warnings.push(GrammarWarning::UnusedTerminal {
                    name: data.name.clone(),
                });
            }
        }

        // Unused rules: nonterminals never referenced outside their own
        // productions (the start symbol is referenced by the augmentation).
        for (n, name) in &self.nonterminals {
            if *n == NonterminalID::START {
                continue;
            }
            let used = self
                .productions
                .values()
                .any(|p| p.right.contains(&SymbolID::N(*n)));
            if !used {
                self.warnings.push(GrammarWarning::UnusedRule { name: name.clone() });
            }
        }

        // Reachability from the start symbol.
        let mut reachable = Set::<NonterminalID>::default();
        let mut stack = vec![self.start];
        while let Some(n) = stack.pop() {
            if !reachable.insert(n) {
                continue;
            }
            for id in self.productions_of(n) {
                for sym in &self.productions[id].right {
                    if let SymbolID::N(next) = sym {
                        stack.push(*next);
                    }
                }
            }
        }
        for (n, name) in &self.nonterminals {
            if *n != NonterminalID::START && !reachable.contains(n) {
                self.warnings.push(GrammarWarning::UnreachableNonterminal {
                    name: name.clone(),
                });
            }
        }

        // Infinite recursion: a nonterminal terminates iff some production
        // of it has only terminating symbols on the right-hand side.
        let mut terminates = Set::<NonterminalID>::default();
        loop {
            let mut changed = false;
            for p in self.productions.values() {
                if terminates.contains(&p.left) {
                    continue;
                }
                let ok = p.right.iter().all(|sym| match sym {
                    SymbolID::T(_) => true,
                    SymbolID::N(n) => terminates.contains(n),
                });
                if ok {
                    terminates.insert(p.left);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        for (n, name) in &self.nonterminals {
            if !self.by_lhs.contains_key(n) && *n != NonterminalID::START {
                // Used-but-undefined: already reported as UndefinedSymbol.
                continue;
            }
            if !terminates.contains(n) {
                problems.push(GrammarProblem::InfiniteRecursion {
                    symbol: name.clone(),
                });
            }
        }
    }
}

fn accessor_names(
    right: &[SymbolID],
    terminals: &Map<TerminalID, TerminalData>,
    nonterminals: &Map<NonterminalID, String>,
) -> Map<String, usize> {
    let sym_name = |sym: &SymbolID| -> &str {
        match sym {
            SymbolID::T(t) => &terminals[t].name,
            SymbolID::N(n) => &nonterminals[n],
        }
    };

    let mut counts = Map::<&str, usize>::default();
    for sym in right {
        *counts.entry(sym_name(sym)).or_default() += 1;
    }

    let mut used = Map::<&str, usize>::default();
    let mut names = Map::default();
    for (i, sym) in right.iter().enumerate() {
        let base = sym_name(sym);
        let key = if counts[base] > 1 {
            let n = used.entry(base).or_default();
            let key = format!("{base}{n}");
            *n += 1;
            key
        } else {
            base.to_owned()
        };
        names.insert(key, i);
    }
    names
}

fn nullable_set(productions: &Map<ProductionID, Production>) -> Set<NonterminalID> {
    let mut nullables = Set::default();
    loop {
        let mut changed = false;
        for p in productions.values() {
            if p.right
                .iter()
                .all(|sym| matches!(sym, SymbolID::N(n) if nullables.contains(n)))
            {
                changed |= nullables.insert(p.left);
            }
        }
        if !changed {
            break;
        }
    }
    nullables
}

fn first_sets(
    productions: &Map<ProductionID, Production>,
    nonterminals: &Map<NonterminalID, String>,
    nullables: &Set<NonterminalID>,
) -> Map<NonterminalID, TerminalSet> {
    let mut firsts: Map<NonterminalID, TerminalSet> = nonterminals
        .keys()
        .map(|&n| (n, TerminalSet::default()))
        .collect();

    loop {
        let mut changed = false;
        for p in productions.values() {
            let mut added = TerminalSet::default();
            for sym in &p.right {
                match sym {
                    SymbolID::T(t) => {
                        added.insert(*t);
                        break;
                    }
                    SymbolID::N(n) => {
                        added.union_with(&firsts[n]);
                        if !nullables.contains(n) {
                            break;
                        }
                    }
                }
            }
            let set = &mut firsts[&p.left];
            let before = set.len();
            set.union_with(&added);
            changed |= set.len() != before;
        }
        if !changed {
            break;
        }
    }
    firsts
}

fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first == '_' || unicode_ident::is_xid_start(first)) {
        return false;
    }
    chars.all(unicode_ident::is_xid_continue)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arithmetic() -> Grammar {
        Grammar::define(|g| {
            g.terminal("NUM");
            g.terminal("PLUS");
            g.terminal("TIMES");
            g.literal('(');
            g.literal(')');
            g.production("expr", &["expr", "PLUS", "term"]);
            g.production("expr", &["term"]);
            g.production("term", &["term", "TIMES", "factor"]);
            g.production("term", &["factor"]);
            g.production("factor", &["NUM"]);
            g.production("factor", &["(", "expr", ")"]);
        })
        .unwrap()
    }

    #[test]
    fn resolves_symbols_and_start() {
        let g = arithmetic();
        assert_eq!(g.nonterminal_name(g.start_symbol()), "expr");
        let accept = g.production(ProductionID::ACCEPT);
        assert_eq!(accept.left, NonterminalID::START);
        assert_eq!(accept.right, vec![SymbolID::N(g.start_symbol())]);
        assert!(g.terminal_id("(").is_some());
        assert!(g.warnings().is_empty());
    }

    #[test]
    fn undefined_symbol_is_an_error() {
        let err = Grammar::define(|g| {
            g.terminal("NUM");
            g.production("expr", &["expr", "PLUS", "NUM"]);
            g.production("expr", &["NUM"]);
        })
        .unwrap_err();
        assert!(err.problems.iter().any(|p| matches!(
            p,
            GrammarProblem::UndefinedSymbol { symbol, .. } if symbol == "PLUS"
        )));
    }

    #[test]
    fn self_recursive_rule_is_rejected() {
        let err = Grammar::define(|g| {
            g.terminal("A");
            g.production("s", &["s"]);
        })
        .unwrap_err();
        assert!(err.problems.iter().any(|p| matches!(
            p,
            GrammarProblem::InfiniteRecursion { symbol } if symbol == "s"
        )));
    }

    #[test]
    fn unused_symbols_warn() {
        let g = Grammar::define(|g| {
            g.terminal("A");
            g.terminal("B");
            g.production("s", &["A"]);
            g.production("orphan", &["B"]);
        })
        .unwrap();
        assert!(g
            .warnings()
            .iter()
            .any(|w| matches!(w, GrammarWarning::UnusedRule { name } if name == "orphan")));
        assert!(g
            .warnings()
            .iter()
            .any(|w| matches!(w, GrammarWarning::UnreachableNonterminal { name } if name == "orphan")));
    }

    #[test]
    fn nullable_and_first() {
        let g = Grammar::define(|g| {
            g.terminal("A");
            g.terminal("B");
            g.production("s", &["opt", "A"]);
            g.production("opt", &["B"]);
            g.production("opt", &[]);
        })
        .unwrap();
        let opt = g.nonterminals().find(|(_, n)| *n == "opt").unwrap().0;
        let s = g.start_symbol();
        assert!(g.is_nullable(opt));
        assert!(!g.is_nullable(s));

        let first = g.first(&[SymbolID::N(s)]);
        let a = g.terminal_id("A").unwrap();
        let b = g.terminal_id("B").unwrap();
        assert!(first.contains(a));
        assert!(first.contains(b));
    }

    #[test]
    fn rightmost_terminal_sets_default_precedence() {
        let g = Grammar::define(|g| {
            g.terminal("NUM");
            g.terminal("PLUS");
            g.terminal("TIMES");
            g.precedence(Assoc::Left, &["PLUS"]);
            g.precedence(Assoc::Left, &["TIMES"]);
            g.production("e", &["e", "PLUS", "e"]);
            g.production("e", &["e", "TIMES", "e"]);
            g.production("e", &["NUM"]);
        })
        .unwrap();
        let mut prods = g.productions();
        let _accept = prods.next().unwrap();
        let plus = prods.next().unwrap().1;
        let times = prods.next().unwrap().1;
        let num = prods.next().unwrap().1;
        assert_eq!(plus.prec.unwrap().level, 1);
        assert_eq!(times.prec.unwrap().level, 2);
        assert!(num.prec.is_none());
    }

    #[test]
    fn duplicate_names_get_suffixed_accessors() {
        let g = Grammar::define(|g| {
            g.terminal("COMMA");
            g.terminal("ID");
            g.production("pair", &["ID", "COMMA", "ID"]);
        })
        .unwrap();
        let p = g.productions().nth(1).unwrap().1;
        assert_eq!(p.names.get("ID0"), Some(&0));
        assert_eq!(p.names.get("COMMA"), Some(&1));
        assert_eq!(p.names.get("ID1"), Some(&2));
    }

    #[test]
    fn unused_precedence_is_an_error() {
        let err = Grammar::define(|g| {
            g.terminal("A");
            g.precedence(Assoc::Left, &["GHOST"]);
            g.production("s", &["A"]);
        })
        .unwrap_err();
        assert!(err
            .problems
            .iter()
            .any(|p| matches!(p, GrammarProblem::UnusedPrecedence { name, .. } if name == "GHOST")));
    }
}
