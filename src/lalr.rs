//! LALR(1) look-ahead sets via the DeRemer–Pennello relations.
//!
//! DeRemer and Pennello, Efficient Computation of LALR(1) Look-Ahead Sets,
//! ACM TOPLAS 4(4), 1982. The five relations are computed over the goto
//! transitions of the LR(0) automaton and solved with two passes of the
//! digraph algorithm:
//!
//! ```text
//! Read(p,A)   = DR(p,A) ∪ ⋃ { Read(r,C)    | (p,A) READS (r,C) }
//! Follow(p,A) = Read(p,A) ∪ ⋃ { Follow(q,B) | (p,A) INCLUDES (q,B) }
//! LA(q,A->ω)  = ⋃ { Follow(p,A) | (q,A->ω) LOOKBACK (p,A) }
//! ```

use crate::digraph::digraph;
use crate::grammar::{Grammar, NonterminalID, ProductionID, SymbolID, TerminalID, TerminalSet};
use crate::lr0::{LR0Automaton, StateID};
use crate::types::Map;
use std::fmt;

/// A goto transition `(p, A)` of the LR(0) automaton, `A` nonterminal.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Goto {
    pub from: StateID,
    pub symbol: NonterminalID,
}

impl fmt::Debug for Goto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?},{:?})", self.from, self.symbol)
    }
}

/// A reduction of `production` possible in `state`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Reduce {
    pub state: StateID,
    pub production: ProductionID,
}

impl fmt::Debug for Reduce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?},{:?})", self.state, self.production)
    }
}

#[derive(Debug)]
pub struct Lalr {
    /// `LA(q, A->ω)` for every reduce item except the augmentation.
    pub lookaheads: Map<Reduce, TerminalSet>,
}

impl Lalr {
    pub fn lookahead(&self, state: StateID, production: ProductionID) -> &TerminalSet {
        &self.lookaheads[&Reduce { state, production }]
    }
}

/// Compute the LALR(1) look-ahead sets for the reductions of `lr0`.
pub fn lalr(g: &Grammar, lr0: &LR0Automaton) -> Lalr {
    // Enumerate the goto transitions and their direct-read sets:
    //   DR(p,A) = { t | goto(p,A) has a shift on t }
    // The start transition additionally reads $end, standing in for the
    // augmentation's implicit end marker.
    let mut gotos = Map::<Goto, usize>::default();
    let mut direct_reads = Vec::<TerminalSet>::new();
    for (&from, state) in &lr0.states {
        for (&symbol, &to) in &state.gotos {
            let mut dr: TerminalSet = lr0.state(to).shifts.keys().copied().collect();
            if from == StateID::INITIAL && symbol == g.start_symbol() {
                dr.insert(TerminalID::EOI);
            }
            gotos.insert(Goto { from, symbol }, direct_reads.len());
            direct_reads.push(dr);
        }
    }

    // (p,A) READS (r,C)  <=>  r = goto(p,A), r has a goto on C, C =>* ε
    let mut reads: Vec<Vec<usize>> = vec![Vec::new(); gotos.len()];
    for (key, &x) in &gotos {
        let r = lr0.state(key.from).gotos[&key.symbol];
        for &c in lr0.state(r).gotos.keys() {
            if !g.is_nullable(c) {
                continue;
            }
            if let Some(&y) = gotos.get(&Goto { from: r, symbol: c }) {
                reads[x].push(y);
            }
        }
    }

    let mut follows = direct_reads;
    digraph(&mut follows, &reads);

    // INCLUDES and LOOKBACK fall out of one forward walk: for each goto
    // transition (p',B) and production B -> ω, traverse ω from p'. At each
    // nonterminal A with a nullable tail, (q,A) INCLUDES (p',B); if the walk
    // reaches the end of ω in state q, (q, B->ω) LOOKBACK (p',B).
    let mut includes: Vec<Vec<usize>> = vec![Vec::new(); gotos.len()];
    let mut lookbacks = Map::<Reduce, Vec<usize>>::default();
    for (key, &b_idx) in &gotos {
        for &pid in g.productions_of(key.symbol) {
            let production = g.production(pid);
            let mut current = key.from;
            let mut complete = true;
            for (i, sym) in production.right.iter().enumerate() {
                if let SymbolID::N(a) = sym {
                    let tail_nullable = production.right[i + 1..]
                        .iter()
                        .all(|s| matches!(s, SymbolID::N(n) if g.is_nullable(*n)));
                    if tail_nullable {
                        if let Some(&a_idx) = gotos.get(&Goto {
                            from: current,
                            symbol: *a,
                        }) {
                            includes[a_idx].push(b_idx);
                        }
                    }
                }
                match lr0.transition(current, *sym) {
                    Some(next) => current = next,
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if complete {
                lookbacks
                    .entry(Reduce {
                        state: current,
                        production: pid,
                    })
                    .or_default()
                    .push(b_idx);
            }
        }
    }

    digraph(&mut follows, &includes);

    // LA(q, A->ω) = ⋃ Follow(p,A) over the lookback transitions.
    let mut lookaheads = Map::<Reduce, TerminalSet>::default();
    for (&state, lr0_state) in &lr0.states {
        for &production in &lr0_state.reduces {
            if production == ProductionID::ACCEPT {
                continue;
            }
            let reduce = Reduce { state, production };
            let mut set = TerminalSet::default();
            if let Some(backs) = lookbacks.get(&reduce) {
                for &idx in backs {
                    set.union_with(&follows[idx]);
                }
            }
            lookaheads.insert(reduce, set);
        }
    }

    Lalr { lookaheads }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lr0::lr0;

    /// The classic grammar that is LALR(1) but not SLR(1). SLR puts `=`
    /// into FOLLOW(r) everywhere and conflicts after reading `l`; the
    /// state-sensitive LA sets keep `=` out of exactly that state.
    #[test]
    fn lookaheads_are_state_sensitive() {
        let g = Grammar::define(|g| {
            g.terminal("EQ");
            g.terminal("STAR");
            g.terminal("ID");
            g.production("s", &["l", "EQ", "r"]);
            g.production("s", &["r"]);
            g.production("l", &["STAR", "r"]);
            g.production("l", &["ID"]);
            g.production("r", &["l"]);
        })
        .unwrap();
        let automaton = lr0(&g);
        let lalr = lalr(&g, &automaton);

        let l = g.nonterminals().find(|(_, n)| *n == "l").unwrap().0;
        let eq = g.terminal_id("EQ").unwrap();
        let star = g.terminal_id("STAR").unwrap();
        let r_to_l = g
            .productions()
            .find(|(_, p)| {
                g.nonterminal_name(p.left) == "r" && p.right == vec![SymbolID::N(l)]
            })
            .unwrap()
            .0;

        // After `l` from the initial state: shift `=` wins, the reduction
        // only fires at end of input.
        let after_l = automaton
            .transition(StateID::INITIAL, SymbolID::N(l))
            .unwrap();
        let la = lalr.lookahead(after_l, r_to_l);
        assert!(!la.contains(eq), "LA must not contain `=` after a bare l");
        assert!(la.contains(TerminalID::EOI));

        // Inside `l -> STAR r`, the same reduction may be followed by `=`.
        let after_star = automaton
            .transition(StateID::INITIAL, SymbolID::T(star))
            .unwrap();
        let after_star_l = automaton
            .transition(after_star, SymbolID::N(l))
            .unwrap();
        let la = lalr.lookahead(after_star_l, r_to_l);
        assert!(la.contains(eq));
        assert!(la.contains(TerminalID::EOI));
    }

    /// Nullable tails route FOLLOW information through INCLUDES.
    #[test]
    fn nullable_tail_includes() {
        let g = Grammar::define(|g| {
            g.terminal("A");
            g.terminal("B");
            g.production("s", &["x", "opt", "B"]);
            g.production("x", &["A"]);
            g.production("opt", &[]);
            g.production("opt", &["A"]);
        })
        .unwrap();
        let automaton = lr0(&g);
        let lalr = lalr(&g, &automaton);

        // After `A` the parser can reduce x -> A; the lookahead must
        // contain both A (opt present) and B (opt empty).
        let a = g.terminal_id("A").unwrap();
        let b = g.terminal_id("B").unwrap();
        let x_to_a = g
            .productions()
            .find(|(_, p)| g.nonterminal_name(p.left) == "x")
            .unwrap()
            .0;
        let after_a = automaton
            .transition(StateID::INITIAL, SymbolID::T(a))
            .unwrap();
        let la = lalr.lookahead(after_a, x_to_a);
        assert!(la.contains(a));
        assert!(la.contains(b));
    }
}
