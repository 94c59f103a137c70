//! The canonical collection of LR(0) item sets.

use crate::grammar::{Grammar, NonterminalID, ProductionID, SymbolID, TerminalID};
use crate::types::{Map, Queue, Set};
use crate::util::display_fn;
use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateID(u16);

impl StateID {
    pub const INITIAL: Self = Self(0);

    pub(crate) fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S#{:03}", self.0)
    }
}

/// An LR(0) item: a production with a dot position in `0..=|rhs|`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LR0Item {
    pub production: ProductionID,
    pub index: u16,
}

impl LR0Item {
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            let production = g.production(self.production);
            write!(f, "{} ->", g.nonterminal_name(production.left))?;
            for (i, sym) in production.right.iter().enumerate() {
                if i == self.index as usize {
                    f.write_str(" .")?;
                }
                write!(f, " {}", g.symbol_name(*sym))?;
            }
            if production.right.len() == self.index as usize {
                f.write_str(" .")?;
            }
            Ok(())
        })
    }
}

#[derive(Debug, Clone)]
pub struct LR0State {
    /// Kernel items: the start item plus items with the dot past position 0.
    pub kernels: Vec<LR0Item>,
    pub shifts: Map<TerminalID, StateID>,
    pub gotos: Map<NonterminalID, StateID>,
    pub reduces: Set<ProductionID>,
}

impl LR0State {
    /// All items of the state: kernels plus the closure derived from them.
    pub fn items(&self, g: &Grammar) -> Vec<LR0Item> {
        let mut queue: Queue<LR0Item> = self.kernels.iter().copied().collect();
        let mut items = Vec::new();
        while let Some(item) = queue.pop() {
            let production = g.production(item.production);
            if let Some(SymbolID::N(n)) = production.right.get::<usize>(item.index.into()) {
                for &p in g.productions_of(*n) {
                    queue.push(LR0Item {
                        production: p,
                        index: 0,
                    });
                }
            }
            items.push(item);
        }
        items
    }
}

#[derive(Debug)]
pub struct LR0Automaton {
    pub states: Map<StateID, LR0State>,
}

impl LR0Automaton {
    pub fn state(&self, id: StateID) -> &LR0State {
        &self.states[&id]
    }

    /// The target of the edge labelled `sym` out of `id`, if any.
    pub fn transition(&self, id: StateID, sym: SymbolID) -> Option<StateID> {
        let state = self.state(id);
        match sym {
            SymbolID::T(t) => state.shifts.get(&t).copied(),
            SymbolID::N(n) => state.gotos.get(&n).copied(),
        }
    }
}

/// Build the canonical LR(0) collection for the augmented grammar.
///
/// States are memoized on their sorted kernel item sets; successor symbols
/// are expanded in sorted order so that state numbering only depends on the
/// grammar declaration.
pub fn lr0(g: &Grammar) -> LR0Automaton {
    let nonkernels = nonkernels(g);

    let mut states = Map::<StateID, LR0State>::default();
    let mut next_state = 0u16;
    let mut state_id = move || {
        let id = StateID(next_state);
        next_state += 1;
        id
    };

    let start_item = LR0Item {
        production: ProductionID::ACCEPT,
        index: 0,
    };
    let mut pending = Queue::<(StateID, Vec<LR0Item>)>::default();
    pending.push((state_id(), vec![start_item]));

    let mut isocores = Map::<Vec<LR0Item>, StateID>::default();
    isocores.insert(vec![start_item], StateID::INITIAL);

    let mut items = Set::<LR0Item>::default();
    while let Some((current, kernels)) = pending.pop() {
        // Expand the closure of the kernel items.
        items.clear();
        items.extend(kernels.iter().copied());
        for kernel in &kernels {
            let production = g.production(kernel.production);
            if let Some(SymbolID::N(n)) = production.right.get::<usize>(kernel.index.into()) {
                items.extend(&nonkernels[n]);
            }
        }

        // Partition items into reductions and successor kernels.
        let mut reduces = Set::default();
        let mut successors = Map::<SymbolID, Set<LR0Item>>::default();
        for item in items.drain(..) {
            let production = g.production(item.production);
            match production.right.get::<usize>(item.index.into()) {
                Some(sym) => {
                    successors.entry(*sym).or_default().insert(LR0Item {
                        index: item.index + 1,
                        ..item
                    });
                }
                None => {
                    reduces.insert(item.production);
                }
            }
        }

        successors.sort_unstable_by(|a, _, b, _| symbol_order(g, *a).cmp(&symbol_order(g, *b)));

        let mut shifts = Map::default();
        let mut gotos = Map::default();
        for (sym, kernel) in successors.drain(..) {
            let mut kernel: Vec<_> = kernel.into_iter().collect();
            kernel.sort_unstable();
            let next = match isocores.get(&kernel) {
                Some(&id) => id,
                None => {
                    let id = state_id();
                    isocores.insert(kernel.clone(), id);
                    pending.push((id, kernel));
                    id
                }
            };
            match sym {
                SymbolID::T(t) => {
                    shifts.insert(t, next);
                }
                SymbolID::N(n) => {
                    gotos.insert(n, next);
                }
            }
        }

        states.insert(
            current,
            LR0State {
                kernels,
                shifts,
                gotos,
                reduces,
            },
        );
    }

    LR0Automaton { states }
}

fn symbol_order(g: &Grammar, sym: SymbolID) -> (u8, String) {
    match sym {
        SymbolID::T(t) => (0, g.terminal_name(t).to_owned()),
        SymbolID::N(n) => (1, g.nonterminal_name(n).to_owned()),
    }
}

/// For every nonterminal, the dot-at-front items its closure contributes.
fn nonkernels(g: &Grammar) -> Map<NonterminalID, Set<LR0Item>> {
    let mut nonkernels = Map::<NonterminalID, Set<LR0Item>>::default();
    for (n, _) in g.nonterminals() {
        let mut items = Set::<LR0Item>::default();
        let mut queue = Queue::default();
        queue.push(n);
        while let Some(next) = queue.pop() {
            for &p in g.productions_of(next) {
                items.insert(LR0Item {
                    production: p,
                    index: 0,
                });
                if let Some(SymbolID::N(head)) = g.production(p).right.first() {
                    queue.push(*head);
                }
            }
        }
        nonkernels.insert(n, items);
    }
    nonkernels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balanced() -> Grammar {
        Grammar::define(|g| {
            g.literal('(');
            g.literal(')');
            g.production("s", &["(", "s", ")"]);
            g.production("s", &[]);
        })
        .unwrap()
    }

    #[test]
    fn initial_state_holds_the_start_item() {
        let g = balanced();
        let lr0 = lr0(&g);
        let initial = lr0.state(StateID::INITIAL);
        assert_eq!(
            initial.kernels,
            vec![LR0Item {
                production: ProductionID::ACCEPT,
                index: 0
            }]
        );
        // `s` is nullable, so the initial state can already reduce.
        assert!(!initial.reduces.is_empty());
    }

    #[test]
    fn kernel_identity_merges_states() {
        let g = balanced();
        let automaton = lr0(&g);
        // `( ( s` and `( s` lead to the same kernels for the inner parens.
        let mut kernel_sets = Set::default();
        for state in automaton.states.values() {
            let mut kernels = state.kernels.clone();
            kernels.sort_unstable();
            assert!(kernel_sets.insert(kernels), "duplicate kernel set");
        }
    }

    #[test]
    fn rebuild_is_deterministic() {
        let g = balanced();
        let a = lr0(&g);
        let b = lr0(&g);
        assert_eq!(a.states.len(), b.states.len());
        for (id, state) in &a.states {
            let other = &b.states[id];
            assert_eq!(state.kernels, other.kernels);
            assert_eq!(state.shifts, other.shifts);
            assert_eq!(state.gotos, other.gotos);
        }
    }
}
