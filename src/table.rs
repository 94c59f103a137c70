//! ACTION/GOTO table construction with yacc-style conflict resolution.

use crate::grammar::{Assoc, Grammar, NonterminalID, ProductionID, TerminalID};
use crate::lalr::Lalr;
use crate::lr0::{LR0Automaton, StateID};
use crate::types::Map;
use crate::util::display_fn;
use std::fmt;

/// The action performed on a `(state, terminal)` pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    Shift(StateID),
    Reduce(ProductionID),
    Accept,
    /// An explicit syntax error inserted by `nonassoc` resolution. Unlike a
    /// missing entry this records that the combination is forbidden.
    Fail,
}

#[derive(Debug)]
pub struct ParseTableRow {
    pub actions: Map<TerminalID, Action>,
    pub gotos: Map<NonterminalID, StateID>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Resolution {
    Shift,
    Reduce,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Shift => "shift",
            Self::Reduce => "reduce",
        })
    }
}

/// A shift/reduce conflict that could not be settled by precedence.
#[derive(Debug, Copy, Clone)]
pub struct SRConflict {
    pub state: StateID,
    pub terminal: TerminalID,
    pub resolved: Resolution,
}

/// A reduce/reduce conflict, settled in favor of the earlier rule.
#[derive(Debug, Copy, Clone)]
pub struct RRConflict {
    pub state: StateID,
    pub terminal: TerminalID,
    pub chosen: ProductionID,
    pub rejected: ProductionID,
}

/// Switches for table construction.
#[derive(Debug, Clone)]
pub struct TableOptions {
    /// Collapse states whose only possible action is a single reduction,
    /// letting that reduction fire without consulting the lookahead.
    pub defaulted_states: bool,
    /// Declared conflict counts; matching totals are not warned about.
    pub expected_sr: Option<usize>,
    pub expected_rr: Option<usize>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            defaulted_states: true,
            expected_sr: None,
            expected_rr: None,
        }
    }
}

#[derive(Debug)]
pub struct ParseTable {
    pub states: Map<StateID, ParseTableRow>,
    /// States whose every action is the same reduction.
    pub defaulted: Map<StateID, ProductionID>,
    pub sr_conflicts: Vec<SRConflict>,
    pub rr_conflicts: Vec<RRConflict>,
}

impl ParseTable {
    pub fn action(&self, state: StateID, terminal: TerminalID) -> Option<Action> {
        self.states[&state].actions.get(&terminal).copied()
    }

    pub fn goto(&self, state: StateID, symbol: NonterminalID) -> Option<StateID> {
        self.states[&state].gotos.get(&symbol).copied()
    }

    /// Render the human-readable automaton dump: per-state items, actions,
    /// suppressed conflict alternatives (marked `!`) and gotos. The output
    /// is fully determined by the grammar declaration.
    pub fn display<'a>(
        &'a self,
        g: &'a Grammar,
        lr0: &'a LR0Automaton,
    ) -> impl fmt::Display + 'a {
        display_fn(move |f| {
            for (id, row) in &self.states {
                writeln!(f, "\nstate {}\n", id.raw())?;

                let state = lr0.state(*id);
                let mut items = state.items(g);
                items.sort_unstable();
                for item in &items {
                    writeln!(
                        f,
                        "    ({}) {}",
                        item.production.index(),
                        item.display(g)
                    )?;
                }
                writeln!(f)?;

                for (t, action) in &row.actions {
                    let name = g.terminal_name(*t);
                    match action {
                        Action::Shift(next) => {
                            writeln!(f, "    {:<15} shift and go to state {}", name, next.raw())?
                        }
                        Action::Reduce(p) => writeln!(
                            f,
                            "    {:<15} reduce using rule {} ({})",
                            name,
                            p.index(),
                            g.production(*p).display(g)
                        )?,
                        Action::Accept => writeln!(f, "    {:<15} accept", name)?,
                        Action::Fail => writeln!(f, "    {:<15} error (nonassociative)", name)?,
                    }
                }

                for c in &self.sr_conflicts {
                    if c.state == *id {
                        writeln!(
                            f,
                            "  ! shift/reduce conflict for {} resolved as {}",
                            g.terminal_name(c.terminal),
                            c.resolved
                        )?;
                    }
                }
                for c in &self.rr_conflicts {
                    if c.state == *id {
                        writeln!(
                            f,
                            "  ! reduce/reduce conflict for {} resolved using rule {} ({})",
                            g.terminal_name(c.terminal),
                            c.chosen.index(),
                            g.production(c.chosen).display(g)
                        )?;
                        writeln!(
                            f,
                            "  ! [suppressed: reduce using rule {} ({})]",
                            c.rejected.index(),
                            g.production(c.rejected).display(g)
                        )?;
                    }
                }

                if !row.gotos.is_empty() {
                    writeln!(f)?;
                    for (n, next) in &row.gotos {
                        writeln!(
                            f,
                            "    {:<30} go to state {}",
                            g.nonterminal_name(*n),
                            next.raw()
                        )?;
                    }
                }
            }
            Ok(())
        })
    }
}

#[derive(Default)]
struct PendingAction {
    shift: Option<StateID>,
    reduces: Vec<ProductionID>,
}

/// Build the ACTION and GOTO tables from the automaton and its lookaheads.
pub fn generate(
    g: &Grammar,
    lr0: &LR0Automaton,
    lalr: &Lalr,
    options: &TableOptions,
) -> ParseTable {
    let mut states = Map::default();
    let mut sr_conflicts = Vec::new();
    let mut rr_conflicts = Vec::new();

    for (&id, lr0_state) in &lr0.states {
        let mut pending = Map::<TerminalID, PendingAction>::default();
        for (&t, &next) in &lr0_state.shifts {
            pending.entry(t).or_default().shift = Some(next);
        }
        for &reduce in &lr0_state.reduces {
            if reduce == ProductionID::ACCEPT {
                // The augmentation reduces only on the end marker.
                pending
                    .entry(TerminalID::EOI)
                    .or_default()
                    .reduces
                    .push(reduce);
                continue;
            }
            for t in lalr.lookahead(id, reduce).iter() {
                pending.entry(t).or_default().reduces.push(reduce);
            }
        }
        pending.sort_keys();

        let mut actions = Map::default();
        for (t, mut action) in pending {
            action.reduces.sort_unstable();
            let resolved = resolve(
                g,
                id,
                t,
                action.shift,
                &action.reduces,
                &mut sr_conflicts,
                &mut rr_conflicts,
            );
            actions.insert(t, resolved);
        }

        let mut gotos = lr0_state.gotos.clone();
        gotos.sort_keys();
        states.insert(id, ParseTableRow { actions, gotos });
    }

    let mut defaulted = Map::default();
    if options.defaulted_states {
        for (&id, row) in &states {
            let mut rule = None;
            let uniform = !row.actions.is_empty()
                && row.actions.values().all(|action| match action {
                    Action::Reduce(p) => *rule.get_or_insert(*p) == *p,
                    _ => false,
                });
            if uniform {
                defaulted.insert(id, rule.unwrap());
            }
        }
    }

    if options.expected_sr != Some(sr_conflicts.len()) && !sr_conflicts.is_empty() {
        tracing::warn!(count = sr_conflicts.len(), "shift/reduce conflicts");
    }
    if options.expected_rr != Some(rr_conflicts.len()) && !rr_conflicts.is_empty() {
        tracing::warn!(count = rr_conflicts.len(), "reduce/reduce conflicts");
    }

    ParseTable {
        states,
        defaulted,
        sr_conflicts,
        rr_conflicts,
    }
}

fn resolve(
    g: &Grammar,
    state: StateID,
    terminal: TerminalID,
    shift: Option<StateID>,
    reduces: &[ProductionID],
    sr_conflicts: &mut Vec<SRConflict>,
    rr_conflicts: &mut Vec<RRConflict>,
) -> Action {
    // Reduce/reduce: the earliest declared rule wins. The augmentation has
    // index 0 and therefore always survives, turning a reduce/accept clash
    // into a recorded conflict against the accept action.
    let reduce = reduces.first().copied();
    if let Some(chosen) = reduce {
        for &rejected in &reduces[1..] {
            rr_conflicts.push(RRConflict {
                state,
                terminal,
                chosen,
                rejected,
            });
        }
    }

    match (shift, reduce) {
        (Some(next), None) => Action::Shift(next),
        (None, Some(ProductionID::ACCEPT)) => Action::Accept,
        (None, Some(p)) => Action::Reduce(p),
        (None, None) => unreachable!("empty pending action"),

        (Some(next), Some(p)) => {
            let shift_prec = g.terminal_precedence(terminal);
            let reduce_prec = g.production(p).prec;
            match (shift_prec, reduce_prec) {
                (Some(sp), Some(rp)) => {
                    if sp.level > rp.level {
                        Action::Shift(next)
                    } else if sp.level < rp.level {
                        Action::Reduce(p)
                    } else {
                        match sp.assoc {
                            Assoc::Left => Action::Reduce(p),
                            Assoc::Right => Action::Shift(next),
                            Assoc::Nonassoc => Action::Fail,
                        }
                    }
                }
                // Undefined precedence on either side: prefer the shift and
                // report the conflict as unresolved.
                _ => {
                    sr_conflicts.push(SRConflict {
                        state,
                        terminal,
                        resolved: Resolution::Shift,
                    });
                    Action::Shift(next)
                }
            }
        }
    }
}
