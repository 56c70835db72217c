// BgpC: BGP Policy Compiler written in Rust
// Copyright (C) 2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # DFA construction
//!
//! Deterministic path recognizers over the location alphabet, built from canonical regexes by
//! Brzozowski derivatives. Derivatives handle intersection and complement natively, so no subset
//! construction or product automaton is needed.
//!
//! Call [`Dfa::build`] with an already *reversed* preference regex: the automaton then walks
//! paths in announcement direction (originator first) and accepts exactly at traffic sources.

use std::collections::HashMap;

use log::trace;

use crate::regex::Regex;
use crate::topology::Topology;
use crate::types::LocationId;

/// Index of a DFA state.
pub type State = usize;

/// A deterministic recognizer over the location alphabet, with a total transition function and an
/// explicit dead sink.
#[derive(Debug, Clone)]
pub struct Dfa {
    alphabet: Vec<LocationId>,
    sym: HashMap<LocationId, usize>,
    start: State,
    /// `trans[state][symbol]` is the successor state; total over the alphabet.
    trans: Vec<Vec<State>>,
    accepting: Vec<bool>,
    /// States from which an accepting state is reachable.
    live: Vec<bool>,
    dead: State,
}

impl Dfa {
    /// Build the DFA for a regex over the full alphabet of the topology.
    ///
    /// The regex must already be reversed (see [`Regex::reverse`]); the caller is responsible for
    /// the direction convention.
    pub fn build(regex: Regex, topo: &Topology) -> Self {
        let alphabet: Vec<LocationId> = topo.locations().collect();
        let sym: HashMap<LocationId, usize> =
            alphabet.iter().enumerate().map(|(i, l)| (*l, i)).collect();

        let mut states: HashMap<Regex, State> = HashMap::new();
        let mut order: Vec<Regex> = Vec::new();
        let mut trans: Vec<Vec<State>> = Vec::new();

        let mut intern = |r: Regex, order: &mut Vec<Regex>| -> (State, bool) {
            match states.get(&r) {
                Some(s) => (*s, false),
                None => {
                    let s = order.len();
                    states.insert(r.clone(), s);
                    order.push(r);
                    (s, true)
                }
            }
        };

        // make sure the dead sink exists even if it is unreachable
        let (start, _) = intern(regex, &mut order);
        let (dead, fresh) = intern(Regex::Empty, &mut order);
        debug_assert!(start == 0 && (!fresh || dead == 1));

        let mut next = 0;
        while next < order.len() {
            let r = order[next].clone();
            let row: Vec<State> = alphabet
                .iter()
                .map(|a| intern(r.derivative(*a), &mut order).0)
                .collect();
            trans.push(row);
            next += 1;
        }

        let accepting: Vec<bool> = order.iter().map(|r| r.nullable()).collect();
        let live = compute_live(&trans, &accepting);
        trace!(
            "built DFA with {} states ({} live) over {} symbols",
            order.len(),
            live.iter().filter(|x| **x).count(),
            alphabet.len()
        );

        Self {
            alphabet,
            sym,
            start,
            trans,
            accepting,
            live,
            dead,
        }
    }

    /// The start state.
    pub fn start(&self) -> State {
        self.start
    }

    /// The dead sink.
    pub fn dead(&self) -> State {
        self.dead
    }

    /// Number of states.
    pub fn len(&self) -> usize {
        self.trans.len()
    }

    /// Returns `true` if the DFA has no states. Never the case for a built DFA.
    pub fn is_empty(&self) -> bool {
        self.trans.is_empty()
    }

    /// Advance a state by one location.
    pub fn step(&self, s: State, a: LocationId) -> State {
        self.trans[s][self.sym[&a]]
    }

    /// Returns `true` if the state finalizes recognition.
    pub fn is_accepting(&self, s: State) -> bool {
        self.accepting[s]
    }

    /// Returns `true` if an accepting state is reachable from `s`.
    pub fn is_live(&self, s: State) -> bool {
        self.live[s]
    }

    /// Returns `true` if the DFA accepts no path at all.
    pub fn language_is_empty(&self) -> bool {
        !self.live[self.start]
    }

    /// The locations from which an accepted path can start: all symbols whose transition out of
    /// the start state leads to a live state.
    pub fn live_starts(&self) -> impl Iterator<Item = LocationId> + '_ {
        self.alphabet
            .iter()
            .copied()
            .filter(move |a| self.live[self.trans[self.start][self.sym[a]]])
    }
}

/// Backward reachability from the accepting states.
fn compute_live(trans: &[Vec<State>], accepting: &[bool]) -> Vec<bool> {
    let n = trans.len();
    let mut rev: Vec<Vec<State>> = vec![Vec::new(); n];
    for (s, row) in trans.iter().enumerate() {
        for t in row {
            rev[*t].push(s);
        }
    }
    let mut live = accepting.to_vec();
    let mut stack: Vec<State> = (0..n).filter(|s| accepting[*s]).collect();
    while let Some(t) = stack.pop() {
        for s in &rev[t] {
            if !live[*s] {
                live[*s] = true;
                stack.push(*s);
            }
        }
    }
    live
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::regex::RegexBuilder;

    fn topo() -> Topology {
        let mut t = Topology::new();
        let a = t.add_inside("A", false);
        let x = t.add_inside("X", false);
        let b = t.add_inside("B", true);
        let e = t.add_outside("E");
        t.add_link(a, x);
        t.add_link(x, b);
        t.add_link(b, e);
        t
    }

    /// Walk a sequence of locations from the start state.
    fn run(dfa: &Dfa, topo: &Topology, word: &[&str]) -> State {
        word.iter()
            .fold(dfa.start(), |s, n| dfa.step(s, topo.lookup(n).unwrap()))
    }

    #[test]
    fn simple_path() {
        let t = topo();
        let reb = RegexBuilder::new(&t);
        // announcement direction: reversed data-plane path A.X.B
        let dfa = Dfa::build(reb.path(&["A", "X", "B"]).reverse(), &t);

        assert!(dfa.is_accepting(run(&dfa, &t, &["B", "X", "A"])));
        assert!(!dfa.is_accepting(run(&dfa, &t, &["B", "X"])));
        assert_eq!(run(&dfa, &t, &["A"]), dfa.dead());
        assert_eq!(run(&dfa, &t, &["B", "B"]), dfa.dead());
    }

    #[test]
    fn intersection_and_negation() {
        let t = topo();
        let reb = RegexBuilder::new(&t);
        // paths through X, but not the direct three-hop path
        let r = Regex::inter([
            reb.waypoint("X"),
            Regex::negate(reb.path(&["A", "X", "B"])),
        ]);
        let dfa = Dfa::build(r.reverse(), &t);
        assert!(!dfa.is_accepting(run(&dfa, &t, &["B", "X", "A"])));
        assert!(dfa.is_accepting(run(&dfa, &t, &["B", "X", "A", "X"])));
    }

    #[test]
    fn empty_language() {
        let t = topo();
        let reb = RegexBuilder::new(&t);
        let r = Regex::inter([reb.path(&["A", "X", "B"]), reb.path(&["X", "B"])]);
        let dfa = Dfa::build(r.reverse(), &t);
        assert!(dfa.language_is_empty());
        assert_eq!(dfa.live_starts().count(), 0);
    }

    #[test]
    fn live_starts_of_internal() {
        let t = topo();
        let reb = RegexBuilder::new(&t);
        let dfa = Dfa::build(reb.internal().reverse(), &t);
        // every inside location can start an announcement walk; the outside peer cannot
        let starts: Vec<&str> = dfa.live_starts().map(|l| t.name(l)).collect();
        assert_eq!(starts, vec!["A", "X", "B"]);
    }
}
