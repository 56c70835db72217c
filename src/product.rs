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

//! # Product graph
//!
//! The cross-product of the topology with the DFA tuple, representing every feasible
//! (path, preference) pair. Nodes live in an arena and are addressed by integer indices; the two
//! synthetic poles [`ProductGraph::START`] and [`ProductGraph::END`] occupy the first two slots.
//!
//! Edges point in announcement direction: an edge `u -> v` means the router of `v` receives the
//! announcement from the router of `u`. Data-plane traffic flows the opposite way, from
//! `End`-adjacent nodes (traffic sources) back towards `Start`-adjacent nodes (originators).

use std::collections::{HashMap, VecDeque};

use itertools::Itertools;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::dfa::{Dfa, State};
use crate::regex::Regex;
use crate::topology::Topology;
use crate::types::{LocationId, PgNodeDesc, Rank};

/// The place a product-graph node lives at: a real topology location or one of the two poles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PgLoc {
    /// Synthetic source pole, connected to every originator node.
    Start,
    /// Synthetic sink pole, reached from every accepting node.
    End,
    /// A real topology location.
    Loc(LocationId),
}

impl PgLoc {
    /// The topology location, if this is not a pole.
    pub fn loc(&self) -> Option<LocationId> {
        match self {
            PgLoc::Loc(l) => Some(*l),
            _ => None,
        }
    }
}

/// A node of the product graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgNode {
    /// Where the node lives.
    pub loc: PgLoc,
    /// One DFA state per preference regex. Empty for the poles.
    pub states: Vec<State>,
    /// The smallest preference index (1-based) accepted in `states`, or `None`.
    pub rank: Option<Rank>,
}

/// The product graph arena. Construct with [`ProductGraph::build`]; nodes are only ever marked
/// dead by the minimizer, never reused, so indices stay stable for the whole compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductGraph {
    nodes: Vec<PgNode>,
    succ: Vec<Vec<usize>>,
    pred: Vec<Vec<usize>>,
    alive: Vec<bool>,
    /// Best rank realizable through each node; filled in by the minimizer.
    pub(crate) min_rank: Vec<Option<Rank>>,
}

impl ProductGraph {
    /// Arena index of the start pole.
    pub const START: usize = 0;
    /// Arena index of the end pole.
    pub const END: usize = 1;

    /// Build the product graph by forward BFS from the start pole.
    ///
    /// The start pole connects to `(L, delta(q0, L))` for every location `L` that can originate
    /// traffic. A transition into a dead DFA state merely records that the respective preference
    /// can no longer be realized; the node is only skipped if this holds for every preference at
    /// once.
    pub fn build(topo: &Topology, dfas: &[Dfa]) -> Self {
        let mut pg = Self {
            nodes: vec![
                PgNode {
                    loc: PgLoc::Start,
                    states: Vec::new(),
                    rank: None,
                },
                PgNode {
                    loc: PgLoc::End,
                    states: Vec::new(),
                    rank: None,
                },
            ],
            succ: vec![Vec::new(), Vec::new()],
            pred: vec![Vec::new(), Vec::new()],
            alive: vec![true, true],
            min_rank: vec![None, None],
        };

        let mut index: HashMap<(LocationId, Vec<State>), usize> = HashMap::new();
        let mut queue: VecDeque<usize> = VecDeque::new();

        let mut intern = |pg: &mut Self,
                          queue: &mut VecDeque<usize>,
                          index: &mut HashMap<(LocationId, Vec<State>), usize>,
                          loc: LocationId,
                          states: Vec<State>|
         -> Option<usize> {
            if dfas.iter().zip(&states).all(|(d, s)| !d.is_live(*s)) {
                return None;
            }
            Some(*index.entry((loc, states.clone())).or_insert_with(|| {
                let rank = dfas
                    .iter()
                    .zip(&states)
                    .position(|(d, s)| d.is_accepting(*s))
                    .map(|i| i + 1);
                let id = pg.nodes.len();
                pg.nodes.push(PgNode {
                    loc: PgLoc::Loc(loc),
                    states,
                    rank,
                });
                pg.succ.push(Vec::new());
                pg.pred.push(Vec::new());
                pg.alive.push(true);
                pg.min_rank.push(None);
                queue.push_back(id);
                id
            }))
        };

        for l in topo.originators() {
            let states: Vec<State> = dfas.iter().map(|d| d.step(d.start(), l)).collect();
            if let Some(v) = intern(&mut pg, &mut queue, &mut index, l, states) {
                pg.add_edge(Self::START, v);
            }
        }

        while let Some(u) = queue.pop_front() {
            let l = self_loc(&pg.nodes[u]);
            if pg.nodes[u].rank.is_some() {
                pg.add_edge(u, Self::END);
            }
            let states = pg.nodes[u].states.clone();
            for m in topo.neighbors(l).collect::<Vec<_>>() {
                let next: Vec<State> = dfas
                    .iter()
                    .zip(&states)
                    .map(|(d, s)| d.step(*s, m))
                    .collect();
                if let Some(v) = intern(&mut pg, &mut queue, &mut index, m, next) {
                    pg.add_edge(u, v);
                }
            }
        }

        debug!(
            "built product graph with {} nodes over {} preferences",
            pg.nodes.len() - 2,
            dfas.len()
        );
        pg
    }

    fn add_edge(&mut self, u: usize, v: usize) {
        if !self.succ[u].contains(&v) {
            self.succ[u].push(v);
            self.pred[v].push(u);
        }
    }

    /// Total number of arena slots, including the poles and removed nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph holds nothing but the poles.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 2
    }

    /// Number of alive real nodes.
    pub fn num_alive(&self) -> usize {
        self.alive.iter().skip(2).filter(|a| **a).count()
    }

    /// Access a node by index.
    pub fn node(&self, id: usize) -> &PgNode {
        &self.nodes[id]
    }

    /// Returns `true` if the node was not removed by the minimizer.
    pub fn is_alive(&self, id: usize) -> bool {
        self.alive[id]
    }

    /// Mark a node as removed.
    pub(crate) fn remove(&mut self, id: usize) {
        trace!("remove product-graph node {id}");
        self.alive[id] = false;
    }

    /// Iterate over all alive real nodes.
    pub fn alive_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        (2..self.nodes.len()).filter(move |id| self.alive[*id])
    }

    /// Iterate over the alive successors of a node (announcement direction: its receivers).
    pub fn succ(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        self.succ[id].iter().copied().filter(move |v| self.alive[*v])
    }

    /// Iterate over the alive predecessors of a node (the nodes it receives from).
    pub fn pred(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        self.pred[id].iter().copied().filter(move |v| self.alive[*v])
    }

    /// All alive nodes at the given topology location.
    pub fn nodes_at(&self, loc: LocationId) -> impl Iterator<Item = usize> + '_ {
        self.alive_nodes()
            .filter(move |id| self.nodes[*id].loc == PgLoc::Loc(loc))
    }

    /// The best rank realizable through a node. Only available after minimization.
    pub fn min_rank(&self, id: usize) -> Option<Rank> {
        self.min_rank[id]
    }

    /// Count the alive edges between any node at `from` and any node at `to`.
    pub fn location_edge_count(&self, from: LocationId, to: LocationId) -> usize {
        self.nodes_at(from)
            .map(|u| {
                self.succ(u)
                    .filter(|v| self.nodes[*v].loc == PgLoc::Loc(to))
                    .count()
            })
            .sum()
    }

    /// Reconstruct, by state elimination, the regex of all walks from the start pole to the
    /// given node, written in walk order (the originator location first). Every edge into a node
    /// consumes that node's location.
    pub fn path_regex(&self, target: usize) -> Regex {
        // ancestors of the target (alive, reachable backwards), including the start pole
        let mut relevant: Vec<usize> = Vec::new();
        let mut seen = vec![false; self.nodes.len()];
        seen[target] = true;
        let mut stack = vec![target];
        while let Some(u) = stack.pop() {
            relevant.push(u);
            for v in self.pred(u) {
                if !seen[v] {
                    seen[v] = true;
                    stack.push(v);
                }
            }
        }

        let mut labels: HashMap<(usize, usize), Regex> = HashMap::new();
        for u in relevant.iter().copied() {
            for v in self.succ(u) {
                if seen[v] && v != Self::START && v != Self::END {
                    let loc = self.nodes[v]
                        .loc
                        .loc()
                        .map(Regex::loc)
                        .unwrap_or(Regex::Empty);
                    let e = labels.entry((u, v)).or_insert(Regex::Empty);
                    *e = Regex::union([e.clone(), loc]);
                }
            }
        }

        for s in relevant
            .iter()
            .copied()
            .filter(|s| *s != Self::START && *s != target)
        {
            let self_loop = labels
                .remove(&(s, s))
                .map(Regex::star)
                .unwrap_or(Regex::Epsilon);
            let ins: Vec<(usize, Regex)> = labels
                .iter()
                .filter(|((_, t), _)| *t == s)
                .map(|((f, _), r)| (*f, r.clone()))
                .collect();
            let outs: Vec<(usize, Regex)> = labels
                .iter()
                .filter(|((f, _), _)| *f == s)
                .map(|((_, t), r)| (*t, r.clone()))
                .collect();
            labels.retain(|(f, t), _| *f != s && *t != s);
            for (f, rin) in &ins {
                for (t, rout) in &outs {
                    let through = Regex::concat([rin.clone(), self_loop.clone(), rout.clone()]);
                    let e = labels.entry((*f, *t)).or_insert(Regex::Empty);
                    *e = Regex::union([e.clone(), through]);
                }
            }
        }

        let direct = labels
            .remove(&(Self::START, target))
            .unwrap_or(Regex::Empty);
        match labels.remove(&(target, target)) {
            Some(l) => Regex::concat([direct, Regex::star(l)]),
            None => direct,
        }
    }

    /// Printable description of a node, for counter-examples and logs.
    pub fn desc(&self, id: usize, topo: &Topology) -> PgNodeDesc {
        let n = &self.nodes[id];
        let router = match n.loc {
            PgLoc::Start => "start".to_string(),
            PgLoc::End => "end".to_string(),
            PgLoc::Loc(l) => topo.name(l).to_string(),
        };
        PgNodeDesc {
            router,
            states: format!("[{}]", n.states.iter().map(|s| format!("q{s}")).join(", ")),
            rank: n.rank,
        }
    }

    /// Render the graph in Graphviz dot format, for debugging.
    pub fn to_dot(&self, topo: &Topology) -> String {
        let mut out = String::from("digraph pg {\n");
        for id in std::iter::once(Self::START)
            .chain(std::iter::once(Self::END))
            .chain(self.alive_nodes())
        {
            let label = self.desc(id, topo);
            out.push_str(&format!("  n{id} [label=\"{label}\"];\n"));
            for v in self.succ(id) {
                out.push_str(&format!("  n{id} -> n{v};\n"));
            }
        }
        out.push_str("}\n");
        out
    }
}

/// The topology location of a real node.
///
/// # Panics
/// Panics when called on a pole; the BFS queue only ever holds real nodes.
fn self_loc(n: &PgNode) -> LocationId {
    match n.loc {
        PgLoc::Loc(l) => l,
        _ => unreachable!("pole in BFS queue"),
    }
}
