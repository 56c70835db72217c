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

//! # Product-graph minimization
//!
//! Two fixed-point reductions over the raw product graph:
//!
//! 1. *Missing-suffix-paths prune*: drop every real node that cannot reach the `End` pole, or
//!    that is not reachable from the `Start` pole. Such nodes describe walks that never complete
//!    an accepted path.
//! 2. *Dominance minimization*: drop nodes that are never the best choice, because a sibling at
//!    the same location with the same neighborhood realizes every rank at an equal or better
//!    level.
//!
//! Both reductions only remove nodes, so the fixed point on a finite node set terminates. After
//! minimization, `min_rank` is available on every surviving node: the best preference rank
//! realizable by any accepted path through it.

use std::collections::HashMap;

use itertools::Itertools;
use log::debug;

use crate::dfa::Dfa;
use crate::product::{PgLoc, ProductGraph};
use crate::types::Rank;

/// Minimize the product graph in place and fill in the per-node `min_rank`.
pub fn minimize(pg: &mut ProductGraph, dfas: &[Dfa]) {
    let before = pg.num_alive();
    loop {
        let mut changed = prune_disconnected(pg);
        changed |= prune_dominated(pg);
        if !changed {
            break;
        }
    }
    compute_min_ranks(pg);
    debug!(
        "minimized product graph from {} to {} nodes",
        before,
        pg.num_alive()
    );
    log_unused_preferences(pg, dfas);
}

/// Remove all real nodes that do not lie on a walk from `Start` to `End`. Returns `true` if any
/// node was removed.
fn prune_disconnected(pg: &mut ProductGraph) -> bool {
    let n = pg.len();

    let mut fwd = vec![false; n];
    fwd[ProductGraph::START] = true;
    let mut stack = vec![ProductGraph::START];
    while let Some(u) = stack.pop() {
        for v in pg.succ(u).collect::<Vec<_>>() {
            if !fwd[v] {
                fwd[v] = true;
                stack.push(v);
            }
        }
    }

    let mut bwd = vec![false; n];
    bwd[ProductGraph::END] = true;
    let mut stack = vec![ProductGraph::END];
    while let Some(u) = stack.pop() {
        for v in pg.pred(u).collect::<Vec<_>>() {
            if !bwd[v] {
                bwd[v] = true;
                stack.push(v);
            }
        }
    }

    let doomed: Vec<usize> = pg
        .alive_nodes()
        .filter(|id| !(fwd[*id] && bwd[*id]))
        .collect();
    let changed = !doomed.is_empty();
    for id in doomed {
        pg.remove(id);
    }
    changed
}

/// Remove nodes that are dominated by a sibling: same location, same predecessors, same
/// successors, and an equal or better accept rank on the sibling. Returns `true` if any node was
/// removed.
fn prune_dominated(pg: &mut ProductGraph) -> bool {
    type Key = (PgLoc, Vec<usize>, Vec<usize>);
    let mut groups: HashMap<Key, Vec<usize>> = HashMap::new();
    for id in pg.alive_nodes() {
        let preds = pg.pred(id).sorted().collect::<Vec<_>>();
        let succs = pg.succ(id).sorted().collect::<Vec<_>>();
        groups
            .entry((pg.node(id).loc, preds, succs))
            .or_default()
            .push(id);
    }

    let mut changed = false;
    for (_, mut group) in groups {
        if group.len() < 2 {
            continue;
        }
        // the survivor is the node with the best rank, ties broken by discovery order
        group.sort_by_key(|id| (pg.node(*id).rank.unwrap_or(usize::MAX), *id));
        for id in &group[1..] {
            pg.remove(*id);
            changed = true;
        }
    }
    changed
}

/// Fill in `min_rank` for every alive node: a multi-source backward traversal per rank, in
/// ascending rank order, never overwriting an earlier (better) assignment.
fn compute_min_ranks(pg: &mut ProductGraph) {
    let ranks: Vec<Rank> = pg
        .alive_nodes()
        .filter_map(|id| pg.node(id).rank)
        .sorted()
        .dedup()
        .collect();
    let mut assigned: Vec<Option<Rank>> = vec![None; pg.len()];
    for r in ranks {
        let mut stack: Vec<usize> = pg
            .alive_nodes()
            .filter(|id| pg.node(*id).rank == Some(r) && assigned[*id].is_none())
            .collect();
        for id in &stack {
            assigned[*id] = Some(r);
        }
        while let Some(u) = stack.pop() {
            for v in pg.pred(u).collect::<Vec<_>>() {
                if v != ProductGraph::START && assigned[v].is_none() {
                    assigned[v] = Some(r);
                    stack.push(v);
                }
            }
        }
    }
    pg.min_rank = assigned;
}

/// A preference whose DFA contributes no accepting node can never be realized. The counter
/// example for this condition is reserved; we only log it.
fn log_unused_preferences(pg: &ProductGraph, dfas: &[Dfa]) {
    for (i, dfa) in dfas.iter().enumerate() {
        let used = pg
            .alive_nodes()
            .any(|id| dfa.is_accepting(pg.node(id).states[i]));
        if !used {
            debug!("preference {} is never realized on this topology", i + 1);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::regex::RegexBuilder;
    use crate::topology::Topology;

    /// A -- X -- B and A -- Y -- B, with B originating.
    fn diamond() -> Topology {
        let mut t = Topology::new();
        let a = t.add_inside("A", false);
        let x = t.add_inside("X", false);
        let y = t.add_inside("Y", false);
        let b = t.add_inside("B", true);
        t.add_link(a, x);
        t.add_link(a, y);
        t.add_link(x, b);
        t.add_link(y, b);
        t
    }

    #[test]
    fn prunes_walks_without_suffix() {
        let t = diamond();
        let reb = RegexBuilder::new(&t);
        // only the path over X is allowed; the walk entering Y can never accept
        let dfa = Dfa::build(reb.path(&["A", "X", "B"]).reverse(), &t);
        let mut pg = ProductGraph::build(&t, &[dfa.clone()]);
        minimize(&mut pg, &[dfa]);

        let y = t.lookup("Y").unwrap();
        assert_eq!(pg.nodes_at(y).count(), 0);
        assert_eq!(pg.num_alive(), 3);
    }

    #[test]
    fn min_rank_is_best_reachable() {
        let t = diamond();
        let reb = RegexBuilder::new(&t);
        let d1 = Dfa::build(reb.path(&["A", "X", "B"]).reverse(), &t);
        let d2 = Dfa::build(reb.path(&["A", "Y", "B"]).reverse(), &t);
        let mut pg = ProductGraph::build(&t, &[d1.clone(), d2.clone()]);
        minimize(&mut pg, &[d1, d2]);

        let x = t.lookup("X").unwrap();
        let y = t.lookup("Y").unwrap();
        let b = t.lookup("B").unwrap();
        let nx = pg.nodes_at(x).next().unwrap();
        let ny = pg.nodes_at(y).next().unwrap();
        let nb = pg.nodes_at(b).next().unwrap();
        assert_eq!(pg.min_rank(nx), Some(1));
        assert_eq!(pg.min_rank(ny), Some(2));
        // the originator reaches the rank-1 path over X
        assert_eq!(pg.min_rank(nb), Some(1));
    }
}
