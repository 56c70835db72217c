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

//! # Consistency and ordering
//!
//! Decides, for every inside router, a total order over its product-graph nodes such that
//! announcing the best available node realizes the intended preference ranking for every
//! receiver and under every failure the policy admits.
//!
//! The check is local and conservative. A router exports only its single best route, so when two
//! of its nodes are needed in opposite orders by two different receivers, no configuration of
//! this router can serve both: this is reported as [`CompileError::InconsistentPrefs`] with the
//! node pair as counter-example. Some realizable specifications are rejected this way; that
//! trade-off buys a compile time polynomial in the product-graph size.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use itertools::Itertools;
use log::{debug, trace};

use crate::dfa::Dfa;
use crate::product::{PgLoc, ProductGraph};
use crate::topology::Topology;
use crate::types::{CompileError, LocationId, Rank};

/// The per-router orderings over product-graph nodes, best node first.
pub type Orderings = HashMap<LocationId, Vec<usize>>;

/// Check well-formedness and compute the per-router ordering.
pub fn solve(
    pg: &ProductGraph,
    topo: &Topology,
    dfas: &[Dfa],
) -> Result<Orderings, CompileError> {
    check_well_formed(pg, topo, dfas)?;

    let mut orderings = Orderings::new();
    for loc in topo.inside() {
        let nodes: Vec<usize> = pg.nodes_at(loc).collect();
        if nodes.is_empty() {
            continue;
        }
        let order = order_router(pg, topo, loc, nodes)?;
        trace!(
            "ordering at {}: [{}]",
            topo.name(loc),
            order.iter().map(|v| pg.desc(*v, topo)).join(" > ")
        );
        orderings.insert(loc, order);
    }
    Ok(orderings)
}

/// Every location that can originate traffic and can start an accepted path in some DFA must
/// retain a node in the minimized product graph. Otherwise the policy is unrealizable for that
/// router on this topology.
fn check_well_formed(
    pg: &ProductGraph,
    topo: &Topology,
    dfas: &[Dfa],
) -> Result<(), CompileError> {
    let starting: BTreeSet<LocationId> =
        dfas.iter().flat_map(|d| d.live_starts()).collect();
    let offending: BTreeSet<String> = topo
        .originators()
        .filter(|l| starting.contains(l) && pg.nodes_at(*l).next().is_none())
        .map(|l| topo.name(l).to_string())
        .collect();
    if offending.is_empty() {
        Ok(())
    } else {
        Err(CompileError::NoPathForRouters(offending))
    }
}

/// The preference a receiver can realize from a node's export: per receiver location, the best
/// rank reachable through the unique successor node there. The `End` pole stands for traffic
/// sourced at the router itself and contributes the node's own accept rank.
fn receiver_values(pg: &ProductGraph, v: usize) -> BTreeMap<PgLoc, Rank> {
    let mut vals = BTreeMap::new();
    if let Some(r) = pg.node(v).rank {
        vals.insert(PgLoc::End, r);
    }
    for s in pg.succ(v) {
        if s == ProductGraph::END {
            continue;
        }
        if let Some(r) = pg.min_rank(s) {
            let e = vals.entry(pg.node(s).loc).or_insert(r);
            *e = (*e).min(r);
        }
    }
    vals
}

/// Order the nodes of one router. For every pair, derive the receiver-forced relation; reject
/// with a counter-example when two receivers force the pair in opposite directions, or when the
/// forced relation is cyclic.
fn order_router(
    pg: &ProductGraph,
    topo: &Topology,
    loc: LocationId,
    mut nodes: Vec<usize>,
) -> Result<Vec<usize>, CompileError> {
    // initial sort: accept rank first, then best reachable rank, then discovery order
    nodes.sort_by_key(|v| {
        (
            pg.node(*v).rank.unwrap_or(usize::MAX),
            pg.min_rank(*v).unwrap_or(usize::MAX),
            *v,
        )
    });
    if nodes.len() == 1 {
        return Ok(nodes);
    }

    let vals: HashMap<usize, BTreeMap<PgLoc, Rank>> = nodes
        .iter()
        .map(|v| (*v, receiver_values(pg, *v)))
        .collect();

    // forced[i] holds the indices that node i must precede
    let n = nodes.len();
    let mut forced: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for (i, j) in (0..n).tuple_combinations() {
        let (a, b) = (nodes[i], nodes[j]);
        let mut a_first = false;
        let mut b_first = false;
        let receivers: BTreeSet<PgLoc> =
            vals[&a].keys().chain(vals[&b].keys()).copied().collect();
        for m in receivers {
            let va = vals[&a].get(&m).copied().unwrap_or(usize::MAX);
            let vb = vals[&b].get(&m).copied().unwrap_or(usize::MAX);
            match va.cmp(&vb) {
                std::cmp::Ordering::Less => a_first = true,
                std::cmp::Ordering::Greater => b_first = true,
                std::cmp::Ordering::Equal => {}
            }
        }
        if a_first && b_first {
            debug!(
                "conflicting receivers at {}: {} vs {}",
                topo.name(loc),
                pg.desc(a, topo),
                pg.desc(b, topo)
            );
            return Err(CompileError::InconsistentPrefs(
                pg.desc(a, topo),
                pg.desc(b, topo),
            ));
        }
        if a_first {
            forced[i].insert(j);
        }
        if b_first {
            forced[j].insert(i);
        }
    }

    // topological sort of the forced relation; the initial sort breaks remaining ties
    let mut indeg = vec![0usize; n];
    for succs in &forced {
        for j in succs {
            indeg[*j] += 1;
        }
    }
    let mut placed = vec![false; n];
    let mut order = Vec::with_capacity(n);
    for _ in 0..n {
        match (0..n).find(|i| !placed[*i] && indeg[*i] == 0) {
            Some(i) => {
                placed[i] = true;
                order.push(nodes[i]);
                for j in forced[i].clone() {
                    indeg[j] -= 1;
                }
            }
            None => {
                // a cycle in the forced relation: report the first unplaced pair on it
                let mut on_cycle = (0..n).filter(|i| !placed[*i]);
                let i = on_cycle.next().unwrap();
                let j = forced[i]
                    .iter()
                    .copied()
                    .find(|j| !placed[*j])
                    .unwrap_or_else(|| on_cycle.next().unwrap());
                return Err(CompileError::InconsistentPrefs(
                    pg.desc(nodes[i], topo),
                    pg.desc(nodes[j], topo),
                ));
            }
        }
    }
    Ok(order)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::minimize::minimize;
    use crate::regex::RegexBuilder;

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

    fn pipeline(t: &Topology, prefs: Vec<crate::regex::Regex>) -> (ProductGraph, Vec<Dfa>) {
        let dfas: Vec<Dfa> = prefs
            .into_iter()
            .map(|r| Dfa::build(r.reverse(), t))
            .collect();
        let mut pg = ProductGraph::build(t, &dfas);
        minimize(&mut pg, &dfas);
        (pg, dfas)
    }

    #[test]
    fn backup_paths_are_consistent() {
        let t = diamond();
        let reb = RegexBuilder::new(&t);
        let (pg, dfas) = pipeline(
            &t,
            vec![reb.path(&["A", "X", "B"]), reb.path(&["A", "Y", "B"])],
        );
        let orderings = solve(&pg, &t, &dfas).unwrap();

        // A prefers the announcement relayed over X
        let a = t.lookup("A").unwrap();
        let order = &orderings[&a];
        assert_eq!(order.len(), 2);
        assert_eq!(pg.node(order[0]).rank, Some(1));
        assert_eq!(pg.node(order[1]).rank, Some(2));
    }

    #[test]
    fn missing_origin_path() {
        let mut t = Topology::new();
        let a = t.add_inside("A", false);
        let x = t.add_inside("X", false);
        let b = t.add_inside("B", true);
        t.add_link(a, x);
        t.add_link(x, b);
        let reb = RegexBuilder::new(&t);
        // the policy only allows the direct path A--B, which does not exist
        let (pg, dfas) = pipeline(&t, vec![reb.path(&["A", "B"])]);
        let err = solve(&pg, &t, &dfas).unwrap_err();
        assert_eq!(
            err,
            CompileError::NoPathForRouters(BTreeSet::from(["B".to_string()]))
        );
    }
}
