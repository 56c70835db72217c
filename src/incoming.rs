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

//! # Incoming-traffic configuration
//!
//! BGP can only influence where a neighboring network sends its traffic through what we export
//! to it. This module classifies, per outside peer, the constraint the policy places on traffic
//! entering from that peer, and decides the export tagging (MED, AS-path prepending, `no-export`)
//! that realizes it. Constraints that exports cannot express are compile errors.

use std::collections::{BTreeSet, HashMap};

use itertools::Itertools;
use log::debug;

use crate::codegen::Action;
use crate::product::ProductGraph;
use crate::regex::Regex;
use crate::topology::Topology;
use crate::types::{CompileError, LocationId, Rank, Settings};

/// The constraint the policy places on traffic entering from one outside peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entering {
    /// Every inside path is welcome; no tagging needed.
    Anything,
    /// The peer must send nothing.
    Nothing(String),
    /// Only paths matching a non-trivial regex are welcome; exports alone cannot enforce this.
    Specific(Regex),
}

/// The export tagging decided by the incoming-traffic configurator, consumed by the
/// configuration generator.
#[derive(Debug, Clone, Default)]
pub struct IncomingPlan {
    /// Extra actions for the export of a product-graph node towards an outside peer.
    pub peer_actions: HashMap<(usize, LocationId), Vec<Action>>,
    /// Attach `no-export` to every export crossing the network boundary.
    pub no_export_all: bool,
    /// The classification per outside peer, for reporting.
    pub entering: HashMap<LocationId, Entering>,
}

/// Classify every outside peer and decide the export tagging.
pub fn plan(
    pg: &ProductGraph,
    topo: &Topology,
    settings: &Settings,
) -> Result<IncomingPlan, CompileError> {
    let mut out = IncomingPlan::default();

    // every edge from an inside node to an outside node is an export across the boundary
    let mut boundary_exports: HashMap<LocationId, Vec<(usize, usize)>> = HashMap::new();
    for u in pg.alive_nodes() {
        let Some(l) = pg.node(u).loc.loc() else {
            continue;
        };
        if !topo.get(l).is_inside() {
            continue;
        }
        for w in pg.succ(u) {
            if let Some(p) = pg.node(w).loc.loc() {
                if !topo.get(p).is_inside() {
                    boundary_exports.entry(p).or_default().push((u, w));
                }
            }
        }
    }
    let any_boundary_export = !boundary_exports.is_empty();

    for p in topo.outside() {
        let inside_neighbors: Vec<LocationId> = topo
            .neighbors(p)
            .filter(|l| topo.get(*l).is_inside())
            .collect();
        if inside_neighbors.is_empty() {
            continue;
        }
        let exports = boundary_exports.remove(&p).unwrap_or_default();

        if settings.check_enter {
            let entering = classify(pg, topo, p, &inside_neighbors, &exports);
            debug!("peer {} classified as {:?}", topo.name(p), entering);
            match &entering {
                Entering::Anything => {}
                Entering::Nothing(loc) => {
                    if any_boundary_export {
                        if settings.use_no_export {
                            out.no_export_all = true;
                        } else {
                            return Err(CompileError::UncontrollableEnter(format!(
                                "peer {loc} must not send traffic, but routes leak across the \
                                 boundary and the no-export community is disabled"
                            )));
                        }
                    }
                }
                Entering::Specific(re) => {
                    return Err(CompileError::UncontrollableEnter(format!(
                        "traffic from peer {} is restricted to paths matching {}, which \
                         export actions cannot enforce",
                        topo.name(p),
                        re.fmt(topo)
                    )));
                }
            }
            out.entering.insert(p, entering);
        }

        tier_exports(pg, topo, p, &exports, settings, &mut out)?;
    }

    Ok(out)
}

/// The three-state classifier for one peer, computed from product-graph reachability: which
/// inside entry points receive an export towards the peer?
fn classify(
    pg: &ProductGraph,
    topo: &Topology,
    p: LocationId,
    inside_neighbors: &[LocationId],
    exports: &[(usize, usize)],
) -> Entering {
    if exports.is_empty() {
        return Entering::Nothing(topo.name(p).to_string());
    }
    // anything: every node at every inside neighbor exports to the peer
    let exporting: BTreeSet<usize> = exports.iter().map(|(u, _)| *u).collect();
    let unrestricted = inside_neighbors.iter().all(|l| {
        let mut nodes = pg.nodes_at(*l).peekable();
        nodes.peek().is_some() && nodes.all(|u| exporting.contains(&u))
    });
    if unrestricted {
        return Entering::Anything;
    }
    // otherwise, the welcome paths form a proper sub-language: reconstruct it for the report
    let re = Regex::union(
        exports
            .iter()
            .map(|(u, _)| pg.path_regex(*u))
            .collect_vec(),
    );
    Entering::Specific(re)
}

/// When several preference tiers are exported to the same peer, the peer must be told which one
/// to use. MED and AS-path prepending are the only knobs BGP offers for that.
fn tier_exports(
    pg: &ProductGraph,
    topo: &Topology,
    p: LocationId,
    exports: &[(usize, usize)],
    settings: &Settings,
    out: &mut IncomingPlan,
) -> Result<(), CompileError> {
    let tiers: BTreeSet<Rank> = exports
        .iter()
        .filter_map(|(u, _)| pg.min_rank(*u))
        .collect();
    if tiers.len() <= 1 {
        return Ok(());
    }
    if !settings.use_med && !settings.use_prepending {
        return Err(CompileError::UncontrollablePeerPreference(
            topo.name(p).to_string(),
        ));
    }
    for (u, _) in exports {
        let Some(i) = pg.min_rank(*u) else { continue };
        let mut actions = Vec::new();
        if settings.use_med {
            actions.push(Action::SetMed(80 + i as u32));
        }
        if settings.use_prepending {
            actions.push(Action::PrependPath(3 * i as u32));
        }
        out.peer_actions.insert((*u, p), actions);
    }
    Ok(())
}
