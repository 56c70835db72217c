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

//! # Configuration generation
//!
//! Turns the minimized, ordered product graph into per-router filter tables. A filter matches
//! incoming announcements (by peer, by community tag, or by path regex), assigns the local
//! preference that realizes the router's ordering, and lists the exports with their actions.
//!
//! Filter lists are order-sensitive: earlier filters override later ones, and every table ends
//! with an explicit deny.

use std::collections::{BTreeSet, HashMap};

use itertools::Itertools;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::incoming::IncomingPlan;
use crate::product::ProductGraph;
use crate::regex::Regex;
use crate::topology::Topology;
use crate::types::{Community, LocationId};

/// Match side of a filter, applied to incoming announcements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Match {
    /// Any announcement received from the given neighbor.
    Peer(LocationId),
    /// An announcement carrying the given community, received from the given neighbor or from
    /// anyone (`None`).
    State(Community, Option<LocationId>),
    /// An announcement whose path matches the regex (walk order, originator first).
    Path(Regex),
    /// No announcement: the router originates the prefix itself.
    Origination,
}

/// An action applied to an announcement on export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Attach a community.
    SetCommunity(Community),
    /// Set the multi-exit discriminator.
    SetMed(u32),
    /// Prepend the own AS number the given number of times.
    PrependPath(u32),
}

/// The peers an export applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerSpec {
    /// Export to every neighbor.
    Any,
    /// Export to every inside neighbor.
    Inside,
    /// Export to one specific neighbor.
    Loc(LocationId),
}

/// One export of a filter: the peers to announce to, and the actions applied on the way out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    /// The peers this export applies to.
    pub peer: PeerSpec,
    /// The actions applied to the announcement.
    pub actions: Vec<Action>,
}

/// A single filter of a device configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    /// Reject the announcement.
    Deny,
    /// Accept announcements matching `m`, assign the local preference, and export.
    Allow {
        /// The match condition.
        m: Match,
        /// The local-pref value realizing the router's preference ordering (higher is better).
        local_pref: u32,
        /// The exports of the accepted announcement.
        exports: Vec<Export>,
    },
}

/// Configuration of a single router, for a single prefix predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Whether the router originates the prefix itself.
    pub originates: bool,
    /// The ordered filter list; earlier filters override later ones.
    pub filters: Vec<Filter>,
}

/// Size counters reporting the effect of the peer and community compression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeStats {
    /// Uncompressed size: the sum over all nodes of `|in| * |out|`.
    pub raw: usize,
    /// Generated size: the total number of exports plus the total number of filters.
    pub smart: usize,
}

impl SizeStats {
    /// Accumulate another counter.
    pub fn add(&mut self, other: SizeStats) {
        self.raw += other.raw;
        self.smart += other.smart;
    }
}

/// Interns DFA state vectors into community tags.
#[derive(Debug, Default)]
struct Communities {
    ids: HashMap<Vec<crate::dfa::State>, u32>,
}

impl Communities {
    fn get(&mut self, states: &[crate::dfa::State]) -> Community {
        let next = self.ids.len() as u32;
        Community::Tag(*self.ids.entry(states.to_vec()).or_insert(next))
    }
}

/// Generate the per-router device configurations from the ordered product graph.
pub fn generate(
    pg: &ProductGraph,
    topo: &Topology,
    orderings: &crate::ordering::Orderings,
    incoming: &IncomingPlan,
) -> (HashMap<LocationId, DeviceConfig>, SizeStats) {
    let mut communities = Communities::default();
    let mut configs = HashMap::new();
    let mut stats = SizeStats::default();

    // deterministic community assignment: routers by name, nodes in preference order
    let locs: Vec<LocationId> = orderings
        .keys()
        .copied()
        .sorted_by_key(|l| topo.name(*l).to_string())
        .collect();
    for l in &locs {
        for v in &orderings[l] {
            communities.get(&pg.node(*v).states);
        }
    }

    for l in locs {
        let (cfg, s) = generate_router(pg, topo, l, &orderings[&l], incoming, &mut communities);
        stats.add(s);
        configs.insert(l, cfg);
    }
    (configs, stats)
}

/// Generate the filter table of a single router.
fn generate_router(
    pg: &ProductGraph,
    topo: &Topology,
    router: LocationId,
    order: &[usize],
    incoming: &IncomingPlan,
    communities: &mut Communities,
) -> (DeviceConfig, SizeStats) {
    let neighbors: BTreeSet<LocationId> = topo.neighbors(router).collect();
    let mut filters = Vec::new();
    let mut originates = false;
    let mut stats = SizeStats::default();

    for (pos, &v) in order.iter().enumerate() {
        let local_pref = 100u32.saturating_sub(pos as u32);
        let com_v = communities.get(&pg.node(v).states);

        let preds: Vec<usize> = pg.pred(v).collect();
        let succs: Vec<usize> = pg
            .succ(v)
            .filter(|s| *s != ProductGraph::END)
            .collect();
        stats.raw += preds.len() * succs.len();

        let exports = build_exports(pg, topo, v, com_v, &succs, &neighbors, incoming, &preds);
        let matches = build_matches(pg, topo, router, &preds, &neighbors, communities);

        for m in matches {
            if m == Match::Origination {
                originates = true;
            }
            trace!(
                "{}: lp {} for {}",
                topo.name(router),
                local_pref,
                pg.desc(v, topo)
            );
            filters.push(Filter::Allow {
                m,
                local_pref,
                exports: exports.clone(),
            });
        }
    }

    filters.push(Filter::Deny);
    stats.smart += filters.len()
        + filters
            .iter()
            .map(|f| match f {
                Filter::Allow { exports, .. } => exports.len(),
                Filter::Deny => 0,
            })
            .sum::<usize>();
    (DeviceConfig { originates, filters }, stats)
}

/// Build the export list of one node: a single wildcard export towards the inside carrying the
/// state community, and per-peer exports towards the outside carrying the tiering actions.
#[allow(clippy::too_many_arguments)]
fn build_exports(
    pg: &ProductGraph,
    topo: &Topology,
    v: usize,
    com_v: Community,
    succs: &[usize],
    neighbors: &BTreeSet<LocationId>,
    incoming: &IncomingPlan,
    preds: &[usize],
) -> Vec<Export> {
    let inside_targets: BTreeSet<LocationId> = succs
        .iter()
        .filter_map(|s| pg.node(*s).loc.loc())
        .filter(|l| topo.get(*l).is_inside())
        .collect();
    let outside_targets: BTreeSet<LocationId> = succs
        .iter()
        .filter_map(|s| pg.node(*s).loc.loc())
        .filter(|l| !topo.get(*l).is_inside())
        .collect();

    // tag stripping: when every predecessor already tagged the announcement with the same
    // community, re-setting it on the way in is redundant
    let keeps_state = !preds.is_empty()
        && preds.iter().all(|u| {
            *u != ProductGraph::START && pg.node(*u).states == pg.node(v).states
        });
    let inside_actions = if keeps_state {
        Vec::new()
    } else {
        vec![Action::SetCommunity(com_v)]
    };

    let mut exports = Vec::new();
    if !inside_targets.is_empty() {
        exports.push(Export {
            peer: PeerSpec::Inside,
            actions: inside_actions.clone(),
        });
    }
    let mut outside_special = false;
    for p in &outside_targets {
        let mut actions = incoming
            .peer_actions
            .get(&(v, *p))
            .cloned()
            .unwrap_or_default();
        if incoming.no_export_all {
            actions.push(Action::SetCommunity(Community::NoExport));
        }
        outside_special |= !actions.is_empty();
        exports.push(Export {
            peer: PeerSpec::Loc(*p),
            actions,
        });
    }

    // collapse to a single wildcard export when every neighbor receives the same announcement
    let all_targets: BTreeSet<LocationId> =
        inside_targets.union(&outside_targets).copied().collect();
    if !outside_special && all_targets == *neighbors && !all_targets.is_empty() {
        return vec![Export {
            peer: PeerSpec::Any,
            actions: inside_actions,
        }];
    }
    exports
}

/// Build the match list of one node from its in-neighbors.
fn build_matches(
    pg: &ProductGraph,
    topo: &Topology,
    router: LocationId,
    preds: &[usize],
    neighbors: &BTreeSet<LocationId>,
    communities: &mut Communities,
) -> Vec<Match> {
    let mut matches = Vec::new();
    for &u in preds {
        if u == ProductGraph::START {
            matches.push(Match::Origination);
            continue;
        }
        let m = pg.node(u).loc.loc().unwrap_or(router);
        let unambiguous = pg.location_edge_count(m, router) == 1;
        if topo.get(m).is_inside() {
            if unambiguous {
                matches.push(Match::Peer(m));
            } else {
                matches.push(Match::State(communities.get(&pg.node(u).states), Some(m)));
            }
        } else if unambiguous {
            // announcements from outside carry no state community
            matches.push(Match::Peer(m));
        } else {
            matches.push(Match::Path(pg.path_regex(u)));
        }
    }

    // collapse to a wildcard state match when every neighbor feeds this node in the same state
    if matches.len() > 1 {
        let coms: BTreeSet<Option<&Community>> = matches
            .iter()
            .map(|m| match m {
                Match::State(c, _) => Some(c),
                _ => None,
            })
            .collect();
        let locs: BTreeSet<LocationId> = matches
            .iter()
            .filter_map(|m| match m {
                Match::State(_, l) => *l,
                Match::Peer(l) => Some(*l),
                _ => None,
            })
            .collect();
        if let [Some(c)] = Vec::from_iter(coms)[..] {
            if locs == *neighbors {
                return vec![Match::State(*c, None)];
            }
        }
    }
    matches
}
