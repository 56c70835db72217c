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

//! Human-readable rendering of configurations, for diffing and debugging. The text format is not
//! part of the semantic contract.

use itertools::Itertools;

use crate::bdd::Bdd;
use crate::codegen::{Action, DeviceConfig, Export, Filter, Match, PeerSpec};
use crate::driver::{Config, RouterConfig};
use crate::prefixes;
use crate::topology::Topology;

/// Resolve location ids through the topology while rendering.
pub trait ConfigFormatter {
    /// Render `self`, resolving location names through the topology.
    fn fmt(&self, topo: &Topology) -> String;
}

impl ConfigFormatter for Match {
    fn fmt(&self, topo: &Topology) -> String {
        match self {
            Match::Peer(l) => format!("peer {}", topo.name(*l)),
            Match::State(c, Some(l)) => format!("community {} from {}", c, topo.name(*l)),
            Match::State(c, None) => format!("community {c} from *"),
            Match::Path(re) => format!("path {}", re.fmt(topo)),
            Match::Origination => "originate".to_string(),
        }
    }
}

impl ConfigFormatter for Action {
    fn fmt(&self, _topo: &Topology) -> String {
        match self {
            Action::SetCommunity(c) => format!("set community {c}"),
            Action::SetMed(m) => format!("set med {m}"),
            Action::PrependPath(n) => format!("prepend {n}"),
        }
    }
}

impl ConfigFormatter for Export {
    fn fmt(&self, topo: &Topology) -> String {
        let peer = match self.peer {
            PeerSpec::Any => "*".to_string(),
            PeerSpec::Inside => "in".to_string(),
            PeerSpec::Loc(l) => topo.name(l).to_string(),
        };
        if self.actions.is_empty() {
            peer
        } else {
            format!(
                "{peer}: {}",
                self.actions.iter().map(|a| a.fmt(topo)).join(", ")
            )
        }
    }
}

impl ConfigFormatter for Filter {
    fn fmt(&self, topo: &Topology) -> String {
        match self {
            Filter::Deny => "deny".to_string(),
            Filter::Allow {
                m,
                local_pref,
                exports,
            } => format!(
                "allow [{}] lp {} -> [{}]",
                m.fmt(topo),
                local_pref,
                exports.iter().map(|e| e.fmt(topo)).join("; ")
            ),
        }
    }
}

impl ConfigFormatter for DeviceConfig {
    fn fmt(&self, topo: &Topology) -> String {
        let mut out = String::new();
        if self.originates {
            out.push_str("    originates\n");
        }
        for f in &self.filters {
            out.push_str(&format!("    {}\n", f.fmt(topo)));
        }
        out
    }
}

/// Render a full configuration, resolving predicates into compacted prefix lists through the
/// BDD engine that created them.
pub fn fmt_config(cfg: &Config, topo: &Topology, bdd: &Bdd) -> String {
    let mut out = String::new();
    for (name, rc) in &cfg.routers {
        out.push_str(&format!("router {name}:\n"));
        out.push_str(&fmt_router(rc, topo, bdd));
    }
    match cfg.aggregate_resilience {
        Some(0) => {
            out.push_str("aggregates: an aggregation point has no path to any originator\n");
        }
        Some(k) => {
            out.push_str(&format!(
                "aggregates survive {} link failure(s)\n",
                k.saturating_sub(1)
            ));
        }
        None => {}
    }
    out.push_str(&format!(
        "size: raw {}, generated {}\n",
        cfg.stats.raw, cfg.stats.smart
    ));
    out
}

fn fmt_router(rc: &RouterConfig, topo: &Topology, bdd: &Bdd) -> String {
    let mut out = String::new();
    for (pred, dc) in &rc.actions {
        let nets: Vec<ipnet::Ipv4Net> = prefixes::predicate_to_ranges(bdd, *pred)
            .into_iter()
            .flat_map(prefixes::range_to_prefixes)
            .collect();
        let rows = prefixes::compact(&nets);
        let scope = rows
            .iter()
            .map(|r| match r.prefix {
                Some(p) => p.to_string(),
                None => "any".to_string(),
            })
            .join(", ");
        out.push_str(&format!("  prefixes [{scope}]:\n"));
        out.push_str(&dc.fmt(topo));
    }
    for (prefix, peers) in &rc.control.aggregates {
        out.push_str(&format!(
            "  aggregate {prefix} towards [{}]\n",
            peers.join(", ")
        ));
    }
    for (community, prefix, peers) in &rc.control.tags {
        out.push_str(&format!(
            "  tag {community} on {prefix} towards [{}]\n",
            peers.join(", ")
        ));
    }
    for (limit, peers) in &rc.control.max_routes {
        out.push_str(&format!(
            "  max-routes {limit} from [{}]\n",
            peers.join(", ")
        ));
    }
    out
}
