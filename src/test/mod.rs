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

//! End-to-end compilation scenarios.

use crate::bdd::Bdd;
use crate::prelude::*;

mod basic;
mod diamond;
mod enter;
mod stretching_man;

/// Compile a single policy pair over the topology.
fn run<F>(
    topo: &Topology,
    settings: &Settings,
    prefs: F,
) -> Result<Config, Vec<CompileError>>
where
    F: FnOnce(&RegexBuilder<'_>) -> Vec<Regex>,
{
    let mut bdd = Bdd::new();
    let prefix = bdd.prefix("10.0.0.0/8".parse().unwrap());
    let policy = Policy {
        pairs: vec![PolicyPair::new(prefix, topo, prefs)],
        constraints: vec![],
    };
    compile(topo, &policy, &mut bdd, settings)
}

/// The allow filters of a router, from its first (and only) predicate group. Routers that carry
/// no traffic for the prefix have no filters at all.
fn allows<'a>(cfg: &'a Config, router: &str) -> Vec<&'a Filter> {
    cfg.routers[router]
        .actions
        .first()
        .map(|(_, dc)| {
            dc.filters
                .iter()
                .filter(|f| matches!(f, Filter::Allow { .. }))
                .collect()
        })
        .unwrap_or_default()
}

/// The neighbor a filter matches announcements from, if it names one.
fn match_peer(f: &Filter, topo: &Topology) -> Option<String> {
    match f {
        Filter::Allow { m, .. } => match m {
            Match::Peer(l) => Some(topo.name(*l).to_string()),
            Match::State(_, Some(l)) => Some(topo.name(*l).to_string()),
            _ => None,
        },
        Filter::Deny => None,
    }
}

/// The local preference assigned by a filter.
fn local_pref(f: &Filter) -> u32 {
    match f {
        Filter::Allow { local_pref, .. } => *local_pref,
        Filter::Deny => 0,
    }
}
