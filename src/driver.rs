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

//! # Prefix driver
//!
//! Runs the full compilation pipeline once per policy pair, in parallel, and joins the
//! per-prefix results into the final per-router configuration. Each pair compiles independently
//! over the immutable topology; a failing pair does not stop its siblings, so the operator sees
//! every error of a run at once.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::fs;

use ipnet::Ipv4Net;
use itertools::{Either, Itertools};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bdd::{Bdd, Predicate};
use crate::codegen::{self, DeviceConfig, SizeStats};
use crate::dfa::Dfa;
use crate::incoming;
use crate::minimize::minimize;
use crate::ordering;
use crate::product::ProductGraph;
use crate::regex::{Regex, RegexBuilder};
use crate::topology::Topology;
use crate::types::{CompileError, LocationId, Settings};

/// One unit of policy: a predicate selecting the prefixes (and communities) it applies to, and
/// the ranked list of path regexes, best first.
#[derive(Debug, Clone)]
pub struct PolicyPair {
    /// The prefixes and communities this pair applies to.
    pub predicate: Predicate,
    /// The ranked path regexes, best first.
    pub preferences: Vec<Regex>,
}

impl PolicyPair {
    /// Build a policy pair by handing a [`RegexBuilder`] over the topology to the given
    /// consumer.
    pub fn new<F>(predicate: Predicate, topo: &Topology, prefs: F) -> Self
    where
        F: FnOnce(&RegexBuilder<'_>) -> Vec<Regex>,
    {
        let reb = RegexBuilder::new(topo);
        Self {
            predicate,
            preferences: prefs(&reb),
        }
    }
}

/// A control-plane constraint, applied on the links from the `from` routers towards the `to`
/// peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constraint {
    /// Announce an aggregate prefix at the boundary.
    Aggregate {
        /// The aggregate prefix.
        prefix: Ipv4Net,
        /// Inside routers performing the aggregation.
        from: Vec<String>,
        /// Peers towards which the aggregate is announced.
        to: Vec<String>,
    },
    /// Attach a named community to announcements of a prefix.
    Tag {
        /// The community name.
        community: String,
        /// The tagged prefix.
        prefix: Ipv4Net,
        /// Inside routers applying the tag.
        from: Vec<String>,
        /// Peers towards which the tag applies.
        to: Vec<String>,
    },
    /// Limit the number of routes accepted on a session.
    MaxRoutes {
        /// The route limit.
        limit: u32,
        /// Inside routers enforcing the limit.
        from: Vec<String>,
        /// Peers the limit applies to.
        to: Vec<String>,
    },
}

/// The control-plane part of a router configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterControl {
    /// Aggregates announced by this router, with the peers they are announced to.
    pub aggregates: Vec<(Ipv4Net, Vec<String>)>,
    /// Community tags applied by this router.
    pub tags: Vec<(String, Ipv4Net, Vec<String>)>,
    /// Route limits enforced by this router.
    pub max_routes: Vec<(u32, Vec<String>)>,
}

/// The complete configuration of one router.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Per-predicate device configurations, in input prefix order.
    pub actions: Vec<(Predicate, DeviceConfig)>,
    /// Control-plane configuration.
    pub control: RouterControl,
}

/// The full policy input: the ranked path regexes per predicate, plus the control-plane
/// constraints.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    /// The policy pairs, in input order.
    pub pairs: Vec<PolicyPair>,
    /// The control-plane constraints.
    pub constraints: Vec<Constraint>,
}

/// The joined compilation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Per-router configuration, ordered by router name.
    pub routers: BTreeMap<String, RouterConfig>,
    /// The smallest number of concurrent link failures that disconnects some aggregate from all
    /// originators. `None` when the policy declares no aggregates.
    pub aggregate_resilience: Option<usize>,
    /// Compression statistics over all prefixes.
    pub stats: SizeStats,
}

/// Compile a policy on a topology into the final per-router configuration.
///
/// All policy pairs are compiled in parallel. On failure, the errors of every failing pair are
/// returned together, in input order.
pub fn compile(
    topo: &Topology,
    policy: &Policy,
    bdd: &mut Bdd,
    settings: &Settings,
) -> Result<Config, Vec<CompileError>> {
    topo.validate().map_err(|e| vec![e])?;

    let results: Vec<Result<PairResult, CompileError>> = policy
        .pairs
        .par_iter()
        .enumerate()
        .map(|(i, pair)| compile_pair(topo, i, pair, settings))
        .collect();

    let (oks, errors): (Vec<PairResult>, Vec<CompileError>) =
        results.into_iter().partition_map(|r| match r {
            Ok(x) => Either::Left(x),
            Err(e) => Either::Right(e),
        });
    if !errors.is_empty() {
        return Err(errors);
    }

    let mut routers: BTreeMap<String, RouterConfig> = topo
        .inside()
        .map(|l| (topo.name(l).to_string(), RouterConfig::default()))
        .collect();
    let mut stats = SizeStats::default();

    // join per-router configs: router entries by name, per-prefix groups in input order, and
    // adjacent identical device configs merged by or-ing their predicates
    for (pair, result) in policy.pairs.iter().zip(oks) {
        stats.add(result.stats);
        for l in topo.inside() {
            let Some(cfg) = result.configs.get(&l) else {
                continue;
            };
            let rc = routers
                .get_mut(topo.name(l))
                .unwrap_or_else(|| unreachable!("router missing in join"));
            match rc.actions.last_mut() {
                Some((p, existing)) if existing == cfg => *p = bdd.or(*p, pair.predicate),
                _ => rc.actions.push((pair.predicate, cfg.clone())),
            }
        }
    }

    apply_constraints(&policy.constraints, &mut routers);
    let aggregate_resilience = aggregate_resilience(topo, &policy.constraints);

    info!(
        "compiled {} policy pairs for {} routers (raw size {}, generated size {})",
        policy.pairs.len(),
        routers.len(),
        stats.raw,
        stats.smart
    );
    Ok(Config {
        routers,
        aggregate_resilience,
        stats,
    })
}

/// Result of one per-pair pipeline run.
struct PairResult {
    configs: HashMap<LocationId, DeviceConfig>,
    stats: SizeStats,
}

/// The sequential pipeline for one policy pair: DFAs, product graph, minimization, ordering,
/// incoming-traffic plan, and configuration generation.
fn compile_pair(
    topo: &Topology,
    idx: usize,
    pair: &PolicyPair,
    settings: &Settings,
) -> Result<PairResult, CompileError> {
    let dfas: Vec<Dfa> = pair
        .preferences
        .iter()
        .map(|r| Dfa::build(r.reverse(), topo))
        .collect();

    let mut pg = ProductGraph::build(topo, &dfas);
    dump(settings, topo, idx, "raw", &pg);
    minimize(&mut pg, &dfas);
    dump(settings, topo, idx, "minimized", &pg);

    let orderings = ordering::solve(&pg, topo, &dfas)?;
    let plan = incoming::plan(&pg, topo, settings)?;
    let (configs, stats) = codegen::generate(&pg, topo, &orderings, &plan);
    Ok(PairResult { configs, stats })
}

/// Write the product graph to the debug directory, as dot and json. Failures to write are
/// logged, never fatal.
fn dump(settings: &Settings, topo: &Topology, idx: usize, stage: &str, pg: &ProductGraph) {
    let Some(dir) = &settings.debug_dir else {
        return;
    };
    let write = || -> std::io::Result<()> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join(format!("{idx}_{stage}.dot")), pg.to_dot(topo))?;
        let json = serde_json::to_string_pretty(pg)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        fs::write(dir.join(format!("{idx}_{stage}.json")), json)?;
        Ok(())
    };
    if let Err(e) = write() {
        warn!("cannot write debug dump {idx}_{stage}: {e}");
    }
}

/// Attach the control-plane constraints to the routers named in their scopes.
fn apply_constraints(constraints: &[Constraint], routers: &mut BTreeMap<String, RouterConfig>) {
    for c in constraints {
        match c {
            Constraint::Aggregate { prefix, from, to } => {
                for r in from {
                    if let Some(rc) = routers.get_mut(r) {
                        rc.control.aggregates.push((*prefix, to.clone()));
                    }
                }
            }
            Constraint::Tag {
                community,
                prefix,
                from,
                to,
            } => {
                for r in from {
                    if let Some(rc) = routers.get_mut(r) {
                        rc.control.tags.push((community.clone(), *prefix, to.clone()));
                    }
                }
            }
            Constraint::MaxRoutes { limit, from, to } => {
                for r in from {
                    if let Some(rc) = routers.get_mut(r) {
                        rc.control.max_routes.push((*limit, to.clone()));
                    }
                }
            }
        }
    }
}

/// The smallest number of concurrent link failures that disconnects some aggregate from all
/// originators.
fn aggregate_resilience(topo: &Topology, constraints: &[Constraint]) -> Option<usize> {
    let originators: BTreeSet<LocationId> = topo.originators().collect();
    constraints
        .iter()
        .filter_map(|c| match c {
            Constraint::Aggregate { from, .. } => {
                let points: BTreeSet<LocationId> =
                    from.iter().filter_map(|n| topo.lookup(n)).collect();
                if points.is_empty() || originators.is_empty() {
                    None
                } else {
                    Some(topo.edge_disjoint_paths_set(&points, &originators))
                }
            }
            _ => None,
        })
        .min()
}
