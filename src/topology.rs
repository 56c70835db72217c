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

//! # Topology
//!
//! The user-supplied network topology: named locations (routers of the network under control and
//! recognized external peers), connected by directed links. The topology also fixes the alphabet
//! over which all path regexes and DFAs operate.

use std::collections::{BTreeSet, HashMap};

use petgraph::stable_graph::StableGraph;
use petgraph::Directed;
use serde::{Deserialize, Serialize};

use crate::types::{CompileError, IndexType, LocationId};

/// The reserved location name meaning "any outside location" in constraint declarations.
pub const OUT: &str = "out";

/// Whether a location belongs to the network under control or to an external peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationKind {
    /// A router of the network under control.
    Inside,
    /// A recognized external peer.
    Outside,
}

/// A named vertex of the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Unique name of the location.
    pub name: String,
    /// Inside or outside of the network under control.
    pub kind: LocationKind,
    /// Whether traffic for the compiled prefix may originate here.
    pub can_originate: bool,
}

impl Location {
    /// Returns `true` if the location is inside the network under control.
    pub fn is_inside(&self) -> bool {
        self.kind == LocationKind::Inside
    }
}

/// Directed graph over locations.
///
/// Links are physical and thus always inserted in both directions. The alphabet of the topology
/// is the set of all locations (inside and outside).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    g: StableGraph<Location, (), Directed, IndexType>,
    names: HashMap<String, LocationId>,
}

impl Topology {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an inside location and return its id.
    ///
    /// # Panics
    /// Panics if the name is already taken, or if it is the reserved name `"out"`.
    pub fn add_inside(&mut self, name: impl Into<String>, can_originate: bool) -> LocationId {
        self.add(name.into(), LocationKind::Inside, can_originate)
    }

    /// Add an outside location (a recognized external peer) and return its id. External peers can
    /// always originate traffic.
    ///
    /// # Panics
    /// Panics if the name is already taken, or if it is the reserved name `"out"`.
    pub fn add_outside(&mut self, name: impl Into<String>) -> LocationId {
        self.add(name.into(), LocationKind::Outside, true)
    }

    fn add(&mut self, name: String, kind: LocationKind, can_originate: bool) -> LocationId {
        assert!(name != OUT, "the location name {OUT:?} is reserved");
        assert!(
            !self.names.contains_key(&name),
            "duplicate location name {name:?}"
        );
        let id = self.g.add_node(Location {
            name: name.clone(),
            kind,
            can_originate,
        });
        self.names.insert(name, id);
        id
    }

    /// Add a bidirectional link between two locations.
    pub fn add_link(&mut self, a: LocationId, b: LocationId) {
        if !self.g.contains_edge(a, b) {
            self.g.add_edge(a, b, ());
        }
        if !self.g.contains_edge(b, a) {
            self.g.add_edge(b, a, ());
        }
    }

    /// Get the location data for an id.
    ///
    /// # Panics
    /// Panics if the id is not part of the topology.
    pub fn get(&self, id: LocationId) -> &Location {
        &self.g[id]
    }

    /// Get the name of a location.
    pub fn name(&self, id: LocationId) -> &str {
        &self.g[id].name
    }

    /// Look up a location by name.
    pub fn lookup(&self, name: &str) -> Option<LocationId> {
        self.names.get(name).copied()
    }

    /// Iterate over all locations (the alphabet), in insertion order.
    pub fn locations(&self) -> impl Iterator<Item = LocationId> + '_ {
        self.g.node_indices()
    }

    /// Iterate over all inside locations.
    pub fn inside(&self) -> impl Iterator<Item = LocationId> + '_ {
        self.g
            .node_indices()
            .filter(move |id| self.g[*id].is_inside())
    }

    /// Iterate over all outside locations.
    pub fn outside(&self) -> impl Iterator<Item = LocationId> + '_ {
        self.g
            .node_indices()
            .filter(move |id| !self.g[*id].is_inside())
    }

    /// Iterate over all locations that can originate traffic.
    pub fn originators(&self) -> impl Iterator<Item = LocationId> + '_ {
        self.g
            .node_indices()
            .filter(move |id| self.g[*id].can_originate)
    }

    /// Iterate over the direct successors of a location.
    pub fn neighbors(&self, id: LocationId) -> impl Iterator<Item = LocationId> + '_ {
        self.g.neighbors(id)
    }

    /// Returns `true` if the topology contains the directed link `a -> b`.
    pub fn has_link(&self, a: LocationId, b: LocationId) -> bool {
        self.g.contains_edge(a, b)
    }

    /// Number of locations in the topology.
    pub fn len(&self) -> usize {
        self.g.node_count()
    }

    /// Returns `true` if the topology contains no locations.
    pub fn is_empty(&self) -> bool {
        self.g.node_count() == 0
    }

    /// Check the topology invariant: the inside subgraph must be weakly connected. This runs
    /// before any product graph is built, so that a mis-entered topology fails fast.
    pub fn validate(&self) -> Result<(), CompileError> {
        let inside: Vec<LocationId> = self.inside().collect();
        if inside.len() <= 1 {
            return Ok(());
        }
        let mut seen: BTreeSet<LocationId> = BTreeSet::new();
        let mut stack = vec![inside[0]];
        seen.insert(inside[0]);
        while let Some(x) = stack.pop() {
            for n in self.g.neighbors(x) {
                if self.g[n].is_inside() && seen.insert(n) {
                    stack.push(n);
                }
            }
        }
        if inside.iter().all(|id| seen.contains(id)) {
            Ok(())
        } else {
            Err(CompileError::DisconnectedTopology)
        }
    }

    /// Count the maximum number of edge-disjoint paths between `from` and any location in `to`,
    /// treating links as unit-capacity edges. This is one more than the number of concurrent
    /// link failures the connection survives.
    pub fn edge_disjoint_paths(&self, from: LocationId, to: &BTreeSet<LocationId>) -> usize {
        self.edge_disjoint_paths_set(&BTreeSet::from([from]), to)
    }

    /// Like [`Self::edge_disjoint_paths`], but disconnecting a whole set of sources from the
    /// targets: the number of link failures needed so that no source reaches any target.
    pub fn edge_disjoint_paths_set(
        &self,
        from: &BTreeSet<LocationId>,
        to: &BTreeSet<LocationId>,
    ) -> usize {
        if from.intersection(to).next().is_some() {
            return usize::MAX;
        }
        // BFS augmenting paths on the residual graph. Capacities are per directed edge, so an
        // undirected link contributes one unit in each direction.
        let mut used: BTreeSet<(LocationId, LocationId)> = BTreeSet::new();
        let mut count = 0;
        loop {
            let mut pred: HashMap<LocationId, LocationId> = HashMap::new();
            let mut queue: std::collections::VecDeque<LocationId> =
                from.iter().copied().collect();
            let mut reached = None;
            'bfs: while let Some(x) = queue.pop_front() {
                for n in self.g.neighbors(x) {
                    if pred.contains_key(&n) || from.contains(&n) || used.contains(&(x, n)) {
                        continue;
                    }
                    pred.insert(n, x);
                    if to.contains(&n) {
                        reached = Some(n);
                        break 'bfs;
                    }
                    queue.push_back(n);
                }
            }
            let Some(mut v) = reached else {
                return count;
            };
            while let Some(&u) = pred.get(&v) {
                if !used.remove(&(v, u)) {
                    used.insert((u, v));
                }
                v = u;
            }
            count += 1;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn line() -> (Topology, Vec<LocationId>) {
        let mut t = Topology::new();
        let a = t.add_inside("A", false);
        let b = t.add_inside("B", false);
        let c = t.add_inside("C", true);
        t.add_link(a, b);
        t.add_link(b, c);
        (t, vec![a, b, c])
    }

    #[test]
    fn connectivity() {
        let (t, _) = line();
        assert_eq!(t.validate(), Ok(()));

        let mut t2 = t.clone();
        t2.add_inside("D", false);
        assert_eq!(t2.validate(), Err(CompileError::DisconnectedTopology));

        // outside locations do not count towards connectivity
        let mut t3 = t;
        t3.add_outside("E");
        assert_eq!(t3.validate(), Ok(()));
    }

    #[test]
    fn disjoint_paths() {
        let mut t = Topology::new();
        let a = t.add_inside("A", false);
        let x = t.add_inside("X", false);
        let y = t.add_inside("Y", false);
        let b = t.add_inside("B", true);
        t.add_link(a, x);
        t.add_link(a, y);
        t.add_link(x, b);
        t.add_link(y, b);
        let to = BTreeSet::from([b]);
        assert_eq!(t.edge_disjoint_paths(a, &to), 2);

        let (t, ids) = line();
        let to = BTreeSet::from([ids[2]]);
        assert_eq!(t.edge_disjoint_paths(ids[0], &to), 1);
    }
}
