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

//! # Path Regexes
//!
//! Regular expressions over the location alphabet of a topology. A regex describes data-plane
//! paths in forward direction: the traffic source comes first, the originator of the announced
//! prefix last. Use [`RegexBuilder`] to construct regexes by location name.
//!
//! Regexes are kept in a canonical form (flattened, sorted, deduplicated) so that the
//! derivative-based DFA construction in [`crate::dfa`] terminates on a finite state set.

use std::collections::BTreeSet;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::topology::Topology;
use crate::types::LocationId;

/// A regular expression over the location alphabet.
///
/// The variants are not meant to be constructed directly; use the smart constructors or
/// [`RegexBuilder`], which maintain the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Regex {
    /// Matches no path at all.
    Empty,
    /// Matches the empty path.
    Epsilon,
    /// Matches a single location out of the given (non-empty) set.
    Class(BTreeSet<LocationId>),
    /// Concatenation of at least two regexes.
    Concat(Vec<Regex>),
    /// Union of at least two regexes.
    Union(BTreeSet<Regex>),
    /// Intersection of at least two regexes.
    Inter(BTreeSet<Regex>),
    /// Zero or more repetitions.
    Star(Box<Regex>),
    /// Complement with respect to all paths over the alphabet.
    Negate(Box<Regex>),
}

impl Regex {
    /// A class matching a single location.
    pub fn loc(l: LocationId) -> Self {
        Regex::Class(BTreeSet::from([l]))
    }

    /// A class matching any location of the given set. The empty set yields [`Regex::Empty`].
    pub fn class(set: impl IntoIterator<Item = LocationId>) -> Self {
        let set: BTreeSet<LocationId> = set.into_iter().collect();
        if set.is_empty() {
            Regex::Empty
        } else {
            Regex::Class(set)
        }
    }

    /// Concatenation. Epsilon elements vanish, an empty element annihilates.
    pub fn concat(rs: impl IntoIterator<Item = Regex>) -> Self {
        let mut out = Vec::new();
        for r in rs {
            match r {
                Regex::Epsilon => {}
                Regex::Empty => return Regex::Empty,
                Regex::Concat(inner) => out.extend(inner),
                r => out.push(r),
            }
        }
        match out.len() {
            0 => Regex::Epsilon,
            1 => out.pop().unwrap(),
            _ => Regex::Concat(out),
        }
    }

    /// Union. Empty elements vanish, duplicates collapse.
    pub fn union(rs: impl IntoIterator<Item = Regex>) -> Self {
        let mut set = BTreeSet::new();
        for r in rs {
            match r {
                Regex::Empty => {}
                Regex::Union(inner) => set.extend(inner),
                r => {
                    set.insert(r);
                }
            }
        }
        // merge all classes into one
        let classes: Vec<Regex> = set
            .iter()
            .filter(|r| matches!(r, Regex::Class(_)))
            .cloned()
            .collect();
        if classes.len() > 1 {
            let mut merged = BTreeSet::new();
            for c in classes {
                let Regex::Class(s) = c else { unreachable!() };
                set.remove(&Regex::Class(s.clone()));
                merged.extend(s);
            }
            set.insert(Regex::Class(merged));
        }
        match set.len() {
            0 => Regex::Empty,
            1 => set.pop_first().unwrap(),
            _ => Regex::Union(set),
        }
    }

    /// Intersection. An empty element annihilates, duplicates collapse.
    pub fn inter(rs: impl IntoIterator<Item = Regex>) -> Self {
        let mut set = BTreeSet::new();
        for r in rs {
            match r {
                Regex::Empty => return Regex::Empty,
                Regex::Inter(inner) => set.extend(inner),
                r => {
                    set.insert(r);
                }
            }
        }
        match set.len() {
            0 => Regex::Negate(Box::new(Regex::Empty)),
            1 => set.pop_first().unwrap(),
            _ => Regex::Inter(set),
        }
    }

    /// Kleene star.
    pub fn star(r: Regex) -> Self {
        match r {
            Regex::Empty | Regex::Epsilon => Regex::Epsilon,
            r @ Regex::Star(_) => r,
            r => Regex::Star(Box::new(r)),
        }
    }

    /// Complement.
    pub fn negate(r: Regex) -> Self {
        match r {
            Regex::Negate(inner) => *inner,
            r => Regex::Negate(Box::new(r)),
        }
    }

    /// Reverse the regex: the language of the result is the set of reversed paths. Used to build
    /// DFAs that walk paths in announcement direction (originator first).
    pub fn reverse(&self) -> Regex {
        match self {
            Regex::Empty => Regex::Empty,
            Regex::Epsilon => Regex::Epsilon,
            Regex::Class(s) => Regex::Class(s.clone()),
            Regex::Concat(rs) => Regex::concat(rs.iter().rev().map(|r| r.reverse())),
            Regex::Union(rs) => Regex::union(rs.iter().map(|r| r.reverse())),
            Regex::Inter(rs) => Regex::inter(rs.iter().map(|r| r.reverse())),
            Regex::Star(r) => Regex::star(r.reverse()),
            Regex::Negate(r) => Regex::negate(r.reverse()),
        }
    }

    /// Returns `true` if the regex matches the empty path.
    pub fn nullable(&self) -> bool {
        match self {
            Regex::Empty | Regex::Class(_) => false,
            Regex::Epsilon => true,
            Regex::Concat(rs) => rs.iter().all(|r| r.nullable()),
            Regex::Union(rs) => rs.iter().any(|r| r.nullable()),
            Regex::Inter(rs) => rs.iter().all(|r| r.nullable()),
            Regex::Star(_) => true,
            Regex::Negate(r) => !r.nullable(),
        }
    }

    /// The Brzozowski derivative with respect to one location: the regex matching the remainders
    /// of all paths that begin with `a`.
    pub fn derivative(&self, a: LocationId) -> Regex {
        match self {
            Regex::Empty | Regex::Epsilon => Regex::Empty,
            Regex::Class(s) => {
                if s.contains(&a) {
                    Regex::Epsilon
                } else {
                    Regex::Empty
                }
            }
            Regex::Concat(rs) => {
                let (first, rest) = rs.split_first().unwrap();
                let d_first = Regex::concat(
                    std::iter::once(first.derivative(a)).chain(rest.iter().cloned()),
                );
                if first.nullable() {
                    let d_rest = Regex::concat(rest.iter().cloned()).derivative(a);
                    Regex::union([d_first, d_rest])
                } else {
                    d_first
                }
            }
            Regex::Union(rs) => Regex::union(rs.iter().map(|r| r.derivative(a))),
            Regex::Inter(rs) => Regex::inter(rs.iter().map(|r| r.derivative(a))),
            Regex::Star(r) => Regex::concat([r.derivative(a), Regex::star((**r).clone())]),
            Regex::Negate(r) => Regex::negate(r.derivative(a)),
        }
    }

    /// Render the regex with location names resolved through the topology.
    pub fn fmt(&self, topo: &Topology) -> String {
        match self {
            Regex::Empty => "0".to_string(),
            Regex::Epsilon => "eps".to_string(),
            Regex::Class(s) => {
                if s.len() == 1 {
                    topo.name(*s.iter().next().unwrap()).to_string()
                } else {
                    format!("[{}]", s.iter().map(|l| topo.name(*l)).join("|"))
                }
            }
            Regex::Concat(rs) => rs.iter().map(|r| r.fmt(topo)).join("."),
            Regex::Union(rs) => format!("({})", rs.iter().map(|r| r.fmt(topo)).join(" + ")),
            Regex::Inter(rs) => format!("({})", rs.iter().map(|r| r.fmt(topo)).join(" & ")),
            Regex::Star(r) => format!("({})*", r.fmt(topo)),
            Regex::Negate(r) => format!("!({})", r.fmt(topo)),
        }
    }
}

/// # Regex Builder
///
/// Constructs path regexes by location name, bound to a topology. All paths are written in
/// data-plane direction: the traffic source first, the originator of the prefix last.
///
/// ```
/// # use bgpc::topology::Topology;
/// # use bgpc::regex::RegexBuilder;
/// let mut topo = Topology::new();
/// let a = topo.add_inside("A", false);
/// let b = topo.add_inside("B", true);
/// topo.add_link(a, b);
/// let reb = RegexBuilder::new(&topo);
/// let pref = reb.path(&["A", "B"]);
/// ```
///
/// # Panics
/// All name-resolving functions panic on unknown location names; the surface-syntax parser is
/// expected to have validated names against the topology boundary.
#[derive(Debug, Clone, Copy)]
pub struct RegexBuilder<'a> {
    topo: &'a Topology,
}

impl<'a> RegexBuilder<'a> {
    /// Create a builder bound to a topology.
    pub fn new(topo: &'a Topology) -> Self {
        Self { topo }
    }

    fn resolve(&self, name: &str) -> Regex {
        if name == crate::topology::OUT {
            return self.outside();
        }
        match self.topo.lookup(name) {
            Some(id) => Regex::loc(id),
            None => panic!("unknown location name {name:?}"),
        }
    }

    /// A single location by name. The reserved name `"out"` matches any outside location.
    pub fn loc(&self, name: &str) -> Regex {
        self.resolve(name)
    }

    /// Any single inside location.
    pub fn inside(&self) -> Regex {
        Regex::class(self.topo.inside())
    }

    /// Any single outside location.
    pub fn outside(&self) -> Regex {
        Regex::class(self.topo.outside())
    }

    /// Any single location.
    pub fn any(&self) -> Regex {
        Regex::class(self.topo.locations())
    }

    /// A non-empty path that stays inside the network under control.
    pub fn internal(&self) -> Regex {
        Regex::concat([self.inside(), Regex::star(self.inside())])
    }

    /// The exact path through the named locations.
    pub fn path(&self, names: &[&str]) -> Regex {
        Regex::concat(names.iter().map(|n| self.resolve(n)))
    }

    /// Any path starting at one of the named locations.
    pub fn starts_at_any(&self, names: &[&str]) -> Regex {
        Regex::concat([
            Regex::union(names.iter().map(|n| self.resolve(n))),
            Regex::star(self.any()),
        ])
    }

    /// Any path ending at the named location.
    pub fn ends_at(&self, name: &str) -> Regex {
        Regex::concat([Regex::star(self.any()), self.resolve(name)])
    }

    /// Any path traversing the named location.
    pub fn waypoint(&self, name: &str) -> Regex {
        Regex::concat([
            Regex::star(self.any()),
            self.resolve(name),
            Regex::star(self.any()),
        ])
    }

    /// Valley-free paths over a tier hierarchy, given top tier first: the path may climb towards
    /// the top tier and descend afterwards, but never climb again once it descended.
    pub fn valley_free(&self, tiers: &[&[&str]]) -> Regex {
        let tier_stars: Vec<Regex> = tiers
            .iter()
            .map(|tier| {
                Regex::star(Regex::union(tier.iter().map(|n| self.resolve(n))))
            })
            .collect();
        // ascend from the bottom tier to the top, then descend again
        let ascend = tier_stars.iter().rev().cloned();
        let descend = tier_stars.iter().skip(1).cloned();
        Regex::concat(ascend.chain(descend))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn topo() -> Topology {
        let mut t = Topology::new();
        let a = t.add_inside("A", false);
        let b = t.add_inside("B", true);
        let c = t.add_inside("C", false);
        t.add_outside("E");
        t.add_link(a, b);
        t.add_link(b, c);
        t
    }

    #[test]
    fn canonical_forms() {
        let t = topo();
        let reb = RegexBuilder::new(&t);
        let a = reb.loc("A");
        let b = reb.loc("B");

        // union is commutative and idempotent
        assert_eq!(
            Regex::union([a.clone(), b.clone()]),
            Regex::union([b.clone(), a.clone()])
        );
        assert_eq!(Regex::union([a.clone(), a.clone()]), a);

        // concat drops epsilon and annihilates on empty
        assert_eq!(Regex::concat([a.clone(), Regex::Epsilon]), a);
        assert_eq!(Regex::concat([a.clone(), Regex::Empty]), Regex::Empty);

        // double negation and nested stars collapse
        assert_eq!(Regex::negate(Regex::negate(a.clone())), a);
        assert_eq!(
            Regex::star(Regex::star(a.clone())),
            Regex::star(a.clone())
        );
    }

    #[test]
    fn reversal() {
        let t = topo();
        let reb = RegexBuilder::new(&t);
        let r = reb.path(&["A", "B", "C"]);
        assert_eq!(r.reverse(), reb.path(&["C", "B", "A"]));
        assert_eq!(r.reverse().reverse(), r);
    }

    #[test]
    fn derivatives() {
        let t = topo();
        let reb = RegexBuilder::new(&t);
        let a = t.lookup("A").unwrap();
        let b = t.lookup("B").unwrap();

        let r = reb.path(&["A", "B"]);
        let d = r.derivative(a);
        assert_eq!(d, reb.loc("B"));
        assert!(d.derivative(b).nullable());
        assert_eq!(r.derivative(b), Regex::Empty);

        // derivative of a star keeps looping
        let s = Regex::star(reb.inside());
        assert!(s.nullable());
        assert_eq!(s.derivative(a), s);
    }

    #[test]
    fn out_resolves_to_outside() {
        let t = topo();
        let reb = RegexBuilder::new(&t);
        assert_eq!(reb.loc("out"), reb.outside());
    }
}
