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

//! Driver-level behavior: fail-fast validation, trivial policies, joining, and the resilience
//! metric.

use pretty_assertions::assert_eq;
use test_log::test;

use super::{allows, run};
use crate::bdd::Bdd;
use crate::prelude::*;
use crate::regex::Regex;

/// A -- X -- B, with B originating.
fn chain() -> Topology {
    let mut t = Topology::new();
    let a = t.add_inside("A", false);
    let x = t.add_inside("X", false);
    let b = t.add_inside("B", true);
    t.add_link(a, x);
    t.add_link(x, b);
    t
}

#[test]
fn disconnected_topology_fails_fast() {
    let mut t = chain();
    t.add_inside("LONER", false);
    let errors = run(&t, &Settings::default(), |reb| {
        vec![reb.path(&["A", "X", "B"])]
    })
    .unwrap_err();
    assert_eq!(errors, vec![CompileError::DisconnectedTopology]);
}

#[test]
fn empty_preference_language_rejects_trivially() {
    let t = chain();
    let cfg = run(&t, &Settings::default(), |reb| {
        // the intersection of two different exact paths is empty
        vec![Regex::inter([
            reb.path(&["A", "X", "B"]),
            reb.path(&["X", "B"]),
        ])]
    })
    .unwrap();
    for router in ["A", "X", "B"] {
        assert_eq!(allows(&cfg, router).len(), 0, "at {router}");
        assert!(!cfg.routers[router]
            .actions
            .first()
            .map(|(_, dc)| dc.originates)
            .unwrap_or(false));
    }
}

#[test]
fn identical_prefix_groups_are_merged() {
    let t = chain();
    let mut bdd = Bdd::new();
    let p1 = bdd.prefix("10.0.0.0/8".parse().unwrap());
    let p2 = bdd.prefix("192.168.0.0/16".parse().unwrap());
    let policy = Policy {
        pairs: vec![
            PolicyPair::new(p1, &t, |reb| vec![reb.path(&["A", "X", "B"])]),
            PolicyPair::new(p2, &t, |reb| vec![reb.path(&["A", "X", "B"])]),
        ],
        constraints: vec![],
    };
    let cfg = compile(&t, &policy, &mut bdd, &Settings::default()).unwrap();

    // both prefixes compile to the same filters, so the rows merge into one
    let actions = &cfg.routers["X"].actions;
    assert_eq!(actions.len(), 1);
    let expected = bdd.or(p1, p2);
    assert_eq!(actions[0].0, expected);
}

#[test]
fn distinct_configs_stay_in_input_order() {
    let t = chain();
    let mut bdd = Bdd::new();
    let p1 = bdd.prefix("10.0.0.0/8".parse().unwrap());
    let p2 = bdd.prefix("192.168.0.0/16".parse().unwrap());
    let policy = Policy {
        pairs: vec![
            PolicyPair::new(p1, &t, |reb| vec![reb.path(&["A", "X", "B"])]),
            PolicyPair::new(p2, &t, |reb| vec![reb.path(&["X", "B"])]),
        ],
        constraints: vec![],
    };
    let cfg = compile(&t, &policy, &mut bdd, &Settings::default()).unwrap();

    let actions = &cfg.routers["X"].actions;
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].0, p1);
    assert_eq!(actions[1].0, p2);
    assert_ne!(actions[0].1, actions[1].1);
}

#[test]
fn aggregate_resilience_is_reported() {
    // two disjoint paths between the aggregation point A and the origin B
    let mut t = Topology::new();
    let a = t.add_inside("A", false);
    let x = t.add_inside("X", false);
    let y = t.add_inside("Y", false);
    let b = t.add_inside("B", true);
    t.add_link(a, x);
    t.add_link(a, y);
    t.add_link(x, b);
    t.add_link(y, b);

    let mut bdd = Bdd::new();
    let p = bdd.prefix("10.0.0.0/8".parse().unwrap());
    let policy = Policy {
        pairs: vec![PolicyPair::new(p, &t, |reb| {
            vec![
                Regex::union([reb.path(&["A", "X", "B"]), reb.path(&["A", "Y", "B"])]),
            ]
        })],
        constraints: vec![Constraint::Aggregate {
            prefix: "10.0.0.0/7".parse().unwrap(),
            from: vec!["A".to_string()],
            to: vec!["out".to_string()],
        }],
    };
    let cfg = compile(&t, &policy, &mut bdd, &Settings::default()).unwrap();

    assert_eq!(cfg.aggregate_resilience, Some(2));
    let control = &cfg.routers["A"].control;
    assert_eq!(
        control.aggregates,
        vec![("10.0.0.0/7".parse().unwrap(), vec!["out".to_string()])]
    );
}
