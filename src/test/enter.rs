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

//! Control over traffic entering from external peers: classification, export tiering, and the
//! errors raised when the enabled knobs cannot realize the policy.

use pretty_assertions::assert_eq;
use test_log::test;

use super::run;
use crate::dfa::Dfa;
use crate::incoming::{plan, Entering};
use crate::minimize::minimize;
use crate::prelude::*;
use crate::product::ProductGraph;

/// Inside A -- B, with the peer P attached to both.
fn boundary_topo() -> Topology {
    let mut t = Topology::new();
    let a = t.add_inside("A", false);
    let b = t.add_inside("B", true);
    let p = t.add_outside("P");
    t.add_link(a, b);
    t.add_link(a, p);
    t.add_link(b, p);
    t
}

fn build_pg<F>(t: &Topology, prefs: F) -> ProductGraph
where
    F: FnOnce(&RegexBuilder<'_>) -> Vec<Regex>,
{
    let reb = RegexBuilder::new(t);
    let dfas: Vec<Dfa> = prefs(&reb)
        .into_iter()
        .map(|r| Dfa::build(r.reverse(), t))
        .collect();
    let mut pg = ProductGraph::build(t, &dfas);
    minimize(&mut pg, &dfas);
    pg
}

#[test]
fn classify_anything() {
    let t = boundary_topo();
    let pg = build_pg(&t, |reb| vec![reb.ends_at("B")]);
    let settings = Settings {
        check_enter: true,
        ..Default::default()
    };
    let p = t.lookup("P").unwrap();
    let plan = plan(&pg, &t, &settings).unwrap();
    assert_eq!(plan.entering[&p], Entering::Anything);
}

#[test]
fn classify_nothing() {
    let t = boundary_topo();
    // purely internal policy: the peer gets no export and must send nothing
    let pg = build_pg(&t, |reb| vec![reb.path(&["A", "B"])]);
    let settings = Settings {
        check_enter: true,
        ..Default::default()
    };
    let p = t.lookup("P").unwrap();
    let plan = plan(&pg, &t, &settings).unwrap();
    assert_eq!(plan.entering[&p], Entering::Nothing("P".to_string()));
    assert!(!plan.no_export_all);
}

#[test]
fn uncontrollable_enter() {
    let t = boundary_topo();
    // entering is allowed at A only, which exports alone cannot enforce
    let settings = Settings {
        check_enter: true,
        ..Default::default()
    };
    let errors = run(&t, &settings, |reb| vec![reb.path(&["P", "A", "B"])]).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], CompileError::UncontrollableEnter(_)));
}

/// Inside A and X both attached to the origin B and to the peer P.
fn tier_topo() -> Topology {
    let mut t = Topology::new();
    let a = t.add_inside("A", false);
    let x = t.add_inside("X", false);
    let b = t.add_inside("B", true);
    let p = t.add_outside("P");
    t.add_link(a, b);
    t.add_link(x, b);
    t.add_link(a, p);
    t.add_link(x, p);
    t
}

#[test]
fn peer_preference_needs_a_knob() {
    let t = tier_topo();
    let prefs = |reb: &RegexBuilder<'_>| {
        vec![reb.path(&["P", "A", "B"]), reb.path(&["P", "X", "B"])]
    };

    // both knobs disabled: the peer cannot be told which entry to prefer
    let errors = run(&t, &Settings::default(), prefs).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0],
        CompileError::UncontrollablePeerPreference("P".to_string())
    );

    // with MED enabled, the exports carry the tier
    let settings = Settings {
        use_med: true,
        ..Default::default()
    };
    let cfg = run(&t, &settings, prefs).unwrap();
    let meds: Vec<u32> = ["A", "X"]
        .iter()
        .flat_map(|r| super::allows(&cfg, r))
        .flat_map(|f| match f {
            Filter::Allow { exports, .. } => exports.clone(),
            Filter::Deny => vec![],
        })
        .flat_map(|e| e.actions)
        .filter_map(|a| match a {
            Action::SetMed(m) => Some(m),
            _ => None,
        })
        .collect();
    assert_eq!(meds, vec![81, 82]);
}
