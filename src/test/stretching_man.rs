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

//! A small WAN with two external peers: egress through AS Y is preferred over any other exit.

use pretty_assertions::assert_eq;
use test_log::test;

use super::{allows, local_pref, run};
use crate::prelude::*;
use crate::regex::Regex;

fn wan() -> Topology {
    let mut t = Topology::new();
    let a = t.add_inside("A", false);
    let b = t.add_inside("B", false);
    let c = t.add_inside("C", false);
    let y = t.add_outside("AS_Y");
    let z = t.add_outside("AS_Z");
    t.add_link(a, b);
    t.add_link(b, c);
    t.add_link(a, y);
    t.add_link(c, z);
    t
}

#[test]
fn stretching_man_1() {
    let t = wan();
    let cfg = run(&t, &Settings::default(), |reb| {
        vec![
            Regex::concat([reb.internal(), reb.loc("AS_Y")]),
            Regex::concat([reb.internal(), reb.loc("out")]),
        ]
    })
    .unwrap();

    // every inside router has a preferred exit over AS_Y and a fallback
    for router in ["A", "B", "C"] {
        let fs = allows(&cfg, router);
        let prefs: Vec<u32> = fs.iter().map(|f| local_pref(f)).collect();
        assert!(prefs.contains(&100), "no best route at {router}: {prefs:?}");
        assert!(prefs.contains(&99), "no fallback at {router}: {prefs:?}");
        // best first, never the other way around
        let mut sorted = prefs.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(prefs, sorted);
    }

    // A learns the preferred route directly from the peer
    let fs = allows(&cfg, "A");
    let y = t.lookup("AS_Y").unwrap();
    assert!(fs
        .iter()
        .any(|f| matches!(f, Filter::Allow { m: Match::Peer(l), local_pref: 100, .. } if *l == y)));
}
