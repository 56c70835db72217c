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

//! The diamond: two ways from N to the origin B (over Y or over Z), and two ways from A to N
//! (directly or over X).

use pretty_assertions::assert_eq;
use test_log::test;

use super::{allows, match_peer, run};
use crate::prelude::*;
use crate::regex::Regex;

fn diamond() -> Topology {
    let mut t = Topology::new();
    let a = t.add_inside("A", false);
    let x = t.add_inside("X", false);
    let n = t.add_inside("N", false);
    let y = t.add_inside("Y", false);
    let z = t.add_inside("Z", false);
    let b = t.add_inside("B", true);
    t.add_link(a, x);
    t.add_link(x, n);
    t.add_link(a, n);
    t.add_link(n, y);
    t.add_link(n, z);
    t.add_link(y, b);
    t.add_link(z, b);
    t
}

#[test]
fn diamond_1() {
    let t = diamond();
    let cfg = run(&t, &Settings::default(), |reb| {
        vec![reb.path(&["A", "X", "N", "Y", "B"])]
    })
    .unwrap();

    // B originates; every router on the path receives from its path neighbor
    assert!(cfg.routers["B"].actions[0].1.originates);
    for (router, from) in [("Y", "B"), ("N", "Y"), ("X", "N"), ("A", "X")] {
        let fs = allows(&cfg, router);
        assert_eq!(fs.len(), 1, "unexpected filters at {router}");
        assert_eq!(match_peer(fs[0], &t).as_deref(), Some(from));
    }
    // Z carries no traffic for this prefix
    assert_eq!(allows(&cfg, "Z").len(), 0);
}

#[test]
fn diamond_2() {
    let t = diamond();
    let errors = run(&t, &Settings::default(), |reb| {
        vec![
            reb.path(&["A", "X", "N", "Y", "B"]),
            Regex::concat([
                reb.loc("A"),
                Regex::star(reb.inside()),
                reb.loc("N"),
                reb.loc("Z"),
                reb.loc("B"),
            ]),
        ]
    })
    .unwrap_err();

    // no per-router ordering serves both the relayed and the direct receivers
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], CompileError::InconsistentPrefs(_, _)));
}
