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

//! # BDD predicate engine
//!
//! Hash-consed binary decision diagrams representing sets of (prefix, community) pairs.
//! Handles are signed integers: negating a handle complements the predicate in O(1). The table
//! stores only canonical positive nodes, with the then-edge always uncomplemented.
//!
//! Three variable families are used, ordered lexicographically by name:
//! - `p00..p31`: the 32 address bits of a prefix, most significant first,
//! - `s00..s31`: one-hot encoded slash length (`s{k}` set means a `/k+1` prefix),
//! - `c<name>`: community variables.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::Community;

/// Handle of a predicate in a [`Bdd`] engine. Only meaningful together with the engine that
/// created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Predicate(i32);

impl Predicate {
    /// The predicate matching everything.
    pub const TRUE: Predicate = Predicate(1);
    /// The predicate matching nothing.
    pub const FALSE: Predicate = Predicate(-1);

    /// Complement the predicate. This is free: only the sign of the handle flips.
    pub fn not(self) -> Predicate {
        Predicate(-self.0)
    }

    /// Returns `true` if this is the constant-true predicate.
    pub fn is_true(self) -> bool {
        self == Self::TRUE
    }

    /// Returns `true` if this is the constant-false predicate.
    pub fn is_false(self) -> bool {
        self == Self::FALSE
    }
}

/// Identifier of a BDD variable.
pub type Var = u32;

/// A canonical BDD node. `lo` is followed when the variable is false, `hi` when it is true; `hi`
/// is never complemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Node {
    var: Var,
    lo: i32,
    hi: i32,
}

/// The hash-consing BDD engine.
///
/// The engine is not thread safe; either guard it with a mutex or give each worker its own
/// engine. The per-prefix compilation pipeline never touches it, so the driver keeps a single
/// engine for the sequential join phase.
#[derive(Debug, Default)]
pub struct Bdd {
    nodes: Vec<Node>,
    table: HashMap<Node, i32>,
    and_cache: HashMap<(i32, i32), i32>,
    vars: Vec<String>,
    var_ids: HashMap<String, Var>,
}

impl Bdd {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of canonical nodes allocated so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no node was allocated yet.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get or create the variable with the given name.
    pub fn var_id(&mut self, name: &str) -> Var {
        match self.var_ids.get(name) {
            Some(v) => *v,
            None => {
                let v = self.vars.len() as Var;
                self.vars.push(name.to_string());
                self.var_ids.insert(name.to_string(), v);
                v
            }
        }
    }

    /// The name of a variable.
    pub fn var_name(&self, v: Var) -> &str {
        &self.vars[v as usize]
    }

    /// Variable order: lexicographic on the name.
    fn before(&self, a: Var, b: Var) -> bool {
        self.vars[a as usize] < self.vars[b as usize]
    }

    fn node(&self, h: i32) -> Node {
        debug_assert!(h.unsigned_abs() >= 2);
        self.nodes[(h.unsigned_abs() - 2) as usize]
    }

    /// Top variable of a handle, or `None` for a terminal.
    fn top(&self, h: i32) -> Option<Var> {
        if h.unsigned_abs() < 2 {
            None
        } else {
            Some(self.node(h).var)
        }
    }

    /// Cofactors of `h` with respect to `v`. If `v` is not the top variable of `h`, both
    /// cofactors are `h` itself.
    fn cofactors(&self, h: i32, v: Var) -> (i32, i32) {
        match self.top(h) {
            Some(var) if var == v => {
                let n = self.node(h);
                if h < 0 {
                    (-n.lo, -n.hi)
                } else {
                    (n.lo, n.hi)
                }
            }
            _ => (h, h),
        }
    }

    /// Get or create the canonical node `ITE(var, hi, lo)`.
    fn mk(&mut self, var: Var, lo: i32, hi: i32) -> i32 {
        if lo == hi {
            return lo;
        }
        // keep the then-edge uncomplemented
        if hi < 0 {
            return -self.mk(var, -lo, -hi);
        }
        let n = Node { var, lo, hi };
        match self.table.get(&n) {
            Some(h) => *h,
            None => {
                let h = self.nodes.len() as i32 + 2;
                self.nodes.push(n);
                self.table.insert(n, h);
                h
            }
        }
    }

    /// A predicate that is true iff the named variable is true.
    pub fn var(&mut self, name: &str) -> Predicate {
        let v = self.var_id(name);
        Predicate(self.mk(v, -1, 1))
    }

    fn and_raw(&mut self, f: i32, g: i32) -> i32 {
        if f == g {
            return f;
        }
        if f == -g || f == -1 || g == -1 {
            return -1;
        }
        if f == 1 {
            return g;
        }
        if g == 1 {
            return f;
        }
        let key = if f < g { (f, g) } else { (g, f) };
        if let Some(h) = self.and_cache.get(&key) {
            return *h;
        }
        let (fv, gv) = (self.top(f).unwrap(), self.top(g).unwrap());
        let v = if self.before(gv, fv) { gv } else { fv };
        let (f_lo, f_hi) = self.cofactors(f, v);
        let (g_lo, g_hi) = self.cofactors(g, v);
        let lo = self.and_raw(f_lo, g_lo);
        let hi = self.and_raw(f_hi, g_hi);
        let h = self.mk(v, lo, hi);
        self.and_cache.insert(key, h);
        h
    }

    /// Conjunction of two predicates.
    pub fn and(&mut self, a: Predicate, b: Predicate) -> Predicate {
        Predicate(self.and_raw(a.0, b.0))
    }

    /// Disjunction, derived by De Morgan.
    pub fn or(&mut self, a: Predicate, b: Predicate) -> Predicate {
        Predicate(-self.and_raw(-a.0, -b.0))
    }

    /// Decide implication: `a => b` iff `a && !b` is unsatisfiable.
    pub fn implies(&mut self, a: Predicate, b: Predicate) -> bool {
        self.and_raw(a.0, -b.0) == -1
    }

    /// Enumerate all satisfying paths of a predicate. Each path lists the variables it fixes;
    /// variables absent from a path are free.
    pub fn sat_paths(&self, p: Predicate) -> Vec<Vec<(Var, bool)>> {
        let mut out = Vec::new();
        let mut acc = Vec::new();
        self.sat_paths_rec(p.0, &mut acc, &mut out);
        out
    }

    fn sat_paths_rec(&self, h: i32, acc: &mut Vec<(Var, bool)>, out: &mut Vec<Vec<(Var, bool)>>) {
        if h == -1 {
            return;
        }
        if h == 1 {
            out.push(acc.clone());
            return;
        }
        let n = self.node(h);
        let (lo, hi) = if h < 0 { (-n.lo, -n.hi) } else { (n.lo, n.hi) };
        acc.push((n.var, false));
        self.sat_paths_rec(lo, acc, out);
        acc.pop();
        acc.push((n.var, true));
        self.sat_paths_rec(hi, acc, out);
        acc.pop();
    }

    // ------------------------------------------------------------------------------------------
    // Prefix and community encoding
    // ------------------------------------------------------------------------------------------

    /// The predicate constraining address bit `i` (msb = 0) to `value`.
    fn addr_bit(&mut self, i: u8, value: bool) -> Predicate {
        let p = self.var(&format!("p{i:02}"));
        if value {
            p
        } else {
            p.not()
        }
    }

    /// The one-hot row asserting the slash length is exactly `len`. Lengths `1..=32` set the bit
    /// `s{len-1}`; the length 0 (the default route) leaves every slash bit refuted.
    fn slash_is(&mut self, len: u8) -> Predicate {
        assert!(len <= 32, "slash length out of range: {len}");
        let mut acc = Predicate::TRUE;
        for k in 0u8..32 {
            let s = self.var(&format!("s{k:02}"));
            let lit = if k + 1 == len { s } else { s.not() };
            acc = self.and(acc, lit);
        }
        acc
    }

    /// Encode a concrete prefix `a.b.c.d/k`: the first `k` address bits are constrained, the
    /// rest are free, and the slash length is exactly `k`.
    pub fn prefix(&mut self, net: ipnet::Ipv4Net) -> Predicate {
        self.prefix_ranged(net, net.prefix_len(), net.prefix_len())
    }

    /// Encode a prefix with a ranged slash length: the address bits of `net` are constrained,
    /// and the slash length may be anything in `[lo..hi]` (inclusive).
    pub fn prefix_ranged(&mut self, net: ipnet::Ipv4Net, lo: u8, hi: u8) -> Predicate {
        debug_assert!(lo <= hi);
        let addr: u32 = net.addr().into();
        let mut acc = Predicate::TRUE;
        for i in 0..net.prefix_len() {
            let bit = (addr >> (31 - i)) & 1 == 1;
            let lit = self.addr_bit(i, bit);
            acc = self.and(acc, lit);
        }
        let mut slash = Predicate::FALSE;
        for j in lo..=hi {
            let row = self.slash_is(j);
            slash = self.or(slash, row);
        }
        self.and(acc, slash)
    }

    /// Encode a community: the predicate is true iff the community is attached.
    pub fn community(&mut self, c: Community) -> Predicate {
        self.var(&format!("c{c}"))
    }
}
