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

//! # Prefix arithmetic
//!
//! Conversions between address ranges, CIDR prefix lists, and BDD predicates, plus the scope
//! compaction used when rendering per-router prefix lists. The vendor-facing prefix-list
//! generators consume these through the interfaces below.

use ipnet::Ipv4Net;
use itertools::Itertools;

use crate::bdd::{Bdd, Predicate};

/// An inclusive range of 32-bit addresses.
pub type AddrRange = (u32, u32);

/// Convert an inclusive address range into the minimal list of CIDR prefixes covering it, in
/// ascending address order.
pub fn range_to_prefixes((lo, hi): AddrRange) -> Vec<Ipv4Net> {
    debug_assert!(lo <= hi);
    let mut out = Vec::new();
    let mut cur = lo;
    loop {
        // the largest aligned block starting at cur that does not overshoot hi
        let align = if cur == 0 { 32 } else { cur.trailing_zeros() };
        let span_log = if cur == 0 && hi == u32::MAX {
            32 // the span would overflow u32
        } else {
            31 - (hi - cur + 1).leading_zeros()
        };
        let size_log = align.min(span_log);
        out.push(Ipv4Net::new(cur.into(), (32 - size_log) as u8).unwrap());
        if size_log == 32 {
            return out;
        }
        match cur.checked_add(1u32 << size_log) {
            Some(next) if next <= hi => cur = next,
            _ => return out,
        }
    }
}

/// Convert a list of prefixes into a predicate by disjoining their encodings.
pub fn prefixes_to_predicate(bdd: &mut Bdd, nets: &[Ipv4Net]) -> Predicate {
    let mut acc = Predicate::FALSE;
    for net in nets {
        let p = bdd.prefix(*net);
        acc = bdd.or(acc, p);
    }
    acc
}

/// Recover the address ranges covered by a predicate built from prefix encodings. Community and
/// slash variables are ignored; overlapping and adjacent ranges are coalesced.
pub fn predicate_to_ranges(bdd: &Bdd, p: Predicate) -> Vec<AddrRange> {
    let mut ranges = Vec::new();
    for path in bdd.sat_paths(p) {
        let mut lo = 0u32;
        let mut mask = 0u32; // bits that are fixed by the path
        for (var, value) in path {
            let name = bdd.var_name(var);
            if let Some(bit) = name.strip_prefix('p').and_then(|i| i.parse::<u8>().ok()) {
                mask |= 1 << (31 - bit);
                if value {
                    lo |= 1 << (31 - bit);
                }
            }
        }
        ranges.push((lo, lo | !mask));
    }
    coalesce(ranges)
}

/// Sort ranges and merge overlapping or adjacent ones.
pub fn coalesce(mut ranges: Vec<AddrRange>) -> Vec<AddrRange> {
    ranges.sort_unstable();
    let mut out: Vec<AddrRange> = Vec::new();
    for (lo, hi) in ranges {
        match out.last_mut() {
            Some((_, prev_hi)) if *prev_hi >= hi => {}
            Some((_, prev_hi)) if lo <= prev_hi.saturating_add(1) => *prev_hi = hi,
            _ => out.push((lo, hi)),
        }
    }
    out
}

/// One row of a compacted prefix list: an optional prefix test (`None` matches anything) and
/// whether matching prefixes are part of the scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeRow {
    /// The prefix to test, or `None` for the catch-all row.
    pub prefix: Option<Ipv4Net>,
    /// Whether a matching prefix belongs to the scope.
    pub allow: bool,
}

/// Merge two prefix scopes into one.
pub fn combine(s1: &[Ipv4Net], s2: &[Ipv4Net]) -> Vec<Ipv4Net> {
    s1.iter().chain(s2.iter()).copied().sorted().dedup().collect()
}

/// Compact a prefix scope into an ordered, disjoint test list. Prefixes covered by an earlier,
/// shorter prefix of the same scope are dropped; the final row is always the catch-all, so the
/// list is total.
pub fn compact(scope: &[Ipv4Net]) -> Vec<ScopeRow> {
    let nets: Vec<Ipv4Net> = scope
        .iter()
        .copied()
        .sorted_by_key(|n| (n.prefix_len(), n.network()))
        .dedup()
        .collect();
    let mut rows: Vec<ScopeRow> = Vec::new();
    for net in nets {
        let covered = rows
            .iter()
            .any(|r| r.prefix.map(|p| p.contains(&net)).unwrap_or(false));
        if !covered {
            rows.push(ScopeRow {
                prefix: Some(net),
                allow: true,
            });
        }
    }
    rows.push(ScopeRow {
        prefix: None,
        allow: false,
    });
    rows
}
