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

#![deny(missing_docs, missing_debug_implementations)]

//! # BgpC
//!
//! A compiler from high-level, regex-based routing policies to per-router BGP filter
//! configurations. The operator describes, per prefix, the paths traffic may take through the
//! network, ranked by preference; the compiler either emits a configuration whose runtime
//! behavior realizes that intent under every failure the policy admits, or rejects the policy
//! with a counter-example explaining why no such configuration exists.
//!
//! ## Pipeline
//!
//! For every policy pair, the compiler
//! 1. reverses each preference regex and determinizes it over the location alphabet
//!    ([`regex`], [`dfa`]),
//! 2. fuses the topology with the DFA tuple into the product graph ([`product`]),
//! 3. prunes nodes that never complete an accepted path ([`minimize`]),
//! 4. decides a per-router preference ordering, or rejects ([`ordering`]),
//! 5. classifies what each external peer may send in ([`incoming`]), and
//! 6. emits the per-router filter tables ([`codegen`]).
//!
//! The per-prefix pipelines run in parallel and are joined into the final configuration by the
//! [`driver`]. Prefix and community sets are represented by hash-consed BDDs ([`bdd`]).
//!
//! ## Example
//!
//! ```
//! use bgpc::prelude::*;
//!
//! let mut topo = Topology::new();
//! let a = topo.add_inside("A", false);
//! let x = topo.add_inside("X", false);
//! let b = topo.add_inside("B", true);
//! topo.add_link(a, x);
//! topo.add_link(x, b);
//!
//! let mut bdd = Bdd::new();
//! let prefix = bdd.prefix("10.0.0.0/8".parse().unwrap());
//!
//! let policy = Policy {
//!     pairs: vec![PolicyPair::new(prefix, &topo, |reb| {
//!         vec![reb.path(&["A", "X", "B"])]
//!     })],
//!     constraints: vec![],
//! };
//!
//! let config = compile(&topo, &policy, &mut bdd, &Settings::default()).unwrap();
//! assert!(config.routers["B"].actions[0].1.originates);
//! ```

pub mod bdd;
pub mod codegen;
pub mod dfa;
pub mod driver;
pub mod formatter;
pub mod incoming;
pub mod minimize;
pub mod ordering;
pub mod prefixes;
pub mod prelude;
pub mod product;
pub mod regex;
pub mod topology;
pub mod types;

#[cfg(test)]
mod test;

pub use driver::compile;
pub use types::{CompileError, Settings};
