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

//! Module containing all basic type definitions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use clap::Parser;
use petgraph::prelude::NodeIndex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) type IndexType = u32;
/// Location identification (and index into the topology graph)
pub type LocationId = NodeIndex<IndexType>;

/// Preference rank realized by an accepting product-graph node. Ranks are 1-based; lower is
/// better.
pub type Rank = usize;

/// A BGP community value attached to announcements, either the well-known `no-export` community
/// or a compiler-assigned state tag.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Community {
    /// The well-known `no-export` community.
    NoExport,
    /// A state tag assigned by the compiler. The value is the interned DFA state vector of the
    /// product-graph node that exported the announcement.
    Tag(u32),
}

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Community::NoExport => write!(f, "no-export"),
            Community::Tag(c) => write!(f, "100:{c}"),
        }
    }
}

/// Compiler settings, filled in by the surrounding shell.
///
/// The struct derives [`clap::Parser`] so that a command-line front end can expose the knobs
/// directly; the library itself never reads the command line.
#[derive(Debug, Clone, Default, Parser, Serialize, Deserialize)]
pub struct Settings {
    /// Allow the compiler to set MED values on exports towards external peers.
    #[clap(long = "med")]
    pub use_med: bool,
    /// Allow the compiler to prepend the AS path on exports towards external peers.
    #[clap(long = "prepending")]
    pub use_prepending: bool,
    /// Allow the compiler to attach the `no-export` community on exports towards external peers.
    #[clap(long = "no-export")]
    pub use_no_export: bool,
    /// Verify that traffic entering the network from each external peer can be restricted to the
    /// paths the policy admits.
    #[clap(long = "check-enter")]
    pub check_enter: bool,
    /// Directory into which intermediate compilation artifacts are dumped for debugging.
    #[clap(long = "debug-dir")]
    pub debug_dir: Option<PathBuf>,
}

/// Printable description of a product-graph node, used in counter-examples.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PgNodeDesc {
    /// Name of the router the node belongs to.
    pub router: String,
    /// Human-readable rendering of the DFA state vector.
    pub states: String,
    /// Preference rank realized by the node, if it is accepting.
    pub rank: Option<Rank>,
}

impl fmt::Display for PgNodeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rank {
            Some(r) => write!(f, "({}, {}, rank {})", self.router, self.states, r),
            None => write!(f, "({}, {})", self.router, self.states),
        }
    }
}

/// All fatal outcomes of a compilation.
///
/// Errors are returned across the public surface, never thrown. Recoverable local conditions (a
/// dead DFA state, a missing edge) are pruning events, not errors.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompileError {
    /// The inside subgraph of the topology is not weakly connected.
    #[error("The inside subgraph of the topology is not weakly connected.")]
    DisconnectedTopology,
    /// At least one router that ought to originate traffic has no accepted path in the product
    /// graph. The policy is unrealizable on this topology.
    #[error("No valid path exists for the following routers: {0:?}")]
    NoPathForRouters(BTreeSet<String>),
    /// No per-router total order on preferences satisfies both nodes consistently.
    #[error("Inconsistent preferences between {0} and {1}")]
    InconsistentPrefs(PgNodeDesc, PgNodeDesc),
    /// A preference regex produces no accepting product-graph node. Reserved: the compiler
    /// currently logs this condition instead of failing.
    #[error("The following preferences can never be realized: {0:?}")]
    UnusedPreferences(BTreeMap<Rank, String>),
    /// No combination of export actions can restrict inbound traffic to the desired set.
    #[error("Cannot control incoming traffic: {0}")]
    UncontrollableEnter(String),
    /// An inbound preference constraint requires MED or AS-path prepending, but both knobs are
    /// disabled.
    #[error("Cannot control the preference of peer {0} without MED or AS-path prepending.")]
    UncontrollablePeerPreference(String),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn community_display() {
        assert_eq!(Community::NoExport.to_string(), "no-export");
        assert_eq!(Community::Tag(17).to_string(), "100:17");
    }

    #[test]
    fn error_display() {
        let e = CompileError::UncontrollablePeerPreference("PeerA".to_string());
        assert!(e.to_string().contains("PeerA"));
    }
}
