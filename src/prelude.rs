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

//! Re-export of the types needed for common usage of the compiler.

pub use crate::bdd::{Bdd, Predicate};
pub use crate::codegen::{Action, DeviceConfig, Export, Filter, Match, PeerSpec};
pub use crate::driver::{compile, Config, Constraint, Policy, PolicyPair, RouterConfig};
pub use crate::formatter::{fmt_config, ConfigFormatter};
pub use crate::regex::{Regex, RegexBuilder};
pub use crate::topology::{Location, LocationKind, Topology};
pub use crate::types::{Community, CompileError, LocationId, Settings};
