// EDB - Ethereum Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Source-level call tree reconstruction for EVM execution traces.
//!
//! Given a step-by-step trace and the compiler artifacts of the contracts it
//! runs through, the [`TreeBuilder`] recovers which Solidity function was
//! active at every step, the scopes those activations form, the variables
//! visible in each scope, and gas attributed per scope and per source line.

pub mod analysis;
pub use analysis::*;

pub mod artifact;
pub use artifact::*;

pub mod builder;
pub use builder::*;

pub mod config;
pub use config::*;

pub mod context;
pub use context::*;

pub mod error;
pub use error::*;

pub mod source;
pub use source::*;

pub mod tree;
pub use tree::*;
