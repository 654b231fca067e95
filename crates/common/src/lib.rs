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

//! Shared pieces of the call-tree reconstructor.
//!
//! This crate holds the step-indexed trace model consumed by the engine, a
//! small opcode classification trait on top of revm's [`OpCode`](revm::bytecode::OpCode),
//! and the logging setup used by binaries and tests alike.

/// Logging setup and utilities for consistent logging across components
pub mod logging;
/// Opcode classification used to detect frame transitions
pub mod opcode;
/// Trace data model
pub mod types;

pub use logging::*;
pub use opcode::*;
pub use types::*;
