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

//! Error types of the reconstructor.
//!
//! [`BuildError`] aborts a build and always carries the step that triggered
//! it. [`QueryError`] is returned by lookups on a finished tree and never
//! invalidates it.

use alloy_primitives::Address;
use thiserror::Error;

/// Failure to map a program counter to a source location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// The source map string could not be parsed.
    #[error("malformed source map: {0}")]
    SourceMap(String),
    /// The program counter does not start an instruction of the bytecode.
    #[error("pc {0} is not an instruction boundary")]
    InvalidPc(usize),
    /// The source map has fewer entries than the bytecode has instructions.
    #[error("instruction {ic} is beyond the source map ({len} entries)")]
    InstructionOutOfRange {
        /// Instruction counter that was looked up
        ic: usize,
        /// Number of source map entries
        len: usize,
    },
}

/// Fatal errors that abort a build.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The source location of a step could not be resolved.
    #[error("unresolvable source location at step {step} in {address}: {source}")]
    UnresolvableLocation {
        /// Offending step
        step: usize,
        /// Code address running at that step
        address: Address,
        /// Underlying lookup failure
        #[source]
        source: LocationError,
    },
    /// An address reached during the trace has no compiled artifact.
    #[error("no compiled artifact for {address} reached at step {step}")]
    MissingArtifact {
        /// Step at which the address was entered
        step: usize,
        /// Address without artifact
        address: Address,
    },
    /// The artifact resolver itself failed.
    #[error("artifact lookup for {address} failed at step {step}: {reason}")]
    Resolver {
        /// Step at which the lookup happened
        step: usize,
        /// Address being resolved
        address: Address,
        /// Resolver error
        reason: eyre::Report,
    },
    /// A trace-context query (code address, stack) failed.
    #[error("trace context query failed at step {step}: {reason}")]
    Context {
        /// Step being queried
        step: usize,
        /// Context error
        reason: eyre::Report,
    },
    /// More scopes were nested than the configured limit allows.
    #[error("scope nesting exceeded {limit} frames at step {step}")]
    RecursionLimitExceeded {
        /// Step that tried to open one scope too many
        step: usize,
        /// Configured frame limit
        limit: usize,
    },
}

impl BuildError {
    /// The step index the error is attributed to.
    pub fn step(&self) -> usize {
        match self {
            Self::UnresolvableLocation { step, .. }
            | Self::MissingArtifact { step, .. }
            | Self::Resolver { step, .. }
            | Self::Context { step, .. }
            | Self::RecursionLimitExceeded { step, .. } => *step,
        }
    }
}

/// Recoverable lookup failures on a finished tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// No step executed the requested line.
    #[error("line {line} of file {file} was never executed")]
    LineNotExecuted {
        /// Source file id
        file: u32,
        /// 0-based line
        line: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_attribution() {
        let err = BuildError::RecursionLimitExceeded { step: 42, limit: 8 };
        assert_eq!(err.step(), 42);
        assert_eq!(err.to_string(), "scope nesting exceeded 8 frames at step 42");

        let err = BuildError::UnresolvableLocation {
            step: 3,
            address: Address::ZERO,
            source: LocationError::InvalidPc(9),
        };
        assert_eq!(err.step(), 3);
        assert!(err.to_string().contains("pc 9 is not an instruction boundary"));
    }
}
