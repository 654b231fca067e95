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

use alloy_primitives::Address;
use revm::bytecode::OpCode;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// One executed instruction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    /// Position of this step in the trace
    pub index: usize,
    /// Call depth, 0 for the outermost frame
    pub depth: usize,
    /// Gas remaining before the instruction runs
    pub gas: u64,
    /// Gas charged for the instruction, when the tracer reported it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_cost: Option<u64>,
    /// Raw opcode byte
    pub opcode: u8,
    /// Program counter
    pub pc: usize,
}

impl TraceStep {
    /// Decoded opcode, `None` for unassigned bytes.
    pub fn op(&self) -> Option<OpCode> {
        OpCode::new(self.opcode)
    }
}

/// The code executing at a given step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeAddress {
    /// Address whose bytecode runs (the code address, not the storage context)
    pub address: Address,
    /// Whether the running code is creation (init) code
    pub is_creation: bool,
}

impl CodeAddress {
    /// Runtime code at `address`.
    pub fn runtime(address: Address) -> Self {
        Self { address, is_creation: false }
    }

    /// Creation code deploying to `address`.
    pub fn creation(address: Address) -> Self {
        Self { address, is_creation: true }
    }
}

/// Ordered, immutable list of executed steps indexed `0..N-1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace {
    inner: Vec<TraceStep>,
}

impl Deref for Trace {
    type Target = Vec<TraceStep>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Trace {
    /// Create a new empty trace
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step, overwriting its index with its position.
    pub fn push(&mut self, mut step: TraceStep) {
        step.index = self.inner.len();
        self.inner.push(step);
    }

    /// Parse a trace from its JSON array form.
    pub fn from_json(json: &str) -> eyre::Result<Self> {
        let steps: Vec<TraceStep> = serde_json::from_str(json)?;
        Ok(steps.into_iter().collect())
    }

    /// Gas charged by step `index`.
    ///
    /// An explicit `gas_cost` wins. Otherwise the cost is the gas difference to
    /// the following step when both run in the same frame; across a frame
    /// transition (or on the last step) the difference includes the callee's
    /// consumption or refund, so the step is charged nothing.
    pub fn gas_cost_at(&self, index: usize) -> u64 {
        let Some(step) = self.inner.get(index) else {
            return 0;
        };
        if let Some(cost) = step.gas_cost {
            return cost;
        }
        match self.inner.get(index + 1) {
            Some(next) if next.depth == step.depth => step.gas.saturating_sub(next.gas),
            _ => 0,
        }
    }

    /// Sum of [`Self::gas_cost_at`] over the whole trace.
    pub fn total_gas_cost(&self) -> u64 {
        (0..self.inner.len()).map(|i| self.gas_cost_at(i)).sum()
    }

    /// Prefix of this trace containing the first `len` steps.
    pub fn truncated(&self, len: usize) -> Self {
        Self { inner: self.inner.iter().take(len).copied().collect() }
    }
}

impl FromIterator<TraceStep> for Trace {
    fn from_iter<I: IntoIterator<Item = TraceStep>>(iter: I) -> Self {
        let mut trace = Self::new();
        for step in iter {
            trace.push(step);
        }
        trace
    }
}

impl<'a> IntoIterator for &'a Trace {
    type Item = &'a TraceStep;
    type IntoIter = std::slice::Iter<'a, TraceStep>;
    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}
