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

//! Access to the trace being reconstructed.

use alloy_primitives::U256;
use calltree_common::{CodeAddress, Trace};
use eyre::{eyre, Result};
use std::collections::BTreeMap;

/// Per-step views of one recorded transaction.
pub trait TraceContext {
    /// The step list.
    fn trace(&self) -> &Trace;

    /// Code executing at `step`.
    fn code_address_at(&self, step: usize) -> Result<CodeAddress>;

    /// EVM stack before `step` runs, bottom first.
    fn stack_at(&self, step: usize) -> Result<&[U256]>;
}

/// A fully recorded trace held in memory.
///
/// Code addresses are stored as change points: the code registered at step
/// `s` runs until the next registered step.
#[derive(Debug, Clone, Default)]
pub struct RecordedTrace {
    trace: Trace,
    code: BTreeMap<usize, CodeAddress>,
    stacks: Vec<Vec<U256>>,
}

impl RecordedTrace {
    /// Wraps `trace`, running `entry` from step 0 with empty stacks.
    pub fn new(trace: Trace, entry: CodeAddress) -> Self {
        let stacks = vec![Vec::new(); trace.len()];
        Self { trace, code: BTreeMap::from([(0, entry)]), stacks }
    }

    /// Code `code` runs from `step` on.
    pub fn with_code_from(mut self, step: usize, code: CodeAddress) -> Self {
        self.code.insert(step, code);
        self
    }

    /// Stack snapshot before `step`; ignored for steps past the end.
    pub fn with_stack(mut self, step: usize, stack: Vec<U256>) -> Self {
        if let Some(slot) = self.stacks.get_mut(step) {
            *slot = stack;
        }
        self
    }

    /// Same stack length `len` (zero-filled) for every step in `steps`.
    pub fn with_stack_len(mut self, steps: impl IntoIterator<Item = usize>, len: usize) -> Self {
        for step in steps {
            self = self.with_stack(step, vec![U256::ZERO; len]);
        }
        self
    }

    /// Prefix of the first `len` steps.
    pub fn truncated(&self, len: usize) -> Self {
        Self {
            trace: self.trace.truncated(len),
            code: self.code.range(..len.max(1)).map(|(s, c)| (*s, *c)).collect(),
            stacks: self.stacks.iter().take(len).cloned().collect(),
        }
    }
}

impl TraceContext for RecordedTrace {
    fn trace(&self) -> &Trace {
        &self.trace
    }

    fn code_address_at(&self, step: usize) -> Result<CodeAddress> {
        if step >= self.trace.len() {
            return Err(eyre!("step {step} is beyond the trace ({} steps)", self.trace.len()));
        }
        self.code
            .range(..=step)
            .next_back()
            .map(|(_, code)| *code)
            .ok_or_else(|| eyre!("no code registered before step {step}"))
    }

    fn stack_at(&self, step: usize) -> Result<&[U256]> {
        self.stacks
            .get(step)
            .map(Vec::as_slice)
            .ok_or_else(|| eyre!("no stack recorded for step {step}"))
    }
}
