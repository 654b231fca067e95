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

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{FunctionActivation, LineGas, Scope, ScopeId, StepLocation};
use crate::{analysis::VariableRecord, error::QueryError};

/// Gas per `file -> 0-based line`.
pub type GasPerLine = BTreeMap<u32, BTreeMap<usize, LineGas>>;

/// The reconstructed call tree of one trace, with step-indexed annotations.
///
/// Produced by [`TreeBuilder`](crate::TreeBuilder) and immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTree {
    scopes: BTreeMap<ScopeId, Scope>,
    scope_starts: BTreeMap<usize, ScopeId>,
    activations: BTreeMap<ScopeId, FunctionActivation>,
    variables: BTreeMap<usize, (ScopeId, String)>,
    gas_per_line: GasPerLine,
    reduced_trace: Vec<usize>,
    locations: Vec<StepLocation>,
    step_count: usize,
}

impl CallTree {
    pub(crate) fn new(step_count: usize) -> Self {
        Self { step_count, ..Default::default() }
    }

    pub(crate) fn open_scope(&mut self, scope: Scope) {
        self.scope_starts.insert(scope.first_step, scope.id.clone());
        self.scopes.insert(scope.id.clone(), scope);
    }

    pub(crate) fn close_scope(&mut self, id: &ScopeId, last_step: usize) {
        if let Some(scope) = self.scopes.get_mut(id) {
            scope.last_step = Some(last_step);
        }
    }

    pub(crate) fn credit_gas(&mut self, id: &ScopeId, gas: u64) {
        if let Some(scope) = self.scopes.get_mut(id) {
            scope.gas_cost += gas;
        }
    }

    pub(crate) fn add_activation(&mut self, activation: FunctionActivation) {
        self.activations.insert(activation.scope.clone(), activation);
    }

    pub(crate) fn has_local(&self, id: &ScopeId, name: &str) -> bool {
        self.scopes.get(id).is_some_and(|scope| scope.locals.contains_key(name))
    }

    pub(crate) fn add_variable(&mut self, record: VariableRecord) {
        let Some(scope) = self.scopes.get_mut(&record.scope) else { return };
        if let Some(ast_id) = record.ast_id {
            self.variables.insert(ast_id, (record.scope.clone(), record.name.clone()));
        }
        scope.locals.insert(record.name.clone(), record);
    }

    pub(crate) fn add_line_gas(&mut self, file: u32, line: usize, step: usize, gas: u64) {
        let entry = self.gas_per_line.entry(file).or_default().entry(line).or_default();
        entry.gas_cost += gas;
        entry.steps.push(step);
    }

    pub(crate) fn add_breakpoint(&mut self, step: usize) {
        if self.reduced_trace.last() != Some(&step) {
            self.reduced_trace.push(step);
        }
    }

    pub(crate) fn push_location(&mut self, location: StepLocation) {
        self.locations.push(location);
    }

    /// Number of steps of the underlying trace.
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// The root scope `1`.
    pub fn root(&self) -> Option<&Scope> {
        self.scopes.get(&ScopeId::root())
    }

    /// Scope with id `id`.
    pub fn scope(&self, id: &ScopeId) -> Option<&Scope> {
        self.scopes.get(id)
    }

    /// All scopes in pre-order.
    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.values()
    }

    /// Map from the step a scope opened at to its id. When several scopes
    /// open at the same step the innermost is kept.
    pub fn scope_starts(&self) -> &BTreeMap<usize, ScopeId> {
        &self.scope_starts
    }

    /// Parent of scope `id`.
    pub fn parent_of(&self, id: &ScopeId) -> Option<&Scope> {
        self.scopes.get(&id.parent()?)
    }

    /// Direct children of scope `id`, in opening order.
    pub fn children_of<'a>(&'a self, id: &'a ScopeId) -> impl Iterator<Item = &'a Scope> + 'a {
        self.descendants(id).filter(move |scope| scope.id.depth() == id.depth() + 1)
    }

    fn descendants<'a>(&'a self, id: &'a ScopeId) -> impl Iterator<Item = &'a Scope> + 'a {
        self.scopes
            .range(id.clone()..)
            .skip(1)
            .take_while(move |(child, _)| id.is_ancestor_of(child))
            .map(|(_, scope)| scope)
    }

    /// Innermost scope active at `step`.
    ///
    /// Finds the latest scope opened at or before `step` and walks up its
    /// parents until one still covers the step.
    pub fn scope_at(&self, step: usize) -> Option<&Scope> {
        if step >= self.step_count {
            return None;
        }
        let (_, id) = self.scope_starts.range(..=step).next_back()?;
        let mut scope = self.scopes.get(id)?;
        while !scope.contains(step) {
            scope = self.parent_of(&scope.id)?;
        }
        Some(scope)
    }

    /// Function activations enclosing `step`, innermost first.
    pub fn call_stack_at(&self, step: usize) -> Vec<&FunctionActivation> {
        let mut stack = Vec::new();
        let mut current = self.scope_at(step).map(|scope| scope.id.clone());
        while let Some(id) = current {
            if let Some(activation) = self.activations.get(&id) {
                stack.push(activation);
            }
            current = id.parent();
        }
        stack
    }

    /// Function activation that opened scope `id`, if any.
    pub fn activation(&self, id: &ScopeId) -> Option<&FunctionActivation> {
        self.activations.get(id)
    }

    /// All function activations keyed by scope.
    pub fn activations(&self) -> &BTreeMap<ScopeId, FunctionActivation> {
        &self.activations
    }

    /// Gas and steps attributed to `line` (0-based) of `file`.
    pub fn gas_per_line(&self, file: u32, line: usize) -> Result<&LineGas, QueryError> {
        self.gas_per_line
            .get(&file)
            .and_then(|lines| lines.get(&line))
            .ok_or(QueryError::LineNotExecuted { file, line })
    }

    /// The whole gas-per-line index.
    pub fn gas_per_line_map(&self) -> &GasPerLine {
        &self.gas_per_line
    }

    /// Variable declared by AST node `id`.
    pub fn variable_by_id(&self, id: usize) -> Option<&VariableRecord> {
        let (scope, name) = self.variables.get(&id)?;
        self.scopes.get(scope)?.locals.get(name)
    }

    /// Variables visible at `step`: those of the innermost scope recorded at
    /// or before the step. Caller scopes are not lexically visible.
    pub fn locals_at(&self, step: usize) -> Vec<&VariableRecord> {
        let Some(scope) = self.scope_at(step) else { return Vec::new() };
        let mut locals: Vec<_> =
            scope.locals.values().filter(|var| var.declared_at <= step).collect();
        locals.sort_by_key(|var| (var.declared_at, var.stack_depth));
        locals
    }

    /// Gas of scope `id` and all its descendants.
    pub fn cumulative_gas(&self, id: &ScopeId) -> u64 {
        let own = self.scopes.get(id).map_or(0, |scope| scope.gas_cost);
        own + self.descendants(id).map(|scope| scope.gas_cost).sum::<u64>()
    }

    /// Gas credited over all scopes.
    pub fn total_gas(&self) -> u64 {
        self.scopes.values().map(|scope| scope.gas_cost).sum()
    }

    /// Location data of `step`.
    pub fn location_at(&self, step: usize) -> Option<&StepLocation> {
        self.locations.get(step)
    }

    /// Steps at which the active source range changes.
    pub fn reduced_trace(&self) -> &[usize] {
        &self.reduced_trace
    }

    /// First breakpoint of the reduced trace after `step`.
    pub fn next_breakpoint(&self, step: usize) -> Option<usize> {
        let i = self.reduced_trace.partition_point(|s| *s <= step);
        self.reduced_trace.get(i).copied()
    }

    /// Last breakpoint of the reduced trace before `step`.
    pub fn previous_breakpoint(&self, step: usize) -> Option<usize> {
        let i = self.reduced_trace.partition_point(|s| *s < step);
        i.checked_sub(1).map(|i| self.reduced_trace[i])
    }
}
