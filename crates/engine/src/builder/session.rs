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
use calltree_common::{CodeAddress, OpcodeTr};
use std::{
    collections::{HashMap, HashSet},
    iter,
    sync::Arc,
};
use tracing::{debug, trace, warn};

use crate::{
    analysis::{include_variable_declarations, register_parameters, FunctionDefinitionInfo},
    error::BuildError,
    source::{locate_valid, LineColumnConverter},
    ArtifactResolver, BuilderConfig, CallTree, CompiledArtifact, FunctionActivation, JumpKind,
    Scope, ScopeId, ScopeKind, SourceLocation, StepLocation, TraceContext,
};

/// State of one open scope.
#[derive(Debug, Clone)]
struct Frame {
    scope: ScopeId,
    kind: ScopeKind,
    /// Ordinal of the last child opened under this scope
    next_child: u32,
    /// Source range the reduced trace currently stays in
    tracked: Option<SourceLocation>,
    previous_valid: Option<SourceLocation>,
    /// AST id of the function this scope activates
    function: Option<usize>,
}

impl Frame {
    fn new(scope: ScopeId, kind: ScopeKind, previous_valid: Option<SourceLocation>) -> Self {
        Self { scope, kind, next_child: 0, tracked: None, previous_valid, function: None }
    }
}

/// Open frames. The root frame is held apart so it can never be popped.
#[derive(Debug)]
struct FrameStack {
    root: Frame,
    nested: Vec<Frame>,
}

impl FrameStack {
    fn top(&self) -> &Frame {
        self.nested.last().unwrap_or(&self.root)
    }

    fn top_mut(&mut self) -> &mut Frame {
        match self.nested.last_mut() {
            Some(frame) => frame,
            None => &mut self.root,
        }
    }

    fn len(&self) -> usize {
        self.nested.len() + 1
    }

    fn push(&mut self, frame: Frame) {
        self.nested.push(frame);
    }

    fn pop(&mut self) -> Option<Frame> {
        self.nested.pop()
    }

    /// Frames from the innermost outwards, root last.
    fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.nested.iter().rev().chain(iter::once(&self.root))
    }
}

/// A constructor whose body was reached; its scope opens at `at`.
#[derive(Debug, Clone, Copy)]
struct PendingConstructor {
    at: usize,
    function: usize,
    code: CodeAddress,
}

/// What the pass does after a step.
enum Advance {
    Next(usize),
    /// Process the same step again inside a just-opened constructor scope
    Replay(usize),
}

/// Mutable state of one forward pass over a trace.
pub(crate) struct BuildSession<'a, T, R> {
    ctx: &'a T,
    resolver: &'a R,
    config: &'a BuilderConfig,
    converter: Option<&'a dyn LineColumnConverter>,
    artifacts: HashMap<Address, Arc<CompiledArtifact>>,
    frames: FrameStack,
    tree: CallTree,
    pending_constructor: Option<PendingConstructor>,
    started_constructors: HashSet<(Address, usize)>,
    discovered: HashSet<(Address, usize)>,
}

impl<'a, T, R> BuildSession<'a, T, R>
where
    T: TraceContext + Sync,
    R: ArtifactResolver + Sync,
{
    pub(crate) fn new(
        ctx: &'a T,
        resolver: &'a R,
        config: &'a BuilderConfig,
        converter: Option<&'a dyn LineColumnConverter>,
        root: CodeAddress,
        root_artifact: Arc<CompiledArtifact>,
    ) -> Self {
        let mut tree = CallTree::new(ctx.trace().len());
        tree.open_scope(Scope::new(ScopeId::root(), ScopeKind::Root, root, 0));
        Self {
            ctx,
            resolver,
            config,
            converter,
            artifacts: HashMap::from([(root.address, root_artifact)]),
            frames: FrameStack {
                root: Frame::new(ScopeId::root(), ScopeKind::Root, None),
                nested: Vec::new(),
            },
            tree,
            pending_constructor: None,
            started_constructors: HashSet::new(),
            discovered: HashSet::new(),
        }
    }

    /// Runs the pass to the end of the trace.
    pub(crate) async fn run(mut self) -> Result<CallTree, BuildError> {
        let len = self.ctx.trace().len();
        let mut step = 0;
        let mut replay = false;
        while step < len {
            match self.step(step, replay).await? {
                Advance::Next(next) => {
                    step = next;
                    replay = false;
                }
                Advance::Replay(same) => {
                    step = same;
                    replay = true;
                }
            }
        }

        let last = len.saturating_sub(1);
        for frame in self.frames.iter() {
            self.tree.close_scope(&frame.scope, last);
        }
        Ok(self.tree)
    }

    async fn step(&mut self, step: usize, replay: bool) -> Result<Advance, BuildError> {
        let ctx = self.ctx;
        let trace = ctx.trace();
        let current = trace[step];
        let next = trace.get(step + 1).copied();
        let code = self.code_at(step)?;
        let artifact = self.artifact(step, code.address).await?;
        let bytecode = artifact.bytecode(code.is_creation);

        // Source locations
        let raw = match self.tree.location_at(step) {
            Some(memo) => memo.raw,
            None => bytecode.locate(current.pc).map_err(|source| {
                BuildError::UnresolvableLocation { step, address: code.address, source }
            })?,
        };
        let raw_is_valid =
            artifact.is_valid_location(&raw, bytecode, self.config.debug_generated_sources);
        let previous_valid = self.frames.top().previous_valid;
        let valid = locate_valid(raw, raw_is_valid, previous_valid.as_ref());
        let valid_is_valid = raw_is_valid || previous_valid.is_some();
        if raw_is_valid {
            self.frames.top_mut().previous_valid = Some(raw);
        }
        if !replay {
            let line_column = self
                .converter
                .filter(|_| valid_is_valid)
                .and_then(|converter| converter.offset_to_line_column(&valid, &artifact, bytecode));
            self.tree.push_location(StepLocation {
                code,
                opcode: current.opcode,
                raw,
                valid,
                line_column,
            });
        }

        // Function entry detection; a return jump never enters the function it lands in
        let mut entry = None;
        if let Some(found) = bytecode.user_function_at(current.pc) {
            if let Some(id) = found.id {
                let first_seen = self.discovered.insert((code.address, id));
                if first_seen {
                    debug!(step, function = %found.name, address = %code.address, "discovered function");
                }
                let replaying_self = replay && self.frames.top().function == Some(id);
                let returning = raw.jump == JumpKind::Out;
                if (current.pc == found.entry_point || !self.function_active(id))
                    && !replaying_self
                    && !returning
                {
                    entry = Some((id, first_seen));
                }
            }
        }

        // Reduced trace
        let frame = self.frames.top_mut();
        if !frame.tracked.is_some_and(|tracked| tracked.includes(&raw)) {
            frame.tracked = Some(raw);
            self.tree.add_breakpoint(step);
        }

        // Gas
        let gas = if replay { 0 } else { trace.gas_cost_at(step) };
        if !replay && self.config.track_gas_per_line {
            if let Some((file, line_column)) = self
                .tree
                .location_at(step)
                .filter(|_| valid_is_valid)
                .and_then(|memo| Some((memo.valid.file?, memo.line_column?)))
            {
                self.tree.add_line_gas(file, line_column.start.line, step, gas);
            }
        }

        if !replay {
            self.arm_constructor(step, code, &artifact, &raw, raw_is_valid);

            if let Some(pending) = self.pending_constructor.take_if(|p| p.at <= step) {
                let definition = (pending.at == step && pending.code == code)
                    .then(|| artifact.function_definition(pending.function))
                    .flatten();
                match definition {
                    Some(definition) => {
                        self.started_constructors.insert((code.address, definition.id));
                        self.open_function_scope(step, code, definition, ScopeKind::Constructor)?;
                        self.tree.credit_gas(&self.frames.top().scope, gas);
                        return Ok(Advance::Replay(step));
                    }
                    None => debug!(step, "dropping constructor entry armed for another frame"),
                }
            }
        }

        // External calls and creations open at the first step of the callee
        let deeper = next.is_some_and(|next| next.depth > current.depth);
        if current.opcode.opens_frame() && deeper {
            self.tree.credit_gas(&self.frames.top().scope, gas);
            let callee = self.code_at(step + 1)?;
            let kind =
                if current.opcode.is_create() { ScopeKind::Creation } else { ScopeKind::ExternalCall };
            self.open_scope(step, step + 1, kind, callee, None)?;
            return Ok(Advance::Next(step + 1));
        }

        let mut opened = false;
        if let Some((id, first_seen)) = entry {
            match artifact.function_definition(id) {
                Some(definition) if definition.is_constructor() => {}
                Some(definition) => {
                    self.open_function_scope(step, code, definition, ScopeKind::InternalFunction)?;
                    opened = true;
                }
                None if first_seen => {
                    warn!(step, function = id, "function debug data refers to an unknown AST node")
                }
                None => {}
            }
        }

        self.tree.credit_gas(&self.frames.top().scope, gas);

        match next {
            Some(next) if next.depth < current.depth => {
                self.close_frames(step);
                return Ok(Advance::Next(step + 1));
            }
            Some(next) if next.depth > current.depth => {
                let callee = self.code_at(step + 1)?;
                warn!(step, opcode = current.opcode, "call depth increased without a call instruction");
                let kind =
                    if callee.is_creation { ScopeKind::Creation } else { ScopeKind::ExternalCall };
                self.open_scope(step, step + 1, kind, callee, None)?;
                return Ok(Advance::Next(step + 1));
            }
            _ => {}
        }

        if opened {
            return Ok(Advance::Next(step + 1));
        }

        if raw.jump == JumpKind::Out {
            let top = self.frames.top();
            if top.kind == ScopeKind::InternalFunction && top.function.is_some() {
                self.close_internal(step);
                return Ok(Advance::Next(step + 1));
            }
        }

        if self.config.include_locals && raw_is_valid {
            self.include_locals(step, &artifact, &raw)?;
        }

        Ok(Advance::Next(step + 1))
    }

    /// Arms the constructor whose body `raw` lies in, one step ahead.
    fn arm_constructor(
        &mut self,
        step: usize,
        code: CodeAddress,
        artifact: &CompiledArtifact,
        raw: &SourceLocation,
        raw_is_valid: bool,
    ) {
        if !code.is_creation || !raw_is_valid || self.pending_constructor.is_some() {
            return;
        }
        let Some(constructor) = raw
            .range()
            .and_then(|range| artifact.function_containing(&range))
            .filter(|definition| definition.is_constructor())
        else {
            return;
        };
        if self.started_constructors.contains(&(code.address, constructor.id)) {
            return;
        }
        trace!(step, constructor = constructor.id, "constructor body reached");
        self.pending_constructor =
            Some(PendingConstructor { at: step + 1, function: constructor.id, code });
    }

    /// Whether function `id` is active in the current external frame.
    fn function_active(&self, id: usize) -> bool {
        for frame in self.frames.iter() {
            if frame.function == Some(id) {
                return true;
            }
            if frame.kind.is_frame() {
                return false;
            }
        }
        false
    }

    fn open_scope(
        &mut self,
        step: usize,
        first_step: usize,
        kind: ScopeKind,
        code: CodeAddress,
        function: Option<usize>,
    ) -> Result<ScopeId, BuildError> {
        if self.frames.len() >= self.config.max_scope_depth {
            return Err(BuildError::RecursionLimitExceeded {
                step,
                limit: self.config.max_scope_depth,
            });
        }

        let parent = self.frames.top_mut();
        parent.next_child += 1;
        let id = parent.scope.child(parent.next_child);
        let inherited = parent.previous_valid;

        debug!(scope = %id, ?kind, first_step, address = %code.address, "open scope");
        self.tree.open_scope(Scope::new(id.clone(), kind, code, first_step));
        self.frames.push(Frame { function, ..Frame::new(id.clone(), kind, inherited) });
        Ok(id)
    }

    fn open_function_scope(
        &mut self,
        step: usize,
        code: CodeAddress,
        definition: &FunctionDefinitionInfo,
        kind: ScopeKind,
    ) -> Result<(), BuildError> {
        let scope = self.open_scope(step, step, kind, code, Some(definition.id))?;
        let stack_len = self.stack_len(step)?;
        let registration = register_parameters(definition, stack_len, step, &scope);
        for record in registration.records {
            trace!(step, scope = %scope, name = %record.name, depth = record.stack_depth, "parameter");
            self.tree.add_variable(record);
        }
        self.tree.add_activation(FunctionActivation {
            function_id: definition.id,
            name: definition.display_name(),
            inputs: registration.inputs,
            outputs: registration.outputs,
            scope,
            entry_step: step,
            is_constructor: kind == ScopeKind::Constructor,
        });
        Ok(())
    }

    /// Closes frames up to and including the innermost call frame.
    fn close_frames(&mut self, step: usize) {
        while let Some(frame) = self.frames.pop() {
            debug!(scope = %frame.scope, last_step = step, "close scope");
            self.tree.close_scope(&frame.scope, step);
            if frame.kind.is_frame() {
                return;
            }
        }
        warn!(step, "call depth decreased below the root frame");
    }

    /// Closes the current internal function frame on its return jump.
    fn close_internal(&mut self, step: usize) {
        let Some(frame) = self.frames.pop() else { return };
        debug!(scope = %frame.scope, last_step = step, "return from function");
        self.tree.close_scope(&frame.scope, step);
        if frame.previous_valid.is_some() {
            self.frames.top_mut().previous_valid = frame.previous_valid;
        }
    }

    fn include_locals(
        &mut self,
        step: usize,
        artifact: &CompiledArtifact,
        raw: &SourceLocation,
    ) -> Result<(), BuildError> {
        let Some(range) = raw.range() else { return Ok(()) };
        let declarations = artifact.locals_at(&range);
        if declarations.is_empty() {
            return Ok(());
        }
        let scope = self.frames.top().scope.clone();
        let stack_len = self.stack_len(step)?;
        let records = include_variable_declarations(
            declarations,
            |name| self.tree.has_local(&scope, name),
            stack_len,
            step,
            &scope,
        );
        for record in records {
            trace!(step, scope = %scope, name = %record.name, depth = record.stack_depth, "local");
            self.tree.add_variable(record);
        }
        Ok(())
    }

    fn code_at(&self, step: usize) -> Result<CodeAddress, BuildError> {
        self.ctx.code_address_at(step).map_err(|reason| BuildError::Context { step, reason })
    }

    fn stack_len(&self, step: usize) -> Result<usize, BuildError> {
        self.ctx
            .stack_at(step)
            .map(|stack| stack.len())
            .map_err(|reason| BuildError::Context { step, reason })
    }

    async fn artifact(
        &mut self,
        step: usize,
        address: Address,
    ) -> Result<Arc<CompiledArtifact>, BuildError> {
        if let Some(artifact) = self.artifacts.get(&address) {
            return Ok(artifact.clone());
        }
        let artifact = self
            .resolver
            .compiled_artifact(address)
            .await
            .map_err(|reason| BuildError::Resolver { step, address, reason })?
            .ok_or(BuildError::MissingArtifact { step, address })?;
        debug!(step, %address, contract = %artifact.contract_name, "loaded artifact");
        self.artifacts.insert(address, artifact.clone());
        Ok(artifact)
    }
}
