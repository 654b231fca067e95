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

use alloy_primitives::{map::rustc_hash::FxHashMap, Bytes};
use foundry_compilers::artifacts::{
    sourcemap::{self, SourceElement},
    FunctionDebugData, GeneratedSource,
};
use itertools::Itertools;
use once_cell::sync::OnceCell;
use revm::bytecode::opcode::{PUSH1, PUSH32};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{error::LocationError, source::LineIndex, JumpKind, SourceLocation};

/// Maps from program counter to instruction counter.
///
/// Source maps are indexed by instruction, so the immediates of `PUSHn`
/// have to be skipped when counting.
#[derive(Debug, Clone, Default)]
pub struct PcIcMap {
    inner: FxHashMap<usize, usize>,
}

impl PcIcMap {
    /// Creates a new `PcIcMap` for the given code.
    pub fn new(code: &[u8]) -> Self {
        let mut inner = FxHashMap::default();
        let mut pc = 0;
        let mut ic = 0;
        while let Some(&op) = code.get(pc) {
            inner.insert(pc, ic);
            let immediate = if (PUSH1..=PUSH32).contains(&op) { (op - PUSH1 + 1) as usize } else { 0 };
            pc += 1 + immediate;
            ic += 1;
        }
        Self { inner }
    }

    /// Returns the instruction counter for the given program counter.
    pub fn get(&self, pc: usize) -> Option<usize> {
        self.inner.get(&pc).copied()
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the code is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// One row of the function entry-point table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    /// Program counter of the first instruction
    pub entry_point: usize,
    /// AST id of the definition; `None` for compiler utility functions
    pub id: Option<usize>,
    /// Key in `functionDebugData` (e.g. `@transfer_123`)
    pub name: String,
}

/// Creation or deployed bytecode with its debug information, in the shape of
/// solc's `evm.bytecode` / `evm.deployedBytecode` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BytecodeArtifact {
    /// Raw bytecode
    #[serde(default)]
    pub object: Bytes,
    /// Compressed solc source map
    #[serde(default)]
    pub source_map: String,
    /// Function entry points keyed by internal function name
    #[serde(default)]
    pub function_debug_data: BTreeMap<String, FunctionDebugData>,
    /// Compiler-generated (Yul) sources referenced by the source map
    #[serde(default)]
    pub generated_sources: Vec<GeneratedSource>,

    #[serde(skip)]
    parsed_source_map: OnceCell<Result<Vec<SourceElement>, LocationError>>,
    #[serde(skip)]
    pc_ic_map: OnceCell<PcIcMap>,
    #[serde(skip)]
    entries: OnceCell<Vec<FunctionEntry>>,
    #[serde(skip)]
    generated_lines: OnceCell<BTreeMap<u32, LineIndex>>,
}

impl BytecodeArtifact {
    /// Creates a bytecode artifact without debug data.
    pub fn new(object: impl Into<Bytes>, source_map: impl Into<String>) -> Self {
        Self { object: object.into(), source_map: source_map.into(), ..Default::default() }
    }

    /// Adds a `functionDebugData` row.
    pub fn with_function(mut self, name: &str, entry_point: u32, id: Option<u32>) -> Self {
        self.function_debug_data.insert(
            name.to_string(),
            FunctionDebugData {
                entry_point: Some(entry_point),
                id,
                parameter_slots: None,
                return_slots: None,
            },
        );
        self
    }

    /// Adds a generated source.
    pub fn with_generated_source(mut self, source: GeneratedSource) -> Self {
        self.generated_sources.push(source);
        self
    }

    /// The decompressed source map, parsed on first use.
    pub fn source_map(&self) -> Result<&[SourceElement], LocationError> {
        self.parsed_source_map
            .get_or_init(|| {
                sourcemap::parse(&self.source_map)
                    .map_err(|e| LocationError::SourceMap(e.to_string()))
            })
            .as_deref()
            .map_err(Clone::clone)
    }

    /// Program counter to instruction counter map of `object`.
    pub fn pc_ic_map(&self) -> &PcIcMap {
        self.pc_ic_map.get_or_init(|| PcIcMap::new(&self.object))
    }

    /// Raw source location of the instruction at `pc`.
    pub fn locate(&self, pc: usize) -> Result<SourceLocation, LocationError> {
        let ic = self.pc_ic_map().get(pc).ok_or(LocationError::InvalidPc(pc))?;
        let map = self.source_map()?;
        let element = map
            .get(ic)
            .ok_or(LocationError::InstructionOutOfRange { ic, len: map.len() })?;
        Ok(SourceLocation {
            file: element.index(),
            start: element.offset() as usize,
            length: element.length() as usize,
            jump: JumpKind::from(element.jump()),
        })
    }

    /// Entry-point table sorted by program counter.
    pub fn function_entries(&self) -> &[FunctionEntry] {
        self.entries.get_or_init(|| {
            self.function_debug_data
                .iter()
                .filter_map(|(name, data)| {
                    Some(FunctionEntry {
                        entry_point: data.entry_point? as usize,
                        id: data.id.map(|id| id as usize),
                        name: name.clone(),
                    })
                })
                .sorted_by_key(|entry| entry.entry_point)
                .collect()
        })
    }

    /// The entry whose range contains `pc`: the greatest entry point `<= pc`.
    pub fn function_at(&self, pc: usize) -> Option<&FunctionEntry> {
        let entries = self.function_entries();
        let after = entries.partition_point(|entry| entry.entry_point <= pc);
        after.checked_sub(1).map(|i| &entries[i])
    }

    /// Like [`Self::function_at`], but only for functions that map to source.
    pub fn user_function_at(&self, pc: usize) -> Option<&FunctionEntry> {
        self.function_at(pc).filter(|entry| entry.id.is_some())
    }

    /// Generated source with id `file`.
    pub fn generated_source(&self, file: u32) -> Option<&GeneratedSource> {
        self.generated_sources.iter().find(|source| source.id == file)
    }

    /// Line index of the generated source `file`.
    pub fn generated_line_index(&self, file: u32) -> Option<&LineIndex> {
        self.generated_lines
            .get_or_init(|| {
                self.generated_sources
                    .iter()
                    .map(|source| (source.id, LineIndex::new(&source.contents)))
                    .collect()
            })
            .get(&file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::hex;

    #[test]
    fn test_pc_ic_map_skips_push_data() {
        // PUSH1 0x80 PUSH2 0x0102 JUMPDEST STOP
        let code = hex!("60806101025b00");
        let map = PcIcMap::new(&code);
        assert_eq!(map.len(), 4);
        assert_eq!(map.get(0), Some(0));
        assert_eq!(map.get(1), None);
        assert_eq!(map.get(2), Some(1));
        assert_eq!(map.get(5), Some(2));
        assert_eq!(map.get(6), Some(3));
    }

    #[test]
    fn test_locate_through_source_map() {
        let bytecode = BytecodeArtifact::new(hex!("60805b56"), "0:10:0:-;12:4::i;20:2:-1:o");
        let loc = bytecode.locate(0).unwrap();
        assert_eq!((loc.file, loc.start, loc.length), (Some(0), 0, 10));
        let loc = bytecode.locate(2).unwrap();
        assert_eq!((loc.file, loc.start, loc.length, loc.jump), (Some(0), 12, 4, JumpKind::In));
        let loc = bytecode.locate(3).unwrap();
        assert_eq!((loc.file, loc.start, loc.jump), (None, 20, JumpKind::Out));

        assert_eq!(bytecode.locate(1), Err(LocationError::InvalidPc(1)));
    }

    #[test]
    fn test_short_source_map() {
        let bytecode = BytecodeArtifact::new(hex!("5b5b5b"), "0:1:0");
        assert_eq!(
            bytecode.locate(2),
            Err(LocationError::InstructionOutOfRange { ic: 2, len: 1 })
        );
    }

    #[test]
    fn test_function_lookup() {
        let bytecode = BytecodeArtifact::new(hex!("5b"), "")
            .with_function("@f_10", 12, Some(10))
            .with_function("abi_decode", 40, None)
            .with_function("@g_20", 30, Some(20));

        assert!(bytecode.function_at(11).is_none());
        assert_eq!(bytecode.function_at(12).and_then(|e| e.id), Some(10));
        assert_eq!(bytecode.function_at(29).and_then(|e| e.id), Some(10));
        assert_eq!(bytecode.function_at(35).and_then(|e| e.id), Some(20));
        // utility functions end the previous range but never match
        assert_eq!(bytecode.function_at(41).map(|e| e.name.as_str()), Some("abi_decode"));
        assert!(bytecode.user_function_at(41).is_none());
    }
}
