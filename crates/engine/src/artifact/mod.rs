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

//! Compiled artifacts consumed by the reconstructor.
//!
//! A [`CompiledArtifact`] bundles what solc emits for one contract: its
//! sources with their ASTs, and the creation and deployed bytecode together
//! with source maps, function debug data and generated sources. Derived
//! structures (parsed source maps, pc maps, declaration and line indices)
//! are built lazily and cached inside the artifact.

mod bytecode;
pub use bytecode::*;

mod resolver;
pub use resolver::*;

mod source;
pub use source::*;

use alloy_json_abi::JsonAbi;
use eyre::{eyre, OptionExt, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{
    analysis::{FunctionDefinitionInfo, SourceRange, VariableDeclarationInfo},
    SourceLocation,
};

/// Compiler output for one contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledArtifact {
    /// Contract name
    pub contract_name: String,
    /// Contract ABI
    #[serde(default)]
    pub abi: JsonAbi,
    /// User sources of the compilation keyed by source id
    pub sources: BTreeMap<u32, SourceFile>,
    /// Creation (init) code
    pub creation: BytecodeArtifact,
    /// Runtime code
    pub deployed: BytecodeArtifact,
}

impl CompiledArtifact {
    /// Creates an artifact without sources.
    pub fn new(
        contract_name: impl Into<String>,
        creation: BytecodeArtifact,
        deployed: BytecodeArtifact,
    ) -> Self {
        Self { contract_name: contract_name.into(), creation, deployed, ..Default::default() }
    }

    /// Adds a user source.
    pub fn with_source(mut self, source: SourceFile) -> Self {
        self.sources.insert(source.id, source);
        self
    }

    /// Extracts one contract from solc standard-JSON input and output.
    ///
    /// Source contents come from the input (`sources.<path>.content`), ASTs
    /// and ids from the output.
    pub fn from_standard_json(
        input: &Value,
        output: &Value,
        contract_path: &str,
        contract_name: &str,
    ) -> Result<Self> {
        let contract = &output["contracts"][contract_path][contract_name];
        if contract.is_null() {
            return Err(eyre!("contract {contract_path}:{contract_name} not in compiler output"));
        }

        let bytecode = |key: &str| -> Result<BytecodeArtifact> {
            match &contract["evm"][key] {
                Value::Null => Ok(BytecodeArtifact::default()),
                value => Ok(serde_json::from_value(value.clone())?),
            }
        };

        let mut sources = BTreeMap::new();
        let output_sources = output["sources"].as_object().ok_or_eyre("no sources in output")?;
        for (path, source) in output_sources {
            let id = source["id"]
                .as_u64()
                .and_then(|id| u32::try_from(id).ok())
                .ok_or_else(|| eyre!("source {path} has no id"))?;
            let content = input["sources"][path]["content"].as_str().unwrap_or_default();
            sources.insert(id, SourceFile::new(id, path, content, source["ast"].clone()));
        }

        let abi = match &contract["abi"] {
            Value::Null => JsonAbi::default(),
            value => serde_json::from_value(value.clone())?,
        };

        Ok(Self {
            contract_name: contract_name.to_string(),
            abi,
            sources,
            creation: bytecode("bytecode")?,
            deployed: bytecode("deployedBytecode")?,
        })
    }

    /// Creation or runtime bytecode.
    pub fn bytecode(&self, is_creation: bool) -> &BytecodeArtifact {
        if is_creation {
            &self.creation
        } else {
            &self.deployed
        }
    }

    /// Number of user sources. File ids at or above it are not user code.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// User source with id `file`.
    pub fn source(&self, file: u32) -> Option<&SourceFile> {
        self.sources.get(&file)
    }

    /// Whether `location` points into debuggable source: a user source, or a
    /// generated source of `bytecode` when `include_generated` is set.
    pub fn is_valid_location(
        &self,
        location: &SourceLocation,
        bytecode: &BytecodeArtifact,
        include_generated: bool,
    ) -> bool {
        match location.file {
            Some(file) if (file as usize) < self.source_count() => true,
            Some(file) => include_generated && bytecode.generated_source(file).is_some(),
            None => false,
        }
    }

    /// Function definition with AST id `id`, searched across all sources.
    pub fn function_definition(&self, id: usize) -> Option<&FunctionDefinitionInfo> {
        self.sources.values().find_map(|source| source.declarations().function(id))
    }

    /// Innermost function definition enclosing `range`.
    pub fn function_containing(&self, range: &SourceRange) -> Option<&FunctionDefinitionInfo> {
        self.source(range.file)?.declarations().function_containing(range)
    }

    /// Local declarations that become active at exactly `range`.
    pub fn locals_at(&self, range: &SourceRange) -> &[VariableDeclarationInfo] {
        self.source(range.file).map(|source| source.declarations().locals_at(range)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundry_compilers::artifacts::GeneratedSource;
    use serde_json::json;

    #[test]
    fn test_from_standard_json() {
        let input = json!({
            "language": "Solidity",
            "sources": { "src/A.sol": { "content": "contract A {}\n" } }
        });
        let output = json!({
            "sources": { "src/A.sol": { "id": 0, "ast": { "nodeType": "SourceUnit", "src": "0:14:0", "nodes": [] } } },
            "contracts": { "src/A.sol": { "A": {
                "abi": [],
                "evm": {
                    "bytecode": { "object": "6080", "sourceMap": "0:14:0:-",
                                  "functionDebugData": {}, "generatedSources": [] },
                    "deployedBytecode": { "object": "5b00", "sourceMap": "0:14:0:-;;",
                                          "functionDebugData": { "@f_3": { "entryPoint": 1, "id": 3,
                                              "parameterSlots": 0, "returnSlots": 0 } } }
                }
            }}}
        });

        let artifact = CompiledArtifact::from_standard_json(&input, &output, "src/A.sol", "A").unwrap();
        assert_eq!(artifact.contract_name, "A");
        assert_eq!(artifact.source_count(), 1);
        assert_eq!(artifact.source(0).unwrap().content, "contract A {}\n");
        assert_eq!(artifact.creation.object.len(), 2);
        assert_eq!(artifact.deployed.user_function_at(1).and_then(|e| e.id), Some(3));

        assert!(CompiledArtifact::from_standard_json(&input, &output, "src/A.sol", "B").is_err());
    }

    #[test]
    fn test_location_validity() {
        let artifact = CompiledArtifact::default()
            .with_source(SourceFile::new(0, "A.sol", "", Value::Null))
            .with_source(SourceFile::new(1, "B.sol", "", Value::Null));
        let bytecode = BytecodeArtifact::default();

        assert!(artifact.is_valid_location(&SourceLocation::new(1, 0, 1), &bytecode, false));
        assert!(!artifact.is_valid_location(&SourceLocation::new(2, 0, 1), &bytecode, true));
        let generated = SourceLocation { file: None, ..Default::default() };
        assert!(!artifact.is_valid_location(&generated, &bytecode, true));

        let bytecode = BytecodeArtifact::default().with_generated_source(GeneratedSource {
            ast: Value::Null,
            contents: "{}\n".to_string(),
            id: 2,
            language: "Yul".to_string(),
            name: "#utility.yul".to_string(),
        });
        let utility = SourceLocation::new(2, 0, 1);
        assert!(artifact.is_valid_location(&utility, &bytecode, true));
        assert!(!artifact.is_valid_location(&utility, &bytecode, false));
    }
}
