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
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::trace;

use super::SourceRange;

/// Kind of a `FunctionDefinition` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FunctionKind {
    /// Regular (contract or free) function
    Function,
    /// Contract constructor
    Constructor,
    /// Fallback function
    Fallback,
    /// Receive function
    Receive,
}

impl FunctionKind {
    fn from_ast(kind: &str) -> Self {
        match kind {
            "constructor" => Self::Constructor,
            "fallback" => Self::Fallback,
            "receive" => Self::Receive,
            _ => Self::Function,
        }
    }
}

/// A `VariableDeclaration` node reduced to what the resolver needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDeclarationInfo {
    /// AST node id
    pub id: usize,
    /// Declared name, empty for unnamed parameters
    pub name: String,
    /// Source range of the declaration
    pub src: SourceRange,
    /// `typeDescriptions.typeString`
    pub type_string: String,
    /// Explicit data location, `None` for `default`
    pub storage_location: Option<String>,
}

impl VariableDeclarationInfo {
    fn from_node(node: &Value) -> Option<Self> {
        let id = node_id(node)?;
        let src = node_src(node)?;
        let type_string = node["typeDescriptions"]["typeString"]
            .as_str()
            .or_else(|| node["typeName"]["typeDescriptions"]["typeString"].as_str())
            .unwrap_or_default()
            .to_string();
        let storage_location = node["storageLocation"]
            .as_str()
            .filter(|loc| *loc != "default")
            .map(str::to_string);
        Some(Self {
            id,
            name: node["name"].as_str().unwrap_or_default().to_string(),
            src,
            type_string,
            storage_location,
        })
    }
}

/// A `FunctionDefinition` node with its parameter lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDefinitionInfo {
    /// AST node id, as referenced by function debug data
    pub id: usize,
    /// Function name, empty for constructors, fallback and receive
    pub name: String,
    /// Function kind
    pub kind: FunctionKind,
    /// Source range of the whole definition
    pub src: SourceRange,
    /// Input parameters in declaration order
    pub parameters: Vec<VariableDeclarationInfo>,
    /// Return parameters in declaration order
    pub return_parameters: Vec<VariableDeclarationInfo>,
}

impl FunctionDefinitionInfo {
    fn from_node(node: &Value) -> Option<Self> {
        let params = |key: &str| -> Vec<VariableDeclarationInfo> {
            node[key]["parameters"]
                .as_array()
                .map(|ps| ps.iter().filter_map(VariableDeclarationInfo::from_node).collect())
                .unwrap_or_default()
        };
        Some(Self {
            id: node_id(node)?,
            name: node["name"].as_str().unwrap_or_default().to_string(),
            kind: FunctionKind::from_ast(node["kind"].as_str().unwrap_or("function")),
            src: node_src(node)?,
            parameters: params("parameters"),
            return_parameters: params("returnParameters"),
        })
    }

    /// Human readable name used in activation records.
    pub fn display_name(&self) -> String {
        match self.kind {
            FunctionKind::Function => self.name.clone(),
            FunctionKind::Constructor => "constructor".to_string(),
            FunctionKind::Fallback => "fallback".to_string(),
            FunctionKind::Receive => "receive".to_string(),
        }
    }

    /// Whether this definition is a constructor.
    pub fn is_constructor(&self) -> bool {
        self.kind == FunctionKind::Constructor
    }
}

fn node_id(node: &Value) -> Option<usize> {
    node["id"].as_u64().and_then(|id| usize::try_from(id).ok())
}

fn node_src(node: &Value) -> Option<SourceRange> {
    node["src"].as_str()?.parse().ok()
}

/// Function and local-variable declarations of one source file.
///
/// Locals are keyed by the exact source range the source map reports when
/// the declaration executes: the declaration's own `src`, and for
/// `VariableDeclarationStatement`s with an initializer also the
/// initializer's `src`. Parameters and state variables are not locals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarationIndex {
    functions: BTreeMap<usize, FunctionDefinitionInfo>,
    locals: HashMap<SourceRange, Vec<VariableDeclarationInfo>>,
}

impl DeclarationIndex {
    /// Index a solc JSON AST (`SourceUnit`).
    ///
    /// Nodes that lack an id or a parsable `src` are ignored. Inline assembly
    /// is not descended into.
    pub fn from_ast(ast: &Value) -> Self {
        let mut index = Self::default();
        let mut parameters = HashSet::new();
        let mut stack = vec![ast];

        while let Some(node) = stack.pop() {
            match node {
                Value::Array(items) => stack.extend(items.iter().rev()),
                Value::Object(map) => {
                    match map.get("nodeType").and_then(Value::as_str) {
                        Some("InlineAssembly") => continue,
                        Some(kind) if kind.starts_with("Yul") => continue,
                        Some("FunctionDefinition") => index.add_function(node, &mut parameters),
                        Some("VariableDeclaration") => index.add_local(node, None, &parameters),
                        Some("VariableDeclarationStatement") => {
                            if let Some(init) = node_src(&node["initialValue"]) {
                                for decl in node["declarations"].as_array().into_iter().flatten() {
                                    index.add_local(decl, Some(init), &parameters);
                                }
                            }
                        }
                        _ => {}
                    }
                    stack.extend(map.values().rev());
                }
                _ => {}
            }
        }

        trace!(functions = index.functions.len(), ranges = index.locals.len(), "indexed AST");
        index
    }

    fn add_function(&mut self, node: &Value, parameters: &mut HashSet<usize>) {
        let Some(function) = FunctionDefinitionInfo::from_node(node) else { return };
        parameters.extend(function.parameters.iter().map(|p| p.id));
        parameters.extend(function.return_parameters.iter().map(|p| p.id));
        self.functions.insert(function.id, function);
    }

    fn add_local(&mut self, node: &Value, key: Option<SourceRange>, parameters: &HashSet<usize>) {
        if node["stateVariable"].as_bool() == Some(true) {
            return;
        }
        let Some(decl) = VariableDeclarationInfo::from_node(node) else { return };
        if parameters.contains(&decl.id) {
            return;
        }
        let entry = self.locals.entry(key.unwrap_or(decl.src)).or_default();
        if !entry.iter().any(|d| d.id == decl.id) {
            entry.push(decl);
        }
    }

    /// Function definition with AST id `id`.
    pub fn function(&self, id: usize) -> Option<&FunctionDefinitionInfo> {
        self.functions.get(&id)
    }

    /// All function definitions ordered by id.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDefinitionInfo> {
        self.functions.values()
    }

    /// Innermost function definition whose source range contains `range`.
    pub fn function_containing(&self, range: &SourceRange) -> Option<&FunctionDefinitionInfo> {
        self.functions.values().filter(|f| f.src.contains(range)).min_by_key(|f| f.src.length)
    }

    /// Local declarations that become active at exactly `range`.
    pub fn locals_at(&self, range: &SourceRange) -> &[VariableDeclarationInfo] {
        self.locals.get(range).map(Vec::as_slice).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn var(id: usize, name: &str, src: &str, ty: &str, loc: &str) -> Value {
        json!({
            "id": id, "nodeType": "VariableDeclaration", "name": name, "src": src,
            "stateVariable": false, "storageLocation": loc,
            "typeDescriptions": { "typeString": ty }
        })
    }

    fn sample_ast() -> Value {
        json!({
            "id": 100, "nodeType": "SourceUnit", "src": "0:400:0",
            "nodes": [{
                "id": 99, "nodeType": "ContractDefinition", "src": "0:400:0",
                "nodes": [
                    { "id": 1, "nodeType": "VariableDeclaration", "name": "total", "src": "20:12:0",
                      "stateVariable": true, "storageLocation": "default",
                      "typeDescriptions": { "typeString": "uint256" } },
                    {
                        "id": 10, "nodeType": "FunctionDefinition", "kind": "function",
                        "name": "add", "src": "40:200:0",
                        "parameters": { "nodeType": "ParameterList", "parameters": [
                            var(11, "a", "53:9:0", "uint256", "default"),
                            var(12, "", "64:7:0", "uint256", "default")
                        ]},
                        "returnParameters": { "nodeType": "ParameterList", "parameters": [
                            var(13, "sum", "90:11:0", "uint256", "default")
                        ]},
                        "body": { "nodeType": "Block", "src": "102:130:0", "statements": [
                            {
                                "id": 20, "nodeType": "VariableDeclarationStatement", "src": "110:20:0",
                                "declarations": [ var(21, "tmp", "110:11:0", "uint256", "default"), null ],
                                "initialValue": { "nodeType": "Identifier", "src": "124:5:0" }
                            },
                            { "nodeType": "InlineAssembly", "src": "140:40:0", "AST": {
                                "nodeType": "YulBlock", "statements": [
                                    { "nodeType": "YulVariableDeclaration", "src": "150:10:0" }
                                ]
                            }}
                        ]}
                    },
                    {
                        "id": 30, "nodeType": "FunctionDefinition", "kind": "constructor",
                        "name": "", "src": "250:100:0",
                        "parameters": { "nodeType": "ParameterList", "parameters": [] },
                        "returnParameters": { "nodeType": "ParameterList", "parameters": [] },
                        "body": { "nodeType": "Block", "src": "270:80:0", "statements": [] }
                    }
                ]
            }]
        })
    }

    #[test]
    fn test_functions_are_indexed() {
        let index = DeclarationIndex::from_ast(&sample_ast());
        let add = index.function(10).unwrap();
        assert_eq!(add.name, "add");
        assert_eq!(add.parameters.len(), 2);
        assert_eq!(add.parameters[1].name, "");
        assert_eq!(add.return_parameters[0].name, "sum");

        let ctor = index.function(30).unwrap();
        assert!(ctor.is_constructor());
        assert_eq!(ctor.display_name(), "constructor");
        assert_eq!(index.functions().count(), 2);
    }

    #[test]
    fn test_locals_keyed_by_declaration_and_initializer() {
        let index = DeclarationIndex::from_ast(&sample_ast());
        let by_decl = index.locals_at(&"110:11:0".parse().unwrap());
        assert_eq!(by_decl.len(), 1);
        assert_eq!(by_decl[0].name, "tmp");
        let by_init = index.locals_at(&"124:5:0".parse().unwrap());
        assert_eq!(by_init, by_decl);

        // parameters and state variables are not locals
        assert!(index.locals_at(&"53:9:0".parse().unwrap()).is_empty());
        assert!(index.locals_at(&"20:12:0".parse().unwrap()).is_empty());
        // inline assembly is skipped
        assert!(index.locals_at(&"150:10:0".parse().unwrap()).is_empty());
    }

    #[test]
    fn test_innermost_function() {
        let index = DeclarationIndex::from_ast(&sample_ast());
        let inside = SourceRange::new(0, 115, 3);
        assert_eq!(index.function_containing(&inside).map(|f| f.id), Some(10));
        let in_ctor = SourceRange::new(0, 280, 3);
        assert_eq!(index.function_containing(&in_ctor).map(|f| f.id), Some(30));
        assert!(index.function_containing(&SourceRange::new(0, 5, 2)).is_none());
    }
}
