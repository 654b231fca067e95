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

use alloy_dyn_abi::DynSolType;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    analysis::{FunctionDefinitionInfo, SourceRange, VariableDeclarationInfo},
    ScopeId,
};

/// Where a variable's value (or the data its stack slot points to) lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataLocation {
    /// Contract storage
    Storage,
    /// Memory
    Memory,
    /// Call data
    Calldata,
    /// Transient storage
    Transient,
    /// The stack slot itself
    Stack,
}

impl DataLocation {
    /// Parses a `storageLocation` keyword; `default` and unknown words yield `None`.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "storage" => Some(Self::Storage),
            "memory" => Some(Self::Memory),
            "calldata" => Some(Self::Calldata),
            "transient" => Some(Self::Transient),
            _ => None,
        }
    }
}

/// Structure of a decoded Solidity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeKind {
    /// Elementary ABI type, canonical name (`uint256`, `address`, `bytes`, ...)
    Elementary(String),
    /// Fixed (`len = Some`) or dynamic array
    Array {
        /// Element type
        base: Box<DecodedType>,
        /// Fixed length, `None` for dynamic arrays
        len: Option<usize>,
    },
    /// Storage mapping
    Mapping {
        /// Key type
        key: Box<DecodedType>,
        /// Value type
        value: Box<DecodedType>,
    },
    /// Struct, qualified name
    Struct(String),
    /// Enum, qualified name
    Enum(String),
    /// Contract, interface or library reference
    Contract(String),
    /// User-defined value type
    UserDefinedValue(String),
    /// Function pointer
    Function,
    /// Anything else (literals, tuples, type expressions)
    Unknown,
}

/// A type string decoded into its structure and data location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedType {
    /// `typeDescriptions.typeString` as emitted by solc
    pub type_string: String,
    /// Data location
    pub location: DataLocation,
    /// Decoded structure
    pub kind: TypeKind,
}

const LOCATION_SUFFIXES: [(&str, DataLocation); 6] = [
    (" storage ref", DataLocation::Storage),
    (" storage pointer", DataLocation::Storage),
    (" storage", DataLocation::Storage),
    (" memory", DataLocation::Memory),
    (" calldata", DataLocation::Calldata),
    (" transient", DataLocation::Transient),
];

fn strip_location(ty: &str) -> (&str, Option<DataLocation>) {
    let ty = ty.trim();
    LOCATION_SUFFIXES
        .iter()
        .find_map(|(suffix, loc)| ty.strip_suffix(suffix).map(|rest| (rest, Some(*loc))))
        .unwrap_or((ty, None))
}

/// Splits `key => value` at the arrow that is not nested in parentheses.
fn split_mapping(inner: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, c) in inner.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '=' if depth == 0 && inner[i..].starts_with("=>") => {
                return Some((inner[..i].trim(), inner[i + 2..].trim()));
            }
            _ => {}
        }
    }
    None
}

fn is_identifier_path(ty: &str) -> bool {
    !ty.is_empty() && ty.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.')
}

impl DecodedType {
    /// Decodes a solc type string.
    ///
    /// The location is the declared `storage_location` when given, else the
    /// one spelled in the type string, else `default`. Strings that cannot be
    /// decoded yield [`TypeKind::Unknown`].
    pub fn parse(type_string: &str, declared: Option<&str>, default: DataLocation) -> Self {
        let (bare, spelled) = strip_location(type_string);
        let location = declared.and_then(DataLocation::from_keyword).or(spelled).unwrap_or(default);
        Self { type_string: type_string.to_string(), location, kind: Self::parse_kind(bare, location) }
    }

    fn parse_kind(ty: &str, location: DataLocation) -> TypeKind {
        let nested = |ty: &str| Box::new(Self::parse(ty, None, location));

        if let Some(inner) = ty.strip_prefix("mapping(").and_then(|t| t.strip_suffix(')')) {
            return match split_mapping(inner) {
                Some((key, value)) => TypeKind::Mapping { key: nested(key), value: nested(value) },
                None => TypeKind::Unknown,
            };
        }
        if let Some(rest) = ty.strip_suffix(']') {
            if let Some(open) = rest.rfind('[') {
                let len = &rest[open + 1..];
                let len = if len.is_empty() { None } else { len.trim().parse().ok() };
                return TypeKind::Array { base: nested(&rest[..open]), len };
            }
        }
        if let Some(name) = ty.strip_prefix("struct ") {
            return TypeKind::Struct(name.to_string());
        }
        if let Some(name) = ty.strip_prefix("enum ") {
            return TypeKind::Enum(name.to_string());
        }
        if let Some(name) = ["contract ", "library ", "interface "]
            .iter()
            .find_map(|prefix| ty.strip_prefix(prefix))
        {
            return TypeKind::Contract(name.to_string());
        }
        if ty.starts_with("function ") || ty.starts_with("function(") {
            return TypeKind::Function;
        }
        if ty == "address payable" {
            return TypeKind::Elementary("address".to_string());
        }
        match DynSolType::parse(ty) {
            Ok(sol) => TypeKind::Elementary(sol.sol_type_name().into_owned()),
            Err(_) if is_identifier_path(ty) && !ty.contains("const") => {
                TypeKind::UserDefinedValue(ty.to_string())
            }
            Err(_) => TypeKind::Unknown,
        }
    }

    /// ABI-level type of the value, where one exists.
    ///
    /// Enums are `uint8` and contracts are addresses; mappings, structs (whose
    /// members are unknown here) and user-defined value types have none.
    pub fn sol_type(&self) -> Option<DynSolType> {
        match &self.kind {
            TypeKind::Elementary(name) => DynSolType::parse(name).ok(),
            TypeKind::Array { base, len } => {
                let base = Box::new(base.sol_type()?);
                Some(match len {
                    Some(len) => DynSolType::FixedArray(base, *len),
                    None => DynSolType::Array(base),
                })
            }
            TypeKind::Enum(_) => Some(DynSolType::Uint(8)),
            TypeKind::Contract(_) => Some(DynSolType::Address),
            TypeKind::Function => Some(DynSolType::Function),
            TypeKind::Mapping { .. }
            | TypeKind::Struct(_)
            | TypeKind::UserDefinedValue(_)
            | TypeKind::Unknown => None,
        }
    }
}

/// A parameter or local variable in scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableRecord {
    /// AST id of the declaration
    pub ast_id: Option<usize>,
    /// Name, `$<k>` for unnamed parameters
    pub name: String,
    /// Decoded type
    pub ty: DecodedType,
    /// Stack length that locates the variable's slot
    pub stack_depth: usize,
    /// Declaration source range
    pub source_range: SourceRange,
    /// Whether this is a function input or output
    pub is_parameter: bool,
    /// Step at which the variable was recorded
    pub declared_at: usize,
    /// Owning scope
    pub scope: ScopeId,
}

/// Parameters of one function activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterRegistration {
    /// Input names in order
    pub inputs: Vec<String>,
    /// Output names in order
    pub outputs: Vec<String>,
    /// Records to insert into the scope
    pub records: Vec<VariableRecord>,
}

fn parameter_name(param: &VariableDeclarationInfo, position: usize) -> String {
    if param.name.is_empty() {
        format!("${position}")
    } else {
        param.name.clone()
    }
}

/// Computes the stack positions of a function's parameters at entry.
///
/// With `L` the stack length at the entry step and `n` inputs, input `i`
/// sits at `L - n + i` and output `j` at `L + j + 1` (outputs are pushed after
/// entry). Inputs are skipped when the stack holds fewer than `n` items.
/// Unnamed parameters are named after their position in the combined
/// input/output list.
pub fn register_parameters(
    function: &FunctionDefinitionInfo,
    stack_len: usize,
    step: usize,
    scope: &ScopeId,
) -> ParameterRegistration {
    let n = function.parameters.len();
    let mut registration = ParameterRegistration::default();

    let record = |param: &VariableDeclarationInfo, name: String, stack_depth: usize| {
        VariableRecord {
            ast_id: Some(param.id),
            name,
            ty: DecodedType::parse(
                &param.type_string,
                param.storage_location.as_deref(),
                DataLocation::Memory,
            ),
            stack_depth,
            source_range: param.src,
            is_parameter: true,
            declared_at: step,
            scope: scope.clone(),
        }
    };

    for (i, param) in function.parameters.iter().enumerate() {
        let name = parameter_name(param, i);
        registration.inputs.push(name.clone());
        if stack_len < n {
            debug!(step, function = %function.name, stack_len, inputs = n, "stack too short for inputs");
            continue;
        }
        registration.records.push(record(param, name, stack_len - n + i));
    }

    for (j, param) in function.return_parameters.iter().enumerate() {
        let name = parameter_name(param, n + j);
        registration.outputs.push(name.clone());
        registration.records.push(record(param, name, stack_len + j + 1));
    }

    registration
}

/// Records for the declarations becoming active at the current step.
///
/// Unnamed declarations and names for which `is_known` holds are skipped.
pub fn include_variable_declarations(
    declarations: &[VariableDeclarationInfo],
    is_known: impl Fn(&str) -> bool,
    stack_len: usize,
    step: usize,
    scope: &ScopeId,
) -> Vec<VariableRecord> {
    declarations
        .iter()
        .filter(|decl| !decl.name.is_empty() && !is_known(&decl.name))
        .map(|decl| VariableRecord {
            ast_id: Some(decl.id),
            name: decl.name.clone(),
            ty: DecodedType::parse(
                &decl.type_string,
                decl.storage_location.as_deref(),
                DataLocation::Storage,
            ),
            stack_depth: stack_len,
            source_range: decl.src,
            is_parameter: false,
            declared_at: step,
            scope: scope.clone(),
        })
        .collect()
}
