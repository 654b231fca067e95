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

use calltree_common::CodeAddress;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::{analysis::VariableRecord, source::LineColumnRange, SourceLocation};

/// Dotted path identifying a scope: `1` is the root, `1.2` its second child.
///
/// Ids order in pre-order, so a scope is immediately followed by its
/// descendants in any ordered map keyed by `ScopeId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ScopeId(Vec<u32>);

impl ScopeId {
    /// The root scope `1`.
    pub fn root() -> Self {
        Self(vec![1])
    }

    /// The `ordinal`-th (1-based) child of this scope.
    pub fn child(&self, ordinal: u32) -> Self {
        let mut path = self.0.clone();
        path.push(ordinal);
        Self(path)
    }

    /// Parent scope, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        (self.0.len() > 1).then(|| Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Whether this is the root id.
    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Nesting depth, 0 for the root.
    pub fn depth(&self) -> usize {
        self.0.len() - 1
    }

    /// Whether `other` is this scope or one of its descendants.
    pub fn contains(&self, other: &Self) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Whether `other` is a strict descendant of this scope.
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        other.0.len() > self.0.len() && self.contains(other)
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join("."))
    }
}

/// Error parsing a dotted scope id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid scope id `{0}`")]
pub struct ParseScopeIdError(String);

impl FromStr for ScopeId {
    type Err = ParseScopeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = s
            .split('.')
            .map(str::parse)
            .collect::<Result<Vec<u32>, _>>()
            .map_err(|_| ParseScopeIdError(s.to_string()))?;
        if path.is_empty() {
            return Err(ParseScopeIdError(s.to_string()));
        }
        Ok(Self(path))
    }
}

impl From<ScopeId> for String {
    fn from(id: ScopeId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ScopeId {
    type Error = ParseScopeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// What opened a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    /// The transaction's outermost frame
    Root,
    /// A message call one depth level down
    ExternalCall,
    /// A contract creation one depth level down
    Creation,
    /// An internal function activation
    InternalFunction,
    /// A constructor body
    Constructor,
}

impl ScopeKind {
    /// Whether the scope is a call frame of its own (closed by a depth decrease).
    pub fn is_frame(&self) -> bool {
        matches!(self, Self::Root | Self::ExternalCall | Self::Creation)
    }
}

/// A contiguous range of steps run by one activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    /// Scope id
    pub id: ScopeId,
    /// Why the scope was opened
    pub kind: ScopeKind,
    /// Code running when the scope was opened
    pub code: CodeAddress,
    /// First step of the scope
    pub first_step: usize,
    /// Last step of the scope, `None` while open
    pub last_step: Option<usize>,
    /// Gas of the steps whose innermost scope is this one
    pub gas_cost: u64,
    /// Variables keyed by name
    pub locals: BTreeMap<String, VariableRecord>,
}

impl Scope {
    pub(crate) fn new(id: ScopeId, kind: ScopeKind, code: CodeAddress, first_step: usize) -> Self {
        Self { id, kind, code, first_step, last_step: None, gas_cost: 0, locals: BTreeMap::new() }
    }

    /// Whether the scope runs creation code.
    pub fn is_creation(&self) -> bool {
        self.code.is_creation
    }

    /// Whether `step` lies in `[first_step, last_step]` (unbounded while open).
    pub fn contains(&self, step: usize) -> bool {
        self.first_step <= step && self.last_step.is_none_or(|last| step <= last)
    }
}

/// A function entered at the start of a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionActivation {
    /// AST id of the function definition
    pub function_id: usize,
    /// Function name (`constructor`, `fallback`, `receive` for special functions)
    pub name: String,
    /// Input parameter names
    pub inputs: Vec<String>,
    /// Output parameter names
    pub outputs: Vec<String>,
    /// Scope of the activation
    pub scope: ScopeId,
    /// First step of the activation
    pub entry_step: usize,
    /// Whether this activation runs a constructor
    pub is_constructor: bool,
}

/// Gas spent on one source line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineGas {
    /// Sum of step gas costs
    pub gas_cost: u64,
    /// Steps attributed to the line, ascending
    pub steps: Vec<usize>,
}

/// Memoized location data of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLocation {
    /// Code running at the step
    pub code: CodeAddress,
    /// Raw opcode byte
    pub opcode: u8,
    /// Location straight from the source map
    pub raw: SourceLocation,
    /// Raw location, or the last valid one when raw is invalid
    pub valid: SourceLocation,
    /// Line/column of the valid location, when a converter was available
    pub line_column: Option<LineColumnRange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_id_paths() {
        let root = ScopeId::root();
        let child = root.child(2).child(1);
        assert_eq!(child.to_string(), "1.2.1");
        assert_eq!(child.depth(), 2);
        assert_eq!(child.parent().unwrap().to_string(), "1.2");
        assert!(root.parent().is_none());
        assert!(root.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&child));
        assert!(child.contains(&child));
        assert!(!"1.3".parse::<ScopeId>().unwrap().contains(&child));
    }

    #[test]
    fn test_scope_id_parse_and_order() {
        assert_eq!("1.10.2".parse::<ScopeId>().unwrap(), ScopeId::root().child(10).child(2));
        assert!("1..2".parse::<ScopeId>().is_err());
        assert!("".parse::<ScopeId>().is_err());

        let mut ids: Vec<ScopeId> =
            ["1.2", "1.1.1", "1", "1.10", "1.1"].iter().map(|s| s.parse().unwrap()).collect();
        ids.sort();
        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(ids, ["1", "1.1", "1.1.1", "1.2", "1.10"]);
    }

    #[test]
    fn test_scope_id_serde() {
        let id = ScopeId::root().child(3);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"1.3\"");
        assert_eq!(serde_json::from_str::<ScopeId>(&json).unwrap(), id);
    }
}
