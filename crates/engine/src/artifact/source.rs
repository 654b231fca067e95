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

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::{analysis::DeclarationIndex, source::LineIndex};

/// A user-authored source file of a compilation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceFile {
    /// Source id used by source maps and AST `src` attributes
    pub id: u32,
    /// Path as passed to the compiler
    pub path: PathBuf,
    /// Source text
    #[serde(default)]
    pub content: String,
    /// solc JSON AST (`SourceUnit`)
    #[serde(default)]
    pub ast: Value,

    #[serde(skip)]
    declarations: OnceCell<DeclarationIndex>,
    #[serde(skip)]
    lines: OnceCell<LineIndex>,
}

impl SourceFile {
    /// Creates a source file.
    pub fn new(id: u32, path: impl Into<PathBuf>, content: impl Into<String>, ast: Value) -> Self {
        Self { id, path: path.into(), content: content.into(), ast, ..Default::default() }
    }

    /// Declarations of this file, indexed on first use.
    pub fn declarations(&self) -> &DeclarationIndex {
        self.declarations.get_or_init(|| DeclarationIndex::from_ast(&self.ast))
    }

    /// Line index of the content, built on first use.
    pub fn line_index(&self) -> &LineIndex {
        self.lines.get_or_init(|| LineIndex::new(&self.content))
    }
}
