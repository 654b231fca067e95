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

//! Source locations and offset to line/column conversion.
//!
//! Every step has a *raw* location read straight from the source map and a
//! *valid* one. The raw location may point at generated code (`file = -1`)
//! or past the known sources; the valid location then falls back to the last
//! valid location seen earlier in the same frame.

use foundry_compilers::artifacts::sourcemap::Jump;
use serde::{Deserialize, Serialize};

use crate::{analysis::SourceRange, BytecodeArtifact, CompiledArtifact};

/// Jump marker of a source map entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JumpKind {
    /// Jump into a function
    In,
    /// Return from a function
    Out,
    /// Any other instruction
    #[default]
    Other,
}

impl From<Jump> for JumpKind {
    fn from(jump: Jump) -> Self {
        match jump {
            Jump::In => Self::In,
            Jump::Out => Self::Out,
            Jump::Regular => Self::Other,
        }
    }
}

/// Source map entry of one instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Source file id, `None` when the compiler emitted `-1`
    pub file: Option<u32>,
    /// Byte offset
    pub start: usize,
    /// Length in bytes
    pub length: usize,
    /// Jump marker
    pub jump: JumpKind,
}

impl SourceLocation {
    /// Creates a location without jump marker.
    pub fn new(file: u32, start: usize, length: usize) -> Self {
        Self { file: Some(file), start, length, jump: JumpKind::Other }
    }

    /// Offset right after the location.
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// The AST source range of this location, if it points into a file.
    pub fn range(&self) -> Option<SourceRange> {
        self.file.map(|file| SourceRange::new(file, self.start, self.length))
    }

    /// Whether `other` lies within this location. Two locations without a
    /// file count as the same file.
    pub fn includes(&self, other: &Self) -> bool {
        self.file == other.file && self.start <= other.start && other.end() <= self.end()
    }
}

/// Picks the valid location for a step.
///
/// `raw` is returned when it is valid. Otherwise the most recent valid
/// location wins; before any valid location was seen there is nothing to
/// substitute and `raw` is returned unchanged.
pub fn locate_valid(
    raw: SourceLocation,
    raw_is_valid: bool,
    previous_valid: Option<&SourceLocation>,
) -> SourceLocation {
    if raw_is_valid {
        return raw;
    }
    previous_valid.copied().unwrap_or(raw)
}

/// 0-based line and column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineColumn {
    /// 0-based line
    pub line: usize,
    /// 0-based byte column
    pub column: usize,
}

/// Start and end position of a location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineColumnRange {
    /// First character
    pub start: LineColumn,
    /// Position right after the last character
    pub end: LineColumn,
}

/// Byte offsets of line starts of one source text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Index `text`.
    pub fn new(text: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.bytes().enumerate().filter(|(_, b)| *b == b'\n').map(|(i, _)| i + 1))
            .collect();
        Self { line_starts }
    }

    /// Number of lines.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Line and column of a byte offset. Offsets past the end land on the
    /// last line.
    pub fn line_column(&self, offset: usize) -> LineColumn {
        let line = self.line_starts.partition_point(|start| *start <= offset).saturating_sub(1);
        LineColumn { line, column: offset - self.line_starts[line] }
    }

    /// Line/column range of `start..start + length`.
    pub fn range(&self, start: usize, length: usize) -> LineColumnRange {
        LineColumnRange { start: self.line_column(start), end: self.line_column(start + length) }
    }
}

/// Converts a byte-offset location into line/column positions.
///
/// Gas-per-line accounting is skipped when the builder has no converter.
pub trait LineColumnConverter: Send + Sync {
    /// Line/column range of `location`, `None` when the file is unknown.
    fn offset_to_line_column(
        &self,
        location: &SourceLocation,
        artifact: &CompiledArtifact,
        bytecode: &BytecodeArtifact,
    ) -> Option<LineColumnRange>;
}

impl<F> LineColumnConverter for F
where
    F: Fn(&SourceLocation, &CompiledArtifact, &BytecodeArtifact) -> Option<LineColumnRange>
        + Send
        + Sync,
{
    fn offset_to_line_column(
        &self,
        location: &SourceLocation,
        artifact: &CompiledArtifact,
        bytecode: &BytecodeArtifact,
    ) -> Option<LineColumnRange> {
        self(location, artifact, bytecode)
    }
}

/// Default converter over the source text carried by the artifact,
/// including generated sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineIndexConverter;

impl LineColumnConverter for LineIndexConverter {
    fn offset_to_line_column(
        &self,
        location: &SourceLocation,
        artifact: &CompiledArtifact,
        bytecode: &BytecodeArtifact,
    ) -> Option<LineColumnRange> {
        let file = location.file?;
        let index = match artifact.source(file) {
            Some(source) => source.line_index(),
            None => bytecode.generated_line_index(file)?,
        };
        Some(index.range(location.start, location.length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("contract A {\n    uint x;\n}\n");
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.line_column(0), LineColumn { line: 0, column: 0 });
        assert_eq!(index.line_column(12), LineColumn { line: 0, column: 12 });
        assert_eq!(index.line_column(13), LineColumn { line: 1, column: 0 });
        assert_eq!(index.line_column(17), LineColumn { line: 1, column: 4 });
        let range = index.range(17, 7);
        assert_eq!(range.end, LineColumn { line: 1, column: 11 });
    }

    #[test]
    fn test_includes() {
        let outer = SourceLocation::new(0, 10, 30);
        assert!(outer.includes(&SourceLocation::new(0, 12, 4)));
        assert!(!outer.includes(&SourceLocation::new(1, 12, 4)));
        assert!(!outer.includes(&SourceLocation::new(0, 35, 10)));

        let generated = SourceLocation { file: None, ..SourceLocation::new(0, 0, 0) };
        assert!(generated.includes(&generated));
        assert!(!outer.includes(&generated));
    }

    #[test]
    fn test_locate_valid_fallback() {
        let good = SourceLocation::new(0, 4, 2);
        let bad = SourceLocation { file: None, start: 9, length: 1, jump: JumpKind::Other };
        assert_eq!(locate_valid(good, true, None), good);
        assert_eq!(locate_valid(bad, false, Some(&good)), good);
        assert_eq!(locate_valid(bad, false, None), bad);
    }
}
