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
use std::{fmt, str::FromStr};

/// A byte range inside one source file, as written in AST `src` attributes
/// (`start:length:file`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceRange {
    /// The source file id.
    pub file: u32,
    /// The byte offset of the first character.
    pub start: usize,
    /// The length of the range in bytes.
    pub length: usize,
}

impl SourceRange {
    /// Creates a new source range.
    pub fn new(file: u32, start: usize, length: usize) -> Self {
        Self { file, start, length }
    }

    /// Creates a range standing for "no source" (`file = -1` in solc output).
    pub fn non_existent() -> Self {
        Self { file: u32::MAX, start: 0, length: 0 }
    }

    /// Checks if the source range points into a file.
    pub fn is_existent(&self) -> bool {
        self.file != u32::MAX
    }

    /// Offset right after the last byte of the range.
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// Whether `other` lies inside this range of the same file.
    pub fn contains(&self, other: &Self) -> bool {
        self.file == other.file && self.start <= other.start && other.end() <= self.end()
    }

    /// Slices the source text covered by the range, if it is in bounds.
    pub fn slice_source<'a>(&self, source: &'a str) -> Option<&'a str> {
        source.get(self.start..self.end())
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_existent() {
            write!(f, "{}:{}:{}", self.start, self.length, self.file)
        } else {
            write!(f, "{}:{}:-1", self.start, self.length)
        }
    }
}

/// Error parsing a `start:length:file` triple.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid source range `{0}`")]
pub struct ParseSourceRangeError(String);

impl FromStr for SourceRange {
    type Err = ParseSourceRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseSourceRangeError(s.to_string());
        let mut parts = s.trim().splitn(3, ':');
        let start = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let length = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let file: i64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        if file < 0 {
            return Ok(Self { start, length, ..Self::non_existent() });
        }
        let file = u32::try_from(file).map_err(|_| err())?;
        Ok(Self { file, start, length })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_src_attribute() {
        let range: SourceRange = "120:35:2".parse().unwrap();
        assert_eq!(range, SourceRange::new(2, 120, 35));
        assert_eq!(range.end(), 155);
        assert_eq!(range.to_string(), "120:35:2");

        let generated: SourceRange = "0:0:-1".parse().unwrap();
        assert!(!generated.is_existent());

        assert!("12:3".parse::<SourceRange>().is_err());
        assert!("a:b:c".parse::<SourceRange>().is_err());
    }

    #[test]
    fn test_contains() {
        let outer = SourceRange::new(0, 10, 50);
        assert!(outer.contains(&SourceRange::new(0, 10, 50)));
        assert!(outer.contains(&SourceRange::new(0, 20, 5)));
        assert!(!outer.contains(&SourceRange::new(0, 55, 10)));
        assert!(!outer.contains(&SourceRange::new(1, 20, 5)));
    }
}
