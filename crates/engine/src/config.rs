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

//! Builder configuration.
//!
//! Every field has a default, so a TOML document only needs the keys it
//! changes:
//!
//! ```toml
//! include_locals = false
//! max_scope_depth = 512
//! ```

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default limit on simultaneously open scopes.
///
/// The EVM caps external calls at 1024 levels; internal functions nest inside
/// each of them, so the limit leaves room for both.
pub const DEFAULT_MAX_SCOPE_DEPTH: usize = 2048;

/// Options controlling one tree build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Record local variable declarations as they become active
    pub include_locals: bool,
    /// Accumulate gas per executed source line (requires a line converter)
    pub track_gas_per_line: bool,
    /// Treat compiler-generated sources as valid source locations
    pub debug_generated_sources: bool,
    /// Maximum number of simultaneously open scopes before the build fails
    pub max_scope_depth: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            include_locals: true,
            track_gas_per_line: true,
            debug_generated_sources: false,
            max_scope_depth: DEFAULT_MAX_SCOPE_DEPTH,
        }
    }
}

impl BuilderConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("failed to read {}: {e}", path.display()))?;
        Self::from_toml_str(&text)
    }

    /// Enable or disable local variable tracking
    pub fn with_locals(mut self, include_locals: bool) -> Self {
        self.include_locals = include_locals;
        self
    }

    /// Enable or disable gas-per-line accounting
    pub fn with_gas_per_line(mut self, track: bool) -> Self {
        self.track_gas_per_line = track;
        self
    }

    /// Treat generated sources as debuggable
    pub fn with_generated_sources(mut self, debug: bool) -> Self {
        self.debug_generated_sources = debug;
        self
    }

    /// Set the open-scope limit
    pub fn with_max_scope_depth(mut self, depth: usize) -> Self {
        self.max_scope_depth = depth;
        self
    }
}
