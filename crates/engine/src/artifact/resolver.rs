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
use eyre::Result;
use std::{collections::HashMap, future::Future, sync::Arc};

use super::CompiledArtifact;

/// Looks up the compiled artifact of the code deployed at an address.
///
/// The builder calls this at most once per address and build. Returning
/// `Ok(None)` means the address has no known artifact; an `Err` means the
/// lookup itself failed.
pub trait ArtifactResolver {
    /// Artifact of `address`, if known.
    fn compiled_artifact(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<Option<Arc<CompiledArtifact>>>> + Send;
}

impl<R: ArtifactResolver + Sync> ArtifactResolver for Arc<R> {
    fn compiled_artifact(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<Option<Arc<CompiledArtifact>>>> + Send {
        (**self).compiled_artifact(address)
    }
}

/// In-memory resolver over a fixed set of artifacts.
#[derive(Debug, Clone, Default)]
pub struct StaticArtifacts {
    artifacts: HashMap<Address, Arc<CompiledArtifact>>,
}

impl StaticArtifacts {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the artifact of `address`.
    pub fn insert(&mut self, address: Address, artifact: impl Into<Arc<CompiledArtifact>>) {
        self.artifacts.insert(address, artifact.into());
    }

    /// Builder-style [`Self::insert`].
    pub fn with(mut self, address: Address, artifact: impl Into<Arc<CompiledArtifact>>) -> Self {
        self.insert(address, artifact);
        self
    }

    /// Number of registered addresses.
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Whether no artifact is registered.
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl ArtifactResolver for StaticArtifacts {
    async fn compiled_artifact(&self, address: Address) -> Result<Option<Arc<CompiledArtifact>>> {
        Ok(self.artifacts.get(&address).cloned())
    }
}
