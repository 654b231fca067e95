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

//! Call tree reconstruction.
//!
//! [`TreeBuilder`] walks a trace once, front to back, keeping an explicit
//! stack of open scopes. Each step is mapped to its source location, checked
//! for entry into a user function, charged to the innermost scope, and
//! finally checked for a return or a change of call depth. Variables are
//! registered as their declarations are reached.

mod session;

use alloy_primitives::Address;
use futures::future::join_all;
use std::{fmt, sync::Arc};
use tracing::{debug, info, warn};

use crate::{
    error::BuildError,
    source::{LineColumnConverter, LineIndexConverter},
    ArtifactResolver, BuilderConfig, CallTree, TraceContext,
};
use session::BuildSession;

/// Why a build produced no tree without failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotReadyReason {
    /// The trace has no steps
    EmptyTrace,
    /// No artifact is known for the code the trace starts in
    MissingRootArtifact(Address),
}

impl fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTrace => write!(f, "trace is empty"),
            Self::MissingRootArtifact(address) => write!(f, "no artifact for root code {address}"),
        }
    }
}

/// Result of one build.
#[derive(Debug)]
pub enum BuildOutcome {
    /// The complete tree
    Ready(CallTree),
    /// The pass stopped at `step`
    Failed {
        /// Step being processed
        step: usize,
        /// What went wrong
        error: BuildError,
    },
    /// Nothing to build from
    NotReady(NotReadyReason),
}

impl BuildOutcome {
    /// Whether a tree was produced.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The tree, if produced.
    pub fn tree(&self) -> Option<&CallTree> {
        match self {
            Self::Ready(tree) => Some(tree),
            _ => None,
        }
    }

    /// Consumes the outcome, returning the tree if produced.
    pub fn into_tree(self) -> Option<CallTree> {
        match self {
            Self::Ready(tree) => Some(tree),
            _ => None,
        }
    }

    /// The failure, if the pass stopped.
    pub fn error(&self) -> Option<&BuildError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Rebuilds source-level call trees from traces.
///
/// ```ignore
/// let builder = TreeBuilder::new(artifacts).with_config(config);
/// let tree = builder.build(&recorded).await.into_tree();
/// ```
pub struct TreeBuilder<R> {
    resolver: R,
    converter: Option<Arc<dyn LineColumnConverter>>,
    config: BuilderConfig,
}

impl<R> fmt::Debug for TreeBuilder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeBuilder")
            .field("config", &self.config)
            .field("converter", &self.converter.is_some())
            .finish_non_exhaustive()
    }
}

impl<R> TreeBuilder<R>
where
    R: ArtifactResolver + Sync,
{
    /// Builder over `resolver` with the default configuration and
    /// line/column conversion from the artifacts' source text.
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            converter: Some(Arc::new(LineIndexConverter)),
            config: BuilderConfig::default(),
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: BuilderConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `converter` for line/column conversion.
    pub fn with_line_converter(mut self, converter: impl LineColumnConverter + 'static) -> Self {
        self.converter = Some(Arc::new(converter));
        self
    }

    /// Disables line/column conversion, and with it gas-per-line accounting.
    pub fn without_line_converter(mut self) -> Self {
        self.converter = None;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// The artifact resolver.
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Reconstructs the call tree of the trace behind `ctx`.
    pub async fn build<T>(&self, ctx: &T) -> BuildOutcome
    where
        T: TraceContext + Sync,
    {
        let trace = ctx.trace();
        if trace.is_empty() {
            debug!("nothing to build from an empty trace");
            return BuildOutcome::NotReady(NotReadyReason::EmptyTrace);
        }

        let root = match ctx.code_address_at(0) {
            Ok(root) => root,
            Err(reason) => {
                return BuildOutcome::Failed { step: 0, error: BuildError::Context { step: 0, reason } }
            }
        };
        let artifact = match self.resolver.compiled_artifact(root.address).await {
            Ok(Some(artifact)) => artifact,
            Ok(None) => {
                warn!(address = %root.address, "no artifact for the root code");
                return BuildOutcome::NotReady(NotReadyReason::MissingRootArtifact(root.address));
            }
            Err(reason) => {
                let error = BuildError::Resolver { step: 0, address: root.address, reason };
                return BuildOutcome::Failed { step: 0, error };
            }
        };

        info!(
            steps = trace.len(),
            address = %root.address,
            contract = %artifact.contract_name,
            creation = root.is_creation,
            "building call tree"
        );
        let session = BuildSession::new(
            ctx,
            &self.resolver,
            &self.config,
            self.converter.as_deref(),
            root,
            artifact,
        );
        match session.run().await {
            Ok(tree) => {
                info!(
                    scopes = tree.scopes().count(),
                    activations = tree.activations().len(),
                    breakpoints = tree.reduced_trace().len(),
                    gas = tree.total_gas(),
                    "call tree ready"
                );
                BuildOutcome::Ready(tree)
            }
            Err(error) => {
                warn!(step = error.step(), %error, "call tree build failed");
                BuildOutcome::Failed { step: error.step(), error }
            }
        }
    }

    /// Builds several independent traces concurrently.
    pub async fn build_many<T>(&self, contexts: &[T]) -> Vec<BuildOutcome>
    where
        T: TraceContext + Sync,
    {
        join_all(contexts.iter().map(|ctx| self.build(ctx))).await
    }
}
