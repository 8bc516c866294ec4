// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Pools: root prefixes allocations are carved from.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Operation, ReconcileError},
    guard::GuardMode,
    port::AllocatorError,
    resource::{ReadOutcome, ReconcileContext, Reconciler},
    schema::{Attribute, Diff, POOL_ATTRIBUTES, PlanAction, validate_cidr},
};

/// Declared pool fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// The CIDR block of the pool.
    pub cidr: String,
}

/// Tracked pool state. `id` always equals `cidr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    /// The CIDR block of the pool.
    pub cidr: String,
    /// The pool identifier.
    pub id: String,
}

impl PoolState {
    fn new(cidr: impl Into<String>) -> Self {
        let cidr = cidr.into();
        Self {
            id: cidr.clone(),
            cidr,
        }
    }
}

/// Reconciles pools against root prefixes of the allocator.
#[derive(Debug, Clone)]
pub struct PoolReconciler {
    context: ReconcileContext,
}

impl PoolReconciler {
    /// Creates a new pool reconciler.
    pub fn new(context: ReconcileContext) -> Self {
        Self { context }
    }

    async fn refresh(
        &self,
        cancel: &CancellationToken,
        cidr: &str,
        operation: Operation,
    ) -> Result<ReadOutcome<PoolState>, ReconcileError> {
        let _permit = self
            .context
            .permit(GuardMode::Shared, Self::TYPE_NAME, operation, cancel)
            .await?;

        match self.context.port().resolve_prefix(cidr).await {
            Ok(Some(prefix)) => {
                match prefix.parent_cidr {
                    // Keep the tracked spelling unless the allocator reports a different network.
                    None if Diff::cidr(Some(&prefix.cidr), cidr) == Diff::Same => {
                        Ok(ReadOutcome::Present(PoolState::new(cidr)))
                    }
                    None => Ok(ReadOutcome::Present(PoolState::new(prefix.cidr))),
                    Some(parent) => {
                        tracing::warn!(%cidr, %parent, "Pool is no longer a root prefix, dropping it");
                        Ok(ReadOutcome::Gone)
                    }
                }
            }
            Ok(None) | Err(AllocatorError::NotFound(_)) => {
                tracing::warn!(%cidr, "Pool not found, dropping it");
                Ok(ReadOutcome::Gone)
            }
            Err(e) => Err(ReconcileError::allocator(Self::TYPE_NAME, operation)(e)),
        }
    }
}

#[async_trait]
impl Reconciler for PoolReconciler {
    type Config = PoolConfig;
    type State = PoolState;

    const TYPE_NAME: &'static str = "ipam_pool";

    fn attributes() -> &'static [Attribute] {
        POOL_ATTRIBUTES
    }

    fn plan(prior: Option<&PoolState>, config: &PoolConfig) -> PlanAction {
        match prior {
            None => PlanAction::Create,
            Some(prior) => {
                PlanAction::from_diffs(Self::attributes(), &[(
                    "cidr",
                    Diff::cidr(Some(&prior.cidr), &config.cidr),
                )])
            }
        }
    }

    async fn create(
        &self,
        cancel: &CancellationToken,
        config: &PoolConfig,
    ) -> Result<PoolState, ReconcileError> {
        tracing::debug!(cidr = %config.cidr, "Creating pool");
        validate_cidr("cidr", &config.cidr)?;

        let _permit = self
            .context
            .permit(GuardMode::Exclusive, Self::TYPE_NAME, Operation::Create, cancel)
            .await?;
        self.context
            .port()
            .create_root_prefix(&config.cidr)
            .await
            .map_err(ReconcileError::allocator(Self::TYPE_NAME, Operation::Create))?;

        tracing::info!(cidr = %config.cidr, "Created pool");
        Ok(PoolState::new(config.cidr.as_str()))
    }

    async fn read(
        &self,
        cancel: &CancellationToken,
        state: &PoolState,
    ) -> Result<ReadOutcome<PoolState>, ReconcileError> {
        tracing::debug!(cidr = %state.cidr, "Reading pool");
        self.refresh(cancel, &state.cidr, Operation::Read).await
    }

    async fn update(
        &self,
        cancel: &CancellationToken,
        prior: &PoolState,
        config: &PoolConfig,
    ) -> Result<PoolState, ReconcileError> {
        tracing::debug!(cidr = %prior.cidr, "Updating pool");
        if Diff::cidr(Some(&prior.cidr), &config.cidr) == Diff::Changed {
            return Err(ReconcileError::validation(
                "cidr",
                format!(
                    "cannot change {} to {} in place, the pool must be replaced",
                    prior.cidr, config.cidr
                ),
            ));
        }

        let _permit = self
            .context
            .permit(GuardMode::Exclusive, Self::TYPE_NAME, Operation::Update, cancel)
            .await?;
        Ok(prior.clone())
    }

    async fn delete(
        &self,
        cancel: &CancellationToken,
        state: &PoolState,
    ) -> Result<(), ReconcileError> {
        tracing::debug!(cidr = %state.cidr, "Deleting pool");

        let _permit = self
            .context
            .permit(GuardMode::Exclusive, Self::TYPE_NAME, Operation::Delete, cancel)
            .await?;
        self.context
            .port()
            .delete_root_prefix(&state.cidr)
            .await
            .map_err(ReconcileError::allocator(Self::TYPE_NAME, Operation::Delete))?;

        tracing::info!(cidr = %state.cidr, "Deleted pool");
        Ok(())
    }

    async fn import(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> Result<ReadOutcome<PoolState>, ReconcileError> {
        tracing::debug!(%id, "Importing pool");
        validate_cidr("id", id)?;
        self.refresh(cancel, id, Operation::Import).await
    }
}
