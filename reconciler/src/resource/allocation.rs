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
//! Allocations: fixed-size blocks carved from a pool.
//!
//! The allocator picks the block. `id` and `cidr` are set once on creation and never
//! re-derived afterwards: a read only checks that the pool is still known.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Operation, ReconcileError},
    guard::GuardMode,
    port::AllocatorError,
    resource::{ReadOutcome, ReconcileContext, Reconciler},
    schema::{
        ALLOCATION_ATTRIBUTES, Attribute, Diff, PlanAction, validate_cidr, validate_size,
    },
};

/// Declared allocation fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// The pool to allocate from.
    pub pool_id: String,
    /// The prefix length of the allocation.
    pub size: i64,
}

/// Tracked allocation state.
///
/// `pool_id` and `size` are unknown after an import until a configuration is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationState {
    /// The pool the allocation was carved from.
    #[serde(default)]
    pub pool_id: Option<String>,
    /// The prefix length of the allocation.
    #[serde(default)]
    pub size: Option<u8>,
    /// The allocation identifier, equal to `cidr`.
    pub id: String,
    /// The allocated block.
    pub cidr: String,
}

/// Reconciles allocations against child prefixes of the allocator.
#[derive(Debug, Clone)]
pub struct AllocationReconciler {
    context: ReconcileContext,
}

impl AllocationReconciler {
    /// Creates a new allocation reconciler.
    pub fn new(context: ReconcileContext) -> Self {
        Self { context }
    }

    fn diffs(prior: &AllocationState, config: &AllocationConfig) -> [(&'static str, Diff); 2] {
        [
            (
                "pool_id",
                Diff::cidr(prior.pool_id.as_deref(), &config.pool_id),
            ),
            ("size", Diff::value(prior.size.map(i64::from), config.size)),
        ]
    }
}

#[async_trait]
impl Reconciler for AllocationReconciler {
    type Config = AllocationConfig;
    type State = AllocationState;

    const TYPE_NAME: &'static str = "ipam_allocation";

    fn attributes() -> &'static [Attribute] {
        ALLOCATION_ATTRIBUTES
    }

    fn plan(prior: Option<&AllocationState>, config: &AllocationConfig) -> PlanAction {
        match prior {
            None => PlanAction::Create,
            Some(prior) => {
                PlanAction::from_diffs(Self::attributes(), &Self::diffs(prior, config))
            }
        }
    }

    async fn create(
        &self,
        cancel: &CancellationToken,
        config: &AllocationConfig,
    ) -> Result<AllocationState, ReconcileError> {
        tracing::debug!(pool_id = %config.pool_id, size = config.size, "Creating allocation");
        validate_cidr("pool_id", &config.pool_id)?;
        let size = validate_size(config.size)?;

        let _permit = self
            .context
            .permit(GuardMode::Exclusive, Self::TYPE_NAME, Operation::Create, cancel)
            .await?;
        let child = self
            .context
            .port()
            .acquire_child(&config.pool_id, size)
            .await
            .map_err(ReconcileError::allocator(Self::TYPE_NAME, Operation::Create))?;

        tracing::info!(pool_id = %config.pool_id, cidr = %child.cidr, "Created allocation");
        Ok(AllocationState {
            pool_id: Some(config.pool_id.clone()),
            size: Some(size),
            id: child.cidr.clone(),
            cidr: child.cidr,
        })
    }

    async fn read(
        &self,
        cancel: &CancellationToken,
        state: &AllocationState,
    ) -> Result<ReadOutcome<AllocationState>, ReconcileError> {
        tracing::debug!(pool_id = ?state.pool_id, cidr = %state.cidr, "Reading allocation");
        let Some(pool_id) = state.pool_id.as_deref() else {
            return Ok(ReadOutcome::Present(state.clone()));
        };

        let _permit = self
            .context
            .permit(GuardMode::Shared, Self::TYPE_NAME, Operation::Read, cancel)
            .await?;
        match self.context.port().resolve_prefix(pool_id).await {
            Ok(Some(_)) => {}
            Ok(None) | Err(AllocatorError::NotFound(_)) => {
                tracing::warn!(%pool_id, cidr = %state.cidr, "Pool of allocation not found, keeping tracked state");
            }
            Err(e) => return Err(ReconcileError::allocator(Self::TYPE_NAME, Operation::Read)(e)),
        }

        Ok(ReadOutcome::Present(state.clone()))
    }

    async fn update(
        &self,
        cancel: &CancellationToken,
        prior: &AllocationState,
        config: &AllocationConfig,
    ) -> Result<AllocationState, ReconcileError> {
        tracing::debug!(cidr = %prior.cidr, pool_id = %config.pool_id, size = config.size, "Updating allocation");
        validate_cidr("pool_id", &config.pool_id)?;
        let size = validate_size(config.size)?;
        if let Some((attribute, _)) = Self::diffs(prior, config)
            .into_iter()
            .find(|(_, diff)| *diff == Diff::Changed)
        {
            return Err(ReconcileError::validation(
                attribute,
                format!(
                    "cannot change {attribute} of {} in place, the allocation must be replaced",
                    prior.cidr
                ),
            ));
        }

        let _permit = self
            .context
            .permit(GuardMode::Exclusive, Self::TYPE_NAME, Operation::Update, cancel)
            .await?;
        Ok(AllocationState {
            pool_id: Some(config.pool_id.clone()),
            size: Some(size),
            id: prior.id.clone(),
            cidr: prior.cidr.clone(),
        })
    }

    async fn delete(
        &self,
        cancel: &CancellationToken,
        state: &AllocationState,
    ) -> Result<(), ReconcileError> {
        tracing::debug!(pool_id = ?state.pool_id, cidr = %state.cidr, "Deleting allocation");
        let Some(pool_id) = state.pool_id.as_deref() else {
            return Err(ReconcileError::validation(
                "pool_id",
                format!("pool of {} is unknown, set pool_id before deleting", state.cidr),
            ));
        };

        let _permit = self
            .context
            .permit(GuardMode::Exclusive, Self::TYPE_NAME, Operation::Delete, cancel)
            .await?;
        self.context
            .port()
            .release_child(pool_id, &state.cidr)
            .await
            .map_err(ReconcileError::allocator(Self::TYPE_NAME, Operation::Delete))?;

        tracing::info!(%pool_id, cidr = %state.cidr, "Deleted allocation");
        Ok(())
    }

    async fn import(
        &self,
        _cancel: &CancellationToken,
        id: &str,
    ) -> Result<ReadOutcome<AllocationState>, ReconcileError> {
        tracing::debug!(%id, "Importing allocation");
        validate_cidr("id", id)?;

        // pool_id and size stay unknown until the next apply adopts them.
        Ok(ReadOutcome::Present(AllocationState {
            pool_id: None,
            size: None,
            id: id.to_string(),
            cidr: id.to_string(),
        }))
    }
}
