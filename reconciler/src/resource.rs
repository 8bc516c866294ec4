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
//! Resource lifecycles.
//!
//! A [Reconciler] maps the lifecycle verbs of one declared resource type onto the
//! [AllocatorPort]. Both resource types share a [ReconcileContext], which holds the port and
//! the [StoreGuard] serializing access to it.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Operation, ReconcileError},
    guard::{GuardMode, GuardPermit, StoreGuard},
    port::AllocatorPort,
    schema::{Attribute, PlanAction},
};

pub mod allocation;
pub mod pool;

/// The result of refreshing a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome<S> {
    /// The resource exists.
    Present(S),
    /// The resource no longer exists and should be dropped from tracked state.
    Gone,
}

impl<S> ReadOutcome<S> {
    /// The state, if the resource exists.
    pub fn present(self) -> Option<S> {
        match self {
            ReadOutcome::Present(state) => Some(state),
            ReadOutcome::Gone => None,
        }
    }
}

/// Dependencies shared by all reconcilers.
#[derive(Clone)]
pub struct ReconcileContext {
    port: Arc<dyn AllocatorPort>,
    guard: Arc<dyn StoreGuard>,
}

impl std::fmt::Debug for ReconcileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileContext").finish_non_exhaustive()
    }
}

impl ReconcileContext {
    /// Creates a new context.
    pub fn new(port: Arc<dyn AllocatorPort>, guard: Arc<dyn StoreGuard>) -> Self {
        Self { port, guard }
    }

    /// The allocator.
    pub fn port(&self) -> &dyn AllocatorPort {
        self.port.as_ref()
    }

    /// Waits for a permit of the given mode, giving up once `cancel` fires.
    pub(crate) async fn permit(
        &self,
        mode: GuardMode,
        resource: &'static str,
        operation: Operation,
        cancel: &CancellationToken,
    ) -> Result<GuardPermit<'_>, ReconcileError> {
        let acquire = match mode {
            GuardMode::Shared => self.guard.shared(),
            GuardMode::Exclusive => self.guard.exclusive(),
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(resource, %operation, "Cancelled while waiting for allocator access");
                Err(ReconcileError::Cancelled { resource, operation })
            }
            permit = acquire => Ok(permit),
        }
    }
}

/// Lifecycle of a declared resource type.
///
/// Every verb that reaches the allocator first waits for the guard: reads in shared mode,
/// everything else in exclusive mode. Cancellation is honored while waiting. Once the
/// allocator call has started it runs to completion.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// User-declared fields.
    type Config: Send + Sync;
    /// Declared and computed fields as tracked between calls.
    type State: Clone + Send + Sync;

    /// The resource type name.
    const TYPE_NAME: &'static str;

    /// The declared attributes.
    fn attributes() -> &'static [Attribute];

    /// Plans how to get from the tracked state to the configuration.
    fn plan(prior: Option<&Self::State>, config: &Self::Config) -> PlanAction;

    /// Creates the resource.
    async fn create(
        &self,
        cancel: &CancellationToken,
        config: &Self::Config,
    ) -> Result<Self::State, ReconcileError>;

    /// Refreshes the tracked state.
    async fn read(
        &self,
        cancel: &CancellationToken,
        state: &Self::State,
    ) -> Result<ReadOutcome<Self::State>, ReconcileError>;

    /// Persists changed declared fields. Never changes address space.
    async fn update(
        &self,
        cancel: &CancellationToken,
        prior: &Self::State,
        config: &Self::Config,
    ) -> Result<Self::State, ReconcileError>;

    /// Destroys the resource.
    async fn delete(
        &self,
        cancel: &CancellationToken,
        state: &Self::State,
    ) -> Result<(), ReconcileError>;

    /// Brings an existing resource under management.
    async fn import(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ReconcileError>;
}

/// Drives `reconciler` from the tracked state `prior` to `config`.
///
/// A replacement destroys the old resource before creating the new one. If the creation fails
/// the old resource is gone nonetheless.
pub async fn apply<R: Reconciler>(
    reconciler: &R,
    cancel: &CancellationToken,
    prior: Option<&R::State>,
    config: &R::Config,
) -> Result<R::State, ReconcileError> {
    let plan = R::plan(prior, config);
    tracing::debug!(resource = R::TYPE_NAME, ?plan, "Applying configuration");

    match (plan, prior) {
        (PlanAction::Replace { changed }, Some(prior)) => {
            tracing::info!(resource = R::TYPE_NAME, ?changed, "Replacing resource");
            reconciler.delete(cancel, prior).await?;
            reconciler.create(cancel, config).await
        }
        (PlanAction::Update, Some(prior)) => reconciler.update(cancel, prior, config).await,
        (PlanAction::NoOp, Some(prior)) => Ok(prior.clone()),
        _ => reconciler.create(cancel, config).await,
    }
}
