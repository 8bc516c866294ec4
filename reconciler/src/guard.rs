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
//! Serialization of allocator access.
//!
//! Every reconciler operation holds a [GuardPermit] for its whole allocator interaction.
//! Reads take a shared permit, everything that mutates the allocator takes an exclusive one.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// The kind of access a permit grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardMode {
    /// Any number of shared permits may be held at the same time.
    Shared,
    /// An exclusive permit excludes every other permit.
    Exclusive,
}

/// Access to the allocator, released on drop.
pub struct GuardPermit<'a> {
    mode: GuardMode,
    _held: Box<dyn Send + Sync + 'a>,
}

impl<'a> GuardPermit<'a> {
    /// Creates a permit that releases `held` when dropped.
    pub fn new(mode: GuardMode, held: impl Send + Sync + 'a) -> Self {
        Self {
            mode,
            _held: Box::new(held),
        }
    }

    /// The kind of access granted.
    pub fn mode(&self) -> GuardMode {
        self.mode
    }
}

impl std::fmt::Debug for GuardPermit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardPermit")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Hands out shared and exclusive permits.
///
/// Acquisition waits without bound. Callers that need to give up race the acquisition against
/// a cancellation token.
#[async_trait]
pub trait StoreGuard: Send + Sync {
    /// Waits for a shared permit.
    async fn shared(&self) -> GuardPermit<'_>;

    /// Waits for an exclusive permit.
    async fn exclusive(&self) -> GuardPermit<'_>;
}

/// A [StoreGuard] backed by a single process-wide reader/writer lock.
///
/// Clones share the lock.
#[derive(Debug, Clone, Default)]
pub struct RwLockGuard {
    lock: Arc<RwLock<()>>,
}

impl RwLockGuard {
    /// Creates a guard with a fresh lock.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreGuard for RwLockGuard {
    async fn shared(&self) -> GuardPermit<'_> {
        GuardPermit::new(GuardMode::Shared, self.lock.read().await)
    }

    async fn exclusive(&self) -> GuardPermit<'_> {
        GuardPermit::new(GuardMode::Exclusive, self.lock.write().await)
    }
}

/// A [StoreGuard] that never waits, for allocators that serialize access themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGuard;

#[async_trait]
impl StoreGuard for NoopGuard {
    async fn shared(&self) -> GuardPermit<'_> {
        GuardPermit::new(GuardMode::Shared, ())
    }

    async fn exclusive(&self) -> GuardPermit<'_> {
        GuardPermit::new(GuardMode::Exclusive, ())
    }
}
