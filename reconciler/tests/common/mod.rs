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
//! Test doubles shared by the reconciler integration tests.
#![allow(dead_code, missing_docs)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use ipam_prefix_manager::store::PrefixStore;
use ipam_reconciler::{
    guard::{GuardMode, GuardPermit, RwLockGuard, StoreGuard},
    port::{AllocatorError, AllocatorPort, Prefix},
    provider::Provider,
};

/// An in-memory allocator that records every call and optionally slows them down.
#[derive(Debug)]
pub struct CountingPort {
    pub store: PrefixStore,
    delay: Option<Duration>,
    calls: Mutex<Vec<&'static str>>,
}

impl CountingPort {
    pub fn new() -> Self {
        Self {
            store: PrefixStore::in_memory(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    async fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl AllocatorPort for CountingPort {
    async fn create_root_prefix(&self, cidr: &str) -> Result<Prefix, AllocatorError> {
        self.record("create_root_prefix").await;
        AllocatorPort::create_root_prefix(&self.store, cidr).await
    }

    async fn delete_root_prefix(&self, cidr: &str) -> Result<(), AllocatorError> {
        self.record("delete_root_prefix").await;
        AllocatorPort::delete_root_prefix(&self.store, cidr).await
    }

    async fn resolve_prefix(&self, cidr: &str) -> Result<Option<Prefix>, AllocatorError> {
        self.record("resolve_prefix").await;
        AllocatorPort::resolve_prefix(&self.store, cidr).await
    }

    async fn acquire_child(
        &self,
        parent_cidr: &str,
        size_bits: u8,
    ) -> Result<Prefix, AllocatorError> {
        self.record("acquire_child").await;
        AllocatorPort::acquire_child(&self.store, parent_cidr, size_bits).await
    }

    async fn release_child(&self, parent_cidr: &str, child_cidr: &str) -> Result<(), AllocatorError> {
        self.record("release_child").await;
        AllocatorPort::release_child(&self.store, parent_cidr, child_cidr).await
    }
}

/// Counts permit holders and records every time the guard lets incompatible holders in.
#[derive(Debug, Default)]
pub struct GuardStats {
    readers: AtomicUsize,
    writers: AtomicUsize,
    max_readers: AtomicUsize,
    exclusive_grants: AtomicUsize,
    violations: AtomicUsize,
}

impl GuardStats {
    pub fn violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }

    pub fn max_readers(&self) -> usize {
        self.max_readers.load(Ordering::SeqCst)
    }

    pub fn exclusive_grants(&self) -> usize {
        self.exclusive_grants.load(Ordering::SeqCst)
    }
}

struct Tracker {
    stats: Arc<GuardStats>,
    mode: GuardMode,
}

impl Tracker {
    fn enter(stats: Arc<GuardStats>, mode: GuardMode) -> Self {
        match mode {
            GuardMode::Shared => {
                if stats.writers.load(Ordering::SeqCst) > 0 {
                    stats.violations.fetch_add(1, Ordering::SeqCst);
                }
                let readers = stats.readers.fetch_add(1, Ordering::SeqCst) + 1;
                stats.max_readers.fetch_max(readers, Ordering::SeqCst);
            }
            GuardMode::Exclusive => {
                if stats.writers.fetch_add(1, Ordering::SeqCst) > 0
                    || stats.readers.load(Ordering::SeqCst) > 0
                {
                    stats.violations.fetch_add(1, Ordering::SeqCst);
                }
                stats.exclusive_grants.fetch_add(1, Ordering::SeqCst);
            }
        }
        Self { stats, mode }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        match self.mode {
            GuardMode::Shared => self.stats.readers.fetch_sub(1, Ordering::SeqCst),
            GuardMode::Exclusive => self.stats.writers.fetch_sub(1, Ordering::SeqCst),
        };
    }
}

/// A [RwLockGuard] that reports into [GuardStats].
#[derive(Debug, Clone, Default)]
pub struct InstrumentedGuard {
    pub inner: RwLockGuard,
    pub stats: Arc<GuardStats>,
}

#[async_trait]
impl StoreGuard for InstrumentedGuard {
    async fn shared(&self) -> GuardPermit<'_> {
        let permit = self.inner.shared().await;
        // The tracker is dropped before the permit releases the lock.
        let tracker = Tracker::enter(self.stats.clone(), GuardMode::Shared);
        GuardPermit::new(GuardMode::Shared, (tracker, permit))
    }

    async fn exclusive(&self) -> GuardPermit<'_> {
        let permit = self.inner.exclusive().await;
        let tracker = Tracker::enter(self.stats.clone(), GuardMode::Exclusive);
        GuardPermit::new(GuardMode::Exclusive, (tracker, permit))
    }
}

/// A provider over a fresh [CountingPort] and [RwLockGuard].
pub fn provider() -> (Provider, Arc<CountingPort>) {
    let port = Arc::new(CountingPort::new());
    let provider = Provider::new(port.clone(), Arc::new(RwLockGuard::new()));
    (provider, port)
}
