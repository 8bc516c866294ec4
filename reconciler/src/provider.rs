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
//! Process-wide provider configuration.

use std::{path::PathBuf, sync::Arc};

use ipam_prefix_manager::store::{PrefixStore, PrefixStoreError, Storage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    guard::{RwLockGuard, StoreGuard},
    port::AllocatorPort,
    resource::{ReconcileContext, allocation::AllocationReconciler, pool::PoolReconciler},
};

/// State file used when none is configured.
pub const DEFAULT_STATE_FILE: &str = "./default.ipam.json";

/// Provider configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Path of the allocator state file.
    pub file: Option<PathBuf>,
}

impl ProviderConfig {
    /// The configured state file, or [DEFAULT_STATE_FILE].
    pub fn resolved_file(&self) -> PathBuf {
        self.file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE))
    }
}

/// Provider configuration errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The allocator state could not be opened.
    #[error("failed to open allocator state: {0}")]
    Storage(#[from] PrefixStoreError),
}

/// Owns the allocator and the guard for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Provider {
    context: ReconcileContext,
}

impl Provider {
    /// Opens the configured state file and creates the process-wide guard.
    pub async fn configure(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let file = config.resolved_file();
        tracing::info!(file = %file.display(), "Configuring provider");

        let store = PrefixStore::open(Storage::LocalFile(file)).await?;
        Ok(Self::new(Arc::new(store), Arc::new(RwLockGuard::new())))
    }

    /// Creates a provider around an existing allocator and guard.
    pub fn new(port: Arc<dyn AllocatorPort>, guard: Arc<dyn StoreGuard>) -> Self {
        Self {
            context: ReconcileContext::new(port, guard),
        }
    }

    /// The pool reconciler.
    pub fn pools(&self) -> PoolReconciler {
        PoolReconciler::new(self.context.clone())
    }

    /// The allocation reconciler.
    pub fn allocations(&self) -> AllocationReconciler {
        AllocationReconciler::new(self.context.clone())
    }
}
