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
//! Shared, optionally file-backed prefix registry.

use std::{path::PathBuf, sync::Arc};

use ipam_io_util::{read_file_if_exists, write_file};
use ipnet::IpNet;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::manager::{Prefix, PrefixManager, PrefixManagerError, dto::PrefixManagerDto};

/// Where the registry state lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    /// State is lost when the store is dropped.
    Memory,
    /// State is loaded from and written to a JSON file.
    LocalFile(PathBuf),
}

/// Prefix store errors.
#[derive(Debug, Error)]
pub enum PrefixStoreError {
    /// The registry rejected the operation.
    #[error(transparent)]
    Manager(#[from] PrefixManagerError),
    /// The state file could not be loaded.
    #[error("failed to load prefix state from {}: {source:#}", path.display())]
    Load {
        /// The state file.
        path: PathBuf,
        /// What went wrong.
        source: anyhow::Error,
    },
    /// The new state could not be written.
    #[error("failed to persist prefix state to {}: {source}", path.display())]
    Persist {
        /// The state file.
        path: PathBuf,
        /// What went wrong.
        source: std::io::Error,
    },
}

/// A shared [PrefixManager] with its [Storage].
///
/// Mutations are applied to a copy of the registry, persisted and only then made visible. A
/// failed write leaves the registry unchanged.
#[derive(Debug, Clone)]
pub struct PrefixStore {
    state: Arc<Mutex<PrefixManager>>,
    storage: Storage,
}

impl PrefixStore {
    /// Creates an empty, in-memory store.
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(Mutex::new(PrefixManager::new())),
            storage: Storage::Memory,
        }
    }

    /// Opens a store. A missing state file results in an empty registry.
    pub async fn open(storage: Storage) -> Result<Self, PrefixStoreError> {
        let manager = match &storage {
            Storage::Memory => PrefixManager::new(),
            Storage::LocalFile(path) => {
                let load_error = |source: anyhow::Error| {
                    PrefixStoreError::Load {
                        path: path.clone(),
                        source,
                    }
                };
                match read_file_if_exists::<_, PrefixManagerDto>(path)
                    .await
                    .map_err(|e| load_error(e.into()))?
                {
                    Some(dto) => PrefixManager::try_from(dto).map_err(load_error)?,
                    None => {
                        tracing::info!(path = %path.display(), "No prefix state found, starting empty");
                        PrefixManager::new()
                    }
                }
            }
        };

        tracing::debug!(prefixes = manager.len(), storage = ?storage, "Opened prefix store");
        Ok(Self {
            state: Arc::new(Mutex::new(manager)),
            storage,
        })
    }

    /// The storage backing this store.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// See [PrefixManager::create_root_prefix].
    pub async fn create_root_prefix(&self, cidr: IpNet) -> Result<Prefix, PrefixStoreError> {
        self.mutate(|manager| manager.create_root_prefix(cidr))
            .await
    }

    /// See [PrefixManager::delete_root_prefix].
    pub async fn delete_root_prefix(&self, cidr: IpNet) -> Result<Prefix, PrefixStoreError> {
        self.mutate(|manager| manager.delete_root_prefix(&cidr))
            .await
    }

    /// See [PrefixManager::resolve].
    pub async fn resolve_prefix(&self, cidr: IpNet) -> Option<Prefix> {
        self.state.lock().await.resolve(&cidr)
    }

    /// See [PrefixManager::acquire_child].
    pub async fn acquire_child(&self, parent: IpNet, len: u8) -> Result<Prefix, PrefixStoreError> {
        self.mutate(|manager| manager.acquire_child(&parent, len))
            .await
    }

    /// See [PrefixManager::release_child].
    pub async fn release_child(&self, parent: IpNet, child: IpNet) -> Result<(), PrefixStoreError> {
        self.mutate(|manager| manager.release_child(&parent, &child))
            .await
    }

    /// A copy of the current registry state.
    pub async fn snapshot(&self) -> PrefixManagerDto {
        PrefixManagerDto::from(&*self.state.lock().await)
    }

    async fn mutate<T>(
        &self,
        op: impl FnOnce(&mut PrefixManager) -> Result<T, PrefixManagerError>,
    ) -> Result<T, PrefixStoreError> {
        let mut state_guard = self.state.lock().await;

        let mut next = state_guard.clone();
        let out = op(&mut next)?;

        if let Storage::LocalFile(path) = &self.storage {
            write_file(path, &PrefixManagerDto::from(&next))
                .await
                .map_err(|source| {
                    PrefixStoreError::Persist {
                        path: path.clone(),
                        source,
                    }
                })?;
        }

        *state_guard = next;
        Ok(out)
    }
}
