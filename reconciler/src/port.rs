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
//! The prefix allocator as seen by the reconcilers.

use async_trait::async_trait;
use ipam_prefix_manager::{
    manager::{self, PrefixManagerError},
    store::{PrefixStore, PrefixStoreError},
};
use ipnet::IpNet;
use thiserror::Error;

/// A prefix as reported by the allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    /// The prefix in CIDR notation.
    pub cidr: String,
    /// The prefix this one was acquired from, `None` for root prefixes.
    pub parent_cidr: Option<String>,
}

impl From<manager::Prefix> for Prefix {
    fn from(prefix: manager::Prefix) -> Self {
        Self {
            cidr: prefix.cidr.to_string(),
            parent_cidr: prefix.parent_cidr.map(|parent| parent.to_string()),
        }
    }
}

/// Allocator errors.
#[derive(Debug, Error)]
pub enum AllocatorError {
    /// The allocator does not know the prefix.
    #[error("prefix {0} not found")]
    NotFound(String),
    /// The allocator rejected the operation.
    #[error(transparent)]
    Rejected(Box<dyn std::error::Error + Send + Sync>),
}

/// Operations the reconcilers need from a hierarchical prefix allocator.
///
/// Implementations choose which child is acquired and guarantee that children of the same
/// parent never overlap. They need not be safe under concurrent mutation; callers serialize
/// mutations with a [crate::guard::StoreGuard].
#[async_trait]
pub trait AllocatorPort: Send + Sync {
    /// Registers `cidr` as a root prefix.
    async fn create_root_prefix(&self, cidr: &str) -> Result<Prefix, AllocatorError>;

    /// Deregisters a root prefix. Fails while children are still acquired from it.
    async fn delete_root_prefix(&self, cidr: &str) -> Result<(), AllocatorError>;

    /// Looks up a prefix. `Ok(None)` means the allocator positively does not know it.
    async fn resolve_prefix(&self, cidr: &str) -> Result<Option<Prefix>, AllocatorError>;

    /// Acquires a new child of `size_bits` prefix length from `parent_cidr`.
    async fn acquire_child(&self, parent_cidr: &str, size_bits: u8)
    -> Result<Prefix, AllocatorError>;

    /// Releases `child_cidr` back to `parent_cidr`.
    async fn release_child(&self, parent_cidr: &str, child_cidr: &str)
    -> Result<(), AllocatorError>;
}

fn parse(cidr: &str) -> Result<IpNet, AllocatorError> {
    cidr.parse::<IpNet>()
        .map_err(|e| AllocatorError::Rejected(format!("invalid prefix {cidr:?}: {e}").into()))
}

impl From<PrefixStoreError> for AllocatorError {
    fn from(err: PrefixStoreError) -> Self {
        match err {
            PrefixStoreError::Manager(PrefixManagerError::NotFound(cidr)) => {
                AllocatorError::NotFound(cidr.to_string())
            }
            other => AllocatorError::Rejected(Box::new(other)),
        }
    }
}

#[async_trait]
impl AllocatorPort for PrefixStore {
    async fn create_root_prefix(&self, cidr: &str) -> Result<Prefix, AllocatorError> {
        let prefix = PrefixStore::create_root_prefix(self, parse(cidr)?).await?;
        Ok(prefix.into())
    }

    async fn delete_root_prefix(&self, cidr: &str) -> Result<(), AllocatorError> {
        PrefixStore::delete_root_prefix(self, parse(cidr)?).await?;
        Ok(())
    }

    async fn resolve_prefix(&self, cidr: &str) -> Result<Option<Prefix>, AllocatorError> {
        Ok(PrefixStore::resolve_prefix(self, parse(cidr)?)
            .await
            .map(Prefix::from))
    }

    async fn acquire_child(
        &self,
        parent_cidr: &str,
        size_bits: u8,
    ) -> Result<Prefix, AllocatorError> {
        let prefix = PrefixStore::acquire_child(self, parse(parent_cidr)?, size_bits).await?;
        Ok(prefix.into())
    }

    async fn release_child(&self, parent_cidr: &str, child_cidr: &str) -> Result<(), AllocatorError> {
        PrefixStore::release_child(self, parse(parent_cidr)?, parse(child_cidr)?).await?;
        Ok(())
    }
}
