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
//! Hierarchical prefix registry.

use std::collections::BTreeMap;

use ipnet::IpNet;
use thiserror::Error;

use crate::allocator::{ChildAllocator, ChildAllocatorError};

pub mod dto;

/// Prefix management errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrefixManagerError {
    /// Prefix has host bits set.
    #[error("invalid prefix {0}: host bits must be zero")]
    InvalidPrefix(IpNet),
    /// Prefix overlaps an existing root prefix.
    #[error("{0} overlaps existing prefix {1}")]
    Overlap(IpNet, IpNet),
    /// Prefix is not known.
    #[error("prefix {0} not found")]
    NotFound(IpNet),
    /// Prefix was acquired as a child and cannot be deleted as a root.
    #[error("{prefix} is a child of {parent}, release it instead")]
    NotARootPrefix {
        /// The prefix that was to be deleted.
        prefix: IpNet,
        /// Its parent.
        parent: IpNet,
    },
    /// Prefix still has acquired children.
    #[error("prefix {0} has {1} child prefixes, release these first")]
    HasChildren(IpNet, usize),
    /// Prefix is not a child of the given parent.
    #[error("{child} is not a child of {parent}")]
    NotAChild {
        /// The prefix that was to be released.
        child: IpNet,
        /// The parent it was to be released from.
        parent: IpNet,
    },
    /// Child allocation failed.
    #[error(transparent)]
    ChildAllocation(#[from] ChildAllocatorError),
}

/// A prefix known to the [PrefixManager].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Prefix {
    /// The prefix itself.
    pub cidr: IpNet,
    /// The prefix this one was acquired from, `None` for root prefixes.
    pub parent_cidr: Option<IpNet>,
}

// Internal structure to keep track of prefixes
#[derive(Debug, PartialEq, Eq, Clone)]
struct PrefixEntry {
    parent: Option<IpNet>,
    children: ChildAllocator,
}

/// Registry of root prefixes and the children acquired from them.
///
/// Acquired children are prefixes in their own right and can be used as parents again.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct PrefixManager {
    prefixes: BTreeMap<IpNet, PrefixEntry>,
}

impl PrefixManager {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new root prefix.
    ///
    /// Fails if the prefix has host bits set or overlaps any existing root prefix.
    pub fn create_root_prefix(&mut self, cidr: IpNet) -> Result<Prefix, PrefixManagerError> {
        if cidr.trunc() != cidr {
            return Err(PrefixManagerError::InvalidPrefix(cidr));
        }
        if let Some(existing) = self.roots().find(|root| overlaps(root, &cidr)) {
            return Err(PrefixManagerError::Overlap(cidr, existing));
        }

        self.prefixes.insert(
            cidr,
            PrefixEntry {
                parent: None,
                children: ChildAllocator::new(cidr),
            },
        );
        Ok(Prefix {
            cidr,
            parent_cidr: None,
        })
    }

    /// Removes a root prefix that has no children left.
    pub fn delete_root_prefix(&mut self, cidr: &IpNet) -> Result<Prefix, PrefixManagerError> {
        let entry = self
            .prefixes
            .get(cidr)
            .ok_or(PrefixManagerError::NotFound(*cidr))?;

        if let Some(parent) = entry.parent {
            return Err(PrefixManagerError::NotARootPrefix {
                prefix: *cidr,
                parent,
            });
        }
        if !entry.children.is_empty() {
            return Err(PrefixManagerError::HasChildren(
                *cidr,
                entry.children.len(),
            ));
        }

        self.prefixes.remove(cidr);
        Ok(Prefix {
            cidr: *cidr,
            parent_cidr: None,
        })
    }

    /// Looks up a root or child prefix.
    pub fn resolve(&self, cidr: &IpNet) -> Option<Prefix> {
        self.prefixes.get(cidr).map(|entry| {
            Prefix {
                cidr: *cidr,
                parent_cidr: entry.parent,
            }
        })
    }

    /// Acquires the lowest free child of length `len` from `parent`.
    pub fn acquire_child(&mut self, parent: &IpNet, len: u8) -> Result<Prefix, PrefixManagerError> {
        let entry = self
            .prefixes
            .get_mut(parent)
            .ok_or(PrefixManagerError::NotFound(*parent))?;

        let child = entry.children.allocate(len)?;
        self.prefixes.insert(
            child,
            PrefixEntry {
                parent: Some(*parent),
                children: ChildAllocator::new(child),
            },
        );

        Ok(Prefix {
            cidr: child,
            parent_cidr: Some(*parent),
        })
    }

    /// Releases `child` back to `parent`.
    ///
    /// Fails if the child is unknown, belongs to another parent or has children of its own.
    pub fn release_child(&mut self, parent: &IpNet, child: &IpNet) -> Result<(), PrefixManagerError> {
        let entry = self
            .prefixes
            .get(child)
            .ok_or(PrefixManagerError::NotFound(*child))?;

        if entry.parent != Some(*parent) {
            return Err(PrefixManagerError::NotAChild {
                child: *child,
                parent: *parent,
            });
        }
        if !entry.children.is_empty() {
            return Err(PrefixManagerError::HasChildren(
                *child,
                entry.children.len(),
            ));
        }

        match self.prefixes.get_mut(parent) {
            Some(parent_entry) => {
                if let Err(e) = parent_entry.children.release(child) {
                    tracing::warn!(
                        %parent, %child,
                        "Parent allocator did not contain an existing child - this should never happen: {e}"
                    );
                }
            }
            None => {
                tracing::warn!(
                    %parent, %child,
                    "Parent of an existing child is missing - this should never happen"
                );
            }
        }
        self.prefixes.remove(child);
        Ok(())
    }

    /// All root prefixes, ordered.
    pub fn roots(&self) -> impl Iterator<Item = IpNet> + '_ {
        self.prefixes
            .iter()
            .filter(|(_, entry)| entry.parent.is_none())
            .map(|(cidr, _)| *cidr)
    }

    /// The children acquired from `parent`, ordered by network address.
    pub fn children(&self, parent: &IpNet) -> Option<Vec<IpNet>> {
        self.prefixes
            .get(parent)
            .map(|entry| entry.children.children().copied().collect())
    }

    /// Number of known prefixes, roots and children.
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    /// Returns true if no prefix is known.
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

/// Aligned prefixes overlap iff one contains the other.
fn overlaps(a: &IpNet, b: &IpNet) -> bool {
    a.contains(b) || b.contains(a)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    fn get_manager() -> PrefixManager {
        let mut manager = PrefixManager::new();
        manager.create_root_prefix(net("10.0.0.0/16")).unwrap();
        manager
    }

    #[test]
    fn should_fail_on_overlapping_root() {
        let mut manager = get_manager();

        for cidr in ["10.0.0.0/16", "10.0.128.0/17", "10.0.0.0/8"] {
            assert_eq!(
                manager.create_root_prefix(net(cidr)),
                Err(PrefixManagerError::Overlap(net(cidr), net("10.0.0.0/16"))),
                "{cidr} should overlap"
            );
        }
        manager
            .create_root_prefix(net("10.1.0.0/16"))
            .expect("adjacent prefix should not overlap");
        manager
            .create_root_prefix(net("2001:db8::/48"))
            .expect("other family should not overlap");
    }

    #[test]
    fn should_fail_on_host_bits() {
        let mut manager = PrefixManager::new();
        assert_eq!(
            manager.create_root_prefix(net("10.0.0.1/16")),
            Err(PrefixManagerError::InvalidPrefix(net("10.0.0.1/16")))
        );
        assert!(manager.is_empty());
    }

    #[test]
    fn should_acquire_and_resolve_child() {
        let mut manager = get_manager();

        let child = manager.acquire_child(&net("10.0.0.0/16"), 24).unwrap();
        assert_eq!(
            child,
            Prefix {
                cidr: net("10.0.0.0/24"),
                parent_cidr: Some(net("10.0.0.0/16")),
            }
        );
        assert_eq!(manager.resolve(&child.cidr), Some(child));
        assert_eq!(
            manager.resolve(&net("10.0.0.0/16")).unwrap().parent_cidr,
            None
        );
        assert_eq!(manager.resolve(&net("10.0.1.0/24")), None);
    }

    #[test]
    fn should_fail_to_delete_root_with_children() {
        let mut manager = get_manager();
        let root = net("10.0.0.0/16");
        let child = manager.acquire_child(&root, 24).unwrap();

        assert_eq!(
            manager.delete_root_prefix(&root),
            Err(PrefixManagerError::HasChildren(root, 1))
        );
        assert!(manager.resolve(&root).is_some());

        manager.release_child(&root, &child.cidr).unwrap();
        manager.delete_root_prefix(&root).unwrap();
        assert!(manager.is_empty());
    }

    #[test]
    fn should_fail_to_delete_child_as_root() {
        let mut manager = get_manager();
        let root = net("10.0.0.0/16");
        let child = manager.acquire_child(&root, 24).unwrap();

        assert_eq!(
            manager.delete_root_prefix(&child.cidr),
            Err(PrefixManagerError::NotARootPrefix {
                prefix: child.cidr,
                parent: root,
            })
        );
        assert_eq!(
            manager.delete_root_prefix(&net("192.168.0.0/24")),
            Err(PrefixManagerError::NotFound(net("192.168.0.0/24")))
        );
    }

    #[test]
    fn should_fail_to_release_unknown_or_foreign_child() {
        let mut manager = get_manager();
        let root = net("10.0.0.0/16");
        let other_root = net("10.1.0.0/16");
        manager.create_root_prefix(other_root).unwrap();
        let child = manager.acquire_child(&root, 24).unwrap();

        assert_eq!(
            manager.release_child(&other_root, &child.cidr),
            Err(PrefixManagerError::NotAChild {
                child: child.cidr,
                parent: other_root,
            })
        );

        manager.release_child(&root, &child.cidr).unwrap();
        assert_eq!(
            manager.release_child(&root, &child.cidr),
            Err(PrefixManagerError::NotFound(child.cidr)),
            "second release must fail"
        );
    }

    #[test]
    fn should_reuse_released_child() {
        let mut manager = get_manager();
        let root = net("10.0.0.0/16");

        let first = manager.acquire_child(&root, 24).unwrap();
        manager.release_child(&root, &first.cidr).unwrap();
        let second = manager.acquire_child(&root, 24).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn should_nest_children() {
        let mut manager = get_manager();
        let root = net("10.0.0.0/16");

        let child = manager.acquire_child(&root, 20).unwrap();
        let grandchild = manager.acquire_child(&child.cidr, 24).unwrap();
        assert_eq!(grandchild.cidr, net("10.0.0.0/24"));
        assert_eq!(grandchild.parent_cidr, Some(child.cidr));

        // A /24 from the root must skip the /20 taken by the child.
        assert_eq!(
            manager.acquire_child(&root, 24).unwrap().cidr,
            net("10.0.16.0/24")
        );

        assert_eq!(
            manager.release_child(&root, &child.cidr),
            Err(PrefixManagerError::HasChildren(child.cidr, 1))
        );
        manager.release_child(&child.cidr, &grandchild.cidr).unwrap();
        manager.release_child(&root, &child.cidr).unwrap();
        assert_eq!(manager.children(&root), Some(vec![net("10.0.16.0/24")]));
    }

    #[test]
    fn should_fail_to_acquire_from_unknown_parent() {
        let mut manager = get_manager();
        assert_eq!(
            manager.acquire_child(&net("10.5.0.0/16"), 24),
            Err(PrefixManagerError::NotFound(net("10.5.0.0/16")))
        );
        assert_eq!(
            manager.acquire_child(&net("10.0.0.0/16"), 12),
            Err(PrefixManagerError::ChildAllocation(
                ChildAllocatorError::InvalidChildLength {
                    requested: 12,
                    parent: 16,
                    max: 32,
                }
            ))
        );
    }
}
