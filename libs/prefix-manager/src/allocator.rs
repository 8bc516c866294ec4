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
//! A first-fit allocator of child blocks within a prefix.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use thiserror::Error;

/// The child blocks carved from a single prefix.
// Impl Note:
// Children are keyed by the bits of their network address, IPv4 addresses zero-extended.
// All arithmetic happens on u128 with checked operations so that `::/0` does not overflow.
// Every child is aligned to its own size, which keeps gap search a single ordered pass.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct ChildAllocator {
    prefix: IpNet,
    children: std::collections::BTreeMap<u128, IpNet>,
}

/// Child allocation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChildAllocatorError {
    /// Requested length cannot be carved from the prefix.
    #[error("child length /{requested} must be longer than /{parent} and at most /{max}")]
    InvalidChildLength {
        /// The requested child prefix length.
        requested: u8,
        /// The prefix length of the parent.
        parent: u8,
        /// The maximum prefix length of the address family.
        max: u8,
    },
    /// No aligned block of the requested length is free.
    #[error("no free /{0} block left")]
    Exhausted(u8),
    /// The child does not lie within the prefix.
    #[error("{child} is not within {parent}")]
    NotWithinPrefix {
        /// The offending child.
        child: IpNet,
        /// The prefix the child was checked against.
        parent: IpNet,
    },
    /// The child overlaps an already allocated child.
    #[error("{0} overlaps already allocated {1}")]
    Overlap(IpNet, IpNet),
    /// The child is not allocated.
    #[error("{0} is not allocated")]
    NotAllocated(IpNet),
}

impl ChildAllocator {
    /// Creates an allocator without any children for `prefix`.
    pub fn new(prefix: IpNet) -> Self {
        Self {
            prefix,
            children: Default::default(),
        }
    }

    /// The prefix children are carved from.
    pub fn prefix(&self) -> IpNet {
        self.prefix
    }

    /// Returns true if no child is allocated.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of allocated children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Allocated children ordered by network address.
    pub fn children(&self) -> impl Iterator<Item = &IpNet> {
        self.children.values()
    }

    /// Returns true if exactly `child` is allocated.
    pub fn is_allocated(&self, child: &IpNet) -> bool {
        self.children.get(&first_bits(child)) == Some(child)
    }

    /// Allocates the lowest free block with the given prefix length.
    pub fn allocate(&mut self, len: u8) -> Result<IpNet, ChildAllocatorError> {
        self.check_child_len(len)?;

        let size = 1u128 << (self.prefix.max_prefix_len() - len);
        let last = last_bits(&self.prefix);
        let mut candidate = first_bits(&self.prefix);

        for child in self.children.values() {
            let (start, end) = (first_bits(child), last_bits(child));
            if end < candidate {
                continue;
            }
            // Gap in front of this child is large enough.
            if candidate
                .checked_add(size - 1)
                .is_some_and(|block_end| block_end < start)
            {
                break;
            }
            candidate = end
                .checked_add(1)
                .and_then(|next| align_up(next, size))
                .ok_or(ChildAllocatorError::Exhausted(len))?;
        }

        match candidate.checked_add(size - 1) {
            Some(block_end) if block_end <= last => {}
            _ => return Err(ChildAllocatorError::Exhausted(len)),
        }

        let child = net_from_bits(&self.prefix, candidate, len);
        self.children.insert(candidate, child);
        Ok(child)
    }

    /// Marks a specific child as allocated.
    ///
    /// Returns an error if the child is not a proper sub-block of the prefix or overlaps an
    /// allocated child.
    pub fn reserve(&mut self, child: IpNet) -> Result<(), ChildAllocatorError> {
        if !self.prefix.contains(&child) || child.trunc() != child {
            return Err(ChildAllocatorError::NotWithinPrefix {
                child,
                parent: self.prefix,
            });
        }
        self.check_child_len(child.prefix_len())?;

        let start = first_bits(&child);
        let end = last_bits(&child);
        let before = self.children.range(..=start).next_back();
        let after = self.children.range(start..).next();
        for (_, existing) in before.into_iter().chain(after) {
            if first_bits(existing) <= end && start <= last_bits(existing) {
                return Err(ChildAllocatorError::Overlap(child, *existing));
            }
        }

        self.children.insert(start, child);
        Ok(())
    }

    /// Releases a previously allocated child.
    pub fn release(&mut self, child: &IpNet) -> Result<(), ChildAllocatorError> {
        if !self.is_allocated(child) {
            return Err(ChildAllocatorError::NotAllocated(*child));
        }
        self.children.remove(&first_bits(child));
        Ok(())
    }

    fn check_child_len(&self, len: u8) -> Result<(), ChildAllocatorError> {
        if len <= self.prefix.prefix_len() || len > self.prefix.max_prefix_len() {
            return Err(ChildAllocatorError::InvalidChildLength {
                requested: len,
                parent: self.prefix.prefix_len(),
                max: self.prefix.max_prefix_len(),
            });
        }
        Ok(())
    }
}

fn addr_bits(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(addr) => u32::from(addr).into(),
        IpAddr::V6(addr) => u128::from(addr),
    }
}

fn first_bits(net: &IpNet) -> u128 {
    addr_bits(net.network())
}

fn last_bits(net: &IpNet) -> u128 {
    addr_bits(net.broadcast())
}

/// Rounds `value` up to the next multiple of `size`, a power of two.
fn align_up(value: u128, size: u128) -> Option<u128> {
    value.checked_add(size - 1).map(|v| v & !(size - 1))
}

/// Builds a prefix of the same family as `family` from address bits.
fn net_from_bits(family: &IpNet, bits: u128, len: u8) -> IpNet {
    match family {
        IpNet::V4(_) => IpNet::V4(Ipv4Net::new_assert(Ipv4Addr::from(bits as u32), len)),
        IpNet::V6(_) => IpNet::V6(Ipv6Net::new_assert(Ipv6Addr::from(bits), len)),
    }
}
