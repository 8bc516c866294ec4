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
//! # IPAM reconciler
//!
//! Reconciles declared CIDR pools and the allocations carved from them against a hierarchical
//! prefix allocator.
//!
//! - [port::AllocatorPort] is what the reconcilers need from the allocator.
//! - [guard::StoreGuard] serializes access to it: reads share, mutations are exclusive.
//! - [resource::pool::PoolReconciler] and [resource::allocation::AllocationReconciler]
//!   implement the lifecycle verbs of [resource::Reconciler].
//! - [schema] describes the declared attributes and plans replacements.
//! - [provider::Provider] wires everything up from a [provider::ProviderConfig].

pub mod cli;
pub mod error;
pub mod guard;
pub mod port;
pub mod provider;
pub mod resource;
pub mod schema;

pub use error::{Operation, ReconcileError};
pub use resource::{ReadOutcome, Reconciler, apply};
