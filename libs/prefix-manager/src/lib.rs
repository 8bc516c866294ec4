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
//! # Prefix Manager
//!
//! Manage a hierarchy of CIDR prefixes.
//!
//! The [manager::PrefixManager] keeps track of root prefixes and of the child prefixes acquired
//! from them. Acquiring a child picks the lowest free, aligned block of the requested length.
//!
//! Which blocks of a single prefix are taken is managed by [allocator::ChildAllocator].
//! [store::PrefixStore] shares a registry between tasks and optionally persists it to a JSON
//! file after every mutation.

pub mod allocator;
pub mod manager;
pub mod store;
