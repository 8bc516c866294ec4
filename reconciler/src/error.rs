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
//! Reconciliation errors.

use derive_more::Display;
use thiserror::Error;

use crate::port::AllocatorError;

/// A lifecycle verb.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create.
    #[display("create")]
    Create,
    /// Read.
    #[display("read")]
    Read,
    /// Update.
    #[display("update")]
    Update,
    /// Delete.
    #[display("delete")]
    Delete,
    /// Import.
    #[display("import")]
    Import,
}

/// Errors reported by the reconcilers.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The declared model was rejected before any allocator interaction.
    #[error("invalid {attribute}: {reason}")]
    Validation {
        /// The offending attribute.
        attribute: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// The allocator rejected the operation.
    #[error("failed to {operation} {resource}: {source}")]
    Allocator {
        /// The resource type.
        resource: &'static str,
        /// The operation that failed.
        operation: Operation,
        /// The allocator error, verbatim.
        #[source]
        source: AllocatorError,
    },
    /// The operation was abandoned before it reached the allocator.
    #[error("{operation} of {resource} cancelled")]
    Cancelled {
        /// The resource type.
        resource: &'static str,
        /// The operation that was abandoned.
        operation: Operation,
    },
}

impl ReconcileError {
    pub(crate) fn validation(attribute: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            attribute,
            reason: reason.into(),
        }
    }

    /// Wraps allocator errors of `operation` on `resource`, for use with `map_err`.
    pub(crate) fn allocator(
        resource: &'static str,
        operation: Operation,
    ) -> impl FnOnce(AllocatorError) -> Self {
        move |source| {
            Self::Allocator {
                resource,
                operation,
                source,
            }
        }
    }

    /// Returns true if the declared model was rejected before reaching the allocator.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
