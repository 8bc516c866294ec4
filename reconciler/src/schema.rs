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
//! Declared resource surface, validation and change planning.

use ipnet::IpNet;

use crate::error::ReconcileError;

/// Smallest accepted allocation prefix length.
pub const MIN_ALLOCATION_SIZE: u8 = 8;
/// Largest accepted allocation prefix length.
pub const MAX_ALLOCATION_SIZE: u8 = 32;

/// How an attribute is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// Set by the user.
    Required {
        /// A change can only be applied by destroying and recreating the resource.
        forces_replacement: bool,
    },
    /// Set by the reconciler.
    Computed {
        /// Kept from creation on, never re-derived on refresh.
        stable: bool,
    },
}

/// An attribute of a declared resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    /// The attribute name.
    pub name: &'static str,
    /// How the attribute is set.
    pub kind: AttributeKind,
    /// Human readable description.
    pub description: &'static str,
}

impl Attribute {
    /// Returns true if changing the attribute requires a replacement.
    pub fn forces_replacement(&self) -> bool {
        matches!(
            self.kind,
            AttributeKind::Required {
                forces_replacement: true
            }
        )
    }
}

/// Attributes of a pool.
pub const POOL_ATTRIBUTES: &[Attribute] = &[
    Attribute {
        name: "cidr",
        kind: AttributeKind::Required {
            forces_replacement: true,
        },
        description: "The CIDR block of the pool.",
    },
    Attribute {
        name: "id",
        kind: AttributeKind::Computed { stable: true },
        description: "The pool identifier, equal to its CIDR.",
    },
];

/// Attributes of an allocation.
pub const ALLOCATION_ATTRIBUTES: &[Attribute] = &[
    Attribute {
        name: "pool_id",
        kind: AttributeKind::Required {
            forces_replacement: true,
        },
        description: "The identifier of the pool to allocate from.",
    },
    Attribute {
        name: "size",
        kind: AttributeKind::Required {
            forces_replacement: true,
        },
        description: "The prefix length of the allocation, between 8 and 32.",
    },
    Attribute {
        name: "id",
        kind: AttributeKind::Computed { stable: true },
        description: "The allocation identifier, equal to its CIDR.",
    },
    Attribute {
        name: "cidr",
        kind: AttributeKind::Computed { stable: true },
        description: "The allocated CIDR block.",
    },
];

/// Parses a CIDR attribute. Addresses with host bits set are rejected.
pub fn validate_cidr(attribute: &'static str, value: &str) -> Result<IpNet, ReconcileError> {
    let net: IpNet = value
        .parse()
        .map_err(|e| ReconcileError::validation(attribute, format!("{value:?} is not a CIDR: {e}")))?;

    if net.trunc() != net {
        return Err(ReconcileError::validation(
            attribute,
            format!("{value} has host bits set, expected {}", net.trunc()),
        ));
    }

    Ok(net)
}

/// Checks an allocation size.
pub fn validate_size(size: i64) -> Result<u8, ReconcileError> {
    u8::try_from(size)
        .ok()
        .filter(|size| (MIN_ALLOCATION_SIZE..=MAX_ALLOCATION_SIZE).contains(size))
        .ok_or_else(|| {
            ReconcileError::validation(
                "size",
                format!(
                    "{size} is outside [{MIN_ALLOCATION_SIZE}, {MAX_ALLOCATION_SIZE}]"
                ),
            )
        })
}

/// What applying a configuration to a resource requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    /// The resource does not exist yet.
    Create,
    /// The resource must be destroyed and created again.
    Replace {
        /// The attributes whose change forces the replacement.
        changed: Vec<&'static str>,
    },
    /// Declared fields are persisted without touching the allocator.
    Update,
    /// Nothing to do.
    NoOp,
}

/// How a single attribute compares between the tracked state and the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diff {
    /// Equal.
    Same,
    /// Different.
    Changed,
    /// The tracked state does not know the value, as after an import.
    Unknown,
}

impl Diff {
    /// Compares two CIDRs by value, falling back to text if either does not parse.
    pub fn cidr(prior: Option<&str>, desired: &str) -> Self {
        let Some(prior) = prior else {
            return Diff::Unknown;
        };
        let same = match (prior.parse::<IpNet>(), desired.parse::<IpNet>()) {
            (Ok(prior), Ok(desired)) => prior == desired,
            _ => prior == desired,
        };
        if same { Diff::Same } else { Diff::Changed }
    }

    /// Compares two values.
    pub fn value<T: PartialEq>(prior: Option<T>, desired: T) -> Self {
        match prior {
            None => Diff::Unknown,
            Some(prior) if prior == desired => Diff::Same,
            Some(_) => Diff::Changed,
        }
    }
}

impl PlanAction {
    /// Plans a change of an existing resource from per-attribute diffs.
    ///
    /// A changed attribute that forces replacement yields [PlanAction::Replace]. Other changes
    /// and unknown prior values are adopted in place.
    pub fn from_diffs(attributes: &[Attribute], diffs: &[(&'static str, Diff)]) -> Self {
        let forces_replacement = |name: &str| {
            attributes
                .iter()
                .any(|attribute| attribute.name == name && attribute.forces_replacement())
        };

        let changed: Vec<&'static str> = diffs
            .iter()
            .filter(|(name, diff)| *diff == Diff::Changed && forces_replacement(name))
            .map(|(name, _)| *name)
            .collect();
        if !changed.is_empty() {
            return PlanAction::Replace { changed };
        }

        if diffs.iter().any(|(_, diff)| *diff != Diff::Same) {
            PlanAction::Update
        } else {
            PlanAction::NoOp
        }
    }
}
