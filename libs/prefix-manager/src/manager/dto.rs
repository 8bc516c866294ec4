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
//! Data transfer objects (DTOs) for the prefix registry.

use std::collections::BTreeMap;

use anyhow::{Context, bail};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::{
    allocator::ChildAllocator,
    manager::{PrefixEntry, PrefixManager, overlaps},
};

/// The persisted prefix registry.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct PrefixManagerDto {
    /// All known prefixes, roots and children.
    pub prefixes: Vec<PrefixDto>,
}

/// A persisted prefix.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PrefixDto {
    /// The prefix.
    pub cidr: String,
    /// The parent prefix, absent for root prefixes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_cidr: Option<String>,
}

impl From<&PrefixManager> for PrefixManagerDto {
    fn from(manager: &PrefixManager) -> Self {
        PrefixManagerDto {
            prefixes: manager
                .prefixes
                .iter()
                .map(|(cidr, entry)| {
                    PrefixDto {
                        cidr: cidr.to_string(),
                        parent_cidr: entry.parent.map(|parent| parent.to_string()),
                    }
                })
                .collect(),
        }
    }
}

impl TryFrom<PrefixManagerDto> for PrefixManager {
    type Error = anyhow::Error;

    fn try_from(value: PrefixManagerDto) -> Result<Self, Self::Error> {
        let mut prefixes = BTreeMap::new();
        let mut links = Vec::new();

        for dto in value.prefixes {
            let cidr: IpNet = dto
                .cidr
                .parse()
                .with_context(|| format!("invalid prefix {}", dto.cidr))?;
            if cidr.trunc() != cidr {
                bail!("prefix {cidr} has host bits set");
            }
            let parent = dto
                .parent_cidr
                .map(|parent| {
                    parent
                        .parse::<IpNet>()
                        .with_context(|| format!("invalid parent prefix {parent} of {cidr}"))
                })
                .transpose()?;

            let entry = PrefixEntry {
                parent,
                children: ChildAllocator::new(cidr),
            };
            if prefixes.insert(cidr, entry).is_some() {
                bail!("duplicate prefix {cidr}");
            }
            if let Some(parent) = parent {
                links.push((parent, cidr));
            }
        }

        for (parent, child) in links {
            prefixes
                .get_mut(&parent)
                .with_context(|| format!("parent {parent} of {child} not found"))?
                .children
                .reserve(child)
                .with_context(|| format!("invalid child {child} of {parent}"))?;
        }

        let roots: Vec<IpNet> = prefixes
            .iter()
            .filter(|(_, entry)| entry.parent.is_none())
            .map(|(cidr, _)| *cidr)
            .collect();
        for (i, a) in roots.iter().enumerate() {
            if let Some(b) = roots[i + 1..].iter().find(|b| overlaps(a, b)) {
                bail!("root prefixes {a} and {b} overlap");
            }
        }

        Ok(Self { prefixes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto(cidr: &str, parent_cidr: Option<&str>) -> PrefixDto {
        PrefixDto {
            cidr: cidr.to_string(),
            parent_cidr: parent_cidr.map(str::to_string),
        }
    }

    #[test]
    fn convert() {
        let mut manager = PrefixManager::new();
        let root = "10.0.0.0/16".parse().unwrap();
        manager.create_root_prefix(root).unwrap();
        manager
            .create_root_prefix("2001:db8::/48".parse().unwrap())
            .unwrap();
        let child = manager.acquire_child(&root, 20).unwrap();
        manager.acquire_child(&child.cidr, 24).unwrap();
        manager.acquire_child(&root, 24).unwrap();

        let dto = PrefixManagerDto::from(&manager);
        let json = serde_json::to_string(&dto).unwrap();
        let after = PrefixManager::try_from(
            serde_json::from_str::<PrefixManagerDto>(&json).unwrap(),
        )
        .expect("failed to convert back");

        assert_eq!(manager, after);
    }

    #[test]
    fn should_reject_corrupt_state() {
        let cases = vec![
            ("unparsable", vec![dto("10.0.0/16", None)]),
            ("host bits", vec![dto("10.0.0.1/16", None)]),
            (
                "dangling parent",
                vec![dto("10.0.0.0/24", Some("10.0.0.0/16"))],
            ),
            (
                "child outside parent",
                vec![
                    dto("10.0.0.0/16", None),
                    dto("10.1.0.0/24", Some("10.0.0.0/16")),
                ],
            ),
            (
                "overlapping siblings",
                vec![
                    dto("10.0.0.0/16", None),
                    dto("10.0.0.0/20", Some("10.0.0.0/16")),
                    dto("10.0.1.0/24", Some("10.0.0.0/16")),
                ],
            ),
            (
                "overlapping roots",
                vec![dto("10.0.0.0/16", None), dto("10.0.0.0/8", None)],
            ),
            (
                "duplicate",
                vec![dto("10.0.0.0/16", None), dto("10.0.0.0/16", None)],
            ),
        ];

        for (name, prefixes) in cases {
            assert!(
                PrefixManager::try_from(PrefixManagerDto { prefixes }).is_err(),
                "{name} should be rejected"
            );
        }
    }
}
