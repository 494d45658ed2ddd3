// Copyright (c) 2023 The Cocoon Authors

use serde::Serialize;

/// Memory, cpu share and disk allocation of a cocoon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSet {
    /// set name
    pub name: &'static str,
    /// memory in MB
    pub memory: u64,
    /// relative cpu weight
    pub cpu_share: u64,
    /// disk limit in MB
    pub disk: u64,
}

/// Supported resource sets
pub const RESOURCE_SETS: [ResourceSet; 4] = [
    ResourceSet { name: "s1", memory: 256, cpu_share: 100, disk: 4000 },
    ResourceSet { name: "s2", memory: 512, cpu_share: 100, disk: 4000 },
    ResourceSet { name: "m1", memory: 1024, cpu_share: 100, disk: 4000 },
    ResourceSet { name: "m2", memory: 2048, cpu_share: 200, disk: 4000 },
];

impl ResourceSet {
    /// The set matching a memory and cpu share request
    /// ```
    /// # use cocoon_models::resources::ResourceSet;
    /// assert_eq!(ResourceSet::find(2048, 200).map(|s| s.name), Some("m2"));
    /// assert!(ResourceSet::find(2048, 100).is_none());
    /// ```
    pub fn find(memory: u64, cpu_share: u64) -> Option<ResourceSet> {
        RESOURCE_SETS
            .iter()
            .find(|s| s.memory == memory && s.cpu_share == cpu_share)
            .copied()
    }

    /// Disk limit in bytes
    pub fn disk_bytes(&self) -> u64 {
        self.disk * 1_000_000
    }
}
