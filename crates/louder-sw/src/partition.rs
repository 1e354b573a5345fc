//! Versioned partition names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The four partitions a version owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKind {
    /// Manifest assets, filled at install.
    Precache,
    /// Scripts, styles, fonts, and network-first content.
    Runtime,
    /// Images, filled lazily by cache-first.
    Images,
    /// The single offline fallback document.
    Offline,
}

impl PartitionKind {
    pub const ALL: [PartitionKind; 4] = [
        PartitionKind::Precache,
        PartitionKind::Runtime,
        PartitionKind::Images,
        PartitionKind::Offline,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            PartitionKind::Precache => "precache",
            PartitionKind::Runtime => "runtime",
            PartitionKind::Images => "images",
            PartitionKind::Offline => "offline",
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Partition names derived from one version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSet {
    version: String,
}

impl PartitionSet {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Name of one partition, e.g. `v1-images`.
    pub fn name(&self, kind: PartitionKind) -> String {
        format!("{}-{}", self.version, kind.suffix())
    }

    /// All four names owned by this version.
    pub fn names(&self) -> [String; 4] {
        PartitionKind::ALL.map(|kind| self.name(kind))
    }

    /// Whether `name` belongs to this version.
    pub fn is_current(&self, name: &str) -> bool {
        PartitionKind::ALL.iter().any(|kind| self.name(*kind) == name)
    }
}
