//! Cluster software versions
//!
//! Versions are encoded as a single integer id:
//! `major * 1_000_000 + minor * 10_000 + revision * 100 + build`,
//! where build `99` is a release and lower builds are pre-releases.

use serde::{Deserialize, Serialize};

/// Software version of a node or of the node that created an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version {
    id: u32,
}

impl Version {
    pub const V_5_6_0: Version = Version::from_id(5_060_099);
    /// First version that understands `index.number_of_routing_shards`
    pub const V_6_0_0_ALPHA1: Version = Version::from_id(6_000_001);
    pub const V_6_0_0: Version = Version::from_id(6_000_099);
    pub const V_6_8_0: Version = Version::from_id(6_080_099);
    /// Version of this process
    pub const CURRENT: Version = Version::V_6_8_0;

    pub const fn from_id(id: u32) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn major(&self) -> u32 {
        self.id / 1_000_000
    }

    pub fn minor(&self) -> u32 {
        (self.id / 10_000) % 100
    }

    pub fn revision(&self) -> u32 {
        (self.id / 100) % 100
    }

    pub fn build(&self) -> u32 {
        self.id % 100
    }

    /// Check if this version is strictly older than `other`
    pub fn before(&self, other: Version) -> bool {
        self.id < other.id
    }

    pub fn on_or_after(&self, other: Version) -> bool {
        self.id >= other.id
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.revision())?;
        match self.build() {
            99 => Ok(()),
            b if b < 25 => write!(f, "-alpha{}", b),
            b if b < 50 => write!(f, "-beta{}", b - 25),
            b => write!(f, "-rc{}", b - 50),
        }
    }
}
