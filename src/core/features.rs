//! System feature table and firmware version decoding
//!
//! The system database (creator `psys`) carries `feat` resources holding
//! per-creator feature values:
//!
//! ```text
//! u16 block count
//! per block:
//!     u32 creator
//!     u16 pair count
//!     per pair: u16 feature number, u32 value
//! ```

use crate::catalog::{Database, Item};
use crate::cursor::Cursor;
use crate::fourcc::FourCC;
use crate::heap::{chunk_payload, ChunkMap};
use crate::image::Image;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

pub const SYSTEM_CREATOR: FourCC = FourCC::from_bytes(b"psys");
pub const FEATURE_RESOURCE_TYPE: FourCC = FourCC::from_bytes(b"feat");

/// Feature number of the firmware version under the system creator
pub const FEATURE_ROM_VERSION: u16 = 1;

/// creator → (feature number → value)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeatureTable {
    entries: BTreeMap<FourCC, BTreeMap<u16, u32>>,
}

impl FeatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any earlier one for the same key
    pub fn insert(&mut self, creator: FourCC, number: u16, value: u32) {
        self.entries.entry(creator).or_default().insert(number, value);
    }

    pub fn get(&self, creator: FourCC, number: u16) -> Option<u32> {
        self.entries.get(&creator)?.get(&number).copied()
    }

    pub fn creator(&self, creator: FourCC) -> Option<&BTreeMap<u16, u32>> {
        self.entries.get(&creator)
    }

    pub fn creators(&self) -> impl Iterator<Item = FourCC> + '_ {
        self.entries.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of (creator, feature) pairs
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Decoded firmware version, all zero when the feature is absent
    pub fn rom_version(&self) -> RomVersion {
        self.get(SYSTEM_CREATOR, FEATURE_ROM_VERSION)
            .map(RomVersion::from_raw)
            .unwrap_or_default()
    }
}

/// Parse one `feat` resource payload into (creator, number, value) triples
///
/// Returns `None` if the payload is truncated anywhere.
pub fn parse_feature_resource(payload: &[u8]) -> Option<Vec<(FourCC, u16, u32)>> {
    let mut cur = Cursor::new(payload);
    let blocks = cur.u16()?;
    let mut values = Vec::new();

    for _ in 0..blocks {
        let creator = FourCC(cur.u32()?);
        let pairs = cur.u16()?;
        for _ in 0..pairs {
            let number = cur.u16()?;
            let value = cur.u32()?;
            values.push((creator, number, value));
        }
    }

    Some(values)
}

/// Build the feature table from every `feat` resource of every system
/// database, in directory order
pub fn extract(image: &Image, chunks: &ChunkMap, databases: &[Database]) -> FeatureTable {
    let mut table = FeatureTable::new();

    for db in databases.iter().filter(|db| db.creator == SYSTEM_CREATOR) {
        for item in db.resources_of(FEATURE_RESOURCE_TYPE) {
            let Item::Resource { id, chunk, .. } = item else {
                continue;
            };
            let Some(chunk) = chunk.and_then(|lid| chunks.get(&lid)) else {
                warn!("Feature resource {} in '{}' has no chunk", id, db.name);
                continue;
            };

            let parsed = chunk_payload(image, chunk)
                .ok()
                .and_then(parse_feature_resource);
            match parsed {
                Some(values) => {
                    debug!(
                        "Feature resource {} in '{}': {} value(s)",
                        id,
                        db.name,
                        values.len()
                    );
                    for (creator, number, value) in values {
                        table.insert(creator, number, value);
                    }
                }
                None => warn!(
                    "Feature resource {} in '{}' is truncated; skipping",
                    id, db.name
                ),
            }
        }
    }

    table
}

/// Firmware version in its packed 32-bit form
///
/// ```text
/// [31:24] major  [23:20] minor  [19:16] fix  [15:12] stage  [11:0] build
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RomVersion {
    pub major: u8,
    pub minor: u8,
    pub fix: u8,
    pub stage: u8,
    pub build: u16,
}

impl RomVersion {
    pub fn from_raw(raw: u32) -> Self {
        RomVersion {
            major: (raw >> 24) as u8,
            minor: ((raw >> 20) & 0x0F) as u8,
            fix: ((raw >> 16) & 0x0F) as u8,
            stage: ((raw >> 12) & 0x0F) as u8,
            build: (raw & 0x0FFF) as u16,
        }
    }

    /// `(major << 16) | (minor << 8) | fix`
    pub fn combined(&self) -> u32 {
        (self.major as u32) << 16 | (self.minor as u32) << 8 | self.fix as u32
    }

    pub fn to_semver(&self) -> semver::Version {
        semver::Version::new(self.major as u64, self.minor as u64, self.fix as u64)
    }
}

impl fmt::Display for RomVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if self.fix != 0 {
            write!(f, ".{}", self.fix)?;
        }
        Ok(())
    }
}
