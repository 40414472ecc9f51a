//! CPU family flag overrides
//!
//! A few vendors shipped images whose card header flags do not describe
//! the processor the firmware was built for. These are recognised by
//! manufacturer name plus a database only their images contain.

use crate::header::CpuFlags;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CpuFamily {
    Dragonball328,
    DragonballEz,
    DragonballVz,
}

#[derive(Debug, Clone, Copy)]
pub struct CpuOverride {
    pub manufacturer: &'static str,
    pub database: &'static str,
    pub family: CpuFamily,
    pub value: bool,
}

pub const CPU_OVERRIDES: &[CpuOverride] = &[
    // Visor images leave the EZ bit clear
    CpuOverride {
        manufacturer: "Handspring, Inc.",
        database: "HsExtensions",
        family: CpuFamily::DragonballEz,
        value: true,
    },
    CpuOverride {
        manufacturer: "Handspring, Inc.",
        database: "HsExtVZ",
        family: CpuFamily::DragonballVz,
        value: true,
    },
    CpuOverride {
        manufacturer: "Handspring, Inc.",
        database: "HsExtVZ",
        family: CpuFamily::DragonballEz,
        value: false,
    },
    CpuOverride {
        manufacturer: "Symbol",
        database: "SymbolLib",
        family: CpuFamily::Dragonball328,
        value: true,
    },
];

impl CpuFlags {
    pub fn get(&self, family: CpuFamily) -> bool {
        match family {
            CpuFamily::Dragonball328 => self.cpu_328,
            CpuFamily::DragonballEz => self.ez,
            CpuFamily::DragonballVz => self.vz,
        }
    }
}

/// Apply the first matching override for `family`, falling back to the
/// raw header flag
pub fn effective_flag<F>(
    raw: &CpuFlags,
    family: CpuFamily,
    manufacturer: &str,
    contains_db: F,
) -> bool
where
    F: Fn(&str) -> bool,
{
    CPU_OVERRIDES
        .iter()
        .filter(|o| o.family == family && o.manufacturer == manufacturer)
        .find(|o| contains_db(o.database))
        .map(|o| o.value)
        .unwrap_or_else(|| raw.get(family))
}
