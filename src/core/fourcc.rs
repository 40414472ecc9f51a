//! Four-character codes
//!
//! Creators, database types and resource types are 32-bit values that are
//! conventionally written as four ASCII characters (`'psys'`, `'feat'`).

use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FourCC(pub u32);

impl FourCC {
    pub const fn from_bytes(bytes: &[u8; 4]) -> Self {
        FourCC(u32::from_be_bytes(*bytes))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// True when every byte is printable ASCII
    pub fn is_printable(self) -> bool {
        self.to_bytes().iter().all(|b| (0x20..0x7F).contains(b))
    }
}

impl From<u32> for FourCC {
    fn from(value: u32) -> Self {
        FourCC(value)
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_printable() {
            for b in self.to_bytes() {
                write!(f, "{}", b as char)?;
            }
            Ok(())
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

impl Serialize for FourCC {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
