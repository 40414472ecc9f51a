//! Database header and item structures

use crate::cursor::{fixed_str, Cursor};
use crate::fourcc::FourCC;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Attribute bit marking a resource database
pub const ATTR_RESOURCE_DB: u16 = 0x0001;

/// Fixed part of a database header, up to the first item entry
pub const DB_HEADER_SIZE: usize = 78;
pub const RECORD_ENTRY_SIZE: usize = 8;
pub const RESOURCE_ENTRY_SIZE: usize = 10;

const NAME_LEN: usize = 32;

/// Record attribute bits, from the top byte of a record entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RecordAttributes {
    pub deleted: bool,
    pub dirty: bool,
    pub busy: bool,
    pub secret: bool,
}

impl RecordAttributes {
    pub fn from_bits(attr: u8) -> Self {
        RecordAttributes {
            deleted: attr & 0x80 != 0,
            dirty: attr & 0x40 != 0,
            busy: attr & 0x20 != 0,
            secret: attr & 0x10 != 0,
        }
    }
}

/// A record or a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Item {
    Record {
        attributes: RecordAttributes,
        category: u8,
        unique_id: u32,
        /// Local id of the storage chunk; `None` if it did not resolve
        chunk: Option<u32>,
    },
    Resource {
        #[serde(rename = "type")]
        kind: FourCC,
        id: u16,
        chunk: Option<u32>,
    },
}

impl Item {
    /// Decode a packed record entry word: attributes in the top byte,
    /// unique id in the low 24 bits
    pub fn record(packed: u32, chunk: Option<u32>) -> Self {
        let attr = (packed >> 24) as u8;
        Item::Record {
            attributes: RecordAttributes::from_bits(attr),
            category: attr & 0x0F,
            unique_id: packed & 0x00FF_FFFF,
            chunk,
        }
    }

    pub fn resource(kind: FourCC, id: u16, chunk: Option<u32>) -> Self {
        Item::Resource { kind, id, chunk }
    }

    pub fn chunk(&self) -> Option<u32> {
        match self {
            Item::Record { chunk, .. } | Item::Resource { chunk, .. } => *chunk,
        }
    }

    /// True for a resource of the given type and id
    pub fn is_resource(&self, want_kind: FourCC, want_id: u16) -> bool {
        matches!(self, Item::Resource { kind, id, .. } if *kind == want_kind && *id == want_id)
    }
}

/// One database reconstructed from the directory
#[derive(Debug, Clone, Serialize)]
pub struct Database {
    pub name: String,
    pub attributes: u16,
    pub version: u16,
    pub created: u32,
    pub modified: u32,
    pub backed_up: u32,
    pub modification_number: u32,
    pub kind: FourCC,
    pub creator: FourCC,
    pub unique_id_seed: u32,

    /// App-info chunk, if present and resolvable
    pub app_info: Option<u32>,

    /// Sort-info chunk, if present and resolvable
    pub sort_info: Option<u32>,

    /// Local id of the chunk holding this header
    pub header_chunk: u32,

    pub items: Vec<Item>,
}

/// Raw item entry before chunk resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEntry {
    Record { chunk: u32, packed: u32 },
    Resource { kind: u32, id: u16, chunk: u32 },
}

impl RawEntry {
    pub fn chunk(&self) -> u32 {
        match self {
            RawEntry::Record { chunk, .. } | RawEntry::Resource { chunk, .. } => *chunk,
        }
    }
}

/// Database header fields straight out of the payload
#[derive(Debug, Clone)]
pub struct RawDatabase {
    pub name: String,
    pub attributes: u16,
    pub version: u16,
    pub created: u32,
    pub modified: u32,
    pub backed_up: u32,
    pub modification_number: u32,
    pub app_info: u32,
    pub sort_info: u32,
    pub kind: u32,
    pub creator: u32,
    pub unique_id_seed: u32,
    pub next_record_list: u32,
    pub entries: Vec<RawEntry>,
}

impl RawDatabase {
    /// Parse a database header and its item list from a chunk payload
    ///
    /// Returns `None` if the header or any of its entries runs past the
    /// end of the payload.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let mut cur = Cursor::new(payload);

        let name = fixed_str(cur.bytes(NAME_LEN)?);
        let attributes = cur.u16()?;
        let version = cur.u16()?;
        let created = cur.u32()?;
        let modified = cur.u32()?;
        let backed_up = cur.u32()?;
        let modification_number = cur.u32()?;
        let app_info = cur.u32()?;
        let sort_info = cur.u32()?;
        let kind = cur.u32()?;
        let creator = cur.u32()?;
        let unique_id_seed = cur.u32()?;
        let next_record_list = cur.u32()?;
        let count = cur.u16()? as usize;

        let is_resource = attributes & ATTR_RESOURCE_DB != 0;
        let entry_size = if is_resource {
            RESOURCE_ENTRY_SIZE
        } else {
            RECORD_ENTRY_SIZE
        };
        if cur.remaining() < count * entry_size {
            return None;
        }

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let entry = if is_resource {
                let kind = cur.u32()?;
                let id = cur.u16()?;
                let chunk = cur.u32()?;
                RawEntry::Resource { kind, id, chunk }
            } else {
                let chunk = cur.u32()?;
                let packed = cur.u32()?;
                RawEntry::Record { chunk, packed }
            };
            entries.push(entry);
        }

        Some(RawDatabase {
            name,
            attributes,
            version,
            created,
            modified,
            backed_up,
            modification_number,
            app_info,
            sort_info,
            kind,
            creator,
            unique_id_seed,
            next_record_list,
            entries,
        })
    }

    pub fn is_resource_db(&self) -> bool {
        self.attributes & ATTR_RESOURCE_DB != 0
    }
}

impl Database {
    pub fn is_resource_db(&self) -> bool {
        self.attributes & ATTR_RESOURCE_DB != 0
    }

    pub fn created_at(&self) -> Option<NaiveDateTime> {
        device_time(self.created)
    }

    pub fn modified_at(&self) -> Option<NaiveDateTime> {
        device_time(self.modified)
    }

    pub fn backed_up_at(&self) -> Option<NaiveDateTime> {
        device_time(self.backed_up)
    }

    /// First resource of the given type and id
    pub fn resource(&self, kind: FourCC, id: u16) -> Option<&Item> {
        self.items.iter().find(|item| item.is_resource(kind, id))
    }

    /// Resources of the given type, in directory order
    pub fn resources_of(&self, want: FourCC) -> impl Iterator<Item = &Item> + '_ {
        self.items
            .iter()
            .filter(move |item| matches!(item, Item::Resource { kind, .. } if *kind == want))
    }
}

/// Convert device seconds (since 1904-01-01) to a timestamp; 0 means unset
pub fn device_time(secs: u32) -> Option<NaiveDateTime> {
    if secs == 0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1904, 1, 1)?.and_hms_opt(0, 0, 0)?;
    epoch.checked_add_signed(Duration::seconds(secs as i64))
}
