//! Database directory walking
//!
//! The store header names the first directory page. A page lists database
//! header chunks and links to the next page:
//!
//! ```text
//! u16        count
//! u32[count] database header local ids
//! u32        next page local id (0 = last page)
//! ```
//!
//! The catalog is tolerant where the heap walk is strict: a directory entry
//! or item that does not resolve to a chunk is logged and skipped rather
//! than failing the walk.

pub mod database;

pub use database::{Database, Item, RawDatabase, RawEntry, RecordAttributes};

use crate::cursor::Cursor;
use crate::error::{Result, RomError};
use crate::fourcc::FourCC;
use crate::heap::{chunk_payload, ChunkKind, ChunkMap};
use crate::image::Image;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// A classification to apply to a chunk once the walk succeeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkTag {
    pub local_id: u32,
    pub kind: ChunkKind,
    pub database: Option<usize>,
    pub item: Option<usize>,
}

/// Output of a directory walk
#[derive(Debug, Clone, Default)]
pub struct DirectoryWalk {
    /// Databases in directory order
    pub databases: Vec<Database>,

    /// Chunk classifications, in the order they were discovered
    pub tags: Vec<ChunkTag>,

    pub pages: usize,

    /// Directory entries that did not resolve or did not parse
    pub skipped: usize,
}

/// Walk the directory chain starting at `directory`
///
/// The chunk map is only read; classifications are returned as tags so
/// that a failed walk leaves the map untouched.
pub fn walk(
    image: &Image,
    chunks: &ChunkMap,
    directory: u32,
    max_pages: usize,
) -> Result<DirectoryWalk> {
    let mut page_chunk = chunks.get(&directory).ok_or_else(|| {
        RomError::NotFound(format!("database directory chunk {:#010x}", directory))
    })?;

    let mut walk = DirectoryWalk::default();

    for chunk in chunks.values().filter(|c| c.free) {
        walk.tag(chunk.local_id, ChunkKind::Free, None, None);
    }

    let mut visited = HashSet::new();
    let mut page_lid = directory;

    loop {
        if !visited.insert(page_lid) {
            warn!("Directory page {:#010x} visited twice; stopping", page_lid);
            break;
        }
        if visited.len() > max_pages {
            warn!("Directory exceeds {} pages; stopping", max_pages);
            break;
        }

        walk.tag(page_lid, ChunkKind::DatabaseTable, None, None);
        walk.pages += 1;

        let payload = chunk_payload(image, page_chunk)?;
        let mut cur = Cursor::new(payload);
        let count = cur
            .u16()
            .ok_or_else(|| RomError::too_small(page_chunk.data_offset(), 2, payload.len()))?
            as usize;

        let needed = 2 + count * 4 + 4;
        if payload.len() < needed {
            return Err(RomError::too_small(
                page_chunk.data_offset(),
                needed,
                payload.len(),
            ));
        }

        debug!("Directory page {:#010x} lists {} database(s)", page_lid, count);

        for _ in 0..count {
            let entry = cur.u32().unwrap_or(0);
            walk.add_database(image, chunks, entry)?;
        }

        let next = cur.u32().unwrap_or(0);
        if next == 0 {
            break;
        }

        match chunks.get(&next) {
            Some(chunk) => {
                page_lid = next;
                page_chunk = chunk;
            }
            None => {
                warn!("Next directory page {:#010x} does not resolve; stopping", next);
                break;
            }
        }
    }

    info!(
        "Directory: {} database(s) over {} page(s), {} entr(ies) skipped",
        walk.databases.len(),
        walk.pages,
        walk.skipped
    );

    Ok(walk)
}

impl DirectoryWalk {
    fn tag(
        &mut self,
        local_id: u32,
        kind: ChunkKind,
        database: Option<usize>,
        item: Option<usize>,
    ) {
        self.tags.push(ChunkTag {
            local_id,
            kind,
            database,
            item,
        });
    }

    fn add_database(&mut self, image: &Image, chunks: &ChunkMap, entry: u32) -> Result<()> {
        let Some(header_chunk) = chunks.get(&entry) else {
            warn!("Directory entry {:#010x} does not resolve to a chunk; skipping", entry);
            self.skipped += 1;
            return Ok(());
        };

        let payload = chunk_payload(image, header_chunk)?;
        let Some(raw) = RawDatabase::parse(payload) else {
            // The chunk is still a database header even when it is unreadable
            self.tag(entry, ChunkKind::DatabaseHeader, None, None);
            warn!(
                "Database header in chunk {:#010x} is truncated ({} bytes); skipping",
                entry,
                payload.len()
            );
            self.skipped += 1;
            return Ok(());
        };

        let index = self.databases.len();
        self.tag(entry, ChunkKind::DatabaseHeader, Some(index), None);

        let resolve = |lid: u32| {
            if lid != 0 && chunks.contains_key(&lid) {
                Some(lid)
            } else {
                None
            }
        };

        let mut items = Vec::with_capacity(raw.entries.len());
        let mut dangling = 0usize;
        for (item_index, raw_entry) in raw.entries.iter().enumerate() {
            let chunk = resolve(raw_entry.chunk());
            match chunk {
                Some(lid) => self.tag(lid, ChunkKind::Record, Some(index), Some(item_index)),
                None => dangling += 1,
            }
            items.push(match *raw_entry {
                RawEntry::Record { packed, .. } => Item::record(packed, chunk),
                RawEntry::Resource { kind, id, .. } => Item::resource(FourCC(kind), id, chunk),
            });
        }

        let app_info = resolve(raw.app_info);
        let sort_info = resolve(raw.sort_info);
        for lid in [app_info, sort_info].into_iter().flatten() {
            self.tag(lid, ChunkKind::Other, Some(index), None);
        }

        debug!(
            "Database {} '{}' ({}/{}): {} item(s), {} unresolved",
            index,
            raw.name,
            FourCC(raw.kind),
            FourCC(raw.creator),
            items.len(),
            dangling
        );

        self.databases.push(Database {
            name: raw.name,
            attributes: raw.attributes,
            version: raw.version,
            created: raw.created,
            modified: raw.modified,
            backed_up: raw.backed_up,
            modification_number: raw.modification_number,
            kind: FourCC(raw.kind),
            creator: FourCC(raw.creator),
            unique_id_seed: raw.unique_id_seed,
            app_info,
            sort_info,
            header_chunk: entry,
            items,
        });

        Ok(())
    }
}

/// Apply staged classifications; returns how many took effect
///
/// A chunk keeps the first classification it receives.
pub fn apply_tags(chunks: &mut ChunkMap, tags: &[ChunkTag]) -> usize {
    let mut applied = 0;
    for tag in tags {
        if let Some(chunk) = chunks.get_mut(&tag.local_id) {
            if chunk.classify(tag.kind, tag.database, tag.item) {
                applied += 1;
            } else {
                debug!(
                    "Chunk {:#010x} already classified as {:?}; ignoring {:?}",
                    tag.local_id, chunk.kind, tag.kind
                );
            }
        }
    }
    applied
}
