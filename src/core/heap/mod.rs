//! ROM heap walking
//!
//! The store header names a heap list; each heap is a header followed by
//! a run of chunks closed by a zero-size terminator. Walking a heap checks
//! that the chunk sizes add up to the size the heap header declares, and
//! that the free chunk it names really is free. Either check failing means
//! the heap cannot be trusted, and nothing from *any* heap is kept.
//!
//! Heap header layout (big-endian):
//!
//! ```text
//!               32-bit heaps        16-bit (V1) heaps
//! flags         u16 @0              u16 @0
//! size          u32 @2              u16 @2
//! first free    u32 @6              u16 @4
//! mpt count     u16 @10             u16 @6
//! mpt next      u32 @12             u16 @8
//! mpt entries   count x u32 @16     count x u16 @10
//! first chunk   after the master pointer table
//! ```

pub mod chunk;

pub use chunk::{Chunk, ChunkKind, HeapEncoding, RawChunkHeader};

use crate::error::{Result, RomError};
use crate::header::StoreHeader;
use crate::image::Image;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Chunks of every heap, keyed by local identifier
pub type ChunkMap = BTreeMap<u32, Chunk>;

/// The first-free field counts 16-bit words from the heap start
pub const FREE_CHUNK_STRIDE: u32 = 2;

/// Summary of one walked heap
#[derive(Debug, Clone, Serialize)]
pub struct HeapInfo {
    pub index: usize,
    pub local_id: u32,
    pub offset: usize,
    pub flags: u16,
    pub encoding: HeapEncoding,
    pub declared_size: u32,
    pub master_pointers: u16,

    /// Local id of the free chunk the header names
    pub free_chunk: Option<u32>,

    pub chunk_count: usize,
}

/// Payload bytes of a chunk: everything after its header, minus the
/// trailing size-adjust slack
pub fn chunk_payload<'a>(image: &'a Image, chunk: &Chunk) -> Result<&'a [u8]> {
    image.slice(chunk.data_offset(), chunk.data_len())
}

/// Walk every heap in the store's heap list
///
/// On error the chunks gathered so far are dropped; callers never see a
/// partial map.
pub fn acquire(image: &Image, store: &StoreHeader) -> Result<(Vec<HeapInfo>, ChunkMap)> {
    let list = image.resolve(store.heap_list, 2)?;
    let count = image.read_u16(list)? as usize;
    debug!("Heap list at {:#010x} names {} heap(s)", store.heap_list, count);

    let mut heaps = Vec::with_capacity(count);
    let mut chunks = ChunkMap::new();

    for index in 0..count {
        let heap_lid = image.read_u32(list + 2 + index * 4)?;
        let (info, heap_chunks) = walk_heap(image, index, heap_lid)?;

        for chunk in heap_chunks {
            let lid = chunk.local_id;
            if chunks.contains_key(&lid) {
                warn!("Chunk {:#010x} in heap {} overlaps an earlier heap", lid, index);
                continue;
            }
            chunks.insert(lid, chunk);
        }
        heaps.push(info);
    }

    info!(
        "Walked {} heap(s) with {} chunk(s)",
        heaps.len(),
        chunks.len()
    );

    Ok((heaps, chunks))
}

/// Walk a single heap, validating its size checksum and free chunk
pub fn walk_heap(
    image: &Image,
    index: usize,
    heap_lid: u32,
) -> Result<(HeapInfo, Vec<Chunk>)> {
    let offset = image.resolve(heap_lid, 2)?;
    let flags = image.read_u16(offset)?;
    let encoding = HeapEncoding::from_flags(flags);

    let (declared_size, first_free, master_pointers, fixed_len, entry_len) =
        if encoding.is_narrow() {
            (
                image.read_u16(offset + 2)? as u32,
                image.read_u16(offset + 4)? as u32,
                image.read_u16(offset + 6)?,
                10usize,
                2usize,
            )
        } else {
            (
                image.read_u32(offset + 2)?,
                image.read_u32(offset + 6)?,
                image.read_u16(offset + 10)?,
                16usize,
                4usize,
            )
        };

    debug!(
        "Heap {} at {:#010x}: flags {:#06x} ({:?}), declared size {}",
        index, heap_lid, flags, encoding, declared_size
    );

    let header_len = encoding.chunk_header_len();
    let mpt_len = master_pointers as usize * entry_len;
    let mut walked = mpt_len as u32;
    let mut pos = offset + fixed_len + mpt_len;
    let mut chunks = Vec::new();

    loop {
        let remaining = image.window().get(pos..).unwrap_or(&[]);
        let raw = encoding
            .decode(remaining)
            .ok_or_else(|| RomError::too_small(pos, header_len, image.len()))?;

        if raw.is_terminator() {
            walked = walked.wrapping_add(encoding.terminator_len() as u32);
            break;
        }

        let size = raw.size as usize;
        if size < header_len {
            return Err(RomError::SizeMismatch {
                heap: heap_lid,
                declared: declared_size,
                walked: walked.wrapping_add(raw.size),
            });
        }
        image.slice(pos, size)?;

        chunks.push(Chunk::new(image.local_id(pos), pos, index, encoding, raw));
        walked = walked.wrapping_add(raw.size);
        pos += size;
    }

    if encoding.is_narrow() {
        walked &= 0xFFFF;
    }

    if walked != declared_size {
        return Err(RomError::SizeMismatch {
            heap: heap_lid,
            declared: declared_size,
            walked,
        });
    }

    let free_chunk = if first_free != 0 {
        let free_lid = heap_lid.wrapping_add(first_free.wrapping_mul(FREE_CHUNK_STRIDE));
        match chunks.iter().find(|c| c.local_id == free_lid) {
            Some(chunk) if chunk.free => Some(free_lid),
            _ => return Err(RomError::BadFreeChunk(free_lid)),
        }
    } else {
        None
    };

    let info = HeapInfo {
        index,
        local_id: heap_lid,
        offset,
        flags,
        encoding,
        declared_size,
        master_pointers,
        free_chunk,
        chunk_count: chunks.len(),
    };

    Ok((info, chunks))
}
