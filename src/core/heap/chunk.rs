//! Chunk headers in the four historical heap encodings

use serde::Serialize;

/// Chunk-header encoding, selected once per heap from its flags word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeapEncoding {
    /// Two packed 32-bit words per chunk (current heaps)
    Packed32,
    /// Same bit layout as `Packed32`, earlier revision flag
    Packed32Legacy,
    /// Discrete byte fields with a 32-bit heap size
    ByteFieldsV2,
    /// Discrete byte fields with a 16-bit heap size
    ByteFieldsV1,
}

pub const HEAP_FLAG_PACKED: u16 = 0x2000;
pub const HEAP_FLAG_PACKED_LEGACY: u16 = 0x4000;
pub const HEAP_FLAG_V2: u16 = 0x8000;

impl HeapEncoding {
    pub fn from_flags(flags: u16) -> Self {
        if flags & HEAP_FLAG_PACKED != 0 {
            HeapEncoding::Packed32
        } else if flags & HEAP_FLAG_PACKED_LEGACY != 0 {
            HeapEncoding::Packed32Legacy
        } else if flags & HEAP_FLAG_V2 != 0 {
            HeapEncoding::ByteFieldsV2
        } else {
            HeapEncoding::ByteFieldsV1
        }
    }

    pub fn is_packed(self) -> bool {
        matches!(self, HeapEncoding::Packed32 | HeapEncoding::Packed32Legacy)
    }

    /// Bytes occupied by one chunk header
    pub fn chunk_header_len(self) -> usize {
        if self.is_packed() {
            8
        } else {
            6
        }
    }

    /// Bytes occupied by the zero-size terminator closing the heap
    pub fn terminator_len(self) -> usize {
        if self.is_packed() {
            4
        } else {
            2
        }
    }

    /// Width of the heap size, free-chunk and master-pointer fields
    pub fn is_narrow(self) -> bool {
        self == HeapEncoding::ByteFieldsV1
    }

    /// Decode a chunk header from the start of `bytes`
    ///
    /// Returns `None` if `bytes` cannot hold the size field; a zero size
    /// (the heap terminator) only needs the terminator bytes.
    pub fn decode(self, bytes: &[u8]) -> Option<RawChunkHeader> {
        if self.is_packed() {
            let w1 = u32::from_be_bytes(bytes.get(0..4)?.try_into().ok()?);
            let size = w1 & 0x00FF_FFFF;
            if size == 0 {
                return Some(RawChunkHeader::terminator());
            }
            let w2 = u32::from_be_bytes(bytes.get(4..8)?.try_into().ok()?);
            Some(RawChunkHeader {
                size,
                free: w1 & 0x8000_0000 != 0,
                size_adjust: ((w1 >> 24) & 0x0F) as u8,
                heap_offset: w2 & 0x00FF_FFFF,
                lock_count: ((w2 >> 24) & 0x0F) as u8,
                owner: ((w2 >> 28) & 0x0F) as u8,
            })
        } else {
            let size = u16::from_be_bytes(bytes.get(0..2)?.try_into().ok()?) as u32;
            if size == 0 {
                return Some(RawChunkHeader::terminator());
            }
            let rest = bytes.get(2..6)?;
            let flags = rest[0];
            let lock_owner = rest[1];
            Some(RawChunkHeader {
                size,
                free: flags & 0x80 != 0,
                size_adjust: flags & 0x0F,
                heap_offset: u16::from_be_bytes([rest[2], rest[3]]) as u32,
                lock_count: lock_owner >> 4,
                owner: lock_owner & 0x0F,
            })
        }
    }
}

/// Fields common to every chunk-header encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawChunkHeader {
    pub size: u32,
    pub free: bool,
    pub size_adjust: u8,
    pub heap_offset: u32,
    pub lock_count: u8,
    pub owner: u8,
}

impl RawChunkHeader {
    fn terminator() -> Self {
        RawChunkHeader {
            size: 0,
            free: false,
            size_adjust: 0,
            heap_offset: 0,
            lock_count: 0,
            owner: 0,
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.size == 0
    }
}

/// What a chunk turned out to hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChunkKind {
    Unclassified,
    Free,
    DatabaseHeader,
    DatabaseTable,
    Record,
    Other,
}

/// One heap chunk
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    /// Own address in the image's address space
    pub local_id: u32,

    /// Window offset of the chunk header
    pub offset: usize,

    /// Total length including the chunk header
    pub size: u32,

    pub header_len: u8,

    /// Slack bytes at the end of the chunk that carry no data
    pub size_adjust: u8,

    pub free: bool,
    pub lock_count: u8,
    pub owner: u8,
    pub heap_offset: u32,

    /// Index of the heap this chunk was walked from
    pub heap: usize,

    pub kind: ChunkKind,

    /// Owning database index, once the directory has been walked
    pub database: Option<usize>,

    /// Item index within the owning database
    pub item: Option<usize>,
}

impl Chunk {
    pub fn new(
        local_id: u32,
        offset: usize,
        heap: usize,
        encoding: HeapEncoding,
        raw: RawChunkHeader,
    ) -> Self {
        Chunk {
            local_id,
            offset,
            size: raw.size,
            header_len: encoding.chunk_header_len() as u8,
            size_adjust: raw.size_adjust,
            free: raw.free,
            lock_count: raw.lock_count,
            owner: raw.owner,
            heap_offset: raw.heap_offset,
            heap,
            kind: ChunkKind::Unclassified,
            database: None,
            item: None,
        }
    }

    /// Window offset of the first payload byte
    pub fn data_offset(&self) -> usize {
        self.offset + self.header_len as usize
    }

    /// Payload length: size minus header and trailing slack
    pub fn data_len(&self) -> usize {
        (self.size as usize)
            .saturating_sub(self.header_len as usize)
            .saturating_sub(self.size_adjust as usize)
    }

    /// Set the classification, unless it was already set
    ///
    /// Returns `false` and leaves the chunk untouched when it already
    /// carries a classification.
    pub fn classify(
        &mut self,
        kind: ChunkKind,
        database: Option<usize>,
        item: Option<usize>,
    ) -> bool {
        if self.kind != ChunkKind::Unclassified {
            return false;
        }
        self.kind = kind;
        self.database = database;
        self.item = item;
        true
    }
}
