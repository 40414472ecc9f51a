//! Synthetic ROM image builder shared by the integration tests
//!
//! Layout of a built image (window offsets):
//!
//! ```text
//! 0x000  card header
//! 0x100  store header
//! 0x140  heap list
//! 0x200  heap 0: 16-byte packed heap header, chunks, terminator
//! ....   extra raw heaps, if any
//! ```

#![allow(dead_code)]

pub const BASE: u32 = 0x10C0_0000;
pub const HEAP_OFFSET: usize = 0x200;
pub const HEAP_HEADER_LEN: usize = 16;
pub const CHUNK_HEADER_LEN: usize = 8;
pub const TERMINATOR_LEN: usize = 4;

const STORE_OFFSET: usize = 0x100;
const HEAP_LIST_OFFSET: usize = 0x140;

pub fn put_u16(buf: &mut [u8], off: usize, value: u16) {
    buf[off..off + 2].copy_from_slice(&value.to_be_bytes());
}

pub fn put_u32(buf: &mut [u8], off: usize, value: u32) {
    buf[off..off + 4].copy_from_slice(&value.to_be_bytes());
}

fn put_str(buf: &mut [u8], off: usize, text: &str) {
    let bytes = text.as_bytes();
    let len = bytes.len().min(31);
    buf[off..off + len].copy_from_slice(&bytes[..len]);
}

/// Builds one packed heap worth of chunks plus the headers around it
///
/// Chunks are laid out in the order they are added, so the local id of a
/// chunk is known as soon as it is added.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    pub base: u32,
    pub hdr_version: u16,
    pub card_flags: u16,
    pub name: String,
    pub manufacturer: String,
    pub short_version: u16,
    pub rom_version: u32,
    pub company_id: u32,
    pub hal_id: u32,

    /// Defaults to the low 20 bits of `base`
    pub big_rom_offset: Option<u32>,

    /// Replaces the computed heap size field
    pub declared_size: Option<u32>,

    /// Replaces the computed first-free field
    pub first_free: Option<u32>,

    /// Replaces the directory local id in the store header
    pub directory: Option<u32>,

    heap: Vec<u8>,
    free_chunk: Option<u32>,
    extra_heaps: Vec<Vec<u8>>,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::with_base(BASE)
    }

    pub fn with_base(base: u32) -> Self {
        ImageBuilder {
            base,
            hdr_version: 3,
            card_flags: 0x0020,
            name: "Test Card".to_string(),
            manufacturer: "Acme Devices".to_string(),
            short_version: 0x0350,
            rom_version: 0,
            company_id: 0,
            hal_id: 0,
            big_rom_offset: None,
            declared_size: None,
            first_free: None,
            directory: None,
            heap: Vec::new(),
            free_chunk: None,
            extra_heaps: Vec::new(),
        }
    }

    pub fn heap_lid(&self) -> u32 {
        self.base + HEAP_OFFSET as u32
    }

    /// Local id the next chunk will get
    pub fn next_lid(&self) -> u32 {
        self.base + (HEAP_OFFSET + HEAP_HEADER_LEN + self.heap.len()) as u32
    }

    /// Sum of chunk sizes plus the terminator, as the heap header declares it
    pub fn heap_size(&self) -> u32 {
        (self.heap.len() + TERMINATOR_LEN) as u32
    }

    fn push_chunk(&mut self, payload: &[u8], free: bool) -> u32 {
        let lid = self.next_lid();
        let slack = (4 - payload.len() % 4) % 4;
        let size = (CHUNK_HEADER_LEN + payload.len() + slack) as u32;

        let mut w1 = size | (slack as u32) << 24;
        if free {
            w1 |= 0x8000_0000;
        }
        let w2 = (lid - self.heap_lid()) & 0x00FF_FFFF;

        self.heap.extend_from_slice(&w1.to_be_bytes());
        self.heap.extend_from_slice(&w2.to_be_bytes());
        self.heap.extend_from_slice(payload);
        self.heap.extend(std::iter::repeat(0).take(slack));
        lid
    }

    pub fn add_chunk(&mut self, payload: &[u8]) -> u32 {
        self.push_chunk(payload, false)
    }

    /// Add a free chunk and name it in the heap header
    pub fn add_free_chunk(&mut self, len: usize) -> u32 {
        let lid = self.push_chunk(&vec![0u8; len], true);
        self.free_chunk = Some(lid);
        lid
    }

    pub fn add_database(&mut self, payload: &[u8]) -> u32 {
        self.add_chunk(payload)
    }

    /// Add a directory page; the first page added becomes the root
    pub fn add_directory(&mut self, entries: &[u32], next: u32) -> u32 {
        let lid = self.add_chunk(&directory_payload(entries, next));
        if self.directory.is_none() {
            self.directory = Some(lid);
        }
        lid
    }

    /// Append a second heap given as raw bytes (header included)
    pub fn add_raw_heap(&mut self, bytes: Vec<u8>) {
        self.extra_heaps.push(bytes);
    }

    pub fn card_header(&self) -> Vec<u8> {
        let mut b = vec![0u8; 0x100];
        put_u32(&mut b, 0x00, 0x3000);
        put_u32(&mut b, 0x04, self.base + 0x400);
        put_u32(&mut b, 0x08, 0xFEED_BEEF);
        put_u16(&mut b, 0x0C, self.hdr_version);
        put_u16(&mut b, 0x0E, self.card_flags);
        put_str(&mut b, 0x10, &self.name);
        put_str(&mut b, 0x30, &self.manufacturer);
        put_u16(&mut b, 0x50, self.short_version);
        put_u32(&mut b, 0x52, 0xB5A0_0000);
        put_u32(&mut b, 0x64, self.base + 0x100);
        let big_rom_offset = self.big_rom_offset.unwrap_or(self.base & 0x000F_FFFF);
        put_u32(&mut b, 0x68, big_rom_offset);
        put_u32(&mut b, 0x7E, self.company_id);
        put_u32(&mut b, 0x82, self.hal_id);
        put_u32(&mut b, 0x86, self.rom_version);
        b
    }

    pub fn build(&self) -> Vec<u8> {
        let mut image = vec![0u8; HEAP_OFFSET];
        image[..0x100].copy_from_slice(&self.card_header());

        {
            let store = &mut image[STORE_OFFSET..STORE_OFFSET + 0x40];
            put_u32(store, 0x00, 0xFEED_FACE);
            put_u16(store, 0x04, 1);
            put_str(store, 0x08, "ROM Store");
            put_u32(store, 0x28, 0xB5A0_0000);
            put_u32(store, 0x30, self.base + HEAP_LIST_OFFSET as u32);
            put_u32(store, 0x3C, self.directory.unwrap_or(0));
        }

        // Heap 0
        let heap_lid = self.heap_lid();
        let mut header = [0u8; HEAP_HEADER_LEN];
        put_u16(&mut header, 0, 0x2000);
        put_u32(&mut header, 2, self.declared_size.unwrap_or_else(|| self.heap_size()));
        let first_free = self
            .first_free
            .or_else(|| self.free_chunk.map(|lid| (lid - heap_lid) / 2))
            .unwrap_or(0);
        put_u32(&mut header, 6, first_free);
        image.extend_from_slice(&header);
        image.extend_from_slice(&self.heap);
        image.extend_from_slice(&[0u8; TERMINATOR_LEN]);

        let mut heap_lids = vec![heap_lid];
        for extra in &self.extra_heaps {
            heap_lids.push(self.base + image.len() as u32);
            image.extend_from_slice(extra);
        }
        image.extend_from_slice(&[0u8; 16]);

        put_u16(&mut image, HEAP_LIST_OFFSET, heap_lids.len() as u16);
        for (i, lid) in heap_lids.iter().enumerate() {
            put_u32(&mut image, HEAP_LIST_OFFSET + 2 + i * 4, *lid);
        }

        image
    }
}

pub fn directory_payload(entries: &[u32], next: u32) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    for lid in entries {
        b.extend_from_slice(&lid.to_be_bytes());
    }
    b.extend_from_slice(&next.to_be_bytes());
    b
}

fn database_header(name: &str, attributes: u16, kind: &[u8; 4], creator: &[u8; 4]) -> Vec<u8> {
    let mut b = vec![0u8; 78];
    put_str(&mut b, 0, name);
    put_u16(&mut b, 32, attributes);
    put_u16(&mut b, 34, 1);
    put_u32(&mut b, 36, 0xB5A0_0000);
    put_u32(&mut b, 40, 0xB5A0_0100);
    b[60..64].copy_from_slice(kind);
    b[64..68].copy_from_slice(creator);
    b
}

/// Record database header; records are (chunk lid, attribute/unique-id word)
pub fn record_db(name: &str, kind: &[u8; 4], creator: &[u8; 4], records: &[(u32, u32)]) -> Vec<u8> {
    let mut b = database_header(name, 0, kind, creator);
    put_u16(&mut b, 76, records.len() as u16);
    for (chunk, packed) in records {
        b.extend_from_slice(&chunk.to_be_bytes());
        b.extend_from_slice(&packed.to_be_bytes());
    }
    b
}

/// Resource database header; resources are (type, id, chunk lid)
pub fn resource_db(name: &str, creator: &[u8; 4], resources: &[(&[u8; 4], u16, u32)]) -> Vec<u8> {
    let mut b = database_header(name, 0x0001, b"rsrc", creator);
    put_u16(&mut b, 76, resources.len() as u16);
    for (kind, id, chunk) in resources {
        b.extend_from_slice(*kind);
        b.extend_from_slice(&id.to_be_bytes());
        b.extend_from_slice(&chunk.to_be_bytes());
    }
    b
}

/// `feat` resource payload
pub fn feat_payload(blocks: &[(&[u8; 4], &[(u16, u32)])]) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(&(blocks.len() as u16).to_be_bytes());
    for (creator, pairs) in blocks {
        b.extend_from_slice(*creator);
        b.extend_from_slice(&(pairs.len() as u16).to_be_bytes());
        for (number, value) in pairs.iter() {
            b.extend_from_slice(&number.to_be_bytes());
            b.extend_from_slice(&value.to_be_bytes());
        }
    }
    b
}

/// A 16-byte bitmap descriptor followed by `data_len` bytes of pixels
pub fn bitmap(pixel_size: u8, next_depth_offset: u16, data_len: usize) -> Vec<u8> {
    let mut b = vec![0u8; 16];
    put_u16(&mut b, 0, 160);
    put_u16(&mut b, 2, 160);
    put_u16(&mut b, 4, 20);
    b[8] = pixel_size;
    b[9] = 2;
    put_u16(&mut b, 10, next_depth_offset);
    b.extend(std::iter::repeat(0xA5).take(data_len));
    b
}

/// Local ids of the pieces of [`standard_image`]
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub memo_record: u32,
    pub free: u32,
    pub feat: u32,
    pub splash: u32,
    pub memo_db: u32,
    pub system_db: u32,
    pub directory: u32,
}

pub const ROM_VERSION_RAW: u32 = 0x0350_3000;

/// An image with a record database, a system resource database carrying
/// a feature table and a color boot screen, and one free chunk
pub fn standard_builder() -> (ImageBuilder, Layout) {
    let mut builder = ImageBuilder::new();

    let memo_record = builder.add_chunk(b"Buy milk\0");
    let free = builder.add_free_chunk(24);
    let feat = builder.add_chunk(&feat_payload(&[
        (b"psys", &[(1, ROM_VERSION_RAW), (2, 0x0000_0007)]),
        (b"netl", &[(0, 42)]),
    ]));
    let mut boot_screen = vec![0u8; 6];
    boot_screen.extend_from_slice(&bitmap(8, 0, 64));
    let splash = builder.add_chunk(&boot_screen);

    let memo_db = builder.add_database(&record_db(
        "MemoDB",
        b"DATA",
        b"memo",
        &[(memo_record, 0x4000_0001), (0, 0x0000_0002)],
    ));
    let system_db = builder.add_database(&resource_db(
        "Boot",
        b"psys",
        &[(b"feat", 10000, feat), (b"tbsb", 19001, splash)],
    ));
    let directory = builder.add_directory(&[memo_db, system_db], 0);

    (
        builder,
        Layout {
            memo_record,
            free,
            feat,
            splash,
            memo_db,
            system_db,
            directory,
        },
    )
}

pub fn standard_image() -> (Vec<u8>, Layout) {
    let (builder, layout) = standard_builder();
    (builder.build(), layout)
}

/// Prefix `big` with a superseded small ROM of `small_len` bytes whose card
/// header names `big_rom_offset`
pub fn with_small_rom(big: &[u8], small_len: usize, big_rom_offset: u32) -> Vec<u8> {
    let mut small = ImageBuilder::with_base(BASE);
    small.name = "Small ROM".to_string();
    small.big_rom_offset = Some(big_rom_offset);

    let mut image = small.card_header();
    image.resize(small_len, 0xFF);
    image.extend_from_slice(big);
    image
}
