//! # romcard-rs
//!
//! Read-only inspection of handheld firmware ROM images.
//!
//! A ROM image is a big-endian memory dump: a card header, a store header,
//! a list of heaps carved into chunks, and a directory of databases whose
//! records and resources live in those chunks. Every cross-reference is a
//! *local identifier* in the device's address space; the reader guesses
//! the load address from the card header and translates from there.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use romcard_rs::RomReader;
//!
//! # fn main() -> romcard_rs::Result<()> {
//! let mut reader = RomReader::open("device.rom")?;
//! reader.acquire_all()?;
//!
//! println!("{:?} {:?}", reader.card_name(), reader.rom_version_string());
//! println!("version {:#08x}", reader.version());
//! for db in reader.databases() {
//!     println!("{} ({}/{})", db.name, db.kind, db.creator);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Acquisition
//!
//! Each step depends on the one before it and either completes or leaves
//! the reader exactly as it was:
//!
//! 1. [`RomReader::acquire_card_header`] validates the card header and
//!    fixes the base address, skipping a small ROM if needed
//! 2. [`RomReader::acquire_rom_heap`] walks every heap into a chunk map
//! 3. [`RomReader::acquire_databases`] walks the database directory
//! 4. [`RomReader::acquire_features`] and [`RomReader::acquire_splash_db`]
//!    read the system database's `feat` and `tbsb` resources

pub mod core;

// Short paths for the decoding layers
#[allow(unused_imports)]
pub(crate) use crate::core::{
    catalog, compat, cursor, error, features, fourcc, header, heap, image, options, splash,
};

pub use crate::core::{
    catalog::{Database, Item, RecordAttributes},
    compat::CpuFamily,
    error::{Result, RomError},
    features::{FeatureTable, RomVersion},
    fourcc::FourCC,
    header::{CardHeader, CpuFlags, StoreHeader},
    heap::{Chunk, ChunkKind, ChunkMap, HeapEncoding, HeapInfo},
    image::Image,
    options::ReaderOptions,
    splash::BitmapDepth,
};

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How far acquisition has progressed
///
/// Ordered: a later state implies every earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ReaderState {
    Empty,
    HeaderAcquired,
    HeapAcquired,
    DatabasesAcquired,
}

/// Reader over one ROM image
#[derive(Debug, Clone)]
pub struct RomReader {
    image: Image,
    options: ReaderOptions,
    state: ReaderState,
    card: Option<CardHeader>,
    store: Option<StoreHeader>,
    heaps: Vec<HeapInfo>,
    chunks: ChunkMap,
    databases: Vec<Database>,
    features: Option<FeatureTable>,

    /// `Some` once the splash resource was found; the inner value is its
    /// chunk, which may be unresolved
    splash: Option<Option<u32>>,
}

impl RomReader {
    /// Wrap an image with default options
    pub fn new(bytes: Vec<u8>) -> Self {
        Self::with_options(bytes, ReaderOptions::default())
    }

    pub fn with_options(bytes: Vec<u8>, options: ReaderOptions) -> Self {
        debug!("Reader over {} byte image", bytes.len());
        RomReader {
            image: Image::new(bytes),
            options,
            state: ReaderState::Empty,
            card: None,
            store: None,
            heaps: Vec::new(),
            chunks: ChunkMap::new(),
            databases: Vec::new(),
            features: None,
            splash: None,
        }
    }

    /// Read an image file with default options
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        info!("Opened {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::new(bytes))
    }

    pub fn builder() -> ReaderBuilder {
        ReaderBuilder::new()
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Validate the card header and establish the base address
    pub fn acquire_card_header(&mut self) -> Result<()> {
        if self.state >= ReaderState::HeaderAcquired {
            return Ok(());
        }

        let card = header::acquire(&mut self.image, self.options.redirect_limit)?;
        self.card = Some(card);
        self.state = ReaderState::HeaderAcquired;
        Ok(())
    }

    /// Walk every heap into the chunk map
    ///
    /// If any heap fails validation no chunks are kept.
    pub fn acquire_rom_heap(&mut self) -> Result<()> {
        if self.state >= ReaderState::HeapAcquired {
            return Ok(());
        }
        if self.state < ReaderState::HeaderAcquired {
            return Err(RomError::MissingDependency("card header"));
        }
        if self.image.base() == 0 {
            return Err(RomError::BadHeader("base address unknown".to_string()));
        }

        let store = StoreHeader::from_image(&self.image)?;
        let (heaps, chunks) = heap::acquire(&self.image, &store)?;

        self.store = Some(store);
        self.heaps = heaps;
        self.chunks = chunks;
        self.state = ReaderState::HeapAcquired;
        Ok(())
    }

    /// Walk the database directory and classify the chunks it references
    pub fn acquire_databases(&mut self) -> Result<()> {
        if self.state >= ReaderState::DatabasesAcquired {
            return Ok(());
        }
        let Some(store) = self.store.as_ref() else {
            return Err(RomError::MissingDependency("ROM heap"));
        };
        if self.chunks.is_empty() {
            return Err(RomError::MissingDependency("ROM heap"));
        }

        let walk = catalog::walk(
            &self.image,
            &self.chunks,
            store.database_dir,
            self.options.max_directory_pages,
        )?;
        let applied = catalog::apply_tags(&mut self.chunks, &walk.tags);
        debug!("Classified {} chunk(s)", applied);

        self.databases = walk.databases;
        self.state = ReaderState::DatabasesAcquired;
        Ok(())
    }

    /// Build the feature table from the system database's `feat` resources
    pub fn acquire_features(&mut self) -> Result<()> {
        if self.state < ReaderState::DatabasesAcquired || self.databases.is_empty() {
            return Err(RomError::MissingDependency("databases"));
        }

        let table = features::extract(&self.image, &self.chunks, &self.databases);
        info!(
            "Feature table: {} value(s) from {} creator(s), firmware {}",
            table.len(),
            table.creators().count(),
            table.rom_version()
        );
        self.features = Some(table);
        Ok(())
    }

    /// Locate the splash-screen resource
    pub fn acquire_splash_db(&mut self) -> Result<()> {
        if self.state < ReaderState::DatabasesAcquired {
            return Err(RomError::MissingDependency("databases"));
        }

        let (db, item, chunk) = splash::find_splash(&self.databases)
            .ok_or_else(|| RomError::NotFound("splash resource".to_string()))?;
        debug!(
            "Splash resource is item {} of '{}', chunk {:?}",
            item, self.databases[db].name, chunk
        );
        self.splash = Some(chunk);
        Ok(())
    }

    /// Run every step in order
    ///
    /// The header, heap and directory steps are required. Features are
    /// skipped when the directory is empty, and a missing splash resource
    /// is not an error.
    pub fn acquire_all(&mut self) -> Result<()> {
        self.acquire_card_header()?;
        self.acquire_rom_heap()?;
        self.acquire_databases()?;

        if self.databases.is_empty() {
            warn!("Image has no databases; skipping feature table");
        } else {
            self.acquire_features()?;
        }

        match self.acquire_splash_db() {
            Ok(()) => {}
            Err(RomError::NotFound(what)) => debug!("No {}", what),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    pub fn card_header(&self) -> Option<&CardHeader> {
        self.card.as_ref()
    }

    pub fn store_header(&self) -> Option<&StoreHeader> {
        self.store.as_ref()
    }

    pub fn card_version(&self) -> Option<u16> {
        self.card.as_ref().map(|c| c.hdr_version)
    }

    pub fn card_name(&self) -> Option<&str> {
        self.card.as_ref().map(|c| c.name.as_str())
    }

    pub fn card_manufacturer(&self) -> Option<&str> {
        self.card.as_ref().map(|c| c.manufacturer.as_str())
    }

    pub fn company_id(&self) -> Option<u32> {
        self.card.as_ref().map(|c| c.company_id)
    }

    pub fn hal_id(&self) -> Option<u32> {
        self.card.as_ref().map(|c| c.hal_id)
    }

    /// Raw firmware version from the card header
    pub fn rom_version(&self) -> Option<u32> {
        self.card.as_ref().map(|c| c.rom_version)
    }

    pub fn rom_version_string(&self) -> Option<&str> {
        self.card.as_ref().map(|c| c.rom_version_string.as_str())
    }

    pub fn flag_328(&self) -> Option<bool> {
        self.cpu_flag(CpuFamily::Dragonball328)
    }

    pub fn flag_ez(&self) -> Option<bool> {
        self.cpu_flag(CpuFamily::DragonballEz)
    }

    pub fn flag_vz(&self) -> Option<bool> {
        self.cpu_flag(CpuFamily::DragonballVz)
    }

    /// Header flag for `family`, corrected by the vendor override table
    /// once databases are known
    pub fn cpu_flag(&self, family: CpuFamily) -> Option<bool> {
        let card = self.card.as_ref()?;
        Some(compat::effective_flag(
            &card.cpu,
            family,
            &card.manufacturer,
            |name| self.contains_db(name),
        ))
    }

    pub fn heaps(&self) -> &[HeapInfo] {
        &self.heaps
    }

    pub fn heap_count(&self) -> usize {
        self.heaps.len()
    }

    pub fn chunks(&self) -> &ChunkMap {
        &self.chunks
    }

    pub fn chunk(&self, local_id: u32) -> Option<&Chunk> {
        self.chunks.get(&local_id)
    }

    /// Databases in directory order; empty before acquisition
    pub fn databases(&self) -> &[Database] {
        &self.databases
    }

    /// Exact, case-sensitive name match
    pub fn contains_db(&self, name: &str) -> bool {
        self.find_database(name).is_some()
    }

    pub fn find_database(&self, name: &str) -> Option<&Database> {
        self.databases.iter().find(|db| db.name == name)
    }

    /// Payload of a chunk, excluding its header and size-adjust slack
    pub fn chunk_data(&self, chunk: &Chunk) -> Option<&[u8]> {
        heap::chunk_payload(&self.image, chunk).ok()
    }

    /// Payload of the chunk an item is stored in
    pub fn item_data(&self, item: &Item) -> Option<&[u8]> {
        let chunk = self.chunks.get(&item.chunk()?)?;
        self.chunk_data(chunk)
    }

    pub fn features(&self) -> Option<&FeatureTable> {
        self.features.as_ref()
    }

    /// Decoded firmware version; all zero before features are acquired
    pub fn version_parts(&self) -> RomVersion {
        self.features
            .as_ref()
            .map(FeatureTable::rom_version)
            .unwrap_or_default()
    }

    /// `(major << 16) | (minor << 8) | fix`
    pub fn version(&self) -> u32 {
        self.version_parts().combined()
    }

    /// True once the splash resource was located, even if its chunk did
    /// not resolve
    pub fn splash_acquired(&self) -> bool {
        self.splash.is_some()
    }

    /// Chunk holding the splash bitmap, if found and resolved
    pub fn splash_chunk(&self) -> Option<&Chunk> {
        let lid = self.splash??;
        self.chunks.get(&lid)
    }

    /// Color depth of the bitmap chain stored in `chunk`
    pub fn is_bitmap_color(&self, chunk: &Chunk, boot_screen: bool) -> BitmapDepth {
        match heap::chunk_payload(&self.image, chunk) {
            Ok(payload) => splash::classify(payload, boot_screen),
            Err(_) => BitmapDepth::Unknown,
        }
    }

    /// Snapshot of everything acquired so far
    pub fn summary(&self) -> RomSummary {
        RomSummary {
            size: self.image.total_len(),
            sha256: self.image.sha256_hex(),
            window_start: self.image.window_start(),
            base: self.image.base(),
            state: self.state,
            card: self.card.clone(),
            cpu: self.card.as_ref().map(|_| EffectiveCpu {
                cpu_328: self.flag_328().unwrap_or(false),
                ez: self.flag_ez().unwrap_or(false),
                vz: self.flag_vz().unwrap_or(false),
            }),
            version: self.features.as_ref().map(|_| self.version_parts()),
            heap_count: self.heap_count(),
            chunk_count: self.chunks.len(),
            database_count: self.databases.len(),
            feature_count: self.features.as_ref().map_or(0, FeatureTable::len),
            splash: self
                .splash_chunk()
                .map(|chunk| self.is_bitmap_color(chunk, true)),
        }
    }
}

/// CPU flags after vendor overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EffectiveCpu {
    pub cpu_328: bool,
    pub ez: bool,
    pub vz: bool,
}

/// Serializable report of an acquired image
#[derive(Debug, Clone, Serialize)]
pub struct RomSummary {
    pub size: usize,
    pub sha256: String,
    pub window_start: usize,
    pub base: u32,
    pub state: ReaderState,
    pub card: Option<CardHeader>,
    pub cpu: Option<EffectiveCpu>,
    pub version: Option<RomVersion>,
    pub heap_count: usize,
    pub chunk_count: usize,
    pub database_count: usize,
    pub feature_count: usize,
    pub splash: Option<BitmapDepth>,
}

/// Builder for a [`RomReader`] with non-default options
///
/// # Examples
///
/// ```rust,no_run
/// use romcard_rs::RomReader;
///
/// # fn main() -> romcard_rs::Result<()> {
/// let reader = RomReader::builder()
///     .path("device.rom")
///     .redirect_limit(0)
///     .max_directory_pages(64)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ReaderBuilder {
    options: ReaderOptions,
    bytes: Option<Vec<u8>>,
    path: Option<PathBuf>,
}

impl ReaderBuilder {
    pub fn new() -> Self {
        ReaderBuilder {
            options: ReaderOptions::default(),
            bytes: None,
            path: None,
        }
    }

    /// Replace all options at once
    pub fn options(mut self, options: ReaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn redirect_limit(mut self, limit: u8) -> Self {
        self.options.redirect_limit = limit;
        self
    }

    pub fn max_directory_pages(mut self, pages: usize) -> Self {
        self.options.max_directory_pages = pages;
        self
    }

    /// Use in-memory image bytes
    pub fn image(mut self, bytes: Vec<u8>) -> Self {
        self.bytes = Some(bytes);
        self
    }

    /// Read the image from a file at build time
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<RomReader> {
        let bytes = match (self.bytes, self.path) {
            (Some(bytes), _) => bytes,
            (None, Some(path)) => {
                let bytes = std::fs::read(&path)?;
                info!("Opened {} ({} bytes)", path.display(), bytes.len());
                bytes
            }
            (None, None) => {
                return Err(RomError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "image bytes or path must be set",
                )))
            }
        };

        debug!("Building reader with {:?}", self.options);
        Ok(RomReader::with_options(bytes, self.options))
    }
}

impl Default for ReaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}
