//! Splash-screen lookup and bitmap depth classification

use crate::catalog::{Database, Item};
use crate::cursor::Cursor;
use crate::features::SYSTEM_CREATOR;
use crate::fourcc::FourCC;
use serde::Serialize;

pub const SPLASH_RESOURCE_TYPE: FourCC = FourCC::from_bytes(b"tbsb");
pub const SPLASH_RESOURCE_ID: u16 = 19001;

/// Boot-screen resources carry a prefix ahead of the first bitmap
pub const BOOT_SCREEN_PREFIX: usize = 6;

pub const BITMAP_DESCRIPTOR_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BitmapDepth {
    Unknown,
    Monochrome,
    Color,
}

/// One bitmap descriptor in a depth chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapDescriptor {
    pub width: i16,
    pub height: i16,
    pub row_bytes: u16,
    pub flags: u16,
    pub pixel_size: u8,
    pub version: u8,

    /// Distance to the next descriptor, in 4-byte units (0 = last)
    pub next_depth_offset: u16,
}

impl BitmapDescriptor {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < BITMAP_DESCRIPTOR_SIZE {
            return None;
        }
        let mut cur = Cursor::new(bytes);
        let descriptor = BitmapDescriptor {
            width: cur.i16()?,
            height: cur.i16()?,
            row_bytes: cur.u16()?,
            flags: cur.u16()?,
            pixel_size: cur.u8()?,
            version: cur.u8()?,
            next_depth_offset: cur.u16()?,
        };
        // reserved
        cur.skip(4)?;
        Some(descriptor)
    }
}

/// Find the first splash resource: system creator, `tbsb`, id 19001
///
/// Returns the database index, item index, and the item's chunk.
pub fn find_splash(databases: &[Database]) -> Option<(usize, usize, Option<u32>)> {
    databases
        .iter()
        .enumerate()
        .filter(|(_, db)| db.creator == SYSTEM_CREATOR)
        .find_map(|(db_index, db)| {
            db.items
                .iter()
                .position(is_splash_item)
                .map(|item_index| (db_index, item_index, db.items[item_index].chunk()))
        })
}

/// Classify the color depth of a bitmap chain in a chunk payload
///
/// Walks the depth chain until it finds a descriptor of 8 bits per pixel
/// or more (`Color`), reaches the end of the chain (`Monochrome`), or
/// would read past the payload (`Unknown`).
pub fn classify(payload: &[u8], boot_screen: bool) -> BitmapDepth {
    let mut pos = if boot_screen { BOOT_SCREEN_PREFIX } else { 0 };

    loop {
        let Some(descriptor) = payload.get(pos..).and_then(BitmapDescriptor::parse) else {
            return BitmapDepth::Unknown;
        };

        if descriptor.pixel_size >= 8 {
            return BitmapDepth::Color;
        }
        if descriptor.next_depth_offset == 0 {
            return BitmapDepth::Monochrome;
        }
        pos += descriptor.next_depth_offset as usize * 4;
    }
}

/// True for the splash resource (`tbsb` 19001)
pub fn is_splash_item(item: &Item) -> bool {
    item.is_resource(SPLASH_RESOURCE_TYPE, SPLASH_RESOURCE_ID)
}
