//! Image buffer and local-identifier translation
//!
//! Every cross-reference stored inside a ROM image is a *local identifier*:
//! an address in the device's own address space. The image is loaded at an
//! unknown address, so the reader guesses a base `B` from the card header
//! and translates with `offset = lid - B`.
//!
//! All offsets handed out by [`Image`] are relative to the current *window
//! start*. The window moves at most once, when the buffer turns out to
//! begin with a superseded small ROM ahead of the real one.

use crate::error::{Result, RomError};
use sha2::{Digest, Sha256};

/// Owned ROM bytes plus the active window and base-address guess
#[derive(Debug, Clone)]
pub struct Image {
    bytes: Vec<u8>,
    start: usize,
    base: u32,
}

impl Image {
    pub fn new(bytes: Vec<u8>) -> Self {
        Image {
            bytes,
            start: 0,
            base: 0,
        }
    }

    /// Length of the active window
    pub fn len(&self) -> usize {
        self.bytes.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the whole buffer, independent of the window
    pub fn total_len(&self) -> usize {
        self.bytes.len()
    }

    /// The active window
    pub fn window(&self) -> &[u8] {
        &self.bytes[self.start..]
    }

    /// Offset of the window from the start of the buffer
    pub fn window_start(&self) -> usize {
        self.start
    }

    /// Base address guess (`0` until the card header is acquired)
    pub fn base(&self) -> u32 {
        self.base
    }

    pub(crate) fn set_base(&mut self, base: u32) {
        self.base = base;
    }

    /// Move the window start to an absolute buffer offset
    pub(crate) fn set_window_start(&mut self, start: usize) {
        debug_assert!(start <= self.bytes.len());
        self.start = start.min(self.bytes.len());
    }

    /// Local identifier of a window offset: `B + offset`
    pub fn local_id(&self, offset: usize) -> u32 {
        self.base.wrapping_add(offset as u32)
    }

    /// Window offset of a local identifier: `lid - B`
    ///
    /// Returns `None` when the identifier lies below the base or past the
    /// end of the window.
    pub fn offset_of(&self, lid: u32) -> Option<usize> {
        let offset = lid.checked_sub(self.base)? as usize;
        if offset < self.len() {
            Some(offset)
        } else {
            None
        }
    }

    /// Translate a local identifier and require `len` readable bytes there
    pub fn resolve(&self, lid: u32, len: usize) -> Result<usize> {
        let offset = self.offset_of(lid).ok_or_else(|| {
            RomError::too_small(lid.wrapping_sub(self.base) as usize, len, self.len())
        })?;
        self.slice(offset, len)?;
        Ok(offset)
    }

    /// Bounds-checked view of `len` bytes at a window offset
    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.window().get(offset..end))
            .ok_or_else(|| RomError::too_small(offset, len, self.len()))
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        Ok(self.slice(offset, 1)?[0])
    }

    pub fn read_u16(&self, offset: usize) -> Result<u16> {
        let b = self.slice(offset, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        let b = self.slice(offset, 4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// SHA-256 of the whole buffer, hex encoded
    pub fn sha256_hex(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }
}
