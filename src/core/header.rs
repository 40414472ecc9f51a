//! Card and store headers
//!
//! The image begins with a 256-byte card header followed directly by the
//! ROM store header. The card header identifies the image and lets the
//! reader guess where the image was linked to run; the store header points
//! at the heap list and the database directory.

use crate::cursor::fixed_str;
use crate::error::{Result, RomError};
use crate::features::RomVersion;
use crate::image::Image;
use serde::Serialize;
use tracing::{debug, info};

pub const CARD_SIGNATURE: u32 = 0xFEED_BEEF;
pub const STORE_SIGNATURE: u32 = 0xFEED_FACE;

pub const CARD_HEADER_SIZE: usize = 0x100;
pub const STORE_HEADER_OFFSET: usize = CARD_HEADER_SIZE;
pub const STORE_HEADER_SIZE: usize = 0x40;

/// Largest initial stack a sane image declares (1 MiB)
pub const MAX_STACK_SIZE: u32 = 0x10_0000;

/// Version 1 headers predate the big-ROM offset field; their big ROM
/// always followed a small ROM of this size.
pub const LEGACY_BIG_ROM_OFFSET: u32 = 0x3000;

/// The redirect check compares addresses modulo 1 MiB
pub const BASE_LOW_BITS_MASK: u32 = 0x000F_FFFF;

pub const FLAG_RAM_ONLY: u16 = 0x0001;
pub const FLAG_328: u16 = 0x0010;
pub const FLAG_EZ: u16 = 0x0020;
pub const FLAG_VZ: u16 = 0x0040;

// Card header field offsets
const OFF_INIT_STACK: usize = 0x00;
const OFF_RESET_VECTOR: usize = 0x04;
const OFF_SIGNATURE: usize = 0x08;
const OFF_HDR_VERSION: usize = 0x0C;
const OFF_FLAGS: usize = 0x0E;
const OFF_NAME: usize = 0x10;
const OFF_MANUFACTURER: usize = 0x30;
const OFF_VERSION: usize = 0x50;
const OFF_CREATION_DATE: usize = 0x52;
const OFF_RO_PARAMS: usize = 0x64;
const OFF_BIG_ROM_OFFSET: usize = 0x68;
const OFF_COMPANY_ID: usize = 0x7E;
const OFF_HAL_ID: usize = 0x82;
const OFF_ROM_VERSION: usize = 0x86;
const OFF_ROM_VERSION_STRING: usize = 0x8A;

const NAME_LEN: usize = 32;

/// Header version that introduced the company/HAL ids and the 32-bit
/// firmware version
const HDR_VERSION_EXTENDED: u16 = 5;

/// CPU family bits advertised by the card header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CpuFlags {
    pub cpu_328: bool,
    pub ez: bool,
    pub vz: bool,
}

impl CpuFlags {
    pub fn from_bits(flags: u16) -> Self {
        CpuFlags {
            cpu_328: flags & FLAG_328 != 0,
            ez: flags & FLAG_EZ != 0,
            vz: flags & FLAG_VZ != 0,
        }
    }
}

/// Parsed and validated card header
#[derive(Debug, Clone, Serialize)]
pub struct CardHeader {
    /// Initial stack size in bytes
    pub init_stack: u32,

    pub reset_vector: u32,

    /// Header layout version (1..=255)
    pub hdr_version: u16,

    /// Raw flags word
    pub flags: u16,

    pub cpu: CpuFlags,

    pub name: String,

    pub manufacturer: String,

    pub creation_date: u32,

    /// Pointer to the read-only parameters, i.e. the store header
    pub ro_params_ptr: u32,

    /// Offset of the big ROM from the start of the card (version >= 2)
    pub big_rom_offset: u32,

    /// Zero below header version 5
    pub company_id: u32,

    /// Zero below header version 5
    pub hal_id: u32,

    /// Raw firmware version: the 16-bit field for old headers, the 32-bit
    /// field from version 5 on
    pub rom_version: u32,

    pub rom_version_string: String,
}

impl CardHeader {
    /// Parse and validate a card header at the start of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CARD_HEADER_SIZE {
            return Err(RomError::too_small(0, CARD_HEADER_SIZE, bytes.len()));
        }

        let u16_at = |off: usize| u16::from_be_bytes([bytes[off], bytes[off + 1]]);
        let u32_at = |off: usize| {
            u32::from_be_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
        };

        let signature = u32_at(OFF_SIGNATURE);
        if signature != CARD_SIGNATURE {
            return Err(RomError::BadSignature {
                what: "card header",
                found: signature,
            });
        }

        let init_stack = u32_at(OFF_INIT_STACK);
        if init_stack == 0 || init_stack > MAX_STACK_SIZE {
            return Err(RomError::BadHeader(format!(
                "stack size {:#x} out of range",
                init_stack
            )));
        }

        let hdr_version = u16_at(OFF_HDR_VERSION);
        if hdr_version == 0 || hdr_version > 255 {
            return Err(RomError::BadHeader(format!(
                "header version {} out of range",
                hdr_version
            )));
        }

        let flags = u16_at(OFF_FLAGS);
        if flags & FLAG_RAM_ONLY != 0 {
            return Err(RomError::BadHeader(
                "RAM-only card carries no firmware".to_string(),
            ));
        }

        let (company_id, hal_id, rom_version, rom_version_string) =
            if hdr_version >= HDR_VERSION_EXTENDED {
                let raw = u32_at(OFF_ROM_VERSION);
                let mut text = fixed_str(&bytes[OFF_ROM_VERSION_STRING..][..NAME_LEN]);
                if text.is_empty() {
                    text = RomVersion::from_raw(raw).to_string();
                }
                (u32_at(OFF_COMPANY_ID), u32_at(OFF_HAL_ID), raw, text)
            } else {
                let raw = u16_at(OFF_VERSION);
                (0, 0, raw as u32, short_version_string(raw))
            };

        Ok(CardHeader {
            init_stack,
            reset_vector: u32_at(OFF_RESET_VECTOR),
            hdr_version,
            flags,
            cpu: CpuFlags::from_bits(flags),
            name: fixed_str(&bytes[OFF_NAME..][..NAME_LEN]),
            manufacturer: fixed_str(&bytes[OFF_MANUFACTURER..][..NAME_LEN]),
            creation_date: u32_at(OFF_CREATION_DATE),
            ro_params_ptr: u32_at(OFF_RO_PARAMS),
            big_rom_offset: u32_at(OFF_BIG_ROM_OFFSET),
            company_id,
            hal_id,
            rom_version,
            rom_version_string,
        })
    }

    /// Guess of the address the image was linked at
    ///
    /// The store header sits directly behind the card header, so the
    /// read-only parameter pointer minus the card header size is the base.
    pub fn base_guess(&self) -> u32 {
        self.ro_params_ptr.wrapping_sub(CARD_HEADER_SIZE as u32)
    }

    /// Low 20 bits the base of a big ROM is expected to carry
    pub fn expected_base_low_bits(&self) -> u32 {
        let expected = if self.hdr_version < 2 {
            LEGACY_BIG_ROM_OFFSET
        } else {
            self.big_rom_offset
        };
        expected & BASE_LOW_BITS_MASK
    }
}

/// Format a packed 16-bit `0xMMmf` version as `M.m` or `M.m.f`
fn short_version_string(raw: u16) -> String {
    let major = raw >> 8;
    let minor = (raw >> 4) & 0xF;
    let fix = raw & 0xF;
    if fix == 0 {
        format!("{}.{}", major, minor)
    } else {
        format!("{}.{}.{}", major, minor, fix)
    }
}

/// Validate the card header, following a small/big ROM redirect
///
/// On success the image's base is set (and its window possibly advanced).
/// On failure the image is left exactly as it was.
pub fn acquire(image: &mut Image, redirect_limit: u8) -> Result<CardHeader> {
    let original_start = image.window_start();
    let original_base = image.base();

    match acquire_with_redirects(image, redirect_limit) {
        Ok(header) => Ok(header),
        Err(e) => {
            image.set_window_start(original_start);
            image.set_base(original_base);
            Err(e)
        }
    }
}

fn acquire_with_redirects(image: &mut Image, redirect_limit: u8) -> Result<CardHeader> {
    let mut redirects = 0u8;

    loop {
        let header = CardHeader::from_bytes(image.window())?;
        let base = header.base_guess();
        let expected = header.expected_base_low_bits();

        if base & BASE_LOW_BITS_MASK == expected {
            image.set_base(base);
            info!(
                "Card '{}' by '{}' (header v{}), base {:#010x}, window at {:#x}",
                header.name,
                header.manufacturer,
                header.hdr_version,
                base,
                image.window_start()
            );
            return Ok(header);
        }

        if redirects >= redirect_limit {
            return Err(RomError::BadHeader(format!(
                "base {:#010x} does not match expected low bits {:#07x} after {} redirect(s)",
                base, expected, redirects
            )));
        }

        let shift = expected as usize;
        let next_start = image.window_start() + shift;
        if shift == 0 || next_start >= image.total_len() {
            return Err(RomError::BadHeader(format!(
                "cannot redirect by {:#x} past a {:#x}-byte image",
                shift,
                image.total_len()
            )));
        }

        debug!(
            "Base {:#010x} mismatches expected low bits {:#07x}; skipping {:#x} bytes of small ROM",
            base, expected, shift
        );
        image.set_window_start(next_start);
        redirects += 1;
    }
}

/// The ROM store header
#[derive(Debug, Clone, Serialize)]
pub struct StoreHeader {
    pub version: u16,
    pub flags: u16,
    pub name: String,
    pub creation_date: u32,
    pub backup_date: u32,

    /// Local id of the heap list
    pub heap_list: u32,

    pub init_code_1: u32,
    pub init_code_2: u32,

    /// Local id of the first database directory chunk
    pub database_dir: u32,
}

impl StoreHeader {
    pub fn from_image(image: &Image) -> Result<Self> {
        let bytes = image.slice(STORE_HEADER_OFFSET, STORE_HEADER_SIZE)?;

        let u16_at = |off: usize| u16::from_be_bytes([bytes[off], bytes[off + 1]]);
        let u32_at = |off: usize| {
            u32::from_be_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
        };

        let signature = u32_at(0x00);
        if signature != STORE_SIGNATURE {
            return Err(RomError::BadSignature {
                what: "store header",
                found: signature,
            });
        }

        Ok(StoreHeader {
            version: u16_at(0x04),
            flags: u16_at(0x06),
            name: fixed_str(&bytes[0x08..0x08 + NAME_LEN]),
            creation_date: u32_at(0x28),
            backup_date: u32_at(0x2C),
            heap_list: u32_at(0x30),
            init_code_1: u32_at(0x34),
            init_code_2: u32_at(0x38),
            database_dir: u32_at(0x3C),
        })
    }
}
