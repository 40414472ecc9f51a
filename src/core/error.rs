use thiserror::Error;

#[derive(Error, Debug)]
pub enum RomError {
    #[error("Buffer too small: need {needed} bytes at offset {offset:#x}, only {len} available")]
    BufferTooSmall {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("Invalid {what} signature: {found:#010x}")]
    BadSignature { what: &'static str, found: u32 },

    #[error("Invalid card header: {0}")]
    BadHeader(String),

    #[error("Heap at {heap:#010x} declares {declared} bytes but chunks account for {walked}")]
    SizeMismatch { heap: u32, declared: u32, walked: u32 },

    #[error("Free chunk {0:#010x} is missing or not marked free")]
    BadFreeChunk(u32),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl RomError {
    pub(crate) fn too_small(offset: usize, needed: usize, len: usize) -> Self {
        RomError::BufferTooSmall {
            offset,
            needed,
            len,
        }
    }
}

pub type Result<T> = std::result::Result<T, RomError>;
