//! Reader options
//!
//! Options can be set programmatically through [`crate::ReaderBuilder`] or
//! loaded from a TOML file:
//!
//! ```toml
//! redirect_limit = 1
//! max_directory_pages = 4096
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderOptions {
    /// How many times the card header may redirect past a small ROM
    pub redirect_limit: u8,

    /// Upper bound on directory pages followed before giving up
    pub max_directory_pages: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            redirect_limit: 1,
            max_directory_pages: 4096,
        }
    }
}

impl ReaderOptions {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
