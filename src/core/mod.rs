//! Image decoding layers, leaf to root
//!
//! - [`image`] - byte buffer and local-identifier translation
//! - [`header`] - card and store headers
//! - [`heap`] - heap walking and the chunk index
//! - [`catalog`] - database directory walking
//! - [`features`] - system feature table and version decoding
//! - [`splash`] - splash lookup and bitmap depth classification
//! - [`compat`] - CPU flag overrides

pub mod catalog;
pub mod compat;
pub mod cursor;
pub mod error;
pub mod features;
pub mod fourcc;
pub mod header;
pub mod heap;
pub mod image;
pub mod options;
pub mod splash;
