//! Read and write the pixel chunks of OpenEXR parts.
//!
//! Splits the pixels of a part into scan line blocks or tiles,
//! compresses each chunk, and locates the chunks in a byte stream using the offset table.
//! Supports the uncompressed, RLE, ZIP and PIZ compression methods,
//! mip maps and rip maps, multi-part files, and converting between
//! the planar on-disk layout and interleaved pixels.
//!
//! Start with `block::writer::PartWriter::create()` and `block::reader::PartReader::new()`.

#![forbid(unsafe_code)]
#![forbid(
    clippy::all,
    clippy::restriction,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
)]

#![warn(missing_docs)]


pub mod io;
pub mod math;
pub mod block;
pub mod compression;
pub mod interleave;
pub mod meta;
pub mod error;

mod tracing_wrappers;

#[macro_use]
extern crate smallvec;


/// Export the most important items from `exr_chunks`.
pub mod prelude {

    // main exports
    pub use crate::block::reader::PartReader;
    pub use crate::block::writer::PartWriter;
    pub use crate::meta::{Header, Part, PartIndex, BlockDescription};
    pub use crate::meta::levels::LevelCache;

    // core data types
    pub use crate::block::{ChunkInfo, ChunkLocation, TileCoordinates};
    pub use crate::block::chunk::{ChunkHeader, OffsetTable};
    pub use crate::compression::Compression;
    pub use crate::interleave::PixelInterleaveConverter;
    pub use crate::meta::attribute::{
        ChannelList, ChannelDescription, SampleType, IntegerBounds,
        TileDescription, LevelMode, RoundingMode,
    };

    // secondary data types
    pub use crate::math::Vec2;
    pub use crate::meta;
    pub use crate::error::{self, Error, Result, UnitResult};

    // re-export external stuff
    pub use half::f16;
}
