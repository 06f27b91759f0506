//! Read and write the pixel chunks of a single part.
//! Includes the chunk headers, the offset table, and the
//! compression and decompression of all chunks of a part.
//!
//! Start with `block::reader::PartReader::new()`
//! and `block::writer::PartWriter::create()`.

pub mod chunk;
pub mod pool;
pub mod reader;
pub mod writer;


use std::ops::Range;

use crate::error::{Error, Result, UnitResult};
use crate::math::Vec2;
use crate::meta::attribute::{ChannelList, IntegerBounds};


/// Where a chunk is located inside its part.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkLocation {

    /// A block of scan lines.
    /// The y coordinate is the absolute pixel space y coordinate of the top scan line in the block.
    /// The top scan line block in the image is aligned with the top edge of the data window.
    ScanLine {

        /// The absolute y coordinate of the first line of the block.
        y: i32
    },

    /// A tile of a resolution level.
    Tile(TileCoordinates),
}

/// Indicates the position and resolution level of a tile.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct TileCoordinates {

    /// Index of the tile, not pixel position.
    pub tile_index: Vec2<usize>,

    /// Index of the Mip/Rip level.
    pub level_index: Vec2<usize>,
}

/// Everything known about a chunk after reading its header,
/// before its pixel bytes have been decompressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkInfo {

    /// The index of the chunk in the offset table of the part.
    pub index: usize,

    /// Where the chunk is located inside the part.
    pub location: ChunkLocation,

    /// The absolute pixel section covered by the chunk, clipped to the data window or level.
    pub pixel_section: IntegerBounds,

    /// The byte position of the chunk header in the stream.
    pub byte_offset: usize,

    /// The number of pixel bytes as stored in the file.
    pub compressed_byte_count: usize,

    /// The number of pixel bytes after decompression.
    pub byte_count: usize,
}


impl ChunkInfo {

    /// Whether the pixel bytes of this chunk were stored without compression,
    /// because compressing them would not have saved any space.
    pub fn is_stored_raw(&self) -> bool {
        self.compressed_byte_count == self.byte_count
    }
}


/// Copy the pixels of a decompressed tile into the buffer of a whole resolution level.
/// Both buffers use the on-disk layout, with the line width of the tile or level respectively.
pub(crate) fn copy_tile_into_level(
    channels: &ChannelList, level: IntegerBounds, tile: IntegerBounds,
    tile_bytes: &[u8], level_bytes: &mut [u8]
) -> UnitResult {
    validate_tile_buffers(channels, level, tile, tile_bytes.len(), level_bytes.len())?;

    for (level_range, tile_range) in tile_line_ranges(channels, level, tile)? {
        level_bytes[level_range].copy_from_slice(&tile_bytes[tile_range]);
    }

    Ok(())
}

/// Copy the pixels of a tile out of the buffer of a whole resolution level.
pub(crate) fn copy_level_into_tile(
    channels: &ChannelList, level: IntegerBounds, tile: IntegerBounds,
    level_bytes: &[u8], tile_bytes: &mut [u8]
) -> UnitResult {
    validate_tile_buffers(channels, level, tile, tile_bytes.len(), level_bytes.len())?;

    for (level_range, tile_range) in tile_line_ranges(channels, level, tile)? {
        tile_bytes[tile_range].copy_from_slice(&level_bytes[level_range]);
    }

    Ok(())
}

fn validate_tile_buffers(channels: &ChannelList, level: IntegerBounds, tile: IntegerBounds, tile_len: usize, level_len: usize) -> UnitResult {
    if channels.is_subsampled() {
        return Err(Error::unsupported("subsampled tiles"));
    }

    if !level.contains(tile) {
        return Err(Error::invalid("tile is outside of its resolution level"));
    }

    if tile_len < channels.byte_count(tile)? || level_len < channels.byte_count(level)? {
        return Err(Error::invalid("pixel buffer is too small for the tile"));
    }

    Ok(())
}

/// For each line of each channel of the tile,
/// the byte range in the level buffer and the byte range in the tile buffer.
fn tile_line_ranges<'c>(channels: &'c ChannelList, level: IntegerBounds, tile: IntegerBounds)
    -> Result<impl 'c + Iterator<Item=(Range<usize>, Range<usize>)>>
{
    let offset = (tile.position - level.position).to_usize("tile position")?;
    let bytes_per_pixel = channels.bytes_per_pixel;
    let level_width = level.size.width();
    let tile_width = tile.size.width();

    Ok((0 .. tile.size.height()).flat_map(move |y| {
        let level_line_start = (offset.y() + y) * level_width * bytes_per_pixel;
        let tile_line_start = y * tile_width * bytes_per_pixel;

        channels.channels_with_byte_offset().map(move |(byte_offset, channel)| {
            let sample_size = channel.sample_type.bytes_per_sample();
            let byte_count = tile_width * sample_size;

            let level_start = level_line_start + level_width * byte_offset + offset.x() * sample_size;
            let tile_start = tile_line_start + tile_width * byte_offset;

            (level_start .. level_start + byte_count, tile_start .. tile_start + byte_count)
        })
    }))
}


/// Create the worker threads for compressing or decompressing many chunks.
/// Returns none if the platform does not support threads.
#[cfg(feature = "rayon")]
pub(crate) fn create_thread_pool(purpose: &'static str) -> Option<rayon_core::ThreadPool> {
    use crate::tracing_wrappers::*;

    let pool = rayon_core::ThreadPoolBuilder::new()
        .thread_name(move |index| format!("OpenEXR {} Thread #{}", purpose, index))
        .build();

    match pool {
        Ok(pool) => Some(pool),
        Err(_error) => {
            warn_event!(error = %_error, purpose, "cannot create thread pool, processing chunks sequentially");
            None
        }
    }
}
