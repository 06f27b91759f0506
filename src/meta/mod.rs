//! Describes the pixel layout of a single part of an exr file,
//! and derives how the part is split up into chunks.

pub mod attribute;
pub mod levels;


use std::sync::Arc;

use crate::compression::Compression;
use crate::block::{ChunkLocation, TileCoordinates};
use crate::error::*;
use crate::math::*;
use crate::tracing_wrappers::*;
use self::attribute::*;
use self::levels::{LevelCache, TilingInformation};


/// Describes how the pixels of a part are divided into chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockDescription {

    /// The part is divided into blocks of scan lines.
    /// The number of lines per block depends on the compression method.
    ScanLines,

    /// The part is divided into tiles, possibly with multiple resolution levels.
    Tiles(TileDescription),
}

/// The subset of a part header that decides the layout of the pixel data.
/// The other attributes of a header are not required to read or write pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {

    /// List of channels in this part, sorted alphabetically.
    pub channels: ChannelList,

    /// How the pixel data of all channels in this part is compressed.
    pub compression: Compression,

    /// The rectangle of pixels that is actually stored in the file.
    pub data_window: IntegerBounds,

    /// Whether this part consists of scan line blocks or tiles.
    pub blocks: BlockDescription,

    /// The number of chunks as declared in the file.
    /// Required for multi-part files, optional otherwise.
    pub chunk_count: Option<usize>,
}

/// The position of a part inside its file.
/// Decides whether chunks start with a part number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PartIndex {

    /// The only part of a single-part file. Chunks contain no part number.
    Single,

    /// A part of a multi-part file. Chunks start with this part number.
    Multi(usize),
}

/// A header that has been validated and finalized for reading or writing pixels.
/// All geometry that depends on the header is computed once and then frozen.
#[derive(Clone, Debug)]
pub struct Part {

    /// The validated header.
    pub header: Header,

    /// Where this part is located in the file.
    pub index: PartIndex,

    /// The number of entries in the offset table of this part.
    pub chunk_count: usize,

    /// The resolution levels, present only for tiled parts.
    pub tiling: Option<Arc<TilingInformation>>,

    /// Upper bound of the uncompressed byte size of any chunk of this part.
    pub max_chunk_byte_size: usize,
}


impl Header {

    /// Create a scan line part header without a declared chunk count.
    pub fn new(channels: ChannelList, data_window: IntegerBounds, compression: Compression) -> Self {
        Header { channels, compression, data_window, blocks: BlockDescription::ScanLines, chunk_count: None }
    }

    /// Divide the part into tiles instead of scan line blocks.
    pub fn with_tiles(self, tiles: TileDescription) -> Self {
        Header { blocks: BlockDescription::Tiles(tiles), .. self }
    }

    /// Declare the number of chunks, as stored in the `chunkCount` attribute.
    pub fn with_chunk_count(self, chunk_count: usize) -> Self {
        Header { chunk_count: Some(chunk_count), .. self }
    }

    /// The default pixel size of a chunk.
    /// The last row or column of chunks may be smaller.
    pub fn default_block_pixel_size(&self) -> Vec2<usize> {
        match self.blocks {
            BlockDescription::ScanLines => Vec2(self.data_window.size.width(), self.compression.scan_lines_per_block()),
            BlockDescription::Tiles(tiles) => tiles.tile_size,
        }
    }

    /// Validate this instance.
    pub fn validate(&self) -> UnitResult {
        self.data_window.validate(None)?;

        if self.data_window.size.area() == 0 {
            return Err(Error::invalid("data window must not be empty"));
        }

        let allow_subsampling = self.blocks == BlockDescription::ScanLines;
        self.channels.validate(allow_subsampling, self.data_window)?;

        if let BlockDescription::Tiles(tiles) = self.blocks {
            tiles.validate()?;
        }

        Ok(())
    }
}


impl PartIndex {

    /// The part number written before each chunk, if any.
    pub fn part_number(self) -> Option<usize> {
        match self {
            PartIndex::Single => None,
            PartIndex::Multi(number) => Some(number),
        }
    }

    /// Whether this part belongs to a multi-part file.
    pub fn is_multi_part(self) -> bool {
        self != PartIndex::Single
    }
}


/// Calculate the size of a single block. If this is the last block,
/// this only returns the required size, which is always smaller than the default block size.
#[inline]
pub fn calculate_block_size(total_size: usize, block_size: usize, block_position: usize) -> Result<usize> {
    if block_position >= total_size {
        return Err(Error::invalid("block index"))
    }

    if block_position + block_size <= total_size {
        Ok(block_size)
    }
    else {
        Ok(total_size - block_position)
    }
}


impl Part {

    /// Validate the header and derive the chunk geometry for writing.
    /// A declared chunk count must match the computed chunk count.
    pub fn for_writing(header: Header, index: PartIndex, levels: &LevelCache) -> Result<Self> {
        Self::finalize(header, index, levels, false)
    }

    /// Validate the header and derive the chunk geometry for reading.
    /// Multi-part headers must declare their chunk count.
    pub fn for_reading(header: Header, index: PartIndex, levels: &LevelCache) -> Result<Self> {
        Self::finalize(header, index, levels, index.is_multi_part())
    }

    fn finalize(header: Header, index: PartIndex, levels: &LevelCache, require_chunk_count: bool) -> Result<Self> {
        header.validate()?;
        header.compression.validate_supported()?;

        if require_chunk_count && header.chunk_count.is_none() {
            return Err(Error::invalid("multi-part header without chunk count"));
        }

        let tiling = match header.blocks {
            BlockDescription::ScanLines => None,
            BlockDescription::Tiles(tiles) => Some(levels.get_or_compute(tiles, header.data_window.size)?),
        };

        let chunk_count = match &tiling {
            Some(tiling) => tiling.chunk_count(),
            None => RoundingMode::Up.divide(header.data_window.size.height(), header.compression.scan_lines_per_block()),
        };

        if let Some(declared) = header.chunk_count {
            if declared != chunk_count {
                return Err(Error::invalid(format!(
                    "declared chunk count {} does not match the computed chunk count {}",
                    declared, chunk_count
                )));
            }
        }

        let max_chunk_pixels = header.default_block_pixel_size();
        let max_chunk_byte_size = header.channels.bytes_per_pixel
            .checked_mul(max_chunk_pixels.width())
            .and_then(|bytes| bytes.checked_mul(max_chunk_pixels.height()))
            .ok_or_else(|| Error::invalid("chunk byte size exceeds addressable memory"))?;

        debug_event!(
            part = ?index, chunks = chunk_count, compression = %header.compression,
            levels = tiling.as_ref().map_or(1, |tiling| tiling.levels.len()),
            "finalized part geometry"
        );

        Ok(Part { header, index, chunk_count, tiling, max_chunk_byte_size })
    }

    /// Whether this part consists of tiles.
    pub fn is_tiled(&self) -> bool {
        self.tiling.is_some()
    }

    /// The location of the chunk with the specified offset table index.
    pub fn chunk_location(&self, chunk_index: usize) -> Result<ChunkLocation> {
        if chunk_index >= self.chunk_count {
            return Err(Error::invalid("chunk index out of range"));
        }

        match &self.tiling {
            Some(tiling) => {
                let (level, tile_index) = tiling.tile_of_chunk(chunk_index)?;
                Ok(ChunkLocation::Tile(TileCoordinates { tile_index, level_index: level.level_index }))
            },

            None => {
                let lines = chunk_index * self.header.compression.scan_lines_per_block();
                let y = usize_to_i32(lines, "scan line block position")?
                    .checked_add(self.header.data_window.position.y())
                    .ok_or_else(|| Error::invalid("scan line block position"))?;

                Ok(ChunkLocation::ScanLine { y })
            },
        }
    }

    /// The offset table index of the chunk at the specified location.
    pub fn chunk_index(&self, location: ChunkLocation) -> Result<usize> {
        match (location, &self.tiling) {
            (ChunkLocation::ScanLine { y }, None) => {
                let lines = self.header.compression.scan_lines_per_block() as i64;
                let relative_y = y as i64 - self.header.data_window.position.y() as i64;

                if relative_y < 0 || relative_y % lines != 0 {
                    return Err(Error::invalid("scan line block y coordinate"));
                }

                let index = (relative_y / lines) as usize;
                if index >= self.chunk_count { return Err(Error::invalid("scan line block y coordinate")); }
                Ok(index)
            },

            (ChunkLocation::Tile(tile), Some(tiling)) => {
                let level = tiling.level(tile.level_index.x(), tile.level_index.y())?;

                if tile.tile_index.x() >= level.tile_counts.x() || tile.tile_index.y() >= level.tile_counts.y() {
                    return Err(Error::invalid("tile index out of range"));
                }

                Ok(level.first_chunk_index + tile.tile_index.y() * level.tile_counts.x() + tile.tile_index.x())
            },

            _ => Err(Error::invalid("chunk location does not match the part type")),
        }
    }

    /// The absolute pixel section of the chunk at the specified location.
    /// Chunks at the right or bottom edge are clipped to the data window or level.
    /// Tile positions are relative to the level, offset by the data window position.
    pub fn chunk_bounds(&self, location: ChunkLocation) -> Result<IntegerBounds> {
        let data_window = self.header.data_window;

        match (location, &self.tiling) {
            (ChunkLocation::ScanLine { .. }, None) => {
                let index = self.chunk_index(location)?;
                let lines = self.header.compression.scan_lines_per_block();
                let start = index * lines;
                let height = calculate_block_size(data_window.size.height(), lines, start)?;

                Ok(IntegerBounds::new(
                    Vec2(data_window.position.x(), data_window.position.y() + usize_to_i32(start, "scan line block position")?),
                    Vec2(data_window.size.width(), height)
                ))
            },

            (ChunkLocation::Tile(tile), Some(tiling)) => {
                let level = tiling.level(tile.level_index.x(), tile.level_index.y())?;
                let tile_size = tiling.tiles.tile_size;

                if tile.tile_index.x() >= level.tile_counts.x() || tile.tile_index.y() >= level.tile_counts.y() {
                    return Err(Error::invalid("tile index out of range"));
                }

                let position = Vec2(tile.tile_index.x() * tile_size.width(), tile.tile_index.y() * tile_size.height());
                let size = Vec2(
                    calculate_block_size(level.resolution.width(), tile_size.width(), position.x())?,
                    calculate_block_size(level.resolution.height(), tile_size.height(), position.y())?,
                );

                let position = position.to_i32("tile position")?;
                Ok(IntegerBounds::new(position, size).with_origin(data_window.position))
            },

            _ => Err(Error::invalid("chunk location does not match the part type")),
        }
    }

    /// The uncompressed byte size of the chunk with the specified offset table index.
    pub fn chunk_byte_count(&self, chunk_index: usize) -> Result<usize> {
        let bounds = self.chunk_bounds(self.chunk_location(chunk_index)?)?;
        self.header.channels.byte_count(bounds)
    }

    /// The uncompressed byte size of the whole data window.
    /// For tiled parts, this is the size of the largest level.
    pub fn total_byte_count(&self) -> Result<usize> {
        self.header.channels.byte_count(self.header.data_window)
    }

    /// The uncompressed byte size of the whole data window,
    /// even if it does not fit into the memory of this machine.
    pub fn total_byte_count_large(&self) -> u64 {
        self.header.channels.byte_count_large(self.header.data_window)
    }

    /// The byte position of each scan line block inside the pixel bytes of the whole part.
    pub fn scan_line_block_byte_offsets(&self) -> Result<Vec<usize>> {
        if self.is_tiled() {
            return Err(Error::invalid("tiled parts have no scan line blocks"));
        }

        let mut byte_offset = 0;

        (0 .. self.chunk_count).map(|chunk_index| {
            let start = byte_offset;
            byte_offset += self.chunk_byte_count(chunk_index)?;
            Ok(start)
        }).collect()
    }

    /// The offset table indices of all tiles of a resolution level.
    pub fn level_chunk_indices(&self, level_x: usize, level_y: usize) -> Result<std::ops::Range<usize>> {
        let tiling = self.tiling.as_ref().ok_or_else(|| Error::invalid("scan line parts have no levels"))?;
        let level = tiling.level(level_x, level_y)?;
        Ok(level.first_chunk_index .. level.first_chunk_index + level.chunk_count)
    }

    /// The pixel section of a resolution level of a tiled part,
    /// positioned at the data window origin.
    pub fn level_bounds(&self, level_x: usize, level_y: usize) -> Result<IntegerBounds> {
        let tiling = self.tiling.as_ref().ok_or_else(|| Error::invalid("scan line parts have no levels"))?;
        let level = tiling.level(level_x, level_y)?;
        Ok(IntegerBounds::new(self.header.data_window.position, level.resolution))
    }

    /// The uncompressed byte size of a resolution level of a tiled part.
    pub fn level_byte_count(&self, level_x: usize, level_y: usize) -> Result<usize> {
        self.header.channels.byte_count(self.level_bounds(level_x, level_y)?)
    }

    /// The pixel section and the chunk indices of the full resolution image.
    /// For tiled parts, this is the largest resolution level.
    pub fn full_resolution_chunks(&self) -> Result<(IntegerBounds, std::ops::Range<usize>)> {
        if self.is_tiled() {
            Ok((self.level_bounds(0, 0)?, self.level_chunk_indices(0, 0)?))
        }
        else {
            Ok((self.header.data_window, 0 .. self.chunk_count))
        }
    }
}
