//! Read and write the headers of compressed pixel chunks, and the offset table of a part.
//! Does not include the process of compression and decompression.

use std::collections::HashSet;

use crate::block::{ChunkLocation, TileCoordinates};
use crate::error::{Error, Result, UnitResult, i32_to_usize, usize_to_i32, usize_to_u64};
use crate::io::*;
use crate::math::Vec2;
use crate::tracing_wrappers::*;


/// The bytes in front of the compressed pixels of every chunk.
/// The layout is `[part number] (y | tile x, tile y, level x, level y) byte count`,
/// where the part number is only present in multi-part files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkHeader {

    /// The part that the chunk belongs to, if the file has multiple parts.
    pub part_number: Option<usize>,

    /// Where the chunk is located inside its part.
    pub location: ChunkLocation,

    /// The number of compressed pixel bytes following this header.
    pub compressed_byte_count: usize,
}

/// Contains one byte position for each chunk of a part.
/// The chunks of a part can be stored in any order,
/// so the table is the only way to find a specific chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OffsetTable {
    offsets: Vec<u64>,
}


impl TileCoordinates {

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        usize_to_i32(self.tile_index.x(), "tile x")?.write(write)?;
        usize_to_i32(self.tile_index.y(), "tile y")?.write(write)?;
        usize_to_i32(self.level_index.x(), "level x")?.write(write)?;
        usize_to_i32(self.level_index.y(), "level y")?.write(write)?;
        Ok(())
    }

    /// Read the value without validating the tile index.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let tile_x = i32::read(read)?;
        let tile_y = i32::read(read)?;

        let level_x = i32::read(read)?;
        let level_y = i32::read(read)?;

        if level_x > 31 || level_y > 31 {
            // there can be at most 31 levels, because the largest level would have a size of 2^31,
            // which exceeds the maximum 32-bit integer value.
            return Err(Error::invalid("level index exceeding integer maximum"));
        }

        Ok(TileCoordinates {
            tile_index: Vec2(tile_x, tile_y).to_usize("tile coordinate index")?,
            level_index: Vec2(level_x, level_y).to_usize("tile coordinate level")?
        })
    }
}


impl ChunkHeader {

    /// The number of bytes this header occupies in the file.
    pub fn byte_size(multi_part: bool, tiled: bool) -> usize {
        let part_number = if multi_part { i32::BYTE_SIZE } else { 0 };
        let location = if tiled { 4 * i32::BYTE_SIZE } else { i32::BYTE_SIZE };
        part_number + location + i32::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        if let Some(part_number) = self.part_number {
            usize_to_i32(part_number, "part number")?.write(write)?;
        }

        match self.location {
            ChunkLocation::ScanLine { y } => y.write(write)?,
            ChunkLocation::Tile(tile) => tile.write(write)?,
        }

        usize_to_i32(self.compressed_byte_count, "chunk byte size")?.write(write)
    }

    /// Read the header of a chunk. Reads a part number only if the file has multiple parts.
    /// Does not validate the chunk location.
    pub fn read(read: &mut impl Read, multi_part: bool, tiled: bool) -> Result<Self> {
        let part_number = if multi_part { Some(i32_to_usize(i32::read(read)?, "chunk part number")?) } else { None };

        let location = if tiled { ChunkLocation::Tile(TileCoordinates::read(read)?) }
            else { ChunkLocation::ScanLine { y: i32::read(read)? } };

        let compressed_byte_count = i32_to_usize(i32::read(read)?, "chunk byte size")?;

        trace_event!(?part_number, ?location, bytes = compressed_byte_count, "read chunk header");
        Ok(ChunkHeader { part_number, location, compressed_byte_count })
    }
}


impl OffsetTable {

    /// The value of table entries that have not been written yet.
    pub const PLACEHOLDER: u64 = u64::MAX;

    /// A table where no chunk has been written yet.
    pub fn placeholder(chunk_count: usize) -> Self {
        OffsetTable { offsets: vec![ Self::PLACEHOLDER; chunk_count ] }
    }

    /// Use the specified byte positions.
    pub fn from_offsets(offsets: Vec<u64>) -> Self {
        OffsetTable { offsets }
    }

    /// The number of bytes a table with the specified number of chunks occupies in the file.
    pub fn byte_size(chunk_count: usize) -> usize {
        chunk_count * u64::BYTE_SIZE
    }

    /// Read a table with the specified number of entries.
    /// Does not validate the offsets.
    pub fn read(read: &mut impl Read, chunk_count: usize) -> Result<Self> {
        let offsets = u64::read_vec(read, chunk_count, u16::MAX as usize, None, "offset table size")?;
        Ok(OffsetTable { offsets })
    }

    /// Write all entries, including placeholders.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        u64::write_slice(write, &self.offsets)
    }

    /// The number of chunks in this table.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether the table contains no chunks.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// The byte position of the chunk, which may be a placeholder.
    pub fn get(&self, chunk_index: usize) -> Option<u64> {
        self.offsets.get(chunk_index).copied()
    }

    /// All entries of the table.
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Remember where the chunk has been written.
    pub fn set(&mut self, chunk_index: usize, byte_position: usize) -> UnitResult {
        let entry = self.offsets.get_mut(chunk_index)
            .ok_or_else(|| Error::invalid("chunk index out of range"))?;

        *entry = usize_to_u64(byte_position);
        Ok(())
    }

    /// Whether every entry has been written.
    pub fn is_complete(&self) -> bool {
        self.offsets.iter().all(|&offset| offset != Self::PLACEHOLDER)
    }

    /// Check that every chunk starts inside the chunk data section of the stream,
    /// and that no two chunks start at the same position.
    pub fn validate(&self, chunks_start: usize, stream_end: usize) -> UnitResult {
        let (chunks_start, stream_end) = (usize_to_u64(chunks_start), usize_to_u64(stream_end));
        let mut visited = HashSet::with_capacity(self.offsets.len());

        for (_index, &offset) in self.offsets.iter().enumerate() {
            if offset == Self::PLACEHOLDER {
                warn_event!(chunk = _index, "offset table contains a placeholder");
                return Err(Error::invalid("offset table contains an unwritten chunk"));
            }

            if offset < chunks_start || offset >= stream_end {
                warn_event!(chunk = _index, offset, "offset table entry outside of the chunk data");
                return Err(Error::invalid("offset table entry outside of the chunk data"));
            }

            if !visited.insert(offset) {
                warn_event!(chunk = _index, offset, "offset table entry appears twice");
                return Err(Error::invalid("offset table references a chunk twice"));
            }
        }

        Ok(())
    }
}
