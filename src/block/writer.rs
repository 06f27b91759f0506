//! Compress the pixels of a single part and write them as chunks to a byte stream,
//! and update the offset table of the part for each chunk.

use std::io::{Seek, SeekFrom};
use std::ops::Range;

use crate::block::{ChunkLocation, copy_level_into_tile};
use crate::block::chunk::{ChunkHeader, OffsetTable};
use crate::block::pool::BufferPool;
use crate::error::*;
use crate::interleave::PixelInterleaveConverter;
use crate::io::*;
use crate::meta::Part;
use crate::meta::attribute::IntegerBounds;
use crate::tracing_wrappers::*;


/// Writes the chunks of one part of a file.
/// The chunks are appended to the stream in the order they are written,
/// and the offset table placeholders of the part are replaced by the actual chunk positions.
#[derive(Debug)]
pub struct PartWriter<W> {
    write: Tracking<W>,
    part: Part,

    /// Where the offset table of this part starts in the stream.
    offset_table_position: usize,
    offsets: OffsetTable,

    pool: BufferPool,

    #[cfg_attr(not(feature = "rayon"), allow(dead_code))]
    parallel: bool,
}


impl<W: Write + Seek> PartWriter<W> {

    /// Reserve space for the offset table of the part at the current position of the stream.
    /// Returns the byte position of the table.
    /// In a multi-part file, write the placeholders of all parts before writing any chunks.
    pub fn write_offset_placeholders(write: &mut W, part: &Part) -> Result<usize> {
        let position = u64_to_usize(write.stream_position()?, "stream position")?;
        OffsetTable::placeholder(part.chunk_count).write(write)?;
        Ok(position)
    }

    /// Write chunks to the end of the stream, updating the offset table placeholders
    /// which have been written at the specified position.
    pub fn new(mut write: W, part: Part, offset_table_position: usize) -> Result<Self> {
        let end = u64_to_usize(write.seek(SeekFrom::End(0))?, "stream length")?;

        let table_end = offset_table_position.checked_add(OffsetTable::byte_size(part.chunk_count));
        if table_end.map_or(true, |table_end| table_end > end) {
            return Err(Error::invalid("offset table placeholders must be written before the chunks"));
        }

        Ok(PartWriter {
            write: Tracking::at_position(write, end),
            offsets: OffsetTable::placeholder(part.chunk_count),
            offset_table_position, part,
            pool: BufferPool::new(),
            parallel: true,
        })
    }

    /// Write the offset table placeholders at the current position of the stream,
    /// and then prepare writing the chunks of this single part.
    pub fn create(mut write: W, part: Part) -> Result<Self> {
        let offset_table_position = Self::write_offset_placeholders(&mut write, &part)?;
        Self::new(write, part, offset_table_position)
    }

    /// Compress chunks on the current thread only,
    /// even if the `rayon` feature is enabled.
    pub fn non_parallel(self) -> Self {
        PartWriter { parallel: false, .. self }
    }

    /// The part whose chunks are written.
    pub fn part(&self) -> &Part {
        &self.part
    }

    /// The byte positions of the chunks written so far.
    pub fn offset_table(&self) -> &OffsetTable {
        &self.offsets
    }

    /// Check that every chunk of the part has been written,
    /// and return the stream, positioned after the last chunk.
    pub fn finish(mut self) -> Result<W> {
        if !self.offsets.is_complete() {
            let missing = self.offsets.offsets().iter()
                .filter(|&&offset| offset == OffsetTable::PLACEHOLDER).count();

            return Err(Error::invalid(format!("{} chunks of the part have not been written", missing)));
        }

        self.write.flush()?;
        debug_event!(chunks = self.offsets.len(), bytes = self.write.byte_position(), "finished writing part");
        Ok(self.write.into_inner())
    }


    /// Write all pixels of the part, given in the planar on-disk layout.
    /// For tiled parts, writes only the largest resolution level.
    /// The data must be at least `part.total_byte_count()` bytes long.
    pub fn write(&mut self, data: &[u8]) -> UnitResult {
        if self.part.is_tiled() {
            return self.write_level(data, 0, 0);
        }

        let data = prefix_of_slice(data, self.part.total_byte_count()?)?;
        let block_starts = self.part.scan_line_block_byte_offsets()?;

        self.compress_and_write_chunks(0 .. self.part.chunk_count, |chunk_index, _, raw| {
            let start = block_starts[chunk_index];
            raw.copy_from_slice(&data[start .. start + raw.len()]);
            Ok(())
        })
    }

    /// Write all tiles of a resolution level, given in the planar on-disk layout of the whole level.
    /// The data must be at least `part.level_byte_count(level_x, level_y)` bytes long.
    pub fn write_level(&mut self, data: &[u8], level_x: usize, level_y: usize) -> UnitResult {
        let level_bounds = self.part.level_bounds(level_x, level_y)?;
        let data = prefix_of_slice(data, self.part.level_byte_count(level_x, level_y)?)?;
        let chunks = self.part.level_chunk_indices(level_x, level_y)?;
        let channels = self.part.header.channels.clone();

        self.compress_and_write_chunks(chunks, |_, tile_bounds, raw| {
            copy_level_into_tile(&channels, level_bounds, tile_bounds, data, raw)
        })
    }

    /// Compress and write a single chunk, given in the planar on-disk layout.
    /// The data must be at least `part.chunk_byte_count(chunk_index)` bytes long.
    pub fn write_chunk(&mut self, chunk_index: usize, data: &[u8]) -> UnitResult {
        let location = self.part.chunk_location(chunk_index)?;
        let bounds = self.part.chunk_bounds(location)?;
        let data = prefix_of_slice(data, self.part.header.channels.byte_count(bounds)?)?;

        let compressed = self.part.header.compression
            .compress_image_section(&self.part.header.channels, data, bounds)?;

        self.write_compressed_chunk(chunk_index, location, &compressed)
    }

    /// Write all pixels of the part, given with the channels of each pixel next to each other.
    /// Channels missing from the order are written as zeroes.
    /// For tiled parts, writes only the largest resolution level.
    pub fn write_interleaved(&mut self, data: &[u8], channel_order: &[&str]) -> UnitResult {
        let converter = PixelInterleaveConverter::new(&self.part.header.channels, channel_order)?;
        let (image, chunks) = self.part.full_resolution_chunks()?;
        let data = prefix_of_slice(data, converter.interleaved_byte_count(image))?;

        // pooled chunk buffers are zeroed, which fills the excluded channels
        self.compress_and_write_chunks(chunks, |_, chunk_bounds, raw| {
            converter.to_disk_layout_within(image, data, chunk_bounds, raw)
        })
    }

    /// Write a single chunk, given with the channels of each pixel next to each other.
    pub fn write_chunk_interleaved(&mut self, chunk_index: usize, data: &[u8], channel_order: &[&str]) -> UnitResult {
        let converter = PixelInterleaveConverter::new(&self.part.header.channels, channel_order)?;
        let bounds = self.part.chunk_bounds(self.part.chunk_location(chunk_index)?)?;
        let data = prefix_of_slice(data, converter.interleaved_byte_count(bounds))?;

        let mut planar = self.pool.take(self.part.chunk_byte_count(chunk_index)?);
        converter.to_disk_layout(bounds, data, &mut planar)?;
        self.write_chunk(chunk_index, &planar)
    }


    /// Append the chunk to the stream, then point its offset table entry to it.
    fn write_compressed_chunk(&mut self, chunk_index: usize, location: ChunkLocation, compressed: &[u8]) -> UnitResult {
        if self.offsets.get(chunk_index) != Some(OffsetTable::PLACEHOLDER) {
            return Err(Error::invalid("chunk index out of range or chunk already written"));
        }

        let chunk_position = self.write.byte_position();

        let header = ChunkHeader {
            part_number: self.part.index.part_number(),
            compressed_byte_count: compressed.len(),
            location,
        };

        header.write(&mut self.write)?;
        u8::write_slice(&mut self.write, compressed)?;
        let chunks_end = self.write.byte_position();

        self.write.seek_write_to(self.offset_table_position + chunk_index * u64::BYTE_SIZE)?;
        usize_to_u64(chunk_position).write(&mut self.write)?;
        self.write.seek_write_to(chunks_end)?;

        self.offsets.set(chunk_index, chunk_position)?;

        trace_event!(chunk = chunk_index, ?location, position = chunk_position, bytes = compressed.len(), "wrote chunk");
        Ok(())
    }

    /// Gather the raw pixels of each chunk in the range using the callback,
    /// then compress them and write the chunks in increasing index order.
    fn compress_and_write_chunks(
        &mut self, chunks: Range<usize>,
        mut gather: impl FnMut(usize, IntegerBounds, &mut [u8]) -> UnitResult
    ) -> UnitResult {
        #[cfg(feature = "rayon")]
        {
            let worthwhile = chunks.len() > 1 && self.part.header.compression != crate::compression::Compression::Uncompressed;

            if self.parallel && worthwhile {
                if let Some(pool) = crate::block::create_thread_pool("Chunk Compressor") {
                    return self.compress_parallel(&pool, chunks, gather);
                }
            }
        }

        let compression = self.part.header.compression;

        for chunk_index in chunks {
            let location = self.part.chunk_location(chunk_index)?;
            let bounds = self.part.chunk_bounds(location)?;

            let mut raw = self.pool.take(self.part.header.channels.byte_count(bounds)?);
            gather(chunk_index, bounds, &mut raw)?;

            let compressed = compression.compress_image_section(&self.part.header.channels, &raw, bounds)?;
            self.write_compressed_chunk(chunk_index, location, &compressed)?;
        }

        Ok(())
    }

    /// Compress a few chunks at a time on the thread pool.
    /// The compressed chunks are sorted before writing them,
    /// so that the file is the same as a sequentially written file.
    #[cfg(feature = "rayon")]
    fn compress_parallel(
        &mut self, pool: &rayon_core::ThreadPool, chunks: Range<usize>,
        mut gather: impl FnMut(usize, IntegerBounds, &mut [u8]) -> UnitResult
    ) -> UnitResult {
        use std::collections::BTreeMap;
        use std::sync::{Arc, mpsc};
        use crate::compression::ByteVec;

        let channels = Arc::new(self.part.header.channels.clone());
        let compression = self.part.header.compression;
        let max_in_flight = pool.current_num_threads().max(1) + 2;

        let (sender, receiver) = mpsc::channel::<Result<(usize, ChunkLocation, ByteVec)>>();
        let mut pending = BTreeMap::new();
        let mut next_to_write = chunks.start;
        let mut remaining = chunks;
        let mut in_flight = 0;

        trace_event!(chunks = remaining.len(), threads = pool.current_num_threads(), "compressing chunks in parallel");

        loop {
            while in_flight < max_in_flight {
                let chunk_index = match remaining.next() {
                    Some(chunk_index) => chunk_index,
                    None => break,
                };

                let location = self.part.chunk_location(chunk_index)?;
                let bounds = self.part.chunk_bounds(location)?;

                let mut raw = self.pool.take(self.part.header.channels.byte_count(bounds)?);
                gather(chunk_index, bounds, &mut raw)?;

                let sender = sender.clone();
                let channels = Arc::clone(&channels);

                pool.spawn_fifo(move || {
                    let compressed = compression.compress_image_section(&channels, &raw, bounds);
                    drop(raw);

                    // the receiver is gone if another chunk failed already
                    let _ = sender.send(compressed.map(|compressed| (chunk_index, location, compressed)));
                });

                in_flight += 1;
            }

            if in_flight == 0 {
                debug_assert!(pending.is_empty(), "compressed chunks left after writing all chunks");
                return Ok(());
            }

            let (chunk_index, location, compressed) = receiver.recv()
                .map_err(|_| Error::Io(IoError::new(std::io::ErrorKind::Other, "chunk compression thread stopped")))??;

            in_flight -= 1;
            pending.insert(chunk_index, (location, compressed));

            while let Some((location, compressed)) = pending.remove(&next_to_write) {
                self.write_compressed_chunk(next_to_write, location, &compressed)?;
                next_to_write += 1;
            }
        }
    }
}


fn prefix_of_slice(data: &[u8], byte_count: usize) -> Result<&[u8]> {
    data.get(.. byte_count).ok_or_else(|| Error::invalid(format!(
        "pixel buffer of {} bytes is too small for {} bytes", data.len(), byte_count
    )))
}
