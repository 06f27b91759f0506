//! Read the chunks of a single part from a byte stream,
//! and decompress them into the planar on-disk pixel layout
//! or into an interleaved pixel layout.

use std::io::{Seek, SeekFrom};
use std::ops::Range;

use crate::block::{ChunkInfo, copy_tile_into_level};
use crate::block::chunk::{ChunkHeader, OffsetTable};
use crate::block::pool::BufferPool;
use crate::compression::ByteVec;
use crate::error::*;
use crate::interleave::PixelInterleaveConverter;
use crate::io::*;
use crate::meta::Part;
use crate::tracing_wrappers::*;


/// Reads the chunks of one part of a file.
/// Chunks are located using the offset table of the part,
/// so they can be read in any order.
#[derive(Debug)]
pub struct PartReader<R> {
    read: Tracking<R>,
    part: Part,
    offsets: OffsetTable,

    /// No chunk may start before this byte position.
    chunks_start: usize,

    /// No chunk may extend beyond this byte position.
    stream_end: usize,

    pool: BufferPool,

    #[cfg_attr(not(feature = "rayon"), allow(dead_code))]
    parallel: bool,
}


/// Never allocate more than this many bytes at once for a chunk
/// whose size has not been confirmed by the stream.
const CHUNK_ALLOCATION_STEP: usize = 4 * u16::MAX as usize;


impl<R: Read + Seek> PartReader<R> {

    /// Read the offset table of the part at the specified byte position of the stream.
    /// If `pedantic` is set, the whole offset table is validated immediately.
    /// Otherwise, each chunk is validated only when it is read.
    pub fn new(mut read: R, part: Part, offset_table_position: usize, pedantic: bool) -> Result<Self> {
        read.seek(SeekFrom::Start(usize_to_u64(offset_table_position)))?;

        let mut read = Tracking::at_position(read, offset_table_position);
        let offsets = OffsetTable::read(&mut read, part.chunk_count)?;
        let chunks_start = read.byte_position();

        Self::with_offset_table(read.into_inner(), part, offsets, chunks_start, pedantic)
    }

    /// Use an offset table that has already been read.
    /// The chunks start position is the first byte after all offset tables of the file.
    pub fn with_offset_table(mut read: R, part: Part, offsets: OffsetTable, chunks_start: usize, pedantic: bool) -> Result<Self> {
        if offsets.len() != part.chunk_count {
            return Err(Error::invalid("offset table size does not match the chunk count"));
        }

        let position = u64_to_usize(read.stream_position()?, "stream position")?;
        let mut read = Tracking::at_position(read, position);
        let stream_end = read.stream_len()?;

        if let Err(error) = offsets.validate(chunks_start, stream_end) {
            if pedantic { return Err(error); }
            debug_event!(%error, "offset table is damaged, validating each chunk when it is read");
        }

        Ok(PartReader {
            read, part, offsets, chunks_start, stream_end,
            pool: BufferPool::new(),
            parallel: true,
        })
    }

    /// Decompress chunks on the current thread only,
    /// even if the `rayon` feature is enabled.
    pub fn non_parallel(self) -> Self {
        PartReader { parallel: false, .. self }
    }

    /// The part whose chunks are read.
    pub fn part(&self) -> &Part {
        &self.part
    }

    /// The byte positions of the chunks of this part.
    pub fn offset_table(&self) -> &OffsetTable {
        &self.offsets
    }

    /// Stop reading and return the byte stream.
    pub fn into_inner(self) -> R {
        self.read.into_inner()
    }


    /// Read all pixels of the part in the planar on-disk layout.
    /// For tiled parts, reads the largest resolution level.
    /// The destination must be at least `part.total_byte_count()` bytes long.
    pub fn read(&mut self, destination: &mut [u8]) -> UnitResult {
        if self.part.is_tiled() {
            return self.read_level(destination, 0, 0);
        }

        let destination = prefix_of(destination, self.part.total_byte_count()?)?;
        let block_starts = self.part.scan_line_block_byte_offsets()?;

        self.for_each_decompressed_chunk(0 .. self.part.chunk_count, |info, pixels| {
            let start = block_starts[info.index];
            destination[start .. start + pixels.len()].copy_from_slice(pixels);
            Ok(())
        })
    }

    /// Read all tiles of a resolution level into the planar on-disk layout of the whole level.
    /// The destination must be at least `part.level_byte_count(level_x, level_y)` bytes long.
    pub fn read_level(&mut self, destination: &mut [u8], level_x: usize, level_y: usize) -> UnitResult {
        let level_bounds = self.part.level_bounds(level_x, level_y)?;
        let destination = prefix_of(destination, self.part.level_byte_count(level_x, level_y)?)?;
        let chunks = self.part.level_chunk_indices(level_x, level_y)?;
        let channels = self.part.header.channels.clone();

        self.for_each_decompressed_chunk(chunks, |info, pixels| {
            copy_tile_into_level(&channels, level_bounds, info.pixel_section, pixels, destination)
        })
    }

    /// Read and decompress a single chunk into the planar on-disk layout.
    /// The destination must be at least `part.chunk_byte_count(chunk_index)` bytes long.
    pub fn read_chunk(&mut self, chunk_index: usize, destination: &mut [u8]) -> Result<ChunkInfo> {
        let destination = prefix_of(destination, self.part.chunk_byte_count(chunk_index)?)?;
        let (info, compressed) = self.read_compressed_chunk(chunk_index)?;

        let pixels = self.part.header.compression
            .decompress_image_section(&self.part.header.channels, compressed, info.pixel_section)?;

        destination.copy_from_slice(&pixels);
        Ok(info)
    }

    /// Read all pixels of the part, with the channels of each pixel next to each other.
    /// Channels missing from the order are skipped.
    /// For tiled parts, reads the largest resolution level.
    pub fn read_interleaved(&mut self, destination: &mut [u8], channel_order: &[&str]) -> UnitResult {
        let converter = PixelInterleaveConverter::new(&self.part.header.channels, channel_order)?;
        let (image, chunks) = self.part.full_resolution_chunks()?;
        let destination = prefix_of(destination, converter.interleaved_byte_count(image))?;

        self.for_each_decompressed_chunk(chunks, |info, pixels| {
            converter.from_disk_layout_within(info.pixel_section, pixels, image, destination)
        })
    }

    /// Read a single chunk, with the channels of each pixel next to each other.
    pub fn read_chunk_interleaved(&mut self, chunk_index: usize, destination: &mut [u8], channel_order: &[&str]) -> Result<ChunkInfo> {
        let converter = PixelInterleaveConverter::new(&self.part.header.channels, channel_order)?;
        let bounds = self.part.chunk_bounds(self.part.chunk_location(chunk_index)?)?;
        let destination = prefix_of(destination, converter.interleaved_byte_count(bounds))?;

        let mut planar = self.pool.take(self.part.chunk_byte_count(chunk_index)?);
        let info = self.read_chunk(chunk_index, &mut planar)?;

        converter.from_disk_layout(info.pixel_section, &planar, destination)?;
        Ok(info)
    }

    /// Read and validate the header of a chunk, without reading its pixels.
    pub fn read_chunk_header(&mut self, chunk_index: usize) -> Result<ChunkInfo> {
        let location = self.part.chunk_location(chunk_index)?;
        let byte_offset = self.chunk_byte_offset(chunk_index)?;
        self.read.seek_read_to(byte_offset)?;

        let header = ChunkHeader::read(&mut self.read, self.part.index.is_multi_part(), self.part.is_tiled())?;

        if header.part_number != self.part.index.part_number() {
            return Err(Error::invalid("chunk part number does not match the part"));
        }

        if header.location != location {
            return Err(Error::invalid("chunk location does not match its offset table entry"));
        }

        let pixel_section = self.part.chunk_bounds(location)?;
        let byte_count = self.part.header.channels.byte_count(pixel_section)?;

        if header.compressed_byte_count > byte_count {
            return Err(Error::invalid("compressed chunk is larger than its pixels"));
        }

        if self.read.byte_position() + header.compressed_byte_count > self.stream_end {
            return Err(Error::invalid("chunk byte size exceeds the stream"));
        }

        Ok(ChunkInfo {
            index: chunk_index, location, pixel_section, byte_offset, byte_count,
            compressed_byte_count: header.compressed_byte_count,
        })
    }


    fn chunk_byte_offset(&self, chunk_index: usize) -> Result<usize> {
        let offset = self.offsets.get(chunk_index)
            .ok_or_else(|| Error::invalid("chunk index out of range"))?;

        if offset == OffsetTable::PLACEHOLDER {
            return Err(Error::invalid("chunk has not been written"));
        }

        let offset = u64_to_usize(offset, "chunk byte offset")?;
        if offset < self.chunks_start || offset >= self.stream_end {
            return Err(Error::invalid("chunk byte offset outside of the chunk data"));
        }

        Ok(offset)
    }

    fn read_compressed_chunk(&mut self, chunk_index: usize) -> Result<(ChunkInfo, ByteVec)> {
        let info = self.read_chunk_header(chunk_index)?;

        let compressed = u8::read_vec(
            &mut self.read, info.compressed_byte_count,
            CHUNK_ALLOCATION_STEP, Some(self.part.max_chunk_byte_size),
            "chunk byte size"
        )?;

        Ok((info, compressed))
    }

    /// Decompress the chunks in the range, in any order,
    /// and pass each one to the callback on the current thread.
    fn for_each_decompressed_chunk(&mut self, chunks: Range<usize>, mut consume: impl FnMut(ChunkInfo, &[u8]) -> UnitResult) -> UnitResult {
        #[cfg(feature = "rayon")]
        {
            let worthwhile = chunks.len() > 1 && self.part.header.compression != crate::compression::Compression::Uncompressed;

            if self.parallel && worthwhile {
                if let Some(pool) = crate::block::create_thread_pool("Chunk Decompressor") {
                    return self.decompress_parallel(&pool, chunks, consume);
                }
            }
        }

        let compression = self.part.header.compression;

        for chunk_index in chunks {
            let (info, compressed) = self.read_compressed_chunk(chunk_index)?;
            let pixels = compression.decompress_image_section(&self.part.header.channels, compressed, info.pixel_section)?;
            consume(info, &pixels)?;
        }

        Ok(())
    }

    /// Read the compressed chunks on the current thread,
    /// while decompressing a few of them on the thread pool.
    #[cfg(feature = "rayon")]
    fn decompress_parallel(
        &mut self, pool: &rayon_core::ThreadPool, chunks: Range<usize>,
        mut consume: impl FnMut(ChunkInfo, &[u8]) -> UnitResult
    ) -> UnitResult {
        use std::sync::{Arc, mpsc};

        let channels = Arc::new(self.part.header.channels.clone());
        let compression = self.part.header.compression;
        let max_in_flight = pool.current_num_threads().max(1) + 2; // ca one chunk for each thread at all times

        let (sender, receiver) = mpsc::channel::<Result<(ChunkInfo, ByteVec)>>();
        let mut remaining = chunks;
        let mut in_flight = 0;

        trace_event!(chunks = remaining.len(), threads = pool.current_num_threads(), "decompressing chunks in parallel");

        loop {
            while in_flight < max_in_flight {
                let chunk_index = match remaining.next() {
                    Some(chunk_index) => chunk_index,
                    None => break,
                };

                let (info, compressed) = self.read_compressed_chunk(chunk_index)?;
                let sender = sender.clone();
                let channels = Arc::clone(&channels);

                pool.spawn_fifo(move || {
                    let pixels = compression.decompress_image_section(&channels, compressed, info.pixel_section);

                    // by now, decompressing could have failed in another thread.
                    // the error is then already handled, so we simply
                    // don't send the decompressed chunk and do nothing
                    let _ = sender.send(pixels.map(|pixels| (info, pixels)));
                });

                in_flight += 1;
            }

            if in_flight == 0 {
                return Ok(());
            }

            let (info, pixels) = receiver.recv()
                .map_err(|_| Error::Io(IoError::new(std::io::ErrorKind::Other, "chunk decompression thread stopped")))??;

            in_flight -= 1;
            consume(info, &pixels)?;
        }
    }
}


/// The first bytes of the buffer, or an error if the buffer is too small.
fn prefix_of(buffer: &mut [u8], byte_count: usize) -> Result<&mut [u8]> {
    let length = buffer.len();

    buffer.get_mut(.. byte_count).ok_or_else(|| Error::invalid(format!(
        "pixel buffer of {} bytes is too small for {} bytes", length, byte_count
    )))
}
