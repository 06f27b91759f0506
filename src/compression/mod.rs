
//! Contains the compression attribute definition
//! and methods to compress and decompress the pixel bytes of a single chunk.
//!
//! All pixel bytes handled here are in the on-disk layout:
//! little endian samples, grouped by scan line, and grouped by channel within each scan line.


// private modules make non-breaking changes easier
mod zip;
mod rle;
mod piz;


use crate::meta::attribute::{IntegerBounds, ChannelList};
use crate::error::{Result, Error, UnitResult};
use crate::io::{Data, Read, Write};
use crate::tracing_wrappers::*;


/// A byte vector.
pub type ByteVec = Vec<u8>;

/// A byte slice.
pub type Bytes<'s> = &'s [u8];

/// Specifies which compression method to use.
/// Use uncompressed data for fastest loading and writing speeds.
/// Use RLE compression for fast loading and writing with slight memory savings.
/// Use ZIP compression for slow processing with large memory savings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {

    /// Store uncompressed values.
    /// Produces large files that can be read and written very quickly.
    Uncompressed,

    /// Produces slightly smaller files
    /// that can still be read and written rather quickly.
    /// Works best for images with large flat areas, such as masks and abstract graphics.
    /// This compression method is lossless.
    RLE,

    /// Uses ZIP compression to compress each line. Slowly produces small images
    /// which can be read with moderate speed. This compression method is lossless.
    ZIP1,

    /// Uses ZIP compression to compress blocks of 16 lines. Slowly produces small images
    /// which can be read with moderate speed. This compression method is lossless.
    ZIP16,

    /// PIZ compression works well for noisy and natural images. Works better with larger tiles.
    /// This compression method is lossless.
    // A wavelet transform is applied to the pixel data, and the result is Huffman-
    // encoded. Small tiles do not shrink much, as the compressed data starts
    // with a relatively long header.
    PIZ,

    /// __Not supported by this implementation.__
    /// Reduces the precision of `f32` samples to 24 bits before compressing with zip.
    PXR24,

    /// __Not supported by this implementation.__
    /// Lossy compression of four by four pixel blocks of `f16` samples.
    B44,

    /// __Not supported by this implementation.__
    /// Like `B44`, with improved compression of uniformly colored areas.
    B44A,

    /// __Not supported by this implementation.__
    // lossy DCT based compression, in blocks of 32 scanlines.
    DWAA,

    /// __Not supported by this implementation.__
    // lossy DCT based compression, in blocks of 256 scanlines.
    DWAB,
}

/// The result of trying to compress a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressedBytes {

    /// The compressed bytes, which are smaller than the raw bytes.
    Compressed(ByteVec),

    /// Compressing did not make the data any smaller.
    /// The raw bytes must be stored instead.
    NoGain,
}

impl std::fmt::Display for Compression {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} compression", match self {
            Compression::Uncompressed => "no",
            Compression::RLE => "rle",
            Compression::ZIP1 => "zip line",
            Compression::ZIP16 => "zip block",
            Compression::B44 => "b44",
            Compression::B44A => "b44a",
            Compression::DWAA => "dwaa",
            Compression::DWAB => "dwab",
            Compression::PIZ => "piz",
            Compression::PXR24 => "pxr24",
        })
    }
}


impl Compression {

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size() -> usize { u8::BYTE_SIZE }

    /// Write the compression code byte.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        use self::Compression::*;
        match self {
            Uncompressed => 0_u8,
            RLE => 1_u8,
            ZIP1 => 2_u8,
            ZIP16 => 3_u8,
            PIZ => 4_u8,
            PXR24 => 5_u8,
            B44 => 6_u8,
            B44A => 7_u8,
            DWAA => 8_u8,
            DWAB => 9_u8,
        }.write(write)?;

        Ok(())
    }

    /// Read the compression code byte.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        use self::Compression::*;
        Ok(match u8::read(read)? {
            0 => Uncompressed,
            1 => RLE,
            2 => ZIP1,
            3 => ZIP16,
            4 => PIZ,
            5 => PXR24,
            6 => B44,
            7 => B44A,
            8 => DWAA,
            9 => DWAB,
            _ => return Err(Error::unsupported("unknown compression method")),
        })
    }

    /// For scan line parts, one or more scan lines may be
    /// stored together as a scan line block. The number of scan lines per block
    /// depends on how the pixel data are compressed.
    pub fn scan_lines_per_block(self) -> usize {
        use self::Compression::*;
        match self {
            Uncompressed | RLE   | ZIP1    => 1,
            ZIP16 | PXR24                  => 16,
            PIZ   | B44   | B44A | DWAA    => 32,
            DWAB                           => 256,
        }
    }

    /// Whether this implementation can compress and decompress pixels with this method.
    pub fn is_supported(self) -> bool {
        use self::Compression::*;
        matches!(self, Uncompressed | RLE | ZIP1 | ZIP16 | PIZ)
    }

    /// Returns an error for the compression methods that this implementation cannot handle.
    pub fn validate_supported(self) -> UnitResult {
        if self.is_supported() { Ok(()) }
        else { Err(Error::unsupported(format!("yet unimplemented compression method: {}", self))) }
    }

    /// Run the compression algorithm on the raw bytes of a chunk.
    /// The raw bytes must contain exactly the pixels of the specified section, in the on-disk layout.
    /// Reports `NoGain` if the compressed bytes would not be smaller than the raw bytes,
    /// except for `Uncompressed`, which always returns a copy of the raw bytes.
    pub fn compress(self, channels: &ChannelList, uncompressed: Bytes<'_>, pixel_section: IntegerBounds) -> Result<CompressedBytes> {
        use self::Compression::*;

        let compressed = match self {
            Uncompressed => return Ok(CompressedBytes::Compressed(uncompressed.to_vec())),
            ZIP16 | ZIP1 => zip::compress_bytes(uncompressed)?,
            RLE => rle::compress_bytes(uncompressed)?,
            PIZ => piz::compress(channels, uncompressed, pixel_section)?,
            _ => return Err(Error::unsupported(format!("yet unimplemented compression method: {}", self)))
        };

        if compressed.len() < uncompressed.len() {
            Ok(CompressedBytes::Compressed(compressed))
        }
        else {
            Ok(CompressedBytes::NoGain)
        }
    }

    /// Compress the image section of bytes.
    /// Returns a copy of the raw bytes where compression would not make the chunk any smaller.
    pub fn compress_image_section(self, channels: &ChannelList, uncompressed: Bytes<'_>, pixel_section: IntegerBounds) -> Result<ByteVec> {
        let expected_byte_size = channels.byte_count(pixel_section)?;

        if uncompressed.len() != expected_byte_size {
            return Err(Error::invalid("chunk byte size does not match the pixel section"));
        }

        if self == Compression::Uncompressed {
            return Ok(uncompressed.to_vec());
        }

        match self.compress(channels, uncompressed, pixel_section)? {
            CompressedBytes::Compressed(compressed) => Ok(compressed),

            CompressedBytes::NoGain => {
                trace_event!(compression = %self, bytes = uncompressed.len(), "storing chunk without compression");
                Ok(uncompressed.to_vec())
            }
        }
    }

    /// Run the decompression algorithm on the compressed bytes of a chunk,
    /// producing exactly `expected_byte_size` bytes or failing.
    /// Does not check whether the chunk was stored without compression.
    pub fn decompress(self, channels: &ChannelList, compressed: Bytes<'_>, pixel_section: IntegerBounds, expected_byte_size: usize) -> Result<ByteVec> {
        use self::Compression::*;

        let bytes = match self {
            Uncompressed => compressed.to_vec(),
            ZIP16 | ZIP1 => zip::decompress_bytes(compressed, expected_byte_size)?,
            RLE => rle::decompress_bytes(compressed, expected_byte_size)?,
            PIZ => piz::decompress(channels, compressed, pixel_section, expected_byte_size)?,
            _ => return Err(Error::unsupported(format!("yet unimplemented compression method: {}", self)))
        };

        if bytes.len() != expected_byte_size {
            Err(Error::compression(format!(
                "{} produced {} bytes instead of {}",
                self, bytes.len(), expected_byte_size
            )))
        }

        else { Ok(bytes) }
    }

    /// Decompress the image section of bytes.
    /// A chunk which is exactly as large as its raw pixels was stored without compression.
    pub fn decompress_image_section(self, channels: &ChannelList, compressed: ByteVec, pixel_section: IntegerBounds) -> Result<ByteVec> {
        let expected_byte_size = channels.byte_count(pixel_section)?;

        // note: always true where self == Uncompressed
        if compressed.len() == expected_byte_size {
            // the compressed data was larger than the raw data, so the small raw data has been written
            Ok(compressed)
        }

        else if compressed.len() > expected_byte_size {
            Err(Error::invalid("compressed chunk is larger than its pixels"))
        }

        else {
            self.decompress(channels, &compressed, pixel_section, expected_byte_size)
        }
    }
}


/// A collection of functions used to prepare data for compression.
mod optimize_bytes {

    /// Integrate over all differences to the previous value in order to reconstruct sample values.
    pub fn differences_to_samples(buffer: &mut [u8]) {
        // The naive implementation is very simple:
        //
        // for index in 1..buffer.len() {
        //    buffer[index] = (buffer[index - 1] as i32 + buffer[index] as i32 - 128) as u8;
        // }
        //
        // Processing elements in pairs lets the two computations of a pair overlap.
        let (&mut first, rest) = match buffer.split_first_mut() {
            Some(split) => split,
            None => return,
        };

        let mut previous = first as i16;
        let mut pairs = rest.chunks_exact_mut(2);

        for chunk in &mut pairs {
            let diff0 = chunk[0] as i16;
            let diff1 = chunk[1] as i16;
            let sample0 = (previous + diff0 - 128) as u8;
            let sample1 = (sample0 as i16 + diff1 - 128) as u8;
            chunk[0] = sample0;
            chunk[1] = sample1;
            previous = sample1 as i16;
        }

        if let [last] = pairs.into_remainder() {
            *last = (previous + *last as i16 - 128) as u8;
        }
    }

    /// Derive over all values in order to produce differences to the previous value.
    pub fn samples_to_differences(buffer: &mut [u8]){
        for index in (1..buffer.len()).rev() {
            buffer[index] = buffer[index].wrapping_sub(buffer[index - 1]).wrapping_add(128);
        }
    }

    /// Interleave the bytes such that the second half of the array is each other byte.
    pub fn interleave_byte_blocks(separated: &mut [u8]) {
        let mut interleaved = Vec::with_capacity(separated.len());
        let (first_half, second_half) = separated.split_at((separated.len() + 1) / 2);

        for (index, &even) in first_half.iter().enumerate() {
            interleaved.push(even);

            if let Some(&odd) = second_half.get(index) {
                interleaved.push(odd);
            }
        }

        separated.copy_from_slice(interleaved.as_slice())
    }

    /// Separate the bytes such that the second half contains each other byte.
    pub fn separate_bytes_fragments(source: &mut [u8]) {
        let mut separated = Vec::with_capacity(source.len());
        separated.extend(source.iter().step_by(2));
        separated.extend(source.iter().skip(1).step_by(2));
        source.copy_from_slice(separated.as_slice());
    }


}
