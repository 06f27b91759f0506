
//! Convert between the planar on-disk pixel layout and an interleaved pixel layout.
//!
//! On disk, every scan line contains all samples of the first channel,
//! then all samples of the second channel, and so on: `AAAA BBBB GGGG RRRR`.
//! The interleaved layout stores whole pixels one after another,
//! with the channels in a custom order: `RGBA RGBA RGBA RGBA`.

use smallvec::SmallVec;

use crate::error::{Error, Result, UnitResult};
use crate::meta::attribute::{ChannelList, IntegerBounds};


/// Moves the bytes of each sample between the planar and the interleaved layout.
/// Channels that are not part of the interleaved order are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelInterleaveConverter {

    /// One entry per channel, in the order of the channel list.
    channels: SmallVec<[InterleavedChannel; 5]>,

    /// Byte size of one interleaved pixel.
    bytes_per_pixel: usize,

    /// Byte size of all samples of one pixel in the planar layout.
    planar_bytes_per_pixel: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InterleavedChannel {
    bytes_per_sample: usize,

    /// Byte position inside an interleaved pixel, or none if this channel is excluded.
    interleaved_offset: Option<usize>,
}


impl PixelInterleaveConverter {

    /// Prepare the conversion for the specified channels.
    /// The order contains the names of the channels in an interleaved pixel.
    /// Channels missing from the order are excluded.
    pub fn new(channels: &ChannelList, order: &[&str]) -> Result<Self> {
        if channels.is_subsampled() {
            return Err(Error::unsupported("interleaving subsampled channels"));
        }

        let mut offsets: SmallVec<[Option<usize>; 5]> = smallvec![ None; channels.list.len() ];
        let mut bytes_per_pixel = 0;

        for &name in order {
            let index = channels.find_index_of_channel(name)
                .ok_or_else(|| Error::invalid(format!("unknown channel `{}` in interleaved channel order", name)))?;

            let offset = &mut offsets[index];
            if offset.is_some() {
                return Err(Error::invalid(format!("channel `{}` appears twice in interleaved channel order", name)));
            }

            *offset = Some(bytes_per_pixel);
            bytes_per_pixel += channels.list[index].sample_type.bytes_per_sample();
        }

        let channels: SmallVec<[InterleavedChannel; 5]> = channels.list.iter().zip(offsets)
            .map(|(channel, interleaved_offset)| InterleavedChannel {
                bytes_per_sample: channel.sample_type.bytes_per_sample(),
                interleaved_offset,
            })
            .collect();

        Ok(Self {
            planar_bytes_per_pixel: channels.iter().map(|channel| channel.bytes_per_sample).sum(),
            bytes_per_pixel,
            channels,
        })
    }

    /// The number of bytes of one interleaved pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }

    /// The number of interleaved bytes of the specified section.
    pub fn interleaved_byte_count(&self, bounds: IntegerBounds) -> usize {
        bounds.size.area() * self.bytes_per_pixel
    }

    /// Copy the interleaved pixels of the section into the planar layout.
    /// Bytes of excluded channels are not modified in the planar destination.
    pub fn to_disk_layout(&self, bounds: IntegerBounds, interleaved: &[u8], planar: &mut [u8]) -> UnitResult {
        self.to_disk_layout_within(bounds, interleaved, bounds, planar)
    }

    /// Copy the planar pixels of the section into the interleaved layout.
    /// Excluded channels are skipped.
    pub fn from_disk_layout(&self, bounds: IntegerBounds, planar: &[u8], interleaved: &mut [u8]) -> UnitResult {
        self.from_disk_layout_within(bounds, planar, bounds, interleaved)
    }

    /// Copy a section of an interleaved image into the planar layout of that section,
    /// for example a single tile or scan line block.
    /// Bytes of excluded channels are not modified in the planar destination.
    pub fn to_disk_layout_within(&self, image: IntegerBounds, interleaved: &[u8], section: IntegerBounds, planar: &mut [u8]) -> UnitResult {
        let lines = self.locate_section(section, image, interleaved.len(), planar.len())?;
        if lines.line_bytes == 0 { return Ok(()); }

        let width = section.size.width();
        let interleaved_lines = interleaved[lines.start ..].chunks(lines.stride).map(|line| &line[.. lines.line_bytes]);
        let planar_lines = planar.chunks_exact_mut(width * self.planar_bytes_per_pixel);

        for (interleaved_line, planar_line) in interleaved_lines.zip(planar_lines).take(section.size.height()) {
            let mut planar_line = planar_line;

            for channel in &self.channels {
                let (planar_samples, rest) = planar_line.split_at_mut(width * channel.bytes_per_sample);
                planar_line = rest;

                if let Some(offset) = channel.interleaved_offset {
                    let interleaved_pixels = interleaved_line.chunks_exact(self.bytes_per_pixel);

                    for (sample, pixel) in planar_samples.chunks_exact_mut(channel.bytes_per_sample).zip(interleaved_pixels) {
                        sample.copy_from_slice(&pixel[offset .. offset + channel.bytes_per_sample]);
                    }
                }
            }
        }

        Ok(())
    }

    /// Copy the planar pixels of a section into an interleaved image that contains the section.
    /// Excluded channels and pixels outside of the section are not modified.
    pub fn from_disk_layout_within(&self, section: IntegerBounds, planar: &[u8], image: IntegerBounds, interleaved: &mut [u8]) -> UnitResult {
        let lines = self.locate_section(section, image, interleaved.len(), planar.len())?;
        if lines.line_bytes == 0 { return Ok(()); }

        let width = section.size.width();
        let interleaved_lines = interleaved[lines.start ..].chunks_mut(lines.stride).map(|line| &mut line[.. lines.line_bytes]);
        let planar_lines = planar.chunks_exact(width * self.planar_bytes_per_pixel);

        for (interleaved_line, planar_line) in interleaved_lines.zip(planar_lines).take(section.size.height()) {
            let mut planar_line = planar_line;

            for channel in &self.channels {
                let (planar_samples, rest) = planar_line.split_at(width * channel.bytes_per_sample);
                planar_line = rest;

                if let Some(offset) = channel.interleaved_offset {
                    let interleaved_pixels = interleaved_line.chunks_exact_mut(self.bytes_per_pixel);

                    for (sample, pixel) in planar_samples.chunks_exact(channel.bytes_per_sample).zip(interleaved_pixels) {
                        pixel[offset .. offset + channel.bytes_per_sample].copy_from_slice(sample);
                    }
                }
            }
        }

        Ok(())
    }

    /// Find the lines of the section inside the interleaved image
    /// and check that both buffers are large enough.
    fn locate_section(&self, section: IntegerBounds, image: IntegerBounds, interleaved_len: usize, planar_len: usize) -> Result<SectionLines> {
        if !image.contains(section) {
            return Err(Error::invalid("pixel section is outside of the interleaved image"));
        }

        let too_large = || Error::invalid("pixel section too large");

        let pixels = section.size.width().checked_mul(section.size.height()).ok_or_else(too_large)?;
        let planar_required = pixels.checked_mul(self.planar_bytes_per_pixel).ok_or_else(too_large)?;
        let line_bytes = section.size.width().checked_mul(self.bytes_per_pixel).ok_or_else(too_large)?;
        let stride = image.size.width().checked_mul(self.bytes_per_pixel).ok_or_else(too_large)?;

        let x = (i64::from(section.position.x()) - i64::from(image.position.x())) as usize;
        let y = (i64::from(section.position.y()) - i64::from(image.position.y())) as usize;

        let start = y.checked_mul(stride)
            .and_then(|line_start| x.checked_mul(self.bytes_per_pixel)?.checked_add(line_start))
            .ok_or_else(too_large)?;

        let interleaved_required = match section.size.height() {
            0 => 0,
            height => (height - 1).checked_mul(stride)
                .and_then(|lines| lines.checked_add(start)?.checked_add(line_bytes))
                .ok_or_else(too_large)?,
        };

        if interleaved_len < interleaved_required {
            return Err(Error::invalid("interleaved pixel buffer is too small for the section"));
        }

        if planar_len < planar_required {
            return Err(Error::invalid("planar pixel buffer is too small for the section"));
        }

        let line_bytes = if pixels == 0 { 0 } else { line_bytes };
        Ok(SectionLines { start, stride, line_bytes })
    }
}

/// Where the lines of a section are located inside an interleaved image.
struct SectionLines {
    start: usize,
    stride: usize,
    line_bytes: usize,
}
