
//! Contains the value types of the header attributes
//! that influence how the pixel chunks of a part are laid out.

use std::convert::TryFrom;
use smallvec::SmallVec;
use bit_field::BitField;

use crate::error::{Error, Result, UnitResult, usize_to_i32};
use crate::io::{Data, Read, Write};
use crate::math::{Vec2, sample_count};

pub use crate::math::RoundingMode;


/// A byte array with each byte being a char.
/// This is not UTF and it must be constructed from a standard string.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Text {
    bytes: TextBytes,
}

/// The internal representation of text.
/// Typically, small text is stored on the stack,
/// as channel names are usually a single letter.
pub type TextBytes = SmallVec<[u8; 24]>;

/// A rectangular section anywhere in 2D integer space.
/// Valid from minimum coordinate (including) `-1,073,741,822`
/// to maximum coordinate (including) `1,073,741,822`, the value of (`i32::MAX/2 -1`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, Hash)]
pub struct IntegerBounds {

    /// The top left corner of this rectangle.
    /// The bounds include this pixel if the size is not zero.
    pub position: Vec2<i32>,

    /// How many pixels to include in the bounds.
    /// Extends to the right and downwards.
    /// Does not include the actual boundary, just like `Vec::len()`.
    pub size: Vec2<usize>,
}

/// A List of channels. Channels are sorted alphabetically by name.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChannelList {

    /// The channels in this list, sorted by name.
    pub list: SmallVec<[ChannelDescription; 5]>,

    /// The number of bytes that one pixel in this image needs,
    /// not accounting for subsampling.
    pub bytes_per_pixel: usize,
}

/// A single channel in a part.
/// Does not contain the actual pixel data,
/// but instead merely describes it.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChannelDescription {

    /// One of "R", "G", or "B" most of the time.
    pub name: Text,

    /// U32, F16 or F32.
    pub sample_type: SampleType,

    /// This attribute only tells lossy compression methods
    /// whether this value should be quantized exponentially or linearly.
    pub quantize_linearly: bool,

    /// How many of the samples are skipped compared to the other channels in this part.
    /// A channel only contains samples at coordinates divisible by its sampling factors.
    ///
    /// Values other than 1 are allowed only in flat, scan-line based parts.
    pub sampling: Vec2<usize>,
}

/// The type of samples in this channel.
#[derive(Clone, Debug, Eq, PartialEq, Copy, Hash)]
pub enum SampleType {

    /// This channel contains 32-bit unsigned int values.
    U32,

    /// This channel contains 16-bit float values.
    F16,

    /// This channel contains 32-bit float values.
    F32,
}

/// Describes how the part is divided into tiles.
/// Specifies the size of each tile in the image
/// and whether this image contains multiple resolution levels.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct TileDescription {

    /// The size of each tile.
    /// Stays the same number of pixels across all levels.
    pub tile_size: Vec2<usize>,

    /// Whether to also store smaller versions of the image.
    pub level_mode: LevelMode,

    /// Whether to round up or down when calculating Mip/Rip levels.
    pub rounding_mode: RoundingMode,
}

/// Whether to also store increasingly smaller versions of the original image.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LevelMode {

    /// Only a single level.
    Singular,

    /// Levels with a similar aspect ratio.
    MipMap,

    /// Levels with all possible aspect ratios.
    RipMap,
}


impl Text {

    /// Create a `Text` from an `str` reference.
    /// Returns `None` if this string contains unsupported chars.
    pub fn new_or_none(string: impl AsRef<str>) -> Option<Self> {
        let vec : Option<TextBytes> = string.as_ref().chars()
            .map(|character| u8::try_from(character as u64).ok())
            .collect();

        vec.map(|bytes| Text { bytes })
    }

    /// The internal ASCII bytes this text is made of.
    pub fn as_slice(&self) -> &[u8] {
        self.bytes.as_slice()
    }
}

impl<'s> From<&'s str> for Text {

    /// Panics if the string contains an unsupported character
    fn from(str: &'s str) -> Self {
        Self::new_or_none(str).expect("exr text does not support unicode characters")
    }
}

impl std::fmt::Debug for Text {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Text(\"{}\")", self)
    }
}

impl std::fmt::Display for Text {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use std::fmt::Write;

        for &byte in self.bytes.iter() {
            f.write_char(byte as char)?;
        }

        Ok(())
    }
}


impl ChannelList {

    /// Does not validate channel order.
    pub fn new(channels: SmallVec<[ChannelDescription; 5]>) -> Self {
        ChannelList {
            bytes_per_pixel: channels.iter().map(|channel| channel.sample_type.bytes_per_sample()).sum(),
            list: channels,
        }
    }

    /// Iterate over the channels, and adds to each channel the byte offset of the channels sample type.
    /// Assumes the internal channel list is properly sorted.
    pub fn channels_with_byte_offset(&self) -> impl Iterator<Item=(usize, &ChannelDescription)> {
        self.list.iter().scan(0, |byte_position, channel|{
            let previous_position = *byte_position;
            *byte_position += channel.sample_type.bytes_per_sample();
            Some((previous_position, channel))
        })
    }

    /// Return the index of the channel with the exact name, case sensitive, or none.
    /// Potentially uses less than linear time, as the list is sorted by name.
    pub fn find_index_of_channel(&self, exact_name: &str) -> Option<usize> {
        self.list.binary_search_by_key(&exact_name.as_bytes(), |chan| chan.name.as_slice()).ok()
    }

    /// Whether any channel skips some of the pixels.
    pub fn is_subsampled(&self) -> bool {
        self.list.iter().any(|channel| channel.sampling != Vec2(1, 1))
    }

    /// The number of bytes required to store the specified pixel section of all channels,
    /// respecting subsampling. Returns an error if the result does not fit into memory.
    pub fn byte_count(&self, bounds: IntegerBounds) -> Result<usize> {
        self.list.iter().try_fold(0_usize, |sum, channel| {
            let resolution = channel.subsampled_resolution(bounds);
            resolution.width().checked_mul(resolution.height())
                .and_then(|samples| samples.checked_mul(channel.sample_type.bytes_per_sample()))
                .and_then(|bytes| bytes.checked_add(sum))
        })
        .ok_or_else(|| Error::invalid("pixel byte count exceeds addressable memory"))
    }

    /// The number of bytes required to store the specified pixel section of all channels,
    /// respecting subsampling. Allows computing sizes of sections
    /// that do not fit into the memory of this machine.
    pub fn byte_count_large(&self, bounds: IntegerBounds) -> u64 {
        self.list.iter().map(|channel|{
            let resolution = channel.subsampled_resolution(bounds);
            resolution.width() as u64 * resolution.height() as u64 * channel.sample_type.bytes_per_sample() as u64
        }).sum()
    }

    /// Check if channels are valid and sorted.
    pub fn validate(&self, allow_sampling: bool, data_window: IntegerBounds) -> UnitResult {
        let mut iter = self.list.iter().map(|chan| chan.validate(allow_sampling, data_window).map(|_| &chan.name));
        let mut previous = iter.next().ok_or_else(|| Error::invalid("at least one channel is required"))??;

        for result in iter {
            let value = result?;
            if previous == value { return Err(Error::invalid("channel names are not unique")); }
            else if previous > value { return Err(Error::invalid("channel names are not sorted alphabetically")); }
            else { previous = value; }
        }

        Ok(())
    }
}


impl IntegerBounds {

    /// Create a box with a size starting at zero.
    pub fn from_dimensions(size: impl Into<Vec2<usize>>) -> Self {
        Self::new(Vec2(0,0), size)
    }

    /// Create a box with a size and an origin point.
    pub fn new(start: impl Into<Vec2<i32>>, size: impl Into<Vec2<usize>>) -> Self {
        Self { position: start.into(), size: size.into() }
    }

    /// Returns the top-right coordinate of the rectangle.
    /// The row and column described by this vector are not included in the rectangle,
    /// just like `Vec::len()`. Only valid for validated bounds.
    pub fn end(self) -> Vec2<i32> {
        self.position + self.size.map(|size| size as i32)
    }

    /// Returns the maximum coordinate that a value in this rectangle may have.
    pub fn max(self) -> Vec2<i32> {
        self.end() - Vec2(1,1)
    }

    /// Validate this instance.
    pub fn validate(&self, max_size: Option<Vec2<usize>>) -> UnitResult {
        if let Some(max_size) = max_size {
            if self.size.width() > max_size.width() || self.size.height() > max_size.height()  {
                return Err(Error::invalid("window attribute dimension value"));
            }
        }

        let min_i64 = Vec2(self.position.x() as i64, self.position.y() as i64);

        let max_i64 = Vec2(
            self.position.x() as i64 + self.size.width() as i64,
            self.position.y() as i64 + self.size.height() as i64,
        );

        Self::validate_min_max_u64(min_i64, max_i64)
    }

    fn validate_min_max_u64(min: Vec2<i64>, max: Vec2<i64>) -> UnitResult {
        let max_box_size_as_i64 = (i32::MAX / 2) as i64; // as defined in the original c++ library

        if     max.x() >=  max_box_size_as_i64
            || max.y() >=  max_box_size_as_i64
            || min.x() <= -max_box_size_as_i64
            || min.y() <= -max_box_size_as_i64
        {
            return Err(Error::invalid("window size exceeding integer maximum"));
        }

        Ok(())
    }

    /// Create a new rectangle which is offset by the specified origin.
    pub fn with_origin(self, origin: Vec2<i32>) -> Self {
        IntegerBounds { position: self.position + origin, .. self }
    }

    /// Returns whether the specified rectangle is equal to or inside this rectangle.
    pub fn contains(self, subset: Self) -> bool {
           subset.position.x() >= self.position.x()
        && subset.position.y() >= self.position.y()
        && subset.end().x() <= self.end().x()
        && subset.end().y() <= self.end().y()
    }
}


impl SampleType {

    /// How many bytes a single sample takes up.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleType::F16 => half::f16::BYTE_SIZE,
            SampleType::F32 => f32::BYTE_SIZE,
            SampleType::U32 => u32::BYTE_SIZE,
        }
    }
}


impl ChannelDescription {

    /// Create a new channel with the specified properties and a sampling rate of (1,1).
    pub fn new(name: impl Into<Text>, sample_type: SampleType, quantize_linearly: bool) -> Self {
        Self { name: name.into(), sample_type, quantize_linearly, sampling: Vec2(1, 1) }
    }

    /// Create a new channel that only contains values at every `sampling`th pixel.
    pub fn subsampled(name: impl Into<Text>, sample_type: SampleType, sampling: impl Into<Vec2<usize>>) -> Self {
        Self { sampling: sampling.into(), .. Self::new(name, sample_type, false) }
    }

    /// The number of samples this channel contains inside the specified absolute pixel section,
    /// counting only coordinates divisible by the sampling factors.
    pub fn subsampled_resolution(&self, bounds: IntegerBounds) -> Vec2<usize> {
        Vec2(
            sample_count(bounds.position.x(), bounds.size.width(), self.sampling.x()),
            sample_count(bounds.position.y(), bounds.size.height(), self.sampling.y()),
        )
    }

    /// Validate this instance.
    pub fn validate(&self, allow_sampling: bool, data_window: IntegerBounds) -> UnitResult {
        if self.name.as_slice().is_empty() {
            return Err(Error::invalid("channel name must not be empty"));
        }

        if self.sampling.x() == 0 || self.sampling.y() == 0 {
            return Err(Error::invalid("zero sampling factor"));
        }

        let sampling_x = usize_to_i32(self.sampling.x(), "channel sampling factor")?;
        let sampling_y = usize_to_i32(self.sampling.y(), "channel sampling factor")?;

        if !allow_sampling && self.sampling != Vec2(1,1) {
            return Err(Error::invalid("subsampling is only allowed in flat scan line images"));
        }

        if data_window.position.x() % sampling_x != 0 || data_window.position.y() % sampling_y != 0 {
            return Err(Error::invalid("channel sampling factor not dividing data window position"));
        }

        if data_window.size.x() % self.sampling.x() != 0 || data_window.size.y() % self.sampling.y() != 0 {
            return Err(Error::invalid("channel sampling factor not dividing data window size"));
        }

        Ok(())
    }
}


impl TileDescription {

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size() -> usize {
        2 * u32::BYTE_SIZE + 1 // size x,y + (level mode + rounding mode)
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        u32::write(u32::try_from(self.tile_size.width())?, write)?;
        u32::write(u32::try_from(self.tile_size.height())?, write)?;

        let level_mode = match self.level_mode {
            LevelMode::Singular => 0_u8,
            LevelMode::MipMap => 1_u8,
            LevelMode::RipMap => 2_u8,
        };

        let rounding_mode = match self.rounding_mode {
            RoundingMode::Down => 0_u8,
            RoundingMode::Up => 1_u8,
        };

        // mode = level_mode + (rounding_mode * 16)
        let mut mode = 0_u8;
        mode.set_bits(0..4, level_mode);
        mode.set_bits(4..8, rounding_mode);
        mode.write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let x_size = u32::read(read)? as usize;
        let y_size = u32::read(read)? as usize;

        let mode = u8::read(read)?;
        let level_mode = mode.get_bits(0..4);
        let rounding_mode = mode.get_bits(4..8);

        let level_mode = match level_mode {
            0 => LevelMode::Singular,
            1 => LevelMode::MipMap,
            2 => LevelMode::RipMap,
            _ => return Err(Error::invalid("tile description level mode")),
        };

        let rounding_mode = match rounding_mode {
            0 => RoundingMode::Down,
            1 => RoundingMode::Up,
            _ => return Err(Error::invalid("tile description rounding mode")),
        };

        Ok(TileDescription { tile_size: Vec2(x_size, y_size), level_mode, rounding_mode, })
    }

    /// Validate this instance.
    pub fn validate(&self) -> UnitResult {
        let max = i32::MAX as usize / 2;

        if self.tile_size.width() == 0 || self.tile_size.height() == 0
            || self.tile_size.width() > max || self.tile_size.height() > max
        {
            return Err(Error::invalid("tile size"))
        }

        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;

    fn rgba_half() -> ChannelList {
        ChannelList::new(smallvec![
            ChannelDescription::new("A", SampleType::F16, true),
            ChannelDescription::new("B", SampleType::F16, false),
            ChannelDescription::new("G", SampleType::F16, false),
            ChannelDescription::new("R", SampleType::F16, false),
        ])
    }

    #[test]
    fn byte_count_without_subsampling(){
        let channels = rgba_half();
        assert_eq!(channels.bytes_per_pixel, 8);
        assert_eq!(channels.byte_count(IntegerBounds::from_dimensions((5, 2))).unwrap(), 80);
        assert_eq!(channels.byte_count_large(IntegerBounds::new((-3, 7), (5, 2))), 80);
    }

    #[test]
    fn byte_count_respects_sampling_positions(){
        let channels = ChannelList::new(smallvec![
            ChannelDescription::subsampled("BY", SampleType::F16, (2, 2)),
            ChannelDescription::new("Y", SampleType::F32, false),
        ]);

        // rows 1 and 2 of a 4 wide section: only row 2 contains BY samples at x = 0 and 2
        let bounds = IntegerBounds::new((0, 1), (4, 2));
        assert_eq!(channels.byte_count(bounds).unwrap(), 2 * 2 + 4 * 2 * 4);
        assert!(channels.is_subsampled());
    }

    #[test]
    fn byte_count_overflow_is_invalid(){
        let channels = rgba_half();
        let huge = IntegerBounds::from_dimensions((usize::MAX / 2, 4));
        assert!(matches!(channels.byte_count(huge), Err(Error::Invalid(_))));
    }

    #[test]
    fn find_channel_names(){
        let channels = rgba_half();
        assert_eq!(channels.find_index_of_channel("G"), Some(2));
        assert_eq!(channels.find_index_of_channel("g"), None);
    }

    #[test]
    fn validate_channel_order(){
        let window = IntegerBounds::from_dimensions((4, 4));
        assert!(rgba_half().validate(false, window).is_ok());

        let unsorted = ChannelList::new(smallvec![
            ChannelDescription::new("R", SampleType::F16, false),
            ChannelDescription::new("G", SampleType::F16, false),
        ]);
        assert!(unsorted.validate(false, window).is_err());

        let duplicate = ChannelList::new(smallvec![
            ChannelDescription::new("G", SampleType::F16, false),
            ChannelDescription::new("G", SampleType::F32, false),
        ]);
        assert!(duplicate.validate(false, window).is_err());

        let subsampled = ChannelList::new(smallvec![ ChannelDescription::subsampled("C", SampleType::F16, (2, 2)) ]);
        assert!(subsampled.validate(false, window).is_err());
        assert!(subsampled.validate(true, window).is_ok());
        assert!(subsampled.validate(true, IntegerBounds::from_dimensions((3, 4))).is_err());
    }

    #[test]
    fn huge_sampling_factors_are_invalid(){
        let window = IntegerBounds::new((1, 0), (4, 4));
        let too_large = i32::MAX as usize + 1;

        for &sampling in &[ (too_large, 1), (1, too_large), (usize::MAX, usize::MAX), (0, 1) ] {
            let channel = ChannelDescription::subsampled("Y", SampleType::F16, sampling);
            let result = channel.validate(true, window);
            assert!(matches!(result, Err(Error::Invalid(_))), "sampling {:?}", sampling);
        }
    }

    #[test]
    fn tile_description_mode_byte(){
        let description = TileDescription {
            tile_size: Vec2(32, 16),
            level_mode: LevelMode::RipMap,
            rounding_mode: RoundingMode::Up,
        };

        let mut bytes = Vec::new();
        description.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), TileDescription::byte_size());
        assert_eq!(bytes[8], 2 + 16);

        let decoded = TileDescription::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded, description);

        bytes[8] = 3;
        assert!(TileDescription::read(&mut bytes.as_slice()).is_err());
    }
}
