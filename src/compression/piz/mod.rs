//! The PIZ compression method is a wavelet compression,
//! based on the PIZ image format, customized for OpenEXR.
// inspired by  https://github.com/AcademySoftwareFoundation/openexr/blob/master/OpenEXR/IlmImf/ImfPizCompressor.cpp

mod huffman;
mod wavelet;

use super::*;
use super::Result;
use crate::error::usize_to_i32;
use crate::meta::attribute::{IntegerBounds, ChannelList};
use crate::io::Data;
use crate::math::{Vec2, mod_p};
use smallvec::SmallVec;


const U16_RANGE: usize = 1 << 16;
const BITMAP_SIZE: usize  = U16_RANGE >> 3;

/// Where the values of one channel are found in the temporary buffer.
#[derive(Debug)]
struct ChannelData {
    tmp_start_index: usize,
    tmp_end_index: usize,

    /// Number of samples inside the section, considering subsampling.
    resolution: Vec2<usize>,
    y_sampling: usize,

    /// Number of `u16` values per sample.
    samples_per_pixel: usize,
}

/// Compute the position of each channel within the temporary `u16` buffer.
/// Returns the layout and the total number of `u16` values.
fn channel_layout(channels: &ChannelList, rectangle: IntegerBounds) -> (SmallVec<[ChannelData; 6]>, usize) {
    let mut tmp_index = 0;

    let layout = channels.list.iter().map(|channel| {
        let resolution = channel.subsampled_resolution(rectangle);
        let samples_per_pixel = channel.sample_type.bytes_per_sample() / u16::BYTE_SIZE;

        let data = ChannelData {
            tmp_start_index: tmp_index,
            tmp_end_index: tmp_index,
            y_sampling: channel.sampling.y(),
            resolution,
            samples_per_pixel,
        };

        tmp_index += resolution.area() * samples_per_pixel;
        data
    }).collect();

    (layout, tmp_index)
}

/// Iterate the scan lines of the rectangle, yielding the channels that have samples in that line,
/// in the order of the on-disk layout.
fn for_each_channel_line(
    channel_data: &mut [ChannelData], rectangle: IntegerBounds,
    mut line: impl FnMut(std::ops::Range<usize>) -> UnitResult
) -> UnitResult {
    for y in rectangle.position.y() .. rectangle.end().y() {
        for channel in channel_data.iter_mut() {
            if mod_p(y, channel.y_sampling as i32) != 0 { continue; }

            let values_per_line = channel.resolution.x() * channel.samples_per_pixel;
            let next_tmp_end_index = channel.tmp_end_index + values_per_line;
            line(channel.tmp_end_index .. next_tmp_end_index)?;

            channel.tmp_end_index = next_tmp_end_index;
        }
    }

    Ok(())
}

pub fn decompress(
    channels: &ChannelList,
    compressed: Bytes<'_>,
    rectangle: IntegerBounds,
    expected_byte_size: usize,
) -> Result<ByteVec>
{
    if compressed.is_empty() {
        return Ok(Vec::new())
    }

    let mut remaining = compressed;
    let mut bitmap = vec![0_u8; BITMAP_SIZE];

    let min_non_zero = u16::read(&mut remaining)? as usize;
    let max_non_zero = u16::read(&mut remaining)? as usize;

    if min_non_zero >= BITMAP_SIZE || max_non_zero >= BITMAP_SIZE {
        return Err(Error::invalid("piz bitmap range"));
    }

    if min_non_zero <= max_non_zero {
        u8::read_slice(&mut remaining, &mut bitmap[min_non_zero ..= max_non_zero])?;
    }

    let (lookup_table, max_value) = reverse_lookup_table_from_bitmap(&bitmap);

    let length = i32::read(&mut remaining)?;
    if length < 0 || length as usize > remaining.len() {
        return Err(Error::invalid("piz huffman data length"));
    }

    let (mut channel_data, tmp_size) = channel_layout(channels, rectangle);
    if tmp_size * u16::BYTE_SIZE != expected_byte_size {
        return Err(Error::invalid("piz chunk size does not match its channels"));
    }

    let mut tmp_buffer = huffman::decompress(&remaining[.. length as usize], tmp_size)?;

    for channel in channel_data.iter().filter(|channel| channel.resolution.area() > 0) {
        let end = channel.tmp_start_index + channel.resolution.area() * channel.samples_per_pixel;

        for offset in 0 .. channel.samples_per_pixel {
            wavelet::decode(
                &mut tmp_buffer[channel.tmp_start_index + offset .. end],
                channel.resolution,
                Vec2(channel.samples_per_pixel, channel.resolution.x() * channel.samples_per_pixel),
                max_value
            )?;
        }
    }

    // Expand the pixel data to their original range
    apply_lookup_table(&mut tmp_buffer, &lookup_table);

    let mut out = Vec::with_capacity(expected_byte_size);

    for_each_channel_line(&mut channel_data, rectangle, |values| {
        u16::write_slice(&mut out, &tmp_buffer[values])
    })?;

    debug_assert_eq!(out.len(), expected_byte_size);
    Ok(out)
}



pub fn compress(
    channels: &ChannelList,
    uncompressed: Bytes<'_>,
    rectangle: IntegerBounds
) -> Result<ByteVec>
{
    if uncompressed.is_empty() {
        return Ok(Vec::new());
    }

    let (mut channel_data, tmp_size) = channel_layout(channels, rectangle);
    if tmp_size * u16::BYTE_SIZE != uncompressed.len() {
        return Err(Error::invalid("piz chunk size does not match its channels"));
    }

    let mut tmp = vec![0_u16; tmp_size];
    let mut remaining = uncompressed;

    for_each_channel_line(&mut channel_data, rectangle, |values| {
        u16::read_slice(&mut remaining, &mut tmp[values])
    })?;

    let (min_non_zero, max_non_zero, bitmap) = bitmap_from_data(&tmp);
    let (max_value, table) = forward_lookup_table_from_bitmap(&bitmap);
    apply_lookup_table(&mut tmp, &table);

    let mut piz_compressed = Vec::with_capacity(uncompressed.len() / 2);
    (min_non_zero as u16).write(&mut piz_compressed)?;
    (max_non_zero as u16).write(&mut piz_compressed)?;

    if min_non_zero <= max_non_zero {
        piz_compressed.extend_from_slice(&bitmap[min_non_zero ..= max_non_zero]);
    }

    for channel in channel_data.iter().filter(|channel| channel.resolution.area() > 0) {
        for offset in 0 .. channel.samples_per_pixel {
            wavelet::encode(
                &mut tmp[channel.tmp_start_index + offset .. channel.tmp_end_index],
                channel.resolution,
                Vec2(channel.samples_per_pixel, channel.resolution.x() * channel.samples_per_pixel),
                max_value
            )?;
        }
    }

    let huffman_compressed: Vec<u8> = huffman::compress(&tmp)?;
    usize_to_i32(huffman_compressed.len(), "piz huffman data too large")?.write(&mut piz_compressed)?;

    piz_compressed.extend_from_slice(&huffman_compressed);
    Ok(piz_compressed)
}


/// Returns the lookup table and the largest index into it.
fn reverse_lookup_table_from_bitmap(bitmap: Bytes<'_>) -> (Vec<u16>, u16) {
    let mut table = Vec::with_capacity(U16_RANGE);

    for index in 0 .. U16_RANGE {
        if index == 0 || ((bitmap[index >> 3] as usize & (1 << (index & 7))) != 0) {
            table.push(index as u16);
        }
    }

    let max_value = (table.len() - 1) as u16;

    // fill remaining up to u16 range
    table.resize(U16_RANGE, 0);

    (table, max_value)
}

fn apply_lookup_table(data: &mut [u16], table: &[u16]) {
    for data in data {
        *data = table[*data as usize];
    }
}

/// Returns the first and last non-zero bitmap byte, and the bitmap.
fn bitmap_from_data(data: &[u16]) -> (usize, usize, Vec<u8>) {
    let mut bitmap = vec![0_u8; BITMAP_SIZE];

    for value in data {
        bitmap[*value as usize >> 3] |= 1 << (*value as u8 & 7);
    }

    bitmap[0] &= !1; // zero is not explicitly stored in the bitmap; we assume that the data always contain zeroes

    let min = bitmap.iter().position(|&bits| bits != 0).unwrap_or(BITMAP_SIZE - 1);
    let max = bitmap.iter().rposition(|&bits| bits != 0).unwrap_or(0);

    (min, max, bitmap)
}

/// Maps each present value to its rank among all present values.
/// Also returns the largest rank.
fn forward_lookup_table_from_bitmap(bitmap: &[u8]) -> (u16, Vec<u16>) {
    debug_assert_eq!(bitmap.len(), BITMAP_SIZE);

    let mut table = vec![0_u16; U16_RANGE];
    let mut count = 0_usize;

    for (index, entry) in table.iter_mut().enumerate() {
        if index == 0 || bitmap[index >> 3] as usize & (1 << (index & 7)) != 0 {
            *entry = count as u16;
            count += 1;
        }
    }

    ((count - 1) as u16, table)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::{ChannelDescription, SampleType};
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    fn half_channels() -> ChannelList {
        ChannelList::new(smallvec![
            ChannelDescription::new("A", SampleType::F16, false),
            ChannelDescription::new("B", SampleType::F16, false),
        ])
    }

    fn mixed_channels() -> ChannelList {
        ChannelList::new(smallvec![
            ChannelDescription::new("B", SampleType::F16, false),
            ChannelDescription::new("G", SampleType::F32, true),
            ChannelDescription::new("Z", SampleType::U32, false),
        ])
    }

    fn roundtrip(channels: &ChannelList, pixel_bytes: &[u8], rectangle: IntegerBounds) {
        let compressed = compress(channels, pixel_bytes, rectangle).unwrap();
        let decompressed = decompress(channels, &compressed, rectangle, pixel_bytes.len()).unwrap();
        assert_eq!(pixel_bytes, decompressed.as_slice());
    }

    fn random_bytes(channels: &ChannelList, rectangle: IntegerBounds, seed: u64) -> ByteVec {
        let mut random = StdRng::seed_from_u64(seed);
        (0 .. channels.byte_count(rectangle).unwrap()).map(|_| random.random()).collect()
    }

    #[test]
    fn roundtrip_noise(){
        let rectangle = IntegerBounds::new((-3, 1), (549, 42));
        let channels = half_channels();
        roundtrip(&channels, &random_bytes(&channels, rectangle, 0), rectangle);
    }

    #[test]
    fn roundtrip_mixed_sample_types(){
        let rectangle = IntegerBounds::new((10, -7), (33, 32));
        let channels = mixed_channels();
        roundtrip(&channels, &random_bytes(&channels, rectangle, 1), rectangle);
    }

    #[test]
    fn roundtrip_few_distinct_values(){
        // the bitmap allows the 14 bit wavelet to be used
        let rectangle = IntegerBounds::from_dimensions((64, 32));
        let channels = half_channels();
        let mut random = StdRng::seed_from_u64(2);

        let palette = [ 0_u16, 1, 17, 15360, 16384, 50000, 65535 ];
        let bytes: ByteVec = (0 .. rectangle.size.area() * 2)
            .flat_map(|_| palette[random.random_range(0 .. palette.len())].to_le_bytes())
            .collect();

        roundtrip(&channels, &bytes, rectangle);
    }

    #[test]
    fn roundtrip_single_pixel(){
        let rectangle = IntegerBounds::new((5, 5), (1, 1));
        let channels = mixed_channels();
        roundtrip(&channels, &random_bytes(&channels, rectangle, 3), rectangle);
    }

    #[test]
    fn roundtrip_zeros(){
        let rectangle = IntegerBounds::from_dimensions((40, 32));
        let channels = half_channels();
        let zeros = vec![ 0_u8; channels.byte_count(rectangle).unwrap() ];

        let compressed = compress(&channels, &zeros, rectangle).unwrap();
        assert!(compressed.len() < 100);

        let decompressed = decompress(&channels, &compressed, rectangle, zeros.len()).unwrap();
        assert_eq!(decompressed, zeros);
    }

    #[test]
    fn roundtrip_all_distinct_values(){
        let rectangle = IntegerBounds::from_dimensions((256, 256));
        let channels = ChannelList::new(smallvec![ ChannelDescription::new("Y", SampleType::F16, false) ]);
        let bytes: ByteVec = (0 ..= u16::MAX).flat_map(|value| value.to_le_bytes()).collect();
        roundtrip(&channels, &bytes, rectangle);
    }

    #[test]
    fn roundtrip_subsampled(){
        let channels = ChannelList::new(smallvec![
            ChannelDescription::subsampled("BY", SampleType::F16, (2, 2)),
            ChannelDescription::subsampled("RY", SampleType::F32, (2, 2)),
            ChannelDescription::new("Y", SampleType::F16, false),
        ]);

        for &rectangle in &[
            IntegerBounds::new((0, 0), (8, 8)),
            IntegerBounds::new((1, 1), (5, 4)),
            IntegerBounds::new((-3, -5), (7, 9)),
        ] {
            roundtrip(&channels, &random_bytes(&channels, rectangle, 4), rectangle);
        }
    }

    #[test]
    fn empty_input(){
        let rectangle = IntegerBounds::from_dimensions((0, 0));
        assert!(compress(&half_channels(), &[], rectangle).unwrap().is_empty());
        assert!(decompress(&half_channels(), &[], rectangle, 0).unwrap().is_empty());
    }

    #[test]
    fn bitmap_range_out_of_bounds_is_invalid(){
        let rectangle = IntegerBounds::from_dimensions((4, 4));
        let channels = half_channels();

        let mut compressed = Vec::new();
        8192_u16.write(&mut compressed).unwrap();
        8192_u16.write(&mut compressed).unwrap();
        compressed.extend_from_slice(&[0; 16]);

        let result = decompress(&channels, &compressed, rectangle, channels.byte_count(rectangle).unwrap());
        assert!(matches!(result, Err(Error::Invalid(_))));
    }

    #[test]
    fn huffman_length_out_of_bounds_is_invalid(){
        let rectangle = IntegerBounds::from_dimensions((16, 16));
        let channels = half_channels();
        let bytes = random_bytes(&channels, rectangle, 5);
        let mut compressed = compress(&channels, &bytes, rectangle).unwrap();

        let min = u16::from_le_bytes([compressed[0], compressed[1]]) as usize;
        let max = u16::from_le_bytes([compressed[2], compressed[3]]) as usize;
        let length_position = 4 + if min <= max { max - min + 1 } else { 0 };

        compressed[length_position .. length_position + 4].copy_from_slice(&(-1_i32).to_le_bytes());
        let result = decompress(&channels, &compressed, rectangle, bytes.len());
        assert!(matches!(result, Err(Error::Invalid(_))));

        compressed[length_position .. length_position + 4].copy_from_slice(&i32::MAX.to_le_bytes());
        let result = decompress(&channels, &compressed, rectangle, bytes.len());
        assert!(matches!(result, Err(Error::Invalid(_))));
    }

    #[test]
    fn lookup_tables_are_inverse(){
        let data: Vec<u16> = vec![ 0, 7, 7, 300, 65535, 9 ];
        let (_, _, bitmap) = bitmap_from_data(&data);

        let (forward_max, forward) = forward_lookup_table_from_bitmap(&bitmap);
        let (reverse, reverse_max) = reverse_lookup_table_from_bitmap(&bitmap);
        assert_eq!(forward_max, 4);
        assert_eq!(reverse_max, 4);

        for &value in &data {
            assert_eq!(reverse[forward[value as usize] as usize], value);
        }
    }
}
