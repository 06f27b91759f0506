use std::io::Cursor;

use exr_chunks::prelude::*;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use smallvec::smallvec;


const SUPPORTED: [Compression; 5] = [
    Compression::Uncompressed, Compression::RLE,
    Compression::ZIP1, Compression::ZIP16, Compression::PIZ,
];

fn mixed_channels() -> ChannelList {
    ChannelList::new(smallvec![
        ChannelDescription::new("A", SampleType::F16, true),
        ChannelDescription::new("B", SampleType::F32, false),
        ChannelDescription::new("G", SampleType::U32, false),
        ChannelDescription::new("R", SampleType::F16, false),
    ])
}

/// Smooth gradients with some noise, like in a photograph.
fn pixels(byte_count: usize, seed: u64) -> Vec<u8> {
    let mut random = StdRng::seed_from_u64(seed);

    (0 .. byte_count).map(|index| {
        let gradient = (index / 13) as u8;
        if random.random_range(0 .. 8) == 0 { random.random() } else { gradient }
    }).collect()
}

fn single_part(header: Header) -> Part {
    Part::for_writing(header, PartIndex::Single, &LevelCache::new()).unwrap()
}

fn write_part(part: &Part, data: &[u8]) -> Vec<u8> {
    let mut writer = PartWriter::create(Cursor::new(Vec::new()), part.clone()).unwrap();
    writer.write(data).unwrap();
    writer.finish().unwrap().into_inner()
}

fn read_part(part: &Part, file: &[u8]) -> Vec<u8> {
    let mut reader = PartReader::new(Cursor::new(file), part.clone(), 0, true).unwrap();
    let mut pixels = vec![ 0_u8; part.total_byte_count().unwrap() ];
    reader.read(&mut pixels).unwrap();
    pixels
}


#[test]
fn scan_lines_of_all_compression_methods() {
    for &compression in &SUPPORTED {
        let header = Header::new(mixed_channels(), IntegerBounds::new((-7, 3), (37, 77)), compression);
        let part = single_part(header);
        let original = pixels(part.total_byte_count().unwrap(), 1);

        let file = write_part(&part, &original);
        assert_eq!(read_part(&part, &file), original, "{}", compression);

        let mut sequential = vec![ 0_u8; original.len() ];
        PartReader::new(Cursor::new(&file), part.clone(), 0, true).unwrap()
            .non_parallel().read(&mut sequential).unwrap();

        assert_eq!(sequential, original, "{}", compression);
    }
}

#[test]
fn compression_shrinks_smooth_pixels() {
    let header = Header::new(mixed_channels(), IntegerBounds::from_dimensions((64, 64)), Compression::Uncompressed);
    let raw = single_part(header.clone());
    let smooth: Vec<u8> = (0 .. raw.total_byte_count().unwrap()).map(|index| (index / 256) as u8).collect();
    let raw_size = write_part(&raw, &smooth).len();

    for &compression in &SUPPORTED[1 ..] {
        let part = single_part(Header { compression, .. header.clone() });
        let file = write_part(&part, &smooth);
        assert!(file.len() < raw_size, "{} did not shrink the file", compression);
        assert_eq!(read_part(&part, &file), smooth, "{}", compression);
    }
}

#[test]
fn noise_is_stored_without_compression() {
    let header = Header::new(mixed_channels(), IntegerBounds::from_dimensions((40, 40)), Compression::ZIP16);
    let part = single_part(header);

    let mut random = StdRng::seed_from_u64(2);
    let noise: Vec<u8> = (0 .. part.total_byte_count().unwrap()).map(|_| random.random()).collect();
    let file = write_part(&part, &noise);

    let mut reader = PartReader::new(Cursor::new(&file), part.clone(), 0, true).unwrap();
    let info = reader.read_chunk_header(0).unwrap();
    assert!(info.is_stored_raw());
    assert_eq!(info.byte_count, 40 * 16 * 12);

    assert_eq!(read_part(&part, &file), noise);
}

#[test]
fn uncompressed_file_layout() {
    let header = Header::new(mixed_channels(), IntegerBounds::from_dimensions((5, 3)), Compression::Uncompressed);
    let part = single_part(header);
    let original = pixels(part.total_byte_count().unwrap(), 3);
    let file = write_part(&part, &original);

    // offset table, then one header and one line per chunk
    assert_eq!(file.len(), 3 * 8 + 3 * (4 + 4) + original.len());
    assert_eq!(&file[3 * 8 + 8 .. 3 * 8 + 8 + 5 * 12], &original[.. 5 * 12]);
}

#[test]
fn single_level_tiles() {
    for &compression in &SUPPORTED {
        let header = Header::new(mixed_channels(), IntegerBounds::new((11, -20), (45, 29)), compression)
            .with_tiles(TileDescription {
                tile_size: Vec2(16, 8),
                level_mode: LevelMode::Singular,
                rounding_mode: RoundingMode::Down,
            });

        let part = single_part(header);
        assert_eq!(part.chunk_count, 3 * 4);

        let original = pixels(part.total_byte_count().unwrap(), 4);
        let file = write_part(&part, &original);
        assert_eq!(read_part(&part, &file), original, "{}", compression);
    }
}

#[test]
fn mip_map_levels() {
    for &rounding_mode in &[ RoundingMode::Down, RoundingMode::Up ] {
        let header = Header::new(mixed_channels(), IntegerBounds::from_dimensions((35, 21)), Compression::PIZ)
            .with_tiles(TileDescription { tile_size: Vec2(8, 8), level_mode: LevelMode::MipMap, rounding_mode });

        let part = single_part(header);
        let tiling = part.tiling.clone().unwrap();

        let levels: Vec<Vec<u8>> = tiling.levels.iter().enumerate()
            .map(|(index, level)| pixels(part.level_byte_count(level.level_index.x(), level.level_index.y()).unwrap(), index as u64))
            .collect();

        let mut writer = PartWriter::create(Cursor::new(Vec::new()), part.clone()).unwrap();

        // smallest levels first
        for (level, data) in tiling.levels.iter().zip(&levels).rev() {
            writer.write_level(data, level.level_index.x(), level.level_index.y()).unwrap();
        }

        let file = writer.finish().unwrap().into_inner();
        let mut reader = PartReader::new(Cursor::new(&file), part.clone(), 0, true).unwrap();

        for (level, data) in tiling.levels.iter().zip(&levels) {
            let mut pixels = vec![ 0_u8; data.len() ];
            reader.read_level(&mut pixels, level.level_index.x(), level.level_index.y()).unwrap();
            assert_eq!(&pixels, data, "{:?} level {:?}", rounding_mode, level.level_index);
        }
    }
}

#[test]
fn rip_map_levels() {
    let header = Header::new(mixed_channels(), IntegerBounds::from_dimensions((19, 12)), Compression::ZIP1)
        .with_tiles(TileDescription { tile_size: Vec2(4, 4), level_mode: LevelMode::RipMap, rounding_mode: RoundingMode::Up });

    let part = single_part(header);
    let tiling = part.tiling.clone().unwrap();
    assert_eq!(tiling.level_count, Vec2(6, 5));

    let mut writer = PartWriter::create(Cursor::new(Vec::new()), part.clone()).unwrap();
    let mut levels = Vec::new();

    for level in &tiling.levels {
        let Vec2(x, y) = level.level_index;
        let data = pixels(part.level_byte_count(x, y).unwrap(), (x * 10 + y) as u64);
        writer.write_level(&data, x, y).unwrap();
        levels.push(data);
    }

    let file = writer.finish().unwrap().into_inner();
    let mut reader = PartReader::new(Cursor::new(&file), part.clone(), 0, true).unwrap();

    // read in a different order than written
    for (level, data) in tiling.levels.iter().zip(&levels).rev() {
        let Vec2(x, y) = level.level_index;
        let mut pixels = vec![ 0_u8; data.len() ];
        reader.read_level(&mut pixels, x, y).unwrap();
        assert_eq!(&pixels, data, "level {:?}", level.level_index);
    }
}

#[test]
fn chunks_in_random_order() {
    let header = Header::new(mixed_channels(), IntegerBounds::from_dimensions((23, 100)), Compression::ZIP16);
    let part = single_part(header);

    let chunks: Vec<Vec<u8>> = (0 .. part.chunk_count)
        .map(|index| pixels(part.chunk_byte_count(index).unwrap(), index as u64))
        .collect();

    let mut order: Vec<usize> = (0 .. part.chunk_count).collect();
    let mut random = StdRng::seed_from_u64(5);
    for index in (1 .. order.len()).rev() {
        order.swap(index, random.random_range(0 ..= index));
    }

    let mut writer = PartWriter::create(Cursor::new(Vec::new()), part.clone()).unwrap();
    for &index in &order { writer.write_chunk(index, &chunks[index]).unwrap(); }
    let file = writer.finish().unwrap().into_inner();

    // the whole part equals the chunks in table order
    assert_eq!(read_part(&part, &file), chunks.concat());

    let mut reader = PartReader::new(Cursor::new(&file), part.clone(), 0, true).unwrap();
    for &index in order.iter().rev() {
        let mut pixels = vec![ 0_u8; chunks[index].len() ];
        let info = reader.read_chunk(index, &mut pixels).unwrap();
        assert_eq!(info.index, index);
        assert_eq!(pixels, chunks[index]);
    }
}

#[test]
fn multiple_parts() {
    let cache = LevelCache::new();

    let scan_lines = Header::new(mixed_channels(), IntegerBounds::from_dimensions((30, 50)), Compression::RLE);
    let tiles = Header::new(mixed_channels(), IntegerBounds::new((-4, -4), (30, 50)), Compression::PIZ)
        .with_tiles(TileDescription { tile_size: Vec2(16, 16), level_mode: LevelMode::Singular, rounding_mode: RoundingMode::Down });

    let first = Part::for_writing(scan_lines, PartIndex::Multi(0), &cache).unwrap();
    let second = Part::for_writing(tiles, PartIndex::Multi(1), &cache).unwrap();

    let first_pixels = pixels(first.total_byte_count().unwrap(), 6);
    let second_pixels = pixels(second.total_byte_count().unwrap(), 7);

    let mut stream = Cursor::new(Vec::new());
    let first_table = PartWriter::write_offset_placeholders(&mut stream, &first).unwrap();
    let second_table = PartWriter::write_offset_placeholders(&mut stream, &second).unwrap();
    assert_eq!(second_table, first_table + 50 * 8);

    let mut writer = PartWriter::new(stream, first.clone(), first_table).unwrap();
    writer.write(&first_pixels).unwrap();
    let stream = writer.finish().unwrap();

    let mut writer = PartWriter::new(stream, second.clone(), second_table).unwrap();
    writer.write(&second_pixels).unwrap();
    let file = writer.finish().unwrap().into_inner();

    // a reader only knows the declared chunk counts
    let first = Part::for_reading(first.header.clone().with_chunk_count(first.chunk_count), PartIndex::Multi(0), &cache).unwrap();
    let second = Part::for_reading(second.header.clone().with_chunk_count(second.chunk_count), PartIndex::Multi(1), &cache).unwrap();

    let mut pixels = vec![ 0_u8; second_pixels.len() ];
    PartReader::new(Cursor::new(&file), second.clone(), second_table, true).unwrap()
        .read(&mut pixels).unwrap();

    assert_eq!(pixels, second_pixels);

    let mut pixels = vec![ 0_u8; first_pixels.len() ];
    PartReader::new(Cursor::new(&file), first.clone(), first_table, true).unwrap()
        .read(&mut pixels).unwrap();

    assert_eq!(pixels, first_pixels);

    // the chunks of one part cannot be read as the other part
    let mut reader = PartReader::new(Cursor::new(&file), Part { index: PartIndex::Multi(1), .. first }, first_table, false).unwrap();
    assert!(matches!(reader.read_chunk_header(0), Err(Error::Invalid(_))));
}

#[test]
fn interleaved_pixels() {
    let header = Header::new(mixed_channels(), IntegerBounds::new((3, 3), (17, 40)), Compression::ZIP16)
        .with_tiles(TileDescription { tile_size: Vec2(8, 8), level_mode: LevelMode::Singular, rounding_mode: RoundingMode::Down });

    let part = single_part(header);
    let order = [ "R", "G", "B", "A" ];
    let interleaved = pixels(17 * 40 * (2 + 4 + 4 + 2), 8);

    let mut writer = PartWriter::create(Cursor::new(Vec::new()), part.clone()).unwrap();
    writer.write_interleaved(&interleaved, &order).unwrap();
    let file = writer.finish().unwrap().into_inner();

    let mut reader = PartReader::new(Cursor::new(&file), part.clone(), 0, true).unwrap();
    let mut pixels = vec![ 0_u8; interleaved.len() ];
    reader.read_interleaved(&mut pixels, &order).unwrap();
    assert_eq!(pixels, interleaved);

    // the first pixel in the planar layout
    let planar = read_part(&part, &file);
    assert_eq!(&planar[.. 2], &interleaved[10 .. 12]);
    assert_eq!(&planar[17 * 2 .. 17 * 2 + 4], &interleaved[6 .. 10]);

    let mut alpha = vec![ 0_u8; 17 * 40 * 2 ];
    reader.read_interleaved(&mut alpha, &["A"]).unwrap();
    let expected: Vec<u8> = interleaved.chunks_exact(12).flat_map(|pixel| pixel[10 .. 12].to_vec()).collect();
    assert_eq!(alpha, expected);
}

#[test]
fn excluded_channels_are_written_as_zero() {
    let header = Header::new(mixed_channels(), IntegerBounds::from_dimensions((9, 9)), Compression::RLE);
    let part = single_part(header);

    let color = pixels(9 * 9 * 2, 9).iter().map(|&byte| byte | 1).collect::<Vec<u8>>();
    let mut writer = PartWriter::create(Cursor::new(Vec::new()), part.clone()).unwrap();
    for y in 0 .. 9 {
        writer.write_chunk_interleaved(y, &color[y * 18 .. (y + 1) * 18], &["R"]).unwrap();
    }

    let file = writer.finish().unwrap().into_inner();
    let planar = read_part(&part, &file);

    for line in planar.chunks_exact(9 * 12) {
        let (other, red) = line.split_at(9 * 10);
        assert!(other.iter().all(|&byte| byte == 0));
        assert!(red.iter().all(|&byte| byte & 1 == 1));
    }

    let mut reader = PartReader::new(Cursor::new(&file), part.clone(), 0, true).unwrap();
    let mut line = vec![ 0_u8; 9 * 2 ];
    reader.read_chunk_interleaved(4, &mut line, &["R"]).unwrap();
    assert_eq!(line, &color[4 * 18 .. 5 * 18]);
}

#[test]
fn subsampled_scan_lines() {
    let channels = ChannelList::new(smallvec![
        ChannelDescription::subsampled("BY", SampleType::F16, (2, 2)),
        ChannelDescription::subsampled("RY", SampleType::F16, (2, 2)),
        ChannelDescription::new("Y", SampleType::F16, true),
    ]);

    for &compression in &SUPPORTED {
        let header = Header::new(channels.clone(), IntegerBounds::new((-2, 4), (24, 70)), compression);
        let part = single_part(header);

        let luma = 24 * 70 * 2;
        let chroma = 2 * 12 * 35 * 2;
        assert_eq!(part.total_byte_count().unwrap(), luma + chroma);

        let original = pixels(part.total_byte_count().unwrap(), 10);
        let file = write_part(&part, &original);
        assert_eq!(read_part(&part, &file), original, "{}", compression);

        let mut reader = PartReader::new(Cursor::new(&file), part.clone(), 0, true).unwrap();
        let mut interleaved = vec![ 0_u8; 24 * 70 * 2 ];
        assert!(matches!(reader.read_interleaved(&mut interleaved, &["Y"]), Err(Error::NotSupported(_))));
    }
}
