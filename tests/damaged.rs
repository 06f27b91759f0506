//! Damaged byte streams must produce errors, never panics.

use std::io::Cursor;
use std::panic::{catch_unwind, AssertUnwindSafe};

use exr_chunks::prelude::*;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use smallvec::smallvec;


const SUPPORTED: [Compression; 5] = [
    Compression::Uncompressed, Compression::RLE,
    Compression::ZIP1, Compression::ZIP16, Compression::PIZ,
];

fn channels() -> ChannelList {
    ChannelList::new(smallvec![
        ChannelDescription::new("B", SampleType::F16, false),
        ChannelDescription::new("G", SampleType::F32, false),
        ChannelDescription::new("R", SampleType::U32, false),
    ])
}

fn scan_line_part(compression: Compression) -> Part {
    let header = Header::new(channels(), IntegerBounds::new((1, 1), (21, 40)), compression);
    Part::for_writing(header, PartIndex::Single, &LevelCache::new()).unwrap()
}

fn mip_map_part(compression: Compression) -> Part {
    let header = Header::new(channels(), IntegerBounds::from_dimensions((19, 13)), compression)
        .with_tiles(TileDescription { tile_size: Vec2(8, 8), level_mode: LevelMode::MipMap, rounding_mode: RoundingMode::Up });

    Part::for_writing(header, PartIndex::Single, &LevelCache::new()).unwrap()
}

fn smooth_pixels(byte_count: usize) -> Vec<u8> {
    (0 .. byte_count).map(|index| (index / 100) as u8).collect()
}

fn write_all_levels(part: &Part) -> Vec<u8> {
    let mut writer = PartWriter::create(Cursor::new(Vec::new()), part.clone()).unwrap();

    match &part.tiling {
        None => writer.write(&smooth_pixels(part.total_byte_count().unwrap())).unwrap(),

        Some(tiling) => for level in &tiling.levels {
            let Vec2(x, y) = level.level_index;
            writer.write_level(&smooth_pixels(part.level_byte_count(x, y).unwrap()), x, y).unwrap();
        },
    }

    writer.finish().unwrap().into_inner()
}

fn read_all_levels(part: &Part, file: &[u8], pedantic: bool) -> UnitResult {
    let mut reader = PartReader::new(Cursor::new(file), part.clone(), 0, pedantic)?;

    match part.tiling.clone() {
        None => {
            let mut pixels = vec![ 0_u8; part.total_byte_count()? ];
            reader.read(&mut pixels)
        },

        Some(tiling) => {
            for level in &tiling.levels {
                let Vec2(x, y) = level.level_index;
                let mut pixels = vec![ 0_u8; part.level_byte_count(x, y)? ];
                reader.read_level(&mut pixels, x, y)?;
            }

            Ok(())
        },
    }
}

/// Reads the file and reports whether it failed gracefully or succeeded.
fn handled_gracefully(part: &Part, file: &[u8], pedantic: bool) -> bool {
    let result = catch_unwind(AssertUnwindSafe(|| read_all_levels(part, file, pedantic)));

    match result {
        Ok(Ok(())) => true,
        Ok(Err(Error::Invalid(_))) | Ok(Err(Error::Compression(_))) | Ok(Err(Error::NotSupported(_))) => true,

        Ok(Err(Error::Io(error))) => {
            println!("✗ unexpected io error: {:?}", error);
            false
        },

        Err(_) => {
            println!("✗ panic");
            false
        },
    }
}

fn chunk_header_position(file: &[u8], chunk_index: usize) -> usize {
    let mut entry = [ 0_u8; 8 ];
    entry.copy_from_slice(&file[chunk_index * 8 .. chunk_index * 8 + 8]);
    u64::from_le_bytes(entry) as usize
}


#[test]
fn undamaged_files_are_read() {
    for &compression in &SUPPORTED {
        for part in vec![ scan_line_part(compression), mip_map_part(compression) ] {
            let file = write_all_levels(&part);
            assert!(read_all_levels(&part, &file, true).is_ok(), "{}", compression);
        }
    }
}

#[test]
fn truncated_files() {
    for &compression in &SUPPORTED {
        for part in vec![ scan_line_part(compression), mip_map_part(compression) ] {
            let file = write_all_levels(&part);

            for length in (0 .. file.len()).step_by(7) {
                let truncated = &file[.. length];
                assert!(handled_gracefully(&part, truncated, true), "{} truncated to {}", compression, length);
                assert!(handled_gracefully(&part, truncated, false), "{} truncated to {}", compression, length);

                let result = read_all_levels(&part, truncated, false);
                assert!(matches!(result, Err(Error::Invalid(_))), "{} truncated to {}", compression, length);
            }
        }
    }
}

#[test]
fn oversized_chunk_byte_count() {
    let part = scan_line_part(Compression::ZIP16);
    let file = write_all_levels(&part);

    let first_chunk = chunk_header_position(&file, 0);
    let size_field = first_chunk + 4;

    let mut damaged = file.clone();
    damaged[size_field .. size_field + 4].copy_from_slice(&i32::MAX.to_le_bytes());
    assert!(matches!(read_all_levels(&part, &damaged, false), Err(Error::Invalid(_))));

    let mut negative = file.clone();
    negative[size_field .. size_field + 4].copy_from_slice(&(-1_i32).to_le_bytes());
    assert!(matches!(read_all_levels(&part, &negative, false), Err(Error::Invalid(_))));

    // the last chunk claims more bytes than the stream contains
    let last_chunk = chunk_header_position(&file, part.chunk_count - 1);
    let remaining = (file.len() - last_chunk - 8) as i32;
    let mut beyond_end = file.clone();
    beyond_end[last_chunk + 4 .. last_chunk + 8].copy_from_slice(&(remaining + 1).to_le_bytes());
    assert!(matches!(read_all_levels(&part, &beyond_end, false), Err(Error::Invalid(_))));
}

#[test]
fn mismatching_chunk_location() {
    let part = mip_map_part(Compression::RLE);
    let file = write_all_levels(&part);

    // the level of the first tile points to a level that does not exist
    let first_chunk = chunk_header_position(&file, 0);
    let mut damaged = file.clone();
    damaged[first_chunk + 8 .. first_chunk + 12].copy_from_slice(&40_i32.to_le_bytes());
    assert!(matches!(read_all_levels(&part, &damaged, false), Err(Error::Invalid(_))));

    let mut other_tile = file.clone();
    other_tile[first_chunk .. first_chunk + 4].copy_from_slice(&1_i32.to_le_bytes());
    assert!(matches!(read_all_levels(&part, &other_tile, false), Err(Error::Invalid(_))));
}

#[test]
fn offset_table_outside_of_chunks() {
    let part = scan_line_part(Compression::RLE);
    let file = write_all_levels(&part);

    for &offset in &[ 0_u64, 8, file.len() as u64, u64::MAX - 1, u64::MAX ] {
        let mut damaged = file.clone();
        damaged[16 .. 24].copy_from_slice(&offset.to_le_bytes());

        assert!(matches!(read_all_levels(&part, &damaged, true), Err(Error::Invalid(_))), "offset {}", offset);
        assert!(matches!(read_all_levels(&part, &damaged, false), Err(Error::Invalid(_))), "offset {}", offset);
    }
}

#[test]
fn invalid_piz_bitmap_range() {
    let part = scan_line_part(Compression::PIZ);
    let file = write_all_levels(&part);

    let mut reader = PartReader::new(Cursor::new(&file), part.clone(), 0, true).unwrap();
    let info = reader.read_chunk_header(0).unwrap();
    assert!(!info.is_stored_raw());

    let bitmap_range = info.byte_offset + 8;

    for &(min, max) in &[ (0xffff_u16, 0_u16), (0, 8192), (9000, 9001) ] {
        let mut damaged = file.clone();
        damaged[bitmap_range .. bitmap_range + 2].copy_from_slice(&min.to_le_bytes());
        damaged[bitmap_range + 2 .. bitmap_range + 4].copy_from_slice(&max.to_le_bytes());

        let result = read_all_levels(&part, &damaged, true);
        assert!(matches!(result, Err(Error::Invalid(_))), "bitmap range {} to {}", min, max);
    }
}

#[test]
fn damaged_piz_code_table() {
    let part = scan_line_part(Compression::PIZ);
    let file = write_all_levels(&part);

    let mut reader = PartReader::new(Cursor::new(&file), part.clone(), 0, true).unwrap();
    let payload = reader.read_chunk_header(0).unwrap().byte_offset + 8;

    let read_u16 = |position: usize| u16::from_le_bytes([ file[position], file[position + 1] ]) as usize;
    let (min, max) = (read_u16(payload), read_u16(payload + 2));
    let bitmap_size = if min <= max { max - min + 1 } else { 0 };

    let huffman = payload + 4 + bitmap_size + 4;
    let mut table_size = [ 0_u8; 4 ];
    table_size.copy_from_slice(&file[huffman + 8 .. huffman + 12]);

    let table_start = huffman + 20;
    let table_end = table_start + u32::from_le_bytes(table_size) as usize;
    assert!(table_end > table_start);

    let mut random = StdRng::seed_from_u64(13);

    for _ in 0 .. 128 {
        let mut damaged = file.clone();
        let index = random.random_range(table_start .. table_end);
        damaged[index] = random.random();

        match read_all_levels(&part, &damaged, true) {
            Ok(()) | Err(Error::Compression(_)) => {},
            Err(error) => panic!("damaged code table reported as {:?}", error),
        }
    }
}

#[test]
fn damaged_compressed_bytes() {
    let mut random = StdRng::seed_from_u64(11);

    for &compression in &SUPPORTED[1 ..] {
        for part in vec![ scan_line_part(compression), mip_map_part(compression) ] {
            let file = write_all_levels(&part);
            let chunks_start = part.chunk_count * 8;

            for _ in 0 .. 128 {
                let mut damaged = file.clone();

                for _ in 0 .. random.random_range(1 .. 4) {
                    let index = random.random_range(chunks_start .. damaged.len());
                    damaged[index] = random.random();
                }

                assert!(handled_gracefully(&part, &damaged, false), "{}", compression);
            }
        }
    }
}

#[test]
fn damaged_anywhere() {
    let mut random = StdRng::seed_from_u64(12);

    for &compression in &SUPPORTED {
        for part in vec![ scan_line_part(compression), mip_map_part(compression) ] {
            let file = write_all_levels(&part);

            for _ in 0 .. 128 {
                let mut damaged = file.clone();

                // prefer damaging the offset table and the first chunk headers
                let position = random.random::<f32>().powi(3) * damaged.len() as f32;
                let index = (position as usize).min(damaged.len() - 1);
                damaged[index] = random.random();

                if random.random_bool(0.3) {
                    let length = random.random_range(0 .. damaged.len());
                    damaged.truncate(length);
                }

                assert!(handled_gracefully(&part, &damaged, true), "{}", compression);
                assert!(handled_gracefully(&part, &damaged, false), "{}", compression);
            }
        }
    }
}
