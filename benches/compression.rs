#[macro_use]
extern crate bencher;

use bencher::Bencher;
use exr_chunks::prelude::*;
use smallvec::smallvec;

fn rgba() -> ChannelList {
    ChannelList::new(smallvec![
        ChannelDescription::new("A", SampleType::F16, true),
        ChannelDescription::new("B", SampleType::F16, false),
        ChannelDescription::new("G", SampleType::F16, false),
        ChannelDescription::new("R", SampleType::F16, false),
    ])
}

/// One block of 32 lines, as used by piz
fn block() -> IntegerBounds {
    IntegerBounds::from_dimensions((512, 32))
}

/// Gradients with a little noise, similar to rendered images
fn pixels() -> Vec<u8> {
    let byte_count = rgba().byte_count(block()).unwrap();

    (0 .. byte_count).map(|index| {
        let noise = (index as u32).wrapping_mul(2_654_435_761) >> 29;
        ((index / 64) as u32 + noise) as u8
    }).collect()
}

fn compress(bench: &mut Bencher, compression: Compression) {
    let channels = rgba();
    let raw = pixels();

    bench.iter(||{
        let compressed = compression.compress_image_section(&channels, &raw, block()).unwrap();
        bencher::black_box(compressed);
    })
}

fn decompress(bench: &mut Bencher, compression: Compression) {
    let channels = rgba();
    let compressed = compression.compress_image_section(&channels, &pixels(), block()).unwrap();

    bench.iter(||{
        let raw = compression.decompress_image_section(&channels, compressed.clone(), block()).unwrap();
        bencher::black_box(raw);
    })
}

fn compress_rle(bench: &mut Bencher) { compress(bench, Compression::RLE) }
fn compress_zip(bench: &mut Bencher) { compress(bench, Compression::ZIP16) }
fn compress_piz(bench: &mut Bencher) { compress(bench, Compression::PIZ) }

fn decompress_rle(bench: &mut Bencher) { decompress(bench, Compression::RLE) }
fn decompress_zip(bench: &mut Bencher) { decompress(bench, Compression::ZIP16) }
fn decompress_piz(bench: &mut Bencher) { decompress(bench, Compression::PIZ) }


benchmark_group!(compression,
    compress_rle,
    compress_zip,
    compress_piz,
    decompress_rle,
    decompress_zip,
    decompress_piz
);

benchmark_main!(compression);
