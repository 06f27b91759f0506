// see https://github.com/openexr/openexr/blob/master/OpenEXR/IlmImf/ImfCompressor.cpp


use super::*;
use super::optimize_bytes::*;
use crate::error::Result;

// scanline decompression routine, see https://github.com/openexr/openexr/blob/master/OpenEXR/IlmImf/ImfScanLineInputFile.cpp
// 1. Uncompress the data, if necessary (If the line is uncompressed, it's in XDR format, regardless of the compressor's output format.)
// 2. Undo the prediction and the byte reordering


pub fn decompress_bytes(compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
    let options = zune_inflate::DeflateOptions::default()
        .set_limit(expected_byte_size)
        .set_size_hint(expected_byte_size);

    let mut decoder = zune_inflate::DeflateDecoder::new_with_options(compressed, options);

    let mut decompressed = decoder.decode_zlib()
        .map_err(|_| Error::compression("zlib-compressed data malformed"))?;

    differences_to_samples(&mut decompressed);
    interleave_byte_blocks(&mut decompressed);

    Ok(decompressed)
}

pub fn compress_bytes(uncompressed: Bytes<'_>) -> Result<ByteVec> {
    // see https://github.com/AcademySoftwareFoundation/openexr/blob/3bd93f85bcb74c77255f28cdbb913fdbfbb39dfe/OpenEXR/IlmImf/ImfTiledOutputFile.cpp#L750-L842
    let mut packed = Vec::from(uncompressed);

    separate_bytes_fragments(&mut packed);
    samples_to_differences(&mut packed);

    Ok(miniz_oxide::deflate::compress_to_vec_zlib(packed.as_slice(), 4))
}


#[cfg(test)]
mod test {
    use crate::error::Error;

    #[test]
    fn roundtrip_smooth_bytes(){
        let data: Vec<u8> = (0 .. 4096_u32).map(|index| (index / 3 % 200) as u8).collect();
        let compressed = super::compress_bytes(&data).unwrap();
        assert!(compressed.len() < data.len() / 4);

        let decompressed = super::decompress_bytes(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn malformed_stream_is_a_compression_error(){
        let garbage = [ 0x12_u8, 0x34, 0x56, 0x78, 0x9a ];
        assert!(matches!(super::decompress_bytes(&garbage, 100), Err(Error::Compression(_))));
    }

    #[test]
    fn output_is_limited(){
        let data = vec![ 0_u8; 10_000 ];
        let compressed = super::compress_bytes(&data).unwrap();
        assert!(super::decompress_bytes(&compressed, 100).is_err());
    }
}
