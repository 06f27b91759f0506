//! 16-bit Huffman compression and decompression.
//! Huffman compression and decompression routines written
//!	by Christian Rouet for his PIZ image file format.
// see https://github.com/AcademySoftwareFoundation/openexr/blob/88246d991e0318c043e6f584f7493da08a31f9f8/OpenEXR/IlmImf/ImfHuf.cpp

use crate::error::{Error, Result, UnitResult};
use crate::io::Data;
use std::convert::TryFrom;
use std::{
    cmp::Ordering,
    collections::BinaryHeap,
};

const INVALID_BIT_COUNT: &str =
    "Error in header for Huffman-encoded data (invalid number of bits).";
const INVALID_TABLE_ENTRY: &str =
    "Error in header for Huffman-encoded data (invalid code table entry).";
const NOT_ENOUGH_DATA: &str =
    "Error in Huffman-encoded data (decoded data are shorter than expected).";
const INVALID_TABLE_SIZE: &str =
    "Error in Huffman-encoded data (unexpected end of code table data).";
const TABLE_TOO_LONG: &str =
    "Error in Huffman-encoded data (code table is longer than expected).";
const UNEXPECTED_END: &str =
    "Error in Huffman-encoded data (unexpected end of data).";
const INVALID_CODE: &str = "Error in Huffman-encoded data (invalid code).";
const TOO_MUCH_DATA: &str =
    "Error in Huffman-encoded data (decoded data are longer than expected).";

const ENCODE_BITS: u64 = 16; // literal (value) bit length
const DECODE_BITS: u64 = 14; // decoding bit size (>= 8)

const ENCODING_TABLE_SIZE: usize = (1 << ENCODE_BITS) + 1;
const DECODING_TABLE_SIZE: usize = 1 << DECODE_BITS;
const DECODE_MASK: u64 = DECODING_TABLE_SIZE as u64 - 1;

const HEADER_SIZE: usize = 5 * u32::BYTE_SIZE;
const MAX_CODE_LENGTH: u64 = 58;

const SHORT_ZEROCODE_RUN: u64 = 59;
const LONG_ZEROCODE_RUN: u64 = 63;
const SHORTEST_LONG_RUN: u64 = 2 + LONG_ZEROCODE_RUN - SHORT_ZEROCODE_RUN;
const LONGEST_LONG_RUN: u64 = 255 + SHORTEST_LONG_RUN;


/// Decode exactly `expected_size` values.
pub fn decompress(compressed: &[u8], expected_size: usize) -> Result<Vec<u16>> {
    if compressed.is_empty() && expected_size == 0 {
        return Ok(Vec::new());
    }

    if compressed.len() < HEADER_SIZE {
        return Err(Error::compression(NOT_ENOUGH_DATA));
    }

    let (header, mut remaining) = compressed.split_at(HEADER_SIZE);
    let header_value = |index: usize| {
        let mut bytes = [0_u8; 4];
        bytes.copy_from_slice(&header[index * 4 .. index * 4 + 4]);
        u32::from_le_bytes(bytes) as usize
    };

    let min_code_index = header_value(0);
    let max_code_index = header_value(1);
    let bit_count = header_value(3);

    if min_code_index >= ENCODING_TABLE_SIZE || max_code_index >= ENCODING_TABLE_SIZE {
        return Err(Error::compression(INVALID_TABLE_SIZE));
    }

    let encoding_table = read_encoding_table(&mut remaining, min_code_index, max_code_index)?;

    if bit_count > 8 * remaining.len() {
        return Err(Error::compression(INVALID_BIT_COUNT));
    }

    let decoding_table = build_decoding_table(&encoding_table, min_code_index, max_code_index)?;

    // ignore any trailing bytes after the encoded bits
    let encoded_bytes = &remaining[.. (bit_count + 7) / 8];

    decode(
        &encoding_table,
        &decoding_table,
        encoded_bytes,
        bit_count,
        max_code_index,
        expected_size,
    )
}

/// Encode all values. Returns an empty vector for empty input.
pub fn compress(uncompressed: &[u16]) -> Result<Vec<u8>> {
    if uncompressed.is_empty() {
        return Ok(vec![]);
    }

    let mut frequencies = vec![0_u64; ENCODING_TABLE_SIZE];
    count_frequencies(&mut frequencies, uncompressed);

    let (min_code_index, max_code_index) = build_encoding_table(&mut frequencies)?;

    let mut table = Vec::with_capacity(1024);
    pack_encoding_table(&frequencies, min_code_index, max_code_index, &mut table)?;

    let mut encoded = Vec::with_capacity(uncompressed.len());
    let bit_count = encode(&frequencies, uncompressed, max_code_index, &mut encoded)?;

    let mut result = Vec::with_capacity(HEADER_SIZE + table.len() + encoded.len());
    (min_code_index as u32).write(&mut result)?;
    (max_code_index as u32).write(&mut result)?;
    u32::try_from(table.len())?.write(&mut result)?;
    bit_count.write(&mut result)?;
    0_u32.write(&mut result)?;

    result.extend_from_slice(&table);
    result.extend_from_slice(&encoded);
    Ok(result)
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Code {
    Short(ShortCode),
    Long(Vec<u32>),
    Empty,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct ShortCode {
    value: u32,
    len: u8,
}

/// Decode (uncompress) n bits based on encoding & decoding tables:
fn decode(
    encoding_table: &[u64],
    decoding_table: &[Code],
    mut input: &[u8],
    input_bit_count: usize,
    run_length_code: usize,
    expected_output_size: usize,
) -> Result<Vec<u16>> {
    let mut output = Vec::with_capacity(expected_output_size);
    let mut code_bits = 0_u64;
    let mut code_bit_count = 0_u64;

    while !input.is_empty() {
        read_byte(&mut code_bits, &mut code_bit_count, &mut input)?;

        // Access decoding table
        while code_bit_count >= DECODE_BITS {
            let table_index = ((code_bits >> (code_bit_count - DECODE_BITS)) & DECODE_MASK) as usize;

            match &decoding_table[table_index] {
                Code::Short(code) => {
                    code_bit_count -= u64::from(code.len);

                    read_code_into_vec(
                        code.value,
                        run_length_code,
                        &mut code_bits,
                        &mut code_bit_count,
                        &mut input,
                        &mut output,
                        expected_output_size,
                    )?;
                },

                Code::Long(long_codes) => {
                    let mut found = false;

                    for &long_code in long_codes {
                        let encoded_long_code = encoding_table[long_code as usize];
                        let length = length(encoded_long_code);

                        while code_bit_count < length && !input.is_empty() {
                            read_byte(&mut code_bits, &mut code_bit_count, &mut input)?;
                        }

                        if code_bit_count >= length {
                            let required_code =
                                (code_bits >> (code_bit_count - length)) & ((1 << length) - 1);

                            if code(encoded_long_code) == required_code {
                                code_bit_count -= length;
                                read_code_into_vec(
                                    long_code,
                                    run_length_code,
                                    &mut code_bits,
                                    &mut code_bit_count,
                                    &mut input,
                                    &mut output,
                                    expected_output_size,
                                )?;

                                found = true;
                                break;
                            }
                        }
                    }

                    if !found {
                        return Err(Error::compression(INVALID_CODE));
                    }
                },

                Code::Empty => return Err(Error::compression(INVALID_CODE)),
            }
        }
    }

    // the last byte may contain unused bits
    let padding = ((8 - input_bit_count % 8) % 8) as u64;
    code_bits >>= padding;
    code_bit_count = code_bit_count.checked_sub(padding)
        .ok_or_else(|| Error::compression(INVALID_CODE))?;

    while code_bit_count > 0 {
        let table_index = ((code_bits << (DECODE_BITS - code_bit_count)) & DECODE_MASK) as usize;

        match &decoding_table[table_index] {
            Code::Short(short_code) if u64::from(short_code.len) <= code_bit_count => {
                code_bit_count -= u64::from(short_code.len);

                read_code_into_vec(
                    short_code.value,
                    run_length_code,
                    &mut code_bits,
                    &mut code_bit_count,
                    &mut input,
                    &mut output,
                    expected_output_size,
                )?;
            },

            _ => return Err(Error::compression(INVALID_CODE)),
        }
    }

    if output.len() != expected_output_size {
        return Err(Error::compression(NOT_ENOUGH_DATA));
    }

    Ok(output)
}

/// Build a decoding hash table based on the encoding table hcode:
///	- short codes (<= HUF_DECBITS) are resolved with a single table access;
///	- long code entry allocations are not optimized, because long codes are
///	  unfrequent;
///	- decoding tables are used by hufDecode();
fn build_decoding_table(
    encoding_table: &[u64],
    min_code_index: usize,
    max_code_index: usize,
) -> Result<Vec<Code>> {
    let mut decoding_table = vec![Code::Empty; DECODING_TABLE_SIZE]; // not an array because of code not being copy

    for code_index in min_code_index..=max_code_index {
        let encoded = encoding_table[code_index];

        let code = code(encoded);
        let length = length(encoded);

        if (code >> length) != 0 {
            return Err(Error::compression(INVALID_TABLE_ENTRY));
        }

        if length > DECODE_BITS {
            let long_code = &mut decoding_table[(code >> (length - DECODE_BITS)) as usize];

            match long_code {
                Code::Empty => *long_code = Code::Long(vec![code_index as u32]),
                Code::Long(symbols) => symbols.push(code_index as u32),
                Code::Short(_) => return Err(Error::compression(INVALID_TABLE_ENTRY)),
            }
        }
        else if length != 0 {
            let short_code = ShortCode {
                value: code_index as u32,
                len: length as u8,
            };

            let start_index = (code << (DECODE_BITS - length)) as usize;
            let count = 1 << (DECODE_BITS - length);

            for entry in &mut decoding_table[start_index .. start_index + count] {
                if *entry != Code::Empty {
                    return Err(Error::compression(INVALID_TABLE_ENTRY));
                }

                *entry = Code::Short(short_code);
            }
        }
    }

    Ok(decoding_table)
}

/// Run-length-decompresses all zero runs from the packed table to the encoding table
fn read_encoding_table(
    packed: &mut &[u8],
    min_code_index: usize,
    max_code_index: usize,
) -> Result<Vec<u64>> {
    let mut encoding_table = vec![0_u64; ENCODING_TABLE_SIZE];
    let mut code_bits = 0_u64;
    let mut code_bit_count = 0_u64;

    let mut index = min_code_index;
    while index <= max_code_index {
        let code_len = read_bits(6, &mut code_bits, &mut code_bit_count, packed)?;
        encoding_table[index] = code_len;

        let zero_run = {
            if code_len == LONG_ZEROCODE_RUN {
                Some(read_bits(8, &mut code_bits, &mut code_bit_count, packed)? + SHORTEST_LONG_RUN)
            }
            else if code_len >= SHORT_ZEROCODE_RUN {
                Some(code_len - SHORT_ZEROCODE_RUN + 2)
            }
            else { None }
        };

        if let Some(zero_run) = zero_run {
            let zero_run = zero_run as usize;

            if index + zero_run > max_code_index + 1 {
                return Err(Error::compression(TABLE_TOO_LONG));
            }

            for value in &mut encoding_table[index .. index + zero_run] {
                *value = 0;
            }

            index += zero_run;
        }
        else {
            index += 1;
        }
    }

    build_canonical_table(&mut encoding_table);

    Ok(encoding_table)
}

#[inline]
fn length(code: u64) -> u64 {
    code & 63
}

#[inline]
fn code(code: u64) -> u64 {
    code >> 6
}

#[inline]
fn read_bits(
    count: u64,
    code_bits: &mut u64,
    code_bit_count: &mut u64,
    input: &mut &[u8],
) -> Result<u64> {
    while *code_bit_count < count {
        read_byte(code_bits, code_bit_count, input)?;
    }

    *code_bit_count -= count;
    Ok((*code_bits >> *code_bit_count) & ((1 << count) - 1))
}

#[inline]
fn read_byte(code_bits: &mut u64, bit_count: &mut u64, input: &mut &[u8]) -> UnitResult {
    let (&byte, rest) = input.split_first().ok_or_else(|| Error::compression(UNEXPECTED_END))?;
    *input = rest;

    *code_bits = (*code_bits << 8) | u64::from(byte);
    *bit_count += 8;
    Ok(())
}

#[inline]
fn read_code_into_vec(
    code: u32,
    run_length_code: usize,
    code_bits: &mut u64,
    code_bit_count: &mut u64,
    read: &mut &[u8],
    out: &mut Vec<u16>,
    max_len: usize,
) -> UnitResult {
    if code as usize == run_length_code {
        if *code_bit_count < 8 {
            read_byte(code_bits, code_bit_count, read)?;
        }

        *code_bit_count -= 8;

        let code_repetitions = ((*code_bits >> *code_bit_count) & 0xff) as usize;
        let repeated_code = *out.last().ok_or_else(|| Error::compression(NOT_ENOUGH_DATA))?;

        if out.len() + code_repetitions > max_len {
            return Err(Error::compression(TOO_MUCH_DATA));
        }

        out.resize(out.len() + code_repetitions, repeated_code);
    }
    else if out.len() < max_len {
        // all symbols except the run length code are 16 bit values
        out.push(code as u16);
    }
    else {
        return Err(Error::compression(TOO_MUCH_DATA));
    }

    Ok(())
}

fn count_frequencies(frequencies: &mut [u64], data: &[u16]) {
    for &value in data {
        frequencies[value as usize] += 1;
    }
}

fn write_bits(
    count: u64,
    bits: u64,
    code_bits: &mut u64,
    code_bit_count: &mut u64,
    out: &mut Vec<u8>,
) {
    *code_bits = (*code_bits << count) | bits;
    *code_bit_count += count;

    while *code_bit_count >= 8 {
        *code_bit_count -= 8;
        out.push((*code_bits >> *code_bit_count) as u8);
    }
}

fn write_code(scode: u64, code_bits: &mut u64, code_bit_count: &mut u64, out: &mut Vec<u8>) {
    write_bits(length(scode), code(scode), code_bits, code_bit_count, out)
}

#[inline(always)]
fn send_code(
    scode: u64,
    run_count: u64,
    run_code: u64,
    code_bits: &mut u64,
    code_bit_count: &mut u64,
    out: &mut Vec<u8>,
) {
    //
    // Output a run of runCount instances of the symbol sCount.
    // Output the symbols explicitly, or if that is shorter, output
    // the sCode symbol once followed by a runCode symbol and runCount
    // expressed as an 8-bit number.
    //
    if length(scode) + length(run_code) + 8 < length(scode) * run_count {
        write_code(scode, code_bits, code_bit_count, out);
        write_code(run_code, code_bits, code_bit_count, out);
        write_bits(8, run_count, code_bits, code_bit_count, out);
    }
    else {
        for _ in 0 ..= run_count {
            write_code(scode, code_bits, code_bit_count, out);
        }
    }
}

/// Returns the number of bits written.
fn encode(
    encoding_table: &[u64],
    uncompressed: &[u16],
    run_length_code: usize,
    out: &mut Vec<u8>,
) -> Result<u32> {
    let mut code_bits = 0;
    let mut code_bit_count = 0;
    let mut symbol = uncompressed[0];
    let mut run_count = 0;

    //
    // Loop on input values
    //
    for &value in &uncompressed[1..] {
        //
        // Count same values or send code
        //
        if symbol == value && run_count < 255 {
            run_count += 1;
        }
        else {
            send_code(
                encoding_table[symbol as usize],
                run_count,
                encoding_table[run_length_code],
                &mut code_bits,
                &mut code_bit_count,
                out,
            );

            run_count = 0;
        }

        symbol = value;
    }

    //
    // Send remaining code
    //
    send_code(
        encoding_table[symbol as usize],
        run_count,
        encoding_table[run_length_code],
        &mut code_bits,
        &mut code_bit_count,
        out,
    );

    let bit_count = out.len() as u64 * 8 + code_bit_count;

    if code_bit_count != 0 {
        out.push(((code_bits << (8 - code_bit_count)) & 0xff) as u8);
    }

    u32::try_from(bit_count).map_err(|_| Error::unsupported("huffman data exceeds 4 gigabits"))
}

///
/// Pack an encoding table:
///	- only code lengths, not actual codes, are stored
///	- runs of zeroes are compressed as follows:
///
///	  unpacked		packed
///	  --------------------------------
///	  1 zero		0	(6 bits)
///	  2 zeroes		59
///	  3 zeroes		60
///	  4 zeroes		61
///	  5 zeroes		62
///	  n zeroes (6 or more)	63 n-6	(6 + 8 bits)
///
fn pack_encoding_table(
    encoding_table: &[u64],
    min_index: usize,
    max_index: usize,
    out: &mut Vec<u8>,
) -> UnitResult {
    let mut code_bits = 0_u64;
    let mut code_bit_count = 0_u64;

    let mut index = min_index;
    while index <= max_index {
        let code_length = length(encoding_table[index]);

        if code_length == 0 {
            let mut zero_run = 1;

            while index < max_index && zero_run < LONGEST_LONG_RUN {
                if length(encoding_table[index + 1]) > 0 {
                    break;
                }

                index += 1;
                zero_run += 1;
            }

            if zero_run >= 2 {
                if zero_run >= SHORTEST_LONG_RUN {
                    write_bits(6, LONG_ZEROCODE_RUN, &mut code_bits, &mut code_bit_count, out);
                    write_bits(8, zero_run - SHORTEST_LONG_RUN, &mut code_bits, &mut code_bit_count, out);
                }
                else {
                    write_bits(6, SHORT_ZEROCODE_RUN + zero_run - 2, &mut code_bits, &mut code_bit_count, out);
                }

                index += 1;
                continue;
            }
        }

        write_bits(6, code_length, &mut code_bits, &mut code_bit_count, out);
        index += 1;
    }

    if code_bit_count > 0 {
        out.push((code_bits << (8 - code_bit_count)) as u8);
    }

    Ok(())
}

/// Build a "canonical" Huffman code table:
///	- for each (uncompressed) symbol, hcode contains the length
///	  of the corresponding code (in the compressed data)
///	- canonical codes are computed and stored in hcode
///	- the rules for constructing canonical codes are as follows:
///	  * shorter codes (if filled with zeroes to the right)
///	    have a numerically higher value than longer codes
///	  * for codes with the same length, numerical values
///	    increase with numerical symbol values
///	- because the canonical code table can be constructed from
///	  symbol lengths alone, the code table can be transmitted
///	  without sending the actual code values
///	- see http://www.compressconsult.com/huffman/
fn build_canonical_table(code_table: &mut [u64]) {
    debug_assert_eq!(code_table.len(), ENCODING_TABLE_SIZE);

    let mut count_per_code = [0_u64; MAX_CODE_LENGTH as usize + 1];

    for &code in code_table.iter() {
        count_per_code[code as usize] += 1;
    }

    // For each i from 58 through 1, compute the
    // numerically lowest code with length i, and
    // store that code in n[i].
    let mut c = 0_u64;
    for count in count_per_code.iter_mut().rev() {
        let nc = (c + *count) >> 1;
        *count = c;
        c = nc;
    }

    // hcode[i] contains the length, l, of the
    // code for symbol i.  Assign the next available
    // code of length l to the symbol and store both
    // l and the code in hcode[i].
    for code_i in code_table.iter_mut() {
        let l = *code_i;
        if l > 0 {
            *code_i = l | (count_per_code[l as usize] << 6);
            count_per_code[l as usize] += 1;
        }
    }
}

/// Frequency with position, used for MinHeap.
#[derive(Eq, PartialEq)]
struct HeapFrequency {
    position: usize,
    frequency: u64,
}

impl Ord for HeapFrequency {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .frequency
            .cmp(&self.frequency)
            .then_with(|| other.position.cmp(&self.position))
    }
}

impl PartialOrd for HeapFrequency {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compute Huffman codes (based on frq input) and store them in frq:
///	- code structure is : [63:lsb - 6:msb] | [5-0: bit length];
///	- max code length is 58 bits;
///	- codes outside the range [im-iM] have a null length (unused values);
///	- original frequencies are destroyed;
///	- encoding tables are used by hufEncode() and hufBuildDecTable();
///
/// Elements in the heap with the same frequency are sorted by index,
/// so that the resulting codes do not depend on the heap implementation.
fn build_encoding_table(
    frequencies: &mut [u64], // input frequencies, output encoding table
) -> Result<(usize, usize)> // return frequency max min range
{
    debug_assert_eq!(frequencies.len(), ENCODING_TABLE_SIZE);

    // This function assumes that when it is called, array frq
    // indicates the frequency of all possible symbols in the data
    // that are to be Huffman-encoded.  (frq[i] contains the number
    // of occurrences of symbol i in the data.)
    //
    // The loop below does three things:
    //
    // 1) Finds the minimum and maximum indices that point
    //    to non-zero entries in frq:
    //
    //     frq[im] != 0, and frq[i] == 0 for all i < im
    //     frq[iM] != 0, and frq[i] == 0 for all i > iM
    //
    // 2) Fills array fHeap with pointers to all non-zero
    //    entries in frq.
    //
    // 3) Initializes array hlink such that hlink[i] == i
    //    for all array entries.

    // We need to use vec here or we overflow the stack.
    let mut h_link = vec![0_usize; ENCODING_TABLE_SIZE];
    let mut frequency_heap = Vec::with_capacity(ENCODING_TABLE_SIZE);

    let min_frequency_index = frequencies.iter().position(|&f| f != 0).unwrap_or(0);
    let mut max_frequency_index = 0;

    for index in min_frequency_index..ENCODING_TABLE_SIZE {
        h_link[index] = index;

        if frequencies[index] != 0 {
            frequency_heap.push(index);
            max_frequency_index = index;
        }
    }

    // Add a pseudo-symbol, with a frequency count of 1, to frq;
    // adjust the fHeap and hlink array accordingly.  Function
    // hufEncode() uses the pseudo-symbol for run-length encoding.

    max_frequency_index += 1;
    frequencies[max_frequency_index] = 1;
    frequency_heap.push(max_frequency_index);

    // Build an array, scode, such that scode[i] contains the number
    // of bits assigned to symbol i.  Conceptually this is done by
    // constructing a tree whose leaves are the symbols with non-zero
    // frequency:
    //
    //     Make a heap that contains all symbols with a non-zero frequency,
    //     with the least frequent symbol on top.
    //
    //     Repeat until only one symbol is left on the heap:
    //
    //         Take the two least frequent symbols off the top of the heap.
    //         Create a new node that has first two nodes as children, and
    //         whose frequency is the sum of the frequencies of the first
    //         two nodes.  Put the new node back into the heap.
    //
    // The last node left on the heap is the root of the tree.  For each
    // leaf node, the distance between the root and the leaf is the length
    // of the code for the corresponding symbol.
    //
    // The loop below doesn't actually build the tree; instead we compute
    // the distances of the leaves from the root on the fly.  When a new
    // node is added to the heap, then that node's descendants are linked
    // into a single linear list that starts at the new node, and the code
    // lengths of the descendants (that is, their distance from the root
    // of the tree) are incremented by one.
    let mut heap: BinaryHeap<HeapFrequency> = frequency_heap.into_iter()
        .map(|index| HeapFrequency { position: index, frequency: frequencies[index] })
        .collect();

    let mut s_code = vec![0_u64; ENCODING_TABLE_SIZE];

    while heap.len() > 1 {
        // Find the indices, mm and m, of the two smallest non-zero frq
        // values in fHeap, add the smallest frq to the second-smallest
        // frq, and remove the smallest frq value from fHeap.
        let (mm, mut m) = match (heap.pop(), heap.pop()) {
            (Some(mm), Some(m)) => (mm, m),
            _ => unreachable!("heap contains at least two entries"),
        };

        m.frequency += mm.frequency;
        let high_position = m.position;
        heap.push(m);

        // The entries in scode are linked into lists with the
        // entries in hlink serving as "next" pointers and with
        // the end of a list marked by hlink[j] == j.
        //
        // Traverse the lists that start at scode[m] and scode[mm].
        // For each element visited, increment the length of the
        // corresponding code by one bit. (If we visit scode[j]
        // during the traversal, then the code for symbol j becomes
        // one bit longer.)
        //
        // Merge the lists that start at scode[m] and scode[mm]
        // into a single list that starts at scode[m].

        // Add a bit to all codes in the first list.
        let mut j = high_position;
        loop {
            s_code[j] += 1;

            if s_code[j] > MAX_CODE_LENGTH {
                return Err(Error::unsupported("huffman code length exceeds 58 bits"));
            }

            if h_link[j] == j {
                // merge the two lists
                h_link[j] = mm.position;
                break;
            }

            j = h_link[j];
        }

        //
        // Add a bit to all codes in the second list
        //
        let mut j = mm.position;
        loop {
            s_code[j] += 1;

            if s_code[j] > MAX_CODE_LENGTH {
                return Err(Error::unsupported("huffman code length exceeds 58 bits"));
            }

            if h_link[j] == j {
                break;
            }

            j = h_link[j];
        }
    }

    // Build a canonical Huffman code table, replacing the code
    // lengths in scode with (code, code length) pairs.  Copy the
    // code table from scode into frq.
    build_canonical_table(&mut s_code);
    frequencies.copy_from_slice(&s_code);

    Ok((min_frequency_index, max_frequency_index))
}
