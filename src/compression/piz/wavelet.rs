//! Wavelet encoding and decoding.
// see https://github.com/AcademySoftwareFoundation/openexr/blob/8cd1b9210855fa4f6923c1b94df8a86166be19b1/OpenEXR/IlmImf/ImfWav.cpp

use crate::error::{Error, UnitResult};
use crate::math::Vec2;

/// Transforms the values in place. The values are addressed as
/// `buffer[x * offset.0 + y * offset.1]` for each `x < count.0` and `y < count.1`.
/// The `max` value decides whether the 14 bit or the 16 bit transform is used.
pub fn encode(buffer: &mut [u16], count: Vec2<usize>, offset: Vec2<usize>, max: u16) -> UnitResult {
    validate_bounds(buffer, count, offset)?;

    let pair: fn(u16, u16) -> (u16, u16) =
        if is_14_bit(max) { encode_14_bit } else { encode_16_bit };

    let smaller_size = count.0.min(count.1);
    let mut p = 1;
    let mut p2 = 2;

    while p2 <= smaller_size {
        let end_y = offset.1 * (count.1 - p2);
        let offset1 = Vec2(offset.0 * p, offset.1 * p);
        let offset2 = Vec2(offset.0 * p2, offset.1 * p2);

        let mut position_y = 0;
        while position_y <= end_y {
            let mut position_x = position_y;
            let end_x = position_y + offset.0 * (count.0 - p2);

            while position_x <= end_x {
                let p01 = position_x + offset1.0;
                let p10 = position_x + offset1.1;
                let p11 = p10 + offset1.0;

                let (i00, i01) = pair(buffer[position_x], buffer[p01]);
                let (i10, i11) = pair(buffer[p10], buffer[p11]);
                let (v00, v10) = pair(i00, i10);
                let (v01, v11) = pair(i01, i11);

                buffer[position_x] = v00;
                buffer[p10] = v10;
                buffer[p01] = v01;
                buffer[p11] = v11;

                position_x += offset2.0;
            }

            // encode the remaining odd column
            if count.0 & p != 0 {
                let p10 = position_x + offset1.1;
                let (v00, v10) = pair(buffer[position_x], buffer[p10]);
                buffer[position_x] = v00;
                buffer[p10] = v10;
            }

            position_y += offset2.1;
        }

        // encode the remaining odd row
        if count.1 & p != 0 {
            let mut position_x = position_y;
            let end_x = position_y + offset.0 * (count.0 - p2);

            while position_x <= end_x {
                let p01 = position_x + offset1.0;
                let (v00, v01) = pair(buffer[position_x], buffer[p01]);
                buffer[position_x] = v00;
                buffer[p01] = v01;

                position_x += offset2.0;
            }
        }

        p = p2;
        p2 <<= 1;
    }

    Ok(())
}

/// Reverts `encode` in place, using the same layout parameters.
pub fn decode(buffer: &mut [u16], count: Vec2<usize>, offset: Vec2<usize>, max: u16) -> UnitResult {
    validate_bounds(buffer, count, offset)?;

    let pair: fn(u16, u16) -> (u16, u16) =
        if is_14_bit(max) { decode_14_bit } else { decode_16_bit };

    let smaller_size = count.0.min(count.1);

    // search max level
    let mut p = 1;
    while p <= smaller_size { p <<= 1; }

    p >>= 1;
    let mut p2 = p;
    p >>= 1;

    while p >= 1 {
        let end_y = offset.1 * (count.1 - p2);
        let offset1 = Vec2(offset.0 * p, offset.1 * p);
        let offset2 = Vec2(offset.0 * p2, offset.1 * p2);

        let mut position_y = 0;
        while position_y <= end_y {
            let mut position_x = position_y;
            let end_x = position_y + offset.0 * (count.0 - p2);

            while position_x <= end_x {
                let p01 = position_x + offset1.0;
                let p10 = position_x + offset1.1;
                let p11 = p10 + offset1.0;

                let (i00, i10) = pair(buffer[position_x], buffer[p10]);
                let (i01, i11) = pair(buffer[p01], buffer[p11]);
                let (v00, v01) = pair(i00, i01);
                let (v10, v11) = pair(i10, i11);

                buffer[position_x] = v00;
                buffer[p01] = v01;
                buffer[p10] = v10;
                buffer[p11] = v11;

                position_x += offset2.0;
            }

            // decode the remaining odd column
            if count.0 & p != 0 {
                let p10 = position_x + offset1.1;
                let (v00, v10) = pair(buffer[position_x], buffer[p10]);
                buffer[position_x] = v00;
                buffer[p10] = v10;
            }

            position_y += offset2.1;
        }

        // decode the remaining odd row
        if count.1 & p != 0 {
            let mut position_x = position_y;
            let end_x = position_y + offset.0 * (count.0 - p2);

            while position_x <= end_x {
                let p01 = position_x + offset1.0;
                let (v00, v01) = pair(buffer[position_x], buffer[p01]);
                buffer[position_x] = v00;
                buffer[p01] = v01;

                position_x += offset2.0;
            }
        }

        p2 = p;
        p >>= 1;
    }

    Ok(())
}

fn is_14_bit(max: u16) -> bool {
    max < (1 << 14)
}

fn validate_bounds(buffer: &[u16], count: Vec2<usize>, offset: Vec2<usize>) -> UnitResult {
    if count.0 == 0 || count.1 == 0 { return Ok(()); }

    let last_index = (count.0 - 1).checked_mul(offset.0)
        .and_then(|x| (count.1 - 1).checked_mul(offset.1).and_then(|y| x.checked_add(y)));

    match last_index {
        Some(last_index) if last_index < buffer.len() => Ok(()),
        _ => Err(Error::invalid("wavelet layout exceeds the sample buffer")),
    }
}

/// Untransformed data values should be less than (1 << 14).
#[inline]
fn encode_14_bit(a: u16, b: u16) -> (u16, u16) {
    let (a, b) = (a as i16 as i32, b as i16 as i32);

    let m = (a + b) >> 1;
    let d = a - b;

    (m as i16 as u16, d as i16 as u16)
}

#[inline]
fn decode_14_bit(l: u16, h: u16) -> (u16, u16) {
    let (l, h) = (l as i16 as i32, h as i16 as i32);

    let hi = h;
    let ai = l + (hi & 1) + (hi >> 1);

    let a = ai as i16;
    let b = (ai - hi) as i16;

    (a as u16, b as u16)
}


const BIT_COUNT: i32 = 16;
const A_OFFSET: i32 = 1 << (BIT_COUNT - 1);
const MOD_MASK: i32 = (1 << BIT_COUNT) - 1;

/// Wavelet basis function with modulo arithmetic, for the full 16 bit range.
#[inline]
fn encode_16_bit(a: u16, b: u16) -> (u16, u16) {
    let (a, b) = (a as i32, b as i32);

    let a_offset = (a + A_OFFSET) & MOD_MASK;
    let mut m = (a_offset + b) >> 1;
    let d = a_offset - b;

    if d < 0 { m = (m + A_OFFSET) & MOD_MASK; }
    let d = d & MOD_MASK;

    (m as u16, d as u16)
}

#[inline]
fn decode_16_bit(l: u16, h: u16) -> (u16, u16) {
    let (m, d) = (l as i32, h as i32);

    let b = (m - (d >> 1)) & MOD_MASK;
    let a = (d + b - A_OFFSET) & MOD_MASK;

    (a as u16, b as u16)
}
