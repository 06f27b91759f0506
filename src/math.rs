
// calculations inspired by
// https://github.com/AcademySoftwareFoundation/openexr/blob/master/OpenEXR/IlmImf/ImfTiledMisc.cpp

//! Simple math utilities.

use std::convert::TryFrom;
use crate::error::{i32_to_usize, usize_to_i32};
use crate::error::Result;

/// Simple two-dimensional vector of any numerical type.
/// Supports only few mathematical operations
/// as this is used mainly as data struct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Vec2<T> (pub T, pub T);

impl<T> Vec2<T> {

    /// Maps all components of this vector to a new type, yielding a vector of that new type.
    pub fn map<B>(self, map: impl Fn(T) -> B) -> Vec2<B> {
        Vec2(map(self.0), map(self.1))
    }

    /// Try to convert all components of this vector to a new type,
    /// yielding either a vector of that new type, or an error.
    pub fn try_from<S>(value: Vec2<S>) -> std::result::Result<Self, T::Error> where T: TryFrom<S> {
        let x = T::try_from(value.0)?;
        let y = T::try_from(value.1)?;
        Ok(Vec2(x, y))
    }

    /// Seeing this vector as a dimension or size (width and height),
    /// this returns the area that this dimensions contains (`width * height`).
    #[inline] pub fn area(self) -> T where T: std::ops::Mul<T, Output = T> {
        self.0 * self.1
    }

    /// The first component of this 2D vector.
    #[inline] pub fn x(self) -> T { self.0 }

    /// The second component of this 2D vector.
    #[inline] pub fn y(self) -> T { self.1 }

    /// The first component of this 2D vector.
    #[inline] pub fn width(self) -> T { self.0 }

    /// The second component of this 2D vector.
    #[inline] pub fn height(self) -> T { self.1 }
}


impl Vec2<i32> {

    /// Try to convert to `Vec2<usize>`, returning an error on negative numbers.
    pub fn to_usize(self, error_message: &'static str) -> Result<Vec2<usize>> {
        let x = i32_to_usize(self.0, error_message)?;
        let y = i32_to_usize(self.1, error_message)?;
        Ok(Vec2(x, y))
    }
}

impl Vec2<usize> {

    /// Try to convert to `Vec2<i32>`, returning an error on too large numbers.
    pub fn to_i32(self, error_message: &'static str) -> Result<Vec2<i32>> {
        let x = usize_to_i32(self.0, error_message)?;
        let y = usize_to_i32(self.1, error_message)?;
        Ok(Vec2(x, y))
    }
}


impl<T: std::ops::Add<T>> std::ops::Add<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn add(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 + other.0, self.1 + other.1)
    }
}

impl<T: std::ops::Sub<T>> std::ops::Sub<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn sub(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 - other.0, self.1 - other.1)
    }
}

impl<T: std::ops::Div<T>> std::ops::Div<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn div(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 / other.0, self.1 / other.1)
    }
}

impl<T: std::ops::Mul<T>> std::ops::Mul<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn mul(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 * other.0, self.1 * other.1)
    }
}

impl<T> From<(T, T)> for Vec2<T> {
    fn from((x, y): (T, T)) -> Self { Vec2(x, y) }
}

impl<T> From<Vec2<T>> for (T, T) {
    fn from(vec2: Vec2<T>) -> Self { (vec2.0, vec2.1) }
}


/// Computes `floor(log(x)/log(2))`. Returns 0 where argument is 0.
pub(crate) fn floor_log_2(number: u32) -> u32 {
    if number <= 1 { 0 }
    else { 31 - number.leading_zeros() }
}

/// Computes `ceil(log(x)/log(2))`. Returns 0 where argument is 0.
pub(crate) fn ceil_log_2(number: u32) -> u32 {
    let floor = floor_log_2(number);
    if number > 1 && !number.is_power_of_two() { floor + 1 } else { floor }
}


/// Round up or down in specific calculations.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RoundingMode {

    /// Round down.
    Down,

    /// Round up.
    Up,
}

impl RoundingMode {

    /// The base-two logarithm of the number, rounded in this direction.
    pub(crate) fn log2(self, number: usize) -> usize {
        let number = u32::try_from(number).unwrap_or(u32::MAX);

        match self {
            RoundingMode::Down => floor_log_2(number) as usize,
            RoundingMode::Up => ceil_log_2(number) as usize,
        }
    }

    /// Only works for positive numbers.
    pub(crate) fn divide(self, dividend: usize, divisor: usize) -> usize {
        match self {
            RoundingMode::Up => dividend / divisor + usize::from(dividend % divisor != 0),
            RoundingMode::Down => dividend / divisor,
        }
    }
}


// Integer division and remainder where the
// remainder of x/y is always positive:
//
//	div_p(x,y) == floor (double(x) / double (y))
//	mod_p(x,y) == x - y * div_p(x,y)

/// Floor division, also for negative numbers.
pub(crate) fn div_p(x: i32, y: i32) -> i32 {
    if x >= 0 {
        if y >= 0 { x  / y }
        else { -(x  / -y) }
    }
    else if y >= 0 { -((y-1-x) / y) }
    else { (-y-1-x) / -y }
}

/// Always positive remainder of the floor division.
pub(crate) fn mod_p(x: i32, y: i32) -> i32 {
    x - y * div_p(x, y)
}

/// The number of integers in `start .. start + count` that are divisible by `sampling`.
/// Subsampled channels only store values at these coordinates.
pub(crate) fn sample_count(start: i32, count: usize, sampling: usize) -> usize {
    if count == 0 { return 0; }

    let sampling = sampling as i64;
    let start = start as i64;
    let end = start + count as i64 - 1;

    let floor_div = |value: i64| value.div_euclid(sampling);
    (floor_div(end) - floor_div(start - 1)) as usize
}
