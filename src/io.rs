
//! Specialized binary input and output.
//! Uses the error handling for this crate.

pub use ::std::io::{Read, Write};

use half::slice::HalfFloatSliceExt;
use lebe::prelude::*;
use ::half::f16;
use crate::error::{Error, Result, UnitResult, IoResult};
use std::io::{Seek, SeekFrom};


/// Skip reading uninteresting bytes without allocating.
#[inline]
pub fn skip_bytes(read: &mut impl Read, count: usize) -> IoResult<()> {
    let skipped = std::io::copy(
        &mut read.by_ref().take(count as u64),
        &mut std::io::sink()
    )?;

    if skipped < count as u64 {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "cannot skip bytes"));
    }

    Ok(())
}


/// Keep track of what byte we are at.
/// Used to skip back to a previous place after writing some information.
#[derive(Debug)]
pub struct Tracking<T> {

    /// Do not expose to prevent seeking without updating position
    inner: T,

    position: usize,
}

impl<T: Read> Read for Tracking<T> {
    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        let count = self.inner.read(buffer)?;
        self.position += count;
        Ok(count)
    }
}

impl<T: Write> Write for Tracking<T> {
    fn write(&mut self, buffer: &[u8]) -> std::io::Result<usize> {
        let count = self.inner.write(buffer)?;
        self.position += count;
        Ok(count)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<T> Tracking<T> {

    /// If `inner` is a reference, if must never be seeked directly,
    /// but only through this `Tracking` instance.
    pub fn new(inner: T) -> Self {
        Tracking { inner, position: 0 }
    }

    /// Start tracking a stream that has already been advanced to the specified byte position.
    pub fn at_position(inner: T, position: usize) -> Self {
        Tracking { inner, position }
    }

    /// Current number of bytes written or read.
    pub fn byte_position(&self) -> usize {
        self.position
    }

    /// Stop tracking and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Seek> Tracking<T> {

    /// Set the reader to the specified byte position.
    /// If it is only a couple of bytes, no seek system call is performed.
    pub fn seek_read_to(&mut self, target_position: usize) -> std::io::Result<()> {
        let delta = target_position as i128 - self.position as i128;

        if delta > 0 && delta < 16 {
            skip_bytes(&mut self.inner, delta as usize)?;
            self.position += delta as usize;
        }
        else if delta != 0 {
            self.inner.seek(SeekFrom::Start(target_position as u64))?;
            self.position = target_position;
        }

        Ok(())
    }

    /// The total byte length of the stream.
    /// Leaves the cursor where it was.
    pub fn stream_len(&mut self) -> std::io::Result<usize> {
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(self.position as u64))?;
        Ok(end as usize)
    }
}

impl<T: Write + Seek> Tracking<T> {

    /// Move the writing cursor to the specified target byte index,
    /// which must have been written before.
    /// Does not modify any bytes.
    pub fn seek_write_to(&mut self, target_position: usize) -> std::io::Result<()> {
        if target_position != self.position {
            self.inner.seek(SeekFrom::Start(target_position as u64))?;
            self.position = target_position;
        }

        Ok(())
    }
}


/// Generic trait that defines common binary operations such as reading and writing for this type.
pub trait Data: Sized + Default + Clone {

    /// Number of bytes this would consume in an exr file.
    const BYTE_SIZE: usize = ::std::mem::size_of::<Self>();

    /// Read a value of type `Self`.
    fn read(read: &mut impl Read) -> Result<Self>;

    /// Read as many values of type `Self` as fit into the specified slice.
    /// If the slice cannot be filled completely, returns `Error::Invalid`.
    fn read_slice(read: &mut impl Read, slice: &mut[Self]) -> UnitResult;

    /// Read as many values of type `Self` as specified with `data_size`.
    ///
    /// This method will not allocate more memory than `soft_max` at once.
    /// If `hard_max` is specified, it will never read any more than that.
    /// Returns `Error::Invalid` if reader does not contain the desired number of elements.
    #[inline]
    fn read_vec(read: &mut impl Read, data_size: usize, soft_max: usize, hard_max: Option<usize>, purpose: &'static str) -> Result<Vec<Self>> {
        let mut vec = Vec::with_capacity(data_size.min(soft_max));
        Self::read_into_vec(read, &mut vec, data_size, soft_max, hard_max, purpose)?;
        Ok(vec)
    }

    /// Write this value to the writer.
    fn write(self, write: &mut impl Write) -> UnitResult;

    /// Write all values of that slice to the writer.
    fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult;


    /// Read as many values of type `Self` as specified with `data_size` into the provided vector.
    ///
    /// This method will not allocate more memory than `soft_max` at once.
    /// If `hard_max` is specified, it will never read any more than that.
    /// Returns `Error::Invalid` if reader does not contain the desired number of elements.
    #[inline]
    fn read_into_vec(read: &mut impl Read, data: &mut Vec<Self>, data_size: usize, soft_max: usize, hard_max: Option<usize>, purpose: &'static str) -> UnitResult {
        if let Some(max) = hard_max {
            if data_size > max {
                return Err(Error::invalid(purpose))
            }
        }

        let soft_max = hard_max.unwrap_or(soft_max).min(soft_max).max(1);
        let end = data.len() + data_size;

        // do not allocate more than $chunks memory at once
        // (most of the time, this loop will run only once)
        while data.len() < end {
            let chunk_start = data.len();
            let chunk_end = (chunk_start + soft_max).min(end);

            data.resize(chunk_end, Self::default());
            Self::read_slice(read, &mut data[chunk_start .. chunk_end])?; // safe because of `min(end)`
        }

        Ok(())
    }
}


macro_rules! implement_data_for_primitive {
    ($kind: ident) => {
        impl Data for $kind {
            #[inline]
            fn read(read: &mut impl Read) -> Result<Self> {
                Ok(read.read_from_little_endian()?)
            }

            #[inline]
            fn write(self, write: &mut impl Write) -> Result<()> {
                write.write_as_little_endian(&self)?;
                Ok(())
            }

            #[inline]
            fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> Result<()> {
                read.read_from_little_endian_into(slice)?;
                Ok(())
            }

            #[inline]
            fn write_slice(write: &mut impl Write, slice: &[Self]) -> Result<()> {
                write.write_as_little_endian(slice)?;
                Ok(())
            }
        }
    };
}

implement_data_for_primitive!(u8);
implement_data_for_primitive!(u16);
implement_data_for_primitive!(u32);
implement_data_for_primitive!(i32);
implement_data_for_primitive!(u64);
implement_data_for_primitive!(f32);


impl Data for f16 {
    #[inline]
    fn read(read: &mut impl Read) -> Result<Self> {
        u16::read(read).map(f16::from_bits)
    }

    #[inline]
    fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> Result<()> {
        let bits = slice.reinterpret_cast_mut();
        u16::read_slice(read, bits)
    }

    #[inline]
    fn write(self, write: &mut impl Write) -> Result<()> {
        self.to_bits().write(write)
    }

    #[inline]
    fn write_slice(write: &mut impl Write, slice: &[Self]) -> Result<()> {
        let bits = slice.reinterpret_cast();
        u16::write_slice(write, bits)
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn tracking_patches_without_overwriting(){
        let mut write = Tracking::new(Cursor::new(Vec::new()));
        u64::write(u64::MAX, &mut write).unwrap();
        u8::write_slice(&mut write, &[1, 2, 3]).unwrap();
        assert_eq!(write.byte_position(), 11);

        write.seek_write_to(0).unwrap();
        u64::write(42, &mut write).unwrap();
        write.seek_write_to(11).unwrap();

        let bytes = write.into_inner().into_inner();
        assert_eq!(&bytes[..8], &42_u64.to_le_bytes());
        assert_eq!(&bytes[8..], &[1, 2, 3]);
    }

    #[test]
    fn read_vec_respects_hard_max(){
        let bytes = [0_u8; 16];
        let too_many = u8::read_vec(&mut &bytes[..], 17, 4, Some(16), "test size");
        assert!(matches!(too_many, Err(Error::Invalid(_))));

        let missing = u8::read_vec(&mut &bytes[..], 17, 4, None, "test size");
        assert!(matches!(missing, Err(Error::Invalid(_))));

        let all = u8::read_vec(&mut &bytes[..], 16, 4, None, "test size").unwrap();
        assert_eq!(all.len(), 16);
    }

    #[test]
    fn seek_read_skips_forward(){
        let bytes: Vec<u8> = (0..64).collect();
        let mut read = Tracking::new(Cursor::new(bytes));
        read.seek_read_to(5).unwrap();
        assert_eq!(u8::read(&mut read).unwrap(), 5);
        read.seek_read_to(40).unwrap();
        assert_eq!(u8::read(&mut read).unwrap(), 40);
        read.seek_read_to(2).unwrap();
        assert_eq!(u8::read(&mut read).unwrap(), 2);
        assert_eq!(read.stream_len().unwrap(), 64);
        assert_eq!(u8::read(&mut read).unwrap(), 3);
    }
}
