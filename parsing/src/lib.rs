pub use parsing_macro::*;

use thiserror::Error;

pub trait Endianess {}

pub struct LittleEndian;
impl Endianess for LittleEndian {}

pub type LE = LittleEndian;

pub struct BigEndian;
impl Endianess for BigEndian {}

pub type BE = BigEndian;

#[derive(Debug, PartialEq, Error)]
pub enum Error {
    #[error("not enough bytes left in the buffer")]
    SliceTooSmall,
    #[error("magic number did not match")]
    MagicCheckFailed,
    #[error("invalid utf-8 string: {0}")]
    InterpretStrFailed(std::str::Utf8Error),
    #[error("no enum variant matches the type value")]
    EnumTypeValueMatchFailed,
}

pub type Result<T> = std::result::Result<T, Error>;

pub trait ReadBytes<'a> {
    fn read_bytes(&mut self, num: usize) -> Result<&'a [u8]>;
    fn read_rest(&mut self) -> &'a [u8];
    fn read_type<E: Endianess, T: Parse<'a, E>>(&mut self) -> Result<T>;
    fn skip(&mut self, num: usize) -> Result<()> {
        self.read_bytes(num).map(|_| ())
    }
    fn read_type_be<T: Parse<'a, BigEndian>>(&mut self) -> Result<T> {
        self.read_type::<BigEndian, T>()
    }
    fn read_type_le<T: Parse<'a, LittleEndian>>(&mut self) -> Result<T> {
        self.read_type::<LittleEndian, T>()
    }
}

impl<'a> ReadBytes<'a> for &'a [u8] {
    fn read_bytes(&mut self, num: usize) -> Result<&'a [u8]> {
        // split_at_checked is unstable
        if num <= self.len() {
            let (front, back) = self.split_at(num);
            *self = back;
            Ok(front)
        } else {
            Err(Error::SliceTooSmall)
        }
    }

    fn read_rest(&mut self) -> &'a [u8] {
        let rest = *self;
        *self = &[];
        rest
    }

    fn read_type<E: Endianess, T: Parse<'a, E>>(&mut self) -> Result<T> {
        T::parse(self)
    }
}

/// Forward-only reader over a complete buffer that remembers its absolute
/// offset from the start of that buffer.
///
/// Cursors are `Copy`: saving a position is taking a copy, restoring it is
/// assigning the copy back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Absolute offset of the next byte to be read.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl<'a> ReadBytes<'a> for Cursor<'a> {
    fn read_bytes(&mut self, num: usize) -> Result<&'a [u8]> {
        if num <= self.remaining() {
            let data = self.data;
            let bytes = &data[self.pos..self.pos + num];
            self.pos += num;
            Ok(bytes)
        } else {
            Err(Error::SliceTooSmall)
        }
    }

    fn read_rest(&mut self) -> &'a [u8] {
        let data = self.data;
        let rest = &data[self.pos..];
        self.pos = data.len();
        rest
    }

    fn read_type<E: Endianess, T: Parse<'a, E>>(&mut self) -> Result<T> {
        T::parse(self)
    }
}

pub trait Parse<'a, E: Endianess>: Sized {
    fn parse(input: &mut impl ReadBytes<'a>) -> Result<Self>;
}

macro_rules! impl_primitive_parse {
    ($typ: ty) => {
        impl<'a> Parse<'a, LittleEndian> for $typ {
            fn parse(input: &mut impl ReadBytes<'a>) -> Result<Self> {
                let bytes = input.read_bytes(std::mem::size_of::<$typ>())?;
                let mut buf = [0_u8; std::mem::size_of::<$typ>()];
                buf.copy_from_slice(bytes);
                Ok(<$typ>::from_le_bytes(buf))
            }
        }

        impl<'a> Parse<'a, BigEndian> for $typ {
            fn parse(input: &mut impl ReadBytes<'a>) -> Result<Self> {
                let bytes = input.read_bytes(std::mem::size_of::<$typ>())?;
                let mut buf = [0_u8; std::mem::size_of::<$typ>()];
                buf.copy_from_slice(bytes);
                Ok(<$typ>::from_be_bytes(buf))
            }
        }

        impl<'a, E: Endianess, const N: usize> Parse<'a, E> for [$typ; N]
        where
            $typ: Parse<'a, E>,
        {
            fn parse(input: &mut impl ReadBytes<'a>) -> Result<Self> {
                let mut out = [Default::default(); N];
                for i in out.iter_mut() {
                    *i = input.read_type::<E, $typ>()?;
                }
                Ok(out)
            }
        }
    };
}

impl_primitive_parse!(u8);
impl_primitive_parse!(u16);
impl_primitive_parse!(u32);
impl_primitive_parse!(u64);
impl_primitive_parse!(u128);

impl_primitive_parse!(i8);
impl_primitive_parse!(i16);
impl_primitive_parse!(i32);
impl_primitive_parse!(i64);
impl_primitive_parse!(i128);

impl_primitive_parse!(f32);
impl_primitive_parse!(f64);

#[cfg(test)]
mod test {
    use crate::{Cursor, Error, ReadBytes, LE};

    #[test]
    fn test() {
        let bytes = [0_u8; 8];
        let mut b = bytes.as_slice();
        let num: u64 = b.read_type_le().unwrap();
        assert_eq!(num, 0);
    }

    #[test]
    fn test2() {
        let bytes = [0_u8; 8];
        let mut b = bytes.as_slice();
        let num = b.read_type::<LE, u64>().unwrap();
        assert_eq!(num, 0);
    }

    #[test]
    fn cursor_tracks_position() {
        let bytes = [0x34, 0x12, 0xff, 0xff, 0xff, 0x7f, 9];
        let mut c = Cursor::new(&bytes);
        assert_eq!(c.read_type_le::<u16>().unwrap(), 0x1234);
        assert_eq!(c.position(), 2);
        assert_eq!(c.read_type_le::<i32>().unwrap(), i32::MAX);
        assert_eq!(c.position(), 6);
        assert_eq!(c.remaining(), 1);
        assert_eq!(c.read_type_le::<u16>().unwrap_err(), Error::SliceTooSmall);
        // failed reads leave the cursor where it was
        assert_eq!(c.position(), 6);
    }

    #[test]
    fn cursor_copy_is_a_checkpoint() {
        let bytes = [1_u8, 2, 3, 4];
        let mut c = Cursor::new(&bytes);
        c.skip(1).unwrap();
        let saved = c;
        assert_eq!(c.read_bytes(2).unwrap(), &[2, 3]);
        c = saved;
        assert_eq!(c.position(), 1);
        assert_eq!(c.read_rest(), &[2, 3, 4]);
        assert_eq!(c.remaining(), 0);
    }
}
