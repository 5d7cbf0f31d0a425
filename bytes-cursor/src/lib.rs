//! essential parsing of bytes
//!
//! a thin typed cursor over [bytes::Bytes], plus MySQL specific
//! encodings in [crate::my] and async counterparts in [crate::future]
pub mod error;
pub mod future;
pub mod my;

use bytes::{Buf, BufMut, Bytes, BytesMut};
pub use error::*;

/// global empty byte array as place holder
pub const EMPTY_BYTE_ARRAY: [u8; 0] = [];

pub trait ReadFromBytes
where
    Self: Sized,
{
    fn read_from(input: &mut Bytes) -> Result<Self>;
}

pub trait ReadFromBytesWithContext<'c>
where
    Self: Sized,
{
    type Context: 'c;

    fn read_with_ctx(input: &mut Bytes, ctx: Self::Context) -> Result<Self>;
}

pub trait WriteToBytes {
    fn write_to(self, out: &mut BytesMut) -> Result<usize>;
}

impl WriteToBytes for &[u8] {
    fn write_to(self, out: &mut BytesMut) -> Result<usize> {
        let len = self.len();
        out.put(self);
        Ok(len)
    }
}

impl WriteToBytes for Bytes {
    fn write_to(self, out: &mut BytesMut) -> Result<usize> {
        let len = self.remaining();
        out.put(self);
        Ok(len)
    }
}

pub trait WriteToBytesWithContext<'c> {
    type Context: 'c;

    fn write_with_ctx(self, out: &mut BytesMut, ctx: Self::Context) -> Result<usize>;
}

macro_rules! check_remaining {
    ($input:expr, $n:expr) => {
        if $input.remaining() < $n {
            return Err(Error::InputIncomplete(
                Bytes::new(),
                Needed::Size($n - $input.remaining()),
            ));
        }
    };
}

pub trait ReadBytesExt {
    fn read_u8(&mut self) -> Result<u8>;

    fn read_i8(&mut self) -> Result<i8> {
        self.read_u8().map(|n| n as i8)
    }

    /// inspect the next byte without consuming it
    fn peek_u8(&self) -> Result<u8>;

    fn read_le_u16(&mut self) -> Result<u16>;

    fn read_le_i16(&mut self) -> Result<i16> {
        self.read_le_u16().map(|n| n as i16)
    }

    fn read_le_u24(&mut self) -> Result<u32>;

    fn read_le_i24(&mut self) -> Result<i32> {
        self.read_le_u24().map(|n| {
            if n & 0x80_0000_u32 != 0 {
                (n | 0xff00_0000_u32) as i32
            } else {
                n as i32
            }
        })
    }

    fn read_le_u32(&mut self) -> Result<u32>;

    fn read_le_i32(&mut self) -> Result<i32> {
        self.read_le_u32().map(|n| n as i32)
    }

    fn read_le_u48(&mut self) -> Result<u64>;

    fn read_le_i48(&mut self) -> Result<i64> {
        self.read_le_u48().map(|n| {
            if n & 0x8000_0000_0000_u64 != 0 {
                (n | 0xffff_0000_0000_0000_u64) as i64
            } else {
                n as i64
            }
        })
    }

    fn read_le_u64(&mut self) -> Result<u64>;

    fn read_le_i64(&mut self) -> Result<i64> {
        self.read_le_u64().map(|n| n as i64)
    }

    fn read_le_f32(&mut self) -> Result<f32>;

    fn read_le_f64(&mut self) -> Result<f64>;

    fn read_be_u16(&mut self) -> Result<u16>;

    fn read_be_u24(&mut self) -> Result<u32>;

    fn read_be_u32(&mut self) -> Result<u32>;

    fn read_be_u40(&mut self) -> Result<u64>;

    fn read_len(&mut self, len: usize) -> Result<Bytes>;

    fn read_until(&mut self, b: u8, inclusive: bool) -> Result<Bytes>;
}

impl ReadBytesExt for Bytes {
    fn read_u8(&mut self) -> Result<u8> {
        check_remaining!(self, 1);
        Ok(self.get_u8())
    }

    fn peek_u8(&self) -> Result<u8> {
        check_remaining!(self, 1);
        Ok(self.chunk()[0])
    }

    fn read_le_u16(&mut self) -> Result<u16> {
        check_remaining!(self, 2);
        Ok(self.get_u16_le())
    }

    fn read_le_u24(&mut self) -> Result<u32> {
        check_remaining!(self, 3);
        let bs = self.chunk();
        let r = bs[0] as u32 + ((bs[1] as u32) << 8) + ((bs[2] as u32) << 16);
        self.advance(3);
        Ok(r)
    }

    fn read_le_u32(&mut self) -> Result<u32> {
        check_remaining!(self, 4);
        Ok(self.get_u32_le())
    }

    fn read_le_u48(&mut self) -> Result<u64> {
        check_remaining!(self, 6);
        let bs = self.chunk();
        let r = bs[0] as u64
            + ((bs[1] as u64) << 8)
            + ((bs[2] as u64) << 16)
            + ((bs[3] as u64) << 24)
            + ((bs[4] as u64) << 32)
            + ((bs[5] as u64) << 40);
        self.advance(6);
        Ok(r)
    }

    fn read_le_u64(&mut self) -> Result<u64> {
        check_remaining!(self, 8);
        Ok(self.get_u64_le())
    }

    fn read_le_f32(&mut self) -> Result<f32> {
        check_remaining!(self, 4);
        Ok(self.get_f32_le())
    }

    fn read_le_f64(&mut self) -> Result<f64> {
        check_remaining!(self, 8);
        Ok(self.get_f64_le())
    }

    fn read_be_u16(&mut self) -> Result<u16> {
        check_remaining!(self, 2);
        Ok(self.get_u16())
    }

    fn read_be_u24(&mut self) -> Result<u32> {
        check_remaining!(self, 3);
        let bs = self.chunk();
        let r = ((bs[0] as u32) << 16) + ((bs[1] as u32) << 8) + bs[2] as u32;
        self.advance(3);
        Ok(r)
    }

    fn read_be_u32(&mut self) -> Result<u32> {
        check_remaining!(self, 4);
        Ok(self.get_u32())
    }

    fn read_be_u40(&mut self) -> Result<u64> {
        check_remaining!(self, 5);
        let bs = self.chunk();
        let r = ((bs[0] as u64) << 32)
            + ((bs[1] as u64) << 24)
            + ((bs[2] as u64) << 16)
            + ((bs[3] as u64) << 8)
            + bs[4] as u64;
        self.advance(5);
        Ok(r)
    }

    fn read_len(&mut self, len: usize) -> Result<Bytes> {
        check_remaining!(self, len);
        Ok(self.split_to(len))
    }

    fn read_until(&mut self, b: u8, inclusive: bool) -> Result<Bytes> {
        if let Some(pos) = self.chunk().iter().position(|&x| x == b) {
            let bs = if inclusive {
                self.split_to(pos + 1)
            } else {
                let bs = self.split_to(pos);
                self.advance(1);
                bs
            };
            return Ok(bs);
        }
        Err(Error::InputIncomplete(Bytes::new(), Needed::Unknown))
    }
}

pub trait WriteBytesExt {
    fn write_u8(&mut self, n: u8) -> Result<usize>;

    fn write_i8(&mut self, n: i8) -> Result<usize>;

    fn write_le_u16(&mut self, n: u16) -> Result<usize>;

    fn write_le_u24(&mut self, n: u32) -> Result<usize>;

    fn write_le_u32(&mut self, n: u32) -> Result<usize>;

    fn write_le_u48(&mut self, n: u64) -> Result<usize>;

    fn write_le_u64(&mut self, n: u64) -> Result<usize>;

    fn write_le_f32(&mut self, n: f32) -> Result<usize>;

    fn write_le_f64(&mut self, n: f64) -> Result<usize>;

    fn write_be_u16(&mut self, n: u16) -> Result<usize>;

    fn write_be_u24(&mut self, n: u32) -> Result<usize>;

    fn write_be_u32(&mut self, n: u32) -> Result<usize>;

    fn write_be_u40(&mut self, n: u64) -> Result<usize>;

    fn write_bytes<T>(&mut self, val: T) -> Result<usize>
    where
        T: WriteToBytes;
}

impl WriteBytesExt for BytesMut {
    fn write_u8(&mut self, n: u8) -> Result<usize> {
        self.put_u8(n);
        Ok(1)
    }

    fn write_i8(&mut self, n: i8) -> Result<usize> {
        self.put_i8(n);
        Ok(1)
    }

    fn write_le_u16(&mut self, n: u16) -> Result<usize> {
        self.put_u16_le(n);
        Ok(2)
    }

    fn write_le_u24(&mut self, n: u32) -> Result<usize> {
        self.put_slice(&n.to_le_bytes()[..3]);
        Ok(3)
    }

    fn write_le_u32(&mut self, n: u32) -> Result<usize> {
        self.put_u32_le(n);
        Ok(4)
    }

    fn write_le_u48(&mut self, n: u64) -> Result<usize> {
        self.put_slice(&n.to_le_bytes()[..6]);
        Ok(6)
    }

    fn write_le_u64(&mut self, n: u64) -> Result<usize> {
        self.put_u64_le(n);
        Ok(8)
    }

    fn write_le_f32(&mut self, n: f32) -> Result<usize> {
        self.put_f32_le(n);
        Ok(4)
    }

    fn write_le_f64(&mut self, n: f64) -> Result<usize> {
        self.put_f64_le(n);
        Ok(8)
    }

    fn write_be_u16(&mut self, n: u16) -> Result<usize> {
        self.put_u16(n);
        Ok(2)
    }

    fn write_be_u24(&mut self, n: u32) -> Result<usize> {
        self.put_slice(&n.to_be_bytes()[1..]);
        Ok(3)
    }

    fn write_be_u32(&mut self, n: u32) -> Result<usize> {
        self.put_u32(n);
        Ok(4)
    }

    fn write_be_u40(&mut self, n: u64) -> Result<usize> {
        self.put_slice(&n.to_be_bytes()[3..]);
        Ok(5)
    }

    fn write_bytes<T>(&mut self, val: T) -> Result<usize>
    where
        T: WriteToBytes,
    {
        val.write_to(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8() -> Result<()> {
        let mut input = Bytes::from_static(&[1u8]);
        assert_eq!(1, input.peek_u8()?);
        let success = input.read_u8()?;
        assert_eq!(1, success);
        let fail = input.read_u8();
        assert!(fail.is_err());
        let mut v = BytesMut::new();
        v.write_u8(success)?;
        assert_eq!(&[1u8][..], &v[..]);
        Ok(())
    }

    #[test]
    fn test_i8() -> Result<()> {
        let mut input = Bytes::from_static(&[-20i8 as u8]);
        let success = input.read_i8()?;
        assert_eq!(-20, success);
        Ok(())
    }

    #[test]
    fn test_le_u16() -> Result<()> {
        let mut input = Bytes::from_static(&[1u8, 2, 3]);
        let success = input.read_le_u16()?;
        assert_eq!(1 + (2u16 << 8), success);
        let fail = input.read_le_u16();
        assert!(fail.is_err());
        let mut v = BytesMut::new();
        v.write_le_u16(success)?;
        assert_eq!(&[1u8, 2][..], &v[..]);
        Ok(())
    }

    #[test]
    fn test_le_u24() -> Result<()> {
        let mut input = Bytes::from_static(&[1u8, 2, 3, 4]);
        let success = input.read_le_u24()?;
        assert_eq!(1u32 + (2u32 << 8) + (3u32 << 16), success);
        let fail = input.read_le_u24();
        assert!(fail.is_err());
        let mut v = BytesMut::new();
        v.write_le_u24(success)?;
        assert_eq!(&[1u8, 2, 3][..], &v[..]);
        Ok(())
    }

    #[test]
    fn test_le_i24() -> Result<()> {
        let orig = (-200000i32 as u32).to_le_bytes();
        let mut input = Bytes::copy_from_slice(&orig[..3]);
        let success = input.read_le_i24()?;
        assert_eq!(-200000, success);
        Ok(())
    }

    #[test]
    fn test_le_u32() -> Result<()> {
        let mut input = Bytes::from_static(&[1u8, 2, 3, 4, 5]);
        let success = input.read_le_u32()?;
        assert_eq!(1u32 + (2u32 << 8) + (3u32 << 16) + (4u32 << 24), success);
        let fail = input.read_le_u32();
        assert!(fail.is_err());
        let mut v = BytesMut::new();
        v.write_le_u32(success)?;
        assert_eq!(&[1u8, 2, 3, 4][..], &v[..]);
        Ok(())
    }

    #[test]
    fn test_le_u48() -> Result<()> {
        let mut input = Bytes::from_static(&[1u8, 2, 3, 4, 1, 2, 3, 4]);
        let success = input.read_le_u48()?;
        assert_eq!(
            1u64 + (2u64 << 8) + (3u64 << 16) + (4u64 << 24) + (1u64 << 32) + (2u64 << 40),
            success
        );
        let mut v = BytesMut::new();
        v.write_le_u48(success)?;
        assert_eq!(&[1u8, 2, 3, 4, 1, 2][..], &v[..]);
        Ok(())
    }

    #[test]
    fn test_le_i48() -> Result<()> {
        let orig = (-2000000000i64 as u64).to_le_bytes();
        let mut input = Bytes::copy_from_slice(&orig[..6]);
        let success = input.read_le_i48()?;
        assert_eq!(-2000000000i64, success);
        Ok(())
    }

    #[test]
    fn test_le_u64() -> Result<()> {
        let mut input = Bytes::from_static(&[1u8, 2, 3, 4, 1, 2, 3, 4, 1, 2]);
        let success = input.read_le_u64()?;
        assert_eq!(
            1u64 + (2u64 << 8)
                + (3u64 << 16)
                + (4u64 << 24)
                + (1u64 << 32)
                + (2u64 << 40)
                + (3u64 << 48)
                + (4u64 << 56),
            success
        );
        let mut v = BytesMut::new();
        v.write_le_u64(success)?;
        assert_eq!(&[1u8, 2, 3, 4, 1, 2, 3, 4][..], &v[..]);
        Ok(())
    }

    #[test]
    fn test_be_reads() -> Result<()> {
        let mut input = Bytes::from_static(&[0x01, 0x02]);
        assert_eq!(0x0102, input.read_be_u16()?);
        let mut input = Bytes::from_static(&[0x01, 0x02, 0x03]);
        assert_eq!(0x010203, input.read_be_u24()?);
        let mut input = Bytes::from_static(&[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(0x01020304, input.read_be_u32()?);
        let mut input = Bytes::from_static(&[0x01, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(0x0102030405, input.read_be_u40()?);
        Ok(())
    }

    #[test]
    fn test_be_writes() -> Result<()> {
        let mut v = BytesMut::new();
        v.write_be_u24(0x010203)?;
        assert_eq!(&[1u8, 2, 3][..], &v[..]);
        let mut v = BytesMut::new();
        v.write_be_u40(0x0102030405)?;
        assert_eq!(&[1u8, 2, 3, 4, 5][..], &v[..]);
        Ok(())
    }

    #[test]
    fn test_floats() -> Result<()> {
        let mut input = Bytes::copy_from_slice(&1.25f32.to_le_bytes());
        assert_eq!(1.25f32, input.read_le_f32()?);
        let mut input = Bytes::copy_from_slice(&(-2.5f64).to_le_bytes());
        assert_eq!(-2.5f64, input.read_le_f64()?);
        Ok(())
    }

    #[test]
    fn test_read_len() -> Result<()> {
        let mut input = Bytes::from_static(&[1u8, 2, 3, 4, 5]);
        let bs = input.read_len(3)?;
        assert_eq!(&[1u8, 2, 3][..], &bs[..]);
        let fail = input.read_len(3);
        assert!(fail.is_err());
        Ok(())
    }

    #[test]
    fn test_read_until() -> Result<()> {
        let mut input = Bytes::from_static(b"abc\x00def");
        let bs = input.read_until(0, false)?;
        assert_eq!(&b"abc"[..], &bs[..]);
        assert_eq!(&b"def"[..], &input[..]);
        let fail = input.read_until(0, false);
        assert!(fail.is_err());
        Ok(())
    }
}
