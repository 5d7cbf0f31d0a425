//! MySQL specific encodings: length-encoded integers and strings
use crate::error::{Error, Result};
use crate::{ReadBytesExt, WriteBytesExt, WriteToBytes};
use bytes::{Bytes, BytesMut};

/// read MySQL length encoded types
pub trait ReadMyEnc {
    fn read_len_enc_int(&mut self) -> Result<LenEncInt>;

    fn read_len_enc_str(&mut self) -> Result<LenEncStr>;
}

impl ReadMyEnc for Bytes {
    fn read_len_enc_int(&mut self) -> Result<LenEncInt> {
        let len = self.read_u8()?;
        let lei = match len {
            0xfb => LenEncInt::Null,
            0xfc => LenEncInt::Len3(self.read_le_u16()?),
            0xfd => LenEncInt::Len4(self.read_le_u24()?),
            0xfe => LenEncInt::Len9(self.read_le_u64()?),
            0xff => LenEncInt::Err,
            _ => LenEncInt::Len1(len),
        };
        Ok(lei)
    }

    fn read_len_enc_str(&mut self) -> Result<LenEncStr> {
        let lei = self.read_len_enc_int()?;
        let les = match lei {
            LenEncInt::Null => LenEncStr::Null,
            LenEncInt::Err => LenEncStr::Err,
            _ => {
                // checked above so safe to unwrap
                let len = lei.to_u64().unwrap() as usize;
                LenEncStr::Bytes(self.read_len(len)?)
            }
        };
        Ok(les)
    }
}

/// MySQL length encoded integer
#[derive(Debug, Clone, PartialEq)]
pub enum LenEncInt {
    Null,
    Err,
    Len1(u8),
    Len3(u16),
    Len4(u32),
    Len9(u64),
}

impl LenEncInt {
    pub fn to_u64(&self) -> Option<u64> {
        match self {
            LenEncInt::Len1(n) => Some(*n as u64),
            LenEncInt::Len3(n) => Some(*n as u64),
            LenEncInt::Len4(n) => Some(*n as u64),
            LenEncInt::Len9(n) => Some(*n),
            _ => None,
        }
    }

    pub fn to_u32(&self) -> Option<u32> {
        self.to_u64().map(|n| n as u32)
    }
}

/// convert u64 to len-enc-int
impl From<u64> for LenEncInt {
    fn from(src: u64) -> Self {
        if src <= 0xfa {
            LenEncInt::Len1(src as u8)
        } else if src <= 0xffff {
            LenEncInt::Len3(src as u16)
        } else if src <= 0xff_ffff {
            LenEncInt::Len4(src as u32)
        } else {
            LenEncInt::Len9(src)
        }
    }
}

impl From<u32> for LenEncInt {
    fn from(src: u32) -> Self {
        Self::from(src as u64)
    }
}

impl WriteToBytes for LenEncInt {
    fn write_to(self, out: &mut BytesMut) -> Result<usize> {
        let len = match self {
            LenEncInt::Null => out.write_u8(0xfb)?,
            LenEncInt::Err => out.write_u8(0xff)?,
            LenEncInt::Len1(n) => out.write_u8(n)?,
            LenEncInt::Len3(n) => out.write_u8(0xfc)? + out.write_le_u16(n)?,
            LenEncInt::Len4(n) => out.write_u8(0xfd)? + out.write_le_u24(n)?,
            LenEncInt::Len9(n) => out.write_u8(0xfe)? + out.write_le_u64(n)?,
        };
        Ok(len)
    }
}

/// MySQL length encoded string
#[derive(Debug, Clone, PartialEq)]
pub enum LenEncStr {
    Null,
    Err,
    Bytes(Bytes),
}

impl LenEncStr {
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            LenEncStr::Bytes(bs) => Some(bs),
            _ => None,
        }
    }

    pub fn into_string(self) -> Result<String> {
        match self {
            LenEncStr::Bytes(bs) => Ok(String::from_utf8(Vec::from(&bs[..]))?),
            _ => Err(Error::ConstraintError(
                "expected non-null string".to_owned(),
            )),
        }
    }
}

impl WriteToBytes for LenEncStr {
    fn write_to(self, out: &mut BytesMut) -> Result<usize> {
        let len = match self {
            LenEncStr::Null => out.write_u8(0xfb)?,
            LenEncStr::Err => out.write_u8(0xff)?,
            LenEncStr::Bytes(bs) => {
                let lei = LenEncInt::from(bs.len() as u64);
                lei.write_to(out)? + out.write_bytes(bs)?
            }
        };
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_enc_int_1() {
        let mut input = Bytes::from_static(&[0xfa_u8]);
        let lei = input.read_len_enc_int().unwrap();
        assert_eq!(LenEncInt::Len1(0xfa), lei);
        let mut encoded = BytesMut::new();
        lei.write_to(&mut encoded).unwrap();
        assert_eq!(&[0xfa_u8][..], &encoded[..]);
    }

    #[test]
    fn test_len_enc_int_3() {
        let mut input = Bytes::from_static(&[0xfc_u8, 0x34, 0x12]);
        let lei = input.read_len_enc_int().unwrap();
        assert_eq!(LenEncInt::Len3(0x1234), lei);
        let mut encoded = BytesMut::new();
        lei.write_to(&mut encoded).unwrap();
        assert_eq!(&[0xfc_u8, 0x34, 0x12][..], &encoded[..]);
    }

    #[test]
    fn test_len_enc_int_4() {
        let mut input = Bytes::from_static(&[0xfd_u8, 0x03, 0x02, 0x01]);
        let lei = input.read_len_enc_int().unwrap();
        assert_eq!(LenEncInt::Len4(0x010203), lei);
        let mut encoded = BytesMut::new();
        lei.write_to(&mut encoded).unwrap();
        assert_eq!(&[0xfd_u8, 0x03, 0x02, 0x01][..], &encoded[..]);
    }

    #[test]
    fn test_len_enc_int_9() {
        let mut input =
            Bytes::from_static(&[0xfe_u8, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        let lei = input.read_len_enc_int().unwrap();
        assert_eq!(LenEncInt::Len9(0x0807060504030201), lei);
        let mut encoded = BytesMut::new();
        lei.write_to(&mut encoded).unwrap();
        assert_eq!(
            &[0xfe_u8, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08][..],
            &encoded[..]
        );
    }

    #[test]
    fn test_len_enc_int_null_err() {
        let mut input = Bytes::from_static(&[0xfb_u8]);
        assert_eq!(LenEncInt::Null, input.read_len_enc_int().unwrap());
        let mut input = Bytes::from_static(&[0xff_u8]);
        assert_eq!(LenEncInt::Err, input.read_len_enc_int().unwrap());
    }

    #[test]
    fn test_len_enc_int_from() {
        assert_eq!(LenEncInt::Len1(0xfa), LenEncInt::from(0xfa_u64));
        assert_eq!(LenEncInt::Len3(0xfb), LenEncInt::from(0xfb_u64));
        assert_eq!(LenEncInt::Len4(0x01_0000), LenEncInt::from(0x01_0000_u64));
        assert_eq!(
            LenEncInt::Len9(0x0100_0000),
            LenEncInt::from(0x0100_0000_u64)
        );
    }

    #[test]
    fn test_len_enc_str() {
        let mut input = Bytes::from_static(b"\x05hello");
        let les = input.read_len_enc_str().unwrap();
        assert_eq!(LenEncStr::Bytes(Bytes::from_static(b"hello")), les);
        let mut encoded = BytesMut::new();
        les.write_to(&mut encoded).unwrap();
        assert_eq!(&b"\x05hello"[..], &encoded[..]);
    }

    #[test]
    fn test_len_enc_str_incomplete() {
        let mut input = Bytes::from_static(b"\x05hel");
        let fail = input.read_len_enc_str();
        assert!(fail.is_err());
    }
}
