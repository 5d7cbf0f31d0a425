//! decoding of the packed decimal wire format shared by DECIMAL and NEWDECIMAL
//!
//! reference: https://github.com/mysql/mysql-server/blob/5.7/strings/decimal.c
use bytes::Bytes;
use bytes_cursor::error::{Error, Result};
use bytes_cursor::ReadBytesExt;
use std::fmt;

const DIG_PER_DEC1: u8 = 9;
const DIG_TO_BYTES: [usize; 10] = [0, 1, 1, 2, 2, 3, 3, 4, 4, 4];

/// decimal number decoded from its fixed-size packed representation
///
/// digits are stored in base-1_000_000_000 fragments, an optional
/// shorter fragment at the head of the integral part and at the tail
/// of the fractional part
#[derive(Debug, Clone, PartialEq)]
pub struct MyDecimal {
    // number of decimal digits before the point
    pub intg: u8,
    // number of decimal digits after the point
    pub frac: u8,
    pub negative: bool,
    int_buf: Vec<u32>,
    frac_buf: Vec<u32>,
}

/// byte length of the packed form for given precision and scale
pub fn binary_size(precision: u8, frac: u8) -> usize {
    let intg = precision - frac;
    let intg0 = (intg / DIG_PER_DEC1) as usize;
    let frac0 = (frac / DIG_PER_DEC1) as usize;
    let intg0x = (intg % DIG_PER_DEC1) as usize;
    let frac0x = (frac % DIG_PER_DEC1) as usize;
    intg0 * 4 + DIG_TO_BYTES[intg0x] + frac0 * 4 + DIG_TO_BYTES[frac0x]
}

impl MyDecimal {
    /// decode the packed form, consuming exactly
    /// [binary_size] bytes from the input
    pub fn read_from(input: &mut Bytes, precision: u8, frac: u8) -> Result<Self> {
        let intg = precision - frac;
        let intg0 = intg / DIG_PER_DEC1;
        let frac0 = frac / DIG_PER_DEC1;
        let intg0x = intg % DIG_PER_DEC1;
        let frac0x = frac % DIG_PER_DEC1;
        let bin_size = binary_size(precision, frac);
        let raw = input.read_len(bin_size)?;
        let mut raw = Vec::from(&raw[..]);
        if raw.is_empty() {
            return Ok(Self {
                intg,
                frac,
                negative: false,
                int_buf: vec![],
                frac_buf: vec![],
            });
        }
        // positive numbers are stored with the sign bit set,
        // negative numbers additionally with all bytes inverted
        let negative = raw[0] & 0x80 == 0;
        raw[0] ^= 0x80;
        if negative {
            for b in raw.iter_mut() {
                *b = !*b;
            }
        }
        let mut raw = Bytes::from(raw);
        let mut int_buf = Vec::with_capacity(intg0 as usize + 1);
        if intg0x > 0 {
            int_buf.push(read_fragment(&mut raw, DIG_TO_BYTES[intg0x as usize])?);
        }
        for _ in 0..intg0 {
            int_buf.push(read_fragment(&mut raw, 4)?);
        }
        let mut frac_buf = Vec::with_capacity(frac0 as usize + 1);
        for _ in 0..frac0 {
            frac_buf.push(read_fragment(&mut raw, 4)?);
        }
        if frac0x > 0 {
            frac_buf.push(read_fragment(&mut raw, DIG_TO_BYTES[frac0x as usize])?);
        }
        Ok(Self {
            intg,
            frac,
            negative,
            int_buf,
            frac_buf,
        })
    }

    fn is_zero(&self) -> bool {
        self.int_buf.iter().all(|n| *n == 0) && self.frac_buf.iter().all(|n| *n == 0)
    }

    /// arbitrary precision view of the decoded value
    pub fn to_bigdecimal(&self) -> bigdecimal::BigDecimal {
        use std::str::FromStr;
        // the canonical rendering is always a valid decimal literal
        bigdecimal::BigDecimal::from_str(&self.to_string())
            .unwrap_or_else(|_| bigdecimal::BigDecimal::default())
    }
}

fn read_fragment(input: &mut Bytes, len: usize) -> Result<u32> {
    let mut n = 0u32;
    for _ in 0..len {
        n = (n << 8) + input.read_u8()? as u32;
    }
    if len == 4 && n >= 1_000_000_000 {
        return Err(Error::ConstraintError(format!(
            "invalid decimal fragment: {}",
            n
        )));
    }
    Ok(n)
}

/// renders with canonical scale: always `frac` digits after the point
impl fmt::Display for MyDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative && !self.is_zero() {
            write!(f, "-")?;
        }
        // integral part: strip leading zeros across fragments
        let mut leading = true;
        for frag in &self.int_buf {
            if leading {
                if *frag != 0 {
                    write!(f, "{}", frag)?;
                    leading = false;
                }
            } else {
                write!(f, "{:09}", frag)?;
            }
        }
        if leading {
            write!(f, "0")?;
        }
        if self.frac == 0 {
            return Ok(());
        }
        write!(f, ".")?;
        let frac0 = self.frac / DIG_PER_DEC1;
        let frac0x = self.frac % DIG_PER_DEC1;
        for (i, frag) in self.frac_buf.iter().enumerate() {
            if i < frac0 as usize {
                write!(f, "{:09}", frag)?;
            } else {
                // tail fragment carries only frac0x digits
                write!(f, "{:0width$}", frag, width = frac0x as usize)?;
            }
        }
        // absent fragments mean zero digits
        let printed = self.frac_buf.len() as u8 * DIG_PER_DEC1;
        if self.frac_buf.is_empty() {
            for _ in 0..self.frac {
                write!(f, "0")?;
            }
        } else if printed < self.frac && frac0x == 0 {
            for _ in 0..(self.frac - printed) {
                write!(f, "0")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    #[test]
    fn test_binary_size() {
        assert_eq!(6, binary_size(10, 3));
        assert_eq!(4, binary_size(9, 0));
        assert_eq!(8, binary_size(14, 4));
        assert_eq!(0, binary_size(0, 0));
    }

    #[test]
    fn test_decimal_positive() {
        // 1234567.890 with precision 10 scale 3
        let mut input = Bytes::from(hex::decode("8012d687037a").unwrap());
        let d = MyDecimal::read_from(&mut input, 10, 3).unwrap();
        assert!(!d.negative);
        assert_eq!("1234567.890", d.to_string());
    }

    #[test]
    fn test_decimal_negative() {
        // -1234567.890: positive form with every byte inverted
        let mut input = Bytes::from(hex::decode("7fed2978fc85").unwrap());
        let d = MyDecimal::read_from(&mut input, 10, 3).unwrap();
        assert!(d.negative);
        assert_eq!("-1234567.890", d.to_string());
    }

    #[test]
    fn test_decimal_zero() {
        let mut input = Bytes::from_static(&[0x80, 0x00, 0x00, 0x00, 0x00, 0x00]);
        let d = MyDecimal::read_from(&mut input, 10, 3).unwrap();
        assert_eq!("0.000", d.to_string());
    }

    #[test]
    fn test_decimal_no_scale() {
        // 42 with precision 9 scale 0
        let mut input = Bytes::copy_from_slice(&{
            let mut bs = 42u32.to_be_bytes();
            bs[0] |= 0x80;
            bs
        });
        let d = MyDecimal::read_from(&mut input, 9, 0).unwrap();
        assert_eq!("42", d.to_string());
    }

    #[test]
    fn test_decimal_multi_fragment() {
        // 12.345678901 with precision 13 scale 11:
        // intg=2 (1 fragment byte), frac fragments 9 + 2 digits
        let mut bs = vec![0x80 | 0x00];
        bs[0] |= 12u8;
        bs.extend_from_slice(&345678901u32.to_be_bytes());
        bs.push(0); // tail fragment "01" -> wait, computed below
        // recompute tail: frac0x=2 digits -> 1 byte, value 1
        *bs.last_mut().unwrap() = 1;
        let mut input = Bytes::from(bs);
        let d = MyDecimal::read_from(&mut input, 13, 11).unwrap();
        assert_eq!("12.34567890101", d.to_string());
    }

    #[test]
    fn test_decimal_to_bigdecimal() {
        let mut input = Bytes::from(hex::decode("8012d687037a").unwrap());
        let d = MyDecimal::read_from(&mut input, 10, 3).unwrap();
        assert_eq!(
            BigDecimal::from_str("1234567.890").unwrap(),
            d.to_bigdecimal()
        );
    }
}
