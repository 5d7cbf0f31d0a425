//! decoding of mysql temporal column types
//!
//! the v2 forms (datetime2/timestamp2/time2) are big-endian packed
//! integers followed by packed fractional seconds
//!
//! reference: https://github.com/mysql/mysql-server/blob/5.7/sql-common/my_time.c
use bytes::Bytes;
use bytes_cursor::error::{Error as BError, Result as BResult};
use bytes_cursor::ReadBytesExt;
use chrono::{NaiveDate, NaiveDateTime};
use serde_derive::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MyDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl MyDate {
    /// 3-byte little-endian packed (year << 9) | (month << 5) | day
    pub fn from_binlog(input: &mut Bytes) -> BResult<Self> {
        let packed = input.read_le_u24()?;
        Ok(Self {
            year: (packed >> 9) as u16,
            month: ((packed >> 5) & 0x0f) as u8,
            day: (packed & 0x1f) as u8,
        })
    }

    pub fn to_naive(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)
    }
}

impl fmt::Display for MyDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MyTime {
    pub negative: bool,
    pub days: u32,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub micro_second: u32,
}

impl MyTime {
    /// read time2 with given fractional digits
    ///
    /// https://github.com/mysql/mysql-server/blob/5.7/sql-common/my_time.c#L1689
    pub fn from_binlog(input: &mut Bytes, frac: usize) -> BResult<Self> {
        let (packed, negative) = packed_from_time_binary(input, frac)?;
        Ok(Self::from_packed(packed, negative))
    }

    /// unpack the in-memory packed form also used by opaque JSON values
    pub(crate) fn from_packed(packed: u64, negative: bool) -> Self {
        let hms = (packed >> 24) & 0xff_ffff;
        let hours = ((hms >> 12) % (1 << 10)) as u32;
        let days = hours / 24;
        let hour = (hours - days * 24) as u8;
        let minute = ((hms >> 6) % (1 << 6)) as u8;
        let second = (hms % (1 << 6)) as u8;
        let micro_second = (packed & 0xff_ffff) as u32;
        Self {
            negative,
            days,
            hour,
            minute,
            second,
            micro_second,
        }
    }
}

impl fmt::Display for MyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.days * 24 + self.hour as u32,
            self.minute,
            self.second
        )?;
        if self.micro_second != 0 {
            write!(f, ".{:06}", self.micro_second)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MyDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub micro_second: u32,
}

impl MyDateTime {
    /// read datetime2 with given fractional digits
    ///
    /// https://github.com/mysql/mysql-server/blob/5.7/sql-common/my_time.c#L1820
    pub fn from_binlog(input: &mut Bytes, frac: usize) -> BResult<Self> {
        let packed = packed_from_datetime_binary(input, frac)?;
        Ok(Self::from_packed(packed))
    }

    /// unpack the in-memory packed form also used by opaque JSON values
    pub(crate) fn from_packed(packed: u64) -> Self {
        let ymdhms = (packed >> 24) & 0xff_ffff_ffff;
        let ymd = ymdhms >> 17;
        let ym = ymd >> 5;
        let hms = ymdhms % (1 << 17);
        let day = (ymd % (1 << 5)) as u8;
        let month = (ym % 13) as u8;
        let year = (ym / 13) as u16;
        let hour = (hms >> 12) as u8;
        let minute = ((hms >> 6) % (1 << 6)) as u8;
        let second = (hms % (1 << 6)) as u8;
        let micro_second = (packed & 0xff_ffff) as u32;
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            micro_second,
        }
    }

    /// read the pre-5.6.4 form: a little-endian u64 of decimal
    /// digits YYYYMMDDHHMMSS
    pub fn from_binlog_legacy(input: &mut Bytes) -> BResult<Self> {
        let packed = input.read_le_u64()?;
        let date = packed / 1_000_000;
        let time = packed % 1_000_000;
        Ok(Self {
            year: (date / 10_000) as u16,
            month: ((date / 100) % 100) as u8,
            day: (date % 100) as u8,
            hour: (time / 10_000) as u8,
            minute: ((time / 100) % 100) as u8,
            second: (time % 100) as u8,
            micro_second: 0,
        })
    }

    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)?
            .and_hms_micro_opt(
                self.hour as u32,
                self.minute as u32,
                self.second as u32,
                self.micro_second,
            )
    }
}

impl fmt::Display for MyDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )?;
        if self.micro_second != 0 {
            write!(f, ".{:06}", self.micro_second)?;
        }
        Ok(())
    }
}

/// timestamp2: big-endian epoch seconds plus packed fraction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MyTimestamp {
    pub seconds: u32,
    pub micro_second: u32,
}

impl MyTimestamp {
    pub fn from_binlog(input: &mut Bytes, frac: usize) -> BResult<Self> {
        let seconds = input.read_be_u32()?;
        let micro_second = read_binlog_frac(input, frac)?;
        Ok(Self {
            seconds,
            micro_second,
        })
    }

    /// pre-5.6.4 form: little-endian epoch seconds, no fraction
    pub fn from_binlog_legacy(input: &mut Bytes) -> BResult<Self> {
        Ok(Self {
            seconds: input.read_le_u32()?,
            micro_second: 0,
        })
    }
}

/// read `(frac + 1) / 2` fraction bytes, scaled to microseconds
pub(crate) fn read_binlog_frac(input: &mut Bytes, frac: usize) -> BResult<u32> {
    let micros = match frac {
        0 => 0,
        1 | 2 => input.read_u8()? as u32 * 10_000,
        3 | 4 => input.read_be_u16()? as u32 * 100,
        5 | 6 => input.read_be_u24()?,
        _ => {
            return Err(BError::ConstraintError(format!(
                "invalid fractional length: {}",
                frac
            )))
        }
    };
    Ok(micros)
}

/// convert binary representation of time2 to packed u64
///
/// consumes 3 to 6 bytes according to the fraction
fn packed_from_time_binary(input: &mut Bytes, frac: usize) -> BResult<(u64, bool)> {
    let hms = input.read_be_u24()?;
    let negative = hms & 0x80_0000 != 0x80_0000;
    let packed = match frac {
        0 => {
            let int_part = hms.overflowing_sub(0x80_0000).0;
            (int_part as u64) << 24
        }
        1 | 2 => {
            let int_part = hms.overflowing_sub(0x80_0000).0;
            let frac_part = input.read_u8()?;
            ((int_part as u64) << 24) + (frac_part as u64) * 10_000
        }
        3 | 4 => {
            let int_part = hms.overflowing_sub(0x80_0000).0;
            let frac_part = input.read_be_u16()?;
            ((int_part as u64) << 24) + (frac_part as u64) * 100
        }
        5 | 6 => {
            let frac_part = input.read_be_u24()?;
            let p = ((hms as u64) << 24) + (frac_part as u64);
            p.overflowing_sub(0x8000_0000_0000).0
        }
        _ => {
            return Err(BError::ConstraintError(format!(
                "invalid fractional length of time: {}",
                frac
            )))
        }
    };
    let packed = if negative {
        (-(packed as i64)) as u64
    } else {
        packed
    };
    Ok((packed, negative))
}

/// convert binary representation of datetime2 to packed u64
fn packed_from_datetime_binary(input: &mut Bytes, frac: usize) -> BResult<u64> {
    let ymdhms = input.read_be_u40()?;
    let negative = ymdhms & 0x80_0000_0000 != 0x80_0000_0000;
    let int_part = ymdhms.overflowing_sub(0x80_0000_0000).0;
    let packed = match frac {
        0 => int_part << 24,
        1 | 2 => {
            let frac_part = input.read_u8()?;
            (int_part << 24) + (frac_part as u64) * 10_000
        }
        3 | 4 => {
            let frac_part = input.read_be_u16()?;
            (int_part << 24) + (frac_part as u64) * 100
        }
        5 | 6 => {
            let frac_part = input.read_be_u24()?;
            (int_part << 24) + (frac_part as u64)
        }
        _ => {
            return Err(BError::ConstraintError(format!(
                "invalid fractional length of datetime: {}",
                frac
            )))
        }
    };
    let packed = if negative {
        (-(packed as i64)) as u64
    } else {
        packed
    };
    Ok(packed)
}
