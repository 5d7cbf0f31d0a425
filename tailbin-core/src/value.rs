//! decoding of the packed row image values driven by column metadata
use crate::col::ColumnMeta;
use crate::decimal::MyDecimal;
use crate::error::{Error, Result};
use crate::json::decode_json;
use crate::time::{MyDate, MyDateTime, MyTime, MyTimestamp};
use bytes::Bytes;
use bytes_cursor::ReadBytesExt;
use serde_json::Value as JsonValue;

/// one column value of a row image
///
/// integer signedness comes from the table map's extended metadata;
/// columns without a signedness bit decode as signed, the server
/// default
#[derive(Debug, Clone, PartialEq)]
pub enum BinlogColumnValue {
    Null,
    Tiny(i8),
    TinyUnsigned(u8),
    Short(i16),
    ShortUnsigned(u16),
    Int24(i32),
    Int24Unsigned(u32),
    Long(i32),
    LongUnsigned(u32),
    LongLong(i64),
    LongLongUnsigned(u64),
    Float(f32),
    Double(f64),
    Decimal(MyDecimal),
    Date(MyDate),
    Time(MyTime),
    DateTime(MyDateTime),
    Timestamp(MyTimestamp),
    Year(u16),
    Varchar(Bytes),
    String(Bytes),
    Blob(Bytes),
    Geometry(Bytes),
    Bit(Bytes),
    Enum(u16),
    Set(u64),
    Json(JsonValue),
}

impl BinlogColumnValue {
    pub fn read_with_ctx(
        input: &mut Bytes,
        col_meta: &ColumnMeta,
        unsigned: bool,
    ) -> Result<Self> {
        let col_val = match col_meta {
            ColumnMeta::Null => BinlogColumnValue::Null,
            ColumnMeta::Tiny => {
                if unsigned {
                    BinlogColumnValue::TinyUnsigned(input.read_u8()?)
                } else {
                    BinlogColumnValue::Tiny(input.read_i8()?)
                }
            }
            ColumnMeta::Short => {
                if unsigned {
                    BinlogColumnValue::ShortUnsigned(input.read_le_u16()?)
                } else {
                    BinlogColumnValue::Short(input.read_le_i16()?)
                }
            }
            ColumnMeta::Int24 => {
                if unsigned {
                    BinlogColumnValue::Int24Unsigned(input.read_le_u24()?)
                } else {
                    BinlogColumnValue::Int24(input.read_le_i24()?)
                }
            }
            ColumnMeta::Long => {
                if unsigned {
                    BinlogColumnValue::LongUnsigned(input.read_le_u32()?)
                } else {
                    BinlogColumnValue::Long(input.read_le_i32()?)
                }
            }
            ColumnMeta::LongLong => {
                if unsigned {
                    BinlogColumnValue::LongLongUnsigned(input.read_le_u64()?)
                } else {
                    BinlogColumnValue::LongLong(input.read_le_i64()?)
                }
            }
            ColumnMeta::Float { pack_len } => {
                if *pack_len != 4 {
                    return Err(Error::MalformedPacket(format!(
                        "invalid float pack length: {}",
                        pack_len
                    )));
                }
                BinlogColumnValue::Float(input.read_le_f32()?)
            }
            ColumnMeta::Double { pack_len } => {
                if *pack_len != 8 {
                    return Err(Error::MalformedPacket(format!(
                        "invalid double pack length: {}",
                        pack_len
                    )));
                }
                BinlogColumnValue::Double(input.read_le_f64()?)
            }
            ColumnMeta::Decimal {
                precision,
                decimals,
            }
            | ColumnMeta::NewDecimal {
                precision,
                decimals,
            } => BinlogColumnValue::Decimal(MyDecimal::read_from(input, *precision, *decimals)?),
            ColumnMeta::Date => BinlogColumnValue::Date(MyDate::from_binlog(input)?),
            ColumnMeta::Time => {
                // pre-5.6.4 form: little-endian decimal digits HHMMSS
                let packed = input.read_le_u24()?;
                BinlogColumnValue::Time(MyTime {
                    negative: false,
                    days: 0,
                    hour: (packed / 10_000) as u8,
                    minute: ((packed / 100) % 100) as u8,
                    second: (packed % 100) as u8,
                    micro_second: 0,
                })
            }
            ColumnMeta::DateTime => {
                BinlogColumnValue::DateTime(MyDateTime::from_binlog_legacy(input)?)
            }
            ColumnMeta::Timestamp => {
                BinlogColumnValue::Timestamp(MyTimestamp::from_binlog_legacy(input)?)
            }
            ColumnMeta::Time2 { decimals } => {
                BinlogColumnValue::Time(MyTime::from_binlog(input, *decimals as usize)?)
            }
            ColumnMeta::DateTime2 { decimals } => {
                BinlogColumnValue::DateTime(MyDateTime::from_binlog(input, *decimals as usize)?)
            }
            ColumnMeta::Timestamp2 { decimals } => {
                BinlogColumnValue::Timestamp(MyTimestamp::from_binlog(input, *decimals as usize)?)
            }
            ColumnMeta::Year => {
                let v = input.read_u8()?;
                if v == 0 {
                    BinlogColumnValue::Year(0)
                } else {
                    BinlogColumnValue::Year(1900 + v as u16)
                }
            }
            ColumnMeta::Varchar { max_len } => {
                let len = if *max_len < 256 {
                    input.read_u8()? as usize
                } else {
                    input.read_le_u16()? as usize
                };
                BinlogColumnValue::Varchar(input.read_len(len)?)
            }
            ColumnMeta::String { max_len } => {
                let len = if *max_len < 256 {
                    input.read_u8()? as usize
                } else {
                    input.read_le_u16()? as usize
                };
                BinlogColumnValue::String(input.read_len(len)?)
            }
            ColumnMeta::Bit { bits, bytes } => {
                let nbits = *bytes as usize * 8 + *bits as usize;
                let len = (nbits + 7) >> 3;
                BinlogColumnValue::Bit(input.read_len(len)?)
            }
            ColumnMeta::Enum { pack_len } => {
                let v = match pack_len {
                    1 => input.read_u8()? as u16,
                    2 => input.read_le_u16()?,
                    _ => {
                        return Err(Error::MalformedPacket(format!(
                            "invalid enum pack length: {}",
                            pack_len
                        )))
                    }
                };
                BinlogColumnValue::Enum(v)
            }
            ColumnMeta::Set { pack_len } => {
                if *pack_len == 0 || *pack_len > 8 {
                    return Err(Error::MalformedPacket(format!(
                        "invalid set pack length: {}",
                        pack_len
                    )));
                }
                let mut v = 0u64;
                for i in 0..*pack_len {
                    v |= (input.read_u8()? as u64) << (8 * i);
                }
                BinlogColumnValue::Set(v)
            }
            ColumnMeta::Blob { pack_len } => {
                let len = read_packed_len(input, *pack_len)?;
                BinlogColumnValue::Blob(input.read_len(len)?)
            }
            ColumnMeta::Geometry { pack_len } => {
                let len = read_packed_len(input, *pack_len)?;
                BinlogColumnValue::Geometry(input.read_len(len)?)
            }
            ColumnMeta::Json { pack_len } => {
                let len = read_packed_len(input, *pack_len)?;
                let payload = input.read_len(len)?;
                BinlogColumnValue::Json(decode_json(&payload)?)
            }
        };
        Ok(col_val)
    }
}

/// little-endian length stored in `pack_len` bytes
fn read_packed_len(input: &mut Bytes, pack_len: u8) -> Result<usize> {
    let len = match pack_len {
        1 => input.read_u8()? as usize,
        2 => input.read_le_u16()? as usize,
        3 => input.read_le_u24()? as usize,
        4 => input.read_le_u32()? as usize,
        _ => {
            return Err(Error::MalformedPacket(format!(
                "invalid blob pack length: {}",
                pack_len
            )))
        }
    };
    Ok(len)
}
