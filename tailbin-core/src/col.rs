//! column types, binlog column metadata and result set column definitions
//!
//! the complete type list:
//! https://github.com/mysql/mysql-server/blob/5.7/libbinlogevents/export/binary_log_types.h
use crate::error::{Error, Result};
use bitflags::bitflags;
use bytes::Bytes;
use bytes_cursor::my::ReadMyEnc;
use bytes_cursor::{ReadBytesExt, ReadFromBytesWithContext};
use std::convert::TryFrom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Decimal,
    Tiny,
    Short,
    Long,
    Float,
    Double,
    Null,
    Timestamp,
    LongLong,
    Int24,
    Date,
    Time,
    DateTime,
    Year,
    NewDate,
    Varchar,
    Bit,
    Timestamp2,
    DateTime2,
    Time2,
    Json,
    NewDecimal,
    Enum,
    Set,
    TinyBlob,
    MediumBlob,
    LongBlob,
    Blob,
    VarString,
    String,
    Geometry,
}

impl TryFrom<u8> for ColumnType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        let ct = match code {
            0x00 => ColumnType::Decimal,
            0x01 => ColumnType::Tiny,
            0x02 => ColumnType::Short,
            0x03 => ColumnType::Long,
            0x04 => ColumnType::Float,
            0x05 => ColumnType::Double,
            0x06 => ColumnType::Null,
            0x07 => ColumnType::Timestamp,
            0x08 => ColumnType::LongLong,
            0x09 => ColumnType::Int24,
            0x0a => ColumnType::Date,
            0x0b => ColumnType::Time,
            0x0c => ColumnType::DateTime,
            0x0d => ColumnType::Year,
            0x0e => ColumnType::NewDate,
            0x0f => ColumnType::Varchar,
            0x10 => ColumnType::Bit,
            0x11 => ColumnType::Timestamp2,
            0x12 => ColumnType::DateTime2,
            0x13 => ColumnType::Time2,
            0xf5 => ColumnType::Json,
            0xf6 => ColumnType::NewDecimal,
            0xf7 => ColumnType::Enum,
            0xf8 => ColumnType::Set,
            0xf9 => ColumnType::TinyBlob,
            0xfa => ColumnType::MediumBlob,
            0xfb => ColumnType::LongBlob,
            0xfc => ColumnType::Blob,
            0xfd => ColumnType::VarString,
            0xfe => ColumnType::String,
            0xff => ColumnType::Geometry,
            _ => return Err(Error::UnknownColumnType(code)),
        };
        Ok(ct)
    }
}

impl From<ColumnType> for u8 {
    fn from(ct: ColumnType) -> u8 {
        match ct {
            ColumnType::Decimal => 0x00,
            ColumnType::Tiny => 0x01,
            ColumnType::Short => 0x02,
            ColumnType::Long => 0x03,
            ColumnType::Float => 0x04,
            ColumnType::Double => 0x05,
            ColumnType::Null => 0x06,
            ColumnType::Timestamp => 0x07,
            ColumnType::LongLong => 0x08,
            ColumnType::Int24 => 0x09,
            ColumnType::Date => 0x0a,
            ColumnType::Time => 0x0b,
            ColumnType::DateTime => 0x0c,
            ColumnType::Year => 0x0d,
            ColumnType::NewDate => 0x0e,
            ColumnType::Varchar => 0x0f,
            ColumnType::Bit => 0x10,
            ColumnType::Timestamp2 => 0x11,
            ColumnType::DateTime2 => 0x12,
            ColumnType::Time2 => 0x13,
            ColumnType::Json => 0xf5,
            ColumnType::NewDecimal => 0xf6,
            ColumnType::Enum => 0xf7,
            ColumnType::Set => 0xf8,
            ColumnType::TinyBlob => 0xf9,
            ColumnType::MediumBlob => 0xfa,
            ColumnType::LongBlob => 0xfb,
            ColumnType::Blob => 0xfc,
            ColumnType::VarString => 0xfd,
            ColumnType::String => 0xfe,
            ColumnType::Geometry => 0xff,
        }
    }
}

impl ColumnType {
    /// numeric columns carry a bit in the table map's signedness metadata
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ColumnType::Decimal
                | ColumnType::Tiny
                | ColumnType::Short
                | ColumnType::Long
                | ColumnType::Float
                | ColumnType::Double
                | ColumnType::LongLong
                | ColumnType::Int24
                | ColumnType::NewDecimal
        )
    }
}

/// per column metadata declared by a table map event
///
/// string-family metadata is refined here: the refined type hidden in
/// the two metadata bytes of a STRING column (enum and set are folded
/// into it on the wire) is recovered at parse time
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnMeta {
    Decimal { precision: u8, decimals: u8 },
    Tiny,
    Short,
    Long,
    Float { pack_len: u8 },
    Double { pack_len: u8 },
    Null,
    Timestamp,
    LongLong,
    Int24,
    Date,
    Time,
    DateTime,
    Year,
    Varchar { max_len: u16 },
    Bit { bits: u8, bytes: u8 },
    Timestamp2 { decimals: u8 },
    DateTime2 { decimals: u8 },
    Time2 { decimals: u8 },
    Json { pack_len: u8 },
    NewDecimal { precision: u8, decimals: u8 },
    Enum { pack_len: u8 },
    Set { pack_len: u8 },
    Blob { pack_len: u8 },
    String { max_len: u16 },
    Geometry { pack_len: u8 },
}

impl ReadFromBytesWithContext<'_> for ColumnMeta {
    type Context = ColumnType;

    fn read_with_ctx(input: &mut Bytes, col_type: Self::Context) -> bytes_cursor::Result<Self> {
        let col_meta = match col_type {
            ColumnType::Decimal => {
                let precision = input.read_u8()?;
                let decimals = input.read_u8()?;
                ColumnMeta::Decimal {
                    precision,
                    decimals,
                }
            }
            ColumnType::Tiny => ColumnMeta::Tiny,
            ColumnType::Short => ColumnMeta::Short,
            ColumnType::Long => ColumnMeta::Long,
            ColumnType::Float => {
                let pack_len = input.read_u8()?;
                ColumnMeta::Float { pack_len }
            }
            ColumnType::Double => {
                let pack_len = input.read_u8()?;
                ColumnMeta::Double { pack_len }
            }
            ColumnType::Null => ColumnMeta::Null,
            ColumnType::Timestamp => ColumnMeta::Timestamp,
            ColumnType::LongLong => ColumnMeta::LongLong,
            ColumnType::Int24 => ColumnMeta::Int24,
            ColumnType::Date | ColumnType::NewDate => ColumnMeta::Date,
            ColumnType::Time => ColumnMeta::Time,
            ColumnType::DateTime => ColumnMeta::DateTime,
            ColumnType::Year => ColumnMeta::Year,
            ColumnType::Varchar | ColumnType::VarString => {
                let max_len = input.read_le_u16()?;
                ColumnMeta::Varchar { max_len }
            }
            ColumnType::Bit => {
                let bits = input.read_u8()?;
                let bytes = input.read_u8()?;
                ColumnMeta::Bit { bits, bytes }
            }
            ColumnType::Timestamp2 => {
                let decimals = input.read_u8()?;
                ColumnMeta::Timestamp2 { decimals }
            }
            ColumnType::DateTime2 => {
                let decimals = input.read_u8()?;
                ColumnMeta::DateTime2 { decimals }
            }
            ColumnType::Time2 => {
                let decimals = input.read_u8()?;
                ColumnMeta::Time2 { decimals }
            }
            ColumnType::Json => {
                let pack_len = input.read_u8()?;
                ColumnMeta::Json { pack_len }
            }
            ColumnType::NewDecimal => {
                let precision = input.read_u8()?;
                let decimals = input.read_u8()?;
                ColumnMeta::NewDecimal {
                    precision,
                    decimals,
                }
            }
            // announced directly only by pre-5.x servers; modern servers
            // fold enum/set into STRING metadata
            ColumnType::Enum => {
                let pack_len = input.read_u8()?;
                ColumnMeta::Enum { pack_len }
            }
            ColumnType::Set => {
                let pack_len = input.read_u8()?;
                ColumnMeta::Set { pack_len }
            }
            ColumnType::TinyBlob
            | ColumnType::MediumBlob
            | ColumnType::LongBlob
            | ColumnType::Blob => {
                let pack_len = input.read_u8()?;
                ColumnMeta::Blob { pack_len }
            }
            ColumnType::String => {
                let m0 = input.read_u8()?;
                let m1 = input.read_u8()?;
                let (real_type, len) = refine_string_meta(m0, m1);
                match real_type {
                    0xf7 => ColumnMeta::Enum {
                        pack_len: len as u8,
                    },
                    0xf8 => ColumnMeta::Set {
                        pack_len: len as u8,
                    },
                    _ => ColumnMeta::String { max_len: len },
                }
            }
            ColumnType::Geometry => {
                let pack_len = input.read_u8()?;
                ColumnMeta::Geometry { pack_len }
            }
        };
        Ok(col_meta)
    }
}

/// the documented bit rearrangement of STRING metadata:
/// when bits 0x30 of the first byte are not both set they carry,
/// inverted, the high bits of the length
///
/// reference: https://github.com/mysql/mysql-server/blob/5.7/sql/field.cc#L7538
fn refine_string_meta(m0: u8, m1: u8) -> (u8, u16) {
    if m0 & 0x30 != 0x30 {
        let len = m1 as u16 | ((((m0 & 0x30) ^ 0x30) as u16) << 4);
        (m0 | 0x30, len)
    } else {
        (m0, m1 as u16)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetas(pub Vec<ColumnMeta>);

impl<'c> ReadFromBytesWithContext<'c> for ColumnMetas {
    // column count and the raw per-column type codes
    type Context = (usize, &'c [u8]);

    fn read_with_ctx(input: &mut Bytes, (col_cnt, col_defs): Self::Context) -> bytes_cursor::Result<Self> {
        let mut col_metas = Vec::with_capacity(col_cnt);
        for i in 0..col_cnt {
            let col_type = ColumnType::try_from(col_defs[i]).map_err(|_| {
                bytes_cursor::Error::ConstraintError(format!(
                    "invalid column type code: {:#04x}",
                    col_defs[i]
                ))
            })?;
            let col_meta = ColumnMeta::read_with_ctx(input, col_type)?;
            col_metas.push(col_meta);
        }
        Ok(ColumnMetas(col_metas))
    }
}

impl std::ops::Deref for ColumnMetas {
    type Target = [ColumnMeta];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// column value parsed from the text protocol
pub type TextColumnValue = Option<Bytes>;

/// Column definition of a result set
///
/// reference: https://dev.mysql.com/doc/internals/en/com-query-response.html
#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    pub catalog: String,
    pub schema: String,
    pub table: String,
    pub org_table: String,
    pub name: String,
    pub org_name: String,
    pub charset: u16,
    pub col_len: u32,
    pub col_type: ColumnType,
    pub flags: ColumnFlags,
    pub decimals: u8,
}

impl ReadFromBytesWithContext<'_> for ColumnDefinition {
    type Context = ();

    fn read_with_ctx(input: &mut Bytes, _ctx: ()) -> bytes_cursor::Result<Self> {
        let catalog = input.read_len_enc_str()?.into_string()?;
        let schema = input.read_len_enc_str()?.into_string()?;
        let table = input.read_len_enc_str()?.into_string()?;
        let org_table = input.read_len_enc_str()?.into_string()?;
        let name = input.read_len_enc_str()?.into_string()?;
        let org_name = input.read_len_enc_str()?.into_string()?;
        // length of fixed fields, always 0x0c
        input.read_len_enc_int()?;
        let charset = input.read_le_u16()?;
        let col_len = input.read_le_u32()?;
        let col_type = input.read_u8()?;
        let col_type = ColumnType::try_from(col_type).map_err(|_| {
            bytes_cursor::Error::ConstraintError(format!(
                "invalid column type code: {:#04x}",
                col_type
            ))
        })?;
        let flags = input.read_le_u16()?;
        let flags = ColumnFlags::from_bits_truncate(flags);
        let decimals = input.read_u8()?;
        // two bytes filler
        input.read_len(2)?;
        Ok(ColumnDefinition {
            catalog,
            schema,
            table,
            org_table,
            name,
            org_name,
            charset,
            col_len,
            col_type,
            flags,
            decimals,
        })
    }
}

bitflags! {
    /// flags of a result set column
    ///
    /// reference: https://github.com/mysql/mysql-server/blob/5.7/sql/field.h#L4504
    pub struct ColumnFlags: u16 {
        const NOT_NULL      = 0x0001;
        const PRIMARY_KEY   = 0x0002;
        const UNIQUE_KEY    = 0x0004;
        const MULTIPLE_KEY  = 0x0008;
        const BLOB          = 0x0010;
        const UNSIGNED      = 0x0020;
        const ZEROFILL      = 0x0040;
        const BINARY        = 0x0080;
        const ENUM          = 0x0100;
        const AUTO_INCREMENT    = 0x0200;
        const TIMESTAMP     = 0x0400;
        const SET           = 0x0800;
        const NO_DEFAULT_VALUE  = 0x1000;
        const ON_UPDATE_NOW = 0x2000;
        const NUM           = 0x4000;
        const PART_KEY      = 0x8000;
    }
}
