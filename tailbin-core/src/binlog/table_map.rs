//! table map events and the schema they declare for rows events
use crate::col::{ColumnMeta, ColumnMetas, ColumnType};
use crate::error::{Error, Result};
use bytes::{Buf, Bytes};
use bytes_cursor::my::{LenEncStr, ReadMyEnc};
use bytes_cursor::{ReadBytesExt, ReadFromBytesWithContext};
use smol_str::SmolStr;
use std::convert::TryFrom;

// optional metadata tags appended after the null bitmap
//
// reference: https://github.com/mysql/mysql-server/blob/8.0/libbinlogevents/include/rows_event.h
const META_SIGNEDNESS: u8 = 1;
const META_DEFAULT_CHARSET: u8 = 2;
const META_COLUMN_CHARSET: u8 = 3;
const META_COLUMN_NAME: u8 = 4;
const META_SET_STR_VALUE: u8 = 5;
const META_ENUM_STR_VALUE: u8 = 6;

/// Data of TableMapEvent
///
/// the variable part is complicated, the decoded schema is produced
/// on demand by [TableMapData::table_map]
#[derive(Debug, Clone)]
pub struct TableMapData {
    // actually a 6-byte integer, 4 bytes on very old servers
    pub table_id: u64,
    pub flags: u16,
    payload: Bytes,
}

impl ReadFromBytesWithContext<'_> for TableMapData {
    // width of the table id in the post header
    type Context = usize;

    fn read_with_ctx(input: &mut Bytes, table_id_len: usize) -> bytes_cursor::Result<Self> {
        let table_id = if table_id_len == 4 {
            input.read_le_u32()? as u64
        } else {
            input.read_le_u48()?
        };
        let flags = input.read_le_u16()?;
        let payload = input.split_to(input.remaining());
        Ok(TableMapData {
            table_id,
            flags,
            payload,
        })
    }
}

impl TableMapData {
    pub fn table_map(&self) -> Result<TableMap> {
        TableMap::read_from_payload(&mut self.payload.clone())
    }
}

/// decoded schema of one table, the cache value rows events resolve
/// their table id against
#[derive(Debug, Clone)]
pub struct TableMap {
    pub schema_name: SmolStr,
    pub table_name: SmolStr,
    pub col_types: Vec<ColumnType>,
    pub col_metas: ColumnMetas,
    pub null_bitmap: Vec<u8>,
    // per column, expanded from the numeric-only signedness bitmap;
    // absent when the server sent no optional metadata
    pub signedness: Option<Vec<bool>>,
    pub default_charset: Option<u32>,
    pub column_charsets: Vec<u32>,
    pub col_names: Vec<SmolStr>,
    pub enum_str_values: Vec<Vec<SmolStr>>,
    pub set_str_values: Vec<Vec<SmolStr>>,
}

impl TableMap {
    fn read_from_payload(input: &mut Bytes) -> Result<Self> {
        let schema_name_len = input.read_u8()?;
        let schema_name = input.read_len(schema_name_len as usize)?;
        input.read_len(1)?;
        let table_name_len = input.read_u8()?;
        let table_name = input.read_len(table_name_len as usize)?;
        input.read_len(1)?;
        let col_cnt = input
            .read_len_enc_int()?
            .to_u64()
            .ok_or_else(|| Error::MalformedPacket("invalid column count".to_owned()))?
            as usize;
        let col_defs = input.read_len(col_cnt)?;
        let col_meta_defs_len = input
            .read_len_enc_int()?
            .to_u64()
            .ok_or_else(|| Error::MalformedPacket("invalid column metadata length".to_owned()))?;
        let mut col_meta_defs = input.read_len(col_meta_defs_len as usize)?;
        let bitmap_len = (col_cnt + 7) / 8;
        let null_bitmap = Vec::from(&input.read_len(bitmap_len)?[..]);

        let mut col_types = Vec::with_capacity(col_cnt);
        for code in col_defs.chunk() {
            col_types.push(ColumnType::try_from(*code)?);
        }
        let col_metas = ColumnMetas::read_with_ctx(&mut col_meta_defs, (col_cnt, col_defs.chunk()))?;

        let mut map = TableMap {
            schema_name: SmolStr::from(String::from_utf8(Vec::from(&schema_name[..]))?),
            table_name: SmolStr::from(String::from_utf8(Vec::from(&table_name[..]))?),
            col_types,
            col_metas,
            null_bitmap,
            signedness: None,
            default_charset: None,
            column_charsets: Vec::new(),
            col_names: Vec::new(),
            enum_str_values: Vec::new(),
            set_str_values: Vec::new(),
        };
        map.read_optional_metadata(input)?;
        Ok(map)
    }

    /// (tag, length, value) triplets trailing the null bitmap
    fn read_optional_metadata(&mut self, input: &mut Bytes) -> Result<()> {
        while input.has_remaining() {
            let tag = input.read_u8()?;
            let len = input
                .read_len_enc_int()?
                .to_u64()
                .ok_or_else(|| Error::MalformedPacket("invalid metadata length".to_owned()))?;
            let mut value = input.read_len(len as usize)?;
            match tag {
                META_SIGNEDNESS => self.read_signedness(&value)?,
                META_DEFAULT_CHARSET => self.read_default_charset(&mut value)?,
                META_COLUMN_CHARSET => {
                    while value.has_remaining() {
                        let cs = value.read_len_enc_int()?.to_u32().ok_or_else(|| {
                            Error::MalformedPacket("invalid column charset".to_owned())
                        })?;
                        self.column_charsets.push(cs);
                    }
                }
                META_COLUMN_NAME => {
                    while value.has_remaining() {
                        let name = read_meta_str(&mut value)?;
                        self.col_names.push(name);
                    }
                }
                META_SET_STR_VALUE => self.set_str_values = read_str_value_lists(&mut value)?,
                META_ENUM_STR_VALUE => self.enum_str_values = read_str_value_lists(&mut value)?,
                // primary key and charset variants of enum/set are not
                // needed for decoding, drained with the value slice
                _ => {}
            }
        }
        Ok(())
    }

    /// one bit per numeric column, most significant bit first
    fn read_signedness(&mut self, value: &Bytes) -> Result<()> {
        let mut flags = Vec::with_capacity(self.col_types.len());
        let mut pos = 0usize;
        for ct in &self.col_types {
            if ct.is_numeric() {
                let bucket = pos >> 3;
                let bit = 0x80u8 >> (pos & 7);
                let b = value.get(bucket).ok_or_else(|| {
                    Error::MalformedPacket("signedness bitmap too short".to_owned())
                })?;
                flags.push(b & bit != 0);
                pos += 1;
            } else {
                flags.push(false);
            }
        }
        self.signedness = Some(flags);
        Ok(())
    }

    /// default charset id followed by (column index, charset) pairs;
    /// residual bytes are rejected
    fn read_default_charset(&mut self, value: &mut Bytes) -> Result<()> {
        let default = value
            .read_len_enc_int()?
            .to_u32()
            .ok_or_else(|| Error::MalformedPacket("invalid default charset".to_owned()))?;
        self.default_charset = Some(default);
        while value.has_remaining() {
            let col = value.read_len_enc_int()?;
            if col.to_u32().is_none() {
                return Err(Error::MalformedPacket(
                    "invalid default charset override".to_owned(),
                ));
            }
            if !value.has_remaining() {
                return Err(Error::MalformedPacket(
                    "dangling default charset override".to_owned(),
                ));
            }
            let cs = value
                .read_len_enc_int()?
                .to_u32()
                .ok_or_else(|| Error::MalformedPacket("invalid charset override".to_owned()))?;
            self.column_charsets.push(cs);
        }
        Ok(())
    }

    /// signedness of the column, signed when the server sent no
    /// optional metadata
    pub fn unsigned(&self, col_idx: usize) -> bool {
        match &self.signedness {
            Some(flags) => flags.get(col_idx).copied().unwrap_or(false),
            None => false,
        }
    }
}

fn read_meta_str(input: &mut Bytes) -> Result<SmolStr> {
    match input.read_len_enc_str()? {
        LenEncStr::Bytes(bs) => Ok(SmolStr::from(String::from_utf8(Vec::from(&bs[..]))?)),
        _ => Err(Error::MalformedPacket("invalid metadata string".to_owned())),
    }
}

/// per enum/set column: a count then that many member strings
fn read_str_value_lists(input: &mut Bytes) -> Result<Vec<Vec<SmolStr>>> {
    let mut lists = Vec::new();
    while input.has_remaining() {
        let cnt = input
            .read_len_enc_int()?
            .to_u64()
            .ok_or_else(|| Error::MalformedPacket("invalid enum member count".to_owned()))?;
        let mut members = Vec::with_capacity(cnt as usize);
        for _ in 0..cnt {
            members.push(read_meta_str(input)?);
        }
        lists.push(members);
    }
    Ok(lists)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    // schema "test", table "t", columns: int, varchar(40), enum
    pub(crate) fn table_map_payload(with_metadata: bool) -> BytesMut {
        let mut bs = BytesMut::new();
        bs.put_u8(4);
        bs.put_slice(b"test");
        bs.put_u8(0);
        bs.put_u8(1);
        bs.put_slice(b"t");
        bs.put_u8(0);
        bs.put_u8(3); // column count
        bs.put_slice(&[0x03, 0x0f, 0xfe]); // long, varchar, string
        bs.put_u8(4); // metadata length
        bs.put_slice(&[0x28, 0x00]); // varchar max_len 40
        bs.put_slice(&[0xf7, 0x01]); // enum, 1 byte
        bs.put_u8(0b0000_0110); // columns 2 and 3 nullable
        if with_metadata {
            // signedness: single numeric column, unsigned
            bs.put_u8(META_SIGNEDNESS);
            bs.put_u8(1);
            bs.put_u8(0x80);
            // column names
            bs.put_u8(META_COLUMN_NAME);
            bs.put_u8(8);
            bs.put_u8(1);
            bs.put_slice(b"x");
            bs.put_u8(1);
            bs.put_slice(b"s");
            bs.put_u8(2);
            bs.put_slice(b"ee");
            // enum member strings
            bs.put_u8(META_ENUM_STR_VALUE);
            bs.put_u8(7);
            bs.put_u8(2); // two members
            bs.put_u8(2);
            bs.put_slice(b"on");
            bs.put_u8(3);
            bs.put_slice(b"off");
        }
        bs
    }

    fn table_map_data(payload: BytesMut) -> TableMapData {
        let mut bs = BytesMut::new();
        bs.put_slice(&[1, 0, 0, 0, 0, 0]); // table id 1
        bs.put_u16_le(1); // flags
        bs.put_slice(&payload);
        TableMapData::read_with_ctx(&mut bs.freeze(), 6).unwrap()
    }

    #[test]
    fn test_table_map_basic() {
        let tmd = table_map_data(table_map_payload(false));
        assert_eq!(1, tmd.table_id);
        let tm = tmd.table_map().unwrap();
        assert_eq!("test", tm.schema_name);
        assert_eq!("t", tm.table_name);
        assert_eq!(3, tm.col_types.len());
        assert_eq!(ColumnType::Long, tm.col_types[0]);
        assert_eq!(ColumnMeta::Varchar { max_len: 40 }, tm.col_metas[1]);
        assert_eq!(ColumnMeta::Enum { pack_len: 1 }, tm.col_metas[2]);
        assert!(tm.signedness.is_none());
        assert!(!tm.unsigned(0));
    }

    #[test]
    fn test_table_map_with_optional_metadata() {
        let tmd = table_map_data(table_map_payload(true));
        let tm = tmd.table_map().unwrap();
        assert!(tm.unsigned(0));
        assert!(!tm.unsigned(1));
        assert_eq!(
            vec![SmolStr::from("x"), SmolStr::from("s"), SmolStr::from("ee")],
            tm.col_names
        );
        assert_eq!(1, tm.enum_str_values.len());
        assert_eq!(
            vec![SmolStr::from("on"), SmolStr::from("off")],
            tm.enum_str_values[0]
        );
    }

    #[test]
    fn test_table_map_four_byte_id() {
        let mut bs = BytesMut::new();
        bs.put_u32_le(9);
        bs.put_u16_le(0);
        bs.put_slice(&table_map_payload(false));
        let tmd = TableMapData::read_with_ctx(&mut bs.freeze(), 4).unwrap();
        assert_eq!(9, tmd.table_id);
    }

    #[test]
    fn test_default_charset_residual_bytes() {
        let mut payload = table_map_payload(false);
        payload.put_u8(META_DEFAULT_CHARSET);
        payload.put_u8(2);
        payload.put_u8(45); // default charset
        payload.put_u8(3); // dangling column index without charset
        let tmd = table_map_data(payload);
        assert!(tmd.table_map().is_err());
    }
}
