//! rows events and lazy decoding of their row records
use super::table_map::TableMap;
use super::DUMMY_TABLE_ID;
use crate::bitmap;
use crate::error::{Error, Result};
use crate::value::BinlogColumnValue;
use bytes::{Buf, Bytes};
use bytes_cursor::my::ReadMyEnc;
use bytes_cursor::{ReadBytesExt, ReadFromBytesWithContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowsKind {
    Write,
    Update,
    Delete,
}

/// one decoded row image: values of the present columns in declared
/// order, explicit nulls included
#[derive(Debug, Clone, PartialEq)]
pub struct LogRow(pub Vec<BinlogColumnValue>);

/// header-decoded rows event; the row records stay raw until pulled
/// through [RowsData::read_row]
///
/// reference: https://dev.mysql.com/doc/internals/en/rows-event.html
#[derive(Debug, Clone)]
pub struct RowsData {
    pub kind: RowsKind,
    // actually a 6-byte integer, 4 bytes on very old servers
    pub table_id: u64,
    pub flags: u16,
    // v2 only
    pub extra_data: Bytes,
    pub n_cols: usize,
    pub present_bitmap: Bytes,
    // update events carry a second presence bitmap for the after image
    pub present_bitmap2: Option<Bytes>,
    pub payload: Bytes,
}

/// decode context: kind, v2 flag and the table id width derived from
/// the declared post header length
pub struct RowsCtx {
    pub kind: RowsKind,
    pub v2: bool,
    pub table_id_len: usize,
}

impl<'c> ReadFromBytesWithContext<'c> for RowsData {
    type Context = RowsCtx;

    fn read_with_ctx(input: &mut Bytes, ctx: RowsCtx) -> bytes_cursor::Result<Self> {
        let table_id = if ctx.table_id_len == 4 {
            input.read_le_u32()? as u64
        } else {
            input.read_le_u48()?
        };
        let flags = input.read_le_u16()?;
        let extra_data = if ctx.v2 {
            let extra_len = input.read_le_u16()? as usize;
            if extra_len < 2 {
                return Err(bytes_cursor::Error::ConstraintError(format!(
                    "invalid rows extra data length: {}",
                    extra_len
                )));
            }
            input.read_len(extra_len - 2)?
        } else {
            Bytes::new()
        };
        let n_cols = input
            .read_len_enc_int()?
            .to_u64()
            .ok_or_else(|| bytes_cursor::Error::ConstraintError("invalid column count".to_owned()))?
            as usize;
        let bitmap_len = (n_cols + 7) >> 3;
        let present_bitmap = input.read_len(bitmap_len)?;
        let present_bitmap2 = if ctx.kind == RowsKind::Update {
            Some(input.read_len(bitmap_len)?)
        } else {
            None
        };
        let payload = input.split_to(input.remaining());
        Ok(RowsData {
            kind: ctx.kind,
            table_id,
            flags,
            extra_data,
            n_cols,
            present_bitmap,
            present_bitmap2,
            payload,
        })
    }
}

impl RowsData {
    /// statement-end marker events carry no rows
    pub fn is_dummy(&self) -> bool {
        self.table_id == DUMMY_TABLE_ID
    }

    /// cursor over the raw row records, to be advanced by
    /// [RowsData::read_row]
    pub fn row_cursor(&self) -> Bytes {
        if self.is_dummy() {
            Bytes::new()
        } else {
            self.payload.clone()
        }
    }

    /// decode the next row record from the cursor
    ///
    /// returns `(after, before)`: updates carry both images, writes
    /// and deletes only the first; `None` at the end of the event
    pub fn read_row(
        &self,
        cursor: &mut Bytes,
        table_map: &TableMap,
    ) -> Result<Option<(LogRow, Option<LogRow>)>> {
        if !cursor.has_remaining() {
            return Ok(None);
        }
        let first = self.read_image(cursor, table_map, &self.present_bitmap)?;
        match (&self.kind, &self.present_bitmap2) {
            (RowsKind::Update, Some(after_bitmap)) => {
                let after = self.read_image(cursor, table_map, after_bitmap)?;
                Ok(Some((after, Some(first))))
            }
            _ => Ok(Some((first, None))),
        }
    }

    /// null bitmap over present columns, then the values of present
    /// non-null columns in declared order
    fn read_image(
        &self,
        cursor: &mut Bytes,
        table_map: &TableMap,
        present: &Bytes,
    ) -> Result<LogRow> {
        if table_map.col_metas.len() < self.n_cols {
            return Err(Error::Protocol(format!(
                "table map declares {} columns, rows event expects {}",
                table_map.col_metas.len(),
                self.n_cols
            )));
        }
        let present_cols = bitmap::ones(present.chunk(), self.n_cols);
        let null_bitmap_len = (present_cols + 7) >> 3;
        let null_bitmap = cursor.read_len(null_bitmap_len)?;
        let mut values = Vec::with_capacity(present_cols);
        let mut j = 0usize;
        for i in 0..self.n_cols {
            if !bitmap::index(present.chunk(), i) {
                continue;
            }
            if bitmap::index(null_bitmap.chunk(), j) {
                values.push(BinlogColumnValue::Null);
            } else {
                let value = BinlogColumnValue::read_with_ctx(
                    cursor,
                    &table_map.col_metas[i],
                    table_map.unsigned(i),
                )?;
                values.push(value);
            }
            j += 1;
        }
        Ok(LogRow(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binlog::table_map::TableMapData;
    use bytes::{BufMut, BytesMut};

    // table map for: x int unsigned, s varchar(40) null, e enum null
    fn test_table_map() -> TableMap {
        let mut bs = BytesMut::new();
        bs.put_slice(&[1, 0, 0, 0, 0, 0]);
        bs.put_u16_le(1);
        bs.put_slice(&crate::binlog::table_map::tests::table_map_payload(true));
        let tmd = TableMapData::read_with_ctx(&mut bs.freeze(), 6).unwrap();
        tmd.table_map().unwrap()
    }

    fn write_rows_body(rows: &[(u32, Option<&[u8]>, Option<u8>)]) -> Bytes {
        let mut bs = BytesMut::new();
        bs.put_slice(&[1, 0, 0, 0, 0, 0]); // table id
        bs.put_u16_le(1); // flags
        bs.put_u16_le(2); // v2 extra data: length only
        bs.put_u8(3); // column count
        bs.put_u8(0b0000_0111); // all columns present
        for (x, s, e) in rows {
            let mut null_bits = 0u8;
            if s.is_none() {
                null_bits |= 0b010;
            }
            if e.is_none() {
                null_bits |= 0b100;
            }
            bs.put_u8(null_bits);
            bs.put_u32_le(*x);
            if let Some(s) = s {
                bs.put_u8(s.len() as u8);
                bs.put_slice(s);
            }
            if let Some(e) = e {
                bs.put_u8(*e);
            }
        }
        bs.freeze()
    }

    #[test]
    fn test_write_rows_decode() {
        let mut body = write_rows_body(&[(42, Some(b"hello"), Some(2)), (7, None, None)]);
        let rd = RowsData::read_with_ctx(
            &mut body,
            RowsCtx {
                kind: RowsKind::Write,
                v2: true,
                table_id_len: 6,
            },
        )
        .unwrap();
        assert_eq!(1, rd.table_id);
        assert_eq!(3, rd.n_cols);
        let tm = test_table_map();
        let mut cursor = rd.row_cursor();
        let (row1, before1) = rd.read_row(&mut cursor, &tm).unwrap().unwrap();
        assert!(before1.is_none());
        assert_eq!(
            LogRow(vec![
                BinlogColumnValue::LongUnsigned(42),
                BinlogColumnValue::Varchar(Bytes::from_static(b"hello")),
                BinlogColumnValue::Enum(2),
            ]),
            row1
        );
        let (row2, _) = rd.read_row(&mut cursor, &tm).unwrap().unwrap();
        assert_eq!(
            LogRow(vec![
                BinlogColumnValue::LongUnsigned(7),
                BinlogColumnValue::Null,
                BinlogColumnValue::Null,
            ]),
            row2
        );
        assert!(rd.read_row(&mut cursor, &tm).unwrap().is_none());
    }

    #[test]
    fn test_row_value_count_matches_bitmaps() {
        let mut body = write_rows_body(&[(1, Some(b"a"), None)]);
        let rd = RowsData::read_with_ctx(
            &mut body,
            RowsCtx {
                kind: RowsKind::Write,
                v2: true,
                table_id_len: 6,
            },
        )
        .unwrap();
        let tm = test_table_map();
        let mut cursor = rd.row_cursor();
        let (row, _) = rd.read_row(&mut cursor, &tm).unwrap().unwrap();
        let present = bitmap::ones(rd.present_bitmap.chunk(), rd.n_cols);
        let nulls = row
            .0
            .iter()
            .filter(|v| matches!(v, BinlogColumnValue::Null))
            .count();
        assert_eq!(present, row.0.len());
        assert_eq!(1, nulls);
    }

    #[test]
    fn test_update_rows_images() {
        let mut bs = BytesMut::new();
        bs.put_slice(&[1, 0, 0, 0, 0, 0]);
        bs.put_u16_le(1);
        bs.put_u16_le(2);
        bs.put_u8(3);
        bs.put_u8(0b0000_0001); // before image: only column x
        bs.put_u8(0b0000_0001); // after image: only column x
        // one record: before then after
        bs.put_u8(0);
        bs.put_u32_le(1);
        bs.put_u8(0);
        bs.put_u32_le(2);
        let mut body = bs.freeze();
        let rd = RowsData::read_with_ctx(
            &mut body,
            RowsCtx {
                kind: RowsKind::Update,
                v2: true,
                table_id_len: 6,
            },
        )
        .unwrap();
        let tm = test_table_map();
        let mut cursor = rd.row_cursor();
        let (after, before) = rd.read_row(&mut cursor, &tm).unwrap().unwrap();
        assert_eq!(LogRow(vec![BinlogColumnValue::LongUnsigned(2)]), after);
        assert_eq!(
            Some(LogRow(vec![BinlogColumnValue::LongUnsigned(1)])),
            before
        );
        assert!(rd.read_row(&mut cursor, &tm).unwrap().is_none());
    }

    #[test]
    fn test_dummy_rows_event() {
        let mut bs = BytesMut::new();
        bs.put_slice(&[0xff, 0xff, 0xff, 0, 0, 0]); // dummy table id
        bs.put_u16_le(1);
        bs.put_u16_le(2);
        bs.put_u8(1);
        bs.put_u8(0x01);
        let mut body = bs.freeze();
        let rd = RowsData::read_with_ctx(
            &mut body,
            RowsCtx {
                kind: RowsKind::Write,
                v2: true,
                table_id_len: 6,
            },
        )
        .unwrap();
        assert!(rd.is_dummy());
        assert!(!rd.row_cursor().has_remaining());
    }
}
