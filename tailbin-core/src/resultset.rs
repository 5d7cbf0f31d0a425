//! text protocol result set rows
use crate::col::TextColumnValue;
use bytes::Bytes;
use bytes_cursor::my::{LenEncStr, ReadMyEnc};
use bytes_cursor::{Error, Result};

/// one row of a text result set
#[derive(Debug, Clone)]
pub struct TextRow(pub Vec<TextColumnValue>);

impl TextRow {
    pub fn read_from(input: &mut Bytes, col_cnt: usize) -> Result<Self> {
        let mut cells = Vec::with_capacity(col_cnt);
        for _ in 0..col_cnt {
            match input.read_len_enc_str()? {
                LenEncStr::Null => cells.push(None),
                LenEncStr::Bytes(bs) => cells.push(Some(bs)),
                LenEncStr::Err => {
                    return Err(Error::ConstraintError(
                        "invalid text column value".to_owned(),
                    ))
                }
            }
        }
        Ok(TextRow(cells))
    }

    /// cell as utf8, empty string for NULL
    pub fn cell_str(&self, idx: usize) -> String {
        match self.0.get(idx) {
            Some(Some(bs)) => String::from_utf8_lossy(bs).to_string(),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    #[test]
    fn test_read_text_row() {
        let mut bs = BytesMut::new();
        bs.put_slice(b"\x10mysql-bin.000001");
        bs.put_slice(b"\x03154");
        bs.put_u8(0xfb); // NULL
        let mut input = bs.freeze();
        let row = TextRow::read_from(&mut input, 3).unwrap();
        assert_eq!("mysql-bin.000001", row.cell_str(0));
        assert_eq!("154", row.cell_str(1));
        assert_eq!(None, row.0[2]);
        assert_eq!("", row.cell_str(2));
    }
}
