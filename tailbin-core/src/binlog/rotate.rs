use bytes::{Buf, Bytes};
use bytes_cursor::{ReadBytesExt, ReadFromBytes, Result};

/// Data of RotateEvent
///
/// reference: https://dev.mysql.com/doc/internals/en/rotate-event.html
#[derive(Debug, Clone)]
pub struct RotateData {
    pub position: u64,
    pub next_binlog_filename: Bytes,
}

impl ReadFromBytes for RotateData {
    fn read_from(input: &mut Bytes) -> Result<Self> {
        let position = input.read_le_u64()?;
        let next_binlog_filename = input.split_to(input.remaining());
        Ok(RotateData {
            position,
            next_binlog_filename,
        })
    }
}

impl RotateData {
    pub fn filename(&self) -> Result<String> {
        Ok(String::from_utf8(Vec::from(&self.next_binlog_filename[..]))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    #[test]
    fn test_read_rotate() {
        let mut bs = BytesMut::new();
        bs.put_u64_le(4);
        bs.put_slice(b"mysql-bin.000002");
        let mut input = bs.freeze();
        let rd = RotateData::read_from(&mut input).unwrap();
        assert_eq!(4, rd.position);
        assert_eq!("mysql-bin.000002", rd.filename().unwrap());
    }
}
