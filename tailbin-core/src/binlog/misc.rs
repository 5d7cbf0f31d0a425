//! small event bodies with a single decoded shape
use bytes::{Buf, Bytes};
use bytes_cursor::{ReadBytesExt, ReadFromBytes, Result};

/// Data of IntvarEvent: LAST_INSERT_ID or INSERT_ID
#[derive(Debug, Clone)]
pub struct IntvarData {
    pub int_type: u8,
    pub value: u64,
}

impl ReadFromBytes for IntvarData {
    fn read_from(input: &mut Bytes) -> Result<Self> {
        let int_type = input.read_u8()?;
        let value = input.read_le_u64()?;
        Ok(IntvarData { int_type, value })
    }
}

/// Data of RandEvent
#[derive(Debug, Clone)]
pub struct RandData {
    pub seed1: u64,
    pub seed2: u64,
}

impl ReadFromBytes for RandData {
    fn read_from(input: &mut Bytes) -> Result<Self> {
        let seed1 = input.read_le_u64()?;
        let seed2 = input.read_le_u64()?;
        Ok(RandData { seed1, seed2 })
    }
}

/// Data of XidEvent: transaction commit marker
#[derive(Debug, Clone)]
pub struct XidData {
    pub xid: u64,
}

impl ReadFromBytes for XidData {
    fn read_from(input: &mut Bytes) -> Result<Self> {
        let xid = input.read_le_u64()?;
        Ok(XidData { xid })
    }
}

/// Data of UserVarEvent
///
/// the value encoding depends on its type byte, kept raw here
#[derive(Debug, Clone)]
pub struct UserVarData {
    pub name: Bytes,
    pub is_null: bool,
    pub value: Bytes,
}

impl ReadFromBytes for UserVarData {
    fn read_from(input: &mut Bytes) -> Result<Self> {
        let name_len = input.read_le_u32()?;
        let name = input.read_len(name_len as usize)?;
        let is_null = input.read_u8()? == 1;
        let value = input.split_to(input.remaining());
        Ok(UserVarData {
            name,
            is_null,
            value,
        })
    }
}

/// Data of IncidentEvent: the master met an unrecoverable condition
#[derive(Debug, Clone)]
pub struct IncidentData {
    pub incident_type: u16,
    pub message: Bytes,
}

impl ReadFromBytes for IncidentData {
    fn read_from(input: &mut Bytes) -> Result<Self> {
        let incident_type = input.read_le_u16()?;
        let message_len = input.read_u8()?;
        let message = input.read_len(message_len as usize)?;
        Ok(IncidentData {
            incident_type,
            message,
        })
    }
}

/// Data of RowsQueryLogEvent: the original statement of following
/// rows events
#[derive(Debug, Clone)]
pub struct RowsQueryData {
    pub query: Bytes,
}

impl ReadFromBytes for RowsQueryData {
    fn read_from(input: &mut Bytes) -> Result<Self> {
        // the 1-byte length is capped at 255, the statement always
        // extends to the end of the body
        input.read_u8()?;
        let query = input.split_to(input.remaining());
        Ok(RowsQueryData { query })
    }
}

/// body of events surfaced without interpretation, bytes drained
#[derive(Debug, Clone)]
pub struct OpaqueData {
    pub payload: Bytes,
}

impl ReadFromBytes for OpaqueData {
    fn read_from(input: &mut Bytes) -> Result<Self> {
        let payload = input.split_to(input.remaining());
        Ok(OpaqueData { payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    #[test]
    fn test_read_intvar() {
        let mut bs = BytesMut::new();
        bs.put_u8(2);
        bs.put_u64_le(42);
        let iv = IntvarData::read_from(&mut bs.freeze()).unwrap();
        assert_eq!(2, iv.int_type);
        assert_eq!(42, iv.value);
    }

    #[test]
    fn test_read_xid() {
        let mut bs = BytesMut::new();
        bs.put_u64_le(777);
        let xd = XidData::read_from(&mut bs.freeze()).unwrap();
        assert_eq!(777, xd.xid);
    }

    #[test]
    fn test_read_user_var() {
        let mut bs = BytesMut::new();
        bs.put_u32_le(3);
        bs.put_slice(b"foo");
        bs.put_u8(0);
        bs.put_slice(&[0, 33, 0, 0, 0, 3, 0, 0, 0, b'b', b'a', b'r']);
        let uv = UserVarData::read_from(&mut bs.freeze()).unwrap();
        assert_eq!(&b"foo"[..], &uv.name[..]);
        assert!(!uv.is_null);
        assert_eq!(12, uv.value.len());
    }

    #[test]
    fn test_read_rows_query() {
        let mut bs = BytesMut::new();
        bs.put_u8(11);
        bs.put_slice(b"insert into t values (1)");
        let rq = RowsQueryData::read_from(&mut bs.freeze()).unwrap();
        assert_eq!(&b"insert into t values (1)"[..], &rq.query[..]);
    }
}
