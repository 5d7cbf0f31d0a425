use bytes::{Buf, Bytes};
use bytes_cursor::{ReadBytesExt, ReadFromBytes, Result};

/// Data of QueryEvent
///
/// only the declared body is decoded, status variables stay raw
///
/// reference: https://dev.mysql.com/doc/internals/en/query-event.html
#[derive(Debug, Clone)]
pub struct QueryData {
    pub slave_proxy_id: u32,
    pub execution_time: u32,
    pub error_code: u16,
    pub status_vars: Bytes,
    pub schema: Bytes,
    pub query: Bytes,
}

impl ReadFromBytes for QueryData {
    fn read_from(input: &mut Bytes) -> Result<Self> {
        let slave_proxy_id = input.read_le_u32()?;
        let execution_time = input.read_le_u32()?;
        let schema_len = input.read_u8()?;
        let error_code = input.read_le_u16()?;
        let status_vars_len = input.read_le_u16()?;
        let status_vars = input.read_len(status_vars_len as usize)?;
        let schema = input.read_len(schema_len as usize)?;
        input.read_len(1)?;
        let query = input.split_to(input.remaining());
        Ok(QueryData {
            slave_proxy_id,
            execution_time,
            error_code,
            status_vars,
            schema,
            query,
        })
    }
}
