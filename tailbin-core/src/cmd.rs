//! client commands issued by this library
use crate::error::{Error, Result};
use crate::Command;
use bytes::{Buf, Bytes, BytesMut};
use bytes_cursor::{ReadBytesExt, ReadFromBytes, WriteBytesExt, WriteToBytes};
use std::convert::TryFrom;

/// COM_QUERY: plain text statement
///
/// reference: https://dev.mysql.com/doc/internals/en/com-query.html
#[derive(Debug, Clone)]
pub struct ComQuery {
    pub cmd: Command,
    pub query: String,
}

impl ComQuery {
    pub fn new<Q: Into<String>>(query: Q) -> Self {
        ComQuery {
            cmd: Command::Query,
            query: query.into(),
        }
    }
}

impl WriteToBytes for ComQuery {
    fn write_to(self, out: &mut BytesMut) -> bytes_cursor::Result<usize> {
        let mut len = 0;
        len += out.write_u8(self.cmd.to_byte())?;
        len += out.write_bytes(self.query.as_bytes())?;
        Ok(len)
    }
}

/// COM_BINLOG_DUMP: request the event stream from a given position
///
/// a flags value of 0x01 makes the server stop at end of log instead
/// of blocking for more events
///
/// reference: https://dev.mysql.com/doc/internals/en/com-binlog-dump.html
#[derive(Debug, Clone)]
pub struct ComBinlogDump {
    pub cmd: Command,
    pub binlog_pos: u32,
    pub flags: u16,
    pub server_id: u32,
    pub binlog_filename: String,
}

impl ComBinlogDump {
    pub fn binlog_pos(mut self, binlog_pos: u32) -> Self {
        self.binlog_pos = binlog_pos;
        self
    }

    pub fn binlog_filename<S: Into<String>>(mut self, binlog_filename: S) -> Self {
        self.binlog_filename = binlog_filename.into();
        self
    }

    pub fn server_id(mut self, server_id: u32) -> Self {
        self.server_id = server_id;
        self
    }

    /// see https://github.com/mysql/mysql-server/blob/5.7/sql/rpl_binlog_sender.cc#L129
    pub fn non_block(mut self, non_block: bool) -> Self {
        self.flags = if non_block { 0x01 } else { 0x00 };
        self
    }
}

impl Default for ComBinlogDump {
    fn default() -> Self {
        ComBinlogDump {
            cmd: Command::BinlogDump,
            binlog_pos: 4,
            flags: 0,
            server_id: 0,
            binlog_filename: String::new(),
        }
    }
}

impl ReadFromBytes for ComBinlogDump {
    fn read_from(input: &mut Bytes) -> bytes_cursor::Result<Self> {
        let cmd = input.read_u8()?;
        let cmd = Command::try_from(cmd).map_err(|_| {
            bytes_cursor::Error::ConstraintError(format!(
                "invalid command code: expected=0x12, actual={:#04x}",
                cmd
            ))
        })?;
        let binlog_pos = input.read_le_u32()?;
        let flags = input.read_le_u16()?;
        let server_id = input.read_le_u32()?;
        let binlog_filename = input.split_to(input.remaining());
        let binlog_filename = String::from_utf8(Vec::from(&binlog_filename[..]))?;
        Ok(ComBinlogDump {
            cmd,
            binlog_pos,
            flags,
            server_id,
            binlog_filename,
        })
    }
}

impl WriteToBytes for ComBinlogDump {
    fn write_to(self, out: &mut BytesMut) -> bytes_cursor::Result<usize> {
        let mut len = 0;
        len += out.write_u8(self.cmd.to_byte())?;
        len += out.write_le_u32(self.binlog_pos)?;
        len += out.write_le_u16(self.flags)?;
        len += out.write_le_u32(self.server_id)?;
        len += out.write_bytes(self.binlog_filename.as_bytes())?;
        Ok(len)
    }
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(src: u8) -> Result<Self> {
        let cmd = match src {
            0x01 => Command::Quit,
            0x03 => Command::Query,
            0x0e => Command::Ping,
            0x12 => Command::BinlogDump,
            0x15 => Command::RegisterSlave,
            _ => return Err(Error::InvalidCommandCode(src)),
        };
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_com_query() {
        let qry = ComQuery::new("select 1");
        let mut out = BytesMut::new();
        qry.write_to(&mut out).unwrap();
        assert_eq!(&b"\x03select 1"[..], &out[..]);
    }

    #[test]
    fn test_binlog_dump_cmd() {
        let dump = ComBinlogDump::default()
            .binlog_filename("mysql-bin.000001")
            .binlog_pos(4)
            .non_block(true)
            .server_id(123);
        let mut buf = BytesMut::new();
        dump.write_to(&mut buf).unwrap();
        let decoded = ComBinlogDump::read_from(&mut buf.freeze()).unwrap();
        assert_eq!(0x12, decoded.cmd.to_byte());
        assert_eq!(0x01, decoded.flags);
        assert_eq!("mysql-bin.000001", decoded.binlog_filename);
        assert_eq!(4, decoded.binlog_pos);
        assert_eq!(123, decoded.server_id);
    }

    #[test]
    fn test_binlog_dump_layout() {
        let dump = ComBinlogDump::default()
            .binlog_filename("f")
            .binlog_pos(0x11223344)
            .server_id(0x55667788);
        let mut buf = BytesMut::new();
        dump.write_to(&mut buf).unwrap();
        assert_eq!(
            &[
                0x12, 0x44, 0x33, 0x22, 0x11, 0x00, 0x00, 0x88, 0x77, 0x66, 0x55, b'f'
            ][..],
            &buf[..]
        );
    }
}
