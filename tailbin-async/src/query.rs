//! plain text query execution
use crate::conn::Conn;
use crate::error::{Error, Result};
use crate::resultset::ResultSet;
use bytes::Buf;
use bytes_cursor::my::ReadMyEnc;
use bytes_cursor::ReadFromBytesWithContext;
use futures::{AsyncRead, AsyncWrite};
use tailbin_core::cmd::ComQuery;
use tailbin_core::col::ColumnDefinition;
use tailbin_core::packet::{EofPacket, ErrPacket, OkPacket};

/// wrapper over a connection providing COM_QUERY
#[derive(Debug)]
pub struct Query<'a, S> {
    conn: &'a mut Conn<S>,
}

impl<'a, S> Query<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(conn: &'a mut Conn<S>) -> Self {
        Query { conn }
    }

    /// execute a statement that returns no rows
    pub async fn exec<Q: Into<String>>(self, qry: Q) -> Result<()> {
        let qry = ComQuery::new(qry);
        self.conn.send_msg(qry, true).await?;
        let mut msg = self.conn.recv_msg().await?;
        if !msg.has_remaining() {
            return Err(Error::Protocol("empty query response".to_owned()));
        }
        match msg[0] {
            0xff => {
                let cap_flags = self.conn.cap_flags;
                let err = ErrPacket::read_with_ctx(&mut msg, (&cap_flags, true))?;
                Err(err.into())
            }
            0x00 => {
                let cap_flags = self.conn.cap_flags;
                OkPacket::read_with_ctx(&mut msg, &cap_flags)?;
                Ok(())
            }
            _ => Err(Error::Protocol(
                "statement unexpectedly returned rows".to_owned(),
            )),
        }
    }

    /// execute a query and stream its text result set
    pub async fn qry<Q: Into<String>>(self, qry: Q) -> Result<ResultSet<'a, S>> {
        let qry = ComQuery::new(qry);
        self.conn.send_msg(qry, true).await?;
        let mut msg = self.conn.recv_msg().await?;
        if !msg.has_remaining() {
            return Err(Error::Protocol("empty query response".to_owned()));
        }
        match msg[0] {
            0xff => {
                let cap_flags = self.conn.cap_flags;
                let err = ErrPacket::read_with_ctx(&mut msg, (&cap_flags, true))?;
                return Err(err.into());
            }
            0x00 => {
                // no result set, e.g. SHOW on an empty server
                let cap_flags = self.conn.cap_flags;
                OkPacket::read_with_ctx(&mut msg, &cap_flags)?;
                return Ok(ResultSet::empty(self.conn));
            }
            _ => {}
        }
        let col_cnt = msg
            .read_len_enc_int()?
            .to_u64()
            .ok_or_else(|| Error::Protocol("invalid column count".to_owned()))?
            as usize;
        let mut col_defs = Vec::with_capacity(col_cnt);
        for _ in 0..col_cnt {
            let mut msg = self.conn.recv_msg().await?;
            col_defs.push(ColumnDefinition::read_with_ctx(&mut msg, ())?);
        }
        // the definitions are terminated by an EOF packet
        let mut msg = self.conn.recv_msg().await?;
        if msg.has_remaining() && msg[0] == 0xfe && msg.remaining() < 9 {
            let cap_flags = self.conn.cap_flags;
            EofPacket::read_with_ctx(&mut msg, &cap_flags)?;
        } else {
            return Err(Error::Protocol(
                "missing EOF after column definitions".to_owned(),
            ));
        }
        Ok(ResultSet::new(self.conn, col_defs))
    }
}
