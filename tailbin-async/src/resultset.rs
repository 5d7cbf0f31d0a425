//! streaming text result set
use crate::conn::Conn;
use crate::error::{Error, Result};
use bytes::Buf;
use bytes_cursor::ReadFromBytesWithContext;
use futures::{AsyncRead, AsyncWrite};
use tailbin_core::col::ColumnDefinition;
use tailbin_core::packet::{EofPacket, ErrPacket};
use tailbin_core::resultset::TextRow;

/// rows of one query, pulled on demand
#[derive(Debug)]
pub struct ResultSet<'a, S> {
    conn: &'a mut Conn<S>,
    pub col_defs: Vec<ColumnDefinition>,
    done: bool,
}

impl<'a, S> ResultSet<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(conn: &'a mut Conn<S>, col_defs: Vec<ColumnDefinition>) -> Self {
        ResultSet {
            conn,
            col_defs,
            done: false,
        }
    }

    pub(crate) fn empty(conn: &'a mut Conn<S>) -> Self {
        ResultSet {
            conn,
            col_defs: Vec::new(),
            done: true,
        }
    }

    /// next row, `None` after the terminating EOF
    pub async fn next(&mut self) -> Result<Option<TextRow>> {
        if self.done {
            return Ok(None);
        }
        let mut msg = self.conn.recv_msg().await?;
        if !msg.has_remaining() {
            return Err(Error::Protocol("empty result set packet".to_owned()));
        }
        match msg[0] {
            0xfe if msg.remaining() < 9 => {
                let cap_flags = self.conn.cap_flags;
                EofPacket::read_with_ctx(&mut msg, &cap_flags)?;
                self.done = true;
                Ok(None)
            }
            0xff => {
                let cap_flags = self.conn.cap_flags;
                self.done = true;
                let err = ErrPacket::read_with_ctx(&mut msg, (&cap_flags, true))?;
                Err(err.into())
            }
            _ => Ok(Some(TextRow::read_from(&mut msg, self.col_defs.len())?)),
        }
    }
}
