//! message framing: length prefixed frames with a rolling sequence
//! number, concatenated until a frame shorter than the maximum
//!
//! all progress lives in buffers owned by the future, so a pending
//! poll never loses partially transferred bytes
//!
//! reference: https://dev.mysql.com/doc/internals/en/sending-more-than-16mbyte.html
use crate::conn::Conn;
use crate::error::{Error, Result};
use async_io::Timer;
use bytes::{Buf, Bytes, BytesMut};
use bytes_cursor::future::{ReadLenOutFuture, WriteBytesFuture};
use bytes_cursor::{WriteBytesExt, WriteToBytes};
use futures::{ready, AsyncRead, AsyncWrite};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pub(crate) const MAX_PAYLOAD_LEN: usize = 0xff_ffff;

#[derive(Debug, Clone, Copy)]
enum MsgState {
    Header,
    Payload,
}

/// collects the frames of one logical message
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct RecvMsgFuture<'s, S> {
    conn: &'s mut Conn<S>,
    state: MsgState,
    hdr: BytesMut,
    out: BytesMut,
    curr_len: usize,
    // length of `out` when the current frame started
    frame_base: usize,
    deadline: Option<Timer>,
}

impl<'s, S> RecvMsgFuture<'s, S>
where
    S: AsyncRead + Unpin,
{
    pub(crate) fn new(conn: &'s mut Conn<S>) -> Self {
        let deadline = conn.read_timeout.map(Timer::after);
        RecvMsgFuture {
            conn,
            state: MsgState::Header,
            hdr: BytesMut::with_capacity(4),
            out: BytesMut::new(),
            curr_len: 0,
            frame_base: 0,
            deadline,
        }
    }
}

impl<S> Future for RecvMsgFuture<'_, S>
where
    S: AsyncRead + Unpin,
{
    type Output = Result<Bytes>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(deadline) = &mut self.deadline {
            if Pin::new(deadline).poll(cx).is_ready() {
                return Poll::Ready(Err(Error::Timeout));
            }
        }
        loop {
            match self.state {
                MsgState::Header => {
                    let Self { conn, hdr, .. } = &mut *self;
                    let mut fut = ReadLenOutFuture {
                        reader: &mut conn.stream,
                        n: 4 - hdr.len(),
                        out: hdr,
                    };
                    match ready!(Pin::new(&mut fut).poll(cx)) {
                        Ok(_) => {
                            let hdr = &self.hdr;
                            let len = hdr[0] as usize + ((hdr[1] as usize) << 8)
                                + ((hdr[2] as usize) << 16);
                            let seq = hdr[3];
                            if seq != self.conn.pkt_nr {
                                return Poll::Ready(Err(Error::PacketOutOfOrder {
                                    expected: self.conn.pkt_nr,
                                    actual: seq,
                                }));
                            }
                            self.conn.pkt_nr = self.conn.pkt_nr.wrapping_add(1);
                            self.curr_len = len;
                            self.frame_base = self.out.len();
                            self.hdr.clear();
                            self.state = MsgState::Payload;
                        }
                        Err(e) => return Poll::Ready(Err(e.into())),
                    }
                }
                MsgState::Payload => {
                    let Self {
                        conn,
                        out,
                        curr_len,
                        frame_base,
                        ..
                    } = &mut *self;
                    let mut fut = ReadLenOutFuture {
                        reader: &mut conn.stream,
                        n: *curr_len - (out.len() - *frame_base),
                        out,
                    };
                    match ready!(Pin::new(&mut fut).poll(cx)) {
                        Ok(_) => {
                            if self.curr_len < MAX_PAYLOAD_LEN {
                                log::debug!(
                                    "completed message: total_len={}, pkt_nr={}",
                                    self.out.len(),
                                    self.conn.pkt_nr
                                );
                                let len = self.out.len();
                                let msg = self.out.split_to(len).freeze();
                                return Poll::Ready(Ok(msg));
                            }
                            // a maximum sized frame is never terminal,
                            // at least one more frame follows
                            self.state = MsgState::Header;
                        }
                        Err(e) => return Poll::Ready(Err(e.into())),
                    }
                }
            }
        }
    }
}

/// splits one logical message into frames, appending the empty
/// terminator frame after a maximum sized one
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct SendMsgFuture<'s, S> {
    conn: &'s mut Conn<S>,
    bs: Bytes,
    // header and payload of the frame currently on the wire
    hdr: Bytes,
    frame: Bytes,
    framed: bool,
    state: MsgState,
    // set once the final, shorter-than-maximum frame is cut
    last: bool,
}

impl<'s, S> SendMsgFuture<'s, S>
where
    S: AsyncWrite + Unpin,
{
    pub(crate) fn new<T>(conn: &'s mut Conn<S>, msg: T) -> Result<Self>
    where
        T: WriteToBytes,
    {
        let mut buf = BytesMut::new();
        msg.write_to(&mut buf)?;
        Ok(Self::new_bytes(conn, buf.freeze()))
    }

    pub(crate) fn new_bytes(conn: &'s mut Conn<S>, bs: Bytes) -> Self {
        SendMsgFuture {
            conn,
            bs,
            hdr: Bytes::new(),
            frame: Bytes::new(),
            framed: false,
            state: MsgState::Header,
            last: false,
        }
    }
}

impl<S> Future for SendMsgFuture<'_, S>
where
    S: AsyncWrite + Unpin,
{
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            match self.state {
                MsgState::Header => {
                    if !self.framed {
                        let n = usize::min(self.bs.remaining(), MAX_PAYLOAD_LEN);
                        self.last = n < MAX_PAYLOAD_LEN;
                        let frame = self.bs.split_to(n);
                        self.frame = frame;
                        let mut hdr = BytesMut::with_capacity(4);
                        // won't fail to append to a buffer
                        hdr.write_le_u24(n as u32).unwrap();
                        hdr.write_u8(self.conn.pkt_nr).unwrap();
                        self.conn.pkt_nr = self.conn.pkt_nr.wrapping_add(1);
                        self.hdr = hdr.freeze();
                        self.framed = true;
                    }
                    let Self { conn, hdr, .. } = &mut *self;
                    let mut fut = WriteBytesFuture {
                        writer: &mut conn.stream,
                        bs: hdr,
                    };
                    match ready!(Pin::new(&mut fut).poll(cx)) {
                        Ok(_) => {
                            self.state = MsgState::Payload;
                        }
                        Err(e) => return Poll::Ready(Err(e.into())),
                    }
                }
                MsgState::Payload => {
                    let Self { conn, frame, .. } = &mut *self;
                    let mut fut = WriteBytesFuture {
                        writer: &mut conn.stream,
                        bs: frame,
                    };
                    match ready!(Pin::new(&mut fut).poll(cx)) {
                        Ok(_) => {
                            if self.last {
                                return Poll::Ready(Ok(()));
                            }
                            self.framed = false;
                            self.state = MsgState::Header;
                        }
                        Err(e) => return Poll::Ready(Err(e.into())),
                    }
                }
            }
        }
    }
}
