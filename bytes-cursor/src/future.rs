//! async counterparts of the byte cursor, implemented as hand written
//! poll futures over [futures::io::AsyncRead] and [futures::io::AsyncWrite]
use crate::error::{Error, Needed, Result};
use bytes::{Buf, Bytes, BytesMut};
use futures::io::{AsyncRead, AsyncWrite};
use futures::ready;
use std::future::Future;
use std::io::ErrorKind;
use std::pin::Pin;
use std::task::{Context, Poll};

macro_rules! read_number_future {
    ($name:ident, $ty:ty, $len:expr, $conv:expr) => {
        #[must_use = "futures do nothing unless you `.await` or poll them"]
        pub struct $name<'a, R: Unpin + ?Sized> {
            reader: &'a mut R,
            read: usize,
            buf: [u8; $len],
        }

        impl<'a, R: AsyncRead + Unpin + ?Sized> $name<'a, R> {
            pub fn new(reader: &'a mut R) -> Self {
                Self {
                    reader,
                    read: 0,
                    buf: [0; $len],
                }
            }
        }

        impl<R: AsyncRead + Unpin + ?Sized> Future for $name<'_, R> {
            type Output = Result<$ty>;

            fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
                let Self { reader, read, buf } = &mut *self;
                let mut reader = Pin::new(reader);
                loop {
                    match ready!(reader.as_mut().poll_read(cx, &mut buf[*read..])) {
                        Ok(0) => {
                            return Poll::Ready(Err(Error::InputIncomplete(
                                Bytes::new(),
                                Needed::Size($len - *read),
                            )))
                        }
                        Ok(n) => {
                            *read += n;
                            if *read == $len {
                                return Poll::Ready(Ok($conv(&buf[..])));
                            }
                        }
                        Err(ref e) if e.kind() == ErrorKind::Interrupted => (),
                        Err(e) => return Poll::Ready(Err(Error::from(e))),
                    }
                }
            }
        }
    };
}

macro_rules! write_number_future {
    ($name:ident, $ty:ty, $len:expr, $conv:expr) => {
        #[must_use = "futures do nothing unless you `.await` or poll them"]
        pub struct $name<'a, W: Unpin + ?Sized> {
            writer: &'a mut W,
            written: usize,
            buf: [u8; $len],
        }

        impl<'a, W: AsyncWrite + Unpin + ?Sized> $name<'a, W> {
            pub fn new(writer: &'a mut W, n: $ty) -> Self {
                Self {
                    writer,
                    written: 0,
                    buf: $conv(n),
                }
            }
        }

        impl<W: AsyncWrite + Unpin + ?Sized> Future for $name<'_, W> {
            type Output = Result<()>;

            fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
                let Self {
                    writer,
                    written,
                    buf,
                } = &mut *self;
                let mut writer = Pin::new(writer);
                loop {
                    match ready!(writer.as_mut().poll_write(cx, &buf[*written..])) {
                        Ok(0) => return Poll::Ready(Err(Error::OutputUnavailable)),
                        Ok(n) => {
                            *written += n;
                            if *written == $len {
                                return Poll::Ready(Ok(()));
                            }
                        }
                        Err(ref e) if e.kind() == ErrorKind::Interrupted => (),
                        Err(e) => return Poll::Ready(Err(Error::from(e))),
                    }
                }
            }
        }
    };
}

pub trait AsyncReadBytesExt: AsyncRead {
    fn read_u8(&mut self) -> ReadU8Future<Self>
    where
        Self: Unpin,
    {
        ReadU8Future(self)
    }

    fn read_le_u16(&mut self) -> ReadLeU16Future<Self>
    where
        Self: Unpin,
    {
        ReadLeU16Future::new(self)
    }

    fn read_le_u24(&mut self) -> ReadLeU24Future<Self>
    where
        Self: Unpin,
    {
        ReadLeU24Future::new(self)
    }

    fn read_le_u32(&mut self) -> ReadLeU32Future<Self>
    where
        Self: Unpin,
    {
        ReadLeU32Future::new(self)
    }

    fn read_len(&mut self, n: usize) -> ReadLenFuture<Self>
    where
        Self: Unpin,
    {
        ReadLenFuture::new(self, n)
    }
}

impl<R: AsyncRead + ?Sized> AsyncReadBytesExt for R {}

#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct ReadU8Future<'a, R: Unpin + ?Sized>(pub &'a mut R);

impl<R: AsyncRead + Unpin + ?Sized> Future for ReadU8Future<'_, R> {
    type Output = Result<u8>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut b = 0;
        let mut reader = Pin::new(&mut self.0);
        loop {
            match ready!(reader.as_mut().poll_read(cx, std::slice::from_mut(&mut b))) {
                Ok(0) => {
                    return Poll::Ready(Err(Error::InputIncomplete(Bytes::new(), Needed::Size(1))))
                }
                Ok(..) => return Poll::Ready(Ok(b)),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => (),
                Err(e) => return Poll::Ready(Err(Error::from(e))),
            }
        }
    }
}

read_number_future!(ReadLeU16Future, u16, 2, to_le_u16);

#[inline]
fn to_le_u16(bs: &[u8]) -> u16 {
    debug_assert_eq!(2, bs.len());
    bs[0] as u16 + ((bs[1] as u16) << 8)
}

read_number_future!(ReadLeU24Future, u32, 3, to_le_u24);

#[inline]
fn to_le_u24(bs: &[u8]) -> u32 {
    debug_assert_eq!(3, bs.len());
    bs[0] as u32 + ((bs[1] as u32) << 8) + ((bs[2] as u32) << 16)
}

read_number_future!(ReadLeU32Future, u32, 4, to_le_u32);

#[inline]
fn to_le_u32(bs: &[u8]) -> u32 {
    debug_assert_eq!(4, bs.len());
    bs[0] as u32 + ((bs[1] as u32) << 8) + ((bs[2] as u32) << 16) + ((bs[3] as u32) << 24)
}

pub struct ReadLenFuture<'a, R: Unpin + ?Sized> {
    reader: &'a mut R,
    read: usize,
    buf: Vec<u8>,
}

impl<'a, R: AsyncRead + Unpin + ?Sized> ReadLenFuture<'a, R> {
    pub fn new(reader: &'a mut R, n: usize) -> Self {
        Self {
            reader,
            read: 0,
            buf: vec![0; n],
        }
    }
}

impl<R: AsyncRead + Unpin + ?Sized> Future for ReadLenFuture<'_, R> {
    type Output = Result<Vec<u8>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Self { reader, read, buf } = &mut *self;
        if *read == buf.len() {
            return Poll::Ready(Ok(std::mem::take(buf)));
        }
        let mut reader = Pin::new(reader);
        loop {
            match ready!(reader.as_mut().poll_read(cx, &mut buf[*read..])) {
                Ok(0) => {
                    return Poll::Ready(Err(Error::InputIncomplete(
                        Bytes::new(),
                        Needed::Size(buf.len() - *read),
                    )))
                }
                Ok(n) if *read + n == buf.len() => {
                    *read += n;
                    return Poll::Ready(Ok(std::mem::take(buf)));
                }
                Ok(n) => {
                    *read += n;
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => (),
                Err(e) => return Poll::Ready(Err(Error::from(e))),
            }
        }
    }
}

/// reads exactly n bytes appending them to the caller's buffer,
/// so one growable buffer can collect a multi packet message
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct ReadLenOutFuture<'a, 'b, R: Unpin + ?Sized> {
    pub reader: &'a mut R,
    // remaining bytes, decreases as chunks arrive so the future
    // stays resumable across pending polls
    pub n: usize,
    pub out: &'b mut BytesMut,
}

impl<R: AsyncRead + Unpin + ?Sized> Future for ReadLenOutFuture<'_, '_, R> {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Self { reader, n, out } = &mut *self;
        let mut reader = Pin::new(reader);
        let mut tmp = [0u8; 8192];
        loop {
            if *n == 0 {
                return Poll::Ready(Ok(()));
            }
            let want = usize::min(*n, tmp.len());
            match ready!(reader.as_mut().poll_read(cx, &mut tmp[..want])) {
                Ok(0) => {
                    return Poll::Ready(Err(Error::InputIncomplete(
                        Bytes::new(),
                        Needed::Size(*n),
                    )))
                }
                Ok(m) => {
                    out.extend_from_slice(&tmp[..m]);
                    *n -= m;
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => (),
                Err(e) => return Poll::Ready(Err(Error::from(e))),
            }
        }
    }
}

pub trait AsyncWriteBytesExt: AsyncWrite {
    fn write_u8(&mut self, n: u8) -> WriteU8Future<Self>
    where
        Self: Unpin,
    {
        WriteU8Future::new(self, n)
    }

    fn write_le_u16(&mut self, n: u16) -> WriteLeU16Future<Self>
    where
        Self: Unpin,
    {
        WriteLeU16Future::new(self, n)
    }

    fn write_le_u24(&mut self, n: u32) -> WriteLeU24Future<Self>
    where
        Self: Unpin,
    {
        WriteLeU24Future::new(self, n)
    }

    fn write_le_u32(&mut self, n: u32) -> WriteLeU32Future<Self>
    where
        Self: Unpin,
    {
        WriteLeU32Future::new(self, n)
    }

    fn write_bytes<'w, 'b>(&'w mut self, bs: &'b mut Bytes) -> WriteBytesFuture<'w, 'b, Self>
    where
        Self: Unpin,
    {
        WriteBytesFuture { writer: self, bs }
    }
}

impl<W: AsyncWrite + ?Sized> AsyncWriteBytesExt for W {}

write_number_future!(WriteU8Future, u8, 1, u8::to_le_bytes);

write_number_future!(WriteLeU16Future, u16, 2, u16::to_le_bytes);

write_number_future!(WriteLeU24Future, u32, 3, u24_to_le_bytes);

fn u24_to_le_bytes(n: u32) -> [u8; 3] {
    [
        (n & 0xff) as u8,
        ((n >> 8) & 0xff) as u8,
        ((n >> 16) & 0xff) as u8,
    ]
}

write_number_future!(WriteLeU32Future, u32, 4, u32::to_le_bytes);

#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Debug)]
pub struct WriteBytesFuture<'w, 'b, W: Unpin + ?Sized> {
    pub writer: &'w mut W,
    pub bs: &'b mut Bytes,
}

impl<W> Future for WriteBytesFuture<'_, '_, W>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if !self.bs.has_remaining() {
            return Poll::Ready(Ok(()));
        }
        let Self { writer, bs } = &mut *self;
        let mut writer = Pin::new(writer);
        loop {
            match ready!(writer.as_mut().poll_write(cx, bs.chunk())) {
                Ok(0) => return Poll::Ready(Err(Error::OutputUnavailable)),
                Ok(n) => {
                    bs.advance(n);
                    if !bs.has_remaining() {
                        return Poll::Ready(Ok(()));
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => (),
                Err(e) => return Poll::Ready(Err(Error::from(e))),
            }
        }
    }
}
