//! connection state machine: dial, transport upgrade,
//! authentication, queries and the replication stream
use crate::auth::{self, AuthPlugin};
use crate::binlog::{activate_rows, ActiveRows, BinlogFile, MasterStatus};
use crate::dump::DumpSink;
use crate::error::{Error, Result};
use crate::msg::{RecvMsgFuture, SendMsgFuture};
use crate::query::Query;
use crate::tls::{client_config, server_name, ServerTrust};
use async_net::TcpStream;
use bytes::{Buf, Bytes};
use bytes_cursor::{ReadFromBytes, ReadFromBytesWithContext, WriteToBytes};
use futures::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use futures_rustls::client::TlsStream;
use futures_rustls::TlsConnector;
use std::io;
use std::net::ToSocketAddrs;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tailbin_core::binlog::{BinlogVersion, ChecksumMode, Event, EventReader, LogRow};
use tailbin_core::cmd::ComBinlogDump;
use tailbin_core::flag::CapabilityFlags;
use tailbin_core::handshake::{
    HandshakeClientResponse41, InitialHandshake, SslRequest,
};
use tailbin_core::packet::{ErrPacket, HandshakeMessage};

/// the transport under a connection: plain TCP, a local socket, TLS
/// wrapped TCP, or released
#[derive(Debug)]
pub enum NetStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(async_net::unix::UnixStream),
    Tls(Box<TlsStream<TcpStream>>),
    Closed,
}

impl AsyncRead for NetStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            NetStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            NetStream::Unix(s) => Pin::new(s).poll_read(cx, buf),
            NetStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            NetStream::Closed => Poll::Ready(Err(io::ErrorKind::NotConnected.into())),
        }
    }
}

impl AsyncWrite for NetStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            NetStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            NetStream::Unix(s) => Pin::new(s).poll_write(cx, buf),
            NetStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            NetStream::Closed => Poll::Ready(Err(io::ErrorKind::NotConnected.into())),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            NetStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            NetStream::Unix(s) => Pin::new(s).poll_flush(cx),
            NetStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            NetStream::Closed => Poll::Ready(Ok(())),
        }
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            NetStream::Tcp(s) => Pin::new(s).poll_close(cx),
            #[cfg(unix)]
            NetStream::Unix(s) => Pin::new(s).poll_close(cx),
            NetStream::Tls(s) => Pin::new(s.as_mut()).poll_close(cx),
            NetStream::Closed => Poll::Ready(Ok(())),
        }
    }
}

#[derive(Debug)]
pub struct Conn<S> {
    pub(crate) stream: S,
    pub(crate) pkt_nr: u8,
    pub(crate) cap_flags: CapabilityFlags,
    pub(crate) read_timeout: Option<Duration>,
    host: String,
    server_version: String,
    server_caps: CapabilityFlags,
    // scramble and plugin announced by the server greeting
    seed: Vec<u8>,
    auth_plugin_name: String,
    secure: bool,
    checksum_hint: ChecksumMode,
    reader: EventReader,
    rows: Option<ActiveRows>,
}

impl<S> Conn<S> {
    /// wrap an established transport; the caller drives the
    /// handshake
    pub fn new(stream: S) -> Self {
        Conn {
            stream,
            pkt_nr: 0,
            cap_flags: CapabilityFlags::default(),
            read_timeout: None,
            host: String::new(),
            server_version: String::new(),
            server_caps: CapabilityFlags::empty(),
            seed: Vec::new(),
            auth_plugin_name: String::new(),
            secure: false,
            checksum_hint: ChecksumMode::Auto,
            reader: EventReader::new(ChecksumMode::Auto),
            rows: None,
        }
    }

    /// version reported by the server, refreshed after
    /// authentication
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// file the event stream is currently positioned in
    pub fn binlog_file(&self) -> &str {
        self.reader.file_name()
    }

    pub fn binlog_pos(&self) -> u64 {
        self.reader.next_pos()
    }

    /// override the checksum negotiation performed by seek
    pub fn checksum_hint(&mut self, hint: ChecksumMode) {
        self.checksum_hint = hint;
    }
}

impl<S> Conn<S>
where
    S: AsyncRead + Unpin,
{
    pub(crate) fn recv_msg(&mut self) -> RecvMsgFuture<S> {
        RecvMsgFuture::new(self)
    }
}

impl<S> Conn<S>
where
    S: AsyncWrite + Unpin,
{
    /// send one logical message; a new client initiated exchange
    /// resets the sequence to 0
    pub(crate) async fn send_msg<T>(&mut self, msg: T, reset_seq: bool) -> Result<()>
    where
        T: WriteToBytes,
    {
        if reset_seq {
            self.pkt_nr = 0;
        }
        SendMsgFuture::new(self, msg)?.await
    }
}

impl<S> Conn<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// decode the server greeting; the server talks first
    pub(crate) async fn read_handshake(&mut self) -> Result<()> {
        let mut msg = self.recv_msg().await?;
        if msg.has_remaining() && msg[0] == 0xff {
            let err = ErrPacket::read_with_ctx(&mut msg, (&self.cap_flags, false))?;
            return Err(err.into());
        }
        let handshake = InitialHandshake::read_from(&mut msg)?;
        if handshake.protocol_version != 10 {
            return Err(Error::Protocol(format!(
                "unsupported protocol version: {}",
                handshake.protocol_version
            )));
        }
        let server_caps = CapabilityFlags::from_bits_truncate(handshake.capability_flags);
        if !server_caps.contains(CapabilityFlags::PROTOCOL_41) {
            return Err(Error::Protocol("server does not speak protocol 41".to_owned()));
        }
        // request only what both sides support
        self.server_caps = server_caps;
        self.cap_flags &= server_caps;
        self.cap_flags
            .insert(CapabilityFlags::PROTOCOL_41 | CapabilityFlags::LONG_FLAG);
        self.server_version = String::from_utf8_lossy(handshake.server_version.chunk()).to_string();
        self.seed = handshake.scramble();
        self.auth_plugin_name =
            String::from_utf8_lossy(handshake.auth_plugin_name.chunk()).to_string();
        log::debug!(
            "connected: server_version={}, auth_plugin={}",
            self.server_version,
            self.auth_plugin_name
        );
        Ok(())
    }

    /// run the authentication exchange
    ///
    /// at most one plugin switch is honored; on success the recorded
    /// server version is refreshed with `SELECT version()` because
    /// some managed servers greet with a stale one
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        let mut plugin = AuthPlugin::from_name(&self.auth_plugin_name)?;
        let mut seed = self.seed.clone();
        let auth_response = plugin.scramble(password, &seed, self.secure);
        let resp = HandshakeClientResponse41 {
            capability_flags: self.cap_flags,
            username: username.to_owned(),
            auth_response,
            auth_plugin_name: plugin.name().to_owned(),
            ..Default::default()
        };
        self.send_msg(resp, false).await?;

        let mut switched = false;
        loop {
            let mut msg = self.recv_msg().await?;
            let cap_flags = self.cap_flags;
            match HandshakeMessage::read_with_ctx(&mut msg, &cap_flags)? {
                HandshakeMessage::Ok(_) => break,
                HandshakeMessage::Err(err) => {
                    return Err(Error::AuthRejected(
                        String::from_utf8_lossy(err.error_message.chunk()).to_string(),
                    ))
                }
                HandshakeMessage::Switch(switch) => {
                    if switched {
                        return Err(Error::Protocol(
                            "authentication plugin switched twice".to_owned(),
                        ));
                    }
                    switched = true;
                    plugin = AuthPlugin::from_name(
                        &String::from_utf8_lossy(switch.plugin_name.chunk()),
                    )?;
                    seed = switch.scramble();
                    let resp = plugin.scramble(password, &seed, self.secure);
                    self.send_msg(&resp[..], false).await?;
                }
                HandshakeMessage::MoreData(data) => {
                    self.auth_more_data(plugin, password, &seed, data).await?;
                }
            }
        }

        // refresh the version, see above
        let mut rs = Query::new(self).qry("SELECT version()").await?;
        let mut version = None;
        while let Some(row) = rs.next().await? {
            version.get_or_insert_with(|| row.cell_str(0));
        }
        if let Some(version) = version {
            if !version.is_empty() {
                self.server_version = version;
            }
        }
        self.reader
            .set_binlog_version(BinlogVersion::from_server_version(&self.server_version));
        Ok(())
    }

    async fn auth_more_data(
        &mut self,
        plugin: AuthPlugin,
        password: &str,
        seed: &[u8],
        data: Bytes,
    ) -> Result<()> {
        match plugin {
            AuthPlugin::CachingSha2Password => match data.chunk() {
                [auth::caching_sha2::FAST_AUTH_SUCCESS] => Ok(()),
                [auth::caching_sha2::PERFORM_FULL_AUTH] => {
                    if self.secure {
                        self.send_msg(&auth::cleartext(password)[..], false).await
                    } else {
                        self.send_msg(&[auth::caching_sha2::REQUEST_PUBLIC_KEY][..], false)
                            .await?;
                        let mut msg = self.recv_msg().await?;
                        let cap_flags = self.cap_flags;
                        match HandshakeMessage::read_with_ctx(&mut msg, &cap_flags)? {
                            HandshakeMessage::MoreData(pem) => {
                                let encrypted =
                                    auth::encrypt_password(password, seed, pem.chunk())?;
                                self.send_msg(&encrypted[..], false).await
                            }
                            HandshakeMessage::Err(err) => Err(Error::AuthRejected(
                                String::from_utf8_lossy(err.error_message.chunk()).to_string(),
                            )),
                            other => Err(Error::Protocol(format!(
                                "expected server public key, got {:?}",
                                other
                            ))),
                        }
                    }
                }
                other => Err(Error::Protocol(format!(
                    "unexpected caching_sha2 status: {:02x?}",
                    other
                ))),
            },
            AuthPlugin::Sha256Password if !data.is_empty() => {
                let encrypted = auth::encrypt_password(password, seed, data.chunk())?;
                self.send_msg(&encrypted[..], false).await
            }
            _ => Err(Error::Protocol(
                "unexpected auth more data message".to_owned(),
            )),
        }
    }

    pub fn query(&mut self) -> Query<S> {
        Query::new(self)
    }

    /// SHOW BINARY LOGS
    pub async fn list_files(&mut self) -> Result<Vec<BinlogFile>> {
        let mut rs = self.query().qry("SHOW BINARY LOGS").await?;
        let mut files = Vec::new();
        while let Some(row) = rs.next().await? {
            files.push(BinlogFile {
                filename: row.cell_str(0),
                size: row.cell_str(1).parse().unwrap_or(0),
            });
        }
        Ok(files)
    }

    /// SHOW MASTER STATUS
    pub async fn master_status(&mut self) -> Result<MasterStatus> {
        let mut rs = self.query().qry("SHOW MASTER STATUS").await?;
        let mut status = None;
        while let Some(row) = rs.next().await? {
            status.get_or_insert_with(|| MasterStatus {
                file: row.cell_str(0),
                position: row.cell_str(1).parse().unwrap_or(0),
            });
        }
        status.ok_or_else(|| Error::Protocol("master status returned no rows".to_owned()))
    }

    /// ask the server to emit heartbeat events when idle
    pub async fn set_heartbeat(&mut self, interval: Duration) -> Result<()> {
        self.query()
            .exec(format!(
                "SET @master_heartbeat_period={}",
                interval.as_nanos()
            ))
            .await
    }

    /// negotiate the checksum and request the event stream
    ///
    /// a server id of 0 asks the server to stop at end of log
    /// instead of blocking for new events
    pub async fn seek(&mut self, server_id: u32, file: &str, pos: u64) -> Result<()> {
        let mode = match self.checksum_hint {
            ChecksumMode::Auto => {
                let mut rs = self
                    .query()
                    .qry("SHOW GLOBAL VARIABLES LIKE 'binlog_checksum'")
                    .await?;
                let mut value = None;
                while let Some(row) = rs.next().await? {
                    value.get_or_insert_with(|| row.cell_str(1));
                }
                match value {
                    Some(v) if !v.is_empty() && v != "NONE" => ChecksumMode::Crc32,
                    _ => ChecksumMode::None,
                }
            }
            hint => hint,
        };
        if mode == ChecksumMode::Crc32 {
            self.query()
                .exec("SET @master_binlog_checksum = @@global.binlog_checksum")
                .await?;
        }
        self.reader = EventReader::new(mode);
        self.reader
            .set_binlog_version(BinlogVersion::from_server_version(&self.server_version));
        self.reader.set_position(file, pos);
        self.rows = None;
        let dump = ComBinlogDump::default()
            .binlog_filename(file)
            .binlog_pos(pos as u32)
            .server_id(server_id)
            .non_block(server_id == 0);
        self.send_msg(dump, true).await
    }

    /// pull the next event off the replication stream
    ///
    /// `Err(EndOfStream)` is the clean non-blocking termination
    pub async fn next_event(&mut self) -> Result<Event> {
        let mut msg = self.recv_msg().await?;
        if !msg.has_remaining() {
            return Err(Error::Protocol("empty stream packet".to_owned()));
        }
        match msg[0] {
            0x00 => {
                msg.advance(1);
                let event = self.reader.read_event(&mut msg)?;
                self.rows = activate_rows(&event);
                Ok(event)
            }
            0xfe if msg.remaining() < 9 => Err(Error::EndOfStream),
            0xff => {
                let cap_flags = self.cap_flags;
                let err = ErrPacket::read_with_ctx(&mut msg, (&cap_flags, true))?;
                Err(err.into())
            }
            c => Err(Error::Protocol(format!(
                "unexpected stream marker: {:#04x}",
                c
            ))),
        }
    }

    /// pull one row pair from the rows event last returned by
    /// [Conn::next_event]; `(after, before)`, before only for updates
    pub async fn next_row(&mut self) -> Result<Option<(LogRow, Option<LogRow>)>> {
        let (reader, rows) = (&self.reader, &mut self.rows);
        let active = match rows {
            Some(active) => active,
            None => return Ok(None),
        };
        match active.next_row(reader)? {
            Some(pair) => Ok(Some(pair)),
            None => {
                self.rows = None;
                Ok(None)
            }
        }
    }

    /// stream raw events into the on-disk layout under `dir`
    ///
    /// returns on end of stream for non-blocking seeks, otherwise
    /// runs until the connection fails or is closed
    pub async fn dump<P: AsRef<std::path::Path>>(&mut self, dir: P) -> Result<()> {
        let mut sink = DumpSink::new(dir)?;
        loop {
            let mut msg = self.recv_msg().await?;
            if !msg.has_remaining() {
                return Err(Error::Protocol("empty stream packet".to_owned()));
            }
            match msg[0] {
                0x00 => {
                    msg.advance(1);
                    let raw = msg.clone();
                    let event = self.reader.read_event(&mut msg)?;
                    sink.apply(&event, &raw)?;
                }
                0xfe if msg.remaining() < 9 => return Ok(()),
                0xff => {
                    let cap_flags = self.cap_flags;
                    let err = ErrPacket::read_with_ctx(&mut msg, (&cap_flags, true))?;
                    return Err(err.into());
                }
                c => {
                    return Err(Error::Protocol(format!(
                        "unexpected stream marker: {:#04x}",
                        c
                    )))
                }
            }
        }
    }
}

impl Conn<NetStream> {
    /// connect and decode the server greeting
    ///
    /// the dial timeout also becomes the per-read transport deadline
    pub async fn dial(addr: &str, timeout: Duration) -> Result<Conn<NetStream>> {
        let socket_addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or(Error::AddrNotFound)?;
        let std_stream = std::net::TcpStream::connect_timeout(&socket_addr, timeout)?;
        std_stream.set_nonblocking(true)?;
        let stream = TcpStream::try_from(std_stream)?;
        let mut conn = Conn::new(NetStream::Tcp(stream));
        conn.read_timeout = Some(timeout);
        conn.host = addr
            .rsplit_once(':')
            .map(|(host, _)| host.to_owned())
            .unwrap_or_else(|| addr.to_owned());
        conn.read_handshake().await?;
        Ok(conn)
    }

    /// connect over a local socket, which counts as a secure
    /// transport for the authentication exchange
    #[cfg(unix)]
    pub async fn dial_unix(path: &str, timeout: Duration) -> Result<Conn<NetStream>> {
        let std_stream = std::os::unix::net::UnixStream::connect(path)?;
        std_stream.set_nonblocking(true)?;
        let stream = async_net::unix::UnixStream::try_from(std_stream)?;
        let mut conn = Conn::new(NetStream::Unix(stream));
        conn.read_timeout = Some(timeout);
        conn.secure = true;
        conn.read_handshake().await?;
        Ok(conn)
    }

    /// negotiate TLS before any credentials cross the wire
    pub async fn upgrade_tls(&mut self, trust: ServerTrust) -> Result<()> {
        if !self.server_caps.contains(CapabilityFlags::SSL) {
            return Err(Error::Protocol(
                "server does not support TLS".to_owned(),
            ));
        }
        self.cap_flags.insert(CapabilityFlags::SSL);
        let req = SslRequest {
            capability_flags: self.cap_flags,
            ..Default::default()
        };
        self.send_msg(req, false).await?;
        let config = client_config(&trust)?;
        let name = server_name(&self.host)?;
        let stream = std::mem::replace(&mut self.stream, NetStream::Closed);
        let tcp = match stream {
            NetStream::Tcp(tcp) => tcp,
            other => {
                self.stream = other;
                return Err(Error::Protocol(
                    "transport already upgraded or closed".to_owned(),
                ));
            }
        };
        let connector = TlsConnector::from(Arc::new(config));
        let tls = connector.connect(name, tcp).await?;
        self.stream = NetStream::Tls(Box::new(tls));
        self.secure = true;
        Ok(())
    }

    /// idempotent; any in-flight read fails with a connection
    /// closed error
    pub async fn close(&mut self) -> Result<()> {
        match &mut self.stream {
            NetStream::Closed => Ok(()),
            stream => {
                let _ = stream.close().await;
                self.stream = NetStream::Closed;
                Ok(())
            }
        }
    }
}
