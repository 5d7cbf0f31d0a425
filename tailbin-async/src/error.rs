use bytes::Buf;
use tailbin_core::packet::ErrPacket;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("address not found")]
    AddrNotFound,
    #[error("transport read timed out")]
    Timeout,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("packet out of order: expected={expected}, actual={actual}")]
    PacketOutOfOrder { expected: u8, actual: u8 },
    #[error("parse error: {0}")]
    Parse(#[from] bytes_cursor::Error),
    #[error(transparent)]
    Core(#[from] tailbin_core::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),
    #[error("unsupported auth plugin: {0}")]
    UnsupportedAuthPlugin(String),
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
    #[error("sql error: {0:?}")]
    Sql(SqlError),
    // clean termination of a non-blocking stream, a signal rather
    // than a fault
    #[error("end of stream")]
    EndOfStream,
}

#[derive(Debug, Clone)]
pub struct SqlError {
    pub error_code: u16,
    pub sql_state: String,
    pub error_message: String,
}

impl From<ErrPacket> for Error {
    fn from(err: ErrPacket) -> Error {
        Error::Sql(SqlError {
            error_code: err.error_code,
            sql_state: String::from_utf8_lossy(err.sql_state.chunk()).to_string(),
            error_message: String::from_utf8_lossy(err.error_message.chunk()).to_string(),
        })
    }
}
