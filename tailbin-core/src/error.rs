use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("binlog checksum mismatch: expected={0:#010x}, actual={1:#010x}")]
    ChecksumMismatch(u32, u32),
    #[error("unknown column type: {0:#04x}")]
    UnknownColumnType(u8),
    #[error("invalid command code: {0:#04x}")]
    InvalidCommandCode(u8),
    #[error("parse error: {0}")]
    Parse(#[from] bytes_cursor::Error),
    #[error("utf8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
