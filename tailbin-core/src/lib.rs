//! MySQL protocol messages, the binlog event decoder and the row
//! value decoder
#![forbid(unsafe_code)]

pub mod binlog;
mod bitmap;
pub mod cmd;
pub mod col;
pub mod decimal;
pub mod error;
pub mod flag;
pub mod handshake;
pub mod json;
pub mod packet;
pub mod resultset;
pub mod time;
mod util;
pub mod value;

pub use crate::error::{Error, Result};

/// command codes of the client requests this library sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    Query,
    Ping,
    BinlogDump,
    RegisterSlave,
}

impl Command {
    pub fn to_byte(self) -> u8 {
        match self {
            Command::Quit => 0x01,
            Command::Query => 0x03,
            Command::Ping => 0x0e,
            Command::BinlogDump => 0x12,
            Command::RegisterSlave => 0x15,
        }
    }
}
