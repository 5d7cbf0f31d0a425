//! MySQL replication client: connection handshake and
//! authentication, query plumbing, the binlog event stream, a dump
//! sink and its local directory reader
#![forbid(unsafe_code)]

mod auth;
pub mod binlog;
pub mod conn;
pub mod dump;
pub mod error;
pub mod local;
mod msg;
pub mod query;
pub mod resultset;
pub mod tls;

pub use crate::binlog::{BinlogFile, MasterStatus};
pub use crate::conn::{Conn, NetStream};
pub use crate::dump::DumpSink;
pub use crate::error::{Error, Result};
pub use crate::local::LocalBinlog;
pub use crate::tls::ServerTrust;
