//! connection phase messages
//!
//! reference: https://dev.mysql.com/doc/internals/en/connection-phase-packets.html
use crate::flag::CapabilityFlags;
use bytes::{Buf, Bytes, BytesMut};
use bytes_cursor::my::LenEncInt;
use bytes_cursor::{
    Error, ReadBytesExt, ReadFromBytes, Result, WriteBytesExt, WriteToBytes,
};

/// the server greeting, protocol version 10
#[derive(Debug, Clone)]
pub struct InitialHandshake {
    pub protocol_version: u8,
    pub server_version: Bytes,
    pub connection_id: u32,
    pub auth_plugin_data_1: Bytes,
    // filler 0x00
    pub charset: u8,
    pub status_flags: u16,
    pub capability_flags: u32,
    pub auth_plugin_data_length: u8,
    // 10 reserved bytes
    pub auth_plugin_data_2: Bytes,
    pub auth_plugin_name: Bytes,
}

impl ReadFromBytes for InitialHandshake {
    fn read_from(input: &mut Bytes) -> Result<InitialHandshake> {
        let protocol_version = input.read_u8()?;
        let server_version = input.read_until(0, false)?;
        let connection_id = input.read_le_u32()?;
        let auth_plugin_data_1 = input.read_len(8)?;
        input.read_len(1)?;
        let capability_flags_lower = input.read_le_u16()?;
        if !input.has_remaining() {
            return Ok(InitialHandshake {
                protocol_version,
                server_version,
                connection_id,
                auth_plugin_data_1,
                charset: 0,
                status_flags: 0,
                capability_flags: capability_flags_lower as u32,
                auth_plugin_data_length: 0,
                auth_plugin_data_2: Bytes::new(),
                auth_plugin_name: Bytes::new(),
            });
        }
        let charset = input.read_u8()?;
        let status_flags = input.read_le_u16()?;
        let capability_flags_upper = input.read_le_u16()?;
        let capability_flags =
            (capability_flags_lower as u32) | ((capability_flags_upper as u32) << 16);
        let cap_flags = CapabilityFlags::from_bits_truncate(capability_flags);
        let auth_plugin_data_length = if cap_flags.contains(CapabilityFlags::PLUGIN_AUTH) {
            input.read_u8()?
        } else {
            input.read_len(1)?;
            0
        };
        input.read_len(10)?;
        let auth_plugin_data_2 = if cap_flags.contains(CapabilityFlags::SECURE_CONNECTION) {
            let len = std::cmp::max(13, auth_plugin_data_length.saturating_sub(8));
            input.read_len(len as usize)?
        } else {
            Bytes::new()
        };
        let auth_plugin_name = if cap_flags.contains(CapabilityFlags::PLUGIN_AUTH) {
            input.read_until(0, false)?
        } else {
            Bytes::new()
        };
        Ok(InitialHandshake {
            protocol_version,
            server_version,
            connection_id,
            auth_plugin_data_1,
            charset,
            status_flags,
            capability_flags,
            auth_plugin_data_length,
            auth_plugin_data_2,
            auth_plugin_name,
        })
    }
}

impl InitialHandshake {
    /// the scramble both halves concatenated, trailing NUL trimmed
    pub fn scramble(&self) -> Vec<u8> {
        let mut seed = Vec::with_capacity(20);
        seed.extend_from_slice(&self.auth_plugin_data_1);
        seed.extend_from_slice(&self.auth_plugin_data_2);
        while seed.last() == Some(&0) {
            seed.pop();
        }
        seed
    }
}

/// HandshakeResponse41, sent to finish the handshake
#[derive(Debug, Clone)]
pub struct HandshakeClientResponse41 {
    pub capability_flags: CapabilityFlags,
    pub max_packet_size: u32,
    pub charset: u8,
    // 23 bytes of 0x00 reserved
    pub username: String,
    pub auth_response: Vec<u8>,
    // only sent if CONNECT_WITH_DB
    pub database: String,
    // only sent if PLUGIN_AUTH
    pub auth_plugin_name: String,
    // only sent if CONNECT_ATTRS
    pub connect_attrs: Vec<ConnectAttr>,
}

impl WriteToBytes for HandshakeClientResponse41 {
    fn write_to(self, out: &mut BytesMut) -> Result<usize> {
        let mut len = 0;
        len += out.write_le_u32(self.capability_flags.bits())?;
        len += out.write_le_u32(self.max_packet_size)?;
        len += out.write_u8(self.charset)?;
        len += out.write_bytes(&[0u8; 23][..])?;
        len += out.write_bytes(self.username.as_bytes())?;
        len += out.write_u8(0)?;
        let auth_response_len = LenEncInt::from(self.auth_response.len() as u64);
        len += auth_response_len.write_to(out)?;
        len += out.write_bytes(&self.auth_response[..])?;
        if self
            .capability_flags
            .contains(CapabilityFlags::CONNECT_WITH_DB)
        {
            len += out.write_bytes(self.database.as_bytes())?;
            len += out.write_u8(0)?;
        }
        if self.capability_flags.contains(CapabilityFlags::PLUGIN_AUTH) {
            len += out.write_bytes(self.auth_plugin_name.as_bytes())?;
            len += out.write_u8(0)?;
        }
        if self
            .capability_flags
            .contains(CapabilityFlags::CONNECT_ATTRS)
        {
            let mut lb = BytesMut::new();
            for attr in &self.connect_attrs {
                LenEncInt::from(attr.key.len() as u64).write_to(&mut lb)?;
                lb.write_bytes(attr.key.as_bytes())?;
                LenEncInt::from(attr.value.len() as u64).write_to(&mut lb)?;
                lb.write_bytes(attr.value.as_bytes())?;
            }
            len += LenEncInt::from(lb.len() as u64).write_to(out)?;
            len += out.write_bytes(lb.freeze())?;
        }
        Ok(len)
    }
}

impl Default for HandshakeClientResponse41 {
    fn default() -> Self {
        HandshakeClientResponse41 {
            capability_flags: CapabilityFlags::default(),
            // max length of a three byte word
            max_packet_size: 0xffffff,
            // utf8
            charset: 33,
            username: String::new(),
            auth_response: Vec::new(),
            database: String::new(),
            auth_plugin_name: String::new(),
            connect_attrs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectAttr {
    pub key: String,
    pub value: String,
}

/// short handshake response announcing the switch to TLS, sent
/// before any credentials
///
/// reference: https://dev.mysql.com/doc/internals/en/ssl-handshake.html
#[derive(Debug, Clone)]
pub struct SslRequest {
    pub capability_flags: CapabilityFlags,
    pub max_packet_size: u32,
    pub charset: u8,
    // 23 bytes of 0x00 reserved
}

impl WriteToBytes for SslRequest {
    fn write_to(self, out: &mut BytesMut) -> Result<usize> {
        let mut len = 0;
        len += out.write_le_u32(self.capability_flags.bits())?;
        len += out.write_le_u32(self.max_packet_size)?;
        len += out.write_u8(self.charset)?;
        len += out.write_bytes(&[0u8; 23][..])?;
        Ok(len)
    }
}

impl Default for SslRequest {
    fn default() -> Self {
        SslRequest {
            capability_flags: CapabilityFlags::default() | CapabilityFlags::SSL,
            max_packet_size: 0xffffff,
            charset: 33,
        }
    }
}

/// server request to restart authentication with another plugin
#[derive(Debug, Clone)]
pub struct AuthSwitchRequest {
    pub header: u8,
    pub plugin_name: Bytes,
    pub auth_plugin_data: Bytes,
}

impl ReadFromBytes for AuthSwitchRequest {
    fn read_from(input: &mut Bytes) -> Result<Self> {
        let header = input.read_u8()?;
        if header != 0xfe {
            return Err(Error::ConstraintError(format!(
                "message header mismatch: expected=0xfe, actual={:#04x}",
                header
            )));
        }
        let plugin_name = input.read_until(0, false)?;
        let auth_plugin_data = input.split_to(input.remaining());
        Ok(AuthSwitchRequest {
            header,
            plugin_name,
            auth_plugin_data,
        })
    }
}

impl AuthSwitchRequest {
    /// scramble with the trailing NUL trimmed
    pub fn scramble(&self) -> Vec<u8> {
        let mut seed = Vec::from(&self.auth_plugin_data[..]);
        while seed.last() == Some(&0) {
            seed.pop();
        }
        seed
    }
}
