//! result packets shared by all command responses
use crate::flag::{CapabilityFlags, StatusFlags};
use crate::handshake::AuthSwitchRequest;
use bytes::{Buf, Bytes};
use bytes_cursor::my::ReadMyEnc;
use bytes_cursor::{Error, Needed, ReadBytesExt, ReadFromBytes, ReadFromBytesWithContext, Result};

/// MySQL packet: one transport frame
///
/// reference: https://dev.mysql.com/doc/internals/en/mysql-packet.html
#[derive(Debug, Clone)]
pub struct Packet {
    pub payload_len: u32,
    pub seq_id: u8,
    pub payload: Bytes,
}

impl ReadFromBytes for Packet {
    fn read_from(input: &mut Bytes) -> Result<Packet> {
        let payload_len = input.read_le_u24()?;
        let seq_id = input.read_u8()?;
        let payload = input.read_len(payload_len as usize)?;
        Ok(Packet {
            payload_len,
            seq_id,
            payload,
        })
    }
}

/// generic command response
#[derive(Debug, Clone)]
pub enum Message {
    Ok(OkPacket),
    Err(ErrPacket),
    Eof(EofPacket),
}

impl<'c> ReadFromBytesWithContext<'c> for Message {
    type Context = &'c CapabilityFlags;

    fn read_with_ctx(input: &mut Bytes, cap_flags: Self::Context) -> Result<Self> {
        if !input.has_remaining() {
            return Err(Error::InputIncomplete(Bytes::new(), Needed::Unknown));
        }
        match input[0] {
            0x00 => Ok(Message::Ok(OkPacket::read_with_ctx(input, cap_flags)?)),
            0xff => Ok(Message::Err(ErrPacket::read_with_ctx(
                input,
                (cap_flags, true),
            )?)),
            0xfe => Ok(Message::Eof(EofPacket::read_with_ctx(input, cap_flags)?)),
            c => Err(Error::ConstraintError(format!(
                "invalid packet code {:#04x}",
                c
            ))),
        }
    }
}

/// server message during the authentication exchange
#[derive(Debug, Clone)]
pub enum HandshakeMessage {
    Ok(OkPacket),
    Err(ErrPacket),
    Switch(AuthSwitchRequest),
    MoreData(Bytes),
}

impl<'c> ReadFromBytesWithContext<'c> for HandshakeMessage {
    type Context = &'c CapabilityFlags;

    fn read_with_ctx(input: &mut Bytes, cap_flags: Self::Context) -> Result<Self> {
        if !input.has_remaining() {
            return Err(Error::InputIncomplete(Bytes::new(), Needed::Unknown));
        }
        match input[0] {
            0x00 => Ok(HandshakeMessage::Ok(OkPacket::read_with_ctx(
                input, cap_flags,
            )?)),
            0xff => Ok(HandshakeMessage::Err(ErrPacket::read_with_ctx(
                input,
                (cap_flags, false),
            )?)),
            0xfe => Ok(HandshakeMessage::Switch(AuthSwitchRequest::read_from(
                input,
            )?)),
            0x01 => {
                input.read_u8()?;
                Ok(HandshakeMessage::MoreData(
                    input.split_to(input.remaining()),
                ))
            }
            c => Err(Error::ConstraintError(format!(
                "invalid packet code {:#04x}",
                c
            ))),
        }
    }
}

/// Ok Packet
///
/// reference: https://dev.mysql.com/doc/internals/en/packet-OK_Packet.html
#[derive(Debug, Clone)]
pub struct OkPacket {
    pub header: u8,
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: StatusFlags,
    pub warnings: u16,
    pub info: Bytes,
    pub session_state_changes: Bytes,
}

impl<'c> ReadFromBytesWithContext<'c> for OkPacket {
    type Context = &'c CapabilityFlags;

    fn read_with_ctx(input: &mut Bytes, cap_flags: Self::Context) -> Result<OkPacket> {
        // header can be either 0x00 or 0xfe
        let header = input.read_u8()?;
        let affected_rows = input
            .read_len_enc_int()?
            .to_u64()
            .ok_or_else(|| Error::ConstraintError("invalid affected rows".to_owned()))?;
        let last_insert_id = input
            .read_len_enc_int()?
            .to_u64()
            .ok_or_else(|| Error::ConstraintError("invalid last insert id".to_owned()))?;
        let status_flags = if cap_flags.contains(CapabilityFlags::PROTOCOL_41)
            || cap_flags.contains(CapabilityFlags::TRANSACTIONS)
        {
            StatusFlags::from_bits_truncate(input.read_le_u16()?)
        } else {
            StatusFlags::empty()
        };
        let warnings = if cap_flags.contains(CapabilityFlags::PROTOCOL_41) {
            input.read_le_u16()?
        } else {
            0
        };
        let info = if cap_flags.contains(CapabilityFlags::SESSION_TRACK) {
            if input.has_remaining() {
                input
                    .read_len_enc_str()?
                    .into_bytes()
                    .ok_or_else(|| Error::ConstraintError("invalid info".to_owned()))?
            } else {
                Bytes::new()
            }
        } else {
            input.split_to(input.remaining())
        };
        let session_state_changes = if cap_flags.contains(CapabilityFlags::SESSION_TRACK)
            && status_flags.contains(StatusFlags::SESSION_STATE_CHANGED)
        {
            input
                .read_len_enc_str()?
                .into_bytes()
                .ok_or_else(|| Error::ConstraintError("invalid session state changes".to_owned()))?
        } else {
            Bytes::new()
        };
        Ok(OkPacket {
            header,
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
            info,
            session_state_changes,
        })
    }
}

/// Err Packet
///
/// reference: https://dev.mysql.com/doc/internals/en/packet-ERR_Packet.html
#[derive(Debug, Clone)]
pub struct ErrPacket {
    pub header: u8,
    pub error_code: u16,
    // only present after the initial handshake
    pub sql_state_marker: u8,
    pub sql_state: Bytes,
    pub error_message: Bytes,
}

impl<'c> ReadFromBytesWithContext<'c> for ErrPacket {
    type Context = (&'c CapabilityFlags, bool);

    fn read_with_ctx(input: &mut Bytes, (cap_flags, sql): Self::Context) -> Result<ErrPacket> {
        let header = input.read_u8()?;
        let error_code = input.read_le_u16()?;
        let (sql_state_marker, sql_state) =
            if sql && cap_flags.contains(CapabilityFlags::PROTOCOL_41) {
                let sql_state_marker = input.read_u8()?;
                let sql_state = input.read_len(5)?;
                (sql_state_marker, sql_state)
            } else {
                (0u8, Bytes::new())
            };
        let error_message = input.split_to(input.remaining());
        Ok(ErrPacket {
            header,
            error_code,
            sql_state_marker,
            sql_state,
            error_message,
        })
    }
}

/// EOF Packet
///
/// reference: https://dev.mysql.com/doc/internals/en/packet-EOF_Packet.html
#[derive(Debug, Clone)]
pub struct EofPacket {
    pub header: u8,
    pub warnings: u16,
    pub status_flags: StatusFlags,
}

impl<'c> ReadFromBytesWithContext<'c> for EofPacket {
    type Context = &'c CapabilityFlags;

    fn read_with_ctx(input: &mut Bytes, cap_flags: Self::Context) -> Result<EofPacket> {
        let header = input.read_u8()?;
        let (warnings, status_flags) = if cap_flags.contains(CapabilityFlags::PROTOCOL_41) {
            let warnings = input.read_le_u16()?;
            let status_flags = StatusFlags::from_bits_truncate(input.read_le_u16()?);
            (warnings, status_flags)
        } else {
            (0, StatusFlags::empty())
        };
        Ok(EofPacket {
            header,
            warnings,
            status_flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet() {
        let mut input = Bytes::from_static(&[0x03, 0x00, 0x00, 0x00, 0xaa, 0xbb, 0xcc]);
        let pkt = Packet::read_from(&mut input).unwrap();
        assert_eq!(3, pkt.payload_len);
        assert_eq!(0, pkt.seq_id);
        assert_eq!(&[0xaa, 0xbb, 0xcc][..], &pkt.payload[..]);
    }

    #[test]
    fn test_ok_packet() {
        let mut input = Bytes::from_static(&[0, 0, 0, 2, 0, 0, 0]);
        let ok = OkPacket::read_with_ctx(&mut input, &CapabilityFlags::PROTOCOL_41).unwrap();
        assert_eq!(0, ok.affected_rows);
        assert!(ok.status_flags.contains(StatusFlags::AUTOCOMMIT));
    }

    #[test]
    fn test_err_packet() {
        let mut bs = vec![0xff, 0x48, 0x04, b'#'];
        bs.extend_from_slice(b"HY000");
        bs.extend_from_slice(b"access denied");
        let mut input = Bytes::from(bs);
        let err =
            ErrPacket::read_with_ctx(&mut input, (&CapabilityFlags::PROTOCOL_41, true)).unwrap();
        assert_eq!(0x0448, err.error_code);
        assert_eq!(&b"HY000"[..], &err.sql_state[..]);
        assert_eq!(&b"access denied"[..], &err.error_message[..]);
    }

    #[test]
    fn test_eof_packet() {
        let mut input = Bytes::from_static(&[0xfe, 0x00, 0x00, 0x02, 0x00]);
        let eof = EofPacket::read_with_ctx(&mut input, &CapabilityFlags::PROTOCOL_41).unwrap();
        assert_eq!(0, eof.warnings);
        assert!(eof.status_flags.contains(StatusFlags::AUTOCOMMIT));
    }

    #[test]
    fn test_handshake_message_more_data() {
        let mut input = Bytes::from_static(&[0x01, 0x03]);
        match HandshakeMessage::read_with_ctx(&mut input, &CapabilityFlags::default()).unwrap() {
            HandshakeMessage::MoreData(bs) => assert_eq!(&[0x03][..], &bs[..]),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_invalid_packet_code() {
        let mut input = Bytes::from_static(&[0x7f]);
        assert!(Message::read_with_ctx(&mut input, &CapabilityFlags::default()).is_err());
    }
}
