use super::LogEventTypeCode;
use bitflags::bitflags;
use bytes::Bytes;
use bytes_cursor::{ReadBytesExt, ReadFromBytes, ReadFromBytesWithContext, Result};

bitflags! {
    pub struct EventHeaderFlags: u16 {
        const BINLOG_IN_USE         = 0x0001;
        const FORCED_ROTATE         = 0x0002;
        const THREAD_SPECIFIC       = 0x0004;
        const SUPPRESS_USE          = 0x0008;
        const UPDATE_TABLE_MAP_VERSION  = 0x0010;
        const ARTIFICIAL            = 0x0020;
        const RELAY_LOG             = 0x0040;
        const IGNORABLE             = 0x0080;
        const NO_FILTER             = 0x0100;
        const MTS_ISOLATE           = 0x0200;
    }
}

/// common event header
///
/// binlog format 1 stops after event_len (13 bytes), formats 3 and 4
/// append next_pos and flags (19 bytes)
#[derive(Debug, Clone)]
pub struct EventHeader {
    pub timestamp: u32,
    pub type_code: LogEventTypeCode,
    pub server_id: u32,
    pub event_len: u32,
    pub next_pos: u32,
    pub flags: EventHeaderFlags,
}

impl ReadFromBytes for EventHeader {
    fn read_from(input: &mut Bytes) -> Result<Self> {
        EventHeader::read_with_ctx(input, 19)
    }
}

impl ReadFromBytesWithContext<'_> for EventHeader {
    // total header length: 13 or 19
    type Context = usize;

    fn read_with_ctx(input: &mut Bytes, header_len: usize) -> Result<Self> {
        let timestamp = input.read_le_u32()?;
        let type_code = input.read_u8()?;
        let server_id = input.read_le_u32()?;
        let event_len = input.read_le_u32()?;
        let (next_pos, flags) = if header_len == 13 {
            (0, 0)
        } else {
            (input.read_le_u32()?, input.read_le_u16()?)
        };
        Ok(EventHeader {
            timestamp,
            type_code: LogEventTypeCode(type_code),
            server_id,
            event_len,
            next_pos,
            flags: EventHeaderFlags::from_bits_truncate(flags),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    #[test]
    fn test_read_header_v4() {
        let mut bs = BytesMut::new();
        bs.put_u32_le(1_613_332_632);
        bs.put_u8(30);
        bs.put_u32_le(1);
        bs.put_u32_le(44);
        bs.put_u32_le(1234);
        bs.put_u16_le(0x0001);
        let mut input = bs.freeze();
        let h = EventHeader::read_from(&mut input).unwrap();
        assert_eq!(30, h.type_code.0);
        assert_eq!(44, h.event_len);
        assert_eq!(1234, h.next_pos);
        assert!(h.flags.contains(EventHeaderFlags::BINLOG_IN_USE));
    }

    #[test]
    fn test_read_header_v1() {
        let mut bs = BytesMut::new();
        bs.put_u32_le(0);
        bs.put_u8(2);
        bs.put_u32_le(1);
        bs.put_u32_le(13);
        let mut input = bs.freeze();
        let h = EventHeader::read_with_ctx(&mut input, 13).unwrap();
        assert_eq!(2, h.type_code.0);
        assert_eq!(0, h.next_pos);
        assert!(h.flags.is_empty());
    }
}
