//! start event and format description event
use super::LogEventType;
use bytes::{Buf, Bytes};
use bytes_cursor::{ReadBytesExt, ReadFromBytes, Result};

/// Data of StartEvent
///
/// reference: https://dev.mysql.com/doc/internals/en/start-event-v3.html
#[derive(Debug, Clone)]
pub struct StartData {
    pub binlog_version: u16,
    pub server_version: String,
    pub create_timestamp: u32,
}

impl ReadFromBytes for StartData {
    fn read_from(input: &mut Bytes) -> Result<Self> {
        let binlog_version = input.read_le_u16()?;
        let mut server_version = input.read_len(50)?;
        // trim at the first NUL
        let server_version = match server_version.chunk().iter().position(|b| *b == 0) {
            Some(pos) => server_version.split_to(pos),
            None => server_version,
        };
        let server_version = String::from_utf8(Vec::from(&server_version[..]))?;
        let create_timestamp = input.read_le_u32()?;
        Ok(StartData {
            binlog_version,
            server_version,
            create_timestamp,
        })
    }
}

/// Data of FormatDescriptionEvent
///
/// the first event of every file; the tail of its body determines
/// the checksum algorithm of the whole file
///
/// reference: https://dev.mysql.com/doc/internals/en/format-description-event.html
#[derive(Debug, Clone)]
pub struct FormatDescriptionData {
    pub binlog_version: u16,
    pub server_version: String,
    pub create_timestamp: u32,
    pub header_length: u8,
    pub post_header_lengths: Vec<u8>,
    // 0 = none, 1 = crc32; servers before 5.6.1 have no flag at all
    pub checksum_flag: u8,
}

impl ReadFromBytes for FormatDescriptionData {
    fn read_from(input: &mut Bytes) -> Result<FormatDescriptionData> {
        let StartData {
            binlog_version,
            server_version,
            create_timestamp,
        } = StartData::read_from(input)?;
        let header_length = input.read_u8()?;
        // 57 bytes consumed so far; the FDE's own post header length
        // tells how many per-type entries follow, anything after that
        // is the checksum flag and the checksum value
        if input.remaining() < FDE_TYPE_CODE {
            return Err(bytes_cursor::Error::ConstraintError(
                "format description event too short".to_owned(),
            ));
        }
        let fde_post_header_len = input[FDE_TYPE_CODE - 1] as usize - 57;
        if input.remaining() == fde_post_header_len {
            // server without checksum support
            let post_header_lengths = Vec::from(&input.split_to(input.remaining())[..]);
            return Ok(FormatDescriptionData {
                binlog_version,
                server_version,
                create_timestamp,
                header_length,
                post_header_lengths,
                checksum_flag: 0,
            });
        }
        let post_header_lengths = Vec::from(&input.read_len(fde_post_header_len)?[..]);
        let checksum_flag = input.read_u8()?;
        // a 4-byte checksum may remain, the caller verifies it
        Ok(FormatDescriptionData {
            binlog_version,
            server_version,
            create_timestamp,
            header_length,
            post_header_lengths,
            checksum_flag,
        })
    }
}

const FDE_TYPE_CODE: usize = 15;

impl FormatDescriptionData {
    /// post header length of the given event type; the array is
    /// zero-indexed by type code minus one
    pub fn post_header_length(&self, event_type: LogEventType) -> u8 {
        let code = super::type_code(event_type);
        if code == 0 {
            return 0;
        }
        self.post_header_lengths
            .get(code as usize - 1)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    pub(crate) fn fde_body_5_7() -> BytesMut {
        let mut bs = BytesMut::new();
        bs.put_u16_le(4);
        let mut version = [0u8; 50];
        version[..6].copy_from_slice(b"5.7.30");
        bs.put_slice(&version);
        bs.put_u32_le(0);
        bs.put_u8(19);
        // 38 per-type post header lengths of a 5.7 server
        bs.put_slice(&[
            56, 13, 0, 8, 0, 18, 0, 4, 4, 4, 4, 18, 0, 0, 95, 0, 4, 26, 8, 0, 0, 0, 8, 8, 8, 2,
            0, 0, 0, 10, 10, 10, 42, 42, 0, 18, 52, 0,
        ]);
        bs
    }

    #[test]
    fn test_format_description_with_checksum_flag() {
        let mut body = fde_body_5_7();
        body.put_u8(1); // crc32
        let mut input = body.freeze();
        let fdd = FormatDescriptionData::read_from(&mut input).unwrap();
        assert_eq!(4, fdd.binlog_version);
        assert_eq!("5.7.30", fdd.server_version);
        assert_eq!(19, fdd.header_length);
        assert_eq!(1, fdd.checksum_flag);
        assert_eq!(38, fdd.post_header_lengths.len());
        assert_eq!(13, fdd.post_header_length(LogEventType::QueryEvent));
        assert_eq!(8, fdd.post_header_length(LogEventType::RotateEvent));
        assert_eq!(
            10,
            fdd.post_header_length(LogEventType::WriteRowsEventV2)
        );
        assert_eq!(
            95,
            fdd.post_header_length(LogEventType::FormatDescriptionEvent)
        );
    }

    #[test]
    fn test_format_description_without_checksum() {
        // a server whose FDE post header length covers the whole tail
        let mut bs = BytesMut::new();
        bs.put_u16_le(4);
        let mut version = [0u8; 50];
        version[..6].copy_from_slice(b"5.5.50");
        bs.put_slice(&version);
        bs.put_u32_le(0);
        bs.put_u8(19);
        // 27 entries, FDE's own entry is 57 + 27 = 84
        bs.put_slice(&[
            56, 13, 0, 8, 0, 18, 0, 4, 4, 4, 4, 18, 0, 0, 84, 0, 4, 26, 8, 0, 0, 0, 8, 8, 8, 2,
            0,
        ]);
        let mut input = bs.freeze();
        let fdd = FormatDescriptionData::read_from(&mut input).unwrap();
        assert_eq!(0, fdd.checksum_flag);
        assert_eq!(27, fdd.post_header_lengths.len());
        assert_eq!(84, fdd.post_header_length(LogEventType::FormatDescriptionEvent));
    }
}
