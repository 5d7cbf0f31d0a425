//! the stateful binlog event decoder
//!
//! owns the cross event context: the active format description, the
//! table map cache, the logical file name and position, and the
//! checksum width of the current file
use super::fde::FormatDescriptionData;
use super::header::EventHeader;
use super::misc::OpaqueData;
use super::query::QueryData;
use super::rotate::RotateData;
use super::rows::{RowsCtx, RowsData, RowsKind};
use super::table_map::{TableMap, TableMapData};
use super::{
    Event, IncidentData, IntvarData, LogEventType, RandData, RawEvent, RowsQueryData, UserVarData,
    XidData,
};
use crate::error::{Error, Result};
use crate::util::checksum_crc32;
use bytes::{Buf, Bytes};
use bytes_cursor::{ReadBytesExt, ReadFromBytes, ReadFromBytesWithContext};
use linked_hash_map::LinkedHashMap;
use smol_str::SmolStr;

/// every binlog file starts with these four bytes
pub const BINLOG_MAGIC: [u8; 4] = [0xfe, b'b', b'i', b'n'];

/// caller hint for the checksum width of events preceding the first
/// format description event (a rotate at stream start, typically)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumMode {
    Auto,
    None,
    Crc32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinlogVersion {
    V1,
    V3,
    V4,
}

impl BinlogVersion {
    /// binlog format implied by a server version string:
    /// 3.23 wrote format 1, the 4.x line format 3, 5.0 and later
    /// format 4
    pub fn from_server_version(version: &str) -> Self {
        let major: u32 = version
            .split(|c: char| !c.is_ascii_digit())
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        match major {
            1..=3 => BinlogVersion::V1,
            4 => BinlogVersion::V3,
            // unparsable versions are treated as modern
            _ => BinlogVersion::V4,
        }
    }
}

/// determine the binlog version from the magic word and the first
/// event without consuming the event
///
/// reference: https://dev.mysql.com/doc/internals/en/binary-log-versions.html
pub fn binlog_version(input: &mut Bytes) -> Result<BinlogVersion> {
    let magic = input.read_len(4)?;
    if magic.chunk() != BINLOG_MAGIC {
        return Err(Error::MalformedPacket(format!(
            "invalid binlog magic: {:02x?}",
            magic.chunk()
        )));
    }
    let header = EventHeader::read_from(&mut input.clone())?;
    match LogEventType::from(header.type_code) {
        LogEventType::StartEventV3 => {
            if header.event_len < 75 {
                Ok(BinlogVersion::V1)
            } else {
                Ok(BinlogVersion::V3)
            }
        }
        LogEventType::FormatDescriptionEvent => Ok(BinlogVersion::V4),
        et => Err(Error::MalformedPacket(format!(
            "unexpected first event: {:?}",
            et
        ))),
    }
}

#[derive(Debug)]
pub struct EventReader {
    post_header_lengths: Vec<u8>,
    checksum_width: usize,
    binlog_version: BinlogVersion,
    table_maps: LinkedHashMap<u64, TableMap>,
    file_name: SmolStr,
    next_pos: u64,
}

impl EventReader {
    pub fn new(checksum: ChecksumMode) -> Self {
        let checksum_width = match checksum {
            ChecksumMode::Crc32 => 4,
            ChecksumMode::Auto | ChecksumMode::None => 0,
        };
        EventReader {
            post_header_lengths: Vec::new(),
            checksum_width,
            binlog_version: BinlogVersion::V4,
            table_maps: LinkedHashMap::new(),
            file_name: SmolStr::default(),
            next_pos: 0,
        }
    }

    pub fn set_binlog_version(&mut self, version: BinlogVersion) {
        self.binlog_version = version;
    }

    /// seed the logical position, called on seek
    pub fn set_position(&mut self, file: &str, pos: u64) {
        self.file_name = SmolStr::from(file);
        self.next_pos = pos;
    }

    /// the logical file the last event belongs to
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn next_pos(&self) -> u64 {
        self.next_pos
    }

    pub fn checksum_width(&self) -> usize {
        self.checksum_width
    }

    pub fn table_map(&self, table_id: u64) -> Option<&TableMap> {
        self.table_maps.get(&table_id)
    }

    /// 13 for binlog format 1, 19 for formats 3 and 4
    pub fn header_len(&self) -> usize {
        match self.binlog_version {
            BinlogVersion::V1 => 13,
            _ => 19,
        }
    }

    fn post_header_length(&self, event_type: LogEventType) -> u8 {
        let code = super::type_code(event_type);
        if code == 0 {
            return 0;
        }
        self.post_header_lengths
            .get(code as usize - 1)
            .copied()
            .unwrap_or(0)
    }

    /// decode one complete raw event (header, body, optional
    /// checksum trailer)
    pub fn read_event(&mut self, input: &mut Bytes) -> Result<Event> {
        let header_len = self.header_len();
        let raw = input.clone();
        let header = EventHeader::read_with_ctx(&mut input.clone(), header_len)?;
        let event_len = header.event_len as usize;
        if event_len < header_len || raw.remaining() < event_len {
            return Err(Error::MalformedPacket(format!(
                "event truncated: declared={}, actual={}",
                event_len,
                raw.remaining()
            )));
        }
        let event_type = LogEventType::from(header.type_code);

        // the format description event describes its own checksum;
        // every other event uses the width of the current file
        let checksum_width = if event_type == LogEventType::FormatDescriptionEvent {
            let mut probe = raw.clone();
            probe.advance(header_len);
            probe.truncate(event_len - header_len);
            let fdd = FormatDescriptionData::read_from(&mut probe)?;
            if fdd.checksum_flag == 1 {
                4
            } else {
                0
            }
        } else {
            self.checksum_width
        };

        if checksum_width == 4 {
            if event_len < header_len + 4 {
                return Err(Error::MalformedPacket(
                    "event too short for checksum".to_owned(),
                ));
            }
            let mut trailer = raw.clone();
            trailer.advance(event_len - 4);
            let expected = trailer.read_le_u32()?;
            let actual = checksum_crc32(&raw.chunk()[..event_len - 4]);
            if expected != actual {
                return Err(Error::ChecksumMismatch(expected, actual));
            }
        }

        // consume header, bounded body and trailer
        input.advance(header_len);
        let mut body = input.read_len(event_len - header_len - checksum_width)?;
        if checksum_width > 0 {
            input.read_len(checksum_width)?;
        }

        if header.next_pos != 0 {
            self.next_pos = header.next_pos as u64;
        }

        let event = match event_type {
            LogEventType::FormatDescriptionEvent => {
                let data = FormatDescriptionData::read_from(&mut body)?;
                self.binlog_version = match data.binlog_version {
                    1 => BinlogVersion::V1,
                    3 => BinlogVersion::V3,
                    _ => BinlogVersion::V4,
                };
                self.post_header_lengths = data.post_header_lengths.clone();
                self.checksum_width = checksum_width;
                log::debug!(
                    "format description: binlog_version={}, server_version={}, checksum_width={}",
                    data.binlog_version,
                    data.server_version,
                    checksum_width
                );
                Event::FormatDescription(RawEvent { header, data })
            }
            LogEventType::RotateEvent => {
                let data = RotateData::read_from(&mut body)?;
                // update position only when the body decoded cleanly
                self.file_name = SmolStr::from(data.filename()?);
                self.next_pos = data.position;
                self.table_maps.clear();
                Event::Rotate(RawEvent { header, data })
            }
            LogEventType::TableMapEvent => {
                let phl = self.post_header_length(LogEventType::TableMapEvent);
                let table_id_len = if phl == 6 { 4 } else { 6 };
                let data = TableMapData::read_with_ctx(&mut body, table_id_len)?;
                self.table_maps.insert(data.table_id, data.table_map()?);
                Event::TableMap(RawEvent { header, data })
            }
            LogEventType::WriteRowsEventV0
            | LogEventType::WriteRowsEventV1
            | LogEventType::WriteRowsEventV2 => {
                let data = self.read_rows(&mut body, event_type, RowsKind::Write)?;
                Event::WriteRows(RawEvent { header, data })
            }
            LogEventType::UpdateRowsEventV0
            | LogEventType::UpdateRowsEventV1
            | LogEventType::UpdateRowsEventV2 => {
                let data = self.read_rows(&mut body, event_type, RowsKind::Update)?;
                Event::UpdateRows(RawEvent { header, data })
            }
            LogEventType::DeleteRowsEventV0
            | LogEventType::DeleteRowsEventV1
            | LogEventType::DeleteRowsEventV2 => {
                let data = self.read_rows(&mut body, event_type, RowsKind::Delete)?;
                Event::DeleteRows(RawEvent { header, data })
            }
            LogEventType::QueryEvent => {
                let data = QueryData::read_from(&mut body)?;
                Event::Query(RawEvent { header, data })
            }
            LogEventType::IntvarEvent => {
                let data = IntvarData::read_from(&mut body)?;
                Event::Intvar(RawEvent { header, data })
            }
            LogEventType::RandEvent => {
                let data = RandData::read_from(&mut body)?;
                Event::Rand(RawEvent { header, data })
            }
            LogEventType::UserVarEvent => {
                let data = UserVarData::read_from(&mut body)?;
                Event::UserVar(RawEvent { header, data })
            }
            LogEventType::IncidentEvent => {
                let data = IncidentData::read_from(&mut body)?;
                Event::Incident(RawEvent { header, data })
            }
            LogEventType::RowsQueryLogEvent => {
                let data = RowsQueryData::read_from(&mut body)?;
                Event::RowsQuery(RawEvent { header, data })
            }
            LogEventType::XidEvent => {
                let data = XidData::read_from(&mut body)?;
                Event::Xid(RawEvent { header, data })
            }
            LogEventType::StopEvent => {
                let data = OpaqueData::read_from(&mut body)?;
                Event::Stop(RawEvent { header, data })
            }
            LogEventType::HeartbeatLogEvent => {
                let data = OpaqueData::read_from(&mut body)?;
                Event::Heartbeat(RawEvent { header, data })
            }
            LogEventType::GtidLogEvent => {
                let data = OpaqueData::read_from(&mut body)?;
                Event::Gtid(RawEvent { header, data })
            }
            LogEventType::AnonymousGtidLogEvent => {
                let data = OpaqueData::read_from(&mut body)?;
                Event::AnonymousGtid(RawEvent { header, data })
            }
            LogEventType::PreviousGtidsLogEvent => {
                let data = OpaqueData::read_from(&mut body)?;
                Event::PreviousGtids(RawEvent { header, data })
            }
            _ => {
                let data = OpaqueData::read_from(&mut body)?;
                Event::Unhandled(RawEvent { header, data })
            }
        };
        Ok(event)
    }

    fn read_rows(
        &self,
        body: &mut Bytes,
        event_type: LogEventType,
        kind: RowsKind,
    ) -> Result<RowsData> {
        let phl = self.post_header_length(event_type);
        let v2 = matches!(
            event_type,
            LogEventType::WriteRowsEventV2
                | LogEventType::UpdateRowsEventV2
                | LogEventType::DeleteRowsEventV2
        );
        let table_id_len = if phl == 6 { 4 } else { 6 };
        let data = RowsData::read_with_ctx(
            body,
            RowsCtx {
                kind,
                v2,
                table_id_len,
            },
        )?;
        if !data.is_dummy() && self.table_maps.get(&data.table_id).is_none() {
            return Err(Error::Protocol(format!(
                "rows event references unknown table id {}",
                data.table_id
            )));
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    // assemble one raw event with a valid header and optional crc32
    pub(crate) fn build_event(
        type_code: u8,
        body: &[u8],
        next_pos: u32,
        checksum: bool,
    ) -> Bytes {
        let trailer = if checksum { 4 } else { 0 };
        let event_len = 19 + body.len() + trailer;
        let mut bs = BytesMut::new();
        bs.put_u32_le(1_613_332_632);
        bs.put_u8(type_code);
        bs.put_u32_le(1);
        bs.put_u32_le(event_len as u32);
        bs.put_u32_le(next_pos);
        bs.put_u16_le(0);
        bs.put_slice(body);
        if checksum {
            let crc = checksum_crc32(&bs);
            bs.put_u32_le(crc);
        }
        bs.freeze()
    }

    fn fde_event(checksum: bool) -> Bytes {
        let mut body = crate::binlog::fde::tests::fde_body_5_7();
        body.put_u8(if checksum { 1 } else { 0 });
        build_event(15, &body, 0, checksum)
    }

    fn table_map_event(checksum: bool) -> Bytes {
        let mut body = BytesMut::new();
        body.put_slice(&[1, 0, 0, 0, 0, 0]);
        body.put_u16_le(1);
        body.put_slice(&crate::binlog::table_map::tests::table_map_payload(true));
        build_event(19, &body, 0, checksum)
    }

    fn write_rows_event(checksum: bool) -> Bytes {
        let mut body = BytesMut::new();
        body.put_slice(&[1, 0, 0, 0, 0, 0]);
        body.put_u16_le(1);
        body.put_u16_le(2);
        body.put_u8(3);
        body.put_u8(0b0000_0111);
        // row: x=42, s/e null
        body.put_u8(0b110);
        body.put_u32_le(42);
        build_event(30, &body, 0, checksum)
    }

    fn rotate_event(checksum: bool) -> Bytes {
        let mut body = BytesMut::new();
        body.put_u64_le(4);
        body.put_slice(b"mysql-bin.000002");
        build_event(4, &body, 0, checksum)
    }

    #[test]
    fn test_stream_fde_table_map_rows() {
        let mut reader = EventReader::new(ChecksumMode::Crc32);
        let fde = reader.read_event(&mut fde_event(true)).unwrap();
        assert!(matches!(fde, Event::FormatDescription(_)));
        assert_eq!(4, reader.checksum_width());

        let tme = reader.read_event(&mut table_map_event(true)).unwrap();
        assert!(matches!(tme, Event::TableMap(_)));
        assert!(reader.table_map(1).is_some());

        let wre = reader.read_event(&mut write_rows_event(true)).unwrap();
        let rows = match wre {
            Event::WriteRows(e) => e.data,
            other => panic!("unexpected event {:?}", other),
        };
        let tm = reader.table_map(rows.table_id).unwrap();
        let mut cursor = rows.row_cursor();
        let (row, before) = rows.read_row(&mut cursor, tm).unwrap().unwrap();
        assert!(before.is_none());
        assert_eq!(
            crate::value::BinlogColumnValue::LongUnsigned(42),
            row.0[0]
        );
        assert!(rows.read_row(&mut cursor, tm).unwrap().is_none());
    }

    #[test]
    fn test_fde_without_checksum_disables_verification() {
        let mut reader = EventReader::new(ChecksumMode::Crc32);
        reader.read_event(&mut fde_event(false)).unwrap();
        assert_eq!(0, reader.checksum_width());
        // events now carry no trailer
        reader.read_event(&mut table_map_event(false)).unwrap();
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut reader = EventReader::new(ChecksumMode::Crc32);
        reader.read_event(&mut fde_event(true)).unwrap();
        let mut corrupted = BytesMut::from(&table_map_event(true)[..]);
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;
        match reader.read_event(&mut corrupted.freeze()) {
            Err(Error::ChecksumMismatch(expected, actual)) => assert_ne!(expected, actual),
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_rotate_updates_position_and_clears_cache() {
        let mut reader = EventReader::new(ChecksumMode::Crc32);
        reader.set_position("mysql-bin.000001", 4);
        reader.read_event(&mut fde_event(true)).unwrap();
        reader.read_event(&mut table_map_event(true)).unwrap();
        assert!(reader.table_map(1).is_some());

        let ev = reader.read_event(&mut rotate_event(true)).unwrap();
        assert!(matches!(ev, Event::Rotate(_)));
        assert_eq!("mysql-bin.000002", reader.file_name());
        assert_eq!(4, reader.next_pos());
        assert!(reader.table_map(1).is_none());
    }

    #[test]
    fn test_rows_event_unknown_table_id() {
        let mut reader = EventReader::new(ChecksumMode::Crc32);
        reader.read_event(&mut fde_event(true)).unwrap();
        match reader.read_event(&mut write_rows_event(true)) {
            Err(Error::Protocol(_)) => {}
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_next_pos_tracking() {
        let mut reader = EventReader::new(ChecksumMode::None);
        reader.read_event(&mut fde_event(false)).unwrap();
        let mut ev = build_event(16, &777u64.to_le_bytes(), 523, false);
        let xid = reader.read_event(&mut ev).unwrap();
        assert!(matches!(xid, Event::Xid(_)));
        assert_eq!(523, reader.next_pos());
    }

    #[test]
    fn test_binlog_version_from_server_version() {
        assert_eq!(
            BinlogVersion::V4,
            BinlogVersion::from_server_version("8.0.33")
        );
        assert_eq!(
            BinlogVersion::V4,
            BinlogVersion::from_server_version("5.7.30-log")
        );
        assert_eq!(
            BinlogVersion::V3,
            BinlogVersion::from_server_version("4.1.22")
        );
        assert_eq!(
            BinlogVersion::V1,
            BinlogVersion::from_server_version("3.23.58")
        );
        assert_eq!(BinlogVersion::V4, BinlogVersion::from_server_version(""));
    }

    #[test]
    fn test_binlog_version_detection() {
        let mut bs = BytesMut::new();
        bs.put_slice(&BINLOG_MAGIC);
        bs.put_slice(&fde_event(true));
        assert_eq!(
            BinlogVersion::V4,
            binlog_version(&mut bs.freeze()).unwrap()
        );

        let mut bad = BytesMut::new();
        bad.put_slice(b"nope");
        assert!(binlog_version(&mut bad.freeze()).is_err());
    }

    #[test]
    fn test_heartbeat_and_unknown_bodies_drained() {
        let mut reader = EventReader::new(ChecksumMode::None);
        reader.read_event(&mut fde_event(false)).unwrap();
        let hb = reader
            .read_event(&mut build_event(27, b"mysql-bin.000001", 0, false))
            .unwrap();
        assert!(matches!(hb, Event::Heartbeat(_)));
        let other = reader
            .read_event(&mut build_event(36, &[1, 2, 3], 0, false))
            .unwrap();
        assert!(matches!(other, Event::Unhandled(_)));
    }
}
