//! end to end: a dumped stream read back through the local reader
use bytes::{BufMut, Bytes, BytesMut};
use tailbin_async::dump::DumpSink;
use tailbin_async::local::LocalBinlog;
use tailbin_core::binlog::{ChecksumMode, Event, EventReader};
use tailbin_core::value::BinlogColumnValue;

/// one raw event without a checksum trailer
fn build_event(type_code: u8, body: &[u8], timestamp: u32, next_pos: u32) -> Bytes {
    let event_len = 19 + body.len();
    let mut bs = BytesMut::new();
    bs.put_u32_le(timestamp);
    bs.put_u8(type_code);
    bs.put_u32_le(1);
    bs.put_u32_le(event_len as u32);
    bs.put_u32_le(next_pos);
    bs.put_u16_le(0);
    bs.put_slice(body);
    bs.freeze()
}

fn rotate_event(next_file: &str, artificial: bool) -> Bytes {
    let mut body = BytesMut::new();
    body.put_u64_le(4);
    body.put_slice(next_file.as_bytes());
    build_event(4, &body, if artificial { 0 } else { 1_613_332_632 }, 0)
}

fn fde_event() -> Bytes {
    let mut body = BytesMut::new();
    body.put_u16_le(4);
    let mut version = [0u8; 50];
    version[..6].copy_from_slice(b"5.7.30");
    body.put_slice(&version);
    body.put_u32_le(0);
    body.put_u8(19);
    body.put_slice(&[
        56, 13, 0, 8, 0, 18, 0, 4, 4, 4, 4, 18, 0, 0, 95, 0, 4, 26, 8, 0, 0, 0, 8, 8, 8, 2, 0,
        0, 0, 10, 10, 10, 42, 42, 0, 18, 52, 0,
    ]);
    body.put_u8(0); // no checksum
    build_event(15, &body, 1_613_332_632, 0)
}

// schema "test", table "t": x int unsigned, s varchar(40), e enum
fn table_map_event() -> Bytes {
    let mut body = BytesMut::new();
    body.put_slice(&[1, 0, 0, 0, 0, 0]);
    body.put_u16_le(1);
    body.put_u8(4);
    body.put_slice(b"test");
    body.put_u8(0);
    body.put_u8(1);
    body.put_slice(b"t");
    body.put_u8(0);
    body.put_u8(3);
    body.put_slice(&[0x03, 0x0f, 0xfe]);
    body.put_u8(4);
    body.put_slice(&[0x28, 0x00, 0xf7, 0x01]);
    body.put_u8(0b0000_0110);
    // signedness: the single numeric column is unsigned
    body.put_u8(1);
    body.put_u8(1);
    body.put_u8(0x80);
    build_event(19, &body, 1_613_332_632, 0)
}

fn write_rows_event(x: u32) -> Bytes {
    let mut body = BytesMut::new();
    body.put_slice(&[1, 0, 0, 0, 0, 0]);
    body.put_u16_le(1);
    body.put_u16_le(2);
    body.put_u8(3);
    body.put_u8(0b0000_0111);
    body.put_u8(0b110); // s and e are null
    body.put_u32_le(x);
    build_event(30, &body, 1_613_332_632, 0)
}

fn xid_event() -> Bytes {
    build_event(16, &777u64.to_le_bytes(), 1_613_332_632, 0)
}

/// decode each raw event and hand both to the sink, the way the
/// remote dump loop does
fn pump(sink: &mut DumpSink, reader: &mut EventReader, raws: &[Bytes]) {
    for raw in raws {
        let event = reader.read_event(&mut raw.clone()).unwrap();
        sink.apply(&event, raw).unwrap();
    }
}

#[test]
fn test_dump_then_read_back() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let mut reader = EventReader::new(ChecksumMode::None);
    let mut sink = DumpSink::new(dir.path()).unwrap();
    pump(
        &mut sink,
        &mut reader,
        &[
            rotate_event("bin.000001", true),
            fde_event(),
            table_map_event(),
            write_rows_event(42),
            rotate_event("bin.000002", false),
            fde_event(),
            xid_event(),
        ],
    );

    let local = LocalBinlog::open(dir.path()).unwrap();
    assert_eq!(
        vec!["bin.000001".to_owned(), "bin.000002".to_owned()],
        local.list_files().unwrap()
    );
    let status = local.master_status().unwrap();
    assert_eq!("bin.000002", status.file);
    assert!(status.position > 4);

    let mut local = local;
    local.seek("bin.000001", 4).unwrap();
    assert!(matches!(
        local.next_event().unwrap(),
        Some(Event::FormatDescription(_))
    ));
    assert!(matches!(
        local.next_event().unwrap(),
        Some(Event::TableMap(_))
    ));
    assert!(matches!(
        local.next_event().unwrap(),
        Some(Event::WriteRows(_))
    ));
    let (row, before) = local.next_row().unwrap().unwrap();
    assert!(before.is_none());
    assert_eq!(BinlogColumnValue::LongUnsigned(42), row.0[0]);
    assert_eq!(BinlogColumnValue::Null, row.0[1]);
    assert!(local.next_row().unwrap().is_none());

    // the rotate at the end of the first file, then the chain
    // continues into the second
    assert!(matches!(local.next_event().unwrap(), Some(Event::Rotate(_))));
    assert!(matches!(
        local.next_event().unwrap(),
        Some(Event::FormatDescription(_))
    ));
    assert!(matches!(local.next_event().unwrap(), Some(Event::Xid(_))));
    // non-blocking mode reports a clean end of stream
    assert!(local.next_event().unwrap().is_none());
}

#[test]
fn test_event_sizes_cover_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut reader = EventReader::new(ChecksumMode::None);
    let mut sink = DumpSink::new(dir.path()).unwrap();
    let events = [
        rotate_event("bin.000001", true),
        fde_event(),
        table_map_event(),
        write_rows_event(1),
        write_rows_event(2),
    ];
    pump(&mut sink, &mut reader, &events);
    // the artificial rotate is not persisted; the rest is
    let expected: usize = events[1..].iter().map(|e| e.len()).sum();
    let len = std::fs::metadata(dir.path().join("bin.000001"))
        .unwrap()
        .len();
    assert_eq!(expected as u64 + 4, len);
}

#[test]
fn test_resumed_dump_drops_mid_file_fde() {
    let dir = tempfile::tempdir().unwrap();
    let mut reader = EventReader::new(ChecksumMode::None);
    let mut sink = DumpSink::new(dir.path()).unwrap();
    pump(
        &mut sink,
        &mut reader,
        &[rotate_event("bin.000001", true), fde_event(), xid_event()],
    );
    let len_before = std::fs::metadata(dir.path().join("bin.000001"))
        .unwrap()
        .len();

    // resume mid-file: the server resends its format description
    let mut reader = EventReader::new(ChecksumMode::None);
    let mut sink = DumpSink::new(dir.path()).unwrap();
    pump(
        &mut sink,
        &mut reader,
        &[rotate_event("bin.000001", true), fde_event(), xid_event()],
    );
    let len_after = std::fs::metadata(dir.path().join("bin.000001"))
        .unwrap()
        .len();
    // only the xid was appended the second time
    assert_eq!(len_before + xid_event().len() as u64, len_after);
}

#[test]
fn test_local_seek_past_format_description() {
    let dir = tempfile::tempdir().unwrap();
    let mut reader = EventReader::new(ChecksumMode::None);
    let mut sink = DumpSink::new(dir.path()).unwrap();
    let fde = fde_event();
    let skipped = xid_event();
    pump(
        &mut sink,
        &mut reader,
        &[
            rotate_event("bin.000001", true),
            fde.clone(),
            skipped.clone(),
            table_map_event(),
            write_rows_event(9),
        ],
    );

    let mut local = LocalBinlog::open(dir.path()).unwrap();
    // skip the xid right after the format description
    let pos = 4 + fde.len() as u64 + skipped.len() as u64;
    local.seek("bin.000001", pos).unwrap();
    assert!(matches!(
        local.next_event().unwrap(),
        Some(Event::TableMap(_))
    ));
    assert!(matches!(
        local.next_event().unwrap(),
        Some(Event::WriteRows(_))
    ));
    let (row, _) = local.next_row().unwrap().unwrap();
    assert_eq!(BinlogColumnValue::LongUnsigned(9), row.0[0]);
}
