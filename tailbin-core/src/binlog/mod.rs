//! binlog event types and the stateful event decoder
mod fde;
mod header;
mod misc;
mod query;
mod reader;
mod rotate;
mod rows;
mod table_map;

pub use fde::{FormatDescriptionData, StartData};
pub use header::{EventHeader, EventHeaderFlags};
pub use misc::{
    IncidentData, IntvarData, OpaqueData, RandData, RowsQueryData, UserVarData, XidData,
};
pub use query::QueryData;
pub use reader::{binlog_version, BinlogVersion, ChecksumMode, EventReader, BINLOG_MAGIC};
pub use rotate::RotateData;
pub use rows::{LogRow, RowsCtx, RowsData, RowsKind};
pub use table_map::{TableMap, TableMapData};

/// rows events with this table id carry no rows and only signal
/// statement end
pub const DUMMY_TABLE_ID: u64 = 0x00ff_ffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEventType {
    Unknown,
    StartEventV3,
    QueryEvent,
    StopEvent,
    RotateEvent,
    IntvarEvent,
    LoadEvent,
    SlaveEvent,
    CreateFileEvent,
    AppendBlockEvent,
    ExecLoadEvent,
    DeleteFileEvent,
    NewLoadEvent,
    RandEvent,
    UserVarEvent,
    FormatDescriptionEvent,
    XidEvent,
    BeginLoadQueryEvent,
    ExecuteLoadQueryEvent,
    TableMapEvent,
    WriteRowsEventV0,
    UpdateRowsEventV0,
    DeleteRowsEventV0,
    WriteRowsEventV1,
    UpdateRowsEventV1,
    DeleteRowsEventV1,
    IncidentEvent,
    HeartbeatLogEvent,
    IgnorableLogEvent,
    RowsQueryLogEvent,
    WriteRowsEventV2,
    UpdateRowsEventV2,
    DeleteRowsEventV2,
    GtidLogEvent,
    AnonymousGtidLogEvent,
    PreviousGtidsLogEvent,
    TransactionContextEvent,
    ViewChangeEvent,
    XaPrepareLogEvent,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEventTypeCode(pub u8);

impl From<u8> for LogEventType {
    fn from(code: u8) -> LogEventType {
        match code {
            0 => LogEventType::Unknown,
            1 => LogEventType::StartEventV3,
            2 => LogEventType::QueryEvent,
            3 => LogEventType::StopEvent,
            4 => LogEventType::RotateEvent,
            5 => LogEventType::IntvarEvent,
            6 => LogEventType::LoadEvent,
            7 => LogEventType::SlaveEvent,
            8 => LogEventType::CreateFileEvent,
            9 => LogEventType::AppendBlockEvent,
            10 => LogEventType::ExecLoadEvent,
            11 => LogEventType::DeleteFileEvent,
            12 => LogEventType::NewLoadEvent,
            13 => LogEventType::RandEvent,
            14 => LogEventType::UserVarEvent,
            15 => LogEventType::FormatDescriptionEvent,
            16 => LogEventType::XidEvent,
            17 => LogEventType::BeginLoadQueryEvent,
            18 => LogEventType::ExecuteLoadQueryEvent,
            19 => LogEventType::TableMapEvent,
            // used in 5.1.0 ~ 5.1.17
            20 => LogEventType::WriteRowsEventV0,
            21 => LogEventType::UpdateRowsEventV0,
            22 => LogEventType::DeleteRowsEventV0,
            // used in 5.1.18 ~ 5.6.x
            23 => LogEventType::WriteRowsEventV1,
            24 => LogEventType::UpdateRowsEventV1,
            25 => LogEventType::DeleteRowsEventV1,
            26 => LogEventType::IncidentEvent,
            27 => LogEventType::HeartbeatLogEvent,
            28 => LogEventType::IgnorableLogEvent,
            29 => LogEventType::RowsQueryLogEvent,
            // used after 5.6.x
            30 => LogEventType::WriteRowsEventV2,
            31 => LogEventType::UpdateRowsEventV2,
            32 => LogEventType::DeleteRowsEventV2,
            33 => LogEventType::GtidLogEvent,
            34 => LogEventType::AnonymousGtidLogEvent,
            35 => LogEventType::PreviousGtidsLogEvent,
            // https://github.com/mysql/mysql-server/blob/5.7/libbinlogevents/include/binlog_event.h
            36 => LogEventType::TransactionContextEvent,
            37 => LogEventType::ViewChangeEvent,
            38 => LogEventType::XaPrepareLogEvent,
            _ => LogEventType::Invalid,
        }
    }
}

impl From<LogEventTypeCode> for LogEventType {
    fn from(type_code: LogEventTypeCode) -> LogEventType {
        LogEventType::from(type_code.0)
    }
}

/// wire code of the event type; 0 for the pseudo variants
pub fn type_code(event_type: LogEventType) -> u8 {
    match event_type {
        LogEventType::Unknown => 0,
        LogEventType::StartEventV3 => 1,
        LogEventType::QueryEvent => 2,
        LogEventType::StopEvent => 3,
        LogEventType::RotateEvent => 4,
        LogEventType::IntvarEvent => 5,
        LogEventType::LoadEvent => 6,
        LogEventType::SlaveEvent => 7,
        LogEventType::CreateFileEvent => 8,
        LogEventType::AppendBlockEvent => 9,
        LogEventType::ExecLoadEvent => 10,
        LogEventType::DeleteFileEvent => 11,
        LogEventType::NewLoadEvent => 12,
        LogEventType::RandEvent => 13,
        LogEventType::UserVarEvent => 14,
        LogEventType::FormatDescriptionEvent => 15,
        LogEventType::XidEvent => 16,
        LogEventType::BeginLoadQueryEvent => 17,
        LogEventType::ExecuteLoadQueryEvent => 18,
        LogEventType::TableMapEvent => 19,
        LogEventType::WriteRowsEventV0 => 20,
        LogEventType::UpdateRowsEventV0 => 21,
        LogEventType::DeleteRowsEventV0 => 22,
        LogEventType::WriteRowsEventV1 => 23,
        LogEventType::UpdateRowsEventV1 => 24,
        LogEventType::DeleteRowsEventV1 => 25,
        LogEventType::IncidentEvent => 26,
        LogEventType::HeartbeatLogEvent => 27,
        LogEventType::IgnorableLogEvent => 28,
        LogEventType::RowsQueryLogEvent => 29,
        LogEventType::WriteRowsEventV2 => 30,
        LogEventType::UpdateRowsEventV2 => 31,
        LogEventType::DeleteRowsEventV2 => 32,
        LogEventType::GtidLogEvent => 33,
        LogEventType::AnonymousGtidLogEvent => 34,
        LogEventType::PreviousGtidsLogEvent => 35,
        LogEventType::TransactionContextEvent => 36,
        LogEventType::ViewChangeEvent => 37,
        LogEventType::XaPrepareLogEvent => 38,
        LogEventType::Invalid => 0,
    }
}

/// v3, v4 event with payload
#[derive(Debug, Clone)]
pub struct RawEvent<D> {
    pub header: EventHeader,
    pub data: D,
}

pub type FormatDescriptionEvent = RawEvent<FormatDescriptionData>;
pub type RotateEvent = RawEvent<RotateData>;
pub type TableMapEvent = RawEvent<TableMapData>;
pub type RowsEvent = RawEvent<RowsData>;
pub type QueryEvent = RawEvent<QueryData>;
pub type IntvarEvent = RawEvent<IntvarData>;
pub type RandEvent = RawEvent<RandData>;
pub type UserVarEvent = RawEvent<UserVarData>;
pub type IncidentEvent = RawEvent<IncidentData>;
pub type RowsQueryEvent = RawEvent<RowsQueryData>;
pub type XidEvent = RawEvent<XidData>;
pub type OpaqueEvent = RawEvent<OpaqueData>;

#[derive(Debug, Clone)]
pub enum Event {
    // 2
    Query(QueryEvent),
    // 3
    Stop(OpaqueEvent),
    // 4
    Rotate(RotateEvent),
    // 5
    Intvar(IntvarEvent),
    // 13
    Rand(RandEvent),
    // 14
    UserVar(UserVarEvent),
    // 15
    FormatDescription(FormatDescriptionEvent),
    // 16
    Xid(XidEvent),
    // 19
    TableMap(TableMapEvent),
    // 20, 23, 30
    WriteRows(RowsEvent),
    // 21, 24, 31
    UpdateRows(RowsEvent),
    // 22, 25, 32
    DeleteRows(RowsEvent),
    // 26
    Incident(IncidentEvent),
    // 27
    Heartbeat(OpaqueEvent),
    // 29
    RowsQuery(RowsQueryEvent),
    // 33
    Gtid(OpaqueEvent),
    // 34
    AnonymousGtid(OpaqueEvent),
    // 35
    PreviousGtids(OpaqueEvent),
    // everything else: header surfaced, body drained
    Unhandled(OpaqueEvent),
}

impl Event {
    pub fn header(&self) -> &EventHeader {
        match self {
            Event::Query(e) => &e.header,
            Event::Stop(e) => &e.header,
            Event::Rotate(e) => &e.header,
            Event::Intvar(e) => &e.header,
            Event::Rand(e) => &e.header,
            Event::UserVar(e) => &e.header,
            Event::FormatDescription(e) => &e.header,
            Event::Xid(e) => &e.header,
            Event::TableMap(e) => &e.header,
            Event::WriteRows(e) => &e.header,
            Event::UpdateRows(e) => &e.header,
            Event::DeleteRows(e) => &e.header,
            Event::Incident(e) => &e.header,
            Event::Heartbeat(e) => &e.header,
            Event::RowsQuery(e) => &e.header,
            Event::Gtid(e) => &e.header,
            Event::AnonymousGtid(e) => &e.header,
            Event::PreviousGtids(e) => &e.header,
            Event::Unhandled(e) => &e.header,
        }
    }
}
