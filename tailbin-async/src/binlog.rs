//! shared row pulling state for the remote and local readers
use crate::error::{Error, Result};
use bytes::Bytes;
use serde_derive::{Deserialize, Serialize};
use tailbin_core::binlog::{Event, EventReader, LogRow, RowsData};

/// one entry of SHOW BINARY LOGS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinlogFile {
    pub filename: String,
    pub size: u64,
}

/// the master's current write position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterStatus {
    pub file: String,
    pub position: u64,
}

/// the rows event currently being iterated and its cursor into the
/// raw row records
#[derive(Debug)]
pub(crate) struct ActiveRows {
    data: RowsData,
    cursor: Bytes,
}

impl ActiveRows {
    pub(crate) fn next_row(
        &mut self,
        reader: &EventReader,
    ) -> Result<Option<(LogRow, Option<LogRow>)>> {
        if self.data.is_dummy() {
            return Ok(None);
        }
        let table_map = reader.table_map(self.data.table_id).ok_or_else(|| {
            Error::Protocol(format!(
                "rows event references unknown table id {}",
                self.data.table_id
            ))
        })?;
        Ok(self.data.read_row(&mut self.cursor, table_map)?)
    }
}

/// remember a rows event as the active one for row pulling
pub(crate) fn activate_rows(event: &Event) -> Option<ActiveRows> {
    let data = match event {
        Event::WriteRows(e) => &e.data,
        Event::UpdateRows(e) => &e.data,
        Event::DeleteRows(e) => &e.data,
        _ => return None,
    };
    Some(ActiveRows {
        data: data.clone(),
        cursor: data.row_cursor(),
    })
}
