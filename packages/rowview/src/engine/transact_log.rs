use super::table::ColumnSpec;
use super::types::{TableKey, Value};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// One replayable mutation, as recorded by a write transaction and replayed
/// by every context that later advances past the commit.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TableOp {
    AddTable {
        name: SmolStr,
        columns: Vec<ColumnSpec>,
    },
    InsertRows {
        table: TableKey,
        at: usize,
        count: usize,
    },
    EraseRow {
        table: TableKey,
        row: usize,
    },
    MoveLastOver {
        table: TableKey,
        row: usize,
    },
    Set {
        table: TableKey,
        column: usize,
        row: usize,
        value: Value,
    },
    Clear {
        table: TableKey,
    },
}

impl TableOp {
    pub fn table(&self) -> Option<TableKey> {
        match self {
            TableOp::AddTable { .. } => None,
            TableOp::InsertRows { table, .. }
            | TableOp::EraseRow { table, .. }
            | TableOp::MoveLastOver { table, .. }
            | TableOp::Set { table, .. }
            | TableOp::Clear { table } => Some(*table),
        }
    }
}

/// Pending mutations of the current write transaction of one context.
#[derive(Debug, Default)]
pub(crate) struct TransactLog {
    pub(crate) writable: bool,
    pub(crate) ops: Vec<TableOp>,
}

impl TransactLog {
    pub(crate) fn take_ops(&mut self) -> Vec<TableOp> {
        std::mem::take(&mut self.ops)
    }
}
