use thiserror::Error;

use crate::engine::types::{DataType, VersionId};

/// Errors surfaced by views, accessors and the storage/transaction collaborators.
///
/// Every variant reflects a logical usage error. Nothing here is retried or
/// recovered internally; callers decide what to do.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewError {
    /// The view has no source table (never attached, detached, or the table
    /// accessor was dropped).
    #[error("view is detached from its source table")]
    DetachedView,

    /// The addressed view entry refers to a row that has been erased.
    #[error("row {row} of the view is detached")]
    DetachedRow { row: usize },

    /// A row accessor whose row has been erased, or whose table is gone.
    #[error("row accessor is detached")]
    DetachedAccessor,

    #[error("row index {row} out of range (size {size})")]
    RowOutOfRange { row: usize, size: usize },

    #[error("column index {column} out of range (column count {count})")]
    ColumnOutOfRange { column: usize, count: usize },

    #[error("no column named '{name}'")]
    NoSuchColumn { name: String },

    #[error("column {column} has type {actual}, expected {expected}")]
    TypeMismatch {
        column: usize,
        expected: DataType,
        actual: DataType,
    },

    #[error("handover exported at version {exported} cannot be imported into a context pinned at {pinned}")]
    HandoverSnapshotMismatch { exported: VersionId, pinned: VersionId },

    #[error("handover patch has already been consumed")]
    PatchConsumed,

    #[error("handover could not resolve {what} in the destination context")]
    HandoverUnresolved { what: String },

    #[error("mutation requires a write transaction")]
    NotInWriteTransaction,

    #[error("operation not allowed in the current transaction stage: {0}")]
    WrongTransactStage(&'static str),

    #[error("no table named '{0}'")]
    NoSuchTable(String),

    #[error("table '{0}' already exists")]
    TableExists(String),
}

pub type Result<T> = std::result::Result<T, ViewError>;
