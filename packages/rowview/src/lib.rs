// src/lib.rs

pub mod config;
pub mod engine;
pub mod error;

// Re-export commonly used types for convenience
pub use engine::group::{Database, Group, SharedGroup};
pub use engine::handover::{AnyView, Handover, HandoverExport, HandoverPatch, RowHandover};
pub use engine::operators::{Predicate, Query, QueryWindow};
pub use engine::row::{LinkList, Row};
pub use engine::sort::SortDescriptor;
pub use engine::table::{ColumnSpec, TableRef};
pub use engine::table_view::{ConstTableView, TableView};
pub use engine::types::{DataType, RowIndexes, TableKey, Value, VersionId, DETACHED_REF};
pub use engine::view::{TableViewBase, ViewMode};
pub use error::{Result, ViewError};
