pub mod group;
pub mod handover;
pub mod operators;
pub mod registry;
pub mod row;
pub mod sort;
pub mod table;
pub mod table_view;
pub mod transact_log;
pub mod types;
pub mod view;

pub use group::{Database, Group, SharedGroup, Snapshot, TransactStage};
pub use handover::{AnyView, Handover, HandoverExport, HandoverPatch, OriginPatch, RowHandover};
pub use operators::{Predicate, Query, QueryWindow};
pub use registry::AccessorRegistry;
pub use row::{LinkList, Row, RowPatch};
pub use sort::{SortColumn, SortDescriptor};
pub use table::{ColumnSpec, Table, TableData, TableRef};
pub use table_view::{ConstTableView, TableView};
pub use transact_log::TableOp;
pub use types::{AccessorId, DataType, FastMap, RowIndexes, TableKey, Value, VersionId, DETACHED_REF};
pub use view::{TableViewBase, ViewMode};
