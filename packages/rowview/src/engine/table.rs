//! In-memory columnar storage: the collaborator views read through.
//!
//! Every structural mutation notifies the table's [`AccessorRegistry`] while
//! the table's write lock is held, so no accessor can observe a half-applied
//! change.

use super::operators::Query;
use super::registry::{AccessorCell, AccessorRegistry};
use super::row::{LinkList, Row};
use super::sort::SortDescriptor;
use super::table_view::TableView;
use super::transact_log::{TableOp, TransactLog};
use super::types::{AccessorId, DataType, TableKey, Value};
use super::view::{TableViewBase, ViewOrigin};
use crate::error::{Result, ViewError};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::{Arc, Weak};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub name: SmolStr,
    pub data_type: DataType,
    /// Target table of a Link / LinkList column.
    #[serde(default)]
    pub link_target: Option<TableKey>,
    /// Columns of a subtable column.
    #[serde(default)]
    pub subspec: Vec<ColumnSpec>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<SmolStr>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            link_target: None,
            subspec: Vec::new(),
        }
    }

    pub fn link(name: impl Into<SmolStr>, target: TableKey) -> Self {
        Self {
            link_target: Some(target),
            ..Self::new(name, DataType::Link)
        }
    }

    pub fn link_list(name: impl Into<SmolStr>, target: TableKey) -> Self {
        Self {
            link_target: Some(target),
            ..Self::new(name, DataType::LinkList)
        }
    }

    pub fn subtable(name: impl Into<SmolStr>, subspec: Vec<ColumnSpec>) -> Self {
        Self {
            subspec,
            ..Self::new(name, DataType::Table)
        }
    }

    fn default_value(&self) -> Value {
        match self.data_type {
            DataType::Int | DataType::Mixed => Value::Int(0),
            DataType::Bool => Value::Bool(false),
            DataType::DateTime => Value::DateTime(0),
            DataType::Float => Value::Float(0.0),
            DataType::Double => Value::Double(0.0),
            DataType::String => Value::String(SmolStr::default()),
            DataType::Binary => Value::Binary(Vec::new()),
            DataType::Link => Value::Link(None),
            DataType::LinkList => Value::LinkList(Vec::new()),
            DataType::Table => Value::Table(Box::new(TableData::new(self.subspec.clone()))),
        }
    }
}

/// Plain cell storage, one `Vec` per column. Cloneable and free of any
/// accessor bookkeeping; this is what snapshots and subtables hold.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct TableData {
    columns: Vec<ColumnSpec>,
    cells: Vec<Vec<Value>>,
    size: usize,
}

impl TableData {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        let cells = columns.iter().map(|_| Vec::new()).collect();
        Self {
            columns,
            cells,
            size: 0,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn get(&self, column: usize, row: usize) -> Option<&Value> {
        self.cells.get(column)?.get(row)
    }

    fn insert_rows(&mut self, at: usize, count: usize) {
        for (spec, col) in self.columns.iter().zip(self.cells.iter_mut()) {
            let fill = spec.default_value();
            col.splice(at..at, std::iter::repeat(fill).take(count));
        }
        self.size += count;
    }

    fn erase_row(&mut self, row: usize) {
        for col in self.cells.iter_mut() {
            col.remove(row);
        }
        self.size -= 1;
    }

    fn move_last_over(&mut self, row: usize) {
        for col in self.cells.iter_mut() {
            col.swap_remove(row);
        }
        self.size -= 1;
    }

    fn clear(&mut self) {
        for col in self.cells.iter_mut() {
            col.clear();
        }
        self.size = 0;
    }
}

pub struct Table {
    key: Option<TableKey>,
    name: SmolStr,
    data: TableData,
    version: u64,
    registry: AccessorRegistry,
    log: Option<Arc<Mutex<TransactLog>>>,
    link_targets: Vec<Option<Weak<RwLock<Table>>>>,
}

impl Table {
    pub(crate) fn from_parts(
        key: Option<TableKey>,
        name: SmolStr,
        data: TableData,
        version: u64,
        log: Option<Arc<Mutex<TransactLog>>>,
    ) -> Self {
        let link_targets = vec![None; data.columns.len()];
        Self {
            key,
            name,
            data,
            version,
            registry: AccessorRegistry::new(),
            log,
            link_targets,
        }
    }

    // --- Metadata ---

    pub fn key(&self) -> Option<TableKey> {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.size == 0
    }

    /// Mutation counter, bumped by every change to this table.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn data(&self) -> &TableData {
        &self.data
    }

    pub fn registry(&self) -> &AccessorRegistry {
        &self.registry
    }

    pub fn get_column_count(&self) -> usize {
        self.data.columns.len()
    }

    pub fn get_column_name(&self, column: usize) -> Result<&str> {
        Ok(self.column_spec(column)?.name.as_str())
    }

    pub fn get_column_index(&self, name: &str) -> Result<usize> {
        self.data
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| ViewError::NoSuchColumn {
                name: name.to_string(),
            })
    }

    pub fn get_column_type(&self, column: usize) -> Result<DataType> {
        Ok(self.column_spec(column)?.data_type)
    }

    pub(crate) fn column_spec(&self, column: usize) -> Result<&ColumnSpec> {
        self.data
            .columns
            .get(column)
            .ok_or(ViewError::ColumnOutOfRange {
                column,
                count: self.data.columns.len(),
            })
    }

    pub(crate) fn check_row(&self, row: usize) -> Result<()> {
        if row < self.data.size {
            Ok(())
        } else {
            Err(ViewError::RowOutOfRange {
                row,
                size: self.data.size,
            })
        }
    }

    /// Fails unless `column` holds `expected`. Int access is allowed on
    /// DateTime columns.
    pub(crate) fn check_type(&self, column: usize, expected: DataType) -> Result<()> {
        let actual = self.get_column_type(column)?;
        let ok = actual == expected || (expected == DataType::Int && actual == DataType::DateTime);
        if ok {
            Ok(())
        } else {
            Err(ViewError::TypeMismatch {
                column,
                expected,
                actual,
            })
        }
    }

    // --- Registry ---

    pub(crate) fn register(&mut self, id: AccessorId, accessor: &AccessorCell) {
        self.registry.register(id, accessor);
    }

    pub(crate) fn unregister(&mut self, id: AccessorId) -> bool {
        self.registry.unregister(id)
    }

    // --- Getters ---

    pub fn get_value(&self, column: usize, row: usize) -> Result<&Value> {
        self.column_spec(column)?;
        self.check_row(row)?;
        self.data
            .get(column, row)
            .ok_or(ViewError::RowOutOfRange {
                row,
                size: self.data.size,
            })
    }

    fn get_typed<T>(
        &self,
        column: usize,
        row: usize,
        expected: DataType,
        extract: impl FnOnce(&Value) -> Option<T>,
    ) -> Result<T> {
        self.check_type(column, expected)?;
        let value = self.get_value(column, row)?;
        extract(value).ok_or(ViewError::TypeMismatch {
            column,
            expected,
            actual: value.data_type(),
        })
    }

    pub fn get_int(&self, column: usize, row: usize) -> Result<i64> {
        self.get_typed(column, row, DataType::Int, Value::as_int)
    }

    pub fn get_bool(&self, column: usize, row: usize) -> Result<bool> {
        self.get_typed(column, row, DataType::Bool, Value::as_bool)
    }

    pub fn get_datetime(&self, column: usize, row: usize) -> Result<i64> {
        self.get_typed(column, row, DataType::DateTime, Value::as_int)
    }

    pub fn get_float(&self, column: usize, row: usize) -> Result<f32> {
        self.get_typed(column, row, DataType::Float, Value::as_float)
    }

    pub fn get_double(&self, column: usize, row: usize) -> Result<f64> {
        self.get_typed(column, row, DataType::Double, Value::as_double)
    }

    pub fn get_string(&self, column: usize, row: usize) -> Result<SmolStr> {
        self.get_typed(column, row, DataType::String, |v| match v {
            Value::String(s) => Some(s.clone()),
            _ => None,
        })
    }

    pub fn get_binary(&self, column: usize, row: usize) -> Result<Vec<u8>> {
        self.get_typed(column, row, DataType::Binary, |v| v.as_binary().map(<[u8]>::to_vec))
    }

    pub fn get_mixed(&self, column: usize, row: usize) -> Result<Value> {
        self.get_typed(column, row, DataType::Mixed, |v| Some(v.clone()))
    }

    pub fn get_mixed_type(&self, column: usize, row: usize) -> Result<DataType> {
        self.get_typed(column, row, DataType::Mixed, |v| Some(v.data_type()))
    }

    /// Target row of a link, `None` for a null link.
    pub fn get_link(&self, column: usize, row: usize) -> Result<Option<usize>> {
        self.get_typed(column, row, DataType::Link, |v| match v {
            Value::Link(l) => Some(*l),
            _ => None,
        })
    }

    pub fn is_null_link(&self, column: usize, row: usize) -> Result<bool> {
        Ok(self.get_link(column, row)?.is_none())
    }

    pub fn get_link_list(&self, column: usize, row: usize) -> Result<Vec<usize>> {
        self.get_typed(column, row, DataType::LinkList, |v| match v {
            Value::LinkList(l) => Some(l.clone()),
            _ => None,
        })
    }

    fn subtable_data(&self, column: usize, row: usize) -> Result<Option<&TableData>> {
        let ty = self.get_column_type(column)?;
        if ty != DataType::Table && ty != DataType::Mixed {
            return Err(ViewError::TypeMismatch {
                column,
                expected: DataType::Table,
                actual: ty,
            });
        }
        match self.get_value(column, row)? {
            Value::Table(data) => Ok(Some(data)),
            _ => Ok(None),
        }
    }

    pub fn get_subtable_size(&self, column: usize, row: usize) -> Result<usize> {
        Ok(self.subtable_data(column, row)?.map_or(0, TableData::size))
    }

    /// Free-standing copy of a subtable cell.
    pub fn get_subtable(&self, column: usize, row: usize) -> Result<TableRef> {
        let data = match self.subtable_data(column, row)? {
            Some(data) => data.clone(),
            None => TableData::default(),
        };
        let name = self.column_spec(column)?.name.clone();
        Ok(TableRef::from_data(name, data))
    }

    pub fn get_link_target(&self, column: usize) -> Result<TableRef> {
        let ty = self.get_column_type(column)?;
        if ty != DataType::Link && ty != DataType::LinkList {
            return Err(ViewError::TypeMismatch {
                column,
                expected: DataType::Link,
                actual: ty,
            });
        }
        self.link_targets[column]
            .as_ref()
            .and_then(Weak::upgrade)
            .map(TableRef)
            .ok_or_else(|| ViewError::NoSuchTable(format!("link target of column {}", column)))
    }

    pub(crate) fn set_link_target_weak(&mut self, column: usize, target: Weak<RwLock<Table>>) {
        if let Some(slot) = self.link_targets.get_mut(column) {
            *slot = Some(target);
        }
    }

    // --- Setters ---

    pub fn set_value(&mut self, column: usize, row: usize, value: impl Into<Value>) -> Result<()> {
        let spec_type = self.get_column_type(column)?;
        self.check_row(row)?;
        let value = value.into().coerce_for(column, spec_type)?;
        self.ensure_writable()?;
        self.record(|table| TableOp::Set {
            table,
            column,
            row,
            value: value.clone(),
        });
        self.do_set(column, row, value);
        Ok(())
    }

    fn set_typed(&mut self, column: usize, row: usize, expected: DataType, value: Value) -> Result<()> {
        self.check_type(column, expected)?;
        self.set_value(column, row, value)
    }

    pub fn set_int(&mut self, column: usize, row: usize, value: i64) -> Result<()> {
        match self.get_column_type(column)? {
            DataType::DateTime => self.set_value(column, row, Value::DateTime(value)),
            _ => self.set_typed(column, row, DataType::Int, Value::Int(value)),
        }
    }

    pub fn set_bool(&mut self, column: usize, row: usize, value: bool) -> Result<()> {
        self.set_typed(column, row, DataType::Bool, Value::Bool(value))
    }

    pub fn set_datetime(&mut self, column: usize, row: usize, value: i64) -> Result<()> {
        self.set_typed(column, row, DataType::DateTime, Value::DateTime(value))
    }

    pub fn set_float(&mut self, column: usize, row: usize, value: f32) -> Result<()> {
        self.set_typed(column, row, DataType::Float, Value::Float(value))
    }

    pub fn set_double(&mut self, column: usize, row: usize, value: f64) -> Result<()> {
        self.set_typed(column, row, DataType::Double, Value::Double(value))
    }

    pub fn set_string(&mut self, column: usize, row: usize, value: &str) -> Result<()> {
        self.set_typed(column, row, DataType::String, Value::from(value))
    }

    pub fn set_binary(&mut self, column: usize, row: usize, value: &[u8]) -> Result<()> {
        self.set_typed(column, row, DataType::Binary, Value::Binary(value.to_vec()))
    }

    pub fn set_mixed(&mut self, column: usize, row: usize, value: Value) -> Result<()> {
        self.check_type(column, DataType::Mixed)?;
        self.set_value(column, row, value)
    }

    pub fn set_link(&mut self, column: usize, row: usize, target_row: usize) -> Result<()> {
        self.set_typed(column, row, DataType::Link, Value::Link(Some(target_row)))
    }

    pub fn nullify_link(&mut self, column: usize, row: usize) -> Result<()> {
        self.set_typed(column, row, DataType::Link, Value::Link(None))
    }

    pub fn set_link_list(&mut self, column: usize, row: usize, targets: Vec<usize>) -> Result<()> {
        self.set_typed(column, row, DataType::LinkList, Value::LinkList(targets))
    }

    /// Store a copy of `value` in a subtable cell; `None` stores an empty subtable.
    pub fn set_subtable(&mut self, column: usize, row: usize, value: Option<&TableData>) -> Result<()> {
        let spec = self.column_spec(column)?;
        let data = match value {
            Some(data) => data.clone(),
            None => TableData::new(spec.subspec.clone()),
        };
        if spec.data_type != DataType::Table && spec.data_type != DataType::Mixed {
            return Err(ViewError::TypeMismatch {
                column,
                expected: DataType::Table,
                actual: spec.data_type,
            });
        }
        self.set_value(column, row, Value::Table(Box::new(data)))
    }

    pub fn clear_subtable(&mut self, column: usize, row: usize) -> Result<()> {
        self.set_subtable(column, row, None)
    }

    // --- Structural mutation ---

    pub fn add_empty_row(&mut self) -> Result<usize> {
        let at = self.size();
        self.insert_empty_rows(at, 1)?;
        Ok(at)
    }

    pub fn add_empty_rows(&mut self, count: usize) -> Result<usize> {
        let at = self.size();
        self.insert_empty_rows(at, count)?;
        Ok(at)
    }

    pub fn insert_empty_rows(&mut self, at: usize, count: usize) -> Result<()> {
        if at > self.size() {
            return Err(ViewError::RowOutOfRange {
                row: at,
                size: self.size(),
            });
        }
        self.ensure_writable()?;
        self.record(|table| TableOp::InsertRows { table, at, count });
        self.do_insert_rows(at, count);
        Ok(())
    }

    /// Ordered erase: later rows shift down by one.
    pub fn remove(&mut self, row: usize) -> Result<()> {
        self.check_row(row)?;
        self.ensure_writable()?;
        self.record(|table| TableOp::EraseRow { table, row });
        self.do_erase_row(row);
        Ok(())
    }

    pub fn remove_last(&mut self) -> Result<()> {
        match self.size() {
            0 => Ok(()),
            n => self.remove(n - 1),
        }
    }

    /// Identity erase: the last row is relocated into the erased slot.
    pub fn move_last_over(&mut self, row: usize) -> Result<()> {
        self.check_row(row)?;
        self.ensure_writable()?;
        self.record(|table| TableOp::MoveLastOver { table, row });
        self.do_move_last_over(row);
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.record(|table| TableOp::Clear { table });
        self.do_clear();
        Ok(())
    }

    // --- Replay ---

    /// Apply a committed mutation from another context. Not recorded and not
    /// subject to the write-transaction check.
    pub(crate) fn apply_op(&mut self, op: &TableOp) -> Result<()> {
        match op {
            TableOp::InsertRows { at, count, .. } => {
                if *at > self.size() {
                    return Err(ViewError::RowOutOfRange {
                        row: *at,
                        size: self.size(),
                    });
                }
                self.do_insert_rows(*at, *count);
            }
            TableOp::EraseRow { row, .. } => {
                self.check_row(*row)?;
                self.do_erase_row(*row);
            }
            TableOp::MoveLastOver { row, .. } => {
                self.check_row(*row)?;
                self.do_move_last_over(*row);
            }
            TableOp::Set {
                column, row, value, ..
            } => {
                self.column_spec(*column)?;
                self.check_row(*row)?;
                self.do_set(*column, *row, value.clone());
            }
            TableOp::Clear { .. } => self.do_clear(),
            TableOp::AddTable { .. } => {}
        }
        Ok(())
    }

    fn do_set(&mut self, column: usize, row: usize, value: Value) {
        self.data.cells[column][row] = value;
        self.version += 1;
    }

    fn do_insert_rows(&mut self, at: usize, count: usize) {
        if count == 0 {
            return;
        }
        self.data.insert_rows(at, count);
        self.version += 1;
        self.registry.rows_inserted(at, count);
    }

    fn do_erase_row(&mut self, row: usize) {
        self.data.erase_row(row);
        self.version += 1;
        self.registry.row_erased(row);
    }

    fn do_move_last_over(&mut self, row: usize) {
        let last = self.size() - 1;
        self.data.move_last_over(row);
        self.version += 1;
        if row == last {
            self.registry.row_erased(row);
        } else {
            self.registry.row_moved(last, row);
        }
    }

    fn do_clear(&mut self) {
        let size = self.size();
        self.data.clear();
        self.version += 1;
        for row in (0..size).rev() {
            self.registry.row_erased(row);
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        match &self.log {
            Some(log) if !log.lock().writable => Err(ViewError::NotInWriteTransaction),
            _ => Ok(()),
        }
    }

    fn record(&self, op: impl FnOnce(TableKey) -> TableOp) {
        if let (Some(log), Some(key)) = (&self.log, self.key) {
            log.lock().ops.push(op(key));
        }
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("size", &self.data.size)
            .field("version", &self.version)
            .field("registry", &self.registry)
            .finish()
    }
}

/// Shared handle to a table accessor.
///
/// Views hold only a weak reference; dropping the last `TableRef` detaches
/// every view built on the table.
#[derive(Clone, Debug)]
pub struct TableRef(pub(crate) Arc<RwLock<Table>>);

#[derive(Clone, Debug)]
pub(crate) struct WeakTableRef(Weak<RwLock<Table>>);

impl WeakTableRef {
    pub(crate) fn upgrade(&self) -> Option<TableRef> {
        self.0.upgrade().map(TableRef)
    }
}

impl TableRef {
    /// Free-standing table, not part of any group. Always writable.
    pub fn new(name: impl Into<SmolStr>, columns: Vec<ColumnSpec>) -> Self {
        Self::from_data(name.into(), TableData::new(columns))
    }

    pub(crate) fn from_data(name: SmolStr, data: TableData) -> Self {
        TableRef(Arc::new(RwLock::new(Table::from_parts(None, name, data, 0, None))))
    }

    pub(crate) fn from_table(table: Table) -> Self {
        TableRef(Arc::new(RwLock::new(table)))
    }

    /// Shared access. Do not hold the guard across calls into views built on
    /// this table.
    pub fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.0.read()
    }

    /// Exclusive access. Structural mutations made through the guard adjust
    /// every registered accessor before the call returns.
    pub fn write(&self) -> RwLockWriteGuard<'_, Table> {
        self.0.write()
    }

    pub(crate) fn downgrade(&self) -> WeakTableRef {
        WeakTableRef(Arc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &TableRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Point a link column of a free-standing table at its target.
    pub fn set_link_target(&self, column: usize, target: &TableRef) -> Result<()> {
        let mut table = self.write();
        let ty = table.get_column_type(column)?;
        if ty != DataType::Link && ty != DataType::LinkList {
            return Err(ViewError::TypeMismatch {
                column,
                expected: DataType::Link,
                actual: ty,
            });
        }
        table.set_link_target_weak(column, Arc::downgrade(&target.0));
        Ok(())
    }

    // --- Accessors and views ---

    pub fn where_(&self) -> Query {
        Query::new(self)
    }

    /// Every row, in table order, without a query.
    pub fn view_all(&self) -> Result<TableView> {
        TableViewBase::build(self, ViewOrigin::Table, None).map(TableView::from_base)
    }

    pub fn get_sorted_view(&self, column: usize, ascending: bool) -> Result<TableView> {
        let sort = SortDescriptor::single(column, ascending);
        TableViewBase::build(self, ViewOrigin::Table, Some(sort)).map(TableView::from_base)
    }

    /// One row per distinct value of `column`, the first occurrence in table
    /// order.
    pub fn get_distinct_view(&self, column: usize) -> Result<TableView> {
        TableViewBase::build(self, ViewOrigin::Distinct { column }, None).map(TableView::from_base)
    }

    pub fn find_all_int(&self, column: usize, value: i64) -> Result<TableView> {
        self.read().check_type(column, DataType::Int)?;
        self.where_().equal(column, value).find_all()
    }

    pub fn find_all_string(&self, column: usize, value: &str) -> Result<TableView> {
        self.read().check_type(column, DataType::String)?;
        self.where_().equal(column, value).find_all()
    }

    pub fn get_row(&self, row: usize) -> Result<Row> {
        Row::attach(self, row)
    }

    pub fn get_linklist(&self, column: usize, row: usize) -> Result<LinkList> {
        self.read().check_type(column, DataType::LinkList)?;
        LinkList::new(Row::attach(self, row)?, column)
    }
}

#[cfg(test)]
mod table_tests {
    use super::*;

    fn people() -> TableRef {
        let table = TableRef::new(
            "people",
            vec![
                ColumnSpec::new("age", DataType::Int),
                ColumnSpec::new("name", DataType::String),
                ColumnSpec::new("born", DataType::DateTime),
            ],
        );
        {
            let mut t = table.write();
            t.add_empty_rows(3).unwrap();
            for (row, (age, name)) in [(30, "ann"), (40, "bob"), (50, "cid")].iter().enumerate() {
                t.set_int(0, row, *age).unwrap();
                t.set_string(1, row, name).unwrap();
            }
        }
        table
    }

    #[test]
    fn test_typed_access_checks_column_type() {
        let table = people();
        let t = table.read();
        assert_eq!(t.get_int(0, 1).unwrap(), 40);
        assert_eq!(t.get_string(1, 2).unwrap(), "cid");
        assert!(matches!(t.get_int(1, 0), Err(ViewError::TypeMismatch { .. })));
        assert!(matches!(t.get_int(0, 9), Err(ViewError::RowOutOfRange { row: 9, size: 3 })));
        assert!(matches!(t.get_int(7, 0), Err(ViewError::ColumnOutOfRange { column: 7, .. })));
    }

    #[test]
    fn test_int_access_on_datetime_column() {
        let table = people();
        table.write().set_int(2, 0, 1_000).unwrap();
        let t = table.read();
        assert_eq!(t.get_datetime(2, 0).unwrap(), 1_000);
        assert_eq!(t.get_int(2, 0).unwrap(), 1_000);
    }

    #[test]
    fn test_every_mutation_bumps_version() {
        let table = people();
        let v0 = table.read().version();
        table.write().set_int(0, 0, 31).unwrap();
        let v1 = table.read().version();
        table.write().move_last_over(0).unwrap();
        let v2 = table.read().version();
        assert!(v0 < v1 && v1 < v2);
    }

    #[test]
    fn test_move_last_over_relocates_last_row() {
        let table = people();
        table.write().move_last_over(0).unwrap();
        let t = table.read();
        assert_eq!(t.size(), 2);
        assert_eq!(t.get_string(1, 0).unwrap(), "cid");
        assert_eq!(t.get_string(1, 1).unwrap(), "bob");
    }

    #[test]
    fn test_subtable_cells_are_copies() {
        let table = TableRef::new(
            "orders",
            vec![ColumnSpec::subtable(
                "lines",
                vec![ColumnSpec::new("qty", DataType::Int)],
            )],
        );
        table.write().add_empty_row().unwrap();
        assert_eq!(table.read().get_subtable_size(0, 0).unwrap(), 0);

        let sub = table.read().get_subtable(0, 0).unwrap();
        sub.write().add_empty_rows(2).unwrap();
        assert_eq!(table.read().get_subtable_size(0, 0).unwrap(), 0);

        table.write().set_subtable(0, 0, Some(sub.read().data())).unwrap();
        assert_eq!(table.read().get_subtable_size(0, 0).unwrap(), 2);
        table.write().clear_subtable(0, 0).unwrap();
        assert_eq!(table.read().get_subtable_size(0, 0).unwrap(), 0);
    }

    #[test]
    fn test_column_lookup_by_name() {
        let table = people();
        let t = table.read();
        assert_eq!(t.get_column_index("name").unwrap(), 1);
        assert_eq!(t.get_column_name(2).unwrap(), "born");
        assert!(matches!(t.get_column_index("zip"), Err(ViewError::NoSuchColumn { .. })));
    }
}
