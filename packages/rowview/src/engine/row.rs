//! Single-row accessors and link-list accessors.
//!
//! A [`Row`] is registered in its table's accessor registry exactly like a
//! view and follows the same adjustment protocol: it tracks the identity of
//! one row until that row is erased, after which it is permanently detached.

use super::registry::{AccessorCell, RowAccessor};
use super::sort::SortDescriptor;
use super::table::{TableRef, WeakTableRef};
use super::table_view::TableView;
use super::types::{AccessorId, DataType, TableKey, Value, VersionId};
use super::view::{TableViewBase, ViewOrigin};
use crate::error::{Result, ViewError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::Arc;

pub(crate) type RowCell = Arc<RwLock<RowState>>;

#[derive(Debug)]
pub(crate) struct RowState {
    pub(crate) id: AccessorId,
    pub(crate) table: Option<WeakTableRef>,
    pub(crate) row: Option<usize>,
}

impl RowState {
    pub(crate) fn new(table: Option<WeakTableRef>, row: Option<usize>) -> Self {
        Self {
            id: AccessorId::next(),
            table,
            row,
        }
    }
}

impl RowAccessor for RowState {
    fn adj_insert_rows(&mut self, at: usize, count: usize) {
        if let Some(row) = self.row.as_mut() {
            if *row >= at {
                *row += count;
            }
        }
    }

    fn adj_erase_row(&mut self, at: usize) {
        match self.row {
            Some(row) if row == at => self.row = None,
            Some(row) if row > at => self.row = Some(row - 1),
            _ => {}
        }
    }

    fn adj_move_over(&mut self, from: usize, to: usize) {
        match self.row {
            Some(row) if row == to => self.row = None,
            Some(row) if row == from => self.row = Some(to),
            _ => {}
        }
    }
}

impl Drop for RowState {
    fn drop(&mut self) {
        if let Some(table) = self.table.as_ref().and_then(WeakTableRef::upgrade) {
            // Lazily pruned by the registry when the table is busy.
            if let Some(mut t) = table.0.try_write() {
                t.unregister(self.id);
            }
        }
    }
}

/// Handover description of a row accessor.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RowPatch {
    pub version: VersionId,
    pub table: TableKey,
    pub row: Option<usize>,
}

/// Accessor for one row of a table.
#[derive(Debug)]
pub struct Row {
    pub(crate) cell: RowCell,
}

impl Row {
    pub(crate) fn attach(table: &TableRef, row: usize) -> Result<Row> {
        let mut guard = table.write();
        guard.check_row(row)?;
        let cell = Arc::new(RwLock::new(RowState::new(Some(table.downgrade()), Some(row))));
        let accessor: AccessorCell = cell.clone();
        let id = cell.read().id;
        guard.register(id, &accessor);
        Ok(Row { cell })
    }

    pub(crate) fn from_state(state: RowState) -> Row {
        Row {
            cell: Arc::new(RwLock::new(state)),
        }
    }

    /// Re-attach a free-standing row accessor to `table`.
    pub(crate) fn bind(&self, table: &TableRef, row: Option<usize>) {
        let mut guard = table.write();
        let accessor: AccessorCell = self.cell.clone();
        let mut state = self.cell.write();
        state.table = Some(table.downgrade());
        state.row = row.filter(|r| *r < guard.size());
        if state.row.is_some() {
            guard.register(state.id, &accessor);
        }
    }

    pub fn is_attached(&self) -> bool {
        let state = self.cell.read();
        state.row.is_some() && state.table.as_ref().and_then(WeakTableRef::upgrade).is_some()
    }

    /// Current position of the tracked row.
    pub fn index(&self) -> Result<usize> {
        self.cell.read().row.ok_or(ViewError::DetachedAccessor)
    }

    pub fn table(&self) -> Result<TableRef> {
        self.cell
            .read()
            .table
            .as_ref()
            .and_then(WeakTableRef::upgrade)
            .ok_or(ViewError::DetachedAccessor)
    }

    fn locate(&self) -> Result<(TableRef, usize)> {
        let table = self.table()?;
        let row = self.index()?;
        Ok((table, row))
    }

    pub fn get(&self, column: usize) -> Result<Value> {
        let (table, row) = self.locate()?;
        let guard = table.read();
        guard.get_value(column, row).cloned()
    }

    pub fn get_int(&self, column: usize) -> Result<i64> {
        let (table, row) = self.locate()?;
        let guard = table.read();
        guard.get_int(column, row)
    }

    pub fn get_bool(&self, column: usize) -> Result<bool> {
        let (table, row) = self.locate()?;
        let guard = table.read();
        guard.get_bool(column, row)
    }

    pub fn get_double(&self, column: usize) -> Result<f64> {
        let (table, row) = self.locate()?;
        let guard = table.read();
        guard.get_double(column, row)
    }

    pub fn get_string(&self, column: usize) -> Result<SmolStr> {
        let (table, row) = self.locate()?;
        let guard = table.read();
        guard.get_string(column, row)
    }

    pub fn set(&self, column: usize, value: impl Into<Value>) -> Result<()> {
        let (table, row) = self.locate()?;
        let mut guard = table.write();
        guard.set_value(column, row, value)
    }

    pub fn set_int(&self, column: usize, value: i64) -> Result<()> {
        let (table, row) = self.locate()?;
        let mut guard = table.write();
        guard.set_int(column, row, value)
    }

    pub fn get_linklist(&self, column: usize) -> Result<LinkList> {
        let (table, _) = self.locate()?;
        table.read().check_type(column, DataType::LinkList)?;
        LinkList::new(self.clone(), column)
    }

    /// Free-standing copy plus the patch that re-binds it in another context.
    pub(crate) fn export_patch(&self, version: VersionId) -> Result<(Row, RowPatch)> {
        let (table, row) = {
            let state = self.cell.read();
            (state.table.as_ref().and_then(WeakTableRef::upgrade), state.row)
        };
        let table = table.ok_or(ViewError::DetachedAccessor)?;
        let key = table.read().key().ok_or_else(|| ViewError::HandoverUnresolved {
            what: "row accessor on a table outside any group".into(),
        })?;
        Ok((
            Row::from_state(RowState::new(None, None)),
            RowPatch {
                version,
                table: key,
                row,
            },
        ))
    }
}

impl Clone for Row {
    /// A new accessor tracking the same row, registered independently.
    fn clone(&self) -> Self {
        let table = self.cell.read().table.as_ref().and_then(WeakTableRef::upgrade);
        let Some(table) = table else {
            return Row::from_state(RowState::new(None, None));
        };
        let mut guard = table.write();
        let row = self.cell.read().row;
        let cell = Arc::new(RwLock::new(RowState::new(Some(table.downgrade()), row)));
        if row.is_some() {
            let accessor: AccessorCell = cell.clone();
            let id = cell.read().id;
            guard.register(id, &accessor);
        }
        drop(guard);
        Row { cell }
    }
}

/// Accessor for the link list stored in one cell, addressed through the
/// owning row so it follows that row through structural changes.
#[derive(Debug, Clone)]
pub struct LinkList {
    origin: Row,
    column: usize,
}

impl LinkList {
    pub(crate) fn new(origin: Row, column: usize) -> Result<LinkList> {
        Ok(LinkList { origin, column })
    }

    pub fn is_attached(&self) -> bool {
        self.origin.is_attached()
    }

    pub fn origin(&self) -> &Row {
        &self.origin
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn target_table(&self) -> Result<TableRef> {
        let (table, _) = self.origin.locate()?;
        let guard = table.read();
        guard.get_link_target(self.column)
    }

    fn targets(&self) -> Result<Vec<usize>> {
        let (table, row) = self.origin.locate()?;
        let guard = table.read();
        guard.get_link_list(self.column, row)
    }

    pub fn size(&self) -> Result<usize> {
        Ok(self.targets()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.size()? == 0)
    }

    /// Target row at position `ndx` of the list.
    pub fn get(&self, ndx: usize) -> Result<Row> {
        let targets = self.targets()?;
        let row = *targets.get(ndx).ok_or(ViewError::RowOutOfRange {
            row: ndx,
            size: targets.len(),
        })?;
        Row::attach(&self.target_table()?, row)
    }

    pub fn add(&self, target_row: usize) -> Result<()> {
        self.target_table()?.read().check_row(target_row)?;
        let (table, row) = self.origin.locate()?;
        let mut guard = table.write();
        let mut targets = guard.get_link_list(self.column, row)?;
        targets.push(target_row);
        guard.set_link_list(self.column, row, targets)
    }

    pub fn remove(&self, ndx: usize) -> Result<()> {
        let (table, row) = self.origin.locate()?;
        let mut guard = table.write();
        let mut targets = guard.get_link_list(self.column, row)?;
        if ndx >= targets.len() {
            return Err(ViewError::RowOutOfRange {
                row: ndx,
                size: targets.len(),
            });
        }
        targets.remove(ndx);
        guard.set_link_list(self.column, row, targets)
    }

    /// Materialize the list as a view over the target table. The view
    /// re-reads the list on every sync.
    pub fn view(&self) -> Result<TableView> {
        self.build_view(None)
    }

    pub fn get_sorted_view(&self, column: usize, ascending: bool) -> Result<TableView> {
        self.build_view(Some(SortDescriptor::single(column, ascending)))
    }

    fn build_view(&self, sort: Option<SortDescriptor>) -> Result<TableView> {
        let target = self.target_table()?;
        let origin = ViewOrigin::LinkList {
            origin: self.origin.cell.clone(),
            column: self.column,
        };
        TableViewBase::build(&target, origin, sort).map(TableView::from_base)
    }
}
