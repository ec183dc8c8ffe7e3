//! Mutable and read-only view facades.

use super::operators::{Predicate, Query};
use super::row::Row;
use super::table::{TableData, TableRef};
use super::types::{DataType, Value};
use super::view::{is_cell_in_sync, TableViewBase};
use crate::error::{Result, ViewError};
use std::ops::{Deref, DerefMut};

/// View with write access to the rows it references.
#[derive(Clone, Debug)]
pub struct TableView {
    base: TableViewBase,
}

impl TableView {
    pub(crate) fn from_base(base: TableViewBase) -> Self {
        Self { base }
    }

    pub(crate) fn into_base(self) -> TableViewBase {
        self.base
    }

    /// Mutable handle to the source table.
    pub fn get_parent(&self) -> Result<TableRef> {
        self.base.table()
    }

    /// Query scoped to the rows currently in this view.
    pub fn where_(&self) -> Query {
        self.base.restricted_query()
    }

    pub fn find_all_int(&self, column: usize, value: i64) -> Result<TableView> {
        self.get_parent()?.read().check_type(column, DataType::Int)?;
        self.where_().equal(column, value).find_all()
    }

    pub fn find_all_string(&self, column: usize, value: &str) -> Result<TableView> {
        self.get_parent()?.read().check_type(column, DataType::String)?;
        self.where_().equal(column, value).find_all()
    }

    pub fn find_all(&self, predicate: Predicate) -> Result<TableView> {
        self.where_().and_predicate(predicate).find_all()
    }

    /// Row accessor for view entry `ndx`, tracking that row independently
    /// of this view.
    pub fn get(&self, ndx: usize) -> Result<Row> {
        let table = self.base.table()?;
        let real = self.base.get_source_ndx(ndx)?;
        Row::attach(&table, real)
    }

    pub fn front(&self) -> Result<Row> {
        self.get(0)
    }

    pub fn back(&self) -> Result<Row> {
        match self.size() {
            0 => Err(ViewError::RowOutOfRange { row: 0, size: 0 }),
            n => self.get(n - 1),
        }
    }

    // --- Setters ---

    pub fn set_value(&self, column: usize, ndx: usize, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.base.with_row_mut(ndx, |t, row| t.set_value(column, row, value))
    }

    pub fn set_int(&self, column: usize, ndx: usize, value: i64) -> Result<()> {
        self.base.with_row_mut(ndx, |t, row| t.set_int(column, row, value))
    }

    pub fn set_bool(&self, column: usize, ndx: usize, value: bool) -> Result<()> {
        self.base.with_row_mut(ndx, |t, row| t.set_bool(column, row, value))
    }

    pub fn set_datetime(&self, column: usize, ndx: usize, value: i64) -> Result<()> {
        self.base.with_row_mut(ndx, |t, row| t.set_datetime(column, row, value))
    }

    pub fn set_float(&self, column: usize, ndx: usize, value: f32) -> Result<()> {
        self.base.with_row_mut(ndx, |t, row| t.set_float(column, row, value))
    }

    pub fn set_double(&self, column: usize, ndx: usize, value: f64) -> Result<()> {
        self.base.with_row_mut(ndx, |t, row| t.set_double(column, row, value))
    }

    pub fn set_string(&self, column: usize, ndx: usize, value: &str) -> Result<()> {
        self.base.with_row_mut(ndx, |t, row| t.set_string(column, row, value))
    }

    pub fn set_binary(&self, column: usize, ndx: usize, value: &[u8]) -> Result<()> {
        self.base.with_row_mut(ndx, |t, row| t.set_binary(column, row, value))
    }

    pub fn set_mixed(&self, column: usize, ndx: usize, value: Value) -> Result<()> {
        self.base.with_row_mut(ndx, |t, row| t.set_mixed(column, row, value))
    }

    pub fn set_link(&self, column: usize, ndx: usize, target_row: usize) -> Result<()> {
        self.base.with_row_mut(ndx, |t, row| t.set_link(column, row, target_row))
    }

    pub fn nullify_link(&self, column: usize, ndx: usize) -> Result<()> {
        self.base.with_row_mut(ndx, |t, row| t.nullify_link(column, row))
    }

    pub fn set_subtable(&self, column: usize, ndx: usize, value: Option<&TableData>) -> Result<()> {
        self.base.with_row_mut(ndx, |t, row| t.set_subtable(column, row, value))
    }

    pub fn clear_subtable(&self, column: usize, ndx: usize) -> Result<()> {
        self.base.with_row_mut(ndx, |t, row| t.clear_subtable(column, row))
    }

    // --- Removal ---

    /// Erase the row behind entry `ndx` from the table and drop the entry.
    ///
    /// The table erases by moving its last row into the freed slot. A view
    /// that was in sync before stays in sync.
    pub fn remove(&mut self, ndx: usize) -> Result<()> {
        let table = self.base.table()?;
        let real = self.base.get_source_ndx(ndx)?;
        let was_in_sync = is_cell_in_sync(&self.base.cell);

        table.write().move_last_over(real)?;

        let guard = table.read();
        let mut state = self.base.cell.write();
        state.rows.remove(ndx);
        state.generation += 1;
        if was_in_sync {
            state.stamp_in_sync(&guard, None);
        }
        Ok(())
    }

    pub fn remove_last(&mut self) -> Result<()> {
        match self.size() {
            0 => Ok(()),
            n => self.remove(n - 1),
        }
    }

    /// Erase every attached row of this view from the table and empty it.
    pub fn clear(&mut self) -> Result<()> {
        let table = self.base.table()?;
        let was_in_sync = is_cell_in_sync(&self.base.cell);
        let mut real: Vec<usize> = self.base.cell.read().rows.attached().map(|(_, r)| r).collect();
        real.sort_unstable_by(|a, b| b.cmp(a));
        real.dedup();
        {
            let mut guard = table.write();
            for row in real {
                guard.move_last_over(row)?;
            }
        }

        let guard = table.read();
        let mut state = self.base.cell.write();
        state.rows.clear();
        state.generation += 1;
        if was_in_sync {
            state.stamp_in_sync(&guard, None);
        }
        Ok(())
    }
}

impl Deref for TableView {
    type Target = TableViewBase;

    fn deref(&self) -> &TableViewBase {
        &self.base
    }
}

impl DerefMut for TableView {
    fn deref_mut(&mut self) -> &mut TableViewBase {
        &mut self.base
    }
}

/// View that can read, search, sort and refine, but never mutate table data
/// or hand out a mutable table handle.
#[derive(Clone, Debug)]
pub struct ConstTableView {
    base: TableViewBase,
}

impl ConstTableView {
    pub(crate) fn from_base(base: TableViewBase) -> Self {
        Self { base }
    }

    pub(crate) fn into_base(self) -> TableViewBase {
        self.base
    }

    pub fn find_all_int(&self, column: usize, value: i64) -> Result<ConstTableView> {
        self.base.table()?.read().check_type(column, DataType::Int)?;
        self.find_all(Predicate::Eq {
            column,
            value: Value::Int(value),
        })
    }

    pub fn find_all_string(&self, column: usize, value: &str) -> Result<ConstTableView> {
        self.base.table()?.read().check_type(column, DataType::String)?;
        self.find_all(Predicate::Eq {
            column,
            value: Value::from(value),
        })
    }

    pub fn find_all(&self, predicate: Predicate) -> Result<ConstTableView> {
        self.base
            .restricted_query()
            .and_predicate(predicate)
            .find_all()
            .map(ConstTableView::from)
    }
}

impl From<TableView> for ConstTableView {
    fn from(view: TableView) -> Self {
        ConstTableView { base: view.base }
    }
}

impl Deref for ConstTableView {
    type Target = TableViewBase;

    fn deref(&self) -> &TableViewBase {
        &self.base
    }
}

impl DerefMut for ConstTableView {
    fn deref_mut(&mut self) -> &mut TableViewBase {
        &mut self.base
    }
}

#[cfg(test)]
mod table_view_tests {
    use super::*;
    use crate::engine::table::ColumnSpec;

    fn items() -> TableRef {
        let t = TableRef::new(
            "items",
            vec![
                ColumnSpec::new("qty", DataType::Int),
                ColumnSpec::new("name", DataType::String),
            ],
        );
        {
            let mut w = t.write();
            w.add_empty_rows(5).unwrap();
            for (row, (qty, name)) in [(1, "a"), (7, "b"), (3, "c"), (7, "d"), (5, "e")].iter().enumerate() {
                w.set_int(0, row, *qty).unwrap();
                w.set_string(1, row, name).unwrap();
            }
        }
        t
    }

    #[test]
    fn test_remove_keeps_in_sync_view_in_sync() {
        let t = items();
        let mut view = t.where_().greater(0, 2_i64).find_all().unwrap();
        assert_eq!(view.row_refs(), vec![1, 2, 3, 4]);
        view.remove(0).unwrap();
        assert!(view.is_in_sync());
        assert_eq!(t.read().size(), 4);
        // row 4 ("e") was moved into slot 1
        assert_eq!(view.row_refs(), vec![2, 3, 1]);
        assert_eq!(view.get_string(1, 2).unwrap(), "e");
    }

    #[test]
    fn test_clear_erases_attached_rows_only() {
        let t = items();
        let mut view = t.find_all_int(0, 7).unwrap();
        let other = t.view_all().unwrap();
        view.clear().unwrap();
        assert!(view.is_empty());
        assert_eq!(t.read().size(), 3);
        assert_eq!(other.num_detached_rows(), 2);
        assert_eq!(other.sum_int(0).unwrap(), 9);
    }

    #[test]
    fn test_set_through_view_and_row_accessor() {
        let t = items();
        let mut view = t.view_all().unwrap();
        view.sort(0, false).unwrap();
        view.set_string(1, 0, "top").unwrap();
        assert_eq!(t.read().get_string(1, 1).unwrap(), "top");
        let back = view.back().unwrap();
        assert_eq!(back.get_int(0).unwrap(), 1);
        assert!(view.set_int(1, 0, 3).is_err());
    }

    #[test]
    fn test_find_all_on_view_is_restricted() {
        let t = items();
        let mut base = t.where_().greater(0, 1_i64).find_all().unwrap();
        base.sort(1, false).unwrap();
        let sevens = base.find_all_int(0, 7).unwrap();
        // follows the restricting view's order
        assert_eq!(sevens.row_refs(), vec![3, 1]);

        let frozen = ConstTableView::from(base);
        let fives = frozen.find_all_int(0, 5).unwrap();
        assert_eq!(fives.row_refs(), vec![4]);
    }

    #[test]
    fn test_restricting_resort_invalidates_derived() {
        let t = items();
        let mut base = t.view_all().unwrap();
        let derived = base.find_all(Predicate::Gt { column: 0, value: Value::Int(2) }).unwrap();
        assert!(derived.is_in_sync());
        base.sort(0, true).unwrap();
        assert!(!derived.is_in_sync());
        derived.sync_if_needed().unwrap();
        assert_eq!(derived.row_refs(), vec![2, 4, 1, 3]);
    }
}
