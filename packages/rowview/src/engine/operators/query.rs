use super::predicate::{check_predicate, Predicate};
use crate::config;
use crate::engine::table::{Table, TableRef, WeakTableRef};
use crate::engine::table_view::TableView;
use crate::engine::types::{RowIndexes, Value};
use crate::engine::view::{TableViewBase, ViewCell, ViewOrigin};
use crate::error::{Result, ViewError};
use serde::{Deserialize, Serialize};

/// Slice of the candidate domain a query runs over.
///
/// `start`/`end` index the candidates (table rows, or entries of the
/// restricting view); `limit` caps the number of matches.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct QueryWindow {
    pub start: usize,
    pub end: Option<usize>,
    pub limit: Option<usize>,
}

impl QueryWindow {
    pub fn new(start: usize, end: Option<usize>, limit: Option<usize>) -> Self {
        Self { start, end, limit }
    }

    fn bounds(&self, len: usize) -> (usize, usize) {
        let end = self.end.map_or(len, |e| e.min(len));
        (self.start.min(end), end)
    }
}

/// Predicate builder bound to a table, optionally scoped to the rows of a
/// restricting view.
#[derive(Clone)]
pub struct Query {
    table: Option<WeakTableRef>,
    predicate: Predicate,
    restricting: Option<ViewCell>,
}

impl Query {
    pub(crate) fn new(table: &TableRef) -> Self {
        Self {
            table: Some(table.downgrade()),
            predicate: Predicate::default(),
            restricting: None,
        }
    }

    pub(crate) fn restricted(table: Option<WeakTableRef>, restricting: ViewCell) -> Self {
        Self {
            table,
            predicate: Predicate::default(),
            restricting: Some(restricting),
        }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    // --- Builders ---

    pub fn and_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = self.predicate.and(predicate);
        self
    }

    /// Either everything built so far or `predicate`.
    pub fn or(mut self, predicate: Predicate) -> Self {
        self.predicate = Predicate::Or {
            predicates: vec![self.predicate, predicate],
        };
        self
    }

    pub fn not(self, predicate: Predicate) -> Self {
        self.and_predicate(Predicate::Not {
            predicate: Box::new(predicate),
        })
    }

    pub fn equal(self, column: usize, value: impl Into<Value>) -> Self {
        self.and_predicate(Predicate::Eq {
            column,
            value: value.into(),
        })
    }

    pub fn not_equal(self, column: usize, value: impl Into<Value>) -> Self {
        self.and_predicate(Predicate::Neq {
            column,
            value: value.into(),
        })
    }

    pub fn greater(self, column: usize, value: impl Into<Value>) -> Self {
        self.and_predicate(Predicate::Gt {
            column,
            value: value.into(),
        })
    }

    pub fn greater_equal(self, column: usize, value: impl Into<Value>) -> Self {
        self.and_predicate(Predicate::Gte {
            column,
            value: value.into(),
        })
    }

    pub fn less(self, column: usize, value: impl Into<Value>) -> Self {
        self.and_predicate(Predicate::Lt {
            column,
            value: value.into(),
        })
    }

    pub fn less_equal(self, column: usize, value: impl Into<Value>) -> Self {
        self.and_predicate(Predicate::Lte {
            column,
            value: value.into(),
        })
    }

    pub fn begins_with(self, column: usize, prefix: &str) -> Self {
        self.and_predicate(Predicate::Prefix {
            column,
            prefix: prefix.to_string(),
        })
    }

    // --- Execution ---

    pub fn find_all(&self) -> Result<TableView> {
        self.find_all_in(QueryWindow::default())
    }

    /// Materialize the matching rows as a view that remembers this query and
    /// `window` for later re-execution.
    pub fn find_all_in(&self, window: QueryWindow) -> Result<TableView> {
        let table = self.table()?;
        self.predicate.validate(&table.read())?;
        let origin = ViewOrigin::Query {
            predicate: self.predicate.clone(),
            restricting: self.restricting.clone(),
            window,
        };
        TableViewBase::build(&table, origin, None).map(TableView::from_base)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.run(&QueryWindow::default())?.num_attached())
    }

    /// First matching table row.
    pub fn find(&self) -> Result<Option<usize>> {
        let window = QueryWindow {
            limit: Some(1),
            ..QueryWindow::default()
        };
        Ok(self.run(&window)?.source_row(0))
    }

    /// Restricting rows are taken as they are; the parent view is not synced.
    fn run(&self, window: &QueryWindow) -> Result<RowIndexes> {
        let table = self.table()?;
        let guard = table.read();
        self.predicate.validate(&guard)?;
        match &self.restricting {
            Some(parent) => {
                let parent = parent.read();
                find_all_rows(&guard, &self.predicate, Some(parent.rows()), window)
            }
            None => find_all_rows(&guard, &self.predicate, None, window),
        }
    }

    fn table(&self) -> Result<TableRef> {
        self.table
            .as_ref()
            .and_then(WeakTableRef::upgrade)
            .ok_or(ViewError::DetachedView)
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("predicate", &self.predicate)
            .field("restricted", &self.restricting.is_some())
            .finish()
    }
}

/// Evaluate `predicate` over the candidates selected by `window`.
///
/// A pure function of the table, the predicate and the restricting rows.
/// Detached entries of the restricting view are never candidates.
pub(crate) fn find_all_rows(
    table: &Table,
    predicate: &Predicate,
    restricting: Option<&RowIndexes>,
    window: &QueryWindow,
) -> Result<RowIndexes> {
    let limit = window.limit.unwrap_or(usize::MAX);
    let mut out = RowIndexes::with_capacity(config::get().initial_view_capacity);
    if limit == 0 {
        return Ok(out);
    }
    let accept = |row: usize, out: &mut RowIndexes| -> bool {
        if check_predicate(table, predicate, row) {
            out.push(row);
        }
        out.len() < limit
    };
    match restricting {
        Some(rows) => {
            let (start, end) = window.bounds(rows.len());
            for ndx in start..end {
                let Some(row) = rows.source_row(ndx) else {
                    continue;
                };
                if row < table.size() && !accept(row, &mut out) {
                    break;
                }
            }
        }
        None => {
            let (start, end) = window.bounds(table.size());
            for row in start..end {
                if !accept(row, &mut out) {
                    break;
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod query_tests {
    use super::*;
    use crate::engine::table::ColumnSpec;
    use crate::engine::types::DataType;

    fn numbers(values: &[i64]) -> TableRef {
        let table = TableRef::new("n", vec![ColumnSpec::new("v", DataType::Int)]);
        {
            let mut t = table.write();
            t.add_empty_rows(values.len()).unwrap();
            for (row, v) in values.iter().enumerate() {
                t.set_int(0, row, *v).unwrap();
            }
        }
        table
    }

    fn rows(ri: &RowIndexes) -> Vec<u64> {
        ri.iter().collect()
    }

    #[test]
    fn test_window_bounds_candidates_and_limit_caps_matches() {
        let table = numbers(&[1, 5, 2, 6, 3, 7]);
        let t = table.read();
        let pred = Predicate::Gt { column: 0, value: Value::Int(2) };

        let all = find_all_rows(&t, &pred, None, &QueryWindow::default()).unwrap();
        assert_eq!(rows(&all), vec![1, 3, 4, 5]);

        let window = QueryWindow::new(2, Some(5), None);
        assert_eq!(rows(&find_all_rows(&t, &pred, None, &window).unwrap()), vec![3, 4]);

        let window = QueryWindow::new(0, None, Some(2));
        assert_eq!(rows(&find_all_rows(&t, &pred, None, &window).unwrap()), vec![1, 3]);

        let window = QueryWindow::new(9, Some(3), None);
        assert!(find_all_rows(&t, &pred, None, &window).unwrap().is_empty());
    }

    #[test]
    fn test_restricting_rows_keep_their_order_and_skip_detached() {
        let table = numbers(&[10, 20, 30, 40]);
        let t = table.read();
        let mut domain = RowIndexes::from_rows([3, 0, 2]);
        domain.adj_move_over(3, 2);
        let pred = Predicate::default();
        let found = find_all_rows(&t, &pred, Some(&domain), &QueryWindow::default()).unwrap();
        assert_eq!(rows(&found), vec![2, 0]);
    }

    #[test]
    fn test_count_and_find() {
        let table = numbers(&[4, 8, 15, 16, 23, 42]);
        let q = table.where_().greater_equal(0, 15_i64).less(0, 40_i64);
        assert_eq!(q.count().unwrap(), 3);
        assert_eq!(q.find().unwrap(), Some(2));
        assert_eq!(table.where_().equal(0, 99_i64).find().unwrap(), None);
    }

    #[test]
    fn test_query_on_dropped_table_is_detached() {
        let q = numbers(&[1]).where_();
        assert!(matches!(q.count(), Err(ViewError::DetachedView)));
    }
}
