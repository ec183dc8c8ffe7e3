//! View state, the synchronization engine, and the read-only view API shared
//! by the mutable and const facades.
//!
//! Lock order, outermost first: table, then view cell, then the cell of the
//! restricting view. A view cell is never held while calling a table
//! mutation, since the table broadcasts adjustments into every cell.

use super::operators::{find_all_rows, Predicate, Query, QueryWindow};
use super::registry::{AccessorCell, RowAccessor};
use super::row::RowCell;
use super::sort::{distinct_rows, sort_rows, SortDescriptor};
use super::table::{Table, TableRef, WeakTableRef};
use super::types::{AccessorId, DataType, RowIndexes, Value, DETACHED_REF};
use crate::error::{Result, ViewError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::debug;

pub(crate) type ViewCell = Arc<RwLock<ViewState>>;

/// How a view is meant to be consumed.
///
/// Nothing syncs implicitly in either mode. `Reflective` only changes what
/// [`TableViewBase::ensure_synced_for_read`] does.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Track row identity through mutation, tolerate staleness.
    #[default]
    Imperative,
    /// Re-run the generator before reads.
    Reflective,
}

/// What a view was generated from.
#[derive(Clone)]
pub(crate) enum ViewOrigin {
    /// Every row of the table, in table order.
    Table,
    Query {
        predicate: Predicate,
        restricting: Option<ViewCell>,
        window: QueryWindow,
    },
    Distinct {
        column: usize,
    },
    LinkList {
        origin: RowCell,
        column: usize,
    },
}

impl ViewOrigin {
    pub(crate) fn restricting(&self) -> Option<&ViewCell> {
        match self {
            ViewOrigin::Query {
                restricting: Some(parent),
                ..
            } => Some(parent),
            _ => None,
        }
    }
}

pub(crate) struct ViewState {
    pub(crate) id: AccessorId,
    pub(crate) table: Option<WeakTableRef>,
    pub(crate) rows: RowIndexes,
    pub(crate) origin: ViewOrigin,
    pub(crate) sort: Option<SortDescriptor>,
    pub(crate) auto_sort: bool,
    pub(crate) mode: ViewMode,
    /// Table mutation counter at the last sync.
    pub(crate) last_seen_version: u64,
    /// Identity stamp of the generator at the last sync.
    pub(crate) outside_version: u64,
    /// Bumped whenever the row sequence is rebuilt or reordered; derived
    /// views compare it against their own `outside_version`.
    pub(crate) generation: u64,
}

/// Never equal to a real table version.
pub(crate) const NEVER_SYNCED: u64 = u64::MAX;

impl ViewState {
    pub(crate) fn new(table: Option<WeakTableRef>, origin: ViewOrigin, sort: Option<SortDescriptor>) -> Self {
        Self {
            id: AccessorId::next(),
            table,
            rows: RowIndexes::new(),
            origin,
            auto_sort: sort.is_some(),
            sort,
            mode: ViewMode::default(),
            last_seen_version: NEVER_SYNCED,
            outside_version: NEVER_SYNCED,
            generation: 0,
        }
    }

    /// Copy with a fresh identity; registration is up to the caller.
    pub(crate) fn duplicate(&self, table: Option<WeakTableRef>) -> Self {
        Self {
            id: AccessorId::next(),
            table,
            rows: self.rows.clone(),
            origin: self.origin.clone(),
            sort: self.sort.clone(),
            auto_sort: self.auto_sort,
            mode: self.mode,
            last_seen_version: self.last_seen_version,
            outside_version: self.outside_version,
            generation: self.generation,
        }
    }

    pub(crate) fn rows(&self) -> &RowIndexes {
        &self.rows
    }

    pub(crate) fn upgrade_table(&self) -> Option<TableRef> {
        self.table.as_ref().and_then(WeakTableRef::upgrade)
    }

    fn real_row(&self, ndx: usize) -> Result<usize> {
        match self.rows.get(ndx) {
            None => Err(ViewError::RowOutOfRange {
                row: ndx,
                size: self.rows.len(),
            }),
            Some(DETACHED_REF) => Err(ViewError::DetachedRow { row: ndx }),
            Some(r) => Ok(r as usize),
        }
    }

    fn link_origin(&self) -> Option<(RowCell, usize)> {
        match &self.origin {
            ViewOrigin::LinkList { origin, column } => Some((origin.clone(), *column)),
            _ => None,
        }
    }

    /// Whether the rows still reflect the generator, given the table and the
    /// already-read link source version.
    fn matches(&self, table: &Table, link_version: Option<u64>) -> bool {
        if table.version() != self.last_seen_version {
            return false;
        }
        match &self.origin {
            ViewOrigin::Query {
                restricting: Some(parent),
                ..
            } => parent.read().generation == self.outside_version,
            ViewOrigin::LinkList { .. } => link_version == Some(self.outside_version),
            _ => true,
        }
    }

    /// Run the generator from scratch. Returns the rows and the new
    /// generator stamp.
    fn populate(&self, table: &Table, link: Option<LinkSource>) -> Result<(RowIndexes, u64)> {
        match &self.origin {
            ViewOrigin::Table => Ok((RowIndexes::from_rows(0..table.size()), table.version())),
            ViewOrigin::Query {
                predicate,
                restricting: Some(parent),
                window,
            } => {
                let parent = parent.read();
                let rows = find_all_rows(table, predicate, Some(&parent.rows), window)?;
                Ok((rows, parent.generation))
            }
            ViewOrigin::Query {
                predicate,
                restricting: None,
                window,
            } => Ok((find_all_rows(table, predicate, None, window)?, table.version())),
            ViewOrigin::Distinct { column } => distinct_rows(table, *column),
            ViewOrigin::LinkList { .. } => {
                let link = link.unwrap_or_else(LinkSource::detached);
                let rows = RowIndexes::from_rows(link.targets.into_iter().filter(|r| *r < table.size()));
                Ok((rows, link.version))
            }
        }
    }

    /// Stamp the generator as of now without repopulating. Used when the
    /// rows are known to be current, e.g. after a handover import. A missing
    /// link version keeps the previous link stamp.
    pub(crate) fn stamp_in_sync(&mut self, table: &Table, link_version: Option<u64>) {
        self.last_seen_version = table.version();
        self.outside_version = match &self.origin {
            ViewOrigin::Table | ViewOrigin::Query { restricting: None, .. } => table.version(),
            ViewOrigin::Query {
                restricting: Some(parent),
                ..
            } => parent.read().generation,
            ViewOrigin::LinkList { .. } => link_version.unwrap_or(self.outside_version),
            ViewOrigin::Distinct { .. } => self.outside_version,
        };
    }
}

impl RowAccessor for ViewState {
    fn adj_insert_rows(&mut self, at: usize, count: usize) {
        self.rows.adj_insert_rows(at, count);
    }

    fn adj_erase_row(&mut self, at: usize) {
        self.rows.adj_erase_row(at);
    }

    fn adj_move_over(&mut self, from: usize, to: usize) {
        self.rows.adj_move_over(from, to);
    }
}

impl Drop for ViewState {
    fn drop(&mut self) {
        if let Some(table) = self.upgrade_table() {
            // Lazily pruned by the registry when the table is busy.
            if let Some(mut t) = table.0.try_write() {
                t.unregister(self.id);
            }
        }
    }
}

impl std::fmt::Debug for ViewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewState")
            .field("id", &self.id)
            .field("rows", &self.rows)
            .field("sort", &self.sort)
            .field("mode", &self.mode)
            .field("last_seen_version", &self.last_seen_version)
            .field("outside_version", &self.outside_version)
            .finish()
    }
}

// --- Sync engine ---

/// Contents of a link-list cell at a given origin-table version.
pub(crate) struct LinkSource {
    targets: Vec<usize>,
    pub(crate) version: u64,
}

impl LinkSource {
    fn detached() -> Self {
        Self {
            targets: Vec::new(),
            version: NEVER_SYNCED,
        }
    }
}

/// Read the link list a view was generated from. Must run before the target
/// table is locked, since origin and target may be the same table.
pub(crate) fn link_source(origin: &RowCell, column: usize) -> Result<LinkSource> {
    let (table, row) = {
        let state = origin.read();
        (state.table.as_ref().and_then(WeakTableRef::upgrade), state.row)
    };
    match (table, row) {
        (Some(table), Some(row)) => {
            let guard = table.read();
            Ok(LinkSource {
                targets: guard.get_link_list(column, row)?,
                version: guard.version(),
            })
        }
        _ => Ok(LinkSource::detached()),
    }
}

/// True when neither the table, the generator, nor any restricting view has
/// changed since the last sync.
pub(crate) fn is_cell_in_sync(cell: &ViewCell) -> bool {
    let (table, restricting, link) = {
        let state = cell.read();
        (state.upgrade_table(), state.origin.restricting().cloned(), state.link_origin())
    };
    let Some(table) = table else {
        return false;
    };
    if let Some(parent) = &restricting {
        if !is_cell_in_sync(parent) {
            return false;
        }
    }
    let link_version = match link {
        Some((row, column)) => match link_source(&row, column) {
            Ok(source) => Some(source.version),
            Err(_) => return false,
        },
        None => None,
    };
    let guard = table.read();
    let in_sync = cell.read().matches(&guard, link_version);
    in_sync
}

/// Bring `cell` up to date, restricting views first. Returns the table
/// version the view is now in sync with.
pub(crate) fn sync_cell(cell: &ViewCell) -> Result<u64> {
    let (table, restricting, link) = {
        let state = cell.read();
        if state.table.is_none() {
            return Err(ViewError::DetachedView);
        }
        (state.upgrade_table(), state.origin.restricting().cloned(), state.link_origin())
    };
    let Some(table) = table else {
        // Source table accessor is gone: nothing left to reflect.
        let mut state = cell.write();
        state.rows.clear();
        return Ok(state.last_seen_version);
    };
    if let Some(parent) = &restricting {
        sync_cell(parent)?;
    }
    refresh(cell, &table, link)
}

/// First population of a freshly built view. A restricting view is read as
/// it currently is and never synced.
fn populate_cell(cell: &ViewCell) -> Result<u64> {
    let (table, link) = {
        let state = cell.read();
        (state.upgrade_table(), state.link_origin())
    };
    let table = table.ok_or(ViewError::DetachedView)?;
    refresh(cell, &table, link)
}

/// Re-run the generator of `cell` unless it still matches.
fn refresh(cell: &ViewCell, table: &TableRef, link: Option<(RowCell, usize)>) -> Result<u64> {
    let link = link.map(|(row, column)| link_source(&row, column)).transpose()?;

    let guard = table.read();
    let mut state = cell.write();
    if state.matches(&guard, link.as_ref().map(|l| l.version)) {
        return Ok(state.last_seen_version);
    }
    let (mut rows, outside) = state.populate(&guard, link)?;
    if state.auto_sort {
        if let Some(sort) = &state.sort {
            sort_rows(&guard, &mut rows, sort);
        }
    }
    // Derived views only see a new generation when the generator output
    // actually changed.
    let unchanged = outside == state.outside_version && rows == state.rows;
    state.rows = rows;
    state.last_seen_version = guard.version();
    state.outside_version = outside;
    if !unchanged {
        state.generation += 1;
    }
    debug!(
        view = ?state.id,
        table = guard.name(),
        version = state.last_seen_version,
        rows = state.rows.len(),
        "view re-synced"
    );
    Ok(state.last_seen_version)
}

// --- Read API ---

/// Shared core of [`TableView`](super::table_view::TableView) and
/// [`ConstTableView`](super::table_view::ConstTableView): everything that
/// reads through the view without mutating table data.
pub struct TableViewBase {
    pub(crate) cell: ViewCell,
}

impl TableViewBase {
    /// Register a fresh view on `table` and populate it.
    pub(crate) fn build(table: &TableRef, origin: ViewOrigin, sort: Option<SortDescriptor>) -> Result<TableViewBase> {
        {
            let guard = table.read();
            if let ViewOrigin::Distinct { column } = origin {
                guard.column_spec(column)?;
            }
            if let Some(sort) = &sort {
                sort.validate(&guard)?;
            }
        }
        let base = Self::register(table, ViewState::new(Some(table.downgrade()), origin, sort));
        populate_cell(&base.cell)?;
        Ok(base)
    }

    /// Wrap `state` in a cell and register it on `table`.
    pub(crate) fn register(table: &TableRef, state: ViewState) -> TableViewBase {
        let mut guard = table.write();
        let id = state.id;
        let cell = Arc::new(RwLock::new(state));
        let accessor: AccessorCell = cell.clone();
        guard.register(id, &accessor);
        TableViewBase { cell }
    }

    /// A view not attached to any table.
    pub(crate) fn unattached(state: ViewState) -> TableViewBase {
        TableViewBase {
            cell: Arc::new(RwLock::new(state)),
        }
    }

    pub(crate) fn table(&self) -> Result<TableRef> {
        self.cell.read().upgrade_table().ok_or(ViewError::DetachedView)
    }

    /// Run `f` on the table row behind view entry `ndx`.
    fn with_row<T>(&self, ndx: usize, f: impl FnOnce(&Table, usize) -> Result<T>) -> Result<T> {
        let table = self.table()?;
        let guard = table.read();
        let real = self.cell.read().real_row(ndx)?;
        f(&guard, real)
    }

    pub(crate) fn with_row_mut<T>(&self, ndx: usize, f: impl FnOnce(&mut Table, usize) -> Result<T>) -> Result<T> {
        let table = self.table()?;
        let mut guard = table.write();
        let real = self.cell.read().real_row(ndx)?;
        f(&mut guard, real)
    }

    /// Visit every attached entry as `(view index, table row)`.
    fn for_each_attached(&self, column: usize, expected: DataType, mut f: impl FnMut(usize, &Value)) -> Result<()> {
        let table = self.table()?;
        let guard = table.read();
        guard.check_type(column, expected)?;
        let state = self.cell.read();
        for (ndx, row) in state.rows.attached() {
            if let Some(value) = guard.data().get(column, row) {
                f(ndx, value);
            }
        }
        Ok(())
    }

    // --- Sync ---

    pub fn is_in_sync(&self) -> bool {
        is_cell_in_sync(&self.cell)
    }

    /// Re-run the generator if anything it depends on changed. Calling this
    /// twice with no mutation in between leaves the rows untouched.
    pub fn sync_if_needed(&self) -> Result<u64> {
        sync_cell(&self.cell)
    }

    pub fn mode(&self) -> ViewMode {
        self.cell.read().mode
    }

    pub fn set_mode(&mut self, mode: ViewMode) {
        self.cell.write().mode = mode;
    }

    /// Sync when the view is in reflective mode; no-op otherwise.
    pub fn ensure_synced_for_read(&self) -> Result<()> {
        if self.mode() == ViewMode::Reflective {
            sync_cell(&self.cell)?;
        }
        Ok(())
    }

    pub fn last_seen_version(&self) -> u64 {
        self.cell.read().last_seen_version
    }

    pub fn outside_version(&self) -> u64 {
        self.cell.read().outside_version
    }

    // --- Inspection ---

    /// Number of entries, detached ones included.
    pub fn size(&self) -> usize {
        self.cell.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cell.read().rows.is_empty()
    }

    pub fn is_attached(&self) -> bool {
        self.cell.read().upgrade_table().is_some()
    }

    pub fn is_row_attached(&self, ndx: usize) -> bool {
        self.cell.read().rows.source_row(ndx).is_some()
    }

    pub fn num_attached_rows(&self) -> usize {
        self.cell.read().rows.num_attached()
    }

    pub fn num_detached_rows(&self) -> usize {
        self.cell.read().rows.num_detached()
    }

    pub fn get_source_ndx(&self, ndx: usize) -> Result<usize> {
        self.cell.read().real_row(ndx)
    }

    pub fn find_by_source_ndx(&self, source: usize) -> Option<usize> {
        self.cell.read().rows.find_first(source)
    }

    /// Raw row references, detached entries as [`DETACHED_REF`].
    pub fn row_refs(&self) -> Vec<u64> {
        self.cell.read().rows.iter().collect()
    }

    pub fn sort_descriptor(&self) -> Option<SortDescriptor> {
        self.cell.read().sort.clone()
    }

    /// The predicate this view re-executes, if it came from a query.
    pub fn predicate(&self) -> Option<Predicate> {
        match &self.cell.read().origin {
            ViewOrigin::Query { predicate, .. } => Some(predicate.clone()),
            _ => None,
        }
    }

    pub fn get_column_count(&self) -> Result<usize> {
        Ok(self.table()?.read().get_column_count())
    }

    pub fn get_column_name(&self, column: usize) -> Result<SmolStr> {
        Ok(SmolStr::new(self.table()?.read().get_column_name(column)?))
    }

    pub fn get_column_index(&self, name: &str) -> Result<usize> {
        self.table()?.read().get_column_index(name)
    }

    pub fn get_column_type(&self, column: usize) -> Result<DataType> {
        self.table()?.read().get_column_type(column)
    }

    // --- Getters ---

    pub fn get_value(&self, column: usize, ndx: usize) -> Result<Value> {
        self.with_row(ndx, |t, row| t.get_value(column, row).cloned())
    }

    pub fn get_int(&self, column: usize, ndx: usize) -> Result<i64> {
        self.with_row(ndx, |t, row| t.get_int(column, row))
    }

    pub fn get_bool(&self, column: usize, ndx: usize) -> Result<bool> {
        self.with_row(ndx, |t, row| t.get_bool(column, row))
    }

    pub fn get_datetime(&self, column: usize, ndx: usize) -> Result<i64> {
        self.with_row(ndx, |t, row| t.get_datetime(column, row))
    }

    pub fn get_float(&self, column: usize, ndx: usize) -> Result<f32> {
        self.with_row(ndx, |t, row| t.get_float(column, row))
    }

    pub fn get_double(&self, column: usize, ndx: usize) -> Result<f64> {
        self.with_row(ndx, |t, row| t.get_double(column, row))
    }

    pub fn get_string(&self, column: usize, ndx: usize) -> Result<SmolStr> {
        self.with_row(ndx, |t, row| t.get_string(column, row))
    }

    pub fn get_binary(&self, column: usize, ndx: usize) -> Result<Vec<u8>> {
        self.with_row(ndx, |t, row| t.get_binary(column, row))
    }

    pub fn get_mixed(&self, column: usize, ndx: usize) -> Result<Value> {
        self.with_row(ndx, |t, row| t.get_mixed(column, row))
    }

    pub fn get_mixed_type(&self, column: usize, ndx: usize) -> Result<DataType> {
        self.with_row(ndx, |t, row| t.get_mixed_type(column, row))
    }

    pub fn get_link(&self, column: usize, ndx: usize) -> Result<Option<usize>> {
        self.with_row(ndx, |t, row| t.get_link(column, row))
    }

    pub fn is_null_link(&self, column: usize, ndx: usize) -> Result<bool> {
        self.with_row(ndx, |t, row| t.is_null_link(column, row))
    }

    pub fn get_subtable_size(&self, column: usize, ndx: usize) -> Result<usize> {
        self.with_row(ndx, |t, row| t.get_subtable_size(column, row))
    }

    /// Copy of the subtable stored at view entry `ndx`.
    pub fn get_subtable(&self, column: usize, ndx: usize) -> Result<TableRef> {
        self.with_row(ndx, |t, row| t.get_subtable(column, row))
    }

    // --- Search ---

    fn find_first_value(&self, column: usize, expected: DataType, value: &Value) -> Result<Option<usize>> {
        let mut found = None;
        self.for_each_attached(column, expected, |ndx, v| {
            if found.is_none() && v.compare(value) == std::cmp::Ordering::Equal {
                found = Some(ndx);
            }
        })?;
        Ok(found)
    }

    pub fn find_first_int(&self, column: usize, value: i64) -> Result<Option<usize>> {
        self.find_first_value(column, DataType::Int, &Value::Int(value))
    }

    pub fn find_first_bool(&self, column: usize, value: bool) -> Result<Option<usize>> {
        self.find_first_value(column, DataType::Bool, &Value::Bool(value))
    }

    pub fn find_first_double(&self, column: usize, value: f64) -> Result<Option<usize>> {
        self.find_first_value(column, DataType::Double, &Value::Double(value))
    }

    pub fn find_first_string(&self, column: usize, value: &str) -> Result<Option<usize>> {
        self.find_first_value(column, DataType::String, &Value::from(value))
    }

    /// Query whose domain is the rows currently in this view.
    pub(crate) fn restricted_query(&self) -> Query {
        let table = self.cell.read().table.clone();
        Query::restricted(table, self.cell.clone())
    }

    // --- Aggregates ---

    fn sum_as_f64(&self, column: usize, expected: DataType) -> Result<f64> {
        let mut sum = 0.0;
        self.for_each_attached(column, expected, |_, v| sum += v.as_f64().unwrap_or(0.0))?;
        Ok(sum)
    }

    pub fn sum_int(&self, column: usize) -> Result<i64> {
        let mut sum = 0i64;
        self.for_each_attached(column, DataType::Int, |_, v| {
            sum = sum.wrapping_add(v.as_int().unwrap_or(0))
        })?;
        Ok(sum)
    }

    pub fn sum_float(&self, column: usize) -> Result<f64> {
        self.sum_as_f64(column, DataType::Float)
    }

    pub fn sum_double(&self, column: usize) -> Result<f64> {
        self.sum_as_f64(column, DataType::Double)
    }

    fn extremum<T: PartialOrd + Copy>(
        &self,
        column: usize,
        expected: DataType,
        extract: impl Fn(&Value) -> Option<T>,
        want_max: bool,
    ) -> Result<Option<(T, usize)>> {
        let mut best: Option<(T, usize)> = None;
        self.for_each_attached(column, expected, |ndx, v| {
            let Some(x) = extract(v) else {
                return;
            };
            let better = match best {
                None => true,
                Some((b, _)) if want_max => x > b,
                Some((b, _)) => x < b,
            };
            if better {
                best = Some((x, ndx));
            }
        })?;
        Ok(best)
    }

    /// Largest value and the view index of its first occurrence.
    pub fn maximum_int(&self, column: usize) -> Result<Option<(i64, usize)>> {
        self.extremum(column, DataType::Int, Value::as_int, true)
    }

    pub fn minimum_int(&self, column: usize) -> Result<Option<(i64, usize)>> {
        self.extremum(column, DataType::Int, Value::as_int, false)
    }

    pub fn maximum_float(&self, column: usize) -> Result<Option<(f32, usize)>> {
        self.extremum(column, DataType::Float, Value::as_float, true)
    }

    pub fn minimum_float(&self, column: usize) -> Result<Option<(f32, usize)>> {
        self.extremum(column, DataType::Float, Value::as_float, false)
    }

    pub fn maximum_double(&self, column: usize) -> Result<Option<(f64, usize)>> {
        self.extremum(column, DataType::Double, Value::as_double, true)
    }

    pub fn minimum_double(&self, column: usize) -> Result<Option<(f64, usize)>> {
        self.extremum(column, DataType::Double, Value::as_double, false)
    }

    pub fn maximum_datetime(&self, column: usize) -> Result<Option<(i64, usize)>> {
        self.extremum(column, DataType::DateTime, Value::as_int, true)
    }

    pub fn minimum_datetime(&self, column: usize) -> Result<Option<(i64, usize)>> {
        self.extremum(column, DataType::DateTime, Value::as_int, false)
    }

    fn average(&self, column: usize, expected: DataType) -> Result<f64> {
        let (mut sum, mut n) = (0.0, 0usize);
        self.for_each_attached(column, expected, |_, v| {
            sum += v.as_f64().unwrap_or(0.0);
            n += 1;
        })?;
        Ok(if n == 0 { 0.0 } else { sum / n as f64 })
    }

    /// Mean over attached rows; 0.0 for a view without attached rows.
    pub fn average_int(&self, column: usize) -> Result<f64> {
        self.average(column, DataType::Int)
    }

    pub fn average_float(&self, column: usize) -> Result<f64> {
        self.average(column, DataType::Float)
    }

    pub fn average_double(&self, column: usize) -> Result<f64> {
        self.average(column, DataType::Double)
    }

    fn count_value(&self, column: usize, expected: DataType, value: &Value) -> Result<usize> {
        let mut n = 0;
        self.for_each_attached(column, expected, |_, v| {
            if v.compare(value) == std::cmp::Ordering::Equal {
                n += 1;
            }
        })?;
        Ok(n)
    }

    pub fn count_int(&self, column: usize, value: i64) -> Result<usize> {
        self.count_value(column, DataType::Int, &Value::Int(value))
    }

    pub fn count_float(&self, column: usize, value: f32) -> Result<usize> {
        self.count_value(column, DataType::Float, &Value::Float(value))
    }

    pub fn count_double(&self, column: usize, value: f64) -> Result<usize> {
        self.count_value(column, DataType::Double, &Value::Double(value))
    }

    pub fn count_string(&self, column: usize, value: &str) -> Result<usize> {
        self.count_value(column, DataType::String, &Value::from(value))
    }

    // --- Shape ---

    pub fn sort(&mut self, column: usize, ascending: bool) -> Result<()> {
        self.sort_by(SortDescriptor::single(column, ascending))
    }

    pub fn sort_multi(&mut self, columns: &[usize], ascending: &[bool]) -> Result<()> {
        self.sort_by(SortDescriptor::new(columns, ascending))
    }

    /// Sort now and keep re-applying `sort` after every repopulation.
    pub fn sort_by(&mut self, sort: SortDescriptor) -> Result<()> {
        let table = self.table()?;
        let guard = table.read();
        sort.validate(&guard)?;
        let mut state = self.cell.write();
        sort_rows(&guard, &mut state.rows, &sort);
        state.sort = Some(sort);
        state.auto_sort = true;
        state.generation += 1;
        Ok(())
    }

    /// Re-apply the last sort criteria, if any.
    pub fn re_sort(&mut self) -> Result<()> {
        let table = self.table()?;
        let guard = table.read();
        let mut state = self.cell.write();
        let Some(sort) = state.sort.clone() else {
            return Ok(());
        };
        sort_rows(&guard, &mut state.rows, &sort);
        state.generation += 1;
        Ok(())
    }

    /// Repopulate with one row per distinct value of `column` and keep doing
    /// so on every later sync.
    pub fn sync_distinct_view(&mut self, column: usize) -> Result<()> {
        self.table()?.read().column_spec(column)?;
        {
            let mut state = self.cell.write();
            state.origin = ViewOrigin::Distinct { column };
            state.last_seen_version = NEVER_SYNCED;
        }
        sync_cell(&self.cell).map(|_| ())
    }

    /// Drop the link to the source table; every later access fails.
    pub fn detach(&mut self) {
        let table = self.cell.read().upgrade_table();
        if let Some(table) = table {
            let id = self.cell.read().id;
            table.write().unregister(id);
        }
        let mut state = self.cell.write();
        state.table = None;
        state.rows.clear();
    }

    /// Attached rows as JSON objects keyed by column name.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let table = self.table()?;
        let guard = table.read();
        let state = self.cell.read();
        let columns = guard.data().columns();
        let rows = state
            .rows
            .attached()
            .map(|(_, row)| {
                let object = columns
                    .iter()
                    .enumerate()
                    .filter_map(|(col, spec)| {
                        let value = guard.data().get(col, row)?;
                        Some((spec.name.to_string(), serde_json::Value::from(value)))
                    })
                    .collect::<serde_json::Map<_, _>>();
                serde_json::Value::Object(object)
            })
            .collect();
        Ok(serde_json::Value::Array(rows))
    }
}

impl Clone for TableViewBase {
    /// Deep copy of the row sequence, registered as an independent view.
    fn clone(&self) -> Self {
        let table = self.cell.read().upgrade_table();
        match table {
            Some(table) => {
                let mut guard = table.write();
                let state = self.cell.read().duplicate(Some(table.downgrade()));
                let id = state.id;
                let cell = Arc::new(RwLock::new(state));
                let accessor: AccessorCell = cell.clone();
                guard.register(id, &accessor);
                TableViewBase { cell }
            }
            None => TableViewBase::unattached(self.cell.read().duplicate(None)),
        }
    }
}

impl std::fmt::Debug for TableViewBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&*self.cell.read(), f)
    }
}
