//! In-memory transaction collaborator: a database of committed snapshots and
//! per-context groups of table accessors pinned to one of them.
//!
//! A [`SharedGroup`] moves forward by replaying committed [`TableOp`]s
//! through the same mutation paths local writes use, so every view and row
//! accessor in the context is adjusted exactly as for a local change.

use super::handover::{AnyView, Handover, HandoverExport, RowHandover};
use super::row::Row;
use super::table::{ColumnSpec, Table, TableData, TableRef};
use super::transact_log::{TableOp, TransactLog};
use super::types::{DataType, TableKey, VersionId};
use crate::error::{Result, ViewError};
use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Committed table contents at one version, keyed by table name in
/// creation order.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub tables: IndexMap<SmolStr, TableData>,
}

/// The table accessors of one transaction context.
pub struct Group {
    tables: RwLock<IndexMap<SmolStr, TableRef>>,
    log: Arc<Mutex<TransactLog>>,
    version: AtomicU64,
}

impl Group {
    pub(crate) fn from_snapshot(snapshot: &Snapshot, version: VersionId) -> Self {
        let group = Self {
            tables: RwLock::new(IndexMap::new()),
            log: Arc::new(Mutex::new(TransactLog::default())),
            version: AtomicU64::new(version),
        };
        for (name, data) in &snapshot.tables {
            group.insert_table(name.clone(), data.clone());
        }
        let tables = group.tables.read();
        for table in tables.values() {
            resolve_links(&tables, table);
        }
        drop(tables);
        group
    }

    /// Snapshot this context is pinned to.
    pub fn version(&self) -> VersionId {
        self.version.load(Ordering::Acquire)
    }

    fn set_version(&self, version: VersionId) {
        self.version.store(version, Ordering::Release);
    }

    pub fn size(&self) -> usize {
        self.tables.read().len()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    pub fn table_names(&self) -> Vec<SmolStr> {
        self.tables.read().keys().cloned().collect()
    }

    pub fn get_table(&self, name: &str) -> Result<TableRef> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ViewError::NoSuchTable(name.to_string()))
    }

    pub fn table_by_key(&self, key: TableKey) -> Option<TableRef> {
        self.tables.read().get_index(key.0).map(|(_, t)| t.clone())
    }

    /// Create a table. Requires a write transaction.
    pub fn add_table(&self, name: &str, columns: Vec<ColumnSpec>) -> Result<TableRef> {
        if !self.log.lock().writable {
            return Err(ViewError::NotInWriteTransaction);
        }
        if self.has_table(name) {
            return Err(ViewError::TableExists(name.to_string()));
        }
        self.log.lock().ops.push(TableOp::AddTable {
            name: SmolStr::new(name),
            columns: columns.clone(),
        });
        let table = self.insert_table(SmolStr::new(name), TableData::new(columns));
        resolve_links(&self.tables.read(), &table);
        Ok(table)
    }

    fn insert_table(&self, name: SmolStr, data: TableData) -> TableRef {
        let mut tables = self.tables.write();
        let key = TableKey(tables.len());
        let table = TableRef::from_table(Table::from_parts(
            Some(key),
            name.clone(),
            data,
            0,
            Some(self.log.clone()),
        ));
        tables.insert(name, table.clone());
        table
    }

    /// Replay one committed mutation.
    pub(crate) fn apply(&self, op: &TableOp) -> Result<()> {
        match op {
            TableOp::AddTable { name, columns } => {
                let table = self.insert_table(name.clone(), TableData::new(columns.clone()));
                resolve_links(&self.tables.read(), &table);
                Ok(())
            }
            other => {
                let key = other.table().ok_or_else(|| ViewError::NoSuchTable("<none>".into()))?;
                let table = self
                    .table_by_key(key)
                    .ok_or_else(|| ViewError::NoSuchTable(key.to_string()))?;
                let mut guard = table.write();
                guard.apply_op(other)
            }
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let tables = self
            .tables
            .read()
            .iter()
            .map(|(name, table)| (name.clone(), table.read().data().clone()))
            .collect();
        Snapshot { tables }
    }

    fn set_writable(&self, writable: bool) {
        self.log.lock().writable = writable;
    }

    fn take_ops(&self) -> Vec<TableOp> {
        self.log.lock().take_ops()
    }
}

/// Point every link column of `table` at its target accessor in `tables`.
fn resolve_links(tables: &IndexMap<SmolStr, TableRef>, table: &TableRef) {
    let targets: Vec<(usize, TableKey)> = {
        let guard = table.read();
        guard
            .data()
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c.data_type, DataType::Link | DataType::LinkList))
            .filter_map(|(i, c)| c.link_target.map(|k| (i, k)))
            .collect()
    };
    for (column, key) in targets {
        if let Some((_, target)) = tables.get_index(key.0) {
            let weak = Arc::downgrade(&target.0);
            table.write().set_link_target_weak(column, weak);
        }
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("version", &self.version())
            .field("tables", &self.table_names())
            .finish()
    }
}

// --- Database ---

struct Commit {
    version: VersionId,
    ops: Arc<Vec<TableOp>>,
}

struct History {
    latest: VersionId,
    snapshot: Arc<Snapshot>,
    commits: Vec<Commit>,
    writer_active: bool,
}

struct DbInner {
    history: Mutex<History>,
    writer_released: Condvar,
}

/// Shared in-memory database. Cloning hands out another handle to the same
/// commit history.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DbInner>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DbInner {
                history: Mutex::new(History {
                    latest: 1,
                    snapshot: Arc::new(Snapshot::default()),
                    commits: Vec::new(),
                    writer_active: false,
                }),
                writer_released: Condvar::new(),
            }),
        }
    }

    pub fn latest_version(&self) -> VersionId {
        self.inner.history.lock().latest
    }

    /// New transaction context in a read transaction on the latest version.
    pub fn begin_read(&self) -> SharedGroup {
        let (snapshot, version) = {
            let history = self.inner.history.lock();
            (history.snapshot.clone(), history.latest)
        };
        debug!(version, "read transaction started");
        SharedGroup {
            db: self.clone(),
            group: Group::from_snapshot(&snapshot, version),
            stage: Mutex::new(TransactStage::Reading),
        }
    }

    fn commits_after(&self, version: VersionId) -> Vec<(VersionId, Arc<Vec<TableOp>>)> {
        self.inner
            .history
            .lock()
            .commits
            .iter()
            .filter(|c| c.version > version)
            .map(|c| (c.version, c.ops.clone()))
            .collect()
    }

    fn acquire_writer(&self) {
        let mut history = self.inner.history.lock();
        while history.writer_active {
            self.inner.writer_released.wait(&mut history);
        }
        history.writer_active = true;
    }

    fn release_writer(&self) {
        self.inner.history.lock().writer_active = false;
        self.inner.writer_released.notify_one();
    }

    fn commit(&self, ops: Vec<TableOp>, snapshot: Snapshot) -> VersionId {
        let mut history = self.inner.history.lock();
        history.latest += 1;
        let version = history.latest;
        history.commits.push(Commit {
            version,
            ops: Arc::new(ops),
        });
        history.snapshot = Arc::new(snapshot);
        history.writer_active = false;
        drop(history);
        self.inner.writer_released.notify_one();
        version
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactStage {
    Reading,
    Writing,
}

/// One transaction context. Every method takes `&self`; the stage mutex
/// serializes boundary moves against handover export and import.
pub struct SharedGroup {
    db: Database,
    group: Group,
    stage: Mutex<TransactStage>,
}

impl SharedGroup {
    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn version(&self) -> VersionId {
        self.group.version()
    }

    pub fn stage(&self) -> TransactStage {
        *self.stage.lock()
    }

    pub fn get_table(&self, name: &str) -> Result<TableRef> {
        self.group.get_table(name)
    }

    pub fn add_table(&self, name: &str, columns: Vec<ColumnSpec>) -> Result<TableRef> {
        self.group.add_table(name, columns)
    }

    fn replay_to_latest(&self) -> Result<VersionId> {
        for (version, ops) in self.db.commits_after(self.group.version()) {
            for op in ops.iter() {
                self.group.apply(op)?;
            }
            self.group.set_version(version);
        }
        Ok(self.group.version())
    }

    /// Move the read transaction to the latest commit.
    #[instrument(skip(self), fields(from = self.version()))]
    pub fn advance_read(&self) -> Result<VersionId> {
        let stage = self.stage.lock();
        if *stage != TransactStage::Reading {
            return Err(ViewError::WrongTransactStage("advance_read requires a read transaction"));
        }
        let version = self.replay_to_latest()?;
        debug!(to = version, "read transaction advanced");
        Ok(version)
    }

    /// Turn the read transaction into the single write transaction, after
    /// catching up with the latest commit.
    #[instrument(skip(self), fields(from = self.version()))]
    pub fn promote_to_write(&self) -> Result<VersionId> {
        let mut stage = self.stage.lock();
        if *stage != TransactStage::Reading {
            return Err(ViewError::WrongTransactStage("promote_to_write requires a read transaction"));
        }
        self.db.acquire_writer();
        let version = match self.replay_to_latest() {
            Ok(version) => version,
            Err(err) => {
                self.db.release_writer();
                return Err(err);
            }
        };
        self.group.set_writable(true);
        *stage = TransactStage::Writing;
        debug!(at = version, "promoted to write transaction");
        Ok(version)
    }

    /// Commit the write transaction and keep reading at the new version.
    #[instrument(skip(self))]
    pub fn commit_and_continue_as_read(&self) -> Result<VersionId> {
        let mut stage = self.stage.lock();
        if *stage != TransactStage::Writing {
            return Err(ViewError::WrongTransactStage("commit requires a write transaction"));
        }
        let ops = self.group.take_ops();
        self.group.set_writable(false);
        let num_ops = ops.len();
        let version = self.db.commit(ops, self.group.snapshot());
        self.group.set_version(version);
        *stage = TransactStage::Reading;
        debug!(version, num_ops, "write transaction committed");
        Ok(version)
    }

    // --- Handover ---

    fn require_reading(stage: &TransactStage) -> Result<()> {
        match stage {
            TransactStage::Reading => Ok(()),
            TransactStage::Writing => Err(ViewError::WrongTransactStage(
                "handover requires a read transaction",
            )),
        }
    }

    /// Copy `view` for import into another context pinned to this version.
    /// The source view stays usable.
    pub fn export_for_handover<V: HandoverExport>(&self, view: &V) -> Result<Handover> {
        let stage = self.stage.lock();
        Self::require_reading(&stage)?;
        let version = self.group.version();
        let (view, patch) = view.clone_for_handover(version)?;
        Ok(Handover {
            version,
            view,
            patch: Some(patch),
        })
    }

    /// Like [`export_for_handover`](Self::export_for_handover), giving up
    /// the source view.
    pub fn export_for_handover_move<V: HandoverExport>(&self, view: V) -> Result<Handover> {
        let stage = self.stage.lock();
        Self::require_reading(&stage)?;
        let version = self.group.version();
        let (view, patch) = view.move_for_handover(version)?;
        Ok(Handover {
            version,
            view,
            patch: Some(patch),
        })
    }

    pub fn import_from_handover(&self, handover: Handover) -> Result<AnyView> {
        let stage = self.stage.lock();
        Self::require_reading(&stage)?;
        let pinned = self.group.version();
        if handover.version != pinned {
            return Err(ViewError::HandoverSnapshotMismatch {
                exported: handover.version,
                pinned,
            });
        }
        let Handover {
            mut view, mut patch, ..
        } = handover;
        view.apply_and_consume_patch(&mut patch, &self.group)?;
        Ok(view)
    }

    pub fn export_row_for_handover(&self, row: &Row) -> Result<RowHandover> {
        let stage = self.stage.lock();
        Self::require_reading(&stage)?;
        row.export_for_handover(self.group.version())
    }

    pub fn import_row_from_handover(&self, handover: RowHandover) -> Result<Row> {
        let stage = self.stage.lock();
        Self::require_reading(&stage)?;
        let (row, mut patch) = handover.into_parts();
        row.apply_and_consume_patch(&mut patch, &self.group)?;
        Ok(row)
    }
}

impl Drop for SharedGroup {
    fn drop(&mut self) {
        // Abandoned write transactions are discarded.
        if *self.stage.get_mut() == TransactStage::Writing {
            self.db.release_writer();
        }
    }
}

impl std::fmt::Debug for SharedGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedGroup")
            .field("group", &self.group)
            .field("stage", &self.stage())
            .finish()
    }
}

#[cfg(test)]
mod group_tests {
    use super::*;

    fn people() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("name", DataType::String),
            ColumnSpec::new("age", DataType::Int),
        ]
    }

    #[test]
    fn test_mutation_outside_write_transaction_fails() {
        let db = Database::new();
        let sg = db.begin_read();
        assert!(matches!(
            sg.add_table("people", people()),
            Err(ViewError::NotInWriteTransaction)
        ));
        sg.promote_to_write().unwrap();
        let t = sg.add_table("people", people()).unwrap();
        t.write().add_empty_row().unwrap();
        sg.commit_and_continue_as_read().unwrap();
        assert!(matches!(
            t.write().set_int(1, 0, 3),
            Err(ViewError::NotInWriteTransaction)
        ));
    }

    #[test]
    fn test_commit_is_visible_after_advance() {
        let db = Database::new();
        let writer = db.begin_read();
        let reader = db.begin_read();
        writer.promote_to_write().unwrap();
        let t = writer.add_table("people", people()).unwrap();
        t.write().add_empty_rows(2).unwrap();
        t.write().set_string(0, 1, "zed").unwrap();
        let v = writer.commit_and_continue_as_read().unwrap();

        assert!(!reader.group().has_table("people"));
        assert_eq!(reader.advance_read().unwrap(), v);
        let seen = reader.get_table("people").unwrap();
        assert_eq!(seen.read().size(), 2);
        assert_eq!(seen.read().get_string(0, 1).unwrap(), "zed");
        assert_eq!(seen.read().key(), Some(TableKey(0)));
    }

    #[test]
    fn test_stage_rules() {
        let db = Database::new();
        let sg = db.begin_read();
        assert!(sg.commit_and_continue_as_read().is_err());
        sg.promote_to_write().unwrap();
        assert_eq!(sg.stage(), TransactStage::Writing);
        assert!(sg.advance_read().is_err());
        assert!(sg.promote_to_write().is_err());
        sg.commit_and_continue_as_read().unwrap();
        assert_eq!(sg.stage(), TransactStage::Reading);
    }

    #[test]
    fn test_new_context_starts_from_snapshot() {
        let db = Database::new();
        let sg = db.begin_read();
        sg.promote_to_write().unwrap();
        let t = sg.add_table("people", people()).unwrap();
        t.write().add_empty_rows(3).unwrap();
        sg.commit_and_continue_as_read().unwrap();

        let late = db.begin_read();
        assert_eq!(late.version(), sg.version());
        assert_eq!(late.get_table("people").unwrap().read().size(), 3);
        assert!(matches!(late.get_table("pets"), Err(ViewError::NoSuchTable(_))));
    }
}
