//! Moving and copying views and row accessors between transaction contexts
//! pinned to the same snapshot.
//!
//! Export produces a free-standing accessor, not attached to any table, plus
//! a [`HandoverPatch`] naming every table it must be re-bound to. Import
//! resolves those names in the destination [`Group`], re-registers the
//! accessor there and consumes the patch.

use super::group::Group;
use super::registry::AccessorCell;
use super::row::{Row, RowPatch};
use super::table::TableRef;
use super::table_view::{ConstTableView, TableView};
use super::types::{TableKey, VersionId};
use super::view::{is_cell_in_sync, link_source, TableViewBase, ViewCell, ViewOrigin, ViewState, NEVER_SYNCED};
use crate::error::{Result, ViewError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Context-independent description of the cross-context references a view
/// holds. Consumed exactly once by import.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HandoverPatch {
    /// Snapshot the exporting context was pinned to.
    pub version: VersionId,
    pub table: TableKey,
    /// Whether the exported rows were current; an imported view resumes with
    /// the same staleness.
    pub was_in_sync: bool,
    pub origin: OriginPatch,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OriginPatch {
    None,
    Restricting { patch: Box<HandoverPatch> },
    LinkList { origin: RowPatch },
}

/// A view of either capability, as produced by export and import.
#[derive(Debug, Clone)]
pub enum AnyView {
    Mutable(TableView),
    ReadOnly(ConstTableView),
}

impl AnyView {
    fn base_mut(&mut self) -> &mut TableViewBase {
        match self {
            AnyView::Mutable(v) => &mut **v,
            AnyView::ReadOnly(v) => &mut **v,
        }
    }

    pub fn base(&self) -> &TableViewBase {
        match self {
            AnyView::Mutable(v) => &**v,
            AnyView::ReadOnly(v) => &**v,
        }
    }

    pub fn is_mutable(&self) -> bool {
        matches!(self, AnyView::Mutable(_))
    }

    pub fn into_mutable(self) -> Option<TableView> {
        match self {
            AnyView::Mutable(v) => Some(v),
            AnyView::ReadOnly(_) => None,
        }
    }

    /// Read-only view of either variant.
    pub fn into_const(self) -> ConstTableView {
        match self {
            AnyView::Mutable(v) => ConstTableView::from(v),
            AnyView::ReadOnly(v) => v,
        }
    }

    /// Re-bind this free-standing view inside `group` and consume `patch`.
    ///
    /// Nothing is attached unless every reference resolves, so a failed
    /// import leaves both the patch and the destination untouched.
    pub fn apply_and_consume_patch(&mut self, patch: &mut Option<HandoverPatch>, group: &Group) -> Result<()> {
        self.base_mut().apply_and_consume_patch(patch, group)
    }
}

/// Export capability of a view facade. The const variant leaves the source
/// usable; the consuming variant may reuse the source's buffers.
pub trait HandoverExport {
    fn clone_for_handover(&self, version: VersionId) -> Result<(AnyView, HandoverPatch)>;

    fn move_for_handover(self, version: VersionId) -> Result<(AnyView, HandoverPatch)>
    where
        Self: Sized;
}

impl HandoverExport for TableView {
    fn clone_for_handover(&self, version: VersionId) -> Result<(AnyView, HandoverPatch)> {
        let (base, patch) = export_cell(&self.cell, version)?;
        Ok((AnyView::Mutable(TableView::from_base(base)), patch))
    }

    fn move_for_handover(self, version: VersionId) -> Result<(AnyView, HandoverPatch)> {
        let (base, patch) = move_cell(self.into_base().cell, version)?;
        Ok((AnyView::Mutable(TableView::from_base(base)), patch))
    }
}

impl HandoverExport for ConstTableView {
    fn clone_for_handover(&self, version: VersionId) -> Result<(AnyView, HandoverPatch)> {
        let (base, patch) = export_cell(&self.cell, version)?;
        Ok((AnyView::ReadOnly(ConstTableView::from_base(base)), patch))
    }

    fn move_for_handover(self, version: VersionId) -> Result<(AnyView, HandoverPatch)> {
        let (base, patch) = move_cell(self.into_base().cell, version)?;
        Ok((AnyView::ReadOnly(ConstTableView::from_base(base)), patch))
    }
}

/// A view in transit: the free-standing view, its patch, and the snapshot
/// it was exported at.
#[derive(Debug)]
pub struct Handover {
    pub(crate) version: VersionId,
    pub(crate) view: AnyView,
    pub(crate) patch: Option<HandoverPatch>,
}

impl Handover {
    pub fn version(&self) -> VersionId {
        self.version
    }

    pub fn patch(&self) -> Option<&HandoverPatch> {
        self.patch.as_ref()
    }

    pub fn into_parts(self) -> (AnyView, Option<HandoverPatch>) {
        (self.view, self.patch)
    }
}

#[derive(Debug)]
pub struct RowHandover {
    pub(crate) row: Row,
    pub(crate) patch: Option<RowPatch>,
}

impl RowHandover {
    pub fn version(&self) -> Option<VersionId> {
        self.patch.as_ref().map(|p| p.version)
    }
}

// --- Export ---

fn table_key(table: &TableRef) -> Result<TableKey> {
    table.read().key().ok_or_else(|| ViewError::HandoverUnresolved {
        what: "view on a table outside any group".into(),
    })
}

/// Free-standing copy of `origin`, plus its patch.
fn export_origin(origin: &ViewOrigin, version: VersionId) -> Result<(ViewOrigin, OriginPatch)> {
    match origin {
        ViewOrigin::Query {
            predicate,
            restricting: Some(parent),
            window,
        } => {
            let (parent, patch) = export_cell(parent, version)?;
            let origin = ViewOrigin::Query {
                predicate: predicate.clone(),
                restricting: Some(parent.cell),
                window: *window,
            };
            Ok((origin, OriginPatch::Restricting { patch: Box::new(patch) }))
        }
        ViewOrigin::LinkList { origin, column } => {
            let (row, patch) = Row { cell: origin.clone() }.export_patch(version)?;
            let origin = ViewOrigin::LinkList {
                origin: row.cell.clone(),
                column: *column,
            };
            Ok((origin, OriginPatch::LinkList { origin: patch }))
        }
        other => Ok((other.clone(), OriginPatch::None)),
    }
}

fn export_cell(cell: &ViewCell, version: VersionId) -> Result<(TableViewBase, HandoverPatch)> {
    let was_in_sync = is_cell_in_sync(cell);
    let (table, origin) = {
        let state = cell.read();
        (state.upgrade_table(), state.origin.clone())
    };
    let table = table.ok_or(ViewError::DetachedView)?;
    let key = table_key(&table)?;
    let (origin, origin_patch) = export_origin(&origin, version)?;

    let mut state = cell.read().duplicate(None);
    state.origin = origin;
    debug!(view = ?state.id, %key, version, was_in_sync, rows = state.rows.len(), "view exported for handover");
    let patch = HandoverPatch {
        version,
        table: key,
        was_in_sync,
        origin: origin_patch,
    };
    Ok((TableViewBase::unattached(state), patch))
}

/// Consuming export: reuse the row buffer when nothing else shares the view.
fn move_cell(cell: ViewCell, version: VersionId) -> Result<(TableViewBase, HandoverPatch)> {
    let was_in_sync = is_cell_in_sync(&cell);
    let cell = match Arc::try_unwrap(cell) {
        Ok(lock) => lock,
        // Still a restricting view of someone else: fall back to a copy.
        Err(shared) => return export_cell(&shared, version),
    };
    let mut old = cell.into_inner();
    let table = old.upgrade_table().ok_or(ViewError::DetachedView)?;
    let key = table_key(&table)?;
    let origin = std::mem::replace(&mut old.origin, ViewOrigin::Table);
    let (origin, origin_patch) = match origin {
        ViewOrigin::Query {
            predicate,
            restricting: Some(parent),
            window,
        } => {
            let (parent, patch) = move_cell(parent, version)?;
            let origin = ViewOrigin::Query {
                predicate,
                restricting: Some(parent.cell),
                window,
            };
            (origin, OriginPatch::Restricting { patch: Box::new(patch) })
        }
        other => export_origin(&other, version)?,
    };

    let mut state = ViewState::new(None, origin, old.sort.take());
    state.rows = old.rows.take();
    state.auto_sort = old.auto_sort;
    state.mode = old.mode;
    state.last_seen_version = old.last_seen_version;
    state.outside_version = old.outside_version;
    state.generation = old.generation;
    debug!(view = ?state.id, %key, version, was_in_sync, "view moved for handover");
    // `old` unregisters itself from the source table here.
    drop(old);
    let patch = HandoverPatch {
        version,
        table: key,
        was_in_sync,
        origin: origin_patch,
    };
    Ok((TableViewBase::unattached(state), patch))
}

// --- Import ---

/// One accessor to attach once every reference has resolved.
struct Binding {
    cell: ViewCell,
    table: TableRef,
    was_in_sync: bool,
    link: Option<(Row, TableRef, Option<usize>)>,
}

fn resolve_table(group: &Group, key: TableKey) -> Result<TableRef> {
    group.table_by_key(key).ok_or_else(|| ViewError::HandoverUnresolved {
        what: format!("{}", key),
    })
}

/// Resolve `patch` against `group` for `cell` and, recursively, its
/// restricting views. Parents are pushed before their children.
fn resolve(cell: &ViewCell, patch: &HandoverPatch, group: &Group, out: &mut Vec<Binding>) -> Result<()> {
    let table = resolve_table(group, patch.table)?;
    let state = cell.read();
    if state.table.is_some() {
        return Err(ViewError::HandoverUnresolved {
            what: "view is already attached".into(),
        });
    }
    {
        let guard = table.read();
        if let Some((_, row)) = state.rows.attached().find(|(_, row)| *row >= guard.size()) {
            return Err(ViewError::RowOutOfRange {
                row,
                size: guard.size(),
            });
        }
    }
    let link = match (&state.origin, &patch.origin) {
        (ViewOrigin::Query { restricting: Some(parent), .. }, OriginPatch::Restricting { patch }) => {
            resolve(parent, patch, group, out)?;
            None
        }
        (ViewOrigin::LinkList { origin, .. }, OriginPatch::LinkList { origin: row_patch }) => {
            let origin_table = resolve_table(group, row_patch.table)?;
            Some((Row { cell: origin.clone() }, origin_table, row_patch.row))
        }
        (ViewOrigin::Query { restricting: Some(_), .. }, _)
        | (ViewOrigin::LinkList { .. }, _)
        | (_, OriginPatch::Restricting { .. })
        | (_, OriginPatch::LinkList { .. }) => {
            return Err(ViewError::HandoverUnresolved {
                what: "patch does not describe this view".into(),
            })
        }
        _ => None,
    };
    out.push(Binding {
        cell: cell.clone(),
        table,
        was_in_sync: patch.was_in_sync,
        link,
    });
    Ok(())
}

fn attach(binding: Binding) -> Result<()> {
    let Binding {
        cell,
        table,
        was_in_sync,
        link,
    } = binding;
    let mut link_version = None;
    if let Some((row, origin_table, origin_row)) = link {
        row.bind(&origin_table, origin_row);
        let column = match &cell.read().origin {
            ViewOrigin::LinkList { column, .. } => *column,
            _ => 0,
        };
        link_version = Some(link_source(&row.cell, column)?.version);
    }

    let mut guard = table.write();
    let accessor: AccessorCell = cell.clone();
    let mut state = cell.write();
    state.table = Some(table.downgrade());
    guard.register(state.id, &accessor);
    if was_in_sync {
        state.stamp_in_sync(&guard, link_version);
    } else {
        state.last_seen_version = NEVER_SYNCED;
    }
    debug!(view = ?state.id, table = guard.name(), was_in_sync, rows = state.rows.len(), "view imported");
    Ok(())
}

impl TableViewBase {
    /// See [`AnyView::apply_and_consume_patch`].
    pub fn apply_and_consume_patch(&mut self, patch: &mut Option<HandoverPatch>, group: &Group) -> Result<()> {
        let current = patch.as_ref().ok_or(ViewError::PatchConsumed)?;
        if current.version != group.version() {
            return Err(ViewError::HandoverSnapshotMismatch {
                exported: current.version,
                pinned: group.version(),
            });
        }
        let mut bindings = Vec::new();
        resolve(&self.cell, current, group, &mut bindings)?;
        patch.take();
        bindings.into_iter().try_for_each(attach)
    }
}

impl Row {
    /// Re-bind this free-standing row accessor inside `group` and consume
    /// `patch`.
    pub fn apply_and_consume_patch(&self, patch: &mut Option<RowPatch>, group: &Group) -> Result<()> {
        let current = patch.as_ref().ok_or(ViewError::PatchConsumed)?;
        if current.version != group.version() {
            return Err(ViewError::HandoverSnapshotMismatch {
                exported: current.version,
                pinned: group.version(),
            });
        }
        let table = resolve_table(group, current.table)?;
        let row = current.row;
        patch.take();
        self.bind(&table, row);
        debug!(row = ?row, table = table.read().name(), "row accessor imported");
        Ok(())
    }

    /// Free-standing copy of this accessor for another context.
    pub fn export_for_handover(&self, version: VersionId) -> Result<RowHandover> {
        let (row, patch) = self.export_patch(version)?;
        Ok(RowHandover {
            row,
            patch: Some(patch),
        })
    }
}

impl RowHandover {
    pub fn into_parts(self) -> (Row, Option<RowPatch>) {
        (self.row, self.patch)
    }
}

#[cfg(test)]
mod handover_tests {
    use super::*;
    use crate::engine::table::ColumnSpec;
    use crate::engine::types::DataType;

    #[test]
    fn test_export_of_free_standing_table_is_unresolved() {
        let t = TableRef::new("t", vec![ColumnSpec::new("v", DataType::Int)]);
        t.write().add_empty_row().unwrap();
        let view = t.view_all().unwrap();
        assert!(matches!(
            view.clone_for_handover(1),
            Err(ViewError::HandoverUnresolved { .. })
        ));
    }

    #[test]
    fn test_patch_serde_shape() {
        let patch = HandoverPatch {
            version: 3,
            table: TableKey(1),
            was_in_sync: true,
            origin: OriginPatch::Restricting {
                patch: Box::new(HandoverPatch {
                    version: 3,
                    table: TableKey(1),
                    was_in_sync: false,
                    origin: OriginPatch::None,
                }),
            },
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["origin"]["type"], "restricting");
        let back: HandoverPatch = serde_json::from_value(json).unwrap();
        assert_eq!(back, patch);
    }
}
