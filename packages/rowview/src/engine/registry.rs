//! Per-table registry of live accessors (views and row accessors).
//!
//! The registry only holds weak back-references: it never keeps an accessor
//! alive and never owns one. Its sole job is to push structural adjustments
//! into every accessor built on the table.

use super::types::AccessorId;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Something holding row positions into a table that must follow
/// structural mutation of that table.
pub(crate) trait RowAccessor: Send + Sync {
    /// Rows `[at, at + count)` were inserted.
    fn adj_insert_rows(&mut self, at: usize, count: usize);
    /// Row `at` was erased, later rows shifted down by one.
    fn adj_erase_row(&mut self, at: usize);
    /// Row `to` was erased and row `from` relocated into its slot.
    fn adj_move_over(&mut self, from: usize, to: usize);
}

pub(crate) type AccessorCell = Arc<RwLock<dyn RowAccessor>>;
type WeakAccessor = Weak<RwLock<dyn RowAccessor>>;

#[derive(Default)]
pub struct AccessorRegistry {
    entries: SmallVec<[(AccessorId, WeakAccessor); 4]>,
}

impl AccessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, id: AccessorId, accessor: &AccessorCell) {
        self.entries.retain(|(_, w)| w.strong_count() > 0);
        self.entries.push((id, Arc::downgrade(accessor)));
    }

    pub(crate) fn unregister(&mut self, id: AccessorId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(eid, _)| *eid != id);
        before != self.entries.len()
    }

    pub fn is_registered(&self, id: AccessorId) -> bool {
        self.entries
            .iter()
            .any(|(eid, w)| *eid == id && w.strong_count() > 0)
    }

    /// Number of live registered accessors.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|(_, w)| w.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // --- Broadcast ---

    pub(crate) fn rows_inserted(&mut self, at: usize, count: usize) {
        trace!(at, count, accessors = self.entries.len(), "adjust: rows inserted");
        self.broadcast(|acc| acc.adj_insert_rows(at, count));
    }

    pub(crate) fn row_erased(&mut self, at: usize) {
        trace!(at, accessors = self.entries.len(), "adjust: row erased");
        self.broadcast(|acc| acc.adj_erase_row(at));
    }

    pub(crate) fn row_moved(&mut self, from: usize, to: usize) {
        trace!(from, to, accessors = self.entries.len(), "adjust: row moved");
        self.broadcast(|acc| acc.adj_move_over(from, to));
    }

    fn broadcast(&mut self, mut apply: impl FnMut(&mut dyn RowAccessor)) {
        self.entries.retain(|(_, weak)| match weak.upgrade() {
            Some(cell) => {
                apply(&mut *cell.write());
                true
            }
            None => false,
        });
    }
}

impl std::fmt::Debug for AccessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessorRegistry")
            .field("live", &self.len())
            .finish()
    }
}
