use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a committed database snapshot.
pub type VersionId = u64;

/// Position of a table inside its group. Stable across transaction contexts
/// pinned to the same snapshot, which is what lets handover resolve tables.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey(pub usize);

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table#{}", self.0)
    }
}

/// Registry identity of a live view or row accessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AccessorId(u64);

static NEXT_ACCESSOR_ID: AtomicU64 = AtomicU64::new(1);

impl AccessorId {
    pub(crate) fn next() -> Self {
        AccessorId(NEXT_ACCESSOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}
