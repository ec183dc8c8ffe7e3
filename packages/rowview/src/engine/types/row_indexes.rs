/// Sentinel stored in place of a row reference whose row has been erased.
pub const DETACHED_REF: u64 = u64::MAX;

/// Ordered sequence of source-table row positions backing a view.
///
/// Every entry is either a valid row of the source table or [`DETACHED_REF`];
/// `num_detached` always equals the number of sentinel entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowIndexes {
    refs: Vec<u64>,
    num_detached: usize,
}

impl RowIndexes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            refs: Vec::with_capacity(capacity),
            num_detached: 0,
        }
    }

    /// Build from attached row positions.
    pub fn from_rows(rows: impl IntoIterator<Item = usize>) -> Self {
        Self {
            refs: rows.into_iter().map(|r| r as u64).collect(),
            num_detached: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    #[inline]
    pub fn num_detached(&self) -> usize {
        self.num_detached
    }

    #[inline]
    pub fn num_attached(&self) -> usize {
        self.refs.len() - self.num_detached
    }

    /// Raw entry, sentinel included.
    #[inline]
    pub fn get(&self, ndx: usize) -> Option<u64> {
        self.refs.get(ndx).copied()
    }

    /// Source row for entry `ndx`; `None` when the entry is detached.
    #[inline]
    pub fn source_row(&self, ndx: usize) -> Option<usize> {
        match self.refs.get(ndx) {
            Some(&r) if r != DETACHED_REF => Some(r as usize),
            _ => None,
        }
    }

    #[inline]
    pub fn push(&mut self, row: usize) {
        self.refs.push(row as u64);
    }

    /// Remove entry `ndx` from the sequence (not from the table).
    pub fn remove(&mut self, ndx: usize) -> u64 {
        let r = self.refs.remove(ndx);
        if r == DETACHED_REF {
            self.num_detached -= 1;
        }
        r
    }

    pub fn clear(&mut self) {
        self.refs.clear();
        self.num_detached = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.refs.iter().copied()
    }

    /// `(view index, source row)` for every attached entry.
    pub fn attached(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.refs
            .iter()
            .enumerate()
            .filter(|(_, &r)| r != DETACHED_REF)
            .map(|(i, &r)| (i, r as usize))
    }

    /// First view index referring to `source_row`.
    pub fn find_first(&self, source_row: usize) -> Option<usize> {
        self.refs.iter().position(|&r| r == source_row as u64)
    }

    /// Hand the backing buffer out, leaving this sequence empty.
    pub(crate) fn take(&mut self) -> RowIndexes {
        std::mem::take(self)
    }

    pub(crate) fn as_slice(&self) -> &[u64] {
        &self.refs
    }

    /// Replace the contents with an already-ordered buffer.
    pub(crate) fn replace_refs(&mut self, refs: Vec<u64>) {
        self.num_detached = refs.iter().filter(|&&r| r == DETACHED_REF).count();
        self.refs = refs;
    }

    // --- Adjustment protocol ---

    /// Rows `[at, at + count)` were inserted in the source table.
    pub fn adj_insert_rows(&mut self, at: usize, count: usize) {
        let at = at as u64;
        let count = count as u64;
        for r in self.refs.iter_mut() {
            if *r != DETACHED_REF && *r >= at {
                *r += count;
            }
        }
    }

    /// Row `at` was erased and every later row shifted down by one.
    pub fn adj_erase_row(&mut self, at: usize) {
        let at = at as u64;
        for r in self.refs.iter_mut() {
            if *r == DETACHED_REF {
                continue;
            }
            if *r == at {
                *r = DETACHED_REF;
                self.num_detached += 1;
            } else if *r > at {
                *r -= 1;
            }
        }
    }

    /// Row `to` was erased and the contents of row `from` relocated into its
    /// slot. References to `to` become detached, references to `from` follow
    /// the contents.
    pub fn adj_move_over(&mut self, from: usize, to: usize) {
        let (from, to) = (from as u64, to as u64);
        for r in self.refs.iter_mut() {
            if *r == to {
                *r = DETACHED_REF;
                self.num_detached += 1;
            } else if *r == from {
                *r = to;
            }
        }
    }
}
