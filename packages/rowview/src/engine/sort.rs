//! Stable multi-key ordering and distinct-value population of row sequences.

use super::table::Table;
use super::types::{DistinctKey, FastMap, RowIndexes, Value, DETACHED_REF};
use crate::config;
use crate::error::Result;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortColumn {
    pub column: usize,
    pub ascending: bool,
}

/// Ordered sort criteria; the first column that differs decides.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct SortDescriptor {
    pub columns: SmallVec<[SortColumn; 4]>,
}

impl SortDescriptor {
    pub fn single(column: usize, ascending: bool) -> Self {
        let mut columns = SmallVec::new();
        columns.push(SortColumn { column, ascending });
        Self { columns }
    }

    /// Pair up `columns` with `ascending`; missing directions default to
    /// ascending.
    pub fn new(columns: &[usize], ascending: &[bool]) -> Self {
        let columns = columns
            .iter()
            .enumerate()
            .map(|(i, &column)| SortColumn {
                column,
                ascending: ascending.get(i).copied().unwrap_or(true),
            })
            .collect();
        Self { columns }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub(crate) fn validate(&self, table: &Table) -> Result<()> {
        self.columns
            .iter()
            .try_for_each(|c| table.column_spec(c.column).map(|_| ()))
    }

    fn compare_keys(&self, a: &[&Value], b: &[&Value]) -> Ordering {
        for (i, col) in self.columns.iter().enumerate() {
            let ord = a[i].compare(b[i]);
            let ord = if col.ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

type SortKeys<'a> = SmallVec<[&'a Value; 4]>;
type Keyed<'a> = (u64, Option<SortKeys<'a>>);

/// Stable sort of `rows` by `sort`, reading each row's keys once.
///
/// Detached entries keep their relative order and go last.
pub(crate) fn sort_rows(table: &Table, rows: &mut RowIndexes, sort: &SortDescriptor) {
    if sort.is_empty() || rows.len() < 2 {
        return;
    }
    let data = table.data();
    let mut keyed: Vec<Keyed<'_>> = rows
        .iter()
        .map(|r| {
            if r == DETACHED_REF {
                return (r, None);
            }
            let keys = sort
                .columns
                .iter()
                .map(|c| data.get(c.column, r as usize))
                .collect::<Option<SortKeys<'_>>>();
            (r, keys)
        })
        .collect();

    let cmp = |a: &Keyed<'_>, b: &Keyed<'_>| match (&a.1, &b.1) {
        (Some(ka), Some(kb)) => sort.compare_keys(ka, kb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    #[cfg(feature = "parallel")]
    {
        if keyed.len() >= config::get().parallel_sort_threshold {
            keyed.par_sort_by(cmp);
        } else {
            keyed.sort_by(cmp);
        }
    }
    #[cfg(not(feature = "parallel"))]
    keyed.sort_by(cmp);

    rows.replace_refs(keyed.into_iter().map(|(r, _)| r).collect());
}

/// First row of every distinct value of `column`, in table order, plus an
/// order-independent fingerprint of the set of distinct values.
pub(crate) fn distinct_rows(table: &Table, column: usize) -> Result<(RowIndexes, u64)> {
    table.column_spec(column)?;
    let data = table.data();
    let mut seen: FastMap<DistinctKey, usize> = FastMap::default();
    let mut rows = RowIndexes::with_capacity(config::get().initial_view_capacity);
    let mut fingerprint = 0u64;
    for row in 0..table.size() {
        let Some(value) = data.get(column, row) else {
            continue;
        };
        let key = value.distinct_key();
        if seen.contains_key(&key) {
            continue;
        }
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        fingerprint = fingerprint.wrapping_add(hasher.finish());
        seen.insert(key, row);
        rows.push(row);
    }
    Ok((rows, fingerprint))
}
