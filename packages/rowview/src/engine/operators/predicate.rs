use crate::engine::table::Table;
use crate::engine::types::Value;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Row condition evaluated against one table row.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Predicate {
    Prefix { column: usize, prefix: String },
    Eq { column: usize, value: Value },
    Neq { column: usize, value: Value },
    Gt { column: usize, value: Value },
    Gte { column: usize, value: Value },
    Lt { column: usize, value: Value },
    Lte { column: usize, value: Value },
    And { predicates: Vec<Predicate> },
    Or { predicates: Vec<Predicate> },
    Not { predicate: Box<Predicate> },
}

impl Default for Predicate {
    /// Matches every row.
    fn default() -> Self {
        Predicate::And {
            predicates: Vec::new(),
        }
    }
}

impl Predicate {
    /// Combine with `other`, flattening nested conjunctions.
    pub fn and(self, other: Predicate) -> Predicate {
        match self {
            Predicate::And { mut predicates } => {
                predicates.push(other);
                Predicate::And { predicates }
            }
            first => Predicate::And {
                predicates: vec![first, other],
            },
        }
    }

    /// Reject column indices outside `table` before any row is visited.
    pub(crate) fn validate(&self, table: &Table) -> Result<()> {
        match self {
            Predicate::And { predicates } | Predicate::Or { predicates } => {
                predicates.iter().try_for_each(|p| p.validate(table))
            }
            Predicate::Not { predicate } => predicate.validate(table),
            Predicate::Prefix { column, .. }
            | Predicate::Eq { column, .. }
            | Predicate::Neq { column, .. }
            | Predicate::Gt { column, .. }
            | Predicate::Gte { column, .. }
            | Predicate::Lt { column, .. }
            | Predicate::Lte { column, .. } => table.column_spec(*column).map(|_| ()),
        }
    }
}

pub(crate) fn check_predicate(table: &Table, pred: &Predicate, row: usize) -> bool {
    match pred {
        Predicate::And { predicates } => predicates.iter().all(|p| check_predicate(table, p, row)),
        Predicate::Or { predicates } => predicates.iter().any(|p| check_predicate(table, p, row)),
        Predicate::Not { predicate } => !check_predicate(table, predicate, row),
        Predicate::Prefix { column, prefix } => match table.data().get(*column, row) {
            Some(Value::String(s)) => s.starts_with(prefix.as_str()),
            _ => false,
        },
        Predicate::Eq { column, value }
        | Predicate::Neq { column, value }
        | Predicate::Gt { column, value }
        | Predicate::Gte { column, value }
        | Predicate::Lt { column, value }
        | Predicate::Lte { column, value } => {
            let Some(cell) = table.data().get(*column, row) else {
                return false;
            };
            // NaN is unordered against everything, itself included
            if cell.is_nan() || value.is_nan() {
                return matches!(pred, Predicate::Neq { .. });
            }
            let ord = cell.compare(value);
            match pred {
                Predicate::Eq { .. } => ord == Ordering::Equal,
                Predicate::Neq { .. } => ord != Ordering::Equal,
                Predicate::Gt { .. } => ord == Ordering::Greater,
                Predicate::Gte { .. } => ord != Ordering::Less,
                Predicate::Lt { .. } => ord == Ordering::Less,
                Predicate::Lte { .. } => ord != Ordering::Greater,
                _ => false,
            }
        }
    }
}
