mod predicate;
mod query;

pub use predicate::Predicate;
pub use query::{Query, QueryWindow};

pub(crate) use query::find_all_rows;
