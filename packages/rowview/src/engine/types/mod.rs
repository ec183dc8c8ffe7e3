mod keys;
mod row_indexes;
mod value;

pub use keys::{AccessorId, TableKey, VersionId};
pub use row_indexes::{RowIndexes, DETACHED_REF};
pub(crate) use value::DistinctKey;
pub use value::{DataType, Value};

use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;

pub type FastMap<K, V> = std::collections::HashMap<K, V, BuildHasherDefault<FxHasher>>;
