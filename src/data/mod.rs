//! Data handling: raw columns, specification inference, materialization.
//!
//! The flow is linear: the host supplies [`RawColumn`]s (or a CSV path
//! consumed through [`io`]), [`DataSpec::infer`] assigns semantic types, and
//! [`VerticalDataset::materialize`] produces the typed columnar storage the
//! engine consumes.

mod column;
mod dataset;
pub mod io;
mod spec;

pub use column::{RawColumn, RawValue};
pub use dataset::{ColumnData, VerticalDataset};
pub use spec::{
    ColumnDomain, ColumnSpec, ColumnType, DataSpec, SpecGuide, MAX_VOCABULARY_SIZE,
};
