pub mod executor;
pub mod presets;
pub mod spec;

pub use executor::QueryExecutor;
pub use spec::{Filter, FilterOp, QueryError, QuerySpec, SortDirection, SortSpec};
