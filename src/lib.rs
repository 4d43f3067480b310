pub mod backend;
pub mod cache;
pub mod config;
pub mod model;
pub mod query;
pub mod stats;
pub mod thumb;
pub mod tree;

pub use config::{FieldMap, ModelConfig};
pub use model::{Completion, ModelHooks, ModelState, NoopHooks, SyncModel};
pub use query::spec::{QueryError, QuerySpec};
pub use tree::{Node, NodeTree, Record, Value};
