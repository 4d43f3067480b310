pub mod build;
pub mod diff;
pub mod latest;
pub mod node;

pub use build::build_tree;
pub use diff::{reconcile, Change, ChangeSet};
pub use node::{EntityId, EntityRef, Node, NodeKey, NodePath, NodeTree, Record, Value};
