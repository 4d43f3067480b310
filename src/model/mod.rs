pub mod hooks;
pub mod sync;

pub use hooks::{ModelHooks, NoopHooks};
pub use sync::{Completion, ModelState, SyncModel};
