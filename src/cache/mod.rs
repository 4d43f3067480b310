pub mod key;
pub mod snapshot;

pub use key::cache_key;
pub use snapshot::TreeStore;
