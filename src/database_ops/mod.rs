pub mod mapping;
pub mod missing;
pub mod reconcile;
pub mod snapshot;
pub mod source;
pub mod store;
