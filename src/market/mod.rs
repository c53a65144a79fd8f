//! Market data held by the core.

pub mod store;

pub use store::SnapshotStore;
