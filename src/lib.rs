//! Lazily synchronized gist tree: a node model, an entity cache with
//! persisted settings, and a synchronizer that fetches children on demand.

pub mod commands;
pub mod config;
pub mod error;
pub mod model;
pub mod remote;
pub mod render;
pub mod store;
pub mod sync;

pub use commands::Commands;
pub use error::{Result, SyncError, TransportError};
pub use store::Store;
pub use sync::{TreeOptions, TreeSynchronizer};
