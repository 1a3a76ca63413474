pub mod common;
pub mod config;
pub mod error;
pub mod network;
pub mod storage;
pub mod sync;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod ui;

pub use error::{StorageError, SyncError, SyncResult};
pub use sync::{Collaborators, SyncCore};
