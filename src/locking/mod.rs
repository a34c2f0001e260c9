//! Single-slot operation lock and signal-time cleanup of scoped paths.

mod cleanup;
mod operation;

pub use cleanup::{cleanup_all, register_cleanup, unregister_cleanup};
pub use operation::{LockInfo, OperationLock};
