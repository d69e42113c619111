//! On-disk state owned by a backup run: the lock marker and the dump layout.

pub mod layout;
pub mod lock;

pub use layout::BackupLayout;
pub use lock::{LockHolder, RunLock};
