//! Paginated storage substrate shared by both B+-tree variants.
//!
//! This crate plays the role of the "external collaborators" from the
//! index engine's point of view (page cache, disk manager, write-ahead
//! log, atomic-operations manager, file locking). The index engine never
//! touches a file descriptor directly; it only calls through the traits
//! defined here.

pub mod api;
pub mod atomic;
pub mod buffer_pool;
pub mod disk_manager;
pub mod lock_manager;
pub mod wal;

pub use api::{BpmError, BufferPoolManager, PageGuard, PageId, INVALID_PAGE_ID, PAGE_SIZE};
pub use atomic::{AtomicOperation, AtomicOperationId, AtomicOperationsManager, SimpleAtomicOperationsManager};
pub use buffer_pool::SimpleBufferPoolManager;
pub use disk_manager::DiskManager;
pub use lock_manager::{FileId, FileLockManager, ReadLockGuard, WriteLockGuard};
pub use wal::{ComponentOperation, ComponentOperationKind, InMemoryWal, PageOperation, PageOperationKind, WriteAheadLog};
