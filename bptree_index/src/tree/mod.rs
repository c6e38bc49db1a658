//! B+-tree engines and the durability adapter they share.

pub mod bonsai;
pub mod standard;

pub use bonsai::BonsaiBPlusTree;
pub use standard::StandardBPlusTree;

use crate::error::IndexResult;
use page_store::atomic::{AtomicOperation, AtomicOperationsManager};
use page_store::lock_manager::{FileLockManager, ReadLockGuard, WriteLockGuard};
use page_store::wal::WriteAheadLog;
use page_store::BufferPoolManager;

/// Holds whichever file-lock mode was acquired for the duration of one
/// atomic operation; dropped (and so released) at the end of `run_atomic`.
enum FileGuard {
    Shared(ReadLockGuard),
    Exclusive(WriteLockGuard),
}

/// Runs `body` as one atomic operation under the tree's file lock:
/// acquire the lock (exclusive for mutations, shared for reads), fence
/// against concurrent recovery via the atomic-operations manager's read
/// lock, begin the operation, run the body, commit on success or roll
/// back on error, release everything on every exit path.
pub(crate) fn run_atomic<T>(
    lock_mgr: &FileLockManager,
    atomic_mgr: &dyn AtomicOperationsManager,
    bpm: &dyn BufferPoolManager,
    wal: &dyn WriteAheadLog,
    file_id: page_store::FileId,
    exclusive: bool,
    rollback_on_exception: bool,
    component: &str,
    body: impl FnOnce(&mut AtomicOperation) -> IndexResult<T>,
) -> IndexResult<T> {
    let _file_guard = if exclusive {
        FileGuard::Exclusive(lock_mgr.acquire_exclusive(file_id))
    } else {
        FileGuard::Shared(lock_mgr.acquire_shared(file_id))
    };

    atomic_mgr.acquire_read_lock(component);
    let mut op = atomic_mgr.start(rollback_on_exception);
    let result = body(&mut op);
    match result {
        Ok(value) => {
            atomic_mgr.end(op, false, bpm, wal);
            atomic_mgr.release_read_lock(component);
            Ok(value)
        }
        Err(e) => {
            atomic_mgr.end(op, true, bpm, wal);
            atomic_mgr.release_read_lock(component);
            Err(e)
        }
    }
}
