//! Process-wide, file-partitioned lock manager.
//!
//! One tree operation = one acquire/release against its file's lock. Reads
//! take the shared mode; mutations take the exclusive mode for the whole
//! operation (no hand-over-hand latching within a tree).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use log::trace;

/// Identifies which file's lock partition to use. In this crate a "file"
/// is one open tree instance's backing store.
pub type FileId = u64;

/// Guard held while a caller has the shared (read) lock for a file.
///
/// Owns the `Arc` backing the partition's lock so the lock stays alive for
/// as long as the guard does; the inner `RwLockReadGuard`'s lifetime is
/// transmuted to `'static` and is only ever used while `_owner` (declared
/// after it, and so dropped after it — Rust drops struct fields in
/// declaration order) keeps the lock allocation alive.
pub struct ReadLockGuard {
    _inner: RwLockReadGuard<'static, ()>,
    _owner: Arc<RwLock<()>>,
}

/// Guard held while a caller has the exclusive (write) lock for a file.
/// See [`ReadLockGuard`] for why this holds its own `Arc`.
pub struct WriteLockGuard {
    _inner: RwLockWriteGuard<'static, ()>,
    _owner: Arc<RwLock<()>>,
}

/// Hands out per-file `RwLock`s on demand, partitioning contention by file
/// so two unrelated trees never block each other.
pub struct FileLockManager {
    partitions: Mutex<HashMap<FileId, Arc<RwLock<()>>>>,
}

impl Default for FileLockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FileLockManager {
    pub fn new() -> Self {
        Self { partitions: Mutex::new(HashMap::new()) }
    }

    fn partition(&self, file_id: FileId) -> Arc<RwLock<()>> {
        let mut partitions = self.partitions.lock().unwrap();
        partitions.entry(file_id).or_insert_with(|| Arc::new(RwLock::new(()))).clone()
    }

    /// Acquires the shared lock for `file_id`. Blocks while the file is
    /// held exclusively.
    pub fn acquire_shared(&self, file_id: FileId) -> ReadLockGuard {
        trace!("acquiring shared lock for file {}", file_id);
        let owner = self.partition(file_id);
        let inner: RwLockReadGuard<'static, ()> =
            unsafe { std::mem::transmute(owner.read().unwrap()) };
        ReadLockGuard { _inner: inner, _owner: owner }
    }

    /// Acquires the exclusive lock for `file_id`. Blocks until no readers
    /// or other writers hold it.
    pub fn acquire_exclusive(&self, file_id: FileId) -> WriteLockGuard {
        trace!("acquiring exclusive lock for file {}", file_id);
        let owner = self.partition(file_id);
        let inner: RwLockWriteGuard<'static, ()> =
            unsafe { std::mem::transmute(owner.write().unwrap()) };
        WriteLockGuard { _inner: inner, _owner: owner }
    }
}
