//! The atomic-operations manager contract and a simple in-process
//! implementation.
//!
//! The *manager* itself (journal coordination, group commit, recovery) is
//! an external collaborator out of scope for this crate. What is in scope
//! is the durability adapter's use of it: begin an operation, accumulate
//! page operations as bucket mutations happen, and on failure undo them in
//! reverse order before re-raising.

use crate::api::{BufferPoolManager, PageId};
use crate::wal::{ComponentOperation, PageOperation, WriteAheadLog};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use log::warn;

pub type AtomicOperationId = u64;

/// One in-flight atomic operation: the undo log accumulated so far, plus
/// whether a thrown error should trigger rollback (true for put/remove/
/// clear; false for create/delete, which have nothing to undo).
pub struct AtomicOperation {
    pub id: AtomicOperationId,
    pub rollback_on_exception: bool,
    page_ops: Vec<PageOperation>,
    component_ops: Vec<ComponentOperation>,
}

impl AtomicOperation {
    /// Appends a page-level mutation record to this operation's undo log.
    /// Called by the bucket layer immediately before it mutates bytes.
    pub fn record_page_operation(&mut self, op: PageOperation) {
        self.page_ops.push(op);
    }

    /// Appends the tree-level record describing this whole call.
    pub fn record_component_operation(&mut self, op: ComponentOperation) {
        self.component_ops.push(op);
    }
}

/// The atomic-operations manager contract used by the durability adapter.
pub trait AtomicOperationsManager: Send + Sync {
    /// Begins a new atomic operation.
    fn start(&self, rollback_on_exception: bool) -> AtomicOperation;

    /// Ends `op`. If `rollback` is true, every recorded page operation is
    /// undone in reverse order by writing its `before_image` back; neither
    /// the page operations nor component operations are forwarded to the
    /// WAL. If `rollback` is false, both logs are appended to the WAL in
    /// the order they were recorded, then the operation is committed.
    fn end(&self, op: AtomicOperation, rollback: bool, bpm: &dyn BufferPoolManager, wal: &dyn WriteAheadLog);

    fn acquire_read_lock(&self, component: &str);
    fn release_read_lock(&self, component: &str);
}

/// A straightforward in-process [`AtomicOperationsManager`]. Read-lock
/// bookkeeping is a counter per component name; it exists so callers can
/// fence against concurrent recovery, even though this crate has no
/// recovery subsystem of its own to fence against.
pub struct SimpleAtomicOperationsManager {
    next_id: AtomicU64,
    read_locks: Mutex<std::collections::HashMap<String, usize>>,
}

impl Default for SimpleAtomicOperationsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleAtomicOperationsManager {
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1), read_locks: Mutex::new(std::collections::HashMap::new()) }
    }
}

impl AtomicOperationsManager for SimpleAtomicOperationsManager {
    fn start(&self, rollback_on_exception: bool) -> AtomicOperation {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        AtomicOperation { id, rollback_on_exception, page_ops: Vec::new(), component_ops: Vec::new() }
    }

    fn end(&self, op: AtomicOperation, rollback: bool, bpm: &dyn BufferPoolManager, wal: &dyn WriteAheadLog) {
        if rollback {
            warn!("rolling back atomic operation {} ({} page op(s))", op.id, op.page_ops.len());
            for page_op in op.page_ops.into_iter().rev() {
                undo_page_operation(bpm, &page_op);
            }
            return;
        }

        for page_op in &op.page_ops {
            wal.append_page_operation(page_op);
        }
        for component_op in &op.component_ops {
            wal.append_component_operation(component_op);
        }
    }

    fn acquire_read_lock(&self, component: &str) {
        let mut locks = self.read_locks.lock().unwrap();
        *locks.entry(component.to_string()).or_insert(0) += 1;
    }

    fn release_read_lock(&self, component: &str) {
        let mut locks = self.read_locks.lock().unwrap();
        if let Some(count) = locks.get_mut(component) {
            if *count > 0 {
                *count -= 1;
            }
        }
    }
}

fn undo_page_operation(bpm: &dyn BufferPoolManager, page_op: &PageOperation) {
    let page_id: PageId = page_op.page_id;
    let mut guard = match bpm.load_for_write(page_id) {
        Ok(g) => g,
        Err(_) => return,
    };
    let start = page_op.region_offset;
    let end = start + page_op.before_image.len();
    guard[start..end].copy_from_slice(&page_op.before_image);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::SimpleBufferPoolManager;
    use crate::disk_manager::DiskManager;
    use crate::wal::{InMemoryWal, PageOperationKind};
    use std::sync::Arc;

    #[test]
    fn rollback_restores_before_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atomic.db");
        let dm = Arc::new(DiskManager::new(path.to_str().unwrap()).unwrap());
        let bpm = SimpleBufferPoolManager::new(4, dm);
        let wal = InMemoryWal::new();
        let mgr = SimpleAtomicOperationsManager::new();

        let page_id = {
            let mut g = bpm.new_page().unwrap();
            g[0..4].copy_from_slice(&1u32.to_le_bytes());
            g.page_id()
        };

        let mut op = mgr.start(true);
        {
            let mut g = bpm.load_for_write(page_id).unwrap();
            op.record_page_operation(PageOperation {
                page_id,
                region_offset: 0,
                kind: PageOperationKind::UpdateValue { index: 0 },
                before_image: g[0..4].to_vec(),
            });
            g[0..4].copy_from_slice(&2u32.to_le_bytes());
        }

        mgr.end(op, true, &bpm, &wal);

        let g = bpm.load_for_read(page_id).unwrap();
        assert_eq!(&g[0..4], &1u32.to_le_bytes());
        assert_eq!(wal.page_operation_count(), 0);
    }

    #[test]
    fn commit_forwards_records_to_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atomic2.db");
        let dm = Arc::new(DiskManager::new(path.to_str().unwrap()).unwrap());
        let bpm = SimpleBufferPoolManager::new(4, dm);
        let wal = InMemoryWal::new();
        let mgr = SimpleAtomicOperationsManager::new();

        let page_id = bpm.new_page().unwrap().page_id();
        let mut op = mgr.start(true);
        op.record_page_operation(PageOperation {
            page_id,
            region_offset: 0,
            kind: PageOperationKind::AddEntry { index: 0 },
            before_image: vec![0; 4],
        });

        mgr.end(op, false, &bpm, &wal);
        assert_eq!(wal.page_operation_count(), 1);
    }
}
