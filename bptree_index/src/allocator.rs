//! Bonsai sub-page allocator.
//!
//! Hands out fixed-size bucket regions within pages, backed by a
//! process-wide page cache it never owns: every region it touches is
//! snapshotted as a whole page before mutation so the durability adapter
//! can undo the allocation on rollback, the same as any other bucket
//! mutation.

use crate::bucket::bonsai::{BonsaiBucket, BonsaiEntry};
use crate::error::IndexResult;
use crate::key::KeyType;
use crate::pointer::BonsaiPointer;
use page_store::api::{BufferPoolManager, PageId, PageGuard, PAGE_SIZE};
use page_store::atomic::AtomicOperation;
use page_store::wal::{PageOperation, PageOperationKind};
use log::{debug, trace};

pub struct BonsaiAllocator {
    bucket_size: usize,
    binary_version: i32,
}

impl BonsaiAllocator {
    pub fn new(bucket_size: usize, binary_version: i32) -> Self {
        Self { bucket_size, binary_version }
    }

    /// The free-space high-water pointer starts "exhausted" so that the
    /// very first `allocate()` call takes the new-page branch uniformly,
    /// rather than special-casing page creation at construction time.
    pub fn exhausted_free_space_pointer(&self) -> BonsaiPointer {
        BonsaiPointer { page_index: -1, page_offset: PAGE_SIZE as i32, binary_version: self.binary_version }
    }

    fn log_whole_page(op: &mut AtomicOperation, page_id: PageId, before_image: Vec<u8>, kind: PageOperationKind) {
        op.record_page_operation(PageOperation { page_id, region_offset: 0, kind, before_image });
    }

    /// Pops the free list if non-empty, else bumps the high-water pointer
    /// within the current page, else grows a new page.
    pub fn allocate(
        &self,
        bpm: &dyn BufferPoolManager,
        op: &mut AtomicOperation,
        free_list_head: BonsaiPointer,
        free_list_length: i32,
        free_space_pointer: BonsaiPointer,
    ) -> IndexResult<(BonsaiPointer, BonsaiPointer, i32, BonsaiPointer)> {
        // Returns (allocated_pointer, new_free_list_head, new_free_list_length, new_free_space_pointer).
        if free_list_length > 0 && !free_list_head.is_null() {
            let mut guard = bpm.load_for_write(free_list_head.page_index)?;
            let before = guard.to_vec();
            let region_start = free_list_head.page_offset as usize;
            let region_end = region_start + self.bucket_size;
            let next_head = {
                let bucket = BonsaiBucket::new(&mut guard[region_start..region_end], KeyType::Integer, 1, self.binary_version);
                bucket.free_list_pointer()
            };
            Self::log_whole_page(op, free_list_head.page_index, before, PageOperationKind::SetFreeListPointer);
            trace!("allocator popped free-list page={} offset={}", free_list_head.page_index, free_list_head.page_offset);
            return Ok((free_list_head, next_head, free_list_length - 1, free_space_pointer));
        }

        if free_space_pointer.page_index >= 0
            && free_space_pointer.page_offset as usize + self.bucket_size <= PAGE_SIZE
        {
            let advanced = BonsaiPointer {
                page_index: free_space_pointer.page_index,
                page_offset: free_space_pointer.page_offset + self.bucket_size as i32,
                binary_version: self.binary_version,
            };
            return Ok((free_space_pointer, free_list_head, free_list_length, advanced));
        }

        let new_page_id = bpm.new_page()?.page_id();
        trace!("allocator grew a new page={}", new_page_id);
        let allocated = BonsaiPointer { page_index: new_page_id, page_offset: 0, binary_version: self.binary_version };
        let advanced =
            BonsaiPointer { page_index: new_page_id, page_offset: self.bucket_size as i32, binary_version: self.binary_version };
        Ok((allocated, free_list_head, free_list_length, advanced))
    }

    /// BFS-marks every bucket reachable from `roots` as DELETED, threads
    /// them onto a new free list in reverse BFS order, then splices that
    /// list onto the existing free list.
    pub fn recycle_subtrees(
        &self,
        bpm: &dyn BufferPoolManager,
        op: &mut AtomicOperation,
        roots: &[BonsaiPointer],
        key_type: &KeyType,
        value_len: usize,
        existing_free_list_head: BonsaiPointer,
    ) -> IndexResult<(BonsaiPointer, i32)> {
        let mut queue: Vec<BonsaiPointer> = roots.to_vec();
        let mut visited: Vec<BonsaiPointer> = Vec::new();
        let mut cursor = 0;
        while cursor < queue.len() {
            let ptr = queue[cursor];
            cursor += 1;
            if ptr.is_null() || ptr.is_system() {
                continue;
            }
            let mut guard = bpm.load_for_write(ptr.page_index)?;
            let region_start = ptr.page_offset as usize;
            let region_end = region_start + self.bucket_size;
            let children: Vec<BonsaiPointer> = {
                let bucket =
                    BonsaiBucket::new(&mut guard[region_start..region_end], key_type.clone(), value_len, self.binary_version);
                if bucket.is_leaf() {
                    Vec::new()
                } else {
                    let mut kids = Vec::with_capacity(bucket.size() + 1);
                    for i in 0..bucket.size() {
                        if let BonsaiEntry::Internal { left, right, .. } = bucket.get_entry(i) {
                            if i == 0 {
                                kids.push(left);
                            }
                            kids.push(right);
                        }
                    }
                    kids
                }
            };
            queue.extend(children);
            visited.push(ptr);
        }

        let mut head = existing_free_list_head;
        for ptr in visited.iter().rev() {
            let mut guard = bpm.load_for_write(ptr.page_index)?;
            let before = guard.to_vec();
            let region_start = ptr.page_offset as usize;
            let region_end = region_start + self.bucket_size;
            {
                let mut bucket =
                    BonsaiBucket::new(&mut guard[region_start..region_end], key_type.clone(), value_len, self.binary_version);
                bucket.set_deleted();
                bucket.set_free_list_pointer(head);
            }
            Self::log_whole_page(op, ptr.page_index, before, PageOperationKind::SetDeleted);
            head = *ptr;
        }

        debug!("recycled {} bonsai bucket(s) from {} root(s)", visited.len(), roots.len());
        Ok((head, visited.len() as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use page_store::buffer_pool::SimpleBufferPoolManager;
    use page_store::disk_manager::DiskManager;
    use page_store::atomic::SimpleAtomicOperationsManager;
    use page_store::atomic::AtomicOperationsManager as _;
    use std::sync::Arc;

    fn setup() -> (SimpleBufferPoolManager, SimpleAtomicOperationsManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alloc.db");
        let dm = Arc::new(DiskManager::new(path.to_str().unwrap()).unwrap());
        let bpm = SimpleBufferPoolManager::new(8, dm);
        let mgr = SimpleAtomicOperationsManager::new();
        (bpm, mgr, dir)
    }

    #[test]
    fn first_allocation_creates_a_new_page() {
        let (bpm, mgr, _dir) = setup();
        let allocator = BonsaiAllocator::new(256, 1);
        let mut op = mgr.start(false);
        let (ptr, head, len, advanced) = allocator
            .allocate(&bpm, &mut op, BonsaiPointer::null(1), 0, allocator.exhausted_free_space_pointer())
            .unwrap();
        assert_eq!(ptr.page_offset, 0);
        assert!(head.is_null());
        assert_eq!(len, 0);
        assert_eq!(advanced.page_index, ptr.page_index);
        assert_eq!(advanced.page_offset, 256);
    }

    #[test]
    fn second_allocation_reuses_the_same_page_until_full() {
        let (bpm, mgr, _dir) = setup();
        let allocator = BonsaiAllocator::new(256, 1);
        let mut op = mgr.start(false);
        let (first, head, len, advanced) = allocator
            .allocate(&bpm, &mut op, BonsaiPointer::null(1), 0, allocator.exhausted_free_space_pointer())
            .unwrap();
        let (second, _, _, advanced2) = allocator.allocate(&bpm, &mut op, head, len, advanced).unwrap();
        assert_eq!(second.page_index, first.page_index);
        assert_eq!(second.page_offset, 256);
        assert_eq!(advanced2.page_offset, 512);
    }

    #[test]
    fn recycle_marks_deleted_and_builds_free_list() {
        let (bpm, mgr, _dir) = setup();
        let allocator = BonsaiAllocator::new(256, 1);
        let mut op = mgr.start(false);
        let (leaf_ptr, _, _, _) = allocator
            .allocate(&bpm, &mut op, BonsaiPointer::null(1), 0, allocator.exhausted_free_space_pointer())
            .unwrap();
        {
            let mut guard = bpm.load_for_write(leaf_ptr.page_index).unwrap();
            let region_start = leaf_ptr.page_offset as usize;
            BonsaiBucket::init(&mut guard[region_start..region_start + 256], true, 1);
        }

        let (new_head, count) =
            allocator.recycle_subtrees(&bpm, &mut op, &[leaf_ptr], &KeyType::Integer, 8, BonsaiPointer::null(1)).unwrap();
        assert_eq!(count, 1);
        assert_eq!(new_head, leaf_ptr);

        let guard = bpm.load_for_read(leaf_ptr.page_index).unwrap();
        let region_start = leaf_ptr.page_offset as usize;
        let mut region_copy = guard[region_start..region_start + 256].to_vec();
        let bucket = BonsaiBucket::new(&mut region_copy, KeyType::Integer, 8, 1);
        assert!(bucket.is_deleted());
    }
}
