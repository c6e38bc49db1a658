//! Bonsai (sub-page, many-buckets-per-page) B+-tree engine.
//!
//! Mirrors [`crate::tree::standard::StandardBPlusTree`] operation-by-operation;
//! the differences are entirely in how bucket storage is obtained
//! (`BonsaiAllocator`/`SystemBucket` instead of `bpm.new_page()` directly)
//! and in the pointer shape (`BonsaiPointer` triples instead of a bare page
//! index).

use crate::allocator::BonsaiAllocator;
use crate::bucket::bonsai::{BonsaiBucket, BonsaiEntry};
use crate::bucket::raw::decode_find_result;
use crate::config::BTreeConfig;
use crate::error::{IndexError, IndexResult};
use crate::key::{IndexKey, KeyType};
use crate::pointer::BonsaiPointer;
use crate::system_bucket::{SystemBucket, SYSTEM_BUCKET_PAGE};
use crate::tree::run_atomic;
use page_store::atomic::{AtomicOperation, AtomicOperationsManager};
use page_store::lock_manager::FileLockManager;
use page_store::wal::{ComponentOperation, ComponentOperationKind, PageOperation, PageOperationKind, WriteAheadLog};
use page_store::{BufferPoolManager, FileId};
use std::cmp::Ordering;
use std::sync::Arc;
use log::{debug, trace};

const COMPONENT: &str = "bonsai_bptree";

#[derive(Debug, Clone)]
pub struct BucketSearchResult {
    pub item_index: i64,
    pub path: Vec<BonsaiPointer>,
}

pub struct BonsaiBPlusTree {
    bpm: Arc<dyn BufferPoolManager>,
    atomic_mgr: Arc<dyn AtomicOperationsManager>,
    wal: Arc<dyn WriteAheadLog>,
    lock_mgr: Arc<FileLockManager>,
    file_id: FileId,
    root: BonsaiPointer,
    key_type: KeyType,
    value_len: usize,
    bucket_size: usize,
    binary_version: i32,
}

impl BonsaiBPlusTree {
    /// `create`: initializes the system bucket on page 0, allocates the
    /// root bucket region, and writes it as an empty leaf — all inside the
    /// one atomic operation that also logs the `Create` component record,
    /// so every page it touches is covered by a `PageOperation` the same
    /// way `put_inner`/`remove_inner` cover theirs.
    pub fn create(
        bpm: Arc<dyn BufferPoolManager>,
        atomic_mgr: Arc<dyn AtomicOperationsManager>,
        wal: Arc<dyn WriteAheadLog>,
        lock_mgr: Arc<FileLockManager>,
        file_id: FileId,
        key_type: KeyType,
        value_len: usize,
        config: BTreeConfig,
        binary_version: i32,
    ) -> IndexResult<Self> {
        let config = config.normalized();
        let bucket_size = config.sbtree_bonsai_bucket_size;
        let allocator = BonsaiAllocator::new(bucket_size, binary_version);
        let root = run_atomic(
            &lock_mgr,
            atomic_mgr.as_ref(),
            bpm.as_ref(),
            wal.as_ref(),
            file_id,
            true,
            false,
            COMPONENT,
            |op| {
                let mut sys_guard = bpm.new_page()?;
                assert_eq!(sys_guard.page_id(), SYSTEM_BUCKET_PAGE, "system bucket must be the first page");
                let sys_before = sys_guard.to_vec();
                SystemBucket::init(&mut sys_guard[..], binary_version);
                {
                    let mut sys_bucket = SystemBucket::new(&mut sys_guard[..]);
                    sys_bucket.set_free_space_pointer(allocator.exhausted_free_space_pointer());
                }
                let (head, len, fsp) = {
                    let sys_bucket = SystemBucket::new(&mut sys_guard[..]);
                    (sys_bucket.free_list_head(), sys_bucket.free_list_length(), sys_bucket.free_space_pointer())
                };
                let (root_ptr, new_head, new_len, new_fsp) = allocator.allocate(bpm.as_ref(), op, head, len, fsp)?;
                {
                    let mut sys_bucket = SystemBucket::new(&mut sys_guard[..]);
                    sys_bucket.set_free_list_head(new_head);
                    sys_bucket.set_free_list_length(new_len);
                    sys_bucket.set_free_space_pointer(new_fsp);
                }
                op.record_page_operation(PageOperation {
                    page_id: SYSTEM_BUCKET_PAGE,
                    region_offset: 0,
                    kind: PageOperationKind::SetFreeListPointer,
                    before_image: sys_before,
                });
                drop(sys_guard);

                let (page_id, start, end) = Self::region_span(root_ptr, bucket_size);
                let mut root_guard = bpm.load_for_write(page_id)?;
                let root_before = root_guard.to_vec();
                BonsaiBucket::init(&mut root_guard[start..end], true, binary_version);
                op.record_page_operation(PageOperation {
                    page_id,
                    region_offset: 0,
                    kind: PageOperationKind::AddAll,
                    before_image: root_before,
                });
                drop(root_guard);

                op.record_component_operation(ComponentOperation {
                    kind: ComponentOperationKind::Create,
                    raw_key: Vec::new(),
                    raw_new_value: None,
                    raw_previous_value: None,
                });
                Ok(root_ptr)
            },
        )?;

        Ok(Self { bpm, atomic_mgr, wal, lock_mgr, file_id, root, key_type, value_len, bucket_size, binary_version })
    }

    pub fn load(
        bpm: Arc<dyn BufferPoolManager>,
        atomic_mgr: Arc<dyn AtomicOperationsManager>,
        wal: Arc<dyn WriteAheadLog>,
        lock_mgr: Arc<FileLockManager>,
        file_id: FileId,
        root: BonsaiPointer,
        key_type: KeyType,
        value_len: usize,
        config: BTreeConfig,
        binary_version: i32,
    ) -> Self {
        let bucket_size = config.normalized().sbtree_bonsai_bucket_size;
        Self { bpm, atomic_mgr, wal, lock_mgr, file_id, root, key_type, value_len, bucket_size, binary_version }
    }

    pub fn root(&self) -> BonsaiPointer {
        self.root
    }

    fn allocator(&self) -> BonsaiAllocator {
        BonsaiAllocator::new(self.bucket_size, self.binary_version)
    }

    fn region_span(ptr: BonsaiPointer, bucket_size: usize) -> (page_store::PageId, usize, usize) {
        let start = ptr.page_offset as usize;
        (ptr.page_index, start, start + bucket_size)
    }

    fn load_bucket_bytes(&self, ptr: BonsaiPointer) -> IndexResult<Vec<u8>> {
        let (page_id, start, end) = Self::region_span(ptr, self.bucket_size);
        let guard = self.bpm.load_for_read(page_id)?;
        Ok(guard[start..end].to_vec())
    }

    fn find_bucket(&self, key: &IndexKey) -> IndexResult<BucketSearchResult> {
        let mut path = vec![self.root];
        let mut current = self.root;
        loop {
            let mut bytes = self.load_bucket_bytes(current)?;
            let bucket = BonsaiBucket::new(&mut bytes, self.key_type.clone(), self.value_len, self.binary_version);
            if bucket.is_leaf() {
                return Ok(BucketSearchResult { item_index: bucket.find(key), path });
            }
            let size = bucket.size();
            let next = match decode_find_result(bucket.find(key)) {
                Ok(i) => match bucket.get_entry(i) {
                    BonsaiEntry::Internal { right, .. } => right,
                    BonsaiEntry::Leaf { .. } => unreachable!(),
                },
                Err(insertion_point) if insertion_point >= size => match bucket.get_entry(size - 1) {
                    BonsaiEntry::Internal { right, .. } => right,
                    BonsaiEntry::Leaf { .. } => unreachable!(),
                },
                Err(insertion_point) => match bucket.get_entry(insertion_point) {
                    BonsaiEntry::Internal { left, .. } => left,
                    BonsaiEntry::Leaf { .. } => unreachable!(),
                },
            };
            current = next;
            path.push(current);
        }
    }

    pub fn get(&self, key: &IndexKey) -> IndexResult<Option<Vec<u8>>> {
        run_atomic(
            &self.lock_mgr,
            self.atomic_mgr.as_ref(),
            self.bpm.as_ref(),
            self.wal.as_ref(),
            self.file_id,
            false,
            false,
            COMPONENT,
            |_op| {
                let result = self.find_bucket(key)?;
                match decode_find_result(result.item_index) {
                    Err(_) => Ok(None),
                    Ok(i) => {
                        let leaf = *result.path.last().unwrap();
                        let mut bytes = self.load_bucket_bytes(leaf)?;
                        let bucket = BonsaiBucket::new(&mut bytes, self.key_type.clone(), self.value_len, self.binary_version);
                        Ok(Some(bucket.get_raw_value(i)))
                    }
                }
            },
        )
    }

    /// Allocates a new sub-page bucket region via the system bucket's
    /// free-list/high-water state, logging the system-bucket page mutation.
    fn allocate_bucket(&self, op: &mut AtomicOperation, is_leaf: bool) -> IndexResult<BonsaiPointer> {
        let mut sys_guard = self.bpm.load_for_write(SYSTEM_BUCKET_PAGE)?;
        let before = sys_guard.to_vec();
        let (head, len, fsp) = {
            let sys_bucket = SystemBucket::new(&mut sys_guard[..]);
            (sys_bucket.free_list_head(), sys_bucket.free_list_length(), sys_bucket.free_space_pointer())
        };
        let (allocated, new_head, new_len, new_fsp) = self.allocator().allocate(self.bpm.as_ref(), op, head, len, fsp)?;
        {
            let mut sys_bucket = SystemBucket::new(&mut sys_guard[..]);
            sys_bucket.set_free_list_head(new_head);
            sys_bucket.set_free_list_length(new_len);
            sys_bucket.set_free_space_pointer(new_fsp);
        }
        op.record_page_operation(PageOperation {
            page_id: SYSTEM_BUCKET_PAGE,
            region_offset: 0,
            kind: PageOperationKind::SetFreeListPointer,
            before_image: before,
        });
        drop(sys_guard);

        let (page_id, start, end) = Self::region_span(allocated, self.bucket_size);
        let mut guard = self.bpm.load_for_write(page_id)?;
        BonsaiBucket::init(&mut guard[start..end], is_leaf, self.binary_version);
        Ok(allocated)
    }

    fn bump_tree_size(&self, op: &mut AtomicOperation, delta: i64) -> IndexResult<()> {
        let (page_id, start, end) = Self::region_span(self.root, self.bucket_size);
        let mut guard = self.bpm.load_for_write(page_id)?;
        let before = guard.to_vec();
        {
            let mut bucket = BonsaiBucket::new(&mut guard[start..end], self.key_type.clone(), self.value_len, self.binary_version);
            let new_size = bucket.tree_size() + delta;
            bucket.set_tree_size(new_size);
        }
        op.record_page_operation(PageOperation { page_id, region_offset: 0, kind: PageOperationKind::SetTreeSize, before_image: before });
        Ok(())
    }

    pub fn put(&self, key: &IndexKey, raw_value: &[u8]) -> IndexResult<()> {
        let mut raw_key = Vec::new();
        key.serialize(&mut raw_key);
        run_atomic(
            &self.lock_mgr,
            self.atomic_mgr.as_ref(),
            self.bpm.as_ref(),
            self.wal.as_ref(),
            self.file_id,
            true,
            true,
            COMPONENT,
            |op| self.put_inner(op, key, &raw_key, raw_value),
        )
    }

    fn put_inner(&self, op: &mut AtomicOperation, key: &IndexKey, raw_key: &[u8], raw_value: &[u8]) -> IndexResult<()> {
        let mut result = self.find_bucket(key)?;
        match decode_find_result(result.item_index) {
            Ok(i) => {
                let leaf = *result.path.last().unwrap();
                let (page_id, start, end) = Self::region_span(leaf, self.bucket_size);
                let mut guard = self.bpm.load_for_write(page_id)?;
                let before = guard.to_vec();
                let prev_raw_value = {
                    let mut bucket = BonsaiBucket::new(&mut guard[start..end], self.key_type.clone(), self.value_len, self.binary_version);
                    bucket.update_value(i, raw_value)
                };
                op.record_page_operation(PageOperation {
                    page_id,
                    region_offset: 0,
                    kind: PageOperationKind::UpdateValue { index: i },
                    before_image: before,
                });
                op.record_component_operation(ComponentOperation {
                    kind: ComponentOperationKind::Put,
                    raw_key: raw_key.to_vec(),
                    raw_new_value: Some(raw_value.to_vec()),
                    raw_previous_value: Some(prev_raw_value),
                });
                Ok(())
            }
            Err(mut insertion_index) => {
                loop {
                    let leaf = *result.path.last().unwrap();
                    let (page_id, start, end) = Self::region_span(leaf, self.bucket_size);
                    let mut guard = self.bpm.load_for_write(page_id)?;
                    let before = guard.to_vec();
                    let inserted = {
                        let mut bucket =
                            BonsaiBucket::new(&mut guard[start..end], self.key_type.clone(), self.value_len, self.binary_version);
                        bucket.add_leaf_entry(insertion_index, raw_key, raw_value)?
                    };
                    if inserted {
                        op.record_page_operation(PageOperation {
                            page_id,
                            region_offset: 0,
                            kind: PageOperationKind::AddEntry { index: insertion_index },
                            before_image: before,
                        });
                        break;
                    }
                    drop(guard);
                    let split_result = self.split_bucket(op, &result.path, insertion_index, key)?;
                    insertion_index = split_result.item_index as usize;
                    result = split_result;
                }
                self.bump_tree_size(op, 1)?;
                op.record_component_operation(ComponentOperation {
                    kind: ComponentOperationKind::Put,
                    raw_key: raw_key.to_vec(),
                    raw_new_value: Some(raw_value.to_vec()),
                    raw_previous_value: None,
                });
                Ok(())
            }
        }
    }

    fn split_bucket(
        &self,
        op: &mut AtomicOperation,
        path: &[BonsaiPointer],
        key_index: usize,
        key_to_insert: &IndexKey,
    ) -> IndexResult<BucketSearchResult> {
        let bucket_ptr = *path.last().unwrap();
        let is_root = path.len() == 1;
        trace!("splitting bonsai bucket page={} offset={} is_root={}", bucket_ptr.page_index, bucket_ptr.page_offset, is_root);
        let (page_id, start, end) = Self::region_span(bucket_ptr, self.bucket_size);

        let mut guard = self.bpm.load_for_write(page_id)?;
        let before = guard.to_vec();
        let (is_leaf, bucket_size, index_to_split, separation_key, right_start, right_entries, old_right_sibling, preserved_tree_size) = {
            let bucket = BonsaiBucket::new(&mut guard[start..end], self.key_type.clone(), self.value_len, self.binary_version);
            let bucket_size = bucket.size();
            let index_to_split = bucket_size >> 1;
            let separation_key = bucket.get_key(index_to_split);
            let is_leaf = bucket.is_leaf();
            let right_start = if is_leaf { index_to_split } else { index_to_split + 1 };
            let right_entries: Vec<BonsaiEntry> = (right_start..bucket_size).map(|i| bucket.get_entry(i)).collect();
            let old_right_sibling = if is_leaf { bucket.right_sibling() } else { BonsaiPointer::null(self.binary_version) };
            let preserved_tree_size = bucket.tree_size();
            (is_leaf, bucket_size, index_to_split, separation_key, right_start, right_entries, old_right_sibling, preserved_tree_size)
        };

        let dest = if is_root {
            let left_entries: Vec<BonsaiEntry> = {
                let bucket = BonsaiBucket::new(&mut guard[start..end], self.key_type.clone(), self.value_len, self.binary_version);
                (0..index_to_split).map(|i| bucket.get_entry(i)).collect()
            };
            drop(guard);

            let left_ptr = self.allocate_bucket(op, is_leaf)?;
            {
                let (lp, ls, le) = Self::region_span(left_ptr, self.bucket_size);
                let mut left_guard = self.bpm.load_for_write(lp)?;
                let mut left_bucket =
                    BonsaiBucket::new(&mut left_guard[ls..le], self.key_type.clone(), self.value_len, self.binary_version);
                left_bucket.add_all(&left_entries)?;
            }
            let right_ptr = self.allocate_bucket(op, is_leaf)?;
            {
                let (rp, rs, re) = Self::region_span(right_ptr, self.bucket_size);
                let mut right_guard = self.bpm.load_for_write(rp)?;
                let mut right_bucket =
                    BonsaiBucket::new(&mut right_guard[rs..re], self.key_type.clone(), self.value_len, self.binary_version);
                right_bucket.add_all(&right_entries)?;
            }
            if is_leaf {
                let (lp, ls, le) = Self::region_span(left_ptr, self.bucket_size);
                let mut left_guard = self.bpm.load_for_write(lp)?;
                let mut left_bucket =
                    BonsaiBucket::new(&mut left_guard[ls..le], self.key_type.clone(), self.value_len, self.binary_version);
                left_bucket.set_right_sibling(right_ptr);
                drop(left_guard);
                let (rp, rs, re) = Self::region_span(right_ptr, self.bucket_size);
                let mut right_guard = self.bpm.load_for_write(rp)?;
                let mut right_bucket =
                    BonsaiBucket::new(&mut right_guard[rs..re], self.key_type.clone(), self.value_len, self.binary_version);
                right_bucket.set_left_sibling(left_ptr);
            }

            let mut root_guard = self.bpm.load_for_write(page_id)?;
            BonsaiBucket::init(&mut root_guard[start..end], false, self.binary_version);
            let mut root_bucket =
                BonsaiBucket::new(&mut root_guard[start..end], self.key_type.clone(), self.value_len, self.binary_version);
            root_bucket.set_tree_size(preserved_tree_size);
            let mut sep_raw_key = Vec::new();
            separation_key.serialize(&mut sep_raw_key);
            root_bucket.add_entry(0, &BonsaiEntry::Internal { left: left_ptr, right: right_ptr, raw_key: sep_raw_key }, false)?;

            (left_ptr, right_ptr)
        } else {
            {
                let mut bucket = BonsaiBucket::new(&mut guard[start..end], self.key_type.clone(), self.value_len, self.binary_version);
                bucket.shrink(index_to_split);
            }
            drop(guard);

            let right_ptr = self.allocate_bucket(op, is_leaf)?;
            {
                let (rp, rs, re) = Self::region_span(right_ptr, self.bucket_size);
                let mut right_guard = self.bpm.load_for_write(rp)?;
                let mut right_bucket =
                    BonsaiBucket::new(&mut right_guard[rs..re], self.key_type.clone(), self.value_len, self.binary_version);
                right_bucket.add_all(&right_entries)?;
            }

            if is_leaf {
                {
                    let (rp, rs, re) = Self::region_span(right_ptr, self.bucket_size);
                    let mut right_guard = self.bpm.load_for_write(rp)?;
                    let mut right_bucket =
                        BonsaiBucket::new(&mut right_guard[rs..re], self.key_type.clone(), self.value_len, self.binary_version);
                    right_bucket.set_left_sibling(bucket_ptr);
                    right_bucket.set_right_sibling(old_right_sibling);
                }
                if !old_right_sibling.is_null() {
                    let (op2, os, oe) = Self::region_span(old_right_sibling, self.bucket_size);
                    let mut old_right_guard = self.bpm.load_for_write(op2)?;
                    let mut old_right_bucket =
                        BonsaiBucket::new(&mut old_right_guard[os..oe], self.key_type.clone(), self.value_len, self.binary_version);
                    old_right_bucket.set_left_sibling(right_ptr);
                }
                let mut guard2 = self.bpm.load_for_write(page_id)?;
                let mut bucket = BonsaiBucket::new(&mut guard2[start..end], self.key_type.clone(), self.value_len, self.binary_version);
                bucket.set_right_sibling(right_ptr);
            }

            self.insert_into_parent(op, &path[..path.len() - 1], &separation_key, bucket_ptr, right_ptr)?;

            (bucket_ptr, right_ptr)
        };

        if is_root {
            op.record_page_operation(PageOperation { page_id, region_offset: 0, kind: PageOperationKind::AddAll, before_image: before });
        } else {
            op.record_page_operation(PageOperation {
                page_id,
                region_offset: 0,
                kind: PageOperationKind::Shrink { new_size: index_to_split },
                before_image: before,
            });
        }

        let (left_dest, right_dest) = dest;
        debug!(
            "split bonsai bucket page={} offset={} into left=({},{}) right=({},{}) is_root={}",
            bucket_ptr.page_index, bucket_ptr.page_offset, left_dest.page_index, left_dest.page_offset, right_dest.page_index, right_dest.page_offset, is_root
        );
        let path_root = if is_root { vec![self.root] } else { path[..path.len() - 1].to_vec() };

        if key_to_insert.compare(&separation_key) == Ordering::Less {
            let mut new_path = path_root;
            new_path.push(left_dest);
            Ok(BucketSearchResult { item_index: key_index as i64, path: new_path })
        } else {
            let mut new_path = path_root;
            new_path.push(right_dest);
            Ok(BucketSearchResult { item_index: (key_index - right_start) as i64, path: new_path })
        }
    }

    fn insert_into_parent(
        &self,
        op: &mut AtomicOperation,
        parent_path: &[BonsaiPointer],
        separation_key: &IndexKey,
        left: BonsaiPointer,
        right: BonsaiPointer,
    ) -> IndexResult<()> {
        let parent_ptr = *parent_path.last().unwrap();
        let mut sep_raw_key = Vec::new();
        separation_key.serialize(&mut sep_raw_key);
        let entry = BonsaiEntry::Internal { left, right, raw_key: sep_raw_key };

        let idx = {
            let mut bytes = self.load_bucket_bytes(parent_ptr)?;
            let bucket = BonsaiBucket::new(&mut bytes, self.key_type.clone(), self.value_len, self.binary_version);
            match decode_find_result(bucket.find(separation_key)) {
                Ok(i) => i,
                Err(ip) => ip,
            }
        };

        let (page_id, start, end) = Self::region_span(parent_ptr, self.bucket_size);
        let mut guard = self.bpm.load_for_write(page_id)?;
        let before = guard.to_vec();
        let inserted = {
            let mut bucket = BonsaiBucket::new(&mut guard[start..end], self.key_type.clone(), self.value_len, self.binary_version);
            bucket.add_entry(idx, &entry, true)?
        };
        if inserted {
            op.record_page_operation(PageOperation {
                page_id,
                region_offset: 0,
                kind: PageOperationKind::AddEntry { index: idx },
                before_image: before,
            });
            return Ok(());
        }
        drop(guard);

        let split_result = self.split_bucket(op, parent_path, idx, separation_key)?;
        let target_ptr = *split_result.path.last().unwrap();
        let target_index = split_result.item_index as usize;
        let (tp, ts, te) = Self::region_span(target_ptr, self.bucket_size);
        let mut guard2 = self.bpm.load_for_write(tp)?;
        let before2 = guard2.to_vec();
        let inserted2 = {
            let mut bucket = BonsaiBucket::new(&mut guard2[ts..te], self.key_type.clone(), self.value_len, self.binary_version);
            bucket.add_entry(target_index, &entry, true)?
        };
        if !inserted2 {
            return Err(IndexError::StateViolation("entry did not fit after parent split".into()));
        }
        op.record_page_operation(PageOperation {
            page_id: tp,
            region_offset: 0,
            kind: PageOperationKind::AddEntry { index: target_index },
            before_image: before2,
        });
        Ok(())
    }

    pub fn remove(&self, key: &IndexKey) -> IndexResult<Option<Vec<u8>>> {
        run_atomic(
            &self.lock_mgr,
            self.atomic_mgr.as_ref(),
            self.bpm.as_ref(),
            self.wal.as_ref(),
            self.file_id,
            true,
            true,
            COMPONENT,
            |op| self.remove_inner(op, key),
        )
    }

    fn remove_inner(&self, op: &mut AtomicOperation, key: &IndexKey) -> IndexResult<Option<Vec<u8>>> {
        let result = self.find_bucket(key)?;
        match decode_find_result(result.item_index) {
            Err(_) => Ok(None),
            Ok(i) => {
                let leaf = *result.path.last().unwrap();
                let (page_id, start, end) = Self::region_span(leaf, self.bucket_size);
                let mut guard = self.bpm.load_for_write(page_id)?;
                let before = guard.to_vec();
                let (raw_key, raw_value) = {
                    let mut bucket = BonsaiBucket::new(&mut guard[start..end], self.key_type.clone(), self.value_len, self.binary_version);
                    bucket.remove(i)
                };
                op.record_page_operation(PageOperation {
                    page_id,
                    region_offset: 0,
                    kind: PageOperationKind::Remove { index: i },
                    before_image: before,
                });
                drop(guard);
                self.bump_tree_size(op, -1)?;
                op.record_component_operation(ComponentOperation {
                    kind: ComponentOperationKind::Remove,
                    raw_key,
                    raw_new_value: None,
                    raw_previous_value: Some(raw_value.clone()),
                });
                Ok(Some(raw_value))
            }
        }
    }

    pub fn first_key(&self) -> IndexResult<Option<(IndexKey, Vec<u8>)>> {
        self.extremal_key(true)
    }

    pub fn last_key(&self) -> IndexResult<Option<(IndexKey, Vec<u8>)>> {
        self.extremal_key(false)
    }

    fn extremal_key(&self, first: bool) -> IndexResult<Option<(IndexKey, Vec<u8>)>> {
        run_atomic(
            &self.lock_mgr,
            self.atomic_mgr.as_ref(),
            self.bpm.as_ref(),
            self.wal.as_ref(),
            self.file_id,
            false,
            false,
            COMPONENT,
            |_op| {
                let mut current = self.root;
                loop {
                    let mut bytes = self.load_bucket_bytes(current)?;
                    let bucket = BonsaiBucket::new(&mut bytes, self.key_type.clone(), self.value_len, self.binary_version);
                    if bucket.is_leaf() {
                        if bucket.size() == 0 {
                            return Ok(None);
                        }
                        let i = if first { 0 } else { bucket.size() - 1 };
                        return Ok(Some((bucket.get_key(i), bucket.get_raw_value(i))));
                    }
                    let i = if first { 0 } else { bucket.size() - 1 };
                    current = match bucket.get_entry(i) {
                        BonsaiEntry::Internal { left, right, .. } => if first { left } else { right },
                        BonsaiEntry::Leaf { .. } => unreachable!(),
                    };
                }
            },
        )
    }

    pub fn scan_major(
        &self,
        start_key: &IndexKey,
        inclusive: bool,
        mut listener: impl FnMut(&IndexKey, &[u8]) -> bool,
    ) -> IndexResult<()> {
        run_atomic(
            &self.lock_mgr,
            self.atomic_mgr.as_ref(),
            self.bpm.as_ref(),
            self.wal.as_ref(),
            self.file_id,
            false,
            false,
            COMPONENT,
            |_op| {
                let result = self.find_bucket(start_key)?;
                let mut leaf_ptr = *result.path.last().unwrap();
                let mut start_index = match decode_find_result(result.item_index) {
                    Ok(i) => if inclusive { i } else { i + 1 },
                    Err(ip) => ip,
                };
                loop {
                    let mut bytes = self.load_bucket_bytes(leaf_ptr)?;
                    let bucket = BonsaiBucket::new(&mut bytes, self.key_type.clone(), self.value_len, self.binary_version);
                    for i in start_index..bucket.size() {
                        let k = bucket.get_key(i);
                        let v = bucket.get_raw_value(i);
                        if !listener(&k, &v) {
                            return Ok(());
                        }
                    }
                    let next = bucket.right_sibling();
                    if next.is_null() {
                        return Ok(());
                    }
                    leaf_ptr = next;
                    start_index = 0;
                }
            },
        )
    }

    pub fn scan_minor(
        &self,
        end_key: &IndexKey,
        inclusive: bool,
        mut listener: impl FnMut(&IndexKey, &[u8]) -> bool,
    ) -> IndexResult<()> {
        run_atomic(
            &self.lock_mgr,
            self.atomic_mgr.as_ref(),
            self.bpm.as_ref(),
            self.wal.as_ref(),
            self.file_id,
            false,
            false,
            COMPONENT,
            |_op| {
                let result = self.find_bucket(end_key)?;
                let mut leaf_ptr = *result.path.last().unwrap();
                let mut begin: i64 = match decode_find_result(result.item_index) {
                    Ok(i) => if inclusive { i as i64 } else { i as i64 - 1 },
                    Err(ip) => ip as i64 - 1,
                };
                let mut first = true;
                loop {
                    let mut bytes = self.load_bucket_bytes(leaf_ptr)?;
                    let bucket = BonsaiBucket::new(&mut bytes, self.key_type.clone(), self.value_len, self.binary_version);
                    let start = if first { begin } else { bucket.size() as i64 - 1 };
                    first = false;
                    let mut i = start;
                    while i >= 0 {
                        let k = bucket.get_key(i as usize);
                        let v = bucket.get_raw_value(i as usize);
                        if !listener(&k, &v) {
                            return Ok(());
                        }
                        i -= 1;
                    }
                    let prev = bucket.left_sibling();
                    if prev.is_null() {
                        return Ok(());
                    }
                    leaf_ptr = prev;
                    begin = 0;
                }
            },
        )
    }

    pub fn scan_between(
        &self,
        start_key: &IndexKey,
        start_inclusive: bool,
        end_key: &IndexKey,
        end_inclusive: bool,
        mut listener: impl FnMut(&IndexKey, &[u8]) -> bool,
    ) -> IndexResult<()> {
        run_atomic(
            &self.lock_mgr,
            self.atomic_mgr.as_ref(),
            self.bpm.as_ref(),
            self.wal.as_ref(),
            self.file_id,
            false,
            false,
            COMPONENT,
            |_op| {
                let start_result = self.find_bucket(start_key)?;
                let mut leaf_ptr = *start_result.path.last().unwrap();
                let mut begin = match decode_find_result(start_result.item_index) {
                    Ok(i) => if start_inclusive { i } else { i + 1 },
                    Err(ip) => ip,
                };

                let end_result = self.find_bucket(end_key)?;
                let end_leaf = *end_result.path.last().unwrap();
                let end_index: i64 = match decode_find_result(end_result.item_index) {
                    Ok(i) => if end_inclusive { i as i64 } else { i as i64 - 1 },
                    Err(ip) => ip as i64 - 1,
                };

                loop {
                    let mut bytes = self.load_bucket_bytes(leaf_ptr)?;
                    let bucket = BonsaiBucket::new(&mut bytes, self.key_type.clone(), self.value_len, self.binary_version);
                    let is_end_bucket = leaf_ptr == end_leaf;
                    let last: i64 = if is_end_bucket { end_index } else { bucket.size() as i64 - 1 };
                    let mut i = begin as i64;
                    while i <= last {
                        let k = bucket.get_key(i as usize);
                        let v = bucket.get_raw_value(i as usize);
                        if !listener(&k, &v) {
                            return Ok(());
                        }
                        i += 1;
                    }
                    if is_end_bucket {
                        return Ok(());
                    }
                    let next = bucket.right_sibling();
                    if next.is_null() {
                        return Ok(());
                    }
                    leaf_ptr = next;
                    begin = 0;
                }
            },
        )
    }

    /// Range scan entry point that honors a caller-selected direction;
    /// descending scans are not implemented and are rejected rather than
    /// silently reordered.
    pub fn scan_between_ordered(
        &self,
        start_key: &IndexKey,
        start_inclusive: bool,
        end_key: &IndexKey,
        end_inclusive: bool,
        descending: bool,
        listener: impl FnMut(&IndexKey, &[u8]) -> bool,
    ) -> IndexResult<()> {
        if descending {
            return Err(IndexError::Unsupported("descending range scan"));
        }
        self.scan_between(start_key, start_inclusive, end_key, end_inclusive, listener)
    }

    /// `clear()`: recycles every non-root bucket onto the free list via
    /// `recycle_subtrees`, then reinitializes the root in place as an
    /// empty leaf.
    pub fn clear(&self) -> IndexResult<()> {
        run_atomic(
            &self.lock_mgr,
            self.atomic_mgr.as_ref(),
            self.bpm.as_ref(),
            self.wal.as_ref(),
            self.file_id,
            true,
            true,
            COMPONENT,
            |op| {
                let root_children = {
                    let mut bytes = self.load_bucket_bytes(self.root)?;
                    let bucket = BonsaiBucket::new(&mut bytes, self.key_type.clone(), self.value_len, self.binary_version);
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

                if !root_children.is_empty() {
                    let mut sys_guard = self.bpm.load_for_write(SYSTEM_BUCKET_PAGE)?;
                    let before = sys_guard.to_vec();
                    let head = {
                        let sys_bucket = SystemBucket::new(&mut sys_guard[..]);
                        sys_bucket.free_list_head()
                    };
                    let (new_head, new_len) = self.allocator().recycle_subtrees(
                        self.bpm.as_ref(),
                        op,
                        &root_children,
                        &self.key_type,
                        self.value_len,
                        head,
                    )?;
                    {
                        let mut sys_bucket = SystemBucket::new(&mut sys_guard[..]);
                        let existing_len = sys_bucket.free_list_length();
                        sys_bucket.set_free_list_head(new_head);
                        sys_bucket.set_free_list_length(existing_len + new_len);
                    }
                    op.record_page_operation(PageOperation {
                        page_id: SYSTEM_BUCKET_PAGE,
                        region_offset: 0,
                        kind: PageOperationKind::SetFreeListPointer,
                        before_image: before,
                    });
                }

                let (page_id, start, end) = Self::region_span(self.root, self.bucket_size);
                let mut guard = self.bpm.load_for_write(page_id)?;
                let before = guard.to_vec();
                BonsaiBucket::init(&mut guard[start..end], true, self.binary_version);
                op.record_page_operation(PageOperation { page_id, region_offset: 0, kind: PageOperationKind::AddAll, before_image: before });
                Ok(())
            },
        )
    }

    /// `delete()`: recycles the entire tree, including the root, onto the
    /// free list.
    pub fn delete(&self) -> IndexResult<()> {
        run_atomic(
            &self.lock_mgr,
            self.atomic_mgr.as_ref(),
            self.bpm.as_ref(),
            self.wal.as_ref(),
            self.file_id,
            true,
            false,
            COMPONENT,
            |op| {
                let mut sys_guard = self.bpm.load_for_write(SYSTEM_BUCKET_PAGE)?;
                let before = sys_guard.to_vec();
                let head = {
                    let sys_bucket = SystemBucket::new(&mut sys_guard[..]);
                    sys_bucket.free_list_head()
                };
                let (new_head, recycled) =
                    self.allocator().recycle_subtrees(self.bpm.as_ref(), op, &[self.root], &self.key_type, self.value_len, head)?;
                {
                    let mut sys_bucket = SystemBucket::new(&mut sys_guard[..]);
                    let existing_len = sys_bucket.free_list_length();
                    sys_bucket.set_free_list_head(new_head);
                    sys_bucket.set_free_list_length(existing_len + recycled);
                }
                op.record_page_operation(PageOperation {
                    page_id: SYSTEM_BUCKET_PAGE,
                    region_offset: 0,
                    kind: PageOperationKind::SetFreeListPointer,
                    before_image: before,
                });
                Ok(())
            },
        )
    }
}
