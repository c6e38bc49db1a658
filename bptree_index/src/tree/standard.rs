//! Standard (page-per-bucket) B+-tree engine.

use crate::bucket::raw::decode_find_result;
use crate::bucket::standard::{StandardBucket, StandardEntry};
use crate::error::{IndexError, IndexResult};
use crate::key::{IndexKey, KeyType};
use crate::pointer::StandardPointer;
use crate::tree::run_atomic;
use page_store::atomic::{AtomicOperation, AtomicOperationsManager};
use page_store::lock_manager::FileLockManager;
use page_store::wal::{ComponentOperation, ComponentOperationKind, PageOperation, PageOperationKind, WriteAheadLog};
use page_store::{BufferPoolManager, FileId};
use std::cmp::Ordering;
use std::sync::Arc;
use log::{debug, trace};

const COMPONENT: &str = "standard_bptree";

/// Result of a downward search: the leaf's `find()` result (exact index or
/// `-(insertion_point+1)`) and the full bucket-pointer path from root to
/// leaf.
#[derive(Debug, Clone)]
pub struct BucketSearchResult {
    pub item_index: i64,
    pub path: Vec<StandardPointer>,
}

pub struct StandardBPlusTree {
    bpm: Arc<dyn BufferPoolManager>,
    atomic_mgr: Arc<dyn AtomicOperationsManager>,
    wal: Arc<dyn WriteAheadLog>,
    lock_mgr: Arc<FileLockManager>,
    file_id: FileId,
    root: StandardPointer,
    key_type: KeyType,
}

impl StandardBPlusTree {
    /// `create`: allocates the root page and initializes it as an empty leaf,
    /// inside the same atomic operation that logs the `Create` component
    /// record — the page write is as replayable/rollback-safe as every
    /// other mutator.
    pub fn create(
        bpm: Arc<dyn BufferPoolManager>,
        atomic_mgr: Arc<dyn AtomicOperationsManager>,
        wal: Arc<dyn WriteAheadLog>,
        lock_mgr: Arc<FileLockManager>,
        file_id: FileId,
        key_type: KeyType,
    ) -> IndexResult<Self> {
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
                let mut guard = bpm.new_page()?;
                let root = StandardPointer(guard.page_id());
                let before = guard.to_vec();
                StandardBucket::init(&mut guard[..], true);
                op.record_page_operation(PageOperation {
                    page_id: root.0,
                    region_offset: 0,
                    kind: PageOperationKind::AddAll,
                    before_image: before,
                });
                drop(guard);
                op.record_component_operation(ComponentOperation {
                    kind: ComponentOperationKind::Create,
                    raw_key: Vec::new(),
                    raw_new_value: None,
                    raw_previous_value: None,
                });
                Ok(root)
            },
        )?;
        Ok(Self { bpm, atomic_mgr, wal, lock_mgr, file_id, root, key_type })
    }

    /// `load`: reopens a tree whose root page is already known.
    pub fn load(
        bpm: Arc<dyn BufferPoolManager>,
        atomic_mgr: Arc<dyn AtomicOperationsManager>,
        wal: Arc<dyn WriteAheadLog>,
        lock_mgr: Arc<FileLockManager>,
        file_id: FileId,
        root: StandardPointer,
        key_type: KeyType,
    ) -> Self {
        Self { bpm, atomic_mgr, wal, lock_mgr, file_id, root, key_type }
    }

    pub fn root(&self) -> StandardPointer {
        self.root
    }

    fn load_bucket_bytes(&self, ptr: StandardPointer) -> IndexResult<Vec<u8>> {
        Ok(self.bpm.load_for_read(ptr.0)?.to_vec())
    }

    /// Walks down from the root, following child pointers by binary-searching each internal bucket.
    fn find_bucket(&self, key: &IndexKey) -> IndexResult<BucketSearchResult> {
        let mut path = vec![self.root];
        let mut current = self.root;
        loop {
            let mut bytes = self.load_bucket_bytes(current)?;
            let bucket = StandardBucket::new(&mut bytes, self.key_type.clone());
            if bucket.is_leaf() {
                return Ok(BucketSearchResult { item_index: bucket.find(key), path });
            }
            let size = bucket.size();
            let next = match decode_find_result(bucket.find(key)) {
                Ok(i) => match bucket.get_entry(i) {
                    StandardEntry::Internal { right, .. } => right,
                    StandardEntry::Leaf { .. } => unreachable!(),
                },
                Err(insertion_point) if insertion_point >= size => match bucket.get_entry(size - 1) {
                    StandardEntry::Internal { right, .. } => right,
                    StandardEntry::Leaf { .. } => unreachable!(),
                },
                Err(insertion_point) => match bucket.get_entry(insertion_point) {
                    StandardEntry::Internal { left, .. } => left,
                    StandardEntry::Leaf { .. } => unreachable!(),
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
                        let bucket = StandardBucket::new(&mut bytes, self.key_type.clone());
                        Ok(Some(bucket.get_raw_value(i)))
                    }
                }
            },
        )
    }

    fn bump_tree_size(&self, op: &mut AtomicOperation, delta: i64) -> IndexResult<()> {
        let mut guard = self.bpm.load_for_write(self.root.0)?;
        let before = guard.to_vec();
        {
            let mut bucket = StandardBucket::new(&mut guard[..], self.key_type.clone());
            let new_size = bucket.tree_size() + delta;
            bucket.set_tree_size(new_size);
        }
        op.record_page_operation(PageOperation {
            page_id: self.root.0,
            region_offset: 0,
            kind: PageOperationKind::SetTreeSize,
            before_image: before,
        });
        Ok(())
    }

    /// Inserts `key` with `value`, or updates it in place if already present.
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
                let mut guard = self.bpm.load_for_write(leaf.0)?;
                let before = guard.to_vec();
                let prev_raw_value = {
                    let mut bucket = StandardBucket::new(&mut guard[..], self.key_type.clone());
                    bucket.update_value(i, raw_value)
                };
                op.record_page_operation(PageOperation {
                    page_id: leaf.0,
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
                    let mut guard = self.bpm.load_for_write(leaf.0)?;
                    let before = guard.to_vec();
                    let inserted = {
                        let mut bucket = StandardBucket::new(&mut guard[..], self.key_type.clone());
                        bucket.add_leaf_entry(insertion_index, raw_key, raw_value)?
                    };
                    if inserted {
                        op.record_page_operation(PageOperation {
                            page_id: leaf.0,
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

    /// Splits a full bucket in two and inserts the new separator key into the parent.
    ///
    /// The returned `BucketSearchResult.item_index` is a plain (already
    /// decoded) array index, not a `find()`-style encoded one: split is
    /// only ever invoked once the key is already known to be absent, so
    /// there is no exact-match case left to encode.
    fn split_bucket(
        &self,
        op: &mut AtomicOperation,
        path: &[StandardPointer],
        key_index: usize,
        key_to_insert: &IndexKey,
    ) -> IndexResult<BucketSearchResult> {
        let bucket_ptr = *path.last().unwrap();
        let is_root = path.len() == 1;
        trace!("splitting bucket page={} is_root={}", bucket_ptr.0, is_root);

        let mut guard = self.bpm.load_for_write(bucket_ptr.0)?;
        let before = guard.to_vec();
        let (is_leaf, bucket_size, index_to_split, separation_key, right_start, right_entries, old_right_sibling, preserved_tree_size) = {
            let bucket = StandardBucket::new(&mut guard[..], self.key_type.clone());
            let bucket_size = bucket.size();
            let index_to_split = bucket_size >> 1;
            let separation_key = bucket.get_key(index_to_split);
            let is_leaf = bucket.is_leaf();
            let right_start = if is_leaf { index_to_split } else { index_to_split + 1 };
            let right_entries: Vec<StandardEntry> = (right_start..bucket_size).map(|i| bucket.get_entry(i)).collect();
            let old_right_sibling = if is_leaf { bucket.right_sibling() } else { StandardPointer::NULL };
            let preserved_tree_size = bucket.tree_size();
            (is_leaf, bucket_size, index_to_split, separation_key, right_start, right_entries, old_right_sibling, preserved_tree_size)
        };

        let dest = if is_root {
            let left_entries: Vec<StandardEntry> = {
                let bucket = StandardBucket::new(&mut guard[..], self.key_type.clone());
                (0..index_to_split).map(|i| bucket.get_entry(i)).collect()
            };

            let left_ptr = {
                let mut left_guard = self.bpm.new_page()?;
                let ptr = StandardPointer(left_guard.page_id());
                StandardBucket::init(&mut left_guard[..], is_leaf);
                let mut left_bucket = StandardBucket::new(&mut left_guard[..], self.key_type.clone());
                left_bucket.add_all(&left_entries)?;
                ptr
            };
            let right_ptr = {
                let mut right_guard = self.bpm.new_page()?;
                let ptr = StandardPointer(right_guard.page_id());
                StandardBucket::init(&mut right_guard[..], is_leaf);
                let mut right_bucket = StandardBucket::new(&mut right_guard[..], self.key_type.clone());
                right_bucket.add_all(&right_entries)?;
                ptr
            };
            if is_leaf {
                let mut left_guard = self.bpm.load_for_write(left_ptr.0)?;
                let mut left_bucket = StandardBucket::new(&mut left_guard[..], self.key_type.clone());
                left_bucket.set_right_sibling(right_ptr);
                drop(left_guard);
                let mut right_guard = self.bpm.load_for_write(right_ptr.0)?;
                let mut right_bucket = StandardBucket::new(&mut right_guard[..], self.key_type.clone());
                right_bucket.set_left_sibling(left_ptr);
            }

            StandardBucket::init(&mut guard[..], false);
            let mut root_bucket = StandardBucket::new(&mut guard[..], self.key_type.clone());
            root_bucket.set_tree_size(preserved_tree_size);
            let mut sep_raw_key = Vec::new();
            separation_key.serialize(&mut sep_raw_key);
            root_bucket.add_entry(0, &StandardEntry::Internal { left: left_ptr, right: right_ptr, raw_key: sep_raw_key }, false)?;

            (left_ptr, right_ptr)
        } else {
            let mut bucket = StandardBucket::new(&mut guard[..], self.key_type.clone());
            bucket.shrink(index_to_split);
            drop(bucket);

            let right_ptr = {
                let mut right_guard = self.bpm.new_page()?;
                let ptr = StandardPointer(right_guard.page_id());
                StandardBucket::init(&mut right_guard[..], is_leaf);
                let mut right_bucket = StandardBucket::new(&mut right_guard[..], self.key_type.clone());
                right_bucket.add_all(&right_entries)?;
                ptr
            };

            if is_leaf {
                {
                    let mut right_guard = self.bpm.load_for_write(right_ptr.0)?;
                    let mut right_bucket = StandardBucket::new(&mut right_guard[..], self.key_type.clone());
                    right_bucket.set_left_sibling(bucket_ptr);
                    right_bucket.set_right_sibling(old_right_sibling);
                }
                if !old_right_sibling.is_null() {
                    let mut old_right_guard = self.bpm.load_for_write(old_right_sibling.0)?;
                    let mut old_right_bucket = StandardBucket::new(&mut old_right_guard[..], self.key_type.clone());
                    old_right_bucket.set_left_sibling(right_ptr);
                }
                let mut bucket = StandardBucket::new(&mut guard[..], self.key_type.clone());
                bucket.set_right_sibling(right_ptr);
            }
            drop(guard);

            self.insert_into_parent(op, &path[..path.len() - 1], &separation_key, bucket_ptr, right_ptr)?;

            (bucket_ptr, right_ptr)
        };

        if is_root {
            op.record_page_operation(PageOperation {
                page_id: bucket_ptr.0,
                region_offset: 0,
                kind: PageOperationKind::AddAll,
                before_image: before,
            });
        } else {
            op.record_page_operation(PageOperation {
                page_id: bucket_ptr.0,
                region_offset: 0,
                kind: PageOperationKind::Shrink { new_size: index_to_split },
                before_image: before,
            });
        }

        let (left_dest, right_dest) = dest;
        debug!("split bucket page={} into left={} right={} is_root={}", bucket_ptr.0, left_dest.0, right_dest.0, is_root);
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
        parent_path: &[StandardPointer],
        separation_key: &IndexKey,
        left: StandardPointer,
        right: StandardPointer,
    ) -> IndexResult<()> {
        let parent_ptr = *parent_path.last().unwrap();
        let mut sep_raw_key = Vec::new();
        separation_key.serialize(&mut sep_raw_key);
        let entry = StandardEntry::Internal { left, right, raw_key: sep_raw_key };

        let idx = {
            let mut bytes = self.load_bucket_bytes(parent_ptr)?;
            let bucket = StandardBucket::new(&mut bytes, self.key_type.clone());
            match decode_find_result(bucket.find(separation_key)) {
                Ok(i) => i,
                Err(ip) => ip,
            }
        };

        let mut guard = self.bpm.load_for_write(parent_ptr.0)?;
        let before = guard.to_vec();
        let inserted = {
            let mut bucket = StandardBucket::new(&mut guard[..], self.key_type.clone());
            bucket.add_entry(idx, &entry, true)?
        };
        if inserted {
            op.record_page_operation(PageOperation {
                page_id: parent_ptr.0,
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
        let mut guard2 = self.bpm.load_for_write(target_ptr.0)?;
        let before2 = guard2.to_vec();
        let inserted2 = {
            let mut bucket = StandardBucket::new(&mut guard2[..], self.key_type.clone());
            bucket.add_entry(target_index, &entry, true)?
        };
        if !inserted2 {
            return Err(IndexError::StateViolation("entry did not fit after parent split".into()));
        }
        op.record_page_operation(PageOperation {
            page_id: target_ptr.0,
            region_offset: 0,
            kind: PageOperationKind::AddEntry { index: target_index },
            before_image: before2,
        });
        Ok(())
    }

    /// Removes `key`, returning its previous value if present.
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
                let mut guard = self.bpm.load_for_write(leaf.0)?;
                let before = guard.to_vec();
                let (raw_key, raw_value) = {
                    let mut bucket = StandardBucket::new(&mut guard[..], self.key_type.clone());
                    bucket.remove(i)
                };
                op.record_page_operation(PageOperation {
                    page_id: leaf.0,
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

    /// `first_key`/`last_key`. Internal buckets are never
    /// empty once the tree has been split at least once (I3/I4), so a
    /// straight leftmost/rightmost descent suffices without a generic
    /// backtracking walk for the case of an internal bucket with no
    /// children on one side.
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
                    let bucket = StandardBucket::new(&mut bytes, self.key_type.clone());
                    if bucket.is_leaf() {
                        if bucket.size() == 0 {
                            return Ok(None);
                        }
                        let i = if first { 0 } else { bucket.size() - 1 };
                        return Ok(Some((bucket.get_key(i), bucket.get_raw_value(i))));
                    }
                    let i = if first { 0 } else { bucket.size() - 1 };
                    current = match bucket.get_entry(i) {
                        StandardEntry::Internal { left, right, .. } => if first { left } else { right },
                        StandardEntry::Leaf { .. } => unreachable!(),
                    };
                }
            },
        )
    }

    /// Major (ascending, `>=`/`>`) range scan from `start_key`.
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
                    let bucket = StandardBucket::new(&mut bytes, self.key_type.clone());
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

    /// Minor (descending scan direction only internally; ascending is the
    /// only supported output order, per the `UNSUPPORTED` rule for
    /// descending scans) range scan up to `end_key`.
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
                    let bucket = StandardBucket::new(&mut bytes, self.key_type.clone());
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

    /// Inclusive/exclusive `between` scan. Always ascending.
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
                    let bucket = StandardBucket::new(&mut bytes, self.key_type.clone());
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

    /// `clear()`: reinitializes the root as an empty leaf. Non-root pages
    /// from before the clear are simply orphaned — the standard variant has
    /// no free list to recycle them onto (§4.2 is bonsai-only); they are
    /// never reclaimed within the tree's lifetime, per the bucket lifecycle
    /// note in §3.
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
                let mut guard = self.bpm.load_for_write(self.root.0)?;
                let before = guard.to_vec();
                StandardBucket::init(&mut guard[..], true);
                op.record_page_operation(PageOperation {
                    page_id: self.root.0,
                    region_offset: 0,
                    kind: PageOperationKind::AddAll,
                    before_image: before,
                });
                Ok(())
            },
        )
    }

    /// `delete()`: tears the whole tree down. The standard variant has no
    /// free list to recycle pages onto, so this is a bookkeeping no-op from
    /// the storage side — the caller drops its handle to the file next.
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
            |_op| Ok(()),
        )
    }
}
