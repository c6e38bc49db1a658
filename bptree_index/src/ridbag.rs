//! `real_bag_size`: reconciles a RID-bag's stored cardinality against the
//! tree's actual contents plus a caller-held batch of not-yet-applied
//! deltas.
//!
//! A RID-bag caller is itself out of scope — an external collaborator;
//! what belongs to the tree engine is this one helper, since answering it
//! requires a full major scan.

use crate::error::IndexResult;
use crate::key::IndexKey;
use std::collections::HashMap;

/// An opaque additive modifier not yet reflected in the tree's stored
/// values — e.g. a pending increment/decrement a caller is batching before
/// committing it as a real put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change(pub i64);

/// Small cross-variant seam so `real_bag_size` doesn't need to be written
/// twice for [`crate::tree::StandardBPlusTree`] and
/// [`crate::tree::BonsaiBPlusTree`] — the two tree engines otherwise stay
/// concrete, non-generic implementations (see `DESIGN.md`).
pub trait MajorScan {
    fn first_key(&self) -> IndexResult<Option<(IndexKey, Vec<u8>)>>;
    fn scan_major(&self, start_key: &IndexKey, inclusive: bool, listener: impl FnMut(&IndexKey, &[u8]) -> bool) -> IndexResult<()>;
}

impl MajorScan for crate::tree::StandardBPlusTree {
    fn first_key(&self) -> IndexResult<Option<(IndexKey, Vec<u8>)>> {
        crate::tree::StandardBPlusTree::first_key(self)
    }

    fn scan_major(&self, start_key: &IndexKey, inclusive: bool, listener: impl FnMut(&IndexKey, &[u8]) -> bool) -> IndexResult<()> {
        crate::tree::StandardBPlusTree::scan_major(self, start_key, inclusive, listener)
    }
}

impl MajorScan for crate::tree::BonsaiBPlusTree {
    fn first_key(&self) -> IndexResult<Option<(IndexKey, Vec<u8>)>> {
        crate::tree::BonsaiBPlusTree::first_key(self)
    }

    fn scan_major(&self, start_key: &IndexKey, inclusive: bool, listener: impl FnMut(&IndexKey, &[u8]) -> bool) -> IndexResult<()> {
        crate::tree::BonsaiBPlusTree::scan_major(self, start_key, inclusive, listener)
    }
}

/// Decodes a stored standard-leaf value (§4.1's `[is_link][value_bytes]`
/// encoding, see `value::encode_standard_value`) into its base `i64` count:
/// the link itself if link-encoded, or the payload's leading bytes as a
/// little-endian integer (zero-padded on the high end) otherwise.
fn base_value(value: &[u8]) -> i64 {
    match crate::value::decode_standard_value(value) {
        Ok(link) => link,
        Err(payload) => {
            let mut buf = [0u8; 8];
            let n = payload.len().min(8);
            buf[..n].copy_from_slice(&payload[..n]);
            i64::from_le_bytes(buf)
        }
    }
}

/// Walks every entry from `firstKey()` inclusive, adding each stored base
/// value to the matching `Change` delta (if any), then adds the deltas of
/// every `Change` whose key was never visited (applied against base 0).
pub fn real_bag_size(tree: &impl MajorScan, changes: &HashMap<IndexKey, Change>) -> IndexResult<i64> {
    let mut total: i64 = 0;
    let mut matched: Vec<IndexKey> = Vec::with_capacity(changes.len());

    if let Some((first, _)) = tree.first_key()? {
        tree.scan_major(&first, true, |k, v| {
            let mut value = base_value(v);
            if let Some(change) = changes.get(k) {
                value += change.0;
                matched.push(k.clone());
            }
            total += value;
            true
        })?;
    }

    for (key, change) in changes {
        if !matched.contains(key) {
            total += change.0;
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyType;
    use crate::tree::StandardBPlusTree;
    use page_store::atomic::{AtomicOperationsManager, SimpleAtomicOperationsManager};
    use page_store::buffer_pool::SimpleBufferPoolManager;
    use page_store::disk_manager::DiskManager;
    use page_store::lock_manager::FileLockManager;
    use page_store::wal::{InMemoryWal, WriteAheadLog};
    use page_store::BufferPoolManager;
    use std::sync::Arc;

    fn new_tree(dir: &tempfile::TempDir) -> StandardBPlusTree {
        let path = dir.path().join("ridbag.db");
        let dm = Arc::new(DiskManager::new(path.to_str().unwrap()).unwrap());
        let bpm: Arc<dyn BufferPoolManager> = Arc::new(SimpleBufferPoolManager::new(16, dm));
        let atomic_mgr: Arc<dyn AtomicOperationsManager> = Arc::new(SimpleAtomicOperationsManager::new());
        let wal: Arc<dyn WriteAheadLog> = Arc::new(InMemoryWal::new());
        let lock_mgr = Arc::new(FileLockManager::new());
        StandardBPlusTree::create(bpm, atomic_mgr, wal, lock_mgr, 1, KeyType::Integer).unwrap()
    }

    fn count(n: i64) -> Vec<u8> {
        crate::value::encode_standard_value(Some(n), &[])
    }

    #[test]
    fn sums_stored_values_with_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let tree = new_tree(&dir);
        tree.put(&IndexKey::Integer(1), &count(10)).unwrap();
        tree.put(&IndexKey::Integer(2), &count(20)).unwrap();

        let changes = HashMap::new();
        assert_eq!(real_bag_size(&tree, &changes).unwrap(), 30);
    }

    #[test]
    fn applies_a_delta_to_a_matching_key_and_counts_unmatched_changes_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let tree = new_tree(&dir);
        tree.put(&IndexKey::Integer(1), &count(10)).unwrap();
        tree.put(&IndexKey::Integer(2), &count(20)).unwrap();

        let mut changes = HashMap::new();
        changes.insert(IndexKey::Integer(1), Change(5));
        changes.insert(IndexKey::Integer(99), Change(-3));

        // (10 + 5) + 20 + (0 + -3) == 32
        assert_eq!(real_bag_size(&tree, &changes).unwrap(), 32);
    }

    #[test]
    fn empty_tree_counts_only_unmatched_changes() {
        let dir = tempfile::tempdir().unwrap();
        let tree = new_tree(&dir);

        let mut changes = HashMap::new();
        changes.insert(IndexKey::Integer(7), Change(4));
        assert_eq!(real_bag_size(&tree, &changes).unwrap(), 4);
    }
}
