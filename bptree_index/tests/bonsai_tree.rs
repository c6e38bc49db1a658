//! Integration tests for the bonsai (sub-page) tree engine: leaf splits
//! linking new siblings back correctly, bulk insert with partial removal,
//! and free-list reuse after clear().

use bptree_index::{BTreeConfig, BonsaiBPlusTree, IndexKey, KeyType};
use page_store::atomic::{AtomicOperationsManager, SimpleAtomicOperationsManager};
use page_store::buffer_pool::SimpleBufferPoolManager;
use page_store::disk_manager::DiskManager;
use page_store::lock_manager::FileLockManager;
use page_store::wal::{InMemoryWal, WriteAheadLog};
use page_store::BufferPoolManager;
use std::sync::Arc;

// A bonsai bucket is a sub-page region carved out of a single PAGE_SIZE
// (4 KiB) page, so it must stay well under that to leave room for the
// region header and let several buckets share a page.
const BUCKET_SIZE: usize = 1024;

fn new_tree(dir: &tempfile::TempDir) -> BonsaiBPlusTree {
    let path = dir.path().join("bonsai.db");
    let dm = Arc::new(DiskManager::new(path.to_str().unwrap()).unwrap());
    let bpm: Arc<dyn BufferPoolManager> = Arc::new(SimpleBufferPoolManager::new(64, dm));
    let atomic_mgr: Arc<dyn AtomicOperationsManager> = Arc::new(SimpleAtomicOperationsManager::new());
    let wal: Arc<dyn WriteAheadLog> = Arc::new(InMemoryWal::new());
    let lock_mgr = Arc::new(FileLockManager::new());
    let config =
        BTreeConfig { sbtree_bonsai_bucket_size: BUCKET_SIZE, max_bonsai_bucket_size_in_bytes: BUCKET_SIZE, ..BTreeConfig::default() };
    BonsaiBPlusTree::create(bpm, atomic_mgr, wal, lock_mgr, 1, KeyType::Integer, 8, config, 1).unwrap()
}

fn value(v: i64) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

fn value_of(bytes: &[u8]) -> i64 {
    i64::from_le_bytes(bytes.try_into().unwrap())
}

#[test]
fn fresh_tree_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let tree = new_tree(&dir);
    assert_eq!(tree.get(&IndexKey::Integer(1)).unwrap(), None);
    assert_eq!(tree.first_key().unwrap(), None);
}

/// Fill a leaf past its ~16-byte-entry capacity (a 1 KiB bonsai bucket
/// holds on the order of a few dozen entries) and check the new sibling
/// links back correctly.
#[test]
fn leaf_split_links_new_sibling_back() {
    let dir = tempfile::tempdir().unwrap();
    let tree = new_tree(&dir);
    for k in 0..400i32 {
        tree.put(&IndexKey::Integer(k), &value(k as i64)).unwrap();
    }

    let mut seen = Vec::new();
    tree.scan_major(&IndexKey::Integer(i32::MIN), true, |k, v| {
        seen.push((k.clone(), value_of(v)));
        true
    })
    .unwrap();
    assert_eq!(seen.len(), 400);
    for (i, (k, v)) in seen.iter().enumerate() {
        assert_eq!(*k, IndexKey::Integer(i as i32));
        assert_eq!(*v, i as i64);
    }
    for pair in seen.windows(2) {
        assert!(pair[0].0.compare(&pair[1].0) == std::cmp::Ordering::Less);
    }
}

#[test]
fn bulk_insert_then_partial_remove() {
    let dir = tempfile::tempdir().unwrap();
    let tree = new_tree(&dir);
    for k in 0..2_000i32 {
        tree.put(&IndexKey::Integer(k), &value(k as i64)).unwrap();
    }
    for k in 0..1_000i32 {
        assert!(tree.remove(&IndexKey::Integer(k)).unwrap().is_some());
    }
    assert_eq!(tree.first_key().unwrap().unwrap().0, IndexKey::Integer(1_000));
}

/// `clear()` followed by ten new inserts reuses recycled buckets.
#[test]
fn clear_then_reinsert_reuses_free_list() {
    let dir = tempfile::tempdir().unwrap();
    let tree = new_tree(&dir);
    for k in 0..1_000i32 {
        tree.put(&IndexKey::Integer(k), &value(k as i64)).unwrap();
    }
    tree.clear().unwrap();
    assert_eq!(tree.first_key().unwrap(), None);

    for k in 0..10i32 {
        tree.put(&IndexKey::Integer(k), &value(k as i64)).unwrap();
    }
    assert_eq!(tree.first_key().unwrap().unwrap().0, IndexKey::Integer(0));
    assert_eq!(tree.last_key().unwrap().unwrap().0, IndexKey::Integer(9));
}

#[test]
fn put_same_key_twice_updates_without_growing_size() {
    let dir = tempfile::tempdir().unwrap();
    let tree = new_tree(&dir);
    tree.put(&IndexKey::Integer(1), &value(10)).unwrap();
    tree.put(&IndexKey::Integer(1), &value(20)).unwrap();
    assert_eq!(value_of(&tree.get(&IndexKey::Integer(1)).unwrap().unwrap()), 20);
}
