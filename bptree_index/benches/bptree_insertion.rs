use bptree_index::{encode_standard_value, IndexKey, KeyType, StandardBPlusTree};
use criterion::{criterion_group, criterion_main, Criterion};
use page_store::atomic::{AtomicOperationsManager, SimpleAtomicOperationsManager};
use page_store::buffer_pool::SimpleBufferPoolManager;
use page_store::disk_manager::DiskManager;
use page_store::lock_manager::FileLockManager;
use page_store::wal::{InMemoryWal, WriteAheadLog};
use page_store::BufferPoolManager;
use std::sync::Arc;

fn tree(dir: &tempfile::TempDir) -> StandardBPlusTree {
    let path = dir.path().join("bench.db");
    let dm = Arc::new(DiskManager::new(path.to_str().unwrap()).unwrap());
    let bpm: Arc<dyn BufferPoolManager> = Arc::new(SimpleBufferPoolManager::new(256, dm));
    let atomic_mgr: Arc<dyn AtomicOperationsManager> = Arc::new(SimpleAtomicOperationsManager::new());
    let wal: Arc<dyn WriteAheadLog> = Arc::new(InMemoryWal::new());
    let lock_mgr = Arc::new(FileLockManager::new());
    StandardBPlusTree::create(bpm, atomic_mgr, wal, lock_mgr, 1, KeyType::Integer).unwrap()
}

fn insert_n(n: i32) {
    let dir = tempfile::tempdir().unwrap();
    let tree = tree(&dir);
    for key in 0..n {
        tree.put(&IndexKey::Integer(key), &encode_standard_value(Some(key as i64), &[])).unwrap();
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    let _ = env_logger::builder().is_test(false).try_init();
    c.bench_function("bptree_insert 10", |b| {
        b.iter(|| insert_n(10));
    });
    c.bench_function("bptree_insert 100", |b| {
        b.iter(|| insert_n(100));
    });
    c.bench_function("bptree_insert 1,000", |b| {
        b.iter(|| insert_n(1_000));
    });
    c.bench_function("bptree_insert 10,000", |b| {
        b.iter(|| insert_n(10_000));
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
