//! Reads and writes fixed-size pages to a single backing file.

use crate::api::{PageId, PAGE_SIZE};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::sync::Mutex;

/// Manages page-granular reads/writes to one file on disk.
///
/// Uses positioned I/O (`read_at`/`write_at`) so readers and writers don't
/// serialize on a shared file cursor; only page *allocation* (handing out
/// the next page id and growing the file) takes a lock.
#[derive(Debug)]
pub struct DiskManager {
    file: File,
    next_page_id: Mutex<PageId>,
}

impl DiskManager {
    /// Opens (creating if necessary) the database file at `path`.
    pub fn new(path: &str) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();
        let next_page_id = (len / PAGE_SIZE as u64) as PageId;
        Ok(Self {
            file,
            next_page_id: Mutex::new(next_page_id),
        })
    }

    /// Reads page `page_id` into `buf`, which must be exactly `PAGE_SIZE`.
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> io::Result<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        let offset = page_id as u64 * PAGE_SIZE as u64;
        self.file.read_exact_at(buf, offset)
    }

    /// Writes `buf` (exactly `PAGE_SIZE` bytes) to page `page_id`.
    pub fn write_page(&self, page_id: PageId, buf: &[u8]) -> io::Result<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        let offset = page_id as u64 * PAGE_SIZE as u64;
        self.file.write_all_at(buf, offset)
    }

    /// Allocates the next page id and grows the file to hold it, zeroed.
    pub fn allocate_page(&self) -> io::Result<PageId> {
        let mut next = self.next_page_id.lock().unwrap();
        let page_id = *next;
        let zeros = [0u8; PAGE_SIZE];
        self.write_page(page_id, &zeros)?;
        *next += 1;
        Ok(page_id)
    }

    /// Number of pages currently backed by the file.
    pub fn page_count(&self) -> PageId {
        *self.next_page_id.lock().unwrap()
    }

    /// Flushes OS buffers for the backing file.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_grows_and_zeroes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.db");
        let dm = DiskManager::new(path.to_str().unwrap()).unwrap();

        let p0 = dm.allocate_page().unwrap();
        let p1 = dm.allocate_page().unwrap();
        assert_eq!(p0, 0);
        assert_eq!(p1, 1);
        assert_eq!(dm.page_count(), 2);

        let mut buf = [0xffu8; PAGE_SIZE];
        dm.read_page(p0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.db");
        let dm = DiskManager::new(path.to_str().unwrap()).unwrap();

        let page_id = dm.allocate_page().unwrap();
        let mut data = [0u8; PAGE_SIZE];
        data[0..4].copy_from_slice(&42u32.to_le_bytes());
        dm.write_page(page_id, &data).unwrap();

        let mut out = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut out).unwrap();
        assert_eq!(&out[0..4], &42u32.to_le_bytes());
    }

    #[test]
    fn reopening_resumes_next_page_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.db");
        {
            let dm = DiskManager::new(path.to_str().unwrap()).unwrap();
            dm.allocate_page().unwrap();
            dm.allocate_page().unwrap();
        }
        let dm = DiskManager::new(path.to_str().unwrap()).unwrap();
        assert_eq!(dm.page_count(), 2);
    }
}
