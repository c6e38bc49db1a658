//! Common page-addressing types and the buffer pool manager contract.

use std::io;
use std::ops::{Deref, DerefMut};

/// A page index within a single file. Negative values are never handed out
/// by [`DiskManager`](crate::disk_manager::DiskManager) — only [`INVALID_PAGE_ID`]
/// uses one, as the NULL sentinel for a standard bucket pointer.
pub type PageId = i64;

/// NULL sentinel for a standard (page-per-bucket) bucket pointer.
pub const INVALID_PAGE_ID: PageId = -1;

/// Fixed page size used by the disk manager and buffer pool, expressed as a
/// constant rather than a runtime-configurable value — the buffer pool's
/// frames are sized once at construction from [`crate::BufferPoolManager`]
/// callers, not mid-flight.
pub const PAGE_SIZE: usize = 4096;

/// Errors surfaced by the buffer pool / disk manager collaborator boundary.
#[derive(Debug)]
pub enum BpmError {
    /// The pool is full and no frame could be evicted (all pages pinned).
    NoFreeFrames,
    /// The requested page does not exist in the file.
    PageNotFound(PageId),
    /// Propagated I/O failure from the disk manager.
    Io(io::Error),
}

impl From<io::Error> for BpmError {
    fn from(e: io::Error) -> Self {
        BpmError::Io(e)
    }
}

impl std::fmt::Display for BpmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BpmError::NoFreeFrames => write!(f, "buffer pool exhausted: no free frames"),
            BpmError::PageNotFound(id) => write!(f, "page {} not found", id),
            BpmError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for BpmError {}

/// A pinned, read-only view of a page's bytes.
///
/// Dropping the guard releases the pin. There is no explicit `release`
/// call in this crate's API: RAII gives the "released exactly once on
/// every control-flow exit" guarantee structurally.
pub trait ReadPageGuard: Deref<Target = [u8]> {
    fn page_id(&self) -> PageId;
}

/// A pinned, mutable view of a page's bytes. Writing through the guard
/// marks the frame dirty; the page is persisted on the next flush.
pub trait PageGuard: Deref<Target = [u8]> + DerefMut {
    fn page_id(&self) -> PageId;
}

/// The paginated storage contract the index engine is built against.
///
/// `load_for_read` takes a shared latch (multiple readers may hold a page
/// at once); `load_for_write` takes an exclusive one, mirroring the
/// shared/exclusive split the file-lock manager uses one level up.
pub trait BufferPoolManager: Send + Sync {
    /// Pins `page_id` for shared (read-only) access.
    fn load_for_read(&self, page_id: PageId) -> Result<Box<dyn ReadPageGuard + '_>, BpmError>;

    /// Pins `page_id` for exclusive (read-write) access.
    fn load_for_write(&self, page_id: PageId) -> Result<Box<dyn PageGuard + '_>, BpmError>;

    /// Allocates and pins a new, zero-initialized page.
    fn new_page(&self) -> Result<Box<dyn PageGuard + '_>, BpmError>;

    /// Flushes a single page to disk if dirty.
    fn flush_page(&self, page_id: PageId) -> Result<(), BpmError>;

    /// Flushes every dirty page to disk.
    fn flush_all_pages(&self) -> Result<(), BpmError>;

    /// Number of pages currently allocated in the backing file.
    fn page_count(&self) -> usize;
}
