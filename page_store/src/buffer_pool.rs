//! A single-file, fixed-size buffer pool with CLOCK-second-chance eviction.
//!
//! Frames are individually `RwLock`-protected so concurrent readers of
//! different pages (or the same page) don't serialize on a pool-wide lock;
//! only page-table lookups and victim selection take a pool-wide lock
//! briefly. Each pinned-page guard holds its frame's lock for its own
//! lifetime (acquired once at pin time, released on drop) so the `&[u8]`/
//! `&mut [u8]` it hands out stays covered by the lock for as long as the
//! caller holds it — no lock is reacquired transiently inside `Deref`.

use crate::api::{BpmError, BufferPoolManager, PageGuard, PageId, ReadPageGuard, PAGE_SIZE};
use crate::disk_manager::DiskManager;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

type FrameId = usize;

#[derive(Debug)]
struct Frame {
    page_id: PageId,
    data: [u8; PAGE_SIZE],
    pin_count: usize,
    is_dirty: bool,
    is_referenced: bool,
}

/// Fixed-capacity buffer pool backed by one [`DiskManager`].
#[derive(Debug)]
pub struct SimpleBufferPoolManager {
    frames: Vec<RwLock<Frame>>,
    page_table: RwLock<HashMap<PageId, FrameId>>,
    free_list: Mutex<Vec<FrameId>>,
    disk_manager: Arc<DiskManager>,
    pool_size: usize,
    clock_hand: Mutex<usize>,
}

/// A pinned read-only page. Holds a shared lock on the frame for its
/// lifetime; multiple `SimpleReadGuard`s over the same frame can coexist.
pub struct SimpleReadGuard<'a> {
    bpm: &'a SimpleBufferPoolManager,
    page_id: PageId,
    guard: RwLockReadGuard<'a, Frame>,
}

/// A pinned, exclusively-held page. Writing through `DerefMut` marks the
/// frame dirty.
pub struct SimpleWriteGuard<'a> {
    bpm: &'a SimpleBufferPoolManager,
    page_id: PageId,
    guard: RwLockWriteGuard<'a, Frame>,
}

impl<'a> ReadPageGuard for SimpleReadGuard<'a> {
    fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl<'a> Deref for SimpleReadGuard<'a> {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.guard.data
    }
}

impl<'a> Drop for SimpleReadGuard<'a> {
    fn drop(&mut self) {
        self.bpm.unpin(self.page_id);
    }
}

impl<'a> PageGuard for SimpleWriteGuard<'a> {
    fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl<'a> Deref for SimpleWriteGuard<'a> {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.guard.data
    }
}

impl<'a> DerefMut for SimpleWriteGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard.is_dirty = true;
        &mut self.guard.data
    }
}

impl<'a> Drop for SimpleWriteGuard<'a> {
    fn drop(&mut self) {
        self.bpm.unpin(self.page_id);
    }
}

impl SimpleBufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            frames.push(RwLock::new(Frame {
                page_id: INVALID_SENTINEL,
                data: [0; PAGE_SIZE],
                pin_count: 0,
                is_dirty: false,
                is_referenced: false,
            }));
            free_list.push(i);
        }
        Self {
            frames,
            page_table: RwLock::new(HashMap::new()),
            free_list: Mutex::new(free_list),
            disk_manager,
            pool_size,
            clock_hand: Mutex::new(0),
        }
    }

    fn unpin(&self, page_id: PageId) {
        let pt = self.page_table.read().unwrap();
        if let Some(&frame_id) = pt.get(&page_id) {
            let mut frame = self.frames[frame_id].write().unwrap();
            if frame.pin_count > 0 {
                frame.pin_count -= 1;
            }
        }
    }

    fn find_victim_frame(&self) -> Result<FrameId, BpmError> {
        {
            let mut free_list = self.free_list.lock().unwrap();
            if let Some(frame_id) = free_list.pop() {
                return Ok(frame_id);
            }
        }

        let mut clock_hand = self.clock_hand.lock().unwrap();
        for _ in 0..(2 * self.pool_size) {
            let frame_id = *clock_hand;
            *clock_hand = (*clock_hand + 1) % self.pool_size;

            if let Ok(mut frame) = self.frames[frame_id].try_write() {
                if frame.pin_count == 0 {
                    if frame.is_referenced {
                        frame.is_referenced = false;
                    } else {
                        return Ok(frame_id);
                    }
                }
            }
        }

        Err(BpmError::NoFreeFrames)
    }

    /// Pins `page_id`, loading it from disk into a frame if it isn't
    /// already resident, and bumps `pin_count` under the frame's own lock
    /// so eviction can't pick this frame while it's pinned.
    fn load_frame(&self, page_id: PageId) -> Result<FrameId, BpmError> {
        {
            let pt = self.page_table.read().unwrap();
            if let Some(&frame_id) = pt.get(&page_id) {
                let mut frame = self.frames[frame_id].write().unwrap();
                frame.pin_count += 1;
                frame.is_referenced = true;
                return Ok(frame_id);
            }
        }

        let frame_id = self.find_victim_frame()?;
        let mut frame = self.frames[frame_id].write().unwrap();

        if frame.is_dirty {
            self.disk_manager.write_page(frame.page_id, &frame.data)?;
        }
        let old_page_id = frame.page_id;

        self.disk_manager.read_page(page_id, &mut frame.data)?;
        frame.page_id = page_id;
        frame.pin_count = 1;
        frame.is_dirty = false;
        frame.is_referenced = true;
        drop(frame);

        let mut pt = self.page_table.write().unwrap();
        pt.remove(&old_page_id);
        pt.insert(page_id, frame_id);
        Ok(frame_id)
    }
}

const INVALID_SENTINEL: PageId = -1;

impl BufferPoolManager for SimpleBufferPoolManager {
    fn load_for_read(&self, page_id: PageId) -> Result<Box<dyn ReadPageGuard + '_>, BpmError> {
        let frame_id = self.load_frame(page_id)?;
        let guard = self.frames[frame_id].read().unwrap();
        Ok(Box::new(SimpleReadGuard { bpm: self, page_id, guard }))
    }

    fn load_for_write(&self, page_id: PageId) -> Result<Box<dyn PageGuard + '_>, BpmError> {
        let frame_id = self.load_frame(page_id)?;
        let guard = self.frames[frame_id].write().unwrap();
        Ok(Box::new(SimpleWriteGuard { bpm: self, page_id, guard }))
    }

    fn new_page(&self) -> Result<Box<dyn PageGuard + '_>, BpmError> {
        let frame_id = self.find_victim_frame()?;
        let new_page_id = {
            let mut frame = self.frames[frame_id].write().unwrap();
            if frame.is_dirty {
                self.disk_manager.write_page(frame.page_id, &frame.data)?;
            }
            let old_page_id = frame.page_id;
            let new_page_id = self.disk_manager.allocate_page()?;

            frame.page_id = new_page_id;
            frame.pin_count = 1;
            frame.is_dirty = true;
            frame.is_referenced = true;
            frame.data = [0; PAGE_SIZE];
            drop(frame);

            let mut pt = self.page_table.write().unwrap();
            pt.remove(&old_page_id);
            pt.insert(new_page_id, frame_id);
            new_page_id
        };

        let guard = self.frames[frame_id].write().unwrap();
        Ok(Box::new(SimpleWriteGuard { bpm: self, page_id: new_page_id, guard }))
    }

    fn flush_page(&self, page_id: PageId) -> Result<(), BpmError> {
        let pt = self.page_table.read().unwrap();
        if let Some(&frame_id) = pt.get(&page_id) {
            let mut frame = self.frames[frame_id].write().unwrap();
            if frame.is_dirty {
                self.disk_manager.write_page(page_id, &frame.data)?;
                frame.is_dirty = false;
            }
        }
        Ok(())
    }

    fn flush_all_pages(&self) -> Result<(), BpmError> {
        let pt = self.page_table.read().unwrap();
        for (&page_id, &frame_id) in pt.iter() {
            let mut frame = self.frames[frame_id].write().unwrap();
            if frame.is_dirty {
                self.disk_manager.write_page(page_id, &frame.data)?;
                frame.is_dirty = false;
            }
        }
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.disk_manager.page_count() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bpm(pool_size: usize) -> (tempfile::TempDir, SimpleBufferPoolManager) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.db");
        let dm = Arc::new(DiskManager::new(path.to_str().unwrap()).unwrap());
        (dir, SimpleBufferPoolManager::new(pool_size, dm))
    }

    #[test]
    fn new_page_then_read_back() {
        let (_dir, bpm) = bpm(4);
        let page_id = {
            let mut guard = bpm.new_page().unwrap();
            guard[0] = 7;
            guard.page_id()
        };
        let guard = bpm.load_for_read(page_id).unwrap();
        assert_eq!(guard[0], 7);
    }

    #[test]
    fn eviction_writes_back_dirty_pages() {
        let (_dir, bpm) = bpm(1);
        let p0 = {
            let mut g = bpm.new_page().unwrap();
            g[0] = 1;
            g.page_id()
        };
        let _p1 = {
            let mut g = bpm.new_page().unwrap();
            g[0] = 2;
            g.page_id()
        };
        let guard = bpm.load_for_read(p0).unwrap();
        assert_eq!(guard[0], 1);
    }

    #[test]
    fn exhausted_pool_errors_while_pinned() {
        let (_dir, bpm) = bpm(1);
        let _held = bpm.new_page().unwrap();
        match bpm.new_page() {
            Err(BpmError::NoFreeFrames) => {}
            other => panic!("expected NoFreeFrames, got {:?}", other.map(|g| g.page_id())),
        }
    }
}
