//! Bonsai system bucket: per-file allocator metadata.
//!
//! Fixed location — page 0, offset 0 — modeled as a typed view over that
//! page's bytes rather than global state (design note: "Bonsai system
//! bucket singleton"), constructed fresh per file open.
//!
//! ```text
//! 0x00 free_list_head       (i64,i32,i32)   // 16 bytes
//! 0x10 free_list_length     i32
//! 0x14 free_space_pointer   (i64,i32,i32)   // 16 bytes
//! ```

use crate::pointer::BonsaiPointer;
use crate::bucket::raw::{read_i32, write_i32};

const FREE_LIST_HEAD_OFFSET: usize = 0x00;
const FREE_LIST_LENGTH_OFFSET: usize = 0x10;
const FREE_SPACE_POINTER_OFFSET: usize = 0x14;

pub const SYSTEM_BUCKET_PAGE: page_store::PageId = 0;

pub struct SystemBucket<'a> {
    region: &'a mut [u8],
}

impl<'a> SystemBucket<'a> {
    pub fn new(region: &'a mut [u8]) -> Self {
        Self { region }
    }

    pub fn init(region: &mut [u8], binary_version: i32) {
        write_full_ptr(region, FREE_LIST_HEAD_OFFSET, &BonsaiPointer::null(binary_version));
        write_i32(region, FREE_LIST_LENGTH_OFFSET, 0);
        // Callers overwrite this with `BonsaiAllocator::exhausted_free_space_pointer()`
        // right after init, so the first `allocate()` takes the new-page branch.
        write_full_ptr(region, FREE_SPACE_POINTER_OFFSET, &BonsaiPointer::null(binary_version));
    }

    pub fn free_list_head(&self) -> BonsaiPointer {
        read_full_ptr(self.region, FREE_LIST_HEAD_OFFSET)
    }

    pub fn set_free_list_head(&mut self, ptr: BonsaiPointer) {
        write_full_ptr(self.region, FREE_LIST_HEAD_OFFSET, &ptr);
    }

    pub fn free_list_length(&self) -> i32 {
        read_i32(self.region, FREE_LIST_LENGTH_OFFSET)
    }

    pub fn set_free_list_length(&mut self, len: i32) {
        write_i32(self.region, FREE_LIST_LENGTH_OFFSET, len);
    }

    pub fn free_space_pointer(&self) -> BonsaiPointer {
        read_full_ptr(self.region, FREE_SPACE_POINTER_OFFSET)
    }

    pub fn set_free_space_pointer(&mut self, ptr: BonsaiPointer) {
        write_full_ptr(self.region, FREE_SPACE_POINTER_OFFSET, &ptr);
    }
}

fn write_full_ptr(region: &mut [u8], offset: usize, ptr: &BonsaiPointer) {
    let mut bytes = Vec::with_capacity(BonsaiPointer::FULL_BYTES_LEN);
    ptr.write_full_bytes(&mut bytes);
    region[offset..offset + BonsaiPointer::FULL_BYTES_LEN].copy_from_slice(&bytes);
}

fn read_full_ptr(region: &[u8], offset: usize) -> BonsaiPointer {
    BonsaiPointer::read_full_bytes(&region[offset..offset + BonsaiPointer::FULL_BYTES_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_starts_with_empty_free_list() {
        let mut page = vec![0u8; 4096];
        SystemBucket::init(&mut page, 1);
        let sb = SystemBucket::new(&mut page);
        assert!(sb.free_list_head().is_null());
        assert_eq!(sb.free_list_length(), 0);
    }

    #[test]
    fn free_list_head_and_length_round_trip() {
        let mut page = vec![0u8; 4096];
        SystemBucket::init(&mut page, 1);
        let mut sb = SystemBucket::new(&mut page);
        let head = BonsaiPointer { page_index: 3, page_offset: 128, binary_version: 1 };
        sb.set_free_list_head(head);
        sb.set_free_list_length(5);
        assert_eq!(sb.free_list_head(), head);
        assert_eq!(sb.free_list_length(), 5);
    }
}
