//! Bonsai (many-buckets-per-page) slotted bucket.
//!
//! Exact on-disk layout, little-endian, offsets relative to the region
//! start:
//!
//! ```text
//! 0x00 free_pointer        i32
//! 0x04 size                i32
//! 0x08 flags               i8
//! 0x09 free_list_ptr       (i64,i32,i32)   // 16 bytes
//! 0x19 left_sibling        (i64,i32,i32)
//! 0x29 right_sibling       (i64,i32,i32)
//! 0x39 tree_size           i64
//! 0x41 key_serializer_id   i8
//! 0x42 value_serializer_id i8
//! 0x43 ...                 slot directory grows up
//! REGION_END <-            entries grow down
//! ```

use crate::bucket::raw::{
    compact_after_removal, encode_find_result, lower_bound, read_i32, read_i64, read_i8,
    update_slot_offsets_after_removal, write_i32, write_i64, write_i8,
};
use crate::config::MAX_ENTRY_SIZE;
use crate::error::{IndexError, IndexResult};
use crate::key::{IndexKey, KeyType};
use crate::pointer::BonsaiPointer;

const FREE_POINTER_OFFSET: usize = 0x00;
const SIZE_OFFSET: usize = 0x04;
const FLAGS_OFFSET: usize = 0x08;
pub(crate) const FREE_LIST_PTR_OFFSET: usize = 0x09;
const LEFT_SIBLING_OFFSET: usize = 0x19;
const RIGHT_SIBLING_OFFSET: usize = 0x29;
const TREE_SIZE_OFFSET: usize = 0x39;
const KEY_SERIALIZER_ID_OFFSET: usize = 0x41;
const VALUE_SERIALIZER_ID_OFFSET: usize = 0x42;
pub const POSITIONS_ARRAY_OFFSET: usize = 0x43;

const FLAG_LEAF: i8 = 0x1;
const FLAG_DELETED: i8 = 0x2;

const CHILD_LEN: usize = BonsaiPointer::CHILD_BYTES_LEN; // 12
const FULL_PTR_LEN: usize = BonsaiPointer::FULL_BYTES_LEN; // 16

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BonsaiEntry {
    Leaf { raw_key: Vec<u8>, raw_value: Vec<u8> },
    Internal { left: BonsaiPointer, right: BonsaiPointer, raw_key: Vec<u8> },
}

/// A view over one bonsai sub-page bucket region. `binary_version` is not
/// stored per internal entry — callers supply the tree's current version
/// when decoding child pointers.
pub struct BonsaiBucket<'a> {
    region: &'a mut [u8],
    key_type: KeyType,
    value_len: usize,
    binary_version: i32,
}

impl<'a> BonsaiBucket<'a> {
    pub fn new(region: &'a mut [u8], key_type: KeyType, value_len: usize, binary_version: i32) -> Self {
        Self { region, key_type, value_len, binary_version }
    }

    pub fn init(region: &mut [u8], is_leaf: bool, binary_version: i32) {
        let end = region.len() as i32;
        write_i32(region, FREE_POINTER_OFFSET, end);
        write_i32(region, SIZE_OFFSET, 0);
        write_i8(region, FLAGS_OFFSET, if is_leaf { FLAG_LEAF } else { 0 });
        write_full_ptr(region, FREE_LIST_PTR_OFFSET, &BonsaiPointer::null(binary_version));
        write_full_ptr(region, LEFT_SIBLING_OFFSET, &BonsaiPointer::null(binary_version));
        write_full_ptr(region, RIGHT_SIBLING_OFFSET, &BonsaiPointer::null(binary_version));
        write_i64(region, TREE_SIZE_OFFSET, 0);
        write_i8(region, KEY_SERIALIZER_ID_OFFSET, 0);
        write_i8(region, VALUE_SERIALIZER_ID_OFFSET, 0);
    }

    pub fn is_leaf(&self) -> bool {
        read_i8(self.region, FLAGS_OFFSET) & FLAG_LEAF != 0
    }

    pub fn is_deleted(&self) -> bool {
        read_i8(self.region, FLAGS_OFFSET) & FLAG_DELETED != 0
    }

    pub fn set_deleted(&mut self) -> i8 {
        let old = read_i8(self.region, FLAGS_OFFSET);
        write_i8(self.region, FLAGS_OFFSET, old | FLAG_DELETED);
        old
    }

    pub fn size(&self) -> usize {
        read_i32(self.region, SIZE_OFFSET) as usize
    }

    fn free_pointer(&self) -> usize {
        read_i32(self.region, FREE_POINTER_OFFSET) as usize
    }

    pub fn free_list_pointer(&self) -> BonsaiPointer {
        read_full_ptr(self.region, FREE_LIST_PTR_OFFSET)
    }

    pub fn set_free_list_pointer(&mut self, ptr: BonsaiPointer) -> BonsaiPointer {
        assert!(self.is_deleted(), "set_free_list_pointer requires a DELETED bucket");
        let old = self.free_list_pointer();
        write_full_ptr(self.region, FREE_LIST_PTR_OFFSET, &ptr);
        old
    }

    pub fn left_sibling(&self) -> BonsaiPointer {
        read_full_ptr(self.region, LEFT_SIBLING_OFFSET)
    }

    pub fn right_sibling(&self) -> BonsaiPointer {
        read_full_ptr(self.region, RIGHT_SIBLING_OFFSET)
    }

    pub fn set_left_sibling(&mut self, ptr: BonsaiPointer) -> BonsaiPointer {
        let old = self.left_sibling();
        write_full_ptr(self.region, LEFT_SIBLING_OFFSET, &ptr);
        old
    }

    pub fn set_right_sibling(&mut self, ptr: BonsaiPointer) -> BonsaiPointer {
        let old = self.right_sibling();
        write_full_ptr(self.region, RIGHT_SIBLING_OFFSET, &ptr);
        old
    }

    pub fn tree_size(&self) -> i64 {
        read_i64(self.region, TREE_SIZE_OFFSET)
    }

    pub fn set_tree_size(&mut self, n: i64) -> i64 {
        let old = self.tree_size();
        write_i64(self.region, TREE_SIZE_OFFSET, n);
        old
    }

    pub fn set_serializer_ids(&mut self, key_id: i8, value_id: i8) {
        write_i8(self.region, KEY_SERIALIZER_ID_OFFSET, key_id);
        write_i8(self.region, VALUE_SERIALIZER_ID_OFFSET, value_id);
    }

    fn slot_offset(&self, i: usize) -> usize {
        read_i32(self.region, POSITIONS_ARRAY_OFFSET + i * 4) as usize
    }

    fn set_slot_offset(&mut self, i: usize, offset: usize) {
        write_i32(self.region, POSITIONS_ARRAY_OFFSET + i * 4, offset as i32);
    }

    fn entry_span(&self, i: usize) -> (usize, usize) {
        let start = self.slot_offset(i);
        if self.is_leaf() {
            let key_len = IndexKey::object_size_in_buffer(&self.region[start..], &self.key_type);
            (start, start + key_len + self.value_len)
        } else {
            let key_len = IndexKey::object_size_in_buffer(&self.region[start + 2 * CHILD_LEN..], &self.key_type);
            (start, start + 2 * CHILD_LEN + key_len)
        }
    }

    pub fn get_key(&self, i: usize) -> IndexKey {
        let (start, end) = self.entry_span(i);
        let key_start = if self.is_leaf() { start } else { start + 2 * CHILD_LEN };
        IndexKey::deserialize_from_buffer(&self.region[key_start..end], &self.key_type)
    }

    pub fn get_entry(&self, i: usize) -> BonsaiEntry {
        let (start, end) = self.entry_span(i);
        if self.is_leaf() {
            let key_len = IndexKey::object_size_in_buffer(&self.region[start..], &self.key_type);
            BonsaiEntry::Leaf {
                raw_key: self.region[start..start + key_len].to_vec(),
                raw_value: self.region[start + key_len..end].to_vec(),
            }
        } else {
            let left = BonsaiPointer::read_child_bytes(&self.region[start..start + CHILD_LEN], self.binary_version);
            let right = BonsaiPointer::read_child_bytes(
                &self.region[start + CHILD_LEN..start + 2 * CHILD_LEN],
                self.binary_version,
            );
            BonsaiEntry::Internal { left, right, raw_key: self.region[start + 2 * CHILD_LEN..end].to_vec() }
        }
    }

    pub fn get_raw_value(&self, i: usize) -> Vec<u8> {
        match self.get_entry(i) {
            BonsaiEntry::Leaf { raw_value, .. } => raw_value,
            BonsaiEntry::Internal { .. } => panic!("get_raw_value on internal bucket"),
        }
    }

    pub fn find(&self, key: &IndexKey) -> i64 {
        let result = lower_bound(self.size(), |i| key.compare(&self.get_key(i)));
        encode_find_result(result)
    }

    fn entry_bytes(entry: &BonsaiEntry) -> Vec<u8> {
        match entry {
            BonsaiEntry::Leaf { raw_key, raw_value } => {
                let mut bytes = Vec::with_capacity(raw_key.len() + raw_value.len());
                bytes.extend_from_slice(raw_key);
                bytes.extend_from_slice(raw_value);
                bytes
            }
            BonsaiEntry::Internal { left, right, raw_key } => {
                let mut bytes = Vec::with_capacity(2 * CHILD_LEN + raw_key.len());
                left.write_child_bytes(&mut bytes);
                right.write_child_bytes(&mut bytes);
                bytes.extend_from_slice(raw_key);
                bytes
            }
        }
    }

    fn fits(&self, entry_len: usize) -> bool {
        let new_free_pointer = self.free_pointer() as i64 - entry_len as i64;
        let slots_end = (POSITIONS_ARRAY_OFFSET + (self.size() + 1) * 4) as i64;
        new_free_pointer >= slots_end
    }

    fn check_entry_size(&self, entry_len: usize) -> IndexResult<()> {
        if entry_len > MAX_ENTRY_SIZE {
            return Err(IndexError::EntryTooLarge { size: entry_len, limit: MAX_ENTRY_SIZE });
        }
        if self.size() == 0 && !self.fits(entry_len) {
            return Err(IndexError::EntryTooLarge { size: entry_len, limit: self.region.len() });
        }
        Ok(())
    }

    fn insert_raw(&mut self, index: usize, bytes: &[u8]) -> bool {
        if !self.fits(bytes.len()) {
            return false;
        }
        let new_free_pointer = self.free_pointer() - bytes.len();
        self.region[new_free_pointer..new_free_pointer + bytes.len()].copy_from_slice(bytes);
        write_i32(self.region, FREE_POINTER_OFFSET, new_free_pointer as i32);

        let size = self.size();
        for i in (index..size).rev() {
            let off = self.slot_offset(i);
            self.set_slot_offset(i + 1, off);
        }
        self.set_slot_offset(index, new_free_pointer);
        write_i32(self.region, SIZE_OFFSET, (size + 1) as i32);
        true
    }

    /// Bonsai leaf values must be fixed length; `raw_value`'s length is
    /// asserted against the tree's declared `value_len`.
    pub fn add_leaf_entry(&mut self, index: usize, raw_key: &[u8], raw_value: &[u8]) -> IndexResult<bool> {
        assert!(self.is_leaf(), "add_leaf_entry on internal bucket");
        assert_eq!(raw_value.len(), self.value_len, "bonsai leaf value must be fixed length");
        self.check_entry_size(raw_key.len() + raw_value.len())?;
        let mut bytes = Vec::with_capacity(raw_key.len() + raw_value.len());
        bytes.extend_from_slice(raw_key);
        bytes.extend_from_slice(raw_value);
        Ok(self.insert_raw(index, &bytes))
    }

    pub fn add_entry(&mut self, index: usize, entry: &BonsaiEntry, update_neighbors: bool) -> IndexResult<bool> {
        let bytes = Self::entry_bytes(entry);
        self.check_entry_size(bytes.len())?;
        let inserted = self.insert_raw(index, &bytes);
        if inserted && update_neighbors {
            if let BonsaiEntry::Internal { left, right, .. } = entry {
                if index > 0 {
                    self.patch_right_child(index - 1, *left);
                }
                if index + 1 < self.size() {
                    self.patch_left_child(index + 1, *right);
                }
            }
        }
        Ok(inserted)
    }

    fn patch_left_child(&mut self, i: usize, left: BonsaiPointer) {
        let (start, _) = self.entry_span(i);
        let mut bytes = Vec::with_capacity(CHILD_LEN);
        left.write_child_bytes(&mut bytes);
        self.region[start..start + CHILD_LEN].copy_from_slice(&bytes);
    }

    fn patch_right_child(&mut self, i: usize, right: BonsaiPointer) {
        let (start, _) = self.entry_span(i);
        let mut bytes = Vec::with_capacity(CHILD_LEN);
        right.write_child_bytes(&mut bytes);
        self.region[start + CHILD_LEN..start + 2 * CHILD_LEN].copy_from_slice(&bytes);
    }

    pub fn remove(&mut self, index: usize) -> (Vec<u8>, Vec<u8>) {
        assert!(self.is_leaf(), "remove on internal bucket");
        let entry = self.get_entry(index);
        let (raw_key, raw_value) = match entry {
            BonsaiEntry::Leaf { raw_key, raw_value } => (raw_key, raw_value),
            BonsaiEntry::Internal { .. } => unreachable!(),
        };
        let (start, end) = self.entry_span(index);
        let free_pointer = self.free_pointer();
        let new_free_pointer = compact_after_removal(self.region, free_pointer, start, end - start);
        write_i32(self.region, FREE_POINTER_OFFSET, new_free_pointer as i32);
        update_slot_offsets_after_removal(self.region, POSITIONS_ARRAY_OFFSET, self.size(), start, end - start);

        let size = self.size();
        for i in index + 1..size {
            let off = self.slot_offset(i);
            self.set_slot_offset(i - 1, off);
        }
        write_i32(self.region, SIZE_OFFSET, (size - 1) as i32);
        (raw_key, raw_value)
    }

    pub fn update_value(&mut self, index: usize, raw_value: &[u8]) -> Vec<u8> {
        assert_eq!(raw_value.len(), self.value_len);
        let old = self.get_raw_value(index);
        let (_, end) = self.entry_span(index);
        let value_start = end - self.value_len;
        self.region[value_start..end].copy_from_slice(raw_value);
        old
    }

    pub fn shrink(&mut self, new_size: usize) {
        let size = self.size();
        assert!(new_size <= size);
        if new_size == size {
            return;
        }
        let kept: Vec<BonsaiEntry> = (0..new_size).map(|i| self.get_entry(i)).collect();
        let end = self.region.len() as i32;
        write_i32(self.region, FREE_POINTER_OFFSET, end);
        write_i32(self.region, SIZE_OFFSET, 0);
        self.add_all(&kept).expect("shrunk entries always fit");
    }

    pub fn add_all(&mut self, entries: &[BonsaiEntry]) -> IndexResult<()> {
        assert_eq!(self.size(), 0, "add_all requires an empty region");
        for (i, entry) in entries.iter().enumerate() {
            let ok = self.add_entry(i, entry, false)?;
            assert!(ok, "add_all entry did not fit");
        }
        Ok(())
    }
}

fn write_full_ptr(region: &mut [u8], offset: usize, ptr: &BonsaiPointer) {
    let mut bytes = Vec::with_capacity(FULL_PTR_LEN);
    ptr.write_full_bytes(&mut bytes);
    region[offset..offset + FULL_PTR_LEN].copy_from_slice(&bytes);
}

fn read_full_ptr(region: &[u8], offset: usize) -> BonsaiPointer {
    BonsaiPointer::read_full_bytes(&region[offset..offset + FULL_PTR_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_entry(key: i32, value: i64) -> BonsaiEntry {
        let mut raw_key = Vec::new();
        IndexKey::Integer(key).serialize(&mut raw_key);
        BonsaiEntry::Leaf { raw_key, raw_value: value.to_le_bytes().to_vec() }
    }

    #[test]
    fn add_all_bulk_appends_in_given_order() {
        let mut region = vec![0u8; 512];
        BonsaiBucket::init(&mut region, true, 1);
        let mut bucket = BonsaiBucket::new(&mut region, KeyType::Integer, 8, 1);
        bucket.add_all(&[leaf_entry(1, 10), leaf_entry(2, 20), leaf_entry(3, 30)]).unwrap();
        assert_eq!(bucket.size(), 3);
        assert_eq!(bucket.get_key(1), IndexKey::Integer(2));
    }

    #[test]
    fn sorted_insert_via_find() {
        let mut region = vec![0u8; 512];
        BonsaiBucket::init(&mut region, true, 1);
        let mut bucket = BonsaiBucket::new(&mut region, KeyType::Integer, 8, 1);
        for (k, v) in [(2, 20), (1, 10), (3, 30)] {
            let idx = match bucket.find(&IndexKey::Integer(k)) {
                r if r >= 0 => r as usize,
                r => crate::bucket::raw::decode_find_result(r).unwrap_err(),
            };
            bucket.add_leaf_entry(idx, &{
                let mut b = Vec::new();
                IndexKey::Integer(k).serialize(&mut b);
                b
            }, &v_i64(v)).unwrap();
        }
        assert_eq!(bucket.get_key(0), IndexKey::Integer(1));
        assert_eq!(bucket.get_key(1), IndexKey::Integer(2));
        assert_eq!(bucket.get_key(2), IndexKey::Integer(3));
    }

    fn v_i64(v: i64) -> Vec<u8> {
        v.to_le_bytes().to_vec()
    }

    #[test]
    fn delete_flag_and_free_list_pointer() {
        let mut region = vec![0u8; 512];
        BonsaiBucket::init(&mut region, true, 1);
        let mut bucket = BonsaiBucket::new(&mut region, KeyType::Integer, 8, 1);
        assert!(!bucket.is_deleted());
        bucket.set_deleted();
        assert!(bucket.is_deleted());
        let next = BonsaiPointer { page_index: 4, page_offset: 256, binary_version: 1 };
        bucket.set_free_list_pointer(next);
        assert_eq!(bucket.free_list_pointer(), next);
    }

    #[test]
    fn sibling_pointers_round_trip() {
        let mut region = vec![0u8; 512];
        BonsaiBucket::init(&mut region, true, 1);
        let mut bucket = BonsaiBucket::new(&mut region, KeyType::Integer, 8, 1);
        let right = BonsaiPointer { page_index: 9, page_offset: 0, binary_version: 1 };
        bucket.set_right_sibling(right);
        assert_eq!(bucket.right_sibling(), right);
        assert!(bucket.left_sibling().is_null());
    }
}
