//! Standard (page-per-bucket) slotted bucket.
//!
//! One bucket is one whole page. The header layout below generalizes the
//! bonsai header to single-`i64` child/sibling pointers and swaps the
//! bonsai free-list pointer for the standard variant's
//! `values_free_list_first` (the external-value free list head, opaque
//! here — stored and logged only).
//!
//! ```text
//! 0x00 free_pointer            i32
//! 0x04 size                    i32
//! 0x08 flags                   i8
//! 0x09 values_free_list_first  i64
//! 0x11 left_sibling            i64
//! 0x19 right_sibling           i64
//! 0x21 tree_size               i64
//! 0x29 key_serializer_id       i8
//! 0x2A value_serializer_id     i8
//! 0x2B ...                     slot directory grows up
//! REGION_END <-                entries grow down
//! ```

use crate::bucket::raw::{
    compact_after_removal, encode_find_result, lower_bound, move_data, read_i32, read_i64, read_i8,
    update_slot_offsets_after_removal, write_i32, write_i64, write_i8,
};
use crate::config::MAX_ENTRY_SIZE;
use crate::error::{IndexError, IndexResult};
use crate::key::{IndexKey, KeyType};
use crate::pointer::StandardPointer;
use crate::value::standard_value_len_in_buffer;

const FREE_POINTER_OFFSET: usize = 0x00;
const SIZE_OFFSET: usize = 0x04;
const FLAGS_OFFSET: usize = 0x08;
const VALUES_FREE_LIST_FIRST_OFFSET: usize = 0x09;
const LEFT_SIBLING_OFFSET: usize = 0x11;
const RIGHT_SIBLING_OFFSET: usize = 0x19;
const TREE_SIZE_OFFSET: usize = 0x21;
const KEY_SERIALIZER_ID_OFFSET: usize = 0x29;
const VALUE_SERIALIZER_ID_OFFSET: usize = 0x2A;
pub const POSITIONS_ARRAY_OFFSET: usize = 0x2B;

const FLAG_LEAF: i8 = 0x1;

/// One decoded entry, either side of the leaf/internal split (design note
/// "raw-byte vs decoded APIs": `raw_key`/`raw_value` are the exact bytes
/// that cross the bucket boundary; `left`/`right` are decoded pointers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StandardEntry {
    Leaf { raw_key: Vec<u8>, raw_value: Vec<u8> },
    Internal { left: StandardPointer, right: StandardPointer, raw_key: Vec<u8> },
}

/// A view over one standard bucket's page bytes.
pub struct StandardBucket<'a> {
    region: &'a mut [u8],
    key_type: KeyType,
}

impl<'a> StandardBucket<'a> {
    pub fn new(region: &'a mut [u8], key_type: KeyType) -> Self {
        Self { region, key_type }
    }

    pub fn init(region: &mut [u8], is_leaf: bool) {
        let end = region.len() as i32;
        write_i32(region, FREE_POINTER_OFFSET, end);
        write_i32(region, SIZE_OFFSET, 0);
        write_i8(region, FLAGS_OFFSET, if is_leaf { FLAG_LEAF } else { 0 });
        write_i64(region, VALUES_FREE_LIST_FIRST_OFFSET, -1);
        write_i64(region, LEFT_SIBLING_OFFSET, StandardPointer::NULL.0);
        write_i64(region, RIGHT_SIBLING_OFFSET, StandardPointer::NULL.0);
        write_i64(region, TREE_SIZE_OFFSET, 0);
        write_i8(region, KEY_SERIALIZER_ID_OFFSET, 0);
        write_i8(region, VALUE_SERIALIZER_ID_OFFSET, 0);
    }

    pub fn is_leaf(&self) -> bool {
        read_i8(self.region, FLAGS_OFFSET) & FLAG_LEAF != 0
    }

    pub fn size(&self) -> usize {
        read_i32(self.region, SIZE_OFFSET) as usize
    }

    fn free_pointer(&self) -> usize {
        read_i32(self.region, FREE_POINTER_OFFSET) as usize
    }

    pub fn left_sibling(&self) -> StandardPointer {
        StandardPointer(read_i64(self.region, LEFT_SIBLING_OFFSET))
    }

    pub fn right_sibling(&self) -> StandardPointer {
        StandardPointer(read_i64(self.region, RIGHT_SIBLING_OFFSET))
    }

    pub fn set_left_sibling(&mut self, ptr: StandardPointer) -> i64 {
        let old = self.left_sibling().0;
        write_i64(self.region, LEFT_SIBLING_OFFSET, ptr.0);
        old
    }

    pub fn set_right_sibling(&mut self, ptr: StandardPointer) -> i64 {
        let old = self.right_sibling().0;
        write_i64(self.region, RIGHT_SIBLING_OFFSET, ptr.0);
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

    pub fn values_free_list_first(&self) -> i64 {
        read_i64(self.region, VALUES_FREE_LIST_FIRST_OFFSET)
    }

    pub fn set_values_free_list_first(&mut self, v: i64) -> i64 {
        let old = self.values_free_list_first();
        write_i64(self.region, VALUES_FREE_LIST_FIRST_OFFSET, v);
        old
    }

    pub fn key_serializer_id(&self) -> i8 {
        read_i8(self.region, KEY_SERIALIZER_ID_OFFSET)
    }

    pub fn value_serializer_id(&self) -> i8 {
        read_i8(self.region, VALUE_SERIALIZER_ID_OFFSET)
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

    /// Byte span `[start, end)` of entry `i` within the region.
    fn entry_span(&self, i: usize) -> (usize, usize) {
        let start = self.slot_offset(i);
        if self.is_leaf() {
            let key_len = IndexKey::object_size_in_buffer(&self.region[start..], &self.key_type);
            let value_start = start + key_len;
            let value_len = standard_value_len_in_buffer(&self.region[value_start..]);
            (start, start + key_len + value_len)
        } else {
            let key_len = IndexKey::object_size_in_buffer(&self.region[start + 16..], &self.key_type);
            (start, start + 16 + key_len)
        }
    }

    pub fn get_key(&self, i: usize) -> IndexKey {
        let (start, end) = self.entry_span(i);
        let key_start = if self.is_leaf() { start } else { start + 16 };
        IndexKey::deserialize_from_buffer(&self.region[key_start..end], &self.key_type)
    }

    pub fn get_entry(&self, i: usize) -> StandardEntry {
        let (start, end) = self.entry_span(i);
        if self.is_leaf() {
            let key_len = IndexKey::object_size_in_buffer(&self.region[start..], &self.key_type);
            StandardEntry::Leaf {
                raw_key: self.region[start..start + key_len].to_vec(),
                raw_value: self.region[start + key_len..end].to_vec(),
            }
        } else {
            let left = StandardPointer(read_i64(self.region, start));
            let right = StandardPointer(read_i64(self.region, start + 8));
            StandardEntry::Internal { left, right, raw_key: self.region[start + 16..end].to_vec() }
        }
    }

    pub fn get_raw_value(&self, i: usize) -> Vec<u8> {
        match self.get_entry(i) {
            StandardEntry::Leaf { raw_value, .. } => raw_value,
            StandardEntry::Internal { .. } => panic!("get_raw_value on internal bucket"),
        }
    }

    /// `find(key)`: present keys return their index, absent keys return
    /// `-(insertion_point + 1)`.
    pub fn find(&self, key: &IndexKey) -> i64 {
        let result = lower_bound(self.size(), |i| key.compare(&self.get_key(i)));
        encode_find_result(result)
    }

    fn entry_bytes(entry: &StandardEntry) -> Vec<u8> {
        match entry {
            StandardEntry::Leaf { raw_key, raw_value } => {
                let mut bytes = Vec::with_capacity(raw_key.len() + raw_value.len());
                bytes.extend_from_slice(raw_key);
                bytes.extend_from_slice(raw_value);
                bytes
            }
            StandardEntry::Internal { left, right, raw_key } => {
                let mut bytes = Vec::with_capacity(16 + raw_key.len());
                bytes.extend_from_slice(&left.0.to_le_bytes());
                bytes.extend_from_slice(&right.0.to_le_bytes());
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

    /// `add_leaf_entry(i, raw_key, raw_value)`.
    pub fn add_leaf_entry(&mut self, index: usize, raw_key: &[u8], raw_value: &[u8]) -> IndexResult<bool> {
        assert!(self.is_leaf(), "add_leaf_entry on internal bucket");
        self.check_entry_size(raw_key.len() + raw_value.len())?;
        let mut bytes = Vec::with_capacity(raw_key.len() + raw_value.len());
        bytes.extend_from_slice(raw_key);
        bytes.extend_from_slice(raw_value);
        Ok(self.insert_raw(index, &bytes))
    }

    /// `add_entry(i, entry, update_neighbors)`.
    pub fn add_entry(&mut self, index: usize, entry: &StandardEntry, update_neighbors: bool) -> IndexResult<bool> {
        let bytes = Self::entry_bytes(entry);
        self.check_entry_size(bytes.len())?;
        let inserted = self.insert_raw(index, &bytes);
        if inserted && update_neighbors {
            if let StandardEntry::Internal { left, right, .. } = entry {
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

    fn patch_left_child(&mut self, i: usize, left: StandardPointer) {
        let (start, _) = self.entry_span(i);
        write_i64(self.region, start, left.0);
    }

    fn patch_right_child(&mut self, i: usize, right: StandardPointer) {
        let (start, _) = self.entry_span(i);
        write_i64(self.region, start + 8, right.0);
    }

    /// `remove(i, ...)`: leaf only; returns the removed raw key/value.
    pub fn remove(&mut self, index: usize) -> (Vec<u8>, Vec<u8>) {
        assert!(self.is_leaf(), "remove on internal bucket");
        let entry = self.get_entry(index);
        let (raw_key, raw_value) = match entry {
            StandardEntry::Leaf { raw_key, raw_value } => (raw_key, raw_value),
            StandardEntry::Internal { .. } => unreachable!(),
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

    /// `update_value(i, raw_value, old_raw_value)`: same-length in-place overwrite.
    pub fn update_value(&mut self, index: usize, raw_value: &[u8]) -> Vec<u8> {
        let old = self.get_raw_value(index);
        assert_eq!(old.len(), raw_value.len(), "update_value length mismatch");
        let (start, end) = self.entry_span(index);
        let key_len = end - start - old.len();
        let value_start = start + key_len;
        self.region[value_start..end].copy_from_slice(raw_value);
        old
    }

    /// `shrink(new_size)`: keeps the first `new_size` entries, recompacts.
    pub fn shrink(&mut self, new_size: usize) {
        let size = self.size();
        assert!(new_size <= size);
        if new_size == size {
            return;
        }
        // Entries are stored in insertion order in the entry area but the
        // slot directory may reference them out of that order; rebuild the
        // region by re-adding the kept entries through the same path as
        // `add_all`, which also guarantees post-shrink contiguity (I2).
        let kept: Vec<StandardEntry> = (0..new_size).map(|i| self.get_entry(i)).collect();
        self.reset_empty();
        self.add_all(&kept).expect("shrunk entries always fit");
    }

    fn reset_empty(&mut self) {
        let end = self.region.len() as i32;
        write_i32(self.region, FREE_POINTER_OFFSET, end);
        write_i32(self.region, SIZE_OFFSET, 0);
    }

    /// `add_all(entries)`: bulk append into an empty region.
    pub fn add_all(&mut self, entries: &[StandardEntry]) -> IndexResult<()> {
        assert_eq!(self.size(), 0, "add_all requires an empty region");
        for (i, entry) in entries.iter().enumerate() {
            let ok = self.add_entry(i, entry, false)?;
            assert!(ok, "add_all entry did not fit");
        }
        Ok(())
    }

    #[allow(dead_code)]
    fn move_region(&mut self, src: usize, dst: usize, len: usize) {
        move_data(self.region, src, dst, len);
    }
}
