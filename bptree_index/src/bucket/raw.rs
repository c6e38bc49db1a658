//! Byte-level primitives shared by both bucket variants.
//!
//! Neither variant's layout is generic enough to unify into one type —
//! the header widths and pointer encodings differ — but the handful of
//! operations that only ever touch raw bytes (moving entry bytes around,
//! reading/writing little-endian scalars, the lower-bound binary search)
//! are identical, so they live here as free functions.

use std::cmp::Ordering;

/// Copies `len` bytes from `src` to `dst` within `region`, safe against
/// overlap.
pub fn move_data(region: &mut [u8], src: usize, dst: usize, len: usize) {
    if len == 0 || src == dst {
        return;
    }
    region.copy_within(src..src + len, dst);
}

pub fn read_i32(region: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(region[offset..offset + 4].try_into().unwrap())
}

pub fn write_i32(region: &mut [u8], offset: usize, value: i32) {
    region[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn read_i64(region: &[u8], offset: usize) -> i64 {
    i64::from_le_bytes(region[offset..offset + 8].try_into().unwrap())
}

pub fn write_i64(region: &mut [u8], offset: usize, value: i64) {
    region[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub fn read_i8(region: &[u8], offset: usize) -> i8 {
    region[offset] as i8
}

pub fn write_i8(region: &mut [u8], offset: usize, value: i8) {
    region[offset] = value as u8;
}

/// The canonical ascending lower-bound search: returns
/// `Ok(i)` if `compare(i)` is `Equal` for some `i`, else `Err(insertion_point)`
/// with `0 <= insertion_point <= size`. `compare(i)` must report `Less` if
/// the target sorts before slot `i`'s key, `Greater` if after, `Equal` on
/// match — i.e. it compares the *target* to slot `i`.
pub fn lower_bound<F>(size: usize, mut compare: F) -> Result<usize, usize>
where
    F: FnMut(usize) -> Ordering,
{
    if size == 0 {
        return Err(0);
    }
    let mut low: usize = 0;
    let mut high: usize = size - 1;
    loop {
        let mid = low + ((high - low) >> 1);
        match compare(mid) {
            Ordering::Equal => return Ok(mid),
            Ordering::Greater => {
                if mid == 0 {
                    return Err(0);
                }
                high = mid - 1;
            }
            Ordering::Less => {
                low = mid + 1;
            }
        }
        if low > high {
            return Err(low);
        }
    }
}

/// Closes the gap left by removing `removed_len` bytes at `removed_offset`
/// from the entry area `[free_pointer, REGION_END)`: shifts the bytes
/// between `free_pointer` and `removed_offset` up by `removed_len`.
/// Returns the new `free_pointer`.
pub fn compact_after_removal(
    region: &mut [u8],
    free_pointer: usize,
    removed_offset: usize,
    removed_len: usize,
) -> usize {
    move_data(region, free_pointer, free_pointer + removed_len, removed_offset - free_pointer);
    free_pointer + removed_len
}

/// Rewrites every slot offset in `[positions_array_offset, +size*4)` that
/// pointed below `removed_offset` (i.e. was shifted by
/// [`compact_after_removal`]) by adding `removed_len`.
pub fn update_slot_offsets_after_removal(
    region: &mut [u8],
    positions_array_offset: usize,
    size: usize,
    removed_offset: usize,
    removed_len: usize,
) {
    for i in 0..size {
        let slot_off = positions_array_offset + i * 4;
        let entry_off = read_i32(region, slot_off) as usize;
        if entry_off < removed_offset {
            write_i32(region, slot_off, (entry_off + removed_len) as i32);
        }
    }
}

/// Encodes the `find` contract: present keys return their index, absent
/// keys return `-(insertion_point + 1)`.
pub fn encode_find_result(result: Result<usize, usize>) -> i64 {
    match result {
        Ok(i) => i as i64,
        Err(insertion_point) => -(insertion_point as i64) - 1,
    }
}

pub fn decode_find_result(item_index: i64) -> Result<usize, usize> {
    if item_index >= 0 {
        Ok(item_index as usize)
    } else {
        Err((-(item_index + 1)) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_data_handles_overlap_forward_and_backward() {
        let mut region = vec![1u8, 2, 3, 4, 5, 0, 0, 0];
        move_data(&mut region, 0, 2, 5);
        assert_eq!(&region[2..7], &[1, 2, 3, 4, 5]);

        let mut region = vec![0u8, 0, 1, 2, 3, 4, 5];
        move_data(&mut region, 2, 0, 5);
        assert_eq!(&region[0..5], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn scalar_round_trips() {
        let mut buf = vec![0u8; 16];
        write_i32(&mut buf, 0, -7);
        write_i64(&mut buf, 4, i64::MIN + 3);
        write_i8(&mut buf, 12, -1);
        assert_eq!(read_i32(&buf, 0), -7);
        assert_eq!(read_i64(&buf, 4), i64::MIN + 3);
        assert_eq!(read_i8(&buf, 12), -1);
    }

    #[test]
    fn lower_bound_finds_exact_and_insertion_point() {
        let keys = [1, 3, 5, 7, 9];
        let search = |target: i32| lower_bound(keys.len(), |i| target.cmp(&keys[i]));
        assert_eq!(search(5), Ok(2));
        assert_eq!(search(0), Err(0));
        assert_eq!(search(4), Err(2));
        assert_eq!(search(10), Err(5));
        assert_eq!(lower_bound(0, |_| Ordering::Equal), Err(0));
    }

    #[test]
    fn compact_after_removal_closes_the_gap_and_rewrites_offsets() {
        // Two 8-byte slots at offset 0, then the entry area: a live entry
        // at [4, 8) (free_pointer==4) and the entry being removed at [8, 12).
        let mut region = vec![0u8; 16];
        write_i32(&mut region, 0, 4); // slot 0 -> entry at offset 4 (kept)
        write_i32(&mut region, 4, 8); // slot 1 -> entry at offset 8 (removed)
        region[4..8].copy_from_slice(&[9, 9, 9, 9]);
        region[8..12].copy_from_slice(&[7, 7, 7, 7]);

        let new_fp = compact_after_removal(&mut region, 4, 8, 4);
        assert_eq!(new_fp, 8);
        assert_eq!(&region[8..12], &[9, 9, 9, 9]);

        update_slot_offsets_after_removal(&mut region, 0, 1, 8, 4);
        assert_eq!(read_i32(&region, 0), 8);
    }

    #[test]
    fn find_result_encoding_matches_contract() {
        assert_eq!(encode_find_result(Ok(3)), 3);
        assert_eq!(encode_find_result(Err(0)), -1);
        assert_eq!(encode_find_result(Err(5)), -6);
        assert_eq!(decode_find_result(3), Ok(3));
        assert_eq!(decode_find_result(-1), Err(0));
        assert_eq!(decode_find_result(-6), Err(5));
    }
}
