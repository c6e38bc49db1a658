//! Value encoding helpers.
//!
//! The tree and bucket layers never decode values themselves — per the
//! "raw-byte vs decoded APIs" design note, values cross the bucket
//! boundary as opaque bytes (`RawValue`) that the caller's own key/value
//! serializer produced. What lives here is the one encoding rule the
//! bucket layer *does* need to know about: the standard leaf's
//! `is_link` byte, which lets a value be stored either as a direct
//! `i64` link (e.g. a record id) or as caller-serialized bytes.

/// Opaque, already-serialized bytes crossing the bucket boundary.
pub type RawValue = Vec<u8>;

/// Declares whether a tree's values are fixed-length. The bonsai variant
/// requires `Fixed`; the standard variant accepts either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueLayout {
    Fixed(usize),
    Variable,
}

impl ValueLayout {
    pub fn is_fixed_length(&self) -> bool {
        matches!(self, ValueLayout::Fixed(_))
    }

    pub fn fixed_length(&self) -> Option<usize> {
        match self {
            ValueLayout::Fixed(n) => Some(*n),
            ValueLayout::Variable => None,
        }
    }
}

/// Encodes a standard-leaf value: `[is_link:u8][value_bytes]`, where
/// `value_bytes` is an 8-byte little-endian link if `link` is `Some`, or
/// a self-describing `[len:u32][payload]` otherwise. The length prefix on
/// the non-link arm is what lets the bucket layer compute an entry's byte
/// span without consulting the (out-of-scope) value serializer — see the
/// "raw-byte vs decoded APIs" design note.
pub fn encode_standard_value(link: Option<i64>, payload: &[u8]) -> RawValue {
    let mut out = Vec::with_capacity(1 + payload.len().max(8));
    match link {
        Some(l) => {
            out.push(1);
            out.extend_from_slice(&l.to_le_bytes());
        }
        None => {
            out.push(0);
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(payload);
        }
    }
    out
}

/// Decodes a standard-leaf value produced by [`encode_standard_value`].
/// Returns `Ok(link)` if the value is a link, `Err(payload)` otherwise.
pub fn decode_standard_value(bytes: &[u8]) -> Result<i64, &[u8]> {
    assert!(!bytes.is_empty(), "empty standard value");
    if bytes[0] == 1 {
        Ok(i64::from_le_bytes(bytes[1..9].try_into().unwrap()))
    } else {
        let len = u32::from_le_bytes(bytes[1..5].try_into().unwrap()) as usize;
        Err(&bytes[5..5 + len])
    }
}

/// Total length in bytes of a standard value starting at `bytes[0]`,
/// without fully decoding it — the value-side analogue of
/// `IndexKey::object_size_in_buffer`.
pub fn standard_value_len_in_buffer(bytes: &[u8]) -> usize {
    if bytes[0] == 1 {
        9
    } else {
        let len = u32::from_le_bytes(bytes[1..5].try_into().unwrap()) as usize;
        5 + len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_round_trips() {
        let encoded = encode_standard_value(Some(42), &[]);
        assert_eq!(standard_value_len_in_buffer(&encoded), encoded.len());
        assert_eq!(decode_standard_value(&encoded), Ok(42));
    }

    #[test]
    fn payload_round_trips() {
        let encoded = encode_standard_value(None, b"hello");
        assert_eq!(standard_value_len_in_buffer(&encoded), encoded.len());
        assert_eq!(decode_standard_value(&encoded), Err(b"hello".as_slice()));
    }
}
