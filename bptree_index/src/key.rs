//! Key type and the key-serializer contract.
//!
//! Two key shapes (`Integer`, `Varchar`) with an ascending comparator,
//! serialized little-endian so the on-disk bytes are host-independent
//! (native-endian encoding would make a file written on one machine
//! unreadable on another). Method names line up with the serializer
//! contract: `object_size`, `serialize`, `deserialize_from_buffer`,
//! `object_size_in_buffer`.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Integer,
    Varchar { max_length: u32 },
}

impl KeyType {
    /// Upper bound on the serialized size of any key of this type.
    pub fn max_size(&self) -> usize {
        match self {
            KeyType::Integer => 4,
            KeyType::Varchar { max_length } => 4 + *max_length as usize,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Integer(i32),
    Varchar(String),
}

impl IndexKey {
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IndexKey::Integer(a), IndexKey::Integer(b)) => a.cmp(b),
            (IndexKey::Varchar(a), IndexKey::Varchar(b)) => a.cmp(b),
            _ => panic!("cannot compare keys of different types"),
        }
    }

    /// `object_size` — the exact serialized length of this key value.
    pub fn object_size(&self) -> usize {
        match self {
            IndexKey::Integer(_) => 4,
            IndexKey::Varchar(s) => 4 + s.len(),
        }
    }

    /// `serialize` — appends this key's bytes to `buf`.
    pub fn serialize(&self, buf: &mut Vec<u8>) {
        match self {
            IndexKey::Integer(v) => buf.extend_from_slice(&v.to_le_bytes()),
            IndexKey::Varchar(s) => {
                buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
        }
    }

    /// `deserialize_from_buffer` — reads one key of `key_type` starting at
    /// `bytes[0]`.
    pub fn deserialize_from_buffer(bytes: &[u8], key_type: &KeyType) -> Self {
        match key_type {
            KeyType::Integer => {
                let v = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
                IndexKey::Integer(v)
            }
            KeyType::Varchar { .. } => {
                let len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
                let s = String::from_utf8(bytes[4..4 + len].to_vec()).expect("invalid utf-8 key");
                IndexKey::Varchar(s)
            }
        }
    }

    /// `object_size_in_buffer` — how many bytes a key of `key_type` at
    /// `bytes[0]` occupies, without fully decoding it.
    pub fn object_size_in_buffer(bytes: &[u8], key_type: &KeyType) -> usize {
        match key_type {
            KeyType::Integer => 4,
            KeyType::Varchar { .. } => {
                let len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
                4 + len
            }
        }
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_round_trips() {
        let key = IndexKey::Integer(-42);
        let mut buf = Vec::new();
        key.serialize(&mut buf);
        assert_eq!(buf.len(), key.object_size());
        assert_eq!(IndexKey::object_size_in_buffer(&buf, &KeyType::Integer), 4);
        assert_eq!(IndexKey::deserialize_from_buffer(&buf, &KeyType::Integer), key);
    }

    #[test]
    fn varchar_round_trips() {
        let key = IndexKey::Varchar("hello".to_string());
        let mut buf = Vec::new();
        key.serialize(&mut buf);
        let kt = KeyType::Varchar { max_length: 100 };
        assert_eq!(IndexKey::object_size_in_buffer(&buf, &kt), buf.len());
        assert_eq!(IndexKey::deserialize_from_buffer(&buf, &kt), key);
    }

    #[test]
    fn ordering_matches_comparator() {
        assert_eq!(IndexKey::Integer(1).compare(&IndexKey::Integer(2)), Ordering::Less);
        assert_eq!(
            IndexKey::Varchar("a".into()).compare(&IndexKey::Varchar("b".into())),
            Ordering::Less
        );
    }
}
