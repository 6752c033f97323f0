use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::ops::Bound;

const METADATA_TAG: u8 = 0x00;
const COLGROUP_TAG: u8 = 0x01;
const INDEX_TAG: u8 = 0x02;

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EncodedKey {
    bytes: SmallVec<[u8; 64]>,
}

impl EncodedKey {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes.into_vec()
    }

    /// `self` followed by `suffix`.
    pub fn join(&self, suffix: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bytes.len() + suffix.len());
        out.extend_from_slice(&self.bytes);
        out.extend_from_slice(suffix);
        out
    }

    /// Strips this prefix from `key`, `None` if `key` lives elsewhere.
    pub fn strip<'a>(&self, key: &'a [u8]) -> Option<&'a [u8]> {
        key.strip_prefix(self.bytes.as_slice())
    }

    /// Half-open bounds covering every key that starts with this prefix.
    pub fn range(&self) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
        let start = Bound::Included(self.bytes.to_vec());
        match prefix_successor(self) {
            Some(end) => (start, Bound::Excluded(end.into_vec())),
            None => (start, Bound::Unbounded),
        }
    }
}

/// Key range of one column group's records.
pub fn colgroup_namespace(table: &str, group: &str) -> EncodedKey {
    namespace(COLGROUP_TAG, table, group)
}

/// Key range of one index's entries.
pub fn index_namespace(table: &str, index: &str) -> EncodedKey {
    namespace(INDEX_TAG, table, index)
}

/// Schema metadata record for a table.
pub fn metadata_key(table: &str) -> EncodedKey {
    namespace(METADATA_TAG, table, "")
}

pub fn metadata_namespace() -> EncodedKey {
    EncodedKey::from_bytes(vec![METADATA_TAG])
}

/// Identifiers never contain NUL, so terminating each component keeps
/// namespaces prefix-free.
fn namespace(tag: u8, table: &str, name: &str) -> EncodedKey {
    let mut out = SmallVec::<[u8; 64]>::new();
    out.push(tag);
    out.extend_from_slice(table.as_bytes());
    out.push(0x00);
    out.extend_from_slice(name.as_bytes());
    out.push(0x00);
    EncodedKey { bytes: out }
}

pub fn prefix_successor(prefix: &EncodedKey) -> Option<EncodedKey> {
    bytes_successor(&prefix.bytes).map(EncodedKey::from_bytes)
}

pub fn bytes_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut next = prefix.to_vec();
    for i in (0..next.len()).rev() {
        if next[i] != 0xFF {
            next[i] += 1;
            next.truncate(i + 1);
            return Some(next);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{
        EncodedKey, bytes_successor, colgroup_namespace, index_namespace, metadata_key,
        prefix_successor,
    };
    use std::ops::Bound;

    #[test]
    fn prefix_successor_works() {
        let key = EncodedKey::from_bytes(vec![0x10, 0xAA, 0x00]);
        let next = prefix_successor(&key).expect("next");
        assert_eq!(next.as_slice(), &[0x10, 0xAA, 0x01]);
        assert_eq!(bytes_successor(&[0x01, 0xFF]), Some(vec![0x02]));
        assert_eq!(bytes_successor(&[0xFF, 0xFF]), None);
    }

    #[test]
    fn namespaces_are_disjoint() {
        let main = colgroup_namespace("mytable", "main");
        let pop = colgroup_namespace("mytable", "population");
        let idx = index_namespace("mytable", "main");
        let other = colgroup_namespace("mytable2", "main");
        for (a, b) in [(&main, &pop), (&main, &idx), (&main, &other)] {
            assert!(!a.as_slice().starts_with(b.as_slice()));
            assert!(!b.as_slice().starts_with(a.as_slice()));
        }
        assert!(metadata_key("mytable") < main);
    }

    #[test]
    fn join_and_strip_are_inverse() {
        let ns = colgroup_namespace("t", "g");
        let key = ns.join(&[0, 0, 0, 0, 0, 0, 0, 2]);
        assert_eq!(ns.strip(&key), Some(&[0, 0, 0, 0, 0, 0, 0, 2][..]));
        assert_eq!(index_namespace("t", "g").strip(&key), None);
    }

    #[test]
    fn range_covers_only_the_namespace() {
        let ns = index_namespace("t", "i");
        let (start, end) = ns.range();
        assert_eq!(start, Bound::Included(ns.as_slice().to_vec()));
        match end {
            Bound::Excluded(end) => {
                assert!(ns.join(&[0xFF, 0xFF]) < end);
                assert!(index_namespace("t", "j").as_slice() >= end.as_slice());
            }
            other => panic!("unexpected end bound {other:?}"),
        }
    }
}
