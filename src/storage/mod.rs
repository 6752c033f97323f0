//! The boundary to the ordered key-value store that persists physical bytes.

pub mod encoded_key;
pub mod index;
pub mod keyspace;

use crate::error::StoreError;
use std::ops::Bound;

pub use keyspace::Keyspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanOrder {
    #[default]
    Forward,
    Reverse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Writes that must become visible together or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(WriteOp::Put { key, value });
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(WriteOp::Delete { key });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

pub type KvPair = (Vec<u8>, Vec<u8>);

/// Ordered key-value store consumed by the schema layer.
///
/// Keys compare byte-wise. All calls are synchronous; isolation between
/// concurrent callers is the store's business.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError>;

    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Up to `limit` entries within `(start, end)`, ascending for
    /// [`ScanOrder::Forward`] and descending for [`ScanOrder::Reverse`].
    fn scan(
        &self,
        start: Bound<Vec<u8>>,
        end: Bound<Vec<u8>>,
        order: ScanOrder,
        limit: usize,
    ) -> Result<Vec<KvPair>, StoreError>;

    /// Next record number for `namespace`: starts at 1, never reused.
    fn allocate_record_number(&self, namespace: &[u8]) -> Result<u64, StoreError>;

    /// Applies every op in `batch` atomically.
    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

impl<S: KvStore + ?Sized> KvStore for std::sync::Arc<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn scan(
        &self,
        start: Bound<Vec<u8>>,
        end: Bound<Vec<u8>>,
        order: ScanOrder,
        limit: usize,
    ) -> Result<Vec<KvPair>, StoreError> {
        (**self).scan(start, end, order, limit)
    }

    fn allocate_record_number(&self, namespace: &[u8]) -> Result<u64, StoreError> {
        (**self).allocate_record_number(namespace)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        (**self).commit(batch)
    }
}
