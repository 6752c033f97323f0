use crate::error::StoreError;
use crate::storage::{KvPair, KvStore, ScanOrder, WriteBatch, WriteOp};
use im::{HashMap, OrdMap};
use parking_lot::{Mutex, RwLock};
use std::ops::Bound;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KvData {
    pub entries: OrdMap<Vec<u8>, Vec<u8>>,
    pub record_numbers: HashMap<Vec<u8>, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyspaceLimits {
    pub max_key_bytes: usize,
    pub max_value_bytes: usize,
}

impl Default for KeyspaceLimits {
    fn default() -> Self {
        Self {
            max_key_bytes: 4 * 1024,
            max_value_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Default)]
struct FailPoint {
    armed: Option<usize>,
    seen: usize,
}

/// In-memory ordered store. Commits build a copy-on-write clone of the map
/// and publish it only once every write in the batch has been applied.
#[derive(Debug, Default)]
pub struct Keyspace {
    data: RwLock<KvData>,
    limits: KeyspaceLimits,
    fail_point: Mutex<FailPoint>,
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: KeyspaceLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Makes the `n`th write from now (1-based, counting puts and deletes
    /// inside batches) fail with [`StoreError::InjectedFailure`].
    pub fn fail_on_nth_write(&self, n: usize) {
        let mut fp = self.fail_point.lock();
        fp.armed = Some(n);
        fp.seen = 0;
    }

    pub fn clear_fail_point(&self) {
        *self.fail_point.lock() = FailPoint::default();
    }

    /// Point-in-time copy of the whole store.
    pub fn snapshot(&self) -> KvData {
        self.data.read().clone()
    }

    pub fn len(&self) -> usize {
        self.data.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().entries.is_empty()
    }

    fn record_write(&self) -> Result<(), StoreError> {
        let mut fp = self.fail_point.lock();
        let Some(target) = fp.armed else {
            return Ok(());
        };
        fp.seen += 1;
        if fp.seen == target {
            fp.armed = None;
            tracing::warn!(write = target, "injected store write failure");
            return Err(StoreError::InjectedFailure { write: target });
        }
        Ok(())
    }

    fn check_limits(&self, key: &[u8], value: Option<&[u8]>) -> Result<(), StoreError> {
        if key.len() > self.limits.max_key_bytes {
            return Err(StoreError::KeyTooLarge {
                size: key.len(),
                max: self.limits.max_key_bytes,
            });
        }
        if let Some(value) = value {
            if value.len() > self.limits.max_value_bytes {
                return Err(StoreError::ValueTooLarge {
                    size: value.len(),
                    max: self.limits.max_value_bytes,
                });
            }
        }
        Ok(())
    }

    fn apply(&self, data: &mut KvData, op: WriteOp) -> Result<(), StoreError> {
        self.record_write()?;
        match op {
            WriteOp::Put { key, value } => {
                self.check_limits(&key, Some(&value))?;
                data.entries.insert(key, value);
            }
            WriteOp::Delete { key } => {
                self.check_limits(&key, None)?;
                data.entries.remove(&key);
            }
        }
        Ok(())
    }
}

fn range_is_empty(start: &Bound<Vec<u8>>, end: &Bound<Vec<u8>>) -> bool {
    match (start, end) {
        (Bound::Included(s), Bound::Included(e)) => s > e,
        (Bound::Included(s), Bound::Excluded(e))
        | (Bound::Excluded(s), Bound::Included(e))
        | (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
        _ => false,
    }
}

impl KvStore for Keyspace {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.read().entries.get(key).cloned())
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.commit(batch)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.delete(key.to_vec());
        self.commit(batch)
    }

    fn scan(
        &self,
        start: Bound<Vec<u8>>,
        end: Bound<Vec<u8>>,
        order: ScanOrder,
        limit: usize,
    ) -> Result<Vec<KvPair>, StoreError> {
        if limit == 0 || range_is_empty(&start, &end) {
            return Ok(Vec::new());
        }
        let data = self.data.read();
        let iter = data.entries.range((start, end));
        let out = match order {
            ScanOrder::Forward => iter
                .take(limit)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            ScanOrder::Reverse => iter
                .rev()
                .take(limit)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        Ok(out)
    }

    fn allocate_record_number(&self, namespace: &[u8]) -> Result<u64, StoreError> {
        let mut data = self.data.write();
        let current = data.record_numbers.get(namespace).copied().unwrap_or(0);
        let next = current
            .checked_add(1)
            .ok_or(StoreError::RecordNumbersExhausted)?;
        data.record_numbers.insert(namespace.to_vec(), next);
        Ok(next)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut data = self.data.write();
        let mut staged = data.clone();
        for op in batch.into_ops() {
            self.apply(&mut staged, op)?;
        }
        *data = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Keyspace, KeyspaceLimits};
    use crate::error::StoreError;
    use crate::storage::{KvStore, ScanOrder, WriteBatch};
    use std::ops::Bound;

    fn seeded() -> Keyspace {
        let ks = Keyspace::new();
        for k in [b"a", b"b", b"c", b"d"] {
            ks.put(k.to_vec(), k.to_vec()).expect("put");
        }
        ks
    }

    #[test]
    fn snapshot_isolation_works() {
        let ks = seeded();
        let snap = ks.snapshot();
        ks.delete(b"a").expect("delete");
        ks.put(b"e".to_vec(), b"e".to_vec()).expect("put");
        assert_eq!(snap.entries.len(), 4);
        assert!(snap.entries.contains_key(b"a".as_slice()));
        assert_eq!(ks.len(), 4);
        assert_eq!(ks.get(b"a").expect("get"), None);
    }

    #[test]
    fn scan_respects_bounds_order_and_limit() {
        let ks = seeded();
        let fwd = ks
            .scan(
                Bound::Excluded(b"a".to_vec()),
                Bound::Unbounded,
                ScanOrder::Forward,
                2,
            )
            .expect("scan");
        assert_eq!(
            fwd.into_iter().map(|(k, _)| k).collect::<Vec<_>>(),
            vec![b"b".to_vec(), b"c".to_vec()]
        );
        let rev = ks
            .scan(
                Bound::Unbounded,
                Bound::Excluded(b"d".to_vec()),
                ScanOrder::Reverse,
                1,
            )
            .expect("scan");
        assert_eq!(rev[0].0, b"c".to_vec());
        let inverted = ks
            .scan(
                Bound::Included(b"c".to_vec()),
                Bound::Excluded(b"b".to_vec()),
                ScanOrder::Forward,
                10,
            )
            .expect("scan");
        assert!(inverted.is_empty());
    }

    #[test]
    fn failed_batch_leaves_no_trace() {
        let ks = seeded();
        let mut batch = WriteBatch::new();
        batch.put(b"x".to_vec(), b"1".to_vec());
        batch.delete(b"a".to_vec());
        batch.put(b"y".to_vec(), b"2".to_vec());
        ks.fail_on_nth_write(3);
        let err = ks.commit(batch.clone()).expect_err("injected");
        assert_eq!(err, StoreError::InjectedFailure { write: 3 });
        assert_eq!(ks.get(b"x").expect("get"), None);
        assert_eq!(ks.get(b"a").expect("get"), Some(b"a".to_vec()));

        ks.commit(batch).expect("fail point disarmed");
        assert_eq!(ks.get(b"y").expect("get"), Some(b"2".to_vec()));
    }

    #[test]
    fn record_numbers_are_monotonic_per_namespace() {
        let ks = Keyspace::new();
        assert_eq!(ks.allocate_record_number(b"t1").expect("alloc"), 1);
        assert_eq!(ks.allocate_record_number(b"t1").expect("alloc"), 2);
        assert_eq!(ks.allocate_record_number(b"t2").expect("alloc"), 1);
    }

    #[test]
    fn limits_reject_oversized_writes() {
        let ks = Keyspace::with_limits(KeyspaceLimits {
            max_key_bytes: 4,
            max_value_bytes: 2,
        });
        assert!(matches!(
            ks.put(b"too-long".to_vec(), Vec::new()),
            Err(StoreError::KeyTooLarge { size: 8, max: 4 })
        ));
        assert!(matches!(
            ks.put(b"k".to_vec(), vec![0; 3]),
            Err(StoreError::ValueTooLarge { size: 3, max: 2 })
        ));
    }
}
