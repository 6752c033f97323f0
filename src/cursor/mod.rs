//! Cursors over a table, a column group or an index.
//!
//! A cursor stages a key and value in memory, positions itself on physical
//! entries of its source with `search`/`next`/`prev`, and decodes only the
//! projected columns on `get_value`.

mod projection;

use crate::catalog::options::ConfigString;
use crate::catalog::schema::Table;
use crate::catalog::types::Value;
use crate::catalog::{Catalog, Resolved, Target};
use crate::codec::{check, pack, pack_prefix, unpack};
use crate::error::{CursorError, EncodeError, Error, SchemaError};
use crate::format::{FieldType, FormatDescriptor};
use crate::router::{self, InsertMode, RowKey};
use crate::storage::encoded_key::{EncodedKey, bytes_successor};
use crate::storage::index::{decode_entry, search_prefix};
use crate::storage::{KvStore, ScanOrder};
use std::ops::Bound;

const CURSOR_CONFIG_KEYS: &[&str] = &["append", "overwrite"];

/// Observable cursor states. Searching happens inside a single synchronous
/// call, so it has no variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Unpositioned,
    Positioned,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorOptions {
    /// Inserts allocate a fresh record number instead of using the staged key.
    pub append: bool,
    /// Inserts replace an existing row instead of failing with `DuplicateKey`.
    pub overwrite: bool,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            append: false,
            overwrite: true,
        }
    }
}

impl CursorOptions {
    /// Parses `append` and `overwrite=<bool>` from a cursor config string.
    pub fn parse(config: &str, overwrite_by_default: bool) -> Result<Self, SchemaError> {
        let cfg = ConfigString::parse(config)?;
        cfg.ensure_known(CURSOR_CONFIG_KEYS)?;
        Ok(Self {
            append: cfg.get_bool("append")?.unwrap_or(false),
            overwrite: cfg.get_bool("overwrite")?.unwrap_or(overwrite_by_default),
        })
    }
}

#[derive(Debug, Clone)]
struct Position {
    /// Physical key with the source namespace stripped.
    suffix: Vec<u8>,
    raw: Vec<u8>,
}

pub struct Cursor<'a, S: KvStore + ?Sized> {
    uri: String,
    store: &'a S,
    source: Resolved<'a>,
    options: CursorOptions,
    state: CursorState,
    key: Option<Vec<Value>>,
    value: Option<Vec<Value>>,
    position: Option<Position>,
}

impl<'a, S: KvStore + ?Sized> Cursor<'a, S> {
    pub fn open(
        catalog: &'a Catalog,
        store: &'a S,
        uri: &str,
        options: CursorOptions,
    ) -> Result<Self, Error> {
        let source = catalog.resolve(uri)?;
        if options.append
            && !matches!(source.target, Target::Index(_))
            && source.table.key_format.fields() != [FieldType::RecordNumber]
        {
            return Err(SchemaError::InvalidConfig {
                reason: format!(
                    "'{uri}': append requires key_format=r, found '{}'",
                    source.table.key_format
                ),
            }
            .into());
        }
        tracing::debug!(
            uri,
            key_format = %source.key_format,
            value_format = %source.value_format,
            append = options.append,
            overwrite = options.overwrite,
            "cursor opened"
        );
        Ok(Self {
            uri: uri.to_string(),
            store,
            source,
            options,
            state: CursorState::Unpositioned,
            key: None,
            value: None,
            position: None,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn key_format(&self) -> &FormatDescriptor {
        &self.source.key_format
    }

    pub fn value_format(&self) -> &FormatDescriptor {
        &self.source.value_format
    }

    fn table(&self) -> &'a Table {
        self.source.table
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.state == CursorState::Closed {
            return Err(CursorError::Closed.into());
        }
        Ok(())
    }

    fn read_only(&self) -> Error {
        CursorError::ReadOnlySource {
            uri: self.uri.clone(),
        }
        .into()
    }

    fn namespace(&self) -> Result<EncodedKey, Error> {
        let table = self.table();
        match self.source.target {
            Target::Table => table
                .primary_group()
                .map(|g| g.namespace(&table.name))
                .ok_or_else(|| {
                    Error::from(SchemaError::IncompleteTable {
                        table: table.name.clone(),
                        reason: "no column groups".into(),
                    })
                }),
            Target::ColumnGroup(group) => Ok(group.namespace(&table.name)),
            Target::Index(index) => Ok(index.namespace(&table.name)),
        }
    }

    fn clear_position(&mut self) {
        self.position = None;
        self.state = CursorState::Unpositioned;
    }

    /// Index cursors accept a leading subset of the index columns, which
    /// `search` then matches as a prefix.
    pub fn set_key(&mut self, key: Vec<Value>) -> Result<(), Error> {
        self.ensure_open()?;
        match self.source.target {
            Target::Index(_) => {
                if key.is_empty() {
                    return Err(EncodeError::FieldCountMismatch {
                        expected: self.source.key_format.field_count(),
                        actual: 0,
                    }
                    .into());
                }
                pack_prefix(&self.source.key_format, &key)?;
            }
            Target::Table | Target::ColumnGroup(_) => check(&self.source.key_format, &key)?,
        }
        self.key = Some(key);
        self.clear_position();
        Ok(())
    }

    pub fn set_value(&mut self, value: Vec<Value>) -> Result<(), Error> {
        self.ensure_open()?;
        check(&self.source.value_format, &value)?;
        self.value = Some(value);
        Ok(())
    }

    pub fn get_key(&self) -> Result<Vec<Value>, Error> {
        self.ensure_open()?;
        self.key
            .clone()
            .ok_or_else(|| CursorError::KeyNotSet.into())
    }

    /// The staged value if one is set, otherwise the projected columns of the
    /// current entry.
    pub fn get_value(&self) -> Result<Vec<Value>, Error> {
        self.ensure_open()?;
        if let Some(value) = &self.value {
            return Ok(value.clone());
        }
        let Some(position) = &self.position else {
            if self.key.is_some() {
                return Err(CursorError::NotPositioned.into());
            }
            return Err(CursorError::ValueNotSet.into());
        };
        let table = self.table();
        let columns = &self.source.projection;
        match self.source.target {
            Target::Table => {
                projection::table_values(table, self.store, &position.suffix, columns)
            }
            Target::ColumnGroup(group) => projection::group_values(
                table,
                group,
                &position.suffix,
                &position.raw,
                columns,
            ),
            Target::Index(index) => projection::index_values(
                table,
                index,
                self.store,
                &position.suffix,
                &position.raw,
                columns,
            ),
        }
    }

    /// Writes the staged key and value. Table cursors fan out to every column
    /// group and index; column group cursors write their own record only.
    pub fn insert(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        if self.source.projected || matches!(self.source.target, Target::Index(_)) {
            return Err(self.read_only());
        }
        let value = self.value.clone().ok_or(CursorError::ValueNotSet)?;
        let key = if self.options.append {
            RowKey::Append
        } else {
            RowKey::Given(self.key.clone().ok_or(CursorError::KeyNotSet)?)
        };
        let mode = InsertMode {
            overwrite: self.options.overwrite,
        };
        let table = self.table();
        let inserted = match self.source.target {
            Target::Table => router::insert(table, self.store, key, &value, mode),
            Target::ColumnGroup(group) => {
                router::insert_group_record(table, group, self.store, key, &value, mode)
            }
            Target::Index(_) => return Err(self.read_only()),
        }
        .map_err(|err| self.rename_duplicate(err))?;
        self.key = Some(inserted);
        self.value = None;
        self.clear_position();
        Ok(())
    }

    fn rename_duplicate(&self, err: Error) -> Error {
        match err {
            Error::Cursor(CursorError::DuplicateKey { .. }) => CursorError::DuplicateKey {
                uri: self.uri.clone(),
            }
            .into(),
            other => other,
        }
    }

    /// Point lookup on the staged key; index cursors match the staged index
    /// columns as a prefix and land on the first entry in key order. The
    /// cursor is never seen mid-search: it leaves `search` positioned or, on a
    /// miss, unpositioned.
    pub fn search(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        let key = self.key.clone().ok_or(CursorError::KeyNotSet)?;
        let found = match self.source.target {
            Target::Table | Target::ColumnGroup(_) => {
                let ns = self.namespace()?;
                let pk = pack(&self.source.key_format, &key)?;
                self.store
                    .get(&ns.join(&pk))?
                    .map(|raw| (pk, raw))
            }
            Target::Index(index) => {
                let ns = self.namespace()?;
                let prefix = search_prefix(self.table(), index, &key)?;
                let end = match bytes_successor(&prefix) {
                    Some(end) => Bound::Excluded(end),
                    None => Bound::Unbounded,
                };
                self.store
                    .scan(Bound::Included(prefix), end, ScanOrder::Forward, 1)?
                    .into_iter()
                    .next()
                    .map(|(k, raw)| (k[ns.len()..].to_vec(), raw))
            }
        };
        match found {
            Some((suffix, raw)) => self.position_on(suffix, raw),
            None => {
                self.clear_position();
                Err(CursorError::NotFound.into())
            }
        }
    }

    pub fn next(&mut self) -> Result<(), Error> {
        self.step(ScanOrder::Forward)
    }

    pub fn prev(&mut self) -> Result<(), Error> {
        self.step(ScanOrder::Reverse)
    }

    fn step(&mut self, order: ScanOrder) -> Result<(), Error> {
        self.ensure_open()?;
        let ns = self.namespace()?;
        let (ns_start, ns_end) = ns.range();
        let current = self
            .position
            .as_ref()
            .map(|p| Bound::Excluded(ns.join(&p.suffix)));
        let (start, end) = match (order, current) {
            (ScanOrder::Forward, Some(current)) => (current, ns_end),
            (ScanOrder::Reverse, Some(current)) => (ns_start, current),
            (_, None) => (ns_start, ns_end),
        };
        let entry = self.store.scan(start, end, order, 1)?.into_iter().next();
        match entry {
            Some((k, raw)) => self.position_on(k[ns.len()..].to_vec(), raw),
            None => {
                self.key = None;
                self.value = None;
                self.clear_position();
                Err(CursorError::NoMoreRecords.into())
            }
        }
    }

    fn position_on(&mut self, suffix: Vec<u8>, raw: Vec<u8>) -> Result<(), Error> {
        let table = self.table();
        let key = match self.source.target {
            Target::Table | Target::ColumnGroup(_) => unpack(&table.key_format, &suffix)?,
            Target::Index(index) => decode_entry(table, index, &suffix)?.index_values,
        };
        self.key = Some(key);
        self.value = None;
        self.position = Some(Position { suffix, raw });
        self.state = CursorState::Positioned;
        Ok(())
    }

    /// Removes the row at the staged or current key from every column group
    /// and index. Only full table cursors can remove.
    pub fn remove(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        if self.source.projected || !matches!(self.source.target, Target::Table) {
            return Err(self.read_only());
        }
        let key = self.key.clone().ok_or(CursorError::KeyNotSet)?;
        router::remove(self.table(), self.store, &key)?;
        self.value = None;
        self.clear_position();
        Ok(())
    }

    pub fn reset(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        self.key = None;
        self.value = None;
        self.clear_position();
        Ok(())
    }

    /// Closing twice is a no-op; every other call on a closed cursor fails.
    pub fn close(&mut self) {
        if self.state != CursorState::Closed {
            tracing::debug!(uri = %self.uri, "cursor closed");
        }
        self.key = None;
        self.value = None;
        self.position = None;
        self.state = CursorState::Closed;
    }
}

impl<S: KvStore + ?Sized> std::fmt::Debug for Cursor<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("uri", &self.uri)
            .field("state", &self.state)
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Cursor, CursorOptions, CursorState};
    use crate::catalog::Catalog;
    use crate::error::{CursorError, Error, SchemaError};
    use crate::storage::Keyspace;
    use crate::values;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::default();
        catalog
            .create("table:kv", "key_format=S,value_format=SI,columns=(k,name,n)")
            .expect("table");
        catalog
            .create("index:kv:by_n", "columns=(n)")
            .expect("index");
        catalog
    }

    fn fill(catalog: &Catalog, store: &Keyspace) {
        let mut cursor =
            Cursor::open(catalog, store, "table:kv", CursorOptions::default()).expect("open");
        for (k, name, n) in [("b", "bee", 2u32), ("a", "ant", 3), ("c", "cat", 1)] {
            cursor.set_key(values![k]).expect("key");
            cursor.set_value(values![name, n]).expect("value");
            cursor.insert().expect("insert");
        }
    }

    #[test]
    fn options_parse_flags() {
        assert_eq!(
            CursorOptions::parse("append", true).expect("parse"),
            CursorOptions {
                append: true,
                overwrite: true
            }
        );
        assert!(!CursorOptions::parse("overwrite=false", true).expect("parse").overwrite);
        assert!(!CursorOptions::parse("", false).expect("parse").overwrite);
        assert!(matches!(
            CursorOptions::parse("raw", true),
            Err(SchemaError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn scans_in_key_order_both_ways() {
        let catalog = catalog();
        let store = Keyspace::new();
        fill(&catalog, &store);

        let mut cursor =
            Cursor::open(&catalog, &store, "table:kv", CursorOptions::default()).expect("open");
        let mut keys = Vec::new();
        loop {
            match cursor.next() {
                Ok(()) => keys.push(cursor.get_key().expect("key")),
                Err(err) if err.is_no_more_records() => break,
                Err(err) => panic!("{err}"),
            }
        }
        assert_eq!(keys, vec![values!["a"], values!["b"], values!["c"]]);
        assert_eq!(cursor.state(), CursorState::Unpositioned);

        cursor.prev().expect("last");
        assert_eq!(cursor.get_key().expect("key"), values!["c"]);
        assert_eq!(cursor.get_value().expect("value"), values!["cat", 1u32]);
    }

    #[test]
    fn index_cursor_orders_by_index_columns() {
        let catalog = catalog();
        let store = Keyspace::new();
        fill(&catalog, &store);

        let mut cursor = Cursor::open(&catalog, &store, "index:kv:by_n(k,name)", CursorOptions::default())
            .expect("open");
        let mut rows = Vec::new();
        while cursor.next().is_ok() {
            rows.push((cursor.get_key().expect("key"), cursor.get_value().expect("value")));
        }
        assert_eq!(
            rows,
            vec![
                (values![1u32], values!["c", "cat"]),
                (values![2u32], values!["b", "bee"]),
                (values![3u32], values!["a", "ant"]),
            ]
        );

        cursor.set_key(values![2u32]).expect("key");
        cursor.search().expect("search");
        assert_eq!(cursor.state(), CursorState::Positioned);
        assert_eq!(cursor.get_value().expect("value"), values!["b", "bee"]);
        cursor.set_key(values![9u32]).expect("key");
        assert!(cursor.search().expect_err("miss").is_not_found());
        assert_eq!(cursor.state(), CursorState::Unpositioned);

        cursor.set_value(values!["z", "zed"]).expect("value");
        assert!(matches!(
            cursor.insert(),
            Err(Error::Cursor(CursorError::ReadOnlySource { .. }))
        ));
    }

    #[test]
    fn staged_state_errors() {
        let catalog = catalog();
        let store = Keyspace::new();
        let mut cursor =
            Cursor::open(&catalog, &store, "table:kv", CursorOptions::default()).expect("open");
        assert!(matches!(
            cursor.get_key(),
            Err(Error::Cursor(CursorError::KeyNotSet))
        ));
        assert!(matches!(
            cursor.get_value(),
            Err(Error::Cursor(CursorError::ValueNotSet))
        ));
        cursor.set_value(values!["x", 1u32]).expect("value");
        assert!(matches!(
            cursor.insert(),
            Err(Error::Cursor(CursorError::KeyNotSet))
        ));
        assert!(matches!(cursor.set_key(values![1u32]), Err(Error::Encode(_))));
        assert!(matches!(cursor.search(), Err(Error::Cursor(CursorError::KeyNotSet))));

        cursor.close();
        cursor.close();
        assert!(matches!(
            cursor.next(),
            Err(Error::Cursor(CursorError::Closed))
        ));
        assert!(matches!(
            cursor.reset(),
            Err(Error::Cursor(CursorError::Closed))
        ));
    }

    #[test]
    fn insert_without_overwrite_reports_cursor_uri() {
        let catalog = catalog();
        let store = Keyspace::new();
        fill(&catalog, &store);
        let options = CursorOptions {
            append: false,
            overwrite: false,
        };
        let mut cursor = Cursor::open(&catalog, &store, "table:kv", options).expect("open");
        cursor.set_key(values!["a"]).expect("key");
        cursor.set_value(values!["again", 5u32]).expect("value");
        match cursor.insert() {
            Err(Error::Cursor(CursorError::DuplicateKey { uri })) => assert_eq!(uri, "table:kv"),
            other => panic!("expected duplicate key, got {other:?}"),
        }
    }

    #[test]
    fn append_requires_record_number_keys() {
        let catalog = catalog();
        let store = Keyspace::new();
        let options = CursorOptions {
            append: true,
            overwrite: true,
        };
        assert!(matches!(
            Cursor::open(&catalog, &store, "table:kv", options),
            Err(Error::Schema(SchemaError::InvalidConfig { .. }))
        ));
    }

    #[test]
    fn remove_deletes_row_and_index_entry() {
        let catalog = catalog();
        let store = Keyspace::new();
        fill(&catalog, &store);
        let mut cursor =
            Cursor::open(&catalog, &store, "table:kv", CursorOptions::default()).expect("open");
        cursor.set_key(values!["b"]).expect("key");
        cursor.search().expect("found");
        cursor.remove().expect("remove");
        assert!(cursor.search().expect_err("gone").is_not_found());

        let mut index =
            Cursor::open(&catalog, &store, "index:kv:by_n", CursorOptions::default()).expect("open");
        index.set_key(values![2u32]).expect("key");
        assert!(index.search().expect_err("index entry gone").is_not_found());
        assert!(matches!(
            index.remove(),
            Err(Error::Cursor(CursorError::ReadOnlySource { .. }))
        ));
    }
}
