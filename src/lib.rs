//! Typed tables, column groups and secondary indexes over an ordered
//! key-value store.
//!
//! A [`Session`] owns the schema [`Catalog`] and a [`KvStore`]. Tables are
//! declared with format strings (`key_format=r,value_format=5sHQ`), split into
//! column groups, indexed, and read or written through [`Cursor`]s opened on
//! `table:`, `colgroup:` or `index:` URIs.

pub mod catalog;
pub mod codec;
pub mod config;
pub mod cursor;
pub mod error;
pub mod format;
pub mod router;
pub mod storage;

pub use crate::catalog::Catalog;
pub use crate::catalog::types::Value;
pub use crate::config::SessionConfig;
pub use crate::cursor::{Cursor, CursorOptions, CursorState};
pub use crate::error::{Error, ErrorCode};
pub use crate::format::{FieldType, FormatDescriptor};
pub use crate::storage::{Keyspace, KvStore};

use crate::catalog::schema::Table;
use crate::catalog::uri::SourceUri;
use crate::storage::encoded_key::{metadata_key, metadata_namespace};
use crate::storage::{ScanOrder, WriteBatch};
use tracing::{info, warn};

pub struct Session<S: KvStore> {
    catalog: Catalog,
    store: S,
    config: SessionConfig,
}

impl<S: KvStore> Session<S> {
    /// Opens a session over `store`, reloading every table whose schema was
    /// persisted there by an earlier session.
    pub fn open(store: S, config: SessionConfig) -> Result<Self, Error> {
        let mut catalog = Catalog::new(&config);
        let (start, end) = metadata_namespace().range();
        let records = store.scan(start, end, ScanOrder::Forward, usize::MAX)?;
        for (key, payload) in &records {
            let table: Table = rmp_serde::from_slice(payload).map_err(|e| {
                Error::Metadata(format!(
                    "decode schema record {}: {e}",
                    String::from_utf8_lossy(key)
                ))
            })?;
            if has_rows(&store, &table)? {
                table.seal();
            }
            catalog.restore_table(table)?;
        }
        info!(
            tables = records.len(),
            allow_overlapping_colgroups = config.allow_overlapping_colgroups,
            overwrite_by_default = config.overwrite_by_default,
            persist_metadata = config.persist_metadata,
            "session opened"
        );
        Ok(Self {
            catalog,
            store,
            config,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Creates the table, column group or index named by `uri`. If the schema
    /// record cannot be written the definition is undone.
    pub fn create(&mut self, uri: &str, config: &str) -> Result<(), Error> {
        let table = self.catalog.create(uri, config)?;
        if let Err(err) = self.persist(&table) {
            self.catalog.undo_create(uri);
            warn!(uri, error = %err, "schema record not written, definition rolled back");
            return Err(err);
        }
        info!(uri, config, "created");
        Ok(())
    }

    /// Drops a table with all of its column groups, indexes and rows.
    pub fn drop(&mut self, uri: &str) -> Result<(), Error> {
        let name = match SourceUri::parse(uri)? {
            SourceUri::Table {
                table,
                projection: None,
            } => table,
            _ => {
                return Err(error::SchemaError::InvalidConfig {
                    reason: format!("'{uri}': only tables can be dropped"),
                }
                .into());
            }
        };
        let table = self
            .catalog
            .table(&name)
            .ok_or_else(|| error::SchemaError::UnknownTable {
                table: name.clone(),
            })?;

        let mut batch = WriteBatch::new();
        let namespaces = table
            .colgroups
            .iter()
            .map(|g| g.namespace(&table.name))
            .chain(table.indexes.iter().map(|i| i.namespace(&table.name)));
        for ns in namespaces {
            let (start, end) = ns.range();
            for (key, _) in self.store.scan(start, end, ScanOrder::Forward, usize::MAX)? {
                batch.delete(key);
            }
        }
        batch.delete(metadata_key(&name).into_vec());
        let deleted = batch.len();
        self.store.commit(batch)?;
        self.catalog.drop_table(&name)?;
        info!(table = %name, deleted, "dropped");
        Ok(())
    }

    /// Opens a cursor on `uri`. `config` accepts `append` and
    /// `overwrite=<bool>`.
    pub fn open_cursor(&self, uri: &str, config: &str) -> Result<Cursor<'_, S>, Error> {
        let options = CursorOptions::parse(config, self.config.overwrite_by_default)?;
        Cursor::open(&self.catalog, &self.store, uri, options)
    }

    fn persist(&self, table_name: &str) -> Result<(), Error> {
        if !self.config.persist_metadata {
            return Ok(());
        }
        let table = self
            .catalog
            .table(table_name)
            .ok_or_else(|| error::SchemaError::UnknownTable {
                table: table_name.to_string(),
            })?;
        let payload = rmp_serde::to_vec_named(table)
            .map_err(|e| Error::Metadata(format!("encode schema for '{table_name}': {e}")))?;
        self.store
            .put(metadata_key(table_name).into_vec(), payload)?;
        Ok(())
    }
}

fn has_rows<S: KvStore>(store: &S, table: &Table) -> Result<bool, Error> {
    for group in &table.colgroups {
        let (start, end) = group.namespace(&table.name).range();
        if !store.scan(start, end, ScanOrder::Forward, 1)?.is_empty() {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::{Session, SessionConfig};
    use crate::error::{Error, ErrorCode, SchemaError};
    use crate::storage::{Keyspace, KvStore, ScanOrder};
    use crate::values;
    use std::ops::Bound;
    use std::sync::Arc;

    fn entries(store: &Keyspace) -> usize {
        store
            .scan(Bound::Unbounded, Bound::Unbounded, ScanOrder::Forward, usize::MAX)
            .expect("scan")
            .len()
    }

    #[test]
    fn reopen_restores_schema_and_seal() {
        let store = Arc::new(Keyspace::new());
        {
            let mut session =
                Session::open(Arc::clone(&store), SessionConfig::default()).expect("open");
            session
                .create("table:t", "key_format=r,value_format=S,columns=(id,name)")
                .expect("table");
            session.create("index:t:by_name", "columns=(name)").expect("index");
            let mut cursor = session.open_cursor("table:t", "append").expect("cursor");
            cursor.set_value(values!["x"]).expect("value");
            cursor.insert().expect("insert");
        }

        let mut session = Session::open(Arc::clone(&store), SessionConfig::default()).expect("reopen");
        let table = session.catalog().table("t").expect("table restored");
        assert!(table.is_sealed());
        assert!(table.index("by_name").is_some());
        let err = session
            .create("index:t:again", "columns=(name)")
            .expect_err("sealed");
        assert!(matches!(err, Error::Schema(SchemaError::SchemaClosed { .. })));

        let mut cursor = session.open_cursor("index:t:by_name(id)", "").expect("cursor");
        cursor.set_key(values!["x"]).expect("key");
        cursor.search().expect("found");
        assert_eq!(cursor.get_value().expect("value"), values![1u64]);
    }

    #[test]
    fn development_profile_skips_metadata() {
        let store = Arc::new(Keyspace::new());
        let mut session =
            Session::open(Arc::clone(&store), SessionConfig::development()).expect("open");
        session.create("table:scratch", "").expect("table");
        assert_eq!(entries(&store), 0);
        let reopened = Session::open(store, SessionConfig::default()).expect("reopen");
        assert!(reopened.catalog().table("scratch").is_none());
    }

    #[test]
    fn drop_removes_rows_and_metadata() {
        let store = Arc::new(Keyspace::new());
        let mut session = Session::open(Arc::clone(&store), SessionConfig::default()).expect("open");
        session
            .create("table:t", "key_format=S,value_format=Q,columns=(k,v)")
            .expect("table");
        session.create("index:t:by_v", "columns=(v)").expect("index");
        {
            let mut cursor = session.open_cursor("table:t", "").expect("cursor");
            for (k, v) in [("a", 1u64), ("b", 2)] {
                cursor.set_key(values![k]).expect("key");
                cursor.set_value(values![v]).expect("value");
                cursor.insert().expect("insert");
            }
        }
        assert_eq!(entries(&store), 5);
        session.drop("table:t").expect("drop");
        assert_eq!(entries(&store), 0);
        assert!(session.open_cursor("table:t", "").is_err());

        let err = session.drop("index:t:by_v").expect_err("not a table");
        assert_eq!(err.code(), ErrorCode::InvalidConfig);
        let err = session.drop("table:t").expect_err("gone");
        assert_eq!(err.code(), ErrorCode::UnknownTable);
    }

    #[test]
    fn failed_metadata_write_undoes_create() {
        let store = Arc::new(Keyspace::new());
        let mut session = Session::open(Arc::clone(&store), SessionConfig::default()).expect("open");

        store.fail_on_nth_write(1);
        let err = session
            .create("table:t", "key_format=S,value_format=Q,columns=(k,v)")
            .expect_err("injected");
        assert_eq!(err.code(), ErrorCode::Store);
        assert!(session.catalog().table("t").is_none());
        assert_eq!(entries(&store), 0);

        store.clear_fail_point();
        session
            .create("table:t", "key_format=S,value_format=Q,columns=(k,v)")
            .expect("retry");

        store.fail_on_nth_write(1);
        session
            .create("index:t:by_v", "columns=(v)")
            .expect_err("injected");
        assert!(session.catalog().table("t").expect("table").index("by_v").is_none());
        store.clear_fail_point();
        session.create("index:t:by_v", "columns=(v)").expect("retry");

        let reopened = Session::open(store, SessionConfig::default()).expect("reopen");
        assert!(reopened.catalog().table("t").expect("table").index("by_v").is_some());
    }

    #[test]
    fn cursor_config_is_validated() {
        let mut session = Session::open(Keyspace::new(), SessionConfig::strict()).expect("open");
        session
            .create("table:t", "key_format=r,value_format=S")
            .expect("table");
        let err = session.open_cursor("table:t", "bulk").expect_err("unknown key");
        assert_eq!(err.code_str(), "invalid_config");
        let err = session.open_cursor("table:nope", "").expect_err("unknown");
        assert_eq!(err.code(), ErrorCode::UnknownSource);

        let mut cursor = session.open_cursor("table:t", "").expect("cursor");
        cursor.set_key(values![1u64]).expect("key");
        cursor.set_value(values!["a"]).expect("value");
        cursor.insert().expect("insert");
        cursor.set_value(values!["b"]).expect("value");
        let err = cursor.insert().expect_err("strict sessions do not overwrite");
        assert_eq!(err.code(), ErrorCode::DuplicateKey);
    }
}
