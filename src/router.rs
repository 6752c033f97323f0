//! Fans a logical row out into physical column group records and index
//! entries, and reads rows back from the groups that hold them.

use crate::catalog::schema::{ColumnGroup, ColumnId, Table};
use crate::catalog::types::Value;
use crate::codec::{pack, unpack};
use crate::error::{CursorError, EncodeError, Error, SchemaError, StoreError};
use crate::format::FieldType;
use crate::storage::index::{entry_key, entry_value, extract_columns};
use crate::storage::{KvStore, ScanOrder, WriteBatch};

/// How `insert` treats a key that already holds a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertMode {
    pub overwrite: bool,
}

/// Where an inserted row's primary key comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum RowKey {
    Given(Vec<Value>),
    /// Allocate the next unused record number.
    Append,
}

/// Next record number for `table`: above both the store's counter and the
/// highest record number already holding a row.
pub fn allocate_record_number<S: KvStore + ?Sized>(
    table: &Table,
    store: &S,
) -> Result<Vec<Value>, Error> {
    if table.key_format.fields() != [FieldType::RecordNumber] {
        return Err(SchemaError::InvalidConfig {
            reason: format!(
                "append requires key_format=r, table '{}' has '{}'",
                table.name, table.key_format
            ),
        }
        .into());
    }
    let Some(primary) = table.primary_group() else {
        return Err(SchemaError::IncompleteTable {
            table: table.name.clone(),
            reason: "no column groups".into(),
        }
        .into());
    };
    let ns = primary.namespace(&table.name);
    let recno = store.allocate_record_number(ns.as_slice())?;
    let (start, end) = ns.range();
    let last = match store.scan(start, end, ScanOrder::Reverse, 1)?.first() {
        Some((raw, _)) => {
            let pk = ns.strip(raw).ok_or(CursorError::NotFound)?;
            unpack(&table.key_format, pk)?
                .first()
                .and_then(Value::as_u64)
                .unwrap_or(0)
        }
        None => 0,
    };
    // Always past the highest row, even after explicit keys.
    let next = last.checked_add(1).ok_or(StoreError::RecordNumbersExhausted)?;
    Ok(vec![Value::UInt(recno.max(next))])
}

/// Writes one logical row to every column group and index of `table` in a
/// single batch, then seals the table. Returns the row's key values.
pub fn insert<S: KvStore + ?Sized>(
    table: &Table,
    store: &S,
    key: RowKey,
    values: &[Value],
    mode: InsertMode,
) -> Result<Vec<Value>, Error> {
    table.check_complete()?;
    if values.len() != table.value_count() {
        return Err(EncodeError::FieldCountMismatch {
            expected: table.value_count(),
            actual: values.len(),
        }
        .into());
    }
    let key = match key {
        RowKey::Given(key) => key,
        RowKey::Append => allocate_record_number(table, store)?,
    };
    let pk = pack(&table.key_format, &key)?;
    let mut row = key.clone();
    row.extend_from_slice(values);

    let mut batch = WriteBatch::new();
    let old = read_full_row(table, store, &pk)?;
    if let Some(old) = &old {
        if !mode.overwrite {
            return Err(CursorError::DuplicateKey {
                uri: format!("table:{}", table.name),
            }
            .into());
        }
        for index in &table.indexes {
            let stale = entry_key(table, index, old)?;
            if stale != entry_key(table, index, &row)? {
                batch.delete(stale);
            }
        }
    }

    for group in &table.colgroups {
        let value = pack(&group.format, &extract_columns(&row, &group.columns))?;
        batch.put(group.namespace(&table.name).join(&pk), value);
    }
    for index in &table.indexes {
        batch.put(entry_key(table, index, &row)?, entry_value(index, &row)?);
    }

    tracing::debug!(
        table = %table.name,
        colgroups = table.colgroups.len(),
        indexes = table.indexes.len(),
        writes = batch.len(),
        replaced = old.is_some(),
        "row fan-out"
    );
    store.commit(batch)?;
    table.seal();
    Ok(key)
}

/// Writes a single column group record, leaving other groups and indexes
/// untouched.
pub fn insert_group_record<S: KvStore + ?Sized>(
    table: &Table,
    group: &ColumnGroup,
    store: &S,
    key: RowKey,
    values: &[Value],
    mode: InsertMode,
) -> Result<Vec<Value>, Error> {
    let key = match key {
        RowKey::Given(key) => key,
        RowKey::Append => allocate_record_number(table, store)?,
    };
    let pk = pack(&table.key_format, &key)?;
    let value = pack(&group.format, values)?;
    let physical = group.namespace(&table.name).join(&pk);
    if !mode.overwrite && store.get(&physical)?.is_some() {
        return Err(CursorError::DuplicateKey {
            uri: format!("colgroup:{}:{}", table.name, group.name),
        }
        .into());
    }
    store.put(physical, value)?;
    table.seal();
    Ok(key)
}

/// Deletes the row at `key` from every column group and index in one batch.
/// Records left in only some groups are deleted too.
pub fn remove<S: KvStore + ?Sized>(table: &Table, store: &S, key: &[Value]) -> Result<(), Error> {
    table.check_complete()?;
    let pk = pack(&table.key_format, key)?;
    let row = read_full_row(table, store, &pk)?;

    let mut batch = WriteBatch::new();
    for group in &table.colgroups {
        let physical = group.namespace(&table.name).join(&pk);
        // A row written through a single column group has no index entries.
        if row.is_some() || store.get(&physical)?.is_some() {
            batch.delete(physical);
        }
    }
    if batch.is_empty() {
        return Err(CursorError::NotFound.into());
    }
    if let Some(row) = &row {
        for index in &table.indexes {
            batch.delete(entry_key(table, index, row)?);
        }
    }
    tracing::debug!(table = %table.name, writes = batch.len(), "row removed");
    store.commit(batch)?;
    Ok(())
}

/// Reads `columns` of the row whose packed key is `pk`, fetching each column
/// group at most once. Returns `None` when any needed group has no record.
pub fn read_row<S: KvStore + ?Sized>(
    table: &Table,
    store: &S,
    pk: &[u8],
    columns: &[ColumnId],
) -> Result<Option<Vec<Value>>, Error> {
    let mut key_values: Option<Vec<Value>> = None;
    let mut fetched: Vec<(&ColumnGroup, Vec<Value>)> = Vec::new();
    let mut out = Vec::with_capacity(columns.len());

    for &id in columns {
        if table.is_key_column(id) {
            if key_values.is_none() {
                key_values = Some(unpack(&table.key_format, pk)?);
            }
            if let Some(key) = &key_values {
                out.push(key[id].clone());
            }
            continue;
        }
        let group = table.group_for(id).ok_or_else(|| {
            SchemaError::IncompleteTable {
                table: table.name.clone(),
                reason: format!(
                    "column '{}' is not stored in any column group",
                    table.display_name(id)
                ),
            }
        })?;
        let slot = match fetched.iter().position(|(g, _)| g.name == group.name) {
            Some(slot) => slot,
            None => {
                let Some(raw) = store.get(&group.namespace(&table.name).join(pk))? else {
                    return Ok(None);
                };
                fetched.push((group, unpack(&group.format, &raw)?));
                fetched.len() - 1
            }
        };
        let (group, values) = &fetched[slot];
        let pos = group
            .columns
            .iter()
            .position(|c| *c == id)
            .ok_or(CursorError::NotFound)?;
        out.push(values[pos].clone());
    }
    Ok(Some(out))
}

/// Every column of the row at `pk`, indexed by [`ColumnId`].
pub fn read_full_row<S: KvStore + ?Sized>(
    table: &Table,
    store: &S,
    pk: &[u8],
) -> Result<Option<Vec<Value>>, Error> {
    let all: Vec<ColumnId> = (0..table.columns.len()).collect();
    read_row(table, store, pk, &all)
}
