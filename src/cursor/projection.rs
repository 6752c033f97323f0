//! Decodes the projected columns of the entry a cursor is positioned on.

use crate::catalog::schema::{ColumnGroup, ColumnId, IndexDef, Table};
use crate::catalog::types::Value;
use crate::codec::unpack;
use crate::error::{CursorError, Error};
use crate::router::read_row;
use crate::storage::KvStore;
use crate::storage::index::{decode_entry, decode_stored};

/// Table cursors: one point read per column group that holds a projected
/// column.
pub fn table_values<S: KvStore + ?Sized>(
    table: &Table,
    store: &S,
    pk: &[u8],
    projection: &[ColumnId],
) -> Result<Vec<Value>, Error> {
    read_row(table, store, pk, projection)?.ok_or_else(|| Error::from(CursorError::NotFound))
}

/// Column group cursors decode their own record; key columns come from the
/// record's key.
pub fn group_values(
    table: &Table,
    group: &ColumnGroup,
    pk: &[u8],
    raw: &[u8],
    projection: &[ColumnId],
) -> Result<Vec<Value>, Error> {
    let stored = unpack(&group.format, raw)?;
    let mut key: Option<Vec<Value>> = None;
    let mut out = Vec::with_capacity(projection.len());
    for &id in projection {
        if table.is_key_column(id) {
            if key.is_none() {
                key = Some(unpack(&table.key_format, pk)?);
            }
            if let Some(key) = &key {
                out.push(key[id].clone());
            }
            continue;
        }
        let pos = group
            .columns
            .iter()
            .position(|c| *c == id)
            .ok_or(CursorError::NotFound)?;
        out.push(stored[pos].clone());
    }
    Ok(out)
}

/// Index cursors resolve each column from, in order: the index key, the
/// trailing table key, the stored projection, and finally the column group
/// that holds it.
pub fn index_values<S: KvStore + ?Sized>(
    table: &Table,
    index: &IndexDef,
    store: &S,
    suffix: &[u8],
    raw: &[u8],
    projection: &[ColumnId],
) -> Result<Vec<Value>, Error> {
    let entry = decode_entry(table, index, suffix)?;
    let mut stored: Option<Vec<Value>> = None;
    let mut out: Vec<Option<Value>> = Vec::with_capacity(projection.len());
    let mut missing = Vec::new();

    for (slot, &id) in projection.iter().enumerate() {
        if let Some(pos) = index.key_columns.iter().position(|c| *c == id) {
            out.push(Some(entry.index_values[pos].clone()));
        } else if table.is_key_column(id) {
            out.push(Some(entry.pk_values[id].clone()));
        } else if let Some(pos) = index.stored_position(id) {
            if stored.is_none() {
                stored = Some(decode_stored(index, raw)?);
            }
            out.push(stored.as_ref().map(|values| values[pos].clone()));
        } else {
            out.push(None);
            missing.push((slot, id));
        }
    }

    if !missing.is_empty() {
        let ids: Vec<ColumnId> = missing.iter().map(|(_, id)| *id).collect();
        let fetched = read_row(table, store, &entry.pk_bytes, &ids)?.ok_or(CursorError::NotFound)?;
        for ((slot, _), value) in missing.into_iter().zip(fetched) {
            out[slot] = Some(value);
        }
    }
    out.into_iter()
        .map(|v| v.ok_or_else(|| Error::from(CursorError::NotFound)))
        .collect()
}
