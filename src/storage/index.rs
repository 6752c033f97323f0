//! Physical layout of secondary index entries.
//!
//! An entry key is `index namespace ++ pack(index columns ++ table key)`; the
//! entry value is the packed stored projection, empty when none was declared.

use crate::catalog::schema::{ColumnId, IndexDef, Table};
use crate::catalog::types::Value;
use crate::codec::{pack, pack_prefix, unpack};
use crate::error::EncodeError;

/// An index entry key split back into its two halves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEntry {
    pub index_values: Vec<Value>,
    pub pk_values: Vec<Value>,
    /// The table key re-packed under the table's key format.
    pub pk_bytes: Vec<u8>,
}

/// Values of `columns` taken from a full row indexed by [`ColumnId`].
pub fn extract_columns(row: &[Value], columns: &[ColumnId]) -> Vec<Value> {
    columns.iter().map(|id| row[*id].clone()).collect()
}

pub fn extract_index_key(table: &Table, index: &IndexDef, row: &[Value]) -> Vec<Value> {
    let mut out = extract_columns(row, &index.key_columns);
    out.extend(table.key_column_ids().map(|id| row[id].clone()));
    out
}

/// Full physical key for the entry `row` produces in `index`.
pub fn entry_key(table: &Table, index: &IndexDef, row: &[Value]) -> Result<Vec<u8>, EncodeError> {
    let packed = pack(&index.physical_format, &extract_index_key(table, index, row))?;
    Ok(index.namespace(&table.name).join(&packed))
}

pub fn entry_value(index: &IndexDef, row: &[Value]) -> Result<Vec<u8>, EncodeError> {
    if index.stored_columns.is_empty() {
        return Ok(Vec::new());
    }
    pack(
        &index.stored_format,
        &extract_columns(row, &index.stored_columns),
    )
}

/// Physical key prefix shared by every entry whose leading index columns
/// equal `values`.
pub fn search_prefix(
    table: &Table,
    index: &IndexDef,
    values: &[Value],
) -> Result<Vec<u8>, EncodeError> {
    if values.len() > index.key_columns.len() {
        return Err(EncodeError::FieldCountMismatch {
            expected: index.key_columns.len(),
            actual: values.len(),
        });
    }
    let packed = pack_prefix(&index.physical_format, values)?;
    Ok(index.namespace(&table.name).join(&packed))
}

/// Decodes an entry key with the namespace already stripped.
pub fn decode_entry(
    table: &Table,
    index: &IndexDef,
    suffix: &[u8],
) -> Result<DecodedEntry, EncodeError> {
    let mut values = unpack(&index.physical_format, suffix)?;
    let pk_values = values.split_off(index.key_columns.len());
    let pk_bytes = pack(&table.key_format, &pk_values)?;
    Ok(DecodedEntry {
        index_values: values,
        pk_values,
        pk_bytes,
    })
}

pub fn decode_stored(index: &IndexDef, raw: &[u8]) -> Result<Vec<Value>, EncodeError> {
    if index.stored_columns.is_empty() {
        return Ok(Vec::new());
    }
    unpack(&index.stored_format, raw)
}
