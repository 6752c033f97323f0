use crate::error::SchemaError;
use crate::format::{FieldType, FormatDescriptor};
use crate::storage::encoded_key::{EncodedKey, colgroup_namespace, index_namespace};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Position of a column in [`Table::columns`]: key columns first, then value
/// columns.
pub type ColumnId = usize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Empty when the table was declared without column names.
    pub name: String,
    pub field: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnGroup {
    /// Empty for the implicit group of a table without declared groups.
    pub name: String,
    pub columns: Vec<ColumnId>,
    pub format: FormatDescriptor,
}

impl ColumnGroup {
    pub fn namespace(&self, table: &str) -> EncodedKey {
        colgroup_namespace(table, &self.name)
    }

    pub fn contains(&self, column: ColumnId) -> bool {
        self.columns.contains(&column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub key_columns: Vec<ColumnId>,
    /// Format of the index key columns alone, as seen by cursors.
    pub key_format: FormatDescriptor,
    /// Index key columns followed by the table key: the stored key layout.
    pub physical_format: FormatDescriptor,
    /// Columns copied into the index value, empty when none were declared.
    pub stored_columns: Vec<ColumnId>,
    pub stored_format: FormatDescriptor,
}

impl IndexDef {
    pub fn namespace(&self, table: &str) -> EncodedKey {
        index_namespace(table, &self.name)
    }

    pub fn stored_position(&self, column: ColumnId) -> Option<usize> {
        self.stored_columns.iter().position(|c| *c == column)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub key_format: FormatDescriptor,
    pub value_format: FormatDescriptor,
    pub columns: Vec<ColumnDef>,
    pub declared_colgroups: Vec<String>,
    /// Defined groups in declaration order; the first one is the primary.
    pub colgroups: Vec<ColumnGroup>,
    pub indexes: Vec<IndexDef>,
    #[serde(skip)]
    sealed: AtomicBool,
}

impl Table {
    pub(crate) fn new(
        name: String,
        key_format: FormatDescriptor,
        value_format: FormatDescriptor,
        columns: Vec<ColumnDef>,
        declared_colgroups: Vec<String>,
    ) -> Self {
        Self {
            name,
            key_format,
            value_format,
            columns,
            declared_colgroups,
            colgroups: Vec::new(),
            indexes: Vec::new(),
            sealed: AtomicBool::new(false),
        }
    }

    pub fn key_count(&self) -> usize {
        self.key_format.field_count()
    }

    pub fn value_count(&self) -> usize {
        self.value_format.field_count()
    }

    pub fn column_id(&self, name: &str) -> Option<ColumnId> {
        if name.is_empty() {
            return None;
        }
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, id: ColumnId) -> &ColumnDef {
        &self.columns[id]
    }

    pub fn key_column_ids(&self) -> std::ops::Range<ColumnId> {
        0..self.key_count()
    }

    pub fn value_column_ids(&self) -> std::ops::Range<ColumnId> {
        self.key_count()..self.key_count() + self.value_count()
    }

    pub fn is_key_column(&self, id: ColumnId) -> bool {
        id < self.key_count()
    }

    pub fn field_type(&self, id: ColumnId) -> FieldType {
        self.columns[id].field
    }

    pub fn format_of(&self, ids: &[ColumnId]) -> FormatDescriptor {
        FormatDescriptor::from_fields(ids.iter().map(|id| self.field_type(*id)).collect())
    }

    pub fn primary_group(&self) -> Option<&ColumnGroup> {
        self.colgroups.first()
    }

    pub fn colgroup(&self, name: &str) -> Option<&ColumnGroup> {
        self.colgroups.iter().find(|g| g.name == name)
    }

    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// The first group, in declaration order, that stores `column`.
    pub fn group_for(&self, column: ColumnId) -> Option<&ColumnGroup> {
        self.colgroups.iter().find(|g| g.contains(column))
    }

    pub fn display_name(&self, id: ColumnId) -> String {
        let col = &self.columns[id];
        if col.name.is_empty() {
            format!("#{id}")
        } else {
            col.name.clone()
        }
    }

    /// Every declared group exists and together they store every value
    /// column.
    pub fn check_complete(&self) -> Result<(), SchemaError> {
        let incomplete = |reason: String| SchemaError::IncompleteTable {
            table: self.name.clone(),
            reason,
        };
        for declared in &self.declared_colgroups {
            if self.colgroup(declared).is_none() {
                return Err(incomplete(format!("column group '{declared}' is not defined")));
            }
        }
        if self.colgroups.is_empty() {
            return Err(incomplete("no column groups".into()));
        }
        for id in self.value_column_ids() {
            if self.group_for(id).is_none() {
                return Err(incomplete(format!(
                    "column '{}' is not stored in any column group",
                    self.display_name(id)
                )));
            }
        }
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub(crate) fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }
}
