pub mod options;
pub mod schema;
pub mod types;
pub mod uri;

use crate::catalog::options::ConfigString;
use crate::catalog::schema::{ColumnDef, ColumnGroup, ColumnId, IndexDef, Table};
use crate::catalog::uri::SourceUri;
use crate::config::SessionConfig;
use crate::error::{CursorError, Error, ResourceType, SchemaError};
use crate::format::FormatDescriptor;
use std::collections::{BTreeMap, BTreeSet};

const DEFAULT_FORMAT: &str = "u";
const TABLE_CONFIG_KEYS: &[&str] = &["key_format", "value_format", "columns", "colgroups"];
const COLUMNS_CONFIG_KEYS: &[&str] = &["columns"];

/// The physical source a resolved URI reads from.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Table,
    ColumnGroup(&'a ColumnGroup),
    Index(&'a IndexDef),
}

/// A URI resolved against the catalog: what a cursor on it sees.
#[derive(Debug, Clone)]
pub struct Resolved<'a> {
    pub table: &'a Table,
    pub target: Target<'a>,
    pub key_format: FormatDescriptor,
    pub value_format: FormatDescriptor,
    /// Columns returned by `get_value`, in order.
    pub projection: Vec<ColumnId>,
    /// The URI carried an explicit column list.
    pub projected: bool,
}

/// Table, column group and index definitions.
#[derive(Debug)]
pub struct Catalog {
    tables: BTreeMap<String, Table>,
    allow_overlapping_colgroups: bool,
    max_identifier_len: usize,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

impl Catalog {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            tables: BTreeMap::new(),
            allow_overlapping_colgroups: config.allow_overlapping_colgroups,
            max_identifier_len: config.max_identifier_len,
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table, SchemaError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| SchemaError::UnknownTable {
                table: name.to_string(),
            })
    }

    /// Defines a table. `column_names` is either empty or names every key
    /// column followed by every value column. Without `colgroups` the table
    /// gets one implicit group holding all value columns.
    pub fn define_table(
        &mut self,
        name: &str,
        key_format: &str,
        value_format: &str,
        column_names: &[String],
        colgroups: &[String],
    ) -> Result<&Table, SchemaError> {
        self.validate_identifier(name)?;
        if self.tables.contains_key(name) {
            return Err(SchemaError::DuplicateName {
                resource_type: ResourceType::Table,
                name: name.to_string(),
            });
        }
        let key_format = FormatDescriptor::parse(key_format)?;
        key_format.validate_key_format()?;
        let value_format = FormatDescriptor::parse(value_format)?;

        let expected = key_format.field_count() + value_format.field_count();
        if !column_names.is_empty() && column_names.len() != expected {
            return Err(SchemaError::InvalidConfig {
                reason: format!(
                    "table '{name}' has {expected} fields but {} column names",
                    column_names.len()
                ),
            });
        }
        let mut seen = BTreeSet::new();
        for col in column_names {
            self.validate_identifier(col)?;
            if !seen.insert(col.as_str()) {
                return Err(SchemaError::DuplicateName {
                    resource_type: ResourceType::Column,
                    name: format!("{name}.{col}"),
                });
            }
        }
        if !colgroups.is_empty() && column_names.is_empty() {
            return Err(SchemaError::InvalidConfig {
                reason: format!("table '{name}' declares column groups without column names"),
            });
        }
        let mut seen = BTreeSet::new();
        for group in colgroups {
            self.validate_identifier(group)?;
            if !seen.insert(group.as_str()) {
                return Err(SchemaError::DuplicateName {
                    resource_type: ResourceType::ColumnGroup,
                    name: format!("{name}.{group}"),
                });
            }
        }

        let columns = key_format
            .fields()
            .iter()
            .chain(value_format.fields())
            .enumerate()
            .map(|(id, field)| ColumnDef {
                name: column_names.get(id).cloned().unwrap_or_default(),
                field: *field,
            })
            .collect();

        let mut table = Table::new(
            name.to_string(),
            key_format,
            value_format,
            columns,
            colgroups.to_vec(),
        );
        if colgroups.is_empty() {
            table.colgroups.push(ColumnGroup {
                name: String::new(),
                columns: table.value_column_ids().collect(),
                format: table.value_format.clone(),
            });
        }
        tracing::debug!(
            table = name,
            key_format = %table.key_format,
            value_format = %table.value_format,
            colgroups = colgroups.len(),
            "defined table"
        );
        Ok(&*self.tables.entry(name.to_string()).or_insert(table))
    }

    pub fn define_column_group(
        &mut self,
        table_name: &str,
        name: &str,
        columns: &[String],
    ) -> Result<(), SchemaError> {
        self.validate_identifier(name)?;
        let allow_overlap = self.allow_overlapping_colgroups;
        let table = self.table_mut(table_name)?;
        if table.is_sealed() {
            return Err(SchemaError::SchemaClosed {
                table: table_name.to_string(),
            });
        }
        let Some(declared_pos) = table.declared_colgroups.iter().position(|g| g == name) else {
            return Err(SchemaError::UndeclaredColumnGroup {
                table: table_name.to_string(),
                group: name.to_string(),
            });
        };
        if table.colgroup(name).is_some() {
            return Err(SchemaError::DuplicateName {
                resource_type: ResourceType::ColumnGroup,
                name: format!("{table_name}.{name}"),
            });
        }
        if columns.is_empty() {
            return Err(SchemaError::InvalidConfig {
                reason: format!("column group '{table_name}.{name}' needs at least one column"),
            });
        }

        let ids = resolve_columns(table, columns)?;
        for id in &ids {
            if table.is_key_column(*id) {
                return Err(SchemaError::InvalidConfig {
                    reason: format!(
                        "key column '{}' cannot be stored in column group '{name}'",
                        table.display_name(*id)
                    ),
                });
            }
            if !allow_overlap {
                if let Some(other) = table.group_for(*id) {
                    return Err(SchemaError::InvalidConfig {
                        reason: format!(
                            "column '{}' is already stored in column group '{}'",
                            table.display_name(*id),
                            other.name
                        ),
                    });
                }
            }
        }

        let group = ColumnGroup {
            name: name.to_string(),
            format: table.format_of(&ids),
            columns: ids,
        };
        tracing::debug!(
            table = table_name,
            colgroup = name,
            format = %group.format,
            "defined column group"
        );
        let insert_at = table
            .colgroups
            .iter()
            .position(|g| {
                table
                    .declared_colgroups
                    .iter()
                    .position(|d| *d == g.name)
                    .is_some_and(|p| p > declared_pos)
            })
            .unwrap_or(table.colgroups.len());
        table.colgroups.insert(insert_at, group);
        Ok(())
    }

    /// Defines an index keyed by `key_columns`. Columns in `stored_columns`
    /// are copied into each index entry's value.
    pub fn define_index(
        &mut self,
        table_name: &str,
        name: &str,
        key_columns: &[String],
        stored_columns: Option<&[String]>,
    ) -> Result<(), SchemaError> {
        self.validate_identifier(name)?;
        let table = self.table_mut(table_name)?;
        if table.is_sealed() {
            return Err(SchemaError::SchemaClosed {
                table: table_name.to_string(),
            });
        }
        if table.index(name).is_some() {
            return Err(SchemaError::DuplicateName {
                resource_type: ResourceType::Index,
                name: format!("{table_name}.{name}"),
            });
        }
        if key_columns.is_empty() {
            return Err(SchemaError::InvalidConfig {
                reason: format!("index '{table_name}.{name}' needs at least one column"),
            });
        }
        let key_ids = resolve_columns(table, key_columns)?;
        let stored_ids = match stored_columns {
            Some(cols) => resolve_columns(table, cols)?,
            None => Vec::new(),
        };

        let key_format = table.format_of(&key_ids);
        let physical_format = key_format.concat(&table.key_format);
        physical_format.validate_key_format()?;
        let index = IndexDef {
            name: name.to_string(),
            stored_format: table.format_of(&stored_ids),
            key_columns: key_ids,
            key_format,
            physical_format,
            stored_columns: stored_ids,
        };
        tracing::debug!(
            table = table_name,
            index = name,
            key_format = %index.key_format,
            stored = index.stored_columns.len(),
            "defined index"
        );
        table.indexes.push(index);
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> Result<Table, SchemaError> {
        let table = self
            .tables
            .remove(name)
            .ok_or_else(|| SchemaError::UnknownTable {
                table: name.to_string(),
            })?;
        tracing::debug!(table = name, "dropped table");
        Ok(table)
    }

    /// Removes the object a successful [`Catalog::create`] on `uri` just
    /// defined.
    pub(crate) fn undo_create(&mut self, uri: &str) {
        let Ok(source) = SourceUri::parse(uri) else {
            return;
        };
        match source {
            SourceUri::Table { table, .. } => {
                self.tables.remove(&table);
            }
            SourceUri::ColumnGroup {
                table,
                group: Some(group),
                ..
            } => {
                if let Some(t) = self.tables.get_mut(&table) {
                    t.colgroups.retain(|g| g.name != group);
                }
            }
            SourceUri::ColumnGroup { group: None, .. } => {}
            SourceUri::Index { table, index, .. } => {
                if let Some(t) = self.tables.get_mut(&table) {
                    t.indexes.retain(|i| i.name != index);
                }
            }
        }
        tracing::debug!(uri, "definition rolled back");
    }

    /// Re-registers a table loaded from stored metadata.
    pub(crate) fn restore_table(&mut self, table: Table) -> Result<(), SchemaError> {
        if self.tables.contains_key(&table.name) {
            return Err(SchemaError::DuplicateName {
                resource_type: ResourceType::Table,
                name: table.name,
            });
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    /// Applies a `create` call: `uri` names the object and `config` is its
    /// configuration string. Returns the affected table's name.
    pub fn create(&mut self, uri: &str, config: &str) -> Result<String, SchemaError> {
        let source = SourceUri::parse(uri)?;
        let cfg = ConfigString::parse(config)?;
        match &source {
            SourceUri::Table { table, projection } => {
                if projection.is_some() {
                    return Err(SchemaError::InvalidConfig {
                        reason: format!("'{uri}': tables cannot be created with a projection"),
                    });
                }
                cfg.ensure_known(TABLE_CONFIG_KEYS)?;
                let key_format = cfg.get_str("key_format")?.unwrap_or(DEFAULT_FORMAT);
                let value_format = cfg.get_str("value_format")?.unwrap_or(DEFAULT_FORMAT);
                let columns = cfg.get_list("columns")?.unwrap_or(&[]);
                let colgroups = cfg.get_list("colgroups")?.unwrap_or(&[]);
                self.define_table(table, key_format, value_format, columns, colgroups)?;
            }
            SourceUri::ColumnGroup {
                table,
                group,
                projection,
            } => {
                let Some(group) = group else {
                    return Err(SchemaError::InvalidConfig {
                        reason: format!("'{uri}': column group name required"),
                    });
                };
                if projection.is_some() {
                    return Err(SchemaError::InvalidConfig {
                        reason: format!("'{uri}': column groups cannot be created with a projection"),
                    });
                }
                cfg.ensure_known(COLUMNS_CONFIG_KEYS)?;
                let columns = required_columns(&cfg, uri)?;
                self.define_column_group(table, group, columns)?;
            }
            SourceUri::Index {
                table,
                index,
                projection,
            } => {
                cfg.ensure_known(COLUMNS_CONFIG_KEYS)?;
                let columns = required_columns(&cfg, uri)?;
                self.define_index(table, index, columns, projection.as_deref())?;
            }
        }
        Ok(source.table().to_string())
    }

    /// Resolves a cursor URI to its physical source, key and value formats,
    /// and projected columns.
    pub fn resolve(&self, uri: &str) -> Result<Resolved<'_>, Error> {
        let unknown = || CursorError::UnknownSource {
            uri: uri.to_string(),
        };
        let source = SourceUri::parse(uri).map_err(|_| unknown())?;
        let table = self.tables.get(source.table()).ok_or_else(unknown)?;
        let explicit = match source.projection() {
            Some(cols) => Some(resolve_columns(table, cols)?),
            None => None,
        };
        let projected = explicit.is_some();

        let (target, key_format, projection) = match &source {
            SourceUri::Table { .. } => {
                table.check_complete()?;
                let projection = explicit.unwrap_or_else(|| table.value_column_ids().collect());
                (Target::Table, table.key_format.clone(), projection)
            }
            SourceUri::ColumnGroup { group, .. } => {
                let group = match group {
                    Some(name) => table.colgroup(name),
                    None if table.declared_colgroups.is_empty() => table.primary_group(),
                    None => None,
                }
                .ok_or_else(unknown)?;
                let projection = match explicit {
                    Some(ids) => {
                        for id in &ids {
                            if !table.is_key_column(*id) && !group.contains(*id) {
                                return Err(SchemaError::UnknownColumn {
                                    table: table.name.clone(),
                                    column: table.display_name(*id),
                                }
                                .into());
                            }
                        }
                        ids
                    }
                    None => group.columns.clone(),
                };
                (
                    Target::ColumnGroup(group),
                    table.key_format.clone(),
                    projection,
                )
            }
            SourceUri::Index { index, .. } => {
                let index = table.index(index).ok_or_else(unknown)?;
                table.check_complete()?;
                let projection = explicit.unwrap_or_else(|| table.value_column_ids().collect());
                (Target::Index(index), index.key_format.clone(), projection)
            }
        };

        Ok(Resolved {
            table,
            target,
            key_format,
            value_format: table.format_of(&projection),
            projection,
            projected,
        })
    }

    fn validate_identifier(&self, value: &str) -> Result<(), SchemaError> {
        validate_identifier(value, self.max_identifier_len)
    }
}

fn required_columns<'a>(cfg: &'a ConfigString, uri: &str) -> Result<&'a [String], SchemaError> {
    cfg.get_list("columns")?
        .ok_or_else(|| SchemaError::InvalidConfig {
            reason: format!("'{uri}' requires columns=(...)"),
        })
}

fn resolve_columns(table: &Table, names: &[String]) -> Result<Vec<ColumnId>, SchemaError> {
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let id = table
            .column_id(name)
            .ok_or_else(|| SchemaError::UnknownColumn {
                table: table.name.clone(),
                column: name.clone(),
            })?;
        if out.contains(&id) {
            return Err(SchemaError::DuplicateName {
                resource_type: ResourceType::Column,
                name: format!("{}.{name}", table.name),
            });
        }
        out.push(id);
    }
    Ok(out)
}

fn validate_identifier(value: &str, max_len: usize) -> Result<(), SchemaError> {
    let invalid = |reason: String| SchemaError::InvalidIdentifier {
        value: value.to_string(),
        reason,
    };
    if value.is_empty() {
        return Err(invalid("must not be empty".into()));
    }
    if value.len() > max_len {
        return Err(invalid(format!("must be <= {max_len} bytes")));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid("must contain only [A-Za-z0-9_-]".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Catalog, Target};
    use crate::config::SessionConfig;
    use crate::error::{CursorError, Error, SchemaError};

    fn population_catalog() -> Catalog {
        let mut catalog = Catalog::default();
        catalog
            .create(
                "table:mytable",
                "key_format=r,value_format=5sHQ,columns=(id,country,year,population),colgroups=(main,population)",
            )
            .expect("table");
        catalog
            .create("colgroup:mytable:population", "columns=(population)")
            .expect("population group");
        catalog
            .create("colgroup:mytable:main", "columns=(country,year,population)")
            .expect("main group");
        catalog
            .create("index:mytable:country", "columns=(country)")
            .expect("country index");
        catalog
            .create("index:mytable:country_plus_year", "columns=(country,year)")
            .expect("composite index");
        catalog
    }

    #[test]
    fn groups_keep_declaration_order() {
        let catalog = population_catalog();
        let table = catalog.table("mytable").expect("table");
        let names: Vec<&str> = table.colgroups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["main", "population"]);
        assert_eq!(table.primary_group().map(|g| g.format.to_string()), Some("5sHQ".into()));
        table.check_complete().expect("complete");
    }

    #[test]
    fn index_formats_append_the_table_key() {
        let catalog = population_catalog();
        let table = catalog.table("mytable").expect("table");
        let idx = table.index("country_plus_year").expect("index");
        assert_eq!(idx.key_format.to_string(), "5sH");
        assert_eq!(idx.physical_format.to_string(), "5sHr");
        assert!(idx.stored_columns.is_empty());
    }

    #[test]
    fn simple_table_gets_implicit_group() {
        let mut catalog = Catalog::default();
        catalog
            .define_table("kv", "S", "Si", &[], &[])
            .expect("table");
        let resolved = catalog.resolve("colgroup:kv").expect("implicit group");
        assert!(matches!(resolved.target, Target::ColumnGroup(g) if g.name.is_empty()));
        assert_eq!(resolved.value_format.to_string(), "Si");
        let resolved = catalog.resolve("table:kv").expect("table");
        assert_eq!(resolved.key_format.to_string(), "S");
        assert!(!resolved.projected);
    }

    #[test]
    fn defaults_to_raw_bytes() {
        let mut catalog = Catalog::default();
        catalog.create("table:raw", "").expect("table");
        let table = catalog.table("raw").expect("table");
        assert_eq!(table.key_format.to_string(), "u");
        assert_eq!(table.value_format.to_string(), "u");
    }

    #[test]
    fn resolve_projects_columns() {
        let catalog = population_catalog();
        let resolved = catalog
            .resolve("index:mytable:country_plus_year(id)")
            .expect("resolve");
        assert!(matches!(resolved.target, Target::Index(i) if i.name == "country_plus_year"));
        assert_eq!(resolved.key_format.to_string(), "5sH");
        assert_eq!(resolved.value_format.to_string(), "r");
        assert_eq!(resolved.projection, vec![0]);
        assert!(resolved.projected);

        let resolved = catalog
            .resolve("colgroup:mytable:population")
            .expect("group");
        assert_eq!(resolved.value_format.to_string(), "Q");
    }

    #[test]
    fn resolve_rejects_unknown_sources() {
        let catalog = population_catalog();
        for uri in [
            "table:nope",
            "index:mytable:nope",
            "colgroup:mytable:nope",
            "colgroup:mytable",
            "bogus",
        ] {
            let err = catalog.resolve(uri).expect_err(uri);
            assert!(
                matches!(err, Error::Cursor(CursorError::UnknownSource { .. })),
                "{uri}: {err:?}"
            );
        }
        let err = catalog
            .resolve("colgroup:mytable:population(country)")
            .expect_err("country not in group");
        assert!(matches!(err, Error::Schema(SchemaError::UnknownColumn { .. })));
    }

    #[test]
    fn incomplete_tables_cannot_be_resolved() {
        let mut catalog = Catalog::default();
        catalog
            .create(
                "table:t",
                "key_format=r,value_format=SS,columns=(id,a,b),colgroups=(g1,g2)",
            )
            .expect("table");
        catalog.create("colgroup:t:g1", "columns=(a)").expect("g1");
        let err = catalog.resolve("table:t").expect_err("g2 missing");
        assert!(matches!(
            err,
            Error::Schema(SchemaError::IncompleteTable { .. })
        ));
    }

    #[test]
    fn definition_errors() {
        let mut catalog = population_catalog();
        assert!(matches!(
            catalog.create("table:mytable", "key_format=r,value_format=S"),
            Err(SchemaError::DuplicateName { .. })
        ));
        assert!(matches!(
            catalog.create("index:mytable:country", "columns=(year)"),
            Err(SchemaError::DuplicateName { .. })
        ));
        assert!(matches!(
            catalog.create("index:mytable:bad", "columns=(continent)"),
            Err(SchemaError::UnknownColumn { .. })
        ));
        assert!(matches!(
            catalog.create("colgroup:mytable:extra", "columns=(year)"),
            Err(SchemaError::UndeclaredColumnGroup { .. })
        ));
        assert!(matches!(
            catalog.create("table:t2", "key_format=uQ,value_format=S"),
            Err(SchemaError::InvalidFormat { .. })
        ));
        assert!(matches!(
            catalog.create("table:t3", "key_format=r,value_format=S,columns=(a)"),
            Err(SchemaError::InvalidConfig { .. })
        ));
        assert!(matches!(
            catalog.create("table:t4", "key_format=r,value_format=S,columns=(a,a)"),
            Err(SchemaError::DuplicateName { .. })
        ));
        assert!(matches!(
            catalog.create("table:t5", "key_format=r,value_format=S,format=x"),
            Err(SchemaError::InvalidConfig { .. })
        ));
        assert!(matches!(
            catalog.create("table:bad.name", "key_format=r"),
            Err(SchemaError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn index_on_length_prefixed_bytes_is_rejected() {
        let mut catalog = Catalog::default();
        catalog
            .create("table:blobs", "key_format=r,value_format=uS,columns=(id,data,tag)")
            .expect("table");
        catalog
            .create("index:blobs:tag", "columns=(tag)")
            .expect("S index is ordered");
        assert!(matches!(
            catalog.create("index:blobs:data", "columns=(data)"),
            Err(SchemaError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn sealed_tables_refuse_new_indexes() {
        let mut catalog = population_catalog();
        catalog.table("mytable").expect("table").seal();
        assert!(matches!(
            catalog.create("index:mytable:year", "columns=(year)"),
            Err(SchemaError::SchemaClosed { .. })
        ));
    }

    #[test]
    fn strict_config_rejects_overlapping_groups() {
        let mut catalog = Catalog::new(&SessionConfig::strict());
        catalog
            .create(
                "table:t",
                "key_format=r,value_format=SQ,columns=(id,name,n),colgroups=(a,b)",
            )
            .expect("table");
        catalog.create("colgroup:t:a", "columns=(name,n)").expect("a");
        assert!(matches!(
            catalog.create("colgroup:t:b", "columns=(n)"),
            Err(SchemaError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn index_with_stored_projection() {
        let mut catalog = population_catalog();
        catalog
            .create("index:mytable:by_year(population)", "columns=(year)")
            .expect("index");
        let table = catalog.table("mytable").expect("table");
        let idx = table.index("by_year").expect("index");
        assert_eq!(idx.stored_format.to_string(), "Q");
        assert_eq!(idx.stored_position(3), Some(0));
    }

    #[test]
    fn drop_table_removes_definition() {
        let mut catalog = population_catalog();
        let table = catalog.drop_table("mytable").expect("drop");
        assert_eq!(table.indexes.len(), 2);
        assert!(catalog.table("mytable").is_none());
        assert!(matches!(
            catalog.drop_table("mytable"),
            Err(SchemaError::UnknownTable { .. })
        ));
    }
}
